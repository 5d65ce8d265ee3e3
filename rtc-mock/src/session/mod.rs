
pub(crate) mod driver;
pub mod negotiation;

use std::collections::VecDeque;
use std::fmt;
use std::net::SocketAddr;
use std::time::Instant;

use bytes::BytesMut;
use log::{debug, info, trace, warn};
use rtc::data_channel::RTCDataChannelId;
use rtc::peer_connection::RTCPeerConnection;
use rtc::peer_connection::event::{RTCDataChannelEvent, RTCPeerConnectionEvent};
use rtc::peer_connection::message::RTCMessage;
use rtc::peer_connection::state::RTCPeerConnectionState;
use rtc::sansio::Protocol;
use rtc::shared::TaggedBytesMut;

use crate::error::{Error, Result};
use crate::payload::Payload;
use crate::scheduler::{ChannelEvent, SchedulerOutput};

pub use negotiation::NegotiationAdapter;

/// Lifecycle of one negotiated peer connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Negotiating,
    Connected,
    Closed,
    Failed,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Failed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Negotiating => "negotiating",
            SessionState::Connected => "connected",
            SessionState::Closed => "closed",
            SessionState::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelStatus {
    Open,
    Closed,
}

/// A data channel announced by the remote peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelHandle {
    pub id: RTCDataChannelId,
    pub label: String,
    pub status: ChannelStatus,
}

impl ChannelHandle {
    pub fn is_open(&self) -> bool {
        self.status == ChannelStatus::Open
    }
}

/// Bookkeeping for the channels of one session. Labels are not unique: when a
/// label is reused the most recently opened channel is the one sends go to.
#[derive(Debug, Default)]
pub(crate) struct ChannelRegistry {
    handles: Vec<ChannelHandle>,
}

impl ChannelRegistry {
    pub(crate) fn open(&mut self, id: RTCDataChannelId, label: String) {
        if self.find_open(&label).is_some() {
            warn!("data channel label '{label}' reused by channel {id}, newest channel wins");
        }
        self.handles.retain(|h| h.id != id);
        self.handles.push(ChannelHandle {
            id,
            label,
            status: ChannelStatus::Open,
        });
    }

    /// Marks the channel closed and returns its label if it was open.
    pub(crate) fn close(&mut self, id: RTCDataChannelId) -> Option<String> {
        let handle = self.handles.iter_mut().find(|h| h.id == id && h.is_open())?;
        handle.status = ChannelStatus::Closed;
        Some(handle.label.clone())
    }

    pub(crate) fn close_all(&mut self) {
        for handle in &mut self.handles {
            handle.status = ChannelStatus::Closed;
        }
    }

    pub(crate) fn find_open(&self, label: &str) -> Option<&ChannelHandle> {
        self.handles
            .iter()
            .rev()
            .find(|h| h.label == label && h.is_open())
    }

    pub(crate) fn label_of(&self, id: RTCDataChannelId) -> Option<&str> {
        self.handles
            .iter()
            .find(|h| h.id == id)
            .map(|h| h.label.as_str())
    }

    pub(crate) fn handles(&self) -> &[ChannelHandle] {
        &self.handles
    }
}

/// PeerSession wraps a negotiated [`RTCPeerConnection`] and exposes it to a
/// step scheduler as channel events in and sends out.
///
/// Reads are datagrams from the session's socket, translated into
/// [`ChannelEvent`]s. Writes are [`SchedulerOutput`]s, applied to the data
/// channels. Events report [`SessionState`] transitions. Datagrams the peer
/// connection wants sent are handed out by `poll_write`.
pub struct PeerSession {
    peer_connection: RTCPeerConnection,
    local_addr: SocketAddr,
    state: SessionState,
    channels: ChannelRegistry,
    read_outs: VecDeque<ChannelEvent>,
    event_outs: VecDeque<SessionState>,
}

impl PeerSession {
    pub(crate) fn new(peer_connection: RTCPeerConnection, local_addr: SocketAddr) -> Self {
        Self {
            peer_connection,
            local_addr,
            state: SessionState::Negotiating,
            channels: ChannelRegistry::default(),
            read_outs: VecDeque::new(),
            event_outs: VecDeque::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn channels(&self) -> &[ChannelHandle] {
        self.channels.handles()
    }

    /// Sends `payload` on the open channel labelled `channel_label`.
    pub fn send(&mut self, channel_label: &str, payload: &Payload) -> Result<()> {
        let id = self
            .channels
            .find_open(channel_label)
            .map(|h| h.id)
            .ok_or_else(|| Error::ErrChannelUnavailable(channel_label.to_owned()))?;
        let mut data_channel = self
            .peer_connection
            .data_channel(id)
            .ok_or_else(|| Error::ErrChannelUnavailable(channel_label.to_owned()))?;

        match payload {
            Payload::Text(text) => data_channel.send_text(text.as_str())?,
            Payload::Binary(data) => data_channel.send(BytesMut::from(&data[..]))?,
        }
        debug!("sent {} on '{}'", payload, channel_label);
        Ok(())
    }

    /// Closes the peer connection at `now` and releases every channel handle.
    /// Datagrams already handed out by `poll_write` are unaffected, so callers
    /// flush before closing when queued sends must go out.
    pub fn close_at(&mut self, now: Instant) -> Result<()> {
        if self.state.is_terminal() {
            return Ok(());
        }
        self.peer_connection.close()?;
        self.drain(now);
        self.set_state(SessionState::Closed);
        Ok(())
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state == state || self.state.is_terminal() {
            return;
        }
        info!("peer session {} is {}", self.local_addr, state);
        self.state = state;
        if state.is_terminal() {
            self.channels.close_all();
        }
        self.event_outs.push_back(state);
    }

    fn handle_connection_state(&mut self, state: RTCPeerConnectionState) {
        debug!("peer connection state has changed: {state}");
        match state {
            RTCPeerConnectionState::Connected => self.set_state(SessionState::Connected),
            RTCPeerConnectionState::Failed => self.set_state(SessionState::Failed),
            RTCPeerConnectionState::Closed => self.set_state(SessionState::Closed),
            _ => {}
        }
    }

    fn handle_channel_open(&mut self, now: Instant, id: RTCDataChannelId) {
        let Some(data_channel) = self.peer_connection.data_channel(id) else {
            warn!("data channel {id} opened but is already gone");
            return;
        };
        let label = data_channel.label().to_string();
        info!("data channel '{label}'-'{id}' open");

        self.channels.open(id, label.clone());
        self.read_outs.push_back(ChannelEvent::open(now, label));
    }

    fn handle_channel_close(&mut self, now: Instant, id: RTCDataChannelId) {
        if let Some(label) = self.channels.close(id) {
            info!("data channel '{label}'-'{id}' closed");
            self.read_outs.push_back(ChannelEvent::close(now, label));
        }
    }

    /// Drains the peer connection's events and messages into this session's
    /// queues. Events go first so a channel is always opened before its first
    /// message is reported.
    fn drain(&mut self, now: Instant) {
        while let Some(event) = self.peer_connection.poll_event() {
            match event {
                RTCPeerConnectionEvent::OnConnectionStateChangeEvent(state) => {
                    self.handle_connection_state(state)
                }
                RTCPeerConnectionEvent::OnDataChannel(RTCDataChannelEvent::OnOpen(id)) => {
                    self.handle_channel_open(now, id)
                }
                RTCPeerConnectionEvent::OnDataChannel(RTCDataChannelEvent::OnClose(id)) => {
                    self.handle_channel_close(now, id)
                }
                _ => {}
            }
        }

        while let Some(message) = self.peer_connection.poll_read() {
            let RTCMessage::DataChannelMessage(id, message) = message else {
                continue;
            };
            let Some(label) = self.channels.label_of(id).map(str::to_owned) else {
                warn!("message on unknown data channel {id} dropped");
                continue;
            };
            let payload = Payload::from_message(message.is_string, message.data);
            trace!("message {} from '{}'", payload, label);
            self.read_outs
                .push_back(ChannelEvent::message(now, label, payload));
        }
    }
}

impl Protocol<TaggedBytesMut, SchedulerOutput, ()> for PeerSession {
    type Rout = ChannelEvent;
    type Wout = TaggedBytesMut;
    type Eout = SessionState;
    type Error = Error;
    type Time = Instant;

    fn handle_read(&mut self, msg: TaggedBytesMut) -> Result<()> {
        let now = msg.now;
        self.peer_connection.handle_read(msg)?;
        self.drain(now);
        Ok(())
    }

    fn poll_read(&mut self) -> Option<Self::Rout> {
        self.read_outs.pop_front()
    }

    fn handle_write(&mut self, msg: SchedulerOutput) -> Result<()> {
        match msg {
            SchedulerOutput::Send {
                channel_label,
                payload,
            } => self.send(&channel_label, &payload),
            SchedulerOutput::CloseSession => self.close(),
        }
    }

    fn poll_write(&mut self) -> Option<Self::Wout> {
        self.peer_connection.poll_write()
    }

    fn handle_event(&mut self, _evt: ()) -> Result<()> {
        Ok(())
    }

    fn poll_event(&mut self) -> Option<Self::Eout> {
        self.event_outs.pop_front()
    }

    fn handle_timeout(&mut self, now: Instant) -> Result<()> {
        self.peer_connection.handle_timeout(now)?;
        self.drain(now);
        Ok(())
    }

    fn poll_timeout(&mut self) -> Option<Instant> {
        if self.state.is_terminal() {
            None
        } else {
            self.peer_connection.poll_timeout()
        }
    }

    /// Closes at the current instant. Event loops that own a clock call
    /// [`PeerSession::close_at`] instead.
    fn close(&mut self) -> Result<()> {
        self.close_at(Instant::now())
    }
}
