
use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, Instant};

use log::{debug, error, info, trace};

use crate::error::{Error, Result};
use crate::payload::Payload;
use crate::step::{PeerScript, Step};

/// What happened on a data channel of the bound session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEventKind {
    Open,
    Message(Payload),
    Close,
}

/// ChannelEvent is the scheduler's read input: one data channel event, tagged
/// with the channel label and the time it was observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelEvent {
    pub now: Instant,
    pub channel_label: String,
    pub kind: ChannelEventKind,
}

impl ChannelEvent {
    pub fn open(now: Instant, channel_label: impl Into<String>) -> Self {
        Self {
            now,
            channel_label: channel_label.into(),
            kind: ChannelEventKind::Open,
        }
    }

    pub fn message(now: Instant, channel_label: impl Into<String>, payload: Payload) -> Self {
        Self {
            now,
            channel_label: channel_label.into(),
            kind: ChannelEventKind::Message(payload),
        }
    }

    pub fn close(now: Instant, channel_label: impl Into<String>) -> Self {
        Self {
            now,
            channel_label: channel_label.into(),
            kind: ChannelEventKind::Close,
        }
    }
}

/// SchedulerOutput is an effect the session must apply on behalf of the script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerOutput {
    Send {
        channel_label: String,
        payload: Payload,
    },
    CloseSession,
}

/// Commands the owning session sends to the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerCommand {
    /// The transport is gone; remaining steps are discarded.
    Abort(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerEvent {
    StepActivated(usize),
    StepSatisfied(usize),
    Completed,
    Aborted(String),
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Running,
    Completed,
    Aborted,
    Cancelled,
}

impl fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SchedulerState::Running => "running",
            SchedulerState::Completed => "completed",
            SchedulerState::Aborted => "aborted",
            SchedulerState::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// The condition the active step is suspended on.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Suspension {
    Timer(Instant),
    AnyMessage,
    ChannelMessage(String),
    ChannelOpen(Option<String>),
    ChannelReady(Payload),
    Echo,
}

/// StepScheduler runs a [`PeerScript`] as a sans-I/O state machine.
///
/// Exactly one step is active at a time. The session feeds channel events in
/// through `handle_read` and timer expiry through `handle_timeout`; the
/// scheduler reports its next deadline with `poll_timeout` and hands the sends
/// it wants applied out through `poll_write`. Nothing is buffered across steps:
/// a message that arrives while no wait step is active is dropped.
pub struct StepScheduler {
    script: PeerScript,
    index: usize,
    state: SchedulerState,
    suspension: Option<Suspension>,
    bound_channel: Option<String>,
    /// Labels in the order they first opened, each with the number of open
    /// channels currently sharing it.
    open_channels: Vec<(String, usize)>,
    write_outs: VecDeque<SchedulerOutput>,
    event_outs: VecDeque<SchedulerEvent>,
}

impl StepScheduler {
    /// Creates a scheduler and activates the first step at `now`.
    pub fn new(script: PeerScript, now: Instant) -> Self {
        let mut scheduler = Self {
            script,
            index: 0,
            state: SchedulerState::Running,
            suspension: None,
            bound_channel: None,
            open_channels: vec![],
            write_outs: VecDeque::new(),
            event_outs: VecDeque::new(),
        };
        scheduler.advance(now);
        scheduler
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// Index of the active step while the script is running.
    pub fn active_step(&self) -> Option<usize> {
        if self.state == SchedulerState::Running && self.suspension.is_some() {
            Some(self.index)
        } else {
            None
        }
    }

    /// Labels of the open channels, in the order they opened.
    pub fn open_channels(&self) -> impl Iterator<Item = &str> {
        self.open_channels.iter().map(|(label, _)| label.as_str())
    }

    fn track_open(&mut self, channel_label: &str) {
        match self
            .open_channels
            .iter_mut()
            .find(|(label, _)| label == channel_label)
        {
            Some((_, count)) => *count += 1,
            None => self.open_channels.push((channel_label.to_owned(), 1)),
        }
    }

    fn track_close(&mut self, channel_label: &str) {
        if let Some(pos) = self
            .open_channels
            .iter()
            .position(|(label, _)| label == channel_label)
        {
            self.open_channels[pos].1 -= 1;
            if self.open_channels[pos].1 == 0 {
                self.open_channels.remove(pos);
            }
        }
    }

    fn is_running(&self) -> bool {
        self.state == SchedulerState::Running
    }

    /// Activates steps until one suspends or the script runs out.
    fn advance(&mut self, now: Instant) {
        while self.is_running() && self.suspension.is_none() {
            let Some(step) = self.script.get(self.index).cloned() else {
                self.finish();
                return;
            };

            debug!("step #{} {} is active", self.index, step);
            self.event_outs
                .push_back(SchedulerEvent::StepActivated(self.index));

            match step {
                Step::Sleep { duration_ms } => {
                    let deadline = now + Duration::from_millis(duration_ms);
                    self.suspension = Some(Suspension::Timer(deadline));
                }
                Step::WaitForAnyMessage => {
                    self.suspension = Some(Suspension::AnyMessage);
                }
                Step::WaitForChannelMessage { channel_label } => {
                    self.suspension = Some(Suspension::ChannelMessage(channel_label));
                }
                Step::WaitForChannel { channel_label } => {
                    match self.find_open_channel(channel_label.as_deref()) {
                        Some(label) => self.satisfy(Some(label)),
                        None => self.suspension = Some(Suspension::ChannelOpen(channel_label)),
                    }
                }
                Step::Send { payload } => {
                    if let Some(channel_label) = self.bound_channel.take() {
                        self.transmit(channel_label, payload);
                        self.satisfy(None);
                    } else if self.open_channels.is_empty() {
                        self.suspension = Some(Suspension::ChannelReady(payload));
                    } else {
                        self.broadcast(&payload);
                        self.satisfy(None);
                    }
                }
                Step::Echo => {
                    self.suspension = Some(Suspension::Echo);
                }
                Step::Close => {
                    self.write_outs.push_back(SchedulerOutput::CloseSession);
                    self.satisfy(None);
                    if self.index < self.script.len() {
                        debug!(
                            "skipping {} step(s) after close",
                            self.script.len() - self.index
                        );
                    }
                    self.finish();
                }
            }
        }
    }

    /// Marks the active step satisfied, leaving `bound_channel` as the context
    /// for the next step.
    fn satisfy(&mut self, bound_channel: Option<String>) {
        info!("step #{} satisfied", self.index);
        self.suspension = None;
        self.bound_channel = bound_channel;
        self.event_outs
            .push_back(SchedulerEvent::StepSatisfied(self.index));
        self.index += 1;
    }

    fn finish(&mut self) {
        info!("script completed after {} step(s)", self.index);
        self.state = SchedulerState::Completed;
        self.suspension = None;
        self.bound_channel = None;
        self.event_outs.push_back(SchedulerEvent::Completed);
    }

    fn find_open_channel(&self, channel_label: Option<&str>) -> Option<String> {
        match channel_label {
            Some(label) => self.open_channels().find(|l| *l == label).map(str::to_owned),
            None => self.open_channels().next().map(str::to_owned),
        }
    }

    fn transmit(&mut self, channel_label: String, payload: Payload) {
        self.write_outs.push_back(SchedulerOutput::Send {
            channel_label,
            payload,
        });
    }

    fn broadcast(&mut self, payload: &Payload) {
        let labels: Vec<String> = self.open_channels().map(str::to_owned).collect();
        for channel_label in labels {
            self.transmit(channel_label, payload.clone());
        }
    }

    fn handle_channel_open(&mut self, channel_label: String) {
        self.track_open(&channel_label);

        match self.suspension.take() {
            Some(Suspension::ChannelReady(payload)) => {
                self.broadcast(&payload);
                self.satisfy(None);
            }
            Some(Suspension::ChannelOpen(wanted))
                if wanted.as_deref().is_none_or(|label| label == channel_label) =>
            {
                self.satisfy(Some(channel_label));
            }
            suspension => self.suspension = suspension,
        }
    }

    fn handle_channel_message(&mut self, channel_label: String, payload: Payload) {
        match self.suspension.take() {
            Some(Suspension::AnyMessage) => self.satisfy(Some(channel_label)),
            Some(Suspension::ChannelMessage(wanted)) if wanted == channel_label => {
                self.satisfy(Some(channel_label))
            }
            Some(Suspension::Echo) => {
                self.transmit(channel_label, payload);
                self.suspension = Some(Suspension::Echo);
            }
            suspension => {
                trace!("message {} on '{}' ignored", payload, channel_label);
                self.suspension = suspension;
            }
        }
    }
}

impl rtc::sansio::Protocol<ChannelEvent, (), SchedulerCommand> for StepScheduler {
    type Rout = ();
    type Wout = SchedulerOutput;
    type Eout = SchedulerEvent;
    type Error = Error;
    type Time = Instant;

    fn handle_read(&mut self, msg: ChannelEvent) -> Result<()> {
        let ChannelEvent {
            now,
            channel_label,
            kind,
        } = msg;

        match kind {
            ChannelEventKind::Open => {
                if self.is_running() {
                    self.handle_channel_open(channel_label);
                } else {
                    self.track_open(&channel_label);
                }
            }
            ChannelEventKind::Message(payload) => {
                if self.is_running() {
                    self.handle_channel_message(channel_label, payload);
                }
            }
            ChannelEventKind::Close => {
                self.track_close(&channel_label);
            }
        }

        self.advance(now);
        Ok(())
    }

    fn poll_read(&mut self) -> Option<Self::Rout> {
        None
    }

    /// The scheduler originates all of its writes from the script.
    fn handle_write(&mut self, _msg: ()) -> Result<()> {
        Ok(())
    }

    fn poll_write(&mut self) -> Option<Self::Wout> {
        self.write_outs.pop_front()
    }

    fn handle_event(&mut self, evt: SchedulerCommand) -> Result<()> {
        match evt {
            SchedulerCommand::Abort(reason) => {
                if self.is_running() {
                    error!(
                        "script aborted at step #{} of {}: {}",
                        self.index,
                        self.script.len(),
                        reason
                    );
                    self.state = SchedulerState::Aborted;
                    self.suspension = None;
                    self.bound_channel = None;
                    self.write_outs.clear();
                    self.event_outs.push_back(SchedulerEvent::Aborted(reason));
                }
            }
        }
        Ok(())
    }

    fn poll_event(&mut self) -> Option<Self::Eout> {
        self.event_outs.pop_front()
    }

    fn handle_timeout(&mut self, now: Instant) -> Result<()> {
        if let Some(Suspension::Timer(deadline)) = self.suspension {
            if now >= deadline {
                self.satisfy(None);
                self.advance(now);
            }
        }
        Ok(())
    }

    fn poll_timeout(&mut self) -> Option<Instant> {
        match self.suspension {
            Some(Suspension::Timer(deadline)) if self.is_running() => Some(deadline),
            _ => None,
        }
    }

    /// Cancels the script: pending timers and waits are dropped and queued
    /// sends are discarded.
    fn close(&mut self) -> Result<()> {
        if self.is_running() {
            debug!("script cancelled at step #{}", self.index);
            self.state = SchedulerState::Cancelled;
            self.suspension = None;
            self.bound_channel = None;
            self.write_outs.clear();
            self.event_outs.push_back(SchedulerEvent::Cancelled);
        }
        Ok(())
    }
}
