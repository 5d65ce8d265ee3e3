#[cfg(test)]
mod service_test;

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Instant;

use log::{error, info, warn};
use rtc::peer_connection::sdp::RTCSessionDescription;
use tokio::net::UdpSocket;
use tokio::sync::{broadcast, oneshot, watch};

use crate::config::MockRtcConfig;
use crate::error::{Error, Result};
use crate::scheduler::{SchedulerState, StepScheduler};
use crate::session::{NegotiationAdapter, driver};
use crate::step::PeerScript;

#[derive(Default)]
struct Sessions {
    stopped: bool,
    handles: Vec<thread::JoinHandle<()>>,
}

/// State shared by a running [`MockRtc`] and the peers it built.
struct Service {
    config: MockRtcConfig,
    stop_tx: broadcast::Sender<()>,
    sessions: Mutex<Sessions>,
}

impl Service {
    fn new(config: MockRtcConfig) -> Self {
        let (stop_tx, _) = broadcast::channel(1);
        Self {
            config,
            stop_tx,
            sessions: Mutex::new(Sessions::default()),
        }
    }

    /// Spawns a session thread unless the service has been stopped. The stop
    /// receiver is taken under the same lock `stop` uses, so a session is either
    /// refused or guaranteed to observe the stop.
    fn spawn_session(
        &self,
        offer: RTCSessionDescription,
        script: PeerScript,
        answer_tx: oneshot::Sender<Result<RTCSessionDescription>>,
        state_tx: watch::Sender<SchedulerState>,
    ) -> Result<()> {
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        if sessions.stopped {
            return Err(Error::ErrServiceNotRunning);
        }

        let config = self.config.clone();
        let stop_rx = self.stop_tx.subscribe();
        let handle = thread::Builder::new()
            .name("rtc-mock-session".to_owned())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(err) => {
                        let _ = answer_tx.send(Err(err.into()));
                        return;
                    }
                };
                runtime.block_on(async move {
                    if let Err(err) =
                        run_session(config, offer, script, answer_tx, stop_rx, state_tx).await
                    {
                        error!("peer session exited with error: {}", err);
                    }
                });
            })?;
        sessions.handles.push(handle);

        Ok(())
    }

    fn stop(&self) -> usize {
        let handles = {
            let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
            sessions.stopped = true;
            std::mem::take(&mut sessions.handles)
        };

        // no receivers just means no session is alive
        let _ = self.stop_tx.send(());

        let count = handles.len();
        for handle in handles {
            if handle.join().is_err() {
                warn!("peer session thread panicked");
            }
        }
        count
    }
}

/// Binds the session socket, negotiates, reports the answer and then drives the
/// session until it ends or the service stops.
async fn run_session(
    config: MockRtcConfig,
    offer: RTCSessionDescription,
    script: PeerScript,
    answer_tx: oneshot::Sender<Result<RTCSessionDescription>>,
    stop_rx: broadcast::Receiver<()>,
    state_tx: watch::Sender<SchedulerState>,
) -> Result<()> {
    let socket = match UdpSocket::bind(SocketAddr::new(config.bind_address, 0)).await {
        Ok(socket) => socket,
        Err(err) => {
            let _ = answer_tx.send(Err(err.into()));
            return Ok(());
        }
    };
    let local_addr = socket.local_addr()?;

    let adapter = NegotiationAdapter::new(config.clone());
    let (session, answer) = match adapter.answer_offer(offer, local_addr) {
        Ok(negotiated) => negotiated,
        Err(err) => {
            let _ = answer_tx.send(Err(err));
            return Ok(());
        }
    };

    info!(
        "peer session {} running script of {} step(s)",
        local_addr,
        script.len()
    );
    let scheduler = StepScheduler::new(script, Instant::now());
    state_tx.send_replace(scheduler.state());

    if answer_tx.send(Ok(answer)).is_err() {
        warn!("answer for peer session {} was not awaited", local_addr);
    }

    driver::run(
        socket,
        session,
        scheduler,
        stop_rx,
        state_tx,
        config.receive_buffer_size,
    )
    .await
}

/// MockRtc is the service that hosts scripted mock peers.
///
/// Each answered offer gets its own session thread with its own UDP socket.
/// [`MockRtc::stop`] tears all of them down and waits for them to finish.
pub struct MockRtc {
    config: MockRtcConfig,
    service: Option<Arc<Service>>,
}

impl Default for MockRtc {
    fn default() -> Self {
        Self::new(MockRtcConfig::default())
    }
}

impl MockRtc {
    pub fn new(config: MockRtcConfig) -> Self {
        Self {
            config,
            service: None,
        }
    }

    pub fn config(&self) -> &MockRtcConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.service.is_some()
    }

    pub fn start(&mut self) -> Result<()> {
        if self.service.is_some() {
            return Err(Error::ErrServiceAlreadyRunning);
        }
        self.service = Some(Arc::new(Service::new(self.config.clone())));
        info!("mock rtc service started on {}", self.config.bind_address);
        Ok(())
    }

    /// Stops the service: every live session is cancelled and closed, and this
    /// call returns once all of them are torn down. Stopping a service that is
    /// not running does nothing.
    pub fn stop(&mut self) -> Result<()> {
        if let Some(service) = self.service.take() {
            let count = service.stop();
            info!("mock rtc service stopped, {} session(s) torn down", count);
        }
        Ok(())
    }

    /// Builds a mock peer that will run `script` against the first offer it
    /// answers.
    pub fn build_peer(&self, script: PeerScript) -> Result<MockPeer> {
        let service = self.service.clone().ok_or(Error::ErrServiceNotRunning)?;
        Ok(MockPeer {
            service,
            script: Some(script),
            state_rx: None,
        })
    }
}

impl Drop for MockRtc {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            warn!("mock rtc service stop on drop: {}", err);
        }
    }
}

/// MockPeer is the handle to one scripted peer.
pub struct MockPeer {
    service: Arc<Service>,
    script: Option<PeerScript>,
    state_rx: Option<watch::Receiver<SchedulerState>>,
}

impl MockPeer {
    /// Answers a remote offer and starts the script against the resulting
    /// session. The script starts running as soon as the answer is created,
    /// while the transport is still being established.
    ///
    /// A peer answers one offer only; later calls fail with
    /// [`Error::ErrScriptAlreadyBound`].
    pub async fn answer_offer(
        &mut self,
        offer: RTCSessionDescription,
    ) -> Result<RTCSessionDescription> {
        let script = self.script.take().ok_or(Error::ErrScriptAlreadyBound)?;

        let (answer_tx, answer_rx) = oneshot::channel();
        let (state_tx, state_rx) = watch::channel(SchedulerState::Running);
        if let Err(err) = self
            .service
            .spawn_session(offer, script.clone(), answer_tx, state_tx)
        {
            self.script = Some(script);
            return Err(err);
        }
        self.state_rx = Some(state_rx);

        answer_rx.await.map_err(|_| {
            Error::ErrNegotiation("peer session exited before answering".to_owned())
        })?
    }

    /// State of the bound script, or `None` before an offer was answered.
    pub fn scheduler_state(&self) -> Option<SchedulerState> {
        self.state_rx.as_ref().map(|rx| *rx.borrow())
    }

    /// Waits until the bound script stops running and returns how it ended.
    /// Returns `None` if no offer was answered.
    pub async fn finished(&mut self) -> Option<SchedulerState> {
        let rx = self.state_rx.as_mut()?;
        if let Ok(state) = rx
            .wait_for(|state| *state != SchedulerState::Running)
            .await
        {
            return Some(*state);
        }
        // the session thread is gone, report whatever it published last
        let state = *rx.borrow();
        Some(state)
    }
}
