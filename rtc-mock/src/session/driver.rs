use std::time::{Duration, Instant};

use bytes::BytesMut;
use log::{debug, error, info, trace, warn};
use rtc::sansio::Protocol;
use rtc::shared::{TaggedBytesMut, TransportContext, TransportProtocol};
use tokio::net::UdpSocket;
use tokio::sync::{broadcast, watch};

use crate::error::{Error, Result};
use crate::scheduler::{
    SchedulerCommand, SchedulerEvent, SchedulerOutput, SchedulerState, StepScheduler,
};
use crate::session::{PeerSession, SessionState};

const DEFAULT_TIMEOUT_DURATION: Duration = Duration::from_secs(86400);

/// What the event loop does after the socket has been flushed.
#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Running,
    /// The script asked for the session to close. Sends queued ahead of the
    /// close must reach the socket first.
    CloseRequested,
    Ended,
}

/// Moves everything queued between the session and the scheduler until both
/// are quiet, or until the script asks for the session to be closed.
fn pump(
    session: &mut PeerSession,
    scheduler: &mut StepScheduler,
    state_tx: &watch::Sender<SchedulerState>,
) -> Result<Flow> {
    let mut close_requested = false;
    while !close_requested {
        let mut progressed = false;

        while let Some(state) = session.poll_event() {
            progressed = true;
            match state {
                SessionState::Failed => scheduler.handle_event(SchedulerCommand::Abort(
                    Error::ErrSessionFailed.to_string(),
                ))?,
                SessionState::Closed => scheduler
                    .handle_event(SchedulerCommand::Abort("peer session closed".to_owned()))?,
                _ => {}
            }
        }

        while let Some(event) = session.poll_read() {
            progressed = true;
            scheduler.handle_read(event)?;
        }

        while let Some(output) = scheduler.poll_write() {
            progressed = true;
            if output == SchedulerOutput::CloseSession {
                close_requested = true;
                break;
            }
            if let Err(err) = session.handle_write(output) {
                error!("peer session {}: {}", session.local_addr(), err);
                scheduler.handle_event(SchedulerCommand::Abort(err.to_string()))?;
            }
        }

        while let Some(event) = scheduler.poll_event() {
            progressed = true;
            match event {
                SchedulerEvent::StepActivated(index) => trace!("step #{index} activated"),
                SchedulerEvent::StepSatisfied(index) => trace!("step #{index} satisfied"),
                SchedulerEvent::Completed => {
                    info!("peer session {} script completed", session.local_addr())
                }
                SchedulerEvent::Aborted(reason) => {
                    warn!("peer session {} script aborted: {}", session.local_addr(), reason)
                }
                SchedulerEvent::Cancelled => {
                    debug!("peer session {} script cancelled", session.local_addr())
                }
            }
        }

        if !progressed {
            break;
        }
    }

    if *state_tx.borrow() != scheduler.state() {
        state_tx.send_replace(scheduler.state());
    }

    if session.state().is_terminal() {
        Ok(Flow::Ended)
    } else if close_requested {
        Ok(Flow::CloseRequested)
    } else {
        Ok(Flow::Running)
    }
}

fn handle_timeout(
    session: &mut PeerSession,
    scheduler: &mut StepScheduler,
    now: Instant,
) -> Result<()> {
    session.handle_timeout(now)?;
    scheduler.handle_timeout(now)
}

async fn flush(socket: &UdpSocket, session: &mut PeerSession) {
    while let Some(msg) = session.poll_write() {
        match socket.send_to(&msg.message, msg.transport.peer_addr).await {
            Ok(n) => {
                trace!("socket write to {} with bytes {}", msg.transport.peer_addr, n);
            }
            Err(err) => {
                error!("socket write to {} with error {}", msg.transport.peer_addr, err);
            }
        }
    }
}

/// Runs one peer session until its transport ends or a stop is broadcast.
///
/// The session and the scheduler are both sans-I/O; this loop owns the socket
/// and the clock and shuttles bytes, channel events and deadlines between them.
pub(crate) async fn run(
    socket: UdpSocket,
    mut session: PeerSession,
    mut scheduler: StepScheduler,
    mut stop_rx: broadcast::Receiver<()>,
    state_tx: watch::Sender<SchedulerState>,
    receive_buffer_size: usize,
) -> Result<()> {
    let local_addr = session.local_addr();
    let mut buf = vec![0; receive_buffer_size];

    'EventLoop: loop {
        let flow = pump(&mut session, &mut scheduler, &state_tx)?;
        flush(&socket, &mut session).await;
        match flow {
            Flow::Running => {}
            Flow::CloseRequested => {
                if let Err(err) = session.close_at(Instant::now()) {
                    warn!("peer session {} close: {}", local_addr, err);
                }
                continue;
            }
            Flow::Ended => {
                debug!("peer session {} ended as {}", local_addr, session.state());
                break 'EventLoop;
            }
        }

        let eto = [session.poll_timeout(), scheduler.poll_timeout()]
            .into_iter()
            .flatten()
            .min()
            .unwrap_or(Instant::now() + DEFAULT_TIMEOUT_DURATION);

        let delay_from_now = eto
            .checked_duration_since(Instant::now())
            .unwrap_or(Duration::from_secs(0));
        if delay_from_now.is_zero() {
            if let Err(err) = handle_timeout(&mut session, &mut scheduler, Instant::now()) {
                error!("peer session {} timeout error {}", local_addr, err);
                scheduler.handle_event(SchedulerCommand::Abort(err.to_string()))?;
                break 'EventLoop;
            }
            continue;
        }

        let timer = tokio::time::sleep(delay_from_now);
        tokio::pin!(timer);

        tokio::select! {
            biased;

            _ = stop_rx.recv() => {
                trace!("peer session {} received stop", local_addr);
                break 'EventLoop;
            }
            _ = timer.as_mut() => {
                if let Err(err) = handle_timeout(&mut session, &mut scheduler, Instant::now()) {
                    error!("peer session {} timeout error {}", local_addr, err);
                    scheduler.handle_event(SchedulerCommand::Abort(err.to_string()))?;
                    break 'EventLoop;
                }
            }
            res = socket.recv_from(&mut buf) => {
                match res {
                    Ok((n, peer_addr)) => {
                        trace!("socket read {} bytes from {}", n, peer_addr);
                        if let Err(err) = session.handle_read(TaggedBytesMut {
                            now: Instant::now(),
                            transport: TransportContext {
                                local_addr,
                                peer_addr,
                                ecn: None,
                                transport_protocol: TransportProtocol::UDP,
                            },
                            message: BytesMut::from(&buf[..n]),
                        }) {
                            warn!(
                                "peer session {} dropped datagram from {}: {}",
                                local_addr, peer_addr, err
                            );
                        }
                    }
                    Err(err) => {
                        error!("socket read error {}", err);
                        scheduler.handle_event(SchedulerCommand::Abort(err.to_string()))?;
                        break 'EventLoop;
                    }
                }
            }
        }
    }

    scheduler.close()?;
    if let Err(err) = session.close_at(Instant::now()) {
        warn!("peer session {} close: {}", local_addr, err);
    }
    flush(&socket, &mut session).await;
    if *state_tx.borrow() != scheduler.state() {
        state_tx.send_replace(scheduler.state());
    }
    info!("peer session {} torn down", local_addr);

    Ok(())
}
