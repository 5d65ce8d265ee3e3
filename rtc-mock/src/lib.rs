//! # rtc-mock - Scriptable Mock WebRTC Peers
//!
//! `rtc-mock` stands in for a remote WebRTC peer in integration tests. A test
//! describes how the mock peer should behave as an ordered script of steps,
//! hands it an SDP offer from the peer under test, and returns the mock's
//! answer. From then on the mock runs the script against the negotiated data
//! channels: it sleeps, waits for channels and messages, and sends payloads
//! back.
//!
//! The data channel stack is the sans-I/O [`rtc`] peer connection. Step
//! execution is itself a sans-I/O state machine, [`StepScheduler`], so the
//! scripting semantics can be tested without any network.
//!
//! ## Example
//!
//! ```no_run
//! use rtc_mock::{MockRtc, StepBuilder};
//! # async fn example(offer: rtc::peer_connection::sdp::RTCSessionDescription) -> rtc_mock::Result<()> {
//! let mut mock = MockRtc::default();
//! mock.start()?;
//!
//! let script = StepBuilder::new()
//!     .wait_for_message_on_channel("message-channel")
//!     .then_send("Goodbye")
//!     .build();
//!
//! let mut peer = mock.build_peer(script)?;
//! let answer = peer.answer_offer(offer).await?;
//! // hand `answer` back to the peer under test
//! # let _ = answer;
//!
//! mock.stop()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Channel targeting
//!
//! A send step does not name a channel. If the step before it waited for a
//! message or a channel, the send goes to that channel. Otherwise it goes to
//! every channel open at that moment, and if none is open yet it waits for the
//! first one.

#![warn(rust_2018_idioms)]

pub mod config;
pub mod error;
pub mod payload;
pub mod scheduler;
pub mod service;
pub mod session;
pub mod step;

pub use config::{MockRtcConfig, MockRtcConfigBuilder};
pub use error::{Error, Result};
pub use payload::Payload;
pub use scheduler::{SchedulerState, StepScheduler};
pub use service::{MockPeer, MockRtc};
pub use session::{NegotiationAdapter, PeerSession, SessionState};
pub use step::{PeerScript, Step, StepBuilder};
