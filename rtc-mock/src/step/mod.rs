
pub mod builder;

use std::fmt;
use std::slice::Iter;

use serde::{Deserialize, Serialize};

use crate::payload::Payload;

pub use builder::StepBuilder;

/// Step is one unit of scripted peer behavior.
///
/// Steps never name the channel a [`Step::Send`] targets: the target is resolved
/// by the scheduler when the send runs, from the wait step that preceded it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum Step {
    /// Suspend for a fixed time, counted from the moment the step becomes active.
    Sleep { duration_ms: u64 },
    /// Suspend until any data channel delivers a message.
    WaitForAnyMessage,
    /// Suspend until the channel with the given label delivers a message.
    WaitForChannelMessage { channel_label: String },
    /// Suspend until a data channel is open, optionally one with the given label.
    WaitForChannel { channel_label: Option<String> },
    /// Transmit a payload on the bound channel, or on every open channel.
    Send { payload: Payload },
    /// Echo every message received from here on back on its channel.
    Echo,
    /// Close the peer connection and end the script.
    Close,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Sleep { duration_ms } => write!(f, "sleep({duration_ms}ms)"),
            Step::WaitForAnyMessage => write!(f, "wait_for_message()"),
            Step::WaitForChannelMessage { channel_label } => {
                write!(f, "wait_for_message_on_channel('{channel_label}')")
            }
            Step::WaitForChannel {
                channel_label: Some(label),
            } => write!(f, "wait_for_channel('{label}')"),
            Step::WaitForChannel {
                channel_label: None,
            } => write!(f, "wait_for_any_channel()"),
            Step::Send { payload } => write!(f, "send({payload})"),
            Step::Echo => write!(f, "echo()"),
            Step::Close => write!(f, "close()"),
        }
    }
}

/// PeerScript is the ordered, immutable sequence of steps a mock peer runs
/// against one session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerScript {
    steps: Vec<Step>,
}

impl PeerScript {
    pub(crate) fn new(steps: Vec<Step>) -> Self {
        Self { steps }
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn get(&self, index: usize) -> Option<&Step> {
        self.steps.get(index)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn iter(&self) -> Iter<'_, Step> {
        self.steps.iter()
    }
}

impl<'a> IntoIterator for &'a PeerScript {
    type Item = &'a Step;
    type IntoIter = Iter<'a, Step>;

    fn into_iter(self) -> Self::IntoIter {
        self.steps.iter()
    }
}
