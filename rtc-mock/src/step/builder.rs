use crate::payload::Payload;
use crate::step::{PeerScript, Step};

/// StepBuilder accumulates steps into a [`PeerScript`].
///
/// Building has no side effects: nothing touches the network or starts a timer
/// until the finished script is bound to a session.
///
/// ```
/// use rtc_mock::StepBuilder;
///
/// let script = StepBuilder::new()
///     .wait_for_message_on_channel("message-channel")
///     .then_send("delayed message")
///     .build();
/// assert_eq!(script.len(), 2);
/// ```
#[derive(Debug, Default, Clone)]
pub struct StepBuilder {
    steps: Vec<Step>,
}

impl StepBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep for `duration_ms` milliseconds before the next step runs.
    pub fn sleep(mut self, duration_ms: u64) -> Self {
        self.steps.push(Step::Sleep { duration_ms });
        self
    }

    /// Wait until any data channel receives a message. A following
    /// [`then_send`](Self::then_send) replies on that channel only.
    pub fn wait_for_message(mut self) -> Self {
        self.steps.push(Step::WaitForAnyMessage);
        self
    }

    /// Wait until the channel labelled `channel_label` receives a message.
    /// Messages on other channels are ignored.
    pub fn wait_for_message_on_channel(mut self, channel_label: impl Into<String>) -> Self {
        self.steps.push(Step::WaitForChannelMessage {
            channel_label: channel_label.into(),
        });
        self
    }

    /// Wait until at least one data channel is open.
    pub fn wait_for_any_channel(mut self) -> Self {
        self.steps.push(Step::WaitForChannel {
            channel_label: None,
        });
        self
    }

    /// Wait until the channel labelled `channel_label` is open.
    pub fn wait_for_channel(mut self, channel_label: impl Into<String>) -> Self {
        self.steps.push(Step::WaitForChannel {
            channel_label: Some(channel_label.into()),
        });
        self
    }

    /// Send `payload` on the channel bound by the preceding wait step, or on
    /// every open channel when there is none.
    pub fn then_send(mut self, payload: impl Into<Payload>) -> Self {
        self.steps.push(Step::Send {
            payload: payload.into(),
        });
        self
    }

    /// Echo every subsequent message back to its sender. Steps added after
    /// this one never run.
    pub fn then_echo(mut self) -> Self {
        self.steps.push(Step::Echo);
        self
    }

    /// Close the peer connection. Steps added after this one never run.
    pub fn then_close(mut self) -> Self {
        self.steps.push(Step::Close);
        self
    }

    pub fn build(self) -> PeerScript {
        PeerScript::new(self.steps)
    }
}
