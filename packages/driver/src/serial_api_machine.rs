/// The outcome of driving one command through the Serial API
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerialApiMachineResult {
    Success,
    AckTimeout,
    CAN,
    NAK,
    ResponseTimeout,
    ResponseNOK,
    CallbackTimeout,
    CallbackNOK,
}

impl SerialApiMachineResult {
    /// Whether retrying the frame may help. Only link-level failures are
    /// worth another attempt; timeouts further up mean the controller heard
    /// us but something else went wrong.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::AckTimeout | Self::CAN | Self::NAK)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerialApiMachineState {
    Initial,
    Sending,
    WaitForAck,
    WaitForResponse,
    WaitForCallback,
    Done(SerialApiMachineResult),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerialApiMachineInput {
    FrameSent,
    Ack,
    Nak,
    Can,
    /// A matching response arrived; the flag tells whether it was positive
    Response(bool),
    /// A matching terminal callback arrived
    Callback(bool),
    Timeout,
}

/// The request/ACK/response/callback state machine for a single attempt of
/// one Serial API command. It is pure: the executor feeds it inputs and
/// timer expirations and reads the state back.
#[derive(Debug)]
pub struct SerialApiMachine {
    state: SerialApiMachineState,
    expects_response: bool,
    expects_callback: bool,
}

impl SerialApiMachine {
    pub fn new(expects_response: bool, expects_callback: bool) -> Self {
        Self {
            state: SerialApiMachineState::Initial,
            expects_response,
            expects_callback,
        }
    }

    pub fn state(&self) -> SerialApiMachineState {
        self.state
    }

    pub fn start(&mut self) {
        debug_assert_eq!(self.state, SerialApiMachineState::Initial);
        self.state = SerialApiMachineState::Sending;
    }

    pub fn done(&self) -> Option<SerialApiMachineResult> {
        match self.state {
            SerialApiMachineState::Done(result) => Some(result),
            _ => None,
        }
    }

    /// After a successful ACK (or response), which state comes next
    fn after_ack(&self) -> SerialApiMachineState {
        if self.expects_response {
            SerialApiMachineState::WaitForResponse
        } else if self.expects_callback {
            SerialApiMachineState::WaitForCallback
        } else {
            SerialApiMachineState::Done(SerialApiMachineResult::Success)
        }
    }

    fn after_response(&self) -> SerialApiMachineState {
        if self.expects_callback {
            SerialApiMachineState::WaitForCallback
        } else {
            SerialApiMachineState::Done(SerialApiMachineResult::Success)
        }
    }

    /// Advances the machine. Returns the new state, or `None` when the
    /// input does not apply in the current state and was ignored.
    pub fn transition(&mut self, input: SerialApiMachineInput) -> Option<SerialApiMachineState> {
        use SerialApiMachineInput as I;
        use SerialApiMachineResult as R;
        use SerialApiMachineState as S;

        let next = match (self.state, input) {
            (S::Sending, I::FrameSent) => S::WaitForAck,

            (S::WaitForAck, I::Ack) => self.after_ack(),
            (S::WaitForAck, I::Nak) => S::Done(R::NAK),
            (S::WaitForAck, I::Can) => S::Done(R::CAN),
            (S::WaitForAck, I::Timeout) => S::Done(R::AckTimeout),

            (S::WaitForResponse, I::Response(true)) => self.after_response(),
            (S::WaitForResponse, I::Response(false)) => S::Done(R::ResponseNOK),
            (S::WaitForResponse, I::Timeout) => S::Done(R::ResponseTimeout),
            // A CAN here means our frame collided after all; treat it like
            // a NAK on the frame we sent
            (S::WaitForResponse, I::Can) => S::Done(R::CAN),

            (S::WaitForCallback, I::Callback(true)) => S::Done(R::Success),
            (S::WaitForCallback, I::Callback(false)) => S::Done(R::CallbackNOK),
            (S::WaitForCallback, I::Timeout) => S::Done(R::CallbackTimeout),

            _ => return None,
        };

        self.state = next;
        Some(next)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use SerialApiMachineInput as I;
    use SerialApiMachineResult as R;
    use SerialApiMachineState as S;

    fn drive(machine: &mut SerialApiMachine, inputs: &[I]) {
        machine.start();
        for input in inputs {
            machine.transition(*input);
        }
    }

    #[test]
    fn test_happy_path_with_response_and_callback() {
        let mut machine = SerialApiMachine::new(true, true);
        drive(
            &mut machine,
            &[I::FrameSent, I::Ack, I::Response(true), I::Callback(true)],
        );
        assert_eq!(machine.done(), Some(R::Success));
    }

    #[test]
    fn test_response_only() {
        let mut machine = SerialApiMachine::new(true, false);
        drive(&mut machine, &[I::FrameSent, I::Ack, I::Response(true)]);
        assert_eq!(machine.done(), Some(R::Success));
    }

    #[test]
    fn test_ack_only() {
        let mut machine = SerialApiMachine::new(false, false);
        drive(&mut machine, &[I::FrameSent, I::Ack]);
        assert_eq!(machine.done(), Some(R::Success));
    }

    #[test]
    fn test_nak_fails_attempt() {
        let mut machine = SerialApiMachine::new(true, false);
        drive(&mut machine, &[I::FrameSent, I::Nak]);
        assert_eq!(machine.done(), Some(R::NAK));
        assert!(machine.done().unwrap().is_retryable());
    }

    #[test]
    fn test_ack_timeout() {
        let mut machine = SerialApiMachine::new(true, false);
        drive(&mut machine, &[I::FrameSent, I::Timeout]);
        assert_eq!(machine.done(), Some(R::AckTimeout));
    }

    #[test]
    fn test_can_during_wait_for_response_behaves_like_nak() {
        let mut machine = SerialApiMachine::new(true, false);
        drive(&mut machine, &[I::FrameSent, I::Ack, I::Can]);
        assert_eq!(machine.done(), Some(R::CAN));
        assert!(machine.done().unwrap().is_retryable());
    }

    #[test]
    fn test_negative_response() {
        let mut machine = SerialApiMachine::new(true, true);
        drive(&mut machine, &[I::FrameSent, I::Ack, I::Response(false)]);
        assert_eq!(machine.done(), Some(R::ResponseNOK));
        assert!(!machine.done().unwrap().is_retryable());
    }

    #[test]
    fn test_unexpected_inputs_are_ignored() {
        let mut machine = SerialApiMachine::new(true, false);
        machine.start();
        assert_eq!(machine.transition(I::Response(true)), None);
        machine.transition(I::FrameSent);
        assert_eq!(machine.state(), S::WaitForAck);
    }
}
