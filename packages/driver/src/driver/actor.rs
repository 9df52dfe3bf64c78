use super::{Driver, DriverInput, ScheduledPoll};
use crate::awaited::AwaitedRegistry;
use crate::error::Error;
use crate::events::DriverEvent;
use crate::queue::TransactionQueue;
use crate::serial_api_machine::{
    SerialApiMachine, SerialApiMachineInput, SerialApiMachineResult, SerialApiMachineState,
};
use crate::transaction::{Transaction, TransactionResult};
use bytes::Bytes;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use zwh_cc::prelude::*;
use zwh_core::prelude::*;
use zwh_core::security::random_entropy;
use zwh_core::serialize::Serializable;
use zwh_core::util::MaybeSleep;
use zwh_core::wrapping_counter::WrappingCounter;
use zwh_logging::Direction;
use zwh_serial::command::{Command, SendDataCallback, SendDataRequest};
use zwh_serial::command_raw::CommandRaw;
use zwh_serial::frame::{ControlFlow, RawSerialFrame};

struct ActiveTransaction {
    transaction: Transaction,
    machine: SerialApiMachine,
    /// When the current machine state times out
    deadline: Option<Instant>,
    /// Set while waiting to retry after CAN/NAK/ACK timeout
    backoff_until: Option<Instant>,
    /// 1-based attempt counter, drives the backoff curve
    attempt: u8,
    route_reset_applied: bool,
    response: Option<Command>,
    callback: Option<Command>,
}

struct PendingPoll {
    value_id: EndpointValueId,
    at: Instant,
    node_id: NodeId,
    command: CC,
}

enum Wake {
    Input(Option<DriverInput>),
    Frame(Option<RawSerialFrame>),
    Timer,
}

/// The single-writer scheduler: owns the send queue, the in-flight
/// transaction, the awaited registries and all timers. Everything else
/// talks to it through channels.
pub(crate) struct DriverActor {
    driver: Driver,
    input_rx: mpsc::UnboundedReceiver<DriverInput>,
    frame_rx: mpsc::UnboundedReceiver<RawSerialFrame>,
    write_tx: mpsc::UnboundedSender<RawSerialFrame>,
    event_tx: mpsc::UnboundedSender<DriverEvent>,

    queue: TransactionQueue,
    active: Option<ActiveTransaction>,
    awaited_ccs: AwaitedRegistry<WithAddress<CC>>,
    callback_ids: WrappingCounter<u8>,
    polls: Vec<PendingPoll>,
    ts_sessions: HashMap<(NodeId, u8), TransportServiceSession>,
}

impl DriverActor {
    pub fn new(
        driver: Driver,
        input_rx: mpsc::UnboundedReceiver<DriverInput>,
        frame_rx: mpsc::UnboundedReceiver<RawSerialFrame>,
        write_tx: mpsc::UnboundedSender<RawSerialFrame>,
        event_tx: mpsc::UnboundedSender<DriverEvent>,
    ) -> Self {
        Self {
            driver,
            input_rx,
            frame_rx,
            write_tx,
            event_tx,
            queue: TransactionQueue::new(),
            active: None,
            awaited_ccs: AwaitedRegistry::default(),
            callback_ids: WrappingCounter::new(),
            polls: Vec::new(),
            ts_sessions: HashMap::new(),
        }
    }

    pub async fn run(mut self) {
        loop {
            self.try_send_next();

            let sleep = MaybeSleep::new(
                self.next_deadline()
                    .map(|d| d.saturating_duration_since(Instant::now())),
            );
            let wake = tokio::select! {
                biased;

                input = self.input_rx.recv() => Wake::Input(input),
                frame = self.frame_rx.recv() => Wake::Frame(frame),
                _ = sleep => Wake::Timer,
            };

            match wake {
                Wake::Input(Some(input)) => {
                    if self.handle_input(input) {
                        break;
                    }
                }
                Wake::Input(None) => {
                    self.shutdown();
                    break;
                }
                Wake::Frame(Some(frame)) => self.handle_frame(frame),
                Wake::Frame(None) => {
                    self.transport_closed();
                    break;
                }
                Wake::Timer => self.handle_timeouts(),
            }
        }
    }

    fn emit(&self, event: DriverEvent) {
        let _ = self.event_tx.send(event);
    }

    fn write_frame(&self, frame: RawSerialFrame) {
        let _ = self.write_tx.send(frame);
    }

    fn next_deadline(&self) -> Option<Instant> {
        let active = self.active.as_ref().and_then(|a| {
            a.backoff_until.or(a.deadline)
        });
        [
            active,
            self.awaited_ccs.next_deadline(),
            self.polls.iter().map(|p| p.at).min(),
        ]
        .into_iter()
        .flatten()
        .min()
    }

    // --- Send path ---------------------------------------------------------

    fn try_send_next(&mut self) {
        if self.active.is_some() {
            return;
        }
        let Some(transaction) = self.queue.pop_next() else {
            return;
        };
        self.begin_send(transaction, 1, false);
    }

    fn begin_send(&mut self, mut transaction: Transaction, attempt: u8, route_reset: bool) {
        if route_reset {
            if let Some(send_data) = transaction.payload.as_send_data_mut() {
                send_data.transmit_options = TransmitOptions::route_reset();
            }
        }
        {
            let command = transaction.payload.command_mut();
            if command.needs_callback_id() && command.callback_id().is_none() {
                command.set_callback_id(Some(self.callback_ids.increment()));
            }
        }

        let ctx = self.driver.encoding_context();
        let command = transaction.payload.command();
        let raw = command.as_raw(&ctx);

        let function_name = format!("{:?}", command.function_type());
        match transaction.node_id {
            Some(node_id) => self
                .driver
                .storage
                .node_log(node_id, EndpointIndex::Root)
                .outbound(&function_name, command.to_log_payload()),
            None => self
                .driver
                .storage
                .controller_log()
                .outbound(&function_name, command.to_log_payload()),
        }

        let mut machine =
            SerialApiMachine::new(command.expects_response(), command.expects_callback());
        machine.start();

        self.write_frame(RawSerialFrame::Data(raw.as_bytes()));
        machine.transition(SerialApiMachineInput::FrameSent);

        self.active = Some(ActiveTransaction {
            transaction,
            machine,
            deadline: Some(Instant::now() + self.driver.storage.options.timeouts.ack),
            backoff_until: None,
            attempt,
            route_reset_applied: route_reset,
            response: None,
            callback: None,
        });
    }

    /// Backoff before the next attempt: 100 ms times the square of the
    /// attempt number, plus up to 100 ms of jitter to avoid lockstep with
    /// the controller
    fn retry_backoff(attempt: u8) -> Duration {
        let base = 100u64 * (attempt as u64) * (attempt as u64);
        let mut jitter = [0u8; 1];
        let _ = getrandom::getrandom(&mut jitter);
        Duration::from_millis(base + (jitter[0] % 100) as u64)
    }

    fn advance_active(&mut self, input: SerialApiMachineInput) {
        let timeouts = self.driver.storage.options.timeouts;
        let new_state = {
            let Some(active) = &mut self.active else {
                return;
            };
            let Some(new_state) = active.machine.transition(input) else {
                return;
            };
            match new_state {
                SerialApiMachineState::WaitForResponse => {
                    active.deadline = Some(Instant::now() + timeouts.response);
                }
                SerialApiMachineState::WaitForCallback => {
                    active.deadline =
                        Some(Instant::now() + active.transaction.callback_timeout(&timeouts));
                }
                _ => {}
            }
            new_state
        };

        if let SerialApiMachineState::Done(result) = new_state {
            self.finish_active(result);
        }
    }

    fn finish_active(&mut self, result: SerialApiMachineResult) {
        let Some(mut active) = self.active.take() else {
            return;
        };

        match result {
            SerialApiMachineResult::Success => {
                let node_id = active.transaction.node_id;
                let puts_to_sleep = active.transaction.puts_node_to_sleep;
                active.transaction.resolve(Ok(TransactionResult {
                    response: active.response.take(),
                    callback: active.callback.take(),
                }));
                self.after_transaction_complete(node_id, puts_to_sleep);
            }
            result if result.is_retryable() => {
                if active.transaction.attempts_left > 1 {
                    active.transaction.attempts_left -= 1;
                    active.deadline = None;
                    active.backoff_until = Some(Instant::now() + Self::retry_backoff(active.attempt));
                    self.driver.storage.driver_log().debug(|| {
                        format!(
                            "attempt {} failed ({:?}), retrying after backoff",
                            active.attempt, result
                        )
                    });
                    self.active = Some(active);
                } else {
                    let error = match result {
                        SerialApiMachineResult::AckTimeout => Error::AckTimeout,
                        _ => Error::CanNak,
                    };
                    active.transaction.resolve(Err(error));
                }
            }
            SerialApiMachineResult::ResponseTimeout => {
                active.transaction.resolve(Err(Error::ResponseTimeout));
            }
            SerialApiMachineResult::ResponseNOK => {
                active.transaction.resolve(Err(Error::ResponseNok));
            }
            SerialApiMachineResult::CallbackTimeout => {
                active.transaction.resolve(Err(Error::CallbackTimeout));
            }
            SerialApiMachineResult::CallbackNOK => {
                active.transaction.resolve(Err(Error::CallbackNok));
            }
            // Covered by is_retryable above
            SerialApiMachineResult::AckTimeout
            | SerialApiMachineResult::CAN
            | SerialApiMachineResult::NAK => unreachable!(),
        }
    }

    fn after_transaction_complete(&mut self, node_id: Option<NodeId>, puts_to_sleep: bool) {
        let Some(node_id) = node_id else {
            return;
        };
        if puts_to_sleep {
            self.mark_node_asleep(node_id);
            return;
        }
        let sleep_capable = self
            .driver
            .storage
            .read_node(node_id, |n| !n.is_listening())
            .unwrap_or(false);
        if !sleep_capable {
            return;
        }
        if self.queue.has_pending_for_node(node_id) {
            // The next parked transaction may go out now
            self.queue.release_next_for_node(node_id);
        } else {
            self.enqueue_no_more_information(node_id);
        }
    }

    fn enqueue_no_more_information(&mut self, node_id: NodeId) {
        let request = SendDataRequest::builder()
            .node_id(node_id)
            .command(WakeUpCCNoMoreInformation::default().into())
            .build();
        let (mut transaction, _rx) = Transaction::send_data(
            request,
            crate::transaction::Priority::WakeUp,
            self.driver.storage.options.attempts.send_data,
        );
        // Fire and forget
        transaction.promise = None;
        transaction.puts_node_to_sleep = true;
        self.queue.enqueue(transaction, false);
    }

    fn mark_node_asleep(&mut self, node_id: NodeId) {
        let changed = self
            .driver
            .storage
            .modify_node(node_id, |n| {
                let changed = n.awake;
                n.awake = false;
                changed
            })
            .unwrap_or(false);
        if changed {
            self.emit(DriverEvent::NodeAsleep { node_id });
        }
    }

    fn mark_node_awake(&mut self, node_id: NodeId) {
        let woke_up = self
            .driver
            .storage
            .modify_node(node_id, |n| {
                if n.is_listening() || n.awake {
                    false
                } else {
                    n.awake = true;
                    true
                }
            })
            .unwrap_or(false);
        if woke_up {
            self.emit(DriverEvent::NodeAwake { node_id });
            self.queue.release_next_for_node(node_id);
        }
    }

    // --- Inputs ------------------------------------------------------------

    /// Returns `true` when the actor should stop
    fn handle_input(&mut self, input: DriverInput) -> bool {
        match input {
            DriverInput::Enqueue { transaction } => {
                let node_asleep = transaction
                    .node_id
                    .and_then(|node_id| self.driver.storage.read_node(node_id, |n| n.is_asleep()))
                    .unwrap_or(false);
                self.queue.enqueue(transaction, node_asleep);
                false
            }
            DriverInput::AwaitCC {
                predicate,
                timeout,
                callback,
            } => {
                self.awaited_ccs
                    .add(predicate, timeout.map(|t| Instant::now() + t), callback);
                false
            }
            DriverInput::SchedulePoll { poll } => {
                let ScheduledPoll {
                    value_id,
                    node_id,
                    command,
                    delay,
                } = poll;
                self.polls.push(PendingPoll {
                    value_id,
                    at: Instant::now() + delay,
                    node_id,
                    command,
                });
                false
            }
            DriverInput::Shutdown { callback } => {
                self.shutdown();
                let _ = callback.send(());
                true
            }
        }
    }

    fn handle_timeouts(&mut self) {
        let now = Instant::now();

        let retry_now = self
            .active
            .as_ref()
            .and_then(|a| a.backoff_until)
            .map(|b| now >= b)
            .unwrap_or(false);
        if retry_now {
            let active = self.active.take().expect("checked above");
            self.begin_send(
                active.transaction,
                active.attempt + 1,
                active.route_reset_applied,
            );
        } else {
            let deadline_hit = self
                .active
                .as_ref()
                .filter(|a| a.backoff_until.is_none())
                .and_then(|a| a.deadline)
                .map(|d| now >= d)
                .unwrap_or(false);
            if deadline_hit {
                self.advance_active(SerialApiMachineInput::Timeout);
            }
        }

        self.awaited_ccs.expire(now);

        // Fire verification polls that are due
        let due: Vec<PendingPoll> = {
            let (due, rest) = std::mem::take(&mut self.polls)
                .into_iter()
                .partition(|p| now >= p.at);
            self.polls = rest;
            due
        };
        for poll in due {
            let request = SendDataRequest::builder()
                .node_id(poll.node_id)
                .command(poll.command)
                .build();
            let (mut transaction, _rx) = Transaction::send_data(
                request,
                crate::transaction::Priority::Poll,
                self.driver.storage.options.attempts.send_data,
            );
            transaction.promise = None;
            let node_asleep = self
                .driver
                .storage
                .read_node(poll.node_id, |n| n.is_asleep())
                .unwrap_or(false);
            self.queue.enqueue(transaction, node_asleep);
        }
    }

    // --- Frames ------------------------------------------------------------

    fn handle_frame(&mut self, frame: RawSerialFrame) {
        match frame {
            RawSerialFrame::ControlFlow(cf) => self.handle_control_flow(cf),
            RawSerialFrame::Data(data) => self.handle_data_frame(data),
            // Already logged at the serial layer
            RawSerialFrame::Garbage(_) => {}
        }
    }

    fn handle_control_flow(&mut self, cf: ControlFlow) {
        let input = {
            let Some(active) = &self.active else {
                return;
            };
            if active.backoff_until.is_some() {
                return;
            }
            match (active.machine.state(), cf) {
                (SerialApiMachineState::WaitForAck, ControlFlow::ACK) => {
                    SerialApiMachineInput::Ack
                }
                (SerialApiMachineState::WaitForAck, ControlFlow::NAK) => {
                    SerialApiMachineInput::Nak
                }
                (SerialApiMachineState::WaitForAck, ControlFlow::CAN) => {
                    SerialApiMachineInput::Can
                }
                // A CAN while waiting for the response means our frame
                // collided with one from the controller
                (SerialApiMachineState::WaitForResponse, ControlFlow::CAN) => {
                    SerialApiMachineInput::Can
                }
                _ => return,
            }
        };
        self.advance_active(input);
    }

    fn handle_data_frame(&mut self, data: Bytes) {
        let mut input = data;
        let raw = match CommandRaw::parse(&mut input) {
            Ok(raw) => raw,
            Err(e) => {
                // Corrupt frame: answer NAK so the controller retransmits
                self.driver
                    .storage
                    .driver_log()
                    .warn(|| format!("dropping invalid frame: {}", e));
                self.write_frame(RawSerialFrame::ControlFlow(ControlFlow::NAK));
                return;
            }
        };

        // The frame is sound; acknowledge it before interpreting further
        self.write_frame(RawSerialFrame::ControlFlow(ControlFlow::ACK));

        let ctx = self.driver.parsing_context();
        match Command::try_from_raw(raw, &ctx) {
            Ok(command) => self.handle_command(command),
            Err(e) => {
                // Malformed content is dropped; the sender is not ours to fix
                self.driver
                    .storage
                    .driver_log()
                    .warn(|| format!("failed to interpret command: {}", e));
            }
        }
    }

    // --- Commands ----------------------------------------------------------

    fn handle_command(&mut self, command: Command) {
        enum Matched {
            Response(bool),
            Callback,
            No,
        }

        let matched = {
            match &self.active {
                Some(active) if active.backoff_until.is_none() => {
                    match active.machine.state() {
                        SerialApiMachineState::WaitForResponse
                            if active.transaction.payload.command().test_response(&command) =>
                        {
                            Matched::Response(command.is_ok())
                        }
                        SerialApiMachineState::WaitForCallback
                            if active.transaction.payload.command().test_callback(&command) =>
                        {
                            Matched::Callback
                        }
                        _ => Matched::No,
                    }
                }
                _ => Matched::No,
            }
        };

        match matched {
            Matched::Response(ok) => {
                self.driver.storage.controller_log().command(&command, Direction::Inbound);
                if let Some(active) = &mut self.active {
                    active.response = Some(command);
                }
                self.advance_active(SerialApiMachineInput::Response(ok));
            }
            Matched::Callback => {
                self.driver.storage.controller_log().command(&command, Direction::Inbound);
                self.handle_active_callback(command);
            }
            Matched::No => self.handle_unsolicited(command),
        }
    }

    fn handle_active_callback(&mut self, command: Command) {
        if let Command::SendDataCallback(callback) = &command {
            match callback.transmit_status {
                TransmitStatus::Ok => {
                    if let Some(active) = &mut self.active {
                        active.callback = Some(command);
                    }
                    self.advance_active(SerialApiMachineInput::Callback(true));
                }
                TransmitStatus::NoAck => self.handle_send_data_no_ack(callback.clone()),
                _ => {
                    if let Some(active) = &mut self.active {
                        active.callback = Some(command);
                    }
                    self.advance_active(SerialApiMachineInput::Callback(false));
                }
            }
            return;
        }

        let ok = command.is_ok();
        if let Some(active) = &mut self.active {
            active.callback = Some(command);
        }
        self.advance_active(SerialApiMachineInput::Callback(ok));
    }

    fn handle_send_data_no_ack(&mut self, _callback: SendDataCallback) {
        let Some(mut active) = self.active.take() else {
            return;
        };
        let Some(node_id) = active.transaction.node_id else {
            active.transaction.resolve(Err(Error::NodeTimeout));
            return;
        };

        let listening = self
            .driver
            .storage
            .read_node(node_id, |n| n.is_listening())
            .unwrap_or(true);

        if active.transaction.puts_node_to_sleep {
            // The good-night command went unanswered - the node is already
            // asleep, which is what we wanted to achieve anyway
            self.mark_node_asleep(node_id);
            active.transaction.resolve(Err(Error::NodeTimeout));
        } else if !listening {
            // The node dozed off; park the transaction until it wakes up
            self.mark_node_asleep(node_id);
            active.transaction.payload.command_mut().set_callback_id(None);
            self.queue.park(active.transaction);
        } else if !active.route_reset_applied {
            // One retry with a fresh route
            active.transaction.payload.command_mut().set_callback_id(None);
            let attempt = active.attempt + 1;
            self.begin_send(active.transaction, attempt, true);
        } else {
            active.transaction.resolve(Err(Error::NodeTimeout));
        }
    }

    // --- Unsolicited traffic ----------------------------------------------

    fn handle_unsolicited(&mut self, command: Command) {
        match command {
            Command::ApplicationCommandRequest(app) => {
                let address = app.command.address().clone();
                self.driver
                    .storage
                    .node_log(address.source_node_id, address.endpoint_index)
                    .command(
                        &Command::ApplicationCommandRequest(app.clone()),
                        Direction::Inbound,
                    );
                self.handle_application_cc(app.command);
            }
            Command::ApplicationUpdateRequest(update) => {
                self.driver.storage.controller_log().command(
                    &Command::ApplicationUpdateRequest(update.clone()),
                    Direction::Inbound,
                );
                self.handle_application_update(update);
            }
            Command::NotImplemented(raw) => {
                self.driver.storage.driver_log().debug(|| {
                    format!(
                        "dropping command with unknown function {:#04x}",
                        raw.function
                    )
                });
            }
            other => {
                self.driver
                    .storage
                    .controller_log()
                    .command(&other, Direction::Inbound);
                self.driver
                    .storage
                    .driver_log()
                    .debug(|| "dropping unexpected command".to_string());
            }
        }
    }

    fn handle_application_cc(&mut self, cc: WithAddress<CC>) {
        let source = cc.address().source_node_id;

        // Any traffic from a sleep-capable node means it is awake right now
        self.mark_node_awake(source);

        let normalized = normalize_cc(cc);

        match &*normalized {
            CC::SecurityCCNonceGet(_) => {
                self.answer_nonce_get(source);
                return;
            }
            CC::Security2CCNonceGet(_) => {
                self.answer_s2_nonce_get(source);
                return;
            }
            CC::TransportServiceCCFirstSegment(_)
            | CC::TransportServiceCCSubsequentSegment(_) => {
                self.handle_transport_service(normalized);
                return;
            }
            CC::SupervisionCCGet(_) => {
                self.handle_inbound_supervision(normalized);
                return;
            }
            _ => {}
        }

        self.persist_cc_values(&normalized);

        if let Some(callback) = self.awaited_ccs.take_matching(&normalized) {
            let _ = callback.send(Ok(normalized));
        }
    }

    fn handle_application_update(&mut self, update: zwh_serial::command::ApplicationUpdateRequest) {
        use zwh_serial::command::ApplicationUpdateStatus;

        if update.status != ApplicationUpdateStatus::NodeInfoReceived {
            return;
        }
        let (Some(node_id), Some(nif)) = (update.node_id, update.nif) else {
            return;
        };

        // An unsolicited NIF also counts as node activity
        self.mark_node_awake(node_id);

        self.driver.storage.modify_node(node_id, |node| {
            let root = node.root_mut();
            root.generic_device_class = nif.device_class.generic;
            root.specific_device_class = nif.device_class.specific;
            for cc in &nif.supported_ccs {
                root.modify_cc_info(*cc, |info| info.supported = true);
            }
            for cc in &nif.controlled_ccs {
                root.modify_cc_info(*cc, |info| info.controlled = true);
            }
        });
    }

    fn persist_cc_values(&mut self, cc: &WithAddress<CC>) {
        let address = cc.address();
        let node_id = address.source_node_id;
        let endpoint = address.endpoint_index;

        let written: Vec<EndpointValueId> = {
            let mut db = self.driver.storage.value_db_mut();
            for (value_id, metadata) in cc.to_metadata() {
                db.set_metadata(value_id.at(node_id, endpoint), metadata);
            }
            let values = cc.to_values();
            let mut written = Vec::with_capacity(values.len());
            for (value_id, value) in values {
                let id = value_id.at(node_id, endpoint);
                db.set(id, value);
                written.push(id);
            }
            written
        };

        // An unsolicited report supersedes any scheduled verification poll
        if !written.is_empty() {
            self.polls.retain(|p| !written.contains(&p.value_id));
        }
    }

    fn answer_nonce_get(&mut self, node_id: NodeId) {
        let Some(manager) = self.driver.storage.security_manager() else {
            return;
        };
        let nonce = manager.generate_nonce(node_id);
        self.enqueue_reply(node_id, SecurityCCNonceReport { nonce }.into());
    }

    fn answer_s2_nonce_get(&mut self, node_id: NodeId) {
        let Some(manager) = self.driver.storage.security_manager_s2() else {
            return;
        };
        let entropy = random_entropy();
        manager.set_local_entropy(node_id, entropy);
        self.enqueue_reply(
            node_id,
            Security2CCNonceReport {
                sequence_number: self.driver.storage.next_s2_sequence_number(),
                singlecast_out_of_sync: true,
                multicast_out_of_sync: false,
                receiver_entropy: Some(entropy),
            }
            .into(),
        );
    }

    fn handle_inbound_supervision(&mut self, cc: WithAddress<CC>) {
        let (address, command) = cc.split();
        let CC::SupervisionCCGet(get) = command else {
            return;
        };

        // Persist the values of the supervised command, then confirm
        let inner = WithAddress::new(address.clone(), (*get.encapsulated).clone());
        let inner = normalize_cc(inner);
        self.persist_cc_values(&inner);
        if let Some(callback) = self.awaited_ccs.take_matching(&inner) {
            let _ = callback.send(Ok(inner));
        }

        self.enqueue_reply(
            address.source_node_id,
            SupervisionCCReport::builder()
                .session_id(get.session_id)
                .status(SupervisionStatus::Success)
                .build()
                .into(),
        );
    }

    fn handle_transport_service(&mut self, cc: WithAddress<CC>) {
        let (address, command) = cc.split();
        let node_id = address.source_node_id;

        match command {
            CC::TransportServiceCCFirstSegment(segment) => {
                let session = TransportServiceSession::new(&segment);
                self.ts_sessions.insert((node_id, segment.session_id), session);
                self.finish_transport_session(node_id, segment.session_id, address);
            }
            CC::TransportServiceCCSubsequentSegment(segment) => {
                if let Some(session) = self.ts_sessions.get_mut(&(node_id, segment.session_id)) {
                    session.add(&segment);
                }
                self.finish_transport_session(node_id, segment.session_id, address);
            }
            _ => {}
        }
    }

    fn finish_transport_session(&mut self, node_id: NodeId, session_id: u8, address: CCAddress) {
        let Some(session) = self.ts_sessions.get(&(node_id, session_id)) else {
            return;
        };
        if !session.is_complete() {
            return;
        }

        let ctx = self.driver.cc_parsing_context(node_id);
        let assembled = session.assemble(&ctx);
        self.ts_sessions.remove(&(node_id, session_id));

        self.enqueue_reply(
            node_id,
            TransportServiceCCSegmentComplete { session_id }.into(),
        );

        match assembled {
            Ok(command) => {
                self.handle_application_cc(WithAddress::new(address, command));
            }
            Err(e) => {
                self.driver
                    .storage
                    .node_log(node_id, EndpointIndex::Root)
                    .warn(|| format!("failed to reassemble datagram: {}", e));
            }
        }
    }

    /// Enqueues a fire-and-forget reply to a node, e.g. a nonce report
    fn enqueue_reply(&mut self, node_id: NodeId, command: CC) {
        let request = SendDataRequest::builder()
            .node_id(node_id)
            .command(command)
            .build();
        let (mut transaction, _rx) = Transaction::send_data(
            request,
            crate::transaction::Priority::Controller,
            self.driver.storage.options.attempts.send_data,
        );
        // Fire and forget; replies go out even to "sleeping" nodes - they
        // just talked to us
        transaction.promise = None;
        self.queue.enqueue(transaction, false);
    }

    // --- Shutdown ----------------------------------------------------------

    fn shutdown(&mut self) {
        if let Some(mut active) = self.active.take() {
            active.transaction.resolve(Err(Error::Cancelled));
        }
        for mut transaction in self.queue.drain() {
            transaction.resolve(Err(Error::Cancelled));
        }
        self.awaited_ccs.clear();
        self.driver
            .storage
            .backend
            .lock()
            .expect("cache backend lock poisoned")
            .flush();
    }

    fn transport_closed(&mut self) {
        if let Some(mut active) = self.active.take() {
            active.transaction.resolve(Err(Error::TransportClosed));
        }
        for mut transaction in self.queue.drain() {
            transaction.resolve(Err(Error::TransportClosed));
        }
        self.awaited_ccs.clear();
        self.emit(DriverEvent::Error {
            message: Error::TransportClosed.to_string(),
        });
    }
}

/// Unwraps the encapsulation layers of an inbound CC, remapping the
/// endpoint for Multi Channel on the way
fn normalize_cc(mut cc: WithAddress<CC>) -> WithAddress<CC> {
    loop {
        let (mut address, command) = cc.split();
        let inner = match command {
            CC::MultiChannelCCCommandEncapsulation(encap) => {
                address.endpoint_index = EndpointIndex::new(encap.source_endpoint);
                *encap.encapsulated
            }
            CC::Crc16CCCommandEncapsulation(encap) => *encap.encapsulated,
            CC::SecurityCCCommandEncapsulation(encap) => *encap.encapsulated,
            CC::Security2CCMessageEncapsulation(encap) => *encap.encapsulated,
            command => return WithAddress::new(address, command),
        };
        cc = WithAddress::new(address, inner);
    }
}
