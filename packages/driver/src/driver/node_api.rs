use super::{Driver, DriverInput, ScheduledPoll};
use crate::error::{Error, Result};
use crate::transaction::{Priority, Transaction};
use std::time::Duration;
use typed_builder::TypedBuilder;
use zwh_cc::prelude::*;
use zwh_core::prelude::*;
use zwh_core::security::random_entropy;
use zwh_serial::command::SendDataRequest;

/// Awaits a pre-registered CC waiter, bounding the wait from the moment the
/// triggering command finished sending
async fn await_registered(
    rx: tokio::sync::oneshot::Receiver<Result<WithAddress<CC>>>,
    timeout: Duration,
) -> Result<WithAddress<CC>> {
    match tokio::time::timeout(timeout, rx).await {
        Ok(Ok(result)) => result,
        Ok(Err(_)) => Err(Error::ShuttingDown),
        Err(_elapsed) => Err(Error::Timeout),
    }
}

/// How a node command should be sent
#[derive(Clone, Copy, TypedBuilder)]
pub struct SendCommandOptions {
    #[builder(default)]
    pub endpoint_index: EndpointIndex,
    #[builder(default = Priority::Normal)]
    pub priority: Priority,
    /// Ask for supervision when the node supports it
    #[builder(default = true)]
    pub use_supervision: bool,
}

impl Default for SendCommandOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Driver {
    /// Pings a node with a NoOperation CC. Resolves once the node
    /// acknowledged the frame.
    pub async fn ping(&self, node_id: NodeId) -> Result<()> {
        self.exec_send_data(node_id, NoOperationCC::default().into(), Priority::Normal)
            .await
            .map(|_| ())
    }

    /// Sends a single already-encapsulated CC through the send queue
    pub(crate) async fn exec_send_data(
        &self,
        node_id: NodeId,
        command: CC,
        priority: Priority,
    ) -> Result<()> {
        let request = SendDataRequest::builder()
            .node_id(node_id)
            .command(command)
            .build();
        let (transaction, rx) =
            Transaction::send_data(request, priority, self.storage.options.attempts.send_data);
        self.send_input(DriverInput::Enqueue { transaction })?;
        rx.await.map_err(|_| Error::ShuttingDown)?.map(|_| ())
    }

    /// Runs the S0 nonce exchange with a node so the next secure frame can
    /// be encrypted
    async fn fetch_s0_nonce(&self, node_id: NodeId) -> Result<()> {
        let manager = self
            .storage
            .security_manager()
            .ok_or(Error::SecurityNonceMissing)?;
        let timeout = self.storage.options.timeouts.nonce;

        let rx = self.register_await_cc(
            Box::new(move |cc| {
                cc.address().source_node_id == node_id
                    && matches!(&**cc, CC::SecurityCCNonceReport(_))
            }),
            None,
        )?;
        self.exec_send_data(node_id, SecurityCCNonceGet::default().into(), Priority::Controller)
            .await?;
        let report = await_registered(rx, timeout)
            .await
            .map_err(|_| Error::SecurityNonceMissing)?;

        if let CC::SecurityCCNonceReport(report) = report.unwrap() {
            manager.set_nonce(node_id, self.storage.own_node_id(), report.nonce);
        }
        Ok(())
    }

    /// Makes sure a SPAN exists with the peer, running the S2 nonce
    /// exchange if necessary. Returns the entropy to attach to the next
    /// encapsulation when the SPAN was just established.
    async fn sync_s2_span(&self, node_id: NodeId) -> Result<Option<[u8; 16]>> {
        let manager = self
            .storage
            .security_manager_s2()
            .ok_or(Error::SecurityNonceMissing)?;
        if manager.has_span(node_id) {
            return Ok(None);
        }
        let timeout = self.storage.options.timeouts.nonce;

        let rx = self.register_await_cc(
            Box::new(move |cc| {
                cc.address().source_node_id == node_id
                    && matches!(&**cc, CC::Security2CCNonceReport(_))
            }),
            None,
        )?;
        self.exec_send_data(
            node_id,
            Security2CCNonceGet {
                sequence_number: self.storage.next_s2_sequence_number(),
            }
            .into(),
            Priority::Controller,
        )
        .await?;
        let report = await_registered(rx, timeout)
            .await
            .map_err(|_| Error::SecurityNonceMissing)?;

        let CC::Security2CCNonceReport(report) = report.unwrap() else {
            return Err(Error::SecurityNonceMissing);
        };
        let receiver_ei = report.receiver_entropy.ok_or(Error::SecurityNonceMissing)?;

        let security_class = self
            .storage
            .read_node(node_id, |n| n.security_class)
            .unwrap_or(SecurityClass::None);
        let sender_ei = random_entropy();
        manager.establish_span(node_id, security_class, &sender_ei, &receiver_ei);
        Ok(Some(sender_ei))
    }

    /// Sends a CC to a node, applying the full encapsulation pipeline, and
    /// waits for the expected response if the CC has one.
    ///
    /// Security failures are recovered once by resynchronizing the nonce
    /// state; a second failure fails the command.
    pub async fn send_node_command(
        &self,
        node_id: NodeId,
        command: CC,
        options: SendCommandOptions,
    ) -> Result<Option<WithAddress<CC>>> {
        match self
            .send_node_command_once(node_id, command.clone(), options)
            .await
        {
            Err(Error::SecurityNonceMissing) | Err(Error::SecurityMacFailed) => {
                // Resynchronize once, then retry
                if let Some(manager) = self.storage.security_manager_s2() {
                    manager.reset_span(node_id);
                }
                self.send_node_command_once(node_id, command, options).await
            }
            other => other,
        }
    }

    async fn send_node_command_once(
        &self,
        node_id: NodeId,
        command: CC,
        options: SendCommandOptions,
    ) -> Result<Option<WithAddress<CC>>> {
        let security_class = self
            .storage
            .read_node(node_id, |n| n.security_class)
            .unwrap_or(SecurityClass::None);
        let supports_supervision = self
            .storage
            .read_node(node_id, |n| n.supports_cc(CommandClasses::Supervision))
            .unwrap_or(false);

        let supervision_session_id = if options.use_supervision && supports_supervision {
            Some(self.storage.next_supervision_session())
        } else {
            None
        };

        // Security needs fresh nonce state before we can serialize
        let mut s2_entropy = None;
        match security_class {
            SecurityClass::S0Legacy => self.fetch_s0_nonce(node_id).await?,
            class if class.is_s2() => s2_entropy = self.sync_s2_span(node_id).await?,
            _ => {}
        }

        let expects_response = command.expects_response();
        let inner = command.clone();

        let encap_options = EncapsulationOptions::builder()
            .endpoint_index(options.endpoint_index)
            .supervision_session_id(supervision_session_id)
            .security_class(security_class)
            .s2_sequence_number(Some(self.storage.next_s2_sequence_number()))
            .segment_session_id(1)
            .build();
        let ctx = CCEncodingContext::builder()
            .own_node_id(self.storage.own_node_id())
            .node_id(node_id)
            .home_id(self.storage.home_id())
            .security_manager(self.storage.security_manager())
            .security_manager_s2(self.storage.security_manager_s2())
            .build();

        let mut encapsulated = encapsulate(command, &encap_options, &ctx);

        // A freshly established SPAN must be advertised to the peer
        if let (Some(entropy), EncapsulatedCC::Single(CC::Security2CCMessageEncapsulation(encap))) =
            (s2_entropy, &mut encapsulated)
        {
            encap.sender_entropy = Some(entropy);
        }

        // Register the waiter for the answer before anything goes out, so
        // a fast reply cannot slip past the scheduler
        let report_timeout = self.storage.options.timeouts.report;
        let response_rx = if let Some(session_id) = supervision_session_id {
            Some(self.register_await_cc(
                Box::new(move |cc| {
                    cc.address().source_node_id == node_id
                        && matches!(
                            &**cc,
                            CC::SupervisionCCReport(report)
                                if report.session_id == session_id
                                    && report.status.is_final()
                        )
                }),
                None,
            )?)
        } else if expects_response {
            let endpoint = options.endpoint_index;
            Some(self.register_await_cc(
                Box::new(move |cc| {
                    cc.address().source_node_id == node_id
                        && cc.address().endpoint_index == endpoint
                        && inner.test_response(&**cc)
                }),
                None,
            )?)
        } else {
            None
        };

        match encapsulated {
            EncapsulatedCC::Single(cc) => {
                self.exec_send_data(node_id, cc, options.priority).await?;
            }
            EncapsulatedCC::Segmented { session_id, segments } => {
                let complete_rx = self.register_await_cc(
                    Box::new(move |cc| {
                        cc.address().source_node_id == node_id
                            && matches!(
                                &**cc,
                                CC::TransportServiceCCSegmentComplete(complete)
                                    if complete.session_id == session_id
                            )
                    }),
                    None,
                )?;
                for segment in segments {
                    self.exec_send_data(node_id, segment, options.priority).await?;
                }
                // The receiver confirms the reassembled datagram
                let _ = await_registered(complete_rx, report_timeout).await;
            }
        }

        match response_rx {
            Some(rx) => await_registered(rx, report_timeout).await.map(Some),
            None => Ok(None),
        }
    }

    /// Switches a Binary Switch on or off, with supervision when available
    /// and an optimistic `currentValue` update otherwise
    pub async fn binary_switch_set(
        &self,
        node_id: NodeId,
        endpoint_index: EndpointIndex,
        value: bool,
    ) -> Result<()> {
        let target: BinarySet = value.into();
        let cc = BinarySwitchCCSet::builder().target_value(target).build();
        let options = SendCommandOptions::builder()
            .endpoint_index(endpoint_index)
            .build();

        let result = self.send_node_command(node_id, cc.into(), options).await?;
        self.apply_optimistic_update(
            node_id,
            endpoint_index,
            BinarySwitchCCValues::current_value().id,
            CacheValue::BinaryReport(target.into()),
            BinarySwitchCCGet::default().into(),
            None,
            result,
        )
    }

    /// Sets a Multilevel Switch level, with supervision when available
    pub async fn multilevel_switch_set(
        &self,
        node_id: NodeId,
        endpoint_index: EndpointIndex,
        level: u8,
        duration: Option<DurationSet>,
    ) -> Result<()> {
        let target = LevelSet::Level(level);
        let cc = MultilevelSwitchCCSet::builder()
            .target_value(target)
            .duration(duration)
            .build();
        let options = SendCommandOptions::builder()
            .endpoint_index(endpoint_index)
            .build();

        let result = self.send_node_command(node_id, cc.into(), options).await?;
        self.apply_optimistic_update(
            node_id,
            endpoint_index,
            MultilevelSwitchCCValues::current_value().id,
            CacheValue::LevelReport(LevelReport::Level(level)),
            MultilevelSwitchCCGet::default().into(),
            duration,
            result,
        )
    }

    /// Applies the outcome of a SET: a supervised success writes the value
    /// directly and schedules nothing; otherwise the value is written
    /// optimistically and verified with a poll after the transition is over,
    /// unless an unsolicited report arrives first.
    #[allow(clippy::too_many_arguments)]
    fn apply_optimistic_update(
        &self,
        node_id: NodeId,
        endpoint_index: EndpointIndex,
        value_id: ValueId,
        target_value: CacheValue,
        verify_command: CC,
        duration: Option<DurationSet>,
        result: Option<WithAddress<CC>>,
    ) -> Result<()> {
        let endpoint_value_id = value_id.at(node_id, endpoint_index);

        if let Some(report) = &result {
            if let CC::SupervisionCCReport(report) = &**report {
                return match report.status {
                    SupervisionStatus::Success => {
                        // Confirmed: update exactly once, no poll
                        self.storage
                            .value_db_mut()
                            .set(endpoint_value_id, target_value);
                        Ok(())
                    }
                    SupervisionStatus::Working => Ok(()),
                    SupervisionStatus::Fail | SupervisionStatus::NoSupport => {
                        Err(Error::ResponseNok)
                    }
                };
            }
        }

        if !self.storage.options.disable_optimistic_value_update {
            self.storage
                .value_db_mut()
                .set(endpoint_value_id, target_value);
        }

        // Verify after the transition has had time to finish
        let transition = duration
            .map(|d| match d {
                DurationSet::Seconds(s) => Duration::from_secs(s as u64),
                DurationSet::Minutes(m) => Duration::from_secs(m as u64 * 60),
                DurationSet::Default => Duration::from_secs(0),
            })
            .unwrap_or(Duration::from_secs(0));
        let verify_command = match endpoint_index {
            EndpointIndex::Root => verify_command,
            EndpointIndex::Endpoint(index) => {
                MultiChannelCCCommandEncapsulation::new(index, verify_command).into()
            }
        };
        self.send_input(DriverInput::SchedulePoll {
            poll: ScheduledPoll {
                value_id: endpoint_value_id,
                node_id,
                command: verify_command,
                delay: transition + Duration::from_secs(1),
            },
        })?;
        Ok(())
    }
}
