use crate::awaited::Predicate;
use crate::error::{Error, Result};
use crate::events::DriverEvent;
use crate::interview::InterviewStage;
use crate::node::NodeStorage;
use crate::options::DriverOptions;
use crate::storage::CacheBackend;
use crate::transaction::{ExecutableCommand, Priority, Transaction, TransactionResult};
use crate::value_db::{SharedCacheBackend, ValueDb};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use zwh_cc::prelude::*;
use zwh_core::prelude::*;
use zwh_core::security::{SecurityManager, SecurityManagerS2};
use zwh_core::wrapping_counter::WrappingCounter;
use zwh_logging::ImmutableLogger;
use zwh_logging::loggers::{
    controller::ControllerLogger, driver::DriverLogger, node::NodeLogger,
};
use zwh_serial::binding::SerialBinding;

mod actor;
mod background_logger;
mod controller_commands;
mod node_api;
mod serial_task;

pub use node_api::SendCommandOptions;

pub(crate) use actor::DriverActor;
use background_logger::BackgroundLogger;
use serial_task::SerialTask;

/// A verification poll scheduled after an optimistic value update
pub(crate) struct ScheduledPoll {
    pub value_id: EndpointValueId,
    pub node_id: NodeId,
    pub command: CC,
    pub delay: Duration,
}

/// Work applications and driver tasks hand to the scheduler
pub(crate) enum DriverInput {
    Enqueue {
        transaction: Transaction,
    },
    AwaitCC {
        predicate: Predicate<WithAddress<CC>>,
        timeout: Option<Duration>,
        callback: oneshot::Sender<Result<WithAddress<CC>>>,
    },
    SchedulePoll {
        poll: ScheduledPoll,
    },
    Shutdown {
        callback: oneshot::Sender<()>,
    },
}

/// State shared between the driver handle, the scheduler and driver tasks.
/// Mutation happens on behalf of the scheduler; applications go through the
/// driver API.
pub struct DriverStorage {
    pub(crate) options: DriverOptions,
    nodes: RwLock<BTreeMap<NodeId, NodeStorage>>,
    value_db: RwLock<ValueDb>,
    pub(crate) backend: SharedCacheBackend,
    own_node_id: RwLock<NodeId>,
    home_id: RwLock<u32>,
    security_manager: RwLock<Option<SecurityManager>>,
    security_manager_s2: RwLock<Option<SecurityManagerS2>>,
    supervision_sessions: Mutex<WrappingCounter<u8>>,
    s2_sequence_numbers: Mutex<WrappingCounter<u8>>,
    event_tx: mpsc::UnboundedSender<DriverEvent>,
    logger: Arc<dyn ImmutableLogger>,
}

impl DriverStorage {
    fn new(
        options: DriverOptions,
        backend: SharedCacheBackend,
        value_db: ValueDb,
        event_tx: mpsc::UnboundedSender<DriverEvent>,
        logger: Arc<dyn ImmutableLogger>,
    ) -> Self {
        Self {
            options,
            nodes: RwLock::new(BTreeMap::new()),
            value_db: RwLock::new(value_db),
            backend,
            own_node_id: RwLock::new(NodeId::unspecified()),
            home_id: RwLock::new(0),
            security_manager: RwLock::new(None),
            security_manager_s2: RwLock::new(None),
            supervision_sessions: Mutex::new(WrappingCounter::new_with_max(0x3f)),
            s2_sequence_numbers: Mutex::new(WrappingCounter::new()),
            event_tx,
            logger,
        }
    }

    pub(crate) fn emit_event(&self, event: DriverEvent) {
        let _ = self.event_tx.send(event);
    }

    pub fn own_node_id(&self) -> NodeId {
        *self.own_node_id.read().expect("driver storage poisoned")
    }

    pub fn home_id(&self) -> u32 {
        *self.home_id.read().expect("driver storage poisoned")
    }

    pub(crate) fn set_controller_identity(&self, home_id: u32, own_node_id: NodeId) {
        *self.home_id.write().expect("driver storage poisoned") = home_id;
        *self.own_node_id.write().expect("driver storage poisoned") = own_node_id;
        self.value_db_mut().set_home_id(home_id);
    }

    pub fn security_manager(&self) -> Option<SecurityManager> {
        self.security_manager
            .read()
            .expect("driver storage poisoned")
            .clone()
    }

    pub fn security_manager_s2(&self) -> Option<SecurityManagerS2> {
        self.security_manager_s2
            .read()
            .expect("driver storage poisoned")
            .clone()
    }

    pub(crate) fn init_security_managers(&self) {
        let keys = &self.options.security_keys;
        let own_node_id = self.own_node_id();

        if let Some(key) = &keys.s0_legacy {
            let manager = SecurityManager::new(zwh_core::security::SecurityManagerOptions {
                own_node_id,
                network_key: key.clone(),
            });
            *self.security_manager.write().expect("driver storage poisoned") = Some(manager);
        }

        let s2_classes = [
            (SecurityClass::S2Unauthenticated, &keys.s2_unauthenticated),
            (SecurityClass::S2Authenticated, &keys.s2_authenticated),
            (SecurityClass::S2AccessControl, &keys.s2_access_control),
        ];
        if s2_classes.iter().any(|(_, key)| key.is_some()) {
            let manager = SecurityManagerS2::new(own_node_id);
            for (class, key) in s2_classes {
                if let Some(key) = key {
                    manager.set_network_key(class, key);
                }
            }
            *self
                .security_manager_s2
                .write()
                .expect("driver storage poisoned") = Some(manager);
        }
    }

    pub(crate) fn next_supervision_session(&self) -> u8 {
        self.supervision_sessions
            .lock()
            .expect("driver storage poisoned")
            .increment()
    }

    pub(crate) fn next_s2_sequence_number(&self) -> u8 {
        self.s2_sequence_numbers
            .lock()
            .expect("driver storage poisoned")
            .increment()
    }

    pub(crate) fn read_node<T>(
        &self,
        node_id: NodeId,
        read: impl FnOnce(&NodeStorage) -> T,
    ) -> Option<T> {
        self.nodes
            .read()
            .expect("driver storage poisoned")
            .get(&node_id)
            .map(read)
    }

    pub(crate) fn modify_node<T>(
        &self,
        node_id: NodeId,
        modify: impl FnOnce(&mut NodeStorage) -> T,
    ) -> Option<T> {
        self.nodes
            .write()
            .expect("driver storage poisoned")
            .get_mut(&node_id)
            .map(modify)
    }

    pub(crate) fn insert_node(&self, storage: NodeStorage) {
        self.nodes
            .write()
            .expect("driver storage poisoned")
            .insert(storage.node_id, storage);
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes
            .read()
            .expect("driver storage poisoned")
            .keys()
            .copied()
            .collect()
    }

    pub(crate) fn value_db<T>(&self, read: impl FnOnce(&ValueDb) -> T) -> T {
        read(&self.value_db.read().expect("driver storage poisoned"))
    }

    pub(crate) fn value_db_mut(&self) -> std::sync::RwLockWriteGuard<'_, ValueDb> {
        self.value_db.write().expect("driver storage poisoned")
    }

    pub(crate) fn driver_log(&self) -> DriverLogger {
        DriverLogger::new(self.logger.clone())
    }

    pub(crate) fn controller_log(&self) -> ControllerLogger {
        ControllerLogger::new(self.logger.clone())
    }

    pub(crate) fn node_log(&self, node_id: NodeId, endpoint: EndpointIndex) -> NodeLogger {
        NodeLogger::new(self.logger.clone(), node_id, endpoint)
    }
}

/// The cloneable handle to a running driver. All work funnels through the
/// scheduler task via message passing.
#[derive(Clone)]
pub struct Driver {
    input_tx: mpsc::UnboundedSender<DriverInput>,
    pub(crate) storage: Arc<DriverStorage>,
}

impl Driver {
    /// Starts the driver tasks on the given transport and returns the
    /// driver handle plus the application event stream. Call
    /// [Driver::init] afterwards to identify the controller and begin the
    /// node interviews.
    pub fn start<B: SerialBinding>(
        binding: B,
        backend: Box<dyn CacheBackend>,
        options: DriverOptions,
    ) -> (Driver, mpsc::UnboundedReceiver<DriverEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let (write_tx, write_rx) = mpsc::unbounded_channel();
        let (frame_tx, frame_rx) = mpsc::unbounded_channel();

        let logger = BackgroundLogger::spawn(options.log_level);
        let backend: SharedCacheBackend = Arc::new(Mutex::new(backend));
        let value_db = ValueDb::new(event_tx.clone(), backend.clone());
        let storage = Arc::new(DriverStorage::new(
            options,
            backend,
            value_db,
            event_tx.clone(),
            logger.clone(),
        ));

        tokio::spawn(SerialTask::new(binding, write_rx, frame_tx, logger).run());

        let driver = Driver {
            input_tx: input_tx.clone(),
            storage: storage.clone(),
        };
        let actor = DriverActor::new(driver.clone(), input_rx, frame_rx, write_tx, event_tx);
        tokio::spawn(actor.run());

        (driver, event_rx)
    }

    pub fn options(&self) -> &DriverOptions {
        &self.storage.options
    }

    pub fn storage(&self) -> &DriverStorage {
        &self.storage
    }

    pub(crate) fn send_input(&self, input: DriverInput) -> Result<()> {
        self.input_tx.send(input).map_err(|_| Error::ShuttingDown)
    }

    /// Executes a host->controller command through the send queue and waits
    /// for its completion
    pub async fn exec_controller_command<C>(
        &self,
        command: C,
        priority: Priority,
    ) -> Result<TransactionResult>
    where
        C: ExecutableCommand + 'static,
    {
        let (transaction, rx) = Transaction::controller_command(
            command,
            priority,
            self.storage.options.attempts.controller,
        );
        self.send_input(DriverInput::Enqueue { transaction })?;
        rx.await.map_err(|_| Error::ShuttingDown)?
    }

    /// Registers a waiter for a CC matching the given predicate without
    /// blocking. Registering before sending the triggering command
    /// guarantees the answer cannot slip past the scheduler. A `None`
    /// timeout leaves the deadline to the caller.
    pub(crate) fn register_await_cc(
        &self,
        predicate: Predicate<WithAddress<CC>>,
        timeout: Option<Duration>,
    ) -> Result<oneshot::Receiver<Result<WithAddress<CC>>>> {
        let (tx, rx) = oneshot::channel();
        self.send_input(DriverInput::AwaitCC {
            predicate,
            timeout,
            callback: tx,
        })?;
        Ok(rx)
    }

    /// Waits for a CC matching the given predicate. The timeout is
    /// mandatory at the scheduler level - `None` falls back to the report
    /// timeout.
    pub async fn await_cc(
        &self,
        predicate: Predicate<WithAddress<CC>>,
        timeout: Option<Duration>,
    ) -> Result<WithAddress<CC>> {
        let rx = self.register_await_cc(
            predicate,
            Some(timeout.unwrap_or(self.storage.options.timeouts.report)),
        )?;
        rx.await.map_err(|_| Error::ShuttingDown)?
    }

    /// Reads a value from the ValueDB. Applications observe a snapshot
    /// consistent with the most recent event they received.
    pub fn get_value(&self, id: &EndpointValueId) -> Option<CacheValue> {
        self.storage.value_db(|db| db.get(id).cloned())
    }

    pub fn get_metadata(&self, id: &EndpointValueId) -> Option<ValueMetadata> {
        self.storage.value_db(|db| db.get_metadata(id).cloned())
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        self.storage.node_ids()
    }

    pub fn interview_stage(&self, node_id: NodeId) -> InterviewStage {
        self.storage
            .read_node(node_id, |n| n.interview_stage)
            .unwrap_or(InterviewStage::None)
    }

    pub(crate) fn encoding_context(&self) -> zwh_serial::command::CommandEncodingContext {
        zwh_serial::command::CommandEncodingContext::builder()
            .own_node_id(self.storage.own_node_id())
            .home_id(self.storage.home_id())
            .security_manager(self.storage.security_manager())
            .security_manager_s2(self.storage.security_manager_s2())
            .build()
    }

    pub(crate) fn parsing_context(&self) -> zwh_serial::command::CommandParsingContext {
        let storage = self.storage.clone();
        let lookup: zwh_serial::command::SecurityClassLookup = Arc::new(move |node_id| {
            storage
                .read_node(node_id, |n| n.security_class)
                .unwrap_or_default()
        });
        zwh_serial::command::CommandParsingContext::builder()
            .own_node_id(self.storage.own_node_id())
            .home_id(self.storage.home_id())
            .security_manager(self.storage.security_manager())
            .security_manager_s2(self.storage.security_manager_s2())
            .security_class_lookup(Some(lookup))
            .build()
    }

    pub(crate) fn cc_parsing_context(&self, source_node_id: NodeId) -> CCParsingContext {
        let security_class = self
            .storage
            .read_node(source_node_id, |n| n.security_class)
            .unwrap_or_default();
        CCParsingContext::builder()
            .source_node_id(source_node_id)
            .own_node_id(self.storage.own_node_id())
            .home_id(self.storage.home_id())
            .security_class(security_class)
            .security_manager(self.storage.security_manager())
            .security_manager_s2(self.storage.security_manager_s2())
            .build()
    }

    /// Stops the driver: pending transactions are cancelled, the transport
    /// is closed.
    pub async fn shutdown(&self) {
        let (tx, rx) = oneshot::channel();
        if self.send_input(DriverInput::Shutdown { callback: tx }).is_ok() {
            let _ = rx.await;
        }
    }
}
