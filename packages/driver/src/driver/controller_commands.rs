use super::Driver;
use crate::error::{Error, Result};
use crate::events::DriverEvent;
use crate::interview::{self, InterviewStage};
use crate::node::NodeStorage;
use crate::storage::cache_keys;
use crate::transaction::Priority;
use zwh_core::cache::CacheValue;
use zwh_core::prelude::*;
use zwh_serial::command::{
    ApplicationUpdateRequest, ApplicationUpdateStatus, Command, GetControllerIdRequest,
    GetControllerIdResponse, GetControllerVersionRequest, GetControllerVersionResponse,
    GetNodeProtocolInfoRequest, GetNodeProtocolInfoResponse, GetSerialApiInitDataRequest,
    GetSerialApiInitDataResponse, RequestNodeInfoRequest,
};

macro_rules! expect_controller_command_result {
    ($actual:expr, $expected:ident) => {
        match $actual {
            Ok(result) => match result.response {
                Some(Command::$expected(response)) => response,
                _ => {
                    return Err(Error::MalformedMessage(
                        concat!("expected ", stringify!($expected)).to_string(),
                    ));
                }
            },
            Err(e) => return Err(e),
        }
    };
}

impl Driver {
    pub async fn get_controller_version(&self) -> Result<GetControllerVersionResponse> {
        let result = self
            .exec_controller_command(GetControllerVersionRequest::default(), Priority::Controller)
            .await;
        Ok(expect_controller_command_result!(
            result,
            GetControllerVersionResponse
        ))
    }

    pub async fn get_controller_id(&self) -> Result<GetControllerIdResponse> {
        let result = self
            .exec_controller_command(GetControllerIdRequest::default(), Priority::Controller)
            .await;
        Ok(expect_controller_command_result!(
            result,
            GetControllerIdResponse
        ))
    }

    pub async fn get_serial_api_init_data(&self) -> Result<GetSerialApiInitDataResponse> {
        let result = self
            .exec_controller_command(GetSerialApiInitDataRequest::default(), Priority::Controller)
            .await;
        Ok(expect_controller_command_result!(
            result,
            GetSerialApiInitDataResponse
        ))
    }

    pub async fn get_node_protocol_info(
        &self,
        node_id: NodeId,
    ) -> Result<GetNodeProtocolInfoResponse> {
        let result = self
            .exec_controller_command(GetNodeProtocolInfoRequest::new(node_id), Priority::NodeQuery)
            .await;
        Ok(expect_controller_command_result!(
            result,
            GetNodeProtocolInfoResponse
        ))
    }

    /// Asks a node for its NIF. The payoff arrives as an ApplicationUpdate
    /// callback rather than a response.
    pub async fn request_node_info(&self, node_id: NodeId) -> Result<ApplicationUpdateRequest> {
        let result = self
            .exec_controller_command(RequestNodeInfoRequest::new(node_id), Priority::NodeQuery)
            .await?;
        match result.callback {
            Some(Command::ApplicationUpdateRequest(update)) => {
                if update.status == ApplicationUpdateStatus::NodeInfoRequestFailed {
                    Err(Error::NodeTimeout)
                } else {
                    Ok(update)
                }
            }
            _ => Err(Error::MalformedMessage(
                "expected an ApplicationUpdateRequest callback".to_string(),
            )),
        }
    }

    /// Identifies the controller, loads the known nodes and resumes their
    /// interviews. Emits [DriverEvent::Ready] once the driver is usable.
    pub async fn init(&self) -> Result<()> {
        let log = self.storage.driver_log();

        let version = self.get_controller_version().await?;
        log.info(|| format!("controller library: {}", version.library_version));

        let ids = self.get_controller_id().await?;
        self.storage
            .set_controller_identity(ids.home_id, ids.own_node_id);
        self.storage.init_security_managers();
        log.info(|| {
            format!(
                "home id {:#010x}, own node id {}",
                ids.home_id, ids.own_node_id
            )
        });

        let init_data = self.get_serial_api_init_data().await?;
        for node_id in &init_data.node_ids {
            if *node_id == ids.own_node_id {
                continue;
            }
            if node_id.is_extended() {
                log.warn(|| {
                    format!(
                        "node id {} exceeds the classic range; controller support varies",
                        node_id
                    )
                });
            }
            let mut storage = NodeStorage::new(*node_id);
            self.restore_node_from_cache(&mut storage);
            self.storage.insert_node(storage);
            self.storage.emit_event(DriverEvent::NodeAdded { node_id: *node_id });
        }

        self.storage.emit_event(DriverEvent::Ready);

        // Drive the interviews in the background
        for node_id in self.storage.node_ids() {
            let driver = self.clone();
            tokio::spawn(async move {
                interview::interview_node(driver, node_id).await;
            });
        }

        Ok(())
    }

    fn restore_node_from_cache(&self, node: &mut NodeStorage) {
        let home_id = self.storage.home_id();
        let backend = self.storage.backend.lock().expect("cache backend lock poisoned");

        if let Some(CacheValue::UInt8(stage)) =
            backend.get(&cache_keys::node_field(home_id, node.node_id, "interviewStage"))
        {
            node.interview_stage = InterviewStage::from_u8(stage);
        }
        if let Some(CacheValue::UInt8(attempts)) =
            backend.get(&cache_keys::node_field(home_id, node.node_id, "interviewAttempts"))
        {
            node.interview_attempts = attempts;
        }
        if let Some(CacheValue::Bool(dead)) =
            backend.get(&cache_keys::node_field(home_id, node.node_id, "dead"))
        {
            node.dead = dead;
        }
        if let Some(CacheValue::Buffer(protocol)) =
            backend.get(&cache_keys::node_field(home_id, node.node_id, "protocolInfo"))
        {
            node.protocol_data = interview::protocol_data_from_cache(&protocol);
        }
        if let Some(CacheValue::UInt8(class)) =
            backend.get(&cache_keys::node_field(home_id, node.node_id, "securityClass"))
        {
            node.security_class = match class {
                1 => SecurityClass::S0Legacy,
                2 => SecurityClass::S2Unauthenticated,
                3 => SecurityClass::S2Authenticated,
                4 => SecurityClass::S2AccessControl,
                _ => SecurityClass::None,
            };
        }

        for endpoint in interview::cached_endpoint_indices(&**backend, home_id, node.node_id) {
            let supported_key =
                cache_keys::endpoint_field(home_id, node.node_id, endpoint, "supportedCCs");
            if let Some(CacheValue::Buffer(ids)) = backend.get(&supported_key) {
                let storage = node.endpoint_mut(endpoint);
                for id in ids {
                    if let Ok(cc) = CommandClasses::try_from(id) {
                        storage.modify_cc_info(cc, |info| info.supported = true);
                    }
                }
            }
            let controlled_key =
                cache_keys::endpoint_field(home_id, node.node_id, endpoint, "controlledCCs");
            if let Some(CacheValue::Buffer(ids)) = backend.get(&controlled_key) {
                let storage = node.endpoint_mut(endpoint);
                for id in ids {
                    if let Ok(cc) = CommandClasses::try_from(id) {
                        storage.modify_cc_info(cc, |info| info.controlled = true);
                    }
                }
            }
        }
    }
}
