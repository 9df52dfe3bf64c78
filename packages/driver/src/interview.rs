use crate::driver::{Driver, SendCommandOptions};
use crate::error::{Error, Result};
use crate::events::DriverEvent;
use crate::storage::{CacheBackend, cache_keys};
use crate::transaction::Priority;
use bytes::Bytes;
use petgraph::{algo::toposort, graphmap::DiGraphMap};
use std::collections::BTreeSet;
use std::time::Duration;
use zwh_cc::prelude::*;
use zwh_core::parse::Parsable;
use zwh_core::prelude::*;
use zwh_core::serialize::Serializable;

/// How often a failing interview is retried across sessions before the
/// node is marked dead
const MAX_INTERVIEW_ATTEMPTS: u8 = 5;
const INTERVIEW_BACKOFF_MIN: Duration = Duration::from_secs(5 * 60);
const INTERVIEW_BACKOFF_MAX: Duration = Duration::from_secs(2 * 60 * 60);

/// The progress of a node interview. The stored stage is the last one that
/// completed; a driver restart resumes at the first incomplete stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum InterviewStage {
    /// The interview has not produced anything yet
    None,
    /// The controller reported the node's protocol capabilities
    ProtocolInfo,
    /// The node sent its NIF with supported/controlled CCs
    NodeInfo,
    /// Each supported CC ran its own interview
    CommandClasses,
    /// Multi Channel endpoints were discovered
    Endpoints,
    /// One-shot state queries are done
    Static,
    /// Values from earlier sessions were restored
    Cache,
    /// Volatile state was fetched
    Dynamic,
    Complete,
}

impl InterviewStage {
    pub fn as_u8(&self) -> u8 {
        *self as u8
    }

    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::ProtocolInfo,
            2 => Self::NodeInfo,
            3 => Self::CommandClasses,
            4 => Self::Endpoints,
            5 => Self::Static,
            6 => Self::Cache,
            7 => Self::Dynamic,
            8 => Self::Complete,
            _ => Self::None,
        }
    }

    /// The stage to run after this one completed
    fn next(&self) -> Self {
        match self {
            Self::None => Self::ProtocolInfo,
            Self::ProtocolInfo => Self::NodeInfo,
            Self::NodeInfo => Self::CommandClasses,
            Self::CommandClasses => Self::Endpoints,
            Self::Endpoints => Self::Static,
            Self::Static => Self::Cache,
            Self::Cache => Self::Dynamic,
            Self::Dynamic | Self::Complete => Self::Complete,
        }
    }
}

pub(crate) fn protocol_data_from_cache(buffer: &[u8]) -> Option<NodeProtocolData> {
    let mut input = Bytes::from(buffer.to_vec());
    NodeProtocolData::parse(&mut input).ok()
}

pub(crate) fn cached_endpoint_indices(
    backend: &dyn CacheBackend,
    home_id: u32,
    node_id: NodeId,
) -> Vec<EndpointIndex> {
    let prefix = format!("{:08x}.node.{}.endpoint.", home_id, u8::from(node_id));
    let mut indices = BTreeSet::new();
    for key in backend.keys_with_prefix(&prefix) {
        if let Some(index) = key
            .strip_prefix(prefix.as_str())
            .and_then(|rest| rest.split('.').next())
            .and_then(|index| index.parse::<u8>().ok())
        {
            indices.insert(EndpointIndex::new(index));
        }
    }
    indices.into_iter().collect()
}

/// The order CC interviews run in: security first so later queries can go
/// encrypted, device identification next, application CCs last
fn determine_interview_order(supported: &[CommandClasses]) -> Vec<CommandClasses> {
    const PRIORITY: &[CommandClasses] = &[
        CommandClasses::Security2,
        CommandClasses::Security,
        CommandClasses::ManufacturerSpecific,
        CommandClasses::Version,
        CommandClasses::WakeUp,
    ];

    let mut graph: DiGraphMap<CommandClasses, ()> = DiGraphMap::new();
    for cc in supported {
        graph.add_node(*cc);
    }

    // Chain the priority CCs that are present...
    let present_priority: Vec<CommandClasses> = PRIORITY
        .iter()
        .filter(|cc| supported.contains(cc))
        .copied()
        .collect();
    for pair in present_priority.windows(2) {
        graph.add_edge(pair[0], pair[1], ());
    }
    // ...and let everything else depend on the last of them
    if let Some(last) = present_priority.last() {
        for cc in supported {
            if !PRIORITY.contains(cc) {
                graph.add_edge(*last, *cc, ());
            }
        }
    }
    // Application CCs come after the management CCs
    for cc in supported {
        if cc.is_application_cc() {
            for dep in supported {
                if !dep.is_application_cc() && !PRIORITY.contains(dep) {
                    graph.add_edge(*dep, *cc, ());
                }
            }
        }
    }

    toposort(&graph, None).unwrap_or_else(|_| supported.to_vec())
}

/// Runs the interview of one node to completion, retrying with exponential
/// backoff across sessions and marking the node dead when the budget is
/// exhausted
pub async fn interview_node(driver: Driver, node_id: NodeId) {
    let log = driver.storage.node_log(node_id, EndpointIndex::Root);

    loop {
        let (dead, attempts) = driver
            .storage
            .read_node(node_id, |n| (n.dead, n.interview_attempts))
            .unwrap_or((true, 0));
        if dead {
            return;
        }

        log.info(|| {
            format!(
                "beginning interview, last completed stage: {:?}",
                driver.interview_stage(node_id)
            )
        });

        match run_interview(&driver, node_id).await {
            Ok(()) => {
                driver.storage.modify_node(node_id, |n| n.interview_attempts = 0);
                persist_node_u8(&driver, node_id, "interviewAttempts", 0);
                log.info(|| "interview completed".to_string());
                return;
            }
            Err(e) => {
                let attempts = attempts + 1;
                driver
                    .storage
                    .modify_node(node_id, |n| n.interview_attempts = attempts);
                persist_node_u8(&driver, node_id, "interviewAttempts", attempts);

                if attempts >= MAX_INTERVIEW_ATTEMPTS {
                    driver.storage.modify_node(node_id, |n| n.dead = true);
                    driver.storage.emit_event(DriverEvent::NodeDead { node_id });
                    log.error(|| {
                        format!("interview failed {} times, giving up: {}", attempts, e)
                    });
                    let mut backend = driver
                        .storage
                        .backend
                        .lock()
                        .expect("cache backend lock poisoned");
                    backend.set(
                        &cache_keys::node_field(driver.storage.home_id(), node_id, "dead"),
                        CacheValue::Bool(true),
                    );
                    backend.flush();
                    return;
                }

                let backoff = INTERVIEW_BACKOFF_MIN
                    .saturating_mul(1 << (attempts.saturating_sub(1) as u32))
                    .min(INTERVIEW_BACKOFF_MAX);
                log.warn(|| {
                    format!(
                        "interview attempt {} failed ({}), retrying in {:?}",
                        attempts, e, backoff
                    )
                });
                tokio::time::sleep(backoff).await;
            }
        }
    }
}

async fn run_interview(driver: &Driver, node_id: NodeId) -> Result<()> {
    loop {
        let stage = driver.interview_stage(node_id);
        if stage == InterviewStage::Complete {
            return Ok(());
        }
        let next = stage.next();
        run_stage(driver, node_id, next).await?;
        set_interview_stage(driver, node_id, next);
    }
}

/// Advances the stored interview stage. The stage only moves forward; going
/// back requires an explicit re-interview.
fn set_interview_stage(driver: &Driver, node_id: NodeId, stage: InterviewStage) {
    let advanced = driver
        .storage
        .modify_node(node_id, |n| {
            if stage > n.interview_stage {
                n.interview_stage = stage;
                true
            } else {
                false
            }
        })
        .unwrap_or(false);
    if !advanced {
        return;
    }

    persist_node_u8(driver, node_id, "interviewStage", stage.as_u8());
    driver
        .storage
        .emit_event(DriverEvent::InterviewStageChanged { node_id, stage });
}

fn persist_node_u8(driver: &Driver, node_id: NodeId, field: &str, value: u8) {
    let mut backend = driver
        .storage
        .backend
        .lock()
        .expect("cache backend lock poisoned");
    backend.set(
        &cache_keys::node_field(driver.storage.home_id(), node_id, field),
        CacheValue::UInt8(value),
    );
    backend.flush();
}

fn persist_endpoint_ccs(driver: &Driver, node_id: NodeId, endpoint: EndpointIndex) {
    let Some((supported, controlled)) = driver.storage.read_node(node_id, |n| {
        n.endpoint(endpoint)
            .map(|e| (e.supported_ccs(), e.controlled_ccs()))
    }).flatten() else {
        return;
    };

    let home_id = driver.storage.home_id();
    let mut backend = driver
        .storage
        .backend
        .lock()
        .expect("cache backend lock poisoned");
    backend.set(
        &cache_keys::endpoint_field(home_id, node_id, endpoint, "supportedCCs"),
        CacheValue::Buffer(supported.iter().map(|cc| *cc as u8).collect()),
    );
    backend.set(
        &cache_keys::endpoint_field(home_id, node_id, endpoint, "controlledCCs"),
        CacheValue::Buffer(controlled.iter().map(|cc| *cc as u8).collect()),
    );
    backend.flush();
}

async fn run_stage(driver: &Driver, node_id: NodeId, stage: InterviewStage) -> Result<()> {
    match stage {
        InterviewStage::ProtocolInfo => stage_protocol_info(driver, node_id).await,
        InterviewStage::NodeInfo => stage_node_info(driver, node_id).await,
        InterviewStage::CommandClasses => stage_command_classes(driver, node_id).await,
        InterviewStage::Endpoints => stage_endpoints(driver, node_id).await,
        InterviewStage::Static => stage_static(driver, node_id).await,
        InterviewStage::Cache => stage_cache(driver, node_id),
        InterviewStage::Dynamic => stage_dynamic(driver, node_id).await,
        InterviewStage::None | InterviewStage::Complete => Ok(()),
    }
}

async fn stage_protocol_info(driver: &Driver, node_id: NodeId) -> Result<()> {
    let response = driver.get_node_protocol_info(node_id).await?;
    let protocol_data = response.protocol_data;

    driver.storage.modify_node(node_id, |n| {
        n.protocol_data = Some(protocol_data);
        // Listening nodes are always reachable
        if !protocol_data.is_sleeping() {
            n.awake = true;
        }
    });

    let mut backend = driver
        .storage
        .backend
        .lock()
        .expect("cache backend lock poisoned");
    backend.set(
        &cache_keys::node_field(driver.storage.home_id(), node_id, "protocolInfo"),
        CacheValue::Buffer(protocol_data.as_bytes().to_vec()),
    );
    backend.flush();
    Ok(())
}

async fn stage_node_info(driver: &Driver, node_id: NodeId) -> Result<()> {
    let update = driver.request_node_info(node_id).await?;
    let Some(nif) = update.nif else {
        return Err(Error::MalformedMessage("NIF without contents".to_string()));
    };

    driver.storage.modify_node(node_id, |n| {
        let root = n.root_mut();
        root.generic_device_class = nif.device_class.generic;
        root.specific_device_class = nif.device_class.specific;
        for cc in &nif.supported_ccs {
            root.modify_cc_info(*cc, |info| info.supported = true);
        }
        for cc in &nif.controlled_ccs {
            root.modify_cc_info(*cc, |info| info.controlled = true);
        }
    });
    persist_endpoint_ccs(driver, node_id, EndpointIndex::Root);
    Ok(())
}

async fn stage_command_classes(driver: &Driver, node_id: NodeId) -> Result<()> {
    let supported = driver
        .storage
        .read_node(node_id, |n| n.root().supported_ccs())
        .unwrap_or_default();
    let order = determine_interview_order(&supported);
    let supports_version = supported.contains(&CommandClasses::Version);

    for cc in order {
        // Learn the implemented version first, then run the CC's own
        // interview
        if supports_version {
            if let Ok(Some(report)) = driver
                .send_node_command(
                    node_id,
                    VersionCCCommandClassGet::builder().requested_cc(cc).build().into(),
                    SendCommandOptions::builder()
                        .priority(Priority::NodeQuery)
                        .use_supervision(false)
                        .build(),
                )
                .await
            {
                if let CC::VersionCCCommandClassReport(report) = &*report {
                    let version = report.version;
                    driver.storage.modify_node(node_id, |n| {
                        n.root_mut().modify_cc_info(cc, |info| info.version = version);
                    });
                }
            }
        }

        interview_cc(driver, node_id, cc).await?;
    }
    Ok(())
}

/// The CC-specific part of the interview
async fn interview_cc(driver: &Driver, node_id: NodeId, cc: CommandClasses) -> Result<()> {
    let options = SendCommandOptions::builder()
        .priority(Priority::NodeQuery)
        .use_supervision(false)
        .build();

    match cc {
        CommandClasses::WakeUp => {
            // Learn the interval, then make sure we are the wake-up target
            let report = driver
                .send_node_command(node_id, WakeUpCCIntervalGet::default().into(), options)
                .await?;
            let own_node_id = driver.storage.own_node_id();
            if let Some(report) = report {
                if let CC::WakeUpCCIntervalReport(report) = &*report {
                    if report.controller_node_id != own_node_id {
                        driver
                            .send_node_command(
                                node_id,
                                WakeUpCCIntervalSet::builder()
                                    .interval(report.interval)
                                    .controller_node_id(own_node_id)
                                    .build()
                                    .into(),
                                options,
                            )
                            .await?;
                    }
                }
            }
        }
        CommandClasses::MultilevelSwitch => {
            // The switch type drives the direction metadata labels
            let _ = driver
                .send_node_command(
                    node_id,
                    MultilevelSwitchCCSupportedGet::default().into(),
                    options,
                )
                .await;
        }
        // Security classes were negotiated at inclusion; Multi Channel has
        // its own stage; the remaining CCs have nothing to discover beyond
        // their version
        _ => {}
    }
    Ok(())
}

async fn stage_endpoints(driver: &Driver, node_id: NodeId) -> Result<()> {
    let supports_multi_channel = driver
        .storage
        .read_node(node_id, |n| n.supports_cc(CommandClasses::MultiChannel))
        .unwrap_or(false);
    if !supports_multi_channel {
        return Ok(());
    }

    let options = SendCommandOptions::builder()
        .priority(Priority::NodeQuery)
        .use_supervision(false)
        .build();

    let Some(report) = driver
        .send_node_command(node_id, MultiChannelCCEndPointGet::default().into(), options)
        .await?
    else {
        return Ok(());
    };
    let CC::MultiChannelCCEndPointReport(report) = &*report else {
        return Ok(());
    };

    for index in 1..=report.individual_count {
        let Some(capability) = driver
            .send_node_command(
                node_id,
                MultiChannelCCCapabilityGet::builder()
                    .requested_endpoint(index)
                    .build()
                    .into(),
                options,
            )
            .await?
        else {
            continue;
        };
        let CC::MultiChannelCCCapabilityReport(capability) = &*capability else {
            continue;
        };

        let endpoint = EndpointIndex::new(capability.endpoint);
        let generic = capability.generic_device_class;
        let specific = capability.specific_device_class;
        let ccs = capability.supported_ccs.clone();
        driver.storage.modify_node(node_id, |n| {
            let storage = n.endpoint_mut(endpoint);
            storage.generic_device_class = generic;
            storage.specific_device_class = specific;
            for cc in &ccs {
                storage.modify_cc_info(*cc, |info| info.supported = true);
            }
        });
        persist_endpoint_ccs(driver, node_id, endpoint);
    }
    Ok(())
}

async fn stage_static(driver: &Driver, node_id: NodeId) -> Result<()> {
    let supports_manufacturer = driver
        .storage
        .read_node(node_id, |n| {
            n.supports_cc(CommandClasses::ManufacturerSpecific)
        })
        .unwrap_or(false);
    if supports_manufacturer {
        let options = SendCommandOptions::builder()
            .priority(Priority::NodeQuery)
            .use_supervision(false)
            .build();
        driver
            .send_node_command(node_id, ManufacturerSpecificCCGet::default().into(), options)
            .await?;
    }
    Ok(())
}

/// Restores this node's stateful values from the persistent store
fn stage_cache(driver: &Driver, node_id: NodeId) -> Result<()> {
    let home_id = driver.storage.home_id();
    let prefix = format!("{:08x}.node.{}.value.", home_id, u8::from(node_id));

    let restored: Vec<(EndpointValueId, CacheValue)> = {
        let backend = driver
            .storage
            .backend
            .lock()
            .expect("cache backend lock poisoned");
        backend
            .keys_with_prefix(&prefix)
            .into_iter()
            .filter_map(|key| {
                let id = cache_keys::parse_value_key(home_id, &key)?;
                let value = backend.get(&key)?;
                Some((id, value))
            })
            .collect()
    };

    let mut db = driver.storage.value_db_mut();
    for (id, value) in restored {
        db.set_silent(id, value);
    }
    Ok(())
}

async fn stage_dynamic(driver: &Driver, node_id: NodeId) -> Result<()> {
    let supported = driver
        .storage
        .read_node(node_id, |n| n.root().supported_ccs())
        .unwrap_or_default();
    let options = SendCommandOptions::builder()
        .priority(Priority::NodeQuery)
        .use_supervision(false)
        .build();

    if supported.contains(&CommandClasses::BinarySwitch) {
        driver
            .send_node_command(node_id, BinarySwitchCCGet::default().into(), options)
            .await?;
    }
    if supported.contains(&CommandClasses::MultilevelSwitch) {
        driver
            .send_node_command(node_id, MultilevelSwitchCCGet::default().into(), options)
            .await?;
    }
    Ok(())
}

impl Driver {
    /// Restarts a node's interview from the beginning. This is the only
    /// path that moves the stage backwards.
    pub async fn reinterview_node(&self, node_id: NodeId) {
        self.storage.modify_node(node_id, |n| {
            n.interview_stage = InterviewStage::None;
            n.interview_attempts = 0;
            n.dead = false;
        });
        persist_node_u8(self, node_id, "interviewStage", InterviewStage::None.as_u8());
        self.storage.emit_event(DriverEvent::InterviewStageChanged {
            node_id,
            stage: InterviewStage::None,
        });

        let driver = self.clone();
        tokio::spawn(async move {
            interview_node(driver, node_id).await;
        });
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_stage_order_is_total() {
        use InterviewStage::*;
        let stages = [
            None,
            ProtocolInfo,
            NodeInfo,
            CommandClasses,
            Endpoints,
            Static,
            Cache,
            Dynamic,
            Complete,
        ];
        for pair in stages.windows(2) {
            assert!(pair[0] < pair[1]);
            assert_eq!(pair[0].next(), pair[1]);
        }
        assert_eq!(Complete.next(), Complete);
    }

    #[test]
    fn test_stage_roundtrip_through_cache() {
        for value in 0..=8u8 {
            let stage = InterviewStage::from_u8(value);
            assert_eq!(stage.as_u8(), value);
        }
    }

    #[test]
    fn test_interview_order_prioritizes_management_ccs() {
        let supported = vec![
            CommandClasses::BinarySwitch,
            CommandClasses::Version,
            CommandClasses::ManufacturerSpecific,
            CommandClasses::WakeUp,
        ];
        let order = determine_interview_order(&supported);

        let pos = |cc| order.iter().position(|c| *c == cc).unwrap();
        assert!(pos(CommandClasses::ManufacturerSpecific) < pos(CommandClasses::Version));
        assert!(pos(CommandClasses::Version) < pos(CommandClasses::WakeUp));
        assert!(pos(CommandClasses::WakeUp) < pos(CommandClasses::BinarySwitch));
        assert_eq!(order.len(), supported.len());
    }
}
