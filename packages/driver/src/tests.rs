//! End-to-end tests of the driver against a scripted in-memory serial port

use crate::driver::Driver;
use crate::events::DriverEvent;
use crate::interview::InterviewStage;
use crate::node::NodeStorage;
use crate::options::DriverOptions;
use crate::storage::{MemoryCacheBackend, cache_keys};
use bytes::{Bytes, BytesMut};
use std::time::Duration;
use tokio::sync::mpsc;
use zwh_cc::prelude::*;
use zwh_core::prelude::*;
use zwh_serial::binding::SerialBinding;
use zwh_serial::command_raw::CommandRaw;
use zwh_serial::error::Result as SerialResult;
use zwh_serial::frame::RawSerialFrame;

const ACK: u8 = 0x06;
const NAK: u8 = 0x15;

/// The driver side of the in-memory transport: parses injected bytes with
/// the production framing code and hands written frames to the test
struct MockBinding {
    incoming_rx: mpsc::UnboundedReceiver<Vec<u8>>,
    written_tx: mpsc::UnboundedSender<RawSerialFrame>,
    buffer: BytesMut,
}

/// The test side: inject controller traffic, observe what the driver wrote
struct MockController {
    incoming_tx: mpsc::UnboundedSender<Vec<u8>>,
    written_rx: mpsc::UnboundedReceiver<RawSerialFrame>,
}

fn mock_binding() -> (MockBinding, MockController) {
    let (incoming_tx, incoming_rx) = mpsc::unbounded_channel();
    let (written_tx, written_rx) = mpsc::unbounded_channel();
    (
        MockBinding {
            incoming_rx,
            written_tx,
            buffer: BytesMut::new(),
        },
        MockController {
            incoming_tx,
            written_rx,
        },
    )
}

impl SerialBinding for MockBinding {
    async fn write(&mut self, frame: RawSerialFrame) -> SerialResult<()> {
        let _ = self.written_tx.send(frame);
        Ok(())
    }

    async fn read(&mut self) -> Option<RawSerialFrame> {
        loop {
            if !self.buffer.is_empty() {
                let mut input = self.buffer.clone().freeze();
                if let Ok(frame) = RawSerialFrame::parse(&mut input) {
                    let consumed = self.buffer.len() - input.len();
                    let _ = self.buffer.split_to(consumed);
                    return Some(frame);
                }
            }
            let bytes = self.incoming_rx.recv().await?;
            self.buffer.extend_from_slice(&bytes);
        }
    }
}

impl MockController {
    fn inject(&self, bytes: &[u8]) {
        self.incoming_tx
            .send(bytes.to_vec())
            .expect("driver stopped reading");
    }

    async fn next_written(&mut self) -> RawSerialFrame {
        tokio::time::timeout(Duration::from_secs(3), self.written_rx.recv())
            .await
            .expect("timeout waiting for the driver to write a frame")
            .expect("driver stopped writing")
    }

    /// The next data frame the driver writes, skipping control flow bytes
    async fn expect_data(&mut self) -> Bytes {
        loop {
            if let RawSerialFrame::Data(data) = self.next_written().await {
                return data;
            }
        }
    }

    /// Checks that no data frame goes out within the given window
    async fn assert_no_data(&mut self, window: Duration) {
        let deadline = tokio::time::Instant::now() + window;
        loop {
            let recv = tokio::time::timeout_at(deadline, self.written_rx.recv()).await;
            match recv {
                Err(_) => return,
                Ok(Some(RawSerialFrame::Data(data))) => {
                    panic!("unexpected data frame: 0x{}", hex::encode(&data))
                }
                Ok(Some(_)) => continue,
                Ok(None) => panic!("driver stopped writing"),
            }
        }
    }

    /// Scripted happy-path transmission of one SendData command: ACK,
    /// positive response, OK callback. Returns the CC payload bytes.
    async fn handle_send_data(&mut self) -> Bytes {
        let frame = self.expect_data().await;
        let (command_type, function, payload) = split_frame(&frame);
        assert_eq!(command_type, CommandType::Request);
        assert_eq!(function, 0x13, "expected a SendData frame");

        let callback_id = payload[payload.len() - 1];
        self.inject(&[ACK]);
        self.inject(&build_frame(CommandType::Response, 0x13, &[0x01]));
        self.inject(&build_frame(
            CommandType::Request,
            0x13,
            &[callback_id, 0x00],
        ));

        // node id, cc length, then the CC bytes
        let cc_len = payload[1] as usize;
        payload.slice(2..2 + cc_len)
    }
}

fn build_frame(command_type: CommandType, function: u8, payload: &[u8]) -> Vec<u8> {
    use zwh_core::serialize::Serializable;
    CommandRaw {
        command_type,
        function,
        payload: Bytes::from(payload.to_vec()),
        checksum: 0,
    }
    .as_bytes()
    .to_vec()
}

fn split_frame(frame: &Bytes) -> (CommandType, u8, Bytes) {
    let command_type = CommandType::try_from(frame[2]).expect("invalid command type");
    let function = frame[3];
    let payload = frame.slice(4..frame.len() - 1);
    (command_type, function, payload)
}

fn start_driver() -> (Driver, mpsc::UnboundedReceiver<DriverEvent>, MockController) {
    let (binding, ctrl) = mock_binding();
    let (driver, events) = Driver::start(
        binding,
        Box::new(MemoryCacheBackend::new()),
        DriverOptions::default(),
    );
    (driver, events, ctrl)
}

fn sleeping_protocol_data() -> NodeProtocolData {
    NodeProtocolData {
        listening: false,
        frequent_listening: false,
        routing: true,
        max_data_rate: DataRate::DataRate40k,
        protocol_version: ProtocolVersion::V4_5x_6_0x,
        beaming: true,
        secure: false,
        optional_functionality: false,
        device_class: DeviceClass {
            basic: 0x04,
            generic: 0x10,
            specific: 0x01,
        },
    }
}

fn listening_protocol_data() -> NodeProtocolData {
    NodeProtocolData {
        listening: true,
        ..sleeping_protocol_data()
    }
}

fn insert_node(driver: &Driver, node_id: u8, protocol: NodeProtocolData, ccs: &[CommandClasses]) {
    let mut node = NodeStorage::new(NodeId::new(node_id));
    node.protocol_data = Some(protocol);
    node.awake = protocol.listening;
    for cc in ccs {
        node.root_mut().modify_cc_info(*cc, |info| info.supported = true);
    }
    driver.storage().insert_node(node);
}

async fn next_event(events: &mut mpsc::UnboundedReceiver<DriverEvent>) -> DriverEvent {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("timeout waiting for a driver event")
        .expect("event stream closed")
}

#[tokio::test]
async fn test_controller_command_is_retried_after_nak() {
    let (driver, _events, mut ctrl) = start_driver();

    let request = tokio::spawn({
        let driver = driver.clone();
        async move { driver.get_controller_version().await }
    });

    // First attempt is rejected with NAK
    let first = ctrl.expect_data().await;
    assert_eq!(split_frame(&first).1, 0x15);
    ctrl.inject(&[NAK]);

    // The driver backs off and retransmits the identical frame
    let second = ctrl.expect_data().await;
    assert_eq!(second, first);

    ctrl.inject(&[ACK]);
    let mut payload = b"Z-Wave 7.17\0".to_vec();
    payload.push(0x01);
    ctrl.inject(&build_frame(CommandType::Response, 0x15, &payload));

    let version = request.await.unwrap().unwrap();
    assert_eq!(version.library_version, "Z-Wave 7.17");

    // The driver acknowledged the response frame
    let written = ctrl.next_written().await;
    assert_eq!(
        written,
        RawSerialFrame::ControlFlow(zwh_serial::frame::ControlFlow::ACK)
    );
}

#[tokio::test]
async fn test_corrupt_frame_is_answered_with_nak() {
    let (_driver, _events, mut ctrl) = start_driver();

    // A data frame with a broken checksum
    ctrl.inject(&[0x01, 0x03, 0x00, 0x02, 0xff]);

    let written = ctrl.next_written().await;
    assert_eq!(
        written,
        RawSerialFrame::ControlFlow(zwh_serial::frame::ControlFlow::NAK)
    );
}

#[tokio::test]
async fn test_higher_priority_is_sent_first() {
    let (driver, _events, mut ctrl) = start_driver();

    // Occupy the wire with a first command
    let first = tokio::spawn({
        let driver = driver.clone();
        async move { driver.get_controller_version().await }
    });
    let first_frame = ctrl.expect_data().await;
    assert_eq!(split_frame(&first_frame).1, 0x15);

    // While it is in flight, queue a normal and a controller priority command
    let normal = tokio::spawn({
        let driver = driver.clone();
        async move { driver.get_serial_api_init_data().await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    let controller = tokio::spawn({
        let driver = driver.clone();
        async move { driver.get_controller_id().await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Complete the first command
    ctrl.inject(&[ACK]);
    let mut version = b"Z-Wave 7.17\0".to_vec();
    version.push(0x01);
    ctrl.inject(&build_frame(CommandType::Response, 0x15, &version));
    first.await.unwrap().unwrap();

    // The controller-priority command preempts the earlier normal one
    let next = ctrl.expect_data().await;
    assert_eq!(split_frame(&next).1, 0x20);
    ctrl.inject(&[ACK]);
    ctrl.inject(&build_frame(
        CommandType::Response,
        0x20,
        &[0x01, 0x02, 0x03, 0x04, 0x01],
    ));
    controller.await.unwrap().unwrap();

    let next = ctrl.expect_data().await;
    assert_eq!(split_frame(&next).1, 0x02);
    ctrl.inject(&[ACK]);
    // api version, capabilities, empty node bitmask
    let mut init_data = vec![0x08, 0x08, 29];
    init_data.extend([0u8; 29]);
    ctrl.inject(&build_frame(CommandType::Response, 0x02, &init_data));
    normal.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_transaction_to_sleeping_node_waits_for_wakeup() {
    let (driver, _events, mut ctrl) = start_driver();
    insert_node(&driver, 5, sleeping_protocol_data(), &[CommandClasses::WakeUp]);

    let ping = tokio::spawn({
        let driver = driver.clone();
        async move { driver.ping(NodeId::new(5)).await }
    });

    // The transaction stays parked while the node sleeps
    ctrl.assert_no_data(Duration::from_millis(300)).await;

    // The wake-up notification releases it
    ctrl.inject(&build_frame(
        CommandType::Request,
        0x04,
        &[0x00, 0x05, 0x02, 0x84, 0x07],
    ));

    let cc = ctrl.handle_send_data().await;
    assert_eq!(&cc[..], &[0x00], "expected a NoOperation ping");
    ping.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_interview_resumes_at_first_incomplete_stage() {
    let home_id: u32 = 0x01020304;
    let node = NodeId::new(2);

    // A previous session finished the NodeInfo stage and knows the
    // supported CCs
    let backend = MemoryCacheBackend::with_entries([
        (
            cache_keys::node_field(home_id, node, "interviewStage"),
            CacheValue::UInt8(InterviewStage::NodeInfo.as_u8()),
        ),
        (
            cache_keys::endpoint_field(home_id, node, EndpointIndex::Root, "supportedCCs"),
            CacheValue::Buffer(vec![CommandClasses::BinarySwitch as u8]),
        ),
    ]);

    let (binding, mut ctrl) = mock_binding();
    let (driver, mut events) = Driver::start(binding, Box::new(backend), DriverOptions::default());

    let init = tokio::spawn({
        let driver = driver.clone();
        async move { driver.init().await }
    });

    // Identification: version, ids, init data with nodes 1 (us) and 2
    let frame = ctrl.expect_data().await;
    assert_eq!(split_frame(&frame).1, 0x15);
    ctrl.inject(&[ACK]);
    let mut version = b"Z-Wave 7.17\0".to_vec();
    version.push(0x01);
    ctrl.inject(&build_frame(CommandType::Response, 0x15, &version));

    let frame = ctrl.expect_data().await;
    assert_eq!(split_frame(&frame).1, 0x20);
    ctrl.inject(&[ACK]);
    ctrl.inject(&build_frame(
        CommandType::Response,
        0x20,
        &[0x01, 0x02, 0x03, 0x04, 0x01],
    ));

    let frame = ctrl.expect_data().await;
    assert_eq!(split_frame(&frame).1, 0x02);
    ctrl.inject(&[ACK]);
    let mut init_data = vec![0x08, 0x08, 29];
    let mut bitmask = [0u8; 29];
    bitmask[0] = 0b0000_0011; // nodes 1 and 2
    init_data.extend(bitmask);
    ctrl.inject(&build_frame(CommandType::Response, 0x02, &init_data));

    init.await.unwrap().unwrap();

    // The resumed interview goes straight to the later stages; the only
    // remaining traffic is the dynamic Binary Switch query
    let cc = ctrl.handle_send_data().await;
    assert_eq!(&cc[..], &[0x25, 0x02]);
    ctrl.inject(&build_frame(
        CommandType::Request,
        0x04,
        &[0x00, 0x02, 0x03, 0x25, 0x03, 0xff],
    ));

    // The stage advances monotonically up to Complete
    let mut last_stage = InterviewStage::NodeInfo;
    loop {
        match next_event(&mut events).await {
            DriverEvent::InterviewStageChanged { node_id, stage } => {
                assert_eq!(node_id, node);
                assert!(stage > last_stage, "stage must only advance");
                last_stage = stage;
                if stage == InterviewStage::Complete {
                    break;
                }
            }
            _ => continue,
        }
    }

    // Earlier stages were not repeated
    assert_eq!(driver.interview_stage(node), InterviewStage::Complete);
}

#[tokio::test]
async fn test_supervised_set_updates_value_once_without_poll() {
    let (driver, mut events, mut ctrl) = start_driver();
    insert_node(
        &driver,
        5,
        listening_protocol_data(),
        &[CommandClasses::MultilevelSwitch, CommandClasses::Supervision],
    );

    let set = tokio::spawn({
        let driver = driver.clone();
        async move {
            driver
                .multilevel_switch_set(NodeId::new(5), EndpointIndex::Root, 80, None)
                .await
        }
    });

    let cc = ctrl.handle_send_data().await;
    // Supervision Get wrapping the Multilevel Switch Set
    assert_eq!(&cc[..2], &[0x6c, 0x01]);
    let session_id = cc[2] & 0x3f;
    assert_eq!(&cc[4..], &[0x26, 0x01, 0x50]);

    // The node confirms success
    ctrl.inject(&build_frame(
        CommandType::Request,
        0x04,
        &[0x00, 0x05, 0x04, 0x6c, 0x02, session_id, 0xff],
    ));

    set.await.unwrap().unwrap();

    let value_id = MultilevelSwitchCCValues::current_value()
        .id
        .at(NodeId::new(5), EndpointIndex::Root);
    assert_eq!(
        driver.get_value(&value_id),
        Some(CacheValue::LevelReport(LevelReport::Level(80)))
    );

    // Exactly one value event for the current value
    let mut value_events = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(
            &event,
            DriverEvent::ValueAdded { value_id: id, .. }
            | DriverEvent::ValueUpdated { value_id: id, .. } if *id == value_id
        ) {
            value_events += 1;
        }
    }
    assert_eq!(value_events, 1);

    // Supervision succeeded, so no verification poll goes out
    ctrl.assert_no_data(Duration::from_millis(1500)).await;
}

#[tokio::test]
async fn test_unsupervised_set_schedules_verification_poll() {
    let (driver, _events, mut ctrl) = start_driver();
    insert_node(
        &driver,
        7,
        listening_protocol_data(),
        &[CommandClasses::BinarySwitch],
    );

    let set = tokio::spawn({
        let driver = driver.clone();
        async move {
            driver
                .binary_switch_set(NodeId::new(7), EndpointIndex::Root, true)
                .await
        }
    });

    let cc = ctrl.handle_send_data().await;
    assert_eq!(&cc[..], &[0x25, 0x01, 0xff]);
    set.await.unwrap().unwrap();

    // The value was updated optimistically right away
    let value_id = BinarySwitchCCValues::current_value()
        .id
        .at(NodeId::new(7), EndpointIndex::Root);
    assert_eq!(
        driver.get_value(&value_id),
        Some(CacheValue::BinaryReport(BinaryReport::On))
    );

    // About a second later the driver verifies with a Get
    let cc = ctrl.handle_send_data().await;
    assert_eq!(&cc[..], &[0x25, 0x02]);
    ctrl.inject(&build_frame(
        CommandType::Request,
        0x04,
        &[0x00, 0x07, 0x03, 0x25, 0x03, 0xff],
    ));
}
