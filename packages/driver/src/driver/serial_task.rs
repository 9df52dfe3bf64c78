use std::sync::Arc;
use tokio::sync::mpsc;
use zwh_logging::loggers::serial::SerialLogger;
use zwh_logging::{Direction, ImmutableLogger};
use zwh_serial::binding::SerialBinding;
use zwh_serial::frame::RawSerialFrame;
use zwh_core::serialize::Serializable;

enum Step {
    Write(RawSerialFrame),
    Deliver(RawSerialFrame),
    Stop,
}

/// Owns the serial binding: forwards frames from the port to the scheduler
/// and writes outgoing frames in order
pub(crate) struct SerialTask<B> {
    binding: B,
    write_rx: mpsc::UnboundedReceiver<RawSerialFrame>,
    frame_tx: mpsc::UnboundedSender<RawSerialFrame>,
    log: SerialLogger,
}

impl<B: SerialBinding> SerialTask<B> {
    pub fn new(
        binding: B,
        write_rx: mpsc::UnboundedReceiver<RawSerialFrame>,
        frame_tx: mpsc::UnboundedSender<RawSerialFrame>,
        logger: Arc<dyn ImmutableLogger>,
    ) -> Self {
        Self {
            binding,
            write_rx,
            frame_tx,
            log: SerialLogger::new(logger),
        }
    }

    pub async fn run(mut self) {
        loop {
            let step = tokio::select! {
                biased;

                frame = self.write_rx.recv() => match frame {
                    Some(frame) => Step::Write(frame),
                    // The driver dropped its write handle: shut down
                    None => Step::Stop,
                },

                frame = self.binding.read() => match frame {
                    Some(frame) => Step::Deliver(frame),
                    None => Step::Stop,
                },
            };

            match step {
                Step::Write(frame) => {
                    match &frame {
                        RawSerialFrame::ControlFlow(cf) => {
                            self.log.control_flow(cf.name(), Direction::Outbound)
                        }
                        other => self.log.data(&other.as_bytes(), Direction::Outbound),
                    }
                    if self.binding.write(frame).await.is_err() {
                        break;
                    }
                }
                Step::Deliver(frame) => {
                    match &frame {
                        RawSerialFrame::ControlFlow(cf) => {
                            self.log.control_flow(cf.name(), Direction::Inbound)
                        }
                        RawSerialFrame::Data(data) => self.log.data(data, Direction::Inbound),
                        RawSerialFrame::Garbage(data) => self.log.discarded(data),
                    }
                    if self.frame_tx.send(frame).is_err() {
                        break;
                    }
                }
                Step::Stop => break,
            }
        }
        // Dropping frame_tx tells the scheduler the transport is gone
    }
}
