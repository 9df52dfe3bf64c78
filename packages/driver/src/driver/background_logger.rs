use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use termcolor::{ColorChoice, StandardStream, WriteColor};
use tokio::sync::mpsc;
use zwh_logging::formatters::DefaultFormatter;
use zwh_logging::{ImmutableLogger, LogFormatter, LogInfo, Loglevel};

fn level_to_u8(level: Loglevel) -> u8 {
    match level {
        Loglevel::Error => 0,
        Loglevel::Warn => 1,
        Loglevel::Info => 2,
        Loglevel::Verbose => 3,
        Loglevel::Debug => 4,
        Loglevel::Silly => 5,
    }
}

fn u8_to_level(level: u8) -> Loglevel {
    match level {
        0 => Loglevel::Error,
        1 => Loglevel::Warn,
        2 => Loglevel::Info,
        3 => Loglevel::Verbose,
        4 => Loglevel::Debug,
        _ => Loglevel::Silly,
    }
}

/// Forwards log records over a channel to a writer task, so logging never
/// blocks the scheduler on console I/O
pub struct BackgroundLogger {
    tx: mpsc::UnboundedSender<(LogInfo, Loglevel)>,
    level: AtomicU8,
}

impl BackgroundLogger {
    pub fn spawn(level: Loglevel) -> Arc<Self> {
        let (tx, mut rx) = mpsc::unbounded_channel::<(LogInfo, Loglevel)>();

        tokio::spawn(async move {
            let formatter = DefaultFormatter;
            let mut out = StandardStream::stderr(ColorChoice::Auto);
            while let Some((log, level)) = rx.recv().await {
                for part in formatter.format_log(&log, level) {
                    match part.color {
                        Some(color) => {
                            let _ = out.set_color(&color);
                            let _ = write!(out, "{}", part.string);
                            let _ = out.reset();
                        }
                        None => {
                            let _ = write!(out, "{}", part.string);
                        }
                    }
                }
            }
        });

        Arc::new(Self {
            tx,
            level: AtomicU8::new(level_to_u8(level)),
        })
    }
}

impl ImmutableLogger for BackgroundLogger {
    fn log(&self, log: LogInfo, level: Loglevel) {
        let _ = self.tx.send((log, level));
    }

    fn log_level(&self) -> Loglevel {
        u8_to_level(self.level.load(Ordering::Relaxed))
    }

    fn set_log_level(&self, level: Loglevel) {
        self.level.store(level_to_u8(level), Ordering::Relaxed);
    }
}
