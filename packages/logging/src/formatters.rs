use crate::{Direction, FormattedString, LogFormatter, LogInfo, Loglevel, WithColor};
use termcolor::{Color, ColorSpec};
use zwh_core::log::FlattenLog;

fn level_color(level: Loglevel) -> ColorSpec {
    let mut spec = ColorSpec::new();
    match level {
        Loglevel::Error => spec.set_fg(Some(Color::Red)),
        Loglevel::Warn => spec.set_fg(Some(Color::Yellow)),
        Loglevel::Info => spec.set_fg(Some(Color::Green)),
        Loglevel::Verbose => spec.set_fg(Some(Color::Cyan)),
        Loglevel::Debug => spec.set_fg(Some(Color::Blue)),
        Loglevel::Silly => spec.set_fg(Some(Color::Magenta)),
    };
    spec
}

fn level_tag(level: Loglevel) -> &'static str {
    match level {
        Loglevel::Error => "ERROR",
        Loglevel::Warn => "WARN ",
        Loglevel::Info => "INFO ",
        Loglevel::Verbose => "VERB ",
        Loglevel::Debug => "DEBUG",
        Loglevel::Silly => "SILLY",
    }
}

/// Formats log records into the column layout familiar from the JS driver:
/// timestamp, label, direction, tags, then the payload lines indented
/// beneath.
#[derive(Default)]
pub struct DefaultFormatter;

impl LogFormatter for DefaultFormatter {
    fn format_log(&self, log: &LogInfo, level: Loglevel) -> Vec<FormattedString> {
        let mut ret: Vec<FormattedString> = Vec::new();

        let timestamp = log.timestamp.format("%H:%M:%S%.3f").to_string();
        ret.push(timestamp.into());
        ret.push(" ".into());
        ret.push(level_tag(level).with_color(level_color(level)));
        ret.push(" ".into());

        let mut label_color = ColorSpec::new();
        label_color.set_bold(true);
        ret.push(log.label.with_color(label_color));
        ret.push(" ".into());
        ret.push(log.direction.symbol().into());

        let mut header = String::new();
        if let Some(tags) = &log.primary_tags {
            for tag in tags {
                header.push_str(&format!("[{}] ", tag));
            }
        }
        if let Some(tag) = &log.secondary_tag {
            header.push_str(&format!("({}) ", tag));
        }
        ret.push(header.into());

        let lines = log.payload.flatten_log();
        let mut first = true;
        for line in lines {
            if first {
                first = false;
            } else {
                // Continuation lines are indented past the header columns
                ret.push("\n".into());
                ret.push("                                ".into());
            }
            ret.push(line.into_owned().into());
        }
        ret.push("\n".into());

        ret
    }
}
