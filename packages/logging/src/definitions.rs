use chrono::{DateTime, Utc};
use std::borrow::Cow;
use termcolor::ColorSpec;
use typed_builder::TypedBuilder;
use zwh_core::log::LogPayload;

pub trait LogFormatter {
    fn format_log(&self, log: &LogInfo, level: Loglevel) -> Vec<FormattedString>;
}

pub struct FormattedString {
    pub string: Cow<'static, str>,
    pub color: Option<ColorSpec>,
}

impl FormattedString {
    pub fn new(string: impl Into<Cow<'static, str>>, color: Option<ColorSpec>) -> Self {
        Self {
            string: string.into(),
            color,
        }
    }
}

impl<T> From<T> for FormattedString
where
    T: Into<Cow<'static, str>>,
{
    fn from(string: T) -> Self {
        Self::new(string, None)
    }
}

pub trait WithColor {
    fn with_color(self, color: ColorSpec) -> FormattedString;
}

impl<T> WithColor for T
where
    T: Into<Cow<'static, str>>,
{
    fn with_color(self, color: ColorSpec) -> FormattedString {
        FormattedString::new(self, Some(color))
    }
}

/// A log sink that does not require mutability. Typically an abstraction
/// over a channel to the task doing the actual writing, so the hot path
/// never blocks on console I/O.
pub trait ImmutableLogger: Send + Sync {
    fn log(&self, log: LogInfo, level: Loglevel);

    fn log_level(&self) -> Loglevel;
    fn set_log_level(&self, level: Loglevel);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Loglevel {
    Error,
    Warn,
    Info,
    Verbose,
    Debug,
    Silly,
}

#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    #[default]
    None,
    Inbound,
    Outbound,
}

impl Direction {
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::None => "  ",
            Self::Inbound => "« ",
            Self::Outbound => "» ",
        }
    }
}

#[derive(Clone, TypedBuilder)]
pub struct LogInfo {
    #[builder(default = Utc::now())]
    pub timestamp: DateTime<Utc>,
    #[builder(default)]
    pub direction: Direction,
    pub label: &'static str,
    #[builder(default, setter(strip_option))]
    pub primary_tags: Option<Vec<Cow<'static, str>>>,
    #[builder(default, setter(strip_option))]
    pub secondary_tag: Option<Cow<'static, str>>,
    #[builder(setter(into))]
    pub payload: LogPayload,
}
