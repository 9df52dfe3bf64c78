use std::borrow::Cow;

const NESTED_INDENT: &str = "  ";

/// Split a (possibly multi-line) message into individual log lines
pub fn to_lines(text: impl Into<Cow<'static, str>>) -> Vec<Cow<'static, str>> {
    let text = text.into();
    match text {
        Cow::Borrowed(b) => b.lines().map(Cow::Borrowed).collect(),
        Cow::Owned(o) => o.lines().map(|l| Cow::Owned(l.to_owned())).collect(),
    }
}

pub trait ToLogPayload {
    fn to_log_payload(&self) -> LogPayload;
}

impl ToLogPayload for String {
    fn to_log_payload(&self) -> LogPayload {
        LogPayload::Flat(to_lines(self.to_owned()))
    }
}

impl ToLogPayload for &'static str {
    fn to_log_payload(&self) -> LogPayload {
        LogPayload::Flat(to_lines(*self))
    }
}

pub trait FlattenLog {
    fn flatten_log(&self) -> Vec<Cow<'static, str>>;
}

#[derive(Clone)]
pub enum LogPayload {
    Text(LogPayloadText),
    Dict(LogPayloadDict),
    Flat(Vec<Cow<'static, str>>),
}

impl LogPayload {
    pub fn empty() -> Self {
        Self::Flat(Vec::new())
    }
}

impl From<LogPayloadText> for LogPayload {
    fn from(text: LogPayloadText) -> Self {
        Self::Text(text)
    }
}

impl From<LogPayloadDict> for LogPayload {
    fn from(dict: LogPayloadDict) -> Self {
        Self::Dict(dict)
    }
}

impl From<String> for LogPayload {
    fn from(value: String) -> Self {
        value.to_log_payload()
    }
}

impl From<&'static str> for LogPayload {
    fn from(value: &'static str) -> Self {
        value.to_log_payload()
    }
}

impl FlattenLog for LogPayload {
    fn flatten_log(&self) -> Vec<Cow<'static, str>> {
        match self {
            LogPayload::Text(text) => text.flatten_log(),
            LogPayload::Dict(dict) => dict.flatten_log(),
            LogPayload::Flat(lines) => lines.clone(),
        }
    }
}

#[derive(Clone)]
pub struct LogPayloadText {
    pub lines: Vec<Cow<'static, str>>,
    pub nested: Option<Box<LogPayload>>,
}

impl LogPayloadText {
    pub fn new(text: impl Into<Cow<'static, str>>) -> Self {
        Self {
            lines: to_lines(text),
            nested: None,
        }
    }

    pub fn with_nested(mut self, nested: impl Into<LogPayload>) -> Self {
        self.nested = Some(Box::new(nested.into()));
        self
    }
}

impl FlattenLog for LogPayloadText {
    fn flatten_log(&self) -> Vec<Cow<'static, str>> {
        let mut ret = self.lines.clone();
        if let Some(nested) = &self.nested {
            ret.extend(
                nested
                    .flatten_log()
                    .iter()
                    .map(|item| Cow::Owned(format!("{}{}", NESTED_INDENT, item))),
            );
        }
        ret
    }
}

#[derive(Default, Clone)]
pub struct LogPayloadDict {
    pub entries: Vec<(Cow<'static, str>, LogPayloadDictValue)>,
    pub nested: Option<Box<LogPayload>>,
}

impl LogPayloadDict {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(
        mut self,
        key: impl Into<Cow<'static, str>>,
        value: impl Into<LogPayloadDictValue>,
    ) -> Self {
        self.entries.push((key.into(), value.into()));
        self
    }

    pub fn with_nested(mut self, nested: impl Into<LogPayload>) -> Self {
        self.nested = Some(Box::new(nested.into()));
        self
    }

    pub fn extend(mut self, other: LogPayloadDict) -> Self {
        self.entries.extend(other.entries);
        self
    }
}

impl FlattenLog for LogPayloadDict {
    fn flatten_log(&self) -> Vec<Cow<'static, str>> {
        let mut ret: Vec<Cow<'static, str>> = self
            .entries
            .iter()
            .map(|(key, value)| Cow::Owned(format!("{}: {}", key, value)))
            .collect();
        if let Some(nested) = &self.nested {
            ret.extend(
                nested
                    .flatten_log()
                    .iter()
                    .map(|item| Cow::Owned(format!("{}{}", NESTED_INDENT, item))),
            );
        }
        ret
    }
}

#[derive(Clone)]
pub struct LogPayloadDictValue(Cow<'static, str>);

impl std::fmt::Display for LogPayloadDictValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

macro_rules! impl_dict_value_via_display {
    ($($t:ty),+) => {
        $(
            impl From<$t> for LogPayloadDictValue {
                fn from(value: $t) -> Self {
                    Self(value.to_string().into())
                }
            }
        )+
    };
}

impl_dict_value_via_display!(bool, u8, u16, u32, usize, i32, String);

impl From<&'static str> for LogPayloadDictValue {
    fn from(value: &'static str) -> Self {
        Self(value.into())
    }
}

impl From<Cow<'static, str>> for LogPayloadDictValue {
    fn from(value: Cow<'static, str>) -> Self {
        Self(value)
    }
}
