use ::bytes::Bytes;
use std::borrow::Cow;
use std::fmt::{Debug, Display};
use thiserror::Error;

pub mod bytes;
pub mod combinators;
pub mod multi;

/// A type that can be parsed from a byte buffer. Parsing consumes from the
/// cursor, even in the error case - use [Parser::parse_peek] to try without
/// consuming.
pub trait Parsable
where
    Self: Sized,
{
    fn parse(i: &mut Bytes) -> ParseResult<Self>;
}

pub trait Parser<I: Clone, O = Self> {
    /// Execute the parser on the input, advancing the input
    fn parse(&self, input: &mut I) -> ParseResult<O>;

    /// Execute the parser on the input, advancing the input only in case of success
    fn parse_peek(&self, input: &mut I) -> ParseResult<O> {
        let checkpoint = input.clone();
        let res = self.parse(input);
        if res.is_err() {
            *input = checkpoint;
        }
        res
    }
}

// Convenience implementation of Parser for functions
impl<I, O, F> Parser<I, O> for F
where
    I: Clone,
    F: Fn(&mut I) -> ParseResult<O>,
{
    fn parse(&self, input: &mut I) -> ParseResult<O> {
        self(input)
    }
}

/// Anything that can act as a length prefix
pub trait ToLength {
    fn to_length(&self) -> usize;
}

macro_rules! impl_to_length {
    ($($t:ty),+) => {
        $(
            impl ToLength for $t {
                fn to_length(&self) -> usize {
                    *self as usize
                }
            }
        )+
    };
}

impl_to_length!(u8, u16, u32, usize);

#[derive(Debug, Clone, PartialEq)]
pub enum Needed {
    Unknown,
    Size(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ErrorContext {
    None,
    String(Cow<'static, str>),
    Validation(Cow<'static, str>),
    /// Decryption or authentication failed. Distinguished so the driver can
    /// run its resynchronization logic.
    Security(Cow<'static, str>),
}

impl Display for ErrorContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorContext::None => write!(f, "No context"),
            ErrorContext::String(s) | ErrorContext::Validation(s) | ErrorContext::Security(s) => {
                write!(f, "{}", s)
            }
        }
    }
}

impl From<()> for ErrorContext {
    fn from(_: ()) -> Self {
        ErrorContext::None
    }
}

impl From<&'static str> for ErrorContext {
    fn from(s: &'static str) -> Self {
        ErrorContext::String(s.into())
    }
}

impl From<String> for ErrorContext {
    fn from(s: String) -> Self {
        ErrorContext::String(s.into())
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("Incomplete data: {0:?} bytes needed")]
    Incomplete(Needed),
    #[error("Recoverable error: {0}")]
    Recoverable(ErrorContext),
    #[error("{0}")]
    Final(ErrorContext),
}

impl ParseError {
    pub fn needed(n: usize) -> Self {
        ParseError::Incomplete(Needed::Size(n))
    }

    pub fn recoverable(ctx: impl Into<ErrorContext>) -> Self {
        ParseError::Recoverable(ctx.into())
    }

    pub fn final_error(ctx: impl Into<ErrorContext>) -> Self {
        ParseError::Final(ctx.into())
    }

    pub fn validation_failure(ctx: impl Into<Cow<'static, str>>) -> Self {
        ParseError::Final(ErrorContext::Validation(ctx.into()))
    }

    pub fn security_failure(ctx: impl Into<Cow<'static, str>>) -> Self {
        ParseError::Final(ErrorContext::Security(ctx.into()))
    }

    pub fn is_security_failure(&self) -> bool {
        matches!(
            self,
            ParseError::Final(ErrorContext::Security(_))
                | ParseError::Recoverable(ErrorContext::Security(_))
        )
    }

    pub fn context(&self) -> Option<ErrorContext> {
        match self {
            ParseError::Recoverable(ctx) | ParseError::Final(ctx) => Some(ctx.clone()),
            _ => None,
        }
    }
}

pub type ParseResult<O> = Result<O, ParseError>;

/// Validates that the given condition is satisfied, otherwise aborts parsing
/// with the given error message and no partial state.
pub fn validate(condition: bool, message: impl Into<Cow<'static, str>>) -> ParseResult<()> {
    if condition {
        Ok(())
    } else {
        Err(ParseError::validation_failure(message))
    }
}

/// Returns a Parse error indicating that a validation failed.
pub fn fail_validation<T>(message: impl Into<Cow<'static, str>>) -> ParseResult<T> {
    Err(ParseError::validation_failure(message))
}

#[derive(Error, Debug, PartialEq)]
pub enum TryFromReprError<T: Debug> {
    #[error("{0:?} is not a valid value for this enum")]
    Invalid(T),
}

impl<T> From<TryFromReprError<T>> for ParseError
where
    T: Debug,
{
    fn from(value: TryFromReprError<T>) -> Self {
        Self::recoverable(format!("{:?}", value))
    }
}

// The TryFromPrimitive derive emits TryFrom<$repr> with Error = $repr
impl From<u8> for ParseError {
    fn from(value: u8) -> Self {
        Self::recoverable(format!("unexpected discriminant {:#04x}", value))
    }
}
