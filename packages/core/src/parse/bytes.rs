use super::{Needed, ParseError, ParseResult, Parser};
use ::bytes::{Buf, Bytes};

/// Parsers that fail with [ParseError::Incomplete] when the input is too
/// short. Used where more data may still arrive, e.g. the serial framing.
pub mod streaming {
    use super::*;

    pub fn take(count: impl Into<usize>) -> impl Parser<Bytes, Bytes> {
        let count: usize = count.into();
        move |input: &mut Bytes| {
            let needed = count.saturating_sub(input.len());
            if needed > 0 {
                Err(ParseError::Incomplete(Needed::Size(needed)))
            } else {
                Ok(input.split_to(count))
            }
        }
    }

    pub fn take_while1(predicate: impl Fn(u8) -> bool) -> impl Parser<Bytes, Bytes> {
        move |input: &mut Bytes| {
            if input.is_empty() {
                return Err(ParseError::Incomplete(Needed::Size(1)));
            }

            match input.iter().position(|v| !predicate(*v)) {
                // We need at least one byte that matches the predicate
                Some(0) => Err(ParseError::recoverable(())),
                Some(pos) => Ok(input.split_to(pos)),
                None => Ok(input.split_to(input.len())),
            }
        }
    }

    pub fn literal(lit: u8) -> impl Parser<Bytes, u8> {
        move |input: &mut Bytes| {
            let b = take(1usize).parse(input)?.get_u8();
            if b == lit {
                Ok(lit)
            } else {
                Err(ParseError::recoverable(()))
            }
        }
    }
}

/// Parsers that treat the end of the input as final. Used for payloads that
/// have been fully received.
pub mod complete {
    use super::*;
    use crate::parse::combinators;

    fn map_incomplete<O>(res: ParseResult<O>) -> ParseResult<O> {
        match res {
            Err(ParseError::Incomplete(_)) => Err(ParseError::recoverable(())),
            _ => res,
        }
    }

    pub fn take(count: impl Into<usize>) -> impl Parser<Bytes, Bytes> {
        let parser = streaming::take(count);
        move |input: &mut Bytes| map_incomplete(parser.parse(input))
    }

    pub fn literal(lit: u8) -> impl Parser<Bytes, u8> {
        let parser = streaming::literal(lit);
        move |input: &mut Bytes| map_incomplete(parser.parse(input))
    }

    /// Consumes the given number of bytes without producing any output
    pub fn skip(count: impl Into<usize>) -> impl Parser<Bytes, ()> {
        combinators::map(take(count), |_| ())
    }
}

pub fn rest(input: &mut Bytes) -> ParseResult<Bytes> {
    Ok(input.split_to(input.len()))
}

macro_rules! impl_int {
    ($un:ident, $bytes:literal) => {
        paste::paste! {
            pub fn [<be_ $un>](input: &mut Bytes) -> ParseResult<$un> {
                if input.remaining() < $bytes {
                    Err(ParseError::Incomplete(Needed::Size($bytes - input.remaining())))
                } else {
                    Ok(input.[<get_ $un>]())
                }
            }
        }
    };
}

impl_int!(u8, 1);
impl_int!(u16, 2);
impl_int!(u32, 4);
impl_int!(i8, 1);

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_take_streaming() {
        let mut input = Bytes::from_static(&[1, 2, 3]);
        assert_eq!(
            streaming::take(2usize).parse(&mut input),
            Ok(Bytes::from_static(&[1, 2]))
        );
        assert_eq!(
            streaming::take(2usize).parse(&mut input),
            Err(ParseError::Incomplete(Needed::Size(1)))
        );
    }

    #[test]
    fn test_be_uints() {
        let mut input = Bytes::from_static(&[0x01, 0x02, 0x03]);
        assert_eq!(be_u8(&mut input), Ok(0x01));
        assert_eq!(be_u16(&mut input), Ok(0x0203));
        assert!(matches!(be_u8(&mut input), Err(ParseError::Incomplete(_))));
    }
}
