use super::{ParseResult, Parser, ToLength, combinators::map_parser};
use ::bytes::Bytes;

pub fn many0<I, O, P>(parser: P) -> impl Parser<I, Vec<O>>
where
    I: Clone,
    P: Parser<I, O>,
{
    move |input: &mut I| {
        let mut output = Vec::new();
        while let Ok(o) = parser.parse_peek(input) {
            output.push(o);
        }
        Ok(output)
    }
}

/// Reads a length prefix, then takes that many bytes from the input
pub fn length_data<N, P>(length_parser: P) -> impl Parser<Bytes, Bytes>
where
    P: Parser<Bytes, N>,
    N: ToLength,
{
    move |input: &mut Bytes| {
        let length = length_parser.parse(input)?.to_length();
        super::bytes::complete::take(length).parse(input)
    }
}

/// Reads a length prefix, then runs the value parser on that many bytes
pub fn length_value<O, N, P, PV>(length_parser: P, value_parser: PV) -> impl Parser<Bytes, O>
where
    P: Parser<Bytes, N>,
    N: ToLength,
    PV: Parser<Bytes, O>,
{
    map_parser(length_data(length_parser), value_parser)
}

macro_rules! impl_parser_for_tuple {
    ($($idx:tt),+) => {
        paste::paste! {
            impl<I, $([<P $idx>], [<O $idx>]),+> Parser<I, ($([<O $idx>]),+,)> for ($([<P $idx>]),+,)
            where
                I: Clone,
            $(
                [<P $idx>]: Parser<I, [<O $idx>]>,
            )+
            {
                fn parse(&self, input: &mut I) -> ParseResult<($([<O $idx>]),+,)> {
                    Ok((
                        $(
                            self.$idx.parse(input)?,
                        )+
                    ))
                }
            }
        }
    };
}

impl_parser_for_tuple!(0);
impl_parser_for_tuple!(0, 1);
impl_parser_for_tuple!(0, 1, 2);
impl_parser_for_tuple!(0, 1, 2, 3);
impl_parser_for_tuple!(0, 1, 2, 3, 4);
impl_parser_for_tuple!(0, 1, 2, 3, 4, 5);
