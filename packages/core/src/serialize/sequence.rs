use super::Serializable;
use ::bytes::BytesMut;

pub trait List {
    fn write_all(&self, output: &mut BytesMut);
}

pub fn tuple<L>(tuple: L) -> impl Serializable
where
    L: List,
{
    move |output: &mut BytesMut| tuple.write_all(output)
}

macro_rules! impl_list_for_tuple {
    ($($idx:tt),+) => {
        paste::paste! {
            impl<$([<E $idx>]),+> List for ($([<E $idx>]),+,)
            where
            $(
                [<E $idx>]: Serializable,
            )+
            {
                fn write_all(&self, output: &mut BytesMut) {
                    $(
                        self.$idx.serialize(output);
                    )+
                }
            }
        }
    };
}

impl_list_for_tuple!(0);
impl_list_for_tuple!(0, 1);
impl_list_for_tuple!(0, 1, 2);
impl_list_for_tuple!(0, 1, 2, 3);
impl_list_for_tuple!(0, 1, 2, 3, 4);
impl_list_for_tuple!(0, 1, 2, 3, 4, 5);
impl_list_for_tuple!(0, 1, 2, 3, 4, 5, 6);
impl_list_for_tuple!(0, 1, 2, 3, 4, 5, 6, 7);
