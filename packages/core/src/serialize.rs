use ::bytes::{BufMut, Bytes, BytesMut};

pub mod bytes;
pub mod sequence;

pub const DEFAULT_CAPACITY: usize = 64;
const CAPACITY_INCREMENT: usize = 32;

pub trait Serializable {
    /// Write the value into the given buffer
    fn serialize(&self, output: &mut BytesMut);

    fn as_bytes_mut(&self) -> BytesMut {
        let mut output = BytesMut::with_capacity(DEFAULT_CAPACITY);
        self.serialize(&mut output);
        output
    }

    fn as_bytes(&self) -> Bytes {
        self.as_bytes_mut().freeze()
    }
}

// Convenience implementation of Serializable for functions
impl<F> Serializable for F
where
    F: Fn(&mut BytesMut),
{
    fn serialize(&self, output: &mut BytesMut) {
        self(output)
    }
}

// Options simply skip serialization when empty
impl<T> Serializable for Option<T>
where
    T: Serializable,
{
    fn serialize(&self, output: &mut BytesMut) {
        if let Some(v) = self {
            v.serialize(output);
        }
    }
}

/// A value whose serialization needs additional context, e.g. commands that
/// encode differently depending on the controller's capabilities
pub trait SerializableWith<Context> {
    fn serialize(&self, output: &mut BytesMut, ctx: Context);

    fn as_bytes_mut(&self, ctx: Context) -> BytesMut {
        let mut output = BytesMut::with_capacity(DEFAULT_CAPACITY);
        self.serialize(&mut output, ctx);
        output
    }

    fn as_bytes(&self, ctx: Context) -> Bytes {
        self.as_bytes_mut(ctx).freeze()
    }
}

/// Ensures that the given buffer has enough remaining capacity to write the
/// given number of bytes. Frames usually fit the initial 64 bytes; when they
/// don't, grow in 32 byte increments to keep reallocations rare.
#[inline(always)]
pub(crate) fn ensure_capacity(output: &mut BytesMut, required: usize) {
    if output.remaining_mut() < required {
        let mut additional = CAPACITY_INCREMENT;
        while additional < required {
            additional += CAPACITY_INCREMENT;
        }
        output.reserve(additional);
    }
}
