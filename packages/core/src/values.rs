mod binary;
mod duration;
mod level;

pub use binary::*;
pub use duration::*;
pub use level::*;

/// Some wire values have multiple encodings for the same meaning. This trait
/// maps them onto the preferred one, e.g. for comparisons.
pub trait Canonical {
    fn to_canonical(&self) -> Self;
}
