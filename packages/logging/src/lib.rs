mod definitions;
pub mod formatters;
pub mod loggers;

pub use definitions::*;
