mod soft_reset;

pub use soft_reset::*;
