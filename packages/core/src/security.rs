pub mod crypto;
mod ctr_drbg;
mod s0;
mod s2;

pub use ctr_drbg::CtrDrbg;
pub use s0::*;
pub use s2::*;
