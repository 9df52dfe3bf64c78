pub mod controller;
pub mod driver;
pub mod node;
pub mod serial;
