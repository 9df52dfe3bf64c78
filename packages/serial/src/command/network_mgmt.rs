mod get_node_protocol_info;
mod request_node_info;

pub use get_node_protocol_info::*;
pub use request_node_info::*;
