mod command_classes;
mod command_type;
mod endpoint_index;
mod frame_addressing;
mod function_type;
mod node_id;
mod node_info;
mod security_class;
mod transmit;

pub use command_classes::*;
pub use command_type::*;
pub use endpoint_index::*;
pub use frame_addressing::*;
pub use function_type::*;
pub use node_id::*;
pub use node_info::*;
pub use security_class::*;
pub use transmit::*;
