//! Method bodies: labels, the instruction arena, and the passes that turn it into a `Code`
//! attribute

mod buffer;
mod instruction;
mod jump_encoding;
mod label;

pub use buffer::*;
pub use instruction::*;
pub use jump_encoding::*;
pub use label::*;
