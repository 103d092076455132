mod byte_vector;
mod offset_vec;

pub use byte_vector::*;
pub use offset_vec::*;
