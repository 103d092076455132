//! Serializing visitor calls into class files

mod class_writer;
mod field_writer;
mod method_writer;
mod settings;

pub use class_writer::*;
pub use field_writer::*;
pub use method_writer::*;
pub use settings::*;
