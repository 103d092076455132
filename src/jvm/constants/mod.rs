//! Constant pool of a class file
//!
//! [`ConstantPool`] is the interning table: every cross reference inside a class file (class
//! names, member references, string literals, ...) is an index into it. [`ConstantValue`] is the
//! index free view of loadable constants that the visitor interfaces use.

mod constant;
mod pool;
mod utf8;
mod value;

pub use constant::*;
pub use pool::*;
pub use utf8::*;
pub use value::*;
