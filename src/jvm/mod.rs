//! Reading, rewriting, and assembling JVM class files

mod access_flags;
pub mod annotations;
pub mod attributes;
mod binary_format;
pub mod code;
mod constants;
pub mod descriptors;
mod errors;
pub mod opcodes;
mod printer;
pub mod reader;
pub mod verifier;
mod version;
pub mod visitor;
pub mod writer;

pub use access_flags::*;
pub use binary_format::*;
pub use code::{InstructionBuffer, Label, LabelGenerator};
pub use constants::*;
pub use errors::*;
pub use printer::*;
pub use reader::{ClassReader, ReaderFlags};
pub use verifier::{
    ClassGraph, ClassHierarchy, MergePolicy, StackMapFrame, UnknownHierarchy, VerificationType,
};
pub use version::*;
pub use visitor::{ClassVisitor, FieldVisitor, MethodVisitor};
pub use writer::{ClassWriter, ComputeMode, WriterSettings};
