//! Decoding class files into visitor calls

mod annotation_reader;
mod class_reader;
mod code_reader;
mod input;

pub use class_reader::*;
pub(crate) use input::Input;

use bitflags::bitflags;

bitflags! {
    /// Parts of a class file that [`ClassReader::accept`] leaves out
    #[derive(Default)]
    pub struct ReaderFlags: u8 {
        /// Do not visit method code at all
        const SKIP_CODE = 0x01;

        /// Drop `SourceFile`, `LineNumberTable`, `LocalVariableTable`, and
        /// `LocalVariableTypeTable`
        const SKIP_DEBUG = 0x02;

        /// Do not decode `StackMapTable` into `visit_frame` calls
        const SKIP_FRAMES = 0x04;
    }
}
