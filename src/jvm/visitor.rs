//! Event interfaces between class readers, writers, and whatever sits between them
//!
//! A [`super::ClassReader`] walks a class file and calls a [`ClassVisitor`] for every part of it,
//! in file order. A [`super::ClassWriter`] is a `ClassVisitor` that serializes whatever it is
//! told, so a reader can drive a writer directly. To rewrite part of a class, put a visitor in
//! between that forwards most calls and changes the rest.
//!
//! Every callback has a default implementation that ignores the event, except
//! [`MethodVisitor::new_label`]: labels belong to whoever ends up consuming the code, so a method
//! visitor always has to be able to hand them out.

use super::annotations::AnnotationAttribute;
use super::{
    ClassAccessFlags, ConstantValue, Error, FieldAccessFlags, Handle, InnerClassAccessFlags, Label,
    MethodAccessFlags, VerificationType, Version,
};

/// Verification type in a frame reported to [`MethodVisitor::visit_frame`]
///
/// Uninitialized values refer to the label of their `new` instruction.
pub type FrameType = VerificationType<String, Label>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassHeader {
    pub version: Version,
    pub access: ClassAccessFlags,

    /// Internal name of the class (eg. `java/lang/String`)
    pub name: String,

    /// Internal name of the superclass (`None` only for `java/lang/Object`)
    pub super_name: Option<String>,
    pub interfaces: Vec<String>,

    /// Generic signature
    pub signature: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldHeader {
    pub access: FieldAccessFlags,
    pub name: String,
    pub descriptor: String,
    pub signature: Option<String>,

    /// Initial value of a static field (`ConstantValue` attribute)
    pub constant_value: Option<ConstantValue>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodHeader {
    pub access: MethodAccessFlags,
    pub name: String,
    pub descriptor: String,
    pub signature: Option<String>,

    /// Checked exceptions thrown (`Exceptions` attribute)
    pub exceptions: Vec<String>,
}

/// Entry of the `InnerClasses` attribute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InnerClassEntry {
    pub name: String,
    pub outer_name: Option<String>,
    pub inner_name: Option<String>,
    pub access: InnerClassAccessFlags,
}

/// Attribute that is passed through without being interpreted
///
/// Attributes the reader understands (including annotations) never show up as raw attributes.
/// The rest can still contain constant pool indices, so a raw attribute read from one class is
/// only meaningful if the class it is written into starts from the same constant pool (see
/// [`super::ClassWriter::copying_pool`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawAttribute {
    pub name: String,
    pub info: Vec<u8>,
}

pub trait ClassVisitor {
    fn visit_header(&mut self, _header: &ClassHeader) -> Result<(), Error> {
        Ok(())
    }

    fn visit_source(&mut self, _source_file: &str) -> Result<(), Error> {
        Ok(())
    }

    /// Enclosing class of a local or anonymous class, along with the name and descriptor of the
    /// enclosing method if there is one
    fn visit_outer_class(
        &mut self,
        _owner: &str,
        _method: Option<(&str, &str)>,
    ) -> Result<(), Error> {
        Ok(())
    }

    fn visit_nest_host(&mut self, _host: &str) -> Result<(), Error> {
        Ok(())
    }

    fn visit_nest_member(&mut self, _member: &str) -> Result<(), Error> {
        Ok(())
    }

    fn visit_inner_class(&mut self, _inner_class: &InnerClassEntry) -> Result<(), Error> {
        Ok(())
    }

    fn visit_attribute(&mut self, _attribute: &RawAttribute) -> Result<(), Error> {
        Ok(())
    }

    fn visit_annotations(&mut self, _attribute: &AnnotationAttribute) -> Result<(), Error> {
        Ok(())
    }

    /// Returns the visitor for the field's contents, or `None` to skip them
    fn visit_field(
        &mut self,
        _header: &FieldHeader,
    ) -> Result<Option<Box<dyn FieldVisitor + '_>>, Error> {
        Ok(None)
    }

    /// Returns the visitor for the method's contents, or `None` to skip them
    fn visit_method(
        &mut self,
        _header: &MethodHeader,
    ) -> Result<Option<Box<dyn MethodVisitor + '_>>, Error> {
        Ok(None)
    }

    fn visit_end(&mut self) -> Result<(), Error> {
        Ok(())
    }
}

pub trait FieldVisitor {
    fn visit_attribute(&mut self, _attribute: &RawAttribute) -> Result<(), Error> {
        Ok(())
    }

    fn visit_annotations(&mut self, _attribute: &AnnotationAttribute) -> Result<(), Error> {
        Ok(())
    }

    fn visit_end(&mut self) -> Result<(), Error> {
        Ok(())
    }
}

/// Visitor for the contents of a method
///
/// Calls come in this order: attributes and annotations, then (if the method has code)
/// `visit_code`, try/catch blocks, instructions interleaved with labels, line numbers and frames,
/// local variables, unknown attributes of the code, `visit_maxs`, and finally `visit_end`.
///
/// Instructions come in normalized form: `iload_0` is `iload 0`, `wide` is folded into the
/// instruction it widens, `ldc_w`/`ldc2_w` are `ldc`, and `goto_w`/`jsr_w` are `goto`/`jsr`.
pub trait MethodVisitor {
    /// Create a fresh label for this method
    fn new_label(&mut self) -> Label;

    fn visit_attribute(&mut self, _attribute: &RawAttribute) -> Result<(), Error> {
        Ok(())
    }

    fn visit_annotations(&mut self, _attribute: &AnnotationAttribute) -> Result<(), Error> {
        Ok(())
    }

    fn visit_code(&mut self) -> Result<(), Error> {
        Ok(())
    }

    /// Instruction without operands
    fn visit_insn(&mut self, _opcode: u8) -> Result<(), Error> {
        Ok(())
    }

    /// `bipush`, `sipush`, or `newarray` (whose operand is the `T_*` array type code)
    fn visit_int_insn(&mut self, _opcode: u8, _operand: i32) -> Result<(), Error> {
        Ok(())
    }

    /// Load, store, or `ret`
    fn visit_var_insn(&mut self, _opcode: u8, _var: u16) -> Result<(), Error> {
        Ok(())
    }

    /// `new`, `anewarray`, `checkcast`, or `instanceof`, with an internal name (or array
    /// descriptor)
    fn visit_type_insn(&mut self, _opcode: u8, _class: &str) -> Result<(), Error> {
        Ok(())
    }

    fn visit_field_insn(
        &mut self,
        _opcode: u8,
        _owner: &str,
        _name: &str,
        _descriptor: &str,
    ) -> Result<(), Error> {
        Ok(())
    }

    fn visit_method_insn(
        &mut self,
        _opcode: u8,
        _owner: &str,
        _name: &str,
        _descriptor: &str,
        _is_interface: bool,
    ) -> Result<(), Error> {
        Ok(())
    }

    fn visit_invoke_dynamic_insn(
        &mut self,
        _name: &str,
        _descriptor: &str,
        _bootstrap: &Handle,
        _bootstrap_arguments: &[ConstantValue],
    ) -> Result<(), Error> {
        Ok(())
    }

    /// Conditional jump, `goto`, or `jsr`
    fn visit_jump_insn(&mut self, _opcode: u8, _target: Label) -> Result<(), Error> {
        Ok(())
    }

    /// Mark the position of the next instruction
    fn visit_label(&mut self, _label: Label) -> Result<(), Error> {
        Ok(())
    }

    fn visit_ldc_insn(&mut self, _constant: &ConstantValue) -> Result<(), Error> {
        Ok(())
    }

    fn visit_iinc_insn(&mut self, _var: u16, _increment: i16) -> Result<(), Error> {
        Ok(())
    }

    fn visit_table_switch_insn(
        &mut self,
        _low: i32,
        _high: i32,
        _default: Label,
        _targets: &[Label],
    ) -> Result<(), Error> {
        Ok(())
    }

    fn visit_lookup_switch_insn(
        &mut self,
        _default: Label,
        _keys: &[i32],
        _targets: &[Label],
    ) -> Result<(), Error> {
        Ok(())
    }

    fn visit_multi_anew_array_insn(&mut self, _class: &str, _dimensions: u8) -> Result<(), Error> {
        Ok(())
    }

    /// Exception handler covering `[start, end)`, catching `catch_type` (or everything)
    fn visit_try_catch_block(
        &mut self,
        _start: Label,
        _end: Label,
        _handler: Label,
        _catch_type: Option<&str>,
    ) -> Result<(), Error> {
        Ok(())
    }

    fn visit_local_variable(
        &mut self,
        _name: &str,
        _descriptor: &str,
        _signature: Option<&str>,
        _start: Label,
        _end: Label,
        _index: u16,
    ) -> Result<(), Error> {
        Ok(())
    }

    fn visit_line_number(&mut self, _line: u16, _start: Label) -> Result<(), Error> {
        Ok(())
    }

    /// Frame found in the class file, in expanded form (full locals and stack)
    ///
    /// This is only advisory: writers compute their own frames.
    fn visit_frame(&mut self, _locals: &[FrameType], _stack: &[FrameType]) -> Result<(), Error> {
        Ok(())
    }

    /// Attribute of the `Code` attribute that the reader does not interpret
    ///
    /// These usually refer to code offsets of the method as it was read (eg. type annotations
    /// on local variables), which stop being meaningful once the code is rewritten.
    fn visit_code_attribute(&mut self, _attribute: &RawAttribute) -> Result<(), Error> {
        Ok(())
    }

    fn visit_maxs(&mut self, _max_stack: u16, _max_locals: u16) -> Result<(), Error> {
        Ok(())
    }

    fn visit_end(&mut self) -> Result<(), Error> {
        Ok(())
    }
}
