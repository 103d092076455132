use super::class_writer::write_member;
use super::ClassWriter;
use crate::jvm::attributes::{write_attribute, Attribute, Exceptions, Signature};
use crate::jvm::code::{InstructionBuffer, Insn, LocalVariable, MethodContext, TryCatch};
use crate::jvm::descriptors::{FieldType, MethodDescriptor, ParseDescriptor};
use crate::jvm::annotations::AnnotationAttribute;
use crate::jvm::opcodes::{
    operand_kind, OperandKind, BIPUSH, GOTO, GOTO_W, ILOAD, ILOAD_0, ISTORE, ISTORE_0, JSR,
    JSR_W, LOOKUPSWITCH, MULTIANEWARRAY, NEWARRAY, SIPUSH, TABLESWITCH, T_BOOLEAN, T_LONG,
};
use crate::jvm::verifier::WithClass;
use crate::jvm::visitor::{FrameType, MethodHeader, MethodVisitor, RawAttribute};
use crate::jvm::{
    ClassAccessFlags, ConstantValue, Error, Handle, Label, MethodAccessFlags, Serialize,
    Utf8ConstantIndex,
};
use crate::util::ByteVector;

/// Writes one method into its [`ClassWriter`] when the method is ended
///
/// Instructions are interned as they come in and accumulate in an [`InstructionBuffer`]. Labels
/// handed out by [`MethodVisitor::new_label`] belong to that buffer. On `visit_end`, the buffer
/// is finished (jump widths, frames, maxs) into the `Code` attribute.
pub struct MethodWriter<'a> {
    class: &'a mut ClassWriter,
    name: String,
    descriptor: MethodDescriptor,
    access: MethodAccessFlags,
    name_index: Utf8ConstantIndex,
    descriptor_index: Utf8ConstantIndex,
    attribute_count: u16,
    attributes: ByteVector,
    code: InstructionBuffer,
    has_code: bool,
}

impl<'a> MethodWriter<'a> {
    pub(super) fn new(
        class: &'a mut ClassWriter,
        header: &MethodHeader,
        descriptor: MethodDescriptor,
    ) -> Result<MethodWriter<'a>, Error> {
        let constants = &mut class.constants;
        let name_index = constants.get_utf8(&header.name)?;
        let descriptor_index = constants.get_utf8(&header.descriptor)?;

        let mut attributes = ByteVector::new();
        let mut attribute_count = 0;
        if let Some(signature) = &header.signature {
            let signature = Signature(constants.get_utf8(signature)?);
            write_attribute(&mut attributes, constants, &signature)?;
            attribute_count += 1;
        }
        if !header.exceptions.is_empty() {
            let exceptions = header
                .exceptions
                .iter()
                .map(|exception| constants.get_class(exception))
                .collect::<Result<Vec<_>, Error>>()?;
            write_attribute(&mut attributes, constants, &Exceptions(exceptions))?;
            attribute_count += 1;
        }

        Ok(MethodWriter {
            class,
            name: header.name.clone(),
            descriptor,
            access: header.access,
            name_index,
            descriptor_index,
            attribute_count,
            attributes,
            code: InstructionBuffer::new(),
            has_code: false,
        })
    }

    pub fn code(&self) -> &InstructionBuffer {
        &self.code
    }

    fn push(&mut self, insn: Insn) -> Result<(), Error> {
        self.has_code = true;
        self.code.push(insn)
    }

    /// Reject an opcode that does not belong to the visit it was passed to
    fn check_opcode(
        opcode: u8,
        visit: &'static str,
        accepts: impl Fn(OperandKind) -> bool,
    ) -> Result<(), Error> {
        match operand_kind(opcode) {
            Some(kind) if accepts(kind) => Ok(()),
            _ => Err(Error::InvalidOpcode { opcode, visit }),
        }
    }

    /// Serialize the `Code` attribute into the method's attributes
    fn write_code(&mut self) -> Result<(), Error> {
        let class = &mut *self.class;
        let header = class.header.as_ref().ok_or(Error::MissingHeader)?;
        let settings = &class.settings;
        let hierarchy = WithClass {
            inner: settings.hierarchy.as_ref(),
            name: &header.name,
            super_name: header.super_name.as_deref(),
            is_interface: header.access.contains(ClassAccessFlags::INTERFACE),
        };
        let context = MethodContext {
            class_name: &header.name,
            name: &self.name,
            descriptor: &self.descriptor,
            is_static: self.access.contains(MethodAccessFlags::STATIC),
            version: header.version,
            compute: settings.compute,
            merge_policy: settings.effective_merge_policy(),
            hierarchy: &hierarchy,
            replace_dead_code: settings.replace_dead_code,
        };
        let constants = &mut class.constants;
        let body = self.code.finish(constants, &context)?;
        log::debug!(
            "Wrote {} bytes of code for {}",
            body.len(),
            context.display_name()
        );

        let code = Attribute {
            name_index: constants.get_utf8("Code")?,
            info: body,
        };
        code.serialize(&mut self.attributes)?;
        self.attribute_count += 1;
        Ok(())
    }
}

impl<'a> MethodVisitor for MethodWriter<'a> {
    fn new_label(&mut self) -> Label {
        self.code.new_label()
    }

    fn visit_attribute(&mut self, attribute: &RawAttribute) -> Result<(), Error> {
        self.class.check_raw_attribute(attribute);
        let name_index = self.class.constants.get_utf8(&attribute.name)?;
        let attribute = Attribute {
            name_index,
            info: attribute.info.clone(),
        };
        attribute.serialize(&mut self.attributes)?;
        self.attribute_count += 1;
        Ok(())
    }

    fn visit_annotations(&mut self, attribute: &AnnotationAttribute) -> Result<(), Error> {
        attribute.write(&mut self.attributes, &mut self.class.constants)?;
        self.attribute_count += 1;
        Ok(())
    }

    fn visit_code(&mut self) -> Result<(), Error> {
        self.has_code = true;
        Ok(())
    }

    fn visit_insn(&mut self, opcode: u8) -> Result<(), Error> {
        Self::check_opcode(opcode, "visit_insn", |kind| {
            matches!(kind, OperandKind::None | OperandKind::ImplicitVar)
        })?;
        // Short forms of loads and stores are accepted, but stored in their general form
        if operand_kind(opcode) == Some(OperandKind::ImplicitVar) {
            let (long_form, short_index) = if opcode < ISTORE_0 {
                (ILOAD, opcode - ILOAD_0)
            } else {
                (ISTORE, opcode - ISTORE_0)
            };
            return self.visit_var_insn(long_form + short_index / 4, (short_index % 4) as u16);
        }
        self.push(Insn::Simple(opcode))
    }

    fn visit_int_insn(&mut self, opcode: u8, operand: i32) -> Result<(), Error> {
        let in_range = match opcode {
            BIPUSH => i8::try_from(operand).is_ok(),
            SIPUSH => i16::try_from(operand).is_ok(),
            NEWARRAY => (T_BOOLEAN as i32..=T_LONG as i32).contains(&operand),
            _ => {
                return Err(Error::InvalidOpcode {
                    opcode,
                    visit: "visit_int_insn",
                })
            }
        };
        if !in_range {
            return Err(Error::InvalidOperand {
                opcode,
                operand: operand.into(),
            });
        }
        self.push(Insn::Int { opcode, operand })
    }

    fn visit_var_insn(&mut self, opcode: u8, var: u16) -> Result<(), Error> {
        Self::check_opcode(opcode, "visit_var_insn", |kind| kind == OperandKind::Var)?;
        self.push(Insn::Var { opcode, var })
    }

    fn visit_type_insn(&mut self, opcode: u8, class: &str) -> Result<(), Error> {
        Self::check_opcode(opcode, "visit_type_insn", |kind| kind == OperandKind::Type)?;
        let index = self.class.constants.get_class(class)?;
        self.push(Insn::Type {
            opcode,
            class: index,
            name: class.to_owned(),
        })
    }

    fn visit_field_insn(
        &mut self,
        opcode: u8,
        owner: &str,
        name: &str,
        descriptor: &str,
    ) -> Result<(), Error> {
        Self::check_opcode(opcode, "visit_field_insn", |kind| kind == OperandKind::Field)?;
        let field_type = FieldType::parse(descriptor)?;
        let field = self.class.constants.get_field_ref(owner, name, descriptor)?;
        self.push(Insn::Field {
            opcode,
            field,
            field_type,
        })
    }

    fn visit_method_insn(
        &mut self,
        opcode: u8,
        owner: &str,
        name: &str,
        descriptor: &str,
        is_interface: bool,
    ) -> Result<(), Error> {
        Self::check_opcode(opcode, "visit_method_insn", |kind| {
            matches!(kind, OperandKind::Method | OperandKind::InterfaceMethod)
        })?;
        let parsed = MethodDescriptor::parse(descriptor)?;
        let method = self
            .class
            .constants
            .get_method_ref(owner, name, descriptor, is_interface)?;
        self.push(Insn::Method {
            opcode,
            method,
            descriptor: parsed,
            is_init: name == "<init>",
        })
    }

    fn visit_invoke_dynamic_insn(
        &mut self,
        name: &str,
        descriptor: &str,
        bootstrap: &Handle,
        bootstrap_arguments: &[ConstantValue],
    ) -> Result<(), Error> {
        let parsed = MethodDescriptor::parse(descriptor)?;
        let call_site = self.class.constants.get_invoke_dynamic(
            name,
            descriptor,
            bootstrap,
            bootstrap_arguments,
        )?;
        self.push(Insn::InvokeDynamic {
            call_site,
            descriptor: parsed,
        })
    }

    fn visit_jump_insn(&mut self, opcode: u8, target: Label) -> Result<(), Error> {
        // Widths are picked when the code is finished, so wide jumps start out narrow
        let opcode = match opcode {
            GOTO_W => GOTO,
            JSR_W => JSR,
            _ => opcode,
        };
        Self::check_opcode(opcode, "visit_jump_insn", |kind| kind == OperandKind::Jump)?;
        self.push(Insn::Jump { opcode, target })
    }

    fn visit_label(&mut self, label: Label) -> Result<(), Error> {
        self.code.place_label(label)
    }

    fn visit_ldc_insn(&mut self, constant: &ConstantValue) -> Result<(), Error> {
        let index = self.class.constants.get_constant_value(constant)?;
        self.push(Insn::Ldc {
            constant: index,
            pushed: constant.verification_type(),
        })
    }

    fn visit_iinc_insn(&mut self, var: u16, increment: i16) -> Result<(), Error> {
        self.push(Insn::IInc { var, increment })
    }

    fn visit_table_switch_insn(
        &mut self,
        low: i32,
        high: i32,
        default: Label,
        targets: &[Label],
    ) -> Result<(), Error> {
        if low > high {
            return Err(Error::InvalidOperand {
                opcode: TABLESWITCH,
                operand: high.into(),
            });
        }
        let cases = i64::from(high) - i64::from(low) + 1;
        if cases != targets.len() as i64 {
            return Err(Error::SwitchTargetMismatch {
                keys: cases as usize,
                targets: targets.len(),
            });
        }
        self.push(Insn::TableSwitch {
            low,
            high,
            default,
            targets: targets.to_vec(),
        })
    }

    fn visit_lookup_switch_insn(
        &mut self,
        default: Label,
        keys: &[i32],
        targets: &[Label],
    ) -> Result<(), Error> {
        if keys.len() != targets.len() {
            return Err(Error::SwitchTargetMismatch {
                keys: keys.len(),
                targets: targets.len(),
            });
        }
        let mut pairs: Vec<(i32, Label)> = keys.iter().copied().zip(targets.iter().copied()).collect();
        pairs.sort_by_key(|(key, _)| *key);
        if let Some(pair) = pairs.windows(2).find(|pair| pair[0].0 == pair[1].0) {
            return Err(Error::InvalidOperand {
                opcode: LOOKUPSWITCH,
                operand: pair[0].0.into(),
            });
        }
        self.push(Insn::LookupSwitch { default, pairs })
    }

    fn visit_multi_anew_array_insn(&mut self, class: &str, dimensions: u8) -> Result<(), Error> {
        if dimensions == 0 {
            return Err(Error::InvalidOperand {
                opcode: MULTIANEWARRAY,
                operand: 0,
            });
        }
        let index = self.class.constants.get_class(class)?;
        self.push(Insn::MultiANewArray {
            class: index,
            name: class.to_owned(),
            dimensions,
        })
    }

    fn visit_try_catch_block(
        &mut self,
        start: Label,
        end: Label,
        handler: Label,
        catch_type: Option<&str>,
    ) -> Result<(), Error> {
        let catch_type = match catch_type {
            Some(name) => Some((self.class.constants.get_class(name)?, name.to_owned())),
            None => None,
        };
        self.has_code = true;
        self.code.add_handler(TryCatch {
            start,
            end,
            handler,
            catch_type,
        })
    }

    fn visit_local_variable(
        &mut self,
        name: &str,
        descriptor: &str,
        signature: Option<&str>,
        start: Label,
        end: Label,
        index: u16,
    ) -> Result<(), Error> {
        let constants = &mut self.class.constants;
        let variable = LocalVariable {
            name: constants.get_utf8(name)?,
            descriptor: constants.get_utf8(descriptor)?,
            signature: match signature {
                Some(signature) => Some(constants.get_utf8(signature)?),
                None => None,
            },
            start,
            end,
            index,
            width: if descriptor == "J" || descriptor == "D" { 2 } else { 1 },
        };
        self.code.add_local_variable(variable)
    }

    fn visit_line_number(&mut self, line: u16, start: Label) -> Result<(), Error> {
        self.code.add_line_number(line, start)
    }

    /// Frames are always recomputed, so the ones passed in are dropped
    fn visit_frame(&mut self, _locals: &[FrameType], _stack: &[FrameType]) -> Result<(), Error> {
        Ok(())
    }

    /// The code is laid out anew, so attributes pointing into the old layout are dropped
    fn visit_code_attribute(&mut self, attribute: &RawAttribute) -> Result<(), Error> {
        log::warn!(
            "Dropping code attribute {} of {}",
            attribute.name,
            self.name
        );
        Ok(())
    }

    fn visit_maxs(&mut self, max_stack: u16, max_locals: u16) -> Result<(), Error> {
        self.code.set_declared_maxs(max_stack, max_locals)
    }

    fn visit_end(&mut self) -> Result<(), Error> {
        if self.has_code {
            self.write_code()?;
        }
        let method = write_member(
            self.access.bits(),
            self.name_index,
            self.descriptor_index,
            self.attribute_count,
            &self.attributes,
        )?;
        self.class.methods.push(method);
        Ok(())
    }
}
