use super::class_reader::AttributeSlice;
use super::{ClassReader, Input, ReaderFlags};
use crate::jvm::descriptors::{MethodDescriptor, ParseDescriptor};
use crate::jvm::opcodes::*;
use crate::jvm::verifier::{SerializableType, OBJECT_NAME};
use crate::jvm::visitor::{FrameType, MethodHeader, MethodVisitor};
use crate::jvm::{
    ClassConstantIndex, Constant, ConstantIndex, Error, Label, MalformedKind, MethodAccessFlags,
    StackMapFrame, VerificationType,
};
use std::collections::{BTreeMap, BTreeSet};

/// Instruction as decoded from the code array
///
/// Constant pool operands are still indices and jump targets are still byte offsets (already
/// made absolute). Short forms are normalized the same way visitors see them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum Decoded {
    Simple(u8),
    Int(u8, i32),
    Var(u8, u16),
    Type(u8, u16),
    Field(u8, u16),
    Method(u8, u16),
    InvokeDynamic(u16),
    Jump(u8, usize),
    Ldc(u16),
    IInc(u16, i16),
    TableSwitch {
        low: i32,
        high: i32,
        default: usize,
        targets: Vec<usize>,
    },
    LookupSwitch {
        default: usize,
        keys: Vec<i32>,
        targets: Vec<usize>,
    },
    MultiANewArray(u16, u8),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct DecodedInsn {
    /// Offset in the code array
    pub offset: usize,

    /// Offset in the class file
    pub at: usize,
    pub insn: Decoded,
}

impl Decoded {
    fn jump_targets(&self) -> Vec<usize> {
        match self {
            Decoded::Jump(_, target) => vec![*target],
            Decoded::TableSwitch {
                default, targets, ..
            }
            | Decoded::LookupSwitch {
                default, targets, ..
            } => {
                let mut all = targets.clone();
                all.push(*default);
                all
            }
            _ => vec![],
        }
    }
}

struct Handler {
    at: usize,
    start: usize,
    end: usize,
    handler: usize,
    catch_type: u16,
}

struct LocalVariableEntry {
    start: usize,
    length: usize,
    name: u16,
    descriptor: u16,
    index: u16,
}

struct CodeBody<'r> {
    max_stack: u16,
    max_locals: u16,

    /// Offset of the code array in the class file
    code_offset: usize,
    code: &'r [u8],
    handlers: Vec<Handler>,
    attributes: Vec<AttributeSlice<'r>>,
}

/// Decode a code array, checking that every jump lands on an instruction
///
/// `base` is the offset of the code array in the class file.
pub(super) fn decode_code(code: &[u8], base: usize) -> Result<Vec<DecodedInsn>, Error> {
    let mut input = Input::at(code, base);
    let mut insns = vec![];

    while input.remaining() > 0 {
        let offset = input.position();
        let at = input.offset();
        let opcode = input.u8()?;
        let bad_opcode = |opcode: u8| Error::Malformed {
            offset: at,
            kind: MalformedKind::BadOpcode(opcode),
        };
        let jump = |relative: i64| -> Result<usize, Error> {
            let target = offset as i64 + relative;
            if target < 0 || target >= code.len() as i64 {
                return Err(Error::Malformed {
                    offset: at,
                    kind: MalformedKind::BadJumpTarget(target),
                });
            }
            Ok(target as usize)
        };

        let insn = match operand_kind(opcode).ok_or_else(|| bad_opcode(opcode))? {
            OperandKind::None => Decoded::Simple(opcode),
            OperandKind::Byte if opcode == NEWARRAY => Decoded::Int(opcode, input.u8()? as i32),
            OperandKind::Byte => Decoded::Int(opcode, input.i8()? as i32),
            OperandKind::Short => Decoded::Int(opcode, input.i16()? as i32),
            OperandKind::ImplicitVar => {
                // Four variants (slots 0 to 3) per type, in the order of the long forms
                let (long_form, short_index) = if opcode < ISTORE_0 {
                    (ILOAD, opcode - ILOAD_0)
                } else {
                    (ISTORE, opcode - ISTORE_0)
                };
                Decoded::Var(long_form + short_index / 4, (short_index % 4) as u16)
            }
            OperandKind::Var => Decoded::Var(opcode, input.u8()? as u16),
            OperandKind::Type => Decoded::Type(opcode, input.u16()?),
            OperandKind::Field => Decoded::Field(opcode, input.u16()?),
            OperandKind::Method => Decoded::Method(opcode, input.u16()?),
            OperandKind::InterfaceMethod => {
                let index = input.u16()?;
                input.skip(2)?;
                Decoded::Method(opcode, index)
            }
            OperandKind::InvokeDynamic => {
                let index = input.u16()?;
                input.skip(2)?;
                Decoded::InvokeDynamic(index)
            }
            OperandKind::Jump => Decoded::Jump(opcode, jump(input.i16()? as i64)?),
            OperandKind::JumpWide => {
                let short_opcode = if opcode == GOTO_W { GOTO } else { JSR };
                Decoded::Jump(short_opcode, jump(input.i32()? as i64)?)
            }
            OperandKind::Ldc => Decoded::Ldc(input.u8()? as u16),
            OperandKind::LdcWide => Decoded::Ldc(input.u16()?),
            OperandKind::IInc => {
                let var = input.u8()? as u16;
                Decoded::IInc(var, input.i8()? as i16)
            }
            OperandKind::TableSwitch => {
                input.align_to_4()?;
                let default = jump(input.i32()? as i64)?;
                let low = input.i32()?;
                let high = input.i32()?;
                let count = high as i64 - low as i64 + 1;
                if count < 1 || count * 4 > input.remaining() as i64 {
                    return Err(bad_opcode(opcode));
                }
                let mut targets = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    targets.push(jump(input.i32()? as i64)?);
                }
                Decoded::TableSwitch {
                    low,
                    high,
                    default,
                    targets,
                }
            }
            OperandKind::LookupSwitch => {
                input.align_to_4()?;
                let default = jump(input.i32()? as i64)?;
                let count = input.i32()? as i64;
                if count < 0 || count * 8 > input.remaining() as i64 {
                    return Err(bad_opcode(opcode));
                }
                let mut keys = Vec::with_capacity(count as usize);
                let mut targets = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    keys.push(input.i32()?);
                    targets.push(jump(input.i32()? as i64)?);
                }
                Decoded::LookupSwitch {
                    default,
                    keys,
                    targets,
                }
            }
            OperandKind::MultiANewArray => {
                let class = input.u16()?;
                Decoded::MultiANewArray(class, input.u8()?)
            }
            OperandKind::Wide => match input.u8()? {
                widened @ (ILOAD..=ALOAD | ISTORE..=ASTORE | RET) => {
                    Decoded::Var(widened, input.u16()?)
                }
                IINC => {
                    let var = input.u16()?;
                    Decoded::IInc(var, input.i16()?)
                }
                other => return Err(bad_opcode(other)),
            },
        };
        insns.push(DecodedInsn { offset, at, insn });
    }

    let starts: BTreeSet<usize> = insns.iter().map(|insn| insn.offset).collect();
    for insn in &insns {
        for target in insn.insn.jump_targets() {
            if !starts.contains(&target) {
                return Err(Error::Malformed {
                    offset: insn.at,
                    kind: MalformedKind::BadJumpTarget(target as i64),
                });
            }
        }
    }
    Ok(insns)
}

fn read_verification_type(input: &mut Input) -> Result<SerializableType, Error> {
    let at = input.offset();
    let vtype = match input.u8()? {
        0 => VerificationType::Top,
        1 => VerificationType::Integer,
        2 => VerificationType::Float,
        3 => VerificationType::Double,
        4 => VerificationType::Long,
        5 => VerificationType::Null,
        6 => VerificationType::UninitializedThis,
        7 => VerificationType::Object(ClassConstantIndex(ConstantIndex(input.u16()?))),
        8 => VerificationType::Uninitialized(input.u16()?),
        tag => {
            return Err(Error::Malformed {
                offset: at,
                kind: MalformedKind::BadStackMapFrame(tag),
            })
        }
    };
    Ok(vtype)
}

fn read_verification_types(input: &mut Input, count: usize) -> Result<Vec<SerializableType>, Error> {
    (0..count).map(|_| read_verification_type(input)).collect()
}

/// Decode one `StackMapTable` entry, returning it along with its tag
fn read_stack_map_frame(input: &mut Input) -> Result<(u8, StackMapFrame), Error> {
    let at = input.offset();
    let tag = input.u8()?;
    let frame = match tag {
        0..=63 => StackMapFrame::SameLocalsNoStack {
            offset_delta: tag as u16,
        },
        64..=127 => StackMapFrame::SameLocalsOneStack {
            offset_delta: (tag - 64) as u16,
            stack: read_verification_type(input)?,
        },
        247 => StackMapFrame::SameLocalsOneStack {
            offset_delta: input.u16()?,
            stack: read_verification_type(input)?,
        },
        248..=250 => StackMapFrame::ChopLocalsNoStack {
            offset_delta: input.u16()?,
            chopped_k: 251 - tag,
        },
        251 => StackMapFrame::SameLocalsNoStack {
            offset_delta: input.u16()?,
        },
        252..=254 => StackMapFrame::AppendLocalsNoStack {
            offset_delta: input.u16()?,
            locals: read_verification_types(input, (tag - 251) as usize)?,
        },
        255 => {
            let offset_delta = input.u16()?;
            let local_count = input.u16()? as usize;
            let locals = read_verification_types(input, local_count)?;
            let stack_count = input.u16()? as usize;
            let stack = read_verification_types(input, stack_count)?;
            StackMapFrame::Full {
                offset_delta,
                locals,
                stack,
            }
        }
        _ => {
            return Err(Error::Malformed {
                offset: at,
                kind: MalformedKind::BadStackMapFrame(tag),
            })
        }
    };
    Ok((tag, frame))
}

impl<'a> ClassReader<'a> {
    /// Visit the contents of a `Code` attribute
    pub(super) fn read_code(
        &self,
        attribute: &AttributeSlice,
        header: &MethodHeader,
        visitor: &mut dyn MethodVisitor,
        flags: ReaderFlags,
    ) -> Result<(), Error> {
        let body = self.parse_attribute(attribute, |input| {
            let max_stack = input.u16()?;
            let max_locals = input.u16()?;
            let code_length = input.u32()? as usize;
            let code_offset = input.offset();
            let code = input.bytes(code_length)?;
            let handler_count = input.u16()?;
            let mut handlers = Vec::with_capacity(handler_count as usize);
            for _ in 0..handler_count {
                let at = input.offset();
                handlers.push(Handler {
                    at,
                    start: input.u16()? as usize,
                    end: input.u16()? as usize,
                    handler: input.u16()? as usize,
                    catch_type: input.u16()?,
                });
            }
            let attributes = self.read_attributes(input)?;
            Ok(CodeBody {
                max_stack,
                max_locals,
                code_offset,
                code,
                handlers,
                attributes,
            })
        })?;

        let code_length = body.code.len();
        let insns = decode_code(body.code, body.code_offset)?;
        let starts: BTreeSet<usize> = insns.iter().map(|insn| insn.offset).collect();
        let is_boundary = |offset: usize| starts.contains(&offset);
        let is_end_boundary = |offset: usize| offset == code_length || starts.contains(&offset);

        // Everything that needs a label, by code offset
        let mut label_offsets = BTreeSet::new();
        for insn in &insns {
            label_offsets.extend(insn.insn.jump_targets());
        }
        for handler in &body.handlers {
            if !is_boundary(handler.start)
                || !is_end_boundary(handler.end)
                || handler.start >= handler.end
                || !is_boundary(handler.handler)
            {
                return Err(Error::Malformed {
                    offset: handler.at,
                    kind: MalformedKind::BadJumpTarget(handler.handler as i64),
                });
            }
            label_offsets.extend([handler.start, handler.end, handler.handler]);
        }

        let skip_debug = flags.contains(ReaderFlags::SKIP_DEBUG);
        let mut line_numbers: BTreeMap<usize, Vec<u16>> = BTreeMap::new();
        let mut local_variables = vec![];
        let mut local_variable_types = vec![];
        let mut stack_map_frames = vec![];
        let mut other_attributes = vec![];
        for sub_attribute in &body.attributes {
            match sub_attribute.name {
                "LineNumberTable" if !skip_debug => {
                    let entries = self.parse_attribute(sub_attribute, |input| {
                        let count = input.u16()?;
                        let mut entries = Vec::with_capacity(count as usize);
                        for _ in 0..count {
                            let start = input.u16()? as usize;
                            entries.push((start, input.u16()?));
                        }
                        Ok(entries)
                    })?;
                    for (start, line) in entries {
                        if is_boundary(start) {
                            line_numbers.entry(start).or_default().push(line);
                        } else {
                            log::debug!("Dropping line {} at non-instruction offset {}", line, start);
                        }
                    }
                }
                "LocalVariableTable" if !skip_debug => {
                    local_variables.extend(self.parse_attribute(sub_attribute, read_local_variables)?)
                }
                "LocalVariableTypeTable" if !skip_debug => local_variable_types
                    .extend(self.parse_attribute(sub_attribute, read_local_variables)?),
                "StackMapTable" if !flags.contains(ReaderFlags::SKIP_FRAMES) => {
                    stack_map_frames = self.parse_attribute(sub_attribute, |input| {
                        let count = input.u16()?;
                        let mut frames = Vec::with_capacity(count as usize);
                        for _ in 0..count {
                            let at = input.offset();
                            let (tag, frame) = read_stack_map_frame(input)?;
                            frames.push((at, tag, frame));
                        }
                        Ok(frames)
                    })?
                }
                "LineNumberTable" | "LocalVariableTable" | "LocalVariableTypeTable"
                | "StackMapTable" => (),
                _ => other_attributes.push(sub_attribute.to_raw()),
            }
        }
        label_offsets.extend(line_numbers.keys().copied());

        local_variables.retain(|entry: &LocalVariableEntry| {
            is_boundary(entry.start) && is_end_boundary(entry.start + entry.length)
        });
        for entry in &local_variables {
            label_offsets.extend([entry.start, entry.start + entry.length]);
        }

        for (at, tag, frame) in &stack_map_frames {
            for vtype in frame.types() {
                if let VerificationType::Uninitialized(offset) = vtype {
                    let offset = *offset as usize;
                    if !is_boundary(offset) {
                        return Err(Error::Malformed {
                            offset: *at,
                            kind: MalformedKind::BadStackMapFrame(*tag),
                        });
                    }
                    label_offsets.insert(offset);
                }
            }
        }

        let labels: BTreeMap<usize, Label> = label_offsets
            .into_iter()
            .map(|offset| (offset, visitor.new_label()))
            .collect();
        let label = |offset: usize| -> Result<Label, Error> {
            labels.get(&offset).copied().ok_or(Error::Malformed {
                offset: body.code_offset + offset,
                kind: MalformedKind::BadJumpTarget(offset as i64),
            })
        };

        // Frames in expanded form, by code offset
        let mut frames: BTreeMap<usize, (Vec<FrameType>, Vec<FrameType>)> = BTreeMap::new();
        if !stack_map_frames.is_empty() {
            let mut previous_locals = self.initial_frame_locals(header, attribute.offset)?;
            let mut previous_offset: Option<usize> = None;
            for (at, tag, frame) in &stack_map_frames {
                let bad_frame = Error::Malformed {
                    offset: *at,
                    kind: MalformedKind::BadStackMapFrame(*tag),
                };
                let frame = frame.try_map(|vtype| {
                    vtype.try_map(
                        |class| self.class((class.0).0, *at).map(String::from),
                        |offset| label(*offset as usize),
                    )
                })?;
                let offset_delta = frame.offset_delta() as usize;
                let offset = match previous_offset {
                    None => offset_delta,
                    Some(previous) => previous + offset_delta + 1,
                };
                if !is_boundary(offset) {
                    return Err(bad_frame);
                }
                let (locals, stack) = frame.expand(&previous_locals).ok_or(bad_frame)?;
                previous_locals = locals.clone();
                previous_offset = Some(offset);
                frames.insert(offset, (locals, stack));
            }
        }

        visitor.visit_code()?;

        for handler in &body.handlers {
            let catch_type = match handler.catch_type {
                0 => None,
                index => Some(self.class(index, handler.at)?),
            };
            visitor.visit_try_catch_block(
                label(handler.start)?,
                label(handler.end)?,
                label(handler.handler)?,
                catch_type,
            )?;
        }

        for insn in &insns {
            if let Some(label) = labels.get(&insn.offset) {
                visitor.visit_label(*label)?;
            }
            if let Some(lines) = line_numbers.get(&insn.offset) {
                for line in lines {
                    visitor.visit_line_number(*line, label(insn.offset)?)?;
                }
            }
            if let Some((locals, stack)) = frames.get(&insn.offset) {
                visitor.visit_frame(locals, stack)?;
            }
            self.visit_decoded(insn, visitor, &label)?;
        }
        if let Some(end) = labels.get(&code_length) {
            visitor.visit_label(*end)?;
        }

        for entry in &local_variables {
            let signature = match local_variable_types.iter().find(|typed| {
                typed.start == entry.start
                    && typed.length == entry.length
                    && typed.index == entry.index
            }) {
                Some(typed) => Some(self.utf8(typed.descriptor, attribute.offset)?),
                None => None,
            };
            visitor.visit_local_variable(
                self.utf8(entry.name, attribute.offset)?,
                self.utf8(entry.descriptor, attribute.offset)?,
                signature,
                label(entry.start)?,
                label(entry.start + entry.length)?,
                entry.index,
            )?;
        }

        for other in &other_attributes {
            visitor.visit_code_attribute(other)?;
        }

        visitor.visit_maxs(body.max_stack, body.max_locals)
    }

    /// Locals on entry to the method, the way `StackMapTable` frames list them
    ///
    /// `at` is the offset of the `Code` attribute, which is where a bad descriptor gets reported.
    fn initial_frame_locals(
        &self,
        header: &MethodHeader,
        at: usize,
    ) -> Result<Vec<FrameType>, Error> {
        let mut locals = vec![];
        if !header.access.contains(MethodAccessFlags::STATIC) {
            if header.name == "<init>" && self.class_name() != OBJECT_NAME {
                locals.push(VerificationType::UninitializedThis);
            } else {
                locals.push(VerificationType::object(self.class_name()));
            }
        }
        let descriptor = MethodDescriptor::parse(&header.descriptor).map_err(|err| match err {
            Error::InvalidDescriptor(reason) => Error::Malformed {
                offset: at,
                kind: MalformedKind::BadDescriptor(reason),
            },
            other => other,
        })?;
        locals.extend(descriptor.parameters.iter().map(FrameType::from));
        Ok(locals)
    }

    fn visit_decoded(
        &self,
        decoded: &DecodedInsn,
        visitor: &mut dyn MethodVisitor,
        label: &dyn Fn(usize) -> Result<Label, Error>,
    ) -> Result<(), Error> {
        let at = decoded.at;
        match &decoded.insn {
            Decoded::Simple(opcode) => visitor.visit_insn(*opcode),
            Decoded::Int(opcode, operand) => visitor.visit_int_insn(*opcode, *operand),
            Decoded::Var(opcode, var) => visitor.visit_var_insn(*opcode, *var),
            Decoded::Type(opcode, class) => visitor.visit_type_insn(*opcode, self.class(*class, at)?),
            Decoded::Field(opcode, index) => {
                if !matches!(self.constant(*index, at)?, Constant::FieldRef(..)) {
                    return Err(wrong_kind(*index, at, "Fieldref"));
                }
                let (owner, name, descriptor, _) = self.member_ref(*index, at)?;
                visitor.visit_field_insn(*opcode, owner, name, descriptor)
            }
            Decoded::Method(opcode, index) => {
                if !matches!(self.constant(*index, at)?, Constant::MethodRef { .. }) {
                    return Err(wrong_kind(*index, at, "Methodref"));
                }
                let (owner, name, descriptor, is_interface) = self.member_ref(*index, at)?;
                visitor.visit_method_insn(*opcode, owner, name, descriptor, is_interface)
            }
            Decoded::InvokeDynamic(index) => match self.constant(*index, at)? {
                Constant::InvokeDynamic {
                    bootstrap_method,
                    name_and_type,
                } => {
                    let (name, descriptor) = self.name_and_type((name_and_type.0).0, at)?;
                    let (handle, arguments) = self.bootstrap_method(*bootstrap_method, at, 0)?;
                    visitor.visit_invoke_dynamic_insn(name, descriptor, &handle, &arguments)
                }
                _ => Err(wrong_kind(*index, at, "InvokeDynamic")),
            },
            Decoded::Jump(opcode, target) => visitor.visit_jump_insn(*opcode, label(*target)?),
            Decoded::Ldc(index) => visitor.visit_ldc_insn(&self.constant_value(*index, at, 0)?),
            Decoded::IInc(var, increment) => visitor.visit_iinc_insn(*var, *increment),
            Decoded::TableSwitch {
                low,
                high,
                default,
                targets,
            } => {
                let targets = targets
                    .iter()
                    .map(|target| label(*target))
                    .collect::<Result<Vec<_>, Error>>()?;
                visitor.visit_table_switch_insn(*low, *high, label(*default)?, &targets)
            }
            Decoded::LookupSwitch {
                default,
                keys,
                targets,
            } => {
                let targets = targets
                    .iter()
                    .map(|target| label(*target))
                    .collect::<Result<Vec<_>, Error>>()?;
                visitor.visit_lookup_switch_insn(label(*default)?, keys, &targets)
            }
            Decoded::MultiANewArray(class, dimensions) => {
                visitor.visit_multi_anew_array_insn(self.class(*class, at)?, *dimensions)
            }
        }
    }
}

fn wrong_kind(index: u16, at: usize, expected: &'static str) -> Error {
    Error::Malformed {
        offset: at,
        kind: MalformedKind::WrongConstantKind { index, expected },
    }
}

fn read_local_variables(input: &mut Input) -> Result<Vec<LocalVariableEntry>, Error> {
    let count = input.u16()?;
    let mut entries = Vec::with_capacity(count as usize);
    for _ in 0..count {
        entries.push(LocalVariableEntry {
            start: input.u16()? as usize,
            length: input.u16()? as usize,
            name: input.u16()?,
            descriptor: input.u16()?,
            index: input.u16()?,
        });
    }
    Ok(entries)
}

#[cfg(test)]
mod test {
    use super::*;

    fn decode(code: &[u8]) -> Vec<Decoded> {
        decode_code(code, 0)
            .unwrap()
            .into_iter()
            .map(|insn| insn.insn)
            .collect()
    }

    #[test]
    fn short_forms_are_normalized() {
        let code = [
            ILOAD_0 + 1,
            ILOAD_0 + 4 * 4 + 3,
            ISTORE_0 + 2 * 4,
            WIDE,
            IINC,
            1,
            0,
            0xff,
            0xfe,
            GOTO_W,
            0xff,
            0xff,
            0xff,
            0xf7,
            BIPUSH,
            0xff,
            NEWARRAY,
            T_LONG,
        ];
        assert_eq!(
            decode(&code),
            vec![
                Decoded::Var(ILOAD, 1),
                Decoded::Var(ILOAD + 4, 3),
                Decoded::Var(ISTORE + 2, 0),
                Decoded::IInc(256, -2),
                Decoded::Jump(GOTO, 0),
                Decoded::Int(BIPUSH, -1),
                Decoded::Int(NEWARRAY, T_LONG as i32),
            ]
        );
    }

    #[test]
    fn switch_padding() {
        // `tableswitch` at offset 1 is followed by 2 bytes of padding
        let code = [
            NOP,
            TABLESWITCH,
            0,
            0,
            0,
            0,
            0,
            23,
            0,
            0,
            0,
            1,
            0,
            0,
            0,
            2,
            0,
            0,
            0,
            23,
            0,
            0,
            0,
            23,
            RETURN,
        ];
        assert_eq!(
            decode(&code),
            vec![
                Decoded::Simple(NOP),
                Decoded::TableSwitch {
                    low: 1,
                    high: 2,
                    default: 24,
                    targets: vec![24, 24],
                },
                Decoded::Simple(RETURN),
            ]
        );
    }

    #[test]
    fn bad_jumps() {
        match decode_code(&[GOTO, 0, 10, RETURN], 100) {
            Err(Error::Malformed {
                offset: 100,
                kind: MalformedKind::BadJumpTarget(10),
            }) => (),
            other => panic!("unexpected {:?}", other),
        }

        // Lands inside the `sipush`
        match decode_code(&[GOTO, 0, 4, SIPUSH, 0, 1, RETURN], 0) {
            Err(Error::Malformed {
                offset: 0,
                kind: MalformedKind::BadJumpTarget(4),
            }) => (),
            other => panic!("unexpected {:?}", other),
        }

        match decode_code(&[NOP, 0xfe], 0) {
            Err(Error::Malformed {
                offset: 1,
                kind: MalformedKind::BadOpcode(0xfe),
            }) => (),
            other => panic!("unexpected {:?}", other),
        }
    }
}
