use super::{resolve_jumps, Insn, Label, LabelGenerator, SIGNED_16BIT_JUMP_RANGE};
use crate::jvm::attributes::{
    write_attribute, ExceptionHandler, LineNumber, LineNumberTable, LocalVariableEntry,
    LocalVariableTable, LocalVariableTypeTable, StackMapTable,
};
use crate::jvm::descriptors::{MethodDescriptor, RenderDescriptor};
use crate::jvm::opcodes::{ATHROW, NOP};
use crate::jvm::verifier::{
    analyze, ClassHierarchy, Frame, HandlerRange, MergePolicy, StackMapFrame,
};
use crate::jvm::writer::ComputeMode;
use crate::jvm::{ClassConstantIndex, ConstantPool, Error, Serialize, Utf8ConstantIndex, Version};
use crate::util::ByteVector;

/// Stage of an instruction buffer
///
/// Transitions only go forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferState {
    /// Instructions, labels, and side tables are still being appended
    Building,

    /// Maxs were declared, so nothing more can be appended
    Resolving,

    /// The `Code` attribute was produced
    Finalized,
}

/// Exception handler, by labels
#[derive(Debug, Clone)]
pub struct TryCatch {
    pub start: Label,
    pub end: Label,
    pub handler: Label,

    /// Caught class (both interned and by name), or `None` for `finally` handlers
    pub catch_type: Option<(ClassConstantIndex, String)>,
}

/// Entry for the `LocalVariableTable` (and the `LocalVariableTypeTable`, if it has a signature)
#[derive(Debug, Clone)]
pub struct LocalVariable {
    pub name: Utf8ConstantIndex,
    pub descriptor: Utf8ConstantIndex,
    pub signature: Option<Utf8ConstantIndex>,
    pub start: Label,
    pub end: Label,
    pub index: u16,

    /// Number of slots the variable takes (2 for `long` and `double`)
    pub width: u16,
}

/// What finishing a method needs to know about the method and about how it is written
#[derive(Clone, Copy)]
pub struct MethodContext<'a> {
    pub class_name: &'a str,
    pub name: &'a str,
    pub descriptor: &'a MethodDescriptor,
    pub is_static: bool,
    pub version: Version,
    pub compute: ComputeMode,
    pub merge_policy: MergePolicy,
    pub hierarchy: &'a dyn ClassHierarchy,
    pub replace_dead_code: bool,
}

impl<'a> MethodContext<'a> {
    /// Name used to refer to the method in errors and logs
    pub fn display_name(&self) -> String {
        format!(
            "{}.{}{}",
            self.class_name,
            self.name,
            self.descriptor.render()
        )
    }
}

/// Accumulates the code of one method
///
/// Instructions are stored in an arena and labels are indices into a placement table mapping
/// them to the arena index of the instruction they precede. Nothing gets encoded until
/// [`InstructionBuffer::finish`], which picks jump encodings, computes frames, and serializes the
/// `Code` attribute.
#[derive(Debug)]
pub struct InstructionBuffer {
    state: BufferState,
    insns: Vec<Insn>,
    labels: LabelGenerator,

    /// Arena index each label precedes (`None` while unplaced)
    placements: Vec<Option<usize>>,

    /// Instructions referencing labels that were not placed yet
    fixups: Vec<(usize, Label)>,

    handlers: Vec<TryCatch>,
    line_numbers: Vec<(Label, u16)>,
    local_variables: Vec<LocalVariable>,

    /// Max stack and max locals, as declared by the caller
    declared_maxs: Option<(u16, u16)>,
}

impl Default for InstructionBuffer {
    fn default() -> InstructionBuffer {
        InstructionBuffer::new()
    }
}

impl InstructionBuffer {
    pub fn new() -> InstructionBuffer {
        InstructionBuffer {
            state: BufferState::Building,
            insns: vec![],
            labels: LabelGenerator::new(),
            placements: vec![],
            fixups: vec![],
            handlers: vec![],
            line_numbers: vec![],
            local_variables: vec![],
            declared_maxs: None,
        }
    }

    pub fn state(&self) -> BufferState {
        self.state
    }

    /// Number of instructions appended so far
    pub fn len(&self) -> usize {
        self.insns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.insns.is_empty()
    }

    pub fn insns(&self) -> &[Insn] {
        &self.insns
    }

    pub fn new_label(&mut self) -> Label {
        self.placements.push(None);
        self.labels.fresh_label()
    }

    /// Bind a label to the current end of the code
    pub fn place_label(&mut self, label: Label) -> Result<(), Error> {
        self.check_building()?;
        self.check_label(label)?;
        let placement = &mut self.placements[label.index()];
        if placement.is_some() {
            return Err(Error::DuplicateLabel(label));
        }
        *placement = Some(self.insns.len());
        self.fixups.retain(|(_, pending)| *pending != label);
        Ok(())
    }

    /// Is the label bound to a position yet?
    pub fn is_placed(&self, label: Label) -> bool {
        matches!(self.placements.get(label.index()), Some(Some(_)))
    }

    pub fn push(&mut self, insn: Insn) -> Result<(), Error> {
        self.check_building()?;
        let insn_index = self.insns.len();
        for target in insn.targets() {
            self.check_label(target)?;
            if self.placements[target.index()].is_none() {
                self.fixups.push((insn_index, target));
            }
        }
        self.insns.push(insn);
        Ok(())
    }

    pub fn add_handler(&mut self, handler: TryCatch) -> Result<(), Error> {
        self.check_building()?;
        self.check_label(handler.start)?;
        self.check_label(handler.end)?;
        self.check_label(handler.handler)?;
        self.handlers.push(handler);
        Ok(())
    }

    pub fn add_line_number(&mut self, line: u16, start: Label) -> Result<(), Error> {
        self.check_building()?;
        self.check_label(start)?;
        self.line_numbers.push((start, line));
        Ok(())
    }

    pub fn add_local_variable(&mut self, variable: LocalVariable) -> Result<(), Error> {
        self.check_building()?;
        self.check_label(variable.start)?;
        self.check_label(variable.end)?;
        self.local_variables.push(variable);
        Ok(())
    }

    /// Record the caller's max stack and max locals and stop accepting code
    ///
    /// Declared values are only used when frames cannot be computed (methods using
    /// subroutines).
    pub fn set_declared_maxs(&mut self, max_stack: u16, max_locals: u16) -> Result<(), Error> {
        self.check_building()?;
        self.declared_maxs = Some((max_stack, max_locals));
        self.state = BufferState::Resolving;
        Ok(())
    }

    fn check_building(&self) -> Result<(), Error> {
        if self.state == BufferState::Building {
            Ok(())
        } else {
            Err(Error::CodeAlreadyFinished)
        }
    }

    fn check_label(&self, label: Label) -> Result<(), Error> {
        if label.index() < self.placements.len() {
            Ok(())
        } else {
            Err(Error::UnknownLabel(label))
        }
    }

    fn check_placed(&self, label: Label) -> Result<(), Error> {
        if self.is_placed(label) {
            Ok(())
        } else {
            Err(Error::UnplacedLabel(label))
        }
    }

    /// Produce the body of the `Code` attribute (everything after `attribute_length`)
    pub fn finish(
        &mut self,
        constants: &mut ConstantPool,
        context: &MethodContext,
    ) -> Result<Vec<u8>, Error> {
        if self.state == BufferState::Finalized {
            return Err(Error::CodeAlreadyFinished);
        }
        self.state = BufferState::Resolving;

        if let Some((_, label)) = self.fixups.first() {
            return Err(Error::UnplacedLabel(*label));
        }
        for handler in &self.handlers {
            self.check_placed(handler.start)?;
            self.check_placed(handler.end)?;
            self.check_placed(handler.handler)?;
        }
        for (label, _) in &self.line_numbers {
            self.check_placed(*label)?;
        }
        for variable in &self.local_variables {
            self.check_placed(variable.start)?;
            self.check_placed(variable.end)?;
        }

        let insn_count = self.insns.len();
        let placements: Vec<usize> = self
            .placements
            .iter()
            .map(|placement| placement.unwrap_or(insn_count))
            .collect();

        let layout = resolve_jumps(&self.insns, &placements, &SIGNED_16BIT_JUMP_RANGE);
        let code_length = layout.code_length();
        if code_length > u16::MAX as usize {
            return Err(Error::MethodCodeOverflow {
                method: context.display_name(),
                length: code_length,
            });
        }

        let mut locals_extent = context.descriptor.parameter_length(!context.is_static);
        for insn in &self.insns {
            locals_extent = locals_extent.max(insn.locals_extent());
        }
        for variable in &self.local_variables {
            locals_extent = locals_extent.max(variable.index as usize + variable.width as usize);
        }
        let locals_extent = u16::try_from(locals_extent).unwrap_or(u16::MAX);

        let has_subroutines = self.insns.iter().any(Insn::is_subroutine);
        let wants_frames =
            context.compute == ComputeMode::Frames && context.version.has_stack_map_frames();
        if has_subroutines && wants_frames && !context.version.allows_subroutines() {
            return Err(Error::UnsupportedSubroutine {
                method: context.display_name(),
            });
        }
        let emit_frames = wants_frames && !has_subroutines;

        let (max_stack, max_locals, analysis) = if has_subroutines {
            log::warn!(
                "{} uses subroutines, keeping declared maxs and skipping frames",
                context.display_name()
            );
            let (max_stack, max_locals) = self.declared_maxs.unwrap_or((0, 0));
            (max_stack, max_locals.max(locals_extent), None)
        } else {
            let ranges: Vec<HandlerRange> = self
                .handlers
                .iter()
                .map(|handler| HandlerRange {
                    start: placements[handler.start.index()],
                    end: placements[handler.end.index()],
                    handler: placements[handler.handler.index()],
                    catch_type: handler.catch_type.as_ref().map(|(_, name)| name.clone()),
                })
                .collect();
            let analysis_context = MethodContext {
                replace_dead_code: context.replace_dead_code && emit_frames,
                ..*context
            };
            let analysis = analyze(
                &self.insns,
                &placements,
                &ranges,
                &layout,
                &analysis_context,
            )?;
            (
                analysis.max_stack,
                analysis.max_locals.max(locals_extent),
                Some(analysis),
            )
        };

        // Unreachable code, as byte ranges
        let dead_ranges: Vec<(usize, usize)> = match &analysis {
            Some(analysis) if context.replace_dead_code && emit_frames => analysis
                .dead_runs()
                .into_iter()
                .map(|(start, end)| (layout.offset(start), layout.offset(end)))
                .collect(),
            _ => vec![],
        };

        let mut code = ByteVector::with_capacity(code_length);
        for (insn_index, insn) in self.insns.iter().enumerate() {
            insn.encode(
                &mut code,
                layout.offset(insn_index),
                layout.widths[insn_index],
                &|label| layout.offset(placements[label.index()]),
            );
        }
        let mut code = code.into_vec();
        for (start, end) in &dead_ranges {
            log::debug!(
                "Replacing unreachable bytes {}..{} in {}",
                start,
                end,
                context.display_name()
            );
            for byte in &mut code[*start..*end - 1] {
                *byte = NOP;
            }
            code[*end - 1] = ATHROW;
        }

        let label_offset = |label: Label| layout.offset(placements[label.index()]);

        let mut exception_table: Vec<ExceptionHandler> = vec![];
        for handler in &self.handlers {
            let handler_pc = label_offset(handler.handler) as u16;
            let catch_type = handler.catch_type.as_ref().map(|(index, _)| *index);
            let ranges = subtract_ranges(
                (label_offset(handler.start), label_offset(handler.end)),
                &dead_ranges,
            );
            for (start, end) in ranges {
                exception_table.push(ExceptionHandler {
                    start_pc: start as u16,
                    end_pc: end as u16,
                    handler_pc,
                    catch_type,
                });
            }
        }

        let mut body = ByteVector::new();
        body.put_u16(max_stack)
            .put_u16(max_locals)
            .put_u32(code.len() as u32)
            .put_bytes(&code);
        exception_table.serialize(&mut body)?;

        let attribute_count_at = body.reserve_u16();
        let mut attribute_count = 0;

        if !self.line_numbers.is_empty() {
            let table = LineNumberTable(
                self.line_numbers
                    .iter()
                    .map(|(label, line)| LineNumber {
                        start_pc: label_offset(*label) as u16,
                        line_number: *line,
                    })
                    .collect(),
            );
            write_attribute(&mut body, constants, &table)?;
            attribute_count += 1;
        }

        if !self.local_variables.is_empty() {
            let entry = |variable: &LocalVariable, descriptor: Utf8ConstantIndex| {
                let start = label_offset(variable.start);
                let end = label_offset(variable.end).max(start);
                LocalVariableEntry {
                    start_pc: start as u16,
                    length: (end - start) as u16,
                    name: variable.name,
                    descriptor,
                    index: variable.index,
                }
            };
            let table = LocalVariableTable(
                self.local_variables
                    .iter()
                    .map(|variable| entry(variable, variable.descriptor))
                    .collect(),
            );
            write_attribute(&mut body, constants, &table)?;
            attribute_count += 1;

            let signatures: Vec<LocalVariableEntry> = self
                .local_variables
                .iter()
                .filter_map(|variable| variable.signature.map(|sig| entry(variable, sig)))
                .collect();
            if !signatures.is_empty() {
                write_attribute(&mut body, constants, &LocalVariableTypeTable(signatures))?;
                attribute_count += 1;
            }
        }

        if let Some(analysis) = analysis.as_ref().filter(|_| emit_frames) {
            if !analysis.frames.is_empty() {
                let initial = Frame::initial(
                    context.class_name,
                    context.name,
                    context.descriptor,
                    context.is_static,
                );
                let (mut previous_locals, _) = initial.to_serializable(constants, &layout)?;
                let mut previous_offset: Option<usize> = None;
                let mut frames = vec![];
                for (insn_index, frame) in &analysis.frames {
                    let offset = layout.offset(*insn_index);
                    let offset_delta = match previous_offset {
                        None => offset,
                        Some(previous) => offset - previous - 1,
                    };
                    let (locals, stack) = frame.to_serializable(constants, &layout)?;
                    frames.push(StackMapFrame::compress(
                        offset_delta as u16,
                        &locals,
                        &stack,
                        &previous_locals,
                    ));
                    previous_locals = locals;
                    previous_offset = Some(offset);
                }
                write_attribute(&mut body, constants, &StackMapTable(frames))?;
                attribute_count += 1;
            }
        }

        body.overwrite_u16(attribute_count_at, attribute_count);
        self.state = BufferState::Finalized;

        log::trace!(
            "Finished {}: {} bytes of code, max stack {}, max locals {}",
            context.display_name(),
            code_length,
            max_stack,
            max_locals
        );
        Ok(body.into_vec())
    }
}

/// Remove the `holes` from `range`, keeping the non-empty pieces
///
/// The holes must be sorted and disjoint.
fn subtract_ranges(range: (usize, usize), holes: &[(usize, usize)]) -> Vec<(usize, usize)> {
    let mut pieces = vec![];
    let (mut start, end) = range;
    for (hole_start, hole_end) in holes {
        if *hole_end <= start || *hole_start >= end {
            continue;
        }
        if *hole_start > start {
            pieces.push((start, *hole_start));
        }
        start = start.max(*hole_end);
    }
    if start < end {
        pieces.push((start, end));
    }
    pieces
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::descriptors::ParseDescriptor;
    use crate::jvm::opcodes::*;
    use crate::jvm::verifier::UnknownHierarchy;

    const LLOAD_0: u8 = ILOAD_0 + 4;
    const ASTORE_1: u8 = ISTORE_0 + 17;

    fn context<'a>(descriptor: &'a MethodDescriptor, version: Version) -> MethodContext<'a> {
        MethodContext {
            class_name: "me/Test",
            name: "run",
            descriptor,
            is_static: true,
            version,
            compute: ComputeMode::Frames,
            merge_policy: MergePolicy::Strict,
            hierarchy: &UnknownHierarchy,
            replace_dead_code: true,
        }
    }

    #[test]
    fn jump_over_dead_code() {
        let descriptor = MethodDescriptor::parse("()V").unwrap();
        let mut buffer = InstructionBuffer::new();
        let end = buffer.new_label();
        buffer
            .push(Insn::Jump {
                opcode: GOTO,
                target: end,
            })
            .unwrap();
        for _ in 0..3 {
            buffer.push(Insn::Simple(NOP)).unwrap();
        }
        buffer.place_label(end).unwrap();
        buffer.push(Insn::Simple(RETURN)).unwrap();

        let mut constants = ConstantPool::new();
        let body = buffer
            .finish(&mut constants, &context(&descriptor, Version::JAVA8))
            .unwrap();
        assert_eq!(buffer.state(), BufferState::Finalized);
        assert_eq!(
            body,
            vec![
                0, 1, // max stack
                0, 0, // max locals
                0, 0, 0, 7, // code length
                GOTO, 0, 6, NOP, NOP, ATHROW, RETURN, // code
                0, 0, // exception table
                0, 1, // attributes
                0, 3, 0, 0, 0, 7, // StackMapTable
                0, 2, // frames
                67, 7, 0, 2, // same_locals_1_stack_item at 3, `java/lang/Throwable`
                2, // same at 6
            ]
        );
    }

    #[test]
    fn maxs_only_keeps_dead_code() {
        let descriptor = MethodDescriptor::parse("(J)V").unwrap();
        let mut buffer = InstructionBuffer::new();
        let end = buffer.new_label();
        buffer
            .push(Insn::Jump {
                opcode: GOTO,
                target: end,
            })
            .unwrap();
        buffer.push(Insn::Simple(NOP)).unwrap();
        buffer.place_label(end).unwrap();
        buffer
            .push(Insn::Var {
                opcode: LLOAD,
                var: 0,
            })
            .unwrap();
        buffer.push(Insn::Simple(POP2)).unwrap();
        buffer.push(Insn::Simple(RETURN)).unwrap();

        let mut constants = ConstantPool::new();
        let mut context = context(&descriptor, Version::JAVA8);
        context.compute = ComputeMode::MaxsOnly;
        let body = buffer.finish(&mut constants, &context).unwrap();
        assert_eq!(
            body,
            vec![
                0, 2, 0, 2, 0, 0, 0, 7, GOTO, 0, 4, NOP, LLOAD_0, POP2, RETURN, 0, 0, 0, 0,
            ]
        );
        assert!(constants.is_empty());
    }

    #[test]
    fn protocol_errors() {
        let mut buffer = InstructionBuffer::new();
        let label = buffer.new_label();
        buffer.place_label(label).unwrap();
        assert!(matches!(
            buffer.place_label(label),
            Err(Error::DuplicateLabel(l)) if l == label
        ));

        let mut other = InstructionBuffer::new();
        other.new_label();
        let foreign = other.new_label();
        assert!(matches!(
            buffer.push(Insn::Jump {
                opcode: GOTO,
                target: foreign
            }),
            Err(Error::UnknownLabel(_))
        ));

        let never_placed = buffer.new_label();
        buffer
            .push(Insn::Jump {
                opcode: GOTO,
                target: never_placed,
            })
            .unwrap();
        buffer.set_declared_maxs(0, 0).unwrap();
        assert!(matches!(
            buffer.push(Insn::Simple(NOP)),
            Err(Error::CodeAlreadyFinished)
        ));

        let descriptor = MethodDescriptor::parse("()V").unwrap();
        let mut constants = ConstantPool::new();
        assert!(matches!(
            buffer.finish(&mut constants, &context(&descriptor, Version::JAVA8)),
            Err(Error::UnplacedLabel(l)) if l == never_placed
        ));
    }

    #[test]
    fn subroutines() {
        let descriptor = MethodDescriptor::parse("()V").unwrap();
        let build = || {
            let mut buffer = InstructionBuffer::new();
            let subroutine = buffer.new_label();
            buffer
                .push(Insn::Jump {
                    opcode: JSR,
                    target: subroutine,
                })
                .unwrap();
            buffer.push(Insn::Simple(RETURN)).unwrap();
            buffer.place_label(subroutine).unwrap();
            buffer
                .push(Insn::Var {
                    opcode: ASTORE,
                    var: 1,
                })
                .unwrap();
            buffer
                .push(Insn::Var {
                    opcode: RET,
                    var: 1,
                })
                .unwrap();
            buffer.set_declared_maxs(1, 2).unwrap();
            buffer
        };

        let mut constants = ConstantPool::new();
        assert!(matches!(
            build().finish(&mut constants, &context(&descriptor, Version::JAVA8)),
            Err(Error::UnsupportedSubroutine { .. })
        ));

        let body = build()
            .finish(&mut constants, &context(&descriptor, Version::new(49, 0)))
            .unwrap();
        assert_eq!(&body[..4], &[0, 1, 0, 2]);
        assert_eq!(&body[8..15], &[JSR, 0, 4, RETURN, ASTORE_1, RET, 1]);
    }

    #[test]
    fn code_too_long() {
        let descriptor = MethodDescriptor::parse("()V").unwrap();
        let mut buffer = InstructionBuffer::new();
        for _ in 0..70000 {
            buffer.push(Insn::Simple(NOP)).unwrap();
        }
        buffer.push(Insn::Simple(RETURN)).unwrap();
        let mut constants = ConstantPool::new();
        match buffer.finish(&mut constants, &context(&descriptor, Version::JAVA8)) {
            Err(Error::MethodCodeOverflow { method, length }) => {
                assert_eq!(method, "me/Test.run()V");
                assert_eq!(length, 70001);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn handler_ranges_skip_dead_code() {
        assert_eq!(subtract_ranges((0, 10), &[]), vec![(0, 10)]);
        assert_eq!(subtract_ranges((0, 10), &[(3, 5)]), vec![(0, 3), (5, 10)]);
        assert_eq!(subtract_ranges((3, 5), &[(3, 5)]), vec![]);
        assert_eq!(subtract_ranges((2, 8), &[(0, 4), (6, 12)]), vec![(4, 6)]);
    }
}
