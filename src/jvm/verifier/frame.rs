use super::hierarchy::OBJECT_NAME;
use super::stack_map::SerializableType;
use super::VerificationType;
use crate::jvm::code::{Insn, Layout};
use crate::jvm::descriptors::{FieldType, MethodDescriptor, RenderDescriptor};
use crate::jvm::opcodes::*;
use crate::jvm::{ConstantPool, Error, VerifierErrorKind};
use crate::util::{OffsetVec, Width};

/// Verification type during frame computation
///
/// Classes are internal names and uninitialized values point at the index of their `new` in the
/// instruction arena.
pub type VType = VerificationType<String, usize>;

/// Snapshot of the stack and local variables at a point in the bytecode
#[derive(Debug, Clone, Eq, PartialEq, Default)]
pub struct Frame {
    /// Local variables by slot, where a `long` or `double` is followed by a `Top` in the next slot
    pub locals: Vec<VType>,

    /// Types of values on the stack
    pub stack: OffsetVec<VType>,
}

impl Frame {
    /// Frame on entry to a method
    pub fn initial(
        class_name: &str,
        method_name: &str,
        descriptor: &MethodDescriptor,
        is_static: bool,
    ) -> Frame {
        let mut locals = vec![];
        if !is_static {
            if method_name == "<init>" && class_name != OBJECT_NAME {
                locals.push(VType::UninitializedThis);
            } else {
                locals.push(VType::object(class_name));
            }
        }
        for parameter in &descriptor.parameters {
            let vtype = VType::from(parameter);
            let width = vtype.width();
            locals.push(vtype);
            if width == 2 {
                locals.push(VType::Top);
            }
        }
        Frame {
            locals,
            stack: OffsetVec::new(),
        }
    }

    /// Frame at the start of a replaced run of dead code
    pub fn dead_code() -> Frame {
        let mut stack = OffsetVec::new();
        stack.push(VType::object(super::hierarchy::THROWABLE_NAME));
        Frame {
            locals: vec![],
            stack,
        }
    }

    /// Locals as listed in a stack map frame: wide values take one entry and trailing `Top`s are
    /// dropped
    pub fn compact_locals(&self) -> Vec<VType> {
        let mut compact = vec![];
        let mut slot = 0;
        while slot < self.locals.len() {
            let local = &self.locals[slot];
            slot += local.width();
            compact.push(local.clone());
        }
        while let Some(VType::Top) = compact.last() {
            compact.pop();
        }
        compact
    }

    /// Resolve the frame into its serializable form (compact locals and stack)
    pub fn to_serializable(
        &self,
        constants: &mut ConstantPool,
        layout: &Layout,
    ) -> Result<(Vec<SerializableType>, Vec<SerializableType>), Error> {
        let mut resolve = |vtype: &VType| -> Result<SerializableType, Error> {
            vtype.try_map(
                |class| constants.get_class(class),
                |new_index| Ok(layout.offset(*new_index) as u16),
            )
        };
        let locals = self
            .compact_locals()
            .iter()
            .map(&mut resolve)
            .collect::<Result<Vec<_>, _>>()?;
        let stack = self
            .stack
            .values()
            .map(&mut resolve)
            .collect::<Result<Vec<_>, _>>()?;
        Ok((locals, stack))
    }

    /// Update the frame to reflect the effects of the instruction at `insn_index`
    ///
    /// Only the shapes of values are checked (widths, stack depth, locals in range), not whether
    /// their types match what the instruction expects.
    pub fn execute(
        &mut self,
        insns: &[Insn],
        insn_index: usize,
        this_class: &str,
    ) -> Result<(), VerifierErrorKind> {
        use VerificationType::*;

        let Frame { stack, locals } = self;

        match &insns[insn_index] {
            Insn::Simple(opcode) => match *opcode {
                NOP => (),
                ACONST_NULL => {
                    stack.push(Null);
                }
                ICONST_M1..=ICONST_5 => {
                    stack.push(Integer);
                }
                LCONST_0 | LCONST_1 => {
                    stack.push(Long);
                }
                FCONST_0..=FCONST_2 => {
                    stack.push(Float);
                }
                DCONST_0 | DCONST_1 => {
                    stack.push(Double);
                }

                IALOAD | BALOAD | CALOAD | SALOAD | LALOAD | FALOAD | DALOAD => {
                    pop_expecting_width(stack, 1)?;
                    pop_expecting_width(stack, 1)?;
                    stack.push(match *opcode {
                        LALOAD => Long,
                        FALOAD => Float,
                        DALOAD => Double,
                        _ => Integer,
                    });
                }
                AALOAD => {
                    pop_expecting_width(stack, 1)?;
                    let element = match pop(stack)? {
                        Null => Null,
                        Object(array) => array_element(&array)?,
                        _ => return Err(VerifierErrorKind::NotArrayType),
                    };
                    stack.push(element);
                }

                IASTORE | LASTORE | FASTORE | DASTORE | AASTORE | BASTORE | CASTORE | SASTORE => {
                    pop(stack)?;
                    pop_expecting_width(stack, 1)?;
                    pop_expecting_width(stack, 1)?;
                }

                POP => {
                    pop_expecting_width(stack, 1)?;
                }
                POP2 => {
                    let arg1 = pop(stack)?;
                    match arg1.width() {
                        // Form 1
                        1 => {
                            pop_expecting_width(stack, 1)?;
                        }

                        // Form 2
                        _ => (),
                    }
                }

                DUP => {
                    let arg1 = pop_expecting_width(stack, 1)?;
                    stack.push(arg1.clone());
                    stack.push(arg1);
                }
                DUP_X1 => {
                    let arg1 = pop_expecting_width(stack, 1)?;
                    let arg2 = pop_expecting_width(stack, 1)?;
                    stack.push(arg1.clone());
                    stack.push(arg2);
                    stack.push(arg1);
                }
                DUP_X2 => {
                    let arg1 = pop_expecting_width(stack, 1)?;
                    let arg2 = pop(stack)?;
                    match arg2.width() {
                        // Form 1
                        1 => {
                            let arg3 = pop_expecting_width(stack, 1)?;
                            stack.push(arg1.clone());
                            stack.push(arg3);
                            stack.push(arg2);
                            stack.push(arg1);
                        }

                        // Form 2
                        _ => {
                            stack.push(arg1.clone());
                            stack.push(arg2);
                            stack.push(arg1);
                        }
                    }
                }
                DUP2 => {
                    let arg1 = pop(stack)?;
                    match arg1.width() {
                        // Form 1
                        1 => {
                            let arg2 = pop_expecting_width(stack, 1)?;
                            stack.push(arg2.clone());
                            stack.push(arg1.clone());
                            stack.push(arg2);
                            stack.push(arg1);
                        }

                        // Form 2
                        _ => {
                            stack.push(arg1.clone());
                            stack.push(arg1);
                        }
                    }
                }
                DUP2_X1 => {
                    let arg1 = pop(stack)?;
                    match arg1.width() {
                        // Form 1
                        1 => {
                            let arg2 = pop_expecting_width(stack, 1)?;
                            let arg3 = pop_expecting_width(stack, 1)?;
                            stack.push(arg2.clone());
                            stack.push(arg1.clone());
                            stack.push(arg3);
                            stack.push(arg2);
                            stack.push(arg1);
                        }

                        // Form 2
                        _ => {
                            let arg2 = pop_expecting_width(stack, 1)?;
                            stack.push(arg1.clone());
                            stack.push(arg2);
                            stack.push(arg1);
                        }
                    }
                }
                DUP2_X2 => {
                    let arg1 = pop(stack)?;
                    match arg1.width() {
                        1 => {
                            let arg2 = pop_expecting_width(stack, 1)?;
                            let arg3 = pop(stack)?;
                            match arg3.width() {
                                // Form 1
                                1 => {
                                    let arg4 = pop_expecting_width(stack, 1)?;
                                    stack.push(arg2.clone());
                                    stack.push(arg1.clone());
                                    stack.push(arg4);
                                    stack.push(arg3);
                                    stack.push(arg2);
                                    stack.push(arg1);
                                }

                                // Form 3
                                _ => {
                                    stack.push(arg2.clone());
                                    stack.push(arg1.clone());
                                    stack.push(arg3);
                                    stack.push(arg2);
                                    stack.push(arg1);
                                }
                            }
                        }
                        _ => {
                            let arg2 = pop(stack)?;
                            match arg2.width() {
                                // Form 2
                                1 => {
                                    let arg3 = pop_expecting_width(stack, 1)?;
                                    stack.push(arg1.clone());
                                    stack.push(arg3);
                                    stack.push(arg2);
                                    stack.push(arg1);
                                }

                                // Form 4
                                _ => {
                                    stack.push(arg1.clone());
                                    stack.push(arg2);
                                    stack.push(arg1);
                                }
                            }
                        }
                    }
                }
                SWAP => {
                    let arg1 = pop_expecting_width(stack, 1)?;
                    let arg2 = pop_expecting_width(stack, 1)?;
                    stack.push(arg1);
                    stack.push(arg2);
                }

                IADD | ISUB | IMUL | IDIV | IREM | ISHL | ISHR | IUSHR | IAND | IOR | IXOR => {
                    pop_expecting_width(stack, 1)?;
                    pop_expecting_width(stack, 1)?;
                    stack.push(Integer);
                }
                LADD | LSUB | LMUL | LDIV | LREM | LAND | LOR | LXOR => {
                    pop_expecting_width(stack, 2)?;
                    pop_expecting_width(stack, 2)?;
                    stack.push(Long);
                }
                LSHL | LSHR | LUSHR => {
                    pop_expecting_width(stack, 1)?;
                    pop_expecting_width(stack, 2)?;
                    stack.push(Long);
                }
                FADD | FSUB | FMUL | FDIV | FREM => {
                    pop_expecting_width(stack, 1)?;
                    pop_expecting_width(stack, 1)?;
                    stack.push(Float);
                }
                DADD | DSUB | DMUL | DDIV | DREM => {
                    pop_expecting_width(stack, 2)?;
                    pop_expecting_width(stack, 2)?;
                    stack.push(Double);
                }
                INEG | FNEG | LNEG | DNEG => {
                    let arg = pop(stack)?;
                    stack.push(arg);
                }

                I2L | F2L | D2L | I2F | L2F | D2F | I2D | L2D | F2D | L2I | F2I | D2I | I2B
                | I2C | I2S => {
                    pop(stack)?;
                    stack.push(match *opcode {
                        I2L | F2L | D2L => Long,
                        I2F | L2F | D2F => Float,
                        I2D | L2D | F2D => Double,
                        _ => Integer,
                    });
                }

                LCMP | DCMPL | DCMPG => {
                    pop_expecting_width(stack, 2)?;
                    pop_expecting_width(stack, 2)?;
                    stack.push(Integer);
                }
                FCMPL | FCMPG => {
                    pop_expecting_width(stack, 1)?;
                    pop_expecting_width(stack, 1)?;
                    stack.push(Integer);
                }

                IRETURN | LRETURN | FRETURN | DRETURN | ARETURN | ATHROW | MONITORENTER
                | MONITOREXIT => {
                    pop(stack)?;
                }
                RETURN => (),
                ARRAYLENGTH => {
                    pop_expecting_width(stack, 1)?;
                    stack.push(Integer);
                }

                other => return Err(VerifierErrorKind::UnexpectedOpcode(other)),
            },

            Insn::Int { opcode, operand } => match *opcode {
                NEWARRAY => {
                    pop_expecting_width(stack, 1)?;
                    let element = match *operand as u8 {
                        T_BOOLEAN => 'Z',
                        T_CHAR => 'C',
                        T_FLOAT => 'F',
                        T_DOUBLE => 'D',
                        T_BYTE => 'B',
                        T_SHORT => 'S',
                        T_LONG => 'J',
                        _ => 'I',
                    };
                    stack.push(Object(format!("[{}", element)));
                }
                _ => {
                    stack.push(Integer);
                }
            },

            Insn::Var { opcode, var } => {
                let var = *var;
                match *opcode {
                    ILOAD | LLOAD | FLOAD | DLOAD | ALOAD => {
                        let local = locals
                            .get(var as usize)
                            .cloned()
                            .ok_or(VerifierErrorKind::InvalidLocal(var))?;
                        stack.push(match *opcode {
                            ILOAD => Integer,
                            LLOAD => Long,
                            FLOAD => Float,
                            DLOAD => Double,
                            _ => local,
                        });
                    }
                    ISTORE | FSTORE | ASTORE => {
                        let value = pop_expecting_width(stack, 1)?;
                        store_local(locals, var, value);
                    }
                    LSTORE | DSTORE => {
                        let value = pop_expecting_width(stack, 2)?;
                        store_local(locals, var, value);
                    }
                    _ => (),
                }
            }

            Insn::Type { opcode, name, .. } => match *opcode {
                NEW => {
                    stack.push(Uninitialized(insn_index));
                }
                ANEWARRAY => {
                    pop_expecting_width(stack, 1)?;
                    let element = FieldType::from_class_name(name)
                        .map_err(|_| VerifierErrorKind::BadDescriptor(name.clone()))?;
                    stack.push(Object(FieldType::array(element).render()));
                }
                CHECKCAST => {
                    pop_expecting_width(stack, 1)?;
                    stack.push(Object(name.clone()));
                }
                _ => {
                    pop_expecting_width(stack, 1)?;
                    stack.push(Integer);
                }
            },

            Insn::Field {
                opcode, field_type, ..
            } => {
                match *opcode {
                    PUTSTATIC => {
                        pop(stack)?;
                    }
                    GETFIELD => {
                        pop_expecting_width(stack, 1)?;
                    }
                    PUTFIELD => {
                        pop(stack)?;
                        pop_expecting_width(stack, 1)?;
                    }
                    _ => (),
                }
                if matches!(*opcode, GETSTATIC | GETFIELD) {
                    stack.push(VType::from(field_type));
                }
            }

            Insn::Method {
                opcode,
                descriptor,
                is_init,
                ..
            } => {
                for _ in &descriptor.parameters {
                    pop(stack)?;
                }

                if *opcode == INVOKESPECIAL && *is_init {
                    let uninitialized = pop(stack)?;
                    let initialized = match &uninitialized {
                        UninitializedThis => VType::object(this_class),
                        Uninitialized(new_index) => match insns.get(*new_index) {
                            Some(Insn::Type { name, .. }) => VType::object(name),
                            _ => return Err(VerifierErrorKind::NotInitializable),
                        },
                        _ => return Err(VerifierErrorKind::NotInitializable),
                    };
                    replace_all(stack, locals, &uninitialized, &initialized);
                } else if *opcode != INVOKESTATIC {
                    pop_expecting_width(stack, 1)?;
                }

                if let Some(return_type) = &descriptor.return_type {
                    stack.push(VType::from(return_type));
                }
            }

            Insn::InvokeDynamic { descriptor, .. } => {
                for _ in &descriptor.parameters {
                    pop(stack)?;
                }
                if let Some(return_type) = &descriptor.return_type {
                    stack.push(VType::from(return_type));
                }
            }

            Insn::Jump { opcode, .. } => match *opcode {
                IFEQ..=IFLE | IFNULL | IFNONNULL => {
                    pop_expecting_width(stack, 1)?;
                }
                IF_ICMPEQ..=IF_ACMPNE => {
                    pop_expecting_width(stack, 1)?;
                    pop_expecting_width(stack, 1)?;
                }
                JSR => {
                    stack.push(Top);
                }
                _ => (),
            },

            Insn::Ldc { pushed, .. } => {
                stack.push(pushed.clone());
            }

            Insn::IInc { var, .. } => {
                if locals.len() <= *var as usize {
                    return Err(VerifierErrorKind::InvalidLocal(*var));
                }
                store_local(locals, *var, Integer);
            }

            Insn::TableSwitch { .. } | Insn::LookupSwitch { .. } => {
                pop_expecting_width(stack, 1)?;
            }

            Insn::MultiANewArray {
                name, dimensions, ..
            } => {
                for _ in 0..*dimensions {
                    pop_expecting_width(stack, 1)?;
                }
                stack.push(Object(name.clone()));
            }
        }

        Ok(())
    }
}

/// Element type of an array of references (`[Lfoo;` or `[[I`)
fn array_element(array: &str) -> Result<VType, VerifierErrorKind> {
    let element = array
        .strip_prefix('[')
        .ok_or(VerifierErrorKind::NotArrayType)?;
    if element.starts_with('[') {
        Ok(VType::object(element))
    } else {
        element
            .strip_prefix('L')
            .and_then(|rest| rest.strip_suffix(';'))
            .map(VType::object)
            .ok_or(VerifierErrorKind::NotArrayType)
    }
}

/// Store a value into a local, invalidating any wide value it overlaps
fn store_local(locals: &mut Vec<VType>, var: u16, value: VType) {
    let var = var as usize;
    let width = value.width();
    if locals.len() < var + width {
        locals.resize(var + width, VType::Top);
    }

    // Overwriting the second half of a wide value
    if var > 0 && locals[var - 1].width() == 2 {
        locals[var - 1] = VType::Top;
    }

    locals[var] = value;
    if width == 2 {
        locals[var + 1] = VType::Top;
    }
}

/// After `<init>` returns, every copy of the uninitialized value is initialized
fn replace_all(
    stack: &mut OffsetVec<VType>,
    locals: &mut [VType],
    original: &VType,
    updated: &VType,
) {
    stack.for_each_mut(|typ| {
        if typ == original {
            *typ = updated.clone();
        }
    });
    for typ in locals.iter_mut() {
        if typ == original {
            *typ = updated.clone();
        }
    }
}

fn pop(stack: &mut OffsetVec<VType>) -> Result<VType, VerifierErrorKind> {
    stack.pop().ok_or(VerifierErrorKind::EmptyStack)
}

fn pop_expecting_width(
    stack: &mut OffsetVec<VType>,
    expected_width: usize,
) -> Result<VType, VerifierErrorKind> {
    let typ = pop(stack)?;
    let found_width = typ.width();
    if found_width == expected_width {
        Ok(typ)
    } else {
        Err(VerifierErrorKind::InvalidWidth(found_width))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::descriptors::ParseDescriptor;
    use crate::jvm::{ClassConstantIndex, ConstantIndex, MethodRefConstantIndex};
    use VerificationType::*;

    fn new_frame(locals: Vec<VType>, stack: Vec<VType>) -> Frame {
        Frame {
            locals,
            stack: stack.into_iter().collect(),
        }
    }

    fn run(frame: &mut Frame, insns: &[Insn]) -> Result<(), VerifierErrorKind> {
        for insn_index in 0..insns.len() {
            frame.execute(insns, insn_index, "my/Class")?;
        }
        Ok(())
    }

    #[test]
    fn initial_frames() {
        let descriptor = MethodDescriptor::parse("(JLjava/lang/String;[I)V").unwrap();
        let frame = Frame::initial("my/Class", "<init>", &descriptor, false);
        assert_eq!(
            frame.locals,
            vec![
                UninitializedThis,
                Long,
                Top,
                VType::object("java/lang/String"),
                VType::object("[I"),
            ]
        );

        let frame = Frame::initial("my/Class", "run", &descriptor, true);
        assert_eq!(frame.locals.len(), 4);
        assert_eq!(
            frame.compact_locals(),
            vec![Long, VType::object("java/lang/String"), VType::object("[I")]
        );

        let frame = Frame::initial(OBJECT_NAME, "<init>", &descriptor, false);
        assert_eq!(frame.locals[0], VType::object(OBJECT_NAME));
    }

    #[test]
    fn stack_shuffles() {
        let mut frame = new_frame(vec![], vec![Integer, Long]);
        run(&mut frame, &[Insn::Simple(DUP2_X1)]).unwrap();
        assert_eq!(frame, new_frame(vec![], vec![Long, Integer, Long]));

        let mut frame = new_frame(vec![], vec![Float, Integer]);
        run(&mut frame, &[Insn::Simple(SWAP), Insn::Simple(POP2)]).unwrap();
        assert_eq!(frame, new_frame(vec![], vec![]));

        let mut frame = new_frame(vec![], vec![Long]);
        assert_eq!(
            run(&mut frame, &[Insn::Simple(DUP)]),
            Err(VerifierErrorKind::InvalidWidth(2))
        );

        let mut frame = new_frame(vec![], vec![]);
        assert_eq!(
            run(&mut frame, &[Insn::Simple(IADD)]),
            Err(VerifierErrorKind::EmptyStack)
        );
    }

    #[test]
    fn stores_split_wide_locals() {
        let mut frame = new_frame(vec![Long, Top], vec![Integer]);
        run(
            &mut frame,
            &[Insn::Var {
                opcode: ISTORE,
                var: 1,
            }],
        )
        .unwrap();
        assert_eq!(frame.locals, vec![Top, Integer]);

        let mut frame = new_frame(vec![], vec![Double]);
        run(
            &mut frame,
            &[Insn::Var {
                opcode: DSTORE,
                var: 2,
            }],
        )
        .unwrap();
        assert_eq!(frame.locals, vec![Top, Top, Double, Top]);
        assert_eq!(frame.compact_locals(), vec![Top, Top, Double]);

        let mut frame = new_frame(vec![], vec![]);
        assert_eq!(
            run(
                &mut frame,
                &[Insn::Var {
                    opcode: ALOAD,
                    var: 0,
                }]
            ),
            Err(VerifierErrorKind::InvalidLocal(0))
        );
    }

    #[test]
    fn constructors_initialize_every_copy() {
        let class = ClassConstantIndex(ConstantIndex(2));
        let init = MethodRefConstantIndex(ConstantIndex(5));
        let insns = vec![
            Insn::Type {
                opcode: NEW,
                class,
                name: String::from("a/Thing"),
            },
            Insn::Simple(DUP),
            Insn::Simple(DUP),
            Insn::Var {
                opcode: ASTORE,
                var: 1,
            },
            Insn::Method {
                opcode: INVOKESPECIAL,
                method: init,
                descriptor: MethodDescriptor::parse("()V").unwrap(),
                is_init: true,
            },
        ];

        let mut frame = new_frame(vec![VType::object("my/Class")], vec![]);
        run(&mut frame, &insns[..4]).unwrap();
        assert_eq!(
            frame,
            new_frame(
                vec![VType::object("my/Class"), Uninitialized(0)],
                vec![Uninitialized(0), Uninitialized(0)]
            )
        );

        frame.execute(&insns, 4, "my/Class").unwrap();
        assert_eq!(
            frame,
            new_frame(
                vec![VType::object("my/Class"), VType::object("a/Thing")],
                vec![VType::object("a/Thing")]
            )
        );

        // `super()` in a constructor
        let mut frame = new_frame(vec![UninitializedThis], vec![UninitializedThis]);
        frame.execute(&insns, 4, "my/Class").unwrap();
        assert_eq!(frame.locals, vec![VType::object("my/Class")]);

        let mut frame = new_frame(vec![], vec![Null]);
        assert_eq!(
            frame.execute(&insns, 4, "my/Class"),
            Err(VerifierErrorKind::NotInitializable)
        );
    }

    #[test]
    fn array_types() {
        let mut frame = new_frame(vec![], vec![Integer]);
        run(
            &mut frame,
            &[Insn::Int {
                opcode: NEWARRAY,
                operand: T_LONG as i32,
            }],
        )
        .unwrap();
        assert_eq!(frame.stack.last(), Some(&VType::object("[J")));

        let mut frame = new_frame(vec![], vec![VType::object("[[Ljava/lang/String;"), Integer]);
        run(&mut frame, &[Insn::Simple(AALOAD), Insn::Simple(ICONST_0), Insn::Simple(AALOAD)])
            .unwrap();
        assert_eq!(frame.stack.last(), Some(&VType::object("java/lang/String")));

        let mut frame = new_frame(vec![], vec![VType::object("[I"), Integer]);
        assert_eq!(
            run(&mut frame, &[Insn::Simple(AALOAD)]),
            Err(VerifierErrorKind::NotArrayType)
        );

        let mut frame = new_frame(vec![], vec![Integer]);
        run(
            &mut frame,
            &[Insn::Type {
                opcode: ANEWARRAY,
                class: ClassConstantIndex(ConstantIndex(3)),
                name: String::from("java/lang/String"),
            }],
        )
        .unwrap();
        assert_eq!(
            frame.stack.last(),
            Some(&VType::object("[Ljava/lang/String;"))
        );
    }
}
