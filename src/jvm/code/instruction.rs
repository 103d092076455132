use super::{JumpWidth, Label};
use crate::jvm::descriptors::{FieldType, MethodDescriptor};
use crate::jvm::opcodes::*;
use crate::jvm::verifier::VerificationType;
use crate::jvm::{
    ClassConstantIndex, ConstantIndex, FieldRefConstantIndex, InvokeDynamicConstantIndex,
    MethodRefConstantIndex,
};
use crate::util::{ByteVector, Width};

/// Instruction in a method's instruction arena
///
/// Operands that refer to the constant pool are already interned. Next to the pool index, each
/// instruction keeps what frame computation needs to know about it (class names, descriptors)
/// so that the pool never has to be consulted when analyzing the code.
#[derive(Debug, Clone, PartialEq)]
pub enum Insn {
    /// Instruction without operands (`nop`, `iadd`, `areturn`, ...)
    Simple(u8),

    /// `bipush`, `sipush`, or `newarray`
    Int { opcode: u8, operand: i32 },

    /// Local variable load or store, or `ret`
    ///
    /// The opcode is always the general form (eg. `iload`, never `iload_0`).
    Var { opcode: u8, var: u16 },

    /// `new`, `anewarray`, `checkcast`, or `instanceof`
    Type {
        opcode: u8,
        class: ClassConstantIndex,
        name: String,
    },

    Field {
        opcode: u8,
        field: FieldRefConstantIndex,
        field_type: FieldType,
    },

    Method {
        opcode: u8,
        method: MethodRefConstantIndex,
        descriptor: MethodDescriptor,
        is_init: bool,
    },

    InvokeDynamic {
        call_site: InvokeDynamicConstantIndex,
        descriptor: MethodDescriptor,
    },

    /// Conditional jump, `goto`, or `jsr`
    Jump { opcode: u8, target: Label },

    Ldc {
        constant: ConstantIndex,
        pushed: VerificationType<String, usize>,
    },

    IInc { var: u16, increment: i16 },

    TableSwitch {
        low: i32,
        high: i32,
        default: Label,
        targets: Vec<Label>,
    },

    /// Pairs are kept sorted by key
    LookupSwitch {
        default: Label,
        pairs: Vec<(i32, Label)>,
    },

    MultiANewArray {
        class: ClassConstantIndex,
        name: String,
        dimensions: u8,
    },
}

/// Padding after a switch opcode so that its operands are 4-byte aligned
pub fn switch_padding(offset: usize) -> usize {
    (4 - (offset + 1) % 4) % 4
}

impl Insn {
    /// Encoded size in bytes, when the instruction starts at `offset`
    ///
    /// `width` only matters for jumps.
    pub fn size(&self, offset: usize, width: JumpWidth) -> usize {
        match self {
            Insn::Simple(_) => 1,
            Insn::Int { opcode, .. } => match *opcode {
                SIPUSH => 3,
                _ => 2,
            },
            Insn::Var { opcode, var } => {
                if *var <= 3 && *opcode != RET {
                    1
                } else if *var <= 255 {
                    2
                } else {
                    4
                }
            }
            Insn::Type { .. } | Insn::Field { .. } => 3,
            Insn::Method { opcode, .. } => match *opcode {
                INVOKEINTERFACE => 5,
                _ => 3,
            },
            Insn::InvokeDynamic { .. } => 5,
            Insn::Jump { opcode, .. } => match width {
                JumpWidth::Narrow => 3,
                JumpWidth::Wide if is_conditional_jump(*opcode) => 8,
                JumpWidth::Wide => 5,
            },
            Insn::Ldc { constant, pushed } => {
                if pushed.width() == 1 && constant.0 <= 255 {
                    2
                } else {
                    3
                }
            }
            Insn::IInc { var, increment } => {
                if *var <= 255 && i8::try_from(*increment).is_ok() {
                    3
                } else {
                    6
                }
            }
            Insn::TableSwitch { targets, .. } => {
                1 + switch_padding(offset) + 12 + 4 * targets.len()
            }
            Insn::LookupSwitch { pairs, .. } => 1 + switch_padding(offset) + 8 + 8 * pairs.len(),
            Insn::MultiANewArray { .. } => 4,
        }
    }

    /// Is this a jump whose encoding depends on the distance to its target?
    pub fn is_jump(&self) -> bool {
        matches!(self, Insn::Jump { .. })
    }

    /// Labels this instruction can transfer control to (besides falling through)
    pub fn targets(&self) -> Vec<Label> {
        match self {
            Insn::Jump { target, .. } => vec![*target],
            Insn::TableSwitch {
                default, targets, ..
            } => {
                let mut labels = vec![*default];
                labels.extend(targets.iter().copied());
                labels
            }
            Insn::LookupSwitch { default, pairs } => {
                let mut labels = vec![*default];
                labels.extend(pairs.iter().map(|(_, label)| *label));
                labels
            }
            _ => vec![],
        }
    }

    /// Can control continue to the next instruction?
    pub fn falls_through(&self) -> bool {
        match self {
            Insn::Simple(opcode) | Insn::Jump { opcode, .. } | Insn::Var { opcode, .. } => {
                !ends_flow(*opcode)
            }
            Insn::TableSwitch { .. } | Insn::LookupSwitch { .. } => false,
            _ => true,
        }
    }

    /// Is this `jsr` or `ret`?
    pub fn is_subroutine(&self) -> bool {
        matches!(
            self,
            Insn::Jump { opcode: JSR, .. } | Insn::Var { opcode: RET, .. }
        )
    }

    /// Largest local variable slot touched, plus one
    pub fn locals_extent(&self) -> usize {
        match self {
            Insn::Var { opcode, var } => {
                let wide = matches!(*opcode, LLOAD | DLOAD | LSTORE | DSTORE);
                *var as usize + if wide { 2 } else { 1 }
            }
            Insn::IInc { var, .. } => *var as usize + 1,
            _ => 0,
        }
    }

    /// Write out the instruction, which starts at `offset`
    ///
    /// `resolve` maps labels to their byte offsets in the final code array.
    pub fn encode(
        &self,
        code: &mut ByteVector,
        offset: usize,
        width: JumpWidth,
        resolve: &impl Fn(Label) -> usize,
    ) {
        let relative = |label: Label, from: usize| resolve(label) as i64 - from as i64;

        match self {
            Insn::Simple(opcode) => {
                code.put_u8(*opcode);
            }
            Insn::Int { opcode, operand } => {
                code.put_u8(*opcode);
                match *opcode {
                    SIPUSH => code.put_i16(*operand as i16),
                    _ => code.put_u8(*operand as u8),
                };
            }
            Insn::Var { opcode, var } => {
                if *var <= 3 && *opcode != RET {
                    let implicit = if *opcode >= ISTORE {
                        ISTORE_0 + (opcode - ISTORE) * 4
                    } else {
                        ILOAD_0 + (opcode - ILOAD) * 4
                    };
                    code.put_u8(implicit + *var as u8);
                } else if *var <= 255 {
                    code.put_u8(*opcode).put_u8(*var as u8);
                } else {
                    code.put_u8(WIDE).put_u8(*opcode).put_u16(*var);
                }
            }
            Insn::Type { opcode, class, .. } => {
                code.put_u8(*opcode).put_u16((class.0).0);
            }
            Insn::Field { opcode, field, .. } => {
                code.put_u8(*opcode).put_u16((field.0).0);
            }
            Insn::Method {
                opcode,
                method,
                descriptor,
                ..
            } => {
                code.put_u8(*opcode).put_u16((method.0).0);
                if *opcode == INVOKEINTERFACE {
                    code.put_u8(descriptor.parameter_length(true) as u8).put_u8(0);
                }
            }
            Insn::InvokeDynamic { call_site, .. } => {
                code.put_u8(INVOKEDYNAMIC)
                    .put_u16((call_site.0).0)
                    .put_u16(0);
            }
            Insn::Jump { opcode, target } => match width {
                JumpWidth::Narrow => {
                    code.put_u8(*opcode)
                        .put_i16(relative(*target, offset) as i16);
                }
                JumpWidth::Wide if is_conditional_jump(*opcode) => {
                    // Skip over the `goto_w` when the condition does not hold
                    code.put_u8(invert_condition(*opcode))
                        .put_i16(8)
                        .put_u8(GOTO_W)
                        .put_i32(relative(*target, offset + 3) as i32);
                }
                JumpWidth::Wide => {
                    let wide_opcode = if *opcode == JSR { JSR_W } else { GOTO_W };
                    code.put_u8(wide_opcode)
                        .put_i32(relative(*target, offset) as i32);
                }
            },
            Insn::Ldc { constant, pushed } => {
                if pushed.width() == 2 {
                    code.put_u8(LDC2_W).put_u16(constant.0);
                } else if constant.0 <= 255 {
                    code.put_u8(LDC).put_u8(constant.0 as u8);
                } else {
                    code.put_u8(LDC_W).put_u16(constant.0);
                }
            }
            Insn::IInc { var, increment } => {
                if *var <= 255 && i8::try_from(*increment).is_ok() {
                    code.put_u8(IINC)
                        .put_u8(*var as u8)
                        .put_i8(*increment as i8);
                } else {
                    code.put_u8(WIDE)
                        .put_u8(IINC)
                        .put_u16(*var)
                        .put_i16(*increment);
                }
            }
            Insn::TableSwitch {
                low,
                high,
                default,
                targets,
            } => {
                code.put_u8(TABLESWITCH);
                for _ in 0..switch_padding(offset) {
                    code.put_u8(0);
                }
                code.put_i32(relative(*default, offset) as i32)
                    .put_i32(*low)
                    .put_i32(*high);
                for target in targets {
                    code.put_i32(relative(*target, offset) as i32);
                }
            }
            Insn::LookupSwitch { default, pairs } => {
                code.put_u8(LOOKUPSWITCH);
                for _ in 0..switch_padding(offset) {
                    code.put_u8(0);
                }
                code.put_i32(relative(*default, offset) as i32)
                    .put_i32(pairs.len() as i32);
                for (key, target) in pairs {
                    code.put_i32(*key).put_i32(relative(*target, offset) as i32);
                }
            }
            Insn::MultiANewArray {
                class, dimensions, ..
            } => {
                code.put_u8(MULTIANEWARRAY)
                    .put_u16((class.0).0)
                    .put_u8(*dimensions);
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::code::LabelGenerator;

    fn encode(insn: &Insn, offset: usize, width: JumpWidth, target: usize) -> Vec<u8> {
        let mut code = ByteVector::new();
        insn.encode(&mut code, offset, width, &|_| target);
        assert_eq!(code.len(), insn.size(offset, width));
        code.into_vec()
    }

    #[test]
    fn compact_variable_forms() {
        let narrow = JumpWidth::Narrow;
        let iload_2 = Insn::Var {
            opcode: ILOAD,
            var: 2,
        };
        assert_eq!(encode(&iload_2, 0, narrow, 0), vec![ILOAD_0 + 2]);

        let astore_3 = Insn::Var {
            opcode: ASTORE,
            var: 3,
        };
        assert_eq!(encode(&astore_3, 0, narrow, 0), vec![ASTORE_3]);

        let dload = Insn::Var {
            opcode: DLOAD,
            var: 200,
        };
        assert_eq!(encode(&dload, 0, narrow, 0), vec![DLOAD, 200]);

        let wide_lstore = Insn::Var {
            opcode: LSTORE,
            var: 256,
        };
        assert_eq!(encode(&wide_lstore, 0, narrow, 0), vec![WIDE, LSTORE, 1, 0]);

        let ret = Insn::Var { opcode: RET, var: 1 };
        assert_eq!(encode(&ret, 0, narrow, 0), vec![RET, 1]);
    }

    #[test]
    fn iinc_forms() {
        let narrow = JumpWidth::Narrow;
        let small = Insn::IInc {
            var: 1,
            increment: -1,
        };
        assert_eq!(encode(&small, 0, narrow, 0), vec![IINC, 1, 255]);

        let large = Insn::IInc {
            var: 1,
            increment: 1000,
        };
        assert_eq!(encode(&large, 0, narrow, 0), vec![WIDE, IINC, 0, 1, 3, 232]);
    }

    #[test]
    fn jump_forms() {
        let mut labels = LabelGenerator::new();
        let target = labels.fresh_label();
        let ifeq = Insn::Jump {
            opcode: IFEQ,
            target,
        };
        assert_eq!(encode(&ifeq, 10, JumpWidth::Narrow, 4), vec![IFEQ, 255, 250]);
        assert_eq!(
            encode(&ifeq, 10, JumpWidth::Wide, 40013),
            vec![IFNE, 0, 8, GOTO_W, 0, 0, 156, 64]
        );

        let goto = Insn::Jump {
            opcode: GOTO,
            target,
        };
        assert_eq!(
            encode(&goto, 0, JumpWidth::Wide, 70000),
            vec![GOTO_W, 0, 1, 17, 112]
        );
    }

    #[test]
    fn switch_alignment() {
        assert_eq!(switch_padding(0), 3);
        assert_eq!(switch_padding(1), 2);
        assert_eq!(switch_padding(2), 1);
        assert_eq!(switch_padding(3), 0);

        let mut labels = LabelGenerator::new();
        let default = labels.fresh_label();
        let lookup = Insn::LookupSwitch {
            default,
            pairs: vec![(7, labels.fresh_label())],
        };
        assert_eq!(
            encode(&lookup, 1, JumpWidth::Narrow, 21),
            vec![LOOKUPSWITCH, 0, 0, 0, 0, 0, 20, 0, 0, 0, 1, 0, 0, 0, 7, 0, 0, 0, 20]
        );
    }
}
