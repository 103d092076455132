//! JVM opcodes
//!
//! Instructions are passed around in the visitor interfaces as a raw opcode plus operands, the
//! same way they appear in the [instruction set chapter][0]. Opcodes that the reader normalises
//! away (`iload_0`, `wide`, `ldc_w`, `goto_w`, ...) are still listed since they appear in the
//! bytes.
//!
//! [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-6.html#jvms-6.5

pub const NOP: u8 = 0;
pub const ACONST_NULL: u8 = 1;
pub const ICONST_M1: u8 = 2;
pub const ICONST_0: u8 = 3;
pub const ICONST_1: u8 = 4;
pub const ICONST_2: u8 = 5;
pub const ICONST_3: u8 = 6;
pub const ICONST_4: u8 = 7;
pub const ICONST_5: u8 = 8;
pub const LCONST_0: u8 = 9;
pub const LCONST_1: u8 = 10;
pub const FCONST_0: u8 = 11;
pub const FCONST_1: u8 = 12;
pub const FCONST_2: u8 = 13;
pub const DCONST_0: u8 = 14;
pub const DCONST_1: u8 = 15;
pub const BIPUSH: u8 = 16;
pub const SIPUSH: u8 = 17;
pub const LDC: u8 = 18;
pub const LDC_W: u8 = 19;
pub const LDC2_W: u8 = 20;
pub const ILOAD: u8 = 21;
pub const LLOAD: u8 = 22;
pub const FLOAD: u8 = 23;
pub const DLOAD: u8 = 24;
pub const ALOAD: u8 = 25;
pub const ILOAD_0: u8 = 26;
pub const ALOAD_3: u8 = 45;
pub const IALOAD: u8 = 46;
pub const LALOAD: u8 = 47;
pub const FALOAD: u8 = 48;
pub const DALOAD: u8 = 49;
pub const AALOAD: u8 = 50;
pub const BALOAD: u8 = 51;
pub const CALOAD: u8 = 52;
pub const SALOAD: u8 = 53;
pub const ISTORE: u8 = 54;
pub const LSTORE: u8 = 55;
pub const FSTORE: u8 = 56;
pub const DSTORE: u8 = 57;
pub const ASTORE: u8 = 58;
pub const ISTORE_0: u8 = 59;
pub const ASTORE_3: u8 = 78;
pub const IASTORE: u8 = 79;
pub const LASTORE: u8 = 80;
pub const FASTORE: u8 = 81;
pub const DASTORE: u8 = 82;
pub const AASTORE: u8 = 83;
pub const BASTORE: u8 = 84;
pub const CASTORE: u8 = 85;
pub const SASTORE: u8 = 86;
pub const POP: u8 = 87;
pub const POP2: u8 = 88;
pub const DUP: u8 = 89;
pub const DUP_X1: u8 = 90;
pub const DUP_X2: u8 = 91;
pub const DUP2: u8 = 92;
pub const DUP2_X1: u8 = 93;
pub const DUP2_X2: u8 = 94;
pub const SWAP: u8 = 95;
pub const IADD: u8 = 96;
pub const LADD: u8 = 97;
pub const FADD: u8 = 98;
pub const DADD: u8 = 99;
pub const ISUB: u8 = 100;
pub const LSUB: u8 = 101;
pub const FSUB: u8 = 102;
pub const DSUB: u8 = 103;
pub const IMUL: u8 = 104;
pub const LMUL: u8 = 105;
pub const FMUL: u8 = 106;
pub const DMUL: u8 = 107;
pub const IDIV: u8 = 108;
pub const LDIV: u8 = 109;
pub const FDIV: u8 = 110;
pub const DDIV: u8 = 111;
pub const IREM: u8 = 112;
pub const LREM: u8 = 113;
pub const FREM: u8 = 114;
pub const DREM: u8 = 115;
pub const INEG: u8 = 116;
pub const LNEG: u8 = 117;
pub const FNEG: u8 = 118;
pub const DNEG: u8 = 119;
pub const ISHL: u8 = 120;
pub const LSHL: u8 = 121;
pub const ISHR: u8 = 122;
pub const LSHR: u8 = 123;
pub const IUSHR: u8 = 124;
pub const LUSHR: u8 = 125;
pub const IAND: u8 = 126;
pub const LAND: u8 = 127;
pub const IOR: u8 = 128;
pub const LOR: u8 = 129;
pub const IXOR: u8 = 130;
pub const LXOR: u8 = 131;
pub const IINC: u8 = 132;
pub const I2L: u8 = 133;
pub const I2F: u8 = 134;
pub const I2D: u8 = 135;
pub const L2I: u8 = 136;
pub const L2F: u8 = 137;
pub const L2D: u8 = 138;
pub const F2I: u8 = 139;
pub const F2L: u8 = 140;
pub const F2D: u8 = 141;
pub const D2I: u8 = 142;
pub const D2L: u8 = 143;
pub const D2F: u8 = 144;
pub const I2B: u8 = 145;
pub const I2C: u8 = 146;
pub const I2S: u8 = 147;
pub const LCMP: u8 = 148;
pub const FCMPL: u8 = 149;
pub const FCMPG: u8 = 150;
pub const DCMPL: u8 = 151;
pub const DCMPG: u8 = 152;
pub const IFEQ: u8 = 153;
pub const IFNE: u8 = 154;
pub const IFLT: u8 = 155;
pub const IFGE: u8 = 156;
pub const IFGT: u8 = 157;
pub const IFLE: u8 = 158;
pub const IF_ICMPEQ: u8 = 159;
pub const IF_ICMPNE: u8 = 160;
pub const IF_ICMPLT: u8 = 161;
pub const IF_ICMPGE: u8 = 162;
pub const IF_ICMPGT: u8 = 163;
pub const IF_ICMPLE: u8 = 164;
pub const IF_ACMPEQ: u8 = 165;
pub const IF_ACMPNE: u8 = 166;
pub const GOTO: u8 = 167;
pub const JSR: u8 = 168;
pub const RET: u8 = 169;
pub const TABLESWITCH: u8 = 170;
pub const LOOKUPSWITCH: u8 = 171;
pub const IRETURN: u8 = 172;
pub const LRETURN: u8 = 173;
pub const FRETURN: u8 = 174;
pub const DRETURN: u8 = 175;
pub const ARETURN: u8 = 176;
pub const RETURN: u8 = 177;
pub const GETSTATIC: u8 = 178;
pub const PUTSTATIC: u8 = 179;
pub const GETFIELD: u8 = 180;
pub const PUTFIELD: u8 = 181;
pub const INVOKEVIRTUAL: u8 = 182;
pub const INVOKESPECIAL: u8 = 183;
pub const INVOKESTATIC: u8 = 184;
pub const INVOKEINTERFACE: u8 = 185;
pub const INVOKEDYNAMIC: u8 = 186;
pub const NEW: u8 = 187;
pub const NEWARRAY: u8 = 188;
pub const ANEWARRAY: u8 = 189;
pub const ARRAYLENGTH: u8 = 190;
pub const ATHROW: u8 = 191;
pub const CHECKCAST: u8 = 192;
pub const INSTANCEOF: u8 = 193;
pub const MONITORENTER: u8 = 194;
pub const MONITOREXIT: u8 = 195;
pub const WIDE: u8 = 196;
pub const MULTIANEWARRAY: u8 = 197;
pub const IFNULL: u8 = 198;
pub const IFNONNULL: u8 = 199;
pub const GOTO_W: u8 = 200;
pub const JSR_W: u8 = 201;

/// `newarray` element type codes
pub const T_BOOLEAN: u8 = 4;
pub const T_CHAR: u8 = 5;
pub const T_FLOAT: u8 = 6;
pub const T_DOUBLE: u8 = 7;
pub const T_BYTE: u8 = 8;
pub const T_SHORT: u8 = 9;
pub const T_INT: u8 = 10;
pub const T_LONG: u8 = 11;

/// How the operands of an opcode are laid out in the code array
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum OperandKind {
    /// No operands (1 byte total)
    None,
    /// Signed byte operand (`bipush`) or array type code (`newarray`)
    Byte,
    /// Signed short operand (`sipush`)
    Short,
    /// Local variable index encoded in the opcode itself (`iload_0`, `astore_3`, ...)
    ImplicitVar,
    /// Unsigned byte local variable index
    Var,
    /// Class constant index
    Type,
    /// Field reference constant index
    Field,
    /// Method reference constant index
    Method,
    /// Interface method reference index, count byte and a zero byte
    InterfaceMethod,
    /// Invoke dynamic constant index and two zero bytes
    InvokeDynamic,
    /// Signed 16-bit relative jump
    Jump,
    /// Signed 32-bit relative jump
    JumpWide,
    /// 8-bit constant index
    Ldc,
    /// 16-bit constant index (`ldc_w`, `ldc2_w`)
    LdcWide,
    /// Variable index and signed byte increment
    IInc,
    TableSwitch,
    LookupSwitch,
    /// Class constant index and dimension count
    MultiANewArray,
    /// Prefix widening the next instruction's operands
    Wide,
}

/// Operand layout of an opcode, or `None` for opcodes that are not valid in a class file
pub fn operand_kind(opcode: u8) -> Option<OperandKind> {
    use OperandKind::*;
    let kind = match opcode {
        NOP..=DCONST_1 => None,
        BIPUSH | NEWARRAY => Byte,
        SIPUSH => Short,
        LDC => Ldc,
        LDC_W | LDC2_W => LdcWide,
        ILOAD..=ALOAD | ISTORE..=ASTORE | RET => Var,
        ILOAD_0..=ALOAD_3 | ISTORE_0..=ASTORE_3 => ImplicitVar,
        IALOAD..=SALOAD | IASTORE..=LXOR => None,
        IINC => IInc,
        I2L..=DCMPG => None,
        IFEQ..=JSR | IFNULL | IFNONNULL => Jump,
        GOTO_W | JSR_W => JumpWide,
        TABLESWITCH => TableSwitch,
        LOOKUPSWITCH => LookupSwitch,
        IRETURN..=RETURN => None,
        GETSTATIC..=PUTFIELD => Field,
        INVOKEVIRTUAL..=INVOKESTATIC => Method,
        INVOKEINTERFACE => InterfaceMethod,
        INVOKEDYNAMIC => InvokeDynamic,
        NEW | ANEWARRAY | CHECKCAST | INSTANCEOF => Type,
        ARRAYLENGTH | ATHROW | MONITORENTER | MONITOREXIT => None,
        WIDE => Wide,
        MULTIANEWARRAY => MultiANewArray,
        _ => return Option::None,
    };
    Some(kind)
}

/// Opcode of the conditional jump taken exactly when `opcode` is not taken
///
/// Only meaningful for `if*`, `if_icmp*`, `if_acmp*`, `ifnull`, and `ifnonnull`.
pub fn invert_condition(opcode: u8) -> u8 {
    match opcode {
        IFNULL => IFNONNULL,
        IFNONNULL => IFNULL,
        // Conditions come in (even, odd) pairs starting at `ifeq`
        _ => ((opcode - IFEQ) ^ 1) + IFEQ,
    }
}

/// Is this a conditional jump (one that can also fall through)?
pub fn is_conditional_jump(opcode: u8) -> bool {
    matches!(opcode, IFEQ..=IF_ACMPNE | IFNULL | IFNONNULL)
}

/// Does control never continue to the next instruction?
pub fn ends_flow(opcode: u8) -> bool {
    matches!(
        opcode,
        GOTO | GOTO_W | RET | TABLESWITCH | LOOKUPSWITCH | IRETURN..=RETURN | ATHROW
    )
}

/// Mnemonic used when printing instructions
pub fn mnemonic(opcode: u8) -> &'static str {
    const NAMES: [&str; 202] = [
        "nop", "aconst_null", "iconst_m1", "iconst_0", "iconst_1", "iconst_2", "iconst_3",
        "iconst_4", "iconst_5", "lconst_0", "lconst_1", "fconst_0", "fconst_1", "fconst_2",
        "dconst_0", "dconst_1", "bipush", "sipush", "ldc", "ldc_w", "ldc2_w", "iload", "lload",
        "fload", "dload", "aload", "iload_0", "iload_1", "iload_2", "iload_3", "lload_0",
        "lload_1", "lload_2", "lload_3", "fload_0", "fload_1", "fload_2", "fload_3", "dload_0",
        "dload_1", "dload_2", "dload_3", "aload_0", "aload_1", "aload_2", "aload_3", "iaload",
        "laload", "faload", "daload", "aaload", "baload", "caload", "saload", "istore", "lstore",
        "fstore", "dstore", "astore", "istore_0", "istore_1", "istore_2", "istore_3", "lstore_0",
        "lstore_1", "lstore_2", "lstore_3", "fstore_0", "fstore_1", "fstore_2", "fstore_3",
        "dstore_0", "dstore_1", "dstore_2", "dstore_3", "astore_0", "astore_1", "astore_2",
        "astore_3", "iastore", "lastore", "fastore", "dastore", "aastore", "bastore", "castore",
        "sastore", "pop", "pop2", "dup", "dup_x1", "dup_x2", "dup2", "dup2_x1", "dup2_x2",
        "swap", "iadd", "ladd", "fadd", "dadd", "isub", "lsub", "fsub", "dsub", "imul", "lmul",
        "fmul", "dmul", "idiv", "ldiv", "fdiv", "ddiv", "irem", "lrem", "frem", "drem", "ineg",
        "lneg", "fneg", "dneg", "ishl", "lshl", "ishr", "lshr", "iushr", "lushr", "iand", "land",
        "ior", "lor", "ixor", "lxor", "iinc", "i2l", "i2f", "i2d", "l2i", "l2f", "l2d", "f2i",
        "f2l", "f2d", "d2i", "d2l", "d2f", "i2b", "i2c", "i2s", "lcmp", "fcmpl", "fcmpg",
        "dcmpl", "dcmpg", "ifeq", "ifne", "iflt", "ifge", "ifgt", "ifle", "if_icmpeq",
        "if_icmpne", "if_icmplt", "if_icmpge", "if_icmpgt", "if_icmple", "if_acmpeq",
        "if_acmpne", "goto", "jsr", "ret", "tableswitch", "lookupswitch", "ireturn", "lreturn",
        "freturn", "dreturn", "areturn", "return", "getstatic", "putstatic", "getfield",
        "putfield", "invokevirtual", "invokespecial", "invokestatic", "invokeinterface",
        "invokedynamic", "new", "newarray", "anewarray", "arraylength", "athrow", "checkcast",
        "instanceof", "monitorenter", "monitorexit", "wide", "multianewarray", "ifnull",
        "ifnonnull", "goto_w", "jsr_w",
    ];
    NAMES.get(opcode as usize).copied().unwrap_or("<invalid>")
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn inverted_conditions() {
        assert_eq!(invert_condition(IFEQ), IFNE);
        assert_eq!(invert_condition(IFNE), IFEQ);
        assert_eq!(invert_condition(IFLT), IFGE);
        assert_eq!(invert_condition(IFGT), IFLE);
        assert_eq!(invert_condition(IF_ICMPEQ), IF_ICMPNE);
        assert_eq!(invert_condition(IF_ICMPLE), IF_ICMPGT);
        assert_eq!(invert_condition(IF_ACMPNE), IF_ACMPEQ);
        assert_eq!(invert_condition(IFNULL), IFNONNULL);
    }

    #[test]
    fn operand_kinds() {
        assert_eq!(operand_kind(ILOAD_0 + 3), Some(OperandKind::ImplicitVar));
        assert_eq!(operand_kind(RET), Some(OperandKind::Var));
        assert_eq!(operand_kind(GOTO), Some(OperandKind::Jump));
        assert_eq!(operand_kind(JSR_W), Some(OperandKind::JumpWide));
        assert_eq!(operand_kind(202), None);
        assert_eq!(mnemonic(INVOKEDYNAMIC), "invokedynamic");
        assert_eq!(mnemonic(255), "<invalid>");
    }
}
