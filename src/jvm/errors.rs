use super::{Constant, Label, Version};
use std::fmt;

#[derive(Debug)]
pub enum Error {
    /// The class file bytes do not follow the class file layout
    ///
    /// `offset` is the position in the input where decoding gave up.
    Malformed { offset: usize, kind: MalformedKind },

    IoError(std::io::Error),

    ConstantPoolOverflow {
        constant: Constant,
        offset: usize,
    },

    /// Encoded code array is longer than 65535 bytes
    MethodCodeOverflow { method: String, length: usize },

    InvalidDescriptor(String),

    /// A table has more entries than its count field can hold
    TooManyEntries { count: usize, limit: usize },

    /// Opcode passed to a visit method that does not take instructions of its kind
    InvalidOpcode { opcode: u8, visit: &'static str },

    /// Operand that the instruction cannot encode
    InvalidOperand { opcode: u8, operand: i64 },

    /// Switch whose keys (or key range) and targets do not line up
    SwitchTargetMismatch { keys: usize, targets: usize },

    /// A label was placed twice
    DuplicateLabel(Label),

    /// A label was used that was never handed out by this method's buffer
    UnknownLabel(Label),

    /// A label was referenced but never placed before the method was finished
    UnplacedLabel(Label),

    /// Code was appended after the buffer stopped accepting instructions (`visit_maxs` or
    /// `visit_end` was already called)
    CodeAlreadyFinished,

    /// `to_bytes` was called before `visit_end`
    ClassNotFinished,

    /// A member or the end of the class was visited before the class header
    MissingHeader,

    /// `jsr`/`ret` found in a method whose class version requires stack map frames
    UnsupportedSubroutine { method: String },

    /// Abstract interpretation of a method body failed
    VerifierError {
        method: String,
        offset: usize,
        kind: VerifierErrorKind,
    },

    /// Two control flow paths reach the same instruction with types that cannot be merged
    FrameConflict {
        method: String,
        offset: usize,
        slot: FrameSlot,
        first: String,
        second: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MalformedKind {
    UnexpectedEof,
    BadMagic(u32),
    UnsupportedVersion(Version),
    BadConstantTag(u8),
    BadConstantIndex(u16),
    WrongConstantKind { index: u16, expected: &'static str },
    BadModifiedUtf8,

    /// Dynamic constant whose bootstrap arguments lead back to itself
    ConstantCycle(u16),
    LengthMismatch {
        attribute: String,
        declared: u32,
        actual: usize,
    },
    BadOpcode(u8),
    BadJumpTarget(i64),
    BadStackMapFrame(u8),

    /// Method or field descriptor that does not parse
    BadDescriptor(String),
    BadElementValue(u8),
    BadTypeAnnotationTarget(u8),

    /// Annotation values nested deeper than the reader follows
    AnnotationTooDeep,
    TrailingBytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifierErrorKind {
    EmptyStack,
    InvalidWidth(usize),
    InvalidLocal(u16),
    NotArrayType,

    /// `invokespecial <init>` on a value that is not uninitialized
    NotInitializable,

    /// Control falls off the end of the code array
    FallsOffEnd,

    /// Opcode used with operands it does not take
    UnexpectedOpcode(u8),
    BadDescriptor(String),
}

/// Location of a conflicting type in a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameSlot {
    Local(usize),
    Stack(usize),

    /// The two paths disagree on the number of operand stack words
    StackHeight,
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::IoError(err)
    }
}

impl Error {
    /// Is this an error from decoding malformed input?
    pub fn is_malformed(&self) -> bool {
        matches!(self, Error::Malformed { .. })
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Malformed { offset, kind } => {
                write!(f, "malformed class file at byte {}: {}", offset, kind)
            }
            Error::IoError(err) => write!(f, "I/O error: {}", err),
            Error::ConstantPoolOverflow { constant, offset } => write!(
                f,
                "constant pool overflow inserting {:?} at index {}",
                constant, offset
            ),
            Error::MethodCodeOverflow { method, length } => write!(
                f,
                "code of {} is {} bytes long (limit is 65535)",
                method, length
            ),
            Error::InvalidDescriptor(reason) => write!(f, "invalid descriptor: {}", reason),
            Error::TooManyEntries { count, limit } => {
                write!(f, "{} entries do not fit in a table of at most {}", count, limit)
            }
            Error::InvalidOpcode { opcode, visit } => {
                write!(f, "opcode {} cannot be passed to `{}`", opcode, visit)
            }
            Error::InvalidOperand { opcode, operand } => {
                write!(f, "operand {} is out of range for opcode {}", operand, opcode)
            }
            Error::SwitchTargetMismatch { keys, targets } => {
                write!(f, "switch has {} keys but {} targets", keys, targets)
            }
            Error::DuplicateLabel(label) => write!(f, "label {} placed twice", label),
            Error::UnknownLabel(label) => write!(f, "label {} does not belong to this method", label),
            Error::UnplacedLabel(label) => write!(f, "label {} is referenced but never placed", label),
            Error::CodeAlreadyFinished => write!(f, "method code is already finished"),
            Error::ClassNotFinished => write!(f, "class is not finished (missing `visit_end`)"),
            Error::MissingHeader => write!(f, "class header was never visited"),
            Error::UnsupportedSubroutine { method } => write!(
                f,
                "{} uses `jsr`/`ret`, which cannot have stack map frames",
                method
            ),
            Error::VerifierError {
                method,
                offset,
                kind,
            } => write!(f, "invalid code in {} at offset {}: {:?}", method, offset, kind),
            Error::FrameConflict {
                method,
                offset,
                slot,
                first,
                second,
            } => write!(
                f,
                "incompatible frames in {} at offset {} ({:?}): {} vs. {}",
                method, offset, slot, first, second
            ),
        }
    }
}

impl fmt::Display for MalformedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MalformedKind::UnexpectedEof => write!(f, "unexpected end of input"),
            MalformedKind::BadMagic(magic) => write!(f, "bad magic number {:#010x}", magic),
            MalformedKind::UnsupportedVersion(version) => {
                write!(f, "unsupported class file version {}", version)
            }
            MalformedKind::BadConstantTag(tag) => write!(f, "unknown constant tag {}", tag),
            MalformedKind::BadConstantIndex(index) => {
                write!(f, "constant index {} is out of range", index)
            }
            MalformedKind::WrongConstantKind { index, expected } => {
                write!(f, "constant {} is not a {}", index, expected)
            }
            MalformedKind::BadModifiedUtf8 => write!(f, "invalid modified UTF-8"),
            MalformedKind::ConstantCycle(index) => {
                write!(f, "dynamic constant {} refers to itself", index)
            }
            MalformedKind::LengthMismatch {
                attribute,
                declared,
                actual,
            } => write!(
                f,
                "attribute {} declares {} bytes but has {}",
                attribute, declared, actual
            ),
            MalformedKind::BadOpcode(opcode) => write!(f, "invalid opcode {}", opcode),
            MalformedKind::BadJumpTarget(target) => write!(f, "invalid jump target {}", target),
            MalformedKind::BadStackMapFrame(tag) => {
                write!(f, "invalid stack map frame or type tag {}", tag)
            }
            MalformedKind::BadDescriptor(reason) => write!(f, "invalid descriptor: {}", reason),
            MalformedKind::BadElementValue(tag) => {
                write!(f, "invalid annotation element tag {}", tag)
            }
            MalformedKind::BadTypeAnnotationTarget(target) => {
                write!(f, "invalid type annotation target {:#04x}", target)
            }
            MalformedKind::AnnotationTooDeep => write!(f, "annotation values are nested too deeply"),
            MalformedKind::TrailingBytes => write!(f, "trailing bytes after class"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::IoError(err) => Some(err),
            _ => None,
        }
    }
}
