use super::HandleKind;
use crate::jvm::descriptors::{FieldType, ParseDescriptor};
use crate::jvm::verifier::VerificationType;
use crate::util::Width;
use std::fmt;

/// Loadable constant, as used by `ldc` and as a bootstrap method argument
///
/// This is the resolved (index free) counterpart of the loadable entries in [`super::Constant`].
#[derive(Debug, Clone)]
pub enum ConstantValue {
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    String(String),

    /// Class by internal name (or descriptor, for arrays)
    Class(String),

    /// Method type, by method descriptor
    MethodType(String),
    MethodHandle(Handle),
    Dynamic(ConstantDynamic),
}

impl ConstantValue {
    /// Type of the value this constant pushes on the operand stack
    pub fn verification_type<U>(&self) -> VerificationType<String, U> {
        match self {
            ConstantValue::Integer(_) => VerificationType::Integer,
            ConstantValue::Float(_) => VerificationType::Float,
            ConstantValue::Long(_) => VerificationType::Long,
            ConstantValue::Double(_) => VerificationType::Double,
            ConstantValue::String(_) => VerificationType::object("java/lang/String"),
            ConstantValue::Class(_) => VerificationType::object("java/lang/Class"),
            ConstantValue::MethodType(_) => {
                VerificationType::object("java/lang/invoke/MethodType")
            }
            ConstantValue::MethodHandle(_) => {
                VerificationType::object("java/lang/invoke/MethodHandle")
            }
            ConstantValue::Dynamic(dynamic) => match FieldType::parse(&dynamic.descriptor) {
                Ok(field_type) => VerificationType::from(&field_type),
                Err(_) => VerificationType::object("java/lang/Object"),
            },
        }
    }
}

/// Long and double constants (including dynamic ones with those types) take up two stack words
impl Width for ConstantValue {
    fn width(&self) -> usize {
        match self {
            ConstantValue::Long(_) | ConstantValue::Double(_) => 2,
            ConstantValue::Dynamic(dynamic) => match dynamic.descriptor.as_str() {
                "J" | "D" => 2,
                _ => 1,
            },
            _ => 1,
        }
    }
}

/// Floats are compared by their bits, the same way the constant pool dedups them
impl PartialEq for ConstantValue {
    fn eq(&self, other: &Self) -> bool {
        use ConstantValue::*;
        match (self, other) {
            (Integer(i1), Integer(i2)) => i1 == i2,
            (Float(f1), Float(f2)) => f1.to_bits() == f2.to_bits(),
            (Long(l1), Long(l2)) => l1 == l2,
            (Double(d1), Double(d2)) => d1.to_bits() == d2.to_bits(),
            (String(s1), String(s2)) => s1 == s2,
            (Class(c1), Class(c2)) => c1 == c2,
            (MethodType(m1), MethodType(m2)) => m1 == m2,
            (MethodHandle(h1), MethodHandle(h2)) => h1 == h2,
            (Dynamic(d1), Dynamic(d2)) => d1 == d2,
            _ => false,
        }
    }
}

impl Eq for ConstantValue {}

impl fmt::Display for ConstantValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstantValue::Integer(i) => write!(f, "{}", i),
            ConstantValue::Float(float) => write!(f, "{:?}f", float),
            ConstantValue::Long(l) => write!(f, "{}L", l),
            ConstantValue::Double(d) => write!(f, "{:?}d", d),
            ConstantValue::String(s) => write!(f, "{:?}", s),
            ConstantValue::Class(c) => write!(f, "class {}", c),
            ConstantValue::MethodType(m) => write!(f, "methodtype {}", m),
            ConstantValue::MethodHandle(h) => write!(f, "{}", h),
            ConstantValue::Dynamic(d) => write!(f, "condy {}:{}", d.name, d.descriptor),
        }
    }
}

/// Reference to a field or method, as the target of a `java.lang.invoke.MethodHandle`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Handle {
    pub kind: HandleKind,
    pub owner: String,
    pub name: String,
    pub descriptor: String,

    /// Does the owner refer to an interface (only meaningful for method handles)?
    pub is_interface: bool,
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "handle {:?} {}.{}:{}",
            self.kind, self.owner, self.name, self.descriptor
        )
    }
}

/// Constant computed by a bootstrap method the first time it is loaded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstantDynamic {
    pub name: String,
    pub descriptor: String,
    pub bootstrap_method: Handle,
    pub bootstrap_arguments: Vec<ConstantValue>,
}
