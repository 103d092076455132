//! Annotations attached to classes, fields, and methods
//!
//! Annotation attributes are full of constant pool indices, so they are decoded into values
//! that own their strings. Writing them back interns everything again, which keeps them valid
//! in whatever constant pool the output ends up with.

use crate::jvm::{ConstantPool, Error, Serialize};
use crate::util::ByteVector;
use std::fmt;

/// Annotation, with its elements in class file order
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    /// Field descriptor of the annotation interface (eg. `Ljava/lang/Deprecated;`)
    pub type_descriptor: String,
    pub elements: Vec<(String, ElementValue)>,
}

/// Value of an annotation element
#[derive(Debug, Clone, PartialEq)]
pub enum ElementValue {
    Byte(i8),
    Char(u16),
    Short(i16),
    Boolean(bool),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    Enum {
        type_descriptor: String,
        name: String,
    },

    /// Return descriptor of the class (`V` for `void.class`)
    Class(String),
    Annotation(Annotation),
    Array(Vec<ElementValue>),
}

/// Annotation on a type use
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeAnnotationTarget {
    /// `target_type` followed by `target_info`
    ///
    /// Only targets that can appear outside of code are accepted, and none of those refer to the
    /// constant pool or to code offsets.
    pub target: Vec<u8>,

    /// Steps of the `type_path`, as (kind, type argument index)
    pub path: Vec<(u8, u8)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeAnnotation {
    pub target: TypeAnnotationTarget,
    pub annotation: Annotation,
}

/// One of the annotation attributes
#[derive(Debug, Clone, PartialEq)]
pub enum AnnotationAttribute {
    /// `RuntimeVisibleAnnotations` or `RuntimeInvisibleAnnotations`
    Annotations {
        visible: bool,
        annotations: Vec<Annotation>,
    },

    /// `RuntimeVisibleParameterAnnotations` or `RuntimeInvisibleParameterAnnotations`
    ParameterAnnotations {
        visible: bool,
        parameters: Vec<Vec<Annotation>>,
    },

    /// `RuntimeVisibleTypeAnnotations` or `RuntimeInvisibleTypeAnnotations`
    TypeAnnotations {
        visible: bool,
        annotations: Vec<TypeAnnotation>,
    },

    /// Default value of an annotation interface element
    Default(ElementValue),
}

pub const RUNTIME_VISIBLE_ANNOTATIONS: &str = "RuntimeVisibleAnnotations";
pub const RUNTIME_INVISIBLE_ANNOTATIONS: &str = "RuntimeInvisibleAnnotations";
pub const RUNTIME_VISIBLE_PARAMETER_ANNOTATIONS: &str = "RuntimeVisibleParameterAnnotations";
pub const RUNTIME_INVISIBLE_PARAMETER_ANNOTATIONS: &str = "RuntimeInvisibleParameterAnnotations";
pub const RUNTIME_VISIBLE_TYPE_ANNOTATIONS: &str = "RuntimeVisibleTypeAnnotations";
pub const RUNTIME_INVISIBLE_TYPE_ANNOTATIONS: &str = "RuntimeInvisibleTypeAnnotations";
pub const ANNOTATION_DEFAULT: &str = "AnnotationDefault";

/// Is this the name of an attribute that decodes into an [`AnnotationAttribute`]?
pub fn is_annotation_attribute(name: &str) -> bool {
    matches!(
        name,
        RUNTIME_VISIBLE_ANNOTATIONS
            | RUNTIME_INVISIBLE_ANNOTATIONS
            | RUNTIME_VISIBLE_PARAMETER_ANNOTATIONS
            | RUNTIME_INVISIBLE_PARAMETER_ANNOTATIONS
            | RUNTIME_VISIBLE_TYPE_ANNOTATIONS
            | RUNTIME_INVISIBLE_TYPE_ANNOTATIONS
            | ANNOTATION_DEFAULT
    )
}

/// Length of `target_info` for a `target_type` allowed on classes, fields, and methods
pub(crate) fn target_info_length(target_type: u8) -> Option<usize> {
    match target_type {
        // Type parameter of a class or method
        0x00 | 0x01 => Some(1),
        // `extends`/`implements`
        0x10 => Some(2),
        // Bound of a type parameter
        0x11 | 0x12 => Some(2),
        // Field, return type, receiver
        0x13 | 0x14 | 0x15 => Some(0),
        // Formal parameter
        0x16 => Some(1),
        // `throws`
        0x17 => Some(2),
        _ => None,
    }
}

impl AnnotationAttribute {
    pub fn name(&self) -> &'static str {
        match self {
            AnnotationAttribute::Annotations { visible: true, .. } => RUNTIME_VISIBLE_ANNOTATIONS,
            AnnotationAttribute::Annotations { .. } => RUNTIME_INVISIBLE_ANNOTATIONS,
            AnnotationAttribute::ParameterAnnotations { visible: true, .. } => {
                RUNTIME_VISIBLE_PARAMETER_ANNOTATIONS
            }
            AnnotationAttribute::ParameterAnnotations { .. } => {
                RUNTIME_INVISIBLE_PARAMETER_ANNOTATIONS
            }
            AnnotationAttribute::TypeAnnotations { visible: true, .. } => {
                RUNTIME_VISIBLE_TYPE_ANNOTATIONS
            }
            AnnotationAttribute::TypeAnnotations { .. } => RUNTIME_INVISIBLE_TYPE_ANNOTATIONS,
            AnnotationAttribute::Default(_) => ANNOTATION_DEFAULT,
        }
    }

    /// Write the whole attribute (name index, length, body), interning constants as needed
    pub fn write(&self, out: &mut ByteVector, constants: &mut ConstantPool) -> Result<(), Error> {
        constants.get_utf8(self.name())?.serialize(out)?;
        let length_at = out.reserve_u32();
        let body_start = out.len();
        match self {
            AnnotationAttribute::Annotations { annotations, .. } => {
                write_annotations(out, constants, annotations)?;
            }
            AnnotationAttribute::ParameterAnnotations { parameters, .. } => {
                out.put_u8(count_u8(parameters.len())?);
                for annotations in parameters {
                    write_annotations(out, constants, annotations)?;
                }
            }
            AnnotationAttribute::TypeAnnotations { annotations, .. } => {
                out.put_u16(count_u16(annotations.len())?);
                for type_annotation in annotations {
                    let target = &type_annotation.target;
                    out.put_bytes(&target.target);
                    out.put_u8(count_u8(target.path.len())?);
                    for (kind, argument) in &target.path {
                        out.put_u8(*kind).put_u8(*argument);
                    }
                    type_annotation.annotation.write(out, constants)?;
                }
            }
            AnnotationAttribute::Default(value) => value.write(out, constants)?,
        }
        out.overwrite_u32(length_at, (out.len() - body_start) as u32);
        Ok(())
    }
}

impl Annotation {
    fn write(&self, out: &mut ByteVector, constants: &mut ConstantPool) -> Result<(), Error> {
        constants.get_utf8(&self.type_descriptor)?.serialize(out)?;
        out.put_u16(count_u16(self.elements.len())?);
        for (name, value) in &self.elements {
            constants.get_utf8(name)?.serialize(out)?;
            value.write(out, constants)?;
        }
        Ok(())
    }
}

impl ElementValue {
    /// Tag byte of the value in the class file
    pub fn tag(&self) -> u8 {
        match self {
            ElementValue::Byte(_) => b'B',
            ElementValue::Char(_) => b'C',
            ElementValue::Short(_) => b'S',
            ElementValue::Boolean(_) => b'Z',
            ElementValue::Int(_) => b'I',
            ElementValue::Long(_) => b'J',
            ElementValue::Float(_) => b'F',
            ElementValue::Double(_) => b'D',
            ElementValue::String(_) => b's',
            ElementValue::Enum { .. } => b'e',
            ElementValue::Class(_) => b'c',
            ElementValue::Annotation(_) => b'@',
            ElementValue::Array(_) => b'[',
        }
    }

    fn write(&self, out: &mut ByteVector, constants: &mut ConstantPool) -> Result<(), Error> {
        out.put_u8(self.tag());
        match self {
            ElementValue::Byte(value) => constants.get_integer(*value as i32)?.serialize(out)?,
            ElementValue::Char(value) => constants.get_integer(*value as i32)?.serialize(out)?,
            ElementValue::Short(value) => constants.get_integer(*value as i32)?.serialize(out)?,
            ElementValue::Boolean(value) => constants.get_integer(*value as i32)?.serialize(out)?,
            ElementValue::Int(value) => constants.get_integer(*value)?.serialize(out)?,
            ElementValue::Long(value) => constants.get_long(*value)?.serialize(out)?,
            ElementValue::Float(value) => constants.get_float(*value)?.serialize(out)?,
            ElementValue::Double(value) => constants.get_double(*value)?.serialize(out)?,
            ElementValue::String(value) | ElementValue::Class(value) => {
                constants.get_utf8(value)?.serialize(out)?
            }
            ElementValue::Enum {
                type_descriptor,
                name,
            } => {
                constants.get_utf8(type_descriptor)?.serialize(out)?;
                constants.get_utf8(name)?.serialize(out)?;
            }
            ElementValue::Annotation(annotation) => annotation.write(out, constants)?,
            ElementValue::Array(values) => {
                out.put_u16(count_u16(values.len())?);
                for value in values {
                    value.write(out, constants)?;
                }
            }
        }
        Ok(())
    }
}

fn write_annotations(
    out: &mut ByteVector,
    constants: &mut ConstantPool,
    annotations: &[Annotation],
) -> Result<(), Error> {
    out.put_u16(count_u16(annotations.len())?);
    for annotation in annotations {
        annotation.write(out, constants)?;
    }
    Ok(())
}

fn count_u16(count: usize) -> Result<u16, Error> {
    u16::try_from(count).map_err(|_| Error::TooManyEntries { count, limit: 65535 })
}

fn count_u8(count: usize) -> Result<u8, Error> {
    u8::try_from(count).map_err(|_| Error::TooManyEntries { count, limit: 255 })
}

fn join<T: fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(|item| item.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl fmt::Display for Annotation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "@{}", self.type_descriptor)?;
        if !self.elements.is_empty() {
            let elements = self
                .elements
                .iter()
                .map(|(name, value)| format!("{}={}", name, value))
                .collect::<Vec<_>>();
            write!(f, "({})", elements.join(", "))?;
        }
        Ok(())
    }
}

impl fmt::Display for ElementValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ElementValue::Byte(byte) => write!(f, "(byte){}", byte),
            ElementValue::Char(code) => match char::from_u32(u32::from(*code)) {
                Some(char) => write!(f, "{:?}", char),
                None => write!(f, "'\\u{:04x}'", code),
            },
            ElementValue::Short(short) => write!(f, "(short){}", short),
            ElementValue::Boolean(boolean) => write!(f, "{}", boolean),
            ElementValue::Int(int) => write!(f, "{}", int),
            ElementValue::Long(long) => write!(f, "{}L", long),
            ElementValue::Float(float) => write!(f, "{:?}f", float),
            ElementValue::Double(double) => write!(f, "{:?}d", double),
            ElementValue::String(string) => write!(f, "{:?}", string),
            ElementValue::Enum {
                type_descriptor,
                name,
            } => write!(f, "{}.{}", type_descriptor, name),
            ElementValue::Class(class) => write!(f, "{}.class", class),
            ElementValue::Annotation(annotation) => write!(f, "{}", annotation),
            ElementValue::Array(values) => write!(f, "{{{}}}", join(values)),
        }
    }
}

/// Contents of the attribute on one line
impl fmt::Display for AnnotationAttribute {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AnnotationAttribute::Annotations { annotations, .. } => {
                write!(f, "{}", join(annotations))
            }
            AnnotationAttribute::ParameterAnnotations { parameters, .. } => {
                let parameters = parameters
                    .iter()
                    .enumerate()
                    .map(|(index, annotations)| format!("#{} {{{}}}", index, join(annotations)))
                    .collect::<Vec<_>>();
                write!(f, "{}", parameters.join(", "))
            }
            AnnotationAttribute::TypeAnnotations { annotations, .. } => {
                let annotations = annotations
                    .iter()
                    .map(|annotation| {
                        format!(
                            "{} on {:02x?} path {:?}",
                            annotation.annotation,
                            annotation.target.target,
                            annotation.target.path
                        )
                    })
                    .collect::<Vec<_>>();
                write!(f, "{}", annotations.join(", "))
            }
            AnnotationAttribute::Default(value) => write!(f, "{}", value),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::Constant;

    #[test]
    fn element_values_intern_by_tag() {
        let mut constants = ConstantPool::new();
        let attribute = AnnotationAttribute::Annotations {
            visible: true,
            annotations: vec![Annotation {
                type_descriptor: String::from("Lme/Ann;"),
                elements: vec![
                    (String::from("flag"), ElementValue::Boolean(true)),
                    (String::from("count"), ElementValue::Int(1)),
                    (String::from("label"), ElementValue::String(String::from("x"))),
                ],
            }],
        };
        let mut out = ByteVector::new();
        attribute.write(&mut out, &mut constants).unwrap();

        // `true` and `1` share a constant, and strings are plain `Utf8`
        let kinds: Vec<_> = constants.iter().map(|(_, constant)| constant.clone()).collect();
        assert_eq!(
            kinds,
            vec![
                Constant::Utf8(String::from("RuntimeVisibleAnnotations")),
                Constant::Utf8(String::from("Lme/Ann;")),
                Constant::Utf8(String::from("flag")),
                Constant::Integer(1),
                Constant::Utf8(String::from("count")),
                Constant::Utf8(String::from("label")),
                Constant::Utf8(String::from("x")),
            ]
        );
        assert_eq!(
            out.as_slice(),
            &[
                0, 1, 0, 0, 0, 21, // name and length
                0, 1, // one annotation
                0, 2, 0, 3, // type, three elements
                0, 3, b'Z', 0, 4, // flag = true
                0, 5, b'I', 0, 4, // count = 1
                0, 6, b's', 0, 7, // label = "x"
            ]
        );
    }

    #[test]
    fn too_many_parameters() {
        let mut constants = ConstantPool::new();
        let attribute = AnnotationAttribute::ParameterAnnotations {
            visible: false,
            parameters: vec![vec![]; 256],
        };
        let mut out = ByteVector::new();
        assert!(matches!(
            attribute.write(&mut out, &mut constants),
            Err(Error::TooManyEntries {
                count: 256,
                limit: 255
            })
        ));
    }

    #[test]
    fn target_lengths() {
        assert_eq!(target_info_length(0x13), Some(0));
        assert_eq!(target_info_length(0x17), Some(2));
        // `new` expressions only appear in code
        assert_eq!(target_info_length(0x44), None);
    }
}
