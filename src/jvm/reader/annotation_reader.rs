use super::class_reader::AttributeSlice;
use super::{ClassReader, Input};
use crate::jvm::annotations::*;
use crate::jvm::{Constant, Error, MalformedKind};

/// How deep annotations and arrays can nest inside element values
const MAX_ANNOTATION_NESTING: usize = 255;

impl<'a> ClassReader<'a> {
    /// Decode one of the attributes for which [`is_annotation_attribute`] holds
    pub(super) fn read_annotation_attribute(
        &self,
        attribute: &AttributeSlice,
    ) -> Result<AnnotationAttribute, Error> {
        let name = attribute.name;
        let visible = name.starts_with("RuntimeVisible");
        self.parse_attribute(attribute, |input| match name {
            RUNTIME_VISIBLE_ANNOTATIONS | RUNTIME_INVISIBLE_ANNOTATIONS => {
                Ok(AnnotationAttribute::Annotations {
                    visible,
                    annotations: self.read_annotations(input)?,
                })
            }
            RUNTIME_VISIBLE_PARAMETER_ANNOTATIONS | RUNTIME_INVISIBLE_PARAMETER_ANNOTATIONS => {
                let count = input.u8()?;
                let mut parameters = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    parameters.push(self.read_annotations(input)?);
                }
                Ok(AnnotationAttribute::ParameterAnnotations {
                    visible,
                    parameters,
                })
            }
            RUNTIME_VISIBLE_TYPE_ANNOTATIONS | RUNTIME_INVISIBLE_TYPE_ANNOTATIONS => {
                let count = input.u16()?;
                let mut annotations = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    annotations.push(self.read_type_annotation(input)?);
                }
                Ok(AnnotationAttribute::TypeAnnotations {
                    visible,
                    annotations,
                })
            }
            _ => Ok(AnnotationAttribute::Default(
                self.read_element_value(input, 0)?,
            )),
        })
    }

    fn read_annotations(&self, input: &mut Input) -> Result<Vec<Annotation>, Error> {
        let count = input.u16()?;
        let mut annotations = Vec::with_capacity(count as usize);
        for _ in 0..count {
            annotations.push(self.read_annotation(input, 0)?);
        }
        Ok(annotations)
    }

    fn read_type_annotation(&self, input: &mut Input) -> Result<TypeAnnotation, Error> {
        let at = input.offset();
        let target_type = input.u8()?;
        let info_length = target_info_length(target_type).ok_or(Error::Malformed {
            offset: at,
            kind: MalformedKind::BadTypeAnnotationTarget(target_type),
        })?;
        let mut target = vec![target_type];
        target.extend_from_slice(input.bytes(info_length)?);

        let path_length = input.u8()?;
        let mut path = Vec::with_capacity(path_length as usize);
        for _ in 0..path_length {
            let kind = input.u8()?;
            path.push((kind, input.u8()?));
        }

        Ok(TypeAnnotation {
            target: TypeAnnotationTarget { target, path },
            annotation: self.read_annotation(input, 0)?,
        })
    }

    fn read_annotation(&self, input: &mut Input, depth: usize) -> Result<Annotation, Error> {
        let at = input.offset();
        let type_descriptor = self.utf8(input.u16()?, at)?.to_owned();
        let count = input.u16()?;
        let mut elements = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let at = input.offset();
            let name = self.utf8(input.u16()?, at)?.to_owned();
            elements.push((name, self.read_element_value(input, depth)?));
        }
        Ok(Annotation {
            type_descriptor,
            elements,
        })
    }

    fn read_element_value(&self, input: &mut Input, depth: usize) -> Result<ElementValue, Error> {
        if depth > MAX_ANNOTATION_NESTING {
            return Err(input.malformed(MalformedKind::AnnotationTooDeep));
        }
        let tag_at = input.offset();
        let tag = input.u8()?;
        let at = input.offset();
        let value = match tag {
            b'B' => ElementValue::Byte(self.annotation_integer(input.u16()?, at)? as i8),
            b'C' => ElementValue::Char(self.annotation_integer(input.u16()?, at)? as u16),
            b'S' => ElementValue::Short(self.annotation_integer(input.u16()?, at)? as i16),
            b'Z' => ElementValue::Boolean(self.annotation_integer(input.u16()?, at)? != 0),
            b'I' => ElementValue::Int(self.annotation_integer(input.u16()?, at)?),
            b'J' => {
                let index = input.u16()?;
                match self.constant(index, at)? {
                    Constant::Long(long) => ElementValue::Long(*long),
                    _ => return Err(wrong_kind(index, at, "Long")),
                }
            }
            b'F' => {
                let index = input.u16()?;
                match self.constant(index, at)? {
                    Constant::Float(bits) => ElementValue::Float(f32::from_bits(*bits)),
                    _ => return Err(wrong_kind(index, at, "Float")),
                }
            }
            b'D' => {
                let index = input.u16()?;
                match self.constant(index, at)? {
                    Constant::Double(bits) => ElementValue::Double(f64::from_bits(*bits)),
                    _ => return Err(wrong_kind(index, at, "Double")),
                }
            }
            b's' => ElementValue::String(self.utf8(input.u16()?, at)?.to_owned()),
            b'c' => ElementValue::Class(self.utf8(input.u16()?, at)?.to_owned()),
            b'e' => {
                let type_descriptor = self.utf8(input.u16()?, at)?.to_owned();
                let at = input.offset();
                let name = self.utf8(input.u16()?, at)?.to_owned();
                ElementValue::Enum {
                    type_descriptor,
                    name,
                }
            }
            b'@' => ElementValue::Annotation(self.read_annotation(input, depth + 1)?),
            b'[' => {
                let count = input.u16()?;
                let mut values = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    values.push(self.read_element_value(input, depth + 1)?);
                }
                ElementValue::Array(values)
            }
            other => {
                return Err(Error::Malformed {
                    offset: tag_at,
                    kind: MalformedKind::BadElementValue(other),
                })
            }
        };
        Ok(value)
    }

    /// `Integer` constant behind a `B`, `C`, `S`, `Z`, or `I` element value
    fn annotation_integer(&self, index: u16, at: usize) -> Result<i32, Error> {
        match self.constant(index, at)? {
            Constant::Integer(integer) => Ok(*integer),
            _ => Err(wrong_kind(index, at, "Integer")),
        }
    }
}

fn wrong_kind(index: u16, at: usize, expected: &'static str) -> Error {
    Error::Malformed {
        offset: at,
        kind: MalformedKind::WrongConstantKind { index, expected },
    }
}
