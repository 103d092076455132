use super::class_writer::write_member;
use super::ClassWriter;
use crate::jvm::annotations::AnnotationAttribute;
use crate::jvm::attributes::{self, write_attribute, Attribute, Signature};
use crate::jvm::visitor::{FieldHeader, FieldVisitor, RawAttribute};
use crate::jvm::{Error, Serialize, Utf8ConstantIndex};
use crate::util::ByteVector;

/// Writes one field into its [`ClassWriter`] when the field is ended
pub struct FieldWriter<'a> {
    class: &'a mut ClassWriter,
    access: u16,
    name: Utf8ConstantIndex,
    descriptor: Utf8ConstantIndex,
    attribute_count: u16,
    attributes: ByteVector,
}

impl<'a> FieldWriter<'a> {
    pub(super) fn new(class: &'a mut ClassWriter, header: &FieldHeader) -> Result<FieldWriter<'a>, Error> {
        let constants = &mut class.constants;
        let name = constants.get_utf8(&header.name)?;
        let descriptor = constants.get_utf8(&header.descriptor)?;

        let mut attributes = ByteVector::new();
        let mut attribute_count = 0;
        if let Some(value) = &header.constant_value {
            let value = attributes::ConstantValue(constants.get_constant_value(value)?);
            write_attribute(&mut attributes, constants, &value)?;
            attribute_count += 1;
        }
        if let Some(signature) = &header.signature {
            let signature = Signature(constants.get_utf8(signature)?);
            write_attribute(&mut attributes, constants, &signature)?;
            attribute_count += 1;
        }

        Ok(FieldWriter {
            class,
            access: header.access.bits(),
            name,
            descriptor,
            attribute_count,
            attributes,
        })
    }
}

impl<'a> FieldVisitor for FieldWriter<'a> {
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

    fn visit_end(&mut self) -> Result<(), Error> {
        let field = write_member(
            self.access,
            self.name,
            self.descriptor,
            self.attribute_count,
            &self.attributes,
        )?;
        self.class.fields.push(field);
        Ok(())
    }
}
