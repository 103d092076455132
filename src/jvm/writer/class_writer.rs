use super::{FieldWriter, MethodWriter, WriterSettings};
use crate::jvm::annotations::AnnotationAttribute;
use crate::jvm::attributes::{
    write_attribute, Attribute, BootstrapMethods, EnclosingMethod, InnerClass, InnerClasses,
    NestHost, NestMembers, Signature, SourceFile,
};
use crate::jvm::descriptors::{MethodDescriptor, ParseDescriptor};
use crate::jvm::reader::{ClassReader, MAGIC};
use crate::jvm::visitor::{
    ClassHeader, ClassVisitor, FieldHeader, FieldVisitor, InnerClassEntry, MethodHeader,
    MethodVisitor, RawAttribute,
};
use crate::jvm::{
    ClassAccessFlags, ClassConstantIndex, ConstantPool, Error, Serialize, Utf8ConstantIndex,
    Version,
};
use crate::util::ByteVector;

/// Header of the class being written, with its constants already interned
#[derive(Debug)]
pub(super) struct WrittenHeader {
    pub version: Version,
    pub access: ClassAccessFlags,
    pub name: String,
    pub super_name: Option<String>,
    this_class: ClassConstantIndex,
    super_class: Option<ClassConstantIndex>,
    interfaces: Vec<ClassConstantIndex>,
}

/// Attributes of the class itself, collected until `visit_end`
#[derive(Debug, Default)]
struct ClassAttributes {
    signature: Option<Utf8ConstantIndex>,
    source_file: Option<Utf8ConstantIndex>,
    enclosing_method: Option<EnclosingMethod>,
    nest_host: Option<ClassConstantIndex>,
    nest_members: Vec<ClassConstantIndex>,
    inner_classes: Vec<InnerClass>,
    annotations: Vec<AnnotationAttribute>,
    raw: Vec<Attribute>,
}

/// Class visitor that serializes everything it is told into a class file
///
/// Fields and methods are serialized as soon as their own `visit_end` is called, so the
/// [`FieldWriter`] or [`MethodWriter`] handed out for a member must be ended before the next
/// member is visited. The class file is assembled on [`ClassVisitor::visit_end`] and can then be
/// retrieved (any number of times) with [`ClassWriter::to_bytes`].
pub struct ClassWriter {
    pub(super) settings: WriterSettings,
    pub(super) constants: ConstantPool,
    pub(super) header: Option<WrittenHeader>,
    pub(super) fields: Vec<Vec<u8>>,
    pub(super) methods: Vec<Vec<u8>>,
    attributes: ClassAttributes,

    /// Whether the pool started as a copy of the pool of the class being read
    copied_pool: bool,

    /// Complete class file, once `visit_end` has been called
    bytes: Option<Vec<u8>>,
}

impl ClassWriter {
    /// Writer with a fresh constant pool
    pub fn new(settings: WriterSettings) -> ClassWriter {
        ClassWriter::with_pool(ConstantPool::new(), false, settings)
    }

    /// Writer whose constant pool starts as a copy of the pool of the class being read
    ///
    /// Constants keep their indices, so raw attributes passed through from the reader stay
    /// valid. Constants that end up unused are still written out.
    pub fn copying_pool(reader: &ClassReader, settings: WriterSettings) -> ClassWriter {
        ClassWriter::with_pool(ConstantPool::copy_of(reader), true, settings)
    }

    fn with_pool(
        constants: ConstantPool,
        copied_pool: bool,
        settings: WriterSettings,
    ) -> ClassWriter {
        ClassWriter {
            settings,
            constants,
            header: None,
            fields: vec![],
            methods: vec![],
            attributes: ClassAttributes::default(),
            copied_pool,
            bytes: None,
        }
    }

    pub fn settings(&self) -> &WriterSettings {
        &self.settings
    }

    pub fn constant_pool(&self) -> &ConstantPool {
        &self.constants
    }

    /// Serialized class file
    ///
    /// Fails with [`Error::ClassNotFinished`] until `visit_end` has been called.
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        self.bytes.clone().ok_or(Error::ClassNotFinished)
    }

    pub(super) fn header(&self) -> Result<&WrittenHeader, Error> {
        self.header.as_ref().ok_or(Error::MissingHeader)
    }

    /// Warn about a raw attribute whose constant pool indices can't be trusted
    ///
    /// Raw attributes are copied byte for byte. Into a fresh pool, any index they hold points at
    /// whatever constant happens to land there.
    pub(super) fn check_raw_attribute(&self, attribute: &RawAttribute) {
        if !self.copied_pool && !attribute.info.is_empty() && attribute.name != "SourceDebugExtension"
        {
            log::warn!(
                "Copying attribute {} as is into a fresh constant pool",
                attribute.name
            );
        }
    }

    fn check_not_finished(&self) -> Result<(), Error> {
        if self.bytes.is_some() {
            Err(Error::CodeAlreadyFinished)
        } else {
            Ok(())
        }
    }

    /// Serialize the class attributes, returning their count and bytes
    fn write_class_attributes(&mut self) -> Result<(u16, ByteVector), Error> {
        let constants = &mut self.constants;
        let attributes = &self.attributes;
        let mut out = ByteVector::new();
        let mut count = 0;

        if let Some(signature) = attributes.signature {
            write_attribute(&mut out, constants, &Signature(signature))?;
            count += 1;
        }
        if let Some(source_file) = attributes.source_file {
            write_attribute(&mut out, constants, &SourceFile(source_file))?;
            count += 1;
        }
        if let Some(enclosing_method) = &attributes.enclosing_method {
            write_attribute(&mut out, constants, enclosing_method)?;
            count += 1;
        }
        if let Some(nest_host) = attributes.nest_host {
            write_attribute(&mut out, constants, &NestHost(nest_host))?;
            count += 1;
        }
        if !attributes.nest_members.is_empty() {
            let nest_members = NestMembers(attributes.nest_members.clone());
            write_attribute(&mut out, constants, &nest_members)?;
            count += 1;
        }
        if !attributes.inner_classes.is_empty() {
            let inner_classes = InnerClasses(attributes.inner_classes.clone());
            write_attribute(&mut out, constants, &inner_classes)?;
            count += 1;
        }
        for annotations in &attributes.annotations {
            annotations.write(&mut out, constants)?;
            count += 1;
        }
        for raw in &attributes.raw {
            raw.serialize(&mut out)?;
            count += 1;
        }

        // Last, since writing the other attributes can still add constants
        if !constants.bootstrap_methods().is_empty() {
            let bootstrap_methods = BootstrapMethods(constants.bootstrap_methods().to_vec());
            write_attribute(&mut out, constants, &bootstrap_methods)?;
            count += 1;
        }

        Ok((count, out))
    }
}

impl ClassVisitor for ClassWriter {
    fn visit_header(&mut self, header: &ClassHeader) -> Result<(), Error> {
        self.check_not_finished()?;
        let this_class = self.constants.get_class(&header.name)?;
        let super_class = match &header.super_name {
            Some(super_name) => Some(self.constants.get_class(super_name)?),
            None => None,
        };
        let interfaces = header
            .interfaces
            .iter()
            .map(|interface| self.constants.get_class(interface))
            .collect::<Result<Vec<_>, Error>>()?;
        if let Some(signature) = &header.signature {
            self.attributes.signature = Some(self.constants.get_utf8(signature)?);
        }

        log::trace!("Writing class {} ({})", header.name, header.version);
        self.header = Some(WrittenHeader {
            version: header.version,
            access: header.access,
            name: header.name.clone(),
            super_name: header.super_name.clone(),
            this_class,
            super_class,
            interfaces,
        });
        Ok(())
    }

    fn visit_source(&mut self, source_file: &str) -> Result<(), Error> {
        self.attributes.source_file = Some(self.constants.get_utf8(source_file)?);
        Ok(())
    }

    fn visit_outer_class(&mut self, owner: &str, method: Option<(&str, &str)>) -> Result<(), Error> {
        let class = self.constants.get_class(owner)?;
        let method = match method {
            Some((name, descriptor)) => Some(self.constants.get_name_and_type(name, descriptor)?),
            None => None,
        };
        self.attributes.enclosing_method = Some(EnclosingMethod { class, method });
        Ok(())
    }

    fn visit_nest_host(&mut self, host: &str) -> Result<(), Error> {
        self.attributes.nest_host = Some(self.constants.get_class(host)?);
        Ok(())
    }

    fn visit_nest_member(&mut self, member: &str) -> Result<(), Error> {
        let member = self.constants.get_class(member)?;
        self.attributes.nest_members.push(member);
        Ok(())
    }

    fn visit_inner_class(&mut self, inner_class: &InnerClassEntry) -> Result<(), Error> {
        let inner = InnerClass {
            inner_class: self.constants.get_class(&inner_class.name)?,
            outer_class: match &inner_class.outer_name {
                Some(outer_name) => Some(self.constants.get_class(outer_name)?),
                None => None,
            },
            inner_name: match &inner_class.inner_name {
                Some(inner_name) => Some(self.constants.get_utf8(inner_name)?),
                None => None,
            },
            access_flags: inner_class.access,
        };
        self.attributes.inner_classes.push(inner);
        Ok(())
    }

    fn visit_attribute(&mut self, attribute: &RawAttribute) -> Result<(), Error> {
        self.check_raw_attribute(attribute);
        let name_index = self.constants.get_utf8(&attribute.name)?;
        self.attributes.raw.push(Attribute {
            name_index,
            info: attribute.info.clone(),
        });
        Ok(())
    }

    fn visit_annotations(&mut self, attribute: &AnnotationAttribute) -> Result<(), Error> {
        self.attributes.annotations.push(attribute.clone());
        Ok(())
    }

    fn visit_field(
        &mut self,
        header: &FieldHeader,
    ) -> Result<Option<Box<dyn FieldVisitor + '_>>, Error> {
        self.check_not_finished()?;
        self.header()?;
        log::trace!("Writing field {} {}", header.name, header.descriptor);
        let field_writer = FieldWriter::new(self, header)?;
        Ok(Some(Box::new(field_writer)))
    }

    fn visit_method(
        &mut self,
        header: &MethodHeader,
    ) -> Result<Option<Box<dyn MethodVisitor + '_>>, Error> {
        self.check_not_finished()?;
        self.header()?;
        log::trace!("Writing method {}{}", header.name, header.descriptor);
        let descriptor = MethodDescriptor::parse(&header.descriptor)?;
        let method_writer = MethodWriter::new(self, header, descriptor)?;
        Ok(Some(Box::new(method_writer)))
    }

    fn visit_end(&mut self) -> Result<(), Error> {
        self.check_not_finished()?;
        let (attribute_count, attributes) = self.write_class_attributes()?;
        let header = self.header()?;

        let mut out = ByteVector::new();
        out.put_u32(MAGIC)
            .put_u16(header.version.minor_version)
            .put_u16(header.version.major_version);
        self.constants.serialize(&mut out)?;

        out.put_u16(header.access.bits());
        header.this_class.serialize(&mut out)?;
        out.put_u16(header.super_class.map_or(0, |index| (index.0).0));
        header.interfaces.serialize(&mut out)?;

        out.put_u16(self.fields.len() as u16);
        for field in &self.fields {
            out.put_bytes(field);
        }
        out.put_u16(self.methods.len() as u16);
        for method in &self.methods {
            out.put_bytes(method);
        }
        out.put_u16(attribute_count).put_bytes(attributes.as_slice());

        log::debug!(
            "Finished class {}: {} bytes, {} constants, {} fields, {} methods",
            header.name,
            out.len(),
            self.constants.len(),
            self.fields.len(),
            self.methods.len()
        );
        self.bytes = Some(out.into_vec());
        Ok(())
    }
}

/// Assemble a field or method: access flags, name, descriptor, then attributes
pub(super) fn write_member(
    access: u16,
    name: Utf8ConstantIndex,
    descriptor: Utf8ConstantIndex,
    attribute_count: u16,
    attributes: &ByteVector,
) -> Result<Vec<u8>, Error> {
    let mut out = ByteVector::with_capacity(8 + attributes.len());
    out.put_u16(access);
    name.serialize(&mut out)?;
    descriptor.serialize(&mut out)?;
    out.put_u16(attribute_count).put_bytes(attributes.as_slice());
    Ok(out.into_vec())
}
