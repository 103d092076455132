use super::{Input, ReaderFlags};
use crate::jvm::annotations::is_annotation_attribute;
use crate::jvm::visitor::{
    ClassHeader, ClassVisitor, FieldHeader, InnerClassEntry, MethodHeader, RawAttribute,
};
use crate::jvm::{
    decode_modified_utf8, BootstrapMethod, ClassAccessFlags, ClassConstantIndex, Constant,
    ConstantDynamic, ConstantIndex, ConstantPool, ConstantValue, Error, FieldAccessFlags, Handle,
    HandleKind, InnerClassAccessFlags, MalformedKind, MethodAccessFlags,
    NameAndTypeConstantIndex, Utf8ConstantIndex, Version,
};

/// First four bytes of every class file
pub const MAGIC: u32 = 0xCAFE_BABE;

/// How deep dynamic constants can nest inside each other's bootstrap arguments
const MAX_DYNAMIC_NESTING: usize = 64;

/// Parser for a class file
///
/// Construction validates the overall layout of the class and decodes the constant pool, so
/// that [`ClassReader::accept`] only has to resolve indices. `accept` can be called any number
/// of times and always produces the same calls.
///
/// Access flags of classes, fields, methods, and inner classes are reported as the typed flags,
/// so bits that the class file format does not assign are dropped (the JVM ignores them too).
#[derive(Debug, Clone)]
pub struct ClassReader<'a> {
    bytes: &'a [u8],
    version: Version,
    pub(super) constants: ConstantPool,

    /// Offset of `access_flags`, right after the constant pool
    header_offset: usize,
    class_name: String,
    super_name: Option<String>,
}

/// Attribute found in a class file, not decoded yet
pub(super) struct AttributeSlice<'r> {
    pub name: &'r str,

    /// Offset of `info` in the class file
    pub offset: usize,
    pub info: &'r [u8],
}

/// Field or method, with its attributes not decoded yet
struct MemberSlice<'r> {
    access: u16,
    name: &'r str,
    descriptor: &'r str,
    attributes: Vec<AttributeSlice<'r>>,
}

/// Outline of everything after the constant pool
struct ClassLayout<'r> {
    access: u16,
    name: &'r str,
    super_name: Option<&'r str>,
    interfaces: Vec<&'r str>,
    fields: Vec<MemberSlice<'r>>,
    methods: Vec<MemberSlice<'r>>,
    attributes: Vec<AttributeSlice<'r>>,
}

impl<'r> AttributeSlice<'r> {
    fn find<'s>(attributes: &'s [AttributeSlice<'r>], name: &str) -> Option<&'s AttributeSlice<'r>> {
        attributes.iter().find(|attribute| attribute.name == name)
    }

    pub(super) fn to_raw(&self) -> RawAttribute {
        RawAttribute {
            name: self.name.to_owned(),
            info: self.info.to_vec(),
        }
    }
}

impl<'a> ClassReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Result<ClassReader<'a>, Error> {
        let mut input = Input::new(bytes);

        let magic = input.u32()?;
        if magic != MAGIC {
            return Err(Error::Malformed {
                offset: 0,
                kind: MalformedKind::BadMagic(magic),
            });
        }
        let minor_version = input.u16()?;
        let major_version = input.u16()?;
        let version = Version::new(major_version, minor_version);
        if !version.is_supported() {
            return Err(Error::Malformed {
                offset: 4,
                kind: MalformedKind::UnsupportedVersion(version),
            });
        }

        let constants = read_constant_pool(&mut input)?;
        let mut reader = ClassReader {
            bytes,
            version,
            constants,
            header_offset: input.offset(),
            class_name: String::new(),
            super_name: None,
        };

        let (class_name, super_name, bootstrap_methods) = {
            let layout = reader.layout()?;
            let bootstrap_methods = match AttributeSlice::find(&layout.attributes, "BootstrapMethods")
            {
                Some(attribute) => reader.parse_attribute(attribute, read_bootstrap_methods)?,
                None => vec![],
            };
            (
                layout.name.to_owned(),
                layout.super_name.map(String::from),
                bootstrap_methods,
            )
        };
        reader.class_name = class_name;
        reader.super_name = super_name;
        for bootstrap_method in bootstrap_methods {
            reader
                .constants
                .push_decoded_bootstrap_method(bootstrap_method);
        }
        reader.check_constant_references()?;

        log::trace!(
            "Read class {} ({}, {} constants)",
            reader.class_name,
            reader.version,
            reader.constants.len()
        );
        Ok(reader)
    }

    pub fn version(&self) -> Version {
        self.version
    }

    /// Internal name of the class
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// Internal name of the superclass
    pub fn super_name(&self) -> Option<&str> {
        self.super_name.as_deref()
    }

    pub fn constant_pool(&self) -> &ConstantPool {
        &self.constants
    }

    /// Raw code array of a method, if the method exists and has code
    pub fn method_code(&self, name: &str, descriptor: &str) -> Result<Option<&'a [u8]>, Error> {
        let layout = self.layout()?;
        let method = layout
            .methods
            .iter()
            .find(|method| method.name == name && method.descriptor == descriptor);
        let code = match method.and_then(|method| AttributeSlice::find(&method.attributes, "Code"))
        {
            Some(code) => code,
            None => return Ok(None),
        };

        let mut input = Input::at(code.info, code.offset);
        input.skip(4)?;
        let code_length = input.u32()? as usize;
        let start = input.offset();
        input.skip(code_length)?;
        Ok(Some(&self.bytes[start..start + code_length]))
    }

    /// Walk the class, calling the visitor for every part of it
    pub fn accept(&self, visitor: &mut dyn ClassVisitor, flags: ReaderFlags) -> Result<(), Error> {
        let layout = self.layout()?;

        let signature = match AttributeSlice::find(&layout.attributes, "Signature") {
            Some(attribute) => Some(self.parse_attribute(attribute, |input| {
                let at = input.offset();
                self.utf8(input.u16()?, at).map(String::from)
            })?),
            None => None,
        };
        visitor.visit_header(&ClassHeader {
            version: self.version,
            access: ClassAccessFlags::from_bits_truncate(layout.access),
            name: layout.name.to_owned(),
            super_name: layout.super_name.map(String::from),
            interfaces: layout.interfaces.iter().map(|name| String::from(*name)).collect(),
            signature,
        })?;

        if !flags.contains(ReaderFlags::SKIP_DEBUG) {
            if let Some(attribute) = AttributeSlice::find(&layout.attributes, "SourceFile") {
                let source = self.parse_attribute(attribute, |input| {
                    let at = input.offset();
                    self.utf8(input.u16()?, at)
                })?;
                visitor.visit_source(source)?;
            }
        }

        if let Some(attribute) = AttributeSlice::find(&layout.attributes, "EnclosingMethod") {
            let (owner, method) = self.parse_attribute(attribute, |input| {
                let at = input.offset();
                let owner = self.class(input.u16()?, at)?;
                let at = input.offset();
                let method = match input.u16()? {
                    0 => None,
                    index => Some(self.name_and_type(index, at)?),
                };
                Ok((owner, method))
            })?;
            visitor.visit_outer_class(owner, method)?;
        }

        if let Some(attribute) = AttributeSlice::find(&layout.attributes, "NestHost") {
            let host = self.parse_attribute(attribute, |input| {
                let at = input.offset();
                self.class(input.u16()?, at)
            })?;
            visitor.visit_nest_host(host)?;
        }

        if let Some(attribute) = AttributeSlice::find(&layout.attributes, "NestMembers") {
            let members = self.parse_attribute(attribute, |input| {
                let count = input.u16()?;
                let mut members = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    let at = input.offset();
                    members.push(self.class(input.u16()?, at)?);
                }
                Ok(members)
            })?;
            for member in members {
                visitor.visit_nest_member(member)?;
            }
        }

        if let Some(attribute) = AttributeSlice::find(&layout.attributes, "InnerClasses") {
            let inner_classes = self.parse_attribute(attribute, |input| {
                let count = input.u16()?;
                let mut inner_classes = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    let at = input.offset();
                    let name = self.class(input.u16()?, at)?.to_owned();
                    let at = input.offset();
                    let outer_name = self.optional_class(input.u16()?, at)?.map(String::from);
                    let at = input.offset();
                    let inner_name = match input.u16()? {
                        0 => None,
                        index => Some(self.utf8(index, at)?.to_owned()),
                    };
                    let access = InnerClassAccessFlags::from_bits_truncate(input.u16()?);
                    inner_classes.push(InnerClassEntry {
                        name,
                        outer_name,
                        inner_name,
                        access,
                    });
                }
                Ok(inner_classes)
            })?;
            for inner_class in &inner_classes {
                visitor.visit_inner_class(inner_class)?;
            }
        }

        for attribute in &layout.attributes {
            match attribute.name {
                "Signature" | "SourceFile" | "EnclosingMethod" | "NestHost" | "NestMembers"
                | "InnerClasses" | "BootstrapMethods" => (),
                "SourceDebugExtension" if flags.contains(ReaderFlags::SKIP_DEBUG) => (),
                name if is_annotation_attribute(name) => {
                    visitor.visit_annotations(&self.read_annotation_attribute(attribute)?)?
                }
                _ => visitor.visit_attribute(&attribute.to_raw())?,
            }
        }

        for field in &layout.fields {
            self.read_field(field, visitor)?;
        }
        for method in &layout.methods {
            self.read_method(method, visitor, flags)?;
        }

        visitor.visit_end()
    }

    fn read_field(&self, field: &MemberSlice, visitor: &mut dyn ClassVisitor) -> Result<(), Error> {
        let mut header = FieldHeader {
            access: FieldAccessFlags::from_bits_truncate(field.access),
            name: field.name.to_owned(),
            descriptor: field.descriptor.to_owned(),
            signature: None,
            constant_value: None,
        };
        for attribute in &field.attributes {
            match attribute.name {
                "Signature" => header.signature = Some(self.read_signature(attribute)?),
                "ConstantValue" => {
                    header.constant_value = Some(self.parse_attribute(attribute, |input| {
                        let at = input.offset();
                        self.constant_value(input.u16()?, at, 0)
                    })?)
                }
                _ => (),
            }
        }

        log::trace!("Visiting field {} {}", header.name, header.descriptor);
        if let Some(mut field_visitor) = visitor.visit_field(&header)? {
            for attribute in &field.attributes {
                match attribute.name {
                    "Signature" | "ConstantValue" => (),
                    name if is_annotation_attribute(name) => field_visitor
                        .visit_annotations(&self.read_annotation_attribute(attribute)?)?,
                    _ => field_visitor.visit_attribute(&attribute.to_raw())?,
                }
            }
            field_visitor.visit_end()?;
        }
        Ok(())
    }

    fn read_method(
        &self,
        method: &MemberSlice,
        visitor: &mut dyn ClassVisitor,
        flags: ReaderFlags,
    ) -> Result<(), Error> {
        let mut header = MethodHeader {
            access: MethodAccessFlags::from_bits_truncate(method.access),
            name: method.name.to_owned(),
            descriptor: method.descriptor.to_owned(),
            signature: None,
            exceptions: vec![],
        };
        for attribute in &method.attributes {
            match attribute.name {
                "Signature" => header.signature = Some(self.read_signature(attribute)?),
                "Exceptions" => {
                    header.exceptions = self.parse_attribute(attribute, |input| {
                        let count = input.u16()?;
                        let mut exceptions = Vec::with_capacity(count as usize);
                        for _ in 0..count {
                            let at = input.offset();
                            exceptions.push(self.class(input.u16()?, at)?.to_owned());
                        }
                        Ok(exceptions)
                    })?
                }
                _ => (),
            }
        }

        log::trace!("Visiting method {}{}", header.name, header.descriptor);
        if let Some(mut method_visitor) = visitor.visit_method(&header)? {
            for attribute in &method.attributes {
                match attribute.name {
                    "Signature" | "Exceptions" | "Code" => (),
                    name if is_annotation_attribute(name) => method_visitor
                        .visit_annotations(&self.read_annotation_attribute(attribute)?)?,
                    _ => method_visitor.visit_attribute(&attribute.to_raw())?,
                }
            }
            if !flags.contains(ReaderFlags::SKIP_CODE) {
                if let Some(code) = AttributeSlice::find(&method.attributes, "Code") {
                    self.read_code(code, &header, &mut *method_visitor, flags)?;
                }
            }
            method_visitor.visit_end()?;
        }
        Ok(())
    }

    fn read_signature(&self, attribute: &AttributeSlice) -> Result<String, Error> {
        self.parse_attribute(attribute, |input| {
            let at = input.offset();
            self.utf8(input.u16()?, at).map(String::from)
        })
    }

    /// Outline everything after the constant pool, checking that lengths add up
    fn layout(&self) -> Result<ClassLayout<'_>, Error> {
        let mut input = Input::at(&self.bytes[self.header_offset..], self.header_offset);

        let access = input.u16()?;
        let at = input.offset();
        let name = self.class(input.u16()?, at)?;
        let at = input.offset();
        let super_name = self.optional_class(input.u16()?, at)?;

        let interface_count = input.u16()?;
        let mut interfaces = Vec::with_capacity(interface_count as usize);
        for _ in 0..interface_count {
            let at = input.offset();
            interfaces.push(self.class(input.u16()?, at)?);
        }

        let fields = self.read_members(&mut input)?;
        let methods = self.read_members(&mut input)?;
        let attributes = self.read_attributes(&mut input)?;

        if input.remaining() != 0 {
            return Err(input.malformed(MalformedKind::TrailingBytes));
        }

        Ok(ClassLayout {
            access,
            name,
            super_name,
            interfaces,
            fields,
            methods,
            attributes,
        })
    }

    fn read_members<'r>(&'r self, input: &mut Input<'r>) -> Result<Vec<MemberSlice<'r>>, Error> {
        let count = input.u16()?;
        let mut members = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let access = input.u16()?;
            let at = input.offset();
            let name = self.utf8(input.u16()?, at)?;
            let at = input.offset();
            let descriptor = self.utf8(input.u16()?, at)?;
            let attributes = self.read_attributes(input)?;
            members.push(MemberSlice {
                access,
                name,
                descriptor,
                attributes,
            });
        }
        Ok(members)
    }

    pub(super) fn read_attributes<'r>(
        &'r self,
        input: &mut Input<'r>,
    ) -> Result<Vec<AttributeSlice<'r>>, Error> {
        let count = input.u16()?;
        let mut attributes = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let at = input.offset();
            let name = self.utf8(input.u16()?, at)?;
            let length = input.u32()? as usize;
            let offset = input.offset();
            let info = input.bytes(length)?;
            attributes.push(AttributeSlice { name, offset, info });
        }
        Ok(attributes)
    }

    /// Decode an attribute's contents, which must use up exactly the declared length
    pub(super) fn parse_attribute<'r, T>(
        &self,
        attribute: &AttributeSlice<'r>,
        parse: impl FnOnce(&mut Input<'r>) -> Result<T, Error>,
    ) -> Result<T, Error> {
        let mut input = Input::at(attribute.info, attribute.offset);
        let length_mismatch = |actual: usize| Error::Malformed {
            offset: attribute.offset,
            kind: MalformedKind::LengthMismatch {
                attribute: attribute.name.to_owned(),
                declared: attribute.info.len() as u32,
                actual,
            },
        };

        // Running out of bytes means the contents need more than was declared
        let parsed = match parse(&mut input) {
            Err(Error::Malformed {
                kind: MalformedKind::UnexpectedEof,
                ..
            }) => return Err(length_mismatch(attribute.info.len() + 1)),
            other => other?,
        };
        if input.remaining() != 0 {
            return Err(length_mismatch(input.position()));
        }
        Ok(parsed)
    }

    // Constant pool lookups (`at` is where the index was read, for errors)

    pub(super) fn constant(&self, index: u16, at: usize) -> Result<&Constant, Error> {
        self.constants
            .get(ConstantIndex(index))
            .ok_or(Error::Malformed {
                offset: at,
                kind: MalformedKind::BadConstantIndex(index),
            })
    }

    fn wrong_kind(index: u16, at: usize, expected: &'static str) -> Error {
        Error::Malformed {
            offset: at,
            kind: MalformedKind::WrongConstantKind { index, expected },
        }
    }

    pub(super) fn utf8(&self, index: u16, at: usize) -> Result<&str, Error> {
        match self.constant(index, at)? {
            Constant::Utf8(string) => Ok(string),
            _ => Err(Self::wrong_kind(index, at, "Utf8")),
        }
    }

    /// Internal name (or array descriptor) of a class constant
    pub(super) fn class(&self, index: u16, at: usize) -> Result<&str, Error> {
        match self.constant(index, at)? {
            Constant::Class(Utf8ConstantIndex(name)) => self.utf8(name.0, at),
            _ => Err(Self::wrong_kind(index, at, "Class")),
        }
    }

    /// Like `class`, but index 0 means no class
    pub(super) fn optional_class(&self, index: u16, at: usize) -> Result<Option<&str>, Error> {
        match index {
            0 => Ok(None),
            index => self.class(index, at).map(Some),
        }
    }

    pub(super) fn name_and_type(&self, index: u16, at: usize) -> Result<(&str, &str), Error> {
        match self.constant(index, at)? {
            Constant::NameAndType { name, descriptor } => {
                Ok((self.utf8((name.0).0, at)?, self.utf8((descriptor.0).0, at)?))
            }
            _ => Err(Self::wrong_kind(index, at, "NameAndType")),
        }
    }

    /// Owner, name, descriptor, and whether the owner is an interface
    pub(super) fn member_ref(
        &self,
        index: u16,
        at: usize,
    ) -> Result<(&str, &str, &str, bool), Error> {
        let (class, name_and_type, is_interface) = match self.constant(index, at)? {
            Constant::FieldRef(class, name_and_type) => (class, name_and_type, false),
            Constant::MethodRef {
                class,
                name_and_type,
                is_interface,
            } => (class, name_and_type, *is_interface),
            _ => return Err(Self::wrong_kind(index, at, "Fieldref or Methodref")),
        };
        let owner = self.class((class.0).0, at)?;
        let (name, descriptor) = self.name_and_type((name_and_type.0).0, at)?;
        Ok((owner, name, descriptor, is_interface))
    }

    pub(super) fn handle(&self, index: u16, at: usize) -> Result<Handle, Error> {
        match self.constant(index, at)? {
            Constant::MethodHandle {
                handle_kind,
                member,
            } => {
                let (owner, name, descriptor, is_interface) = self.member_ref(member.0, at)?;
                Ok(Handle {
                    kind: *handle_kind,
                    owner: owner.to_owned(),
                    name: name.to_owned(),
                    descriptor: descriptor.to_owned(),
                    is_interface,
                })
            }
            _ => Err(Self::wrong_kind(index, at, "MethodHandle")),
        }
    }

    /// Loadable constant
    pub(super) fn constant_value(
        &self,
        index: u16,
        at: usize,
        depth: usize,
    ) -> Result<ConstantValue, Error> {
        let value = match self.constant(index, at)? {
            Constant::Integer(integer) => ConstantValue::Integer(*integer),
            Constant::Float(bits) => ConstantValue::Float(f32::from_bits(*bits)),
            Constant::Long(long) => ConstantValue::Long(*long),
            Constant::Double(bits) => ConstantValue::Double(f64::from_bits(*bits)),
            Constant::String(utf8) => ConstantValue::String(self.utf8((utf8.0).0, at)?.to_owned()),
            Constant::Class(_) => ConstantValue::Class(self.class(index, at)?.to_owned()),
            Constant::MethodType { descriptor } => {
                ConstantValue::MethodType(self.utf8((descriptor.0).0, at)?.to_owned())
            }
            Constant::MethodHandle { .. } => ConstantValue::MethodHandle(self.handle(index, at)?),
            Constant::Dynamic {
                bootstrap_method,
                name_and_type,
            } => {
                if depth >= MAX_DYNAMIC_NESTING {
                    return Err(Error::Malformed {
                        offset: at,
                        kind: MalformedKind::ConstantCycle(index),
                    });
                }
                let (name, descriptor) = self.name_and_type((name_and_type.0).0, at)?;
                let (bootstrap_method, bootstrap_arguments) =
                    self.bootstrap_method(*bootstrap_method, at, depth + 1)?;
                ConstantValue::Dynamic(ConstantDynamic {
                    name: name.to_owned(),
                    descriptor: descriptor.to_owned(),
                    bootstrap_method,
                    bootstrap_arguments,
                })
            }
            _ => return Err(Self::wrong_kind(index, at, "loadable constant")),
        };
        Ok(value)
    }

    /// Handle and arguments of an entry in the bootstrap methods table
    pub(super) fn bootstrap_method(
        &self,
        index: u16,
        at: usize,
        depth: usize,
    ) -> Result<(Handle, Vec<ConstantValue>), Error> {
        let bootstrap_method = self
            .constants
            .bootstrap_methods()
            .get(index as usize)
            .ok_or(Error::Malformed {
                offset: at,
                kind: MalformedKind::BadConstantIndex(index),
            })?;
        let handle = self.handle(bootstrap_method.method.0, at)?;
        let arguments = bootstrap_method
            .arguments
            .iter()
            .map(|argument| self.constant_value(argument.0, at, depth))
            .collect::<Result<Vec<_>, Error>>()?;
        Ok((handle, arguments))
    }

    /// Check that every index inside the constant pool points at the right kind of constant
    fn check_constant_references(&self) -> Result<(), Error> {
        let at = 10;
        let bootstrap_count = self.constants.bootstrap_methods().len();
        for (_, constant) in self.constants.iter() {
            match constant {
                Constant::Class(name)
                | Constant::String(name)
                | Constant::MethodType { descriptor: name }
                | Constant::Module(name)
                | Constant::Package(name) => {
                    self.utf8((name.0).0, at)?;
                }
                Constant::FieldRef(class, name_and_type)
                | Constant::MethodRef {
                    class,
                    name_and_type,
                    ..
                } => {
                    self.class((class.0).0, at)?;
                    self.name_and_type((name_and_type.0).0, at)?;
                }
                Constant::NameAndType { name, descriptor } => {
                    self.utf8((name.0).0, at)?;
                    self.utf8((descriptor.0).0, at)?;
                }
                Constant::MethodHandle {
                    handle_kind,
                    member,
                } => match (handle_kind.is_field(), self.constant(member.0, at)?) {
                    (true, Constant::FieldRef(..)) | (false, Constant::MethodRef { .. }) => (),
                    _ => return Err(Self::wrong_kind(member.0, at, "handle member")),
                },
                Constant::Dynamic {
                    bootstrap_method,
                    name_and_type,
                }
                | Constant::InvokeDynamic {
                    bootstrap_method,
                    name_and_type,
                } => {
                    self.name_and_type((name_and_type.0).0, at)?;
                    if *bootstrap_method as usize >= bootstrap_count {
                        return Err(Error::Malformed {
                            offset: at,
                            kind: MalformedKind::BadConstantIndex(*bootstrap_method),
                        });
                    }
                }
                Constant::Utf8(_)
                | Constant::Integer(_)
                | Constant::Float(_)
                | Constant::Long(_)
                | Constant::Double(_) => (),
            }
        }
        for bootstrap_method in self.constants.bootstrap_methods() {
            self.handle(bootstrap_method.method.0, at)?;
            for argument in &bootstrap_method.arguments {
                self.constant(argument.0, at)?;
            }
        }
        Ok(())
    }
}

/// Decode the constant pool, which starts at the cursor
fn read_constant_pool(input: &mut Input) -> Result<ConstantPool, Error> {
    let count = input.u16()?;
    let mut constants = ConstantPool::new();

    while constants.offset_len() < count {
        let at = input.offset();
        let tag = input.u8()?;
        let constant = match tag {
            Constant::UTF8_TAG => {
                let length = input.u16()? as usize;
                let bytes = input.bytes(length)?;
                let string = decode_modified_utf8(bytes).ok_or(Error::Malformed {
                    offset: at,
                    kind: MalformedKind::BadModifiedUtf8,
                })?;
                Constant::Utf8(string)
            }
            Constant::INTEGER_TAG => Constant::Integer(input.i32()?),
            Constant::FLOAT_TAG => Constant::Float(input.u32()?),
            Constant::LONG_TAG => Constant::Long(input.i64()?),
            Constant::DOUBLE_TAG => Constant::Double(input.u64()?),
            Constant::CLASS_TAG => Constant::Class(utf8_index(input.u16()?)),
            Constant::STRING_TAG => Constant::String(utf8_index(input.u16()?)),
            Constant::FIELD_REF_TAG => {
                let class = ClassConstantIndex(ConstantIndex(input.u16()?));
                let name_and_type = NameAndTypeConstantIndex(ConstantIndex(input.u16()?));
                Constant::FieldRef(class, name_and_type)
            }
            Constant::METHOD_REF_TAG | Constant::INTERFACE_METHOD_REF_TAG => Constant::MethodRef {
                class: ClassConstantIndex(ConstantIndex(input.u16()?)),
                name_and_type: NameAndTypeConstantIndex(ConstantIndex(input.u16()?)),
                is_interface: tag == Constant::INTERFACE_METHOD_REF_TAG,
            },
            Constant::NAME_AND_TYPE_TAG => Constant::NameAndType {
                name: utf8_index(input.u16()?),
                descriptor: utf8_index(input.u16()?),
            },
            Constant::METHOD_HANDLE_TAG => {
                let reference_kind = input.u8()?;
                let handle_kind =
                    HandleKind::from_reference_kind(reference_kind).ok_or(Error::Malformed {
                        offset: at + 1,
                        kind: MalformedKind::WrongConstantKind {
                            index: constants.offset_len(),
                            expected: "method handle reference kind",
                        },
                    })?;
                Constant::MethodHandle {
                    handle_kind,
                    member: ConstantIndex(input.u16()?),
                }
            }
            Constant::METHOD_TYPE_TAG => Constant::MethodType {
                descriptor: utf8_index(input.u16()?),
            },
            Constant::DYNAMIC_TAG => Constant::Dynamic {
                bootstrap_method: input.u16()?,
                name_and_type: NameAndTypeConstantIndex(ConstantIndex(input.u16()?)),
            },
            Constant::INVOKE_DYNAMIC_TAG => Constant::InvokeDynamic {
                bootstrap_method: input.u16()?,
                name_and_type: NameAndTypeConstantIndex(ConstantIndex(input.u16()?)),
            },
            Constant::MODULE_TAG => Constant::Module(utf8_index(input.u16()?)),
            Constant::PACKAGE_TAG => Constant::Package(utf8_index(input.u16()?)),
            other => {
                return Err(Error::Malformed {
                    offset: at,
                    kind: MalformedKind::BadConstantTag(other),
                })
            }
        };
        // Only a `long` or `double` in the last slot can run past the largest index
        constants.push_decoded(constant).map_err(|_| Error::Malformed {
            offset: at,
            kind: MalformedKind::BadConstantIndex(count),
        })?;
    }

    // A `long` or `double` in the last slot overshoots the count
    if constants.offset_len() != count {
        return Err(input.malformed(MalformedKind::BadConstantIndex(count)));
    }
    Ok(constants)
}

fn utf8_index(index: u16) -> Utf8ConstantIndex {
    Utf8ConstantIndex(ConstantIndex(index))
}

fn read_bootstrap_methods(input: &mut Input) -> Result<Vec<BootstrapMethod>, Error> {
    let count = input.u16()?;
    let mut bootstrap_methods = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let method = ConstantIndex(input.u16()?);
        let argument_count = input.u16()?;
        let mut arguments = Vec::with_capacity(argument_count as usize);
        for _ in 0..argument_count {
            arguments.push(ConstantIndex(input.u16()?));
        }
        bootstrap_methods.push(BootstrapMethod { method, arguments });
    }
    Ok(bootstrap_methods)
}

#[cfg(test)]
mod test {
    use super::*;

    fn header(constants: &[&[u8]], count: u16) -> Vec<u8> {
        let mut bytes = vec![0xCA, 0xFE, 0xBA, 0xBE, 0, 0, 0, 52];
        bytes.extend_from_slice(&count.to_be_bytes());
        for constant in constants {
            bytes.extend_from_slice(constant);
        }
        bytes
    }

    #[test]
    fn bad_magic() {
        match ClassReader::new(&[0xCA, 0xFE, 0xBA, 0xBF, 0, 0, 0, 52]) {
            Err(Error::Malformed {
                offset: 0,
                kind: MalformedKind::BadMagic(0xCAFEBABF),
            }) => (),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn unsupported_version() {
        let mut bytes = header(&[], 1);
        bytes[7] = 99;
        match ClassReader::new(&bytes) {
            Err(Error::Malformed {
                offset: 4,
                kind: MalformedKind::UnsupportedVersion(_),
            }) => (),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn long_in_last_slot() {
        let bytes = header(&[&[5, 0, 0, 0, 0, 0, 0, 0, 1]], 2);
        match ClassReader::new(&bytes) {
            Err(Error::Malformed {
                kind: MalformedKind::BadConstantIndex(2),
                ..
            }) => (),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn class_pointing_at_integer() {
        let mut bytes = header(&[&[3, 0, 0, 0, 7], &[7, 0, 1]], 3);
        // access, this class, super class, interfaces, fields, methods, attributes
        bytes.extend_from_slice(&[0, 0x21, 0, 2, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
        match ClassReader::new(&bytes) {
            Err(Error::Malformed {
                kind:
                    MalformedKind::WrongConstantKind {
                        index: 1,
                        expected: "Utf8",
                    },
                ..
            }) => (),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn bad_constant_tag() {
        let bytes = header(&[&[2, 0, 0]], 2);
        match ClassReader::new(&bytes) {
            Err(Error::Malformed {
                offset: 10,
                kind: MalformedKind::BadConstantTag(2),
            }) => (),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn pool_overflow_is_malformed() {
        // Empty strings up to #65533, then a `long` that would need #65534 and #65535
        let empty_utf8: &[u8] = &[1, 0, 0];
        let mut constants = vec![empty_utf8; 65533];
        constants.push(&[5, 0, 0, 0, 0, 0, 0, 0, 0]);
        let bytes = header(&constants, 65535);
        match ClassReader::new(&bytes) {
            Err(Error::Malformed {
                kind: MalformedKind::BadConstantIndex(65535),
                ..
            }) => (),
            other => panic!("unexpected {:?}", other.err()),
        }
    }

    #[test]
    fn unassigned_access_bits_are_dropped() {
        struct Access(Option<ClassAccessFlags>);
        impl ClassVisitor for Access {
            fn visit_header(&mut self, header: &ClassHeader) -> Result<(), Error> {
                self.0 = Some(header.access);
                Ok(())
            }
        }

        let name: &[u8] = &[1, 0, 1, b'A'];
        let object: &[u8] = &[1, 0, 16];
        let mut object = object.to_vec();
        object.extend_from_slice(b"java/lang/Object");
        let mut bytes = header(&[name, &[7, 0, 1], object.as_slice(), &[7, 0, 3]], 5);
        // public, super, and 0x0100 (not assigned for classes)
        bytes.extend_from_slice(&[0x01, 0x21, 0, 2, 0, 4, 0, 0, 0, 0, 0, 0, 0, 0]);

        let mut access = Access(None);
        ClassReader::new(&bytes)
            .unwrap()
            .accept(&mut access, ReaderFlags::empty())
            .unwrap();
        assert_eq!(
            access.0,
            Some(ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER)
        );
    }
}
