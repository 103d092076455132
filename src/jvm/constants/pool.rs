use super::*;
use crate::jvm::reader::ClassReader;
use crate::jvm::{Error, Serialize};
use crate::util::{Offset, OffsetVec, Width};
use byteorder::WriteBytesExt;
use std::collections::HashMap;

/// Class file constants pool
///
/// The pool is append only. Interning is structural: asking for a constant that is equal to one
/// already in the pool returns the existing index without growing the pool. Composite constants
/// (eg. a method reference) intern their components first.
///
/// The pool also owns the class's bootstrap method table, since `CONSTANT_Dynamic_info` and
/// `CONSTANT_InvokeDynamic_info` refer into it by index.
#[derive(Clone, Debug)]
pub struct ConstantPool {
    constants: OffsetVec<Constant>,
    lookup: HashMap<Constant, ConstantIndex>,
    bootstrap_methods: Vec<BootstrapMethod>,
    bootstrap_lookup: HashMap<BootstrapMethod, u16>,
}

/// Entry in the `BootstrapMethods` attribute
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct BootstrapMethod {
    /// Index of a `CONSTANT_MethodHandle_info`
    pub method: ConstantIndex,
    pub arguments: Vec<ConstantIndex>,
}

impl Serialize for BootstrapMethod {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.method.serialize(writer)?;
        (self.arguments.len() as u16).serialize(writer)?;
        for argument in &self.arguments {
            argument.serialize(writer)?;
        }
        Ok(())
    }
}

impl Default for ConstantPool {
    fn default() -> ConstantPool {
        ConstantPool::new()
    }
}

impl ConstantPool {
    /// Make a fresh empty constants pool
    pub fn new() -> ConstantPool {
        ConstantPool {
            constants: OffsetVec::new_starting_at(Offset(1)),
            lookup: HashMap::new(),
            bootstrap_methods: vec![],
            bootstrap_lookup: HashMap::new(),
        }
    }

    /// Pool seeded with every constant (at the same index) and every bootstrap method of a class
    /// that was read
    ///
    /// Writing through a copied pool keeps the indices inside raw pass-through attributes valid.
    pub fn copy_of(reader: &ClassReader) -> ConstantPool {
        reader.constant_pool().clone()
    }

    /// Number of distinct entries (a `long` or `double` counts once)
    pub fn len(&self) -> usize {
        self.constants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constants.is_empty()
    }

    /// Value of `constant_pool_count` in the class file (one more than the largest index)
    pub fn offset_len(&self) -> u16 {
        self.constants.offset_len().0 as u16
    }

    pub fn get(&self, index: ConstantIndex) -> Option<&Constant> {
        self.constants.get_offset(Offset(index.0 as usize))
    }

    pub fn iter(&self) -> impl Iterator<Item = (ConstantIndex, &Constant)> + '_ {
        self.constants
            .iter()
            .map(|(offset, constant)| (ConstantIndex(offset.0 as u16), constant))
    }

    pub fn bootstrap_methods(&self) -> &[BootstrapMethod] {
        &self.bootstrap_methods
    }

    /// Push a constant into the constant pool, provided there is space for it
    ///
    /// Note: the largest valid index is 65535, indexing starts at 1, and some constants take two
    /// spaces.
    fn push_constant(&mut self, constant: Constant) -> Result<ConstantIndex, Error> {
        let offset = self.constants.offset_len().0;
        if offset + constant.width() > u16::MAX as usize {
            return Err(Error::ConstantPoolOverflow { constant, offset });
        }
        Ok(ConstantIndex(self.constants.push(constant).0 as u16))
    }

    /// Append a constant as decoded from a class file, even if an equal constant already exists
    ///
    /// Indices have to match the ones in the input, so there is no deduplication. The first
    /// occurrence of a constant is the one later lookups resolve to.
    pub(crate) fn push_decoded(&mut self, constant: Constant) -> Result<ConstantIndex, Error> {
        let index = self.push_constant(constant.clone())?;
        self.lookup.entry(constant).or_insert(index);
        Ok(index)
    }

    pub(crate) fn push_decoded_bootstrap_method(&mut self, bootstrap_method: BootstrapMethod) {
        let index = self.bootstrap_methods.len() as u16;
        self.bootstrap_lookup
            .entry(bootstrap_method.clone())
            .or_insert(index);
        self.bootstrap_methods.push(bootstrap_method);
    }

    /// Get or insert a constant
    pub fn intern(&mut self, constant: Constant) -> Result<ConstantIndex, Error> {
        if let Some(index) = self.lookup.get(&constant) {
            return Ok(*index);
        }
        let index = self.push_constant(constant.clone())?;
        self.lookup.insert(constant, index);
        Ok(index)
    }

    pub fn get_utf8(&mut self, utf8: &str) -> Result<Utf8ConstantIndex, Error> {
        self.intern(Constant::Utf8(utf8.to_owned()))
            .map(Utf8ConstantIndex)
    }

    pub fn get_integer(&mut self, integer: i32) -> Result<ConstantIndex, Error> {
        self.intern(Constant::Integer(integer))
    }

    pub fn get_float(&mut self, float: f32) -> Result<ConstantIndex, Error> {
        self.intern(Constant::Float(float.to_bits()))
    }

    pub fn get_long(&mut self, long: i64) -> Result<ConstantIndex, Error> {
        self.intern(Constant::Long(long))
    }

    pub fn get_double(&mut self, double: f64) -> Result<ConstantIndex, Error> {
        self.intern(Constant::Double(double.to_bits()))
    }

    /// Get or insert a class constant, by internal name (or descriptor, for array types)
    pub fn get_class(&mut self, name: &str) -> Result<ClassConstantIndex, Error> {
        let name = self.get_utf8(name)?;
        self.intern(Constant::Class(name)).map(ClassConstantIndex)
    }

    pub fn get_string(&mut self, string: &str) -> Result<StringConstantIndex, Error> {
        let utf8 = self.get_utf8(string)?;
        self.intern(Constant::String(utf8))
            .map(StringConstantIndex)
    }

    pub fn get_name_and_type(
        &mut self,
        name: &str,
        descriptor: &str,
    ) -> Result<NameAndTypeConstantIndex, Error> {
        let name = self.get_utf8(name)?;
        let descriptor = self.get_utf8(descriptor)?;
        self.intern(Constant::NameAndType { name, descriptor })
            .map(NameAndTypeConstantIndex)
    }

    pub fn get_field_ref(
        &mut self,
        owner: &str,
        name: &str,
        descriptor: &str,
    ) -> Result<FieldRefConstantIndex, Error> {
        let class = self.get_class(owner)?;
        let name_and_type = self.get_name_and_type(name, descriptor)?;
        self.intern(Constant::FieldRef(class, name_and_type))
            .map(FieldRefConstantIndex)
    }

    pub fn get_method_ref(
        &mut self,
        owner: &str,
        name: &str,
        descriptor: &str,
        is_interface: bool,
    ) -> Result<MethodRefConstantIndex, Error> {
        let class = self.get_class(owner)?;
        let name_and_type = self.get_name_and_type(name, descriptor)?;
        self.intern(Constant::MethodRef {
            class,
            name_and_type,
            is_interface,
        })
        .map(MethodRefConstantIndex)
    }

    pub fn get_method_type(&mut self, descriptor: &str) -> Result<ConstantIndex, Error> {
        let descriptor = self.get_utf8(descriptor)?;
        self.intern(Constant::MethodType { descriptor })
    }

    pub fn get_method_handle(&mut self, handle: &Handle) -> Result<ConstantIndex, Error> {
        let constant = self.method_handle_constant(handle)?;
        self.intern(constant)
    }

    /// `CONSTANT_MethodHandle_info` for a handle, with the member it refers to interned
    fn method_handle_constant(&mut self, handle: &Handle) -> Result<Constant, Error> {
        let member: ConstantIndex = if handle.kind.is_field() {
            self.get_field_ref(&handle.owner, &handle.name, &handle.descriptor)?
                .into()
        } else {
            self.get_method_ref(
                &handle.owner,
                &handle.name,
                &handle.descriptor,
                handle.is_interface,
            )?
            .into()
        };
        Ok(Constant::MethodHandle {
            handle_kind: handle.kind,
            member,
        })
    }

    pub fn get_module(&mut self, name: &str) -> Result<ConstantIndex, Error> {
        let name = self.get_utf8(name)?;
        self.intern(Constant::Module(name))
    }

    pub fn get_package(&mut self, name: &str) -> Result<ConstantIndex, Error> {
        let name = self.get_utf8(name)?;
        self.intern(Constant::Package(name))
    }

    /// Get or insert an entry in the bootstrap methods table, returning its index in that table
    pub fn get_bootstrap_method(
        &mut self,
        handle: &Handle,
        arguments: &[ConstantValue],
    ) -> Result<u16, Error> {
        let handle_constant = self.method_handle_constant(handle)?;
        let method = self.intern(handle_constant.clone())?;
        let arguments = arguments
            .iter()
            .map(|argument| self.get_constant_value(argument))
            .collect::<Result<Vec<_>, Error>>()?;
        let bootstrap_method = BootstrapMethod { method, arguments };

        if let Some(index) = self.bootstrap_lookup.get(&bootstrap_method) {
            return Ok(*index);
        }
        // The table length is a `u16` too, so the last usable index is one short of `u16::MAX`
        let index = match u16::try_from(self.bootstrap_methods.len()) {
            Ok(index) if index < u16::MAX => index,
            _ => {
                return Err(Error::ConstantPoolOverflow {
                    constant: handle_constant,
                    offset: self.bootstrap_methods.len(),
                })
            }
        };
        self.bootstrap_methods.push(bootstrap_method.clone());
        self.bootstrap_lookup.insert(bootstrap_method, index);
        Ok(index)
    }

    pub fn get_dynamic(&mut self, dynamic: &ConstantDynamic) -> Result<ConstantIndex, Error> {
        let bootstrap_method =
            self.get_bootstrap_method(&dynamic.bootstrap_method, &dynamic.bootstrap_arguments)?;
        let name_and_type = self.get_name_and_type(&dynamic.name, &dynamic.descriptor)?;
        self.intern(Constant::Dynamic {
            bootstrap_method,
            name_and_type,
        })
    }

    pub fn get_invoke_dynamic(
        &mut self,
        name: &str,
        descriptor: &str,
        bootstrap: &Handle,
        bootstrap_arguments: &[ConstantValue],
    ) -> Result<InvokeDynamicConstantIndex, Error> {
        let bootstrap_method = self.get_bootstrap_method(bootstrap, bootstrap_arguments)?;
        let name_and_type = self.get_name_and_type(name, descriptor)?;
        self.intern(Constant::InvokeDynamic {
            bootstrap_method,
            name_and_type,
        })
        .map(InvokeDynamicConstantIndex)
    }

    /// Get or insert a loadable constant
    pub fn get_constant_value(&mut self, value: &ConstantValue) -> Result<ConstantIndex, Error> {
        match value {
            ConstantValue::Integer(i) => self.get_integer(*i),
            ConstantValue::Float(f) => self.get_float(*f),
            ConstantValue::Long(l) => self.get_long(*l),
            ConstantValue::Double(d) => self.get_double(*d),
            ConstantValue::String(s) => self.get_string(s).map(Into::into),
            ConstantValue::Class(c) => self.get_class(c).map(Into::into),
            ConstantValue::MethodType(m) => self.get_method_type(m),
            ConstantValue::MethodHandle(h) => self.get_method_handle(h),
            ConstantValue::Dynamic(d) => self.get_dynamic(d),
        }
    }
}

/// Writes `constant_pool_count` followed by the entries
impl Serialize for ConstantPool {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.offset_len().serialize(writer)?;
        for constant in self.constants.values() {
            constant.serialize(writer)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn interning_is_idempotent() {
        let mut pool = ConstantPool::new();
        let hello1 = pool.get_utf8("hello").unwrap();
        let hello2 = pool.get_utf8("hello").unwrap();
        let forty_two = pool.get_integer(42).unwrap();
        let hello3 = pool.get_utf8("hello").unwrap();

        assert_eq!(hello1, hello2);
        assert_eq!(hello1, hello3);
        assert_ne!(hello1.0, forty_two);
        assert_eq!(pool.len(), 2);
        assert_eq!(pool.offset_len(), 3);
    }

    #[test]
    fn composite_constants_share_children() {
        let mut pool = ConstantPool::new();
        let get = pool
            .get_method_ref("java/util/List", "get", "(I)Ljava/lang/Object;", true)
            .unwrap();
        let size = pool
            .get_method_ref("java/util/List", "size", "()I", true)
            .unwrap();
        assert_ne!(get, size);

        // 1 class (+1 utf8), 2 name and types (+4 utf8s), 2 method refs
        assert_eq!(pool.len(), 10);

        let get_again = pool
            .get_method_ref("java/util/List", "get", "(I)Ljava/lang/Object;", true)
            .unwrap();
        assert_eq!(get, get_again);
        assert_eq!(pool.len(), 10);

        // Same member as a non-interface method is a different constant
        pool.get_method_ref("java/util/List", "size", "()I", false)
            .unwrap();
        assert_eq!(pool.len(), 11);
    }

    #[test]
    fn wide_constants_take_two_slots() {
        let mut pool = ConstantPool::new();
        let long = pool.get_long(1).unwrap();
        let int = pool.get_integer(1).unwrap();
        let double = pool.get_double(1.0).unwrap();
        assert_eq!(long, ConstantIndex(1));
        assert_eq!(int, ConstantIndex(3));
        assert_eq!(double, ConstantIndex(4));
        assert_eq!(pool.offset_len(), 6);
        assert_eq!(pool.len(), 3);
        assert_eq!(pool.get(ConstantIndex(2)), None);
    }

    #[test]
    fn floats_intern_by_bits() {
        let mut pool = ConstantPool::new();
        let nan1 = pool.get_float(f32::NAN).unwrap();
        let nan2 = pool.get_float(f32::NAN).unwrap();
        assert_eq!(nan1, nan2);

        let zero = pool.get_double(0.0).unwrap();
        let negative_zero = pool.get_double(-0.0).unwrap();
        assert_ne!(zero, negative_zero);
        assert_eq!(pool.len(), 3);
    }

    #[test]
    fn bootstrap_methods_are_deduplicated() {
        let mut pool = ConstantPool::new();
        let handle = Handle {
            kind: HandleKind::InvokeStatic,
            owner: String::from("java/lang/invoke/LambdaMetafactory"),
            name: String::from("metafactory"),
            descriptor: String::from("(Ljava/lang/invoke/MethodHandles$Lookup;Ljava/lang/String;Ljava/lang/invoke/MethodType;Ljava/lang/invoke/MethodType;Ljava/lang/invoke/MethodHandle;Ljava/lang/invoke/MethodType;)Ljava/lang/invoke/CallSite;"),
            is_interface: false,
        };
        let args = vec![ConstantValue::MethodType(String::from("()V"))];

        let first = pool
            .get_invoke_dynamic("run", "()Ljava/lang/Runnable;", &handle, &args)
            .unwrap();
        let second = pool
            .get_invoke_dynamic("call", "()Ljava/lang/Runnable;", &handle, &args)
            .unwrap();
        assert_ne!(first, second);
        assert_eq!(pool.bootstrap_methods().len(), 1);
    }

    #[test]
    fn overflow() {
        let mut pool = ConstantPool::new();
        for i in 0..65534 {
            pool.get_integer(i).unwrap();
        }
        assert_eq!(pool.offset_len(), 65535);
        assert!(matches!(
            pool.get_integer(-1),
            Err(Error::ConstantPoolOverflow { offset: 65535, .. })
        ));

        // Already interned constants still resolve
        assert_eq!(pool.get_integer(0).unwrap(), ConstantIndex(1));
    }

    #[test]
    fn bootstrap_table_overflow() {
        let mut pool = ConstantPool::new();
        let handle = Handle {
            kind: HandleKind::InvokeStatic,
            owner: String::from("me/Bootstraps"),
            name: String::from("bootstrap"),
            descriptor: String::from("(II)Ljava/lang/invoke/CallSite;"),
            is_interface: false,
        };

        // 256 * 256 distinct argument pairs is one more than the table can hold
        let mut results = (0..256).flat_map(|a| (0..256).map(move |b| (a, b))).map(|(a, b)| {
            let arguments = [ConstantValue::Integer(a), ConstantValue::Integer(b)];
            pool.get_bootstrap_method(&handle, &arguments)
        });
        let filled: Vec<u16> = results.by_ref().take(65535).map(Result::unwrap).collect();
        assert_eq!(filled.last(), Some(&65534));
        assert!(matches!(
            results.next(),
            Some(Err(Error::ConstantPoolOverflow {
                constant: Constant::MethodHandle { .. },
                offset: 65535,
            }))
        ));
        drop(results);
        assert_eq!(pool.bootstrap_methods().len(), 65535);
    }

    #[test]
    fn serialized_form() {
        let mut pool = ConstantPool::new();
        pool.get_class("Foo").unwrap();
        pool.get_long(-2).unwrap();

        let mut bytes = vec![];
        pool.serialize(&mut bytes).unwrap();
        assert_eq!(
            bytes,
            vec![
                0, 5, // count
                1, 0, 3, b'F', b'o', b'o', // utf8
                7, 0, 1, // class
                5, 255, 255, 255, 255, 255, 255, 255, 254, // long
            ]
        );
    }
}
