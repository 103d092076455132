use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};

pub const OBJECT_NAME: &str = "java/lang/Object";
pub const THROWABLE_NAME: &str = "java/lang/Throwable";

/// Answers the questions frame merging needs to ask about classes
///
/// Merging two object types means finding their closest common superclass, which requires
/// knowing classes that are usually not part of the class file being written.
pub trait ClassHierarchy {
    /// Superclass of a class, or `None` if the class is unknown or is `java/lang/Object`
    fn super_class(&self, class: &str) -> Option<String>;

    /// Is this an interface? Unknown classes are not interfaces.
    fn is_interface(&self, class: &str) -> bool;
}

/// Hierarchy that knows nothing: every pair of distinct classes merges to `java/lang/Object`
#[derive(Debug, Clone, Copy, Default)]
pub struct UnknownHierarchy;

impl ClassHierarchy for UnknownHierarchy {
    fn super_class(&self, _class: &str) -> Option<String> {
        None
    }

    fn is_interface(&self, _class: &str) -> bool {
        false
    }
}

/// Tracks the superclass and interface relationships between classes
///
/// This is the hierarchy to use when the classes involved in a rewrite are known up front. Anything
/// missing from the graph is treated as a direct subclass of `java/lang/Object`.
#[derive(Debug, Clone, Default)]
pub struct ClassGraph {
    pub classes: HashMap<String, ClassData>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassData {
    pub superclass: Option<String>,
    pub interfaces: HashSet<String>,
    pub is_interface: bool,
}

impl ClassGraph {
    /// New empty graph
    pub fn new() -> ClassGraph {
        ClassGraph {
            classes: HashMap::new(),
        }
    }

    /// Add a class (replacing any previous entry of the same name)
    pub fn add_class(&mut self, name: &str, superclass: &str) -> &mut ClassData {
        let data = ClassData {
            superclass: Some(superclass.to_owned()),
            interfaces: HashSet::new(),
            is_interface: false,
        };
        match self.classes.entry(name.to_owned()) {
            Entry::Occupied(mut entry) => {
                entry.insert(data);
                entry.into_mut()
            }
            Entry::Vacant(entry) => entry.insert(data),
        }
    }

    /// Add an interface (replacing any previous entry of the same name)
    pub fn add_interface(&mut self, name: &str) -> &mut ClassData {
        let data = self.add_class(name, OBJECT_NAME);
        data.is_interface = true;
        data
    }

    /// Add standard types to the class graph
    pub fn insert_lang_types(&mut self) {
        self.classes.entry(String::from(OBJECT_NAME)).or_insert(ClassData {
            superclass: None,
            interfaces: HashSet::new(),
            is_interface: false,
        });

        let classes = [
            ("java/lang/String", OBJECT_NAME),
            ("java/lang/Class", OBJECT_NAME),
            ("java/lang/Number", OBJECT_NAME),
            ("java/lang/Integer", "java/lang/Number"),
            ("java/lang/Long", "java/lang/Number"),
            ("java/lang/Float", "java/lang/Number"),
            ("java/lang/Double", "java/lang/Number"),
            ("java/lang/Short", "java/lang/Number"),
            ("java/lang/Byte", "java/lang/Number"),
            ("java/lang/Boolean", OBJECT_NAME),
            ("java/lang/Character", OBJECT_NAME),
            (THROWABLE_NAME, OBJECT_NAME),
            ("java/lang/Exception", THROWABLE_NAME),
            ("java/lang/Error", THROWABLE_NAME),
            ("java/lang/RuntimeException", "java/lang/Exception"),
            ("java/lang/IllegalArgumentException", "java/lang/RuntimeException"),
            ("java/lang/IllegalStateException", "java/lang/RuntimeException"),
            ("java/lang/NullPointerException", "java/lang/RuntimeException"),
            ("java/lang/ArithmeticException", "java/lang/RuntimeException"),
            ("java/lang/invoke/MethodHandle", OBJECT_NAME),
            ("java/lang/invoke/MethodType", OBJECT_NAME),
        ];
        for (name, superclass) in classes {
            self.classes.entry(String::from(name)).or_insert(ClassData {
                superclass: Some(String::from(superclass)),
                interfaces: HashSet::new(),
                is_interface: false,
            });
        }

        for interface in [
            "java/lang/Cloneable",
            "java/io/Serializable",
            "java/lang/Comparable",
            "java/lang/CharSequence",
            "java/lang/Runnable",
        ] {
            self.classes
                .entry(String::from(interface))
                .or_insert(ClassData {
                    superclass: Some(String::from(OBJECT_NAME)),
                    interfaces: HashSet::new(),
                    is_interface: true,
                });
        }
    }
}

impl ClassHierarchy for ClassGraph {
    fn super_class(&self, class: &str) -> Option<String> {
        if class == OBJECT_NAME {
            return None;
        }
        match self.classes.get(class) {
            Some(data) => data.superclass.clone(),
            None => Some(String::from(OBJECT_NAME)),
        }
    }

    fn is_interface(&self, class: &str) -> bool {
        self.classes
            .get(class)
            .map_or(false, |data| data.is_interface)
    }
}

/// Hierarchy that knows one extra class on top of another hierarchy
///
/// The class being written is rarely in the caller's hierarchy, but its superclass is always
/// known from its header.
pub struct WithClass<'a> {
    pub inner: &'a dyn ClassHierarchy,
    pub name: &'a str,
    pub super_name: Option<&'a str>,
    pub is_interface: bool,
}

impl<'a> ClassHierarchy for WithClass<'a> {
    fn super_class(&self, class: &str) -> Option<String> {
        if class == self.name {
            self.super_name.map(String::from)
        } else {
            self.inner.super_class(class)
        }
    }

    fn is_interface(&self, class: &str) -> bool {
        if class == self.name {
            self.is_interface
        } else {
            self.inner.is_interface(class)
        }
    }
}

/// Chain of superclasses starting at (and including) `class`, always ending in `java/lang/Object`
fn superclass_chain(hierarchy: &dyn ClassHierarchy, class: &str) -> Vec<String> {
    let mut chain = vec![class.to_owned()];
    let mut seen: HashSet<String> = chain.iter().cloned().collect();
    let mut current = class.to_owned();

    while let Some(superclass) = hierarchy.super_class(&current) {
        if !seen.insert(superclass.clone()) {
            log::warn!("Superclass cycle through {}", superclass);
            break;
        }
        chain.push(superclass.clone());
        current = superclass;
    }

    if current != OBJECT_NAME {
        chain.push(String::from(OBJECT_NAME));
    }
    chain
}

/// Closest common superclass of two classes or array types (given as internal names, so arrays
/// look like `[Ljava/lang/String;`)
///
/// Interfaces merge to `java/lang/Object`, as do arrays with anything that is not an array of
/// references.
pub fn common_super_class(hierarchy: &dyn ClassHierarchy, class1: &str, class2: &str) -> String {
    if class1 == class2 {
        return class1.to_owned();
    }

    match (class1.strip_prefix('['), class2.strip_prefix('[')) {
        (Some(elem1), Some(elem2)) => {
            return match (reference_element(elem1), reference_element(elem2)) {
                (Some(elem1), Some(elem2)) => {
                    let common = common_super_class(hierarchy, elem1, elem2);
                    if common.starts_with('[') {
                        format!("[{}", common)
                    } else {
                        format!("[L{};", common)
                    }
                }
                _ => String::from(OBJECT_NAME),
            };
        }
        (None, None) => (),
        _ => return String::from(OBJECT_NAME),
    }

    if hierarchy.is_interface(class1) || hierarchy.is_interface(class2) {
        return String::from(OBJECT_NAME);
    }

    let chain1 = superclass_chain(hierarchy, class1);
    let chain2 = superclass_chain(hierarchy, class2);
    chain2
        .into_iter()
        .find(|class| chain1.contains(class))
        .unwrap_or_else(|| String::from(OBJECT_NAME))
}

/// Element type of an array descriptor, as an internal name, if it is a reference
fn reference_element(element_descriptor: &str) -> Option<&str> {
    if element_descriptor.starts_with('[') {
        Some(element_descriptor)
    } else {
        element_descriptor
            .strip_prefix('L')
            .and_then(|rest| rest.strip_suffix(';'))
    }
}
