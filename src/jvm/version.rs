use std::fmt;

/// Version of the class file, which is used to verify that the JVM has the necessary features to
/// interpret the class
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct Version {
    pub major_version: u16,
    pub minor_version: u16,
}

impl Version {
    /// JVM class file version corresponding to JDK 1.1
    pub const JAVA1: Version = Version::new(45, 3);

    /// JVM class file version corresponding to Java SE 6, the first to carry stack map frames
    pub const JAVA6: Version = Version::new(50, 0);

    /// JVM class file version corresponding to Java SE 7, the first to require stack map frames
    pub const JAVA7: Version = Version::new(51, 0);

    /// JVM class file version corresponding to Java SE 8 (released March 2014)
    pub const JAVA8: Version = Version::new(52, 0);

    /// JVM class file version corresponding to Java SE 11
    pub const JAVA11: Version = Version::new(55, 0);

    /// JVM class file version corresponding to Java SE 17
    pub const JAVA17: Version = Version::new(61, 0);

    /// JVM class file version corresponding to Java SE 21
    pub const JAVA21: Version = Version::new(65, 0);

    /// Oldest major version the reader accepts
    pub const MIN_MAJOR: u16 = 45;

    /// Newest major version the reader accepts
    pub const MAX_MAJOR: u16 = 65;

    pub const fn new(major_version: u16, minor_version: u16) -> Version {
        Version {
            major_version,
            minor_version,
        }
    }

    /// Can the reader and writer handle this version?
    pub fn is_supported(&self) -> bool {
        (Version::MIN_MAJOR..=Version::MAX_MAJOR).contains(&self.major_version)
    }

    /// Does this version carry `StackMapTable` attributes?
    pub fn has_stack_map_frames(&self) -> bool {
        self.major_version >= Version::JAVA6.major_version
    }

    /// Are `jsr`/`ret` still legal in this version?
    pub fn allows_subroutines(&self) -> bool {
        self.major_version < Version::JAVA7.major_version
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major_version, self.minor_version)
    }
}
