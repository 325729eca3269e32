use byteorder::{BigEndian, ReadBytesExt};
use std::fmt::{Display, Formatter};
use std::io::{Read, Result};

/// Version of the class file, which is used to verify that the JVM has the
/// necessary features to interpret the class
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct Version {
    pub major_version: u16,
    pub minor_version: u16,
}

impl Version {
    /// JVM class file version corresponding to Java SE 8 (released March 2014)
    pub const JAVA8: Version = Version {
        minor_version: 0,
        major_version: 52,
    };

    /// JVM class file version corresponding to Java SE 11 (released September 2018)
    pub const JAVA11: Version = Version {
        minor_version: 0,
        major_version: 55,
    };

    /// Read the minor then major version, as laid out after the magic bytes
    pub fn read<R: Read>(reader: &mut R) -> Result<Version> {
        let minor_version = reader.read_u16::<BigEndian>()?;
        let major_version = reader.read_u16::<BigEndian>()?;
        Ok(Version {
            major_version,
            minor_version,
        })
    }
}

impl Display for Version {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major_version, self.minor_version)
    }
}
