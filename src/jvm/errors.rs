use super::class_file::ConstantIndex;
use std::fmt::{Display, Formatter};

/// Ways reading a class file can fail
#[derive(Debug)]
pub enum Error {
    IoError(std::io::Error),

    /// The file doesn't start with `0xCAFEBABE`
    BadMagic(u32),

    /// Constant pool entry with a tag this reader doesn't know about
    BadConstantTag { index: ConstantIndex, tag: u8 },

    /// Constant pool reference that is out of range or points at the wrong kind of entry
    BadConstantIndex {
        index: ConstantIndex,
        expected: &'static str,
    },

    MalformedName(String),
    BadDescriptor(String),

    /// An attribute's contents don't match its declared length
    BadAttribute(String),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::IoError(err)
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::IoError(err) => write!(f, "I/O error: {}", err),
            Error::BadMagic(magic) => write!(f, "not a class file (magic 0x{:08x})", magic),
            Error::BadConstantTag { index, tag } => {
                write!(f, "unknown constant tag {} at #{}", tag, index.0)
            }
            Error::BadConstantIndex { index, expected } => {
                write!(f, "constant #{} is not a valid {}", index.0, expected)
            }
            Error::MalformedName(msg) => write!(f, "malformed name: {}", msg),
            Error::BadDescriptor(msg) => write!(f, "bad descriptor: {}", msg),
            Error::BadAttribute(name) => write!(f, "malformed `{}` attribute", name),
        }
    }
}

impl std::error::Error for Error {}
