use crate::jvm;
use std::fmt::{Display, Formatter};

/// Failure to scan a whole input
///
/// Problems inside a single method never end up here: those are reported through the
/// [`super::BugReporter`] and the scan carries on.
#[derive(Debug)]
pub enum Error {
    IoError(std::io::Error),

    /// The input isn't a readable class file
    ClassFile(jvm::Error),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::IoError(err)
    }
}

impl From<jvm::Error> for Error {
    fn from(err: jvm::Error) -> Error {
        Error::ClassFile(err)
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::IoError(err) => write!(f, "I/O error: {}", err),
            Error::ClassFile(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for Error {}
