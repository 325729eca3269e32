use std::borrow::Cow;
use std::fmt::{Debug, Display, Error as FmtError, Formatter};

/// Names of methods, fields
///
/// See <https://docs.oracle.com/javase/specs/jvms/se16/html/jvms-4.html#jvms-4.2.2>
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct UnqualifiedName(Cow<'static, str>);

/// Names of classes and interfaces, in their internal slashed form (eg. `java/lang/String`)
///
/// See <https://docs.oracle.com/javase/specs/jvms/se16/html/jvms-4.html#jvms-4.2.1>
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct BinaryName(Cow<'static, str>);

/// Extracts the raw underlying string name
impl AsRef<str> for UnqualifiedName {
    fn as_ref(&self) -> &str {
        self.0.as_ref()
    }
}

/// Extracts the raw underlying string name
impl AsRef<str> for BinaryName {
    fn as_ref(&self) -> &str {
        self.0.as_ref()
    }
}

pub trait Name: Sized {
    /// Check if a string would be a valid name
    fn check_valid(name: impl AsRef<str>) -> Result<(), String>;

    /// Extact the raw underlying string data
    fn as_cow(&self) -> &Cow<'static, str>;

    /// Extact the raw underlying string name
    fn as_str(&self) -> &str {
        self.as_cow().as_ref()
    }

    /// Try to construct a name from a string
    fn from_string(name: String) -> Result<Self, String>;
}

impl Name for UnqualifiedName {
    fn check_valid(name: impl AsRef<str>) -> Result<(), String> {
        let name = name.as_ref();
        if name.contains(&['.', ';', '[', '/'][..]) {
            Err(format!(
                "Unqualified name '{}' contains an illegal character",
                name
            ))
        } else if name.is_empty() {
            Err(String::from("Unqualified name is empty"))
        } else {
            Ok(())
        }
    }

    fn as_cow(&self) -> &Cow<'static, str> {
        &self.0
    }

    fn from_string(name: String) -> Result<Self, String> {
        Self::check_valid(&name)?;
        Ok(UnqualifiedName(Cow::Owned(name)))
    }
}

impl Name for BinaryName {
    fn check_valid(name: impl AsRef<str>) -> Result<(), String> {
        let name = name.as_ref();
        if name.is_empty() {
            Err(String::from("Binary name is empty"))
        } else {
            name.split('/').map(UnqualifiedName::check_valid).collect()
        }
    }

    fn as_cow(&self) -> &Cow<'static, str> {
        &self.0
    }

    fn from_string(name: String) -> Result<Self, String> {
        Self::check_valid(&name)?;
        Ok(BinaryName(Cow::Owned(name)))
    }
}

impl Debug for UnqualifiedName {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        f.write_str(self.0.as_ref())
    }
}

impl Debug for BinaryName {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        f.write_str(self.0.as_ref())
    }
}

impl Display for UnqualifiedName {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        f.write_str(self.0.as_ref())
    }
}

/// Renders the name in its dotted source form (`java.lang.String`)
impl Display for BinaryName {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        for (i, segment) in self.0.split('/').enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            f.write_str(segment)?;
        }
        Ok(())
    }
}

impl UnqualifiedName {
    const fn name(value: &'static str) -> UnqualifiedName {
        UnqualifiedName(Cow::Borrowed(value))
    }

    /// Whether this is the name of an instance initializer
    pub fn is_init(&self) -> bool {
        *self == Self::INIT
    }

    // Special unqualified names - only these are allowed to have angle brackets in them
    pub const INIT: Self = Self::name("<init>");

    // JDK names
    pub const APPEND: Self = Self::name("append");
    pub const CONTAINS: Self = Self::name("contains");
    pub const ENDSWITH: Self = Self::name("endsWith");
    pub const INDEXOF: Self = Self::name("indexOf");
    pub const LASTINDEXOF: Self = Self::name("lastIndexOf");
    pub const LENGTH: Self = Self::name("length");
    pub const PRINT: Self = Self::name("print");
    pub const PRINTLN: Self = Self::name("println");
    pub const REPLACE: Self = Self::name("replace");
    pub const STARTSWITH: Self = Self::name("startsWith");
    pub const SUBSTRING: Self = Self::name("substring");
    pub const TOSTRING: Self = Self::name("toString");
    pub const WRITE: Self = Self::name("write");
}

impl BinaryName {
    const fn name(value: &'static str) -> BinaryName {
        BinaryName(Cow::Borrowed(value))
    }

    /// Package part of the name, in slashed form (`java/lang` for `java/lang/String`)
    ///
    /// Classes in the default package have an empty package.
    pub fn package(&self) -> &str {
        match self.0.rfind('/') {
            Some(idx) => &self.0[..idx],
            None => "",
        }
    }

    // JDK names
    pub const BOOLEAN: Self = Self::name("java/lang/Boolean");
    pub const BYTE: Self = Self::name("java/lang/Byte");
    pub const CHARACTER: Self = Self::name("java/lang/Character");
    pub const CLASS: Self = Self::name("java/lang/Class");
    pub const DOUBLE: Self = Self::name("java/lang/Double");
    pub const FLOAT: Self = Self::name("java/lang/Float");
    pub const INTEGER: Self = Self::name("java/lang/Integer");
    pub const LONG: Self = Self::name("java/lang/Long");
    pub const METHODHANDLE: Self = Self::name("java/lang/invoke/MethodHandle");
    pub const METHODTYPE: Self = Self::name("java/lang/invoke/MethodType");
    pub const NUMBER: Self = Self::name("java/lang/Number");
    pub const OBJECT: Self = Self::name("java/lang/Object");
    pub const PRINTSTREAM: Self = Self::name("java/io/PrintStream");
    pub const SHORT: Self = Self::name("java/lang/Short");
    pub const STRING: Self = Self::name("java/lang/String");
    pub const STRINGBUFFER: Self = Self::name("java/lang/StringBuffer");
    pub const STRINGBUILDER: Self = Self::name("java/lang/StringBuilder");
    pub const STRINGWRITER: Self = Self::name("java/io/StringWriter");
    pub const THROWABLE: Self = Self::name("java/lang/Throwable");
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn validity() {
        assert!(BinaryName::from_string(String::from("java/lang/String")).is_ok());
        assert!(BinaryName::from_string(String::from("java//String")).is_err());
        assert!(BinaryName::from_string(String::from("java.lang.String")).is_err());
        assert!(UnqualifiedName::from_string(String::from("toString")).is_ok());
        assert!(UnqualifiedName::from_string(String::new()).is_err());
    }

    #[test]
    fn packages() {
        assert_eq!(BinaryName::STRING.package(), "java/lang");
        assert_eq!(BinaryName::METHODHANDLE.package(), "java/lang/invoke");
        let default_package = BinaryName::from_string(String::from("Main")).unwrap();
        assert_eq!(default_package.package(), "");
        assert_eq!(BinaryName::STRINGBUILDER.to_string(), "java.lang.StringBuilder");
    }
}
