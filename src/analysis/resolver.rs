use crate::jvm::class_file::{Constant, ConstantIndex, ConstantPool};
use crate::jvm::{
    BinaryName, FieldType, MethodDescriptor, Name, ParseDescriptor, RefType, RenderDescriptor,
    UnqualifiedName,
};
use std::fmt::{Display, Formatter};

/// Field referenced by a `getfield`, `putfield`, `getstatic`, or `putstatic`
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct FieldRef {
    pub class: BinaryName,
    pub name: UnqualifiedName,
    pub descriptor: FieldType,
}

/// Method referenced by an `invoke*` instruction
///
/// For `invokedynamic`, `class` is `java/lang/Object` since the call site has no owner.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct MethodRef {
    pub class: BinaryName,
    pub name: UnqualifiedName,
    pub descriptor: MethodDescriptor,
}

impl MethodRef {
    /// Check the owner, name, and rendered descriptor at once
    pub fn is(&self, class: &BinaryName, name: &UnqualifiedName, descriptor: &str) -> bool {
        &self.class == class && &self.name == name && self.descriptor.render() == descriptor
    }
}

impl Display for FieldRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}:{}", self.class, self.name, self.descriptor.render())
    }
}

impl Display for MethodRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}{}", self.class, self.name, self.descriptor.render())
    }
}

/// Loadable constant, as pushed by `ldc`, `ldc_w`, and `ldc2_w`
#[derive(Clone, PartialEq, Debug)]
pub enum ConstantData {
    String(String),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    Class(RefType),
    MethodHandle,
    MethodType,

    /// Dynamically-computed constant, only its type is known
    Dynamic(FieldType),
}

/// Ways a constant pool reference can fail to resolve
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum ResolveError {
    /// Index is out of range, or hits index 0 or the second half of a `long`/`double`
    InvalidIndex(ConstantIndex),

    /// Index points at an entry of the wrong kind for the instruction
    WrongKind {
        index: ConstantIndex,
        expected: &'static str,
    },

    /// Referenced class or member cannot be found or understood
    ///
    /// This is recoverable: simulation continues with a value of unknown type. For method
    /// references, the descriptor is still needed to know how many arguments to pop.
    Missing {
        reference: String,
        descriptor: Option<MethodDescriptor>,
    },
}

impl Display for ResolveError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolveError::InvalidIndex(index) => write!(f, "invalid constant index #{}", index.0),
            ResolveError::WrongKind { index, expected } => {
                write!(f, "constant #{} is not a {}", index.0, expected)
            }
            ResolveError::Missing { reference, .. } => write!(f, "cannot resolve {}", reference),
        }
    }
}

impl std::error::Error for ResolveError {}

/// Capability to resolve the constant pool references found in instructions
///
/// The simulator holds on to a resolver for the duration of a method. The class file constant
/// pool is the usual implementation, but anything able to answer these lookups will do.
pub trait Resolver {
    /// Constant pushed by `ldc`
    fn resolve_constant(&self, index: ConstantIndex) -> Result<ConstantData, ResolveError>;

    /// Field targeted by a field access
    fn resolve_field(&self, index: ConstantIndex) -> Result<FieldRef, ResolveError>;

    /// Method targeted by an `invoke*`, including the call site of `invokedynamic`
    fn resolve_method(&self, index: ConstantIndex) -> Result<MethodRef, ResolveError>;

    /// Class or array type named by `new`, `anewarray`, `checkcast`, ...
    fn resolve_class(&self, index: ConstantIndex) -> Result<RefType, ResolveError>;
}

impl ConstantPool {
    fn entry(&self, index: ConstantIndex) -> Result<&Constant, ResolveError> {
        self.get(index).ok_or(ResolveError::InvalidIndex(index))
    }

    fn entry_utf8(&self, index: ConstantIndex) -> Result<&str, ResolveError> {
        match self.entry(index)? {
            Constant::Utf8(string) => Ok(string),
            _ => Err(ResolveError::WrongKind {
                index,
                expected: "utf8",
            }),
        }
    }

    fn entry_name_and_type(&self, index: ConstantIndex) -> Result<(&str, &str), ResolveError> {
        match self.entry(index)? {
            Constant::NameAndType { name, descriptor } => {
                Ok((self.entry_utf8(*name)?, self.entry_utf8(*descriptor)?))
            }
            _ => Err(ResolveError::WrongKind {
                index,
                expected: "name and type",
            }),
        }
    }

    fn entry_class_name(&self, index: ConstantIndex) -> Result<&str, ResolveError> {
        match self.entry(index)? {
            Constant::Class(name) => self.entry_utf8(*name),
            _ => Err(ResolveError::WrongKind {
                index,
                expected: "class",
            }),
        }
    }

    /// Owner of a member reference
    ///
    /// Methods invoked on arrays (eg. `clone` on `[I`) are inherited from `java/lang/Object`.
    fn member_owner(&self, index: ConstantIndex) -> Result<BinaryName, ResolveError> {
        let name = self.entry_class_name(index)?;
        if name.starts_with('[') {
            return Ok(BinaryName::OBJECT);
        }
        BinaryName::from_string(name.to_owned()).map_err(|_| ResolveError::Missing {
            reference: name.to_owned(),
            descriptor: None,
        })
    }
}

impl Resolver for ConstantPool {
    fn resolve_constant(&self, index: ConstantIndex) -> Result<ConstantData, ResolveError> {
        match self.entry(index)? {
            Constant::Integer(value) => Ok(ConstantData::Integer(*value)),
            Constant::Float(value) => Ok(ConstantData::Float(*value)),
            Constant::Long(value) => Ok(ConstantData::Long(*value)),
            Constant::Double(value) => Ok(ConstantData::Double(*value)),
            Constant::String(string) => Ok(ConstantData::String(
                self.entry_utf8(*string)?.to_owned(),
            )),
            Constant::Class(_) => self.resolve_class(index).map(ConstantData::Class),
            Constant::MethodHandle { .. } => Ok(ConstantData::MethodHandle),
            Constant::MethodType(_) => Ok(ConstantData::MethodType),
            Constant::Dynamic { name_and_type, .. } => {
                let (name, descriptor) = self.entry_name_and_type(*name_and_type)?;
                FieldType::parse(descriptor)
                    .map(ConstantData::Dynamic)
                    .map_err(|_| ResolveError::Missing {
                        reference: format!("{}:{}", name, descriptor),
                        descriptor: None,
                    })
            }
            _ => Err(ResolveError::WrongKind {
                index,
                expected: "loadable constant",
            }),
        }
    }

    fn resolve_field(&self, index: ConstantIndex) -> Result<FieldRef, ResolveError> {
        let (class, name_and_type) = match self.entry(index)? {
            Constant::FieldRef {
                class,
                name_and_type,
            } => (*class, *name_and_type),
            _ => {
                return Err(ResolveError::WrongKind {
                    index,
                    expected: "field reference",
                })
            }
        };
        let class = self.member_owner(class)?;
        let (name, descriptor) = self.entry_name_and_type(name_and_type)?;
        let missing = || ResolveError::Missing {
            reference: format!("{}.{}:{}", class, name, descriptor),
            descriptor: None,
        };
        let name = UnqualifiedName::from_string(name.to_owned()).map_err(|_| missing())?;
        let descriptor = FieldType::parse(descriptor).map_err(|_| missing())?;
        Ok(FieldRef {
            class,
            name,
            descriptor,
        })
    }

    fn resolve_method(&self, index: ConstantIndex) -> Result<MethodRef, ResolveError> {
        let (class, name_and_type) = match self.entry(index)? {
            Constant::MethodRef {
                class,
                name_and_type,
            }
            | Constant::InterfaceMethodRef {
                class,
                name_and_type,
            } => (Some(*class), *name_and_type),
            Constant::InvokeDynamic { name_and_type, .. } => (None, *name_and_type),
            _ => {
                return Err(ResolveError::WrongKind {
                    index,
                    expected: "method reference",
                })
            }
        };
        let (name, descriptor) = self.entry_name_and_type(name_and_type)?;
        let parsed = MethodDescriptor::parse(descriptor).ok();
        let missing = |parsed: Option<MethodDescriptor>| ResolveError::Missing {
            reference: format!("{}{}", name, descriptor),
            descriptor: parsed,
        };

        let class = match class {
            None => BinaryName::OBJECT,
            Some(class) => match self.member_owner(class) {
                Ok(class) => class,
                Err(ResolveError::Missing { .. }) => return Err(missing(parsed)),
                Err(err) => return Err(err),
            },
        };
        let descriptor = match parsed {
            Some(descriptor) => descriptor,
            None => return Err(missing(None)),
        };
        let name = match UnqualifiedName::from_string(name.to_owned()) {
            Ok(name) => name,
            Err(_) => return Err(missing(Some(descriptor))),
        };
        Ok(MethodRef {
            class,
            name,
            descriptor,
        })
    }

    fn resolve_class(&self, index: ConstantIndex) -> Result<RefType, ResolveError> {
        let name = self.entry_class_name(index)?;
        RefType::from_class_constant(name).map_err(|_| ResolveError::Missing {
            reference: name.to_owned(),
            descriptor: None,
        })
    }
}
