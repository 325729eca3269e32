use super::{BinaryName, Name};
use crate::util::Width;
use std::io::{Error, ErrorKind, Result};
use std::iter::Peekable;
use std::str::Chars;

/// Utility trait for converting descriptors to string representations
pub trait RenderDescriptor {
    /// Turn the descriptor into a string
    fn render(&self) -> String {
        let mut string = String::new();
        self.render_to(&mut string);
        string
    }

    /// Write the descriptor to a string
    fn render_to(&self, write_to: &mut String);
}

/// Utility trait for reading descriptors out of their string representations
pub trait ParseDescriptor: Sized {
    /// Parse a descriptor from a string, rejecting trailing input
    fn parse(source: &str) -> Result<Self> {
        let mut chars = source.chars().peekable();
        let ret = Self::parse_from(&mut chars)?;
        match chars.next() {
            None => Ok(ret),
            Some(c) => {
                let msg = format!("Unexpected leftover input '{}' in '{}'", c, source);
                Err(Error::new(ErrorKind::InvalidInput, msg))
            }
        }
    }

    /// Read the descriptor from a character buffer
    fn parse_from(source: &mut Peekable<Chars>) -> Result<Self>;
}

fn unexpected(what: &str, found: Option<char>) -> Error {
    match found {
        Some(c) => Error::new(
            ErrorKind::InvalidInput,
            format!("Invalid {} character '{}'", what, c),
        ),
        None => Error::new(ErrorKind::UnexpectedEof, format!("Missing {}", what)),
    }
}

/// Primitive value types
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum BaseType {
    Byte,
    Char,
    Double,
    Float,
    Int,
    Long,
    Short,
    Boolean,
}

impl BaseType {
    fn from_char(c: char) -> Option<BaseType> {
        Some(match c {
            'B' => BaseType::Byte,
            'C' => BaseType::Char,
            'D' => BaseType::Double,
            'F' => BaseType::Float,
            'I' => BaseType::Int,
            'J' => BaseType::Long,
            'S' => BaseType::Short,
            'Z' => BaseType::Boolean,
            _ => return None,
        })
    }

    /// Element type of the `newarray` instruction's `atype` operand
    pub fn from_array_code(atype: u8) -> Option<BaseType> {
        Some(match atype {
            4 => BaseType::Boolean,
            5 => BaseType::Char,
            6 => BaseType::Float,
            7 => BaseType::Double,
            8 => BaseType::Byte,
            9 => BaseType::Short,
            10 => BaseType::Int,
            11 => BaseType::Long,
            _ => return None,
        })
    }
}

impl Width for BaseType {
    fn width(&self) -> usize {
        match self {
            BaseType::Double | BaseType::Long => 2,
            _ => 1,
        }
    }
}

impl RenderDescriptor for BaseType {
    fn render_to(&self, write_to: &mut String) {
        write_to.push(match self {
            BaseType::Byte => 'B',
            BaseType::Char => 'C',
            BaseType::Double => 'D',
            BaseType::Float => 'F',
            BaseType::Int => 'I',
            BaseType::Long => 'J',
            BaseType::Short => 'S',
            BaseType::Boolean => 'Z',
        });
    }
}

impl ParseDescriptor for BaseType {
    fn parse_from(source: &mut Peekable<Chars>) -> Result<Self> {
        let c = source.next();
        c.and_then(BaseType::from_char)
            .ok_or_else(|| unexpected("base type", c))
    }
}

/// Generic array type
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct ArrayType<T> {
    /// Additional dimensions (`A[]` has 0 additional dimensions, `A[][][][]` has 3)
    pub additional_dimensions: usize,

    /// Underlying element type (`A` is the underlying element type of `A[][]`)
    pub element_type: T,
}

impl<T: Clone> ArrayType<T> {
    /// Type obtained by indexing once into the array
    pub fn component(&self) -> Option<ArrayType<T>> {
        if self.additional_dimensions == 0 {
            None
        } else {
            Some(ArrayType {
                additional_dimensions: self.additional_dimensions - 1,
                element_type: self.element_type.clone(),
            })
        }
    }
}

impl<T: RenderDescriptor> RenderDescriptor for ArrayType<T> {
    fn render_to(&self, write_to: &mut String) {
        for _ in 0..=self.additional_dimensions {
            write_to.push('[');
        }
        self.element_type.render_to(write_to);
    }
}

impl RenderDescriptor for BinaryName {
    fn render_to(&self, write_to: &mut String) {
        write_to.push('L');
        write_to.push_str(self.as_str());
        write_to.push(';');
    }
}

impl ParseDescriptor for BinaryName {
    fn parse_from(source: &mut Peekable<Chars>) -> Result<Self> {
        match source.next() {
            Some('L') => (),
            other => return Err(unexpected("object type", other)),
        }
        let mut class_name = String::new();
        loop {
            match source.next() {
                Some(';') => {
                    return BinaryName::from_string(class_name)
                        .map_err(|msg| Error::new(ErrorKind::InvalidInput, msg))
                }
                Some(c) => class_name.push(c),
                None => {
                    let msg = format!("Missing terminator for 'L{}'", class_name);
                    return Err(Error::new(ErrorKind::UnexpectedEof, msg));
                }
            }
        }
    }
}

/// Reference type
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum RefType {
    Object(BinaryName),
    ObjectArray(ArrayType<BinaryName>),
    PrimitiveArray(ArrayType<BaseType>),
}

impl RefType {
    /// Reference type for the name found in a `CONSTANT_Class` entry
    ///
    /// Class constants hold plain binary names for classes and interfaces, but array classes are
    /// written as descriptors (eg. `[Ljava/lang/String;`).
    pub fn from_class_constant(name: &str) -> Result<RefType> {
        if name.starts_with('[') {
            RefType::parse(name)
        } else {
            BinaryName::from_string(name.to_owned())
                .map(RefType::Object)
                .map_err(|msg| Error::new(ErrorKind::InvalidInput, msg))
        }
    }

    /// Class of a plain object type
    pub fn class_name(&self) -> Option<&BinaryName> {
        match self {
            RefType::Object(name) => Some(name),
            _ => None,
        }
    }

    /// Array type whose elements have the given type
    pub fn array_of(element: FieldType) -> RefType {
        match element {
            FieldType::Base(element_type) => RefType::PrimitiveArray(ArrayType {
                additional_dimensions: 0,
                element_type,
            }),
            FieldType::Ref(RefType::Object(element_type)) => RefType::ObjectArray(ArrayType {
                additional_dimensions: 0,
                element_type,
            }),
            FieldType::Ref(RefType::ObjectArray(arr)) => RefType::ObjectArray(ArrayType {
                additional_dimensions: arr.additional_dimensions + 1,
                element_type: arr.element_type,
            }),
            FieldType::Ref(RefType::PrimitiveArray(arr)) => RefType::PrimitiveArray(ArrayType {
                additional_dimensions: arr.additional_dimensions + 1,
                element_type: arr.element_type,
            }),
        }
    }

    /// Type of the elements of an array type
    pub fn array_element(&self) -> Option<FieldType> {
        match self {
            RefType::Object(_) => None,
            RefType::ObjectArray(arr) => Some(match arr.component() {
                None => FieldType::object(arr.element_type.clone()),
                Some(inner) => FieldType::Ref(RefType::ObjectArray(inner)),
            }),
            RefType::PrimitiveArray(arr) => Some(match arr.component() {
                None => FieldType::Base(arr.element_type),
                Some(inner) => FieldType::Ref(RefType::PrimitiveArray(inner)),
            }),
        }
    }
}

impl RenderDescriptor for RefType {
    fn render_to(&self, write_to: &mut String) {
        match self {
            RefType::Object(cls) => cls.render_to(write_to),
            RefType::ObjectArray(arr) => arr.render_to(write_to),
            RefType::PrimitiveArray(arr) => arr.render_to(write_to),
        }
    }
}

impl ParseDescriptor for RefType {
    fn parse_from(source: &mut Peekable<Chars>) -> Result<Self> {
        match source.peek().copied() {
            Some('L') => BinaryName::parse_from(source).map(RefType::Object),
            Some('[') => {
                let mut additional_dimensions = 0;
                source.next();
                while source.next_if_eq(&'[').is_some() {
                    additional_dimensions += 1;
                }
                if source.peek() == Some(&'L') {
                    let element_type = BinaryName::parse_from(source)?;
                    Ok(RefType::ObjectArray(ArrayType {
                        additional_dimensions,
                        element_type,
                    }))
                } else {
                    let element_type = BaseType::parse_from(source)?;
                    Ok(RefType::PrimitiveArray(ArrayType {
                        additional_dimensions,
                        element_type,
                    }))
                }
            }
            other => Err(unexpected("reference type", other)),
        }
    }
}

/// Type of a field, parameter, return value, or local variable
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum FieldType {
    Base(BaseType),
    Ref(RefType),
}

impl Width for FieldType {
    fn width(&self) -> usize {
        match self {
            FieldType::Base(base_type) => base_type.width(),
            FieldType::Ref(_) => 1,
        }
    }
}

impl FieldType {
    pub const fn object(class_name: BinaryName) -> FieldType {
        FieldType::Ref(RefType::Object(class_name))
    }

    pub const fn int() -> FieldType {
        FieldType::Base(BaseType::Int)
    }

    pub const fn long() -> FieldType {
        FieldType::Base(BaseType::Long)
    }

    pub const fn float() -> FieldType {
        FieldType::Base(BaseType::Float)
    }

    pub const fn double() -> FieldType {
        FieldType::Base(BaseType::Double)
    }

    /// Class of a plain object type
    pub fn class_name(&self) -> Option<&BinaryName> {
        match self {
            FieldType::Ref(ref_type) => ref_type.class_name(),
            FieldType::Base(_) => None,
        }
    }

    /// Whether the value is a `long` or a `double`
    pub fn is_category2(&self) -> bool {
        self.width() == 2
    }
}

impl RenderDescriptor for FieldType {
    fn render_to(&self, write_to: &mut String) {
        match self {
            FieldType::Base(base_type) => base_type.render_to(write_to),
            FieldType::Ref(ref_type) => ref_type.render_to(write_to),
        }
    }
}

impl ParseDescriptor for FieldType {
    fn parse_from(source: &mut Peekable<Chars>) -> Result<Self> {
        match source.peek().copied() {
            Some('L' | '[') => RefType::parse_from(source).map(FieldType::Ref),
            _ => BaseType::parse_from(source).map(FieldType::Base),
        }
    }
}

/// Signature of a method
#[derive(PartialEq, Eq, Hash, Debug, Clone)]
pub struct MethodDescriptor {
    pub parameters: Vec<FieldType>,
    pub return_type: Option<FieldType>, // `None` is for `void` (ie. no return)
}

impl MethodDescriptor {
    /// Whether the method returns a plain object (not an array, not a primitive)
    pub fn returns_object(&self) -> bool {
        matches!(self.return_type, Some(FieldType::Ref(RefType::Object(_))))
    }
}

impl RenderDescriptor for MethodDescriptor {
    fn render_to(&self, write_to: &mut String) {
        write_to.push('(');
        for parameter in &self.parameters {
            parameter.render_to(write_to);
        }
        write_to.push(')');
        match &self.return_type {
            None => write_to.push('V'),
            Some(typ) => typ.render_to(write_to),
        };
    }
}

impl ParseDescriptor for MethodDescriptor {
    fn parse_from(source: &mut Peekable<Chars>) -> Result<Self> {
        match source.next() {
            Some('(') => (),
            other => return Err(unexpected("method descriptor start", other)),
        }

        let mut parameters = vec![];
        while source.next_if_eq(&')').is_none() {
            if source.peek().is_none() {
                return Err(unexpected("method descriptor end", None));
            }
            parameters.push(FieldType::parse_from(source)?);
        }

        let return_type = if source.next_if_eq(&'V').is_some() {
            None
        } else {
            Some(FieldType::parse_from(source)?)
        };

        Ok(MethodDescriptor {
            parameters,
            return_type,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn round_trip<T: RenderDescriptor + ParseDescriptor + std::fmt::Debug + Eq>(
        rendered: &str,
        parsed: T,
    ) {
        assert_eq!(rendered, parsed.render());
        assert_eq!(T::parse(rendered).unwrap(), parsed);
    }

    const INT: FieldType = FieldType::int();
    const DOUBLE: FieldType = FieldType::double();
    const STRING: FieldType = FieldType::object(BinaryName::STRING);

    #[test]
    fn field_types() {
        round_trip("I", INT);
        round_trip("Ljava/lang/String;", STRING);
        round_trip(
            "[[D",
            FieldType::Ref(RefType::array_of(FieldType::Ref(RefType::array_of(DOUBLE)))),
        );
        round_trip("[Ljava/lang/String;", FieldType::Ref(RefType::array_of(STRING)));
    }

    #[test]
    fn method_descriptors() {
        let descriptor = MethodDescriptor::parse("(IJLjava/lang/String;)Ljava/lang/String;").unwrap();
        assert_eq!(descriptor.parameters, vec![INT, FieldType::long(), STRING]);
        assert_eq!(descriptor.return_type, Some(STRING));
        assert!(descriptor.returns_object());

        let void = MethodDescriptor::parse("()V").unwrap();
        assert!(void.parameters.is_empty());
        assert_eq!(void.return_type, None);
        assert!(!void.returns_object());
    }

    #[test]
    fn malformed_descriptors() {
        assert!(MethodDescriptor::parse("(I").is_err());
        assert!(MethodDescriptor::parse("()Vx").is_err());
        assert!(FieldType::parse("Ljava/lang/String").is_err());
        assert!(FieldType::parse("Q").is_err());
    }

    #[test]
    fn class_constants() {
        assert_eq!(
            RefType::from_class_constant("java/lang/String").unwrap(),
            RefType::Object(BinaryName::STRING)
        );
        let array = RefType::from_class_constant("[[I").unwrap();
        assert_eq!(
            array.array_element(),
            Some(FieldType::Ref(RefType::array_of(INT)))
        );
    }
}
