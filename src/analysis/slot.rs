use super::MethodRef;
use crate::jvm::{BinaryName, FieldType, RefType};
use crate::util::Width;
use std::fmt::Debug;

/// Literal value known at compile time
#[derive(Clone, PartialEq, Debug)]
pub enum ConstantValue {
    String(String),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Class(RefType),
}

impl ConstantValue {
    /// Static type of the constant
    pub fn field_type(&self) -> FieldType {
        match self {
            ConstantValue::String(_) => FieldType::object(BinaryName::STRING),
            ConstantValue::Int(_) => FieldType::int(),
            ConstantValue::Long(_) => FieldType::long(),
            ConstantValue::Float(_) => FieldType::float(),
            ConstantValue::Double(_) => FieldType::double(),
            ConstantValue::Class(_) => FieldType::object(BinaryName::CLASS),
        }
    }
}

/// Simulated value on the operand stack or in a local variable
///
/// Every field is optional: an empty slot stands for a value about which nothing is known. The
/// tag is owned by whichever detector drives the simulation.
#[derive(Clone, PartialEq, Debug)]
pub struct ValueSlot<T> {
    pub constant: Option<ConstantValue>,
    pub declared_type: Option<FieldType>,

    /// Method whose return value this is
    pub producer: Option<MethodRef>,
    pub tag: Option<T>,

    /// Local variable the value was last loaded from
    pub register: Option<u16>,
}

impl<T> Default for ValueSlot<T> {
    fn default() -> Self {
        ValueSlot {
            constant: None,
            declared_type: None,
            producer: None,
            tag: None,
            register: None,
        }
    }
}

impl<T> ValueSlot<T> {
    /// Slot about which nothing is known
    pub fn unknown() -> ValueSlot<T> {
        ValueSlot::default()
    }

    /// Fresh slot with only a type
    pub fn of_type(declared_type: FieldType) -> ValueSlot<T> {
        ValueSlot {
            declared_type: Some(declared_type),
            ..ValueSlot::default()
        }
    }

    /// Fresh slot with a possibly unknown type
    pub fn of_optional_type(declared_type: Option<FieldType>) -> ValueSlot<T> {
        ValueSlot {
            declared_type,
            ..ValueSlot::default()
        }
    }

    /// Fresh slot holding a literal
    pub fn constant(value: ConstantValue) -> ValueSlot<T> {
        ValueSlot {
            declared_type: Some(value.field_type()),
            constant: Some(value),
            ..ValueSlot::default()
        }
    }

    /// Literal string held by the slot
    pub fn string_constant(&self) -> Option<&str> {
        match &self.constant {
            Some(ConstantValue::String(string)) => Some(string),
            _ => None,
        }
    }

    /// Class of the value, if it is known to be a plain object
    pub fn class_name(&self) -> Option<&BinaryName> {
        self.declared_type.as_ref().and_then(FieldType::class_name)
    }

    /// Whether the value is a `long` or a `double`
    pub fn is_category2(&self) -> bool {
        self.width() == 2
    }

    /// Drop the producer and the tag
    pub fn clear_provenance(&mut self) {
        self.producer = None;
        self.tag = None;
    }
}

/// Values of unknown type are assumed to be one word wide
impl<T> Width for ValueSlot<T> {
    fn width(&self) -> usize {
        self.declared_type.as_ref().map_or(1, Width::width)
    }
}

impl<T: Clone + PartialEq> ValueSlot<T> {
    /// Combine values reaching the same point along different paths
    ///
    /// A field survives only when both sides agree on it.
    pub fn merge(&self, other: &ValueSlot<T>) -> ValueSlot<T> {
        fn agree<A: Clone + PartialEq>(left: &Option<A>, right: &Option<A>) -> Option<A> {
            if left == right {
                left.clone()
            } else {
                None
            }
        }

        ValueSlot {
            constant: agree(&self.constant, &other.constant),
            declared_type: agree(&self.declared_type, &other.declared_type),
            producer: agree(&self.producer, &other.producer),
            tag: agree(&self.tag, &other.tag),
            register: agree(&self.register, &other.register),
        }
    }
}
