use super::{SimulationError, ValueSlot};
use crate::jvm::{BinaryName, FieldType, MethodDescriptor};
use crate::util::{Offset, Width};
use std::collections::BTreeMap;

/// Simulated operand stack
///
/// Every value takes up one entry, including `long` and `double` values. Their width is only
/// consulted by the instructions that care about it (`pop2`, `dup2`, ...).
#[derive(Clone, PartialEq, Debug)]
pub struct OperandStack<T> {
    slots: Vec<ValueSlot<T>>,
}

impl<T> Default for OperandStack<T> {
    fn default() -> Self {
        OperandStack { slots: vec![] }
    }
}

impl<T> OperandStack<T> {
    pub fn depth(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Value `depth` entries below the top (so `peek(0)` is the top of the stack)
    pub fn peek(&self, depth: usize) -> Option<&ValueSlot<T>> {
        self.slots
            .len()
            .checked_sub(depth + 1)
            .map(|idx| &self.slots[idx])
    }

    pub fn top(&self) -> Option<&ValueSlot<T>> {
        self.slots.last()
    }

    /// Values from the bottom of the stack to the top
    pub fn iter(&self) -> impl Iterator<Item = &ValueSlot<T>> {
        self.slots.iter()
    }

    pub(crate) fn top_mut(&mut self) -> Option<&mut ValueSlot<T>> {
        self.slots.last_mut()
    }

    pub fn push(&mut self, slot: ValueSlot<T>) {
        self.slots.push(slot);
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }

    /// Pop the top value
    pub fn pop(&mut self, offset: Offset) -> Result<ValueSlot<T>, SimulationError> {
        let depth = self.slots.len();
        self.slots.pop().ok_or(SimulationError::StackUnderflow {
            offset,
            needed: 1,
            depth,
        })
    }

    /// Pop the top `count` values, returned in the order they were pushed
    pub fn pop_n(
        &mut self,
        count: usize,
        offset: Offset,
    ) -> Result<Vec<ValueSlot<T>>, SimulationError> {
        let depth = self.slots.len();
        match depth.checked_sub(count) {
            Some(remaining) => Ok(self.slots.split_off(remaining)),
            None => Err(SimulationError::StackUnderflow {
                offset,
                needed: count,
                depth,
            }),
        }
    }
}

impl<T: Clone> OperandStack<T> {
    /// Stack with every producer and tag dropped
    pub(crate) fn without_provenance(&self) -> OperandStack<T> {
        let mut stack = self.clone();
        for slot in &mut stack.slots {
            slot.clear_provenance();
        }
        stack
    }
}

impl<T: Clone + PartialEq> OperandStack<T> {
    /// Slot-wise merge, or `None` if the depths differ
    pub fn merge(&self, other: &OperandStack<T>) -> Option<OperandStack<T>> {
        if self.slots.len() != other.slots.len() {
            return None;
        }
        let slots = self
            .slots
            .iter()
            .zip(&other.slots)
            .map(|(left, right)| left.merge(right))
            .collect();
        Some(OperandStack { slots })
    }
}

impl<T> FromIterator<ValueSlot<T>> for OperandStack<T> {
    fn from_iter<I: IntoIterator<Item = ValueSlot<T>>>(iter: I) -> Self {
        OperandStack {
            slots: iter.into_iter().collect(),
        }
    }
}

/// Simulated local variables
///
/// A `long` or `double` stored at index `i` also claims index `i + 1`, which then reads as
/// unknown.
#[derive(Clone, PartialEq, Debug)]
pub struct Locals<T> {
    slots: BTreeMap<u16, ValueSlot<T>>,
}

impl<T> Default for Locals<T> {
    fn default() -> Self {
        Locals {
            slots: BTreeMap::new(),
        }
    }
}

impl<T> Locals<T> {
    /// Value stored at an index, if anything is known about it
    pub fn get(&self, index: u16) -> Option<&ValueSlot<T>> {
        self.slots.get(&index)
    }

    /// Indices holding a known value, with their values
    pub fn iter(&self) -> impl Iterator<Item = (u16, &ValueSlot<T>)> {
        self.slots.iter().map(|(idx, slot)| (*idx, slot))
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Replace whatever was at the index
    pub fn store(&mut self, index: u16, slot: ValueSlot<T>) {
        if slot.is_category2() {
            if let Some(next) = index.checked_add(1) {
                self.slots.remove(&next);
            }
        }
        if let Some(previous) = index.checked_sub(1) {
            if self.slots.get(&previous).map_or(false, ValueSlot::is_category2) {
                self.slots.remove(&previous);
            }
        }
        self.slots.insert(index, slot);
    }
}

impl<T: Clone> Locals<T> {
    pub(crate) fn without_provenance(&self) -> Locals<T> {
        let mut locals = self.clone();
        for slot in locals.slots.values_mut() {
            slot.clear_provenance();
        }
        locals
    }
}

impl<T: Clone + PartialEq> Locals<T> {
    /// Index-wise merge: a local known on only one side becomes unknown
    pub fn merge(&self, other: &Locals<T>) -> Locals<T> {
        let slots = self
            .slots
            .iter()
            .filter_map(|(idx, left)| {
                other
                    .slots
                    .get(idx)
                    .map(|right| (*idx, left.merge(right)))
            })
            .collect();
        Locals { slots }
    }
}

/// Stack and locals at one point in a method
#[derive(Clone, PartialEq, Debug)]
pub struct Frame<T> {
    pub stack: OperandStack<T>,
    pub locals: Locals<T>,
}

impl<T> Default for Frame<T> {
    fn default() -> Self {
        Frame {
            stack: OperandStack::default(),
            locals: Locals::default(),
        }
    }
}

impl<T> Frame<T> {
    /// Frame on entry to a method: empty stack, with `this` and the parameters in the locals
    ///
    ///   * `this_class` - `None` for static methods
    ///   * `descriptor` - types of the parameters
    ///
    pub fn method_entry(this_class: Option<&BinaryName>, descriptor: &MethodDescriptor) -> Frame<T> {
        let mut locals = Locals::default();
        let mut index: u16 = 0;
        if let Some(class) = this_class {
            locals.store(index, ValueSlot::of_type(FieldType::object(class.clone())));
            index += 1;
        }
        for parameter in &descriptor.parameters {
            let width = parameter.width() as u16;
            locals.store(index, ValueSlot::of_type(parameter.clone()));
            index = index.saturating_add(width);
        }
        Frame {
            stack: OperandStack::default(),
            locals,
        }
    }
}

impl<T: Clone + PartialEq> Frame<T> {
    /// Merge frames meeting at a join point
    ///
    /// When the stack depths disagree the flow is too irregular to line slots up, so `other` is
    /// kept with its producers and tags dropped.
    pub fn merge(&self, other: &Frame<T>) -> Frame<T> {
        match self.stack.merge(&other.stack) {
            Some(stack) => Frame {
                stack,
                locals: self.locals.merge(&other.locals),
            },
            None => Frame {
                stack: other.stack.without_provenance(),
                locals: other.locals.without_provenance(),
            },
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::analysis::ConstantValue;
    use crate::jvm::ParseDescriptor;

    #[test]
    fn pop_underflow() {
        let mut stack: OperandStack<()> = OperandStack::default();
        stack.push(ValueSlot::of_type(FieldType::int()));
        assert_eq!(
            stack.pop_n(2, Offset(7)),
            Err(SimulationError::StackUnderflow {
                offset: Offset(7),
                needed: 2,
                depth: 1
            })
        );
        assert_eq!(stack.depth(), 1);
        assert!(stack.pop(Offset(8)).is_ok());
        assert!(stack.pop(Offset(9)).is_err());
    }

    #[test]
    fn peek_from_top() {
        let stack: OperandStack<()> = vec![
            ValueSlot::constant(ConstantValue::Int(1)),
            ValueSlot::constant(ConstantValue::Int(2)),
        ]
        .into_iter()
        .collect();
        assert_eq!(
            stack.peek(0).and_then(|slot| slot.constant.clone()),
            Some(ConstantValue::Int(2))
        );
        assert_eq!(
            stack.peek(1).and_then(|slot| slot.constant.clone()),
            Some(ConstantValue::Int(1))
        );
        assert!(stack.peek(2).is_none());
    }

    #[test]
    fn wide_locals() {
        let mut locals: Locals<()> = Locals::default();
        locals.store(1, ValueSlot::of_type(FieldType::int()));
        locals.store(2, ValueSlot::of_type(FieldType::int()));

        // A long at 1 claims 2
        locals.store(1, ValueSlot::of_type(FieldType::long()));
        assert!(locals.get(2).is_none());

        // Storing at 2 breaks the long at 1
        locals.store(2, ValueSlot::of_type(FieldType::int()));
        assert!(locals.get(1).is_none());
        assert!(locals.get(2).is_some());
    }

    #[test]
    fn method_entry() {
        let descriptor = MethodDescriptor::parse("(JLjava/lang/String;)V").unwrap();
        let frame: Frame<()> = Frame::method_entry(Some(&BinaryName::OBJECT), &descriptor);
        assert_eq!(
            frame.locals.get(0).and_then(ValueSlot::class_name),
            Some(&BinaryName::OBJECT)
        );
        assert_eq!(
            frame.locals.get(1).and_then(|slot| slot.declared_type.clone()),
            Some(FieldType::long())
        );
        assert!(frame.locals.get(2).is_none());
        assert_eq!(
            frame.locals.get(3).and_then(ValueSlot::class_name),
            Some(&BinaryName::STRING)
        );

        let frame: Frame<()> = Frame::method_entry(None, &descriptor);
        assert_eq!(
            frame.locals.get(0).and_then(|slot| slot.declared_type.clone()),
            Some(FieldType::long())
        );
    }

    #[test]
    fn merge_mismatched_depths() {
        let mut tagged: ValueSlot<u8> = ValueSlot::of_type(FieldType::int());
        tagged.tag = Some(3);
        let left: Frame<u8> = Frame::default();
        let right = Frame {
            stack: vec![tagged].into_iter().collect(),
            locals: Locals::default(),
        };
        let merged = left.merge(&right);
        assert_eq!(merged.stack.depth(), 1);
        assert_eq!(merged.stack.top().and_then(|slot| slot.tag), None);
    }
}
