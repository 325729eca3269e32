use super::{ConstantData, FieldRef, Frame, HookError, Locals, MethodRef, OperandStack, ValueSlot};
use crate::jvm::code::{Code, Instruction};
use crate::jvm::{BinaryName, MethodAccessFlags, MethodDescriptor, RefType, UnqualifiedName};
use crate::util::Offset;
use std::fmt::Debug;

/// Method being simulated
#[derive(Clone, Copy, Debug)]
pub struct MethodContext<'a> {
    pub class: &'a BinaryName,
    pub name: &'a UnqualifiedName,
    pub descriptor: &'a MethodDescriptor,
    pub access_flags: MethodAccessFlags,
    pub code: &'a Code,
}

impl<'a> MethodContext<'a> {
    pub fn is_static(&self) -> bool {
        self.access_flags.is_static()
    }

    /// Class of `this`, or `None` in a static method
    pub fn this_class(&self) -> Option<&'a BinaryName> {
        if self.is_static() {
            None
        } else {
            Some(self.class)
        }
    }
}

/// Constant pool entry an instruction refers to, once resolved
#[derive(Clone, PartialEq, Debug)]
pub enum Resolved {
    Constant(ConstantData),
    Field(FieldRef),
    Method(MethodRef),
    Class(RefType),
}

impl Resolved {
    pub fn method(&self) -> Option<&MethodRef> {
        match self {
            Resolved::Method(method) => Some(method),
            _ => None,
        }
    }

    pub fn field(&self) -> Option<&FieldRef> {
        match self {
            Resolved::Field(field) => Some(field),
            _ => None,
        }
    }

    pub fn class(&self) -> Option<&RefType> {
        match self {
            Resolved::Class(class) => Some(class),
            _ => None,
        }
    }
}

/// View of the simulation just before an instruction takes effect
///
/// Operands are still on the stack, so this is the place to look at the arguments of a call.
pub struct BeforeEffect<'a, T> {
    pub method: &'a MethodContext<'a>,
    pub offset: Offset,
    pub instruction: &'a Instruction,

    /// `None` if the instruction has no constant pool operand or if it couldn't be resolved
    pub resolved: Option<&'a Resolved>,
    pub frame: &'a Frame<T>,
}

impl<'a, T> BeforeEffect<'a, T> {
    pub fn stack(&self) -> &'a OperandStack<T> {
        &self.frame.stack
    }

    pub fn locals(&self) -> &'a Locals<T> {
        &self.frame.locals
    }

    /// Method called by an `invoke*` instruction
    pub fn invoked(&self) -> Option<&'a MethodRef> {
        match self.instruction {
            Instruction::Invoke(_, _) | Instruction::InvokeDynamic(_) => {
                self.resolved.and_then(Resolved::method)
            }
            _ => None,
        }
    }
}

/// View of the simulation just after an instruction took effect
///
/// The only thing that can be changed is the tag on the top of the stack, which is how a
/// detector marks the value an instruction just produced.
pub struct AfterEffect<'a, T> {
    pub method: &'a MethodContext<'a>,
    pub offset: Offset,
    pub instruction: &'a Instruction,
    pub resolved: Option<&'a Resolved>,
    frame: &'a mut Frame<T>,
}

impl<'a, T> AfterEffect<'a, T> {
    pub(crate) fn new(
        method: &'a MethodContext<'a>,
        offset: Offset,
        instruction: &'a Instruction,
        resolved: Option<&'a Resolved>,
        frame: &'a mut Frame<T>,
    ) -> AfterEffect<'a, T> {
        AfterEffect {
            method,
            offset,
            instruction,
            resolved,
            frame,
        }
    }

    pub fn frame(&self) -> &Frame<T> {
        self.frame
    }

    pub fn stack(&self) -> &OperandStack<T> {
        &self.frame.stack
    }

    pub fn locals(&self) -> &Locals<T> {
        &self.frame.locals
    }

    pub fn top(&self) -> Option<&ValueSlot<T>> {
        self.frame.stack.top()
    }

    /// Method called by an `invoke*` instruction
    pub fn invoked(&self) -> Option<&'a MethodRef> {
        match self.instruction {
            Instruction::Invoke(_, _) | Instruction::InvokeDynamic(_) => {
                self.resolved.and_then(Resolved::method)
            }
            _ => None,
        }
    }

    /// Replace the tag of the top of the stack
    ///
    /// Returns `false` if the stack is empty.
    pub fn set_top_tag(&mut self, tag: T) -> bool {
        match self.frame.stack.top_mut() {
            Some(slot) => {
                slot.tag = Some(tag);
                true
            }
            None => false,
        }
    }

    /// Remove the tag of the top of the stack, returning it
    pub fn clear_top_tag(&mut self) -> Option<T> {
        self.frame.stack.top_mut().and_then(|slot| slot.tag.take())
    }
}

/// Pattern detector driven by the simulator
///
/// Each detector picks its own tag type, which the simulator carries around without looking at
/// (except to compare tags where paths merge).
pub trait Detector {
    type Tag: Clone + PartialEq + Debug;

    /// Called before a method is simulated, returning `false` skips the method
    fn visit_method(&mut self, _method: &MethodContext) -> bool {
        true
    }

    /// Called with the state before every instruction
    fn before_effect(&mut self, _event: &BeforeEffect<Self::Tag>) -> Result<(), HookError> {
        Ok(())
    }

    /// Called with the state after every instruction
    fn after_effect(&mut self, _event: &mut AfterEffect<Self::Tag>) -> Result<(), HookError> {
        Ok(())
    }

    /// Called once the whole method was simulated successfully
    fn end_method(&mut self, _method: &MethodContext) {}
}

/// Detector that does nothing, for simulating without a client
#[derive(Debug, Default)]
pub struct NoDetector;

impl Detector for NoDetector {
    type Tag = ();
}
