use super::{Frame, ValueSlot};
use crate::jvm::code::{Code, Instruction};
use crate::jvm::{BinaryName, FieldType};
use crate::util::Offset;
use std::collections::BTreeMap;

/// Where the normalizer is within a method
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum NormalizerState {
    /// No control flow is waiting to join up
    Entering,

    /// Some forward branches have not reached their targets yet
    InTernary { pending: usize },
}

/// Reconciles the frames of paths that join back up, such as the two arms of `c ? a : b`
///
/// The simulation is a single pass over the instructions in order, so a value produced in one
/// arm of a conditional would otherwise be stacked on top of the value from the other arm.
/// Instead, the frame flowing along each forward branch is recorded against the branch target.
/// Once the simulation reaches the target, the recorded frame is merged with the fall-through
/// frame (or replaces it if the previous instruction doesn't fall through).
///
/// Backward branches are not followed.
#[derive(Debug)]
pub struct TernaryNormalizer<T> {
    /// Frames recorded for offsets not reached yet
    joins: BTreeMap<Offset, Frame<T>>,

    /// Whether the previous instruction can fall through to the next one
    reachable: bool,

    /// With merging off, a reachable join point keeps the fall-through frame as is
    merge_joins: bool,
}

impl<T: Clone + PartialEq> TernaryNormalizer<T> {
    pub fn new(merge_joins: bool) -> TernaryNormalizer<T> {
        TernaryNormalizer {
            joins: BTreeMap::new(),
            reachable: true,
            merge_joins,
        }
    }

    /// Forget everything from the previous method
    pub fn reset(&mut self) {
        self.joins.clear();
        self.reachable = true;
    }

    pub fn state(&self) -> NormalizerState {
        if self.joins.is_empty() {
            NormalizerState::Entering
        } else {
            NormalizerState::InTernary {
                pending: self.joins.len(),
            }
        }
    }

    /// Fix up the frame on arrival at an instruction of `code`
    pub fn before_effect(&mut self, code: &Code, offset: Offset, frame: &mut Frame<T>) {
        // Targets skipped over (eg. a branch into the middle of an instruction) never join
        let stale: Vec<Offset> = self.joins.range(..offset).map(|(off, _)| *off).collect();
        for off in stale {
            log::trace!("Dropping join at {} (passed)", off);
            self.joins.remove(&off);
        }

        match self.joins.remove(&offset) {
            Some(joined) if !self.reachable => {
                log::trace!("Adopting frame recorded for {}", offset);
                *frame = joined;
            }
            Some(joined) => {
                if self.merge_joins {
                    log::trace!("Merging frames at {}", offset);
                    *frame = joined.merge(frame);
                }
            }
            None if !self.reachable => {
                frame.stack.clear();
                if let Some(handler) = code.handler_at(offset) {
                    let caught = handler
                        .catch_type
                        .clone()
                        .unwrap_or(BinaryName::THROWABLE);
                    log::trace!("Entering handler for {} at {}", caught, offset);
                    frame.stack.push(ValueSlot::of_type(FieldType::object(caught)));
                }
            }
            None => (),
        }
        self.reachable = true;
    }

    /// Record the frame flowing out along forward branches
    pub fn after_effect(&mut self, offset: Offset, instruction: &Instruction, frame: &Frame<T>) {
        for target in instruction.jump_targets() {
            if target <= offset {
                continue;
            }
            let mut flowing = frame.clone();
            if let Instruction::Jsr(_) = instruction {
                // The subroutine starts with the return address on the stack
                flowing.stack.push(ValueSlot::unknown());
            }
            let merged = match self.joins.get(&target) {
                Some(existing) => existing.merge(&flowing),
                None => flowing,
            };
            self.joins.insert(target, merged);
        }
        self.reachable = instruction.falls_through();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::analysis::ConstantValue;
    use crate::jvm::code::{Comparison, ExceptionHandler};

    fn string(value: &str) -> ValueSlot<u8> {
        ValueSlot::constant(ConstantValue::String(value.to_owned()))
    }

    #[test]
    fn ternary_merge() {
        let mut normalizer: TernaryNormalizer<u8> = TernaryNormalizer::new(true);
        let code = Code::default();
        let mut frame: Frame<u8> = Frame::default();

        // ifeq 8
        normalizer.before_effect(&code, Offset(1), &mut frame);
        normalizer.after_effect(Offset(1), &Instruction::If(Comparison::Eq, Offset(8)), &frame);
        assert_eq!(normalizer.state(), NormalizerState::InTernary { pending: 1 });

        // ldc "a"; goto 10
        normalizer.before_effect(&code, Offset(4), &mut frame);
        frame.stack.push(string("a"));
        normalizer.before_effect(&code, Offset(6), &mut frame);
        normalizer.after_effect(Offset(6), &Instruction::Goto(Offset(10)), &frame);
        assert_eq!(normalizer.state(), NormalizerState::InTernary { pending: 2 });

        // ldc "b" (unreachable, so the frame from `ifeq` is adopted)
        normalizer.before_effect(&code, Offset(8), &mut frame);
        assert!(frame.stack.is_empty());
        frame.stack.push(string("b"));

        // join point
        normalizer.before_effect(&code, Offset(10), &mut frame);
        assert_eq!(normalizer.state(), NormalizerState::Entering);
        assert_eq!(frame.stack.depth(), 1);
        let top = frame.stack.top().unwrap();
        assert_eq!(top.constant, None);
        assert_eq!(top.class_name(), Some(&BinaryName::STRING));
    }

    #[test]
    fn handler_entry() {
        let code = Code {
            exception_handlers: vec![ExceptionHandler {
                start: Offset(0),
                end: Offset(4),
                handler: Offset(5),
                catch_type: None,
            }],
            ..Code::default()
        };
        let mut normalizer: TernaryNormalizer<u8> = TernaryNormalizer::new(true);
        let mut frame: Frame<u8> = Frame::default();
        frame.stack.push(string("left over"));
        normalizer.after_effect(Offset(4), &Instruction::Return(None), &frame);
        normalizer.before_effect(&code, Offset(5), &mut frame);
        assert_eq!(frame.stack.depth(), 1);
        assert_eq!(
            frame.stack.top().and_then(ValueSlot::class_name),
            Some(&BinaryName::THROWABLE)
        );
    }

    #[test]
    fn backward_branches_ignored() {
        let mut normalizer: TernaryNormalizer<u8> = TernaryNormalizer::new(true);
        let frame: Frame<u8> = Frame::default();
        normalizer.after_effect(Offset(9), &Instruction::Goto(Offset(2)), &frame);
        assert_eq!(normalizer.state(), NormalizerState::Entering);
    }
}
