//! Bytecode representation and decoding
//!
//! Method bodies live in the [`Code`] attribute of a method. The raw bytes get decoded into an
//! ordered list of [`Instruction`]s, each addressed by its [`Offset`] in the code array, which is
//! the input consumed by [`crate::analysis::Simulator`].
//!
//! [0]: https://docs.oracle.com/javase/specs/jvms/se18/html/jvms-6.html#jvms-6.5

mod decoder;
mod instructions;

pub use decoder::*;
pub use instructions::*;

use crate::jvm::BinaryName;
use crate::util::Offset;

/// Entry of a method's exception table
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExceptionHandler {
    /// Start of the protected range (inclusive)
    pub start: Offset,

    /// End of the protected range (exclusive)
    pub end: Offset,

    /// Start of the handler code
    pub handler: Offset,

    /// Class of exceptions caught, `None` for `finally` blocks
    pub catch_type: Option<BinaryName>,
}

/// Decoded body of a method
#[derive(Clone, Debug, Default)]
pub struct Code {
    pub max_stack: u16,
    pub max_locals: u16,
    pub instructions: Vec<(Offset, Instruction)>,
    pub exception_handlers: Vec<ExceptionHandler>,

    /// Start offsets of source lines, sorted by offset
    pub line_numbers: Vec<(Offset, u16)>,
}

impl Code {
    /// Source line of the instruction at the given offset, if line numbers are known
    pub fn line_number(&self, offset: Offset) -> Option<u16> {
        let idx = self
            .line_numbers
            .partition_point(|(start, _)| *start <= offset);
        idx.checked_sub(1).map(|idx| self.line_numbers[idx].1)
    }

    /// Whether any instruction in the body matches the predicate
    ///
    /// Detectors use this to skip methods that can't possibly exhibit their pattern.
    pub fn contains(&self, predicate: impl Fn(&Instruction) -> bool) -> bool {
        self.instructions.iter().any(|(_, insn)| predicate(insn))
    }

    /// Exception handler starting exactly at the given offset
    pub fn handler_at(&self, offset: Offset) -> Option<&ExceptionHandler> {
        self.exception_handlers
            .iter()
            .find(|handler| handler.handler == offset)
    }
}
