//! Symbolic simulation of the operand stack and local variables
//!
//! Pattern detectors need to know where the values flowing into an instruction come from: which
//! call produced them, whether they are literals, what their declared type is. The
//! [`Simulator`] answers these questions by replaying a method's instructions in a single linear
//! pass over a [`Frame`] of [`ValueSlot`]s, resolving constant pool references through a
//! [`Resolver`].
//!
//! Detectors plug in through the [`Detector`] trait. Besides reading the frame, they can attach
//! a tag of their choosing to the value an instruction just produced. Tags then travel with the
//! value through loads, stores, and `dup`s, until the value is consumed or paths merge
//! ambiguously.
//!
//! The pass does not compute a fixed point over loops. Where forward branches join back up,
//! the [`TernaryNormalizer`] merges the frames from both sides, keeping only what they agree on.

mod errors;
mod frame;
mod hooks;
mod resolver;
mod simulator;
mod slot;
mod ternary;

pub use errors::*;
pub use frame::*;
pub use hooks::*;
pub use resolver::*;
pub use simulator::*;
pub use slot::*;
pub use ternary::*;
