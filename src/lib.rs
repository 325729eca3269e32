//! Operand stack simulation for JVM bytecode, and bug pattern detectors built on top of it
//!
//! The crate is layered:
//!
//!   - [`jvm`] reads class files and decodes method bodies into instructions
//!   - [`analysis`] replays those instructions over a symbolic operand stack and locals
//!   - [`detect`] hooks pattern detectors into the replay and reports what they find

pub mod analysis;
pub mod detect;
pub mod jvm;
pub mod settings;
pub mod util;
