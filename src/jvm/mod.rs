//! Read JVM classes
//!
//! This covers what it takes to go from the bytes of a `.class` file to the instructions of its
//! methods:
//!
//!   - [`class_file`] reads the class file structure and its constant pool
//!   - [`code`] decodes method bodies into [`code::Instruction`]s
//!   - names and descriptors (`java/lang/String`, `(ILjava/lang/String;)V`) are parsed into
//!     [`BinaryName`], [`UnqualifiedName`], [`FieldType`], and [`MethodDescriptor`]
//!
//! ```
//! use opstack::jvm::*;
//!
//! let descriptor = MethodDescriptor::parse("(ILjava/lang/String;)V").unwrap();
//! assert_eq!(descriptor.parameters.len(), 2);
//! assert_eq!(descriptor.return_type, None);
//! assert_eq!(descriptor.render(), "(ILjava/lang/String;)V");
//! ```

mod access_flags;
pub mod class_file;
pub mod code;
mod descriptors;
mod errors;
mod names;

pub use access_flags::*;
pub use descriptors::*;
pub use errors::*;
pub use names::*;
