//! Reading the [`class` file format of the JVM][0]
//!
//! Only the parts needed to analyse method bodies are kept: the constant pool, the class names,
//! and the methods (whose `Code` attributes are decoded on demand). Fields and most attributes
//! are skipped over.
//!
//! [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html

mod class;
mod constants;
mod method;
mod version;

pub use class::*;
pub use constants::*;
pub use method::*;
pub use version::*;

use crate::jvm::Error;
use byteorder::{BigEndian, ReadBytesExt};
use std::io::Read;

/// Raw attribute: the name is resolved, the contents are left unparsed
#[derive(Clone, Debug)]
pub(crate) struct RawAttribute {
    pub name: String,
    pub info: Vec<u8>,
}

/// Read an `attributes_count` followed by that many attributes
pub(crate) fn read_attributes<R: Read>(
    reader: &mut R,
    constants: &ConstantPool,
) -> Result<Vec<RawAttribute>, Error> {
    let count = reader.read_u16::<BigEndian>()?;
    let mut attributes = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let name_index = ConstantIndex(reader.read_u16::<BigEndian>()?);
        let name = constants.utf8(name_index)?.to_owned();

        // Attribute info length is 4 bytes
        let len = reader.read_u32::<BigEndian>()? as usize;
        let mut info = vec![0; len];
        reader.read_exact(&mut info)?;
        attributes.push(RawAttribute { name, info });
    }
    Ok(attributes)
}
