use crate::jvm::Error;
use byteorder::{BigEndian, ReadBytesExt};
use std::io::Read;

/// Index into the constant pool
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct ConstantIndex(pub u16);

/// Constant pool entry
///
/// References to other entries are kept as raw indices. Accessors on [`ConstantPool`] follow
/// them and check that they point at the right kind of entry.
#[derive(Clone, Debug, PartialEq)]
pub enum Constant {
    Utf8(String),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    Class(ConstantIndex),
    String(ConstantIndex),
    FieldRef {
        class: ConstantIndex,
        name_and_type: ConstantIndex,
    },
    MethodRef {
        class: ConstantIndex,
        name_and_type: ConstantIndex,
    },
    InterfaceMethodRef {
        class: ConstantIndex,
        name_and_type: ConstantIndex,
    },
    NameAndType {
        name: ConstantIndex,
        descriptor: ConstantIndex,
    },
    MethodHandle {
        kind: u8,
        reference: ConstantIndex,
    },
    MethodType(ConstantIndex),
    Dynamic {
        bootstrap_method: u16,
        name_and_type: ConstantIndex,
    },
    InvokeDynamic {
        bootstrap_method: u16,
        name_and_type: ConstantIndex,
    },
    Module(ConstantIndex),
    Package(ConstantIndex),

    /// Placeholder for index 0 and the slot following a `Long` or a `Double`
    Unusable,
}

impl Constant {
    /// Number of pool indices the constant occupies
    fn width(&self) -> usize {
        match self {
            Constant::Long(_) | Constant::Double(_) => 2,
            _ => 1,
        }
    }
}

/// Parsed constant pool of a class file
#[derive(Clone, Debug, Default)]
pub struct ConstantPool {
    constants: Vec<Constant>,
}

fn read_index<R: Read>(reader: &mut R) -> std::io::Result<ConstantIndex> {
    reader.read_u16::<BigEndian>().map(ConstantIndex)
}

impl ConstantPool {
    /// Build a pool out of entries (index 1 is the first entry)
    pub fn from_entries(entries: Vec<Constant>) -> ConstantPool {
        let mut constants = vec![Constant::Unusable];
        for entry in entries {
            let width = entry.width();
            constants.push(entry);
            if width == 2 {
                constants.push(Constant::Unusable);
            }
        }
        ConstantPool { constants }
    }

    /// Read `constant_pool_count` followed by the pool entries
    pub fn parse<R: Read>(reader: &mut R) -> Result<ConstantPool, Error> {
        let count = reader.read_u16::<BigEndian>()? as usize;
        let mut constants = Vec::with_capacity(count);
        constants.push(Constant::Unusable);

        while constants.len() < count {
            let index = ConstantIndex(constants.len() as u16);
            let tag = reader.read_u8()?;
            let constant = match tag {
                1 => {
                    let len = reader.read_u16::<BigEndian>()? as usize;
                    let mut bytes = vec![0; len];
                    reader.read_exact(&mut bytes)?;
                    Constant::Utf8(decode_modified_utf8(&bytes))
                }
                3 => Constant::Integer(reader.read_i32::<BigEndian>()?),
                4 => Constant::Float(reader.read_f32::<BigEndian>()?),
                5 => Constant::Long(reader.read_i64::<BigEndian>()?),
                6 => Constant::Double(reader.read_f64::<BigEndian>()?),
                7 => Constant::Class(read_index(reader)?),
                8 => Constant::String(read_index(reader)?),
                9 => Constant::FieldRef {
                    class: read_index(reader)?,
                    name_and_type: read_index(reader)?,
                },
                10 => Constant::MethodRef {
                    class: read_index(reader)?,
                    name_and_type: read_index(reader)?,
                },
                11 => Constant::InterfaceMethodRef {
                    class: read_index(reader)?,
                    name_and_type: read_index(reader)?,
                },
                12 => Constant::NameAndType {
                    name: read_index(reader)?,
                    descriptor: read_index(reader)?,
                },
                15 => Constant::MethodHandle {
                    kind: reader.read_u8()?,
                    reference: read_index(reader)?,
                },
                16 => Constant::MethodType(read_index(reader)?),
                17 => Constant::Dynamic {
                    bootstrap_method: reader.read_u16::<BigEndian>()?,
                    name_and_type: read_index(reader)?,
                },
                18 => Constant::InvokeDynamic {
                    bootstrap_method: reader.read_u16::<BigEndian>()?,
                    name_and_type: read_index(reader)?,
                },
                19 => Constant::Module(read_index(reader)?),
                20 => Constant::Package(read_index(reader)?),
                _ => return Err(Error::BadConstantTag { index, tag }),
            };

            let width = constant.width();
            constants.push(constant);
            if width == 2 {
                constants.push(Constant::Unusable);
            }
        }

        Ok(ConstantPool { constants })
    }

    /// Number of indices in the pool (this is `constant_pool_count`, so one more than the last
    /// valid index)
    pub fn len(&self) -> usize {
        self.constants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constants.len() <= 1
    }

    /// Look up an entry, skipping index 0 and the unusable second halves of wide entries
    pub fn get(&self, index: ConstantIndex) -> Option<&Constant> {
        match self.constants.get(index.0 as usize) {
            None | Some(Constant::Unusable) => None,
            Some(constant) => Some(constant),
        }
    }

    pub fn utf8(&self, index: ConstantIndex) -> Result<&str, Error> {
        match self.get(index) {
            Some(Constant::Utf8(string)) => Ok(string),
            _ => Err(Error::BadConstantIndex {
                index,
                expected: "utf8",
            }),
        }
    }

    /// Name stored in a `CONSTANT_Class` entry
    pub fn class_name(&self, index: ConstantIndex) -> Result<&str, Error> {
        match self.get(index) {
            Some(Constant::Class(name)) => self.utf8(*name),
            _ => Err(Error::BadConstantIndex {
                index,
                expected: "class",
            }),
        }
    }

    /// Name and descriptor stored in a `CONSTANT_NameAndType` entry
    pub fn name_and_type(&self, index: ConstantIndex) -> Result<(&str, &str), Error> {
        match self.get(index) {
            Some(Constant::NameAndType { name, descriptor }) => {
                Ok((self.utf8(*name)?, self.utf8(*descriptor)?))
            }
            _ => Err(Error::BadConstantIndex {
                index,
                expected: "name and type",
            }),
        }
    }

    /// Owner class, name, and descriptor of a field or method reference
    pub fn member(&self, index: ConstantIndex) -> Result<(&str, &str, &str), Error> {
        match self.get(index) {
            Some(
                Constant::FieldRef {
                    class,
                    name_and_type,
                }
                | Constant::MethodRef {
                    class,
                    name_and_type,
                }
                | Constant::InterfaceMethodRef {
                    class,
                    name_and_type,
                },
            ) => {
                let class = self.class_name(*class)?;
                let (name, descriptor) = self.name_and_type(*name_and_type)?;
                Ok((class, name, descriptor))
            }
            _ => Err(Error::BadConstantIndex {
                index,
                expected: "member reference",
            }),
        }
    }
}

/// Decode the "modified UTF-8" used in class files
///
/// It differs from standard UTF-8 in that `\0` is encoded on two bytes and supplementary
/// characters are encoded as surrogate pairs (each surrogate on three bytes). Invalid sequences
/// are replaced with `U+FFFD`.
pub fn decode_modified_utf8(bytes: &[u8]) -> String {
    if let Ok(string) = std::str::from_utf8(bytes) {
        if !bytes.contains(&0xc0) && !bytes.contains(&0xed) {
            return string.to_owned();
        }
    }

    let mut units: Vec<u16> = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i] as u16;
        if b & 0x80 == 0 {
            units.push(b);
            i += 1;
        } else if b & 0xe0 == 0xc0 && i + 1 < bytes.len() {
            units.push(((b & 0x1f) << 6) | (bytes[i + 1] as u16 & 0x3f));
            i += 2;
        } else if b & 0xf0 == 0xe0 && i + 2 < bytes.len() {
            units.push(
                ((b & 0x0f) << 12)
                    | ((bytes[i + 1] as u16 & 0x3f) << 6)
                    | (bytes[i + 2] as u16 & 0x3f),
            );
            i += 3;
        } else {
            units.push(0xfffd);
            i += 1;
        }
    }
    String::from_utf16_lossy(&units)
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn parse_pool() {
        let mut bytes: Vec<u8> = vec![0x00, 0x07];
        bytes.extend_from_slice(&[1, 0x00, 0x03]);
        bytes.extend_from_slice(b"Foo");
        bytes.extend_from_slice(&[7, 0x00, 0x01]);
        bytes.extend_from_slice(&[5]);
        bytes.extend_from_slice(&42i64.to_be_bytes());
        bytes.extend_from_slice(&[8, 0x00, 0x01]);
        bytes.extend_from_slice(&[3]);
        bytes.extend_from_slice(&(-7i32).to_be_bytes());

        let pool = ConstantPool::parse(&mut Cursor::new(bytes)).unwrap();
        assert_eq!(pool.len(), 7);
        assert_eq!(pool.utf8(ConstantIndex(1)).unwrap(), "Foo");
        assert_eq!(pool.class_name(ConstantIndex(2)).unwrap(), "Foo");
        assert_eq!(pool.get(ConstantIndex(3)), Some(&Constant::Long(42)));
        assert_eq!(pool.get(ConstantIndex(4)), None);
        assert_eq!(
            pool.get(ConstantIndex(5)),
            Some(&Constant::String(ConstantIndex(1)))
        );
        assert_eq!(pool.get(ConstantIndex(6)), Some(&Constant::Integer(-7)));
        assert!(pool.class_name(ConstantIndex(1)).is_err());
        assert!(pool.get(ConstantIndex(0)).is_none());
    }

    #[test]
    fn bad_tag() {
        let bytes: Vec<u8> = vec![0x00, 0x02, 2, 0x00];
        match ConstantPool::parse(&mut Cursor::new(bytes)) {
            Err(Error::BadConstantTag { index, tag }) => {
                assert_eq!(index, ConstantIndex(1));
                assert_eq!(tag, 2);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn modified_utf8() {
        assert_eq!(decode_modified_utf8(b"plain"), "plain");
        assert_eq!(decode_modified_utf8(&[b'a', 0xc0, 0x80, b'b']), "a\u{0}b");
        // U+1F600 as a surrogate pair, each surrogate on three bytes
        let smiley = [0xed, 0xa0, 0xbd, 0xed, 0xb8, 0x80];
        assert_eq!(decode_modified_utf8(&smiley), "\u{1F600}");
    }
}
