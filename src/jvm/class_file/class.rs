use super::{read_attributes, ConstantIndex, ConstantPool, Method, RawAttribute, Version};
use crate::jvm::{BinaryName, ClassAccessFlags, Error, Name};
use byteorder::{BigEndian, ReadBytesExt};
use std::io::{Cursor, Read};

/// Class file, as much of it as is needed to analyse its methods
#[derive(Debug)]
pub struct ClassFile {
    pub version: Version,
    pub constants: ConstantPool,
    pub access_flags: ClassAccessFlags,
    pub this_class: BinaryName,
    pub super_class: Option<BinaryName>,
    pub interfaces: Vec<BinaryName>,
    pub methods: Vec<Method>,

    /// Contents of the `SourceFile` attribute
    pub source_file: Option<String>,
}

impl ClassFile {
    /// Magic header bytes that go at the front of the serialized class file
    pub const MAGIC: [u8; 4] = [0xCA, 0xFE, 0xBA, 0xBE];

    pub fn parse(bytes: &[u8]) -> Result<ClassFile, Error> {
        ClassFile::read(&mut Cursor::new(bytes))
    }

    pub fn read<R: Read>(reader: &mut R) -> Result<ClassFile, Error> {
        let magic = reader.read_u32::<BigEndian>()?;
        if magic != u32::from_be_bytes(ClassFile::MAGIC) {
            return Err(Error::BadMagic(magic));
        }
        let version = Version::read(reader)?;
        let constants = ConstantPool::parse(reader)?;
        let access_flags = ClassAccessFlags::from_bits_truncate(reader.read_u16::<BigEndian>()?);

        let this_class = read_class_name(reader, &constants)?;
        let super_class = match reader.read_u16::<BigEndian>()? {
            0 => None,
            idx => Some(class_name(&constants, ConstantIndex(idx))?),
        };
        let interface_count = reader.read_u16::<BigEndian>()?;
        let mut interfaces = Vec::with_capacity(interface_count as usize);
        for _ in 0..interface_count {
            interfaces.push(read_class_name(reader, &constants)?);
        }

        // Fields are irrelevant to method analysis
        let field_count = reader.read_u16::<BigEndian>()?;
        for _ in 0..field_count {
            let mut header = [0; 6];
            reader.read_exact(&mut header)?;
            read_attributes(reader, &constants)?;
        }

        let method_count = reader.read_u16::<BigEndian>()?;
        let mut methods = Vec::with_capacity(method_count as usize);
        for _ in 0..method_count {
            methods.push(Method::read(reader, &constants)?);
        }

        let mut source_file = None;
        for RawAttribute { name, info } in read_attributes(reader, &constants)? {
            if name == "SourceFile" {
                let index = Cursor::new(&info)
                    .read_u16::<BigEndian>()
                    .map_err(|_| Error::BadAttribute(name.clone()))?;
                source_file = Some(constants.utf8(ConstantIndex(index))?.to_owned());
            }
        }

        log::debug!(
            "Read class {} (version {}, {} methods)",
            this_class,
            version,
            methods.len()
        );

        Ok(ClassFile {
            version,
            constants,
            access_flags,
            this_class,
            super_class,
            interfaces,
            methods,
            source_file,
        })
    }
}

fn class_name(constants: &ConstantPool, index: ConstantIndex) -> Result<BinaryName, Error> {
    let name = constants.class_name(index)?;
    BinaryName::from_string(name.to_owned()).map_err(Error::MalformedName)
}

fn read_class_name<R: Read>(reader: &mut R, constants: &ConstantPool) -> Result<BinaryName, Error> {
    let index = ConstantIndex(reader.read_u16::<BigEndian>()?);
    class_name(constants, index)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn bad_magic() {
        match ClassFile::parse(&[0xde, 0xad, 0xbe, 0xef, 0, 0, 0, 52]) {
            Err(Error::BadMagic(0xdeadbeef)) => (),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn truncated() {
        match ClassFile::parse(&[0xCA, 0xFE, 0xBA, 0xBE, 0, 0]) {
            Err(Error::IoError(_)) => (),
            other => panic!("unexpected {:?}", other),
        }
    }
}
