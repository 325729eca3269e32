use super::{read_attributes, ConstantIndex, ConstantPool, RawAttribute};
use crate::jvm::code::{decode, Code, DecodeError, ExceptionHandler};
use crate::jvm::{
    BinaryName, Error, MethodAccessFlags, MethodDescriptor, Name, ParseDescriptor,
    RenderDescriptor, UnqualifiedName,
};
use crate::util::Offset;
use byteorder::{BigEndian, ReadBytesExt};
use std::io::{Cursor, Read};

/// Method declared by a class or interface
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.6
#[derive(Clone, Debug)]
pub struct Method {
    pub access_flags: MethodAccessFlags,
    pub name: UnqualifiedName,
    pub descriptor: MethodDescriptor,

    /// Body of the method, absent for `abstract` and `native` methods
    pub code: Option<CodeAttribute>,
}

/// Contents of a `Code` attribute, with the bytecode still encoded
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7.3
#[derive(Clone, Debug, Default)]
pub struct CodeAttribute {
    pub max_stack: u16,
    pub max_locals: u16,
    pub bytes: Vec<u8>,
    pub exception_handlers: Vec<ExceptionHandler>,
    pub line_numbers: Vec<(Offset, u16)>,
}

impl Method {
    pub(crate) fn read<R: Read>(reader: &mut R, constants: &ConstantPool) -> Result<Method, Error> {
        let access_flags = MethodAccessFlags::from_bits_truncate(reader.read_u16::<BigEndian>()?);
        let name = constants.utf8(ConstantIndex(reader.read_u16::<BigEndian>()?))?;
        let name = UnqualifiedName::from_string(name.to_owned()).map_err(Error::MalformedName)?;
        let descriptor = constants.utf8(ConstantIndex(reader.read_u16::<BigEndian>()?))?;
        let descriptor = MethodDescriptor::parse(descriptor)
            .map_err(|err| Error::BadDescriptor(format!("{}: {}", descriptor, err)))?;

        let mut code = None;
        for RawAttribute { name, info } in read_attributes(reader, constants)? {
            if name == "Code" {
                code = Some(CodeAttribute::read(&mut Cursor::new(info), constants)?);
            }
        }

        Ok(Method {
            access_flags,
            name,
            descriptor,
            code,
        })
    }

    /// Name and descriptor, as in `indexOf(Ljava/lang/String;)I`
    pub fn signature(&self) -> String {
        format!("{}{}", self.name, self.descriptor.render())
    }

    /// Decode the method body
    ///
    /// Returns `None` if the method has no body.
    pub fn decode_code(&self) -> Option<Result<Code, DecodeError>> {
        self.code.as_ref().map(CodeAttribute::decode)
    }
}

impl CodeAttribute {
    fn read<R: Read>(reader: &mut R, constants: &ConstantPool) -> Result<CodeAttribute, Error> {
        let max_stack = reader.read_u16::<BigEndian>()?;
        let max_locals = reader.read_u16::<BigEndian>()?;
        let code_length = reader.read_u32::<BigEndian>()? as usize;
        let mut bytes = vec![0; code_length];
        reader
            .read_exact(&mut bytes)
            .map_err(|_| Error::BadAttribute(String::from("Code")))?;

        let handler_count = reader.read_u16::<BigEndian>()?;
        let mut exception_handlers = Vec::with_capacity(handler_count as usize);
        for _ in 0..handler_count {
            let start = Offset(reader.read_u16::<BigEndian>()? as usize);
            let end = Offset(reader.read_u16::<BigEndian>()? as usize);
            let handler = Offset(reader.read_u16::<BigEndian>()? as usize);
            let catch_type = match reader.read_u16::<BigEndian>()? {
                0 => None,
                idx => {
                    let name = constants.class_name(ConstantIndex(idx))?;
                    Some(
                        BinaryName::from_string(name.to_owned()).map_err(Error::MalformedName)?,
                    )
                }
            };
            exception_handlers.push(ExceptionHandler {
                start,
                end,
                handler,
                catch_type,
            });
        }

        let mut line_numbers = vec![];
        for RawAttribute { name, info } in read_attributes(reader, constants)? {
            if name == "LineNumberTable" {
                line_numbers.extend(read_line_numbers(&info)?);
            }
        }
        line_numbers.sort();

        Ok(CodeAttribute {
            max_stack,
            max_locals,
            bytes,
            exception_handlers,
            line_numbers,
        })
    }

    /// Decode the bytecode into instructions
    pub fn decode(&self) -> Result<Code, DecodeError> {
        Ok(Code {
            max_stack: self.max_stack,
            max_locals: self.max_locals,
            instructions: decode(&self.bytes)?,
            exception_handlers: self.exception_handlers.clone(),
            line_numbers: self.line_numbers.clone(),
        })
    }
}

fn read_line_numbers(info: &[u8]) -> Result<Vec<(Offset, u16)>, Error> {
    let malformed = |_| Error::BadAttribute(String::from("LineNumberTable"));
    let mut reader = Cursor::new(info);
    let count = reader.read_u16::<BigEndian>().map_err(malformed)?;
    let mut entries = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let start = reader.read_u16::<BigEndian>().map_err(malformed)?;
        let line = reader.read_u16::<BigEndian>().map_err(malformed)?;
        entries.push((Offset(start as usize), line));
    }
    Ok(entries)
}
