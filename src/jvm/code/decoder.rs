//! Decoding of the raw `code` array of a method into [`Instruction`]s
//!
//! See <https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-6.html#jvms-6.5> for the list of
//! opcodes and their operands.

use super::{
    ArithmeticOp, ArrayKind, CompareMode, Comparison, InvokeType, LocalType, NumericType,
};
use super::Instruction::{self, *};
use crate::jvm::class_file::ConstantIndex;
use crate::jvm::BaseType;
use crate::util::Offset;
use byteorder::{BigEndian, ReadBytesExt};
use std::fmt::{Display, Formatter};
use std::io::{self, Cursor};

/// Ways the bytes of a method body can fail to decode
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Opcode is reserved or not defined
    UnknownOpcode { offset: Offset, opcode: u8 },

    /// `wide` modifies an instruction that cannot be widened
    BadWide { offset: Offset, opcode: u8 },

    /// `newarray` has an unknown element type code
    BadArrayType { offset: Offset, atype: u8 },

    /// A branch target falls before the start of the code
    InvalidJump { offset: Offset, delta: i32 },

    /// The code ends in the middle of an instruction
    Truncated { offset: Offset },
}

impl Display for DecodeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeError::UnknownOpcode { offset, opcode } => {
                write!(f, "unknown opcode 0x{:02x} at {}", opcode, offset)
            }
            DecodeError::BadWide { offset, opcode } => {
                write!(f, "opcode 0x{:02x} cannot follow `wide` at {}", opcode, offset)
            }
            DecodeError::BadArrayType { offset, atype } => {
                write!(f, "invalid `newarray` type {} at {}", atype, offset)
            }
            DecodeError::InvalidJump { offset, delta } => {
                write!(f, "jump by {} at {} leaves the code", delta, offset)
            }
            DecodeError::Truncated { offset } => {
                write!(f, "code ends inside the instruction at {}", offset)
            }
        }
    }
}

impl std::error::Error for DecodeError {}

const NUMERIC_TYPES: [NumericType; 4] = [
    NumericType::Int,
    NumericType::Long,
    NumericType::Float,
    NumericType::Double,
];

const LOCAL_TYPES: [LocalType; 5] = [
    LocalType::Int,
    LocalType::Long,
    LocalType::Float,
    LocalType::Double,
    LocalType::Reference,
];

const ARRAY_KINDS: [ArrayKind; 8] = [
    ArrayKind::Int,
    ArrayKind::Long,
    ArrayKind::Float,
    ArrayKind::Double,
    ArrayKind::Reference,
    ArrayKind::Byte,
    ArrayKind::Char,
    ArrayKind::Short,
];

const COMPARISONS: [Comparison; 6] = [
    Comparison::Eq,
    Comparison::Ne,
    Comparison::Lt,
    Comparison::Ge,
    Comparison::Gt,
    Comparison::Le,
];

/// Decode an entire method body
///
/// Instructions are returned in order along with the offset at which they start.
pub fn decode(code: &[u8]) -> Result<Vec<(Offset, Instruction)>, DecodeError> {
    let mut reader = Cursor::new(code);
    let mut instructions = vec![];
    while (reader.position() as usize) < code.len() {
        let offset = Offset(reader.position() as usize);
        let insn = decode_instruction(&mut reader, offset).map_err(|err| match err {
            Decoding::Io(_) => DecodeError::Truncated { offset },
            Decoding::Invalid(err) => err,
        })?;
        log::trace!("decoded {:?} at {}", insn, offset);
        instructions.push((offset, insn));
    }
    Ok(instructions)
}

enum Decoding {
    Io(io::Error),
    Invalid(DecodeError),
}

impl From<io::Error> for Decoding {
    fn from(err: io::Error) -> Decoding {
        Decoding::Io(err)
    }
}

impl From<DecodeError> for Decoding {
    fn from(err: DecodeError) -> Decoding {
        Decoding::Invalid(err)
    }
}

fn jump(offset: Offset, delta: i32) -> Result<Offset, DecodeError> {
    offset
        .jump(delta)
        .ok_or(DecodeError::InvalidJump { offset, delta })
}

fn read_index(reader: &mut Cursor<&[u8]>) -> io::Result<ConstantIndex> {
    reader.read_u16::<BigEndian>().map(ConstantIndex)
}

fn decode_instruction(reader: &mut Cursor<&[u8]>, offset: Offset) -> Result<Instruction, Decoding> {
    let opcode = reader.read_u8()?;
    let insn = match opcode {
        0x00 => Nop,
        0x01 => AConstNull,
        0x02..=0x08 => IConst(opcode as i32 - 0x03),
        0x09 | 0x0a => LConst((opcode - 0x09) as i64),
        0x0b..=0x0d => FConst((opcode - 0x0b) as f32),
        0x0e | 0x0f => DConst((opcode - 0x0e) as f64),
        0x10 => IConst(reader.read_i8()? as i32),
        0x11 => IConst(reader.read_i16::<BigEndian>()? as i32),
        0x12 => Ldc(ConstantIndex(reader.read_u8()? as u16)),
        0x13 => Ldc(read_index(reader)?),
        0x14 => Ldc2(read_index(reader)?),
        0x15..=0x19 => Load(LOCAL_TYPES[(opcode - 0x15) as usize], reader.read_u8()? as u16),
        0x1a..=0x2d => {
            let n = opcode - 0x1a;
            Load(LOCAL_TYPES[(n / 4) as usize], (n % 4) as u16)
        }
        0x2e..=0x35 => ArrayLoad(ARRAY_KINDS[(opcode - 0x2e) as usize]),
        0x36..=0x3a => Store(LOCAL_TYPES[(opcode - 0x36) as usize], reader.read_u8()? as u16),
        0x3b..=0x4e => {
            let n = opcode - 0x3b;
            Store(LOCAL_TYPES[(n / 4) as usize], (n % 4) as u16)
        }
        0x4f..=0x56 => ArrayStore(ARRAY_KINDS[(opcode - 0x4f) as usize]),
        0x57 => Pop,
        0x58 => Pop2,
        0x59 => Dup,
        0x5a => DupX1,
        0x5b => DupX2,
        0x5c => Dup2,
        0x5d => Dup2X1,
        0x5e => Dup2X2,
        0x5f => Swap,
        0x60..=0x73 => {
            let n = opcode - 0x60;
            let op = [
                ArithmeticOp::Add,
                ArithmeticOp::Sub,
                ArithmeticOp::Mul,
                ArithmeticOp::Div,
                ArithmeticOp::Rem,
            ][(n / 4) as usize];
            Arithmetic(NUMERIC_TYPES[(n % 4) as usize], op)
        }
        0x74..=0x77 => Neg(NUMERIC_TYPES[(opcode - 0x74) as usize]),
        0x78..=0x83 => {
            let n = opcode - 0x78;
            let op = [
                ArithmeticOp::Shl,
                ArithmeticOp::Shr,
                ArithmeticOp::UShr,
                ArithmeticOp::And,
                ArithmeticOp::Or,
                ArithmeticOp::Xor,
            ][(n / 2) as usize];
            Arithmetic(NUMERIC_TYPES[(n % 2) as usize], op)
        }
        0x84 => IInc(reader.read_u8()? as u16, reader.read_i8()? as i16),
        0x85..=0x90 => {
            let n = (opcode - 0x85) as usize;
            let from = NUMERIC_TYPES[n / 3];
            let to = NUMERIC_TYPES
                .iter()
                .copied()
                .filter(|typ| *typ != from)
                .nth(n % 3)
                .unwrap_or(from);
            Convert(from, to)
        }
        0x91 => Narrow(BaseType::Byte),
        0x92 => Narrow(BaseType::Char),
        0x93 => Narrow(BaseType::Short),
        0x94 => LCmp,
        0x95 => FCmp(CompareMode::L),
        0x96 => FCmp(CompareMode::G),
        0x97 => DCmp(CompareMode::L),
        0x98 => DCmp(CompareMode::G),
        0x99..=0x9e => {
            let delta = reader.read_i16::<BigEndian>()? as i32;
            If(COMPARISONS[(opcode - 0x99) as usize], jump(offset, delta)?)
        }
        0x9f..=0xa4 => {
            let delta = reader.read_i16::<BigEndian>()? as i32;
            IfICmp(COMPARISONS[(opcode - 0x9f) as usize], jump(offset, delta)?)
        }
        0xa5 | 0xa6 => {
            let delta = reader.read_i16::<BigEndian>()? as i32;
            IfACmp(COMPARISONS[(opcode - 0xa5) as usize], jump(offset, delta)?)
        }
        0xa7 => Goto(jump(offset, reader.read_i16::<BigEndian>()? as i32)?),
        0xa8 => Jsr(jump(offset, reader.read_i16::<BigEndian>()? as i32)?),
        0xa9 => Ret(reader.read_u8()? as u16),
        0xaa | 0xab => {
            // Operands are aligned to a multiple of 4 bytes from the start of the code
            while reader.position() % 4 != 0 {
                reader.read_u8()?;
            }
            let default = jump(offset, reader.read_i32::<BigEndian>()?)?;
            if opcode == 0xaa {
                let low = reader.read_i32::<BigEndian>()?;
                let high = reader.read_i32::<BigEndian>()?;
                let count = (high as i64 - low as i64 + 1).max(0) as usize;
                let mut targets = Vec::with_capacity(count.min(1024));
                for _ in 0..count {
                    targets.push(jump(offset, reader.read_i32::<BigEndian>()?)?);
                }
                TableSwitch {
                    default,
                    low,
                    targets,
                }
            } else {
                let count = reader.read_i32::<BigEndian>()?.max(0) as usize;
                let mut pairs = Vec::with_capacity(count.min(1024));
                for _ in 0..count {
                    let key = reader.read_i32::<BigEndian>()?;
                    pairs.push((key, jump(offset, reader.read_i32::<BigEndian>()?)?));
                }
                LookupSwitch { default, pairs }
            }
        }
        0xac..=0xb0 => Return(Some(LOCAL_TYPES[(opcode - 0xac) as usize])),
        0xb1 => Return(None),
        0xb2 => GetStatic(read_index(reader)?),
        0xb3 => PutStatic(read_index(reader)?),
        0xb4 => GetField(read_index(reader)?),
        0xb5 => PutField(read_index(reader)?),
        0xb6 => Invoke(InvokeType::Virtual, read_index(reader)?),
        0xb7 => Invoke(InvokeType::Special, read_index(reader)?),
        0xb8 => Invoke(InvokeType::Static, read_index(reader)?),
        0xb9 => {
            let index = read_index(reader)?;
            let _count = reader.read_u8()?;
            let _zero = reader.read_u8()?;
            Invoke(InvokeType::Interface, index)
        }
        0xba => {
            let index = read_index(reader)?;
            let _zero = reader.read_u16::<BigEndian>()?;
            InvokeDynamic(index)
        }
        0xbb => New(read_index(reader)?),
        0xbc => {
            let atype = reader.read_u8()?;
            let element = BaseType::from_array_code(atype)
                .ok_or(DecodeError::BadArrayType { offset, atype })?;
            NewArray(element)
        }
        0xbd => ANewArray(read_index(reader)?),
        0xbe => ArrayLength,
        0xbf => AThrow,
        0xc0 => CheckCast(read_index(reader)?),
        0xc1 => InstanceOf(read_index(reader)?),
        0xc2 => MonitorEnter,
        0xc3 => MonitorExit,
        0xc4 => {
            let modified = reader.read_u8()?;
            let index = reader.read_u16::<BigEndian>()?;
            match modified {
                0x15..=0x19 => Load(LOCAL_TYPES[(modified - 0x15) as usize], index),
                0x36..=0x3a => Store(LOCAL_TYPES[(modified - 0x36) as usize], index),
                0xa9 => Ret(index),
                0x84 => IInc(index, reader.read_i16::<BigEndian>()?),
                _ => {
                    let err = DecodeError::BadWide {
                        offset,
                        opcode: modified,
                    };
                    return Err(err.into());
                }
            }
        }
        0xc5 => {
            let index = read_index(reader)?;
            MultiANewArray(index, reader.read_u8()?)
        }
        0xc6 => IfNull(jump(offset, reader.read_i16::<BigEndian>()? as i32)?),
        0xc7 => IfNonNull(jump(offset, reader.read_i16::<BigEndian>()? as i32)?),
        0xc8 => Goto(jump(offset, reader.read_i32::<BigEndian>()?)?),
        0xc9 => Jsr(jump(offset, reader.read_i32::<BigEndian>()?)?),
        _ => return Err(DecodeError::UnknownOpcode { offset, opcode }.into()),
    };
    Ok(insn)
}
