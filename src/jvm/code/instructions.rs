use crate::jvm::class_file::ConstantIndex;
use crate::jvm::{BaseType, FieldType};
use crate::util::Offset;

/// Decoded JVM bytecode instruction
///
/// The representation is a bit more compact than the list of opcodes:
///
///   - `wide` doesn't show up at all, but instead gets merged into the instructions it modifies
///   - families of instructions that differ only in an implicit operand (`iconst_<n>`,
///     `aload_<n>`, `bipush`, ...) are folded into one variant carrying that operand
///   - typed variants of an instruction (`iadd`, `ladd`, `fadd`, `dadd`) share one variant
///     parametrized by the type they operate on
///   - branch targets are absolute offsets into the method's code
#[derive(Clone, Debug, PartialEq)]
pub enum Instruction {
    Nop,
    AConstNull,
    IConst(i32), // covers `iconst_<n>`, `bipush`, and `sipush`
    LConst(i64),
    FConst(f32),
    DConst(f64),
    Ldc(ConstantIndex), // covers both `ldc` and `ldc_w`
    Ldc2(ConstantIndex),
    Load(LocalType, u16), // covers `iload`, `iload_<n>`, and `wide iload` (and the other types)
    Store(LocalType, u16),
    ArrayLoad(ArrayKind),
    ArrayStore(ArrayKind),
    Pop,
    Pop2,
    Dup,
    DupX1,
    DupX2,
    Dup2,
    Dup2X1,
    Dup2X2,
    Swap,
    Arithmetic(NumericType, ArithmeticOp),
    Neg(NumericType),
    IInc(u16, i16), // covers `iinc` and `wide iinc`
    Convert(NumericType, NumericType),
    Narrow(BaseType), // covers `i2b`, `i2c`, and `i2s`
    LCmp,
    FCmp(CompareMode), // covers `fcmpl` and `fcmpg`
    DCmp(CompareMode), // covers `dcmpl` and `dcmpg`
    If(Comparison, Offset), // compare against zero
    IfICmp(Comparison, Offset),
    IfACmp(Comparison, Offset),
    IfNull(Offset),
    IfNonNull(Offset),
    Goto(Offset), // covers `goto` and `goto_w`
    Jsr(Offset),  // covers `jsr` and `jsr_w`
    Ret(u16),
    TableSwitch {
        default: Offset,
        low: i32,
        targets: Vec<Offset>,
    },
    LookupSwitch {
        default: Offset,
        pairs: Vec<(i32, Offset)>,
    },
    Return(Option<LocalType>), // `None` for `return` from a `void` method
    AThrow,
    GetStatic(ConstantIndex),
    PutStatic(ConstantIndex),
    GetField(ConstantIndex),
    PutField(ConstantIndex),
    Invoke(InvokeType, ConstantIndex),
    InvokeDynamic(ConstantIndex),
    New(ConstantIndex),
    NewArray(BaseType),
    ANewArray(ConstantIndex),
    MultiANewArray(ConstantIndex, u8),
    ArrayLength,
    CheckCast(ConstantIndex),
    InstanceOf(ConstantIndex),
    MonitorEnter,
    MonitorExit,
}

/// Coarse classification of instructions by their effect on the stack and locals
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum Category {
    PushConstant,
    LoadLocal,
    StoreLocal,
    Invoke,
    FieldAccess,
    Branch,
    Monitor,
    Dup,
    Other,
}

/// Type of value moved in and out of locals by `*load`, `*store`, and `*return`
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum LocalType {
    Int,
    Long,
    Float,
    Double,
    Reference,
}

/// Element type of `*aload` and `*astore`
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum ArrayKind {
    Int,
    Long,
    Float,
    Double,
    Reference,
    Byte, // also used for `boolean[]`
    Char,
    Short,
}

/// Types arithmetic and conversion instructions operate on
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum NumericType {
    Int,
    Long,
    Float,
    Double,
}

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum ArithmeticOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Shl,
    Shr,
    UShr,
    And,
    Or,
    Xor,
}

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum CompareMode {
    L,
    G,
}

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum Comparison {
    Eq,
    Ne,
    Lt,
    Ge,
    Gt,
    Le,
}

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum InvokeType {
    Virtual,
    Special,
    Static,
    Interface,
}

impl InvokeType {
    /// Whether a receiver (`this`) is popped along with the arguments
    pub fn has_receiver(&self) -> bool {
        !matches!(self, InvokeType::Static)
    }
}

impl NumericType {
    pub fn field_type(&self) -> FieldType {
        match self {
            NumericType::Int => FieldType::int(),
            NumericType::Long => FieldType::long(),
            NumericType::Float => FieldType::float(),
            NumericType::Double => FieldType::double(),
        }
    }
}

impl LocalType {
    /// Static type of values of this kind, when it is known without more context
    pub fn field_type(&self) -> Option<FieldType> {
        match self {
            LocalType::Int => Some(FieldType::int()),
            LocalType::Long => Some(FieldType::long()),
            LocalType::Float => Some(FieldType::float()),
            LocalType::Double => Some(FieldType::double()),
            LocalType::Reference => None,
        }
    }
}

impl ArrayKind {
    /// Static type of an element loaded from an array of this kind
    pub fn field_type(&self) -> Option<FieldType> {
        match self {
            ArrayKind::Int => Some(FieldType::int()),
            ArrayKind::Long => Some(FieldType::long()),
            ArrayKind::Float => Some(FieldType::float()),
            ArrayKind::Double => Some(FieldType::double()),
            ArrayKind::Byte | ArrayKind::Char | ArrayKind::Short => Some(FieldType::int()),
            ArrayKind::Reference => None,
        }
    }
}

impl Instruction {
    pub fn category(&self) -> Category {
        use Instruction::*;
        match self {
            AConstNull | IConst(_) | LConst(_) | FConst(_) | DConst(_) | Ldc(_) | Ldc2(_) => {
                Category::PushConstant
            }
            Load(_, _) => Category::LoadLocal,
            Store(_, _) => Category::StoreLocal,
            Invoke(_, _) | InvokeDynamic(_) => Category::Invoke,
            GetStatic(_) | PutStatic(_) | GetField(_) | PutField(_) => Category::FieldAccess,
            If(_, _)
            | IfICmp(_, _)
            | IfACmp(_, _)
            | IfNull(_)
            | IfNonNull(_)
            | Goto(_)
            | Jsr(_)
            | Ret(_)
            | TableSwitch { .. }
            | LookupSwitch { .. }
            | Return(_)
            | AThrow => Category::Branch,
            MonitorEnter | MonitorExit => Category::Monitor,
            Dup | DupX1 | DupX2 | Dup2 | Dup2X1 | Dup2X2 => Category::Dup,
            _ => Category::Other,
        }
    }

    /// Offsets this instruction may transfer control to, other than the next instruction
    pub fn jump_targets(&self) -> Vec<Offset> {
        use Instruction::*;
        match self {
            If(_, target)
            | IfICmp(_, target)
            | IfACmp(_, target)
            | IfNull(target)
            | IfNonNull(target)
            | Goto(target)
            | Jsr(target) => vec![*target],
            TableSwitch {
                default, targets, ..
            } => {
                let mut all = targets.clone();
                all.push(*default);
                all
            }
            LookupSwitch { default, pairs } => {
                let mut all: Vec<Offset> = pairs.iter().map(|(_, target)| *target).collect();
                all.push(*default);
                all
            }
            _ => vec![],
        }
    }

    /// Whether control can flow from this instruction to the one immediately after it
    pub fn falls_through(&self) -> bool {
        use Instruction::*;
        !matches!(
            self,
            Goto(_) | Ret(_) | TableSwitch { .. } | LookupSwitch { .. } | Return(_) | AThrow
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn categories() {
        assert_eq!(Instruction::IConst(3).category(), Category::PushConstant);
        assert_eq!(
            Instruction::Load(LocalType::Reference, 1).category(),
            Category::LoadLocal
        );
        assert_eq!(Instruction::Dup2X1.category(), Category::Dup);
        assert_eq!(Instruction::Swap.category(), Category::Other);
        assert_eq!(Instruction::MonitorExit.category(), Category::Monitor);
        assert_eq!(Instruction::Return(None).category(), Category::Branch);
        assert_eq!(
            Instruction::GetField(ConstantIndex(4)).category(),
            Category::FieldAccess
        );
    }

    #[test]
    fn control_flow() {
        let switch = Instruction::LookupSwitch {
            default: Offset(40),
            pairs: vec![(1, Offset(20)), (7, Offset(30))],
        };
        assert_eq!(
            switch.jump_targets(),
            vec![Offset(20), Offset(30), Offset(40)]
        );
        assert!(!switch.falls_through());

        let branch = Instruction::IfNull(Offset(12));
        assert_eq!(branch.jump_targets(), vec![Offset(12)]);
        assert!(branch.falls_through());
    }
}
