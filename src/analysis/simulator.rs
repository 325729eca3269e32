use super::{
    AfterEffect, BeforeEffect, ConstantData, ConstantValue, Detector, Diagnostic, Frame, Locals,
    MethodContext, NormalizerState, OperandStack, ResolveError, Resolved, Resolver,
    SimulationError, TernaryNormalizer, ValueSlot,
};
use crate::jvm::code::{Instruction, LocalType};
use crate::jvm::{BinaryName, FieldType, MethodDescriptor, RefType};
use crate::util::{Offset, Width};

/// Symbolic interpreter of a method's operand stack and local variables
///
/// The simulator replays the instructions of a method in order, one at a time. Every instruction
/// is bracketed by calls to a [`Detector`], which gets to inspect the stack and locals before the
/// instruction takes effect and to tag the value it produced afterwards.
///
/// ```
/// use opstack::analysis::{NoDetector, Simulator, ConstantValue};
/// use opstack::jvm::class_file::ConstantPool;
/// use opstack::jvm::code::{Instruction, LocalType};
/// use opstack::util::Offset;
///
/// let pool = ConstantPool::default();
/// let mut simulator: Simulator<()> = Simulator::new(&pool);
/// let mut detector = NoDetector;
/// # let code = Default::default();
/// # let class = opstack::jvm::BinaryName::OBJECT;
/// # let name = opstack::jvm::UnqualifiedName::INIT;
/// # let descriptor = opstack::jvm::MethodDescriptor { parameters: vec![], return_type: None };
/// # let method = opstack::analysis::MethodContext {
/// #     class: &class, name: &name, descriptor: &descriptor,
/// #     access_flags: opstack::jvm::MethodAccessFlags::STATIC, code: &code,
/// # };
/// simulator.reset_for_method_entry(&method);
/// simulator.advance(&method, Offset(0), &Instruction::IConst(7), &mut detector).unwrap();
/// simulator.advance(&method, Offset(1), &Instruction::Store(LocalType::Int, 0), &mut detector).unwrap();
/// simulator.advance(&method, Offset(2), &Instruction::Load(LocalType::Int, 0), &mut detector).unwrap();
///
/// let top = simulator.stack().top().unwrap();
/// assert_eq!(top.constant, Some(ConstantValue::Int(7)));
/// assert_eq!(top.register, Some(0));
/// ```
pub struct Simulator<'r, T> {
    resolver: &'r dyn Resolver,
    frame: Frame<T>,
    normalizer: TernaryNormalizer<T>,
    diagnostics: Vec<Diagnostic>,
    max_instructions: Option<usize>,
}

/// Outcome of resolving an instruction's constant pool operand
enum Resolution {
    Found(Resolved),

    /// Missing reference; the descriptor is kept for calls so arguments can still be popped
    Missing(Option<MethodDescriptor>),
    None,
}

impl<'r, T: Clone + PartialEq + std::fmt::Debug> Simulator<'r, T> {
    pub fn new(resolver: &'r dyn Resolver) -> Simulator<'r, T> {
        Simulator {
            resolver,
            frame: Frame::default(),
            normalizer: TernaryNormalizer::new(true),
            diagnostics: vec![],
            max_instructions: None,
        }
    }

    /// Refuse to simulate methods with more instructions than this
    pub fn with_instruction_limit(mut self, limit: Option<usize>) -> Self {
        self.max_instructions = limit;
        self
    }

    /// Whether to merge the frames of paths joining up (on by default)
    pub fn with_ternary_normalization(mut self, enabled: bool) -> Self {
        self.normalizer = TernaryNormalizer::new(enabled);
        self
    }

    pub fn stack(&self) -> &OperandStack<T> {
        &self.frame.stack
    }

    pub fn locals(&self) -> &Locals<T> {
        &self.frame.locals
    }

    pub fn frame(&self) -> &Frame<T> {
        &self.frame
    }

    pub fn normalizer_state(&self) -> NormalizerState {
        self.normalizer.state()
    }

    /// Non-fatal problems seen since the last method entry
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }

    /// Start over with the frame at the entry of a method
    pub fn reset_for_method_entry(&mut self, method: &MethodContext) {
        self.frame = Frame::method_entry(method.this_class(), method.descriptor);
        self.normalizer.reset();
        self.diagnostics.clear();
    }

    /// Simulate a whole method
    ///
    /// Returns `Ok(false)` if the detector chose to skip the method.
    pub fn run<D: Detector<Tag = T>>(
        &mut self,
        method: &MethodContext,
        detector: &mut D,
    ) -> Result<bool, SimulationError> {
        if let Some(limit) = self.max_instructions {
            if method.code.instructions.len() > limit {
                return Err(SimulationError::InstructionLimit { limit });
            }
        }
        self.reset_for_method_entry(method);
        if !detector.visit_method(method) {
            log::debug!("Skipping {}.{}", method.class, method.name);
            return Ok(false);
        }

        log::debug!(
            "Simulating {}.{} ({} instructions)",
            method.class,
            method.name,
            method.code.instructions.len()
        );
        for (offset, instruction) in &method.code.instructions {
            self.advance(method, *offset, instruction, detector)?;
        }
        detector.end_method(method);
        Ok(true)
    }

    /// Simulate one instruction
    ///
    /// The order of events is: the normalizer fixes up the frame if control flow joins here, the
    /// detector sees the frame before the effect, the effect is applied, the normalizer records
    /// the frame for forward branches, and the detector sees the frame after the effect.
    pub fn advance<D: Detector<Tag = T>>(
        &mut self,
        method: &MethodContext,
        offset: Offset,
        instruction: &Instruction,
        detector: &mut D,
    ) -> Result<(), SimulationError> {
        log::trace!("{} {:?} (depth {})", offset, instruction, self.frame.stack.depth());

        let resolution = self.resolve(offset, instruction)?;
        let resolved = match &resolution {
            Resolution::Found(resolved) => Some(resolved),
            _ => None,
        };

        self.normalizer.before_effect(method.code, offset, &mut self.frame);

        let before = BeforeEffect {
            method,
            offset,
            instruction,
            resolved,
            frame: &self.frame,
        };
        if let Err(error) = detector.before_effect(&before) {
            log::warn!("Detector failed before {:?} at {}: {}", instruction, offset, error);
            self.diagnostics.push(Diagnostic::HookFailed { offset, error });
        }

        self.apply_effect(offset, instruction, &resolution)?;
        self.normalizer.after_effect(offset, instruction, &self.frame);

        let mut after = AfterEffect::new(method, offset, instruction, resolved, &mut self.frame);
        if let Err(error) = detector.after_effect(&mut after) {
            log::warn!("Detector failed after {:?} at {}: {}", instruction, offset, error);
            self.diagnostics.push(Diagnostic::HookFailed { offset, error });
        }

        Ok(())
    }

    fn resolve(
        &mut self,
        offset: Offset,
        instruction: &Instruction,
    ) -> Result<Resolution, SimulationError> {
        use Instruction::*;

        let resolver = self.resolver;
        let result = match instruction {
            Ldc(idx) | Ldc2(idx) => resolver.resolve_constant(*idx).map(Resolved::Constant),
            GetStatic(idx) | PutStatic(idx) | GetField(idx) | PutField(idx) => {
                resolver.resolve_field(*idx).map(Resolved::Field)
            }
            Invoke(_, idx) | InvokeDynamic(idx) => {
                resolver.resolve_method(*idx).map(Resolved::Method)
            }
            New(idx) | ANewArray(idx) | MultiANewArray(idx, _) | CheckCast(idx)
            | InstanceOf(idx) => resolver.resolve_class(*idx).map(Resolved::Class),
            _ => return Ok(Resolution::None),
        };

        match result {
            Ok(resolved) => Ok(Resolution::Found(resolved)),
            Err(ResolveError::Missing {
                reference,
                descriptor,
            }) => {
                let is_call = matches!(instruction, Invoke(_, _) | InvokeDynamic(_));
                if is_call && descriptor.is_none() {
                    return Err(SimulationError::Unresolved {
                        offset,
                        error: ResolveError::Missing {
                            reference,
                            descriptor,
                        },
                    });
                }
                log::debug!("Unresolved {} at {}", reference, offset);
                self.diagnostics.push(Diagnostic::ResolutionMiss { offset, reference });
                Ok(Resolution::Missing(descriptor))
            }
            Err(error) => Err(SimulationError::Unresolved { offset, error }),
        }
    }

    fn apply_effect(
        &mut self,
        offset: Offset,
        instruction: &Instruction,
        resolution: &Resolution,
    ) -> Result<(), SimulationError> {
        use Instruction::*;

        let Frame {
            ref mut stack,
            ref mut locals,
        } = self.frame;

        let resolved = match resolution {
            Resolution::Found(resolved) => Some(resolved),
            _ => None,
        };
        let class_type = || {
            resolved
                .and_then(Resolved::class)
                .map(|class| FieldType::Ref(class.clone()))
        };

        match instruction {
            Nop => (),
            AConstNull => stack.push(ValueSlot::unknown()),
            IConst(value) => stack.push(ValueSlot::constant(ConstantValue::Int(*value))),
            LConst(value) => stack.push(ValueSlot::constant(ConstantValue::Long(*value))),
            FConst(value) => stack.push(ValueSlot::constant(ConstantValue::Float(*value))),
            DConst(value) => stack.push(ValueSlot::constant(ConstantValue::Double(*value))),
            Ldc(_) | Ldc2(_) => {
                let slot = match resolved {
                    Some(Resolved::Constant(constant)) => constant_slot(constant),
                    _ => ValueSlot::unknown(),
                };
                stack.push(slot);
            }

            Load(typ, index) => {
                let mut slot = locals.get(*index).cloned().unwrap_or_default();
                fill_type(&mut slot, typ);
                slot.register = Some(*index);
                stack.push(slot);
            }
            Store(typ, index) => {
                let mut slot = stack.pop(offset)?;
                fill_type(&mut slot, typ);
                locals.store(*index, slot);
            }
            IInc(index, _) => locals.store(*index, ValueSlot::of_type(FieldType::int())),

            ArrayLoad(kind) => {
                let operands = stack.pop_n(2, offset)?;
                let element = kind.field_type().or_else(|| {
                    operands[0]
                        .declared_type
                        .as_ref()
                        .and_then(|typ| match typ {
                            FieldType::Ref(ref_type) => ref_type.array_element(),
                            FieldType::Base(_) => None,
                        })
                });
                stack.push(ValueSlot::of_optional_type(element));
            }
            ArrayStore(_) => {
                stack.pop_n(3, offset)?;
            }

            Pop => {
                stack.pop(offset)?;
            }
            Pop2 => {
                let value1 = stack.pop(offset)?;
                if value1.width() == 1 {
                    stack.pop(offset)?;
                }
            }
            Dup => {
                let value1 = stack.pop(offset)?;
                stack.push(value1.clone());
                stack.push(value1);
            }
            DupX1 => {
                let value1 = stack.pop(offset)?;
                let value2 = stack.pop(offset)?;
                stack.push(value1.clone());
                stack.push(value2);
                stack.push(value1);
            }
            DupX2 => {
                let value1 = stack.pop(offset)?;
                let value2 = stack.pop(offset)?;
                if value2.width() == 2 {
                    // Form 2
                    stack.push(value1.clone());
                    stack.push(value2);
                    stack.push(value1);
                } else {
                    // Form 1
                    let value3 = stack.pop(offset)?;
                    stack.push(value1.clone());
                    stack.push(value3);
                    stack.push(value2);
                    stack.push(value1);
                }
            }
            Dup2 => {
                let value1 = stack.pop(offset)?;
                if value1.width() == 2 {
                    // Form 2
                    stack.push(value1.clone());
                    stack.push(value1);
                } else {
                    // Form 1
                    let value2 = stack.pop(offset)?;
                    stack.push(value2.clone());
                    stack.push(value1.clone());
                    stack.push(value2);
                    stack.push(value1);
                }
            }
            Dup2X1 => {
                let value1 = stack.pop(offset)?;
                if value1.width() == 2 {
                    // Form 2
                    let value2 = stack.pop(offset)?;
                    stack.push(value1.clone());
                    stack.push(value2);
                    stack.push(value1);
                } else {
                    // Form 1
                    let value2 = stack.pop(offset)?;
                    let value3 = stack.pop(offset)?;
                    stack.push(value2.clone());
                    stack.push(value1.clone());
                    stack.push(value3);
                    stack.push(value2);
                    stack.push(value1);
                }
            }
            Dup2X2 => {
                let value1 = stack.pop(offset)?;
                if value1.width() == 2 {
                    let value2 = stack.pop(offset)?;
                    if value2.width() == 2 {
                        // Form 4
                        stack.push(value1.clone());
                        stack.push(value2);
                        stack.push(value1);
                    } else {
                        // Form 2
                        let value3 = stack.pop(offset)?;
                        stack.push(value1.clone());
                        stack.push(value3);
                        stack.push(value2);
                        stack.push(value1);
                    }
                } else {
                    let value2 = stack.pop(offset)?;
                    let value3 = stack.pop(offset)?;
                    if value3.width() == 2 {
                        // Form 3
                        stack.push(value2.clone());
                        stack.push(value1.clone());
                        stack.push(value3);
                        stack.push(value2);
                        stack.push(value1);
                    } else {
                        // Form 1
                        let value4 = stack.pop(offset)?;
                        stack.push(value2.clone());
                        stack.push(value1.clone());
                        stack.push(value4);
                        stack.push(value3);
                        stack.push(value2);
                        stack.push(value1);
                    }
                }
            }
            Swap => {
                let value1 = stack.pop(offset)?;
                let value2 = stack.pop(offset)?;
                stack.push(value1);
                stack.push(value2);
            }

            Arithmetic(typ, _) => {
                stack.pop_n(2, offset)?;
                stack.push(ValueSlot::of_type(typ.field_type()));
            }
            Neg(typ) => {
                stack.pop(offset)?;
                stack.push(ValueSlot::of_type(typ.field_type()));
            }
            Convert(_, to) => {
                stack.pop(offset)?;
                stack.push(ValueSlot::of_type(to.field_type()));
            }
            Narrow(_) | ArrayLength | InstanceOf(_) => {
                stack.pop(offset)?;
                stack.push(ValueSlot::of_type(FieldType::int()));
            }
            LCmp | FCmp(_) | DCmp(_) => {
                stack.pop_n(2, offset)?;
                stack.push(ValueSlot::of_type(FieldType::int()));
            }

            If(_, _) | IfNull(_) | IfNonNull(_) => {
                stack.pop(offset)?;
            }
            IfICmp(_, _) | IfACmp(_, _) => {
                stack.pop_n(2, offset)?;
            }
            Goto(_) | Jsr(_) | Ret(_) | Return(None) => (),
            TableSwitch { .. } | LookupSwitch { .. } | Return(Some(_)) | AThrow => {
                stack.pop(offset)?;
            }

            GetStatic(_) => {
                let typ = resolved
                    .and_then(Resolved::field)
                    .map(|field| field.descriptor.clone());
                stack.push(ValueSlot::of_optional_type(typ));
            }
            GetField(_) => {
                stack.pop(offset)?;
                let typ = resolved
                    .and_then(Resolved::field)
                    .map(|field| field.descriptor.clone());
                stack.push(ValueSlot::of_optional_type(typ));
            }
            PutStatic(_) => {
                stack.pop(offset)?;
            }
            PutField(_) => {
                stack.pop_n(2, offset)?;
            }

            Invoke(_, _) | InvokeDynamic(_) => {
                let (method, descriptor) = match resolution {
                    Resolution::Found(Resolved::Method(method)) => {
                        (Some(method), &method.descriptor)
                    }
                    Resolution::Missing(Some(descriptor)) => (None, descriptor),
                    _ => {
                        return Err(SimulationError::Unresolved {
                            offset,
                            error: ResolveError::Missing {
                                reference: format!("{:?}", instruction),
                                descriptor: None,
                            },
                        })
                    }
                };
                let has_receiver = match instruction {
                    Invoke(invoke_type, _) => invoke_type.has_receiver(),
                    _ => false,
                };
                let popped = descriptor.parameters.len() + if has_receiver { 1 } else { 0 };
                stack.pop_n(popped, offset)?;
                if let Some(return_type) = &descriptor.return_type {
                    stack.push(ValueSlot {
                        declared_type: Some(return_type.clone()),
                        producer: method.cloned(),
                        ..ValueSlot::default()
                    });
                }
            }

            New(_) => stack.push(ValueSlot::of_optional_type(class_type())),
            NewArray(element) => {
                stack.pop(offset)?;
                let array = RefType::array_of(FieldType::Base(*element));
                stack.push(ValueSlot::of_type(FieldType::Ref(array)));
            }
            ANewArray(_) => {
                stack.pop(offset)?;
                let typ = class_type().map(|element| FieldType::Ref(RefType::array_of(element)));
                stack.push(ValueSlot::of_optional_type(typ));
            }
            MultiANewArray(_, dimensions) => {
                stack.pop_n(*dimensions as usize, offset)?;
                stack.push(ValueSlot::of_optional_type(class_type()));
            }
            CheckCast(_) => {
                let mut slot = stack.pop(offset)?;
                if let Some(typ) = class_type() {
                    slot.declared_type = Some(typ);
                }
                stack.push(slot);
            }

            MonitorEnter | MonitorExit => {
                stack.pop(offset)?;
            }
        }

        Ok(())
    }
}

/// Slot pushed by `ldc`
fn constant_slot<T>(constant: &ConstantData) -> ValueSlot<T> {
    match constant {
        ConstantData::String(string) => ValueSlot::constant(ConstantValue::String(string.clone())),
        ConstantData::Integer(value) => ValueSlot::constant(ConstantValue::Int(*value)),
        ConstantData::Float(value) => ValueSlot::constant(ConstantValue::Float(*value)),
        ConstantData::Long(value) => ValueSlot::constant(ConstantValue::Long(*value)),
        ConstantData::Double(value) => ValueSlot::constant(ConstantValue::Double(*value)),
        ConstantData::Class(class) => ValueSlot::constant(ConstantValue::Class(class.clone())),
        ConstantData::MethodHandle => ValueSlot::of_type(FieldType::object(BinaryName::METHODHANDLE)),
        ConstantData::MethodType => ValueSlot::of_type(FieldType::object(BinaryName::METHODTYPE)),
        ConstantData::Dynamic(typ) => ValueSlot::of_type(typ.clone()),
    }
}

/// Use the type implied by a typed load or store when nothing better is known
fn fill_type<T>(slot: &mut ValueSlot<T>, typ: &LocalType) {
    if slot.declared_type.is_none() {
        slot.declared_type = typ.field_type();
    }
}
