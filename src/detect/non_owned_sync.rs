use super::{BugDetector, BugKind, Finding, Priority};
use crate::analysis::{AfterEffect, BeforeEffect, Detector, HookError, MethodContext};
use crate::jvm::code::{Instruction, InvokeType, LocalType};
use crate::settings::Settings;
use crate::util::Width;
use std::collections::HashMap;

/// Who is responsible for an object, as far as locking on it goes
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Ownership {
    /// Created or fetched by the method's own class, fine to lock on
    Owned,

    /// Handed in from outside, locking on it is reported with this priority
    Foreign(Priority),
}

/// Finds `synchronized` blocks locking on objects the method doesn't own
///
/// Parameters and `this` may be locked on by other code too, which invites deadlocks. Objects
/// read from fields, freshly constructed, or returned from calls are considered owned.
pub struct NonOwnedSynchronization {
    propagate_call_chains: bool,
    is_static: bool,

    /// Ownership of the value last stored in each local variable, `None` if it had no tag
    registers: HashMap<u16, Option<Ownership>>,
    pending_tag: Option<Ownership>,
    findings: Vec<Finding>,
}

impl NonOwnedSynchronization {
    pub fn new(settings: &Settings) -> NonOwnedSynchronization {
        NonOwnedSynchronization {
            propagate_call_chains: settings.propagate_call_chains,
            is_static: false,
            registers: HashMap::new(),
            pending_tag: None,
            findings: vec![],
        }
    }
}

impl Detector for NonOwnedSynchronization {
    type Tag = Ownership;

    fn visit_method(&mut self, method: &MethodContext) -> bool {
        if !method.code.contains(|insn| matches!(insn, Instruction::MonitorEnter)) {
            return false;
        }

        self.is_static = method.is_static();
        self.pending_tag = None;
        self.registers.clear();

        let mut register: u16 = if self.is_static { 0 } else { 1 };
        for parameter in &method.descriptor.parameters {
            self.registers
                .insert(register, Some(Ownership::Foreign(Priority::Normal)));
            register += parameter.width() as u16;
        }
        if !self.is_static {
            self.registers
                .insert(0, Some(Ownership::Foreign(Priority::Low)));
        }
        true
    }

    fn before_effect(&mut self, event: &BeforeEffect<Ownership>) -> Result<(), HookError> {
        let stack = event.stack();
        match event.instruction {
            Instruction::GetField(_) => self.pending_tag = Some(Ownership::Owned),

            Instruction::Load(LocalType::Reference, register) => {
                self.pending_tag = if *register == 0 && self.is_static {
                    Some(Ownership::Foreign(Priority::Low))
                } else {
                    Some(
                        self.registers
                            .get(register)
                            .copied()
                            .flatten()
                            .unwrap_or(Ownership::Foreign(Priority::Normal)),
                    )
                };
            }

            Instruction::Store(LocalType::Reference, register) => {
                if let Some(item) = stack.top() {
                    self.registers.insert(*register, item.tag);
                }
            }

            Instruction::Invoke(InvokeType::Virtual | InvokeType::Interface, _) => {
                let method = match event.invoked() {
                    Some(method) => method,
                    None => return Ok(()),
                };
                if !method.descriptor.returns_object() {
                    return Ok(());
                }
                if let Some(receiver) = stack.peek(method.descriptor.parameters.len()) {
                    self.pending_tag = if receiver.tag == Some(Ownership::Owned)
                        || !self.propagate_call_chains
                    {
                        Some(Ownership::Owned)
                    } else {
                        match receiver.register {
                            Some(register) if register > 0 => {
                                self.registers.get(&register).copied().flatten()
                            }
                            _ => Some(Ownership::Owned),
                        }
                    };
                }
            }

            Instruction::Invoke(InvokeType::Static, _) => {
                if event.invoked().map_or(false, |m| m.descriptor.returns_object()) {
                    self.pending_tag = Some(Ownership::Owned);
                }
            }

            Instruction::Invoke(InvokeType::Special, _) => {
                if event.invoked().map_or(false, |m| m.name.is_init()) {
                    self.pending_tag = Some(Ownership::Owned);
                }
            }

            Instruction::MonitorEnter => {
                if let Some(Ownership::Foreign(priority)) = stack.top().and_then(|item| item.tag) {
                    log::debug!(
                        "Locking on a non-owned value in {}.{} at {}",
                        event.method.class,
                        event.method.name,
                        event.offset
                    );
                    self.findings.push(Finding::at(
                        BugKind::NonOwnedSynchronization,
                        priority,
                        event.method,
                        event.offset,
                    ));
                }
            }

            _ => (),
        }
        Ok(())
    }

    fn after_effect(&mut self, event: &mut AfterEffect<Ownership>) -> Result<(), HookError> {
        if let Some(ownership) = self.pending_tag.take() {
            event.set_top_tag(ownership);
        }
        Ok(())
    }
}

impl BugDetector for NonOwnedSynchronization {
    fn take_findings(&mut self) -> Vec<Finding> {
        std::mem::take(&mut self.findings)
    }
}
