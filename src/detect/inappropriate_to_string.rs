use super::{BugDetector, BugKind, Finding, Priority};
use crate::analysis::{AfterEffect, BeforeEffect, Detector, HookError, MethodContext};
use crate::jvm::code::{Instruction, InvokeType, LocalType};
use crate::jvm::{BinaryName, RenderDescriptor, UnqualifiedName};
use crate::settings::Settings;
use std::collections::HashMap;

/// Classes whose `toString()` output is documented well enough to be parsed
static VALID_TO_STRING_CLASSES: [BinaryName; 14] = [
    BinaryName::OBJECT,
    BinaryName::BYTE,
    BinaryName::CHARACTER,
    BinaryName::SHORT,
    BinaryName::INTEGER,
    BinaryName::BOOLEAN,
    BinaryName::FLOAT,
    BinaryName::DOUBLE,
    BinaryName::LONG,
    BinaryName::STRING,
    BinaryName::NUMBER,
    BinaryName::STRINGBUFFER,
    BinaryName::STRINGBUILDER,
    BinaryName::STRINGWRITER,
];

/// `String` methods that pick apart their receiver
static STRING_ALGORITHM_METHODS: [UnqualifiedName; 5] = [
    UnqualifiedName::INDEXOF,
    UnqualifiedName::CONTAINS,
    UnqualifiedName::STARTSWITH,
    UnqualifiedName::ENDSWITH,
    UnqualifiedName::SUBSTRING,
];

/// Whether two slashed or dotted package names share their first `depth` segments
///
/// Mirrors how packages are usually laid out: `com.acme.a` and `com.acme.b` are similar at
/// depth 2, `com.acme` and `org.acme` never are. Running out of segments on both sides at once
/// also counts as similar, on the other side alone it doesn't.
pub fn similar_packages(first: &str, second: &str, depth: usize) -> bool {
    if depth == 0 {
        return true;
    }
    let split = |package: &str| -> Option<(String, String)> {
        package
            .find(|c| c == '/' || c == '.')
            .map(|idx| (package[..idx].to_owned(), package[idx + 1..].to_owned()))
    };
    match (split(first), split(second)) {
        (None, None) => true,
        (Some((head1, rest1)), Some((head2, rest2))) => {
            head1 == head2 && similar_packages(&rest1, &rest2, depth - 1)
        }
        _ => false,
    }
}

/// Finds code inspecting the output of `toString()` calls
///
/// `toString()` is meant for humans: unless the class is one of a handful whose format is part of
/// their contract, parsing its output with `indexOf`, `startsWith`, and friends ties the code to
/// an implementation detail. Classes from a closely related package get the benefit of the doubt.
///
/// Values returned by a suspicious `toString()` are tagged with the package of the receiver.
pub struct InappropriateToStringUse {
    package: String,
    similar_package_depth: usize,

    /// Local variables holding a tagged value, with the package of the `toString()` owner
    registers: HashMap<u16, String>,
    pending_tag: Option<String>,
    findings: Vec<Finding>,
}

impl InappropriateToStringUse {
    pub fn new(class: &BinaryName, settings: &Settings) -> InappropriateToStringUse {
        InappropriateToStringUse {
            package: class.package().to_owned(),
            similar_package_depth: settings.similar_package_depth,
            registers: HashMap::new(),
            pending_tag: None,
            findings: vec![],
        }
    }
}

impl Detector for InappropriateToStringUse {
    type Tag = String;

    fn visit_method(&mut self, _method: &MethodContext) -> bool {
        self.registers.clear();
        self.pending_tag = None;
        true
    }

    fn before_effect(&mut self, event: &BeforeEffect<String>) -> Result<(), HookError> {
        let stack = event.stack();
        match event.instruction {
            Instruction::Invoke(InvokeType::Virtual, _) => {
                let method = match event.invoked() {
                    Some(method) => method,
                    None => return Ok(()),
                };
                if method.name == UnqualifiedName::TOSTRING {
                    if method.descriptor.render() == "()Ljava/lang/String;"
                        && !VALID_TO_STRING_CLASSES.contains(&method.class)
                    {
                        self.pending_tag = stack
                            .top()
                            .and_then(|receiver| receiver.class_name())
                            .map(|class| class.package().to_owned());
                    }
                } else if STRING_ALGORITHM_METHODS.contains(&method.name)
                    && method.class == BinaryName::STRING
                {
                    let argument_count = method.descriptor.parameters.len();
                    if let Some(receiver) = stack.peek(argument_count) {
                        if receiver.tag.is_some() {
                            let to_string_package = receiver
                                .producer
                                .as_ref()
                                .map(|producer| producer.class.package());
                            let related = to_string_package.map_or(false, |package| {
                                similar_packages(package, &self.package, self.similar_package_depth)
                            });
                            if !related {
                                log::debug!(
                                    "{} called on the output of {}",
                                    method,
                                    receiver
                                        .producer
                                        .as_ref()
                                        .map_or(String::from("toString()"), |p| p.to_string())
                                );
                                self.findings.push(Finding::at(
                                    BugKind::InappropriateToStringUse,
                                    Priority::Normal,
                                    event.method,
                                    event.offset,
                                ));
                            }
                        }
                    }
                }
            }

            Instruction::Store(LocalType::Reference, register) => {
                let remembered = stack.top().and_then(|item| {
                    item.tag.as_ref()?;
                    item.producer
                        .as_ref()
                        .map(|producer| producer.class.package().to_owned())
                });
                match remembered {
                    Some(package) => {
                        self.registers.insert(*register, package);
                    }
                    None => {
                        self.registers.remove(register);
                    }
                }
            }

            Instruction::Load(LocalType::Reference, register) => {
                self.pending_tag = self.registers.get(register).cloned();
            }

            _ => (),
        }
        Ok(())
    }

    fn after_effect(&mut self, event: &mut AfterEffect<String>) -> Result<(), HookError> {
        match (self.pending_tag.take(), event.instruction) {
            (Some(package), _) => {
                event.set_top_tag(package);
            }

            // Only locals remembered at store time come back tagged
            (None, Instruction::Load(LocalType::Reference, _)) => {
                event.clear_top_tag();
            }

            _ => (),
        }
        Ok(())
    }
}

impl BugDetector for InappropriateToStringUse {
    fn take_findings(&mut self) -> Vec<Finding> {
        std::mem::take(&mut self.findings)
    }
}
