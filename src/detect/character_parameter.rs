use super::{BugDetector, BugKind, Finding, Priority};
use crate::analysis::{AfterEffect, BeforeEffect, Detector, HookError, MethodContext, MethodRef};
use crate::jvm::code::{Instruction, InvokeType, LocalType};
use crate::jvm::{BinaryName, FieldType, RenderDescriptor, UnqualifiedName};
use crate::settings::Settings;

/// Marks a `StringBuilder`/`StringBuffer` that is part of an inline concatenation
///
/// Something like `"(" + a + ")"` compiles to a chain of `append(String)` calls on a builder
/// nobody holds on to; rewriting those is the compiler's business, not the programmer's.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum BuilderTag {
    Inline,
}

/// Method taking a `String` that has an equivalent taking a `char`
struct CharacterMethod {
    class: BinaryName,
    name: UnqualifiedName,
    descriptor: &'static str,

    /// Stack depths (0 being the top) of the string arguments that must all be one character
    string_arguments: &'static [usize],
}

const fn character_method(
    class: BinaryName,
    name: UnqualifiedName,
    descriptor: &'static str,
    string_arguments: &'static [usize],
) -> CharacterMethod {
    CharacterMethod {
        class,
        name,
        descriptor,
        string_arguments,
    }
}

static CHARACTER_METHODS: [CharacterMethod; 10] = [
    character_method(BinaryName::STRING, UnqualifiedName::INDEXOF, "(Ljava/lang/String;)I", &[0]),
    character_method(BinaryName::STRING, UnqualifiedName::INDEXOF, "(Ljava/lang/String;I)I", &[1]),
    character_method(
        BinaryName::STRING,
        UnqualifiedName::LASTINDEXOF,
        "(Ljava/lang/String;)I",
        &[0],
    ),
    character_method(
        BinaryName::STRING,
        UnqualifiedName::LASTINDEXOF,
        "(Ljava/lang/String;I)I",
        &[1],
    ),
    character_method(
        BinaryName::PRINTSTREAM,
        UnqualifiedName::PRINT,
        "(Ljava/lang/String;)V",
        &[0],
    ),
    character_method(
        BinaryName::PRINTSTREAM,
        UnqualifiedName::PRINTLN,
        "(Ljava/lang/String;)V",
        &[0],
    ),
    character_method(
        BinaryName::STRINGWRITER,
        UnqualifiedName::WRITE,
        "(Ljava/lang/String;)V",
        &[0],
    ),
    character_method(
        BinaryName::STRINGBUFFER,
        UnqualifiedName::APPEND,
        "(Ljava/lang/String;)Ljava/lang/StringBuffer;",
        &[0],
    ),
    character_method(
        BinaryName::STRINGBUILDER,
        UnqualifiedName::APPEND,
        "(Ljava/lang/String;)Ljava/lang/StringBuilder;",
        &[0],
    ),
    character_method(
        BinaryName::STRING,
        UnqualifiedName::REPLACE,
        "(Ljava/lang/CharSequence;Ljava/lang/CharSequence;)Ljava/lang/String;",
        &[0, 1],
    ),
];

fn is_builder(class: &BinaryName) -> bool {
    *class == BinaryName::STRINGBUILDER || *class == BinaryName::STRINGBUFFER
}

fn returns_builder(method: &MethodRef) -> bool {
    method
        .descriptor
        .return_type
        .as_ref()
        .and_then(FieldType::class_name)
        .map_or(false, is_builder)
}

/// Finds one-character string literals passed where a `char` would do
///
/// `s.indexOf("x")` and `sb.append("x")` have `char` overloads that skip the string machinery.
/// Appends that are part of an inline concatenation are left alone.
pub struct UseCharacterParameterizedMethod {
    propagate_call_chains: bool,
    pending_tag: Option<BuilderTag>,
    findings: Vec<Finding>,
}

impl UseCharacterParameterizedMethod {
    pub fn new(settings: &Settings) -> UseCharacterParameterizedMethod {
        UseCharacterParameterizedMethod {
            propagate_call_chains: settings.propagate_call_chains,
            pending_tag: None,
            findings: vec![],
        }
    }

    fn is_one_character_literal(event: &BeforeEffect<BuilderTag>, depth: usize) -> bool {
        event
            .stack()
            .peek(depth)
            .and_then(|item| item.string_constant())
            .map_or(false, |value| value.encode_utf16().count() == 1)
    }

    fn is_inline_append(event: &BeforeEffect<BuilderTag>, method: &MethodRef) -> bool {
        if !is_builder(&method.class) {
            return false;
        }
        let stack = event.stack();
        stack.depth() <= 1
            || stack.peek(1).and_then(|item| item.tag) == Some(BuilderTag::Inline)
    }
}

impl Detector for UseCharacterParameterizedMethod {
    type Tag = BuilderTag;

    fn visit_method(&mut self, method: &MethodContext) -> bool {
        self.pending_tag = None;
        method
            .code
            .contains(|insn| matches!(insn, Instruction::Ldc(_)))
    }

    fn before_effect(&mut self, event: &BeforeEffect<BuilderTag>) -> Result<(), HookError> {
        let method = match event.instruction {
            Instruction::Invoke(InvokeType::Virtual | InvokeType::Interface, _) => {
                match event.invoked() {
                    Some(method) => method,
                    None => return Ok(()),
                }
            }
            _ => return Ok(()),
        };

        let descriptor = method.descriptor.render();
        let entry = CHARACTER_METHODS.iter().find(|entry| {
            entry.class == method.class
                && entry.name == method.name
                && entry.descriptor == descriptor
        });
        if let Some(entry) = entry {
            let all_literals = entry
                .string_arguments
                .iter()
                .all(|depth| Self::is_one_character_literal(event, *depth));
            let exempt = entry.string_arguments.len() == 1 && Self::is_inline_append(event, method);
            if all_literals && !exempt {
                log::debug!("{} called with a one character literal", method);
                self.findings.push(Finding::at(
                    BugKind::UseCharacterParameterizedMethod,
                    Priority::Normal,
                    event.method,
                    event.offset,
                ));
            }
        }

        if self.propagate_call_chains
            && matches!(event.instruction, Instruction::Invoke(InvokeType::Virtual, _))
            && returns_builder(method)
        {
            self.pending_tag = event
                .stack()
                .peek(method.descriptor.parameters.len())
                .and_then(|receiver| receiver.tag);
        }
        Ok(())
    }

    fn after_effect(&mut self, event: &mut AfterEffect<BuilderTag>) -> Result<(), HookError> {
        if let Some(tag) = self.pending_tag.take() {
            event.set_top_tag(tag);
            return Ok(());
        }

        match event.instruction {
            Instruction::New(_) => {
                let is_new_builder = event
                    .resolved
                    .and_then(|resolved| resolved.class())
                    .and_then(|class| class.class_name())
                    .map_or(false, is_builder);
                if is_new_builder {
                    event.set_top_tag(BuilderTag::Inline);
                }
            }

            // Once a builder is in a local variable, it is no longer an inline concatenation
            Instruction::Load(LocalType::Reference, _) => {
                event.clear_top_tag();
            }

            _ => (),
        }
        Ok(())
    }
}

impl BugDetector for UseCharacterParameterizedMethod {
    fn take_findings(&mut self) -> Vec<Finding> {
        std::mem::take(&mut self.findings)
    }
}
