mod common;

use common::{op, with_index, with_jump, ClassWriter, ACC_PUBLIC, ACC_STATIC};
use opstack::analysis::{
    AfterEffect, ConstantValue, Detector, Diagnostic, HookError, MethodContext, NoDetector,
    NormalizerState, Simulator, ValueSlot,
};
use opstack::jvm::class_file::{ClassFile, Method};
use opstack::jvm::code::{Code, Instruction};
use opstack::jvm::{BinaryName, FieldType, UnqualifiedName};
use opstack::util::Offset;

/// Parse a class and decode one of its methods
fn decoded(bytes: &[u8], name: &str) -> (ClassFile, Method, Code) {
    let class = ClassFile::parse(bytes).unwrap();
    let method = class
        .methods
        .iter()
        .find(|method| method.name.as_ref() == name)
        .unwrap()
        .clone();
    let code = method.decode_code().unwrap().unwrap();
    (class, method, code)
}

fn context<'a>(class: &'a ClassFile, method: &'a Method, code: &'a Code) -> MethodContext<'a> {
    MethodContext {
        class: &class.this_class,
        name: &method.name,
        descriptor: &method.descriptor,
        access_flags: method.access_flags,
        code,
    }
}

/// Tags the result of every call, and re-tags the copy made by every `dup`
#[derive(Default)]
struct Tagger;

impl Detector for Tagger {
    type Tag = &'static str;

    fn after_effect(&mut self, event: &mut AfterEffect<&'static str>) -> Result<(), HookError> {
        match event.instruction {
            Instruction::Invoke(_, _) | Instruction::New(_) => {
                event.set_top_tag("original");
            }
            Instruction::Dup => {
                event.set_top_tag("copy");
            }
            _ => (),
        }
        Ok(())
    }
}

#[test]
fn length_of_stored_literal() {
    let mut class = ClassWriter::new("com/acme/Strings");
    let foo = class.string("foo");
    let length = class.method_ref("java/lang/String", "length", "()I");
    let mut code = vec![op::LDC, foo as u8, op::ASTORE_1, op::ALOAD_1];
    code.extend(with_index(op::INVOKEVIRTUAL, length));
    code.push(op::IRETURN);
    class.method(ACC_PUBLIC | ACC_STATIC, "length", "()I", code);
    let bytes = class.finish();

    let (class, method, code) = decoded(&bytes, "length");
    let instructions = &code.instructions;
    let context = context(&class, &method, &code);

    let mut simulator: Simulator<()> = Simulator::new(&class.constants);
    simulator.reset_for_method_entry(&context);
    for (offset, insn) in &instructions[..instructions.len() - 1] {
        simulator.advance(&context, *offset, insn, &mut NoDetector).unwrap();
    }

    assert_eq!(simulator.stack().depth(), 1);
    let top = simulator.stack().top().unwrap();
    assert_eq!(top.constant, None);
    assert_eq!(top.declared_type, Some(FieldType::int()));
    let producer = top.producer.as_ref().unwrap();
    assert_eq!(producer.class, BinaryName::STRING);
    assert_eq!(producer.name, UnqualifiedName::LENGTH);
    assert!(simulator.diagnostics().is_empty());
}

#[test]
fn store_then_load_is_identical() {
    let mut class = ClassWriter::new("com/acme/Strings");
    let to_string = class.method_ref("java/lang/Object", "toString", "()Ljava/lang/String;");
    let mut code = vec![op::ALOAD_0];
    code.extend(with_index(op::INVOKEVIRTUAL, to_string));
    code.extend([op::ASTORE_2, op::ALOAD_2, op::ARETURN]);
    class.method(ACC_PUBLIC, "show", "()Ljava/lang/String;", code);
    let bytes = class.finish();

    let (class, method, code) = decoded(&bytes, "show");
    let context = context(&class, &method, &code);
    let mut simulator: Simulator<&'static str> = Simulator::new(&class.constants);
    simulator.reset_for_method_entry(&context);

    let mut tagger = Tagger;
    let instructions = &code.instructions;
    for (offset, insn) in &instructions[..2] {
        simulator.advance(&context, *offset, insn, &mut tagger).unwrap();
    }
    let before: ValueSlot<&'static str> = simulator.stack().top().unwrap().clone();
    assert_eq!(before.tag, Some("original"));

    for (offset, insn) in &instructions[2..4] {
        simulator.advance(&context, *offset, insn, &mut tagger).unwrap();
    }
    let after = simulator.stack().top().unwrap();
    assert_eq!(after.constant, before.constant);
    assert_eq!(after.declared_type, before.declared_type);
    assert_eq!(after.producer, before.producer);
    assert_eq!(after.tag, before.tag);
    assert_eq!(after.register, Some(2));
}

#[test]
fn retagging_a_duplicate_leaves_the_original() {
    let mut class = ClassWriter::new("com/acme/Builders");
    let builder = class.class("java/lang/StringBuilder");
    let mut code = vec![];
    code.extend(with_index(op::NEW, builder));
    code.extend([op::DUP, op::RETURN]);
    class.method(ACC_PUBLIC | ACC_STATIC, "build", "()V", code);
    let bytes = class.finish();

    let (class, method, code) = decoded(&bytes, "build");
    let context = context(&class, &method, &code);
    let mut simulator: Simulator<&'static str> = Simulator::new(&class.constants);
    simulator.reset_for_method_entry(&context);
    let mut tagger = Tagger;
    for (offset, insn) in &code.instructions[..2] {
        simulator.advance(&context, *offset, insn, &mut tagger).unwrap();
    }

    let stack = simulator.stack();
    assert_eq!(stack.depth(), 2);
    assert_eq!(stack.peek(0).unwrap().tag, Some("copy"));
    assert_eq!(stack.peek(1).unwrap().tag, Some("original"));
    assert_eq!(
        stack.peek(1).unwrap().class_name(),
        Some(&BinaryName::STRINGBUILDER)
    );
}

#[test]
fn unresolvable_call_pushes_its_return_type() {
    let mut class = ClassWriter::new("com/acme/Holder");
    let get = class.method_ref("com/acme/Holder", "get.value", "()Ljava/lang/String;");
    let mut code = vec![op::ALOAD_0];
    code.extend(with_index(op::INVOKEVIRTUAL, get));
    code.push(op::ARETURN);
    class.method(ACC_PUBLIC, "show", "()Ljava/lang/String;", code);
    let bytes = class.finish();

    let (class, method, code) = decoded(&bytes, "show");
    let context = context(&class, &method, &code);
    let mut simulator: Simulator<()> = Simulator::new(&class.constants);
    simulator.reset_for_method_entry(&context);
    for (offset, insn) in &code.instructions[..2] {
        simulator.advance(&context, *offset, insn, &mut NoDetector).unwrap();
    }

    assert_eq!(simulator.stack().depth(), 1);
    let top = simulator.stack().top().unwrap();
    assert_eq!(top.producer, None);
    assert_eq!(top.declared_type, Some(FieldType::object(BinaryName::STRING)));
    assert_eq!(
        simulator.diagnostics(),
        &[Diagnostic::ResolutionMiss {
            offset: Offset(1),
            reference: String::from("get.value()Ljava/lang/String;"),
        }]
    );

    let mut simulator: Simulator<()> = Simulator::new(&class.constants);
    assert_eq!(simulator.run(&context, &mut NoDetector), Ok(true));
    assert_eq!(simulator.diagnostics().len(), 1);
}

#[test]
fn merging_tags() {
    let tagged = |tag: &'static str| ValueSlot {
        tag: Some(tag),
        ..ValueSlot::of_type(FieldType::object(BinaryName::STRING))
    };

    let same = tagged("x").merge(&tagged("x"));
    assert_eq!(same.tag, Some("x"));
    assert_eq!(same.declared_type, Some(FieldType::object(BinaryName::STRING)));

    let different = tagged("x").merge(&tagged("y"));
    assert_eq!(different.tag, None);
    assert_eq!(different.declared_type, Some(FieldType::object(BinaryName::STRING)));
}

#[test]
fn field_round_trip_loses_provenance() {
    let mut class = ClassWriter::new("com/acme/Holder");
    let to_string = class.method_ref("java/lang/Object", "toString", "()Ljava/lang/String;");
    let name = class.field_ref("com/acme/Holder", "name", "Ljava/lang/String;");
    let mut code = vec![op::ALOAD_0, op::ALOAD_0];
    code.extend(with_index(op::INVOKEVIRTUAL, to_string));
    code.extend(with_index(op::PUTFIELD, name));
    code.push(op::ALOAD_0);
    code.extend(with_index(op::GETFIELD, name));
    code.push(op::ARETURN);
    class.method(ACC_PUBLIC, "name", "()Ljava/lang/String;", code);
    let bytes = class.finish();

    let (class, method, code) = decoded(&bytes, "name");
    let context = context(&class, &method, &code);
    let mut simulator: Simulator<&'static str> = Simulator::new(&class.constants);
    simulator.reset_for_method_entry(&context);
    let mut tagger = Tagger;
    let instructions = &code.instructions;
    for (offset, insn) in &instructions[..instructions.len() - 1] {
        simulator.advance(&context, *offset, insn, &mut tagger).unwrap();
    }

    assert_eq!(simulator.stack().depth(), 1);
    let top = simulator.stack().top().unwrap();
    assert_eq!(top.producer, None);
    assert_eq!(top.tag, None);
    assert_eq!(top.declared_type, Some(FieldType::object(BinaryName::STRING)));
}

#[test]
fn ternary_literal_stored_to_local() {
    // static String pick(boolean c) { String s = c ? "a" : "b"; return s; }
    let mut class = ClassWriter::new("com/acme/Pick");
    let a = class.string("a");
    let b = class.string("b");
    let mut code = vec![op::ILOAD_0];
    code.extend(with_jump(op::IFEQ, 8)); // @1 -> @9
    code.extend([op::LDC, a as u8]); // @4
    code.extend(with_jump(op::GOTO, 5)); // @6 -> @11
    code.extend([op::LDC, b as u8]); // @9
    code.extend([op::ASTORE_1, op::ALOAD_1, op::ARETURN]); // @11
    class.method(ACC_PUBLIC | ACC_STATIC, "pick", "(Z)Ljava/lang/String;", code);
    let bytes = class.finish();

    let (class, method, code) = decoded(&bytes, "pick");
    let context = context(&class, &method, &code);
    let mut simulator: Simulator<()> = Simulator::new(&class.constants);
    let instructions = &code.instructions;
    simulator.reset_for_method_entry(&context);
    for (offset, insn) in &instructions[..instructions.len() - 1] {
        simulator.advance(&context, *offset, insn, &mut NoDetector).unwrap();
        if offset.0 == 4 {
            assert_eq!(
                simulator.normalizer_state(),
                NormalizerState::InTernary { pending: 1 }
            );
        }
    }

    assert_eq!(simulator.stack().depth(), 1);
    let local = simulator.locals().get(1).unwrap();
    assert_eq!(local.constant, None);
    assert_eq!(local.declared_type, Some(FieldType::object(BinaryName::STRING)));
    assert_eq!(simulator.normalizer_state(), NormalizerState::Entering);
}

#[test]
fn ternary_without_merging_keeps_fall_through() {
    let mut class = ClassWriter::new("com/acme/Pick");
    let a = class.string("a");
    let b = class.string("b");
    let mut code = vec![op::ILOAD_0];
    code.extend(with_jump(op::IFEQ, 8));
    code.extend([op::LDC, a as u8]);
    code.extend(with_jump(op::GOTO, 5));
    code.extend([op::LDC, b as u8]);
    code.extend([op::ASTORE_1, op::ALOAD_1, op::ARETURN]);
    class.method(ACC_PUBLIC | ACC_STATIC, "pick", "(Z)Ljava/lang/String;", code);
    let bytes = class.finish();

    let (class, method, code) = decoded(&bytes, "pick");
    let context = context(&class, &method, &code);
    let mut simulator: Simulator<()> =
        Simulator::new(&class.constants).with_ternary_normalization(false);
    assert_eq!(simulator.run(&context, &mut NoDetector), Ok(true));
    assert_eq!(
        simulator.locals().get(1).and_then(|slot| slot.constant.clone()),
        Some(ConstantValue::String(String::from("b")))
    );
}

#[test]
fn depth_stays_consistent() {
    let mut class = ClassWriter::new("com/acme/Counter");
    let code = vec![
        op::ICONST_0,
        op::ICONST_1,
        op::POP,
        op::BIPUSH,
        42,
        op::POP,
        op::IRETURN,
    ];
    class.method(ACC_PUBLIC | ACC_STATIC, "count", "()I", code);
    let bytes = class.finish();

    let (class, method, code) = decoded(&bytes, "count");
    let context = context(&class, &method, &code);
    let mut simulator: Simulator<()> = Simulator::new(&class.constants);
    simulator.reset_for_method_entry(&context);
    let mut depths = vec![];
    for (offset, insn) in &code.instructions {
        simulator.advance(&context, *offset, insn, &mut NoDetector).unwrap();
        depths.push(simulator.stack().depth());
    }
    assert_eq!(depths, vec![1, 2, 1, 2, 1, 0]);
}
