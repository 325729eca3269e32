//! Hand-assembled methods for detector tests

use crate::analysis::MethodContext;
use crate::jvm::class_file::{Constant, ConstantIndex, ConstantPool};
use crate::jvm::code::{Code, Instruction};
use crate::jvm::{
    BinaryName, MethodAccessFlags, MethodDescriptor, Name, ParseDescriptor, UnqualifiedName,
};
use crate::util::Offset;

#[derive(Default)]
pub struct PoolBuilder {
    entries: Vec<Constant>,
}

impl PoolBuilder {
    fn push(&mut self, constant: Constant) -> ConstantIndex {
        let index = self.entries.len() as u16 + 1;
        self.entries.push(constant);
        ConstantIndex(index)
    }

    pub fn utf8(&mut self, value: &str) -> ConstantIndex {
        self.push(Constant::Utf8(String::from(value)))
    }

    pub fn class(&mut self, name: &str) -> ConstantIndex {
        let name = self.utf8(name);
        self.push(Constant::Class(name))
    }

    pub fn string(&mut self, value: &str) -> ConstantIndex {
        let value = self.utf8(value);
        self.push(Constant::String(value))
    }

    fn name_and_type(&mut self, name: &str, descriptor: &str) -> ConstantIndex {
        let name = self.utf8(name);
        let descriptor = self.utf8(descriptor);
        self.push(Constant::NameAndType { name, descriptor })
    }

    pub fn method(&mut self, class: &str, name: &str, descriptor: &str) -> ConstantIndex {
        let class = self.class(class);
        let name_and_type = self.name_and_type(name, descriptor);
        self.push(Constant::MethodRef {
            class,
            name_and_type,
        })
    }

    pub fn field(&mut self, class: &str, name: &str, descriptor: &str) -> ConstantIndex {
        let class = self.class(class);
        let name_and_type = self.name_and_type(name, descriptor);
        self.push(Constant::FieldRef {
            class,
            name_and_type,
        })
    }

    pub fn build(self) -> ConstantPool {
        ConstantPool::from_entries(self.entries)
    }
}

/// Method with one instruction per offset, all on line `offset + 1`
pub struct TestMethod {
    pub class: BinaryName,
    pub name: UnqualifiedName,
    pub descriptor: MethodDescriptor,
    pub access_flags: MethodAccessFlags,
    pub code: Code,
}

impl TestMethod {
    pub fn new(class: &str, descriptor: &str, instructions: Vec<Instruction>) -> TestMethod {
        let instructions: Vec<(Offset, Instruction)> = instructions
            .into_iter()
            .enumerate()
            .map(|(idx, insn)| (Offset(idx), insn))
            .collect();
        let line_numbers = instructions
            .iter()
            .map(|(offset, _)| (*offset, offset.0 as u16 + 1))
            .collect();
        TestMethod {
            class: BinaryName::from_string(String::from(class)).unwrap(),
            name: UnqualifiedName::from_string(String::from("test")).unwrap(),
            descriptor: MethodDescriptor::parse(descriptor).unwrap(),
            access_flags: MethodAccessFlags::PUBLIC,
            code: Code {
                instructions,
                line_numbers,
                ..Code::default()
            },
        }
    }

    pub fn make_static(mut self) -> TestMethod {
        self.access_flags |= MethodAccessFlags::STATIC;
        self
    }

    pub fn context(&self) -> MethodContext {
        MethodContext {
            class: &self.class,
            name: &self.name,
            descriptor: &self.descriptor,
            access_flags: self.access_flags,
            code: &self.code,
        }
    }
}
