//! Assembling class files in memory, for feeding real bytes to the reader
#![allow(dead_code)]

use byteorder::{BigEndian, WriteBytesExt};
use std::collections::HashMap;

pub mod op {
    pub const ICONST_0: u8 = 0x03;
    pub const ICONST_1: u8 = 0x04;
    pub const BIPUSH: u8 = 0x10;
    pub const LDC: u8 = 0x12;
    pub const ILOAD_0: u8 = 0x1a;
    pub const ALOAD_0: u8 = 0x2a;
    pub const ALOAD_1: u8 = 0x2b;
    pub const ALOAD_2: u8 = 0x2c;
    pub const ALOAD_3: u8 = 0x2d;
    pub const ASTORE_1: u8 = 0x4c;
    pub const ASTORE_2: u8 = 0x4d;
    pub const ASTORE_3: u8 = 0x4e;
    pub const POP: u8 = 0x57;
    pub const DUP: u8 = 0x59;
    pub const IFEQ: u8 = 0x99;
    pub const GOTO: u8 = 0xa7;
    pub const IRETURN: u8 = 0xac;
    pub const ARETURN: u8 = 0xb0;
    pub const RETURN: u8 = 0xb1;
    pub const GETFIELD: u8 = 0xb4;
    pub const PUTFIELD: u8 = 0xb5;
    pub const INVOKEVIRTUAL: u8 = 0xb6;
    pub const INVOKESPECIAL: u8 = 0xb7;
    pub const INVOKESTATIC: u8 = 0xb8;
    pub const NEW: u8 = 0xbb;
    pub const ATHROW: u8 = 0xbf;
    pub const MONITORENTER: u8 = 0xc2;
    pub const MONITOREXIT: u8 = 0xc3;
}

pub const ACC_PUBLIC: u16 = 0x0001;
pub const ACC_STATIC: u16 = 0x0008;

/// Opcode followed by a two byte constant pool index
pub fn with_index(opcode: u8, index: u16) -> [u8; 3] {
    let [hi, lo] = index.to_be_bytes();
    [opcode, hi, lo]
}

/// Opcode followed by a two byte branch offset
pub fn with_jump(opcode: u8, delta: i16) -> [u8; 3] {
    let [hi, lo] = delta.to_be_bytes();
    [opcode, hi, lo]
}

struct MethodEntry {
    access_flags: u16,
    name: u16,
    descriptor: u16,
    code: Option<Vec<u8>>,
}

/// Builds a class with a constant pool that gets filled on demand
pub struct ClassWriter {
    constants: Vec<u8>,
    constant_count: u16,
    utf8s: HashMap<String, u16>,
    this_class: u16,
    super_class: u16,
    methods: Vec<MethodEntry>,
}

impl ClassWriter {
    pub fn new(name: &str) -> ClassWriter {
        let mut writer = ClassWriter {
            constants: vec![],
            constant_count: 1,
            utf8s: HashMap::new(),
            this_class: 0,
            super_class: 0,
            methods: vec![],
        };
        writer.this_class = writer.class(name);
        writer.super_class = writer.class("java/lang/Object");
        writer
    }

    fn push_constant(&mut self, tag: u8, body: &[u8]) -> u16 {
        let index = self.constant_count;
        self.constants.push(tag);
        self.constants.extend_from_slice(body);
        self.constant_count += 1;
        index
    }

    pub fn utf8(&mut self, value: &str) -> u16 {
        if let Some(index) = self.utf8s.get(value) {
            return *index;
        }
        let mut body = vec![];
        body.write_u16::<BigEndian>(value.len() as u16).unwrap();
        body.extend_from_slice(value.as_bytes());
        let index = self.push_constant(1, &body);
        self.utf8s.insert(value.to_owned(), index);
        index
    }

    pub fn class(&mut self, name: &str) -> u16 {
        let name = self.utf8(name);
        self.push_constant(7, &name.to_be_bytes())
    }

    pub fn string(&mut self, value: &str) -> u16 {
        let value = self.utf8(value);
        self.push_constant(8, &value.to_be_bytes())
    }

    fn member(&mut self, tag: u8, class: &str, name: &str, descriptor: &str) -> u16 {
        let class = self.class(class);
        let name = self.utf8(name);
        let descriptor = self.utf8(descriptor);
        let mut name_and_type = vec![];
        name_and_type.write_u16::<BigEndian>(name).unwrap();
        name_and_type.write_u16::<BigEndian>(descriptor).unwrap();
        let name_and_type = self.push_constant(12, &name_and_type);

        let mut body = vec![];
        body.write_u16::<BigEndian>(class).unwrap();
        body.write_u16::<BigEndian>(name_and_type).unwrap();
        self.push_constant(tag, &body)
    }

    pub fn field_ref(&mut self, class: &str, name: &str, descriptor: &str) -> u16 {
        self.member(9, class, name, descriptor)
    }

    pub fn method_ref(&mut self, class: &str, name: &str, descriptor: &str) -> u16 {
        self.member(10, class, name, descriptor)
    }

    pub fn interface_method_ref(&mut self, class: &str, name: &str, descriptor: &str) -> u16 {
        self.member(11, class, name, descriptor)
    }

    /// Add a method with a body, all on source line 1
    pub fn method(&mut self, access_flags: u16, name: &str, descriptor: &str, code: Vec<u8>) {
        let name = self.utf8(name);
        let descriptor = self.utf8(descriptor);
        self.utf8("Code");
        self.utf8("LineNumberTable");
        self.methods.push(MethodEntry {
            access_flags,
            name,
            descriptor,
            code: Some(code),
        });
    }

    /// Add an `abstract` method
    pub fn abstract_method(&mut self, name: &str, descriptor: &str) {
        let name = self.utf8(name);
        let descriptor = self.utf8(descriptor);
        self.methods.push(MethodEntry {
            access_flags: ACC_PUBLIC | 0x0400,
            name,
            descriptor,
            code: None,
        });
    }

    pub fn finish(mut self) -> Vec<u8> {
        let code_name = self.utf8("Code");
        let lines_name = self.utf8("LineNumberTable");

        let mut out = vec![];
        out.extend_from_slice(&[0xCA, 0xFE, 0xBA, 0xBE]);
        out.write_u16::<BigEndian>(0).unwrap();
        out.write_u16::<BigEndian>(52).unwrap();
        out.write_u16::<BigEndian>(self.constant_count).unwrap();
        out.extend_from_slice(&self.constants);
        out.write_u16::<BigEndian>(ACC_PUBLIC | 0x0020).unwrap();
        out.write_u16::<BigEndian>(self.this_class).unwrap();
        out.write_u16::<BigEndian>(self.super_class).unwrap();
        out.write_u16::<BigEndian>(0).unwrap(); // interfaces
        out.write_u16::<BigEndian>(0).unwrap(); // fields

        out.write_u16::<BigEndian>(self.methods.len() as u16).unwrap();
        for method in &self.methods {
            out.write_u16::<BigEndian>(method.access_flags).unwrap();
            out.write_u16::<BigEndian>(method.name).unwrap();
            out.write_u16::<BigEndian>(method.descriptor).unwrap();
            match &method.code {
                None => out.write_u16::<BigEndian>(0).unwrap(),
                Some(code) => {
                    out.write_u16::<BigEndian>(1).unwrap();

                    let mut lines = vec![];
                    lines.write_u16::<BigEndian>(1).unwrap();
                    lines.write_u16::<BigEndian>(0).unwrap();
                    lines.write_u16::<BigEndian>(1).unwrap();

                    let mut info = vec![];
                    info.write_u16::<BigEndian>(16).unwrap(); // max stack
                    info.write_u16::<BigEndian>(16).unwrap(); // max locals
                    info.write_u32::<BigEndian>(code.len() as u32).unwrap();
                    info.extend_from_slice(code);
                    info.write_u16::<BigEndian>(0).unwrap(); // exception table
                    info.write_u16::<BigEndian>(1).unwrap();
                    info.write_u16::<BigEndian>(lines_name).unwrap();
                    info.write_u32::<BigEndian>(lines.len() as u32).unwrap();
                    info.extend_from_slice(&lines);

                    out.write_u16::<BigEndian>(code_name).unwrap();
                    out.write_u32::<BigEndian>(info.len() as u32).unwrap();
                    out.extend_from_slice(&info);
                }
            }
        }

        out.write_u16::<BigEndian>(0).unwrap(); // class attributes
        out
    }
}
