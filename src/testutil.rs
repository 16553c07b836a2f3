//! Byte-level builder for synthetic class files used in tests.

use std::collections::HashMap;

use crate::constant_pool::{
    CONSTANT_CLASS, CONSTANT_FIELDREF, CONSTANT_LONG, CONSTANT_METHODREF, CONSTANT_NAME_AND_TYPE,
    CONSTANT_STRING, CONSTANT_UTF8,
};
use crate::ir::AccessFlags;

pub(crate) type RawAttribute = (String, Vec<u8>);

pub(crate) struct ClassBuilder {
    major: u16,
    access: u16,
    this_class: u16,
    super_class: u16,
    interfaces: Vec<u16>,
    entries: Vec<u8>,
    next_index: u16,
    cache: HashMap<(u8, String), u16>,
    fields: Vec<(u16, String, String, Vec<RawAttribute>)>,
    methods: Vec<(u16, String, String, Vec<RawAttribute>)>,
    attributes: Vec<RawAttribute>,
}

impl ClassBuilder {
    /// Public class extending `java/lang/Object`, major version 52.
    pub(crate) fn new(name: &str) -> Self {
        let mut builder = Self {
            major: 52,
            access: AccessFlags::PUBLIC | 0x0020,
            this_class: 0,
            super_class: 0,
            interfaces: Vec::new(),
            entries: Vec::new(),
            next_index: 1,
            cache: HashMap::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            attributes: Vec::new(),
        };
        builder.this_class = builder.class(name);
        builder.super_class = builder.class("java/lang/Object");
        builder
    }

    pub(crate) fn major(&mut self, major: u16) -> &mut Self {
        self.major = major;
        self
    }

    pub(crate) fn access(&mut self, access: u16) -> &mut Self {
        self.access = access;
        self
    }

    pub(crate) fn super_class(&mut self, name: Option<&str>) -> &mut Self {
        self.super_class = match name {
            Some(name) => self.class(name),
            None => 0,
        };
        self
    }

    pub(crate) fn interface(&mut self, name: &str) -> &mut Self {
        let index = self.class(name);
        self.interfaces.push(index);
        self
    }

    fn push_entry(&mut self, tag: u8, key: String, payload: &[u8], slots: u16) -> u16 {
        if let Some(index) = self.cache.get(&(tag, key.clone())) {
            return *index;
        }
        let index = self.next_index;
        self.entries.push(tag);
        self.entries.extend_from_slice(payload);
        self.next_index += slots;
        self.cache.insert((tag, key), index);
        index
    }

    pub(crate) fn utf8(&mut self, value: &str) -> u16 {
        let mut payload = (value.len() as u16).to_be_bytes().to_vec();
        payload.extend_from_slice(value.as_bytes());
        self.push_entry(CONSTANT_UTF8, value.to_string(), &payload, 1)
    }

    pub(crate) fn class(&mut self, name: &str) -> u16 {
        let name_index = self.utf8(name);
        self.push_entry(CONSTANT_CLASS, name.to_string(), &name_index.to_be_bytes(), 1)
    }

    pub(crate) fn string(&mut self, value: &str) -> u16 {
        let string_index = self.utf8(value);
        self.push_entry(CONSTANT_STRING, value.to_string(), &string_index.to_be_bytes(), 1)
    }

    pub(crate) fn long(&mut self, value: i64) -> u16 {
        self.push_entry(CONSTANT_LONG, value.to_string(), &value.to_be_bytes(), 2)
    }

    pub(crate) fn name_and_type(&mut self, name: &str, descriptor: &str) -> u16 {
        let name_index = self.utf8(name);
        let descriptor_index = self.utf8(descriptor);
        let mut payload = name_index.to_be_bytes().to_vec();
        payload.extend_from_slice(&descriptor_index.to_be_bytes());
        self.push_entry(
            CONSTANT_NAME_AND_TYPE,
            format!("{name}:{descriptor}"),
            &payload,
            1,
        )
    }

    fn member(&mut self, tag: u8, owner: &str, name: &str, descriptor: &str) -> u16 {
        let class_index = self.class(owner);
        let nat_index = self.name_and_type(name, descriptor);
        let mut payload = class_index.to_be_bytes().to_vec();
        payload.extend_from_slice(&nat_index.to_be_bytes());
        self.push_entry(tag, format!("{owner}.{name}:{descriptor}"), &payload, 1)
    }

    pub(crate) fn method_ref(&mut self, owner: &str, name: &str, descriptor: &str) -> u16 {
        self.member(CONSTANT_METHODREF, owner, name, descriptor)
    }

    pub(crate) fn field_ref(&mut self, owner: &str, name: &str, descriptor: &str) -> u16 {
        self.member(CONSTANT_FIELDREF, owner, name, descriptor)
    }

    pub(crate) fn add_field(
        &mut self,
        access: u16,
        name: &str,
        descriptor: &str,
        attributes: Vec<RawAttribute>,
    ) -> &mut Self {
        self.fields
            .push((access, name.to_string(), descriptor.to_string(), attributes));
        self
    }

    pub(crate) fn add_method(
        &mut self,
        access: u16,
        name: &str,
        descriptor: &str,
        attributes: Vec<RawAttribute>,
    ) -> &mut Self {
        self.methods
            .push((access, name.to_string(), descriptor.to_string(), attributes));
        self
    }

    pub(crate) fn add_attribute(&mut self, attribute: RawAttribute) -> &mut Self {
        self.attributes.push(attribute);
        self
    }

    pub(crate) fn code_attribute(&mut self, code: &[u8]) -> RawAttribute {
        self.code_body(code, None)
    }

    pub(crate) fn code_attribute_with_handler(&mut self, code: &[u8], catch_type: u16) -> RawAttribute {
        self.code_body(code, Some(catch_type))
    }

    fn code_body(&mut self, code: &[u8], catch_type: Option<u16>) -> RawAttribute {
        let mut body = Vec::new();
        body.extend_from_slice(&4u16.to_be_bytes());
        body.extend_from_slice(&4u16.to_be_bytes());
        body.extend_from_slice(&(code.len() as u32).to_be_bytes());
        body.extend_from_slice(code);
        match catch_type {
            Some(catch_type) => {
                body.extend_from_slice(&1u16.to_be_bytes());
                body.extend_from_slice(&0u16.to_be_bytes());
                body.extend_from_slice(&(code.len() as u16).to_be_bytes());
                body.extend_from_slice(&0u16.to_be_bytes());
                body.extend_from_slice(&catch_type.to_be_bytes());
            }
            None => body.extend_from_slice(&0u16.to_be_bytes()),
        }
        body.extend_from_slice(&0u16.to_be_bytes());
        ("Code".to_string(), body)
    }

    pub(crate) fn signature_attribute(&mut self, signature: &str) -> RawAttribute {
        let index = self.utf8(signature);
        ("Signature".to_string(), index.to_be_bytes().to_vec())
    }

    pub(crate) fn exceptions_attribute(&mut self, classes: &[&str]) -> RawAttribute {
        let mut body = (classes.len() as u16).to_be_bytes().to_vec();
        for class in classes {
            body.extend_from_slice(&self.class(class).to_be_bytes());
        }
        ("Exceptions".to_string(), body)
    }

    pub(crate) fn constant_value_attribute_long(&mut self, value: i64) -> RawAttribute {
        let index = self.long(value);
        ("ConstantValue".to_string(), index.to_be_bytes().to_vec())
    }

    /// `(inner, outer, simple name)` triples.
    pub(crate) fn inner_classes_attribute(&mut self, entries: &[(&str, &str, &str)]) -> RawAttribute {
        let mut body = (entries.len() as u16).to_be_bytes().to_vec();
        for (inner, outer, name) in entries {
            body.extend_from_slice(&self.class(inner).to_be_bytes());
            body.extend_from_slice(&self.class(outer).to_be_bytes());
            body.extend_from_slice(&self.utf8(name).to_be_bytes());
            body.extend_from_slice(&AccessFlags::PRIVATE.to_be_bytes());
        }
        ("InnerClasses".to_string(), body)
    }

    pub(crate) fn nest_members_attribute(&mut self, members: &[&str]) -> RawAttribute {
        let mut body = (members.len() as u16).to_be_bytes().to_vec();
        for member in members {
            body.extend_from_slice(&self.class(member).to_be_bytes());
        }
        ("NestMembers".to_string(), body)
    }

    /// Encoded `annotation` structure with the given element values.
    pub(crate) fn annotation(&mut self, descriptor: &str, elements: Vec<(&str, Vec<u8>)>) -> Vec<u8> {
        let mut bytes = self.utf8(descriptor).to_be_bytes().to_vec();
        bytes.extend_from_slice(&(elements.len() as u16).to_be_bytes());
        for (name, value) in elements {
            bytes.extend_from_slice(&self.utf8(name).to_be_bytes());
            bytes.extend_from_slice(&value);
        }
        bytes
    }

    pub(crate) fn enum_value(&mut self, descriptor: &str, constant: &str) -> Vec<u8> {
        let mut bytes = vec![b'e'];
        bytes.extend_from_slice(&self.utf8(descriptor).to_be_bytes());
        bytes.extend_from_slice(&self.utf8(constant).to_be_bytes());
        bytes
    }

    pub(crate) fn string_value(&mut self, value: &str) -> Vec<u8> {
        let mut bytes = vec![b's'];
        bytes.extend_from_slice(&self.utf8(value).to_be_bytes());
        bytes
    }

    pub(crate) fn class_value(&mut self, descriptor: &str) -> Vec<u8> {
        let mut bytes = vec![b'c'];
        bytes.extend_from_slice(&self.utf8(descriptor).to_be_bytes());
        bytes
    }

    pub(crate) fn array_value(&mut self, values: Vec<Vec<u8>>) -> Vec<u8> {
        let mut bytes = vec![b'['];
        bytes.extend_from_slice(&(values.len() as u16).to_be_bytes());
        for value in values {
            bytes.extend_from_slice(&value);
        }
        bytes
    }

    pub(crate) fn annotations_attribute(&mut self, visible: bool, annotations: &[Vec<u8>]) -> RawAttribute {
        let name = if visible {
            "RuntimeVisibleAnnotations"
        } else {
            "RuntimeInvisibleAnnotations"
        };
        let mut body = (annotations.len() as u16).to_be_bytes().to_vec();
        for annotation in annotations {
            body.extend_from_slice(annotation);
        }
        (name.to_string(), body)
    }

    /// Constant pool count followed by the encoded entries.
    pub(crate) fn pool_bytes(&self) -> Vec<u8> {
        let mut bytes = self.next_index.to_be_bytes().to_vec();
        bytes.extend_from_slice(&self.entries);
        bytes
    }

    pub(crate) fn build(&mut self) -> Vec<u8> {
        let fields = std::mem::take(&mut self.fields);
        let fields = self.encode_members(fields);
        let methods = std::mem::take(&mut self.methods);
        let methods = self.encode_members(methods);
        let attributes = std::mem::take(&mut self.attributes);
        let attributes = self.encode_attributes(attributes);

        let mut bytes = 0xcafe_babe_u32.to_be_bytes().to_vec();
        bytes.extend_from_slice(&0u16.to_be_bytes());
        bytes.extend_from_slice(&self.major.to_be_bytes());
        bytes.extend_from_slice(&self.pool_bytes());
        bytes.extend_from_slice(&self.access.to_be_bytes());
        bytes.extend_from_slice(&self.this_class.to_be_bytes());
        bytes.extend_from_slice(&self.super_class.to_be_bytes());
        bytes.extend_from_slice(&(self.interfaces.len() as u16).to_be_bytes());
        for interface in &self.interfaces {
            bytes.extend_from_slice(&interface.to_be_bytes());
        }
        bytes.extend_from_slice(&fields);
        bytes.extend_from_slice(&methods);
        bytes.extend_from_slice(&attributes);
        bytes
    }

    fn encode_members(&mut self, members: Vec<(u16, String, String, Vec<RawAttribute>)>) -> Vec<u8> {
        let mut bytes = (members.len() as u16).to_be_bytes().to_vec();
        for (access, name, descriptor, attributes) in members {
            bytes.extend_from_slice(&access.to_be_bytes());
            bytes.extend_from_slice(&self.utf8(&name).to_be_bytes());
            bytes.extend_from_slice(&self.utf8(&descriptor).to_be_bytes());
            bytes.extend_from_slice(&self.encode_attributes(attributes));
        }
        bytes
    }

    fn encode_attributes(&mut self, attributes: Vec<RawAttribute>) -> Vec<u8> {
        let mut bytes = (attributes.len() as u16).to_be_bytes().to_vec();
        for (name, body) in attributes {
            bytes.extend_from_slice(&self.utf8(&name).to_be_bytes());
            bytes.extend_from_slice(&(body.len() as u32).to_be_bytes());
            bytes.extend_from_slice(&body);
        }
        bytes
    }
}
