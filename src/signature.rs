//! Generic signature grammar for classes, methods and fields.

use crate::descriptors::{MAX_ARRAY_DIMENSIONS, MAX_TYPE_ARGUMENT_DEPTH};
use crate::error::DescriptorError;

/// Which production a signature string is parsed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignatureKind {
    Class,
    Method,
    Field,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JavaTypeSignature {
    Base(char),
    Reference(ReferenceTypeSignature),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferenceTypeSignature {
    Class(ClassTypeSignature),
    TypeVariable(String),
    /// Element type, never itself an array, with its dimension count.
    Array {
        dimensions: usize,
        component: Box<JavaTypeSignature>,
    },
}

/// `Lpkg/Outer<..>.Inner<..>;`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassTypeSignature {
    /// Erased internal name, inner segments joined with `$`.
    pub binary: String,
    pub segments: Vec<SimpleClassTypeSignature>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimpleClassTypeSignature {
    pub identifier: String,
    pub type_arguments: Vec<TypeArgument>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeArgument {
    Wildcard,
    Extends(ReferenceTypeSignature),
    Super(ReferenceTypeSignature),
    Exact(ReferenceTypeSignature),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeParameter {
    pub identifier: String,
    pub class_bound: Option<ReferenceTypeSignature>,
    pub interface_bounds: Vec<ReferenceTypeSignature>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassSignature {
    pub type_parameters: Vec<TypeParameter>,
    pub superclass: ClassTypeSignature,
    pub interfaces: Vec<ClassTypeSignature>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodSignature {
    pub type_parameters: Vec<TypeParameter>,
    pub parameters: Vec<JavaTypeSignature>,
    /// `None` for `V`.
    pub result: Option<JavaTypeSignature>,
    pub throws: Vec<ReferenceTypeSignature>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSignature(pub ReferenceTypeSignature);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signature {
    Class(ClassSignature),
    Method(MethodSignature),
    Field(FieldSignature),
}

impl Signature {
    pub fn kind(&self) -> SignatureKind {
        match self {
            Signature::Class(_) => SignatureKind::Class,
            Signature::Method(_) => SignatureKind::Method,
            Signature::Field(_) => SignatureKind::Field,
        }
    }

    /// Internal names of every class mentioned, in first-seen order.
    pub fn erased_binary_references(&self) -> Vec<String> {
        let mut out = Vec::new();
        match self {
            Signature::Class(class) => {
                collect_type_parameters(&class.type_parameters, &mut out);
                collect_class(&class.superclass, &mut out);
                for interface in &class.interfaces {
                    collect_class(interface, &mut out);
                }
            }
            Signature::Method(method) => {
                collect_type_parameters(&method.type_parameters, &mut out);
                for parameter in &method.parameters {
                    collect_java(parameter, &mut out);
                }
                if let Some(result) = &method.result {
                    collect_java(result, &mut out);
                }
                for thrown in &method.throws {
                    collect_reference(thrown, &mut out);
                }
            }
            Signature::Field(FieldSignature(reference)) => collect_reference(reference, &mut out),
        }
        out
    }
}

fn collect_type_parameters(parameters: &[TypeParameter], out: &mut Vec<String>) {
    for parameter in parameters {
        if let Some(bound) = &parameter.class_bound {
            collect_reference(bound, out);
        }
        for bound in &parameter.interface_bounds {
            collect_reference(bound, out);
        }
    }
}

fn collect_java(signature: &JavaTypeSignature, out: &mut Vec<String>) {
    if let JavaTypeSignature::Reference(reference) = signature {
        collect_reference(reference, out);
    }
}

fn collect_reference(signature: &ReferenceTypeSignature, out: &mut Vec<String>) {
    match signature {
        ReferenceTypeSignature::Class(class) => collect_class(class, out),
        ReferenceTypeSignature::TypeVariable(_) => {}
        ReferenceTypeSignature::Array { component, .. } => collect_java(component, out),
    }
}

fn collect_class(class: &ClassTypeSignature, out: &mut Vec<String>) {
    if !out.contains(&class.binary) {
        out.push(class.binary.clone());
    }
    for segment in &class.segments {
        for argument in &segment.type_arguments {
            match argument {
                TypeArgument::Wildcard => {}
                TypeArgument::Extends(reference)
                | TypeArgument::Super(reference)
                | TypeArgument::Exact(reference) => collect_reference(reference, out),
            }
        }
    }
}

pub fn parse(kind: SignatureKind, text: &str) -> Result<Signature, DescriptorError> {
    let mut parser = Parser {
        text,
        pos: 0,
        depth: 0,
    };
    let signature = match kind {
        SignatureKind::Class => Signature::Class(parser.class_signature()?),
        SignatureKind::Method => Signature::Method(parser.method_signature()?),
        SignatureKind::Field => Signature::Field(FieldSignature(parser.reference_type()?)),
    };
    if parser.pos != text.len() {
        return Err(parser.error("trailing characters"));
    }
    Ok(signature)
}

pub fn parse_class_signature(text: &str) -> Result<ClassSignature, DescriptorError> {
    match parse(SignatureKind::Class, text)? {
        Signature::Class(class) => Ok(class),
        _ => unreachable!("class production yields a class signature"),
    }
}

pub fn parse_method_signature(text: &str) -> Result<MethodSignature, DescriptorError> {
    match parse(SignatureKind::Method, text)? {
        Signature::Method(method) => Ok(method),
        _ => unreachable!("method production yields a method signature"),
    }
}

pub fn parse_field_signature(text: &str) -> Result<FieldSignature, DescriptorError> {
    match parse(SignatureKind::Field, text)? {
        Signature::Field(field) => Ok(field),
        _ => unreachable!("field production yields a field signature"),
    }
}

struct Parser<'a> {
    text: &'a str,
    pos: usize,
    depth: usize,
}

impl Parser<'_> {
    fn error(&self, reason: &str) -> DescriptorError {
        DescriptorError::Signature {
            input: self.text.to_string(),
            reason: format!("{reason} at offset {}", self.pos),
        }
    }

    fn peek(&self) -> Option<u8> {
        self.text.as_bytes().get(self.pos).copied()
    }

    fn expect(&mut self, expected: u8) -> Result<(), DescriptorError> {
        if self.peek() == Some(expected) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(&format!("expected '{}'", expected as char)))
        }
    }

    fn identifier(&mut self, allow_slash: bool) -> Result<String, DescriptorError> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            let stop = matches!(c, b'.' | b';' | b'[' | b'<' | b'>' | b':')
                || (c == b'/' && !allow_slash);
            if stop {
                break;
            }
            self.pos += 1;
        }
        if start == self.pos {
            return Err(self.error("empty identifier"));
        }
        Ok(self.text[start..self.pos].to_string())
    }

    fn class_signature(&mut self) -> Result<ClassSignature, DescriptorError> {
        let type_parameters = self.type_parameters()?;
        let superclass = self.class_type()?;
        let mut interfaces = Vec::new();
        while self.peek().is_some() {
            interfaces.push(self.class_type()?);
        }
        Ok(ClassSignature {
            type_parameters,
            superclass,
            interfaces,
        })
    }

    fn method_signature(&mut self) -> Result<MethodSignature, DescriptorError> {
        let type_parameters = self.type_parameters()?;
        self.expect(b'(')?;
        let mut parameters = Vec::new();
        loop {
            match self.peek() {
                Some(b')') => {
                    self.pos += 1;
                    break;
                }
                None => return Err(self.error("unterminated parameter list")),
                Some(_) => parameters.push(self.java_type()?),
            }
        }
        let result = if self.peek() == Some(b'V') {
            self.pos += 1;
            None
        } else {
            Some(self.java_type()?)
        };
        let mut throws = Vec::new();
        while self.peek() == Some(b'^') {
            self.pos += 1;
            let thrown = match self.peek() {
                Some(b'T') => self.type_variable()?,
                _ => ReferenceTypeSignature::Class(self.class_type()?),
            };
            throws.push(thrown);
        }
        Ok(MethodSignature {
            type_parameters,
            parameters,
            result,
            throws,
        })
    }

    fn type_parameters(&mut self) -> Result<Vec<TypeParameter>, DescriptorError> {
        let mut parameters = Vec::new();
        if self.peek() != Some(b'<') {
            return Ok(parameters);
        }
        self.pos += 1;
        while self.peek() != Some(b'>') {
            if self.peek().is_none() {
                return Err(self.error("unbalanced '<'"));
            }
            let identifier = self.identifier(false)?;
            self.expect(b':')?;
            let class_bound = match self.peek() {
                Some(b'L') | Some(b'T') | Some(b'[') => Some(self.reference_type()?),
                _ => None,
            };
            let mut interface_bounds = Vec::new();
            while self.peek() == Some(b':') {
                self.pos += 1;
                interface_bounds.push(self.reference_type()?);
            }
            parameters.push(TypeParameter {
                identifier,
                class_bound,
                interface_bounds,
            });
        }
        self.pos += 1;
        Ok(parameters)
    }

    fn java_type(&mut self) -> Result<JavaTypeSignature, DescriptorError> {
        match self.peek() {
            Some(c @ (b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z')) => {
                self.pos += 1;
                Ok(JavaTypeSignature::Base(c as char))
            }
            _ => Ok(JavaTypeSignature::Reference(self.reference_type()?)),
        }
    }

    fn reference_type(&mut self) -> Result<ReferenceTypeSignature, DescriptorError> {
        match self.peek() {
            Some(b'L') => Ok(ReferenceTypeSignature::Class(self.class_type()?)),
            Some(b'T') => self.type_variable(),
            Some(b'[') => {
                let dimensions = self.text.as_bytes()[self.pos..]
                    .iter()
                    .take_while(|b| **b == b'[')
                    .count();
                if dimensions > MAX_ARRAY_DIMENSIONS {
                    return Err(self.error("too many array dimensions"));
                }
                self.pos += dimensions;
                Ok(ReferenceTypeSignature::Array {
                    dimensions,
                    component: Box::new(self.java_type()?),
                })
            }
            Some(_) => Err(self.error("unknown type code")),
            None => Err(self.error("missing type")),
        }
    }

    fn type_variable(&mut self) -> Result<ReferenceTypeSignature, DescriptorError> {
        self.expect(b'T')?;
        let identifier = self.identifier(false)?;
        self.expect(b';')?;
        Ok(ReferenceTypeSignature::TypeVariable(identifier))
    }

    fn class_type(&mut self) -> Result<ClassTypeSignature, DescriptorError> {
        self.expect(b'L')?;
        let mut segments = Vec::new();
        let mut binary = String::new();
        let mut first = true;
        loop {
            let identifier = self.identifier(first)?;
            if !first {
                binary.push('$');
            }
            binary.push_str(&identifier);
            first = false;
            let type_arguments = self.type_arguments()?;
            segments.push(SimpleClassTypeSignature {
                identifier,
                type_arguments,
            });
            match self.peek() {
                Some(b'.') => self.pos += 1,
                Some(b';') => {
                    self.pos += 1;
                    break;
                }
                _ => return Err(self.error("unterminated class type")),
            }
        }
        Ok(ClassTypeSignature { binary, segments })
    }

    fn type_arguments(&mut self) -> Result<Vec<TypeArgument>, DescriptorError> {
        let mut arguments = Vec::new();
        if self.peek() != Some(b'<') {
            return Ok(arguments);
        }
        self.pos += 1;
        self.depth += 1;
        if self.depth > MAX_TYPE_ARGUMENT_DEPTH {
            return Err(self.error("type arguments nested too deeply"));
        }
        loop {
            let argument = match self.peek() {
                Some(b'>') => {
                    self.pos += 1;
                    break;
                }
                None => return Err(self.error("unbalanced '<'")),
                Some(b'*') => {
                    self.pos += 1;
                    TypeArgument::Wildcard
                }
                Some(b'+') => {
                    self.pos += 1;
                    TypeArgument::Extends(self.reference_type()?)
                }
                Some(b'-') => {
                    self.pos += 1;
                    TypeArgument::Super(self.reference_type()?)
                }
                Some(_) => TypeArgument::Exact(self.reference_type()?),
            };
            arguments.push(argument);
        }
        if arguments.is_empty() {
            return Err(self.error("empty type argument list"));
        }
        self.depth -= 1;
        Ok(arguments)
    }
}
