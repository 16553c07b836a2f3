//! Class file parser producing [`ParsedClass`] values.
//!
//! Parsing is a single forward pass over the bytes that feeds a builder. The
//! builder records every referenced type, its package, and the subset of
//! packages visible through public or protected declarations. Method bodies
//! are only walked when the class shows signs of legacy reflective class
//! loading or carries class constants that nothing else accounts for.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use tracing::trace;

use crate::constant_pool::{Constant, ConstantPool};
use crate::crawl::{self, CrawlReference, CrawlTargets};
use crate::cursor::Cursor;
use crate::descriptors::{Descriptor, Descriptors, PackageRef, TypeRef};
use crate::error::ClassFileError;
use crate::ir::{
    AccessFlags, Annotation, ConstantValue, ElementValue, EnclosingMethod, FieldDef, InnerClass,
    JavaLevel, MethodDef, ParsedClass, Retention, TypeAnnotation,
};
use crate::signature::SignatureKind;

const MAGIC: u32 = 0xcafe_babe;
/// First major version with class literals compiled to `ldc`.
const JAVA5_MAJOR: u16 = 49;
const CLASS_DOLLAR: &str = "class$";
const FOR_NAME_DESCRIPTOR: &str = "(Ljava/lang/String;)Ljava/lang/Class;";

/// Options affecting what a parse records.
#[derive(Clone, Copy, Debug)]
pub struct ParseOptions {
    /// Resolve `Class.forName("a.b.C")` in method bodies into a reference.
    pub class_for_name: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            class_for_name: true,
        }
    }
}

/// Reads only the binary name a class file declares for itself.
pub fn declared_name(bytes: &[u8]) -> Result<String, ClassFileError> {
    let mut cursor = Cursor::new(bytes);
    if cursor.u4()? != MAGIC {
        return Err(ClassFileError::malformed("bad magic"));
    }
    cursor.skip(4)?;
    let pool = ConstantPool::parse(&mut cursor)?;
    cursor.skip(2)?;
    Ok(pool.class_name(cursor.u2()?)?.to_string())
}

/// Parser bound to one registry session.
pub struct ClassParser<'r> {
    registry: &'r Descriptors,
    options: ParseOptions,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Element {
    Class,
    Field,
    Method,
    Code,
}

#[derive(Default)]
struct Attributes {
    deprecated: bool,
    signature: Option<String>,
    annotations: Vec<Annotation>,
    parameter_annotations: Vec<Vec<Annotation>>,
    type_annotations: Vec<TypeAnnotation>,
    exceptions: Vec<TypeRef>,
    constant: Option<ConstantValue>,
    annotation_default: Option<ElementValue>,
    source_file: Option<String>,
    inner_classes: Vec<InnerClass>,
    enclosing_method: Option<EnclosingMethod>,
}

impl<'r> ClassParser<'r> {
    pub fn new(registry: &'r Descriptors, options: ParseOptions) -> Self {
        Self { registry, options }
    }

    pub fn parse(&self, bytes: &[u8]) -> Result<ParsedClass, ClassFileError> {
        let mut cursor = Cursor::new(bytes);
        let magic = cursor
            .u4()
            .map_err(|_| ClassFileError::malformed("missing class file header"))?;
        if magic != MAGIC {
            return Err(ClassFileError::malformed(format!("bad magic 0x{magic:08x}")));
        }
        let minor = cursor.u2()?;
        let major = cursor.u2()?;
        let pool = ConstantPool::parse(&mut cursor)?;

        let access = AccessFlags(cursor.u2()?);
        let this_name = pool.class_name(cursor.u2()?)?.to_string();
        let class_name = self.registry.checked_type_ref(&this_name)?;
        let super_index = cursor.u2()?;

        let mut builder = Builder {
            registry: self.registry,
            pool,
            referenced: BTreeSet::new(),
            imports: BTreeSet::new(),
            api: access.is_public().then(BTreeSet::new),
            code: Vec::new(),
            linkage: HashSet::new(),
            has_runtime_annotations: false,
            has_class_annotations: false,
        };

        if !access.is_module() {
            builder.refer_to(&class_name, AccessFlags(AccessFlags::PUBLIC));
        }

        let super_class = match builder.pool.optional_class_name(super_index)? {
            Some(name) => {
                let super_class = self.registry.checked_type_ref(name)?;
                builder.refer_to(&super_class, access);
                Some(super_class)
            }
            None if class_name.is_object() || access.is_module() => None,
            None => {
                return Err(ClassFileError::malformed(format!(
                    "{this_name} has no superclass"
                )));
            }
        };

        let interface_count = cursor.u2()?;
        let mut interfaces = Vec::with_capacity(interface_count as usize);
        for _ in 0..interface_count {
            let interface = self.registry.checked_type_ref(builder.pool.class_name(cursor.u2()?)?)?;
            builder.refer_to(&interface, access);
            interfaces.push(interface);
        }

        let mut has_class_dollar = false;

        let field_count = cursor.u2()?;
        let mut fields = Vec::with_capacity(field_count as usize);
        for _ in 0..field_count {
            let field_access = AccessFlags(cursor.u2()?);
            let name = builder.pool.utf8(cursor.u2()?)?.to_string();
            let descriptor = builder.member_descriptor(cursor.u2()?, field_access)?;
            has_class_dollar |= name.starts_with(CLASS_DOLLAR);
            let attributes = builder.attributes(&mut cursor, Element::Field, field_access)?;
            fields.push(FieldDef {
                access: field_access,
                name,
                descriptor,
                signature: attributes.signature,
                constant: attributes.constant,
                deprecated: attributes.deprecated,
                annotations: attributes.annotations,
                type_annotations: attributes.type_annotations,
            });
        }

        let method_count = cursor.u2()?;
        let mut methods = Vec::with_capacity(method_count as usize);
        let mut has_default_constructor = false;
        for _ in 0..method_count {
            let method_access = AccessFlags(cursor.u2()?);
            let name = builder.pool.utf8(cursor.u2()?)?.to_string();
            let descriptor = builder.member_descriptor(cursor.u2()?, method_access)?;
            has_class_dollar |= name.starts_with(CLASS_DOLLAR);
            if name == "<init>" && descriptor.as_str() == "()V" && method_access.is_public() {
                has_default_constructor = true;
            }
            let attributes = builder.attributes(&mut cursor, Element::Method, method_access)?;
            methods.push(MethodDef {
                access: method_access,
                name,
                descriptor,
                signature: attributes.signature,
                deprecated: attributes.deprecated,
                exceptions: attributes.exceptions,
                annotations: attributes.annotations,
                parameter_annotations: attributes.parameter_annotations,
                type_annotations: attributes.type_annotations,
                annotation_default: attributes.annotation_default,
            });
        }

        let class_attributes = builder.attributes(&mut cursor, Element::Class, access)?;

        builder.refer_pool_members()?;

        let for_name = if self.options.class_for_name {
            builder
                .pool
                .find_method_ref("java/lang/Class", "forName", FOR_NAME_DESCRIPTOR)
        } else {
            None
        };
        let class_dollar = builder
            .pool
            .find_method_ref(&this_name, CLASS_DOLLAR, FOR_NAME_DESCRIPTOR);
        let legacy_for_name = major < JAVA5_MAJOR && for_name.is_some();
        if legacy_for_name || has_class_dollar || builder.has_stray_class_constant()? {
            trace!(class = %class_name, "crawling method bodies");
            builder.crawl_code(CrawlTargets {
                for_name,
                class_dollar,
            })?;
        }

        let Builder {
            referenced,
            imports,
            api,
            has_runtime_annotations,
            has_class_annotations,
            ..
        } = builder;

        Ok(ParsedClass {
            class_name,
            super_class,
            interfaces,
            access,
            major,
            minor,
            java_level: JavaLevel::from_major(major),
            source_file: class_attributes.source_file,
            signature: class_attributes.signature,
            deprecated: class_attributes.deprecated,
            fields,
            methods,
            annotations: class_attributes.annotations,
            type_annotations: class_attributes.type_annotations,
            inner_classes: class_attributes.inner_classes,
            enclosing_method: class_attributes.enclosing_method,
            has_runtime_annotations,
            has_class_annotations,
            has_default_constructor,
            referenced,
            referenced_packages: imports,
            api_packages: api,
        })
    }
}

struct Builder<'a, 'r> {
    registry: &'r Descriptors,
    pool: ConstantPool,
    referenced: BTreeSet<TypeRef>,
    imports: BTreeSet<PackageRef>,
    api: Option<BTreeSet<PackageRef>>,
    code: Vec<&'a [u8]>,
    /// Class constants used only for nesting and access checks.
    linkage: HashSet<u16>,
    has_runtime_annotations: bool,
    has_class_annotations: bool,
}

impl<'a> Builder<'a, '_> {
    fn refer_to(&mut self, type_ref: &TypeRef, access: AccessFlags) {
        self.referenced.insert(type_ref.clone());
        if type_ref.is_primitive() {
            return;
        }
        let package = type_ref.package();
        if package.is_primitive() {
            return;
        }
        self.imports.insert(package.clone());
        if access.is_api() {
            if let Some(api) = self.api.as_mut() {
                api.insert(package.clone());
            }
        }
    }

    fn refer_class_constant(&mut self, index: u16, access: AccessFlags) -> Result<TypeRef, ClassFileError> {
        let type_ref = self.registry.checked_type_ref(self.pool.class_name(index)?)?;
        self.refer_to(&type_ref, access);
        Ok(type_ref)
    }

    fn refer_descriptor(&mut self, descriptor: &Descriptor, access: AccessFlags) {
        for type_ref in descriptor.referenced() {
            self.refer_to(type_ref, access);
        }
    }

    fn member_descriptor(
        &mut self,
        index: u16,
        access: AccessFlags,
    ) -> Result<Arc<Descriptor>, ClassFileError> {
        let descriptor = self.registry.descriptor(self.pool.utf8(index)?)?;
        self.refer_descriptor(&descriptor, access);
        Ok(descriptor)
    }

    /// Member references and name-and-type entries name types even when the
    /// bytecode using them is never walked.
    fn refer_pool_members(&mut self) -> Result<(), ClassFileError> {
        let mut owners = Vec::new();
        let mut descriptors = Vec::new();
        for (_, constant) in self.pool.iter() {
            match constant {
                Constant::FieldRef { class_index, .. }
                | Constant::MethodRef { class_index, .. }
                | Constant::InterfaceMethodRef { class_index, .. } => owners.push(*class_index),
                Constant::NameAndType {
                    descriptor_index, ..
                }
                | Constant::MethodType { descriptor_index } => {
                    descriptors.push(*descriptor_index)
                }
                _ => {}
            }
        }
        for owner in owners {
            self.refer_class_constant(owner, AccessFlags::default())?;
        }
        for index in descriptors {
            let descriptor = self.registry.descriptor(self.pool.utf8(index)?)?;
            self.refer_descriptor(&descriptor, AccessFlags::default());
        }
        Ok(())
    }

    fn has_stray_class_constant(&self) -> Result<bool, ClassFileError> {
        for (index, constant) in self.pool.iter() {
            if let Constant::Class { name_index } = constant {
                if self.linkage.contains(&index) {
                    continue;
                }
                let type_ref = self.registry.checked_type_ref(self.pool.utf8(*name_index)?)?;
                if self.referenced.contains(&type_ref) {
                    continue;
                }
                // Descriptors register the element type of an array, not the array.
                let mut element = &type_ref;
                while let Some(component) = element.component() {
                    element = component;
                }
                if !element.is_primitive() && !self.referenced.contains(element) {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    fn crawl_code(&mut self, targets: CrawlTargets) -> Result<(), ClassFileError> {
        let bodies = std::mem::take(&mut self.code);
        for code in bodies {
            for reference in crawl::crawl(code, &self.pool, targets)? {
                let type_ref = match reference {
                    CrawlReference::Class(binary) => self.registry.checked_type_ref(&binary)?,
                    CrawlReference::Reflective(fqn) => self.registry.checked_type_ref_from_fqn(&fqn)?,
                };
                self.refer_to(&type_ref, AccessFlags::default());
            }
        }
        Ok(())
    }

    fn attributes(
        &mut self,
        cursor: &mut Cursor<'a>,
        element: Element,
        access: AccessFlags,
    ) -> Result<Attributes, ClassFileError> {
        let mut attributes = Attributes::default();
        let count = cursor.u2()?;
        for _ in 0..count {
            let name = self.pool.utf8(cursor.u2()?)?.to_string();
            let length = cursor.attribute_length()?;
            let mut body = Cursor::new(cursor.bytes(length)?);
            self.attribute(&name, &mut body, element, access, &mut attributes)?;
        }
        Ok(attributes)
    }

    fn attribute(
        &mut self,
        name: &str,
        body: &mut Cursor<'a>,
        element: Element,
        access: AccessFlags,
        attributes: &mut Attributes,
    ) -> Result<(), ClassFileError> {
        match name {
            "Deprecated" => attributes.deprecated = true,
            "RuntimeVisibleAnnotations" => {
                let parsed = self.annotations(body, Retention::Runtime, access)?;
                attributes.annotations.extend(parsed);
            }
            "RuntimeInvisibleAnnotations" => {
                let parsed = self.annotations(body, Retention::Class, access)?;
                attributes.annotations.extend(parsed);
            }
            "RuntimeVisibleParameterAnnotations" => {
                self.parameter_annotations(body, Retention::Runtime, access, attributes)?
            }
            "RuntimeInvisibleParameterAnnotations" => {
                self.parameter_annotations(body, Retention::Class, access, attributes)?
            }
            "RuntimeVisibleTypeAnnotations" => {
                let parsed = self.type_annotations(body, Retention::Runtime, access)?;
                attributes.type_annotations.extend(parsed);
            }
            "RuntimeInvisibleTypeAnnotations" => {
                let parsed = self.type_annotations(body, Retention::Class, access)?;
                attributes.type_annotations.extend(parsed);
            }
            "InnerClasses" => attributes.inner_classes = self.inner_classes(body)?,
            "EnclosingMethod" => {
                let class = self.refer_class_constant(body.u2()?, AccessFlags::default())?;
                let method_index = body.u2()?;
                let method = if method_index == 0 {
                    None
                } else {
                    let (name, descriptor) = self.pool.name_and_type(method_index)?;
                    Some((name.to_string(), descriptor.to_string()))
                };
                attributes.enclosing_method = Some(EnclosingMethod { class, method });
            }
            "SourceFile" => attributes.source_file = Some(self.pool.utf8(body.u2()?)?.to_string()),
            "Code" => self.code_attribute(body)?,
            "Signature" => {
                let signature = self.pool.utf8(body.u2()?)?.to_string();
                let kind = match element {
                    Element::Class => Some(SignatureKind::Class),
                    Element::Field => Some(SignatureKind::Field),
                    Element::Method => Some(SignatureKind::Method),
                    Element::Code => None,
                };
                if let Some(kind) = kind {
                    if !access.is_synthetic() {
                        for type_ref in self.registry.signature_references(kind, &signature)? {
                            self.refer_to(&type_ref, access);
                        }
                    }
                    attributes.signature = Some(signature);
                }
            }
            "ConstantValue" => attributes.constant = Some(self.constant_value(body.u2()?)?),
            "AnnotationDefault" => {
                attributes.annotation_default =
                    Some(self.element_value(body, Retention::Runtime, access)?);
            }
            "Exceptions" => {
                let count = body.u2()?;
                for _ in 0..count {
                    let thrown = self.refer_class_constant(body.u2()?, access)?;
                    attributes.exceptions.push(thrown);
                }
            }
            "BootstrapMethods" => self.bootstrap_methods(body)?,
            "StackMapTable" => self.stack_map_table(body)?,
            "NestHost" => {
                self.linkage.insert(body.u2()?);
            }
            "NestMembers" => {
                let count = body.u2()?;
                for _ in 0..count {
                    self.linkage.insert(body.u2()?);
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn code_attribute(&mut self, body: &mut Cursor<'a>) -> Result<(), ClassFileError> {
        body.skip(4)?; // max_stack, max_locals
        let code_length = body.u4()? as usize;
        let code = body.bytes(code_length)?;
        self.code.push(code);

        let handlers = body.u2()?;
        for _ in 0..handlers {
            body.skip(6)?; // start_pc, end_pc, handler_pc
            let catch_type = body.u2()?;
            if catch_type != 0 {
                self.refer_class_constant(catch_type, AccessFlags::default())?;
            }
        }
        self.attributes(body, Element::Code, AccessFlags::default())?;
        Ok(())
    }

    fn inner_classes(&mut self, body: &mut Cursor<'a>) -> Result<Vec<InnerClass>, ClassFileError> {
        let count = body.u2()?;
        let mut inner_classes = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let inner_index = body.u2()?;
            let outer_index = body.u2()?;
            let name_index = body.u2()?;
            let access = AccessFlags(body.u2()?);
            self.linkage.insert(inner_index);
            if outer_index != 0 {
                self.linkage.insert(outer_index);
            }
            let inner = self.registry.checked_type_ref(self.pool.class_name(inner_index)?)?;
            let outer = self
                .pool
                .optional_class_name(outer_index)?
                .map(|name| self.registry.checked_type_ref(name))
                .transpose()?;
            let simple_name = if name_index == 0 {
                None
            } else {
                Some(self.pool.utf8(name_index)?.to_string())
            };
            inner_classes.push(InnerClass {
                inner,
                outer,
                simple_name,
                access,
            });
        }
        Ok(inner_classes)
    }

    fn bootstrap_methods(&mut self, body: &mut Cursor<'a>) -> Result<(), ClassFileError> {
        let count = body.u2()?;
        for _ in 0..count {
            body.skip(2)?; // bootstrap_method_ref
            let arguments = body.u2()?;
            for _ in 0..arguments {
                let index = body.u2()?;
                if matches!(self.pool.get(index)?, Constant::Class { .. }) {
                    self.refer_class_constant(index, AccessFlags::default())?;
                }
            }
        }
        Ok(())
    }

    fn stack_map_table(&mut self, body: &mut Cursor<'a>) -> Result<(), ClassFileError> {
        let entries = body.u2()?;
        for _ in 0..entries {
            let frame_type = body.u1()?;
            match frame_type {
                0..=63 => {}
                64..=127 => self.verification_types(body, 1)?,
                247 => {
                    body.skip(2)?;
                    self.verification_types(body, 1)?;
                }
                248..=251 => body.skip(2)?,
                252..=254 => {
                    body.skip(2)?;
                    self.verification_types(body, (frame_type - 251) as usize)?;
                }
                255 => {
                    body.skip(2)?;
                    let locals = body.u2()? as usize;
                    self.verification_types(body, locals)?;
                    let stack = body.u2()? as usize;
                    self.verification_types(body, stack)?;
                }
                _ => {
                    return Err(ClassFileError::malformed(format!(
                        "reserved stack map frame type {frame_type}"
                    )));
                }
            }
        }
        Ok(())
    }

    fn verification_types(&mut self, body: &mut Cursor<'a>, count: usize) -> Result<(), ClassFileError> {
        for _ in 0..count {
            match body.u1()? {
                // Object
                7 => {
                    self.refer_class_constant(body.u2()?, AccessFlags::default())?;
                }
                // Uninitialized
                8 => body.skip(2)?,
                0..=6 => {}
                tag => {
                    return Err(ClassFileError::malformed(format!(
                        "unknown verification type {tag}"
                    )));
                }
            }
        }
        Ok(())
    }

    fn constant_value(&self, index: u16) -> Result<ConstantValue, ClassFileError> {
        let value = match self.pool.get(index)? {
            Constant::Integer(value) => ConstantValue::Integer(*value),
            Constant::Float(value) => ConstantValue::Float(*value),
            Constant::Long(value) => ConstantValue::Long(*value),
            Constant::Double(value) => ConstantValue::Double(*value),
            Constant::String { string_index } => {
                ConstantValue::String(self.pool.utf8(*string_index)?.to_string())
            }
            Constant::Utf8(value) => ConstantValue::String(value.clone()),
            other => {
                return Err(ClassFileError::malformed(format!(
                    "constant pool index {index} is not a constant value (tag {:?})",
                    other.tag()
                )));
            }
        };
        Ok(value)
    }

    fn annotations(
        &mut self,
        body: &mut Cursor<'a>,
        retention: Retention,
        access: AccessFlags,
    ) -> Result<Vec<Annotation>, ClassFileError> {
        let count = body.u2()?;
        let mut annotations = Vec::with_capacity(count as usize);
        for _ in 0..count {
            annotations.push(self.annotation(body, retention, access)?);
        }
        Ok(annotations)
    }

    fn parameter_annotations(
        &mut self,
        body: &mut Cursor<'a>,
        retention: Retention,
        access: AccessFlags,
        attributes: &mut Attributes,
    ) -> Result<(), ClassFileError> {
        let parameters = body.u1()? as usize;
        if attributes.parameter_annotations.len() < parameters {
            attributes
                .parameter_annotations
                .resize_with(parameters, Vec::new);
        }
        for parameter in 0..parameters {
            let parsed = self.annotations(body, retention, access)?;
            attributes.parameter_annotations[parameter].extend(parsed);
        }
        Ok(())
    }

    fn type_annotations(
        &mut self,
        body: &mut Cursor<'a>,
        retention: Retention,
        access: AccessFlags,
    ) -> Result<Vec<TypeAnnotation>, ClassFileError> {
        let count = body.u2()?;
        let mut annotations = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let target_type = body.u1()?;
            skip_target_info(body, target_type)?;
            let path_length = body.u1()? as usize;
            body.skip(path_length * 2)?;
            let annotation = self.annotation(body, retention, access)?;
            annotations.push(TypeAnnotation {
                target_type,
                annotation,
            });
        }
        Ok(annotations)
    }

    fn annotation(
        &mut self,
        body: &mut Cursor<'a>,
        retention: Retention,
        access: AccessFlags,
    ) -> Result<Annotation, ClassFileError> {
        let type_ref = self.registry.checked_type_ref(self.pool.utf8(body.u2()?)?)?;
        match retention {
            Retention::Runtime => {
                self.refer_to(&type_ref, access);
                self.has_runtime_annotations = true;
            }
            Retention::Class => self.has_class_annotations = true,
        }
        let pairs = body.u2()?;
        let mut elements = Vec::with_capacity(pairs as usize);
        for _ in 0..pairs {
            let name = self.pool.utf8(body.u2()?)?.to_string();
            let value = self.element_value(body, retention, access)?;
            elements.push((name, value));
        }
        Ok(Annotation {
            type_ref,
            retention,
            elements,
        })
    }

    fn element_value(
        &mut self,
        body: &mut Cursor<'a>,
        retention: Retention,
        access: AccessFlags,
    ) -> Result<ElementValue, ClassFileError> {
        let tag = body.u1()? as char;
        let value = match tag {
            'B' | 'C' | 'D' | 'F' | 'I' | 'J' | 'S' | 'Z' => ElementValue::Constant {
                tag,
                value: self.constant_value(body.u2()?)?,
            },
            's' => ElementValue::Constant {
                tag,
                value: ConstantValue::String(self.pool.utf8(body.u2()?)?.to_string()),
            },
            'e' => {
                let type_ref = self.registry.checked_type_ref(self.pool.utf8(body.u2()?)?)?;
                let constant = self.pool.utf8(body.u2()?)?.to_string();
                if retention == Retention::Runtime {
                    self.refer_to(&type_ref, access);
                }
                ElementValue::Enum { type_ref, constant }
            }
            'c' => {
                let descriptor = self.pool.utf8(body.u2()?)?.to_string();
                if retention == Retention::Runtime {
                    let parsed = self.registry.descriptor(&descriptor)?;
                    self.refer_descriptor(&parsed, access);
                }
                ElementValue::Class(descriptor)
            }
            '@' => ElementValue::Annotation(Box::new(self.annotation(body, retention, access)?)),
            '[' => {
                let count = body.u2()?;
                let mut values = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    values.push(self.element_value(body, retention, access)?);
                }
                ElementValue::Array(values)
            }
            other => {
                return Err(ClassFileError::malformed(format!(
                    "unknown element value tag '{other}'"
                )));
            }
        };
        Ok(value)
    }
}

/// Skips the `target_info` union of a type annotation.
fn skip_target_info(body: &mut Cursor<'_>, target_type: u8) -> Result<(), ClassFileError> {
    let size = match target_type {
        // type parameter
        0x00 | 0x01 => 1,
        // supertype
        0x10 => 2,
        // type parameter bound
        0x11 | 0x12 => 2,
        // empty target
        0x13..=0x15 => 0,
        // formal parameter
        0x16 => 1,
        // throws
        0x17 => 2,
        // local variable tables
        0x40 | 0x41 => {
            let entries = body.u2()? as usize;
            entries * 6
        }
        // catch
        0x42 => 2,
        // offset
        0x43..=0x46 => 2,
        // type argument
        0x47..=0x4b => 3,
        other => {
            return Err(ClassFileError::malformed(format!(
                "unknown type annotation target 0x{other:02x}"
            )));
        }
    };
    body.skip(size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcodes;
    use crate::testutil::ClassBuilder;

    fn parse(registry: &Descriptors, bytes: &[u8]) -> ParsedClass {
        ClassParser::new(registry, ParseOptions::default())
            .parse(bytes)
            .expect("parse class")
    }

    fn fqns(types: &BTreeSet<TypeRef>) -> Vec<String> {
        types.iter().map(|t| t.fqn().to_string()).collect()
    }

    fn packages(packages: impl IntoIterator<Item = PackageRef>) -> Vec<String> {
        packages.into_iter().map(|p| p.fqn().to_string()).collect()
    }

    #[test]
    fn rejects_bad_magic_and_truncation() {
        let registry = Descriptors::new();
        let parser = ClassParser::new(&registry, ParseOptions::default());
        assert!(matches!(
            parser.parse(b"nope"),
            Err(ClassFileError::Malformed(_))
        ));
        let bytes = ClassBuilder::new("com/acme/Foo").build();
        assert!(parser.parse(&bytes[..bytes.len() - 3]).is_err());
    }

    #[test]
    fn declared_name_reads_this_class() {
        let bytes = ClassBuilder::new("com/acme/Foo").build();
        assert_eq!(declared_name(&bytes).expect("name"), "com/acme/Foo");
        assert!(declared_name(b"\xca\xfe").is_err());
    }

    #[test]
    fn minimal_class_references_itself_and_super() {
        let registry = Descriptors::new();
        let bytes = ClassBuilder::new("com/acme/Foo").build();
        let class = parse(&registry, &bytes);

        assert_eq!(class.class_name.fqn(), "com.acme.Foo");
        assert_eq!(class.super_class.as_ref().map(|t| t.fqn()), Some("java.lang.Object"));
        assert_eq!(class.java_level, JavaLevel::Java8);
        assert_eq!(fqns(&class.referenced), vec!["com.acme.Foo", "java.lang.Object"]);
        assert_eq!(
            packages(class.referenced_packages.clone()),
            vec!["com.acme", "java.lang"]
        );
        assert_eq!(
            packages(class.api_packages().cloned()),
            vec!["com.acme", "java.lang"]
        );
    }

    #[test]
    fn parsing_is_deterministic() {
        let registry = Descriptors::new();
        let mut builder = ClassBuilder::new("com/acme/Foo");
        builder.add_field(AccessFlags::PUBLIC, "items", "Ljava/util/List;", Vec::new());
        let bytes = builder.build();
        assert_eq!(parse(&registry, &bytes), parse(&registry, &bytes));
    }

    #[test]
    fn synthetic_class_bytes_are_well_formed() {
        let mut builder = ClassBuilder::new("com/acme/Foo");
        let code = builder.code_attribute(&[0xb1]);
        builder.add_method(AccessFlags::PUBLIC, "run", "()V", vec![code]);
        let bytes = builder.build();
        assert!(jclassfile::class_file::parse(&bytes).is_ok());
    }

    #[test]
    fn private_members_stay_out_of_api() {
        let registry = Descriptors::new();
        let mut builder = ClassBuilder::new("com/acme/Foo");
        builder.add_field(AccessFlags::PRIVATE, "hidden", "Lorg/hidden/Impl;", Vec::new());
        builder.add_method(
            AccessFlags::PUBLIC,
            "open",
            "(Lorg/api/Request;)Lorg/api/Response;",
            Vec::new(),
        );
        let class = parse(&registry, &builder.build());

        let referenced = packages(class.referenced_packages.clone());
        assert!(referenced.contains(&"org.hidden".to_string()));
        assert!(referenced.contains(&"org.api".to_string()));
        let api = packages(class.api_packages().cloned());
        assert!(api.contains(&"org.api".to_string()));
        assert!(!api.contains(&"org.hidden".to_string()));
    }

    #[test]
    fn non_public_class_has_no_api() {
        let registry = Descriptors::new();
        let mut builder = ClassBuilder::new("com/acme/Foo");
        builder.access(AccessFlags::SYNTHETIC);
        builder.add_method(AccessFlags::PUBLIC, "open", "()Lorg/api/Response;", Vec::new());
        let class = parse(&registry, &builder.build());
        assert!(class.api_packages.is_none());
        assert!(class
            .referenced_packages
            .contains(&registry.package_ref("org.api")));
    }

    #[test]
    fn module_descriptor_skips_self_reference() {
        let registry = Descriptors::new();
        let mut builder = ClassBuilder::new("module-info");
        builder.access(AccessFlags::MODULE);
        builder.super_class(None);
        let class = parse(&registry, &builder.build());
        assert!(class.is_module());
        assert!(class.referenced.is_empty());
    }

    #[test]
    fn missing_superclass_is_malformed() {
        let registry = Descriptors::new();
        let mut builder = ClassBuilder::new("com/acme/Foo");
        builder.super_class(None);
        let parser = ClassParser::new(&registry, ParseOptions::default());
        assert!(parser.parse(&builder.build()).is_err());
    }

    #[test]
    fn pool_member_references_are_registered() {
        let registry = Descriptors::new();
        let mut builder = ClassBuilder::new("com/acme/Foo");
        builder.method_ref("org/util/Helper", "help", "(Lorg/model/Item;)V");
        builder.field_ref("org/config/Settings", "INSTANCE", "Lorg/config/Settings;");
        let class = parse(&registry, &builder.build());
        let referenced = fqns(&class.referenced);
        assert!(referenced.contains(&"org.util.Helper".to_string()));
        assert!(referenced.contains(&"org.model.Item".to_string()));
        assert!(referenced.contains(&"org.config.Settings".to_string()));
        let api = packages(class.api_packages().cloned());
        assert!(!api.contains(&"org.util".to_string()));
    }

    #[test]
    fn runtime_annotations_reference_and_mark_api() {
        let registry = Descriptors::new();
        let mut builder = ClassBuilder::new("com/acme/Foo");
        let level = builder.enum_value("Lorg/meta/Level;", "HIGH");
        let visible = builder.annotation("Lorg/meta/Marker;", vec![("level", level)]);
        let visible = builder.annotations_attribute(true, &[visible]);
        let kind = builder.class_value("Lorg/hidden/Kind;");
        let invisible = builder.annotation("Lorg/build/Generated;", vec![("kind", kind)]);
        let invisible = builder.annotations_attribute(false, &[invisible]);
        builder.add_attribute(visible);
        builder.add_attribute(invisible);
        let class = parse(&registry, &builder.build());

        assert!(class.has_runtime_annotations);
        assert!(class.has_class_annotations);
        let referenced = fqns(&class.referenced);
        assert!(referenced.contains(&"org.meta.Marker".to_string()));
        assert!(referenced.contains(&"org.meta.Level".to_string()));
        assert!(!referenced.contains(&"org.build.Generated".to_string()));
        assert!(!referenced.contains(&"org.hidden.Kind".to_string()));
        assert!(class
            .api_packages()
            .any(|p| p.fqn() == "org.meta"));

        let marker = class.annotation("org.meta.Marker").expect("marker");
        assert!(matches!(
            marker.element("level"),
            Some(ElementValue::Enum { constant, .. }) if constant == "HIGH"
        ));
        let generated = class.annotation("org.build.Generated").expect("generated");
        assert_eq!(generated.retention, Retention::Class);
    }

    #[test]
    fn signature_contributes_generic_arguments() {
        let registry = Descriptors::new();
        let mut builder = ClassBuilder::new("com/acme/Foo");
        let signature = builder.signature_attribute("Ljava/util/List<Lorg/model/Item;>;");
        builder.add_field(AccessFlags::PUBLIC, "items", "Ljava/util/List;", vec![signature]);
        let synthetic = builder.signature_attribute("Ljava/util/List<Lorg/ghost/Thing;>;");
        builder.add_field(
            AccessFlags::SYNTHETIC,
            "ghost",
            "Ljava/util/List;",
            vec![synthetic],
        );
        let class = parse(&registry, &builder.build());

        let referenced = fqns(&class.referenced);
        assert!(referenced.contains(&"org.model.Item".to_string()));
        assert!(!referenced.contains(&"org.ghost.Thing".to_string()));
        assert_eq!(
            class.field("items").and_then(|f| f.signature.as_deref()),
            Some("Ljava/util/List<Lorg/model/Item;>;")
        );
        assert!(class.api_packages().any(|p| p.fqn() == "org.model"));
    }

    #[test]
    fn exceptions_and_catch_types() {
        let registry = Descriptors::new();
        let mut builder = ClassBuilder::new("com/acme/Foo");
        let exceptions = builder.exceptions_attribute(&["org/errors/Failure"]);
        let catch_type = builder.class("org/errors/Handled");
        let code = builder.code_attribute_with_handler(&[0xb1], catch_type);
        builder.add_method(AccessFlags::PUBLIC, "run", "()V", vec![code, exceptions]);
        let class = parse(&registry, &builder.build());

        let referenced = fqns(&class.referenced);
        assert!(referenced.contains(&"org.errors.Failure".to_string()));
        assert!(referenced.contains(&"org.errors.Handled".to_string()));
        let run = class.method("run", "()V").expect("run");
        assert_eq!(run.exceptions[0].fqn(), "org.errors.Failure");
    }

    #[test]
    fn stray_class_constant_triggers_crawl() {
        let registry = Descriptors::new();
        let mut builder = ClassBuilder::new("com/acme/Foo");
        let target = builder.class("org/impl/Created");
        let [hi, lo] = target.to_be_bytes();
        let code = builder.code_attribute(&[opcodes::NEW, hi, lo, 0x57, 0xb1]);
        builder.add_method(AccessFlags::PUBLIC, "run", "()V", vec![code]);
        let class = parse(&registry, &builder.build());

        assert!(class
            .referenced
            .contains(&registry.type_ref("org/impl/Created")));
        assert!(!class.api_packages().any(|p| p.fqn() == "org.impl"));
    }

    #[test]
    fn array_constant_of_known_element_does_not_trigger_crawl() {
        let registry = Descriptors::new();
        let mut builder = ClassBuilder::new("com/acme/Foo");
        builder.add_field(AccessFlags::PRIVATE, "items", "[Lcom/acme/Bar;", Vec::new());
        let array = builder.class("[Lcom/acme/Bar;");
        let name = builder.string("org.plugin.Impl");
        let for_name = builder.method_ref(
            "java/lang/Class",
            "forName",
            "(Ljava/lang/String;)Ljava/lang/Class;",
        );
        let [a1, a2] = array.to_be_bytes();
        let [f1, f2] = for_name.to_be_bytes();
        let code = builder.code_attribute(&[
            0x01,
            opcodes::CHECKCAST,
            a1,
            a2,
            0x57,
            opcodes::LDC,
            name as u8,
            opcodes::INVOKESTATIC,
            f1,
            f2,
            0x57,
            0xb1,
        ]);
        builder.add_method(AccessFlags::PUBLIC, "run", "()V", vec![code]);
        let class = parse(&registry, &builder.build());

        assert!(class.referenced.contains(&registry.type_ref("com/acme/Bar")));
        assert!(!class.referenced.contains(&registry.type_ref("org/plugin/Impl")));
    }

    #[test]
    fn legacy_for_name_is_resolved() {
        let registry = Descriptors::new();
        let mut builder = ClassBuilder::new("com/acme/Foo");
        builder.major(48);
        let name = builder.string("org.plugin.Impl");
        let for_name = builder.method_ref(
            "java/lang/Class",
            "forName",
            "(Ljava/lang/String;)Ljava/lang/Class;",
        );
        let [f1, f2] = for_name.to_be_bytes();
        let code = builder.code_attribute(&[opcodes::LDC, name as u8, opcodes::INVOKESTATIC, f1, f2, 0x57, 0xb1]);
        builder.add_method(AccessFlags::PUBLIC, "load", "()V", vec![code]);
        let bytes = builder.build();

        let class = parse(&registry, &bytes);
        assert_eq!(class.java_level, JavaLevel::Java1_4);
        assert!(class.referenced.contains(&registry.type_ref("org/plugin/Impl")));

        let disabled = Descriptors::new();
        let class = ClassParser::new(
            &disabled,
            ParseOptions {
                class_for_name: false,
            },
        )
        .parse(&bytes)
        .expect("parse class");
        assert!(!class.referenced.contains(&disabled.type_ref("org/plugin/Impl")));
    }

    #[test]
    fn inner_and_nest_linkage_is_not_registered() {
        let registry = Descriptors::new();
        let mut builder = ClassBuilder::new("com/acme/Foo");
        let inner = builder.inner_classes_attribute(&[("com/acme/Foo$Secret", "com/acme/Foo", "Secret")]);
        let nest = builder.nest_members_attribute(&["org/nest/Member"]);
        builder.add_attribute(inner);
        builder.add_attribute(nest);
        let class = parse(&registry, &builder.build());

        assert!(!class
            .referenced
            .contains(&registry.type_ref("org/nest/Member")));
        assert!(!class
            .referenced
            .contains(&registry.type_ref("com/acme/Foo$Secret")));
        assert_eq!(class.inner_classes.len(), 1);
        assert_eq!(class.inner_classes[0].simple_name.as_deref(), Some("Secret"));
    }

    #[test]
    fn constant_values_and_default_constructor() {
        let registry = Descriptors::new();
        let mut builder = ClassBuilder::new("com/acme/Foo");
        let value = builder.constant_value_attribute_long(42);
        builder.add_field(
            AccessFlags::PUBLIC | AccessFlags::STATIC | AccessFlags::FINAL,
            "ANSWER",
            "J",
            vec![value],
        );
        let code = builder.code_attribute(&[0xb1]);
        builder.add_method(AccessFlags::PUBLIC, "<init>", "()V", vec![code]);
        let class = parse(&registry, &builder.build());

        assert!(class.has_default_constructor);
        assert_eq!(
            class.field("ANSWER").and_then(|f| f.constant.clone()),
            Some(ConstantValue::Long(42))
        );
    }

    #[test]
    fn type_annotation_targets_are_skipped() {
        let mut body = Cursor::new(&[0x00, 0x02, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 0xff]);
        skip_target_info(&mut body, 0x40).expect("localvar");
        assert_eq!(body.remaining(), 1);
        let mut body = Cursor::new(&[0, 0, 0]);
        skip_target_info(&mut body, 0x47).expect("type argument");
        assert!(body.is_empty());
        assert!(skip_target_info(&mut Cursor::new(&[0]), 0x30).is_err());
    }
}
