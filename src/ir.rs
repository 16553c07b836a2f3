//! Parsed representation of a class file.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;

use crate::descriptors::{Descriptor, PackageRef, TypeRef};

/// Access and property flags of classes and members.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct AccessFlags(pub u16);

impl AccessFlags {
    pub const PUBLIC: u16 = 0x0001;
    pub const PRIVATE: u16 = 0x0002;
    pub const PROTECTED: u16 = 0x0004;
    pub const STATIC: u16 = 0x0008;
    pub const FINAL: u16 = 0x0010;
    pub const INTERFACE: u16 = 0x0200;
    pub const ABSTRACT: u16 = 0x0400;
    pub const SYNTHETIC: u16 = 0x1000;
    pub const ANNOTATION: u16 = 0x2000;
    pub const ENUM: u16 = 0x4000;
    pub const MODULE: u16 = 0x8000;

    pub fn contains(self, flag: u16) -> bool {
        self.0 & flag != 0
    }

    pub fn is_public(self) -> bool {
        self.contains(Self::PUBLIC)
    }

    pub fn is_protected(self) -> bool {
        self.contains(Self::PROTECTED)
    }

    /// Public or protected, the members that form binary API.
    pub fn is_api(self) -> bool {
        self.is_public() || self.is_protected()
    }

    pub fn is_static(self) -> bool {
        self.contains(Self::STATIC)
    }

    pub fn is_final(self) -> bool {
        self.contains(Self::FINAL)
    }

    pub fn is_interface(self) -> bool {
        self.contains(Self::INTERFACE)
    }

    pub fn is_abstract(self) -> bool {
        self.contains(Self::ABSTRACT)
    }

    pub fn is_synthetic(self) -> bool {
        self.contains(Self::SYNTHETIC)
    }

    pub fn is_annotation(self) -> bool {
        self.contains(Self::ANNOTATION)
    }

    pub fn is_enum(self) -> bool {
        self.contains(Self::ENUM)
    }

    pub fn is_module(self) -> bool {
        self.contains(Self::MODULE)
    }
}

/// Target runtime level derived from the class file major version.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum JavaLevel {
    Unknown,
    Java1_1,
    Java1_2,
    Java1_3,
    Java1_4,
    Java5,
    Java6,
    Java7,
    Java8,
    Java9,
    Java10,
    Java11,
    Java12,
    Java13,
    Java14,
    Java15,
    Java16,
    Java17,
    Java18,
    Java19,
    Java20,
    Java21,
    Java22,
    Java23,
    Java24,
    Java25,
}

const KNOWN_LEVELS: [JavaLevel; 25] = [
    JavaLevel::Java1_1,
    JavaLevel::Java1_2,
    JavaLevel::Java1_3,
    JavaLevel::Java1_4,
    JavaLevel::Java5,
    JavaLevel::Java6,
    JavaLevel::Java7,
    JavaLevel::Java8,
    JavaLevel::Java9,
    JavaLevel::Java10,
    JavaLevel::Java11,
    JavaLevel::Java12,
    JavaLevel::Java13,
    JavaLevel::Java14,
    JavaLevel::Java15,
    JavaLevel::Java16,
    JavaLevel::Java17,
    JavaLevel::Java18,
    JavaLevel::Java19,
    JavaLevel::Java20,
    JavaLevel::Java21,
    JavaLevel::Java22,
    JavaLevel::Java23,
    JavaLevel::Java24,
    JavaLevel::Java25,
];

const FIRST_MAJOR: u16 = 45;

impl JavaLevel {
    pub fn from_major(major: u16) -> Self {
        major
            .checked_sub(FIRST_MAJOR)
            .and_then(|index| KNOWN_LEVELS.get(index as usize))
            .copied()
            .unwrap_or(JavaLevel::Unknown)
    }

    pub fn major(self) -> Option<u16> {
        KNOWN_LEVELS
            .iter()
            .position(|level| *level == self)
            .map(|index| FIRST_MAJOR + index as u16)
    }

    /// Feature release number, 1 for 1.1 up to 8 for 1.8, then 9, 10, ...
    fn release(self) -> Option<u16> {
        self.major().map(|major| major - 44)
    }

    /// Execution environment name such as `J2SE-1.4` or `JavaSE-17`.
    pub fn ee(self) -> String {
        match self.release() {
            None => "UNKNOWN".to_string(),
            Some(1) => "JRE-1.1".to_string(),
            Some(release @ 2..=5) => format!("J2SE-1.{release}"),
            Some(release @ 6..=8) => format!("JavaSE-1.{release}"),
            Some(release) => format!("JavaSE-{release}"),
        }
    }

    /// `osgi.ee` capability filter requiring this level.
    pub fn filter(self) -> String {
        match self.release() {
            None => "(osgi.ee=UNKNOWN)".to_string(),
            Some(1) => "(&(|(osgi.ee=JRE)(osgi.ee=JavaSE))(version=1.1))".to_string(),
            Some(release @ 2..=5) => {
                format!("(&(|(osgi.ee=J2SE)(osgi.ee=JavaSE))(version=1.{release}))")
            }
            Some(release @ 6..=8) => format!("(&(osgi.ee=JavaSE)(version=1.{release}))"),
            Some(release) => format!("(&(osgi.ee=JavaSE)(version={release}))"),
        }
    }
}

/// Value of a `ConstantValue` attribute or an annotation constant.
#[derive(Clone, Debug, PartialEq)]
pub enum ConstantValue {
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    String(String),
}

/// Retention of an annotation as recorded by the compiler.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Retention {
    /// `RuntimeVisible*` attributes.
    Runtime,
    /// `RuntimeInvisible*` attributes.
    Class,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ElementValue {
    /// Primitive or string constant; `tag` is the element value tag
    /// (`B C D F I J S Z s`).
    Constant { tag: char, value: ConstantValue },
    Enum { type_ref: TypeRef, constant: String },
    /// Class literal as a return descriptor, `V` for `void.class`.
    Class(String),
    Annotation(Box<Annotation>),
    Array(Vec<ElementValue>),
}

impl ElementValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ElementValue::Constant {
                value: ConstantValue::String(value),
                ..
            } => Some(value),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ElementValue::Constant {
                tag: 'Z',
                value: ConstantValue::Integer(value),
            } => Some(*value != 0),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Annotation {
    pub type_ref: TypeRef,
    pub retention: Retention,
    pub elements: Vec<(String, ElementValue)>,
}

impl Annotation {
    pub fn element(&self, name: &str) -> Option<&ElementValue> {
        self.elements
            .iter()
            .find(|(element, _)| element == name)
            .map(|(_, value)| value)
    }
}

/// Annotation on a type use, with the raw `target_type` it applies to.
#[derive(Clone, Debug, PartialEq)]
pub struct TypeAnnotation {
    pub target_type: u8,
    pub annotation: Annotation,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FieldDef {
    pub access: AccessFlags,
    pub name: String,
    pub descriptor: Arc<Descriptor>,
    pub signature: Option<String>,
    pub constant: Option<ConstantValue>,
    pub deprecated: bool,
    pub annotations: Vec<Annotation>,
    pub type_annotations: Vec<TypeAnnotation>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MethodDef {
    pub access: AccessFlags,
    pub name: String,
    pub descriptor: Arc<Descriptor>,
    pub signature: Option<String>,
    pub deprecated: bool,
    pub exceptions: Vec<TypeRef>,
    pub annotations: Vec<Annotation>,
    /// One list per declared parameter.
    pub parameter_annotations: Vec<Vec<Annotation>>,
    pub type_annotations: Vec<TypeAnnotation>,
    pub annotation_default: Option<ElementValue>,
}

impl MethodDef {
    pub fn is_constructor(&self) -> bool {
        self.name == "<init>"
    }
}

/// Entry of the `InnerClasses` attribute.
#[derive(Clone, Debug, PartialEq)]
pub struct InnerClass {
    pub inner: TypeRef,
    pub outer: Option<TypeRef>,
    pub simple_name: Option<String>,
    pub access: AccessFlags,
}

#[derive(Clone, Debug, PartialEq)]
pub struct EnclosingMethod {
    pub class: TypeRef,
    /// Name and descriptor, absent for initializer blocks.
    pub method: Option<(String, String)>,
}

/// Result of parsing one class file.
#[derive(Clone, Debug, PartialEq)]
pub struct ParsedClass {
    pub class_name: TypeRef,
    pub super_class: Option<TypeRef>,
    pub interfaces: Vec<TypeRef>,
    pub access: AccessFlags,
    pub major: u16,
    pub minor: u16,
    pub java_level: JavaLevel,
    pub source_file: Option<String>,
    pub signature: Option<String>,
    pub deprecated: bool,
    pub fields: Vec<FieldDef>,
    pub methods: Vec<MethodDef>,
    pub annotations: Vec<Annotation>,
    pub type_annotations: Vec<TypeAnnotation>,
    pub inner_classes: Vec<InnerClass>,
    pub enclosing_method: Option<EnclosingMethod>,
    pub has_runtime_annotations: bool,
    pub has_class_annotations: bool,
    pub has_default_constructor: bool,
    /// Every type the class depends on.
    pub referenced: BTreeSet<TypeRef>,
    /// Packages of `referenced`, primitives excluded.
    pub referenced_packages: BTreeSet<PackageRef>,
    /// Packages reachable from public or protected declarations.
    /// `None` unless the class itself is public.
    pub api_packages: Option<BTreeSet<PackageRef>>,
}

impl ParsedClass {
    pub fn package(&self) -> &PackageRef {
        self.class_name.package()
    }

    pub fn is_public(&self) -> bool {
        self.access.is_public()
    }

    pub fn is_interface(&self) -> bool {
        self.access.is_interface()
    }

    pub fn is_module(&self) -> bool {
        self.access.is_module()
    }

    pub fn is_annotation(&self) -> bool {
        self.access.is_annotation()
    }

    pub fn is_enum(&self) -> bool {
        self.access.is_enum()
    }

    pub fn api_packages(&self) -> impl Iterator<Item = &PackageRef> {
        self.api_packages.iter().flatten()
    }

    /// First class-level annotation whose type has the given dotted name.
    pub fn annotation(&self, fqn: &str) -> Option<&Annotation> {
        self.annotations
            .iter()
            .find(|annotation| annotation.type_ref.fqn() == fqn)
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn method(&self, name: &str, descriptor: &str) -> Option<&MethodDef> {
        self.methods
            .iter()
            .find(|method| method.name == name && method.descriptor.as_str() == descriptor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn java_level_from_major() {
        assert_eq!(JavaLevel::from_major(45), JavaLevel::Java1_1);
        assert_eq!(JavaLevel::from_major(52), JavaLevel::Java8);
        assert_eq!(JavaLevel::from_major(61), JavaLevel::Java17);
        assert_eq!(JavaLevel::from_major(44), JavaLevel::Unknown);
        assert_eq!(JavaLevel::from_major(200), JavaLevel::Unknown);
        assert_eq!(JavaLevel::Java8.major(), Some(52));
    }

    #[test]
    fn execution_environment_names() {
        assert_eq!(JavaLevel::Java1_1.ee(), "JRE-1.1");
        assert_eq!(JavaLevel::Java1_4.ee(), "J2SE-1.4");
        assert_eq!(JavaLevel::Java5.ee(), "J2SE-1.5");
        assert_eq!(JavaLevel::Java8.ee(), "JavaSE-1.8");
        assert_eq!(JavaLevel::Java11.ee(), "JavaSE-11");
        assert_eq!(
            JavaLevel::Java8.filter(),
            "(&(osgi.ee=JavaSE)(version=1.8))"
        );
        assert_eq!(JavaLevel::Java17.filter(), "(&(osgi.ee=JavaSE)(version=17))");
    }

    #[test]
    fn unknown_sorts_lowest() {
        let highest = [JavaLevel::Unknown, JavaLevel::Java7, JavaLevel::Java6]
            .into_iter()
            .max();
        assert_eq!(highest, Some(JavaLevel::Java7));
    }

    #[test]
    fn access_flags_api() {
        assert!(AccessFlags(AccessFlags::PROTECTED).is_api());
        assert!(!AccessFlags(AccessFlags::PRIVATE).is_api());
        assert!(AccessFlags(AccessFlags::MODULE).is_module());
    }
}
