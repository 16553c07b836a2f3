//! Interned type and package references for one analysis session.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::DescriptorError;
use crate::signature::{
    self, ClassSignature, FieldSignature, MethodSignature, Signature, SignatureKind,
};

/// Suffix marking a package that occupies an extra slot in an ordered map.
pub const DUPLICATE_MARKER: char = '~';

/// Deepest array a class file may declare.
pub const MAX_ARRAY_DIMENSIONS: usize = 255;

/// Deepest nesting of generic type arguments accepted in one descriptor or
/// signature.
pub const MAX_TYPE_ARGUMENT_DEPTH: usize = 255;

const PRIMITIVE_PACKAGE: &str = "<primitive>";
const METADATA_PREFIXES: [&str; 3] = ["META-INF", "OSGI-INF", "OSGI-OPT"];

#[derive(Debug)]
struct PackageData {
    binary: String,
    fqn: String,
    primitive: bool,
}

/// Canonical reference to a package. Equality is identity within a session.
#[derive(Clone)]
pub struct PackageRef(Arc<PackageData>);

impl PackageRef {
    pub fn binary_name(&self) -> &str {
        &self.0.binary
    }

    pub fn fqn(&self) -> &str {
        &self.0.fqn
    }

    pub fn is_default(&self) -> bool {
        self.0.binary.is_empty()
    }

    pub fn is_primitive(&self) -> bool {
        self.0.primitive
    }

    pub fn is_java(&self) -> bool {
        self.0.fqn.starts_with("java.")
    }

    pub fn is_metadata(&self) -> bool {
        self.is_default()
            || METADATA_PREFIXES
                .iter()
                .any(|prefix| self.0.fqn.starts_with(prefix))
    }

    pub fn is_duplicate(&self) -> bool {
        self.0.binary.ends_with(DUPLICATE_MARKER)
    }

    /// Dotted name without any duplicate markers.
    pub fn base_fqn(&self) -> &str {
        self.0.fqn.trim_end_matches(DUPLICATE_MARKER)
    }

    /// Resource directory of the package inside a container.
    pub fn path(&self) -> &str {
        &self.0.binary
    }
}

impl PartialEq for PackageRef {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for PackageRef {}

impl Hash for PackageRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::ptr::hash(Arc::as_ptr(&self.0), state);
    }
}

impl Ord for PackageRef {
    fn cmp(&self, other: &Self) -> Ordering {
        if Arc::ptr_eq(&self.0, &other.0) {
            return Ordering::Equal;
        }
        self.0
            .fqn
            .cmp(&other.0.fqn)
            .then_with(|| self.0.binary.cmp(&other.0.binary))
    }
}

impl PartialOrd for PackageRef {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for PackageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.fqn)
    }
}

impl fmt::Debug for PackageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PackageRef({})", self.0.fqn)
    }
}

#[derive(Debug)]
enum TypeKind {
    Concrete,
    Primitive,
    Array(TypeRef),
}

#[derive(Debug)]
struct TypeData {
    binary: String,
    fqn: String,
    package: PackageRef,
    kind: TypeKind,
}

/// Canonical reference to a type. Equality is identity within a session.
#[derive(Clone)]
pub struct TypeRef(Arc<TypeData>);

impl TypeRef {
    /// Internal name, `java/lang/String`, `I` or `[Ljava/lang/String;`.
    pub fn binary_name(&self) -> &str {
        &self.0.binary
    }

    pub fn fqn(&self) -> &str {
        &self.0.fqn
    }

    pub fn package(&self) -> &PackageRef {
        &self.0.package
    }

    pub fn short_name(&self) -> &str {
        match self.0.fqn.rfind('.') {
            Some(index) => &self.0.fqn[index + 1..],
            None => &self.0.fqn,
        }
    }

    /// Resource path of the class file declaring this type.
    pub fn path(&self) -> String {
        format!("{}.class", self.0.binary)
    }

    pub fn is_primitive(&self) -> bool {
        matches!(self.0.kind, TypeKind::Primitive)
    }

    pub fn is_array(&self) -> bool {
        matches!(self.0.kind, TypeKind::Array(_))
    }

    pub fn component(&self) -> Option<&TypeRef> {
        match &self.0.kind {
            TypeKind::Array(component) => Some(component),
            _ => None,
        }
    }

    pub fn is_object(&self) -> bool {
        self.0.binary == "java/lang/Object"
    }

    pub fn is_java(&self) -> bool {
        self.0.package.is_java()
    }

    /// Field descriptor form of this type.
    pub fn descriptor(&self) -> String {
        match &self.0.kind {
            TypeKind::Concrete => format!("L{};", self.0.binary),
            TypeKind::Primitive | TypeKind::Array(_) => self.0.binary.clone(),
        }
    }
}

impl PartialEq for TypeRef {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for TypeRef {}

impl Hash for TypeRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::ptr::hash(Arc::as_ptr(&self.0), state);
    }
}

impl Ord for TypeRef {
    fn cmp(&self, other: &Self) -> Ordering {
        if Arc::ptr_eq(&self.0, &other.0) {
            return Ordering::Equal;
        }
        self.0
            .fqn
            .cmp(&other.0.fqn)
            .then_with(|| self.0.binary.cmp(&other.0.binary))
    }
}

impl PartialOrd for TypeRef {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.fqn)
    }
}

impl fmt::Debug for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeRef({})", self.0.binary)
    }
}

/// Parsed field or method descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct Descriptor {
    text: String,
    parameters: Option<Vec<TypeRef>>,
    return_type: TypeRef,
    referenced: Vec<TypeRef>,
}

impl Descriptor {
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Parameter types, `None` for a field descriptor.
    pub fn parameters(&self) -> Option<&[TypeRef]> {
        self.parameters.as_deref()
    }

    /// Field type or method return type.
    pub fn return_type(&self) -> &TypeRef {
        &self.return_type
    }

    /// Every type named by the descriptor, including generic arguments.
    pub fn referenced(&self) -> &[TypeRef] {
        &self.referenced
    }
}

fn primitive_fqn(code: char) -> Option<&'static str> {
    let name = match code {
        'V' => "void",
        'B' => "byte",
        'C' => "char",
        'D' => "double",
        'F' => "float",
        'I' => "int",
        'J' => "long",
        'S' => "short",
        'Z' => "boolean",
        _ => return None,
    };
    Some(name)
}

fn primitive_code(fqn: &str) -> Option<&'static str> {
    let code = match fqn {
        "void" => "V",
        "byte" => "B",
        "char" => "C",
        "double" => "D",
        "float" => "F",
        "int" => "I",
        "long" => "J",
        "short" => "S",
        "boolean" => "Z",
        _ => return None,
    };
    Some(code)
}

/// Session registry that interns references and memoizes grammar parses.
///
/// One registry is created per analysis run and shared by every parser of that
/// run, including parsers running on other threads.
pub struct Descriptors {
    types: RwLock<HashMap<String, TypeRef>>,
    packages: RwLock<HashMap<String, PackageRef>>,
    descriptors: RwLock<HashMap<String, Arc<Descriptor>>>,
    signatures: RwLock<HashMap<(SignatureKind, String), Arc<Signature>>>,
    primitive_package: PackageRef,
}

impl Default for Descriptors {
    fn default() -> Self {
        Self::new()
    }
}

impl Descriptors {
    pub fn new() -> Self {
        Self {
            types: RwLock::new(HashMap::new()),
            packages: RwLock::new(HashMap::new()),
            descriptors: RwLock::new(HashMap::new()),
            signatures: RwLock::new(HashMap::new()),
            primitive_package: PackageRef(Arc::new(PackageData {
                binary: PRIMITIVE_PACKAGE.to_string(),
                fqn: PRIMITIVE_PACKAGE.to_string(),
                primitive: true,
            })),
        }
    }

    pub fn primitive_package(&self) -> &PackageRef {
        &self.primitive_package
    }

    pub fn default_package(&self) -> PackageRef {
        self.package_ref("")
    }

    /// Interns a type by its internal name. Accepts `L...;` wrapped names,
    /// single character primitive codes and `[` array prefixes.
    pub fn type_ref(&self, binary: &str) -> TypeRef {
        if let Some(found) = self.types.read().get(binary) {
            return found.clone();
        }

        let dimensions = leading_dimensions(binary);
        if dimensions > 0 {
            let mut array = self.type_ref(&binary[dimensions..]);
            for _ in 0..dimensions {
                array = self.array_of(&array);
            }
            if array.binary_name() != binary {
                self.types.write().insert(binary.to_string(), array.clone());
            }
            return array;
        }

        let created = if binary.len() > 2 && binary.starts_with('L') && binary.ends_with(';') {
            let stripped = self.type_ref(&binary[1..binary.len() - 1]);
            self.types.write().insert(binary.to_string(), stripped.clone());
            return stripped;
        } else if let Some(fqn) = single_char(binary).and_then(primitive_fqn) {
            TypeData {
                binary: binary.to_string(),
                fqn: fqn.to_string(),
                package: self.primitive_package.clone(),
                kind: TypeKind::Primitive,
            }
        } else {
            let package = match binary.rfind('/') {
                Some(index) => self.package_ref(&binary[..index]),
                None => self.default_package(),
            };
            TypeData {
                binary: binary.to_string(),
                fqn: binary.replace('/', "."),
                package,
                kind: TypeKind::Concrete,
            }
        };

        let mut types = self.types.write();
        types
            .entry(binary.to_string())
            .or_insert_with(|| TypeRef(Arc::new(created)))
            .clone()
    }

    /// Interns a type by its source name, `java.lang.String`, `int` or `byte[]`.
    pub fn type_ref_from_fqn(&self, fqn: &str) -> TypeRef {
        let (component, dimensions) = strip_trailing_dimensions(fqn);
        let mut type_ref = match primitive_code(component) {
            Some(code) => self.type_ref(code),
            None => self.type_ref(&component.replace('.', "/")),
        };
        for _ in 0..dimensions {
            type_ref = self.array_of(&type_ref);
        }
        type_ref
    }

    /// [`type_ref`](Self::type_ref) for names read from class files. Arrays
    /// deeper than [`MAX_ARRAY_DIMENSIONS`] are rejected.
    pub fn checked_type_ref(&self, binary: &str) -> Result<TypeRef, DescriptorError> {
        check_dimensions(binary, leading_dimensions(binary))?;
        Ok(self.type_ref(binary))
    }

    /// [`type_ref_from_fqn`](Self::type_ref_from_fqn) with the same array limit.
    pub fn checked_type_ref_from_fqn(&self, fqn: &str) -> Result<TypeRef, DescriptorError> {
        check_dimensions(fqn, strip_trailing_dimensions(fqn).1)?;
        Ok(self.type_ref_from_fqn(fqn))
    }

    /// One dimension array of `component`.
    fn array_of(&self, component: &TypeRef) -> TypeRef {
        let binary = format!("[{}", component.descriptor());
        if let Some(found) = self.types.read().get(&binary) {
            return found.clone();
        }
        let created = TypeData {
            binary: binary.clone(),
            fqn: format!("{}[]", component.fqn()),
            package: component.package().clone(),
            kind: TypeKind::Array(component.clone()),
        };
        self.types
            .write()
            .entry(binary)
            .or_insert_with(|| TypeRef(Arc::new(created)))
            .clone()
    }

    /// Interns the type stored at a resource path such as `com/acme/Foo.class`.
    pub fn type_ref_from_path(&self, path: &str) -> TypeRef {
        self.type_ref(path.strip_suffix(".class").unwrap_or(path))
    }

    /// Interns a package by binary (`com/acme`) or dotted (`com.acme`) name.
    pub fn package_ref(&self, name: &str) -> PackageRef {
        let binary = if name == "." { String::new() } else { name.replace('.', "/") };
        if let Some(found) = self.packages.read().get(&binary) {
            return found.clone();
        }
        let fqn = if binary.is_empty() {
            ".".to_string()
        } else {
            binary.replace('/', ".")
        };
        let mut packages = self.packages.write();
        packages
            .entry(binary.clone())
            .or_insert_with(|| {
                PackageRef(Arc::new(PackageData {
                    binary,
                    fqn,
                    primitive: false,
                }))
            })
            .clone()
    }

    /// Interned variant of `package` that sorts next to it but is a distinct key.
    pub fn duplicate(&self, package: &PackageRef) -> PackageRef {
        self.package_ref(&format!("{}{}", package.binary_name(), DUPLICATE_MARKER))
    }

    pub fn descriptor(&self, text: &str) -> Result<Arc<Descriptor>, DescriptorError> {
        if let Some(found) = self.descriptors.read().get(text) {
            return Ok(found.clone());
        }
        let parsed = Arc::new(DescriptorParser::new(self, text).parse()?);
        self.descriptors
            .write()
            .insert(text.to_string(), parsed.clone());
        Ok(parsed)
    }

    pub fn signature(
        &self,
        kind: SignatureKind,
        text: &str,
    ) -> Result<Arc<Signature>, DescriptorError> {
        let key = (kind, text.to_string());
        if let Some(found) = self.signatures.read().get(&key) {
            return Ok(found.clone());
        }
        let parsed = Arc::new(signature::parse(kind, text)?);
        self.signatures.write().insert(key, parsed.clone());
        Ok(parsed)
    }

    pub fn class_signature(&self, text: &str) -> Result<ClassSignature, DescriptorError> {
        match self.signature(SignatureKind::Class, text)?.as_ref() {
            Signature::Class(class) => Ok(class.clone()),
            _ => Err(DescriptorError::Signature {
                input: text.to_string(),
                reason: "unexpected signature kind".to_string(),
            }),
        }
    }

    pub fn method_signature(&self, text: &str) -> Result<MethodSignature, DescriptorError> {
        match self.signature(SignatureKind::Method, text)?.as_ref() {
            Signature::Method(method) => Ok(method.clone()),
            _ => Err(DescriptorError::Signature {
                input: text.to_string(),
                reason: "unexpected signature kind".to_string(),
            }),
        }
    }

    pub fn field_signature(&self, text: &str) -> Result<FieldSignature, DescriptorError> {
        match self.signature(SignatureKind::Field, text)?.as_ref() {
            Signature::Field(field) => Ok(field.clone()),
            _ => Err(DescriptorError::Signature {
                input: text.to_string(),
                reason: "unexpected signature kind".to_string(),
            }),
        }
    }

    /// Types erased from every class named in a generic signature.
    pub fn signature_references(
        &self,
        kind: SignatureKind,
        text: &str,
    ) -> Result<Vec<TypeRef>, DescriptorError> {
        let parsed = self.signature(kind, text)?;
        Ok(parsed
            .erased_binary_references()
            .iter()
            .map(|binary| self.type_ref(binary))
            .collect())
    }
}

fn leading_dimensions(binary: &str) -> usize {
    binary.bytes().take_while(|b| *b == b'[').count()
}

fn strip_trailing_dimensions(fqn: &str) -> (&str, usize) {
    let mut component = fqn;
    let mut dimensions = 0;
    while let Some(stripped) = component.strip_suffix("[]") {
        component = stripped;
        dimensions += 1;
    }
    (component, dimensions)
}

fn check_dimensions(input: &str, dimensions: usize) -> Result<(), DescriptorError> {
    if dimensions > MAX_ARRAY_DIMENSIONS {
        return Err(DescriptorError::Descriptor {
            input: input.to_string(),
            reason: format!("{dimensions} array dimensions, at most {MAX_ARRAY_DIMENSIONS} allowed"),
        });
    }
    Ok(())
}

fn single_char(text: &str) -> Option<char> {
    let mut chars = text.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Some(c),
        _ => None,
    }
}

struct DescriptorParser<'a> {
    registry: &'a Descriptors,
    text: &'a str,
    bytes: &'a [u8],
    pos: usize,
    depth: usize,
    referenced: Vec<TypeRef>,
}

impl<'a> DescriptorParser<'a> {
    fn new(registry: &'a Descriptors, text: &'a str) -> Self {
        Self {
            registry,
            text,
            bytes: text.as_bytes(),
            pos: 0,
            depth: 0,
            referenced: Vec::new(),
        }
    }

    fn error(&self, reason: &str) -> DescriptorError {
        DescriptorError::Descriptor {
            input: self.text.to_string(),
            reason: format!("{reason} at offset {}", self.pos),
        }
    }

    fn parse(mut self) -> Result<Descriptor, DescriptorError> {
        let parameters = if self.peek() == Some(b'(') {
            self.pos += 1;
            let mut parameters = Vec::new();
            while self.peek() != Some(b')') {
                if self.peek().is_none() {
                    return Err(self.error("unterminated parameter list"));
                }
                parameters.push(self.parse_ref()?);
            }
            self.pos += 1;
            Some(parameters)
        } else {
            None
        };
        let return_type = self.parse_ref()?;
        if self.pos != self.bytes.len() {
            return Err(self.error("trailing characters"));
        }
        Ok(Descriptor {
            text: self.text.to_string(),
            parameters,
            return_type,
            referenced: self.referenced,
        })
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn parse_ref(&mut self) -> Result<TypeRef, DescriptorError> {
        let dimensions = leading_dimensions(&self.text[self.pos..]);
        if dimensions > MAX_ARRAY_DIMENSIONS {
            return Err(self.error("too many array dimensions"));
        }
        self.pos += dimensions;
        let component = self.parse_component()?;
        if dimensions == 0 {
            return Ok(component);
        }
        let binary = format!("{}{}", "[".repeat(dimensions), component.descriptor());
        Ok(self.registry.type_ref(&binary))
    }

    fn parse_component(&mut self) -> Result<TypeRef, DescriptorError> {
        let start = self.pos;
        let Some(code) = self.peek() else {
            return Err(self.error("missing type"));
        };
        if code != b'L' {
            return match primitive_fqn(code as char) {
                Some(_) => {
                    self.pos += 1;
                    let primitive = self.registry.type_ref(&self.text[start..self.pos]);
                    self.push(primitive.clone());
                    Ok(primitive)
                }
                None => Err(self.error("unknown type code")),
            };
        }

        self.pos += 1;
        let mut name = self.class_segment()?.to_string();
        if name.is_empty() {
            return Err(self.error("empty class name"));
        }
        self.skip_type_arguments()?;
        // `Outer<..>.Inner` names the nested class `Outer$Inner`.
        while self.peek() == Some(b'.') {
            self.pos += 1;
            let segment = self.class_segment()?;
            if segment.is_empty() {
                return Err(self.error("empty inner class name"));
            }
            name.push('$');
            name.push_str(segment);
            self.skip_type_arguments()?;
        }
        if self.peek() != Some(b';') {
            return Err(self.error("unterminated class type"));
        }
        self.pos += 1;
        let type_ref = self.registry.type_ref(&name);
        self.push(type_ref.clone());
        Ok(type_ref)
    }

    fn class_segment(&mut self) -> Result<&'a str, DescriptorError> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if matches!(c, b';' | b'<' | b'.') {
                break;
            }
            self.pos += 1;
        }
        let text: &'a str = self.text;
        Ok(&text[start..self.pos])
    }

    fn skip_type_arguments(&mut self) -> Result<(), DescriptorError> {
        if self.peek() != Some(b'<') {
            return Ok(());
        }
        self.pos += 1;
        self.depth += 1;
        if self.depth > MAX_TYPE_ARGUMENT_DEPTH {
            return Err(self.error("type arguments nested too deeply"));
        }
        loop {
            match self.peek() {
                None => return Err(self.error("unbalanced '<'")),
                Some(b'>') => {
                    self.pos += 1;
                    self.depth -= 1;
                    return Ok(());
                }
                Some(b'*') => self.pos += 1,
                Some(b'+') | Some(b'-') => {
                    self.pos += 1;
                    self.parse_ref()?;
                }
                Some(b'T') => {
                    while let Some(c) = self.peek() {
                        self.pos += 1;
                        if c == b';' {
                            break;
                        }
                    }
                }
                Some(_) => {
                    self.parse_ref()?;
                }
            }
        }
    }

    fn push(&mut self, type_ref: TypeRef) {
        if !self.referenced.contains(&type_ref) {
            self.referenced.push(type_ref);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_signature_accessors() {
        let registry = Descriptors::new();
        let class = registry
            .class_signature("<T:Ljava/lang/Object;>Ljava/util/AbstractList<TT;>;")
            .expect("class signature");
        assert_eq!(class.type_parameters.len(), 1);
        assert_eq!(class.superclass.binary, "java/util/AbstractList");

        let method = registry
            .method_signature("(Ljava/util/List<Lcom/acme/Item;>;)V")
            .expect("method signature");
        assert_eq!(method.parameters.len(), 1);
        assert!(method.result.is_none());

        let field = registry
            .field_signature("Ljava/util/Map<Ljava/lang/String;Lcom/acme/Item;>;")
            .expect("field signature");
        assert_eq!(
            Signature::Field(field).erased_binary_references(),
            vec!["java/util/Map", "java/lang/String", "com/acme/Item"]
        );
        assert!(registry.method_signature("Lcom/acme/Item;").is_err());
    }

    #[test]
    fn interning_returns_identical_objects() {
        let registry = Descriptors::new();
        let first = registry.type_ref("java/lang/String");
        let second = registry.type_ref("java/lang/String");
        assert!(Arc::ptr_eq(&first.0, &second.0));
        assert_eq!(first, registry.type_ref("Ljava/lang/String;"));
        assert_eq!(first, registry.type_ref_from_fqn("java.lang.String"));
        assert_eq!(
            registry.package_ref("com/acme"),
            registry.package_ref("com.acme")
        );
    }

    #[test]
    fn type_ref_splits_package() {
        let registry = Descriptors::new();
        let nested = registry.type_ref("com/acme/Outer$Inner");
        assert_eq!(nested.fqn(), "com.acme.Outer$Inner");
        assert_eq!(nested.package().fqn(), "com.acme");
        assert_eq!(nested.short_name(), "Outer$Inner");
        assert_eq!(nested.path(), "com/acme/Outer$Inner.class");

        let top = registry.type_ref("Main");
        assert!(top.package().is_default());
        assert!(top.package().is_metadata());
        assert_eq!(top.package().fqn(), ".");
    }

    #[test]
    fn primitives_only_for_single_character_names() {
        let registry = Descriptors::new();
        let int = registry.type_ref("I");
        assert!(int.is_primitive());
        assert_eq!(int.fqn(), "int");
        assert!(int.package().is_primitive());

        let class = registry.type_ref("Int");
        assert!(!class.is_primitive());
        assert_eq!(registry.type_ref_from_fqn("byte").fqn(), "byte");
    }

    #[test]
    fn arrays_wrap_their_component() {
        let registry = Descriptors::new();
        let array = registry.type_ref("[[Ljava/util/List;");
        assert!(array.is_array());
        assert_eq!(array.fqn(), "java.util.List[][]");
        assert_eq!(array.package().fqn(), "java.util");
        let component = array.component().expect("component");
        assert_eq!(component.binary_name(), "[Ljava/util/List;");
        assert_eq!(registry.type_ref_from_fqn("java.util.List[][]"), array);
    }

    #[test]
    fn package_flags() {
        let registry = Descriptors::new();
        assert!(registry.package_ref("java.util").is_java());
        assert!(!registry.package_ref("javax.net").is_java());
        assert!(registry.package_ref("META-INF/maven").is_metadata());
        assert!(registry.package_ref("OSGI-INF").is_metadata());
        assert!(!registry.package_ref("com.acme").is_metadata());
    }

    #[test]
    fn duplicate_packages_are_interned_and_distinct() {
        let registry = Descriptors::new();
        let package = registry.package_ref("com.acme");
        let duplicate = registry.duplicate(&package);
        assert_ne!(package, duplicate);
        assert!(duplicate.is_duplicate());
        assert_eq!(duplicate.base_fqn(), "com.acme");
        assert_eq!(duplicate, registry.duplicate(&package));
        assert!(package < duplicate);
    }

    #[test]
    fn parses_method_descriptor() {
        let registry = Descriptors::new();
        let descriptor = registry
            .descriptor("(Ljava/lang/String;I)V")
            .expect("descriptor");
        let parameters = descriptor.parameters().expect("parameters");
        assert_eq!(parameters.len(), 2);
        assert_eq!(parameters[0].fqn(), "java.lang.String");
        assert_eq!(parameters[1].fqn(), "int");
        assert_eq!(descriptor.return_type().fqn(), "void");
    }

    #[test]
    fn descriptors_are_memoized() {
        let registry = Descriptors::new();
        let first = registry.descriptor("[J").expect("descriptor");
        let second = registry.descriptor("[J").expect("descriptor");
        assert!(Arc::ptr_eq(&first, &second));
        assert!(first.parameters().is_none());
        assert_eq!(first.return_type().fqn(), "long[]");
    }

    #[test]
    fn descriptor_collects_generic_arguments() {
        let registry = Descriptors::new();
        let descriptor = registry
            .descriptor("(Ljava/util/Map<Ljava/lang/String;Ljava/util/List<Lcom/acme/Foo;>;>;)V")
            .expect("descriptor");
        let names: Vec<_> = descriptor.referenced().iter().map(|t| t.fqn()).collect();
        assert!(names.contains(&"java.util.Map"));
        assert!(names.contains(&"java.util.List"));
        assert!(names.contains(&"com.acme.Foo"));
    }

    fn on_worker_stack<T: Send + 'static>(f: impl FnOnce() -> T + Send + 'static) -> T {
        std::thread::Builder::new()
            .stack_size(2 * 1024 * 1024)
            .spawn(f)
            .expect("spawn")
            .join()
            .expect("no stack overflow")
    }

    #[test]
    fn array_dimensions_are_bounded() {
        let deep = on_worker_stack(|| {
            let registry = Descriptors::new();
            let descriptor = registry.descriptor(&format!("({}I)V", "[".repeat(20_000)));
            let type_ref = registry.checked_type_ref(&format!("{}Lcom/acme/Foo;", "[".repeat(20_000)));
            let fqn = registry.checked_type_ref_from_fqn(&format!("com.acme.Foo{}", "[]".repeat(20_000)));
            (descriptor.is_err(), type_ref.is_err(), fqn.is_err())
        });
        assert_eq!(deep, (true, true, true));

        let registry = Descriptors::new();
        let limit = "[".repeat(MAX_ARRAY_DIMENSIONS);
        let descriptor = registry
            .descriptor(&format!("{limit}Lcom/acme/Foo;"))
            .expect("255 dimensions");
        assert_eq!(descriptor.return_type().binary_name(), format!("{limit}Lcom/acme/Foo;"));
        assert_eq!(descriptor.referenced()[0].fqn(), "com.acme.Foo");
        assert!(registry.descriptor(&format!("[{limit}I")).is_err());
        assert_eq!(
            registry
                .checked_type_ref_from_fqn(&format!("int{}", "[]".repeat(MAX_ARRAY_DIMENSIONS)))
                .expect("255 dimensions"),
            registry.type_ref(&format!("{limit}I"))
        );
    }

    #[test]
    fn type_argument_nesting_is_bounded() {
        let nested = |depth: usize| {
            format!(
                "{}Lcom/acme/Leaf;{};",
                "Ljava/util/List<".repeat(depth),
                ">;".repeat(depth).trim_end_matches(';')
            )
        };
        let (shallow, deep) = on_worker_stack(move || {
            let registry = Descriptors::new();
            (
                registry.descriptor(&nested(10)).is_ok(),
                registry.descriptor(&nested(10_000)).is_err(),
            )
        });
        assert!(shallow);
        assert!(deep);
    }

    #[test]
    fn inner_class_of_generic_outer_is_named_with_dollar() {
        let registry = Descriptors::new();
        let text = "Lcom/acme/Outer<TT;>.Inner<Ljava/lang/String;>;";
        let descriptor = registry.descriptor(text).expect("descriptor");
        assert_eq!(descriptor.return_type().binary_name(), "com/acme/Outer$Inner");
        assert!(descriptor
            .referenced()
            .iter()
            .any(|t| t.fqn() == "java.lang.String"));

        let erased = registry
            .signature_references(SignatureKind::Field, text)
            .expect("signature");
        assert_eq!(erased[0], *descriptor.return_type());
    }

    #[test]
    fn malformed_descriptors_are_rejected() {
        let registry = Descriptors::new();
        assert!(registry.descriptor("(Ljava/lang/String").is_err());
        assert!(registry.descriptor("Q").is_err());
        assert!(registry.descriptor("(I").is_err());
        assert!(registry.descriptor("Ljava/util/List<Ljava/lang/String;;").is_err());
        assert!(registry.descriptor("IV").is_err());
    }
}
