//! Package graph of one bundle.
//!
//! An [`Analyzer`] scans the bundle's class files, learns package metadata
//! from `package-info.class` and `packageinfo` resources, reads the export
//! declarations of the classpath and then resolves the bundle's exports,
//! imports and `uses:=` directives. Problems are collected as diagnostics
//! on the returned [`Analysis`] instead of aborting the run.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::LazyLock;

use rayon::prelude::*;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::classfile::{ClassParser, ParseOptions};
use crate::config::AnalyzerConfig;
use crate::descriptors::{Descriptors, PackageRef, TypeRef, DUPLICATE_MARKER};
use crate::error::{ClassFileError, ConfigError, Diagnostic, DiagnosticKind, Severity, VersionError};
use crate::header::{parse_attrs, parse_parameters, Attrs, Parameters};
use crate::instructions::{Instructions, Selection};
use crate::ir::{Annotation, ElementValue, JavaLevel, ParsedClass};
use crate::jar::Container;
use crate::manifest::EXPORT_PACKAGE;
use crate::packages::{add_uses, Packages, Uses};
use crate::version::{cleanup_version, import_range, is_version_range, substitute, Version, VERSION_PATTERN};

const VERSION_ANNOTATION: &str = "org.osgi.annotation.versioning.Version";
const PROVIDER_TYPE_ANNOTATION: &str = "org.osgi.annotation.versioning.ProviderType";
const EXPORT_ANNOTATION: &str = "org.osgi.annotation.bundle.Export";

const VERSION_ATTRIBUTE: &str = "version";
const SPECIFICATION_VERSION: &str = "specification-version";
const FROM_DIRECTIVE: &str = "from:";
const INTERNAL_SOURCE_DIRECTIVE: &str = "-internal-source:";
const INTERNAL_EXPORTED_DIRECTIVE: &str = "-internal-exported:";
const PROVIDE_DIRECTIVE: &str = "provide:";
const NO_IMPORT_DIRECTIVE: &str = "-noimport:";
const USES_DIRECTIVE: &str = "uses:";
const MANDATORY_DIRECTIVE: &str = "mandatory:";
const IMPORT_DIRECTIVE: &str = "-import:";
const REMOVE_ATTRIBUTE_DIRECTIVE: &str = "remove-attribute:";

const USES_PLACEHOLDER: &str = "<<USES>>";
const USES_MACRO: &str = "${uses}";

const PACKAGE_INFO_CLASS: &str = "package-info.class";
const PACKAGE_INFO_PROPERTIES: &str = "packageinfo";
const MULTI_RELEASE_PREFIX: &str = "META-INF/versions/";
const UNKNOWN_VERSION: &str = "0.0.0";

static OLD_PACKAGEINFO_SYNTAX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"^class\s+(.+)\s+version\s+({VERSION_PATTERN})$"))
        .expect("packageinfo pattern")
});

/// Progress of an [`Analyzer`] through one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalyzerState {
    Idle,
    Scanning,
    GraphBuilt,
    ExportsResolved,
    ImportsResolved,
    Done,
}

impl fmt::Display for AnalyzerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AnalyzerState::Idle => "idle",
            AnalyzerState::Scanning => "scanning",
            AnalyzerState::GraphBuilt => "graph built",
            AnalyzerState::ExportsResolved => "exports resolved",
            AnalyzerState::ImportsResolved => "imports resolved",
            AnalyzerState::Done => "done",
        };
        f.write_str(name)
    }
}

/// Result of one analysis run.
#[derive(Clone, Debug, Default)]
pub struct Analysis {
    /// Packages with resources in the bundle.
    pub contained: Packages,
    /// Packages referenced by contained classes but not contained.
    pub referred: Packages,
    pub uses: Uses,
    /// Edges limited to references from public API.
    pub api_uses: Uses,
    pub exports: Packages,
    pub imports: Packages,
    /// Packages the classpath declares, keyed by package.
    pub classpath_exports: Packages,
    /// Contained packages not reachable from an export or the activator.
    pub unreachable: BTreeSet<PackageRef>,
    pub ees: BTreeSet<JavaLevel>,
    /// Number of classes in the bundle's class space.
    pub classes: usize,
    pub diagnostics: Vec<Diagnostic>,
}

impl Analysis {
    /// True when no error was recorded.
    pub fn is_ok(&self) -> bool {
        !self.diagnostics.iter().any(Diagnostic::is_error)
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Warning)
    }

    /// Highest class file level found in the bundle.
    pub fn highest_ee(&self) -> Option<JavaLevel> {
        self.ees.last().copied()
    }
}

#[derive(Clone, Copy)]
enum Target {
    Contained,
    Classpath,
}

/// Computes the package graph of a bundle against a classpath.
pub struct Analyzer {
    config: AnalyzerConfig,
    registry: Descriptors,
    state: AnalyzerState,
    analysis: Analysis,
    classspace: BTreeMap<TypeRef, ParsedClass>,
    /// Classes parsed from the classpath on demand. `None` marks a miss.
    imported: HashMap<TypeRef, Option<ParsedClass>>,
    learned: HashSet<PackageRef>,
    /// Referrers of the default package.
    default_package_users: BTreeSet<String>,
    activator: Option<TypeRef>,
}

impl Analyzer {
    pub fn new(config: AnalyzerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            registry: Descriptors::new(),
            state: AnalyzerState::Idle,
            analysis: Analysis::default(),
            classspace: BTreeMap::new(),
            imported: HashMap::new(),
            learned: HashSet::new(),
            default_package_users: BTreeSet::new(),
            activator: None,
        })
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    pub fn state(&self) -> AnalyzerState {
        self.state
    }

    /// Registry of the current run.
    pub fn registry(&self) -> &Descriptors {
        &self.registry
    }

    pub fn analysis(&self) -> &Analysis {
        &self.analysis
    }

    /// Classes found in the bundle, ordered by name.
    pub fn classspace(&self) -> impl Iterator<Item = &ParsedClass> {
        self.classspace.values()
    }

    /// Drops every result of the previous run and starts a fresh registry.
    pub fn reset(&mut self) {
        self.registry = Descriptors::new();
        self.analysis = Analysis::default();
        self.classspace.clear();
        self.imported.clear();
        self.learned.clear();
        self.default_package_users.clear();
        self.activator = None;
        self.state = AnalyzerState::Idle;
    }

    /// Analyzes the bundle made of `bundle` against `classpath`.
    ///
    /// When several bundle containers hold the same class, the first one
    /// wins. Classpath entries are consulted in order.
    pub fn analyze(&mut self, bundle: &[Container], classpath: &[Container]) -> &Analysis {
        self.reset();
        self.state = AnalyzerState::Scanning;
        info!(
            containers = bundle.len(),
            classpath = classpath.len(),
            "analyzing bundle"
        );

        for container in bundle {
            self.analyze_container(container);
        }
        self.learn_classpath(classpath);

        if let Some(activator) = self.config.bundle_activator.clone() {
            let activator = self.registry.type_ref_from_fqn(activator.trim());
            let package = activator.package().clone();
            self.refer_to(&package, "Bundle-Activator");
            self.activator = Some(activator);
        }

        self.analysis.ees = self.classspace.values().map(|c| c.java_level).collect();
        self.analysis.classes = self.classspace.len();
        let contained: Vec<PackageRef> = self.analysis.contained.keys().cloned().collect();
        for package in &contained {
            self.analysis.referred.remove(package);
        }
        self.state = AnalyzerState::GraphBuilt;
        debug!(
            classes = self.analysis.classes,
            contained = self.analysis.contained.len(),
            referred = self.analysis.referred.len(),
            "package graph built"
        );

        self.analysis.exports = self.resolve_exports(bundle, classpath);
        self.state = AnalyzerState::ExportsResolved;

        self.analysis.imports = self.resolve_imports(classpath);
        self.state = AnalyzerState::ImportsResolved;

        if !self.config.no_uses {
            self.compute_uses();
        }
        self.check_private_references();
        self.check_default_package();
        self.analysis.unreachable = self.unreachable();
        self.state = AnalyzerState::Done;

        info!(
            exports = self.analysis.exports.len(),
            imports = self.analysis.imports.len(),
            unreachable = self.analysis.unreachable.len(),
            errors = self.analysis.errors().count(),
            warnings = self.analysis.warnings().count(),
            "analysis finished"
        );
        &self.analysis
    }

    /// Looks a class up in the bundle, then among classes already loaded
    /// from the classpath, then in the classpath itself.
    pub fn find_class(&mut self, type_ref: &TypeRef, classpath: &[Container]) -> Option<&ParsedClass> {
        if self.classspace.contains_key(type_ref) {
            return self.classspace.get(type_ref);
        }
        if !self.imported.contains_key(type_ref) {
            let path = type_ref.path();
            let options = self.parse_options();
            let parsed = classpath
                .iter()
                .find_map(|container| container.resource(&path))
                .and_then(|bytes| {
                    ClassParser::new(&self.registry, options)
                        .parse(bytes)
                        .map_err(|err| debug!(class = %type_ref, error = %err, "classpath class unreadable"))
                        .ok()
                });
            self.imported.insert(type_ref.clone(), parsed);
        }
        self.imported.get(type_ref).and_then(Option::as_ref)
    }

    fn parse_options(&self) -> ParseOptions {
        ParseOptions {
            class_for_name: self.config.class_for_name,
        }
    }

    fn record(&mut self, kind: DiagnosticKind, location: Option<String>, message: String) {
        record(&mut self.analysis.diagnostics, kind, location, message);
    }

    fn analyze_container(&mut self, container: &Container) {
        let mut parsed = self.parse_classes(container);
        debug!(container = container.name(), classes = parsed.len(), "scanning container");

        let paths: Vec<&str> = container.resources().map(|(path, _)| path).collect();
        for path in paths {
            let package = self.registry.package_ref(parent(path));
            self.learn_package(container, &package, Target::Contained);

            match parsed.remove(path) {
                Some(Ok(class)) => self.add_class(container, path, class),
                Some(Err(err)) => self.record(
                    DiagnosticKind::MalformedClassFile,
                    Some(location(container, path)),
                    err.to_string(),
                ),
                None => {}
            }
        }
    }

    fn parse_classes<'c>(
        &self,
        container: &'c Container,
    ) -> HashMap<&'c str, Result<ParsedClass, ClassFileError>> {
        let parser = ClassParser::new(&self.registry, self.parse_options());
        let classes: Vec<(&str, &[u8])> = container
            .resources()
            .filter(|(path, _)| path.ends_with(".class"))
            .collect();
        if self.config.parallel {
            classes
                .par_iter()
                .map(|&(path, bytes)| (path, parser.parse(bytes)))
                .collect()
        } else {
            classes
                .iter()
                .map(|&(path, bytes)| (path, parser.parse(bytes)))
                .collect()
        }
    }

    fn add_class(&mut self, container: &Container, path: &str, class: ParsedClass) {
        if class.is_module() {
            debug!(path, "skipping module descriptor");
            return;
        }
        let expected = class.class_name.path();
        if expected != path {
            if path.starts_with(MULTI_RELEASE_PREFIX) {
                debug!(path, "skipping versioned class");
                return;
            }
            self.record(
                DiagnosticKind::ClassPathPlacementMismatch,
                Some(location(container, path)),
                format!("class declares {} and belongs at {expected}", class.class_name),
            );
            return;
        }
        if self.classspace.contains_key(&class.class_name) {
            debug!(class = %class.class_name, container = container.name(), "class already seen");
            return;
        }

        let package = class.package().clone();
        self.learn_package(container, &package, Target::Contained);

        for referenced in &class.referenced_packages {
            self.refer_to(referenced, package.fqn());
        }
        if !package.is_metadata() {
            let graph = |p: &&PackageRef| in_graph(p);
            add_uses(
                &mut self.analysis.uses,
                &package,
                class.referenced_packages.iter().filter(graph),
            );
            if let Some(api) = &class.api_packages {
                add_uses(&mut self.analysis.api_uses, &package, api.iter().filter(graph));
            }
        }
        self.classspace.insert(class.class_name.clone(), class);
    }

    fn refer_to(&mut self, package: &PackageRef, referrer: &str) {
        if package.is_default() {
            self.default_package_users.insert(referrer.to_string());
            return;
        }
        if !in_graph(package) || self.analysis.referred.contains_key(package) {
            return;
        }
        self.analysis.referred.insert(package.clone(), Attrs::new());
    }

    /// Records the attributes of a package the first time it is seen, from
    /// `package-info.class`, then `packageinfo`, then nothing.
    fn learn_package(&mut self, container: &Container, package: &PackageRef, target: Target) {
        if package.is_metadata() || package.is_java() || package.is_primitive() {
            return;
        }
        if !container.has_resources_in(package.path()) {
            return;
        }
        if !self.learned.insert(package.clone()) {
            return;
        }
        let existing = match target {
            Target::Contained => self.analysis.contained.get(package),
            Target::Classpath => self.analysis.classpath_exports.get(package),
        };
        if existing.is_some_and(|attrs| attrs.len() > 1) {
            return;
        }

        let mut attrs = self.read_package_info(container, package).unwrap_or_default();
        attrs.insert(INTERNAL_SOURCE_DIRECTIVE, source_name(container));
        let packages = match target {
            Target::Contained => &mut self.analysis.contained,
            Target::Classpath => &mut self.analysis.classpath_exports,
        };
        packages.insert(package.clone(), attrs);
    }

    fn read_package_info(&mut self, container: &Container, package: &PackageRef) -> Option<Attrs> {
        let class_path = format!("{}/{PACKAGE_INFO_CLASS}", package.path());
        if let Some(bytes) = container.resource(&class_path) {
            let from = location(container, &class_path);
            if let Some(mut attrs) = self.package_info_class(bytes, &from) {
                if attrs.contains_key(VERSION_ATTRIBUTE) {
                    attrs.insert(FROM_DIRECTIVE, from);
                    return Some(attrs);
                }
            }
        }

        let properties_path = format!("{}/{PACKAGE_INFO_PROPERTIES}", package.path());
        let bytes = container.resource(&properties_path)?;
        let mut attrs = parse_packageinfo(bytes);
        fix_specification_version(&mut attrs);
        attrs.insert(FROM_DIRECTIVE, location(container, &properties_path));
        Some(attrs)
    }

    fn package_info_class(&mut self, bytes: &[u8], from: &str) -> Option<Attrs> {
        let class = match ClassParser::new(&self.registry, self.parse_options()).parse(bytes) {
            Ok(class) => class,
            Err(err) => {
                self.record(
                    DiagnosticKind::InvalidPackageInfo,
                    Some(from.to_string()),
                    err.to_string(),
                );
                return None;
            }
        };

        let mut attrs = Attrs::new();
        for annotation in &class.annotations {
            match annotation.type_ref.fqn() {
                VERSION_ANNOTATION => {
                    let Some(value) = annotation.element("value").and_then(ElementValue::as_str) else {
                        continue;
                    };
                    if Version::parse(value).is_ok() {
                        attrs.insert(VERSION_ATTRIBUTE, value);
                    } else {
                        self.record(
                            DiagnosticKind::InvalidVersion,
                            Some(from.to_string()),
                            format!("version annotation has invalid version '{value}'"),
                        );
                    }
                }
                PROVIDER_TYPE_ANNOTATION => {
                    if !attrs.contains_key(PROVIDE_DIRECTIVE) {
                        attrs.insert(PROVIDE_DIRECTIVE, "true");
                    }
                }
                EXPORT_ANNOTATION => self.export_annotation(annotation, &mut attrs, from),
                _ => {}
            }
        }
        Some(attrs)
    }

    fn export_annotation(&mut self, annotation: &Annotation, attrs: &mut Attrs, from: &str) {
        if let Some(value) = annotation.element("uses") {
            let uses = strings(value);
            if !uses.is_empty() {
                let joined = match attrs.get(USES_DIRECTIVE) {
                    Some(existing) => format!("{existing},{}", uses.join(",")),
                    None => uses.join(","),
                };
                attrs.insert(USES_DIRECTIVE, joined);
            }
        }

        if let Some(ElementValue::Enum { constant, .. }) = annotation.element("substitution") {
            match constant.as_str() {
                "CONSUMER" => {
                    attrs.insert(PROVIDE_DIRECTIVE, "false");
                }
                "PROVIDER" => {
                    attrs.insert(PROVIDE_DIRECTIVE, "true");
                }
                "NOIMPORT" => {
                    attrs.insert(NO_IMPORT_DIRECTIVE, "true");
                }
                _ => {}
            }
        }

        if let Some(value) = annotation.element("attribute") {
            for text in strings(value) {
                match parse_attrs(text) {
                    Ok(parsed) => attrs.merge_with(&parsed, false),
                    Err(err) => self.record(
                        DiagnosticKind::InvalidPackageInfo,
                        Some(from.to_string()),
                        err.to_string(),
                    ),
                }
            }
        }
    }

    /// Collects `Export-Package` declarations of classpath bundles. Plain
    /// jars without a manifest contribute their package metadata instead.
    fn learn_classpath(&mut self, classpath: &[Container]) {
        for container in classpath {
            let Some(manifest) = container.manifest() else {
                let directories: Vec<String> = container.directories().keys().cloned().collect();
                for directory in directories {
                    let package = self.registry.package_ref(&directory);
                    self.learn_package(container, &package, Target::Classpath);
                }
                continue;
            };

            let exports = match manifest.parameters(EXPORT_PACKAGE) {
                Ok(Some(exports)) => exports,
                Ok(None) => continue,
                Err(err) => {
                    warn!(container = container.name(), error = %err, "unreadable Export-Package header");
                    continue;
                }
            };
            for (name, attrs) in exports.iter() {
                let package = self.registry.package_ref(name.trim_end_matches(DUPLICATE_MARKER));
                if self.analysis.classpath_exports.contains_key(&package) {
                    continue;
                }
                let mut attrs = attrs.clone();
                attrs.insert(INTERNAL_EXPORTED_DIRECTIVE, source_name(container));
                fix_specification_version(&mut attrs);
                self.analysis.classpath_exports.insert(package, attrs);
            }
        }
    }

    fn compile(&self, header: &str, parameters: &Parameters) -> Instructions {
        match Instructions::from_parameters(parameters) {
            Ok(instructions) => instructions,
            Err(err) => {
                warn!(header, error = %err, "invalid instructions");
                Instructions::new()
            }
        }
    }

    fn report_unused(&mut self, header: &str, selection: &Selection) {
        if selection.unused.is_empty() {
            return;
        }
        let unused: Vec<String> = selection.unused.iter().map(ToString::to_string).collect();
        self.record(
            DiagnosticKind::PatternInstructionUnused,
            Some(header.to_string()),
            format!("unused {header} instructions: {}", unused.join(", ")),
        );
    }

    fn resolve_exports(&mut self, bundle: &[Container], classpath: &[Container]) -> Packages {
        let mut header = AnalyzerConfig::parameters(self.config.export.as_deref());
        let contents = AnalyzerConfig::parameters(self.config.export_contents.as_deref());
        for (name, attrs) in contents.iter() {
            header.append_if_absent(name, attrs.clone());
        }
        let private = AnalyzerConfig::parameters(self.config.private_package.as_deref());
        for name in self.annotated_exports(classpath) {
            if !private.contains_key(&name) {
                header.append_if_absent(&name, Attrs::new());
            }
        }

        let instructions = self.compile(EXPORT_PACKAGE, &header);
        let selection = instructions.select(&self.registry, &self.analysis.contained);
        self.report_unused(EXPORT_PACKAGE, &selection);

        let mut exports = selection.matched;
        self.augment_exports(&mut exports, bundle);
        exports
    }

    /// Contained packages whose `package-info` carries the export annotation.
    fn annotated_exports(&mut self, classpath: &[Container]) -> Vec<String> {
        let packages: Vec<PackageRef> = self.analysis.contained.keys().cloned().collect();
        let mut names = Vec::new();
        for package in packages {
            let info = self
                .registry
                .type_ref(&format!("{}/package-info", package.path()));
            let exported = self
                .find_class(&info, classpath)
                .is_some_and(|class| class.annotation(EXPORT_ANNOTATION).is_some());
            if exported {
                names.push(package.fqn().to_string());
            }
        }
        names
    }

    fn augment_exports(&mut self, exports: &mut Packages, bundle: &[Container]) {
        let mut diagnostics = Vec::new();
        let packages: Vec<PackageRef> = exports.keys().cloned().collect();
        for package in packages {
            let base = self.registry.package_ref(package.base_fqn());
            let Some(attrs) = exports.get_mut(&package) else {
                continue;
            };

            match self.analysis.classpath_exports.get(&base) {
                None => {
                    if !bundle.iter().any(|c| c.has_resources_in(base.path())) {
                        record(
                            &mut diagnostics,
                            DiagnosticKind::EmptyExportedPackage,
                            Some(package.fqn().to_string()),
                            format!("exported package {} has no resources", base.fqn()),
                        );
                    }
                }
                Some(declared) => {
                    for (key, value) in declared.iter() {
                        if key.ends_with(':') {
                            continue;
                        }
                        match attrs.get(key) {
                            None => {
                                attrs.insert(key, value);
                            }
                            Some(local) if key == VERSION_ATTRIBUTE => {
                                let declared_version = cleanup_version(value);
                                if cleanup_version(local) != declared_version {
                                    record(
                                        &mut diagnostics,
                                        DiagnosticKind::VersionMismatch,
                                        Some(package.fqn().to_string()),
                                        format!(
                                            "version {local} differs from {declared_version} declared on the classpath"
                                        ),
                                    );
                                }
                            }
                            Some(_) => {}
                        }
                    }
                }
            }

            fixup_attributes(&package, attrs, &mut diagnostics);
            remove_attributes(attrs);

            if let Some(version) = attrs.version() {
                if Version::parse(version).is_err() {
                    record(
                        &mut diagnostics,
                        DiagnosticKind::InvalidVersion,
                        Some(package.fqn().to_string()),
                        format!("export version '{version}' is not a version"),
                    );
                }
            }
        }
        self.analysis.diagnostics.extend(diagnostics);
    }

    /// Exported packages that are also used inside the bundle and do not
    /// drag private packages along.
    fn exports_to_imports(&self) -> Vec<PackageRef> {
        let analysis = &self.analysis;
        let used: HashSet<&PackageRef> = analysis
            .contained
            .keys()
            .filter_map(|package| analysis.uses.get(package))
            .flatten()
            .collect();
        let private: HashSet<&PackageRef> = analysis
            .contained
            .keys()
            .filter(|package| !analysis.exports.contains_key(package))
            .collect();

        analysis
            .exports
            .iter()
            .filter(|(package, _)| used.contains(package))
            .filter(|(package, _)| {
                analysis
                    .uses
                    .get(*package)
                    .map_or(true, |edges| edges.iter().all(|p| !private.contains(p)))
            })
            .filter(|(_, attrs)| !attrs.get(NO_IMPORT_DIRECTIVE).is_some_and(is_true))
            .map(|(package, _)| package.clone())
            .collect()
    }

    /// Packages exported by the fragment host or required bundles.
    fn host_and_required_exports(&self, classpath: &[Container]) -> Vec<PackageRef> {
        let mut bundles = AnalyzerConfig::parameters(self.config.fragment_host.as_deref());
        for (name, attrs) in AnalyzerConfig::parameters(self.config.require_bundle.as_deref()).iter() {
            bundles.add(name, attrs.clone());
        }
        if bundles.is_empty() {
            return Vec::new();
        }

        let mut packages = Vec::new();
        for container in classpath {
            let Some(bsn) = container.bsn() else {
                continue;
            };
            if !bundles.contains_key(&bsn) {
                continue;
            }
            let exports = container
                .manifest()
                .and_then(|manifest| manifest.parameters(EXPORT_PACKAGE).ok().flatten())
                .unwrap_or_default();
            for name in exports.keys() {
                packages.push(self.registry.package_ref(name.trim_end_matches(DUPLICATE_MARKER)));
            }
        }
        packages
    }

    fn resolve_imports(&mut self, classpath: &[Container]) -> Packages {
        let mut candidates = self.analysis.referred.clone();
        for package in self.exports_to_imports() {
            candidates.insert(package, Attrs::new());
        }
        for package in self.host_and_required_exports(classpath) {
            candidates.remove(&package);
        }
        candidates.retain(|package, _| !package.is_java());

        let header = match self.config.import.as_deref() {
            Some(import) => AnalyzerConfig::parameters(Some(import)),
            None => {
                let mut any = Parameters::new();
                any.add("*", Attrs::new());
                any
            }
        };
        let instructions = self.compile("Import-Package", &header);
        let selection = instructions.select(&self.registry, &candidates);
        self.report_unused("Import-Package", &selection);

        let mut imports = selection.matched;
        self.augment_imports(&mut imports, classpath);
        imports
    }

    /// Packages of `@ProviderType` interfaces implemented inside the bundle.
    fn provided_packages(&mut self, classpath: &[Container]) -> HashSet<PackageRef> {
        let interfaces: BTreeSet<TypeRef> = self
            .classspace
            .values()
            .flat_map(|class| {
                class
                    .interfaces
                    .iter()
                    .filter(move |interface| interface.package() != class.package())
            })
            .cloned()
            .collect();

        let mut provided = HashSet::new();
        for interface in interfaces {
            let is_provider = self
                .find_class(&interface, classpath)
                .is_some_and(|class| class.annotation(PROVIDER_TYPE_ANNOTATION).is_some());
            if is_provider {
                provided.insert(interface.package().clone());
            }
        }
        provided
    }

    fn augment_imports(&mut self, imports: &mut Packages, classpath: &[Container]) {
        let provided = self.provided_packages(classpath);
        let mut diagnostics = Vec::new();
        let mut unversioned = Vec::new();

        let packages: Vec<PackageRef> = imports.keys().cloned().collect();
        for package in packages {
            let exporter = self
                .analysis
                .exports
                .get(&package)
                .or_else(|| self.analysis.classpath_exports.get(&package))
                .cloned()
                .unwrap_or_default();
            let Some(attrs) = imports.get_mut(&package) else {
                continue;
            };

            if let Some(export_version) = exporter.version() {
                let provider = match attrs.get(PROVIDE_DIRECTIVE).or(exporter.get(PROVIDE_DIRECTIVE)) {
                    Some(value) => is_true(value),
                    None => provided.contains(&package),
                };
                let export_version = cleanup_version(export_version);
                match import_range(&export_version, attrs.version(), self.config.policy(provider)) {
                    Ok(range) => {
                        if !range.trim().is_empty() {
                            attrs.insert(VERSION_ATTRIBUTE, range);
                        }
                    }
                    Err(VersionError::InvalidRange(range)) => record(
                        &mut diagnostics,
                        DiagnosticKind::InvalidVersionRange,
                        Some(package.fqn().to_string()),
                        format!("import range {range} includes no version"),
                    ),
                    Err(err) => record(
                        &mut diagnostics,
                        DiagnosticKind::InvalidVersion,
                        Some(package.fqn().to_string()),
                        err.to_string(),
                    ),
                }
            }

            if let Some(mandatory) = exporter.get(MANDATORY_DIRECTIVE) {
                for name in mandatory.split(',').map(str::trim).filter(|n| !n.is_empty()) {
                    if attrs.contains_key(name) {
                        continue;
                    }
                    if let Some(value) = exporter.get(name) {
                        attrs.insert(name, value);
                    }
                }
            }
            if let Some(value) = exporter.get(IMPORT_DIRECTIVE) {
                attrs.insert(IMPORT_DIRECTIVE, value);
            }

            fixup_attributes(&package, attrs, &mut diagnostics);
            remove_attributes(attrs);

            if !attrs.version().is_some_and(is_version_range) {
                unversioned.push(package.fqn().to_string());
            }
        }

        if !unversioned.is_empty() {
            debug!(packages = %unversioned.join(","), "imports without version range");
        }
        self.analysis.diagnostics.extend(diagnostics);
    }

    /// Fills the `uses:=` directive of each export with the shared packages
    /// it depends on.
    fn compute_uses(&mut self) {
        let analysis = &mut self.analysis;
        let source = if self.config.uses_from_api {
            &analysis.api_uses
        } else {
            &analysis.uses
        };

        let packages: Vec<PackageRef> = analysis.exports.keys().cloned().collect();
        for package in packages {
            let shared = source.get(&package).map(|used| {
                used.iter()
                    .filter(|p| **p != package && !p.is_java())
                    .filter(|p| analysis.imports.contains_key(p) || analysis.exports.contains_key(p))
                    .map(PackageRef::fqn)
                    .collect::<Vec<_>>()
                    .join(",")
            });
            let Some(attrs) = analysis.exports.get_mut(&package) else {
                continue;
            };
            let clause = attrs.get(USES_DIRECTIVE).unwrap_or(USES_PLACEHOLDER).to_string();

            match shared {
                Some(shared) => {
                    let expanded = if clause.contains('$') {
                        clause.replace(USES_MACRO, &shared)
                    } else {
                        clause.replace(USES_PLACEHOLDER, &shared)
                    };
                    let cleaned = expanded
                        .split(',')
                        .map(str::trim)
                        .filter(|name| !name.is_empty())
                        .collect::<Vec<_>>()
                        .join(",");
                    if cleaned.is_empty() {
                        attrs.remove(USES_DIRECTIVE);
                    } else {
                        attrs.insert(USES_DIRECTIVE, cleaned);
                    }
                }
                None if clause == USES_PLACEHOLDER => {
                    attrs.remove(USES_DIRECTIVE);
                }
                None => {}
            }
        }
    }

    fn check_private_references(&mut self) {
        let analysis = &self.analysis;
        let private: BTreeSet<&PackageRef> = analysis
            .contained
            .keys()
            .filter(|p| !analysis.exports.contains_key(p) && !analysis.imports.contains_key(p))
            .filter(|p| !p.is_java())
            .collect();

        let mut diagnostics = Vec::new();
        for package in analysis.exports.keys() {
            if !analysis.uses.contains_key(package) {
                continue;
            }
            let references: Vec<&str> = analysis
                .api_uses
                .get(package)
                .into_iter()
                .flatten()
                .filter(|p| private.contains(p))
                .map(PackageRef::fqn)
                .collect();
            if !references.is_empty() {
                record(
                    &mut diagnostics,
                    DiagnosticKind::ExportedPackageReferencesPrivatePackage,
                    Some(package.fqn().to_string()),
                    format!(
                        "export {} has private references [{}]",
                        package.fqn(),
                        references.join(", ")
                    ),
                );
            }
        }
        self.analysis.diagnostics.extend(diagnostics);
    }

    fn check_default_package(&mut self) {
        if self.default_package_users.is_empty() {
            return;
        }
        let users: Vec<&str> = self.default_package_users.iter().map(String::as_str).collect();
        let message = format!(
            "the default package '.' cannot be imported, referenced from [{}]",
            users.join(", ")
        );
        self.record(DiagnosticKind::DefaultPackageReference, None, message);
    }

    /// Packages with `uses` edges that cannot be reached from any export or
    /// from the activator's package.
    pub fn unreachable(&self) -> BTreeSet<PackageRef> {
        let uses = &self.analysis.uses;
        let mut unreachable: BTreeSet<PackageRef> = uses.keys().cloned().collect();
        for export in self.analysis.exports.keys() {
            remove_transitive(uses, export, &mut unreachable);
        }
        if let Some(activator) = &self.activator {
            remove_transitive(uses, activator.package(), &mut unreachable);
        }
        unreachable
    }
}

fn remove_transitive(uses: &Uses, start: &PackageRef, unreachable: &mut BTreeSet<PackageRef>) {
    let mut pending = vec![start.clone()];
    while let Some(package) = pending.pop() {
        if !unreachable.remove(&package) {
            continue;
        }
        if let Some(edges) = uses.get(&package) {
            pending.extend(edges.iter().cloned());
        }
    }
}

fn record(
    diagnostics: &mut Vec<Diagnostic>,
    kind: DiagnosticKind,
    location: Option<String>,
    message: String,
) {
    match kind.severity() {
        Severity::Error => warn!(code = kind.code(), location = ?location, "{message}"),
        Severity::Warning => debug!(code = kind.code(), location = ?location, "{message}"),
    }
    diagnostics.push(Diagnostic::new(kind, location, message));
}

/// Expands placeholders in attribute values.
fn fixup_attributes(package: &PackageRef, attrs: &mut Attrs, diagnostics: &mut Vec<Diagnostic>) {
    let keys: Vec<String> = attrs
        .iter()
        .filter(|(_, value)| value.contains('$'))
        .map(|(key, _)| key.to_string())
        .collect();
    for key in keys {
        let Some(value) = attrs.get(&key) else {
            continue;
        };
        match substitute(value, None) {
            Ok(expanded) => {
                attrs.insert(key, expanded);
            }
            Err(err) => record(
                diagnostics,
                DiagnosticKind::InvalidVersion,
                Some(package.fqn().to_string()),
                format!("attribute {key}: {err}"),
            ),
        }
    }
}

/// Applies `remove-attribute:=` and drops attributes valued `!`.
fn remove_attributes(attrs: &mut Attrs) {
    if let Some(remove) = attrs.remove(REMOVE_ATTRIBUTE_DIRECTIVE) {
        let instructions = parse_parameters(&remove)
            .ok()
            .and_then(|parameters| Instructions::from_parameters(&parameters).ok());
        if let Some(instructions) = instructions {
            let keys: Vec<String> = attrs.keys().map(str::to_string).collect();
            let doomed: Vec<String> = instructions
                .select_names(keys.iter().map(String::as_str), false)
                .into_iter()
                .map(str::to_string)
                .collect();
            for key in doomed {
                attrs.remove(&key);
            }
        }
    }
    attrs.retain(|_, value| value != "!");
}

/// Moves a legacy `specification-version` into `version`.
fn fix_specification_version(attrs: &mut Attrs) {
    if let Some(version) = attrs.remove(SPECIFICATION_VERSION) {
        if !attrs.contains_key(VERSION_ATTRIBUTE) {
            attrs.insert(VERSION_ATTRIBUTE, version);
        }
    }
}

/// Reads a `packageinfo` properties resource. A value starting with `:`
/// turns its key into a directive.
fn parse_packageinfo(bytes: &[u8]) -> Attrs {
    let text = String::from_utf8_lossy(bytes);
    let mut logical: Vec<String> = Vec::new();
    let mut pending = String::new();
    for line in text.lines() {
        let line = line.trim_start();
        if pending.is_empty() && (line.is_empty() || line.starts_with('#') || line.starts_with('!')) {
            continue;
        }
        match line.strip_suffix('\\') {
            Some(continued) => pending.push_str(continued),
            None => {
                pending.push_str(line);
                logical.push(std::mem::take(&mut pending));
            }
        }
    }
    if !pending.is_empty() {
        logical.push(pending);
    }

    let mut attrs = Attrs::new();
    for entry in logical {
        let (mut key, mut value) = split_property(&entry);
        if key.eq_ignore_ascii_case("include") {
            if let Some(caps) = OLD_PACKAGEINFO_SYNTAX.captures(&value) {
                key = VERSION_ATTRIBUTE.to_string();
                value = caps[2].to_string();
            }
        }
        if let Some(directive) = value.strip_prefix(':') {
            key.push(':');
            value = directive.to_string();
        }
        attrs.insert(key, value.trim_end().to_string());
    }
    attrs
}

/// Splits a properties line at the first `=`, `:` or whitespace.
fn split_property(entry: &str) -> (String, String) {
    let end = entry
        .find(|c: char| c == '=' || c == ':' || c.is_whitespace())
        .unwrap_or(entry.len());
    let key = entry[..end].to_string();
    let mut rest = entry[end..].trim_start();
    if let Some(stripped) = rest.strip_prefix(['=', ':']) {
        rest = stripped.trim_start();
    }
    (key, rest.to_string())
}

fn strings(value: &ElementValue) -> Vec<&str> {
    match value {
        ElementValue::Array(values) => values.iter().filter_map(ElementValue::as_str).collect(),
        other => other.as_str().into_iter().collect(),
    }
}

fn in_graph(package: &PackageRef) -> bool {
    !package.is_metadata() && !package.is_primitive()
}

fn is_true(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case("true")
}

fn parent(path: &str) -> &str {
    path.rfind('/').map_or("", |index| &path[..index])
}

fn location(container: &Container, path: &str) -> String {
    format!("{}!/{path}", container.name())
}

fn source_name(container: &Container) -> String {
    let name = container.bsn().unwrap_or_else(|| container.name().to_string());
    format!("{name}-{}", container.version().unwrap_or(UNKNOWN_VERSION))
}
