//! Error and diagnostic types.
//!
//! Hard failures are `thiserror` enums returned through `Result`. Problems found
//! while analyzing a bundle never abort the run; they are collected as
//! [`Diagnostic`] values with a fixed [`Severity`] per [`DiagnosticKind`].

use serde::Serialize;

/// Failure while parsing a single class file.
#[derive(Debug, thiserror::Error)]
pub enum ClassFileError {
    /// Bad magic, truncated stream or an out-of-range structure.
    #[error("malformed class file: {0}")]
    Malformed(String),

    /// Constant pool tag outside the known set.
    #[error("unsupported constant pool tag {tag} at index {index}")]
    UnsupportedConstantTag { tag: u8, index: usize },

    /// A descriptor or signature inside the class did not parse.
    #[error(transparent)]
    Descriptor(#[from] DescriptorError),
}

impl ClassFileError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        ClassFileError::Malformed(reason.into())
    }
}

/// Failure in the descriptor or generic signature grammar.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DescriptorError {
    #[error("invalid descriptor '{input}': {reason}")]
    Descriptor { input: String, reason: String },

    #[error("invalid signature '{input}': {reason}")]
    Signature { input: String, reason: String },
}

/// Failure while parsing versions, ranges or masks.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VersionError {
    #[error("invalid version '{0}'")]
    InvalidVersion(String),

    #[error("invalid version range '{0}'")]
    InvalidRange(String),

    #[error("invalid version mask '{0}'")]
    InvalidMask(String),
}

/// Syntax error in an OSGi header clause list.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid header '{header}' at offset {offset}: {reason}")]
pub struct HeaderError {
    pub header: String,
    pub offset: usize,
    pub reason: String,
}

/// Configuration loading or validation failure.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {reason}")]
    Parse { path: String, reason: String },

    #[error("invalid config field {field}: {reason}")]
    Invalid { field: String, reason: String },
}

/// How a diagnostic affects the outcome of an analysis run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

/// Category of a problem recorded during an analysis run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum DiagnosticKind {
    /// A class resource could not be parsed and was skipped.
    MalformedClassFile,
    /// A class declares a name that does not match its resource path.
    ClassPathPlacementMismatch,
    /// An export or import instruction matched nothing.
    PatternInstructionUnused,
    /// An exported package has no resources in the bundle.
    EmptyExportedPackage,
    /// The API of an exported package uses a private package.
    ExportedPackageReferencesPrivatePackage,
    InvalidVersion,
    InvalidVersionRange,
    /// A contained class references the default package.
    DefaultPackageReference,
    /// Local and classpath versions of an exported package differ.
    VersionMismatch,
    /// A `package-info` or `packageinfo` resource could not be used.
    InvalidPackageInfo,
}

impl DiagnosticKind {
    pub fn severity(self) -> Severity {
        match self {
            DiagnosticKind::MalformedClassFile
            | DiagnosticKind::ClassPathPlacementMismatch
            | DiagnosticKind::InvalidVersion
            | DiagnosticKind::InvalidVersionRange
            | DiagnosticKind::DefaultPackageReference => Severity::Error,
            DiagnosticKind::PatternInstructionUnused
            | DiagnosticKind::EmptyExportedPackage
            | DiagnosticKind::ExportedPackageReferencesPrivatePackage
            | DiagnosticKind::VersionMismatch
            | DiagnosticKind::InvalidPackageInfo => Severity::Warning,
        }
    }

    /// Stable identifier used as the SARIF rule id.
    pub fn code(self) -> &'static str {
        match self {
            DiagnosticKind::MalformedClassFile => "MALFORMED_CLASS_FILE",
            DiagnosticKind::ClassPathPlacementMismatch => "CLASS_PATH_PLACEMENT_MISMATCH",
            DiagnosticKind::PatternInstructionUnused => "PATTERN_INSTRUCTION_UNUSED",
            DiagnosticKind::EmptyExportedPackage => "EMPTY_EXPORTED_PACKAGE",
            DiagnosticKind::ExportedPackageReferencesPrivatePackage => {
                "EXPORTED_PACKAGE_REFERENCES_PRIVATE_PACKAGE"
            }
            DiagnosticKind::InvalidVersion => "INVALID_VERSION",
            DiagnosticKind::InvalidVersionRange => "INVALID_VERSION_RANGE",
            DiagnosticKind::DefaultPackageReference => "DEFAULT_PACKAGE_REFERENCE",
            DiagnosticKind::VersionMismatch => "VERSION_MISMATCH",
            DiagnosticKind::InvalidPackageInfo => "INVALID_PACKAGE_INFO",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            DiagnosticKind::MalformedClassFile => "Malformed class file",
            DiagnosticKind::ClassPathPlacementMismatch => "Class placed under the wrong path",
            DiagnosticKind::PatternInstructionUnused => "Unused instruction",
            DiagnosticKind::EmptyExportedPackage => "Exporting an empty package",
            DiagnosticKind::ExportedPackageReferencesPrivatePackage => {
                "Exported package references private package"
            }
            DiagnosticKind::InvalidVersion => "Invalid version",
            DiagnosticKind::InvalidVersionRange => "Invalid version range",
            DiagnosticKind::DefaultPackageReference => "Reference to the default package",
            DiagnosticKind::VersionMismatch => "Version mismatch",
            DiagnosticKind::InvalidPackageInfo => "Invalid package info",
        }
    }

    pub fn all() -> &'static [DiagnosticKind] {
        &[
            DiagnosticKind::MalformedClassFile,
            DiagnosticKind::ClassPathPlacementMismatch,
            DiagnosticKind::PatternInstructionUnused,
            DiagnosticKind::EmptyExportedPackage,
            DiagnosticKind::ExportedPackageReferencesPrivatePackage,
            DiagnosticKind::InvalidVersion,
            DiagnosticKind::InvalidVersionRange,
            DiagnosticKind::DefaultPackageReference,
            DiagnosticKind::VersionMismatch,
            DiagnosticKind::InvalidPackageInfo,
        ]
    }
}

/// One problem recorded against an analysis run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub severity: Severity,
    /// Resource path or package the problem was found at, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub message: String,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, location: Option<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: kind.severity(),
            location,
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_tag_display() {
        let err = ClassFileError::UnsupportedConstantTag { tag: 2, index: 7 };
        assert_eq!(err.to_string(), "unsupported constant pool tag 2 at index 7");
    }

    #[test]
    fn descriptor_error_converts_into_class_file_error() {
        let err: ClassFileError = DescriptorError::Descriptor {
            input: "Q".to_string(),
            reason: "unknown type code".to_string(),
        }
        .into();
        assert!(err.to_string().contains("invalid descriptor 'Q'"));
    }

    #[test]
    fn severities_split_errors_and_warnings() {
        assert_eq!(DiagnosticKind::EmptyExportedPackage.severity(), Severity::Warning);
        assert_eq!(DiagnosticKind::DefaultPackageReference.severity(), Severity::Error);
        assert_eq!(
            DiagnosticKind::PatternInstructionUnused.severity(),
            Severity::Warning
        );
        let diagnostic = Diagnostic::new(
            DiagnosticKind::ClassPathPlacementMismatch,
            Some("com/x/A.class".to_string()),
            "declares com/y/A",
        );
        assert!(diagnostic.is_error());
    }

    #[test]
    fn codes_are_unique() {
        let mut codes: Vec<_> = DiagnosticKind::all().iter().map(|k| k.code()).collect();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), DiagnosticKind::all().len());
    }
}
