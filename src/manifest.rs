//! Main section of a JAR manifest.

use std::fmt;

use tracing::debug;

use crate::error::HeaderError;
use crate::header::{parse_parameters, Parameters};

pub const MANIFEST_PATH: &str = "META-INF/MANIFEST.MF";

pub const BUNDLE_SYMBOLIC_NAME: &str = "Bundle-SymbolicName";
pub const BUNDLE_VERSION: &str = "Bundle-Version";
pub const EXPORT_PACKAGE: &str = "Export-Package";
pub const IMPORT_PACKAGE: &str = "Import-Package";

/// Ordered header names and values of the main section. Names compare
/// case-insensitively.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Manifest {
    headers: Vec<(String, String)>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads the main section, joining continuation lines. Lines that are
    /// not `Name: value` pairs are skipped.
    pub fn parse(bytes: &[u8]) -> Self {
        let text = String::from_utf8_lossy(bytes);
        let mut lines: Vec<String> = Vec::new();
        for line in text.lines() {
            let line = line.trim_end_matches('\r');
            if line.is_empty() {
                break;
            }
            if let (Some(continuation), Some(last)) = (line.strip_prefix(' '), lines.last_mut()) {
                last.push_str(continuation);
                continue;
            }
            lines.push(line.to_string());
        }

        let mut manifest = Self::new();
        for line in lines {
            match line.split_once(':') {
                Some((name, value)) if !name.is_empty() => {
                    manifest.insert(name.trim(), value.strip_prefix(' ').unwrap_or(value));
                }
                _ => debug!(line = %line, "skipping manifest line"),
            }
        }
        manifest
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn insert(&mut self, name: &str, value: &str) {
        match self
            .headers
            .iter_mut()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
        {
            Some(entry) => entry.1 = value.to_string(),
            None => self.headers.push((name.to_string(), value.to_string())),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// The header parsed as a clause list, if present.
    pub fn parameters(&self, name: &str) -> Result<Option<Parameters>, HeaderError> {
        self.get(name).map(parse_parameters).transpose()
    }

    /// Symbolic name without its directives.
    pub fn bsn(&self) -> Option<String> {
        let parameters = self.parameters(BUNDLE_SYMBOLIC_NAME).ok()??;
        parameters.keys().next().map(str::to_string)
    }

    pub fn version(&self) -> Option<&str> {
        self.get(BUNDLE_VERSION).map(str::trim)
    }
}

impl fmt::Display for Manifest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in &self.headers {
            writeln!(f, "{name}: {value}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_main_section_with_continuations() {
        let manifest = Manifest::parse(
            b"Manifest-Version: 1.0\r\nBundle-SymbolicName: com.acme.core;singl\r\n eton:=true\r\nExport-Package: com.acme;version=1.2,\r\n com.acme.spi\r\n\r\nName: com/acme/Foo.class\r\nDigest: x\r\n",
        );
        assert_eq!(manifest.get("manifest-version"), Some("1.0"));
        assert_eq!(manifest.bsn(), Some("com.acme.core".to_string()));
        let exports = manifest
            .parameters(EXPORT_PACKAGE)
            .expect("header")
            .expect("present");
        assert_eq!(exports.keys().collect::<Vec<_>>(), vec!["com.acme", "com.acme.spi"]);
        assert_eq!(manifest.get("Name"), None);
        assert_eq!(manifest.get("Digest"), None);
    }

    #[test]
    fn missing_headers() {
        let manifest = Manifest::parse(b"garbage line\nBundle-Version: 2.0 \n");
        assert_eq!(manifest.version(), Some("2.0"));
        assert_eq!(manifest.bsn(), None);
        assert_eq!(manifest.parameters(IMPORT_PACKAGE).expect("header"), None);
        assert_eq!(manifest.to_string(), "Bundle-Version: 2.0 \n");
    }
}
