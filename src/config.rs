//! Analyzer configuration.
//!
//! Header-valued settings use OSGi clause syntax and are parsed when the
//! configuration is validated. A TOML file can provide any subset of the
//! fields; the rest keep their defaults.
//!
//! ```
//! use bundlegraph::config::AnalyzerConfigBuilder;
//!
//! let config = AnalyzerConfigBuilder::new()
//!     .export("com.acme.api;version=1.0")
//!     .import("org.slf4j;resolution:=optional, *")
//!     .build()
//!     .unwrap();
//! assert!(config.uses_from_api);
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, VersionError};
use crate::header::{parse_parameters, Parameters};
use crate::version::{range_from_mask, Version};

pub const DEFAULT_PROVIDER_POLICY: &str = "[==,=+)";
pub const DEFAULT_CONSUMER_POLICY: &str = "[==,+)";

/// Settings for one analysis run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// `Export-Package` instructions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub export: Option<String>,
    /// Packages exported without being part of the import candidates.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub export_contents: Option<String>,
    /// Packages never exported through annotations.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private_package: Option<String>,
    /// `Import-Package` instructions. Unset means `*`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub import: Option<String>,
    /// Range mask or placeholder text used for packages the bundle provides.
    pub provider_policy: String,
    /// Range mask or placeholder text used for packages the bundle consumes.
    pub consumer_policy: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bundle_activator: Option<String>,
    /// Skip computing `uses:=` directives.
    pub no_uses: bool,
    /// Compute `uses:=` from API references only.
    pub uses_from_api: bool,
    /// Resolve `Class.forName` string constants in legacy bytecode.
    pub class_for_name: bool,
    /// Host bundle whose exports are not imported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fragment_host: Option<String>,
    /// Required bundles whose exports are not imported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub require_bundle: Option<String>,
    /// Parse class files on the rayon pool.
    pub parallel: bool,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            export: None,
            export_contents: None,
            private_package: None,
            import: None,
            provider_policy: DEFAULT_PROVIDER_POLICY.to_owned(),
            consumer_policy: DEFAULT_CONSUMER_POLICY.to_owned(),
            bundle_activator: None,
            no_uses: false,
            uses_from_api: true,
            class_for_name: true,
            fragment_host: None,
            require_bundle: None,
            parallel: true,
        }
    }
}

impl AnalyzerConfig {
    /// Reads and validates a TOML configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid {
            field: "config".to_owned(),
            reason: e.to_string(),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, header) in [
            ("export", &self.export),
            ("export_contents", &self.export_contents),
            ("private_package", &self.private_package),
            ("import", &self.import),
            ("fragment_host", &self.fragment_host),
            ("require_bundle", &self.require_bundle),
        ] {
            if let Some(header) = header {
                parse_parameters(header).map_err(|e| ConfigError::Invalid {
                    field: field.to_owned(),
                    reason: e.to_string(),
                })?;
            }
        }

        validate_policy("provider_policy", &self.provider_policy)?;
        validate_policy("consumer_policy", &self.consumer_policy)?;

        if let Some(activator) = &self.bundle_activator {
            if activator.is_empty() || activator.contains(['/', ';', ',']) {
                return Err(ConfigError::Invalid {
                    field: "bundle_activator".to_owned(),
                    reason: format!("'{activator}' is not a class name"),
                });
            }
        }
        Ok(())
    }

    /// Parsed header, empty when unset or invalid.
    pub(crate) fn parameters(header: Option<&str>) -> Parameters {
        header
            .and_then(|h| parse_parameters(h).ok())
            .unwrap_or_default()
    }

    pub fn policy(&self, provider: bool) -> &str {
        if provider {
            &self.provider_policy
        } else {
            &self.consumer_policy
        }
    }
}

fn validate_policy(field: &str, policy: &str) -> Result<(), ConfigError> {
    if policy.contains("${") {
        return Ok(());
    }
    match range_from_mask(&Version::new(1, 2, 3), policy) {
        Ok(_) | Err(VersionError::InvalidRange(_)) => Ok(()),
        Err(e) => Err(ConfigError::Invalid {
            field: field.to_owned(),
            reason: e.to_string(),
        }),
    }
}

/// Builder for [`AnalyzerConfig`] that validates on [`build`](Self::build).
#[derive(Default)]
pub struct AnalyzerConfigBuilder {
    config: AnalyzerConfig,
}

impl AnalyzerConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn export(mut self, header: impl Into<String>) -> Self {
        self.config.export = Some(header.into());
        self
    }

    pub fn export_contents(mut self, header: impl Into<String>) -> Self {
        self.config.export_contents = Some(header.into());
        self
    }

    pub fn private_package(mut self, header: impl Into<String>) -> Self {
        self.config.private_package = Some(header.into());
        self
    }

    pub fn import(mut self, header: impl Into<String>) -> Self {
        self.config.import = Some(header.into());
        self
    }

    pub fn provider_policy(mut self, policy: impl Into<String>) -> Self {
        self.config.provider_policy = policy.into();
        self
    }

    pub fn consumer_policy(mut self, policy: impl Into<String>) -> Self {
        self.config.consumer_policy = policy.into();
        self
    }

    pub fn bundle_activator(mut self, class: impl Into<String>) -> Self {
        self.config.bundle_activator = Some(class.into());
        self
    }

    pub fn no_uses(mut self, no_uses: bool) -> Self {
        self.config.no_uses = no_uses;
        self
    }

    pub fn uses_from_api(mut self, api: bool) -> Self {
        self.config.uses_from_api = api;
        self
    }

    pub fn class_for_name(mut self, enabled: bool) -> Self {
        self.config.class_for_name = enabled;
        self
    }

    pub fn fragment_host(mut self, header: impl Into<String>) -> Self {
        self.config.fragment_host = Some(header.into());
        self
    }

    pub fn require_bundle(mut self, header: impl Into<String>) -> Self {
        self.config.require_bundle = Some(header.into());
        self
    }

    pub fn parallel(mut self, parallel: bool) -> Self {
        self.config.parallel = parallel;
        self
    }

    pub fn build(self) -> Result<AnalyzerConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
