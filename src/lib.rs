//! Static package-graph analysis of JVM class files for OSGi bundles.
//!
//! The crate reads class files without loading them, builds the package
//! dependency graph of a bundle and derives its `Export-Package`,
//! `Import-Package` and `uses:=` metadata the way bnd does.
//!
//! ```no_run
//! use bundlegraph::analyzer::Analyzer;
//! use bundlegraph::config::AnalyzerConfigBuilder;
//! use bundlegraph::scan::load_container;
//!
//! let bundle = load_container(std::path::Path::new("target/classes"))?;
//! let config = AnalyzerConfigBuilder::new().export("com.acme.api.*").build()?;
//! let mut analyzer = Analyzer::new(config)?;
//! let analysis = analyzer.analyze(&[bundle], &[]);
//! for (package, attrs) in &analysis.imports {
//!     println!("{package};{attrs}");
//! }
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod analyzer;
pub mod classfile;
pub mod config;
pub(crate) mod constant_pool;
pub(crate) mod crawl;
pub(crate) mod cursor;
pub mod descriptors;
pub mod error;
pub mod header;
pub mod instructions;
pub mod ir;
pub mod jar;
pub mod manifest;
pub(crate) mod opcodes;
pub mod packages;
pub mod report;
pub mod scan;
pub mod signature;
pub mod version;

#[cfg(test)]
mod testutil;
