//! Serialisable views of an [`Analysis`]: a JSON report and a SARIF log.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::json;
use serde_sarif::sarif::{
    Invocation, Location, LogicalLocation, Message, ReportingDescriptor, Result as SarifResult,
    ResultLevel, Run, Sarif, Tool, ToolComponent, SCHEMA_URL,
};

use crate::analyzer::Analysis;
use crate::descriptors::PackageRef;
use crate::error::{Diagnostic, DiagnosticKind, Severity};
use crate::packages::{uses_to_strings, Packages};

const TOOL_NAME: &str = "bundlegraph";

/// Snapshot of every output map of one run, keyed by dotted package name.
#[derive(Debug, Serialize)]
pub struct Report {
    pub bundle: Vec<String>,
    pub ok: bool,
    pub classes: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub highest_ee: Option<String>,
    pub ees: Vec<String>,
    pub contained: Packages,
    pub referred: Packages,
    pub exports: Packages,
    pub imports: Packages,
    pub classpath_exports: Packages,
    pub uses: BTreeMap<String, Vec<String>>,
    pub api_uses: BTreeMap<String, Vec<String>>,
    pub unreachable: Vec<String>,
    pub diagnostics: Vec<Diagnostic>,
}

impl Report {
    pub fn new(bundle: Vec<String>, analysis: &Analysis) -> Self {
        Self {
            bundle,
            ok: analysis.is_ok(),
            classes: analysis.classes,
            highest_ee: analysis.highest_ee().map(|level| level.ee()),
            ees: analysis.ees.iter().map(|level| level.ee()).collect(),
            contained: analysis.contained.clone(),
            referred: analysis.referred.clone(),
            exports: analysis.exports.clone(),
            imports: analysis.imports.clone(),
            classpath_exports: analysis.classpath_exports.clone(),
            uses: uses_to_strings(&analysis.uses),
            api_uses: uses_to_strings(&analysis.api_uses),
            unreachable: analysis
                .unreachable
                .iter()
                .map(PackageRef::fqn)
                .map(str::to_string)
                .collect(),
            diagnostics: analysis.diagnostics.clone(),
        }
    }
}

pub fn build_invocation(successful: bool) -> Invocation {
    let arguments: Vec<String> = std::env::args().collect();
    let command_line = arguments.join(" ");

    Invocation::builder()
        .execution_successful(successful)
        .arguments(arguments)
        .command_line(command_line)
        .build()
}

/// SARIF 2.1.0 log with one result per diagnostic.
pub fn build_sarif(diagnostics: &[Diagnostic], invocation: Invocation) -> Sarif {
    let rules: Vec<ReportingDescriptor> = DiagnosticKind::all()
        .iter()
        .map(|kind| {
            ReportingDescriptor::builder()
                .id(kind.code())
                .name(kind.title())
                .build()
        })
        .collect();
    let driver = ToolComponent::builder()
        .name(TOOL_NAME)
        .version(env!("CARGO_PKG_VERSION"))
        .rules(rules)
        .build();
    let tool = Tool {
        driver,
        extensions: None,
        properties: None,
    };

    let results: Vec<SarifResult> = diagnostics.iter().map(sarif_result).collect();
    let run = Run::builder()
        .tool(tool)
        .invocations(vec![invocation])
        .results(results)
        .build();

    Sarif::builder()
        .schema(SCHEMA_URL)
        .runs(vec![run])
        .version(json!("2.1.0"))
        .build()
}

fn sarif_result(diagnostic: &Diagnostic) -> SarifResult {
    let level = match diagnostic.severity {
        Severity::Error => ResultLevel::Error,
        Severity::Warning => ResultLevel::Warning,
    };
    let message = Message::builder().text(diagnostic.message.clone()).build();
    let builder = SarifResult::builder()
        .rule_id(diagnostic.kind.code())
        .level(level)
        .message(message);
    match &diagnostic.location {
        Some(location) => builder.locations(vec![logical_location(location)]).build(),
        None => builder.build(),
    }
}

fn logical_location(name: &str) -> Location {
    let kind = if name.contains("!/") { "resource" } else { "package" };
    let logical = LogicalLocation::builder().name(name).kind(kind).build();
    Location::builder().logical_locations(vec![logical]).build()
}
