use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use bundlegraph::analyzer::Analyzer;
use bundlegraph::config::AnalyzerConfig;
use bundlegraph::report::{build_invocation, build_sarif, Report};
use bundlegraph::scan::{load_classpath, load_container};

/// CLI arguments for bundlegraph execution.
#[derive(Parser, Debug)]
#[command(
    name = "bundlegraph",
    about = "Package graph, exports and imports of an OSGi bundle from its class files.",
    version
)]
struct Cli {
    /// Bundle content: a directory, a jar or a class file. Repeatable.
    #[arg(long, value_name = "PATH", required = true)]
    input: Vec<PathBuf>,
    #[arg(long, value_name = "PATH")]
    classpath: Vec<PathBuf>,
    /// TOML analyzer configuration.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Export-Package instructions, overriding the configuration file.
    #[arg(long, value_name = "HEADER")]
    export: Option<String>,
    /// Import-Package instructions, overriding the configuration file.
    #[arg(long, value_name = "HEADER")]
    import: Option<String>,
    #[arg(long, value_name = "CLASS")]
    activator: Option<String>,
    /// JSON report destination, stdout when absent or `-`.
    #[arg(long, value_name = "PATH")]
    output: Option<PathBuf>,
    /// Also write the diagnostics as a SARIF log.
    #[arg(long, value_name = "PATH")]
    sarif: Option<PathBuf>,
    #[arg(long)]
    quiet: bool,
    #[arg(long)]
    timing: bool,
    #[arg(long, value_name = "FILTER", default_value = "warn")]
    log_level: String,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(&cli)?;
    let ok = run(cli)?;
    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

fn init_tracing(cli: &Cli) -> Result<()> {
    let level = if cli.quiet { "error" } else { cli.log_level.as_str() };
    let filter = EnvFilter::try_new(level).with_context(|| format!("invalid log filter {level}"))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
    Ok(())
}

/// Runs one analysis and reports whether it finished without errors.
fn run(cli: Cli) -> Result<bool> {
    for entry in cli.input.iter().chain(&cli.classpath) {
        if !entry.exists() {
            anyhow::bail!("input not found: {}", entry.display());
        }
    }

    let started_at = Instant::now();
    let config = load_config(&cli)?;

    let bundle = cli
        .input
        .iter()
        .map(|path| load_container(path))
        .collect::<Result<Vec<_>>>()?;
    let classpath = load_classpath(&cli.classpath)?;

    let mut analyzer = Analyzer::new(config).context("invalid analyzer configuration")?;
    let analysis = analyzer.analyze(&bundle, &classpath);

    let names = bundle.iter().map(|c| c.name().to_string()).collect();
    let report = Report::new(names, analysis);
    let mut writer = output_writer(cli.output.as_deref())?;
    serde_json::to_writer_pretty(&mut writer, &report).context("failed to serialize report")?;
    writer.write_all(b"\n").context("failed to write report")?;

    if let Some(path) = cli.sarif.as_deref() {
        let sarif = build_sarif(&analysis.diagnostics, build_invocation(analysis.is_ok()));
        let mut writer = output_writer(Some(path))?;
        serde_json::to_writer_pretty(&mut writer, &sarif)
            .context("failed to serialize SARIF output")?;
        writer
            .write_all(b"\n")
            .context("failed to write SARIF output")?;
    }

    if !cli.quiet {
        for diagnostic in &analysis.diagnostics {
            eprintln!(
                "{}: [{}] {}",
                diagnostic.kind.code(),
                diagnostic.location.as_deref().unwrap_or("-"),
                diagnostic.message
            );
        }
    }
    if cli.timing && !cli.quiet {
        eprintln!(
            "timing: total_ms={} classes={} containers={}",
            started_at.elapsed().as_millis(),
            analysis.classes,
            bundle.len() + classpath.len()
        );
    }

    Ok(analysis.is_ok())
}

/// Configuration file values with command line overrides applied.
fn load_config(cli: &Cli) -> Result<AnalyzerConfig> {
    let mut config = match cli.config.as_deref() {
        Some(path) => AnalyzerConfig::from_file(path)?,
        None => AnalyzerConfig::default(),
    };
    if let Some(export) = &cli.export {
        config.export = Some(export.clone());
    }
    if let Some(import) = &cli.import {
        config.import = Some(import.clone());
    }
    if let Some(activator) = &cli.activator {
        config.bundle_activator = Some(activator.clone());
    }
    config.validate()?;
    Ok(config)
}

fn output_writer(output: Option<&Path>) -> Result<Box<dyn Write>> {
    match output {
        Some(path) if path == Path::new("-") => Ok(Box::new(io::stdout())),
        Some(path) => Ok(Box::new(
            File::create(path).with_context(|| format!("failed to open {}", path.display()))?,
        )),
        None => Ok(Box::new(io::stdout())),
    }
}
