//! texbuild - compile LaTeX documents to PDF
//!
//! ## Commands
//!
//! - `build`: run compile → bibtex → compile on a `.tex` file and write the PDF
//! - `config`: print the effective configuration as TOML

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use texbuild_core::{
    CompilationOrchestrator, CompilationRequest, CompilationResult, CompilerConfig, PassConfig,
    Resources, CONFIG_FILE_NAME,
};
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "texbuild")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Multi-pass LaTeX to PDF compiler driver", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Configuration file (default: ./texbuild.toml if present)
    #[arg(short, long, global = true, env = "TEXBUILD_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a LaTeX file to PDF
    Build {
        /// LaTeX source file
        input: PathBuf,

        /// Output path (default: input with the configured output extension)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// JSON file with resources metadata (e.g. {"metadata": {"path": "..."}})
        #[arg(short, long)]
        metadata: Option<PathBuf>,

        /// Directory prepended to the include search path
        /// (default: directory of the input file)
        #[arg(short, long)]
        search_path: Option<PathBuf>,

        /// Compiler runs per compile pass (overrides latex_count)
        #[arg(short, long)]
        passes: Option<u32>,

        /// Extra file copied next to the source (repeatable)
        #[arg(short, long = "attach")]
        attach: Vec<PathBuf>,

        /// Print the rewritten resources metadata as JSON
        #[arg(long)]
        print_resources: bool,
    },

    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    texbuild_core::init_tracing(cli.json, level);

    let mut config = load_config(cli.config.as_deref())?;
    if cli.verbose {
        config.verbose = true;
    }

    match cli.command {
        Commands::Build {
            input,
            output,
            metadata,
            search_path,
            passes,
            attach,
            print_resources,
        } => {
            cmd_build(
                config,
                &input,
                output,
                metadata.as_deref(),
                search_path,
                passes,
                &attach,
                print_resources,
            )
            .await
        }
        Commands::Config => cmd_config(&config),
    }
}

/// Load the explicit config file, else `./texbuild.toml`, else defaults
fn load_config(path: Option<&Path>) -> Result<CompilerConfig> {
    match path {
        Some(path) => CompilerConfig::load(path)
            .with_context(|| format!("Failed to load config from {:?}", path)),
        None => {
            let local = Path::new(CONFIG_FILE_NAME);
            if local.is_file() {
                CompilerConfig::load(local)
                    .with_context(|| format!("Failed to load config from {:?}", local))
            } else {
                Ok(CompilerConfig::default())
            }
        }
    }
}

/// Compile a LaTeX file and write the artifact
#[allow(clippy::too_many_arguments)]
async fn cmd_build(
    config: CompilerConfig,
    input: &Path,
    output: Option<PathBuf>,
    metadata: Option<&Path>,
    search_path: Option<PathBuf>,
    passes: Option<u32>,
    attach: &[PathBuf],
    print_resources: bool,
) -> Result<()> {
    let source = std::fs::read_to_string(input)
        .with_context(|| format!("Failed to read LaTeX source {:?}", input))?;

    let resources = match metadata {
        Some(path) => read_resources(path)?,
        None => Resources::new(),
    };

    let base_name = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .context("Input path has no file name")?;

    // metadata.path wins over the input directory when no flag is given
    let search_path = match search_path {
        Some(dir) => Some(dir),
        None if has_metadata_path(&resources) => None,
        None => input_dir(input),
    };

    let mut request = CompilationRequest::new(source)
        .with_base_name(base_name)
        .with_resources(resources);
    if let Some(dir) = search_path {
        request = request.with_search_path(dir);
    }
    if let Some(count) = passes {
        request = request.with_passes(PassConfig::uniform(count));
    }
    for path in attach {
        let name = path
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .with_context(|| format!("Attachment {:?} has no file name", path))?;
        let contents =
            std::fs::read(path).with_context(|| format!("Failed to read attachment {:?}", path))?;
        request = request.with_support_file(name, contents);
    }

    let output = output.unwrap_or_else(|| input.with_extension(extension_without_dot(&config)));
    let orchestrator = CompilationOrchestrator::new(config)?;

    info!("Compiling {:?}", input);
    let result = orchestrator.compile(request).await?;

    std::fs::write(&output, &result.artifact)
        .with_context(|| format!("Failed to write {:?}", output))?;

    print_summary(&result, &output);
    if print_resources {
        println!("{}", serde_json::to_string_pretty(&result.resources)?);
    }
    Ok(())
}

/// Print the effective configuration as TOML
fn cmd_config(config: &CompilerConfig) -> Result<()> {
    print!("{}", config.to_toml_string()?);
    Ok(())
}

fn read_resources(path: &Path) -> Result<Resources> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read metadata {:?}", path))?;
    let resources: Resources = serde_json::from_str(&text)
        .with_context(|| format!("Metadata {:?} is not a JSON object", path))?;
    Ok(resources)
}

fn has_metadata_path(resources: &Resources) -> bool {
    resources
        .get("metadata")
        .and_then(|metadata| metadata.get("path"))
        .and_then(|path| path.as_str())
        .is_some_and(|path| !path.is_empty())
}

fn input_dir(input: &Path) -> Option<PathBuf> {
    let parent = input.parent()?;
    if parent.as_os_str().is_empty() {
        std::env::current_dir().ok()
    } else {
        parent.canonicalize().ok()
    }
}

fn extension_without_dot(config: &CompilerConfig) -> &str {
    config.output_extension.trim_start_matches('.')
}

fn print_summary(result: &CompilationResult, output: &Path) {
    println!(
        "Wrote {} ({} bytes, {}/{} passes ok)",
        output.display(),
        result.artifact.len(),
        result.passed_count(),
        result.passes.len()
    );
    for diagnostic in &result.diagnostics {
        println!(
            "  warning [{}] {}: {}",
            diagnostic.pass,
            diagnostic.tool,
            diagnostic.message.lines().next().unwrap_or_default()
        );
    }
}
