mod config;

/// Version injected at compile time via SLS_COMPOSE_VERSION env var (set by CI/CD),
/// or "dev" for local builds.
pub const VERSION: &str = match option_env!("SLS_COMPOSE_VERSION") {
    Some(v) => v,
    None => "dev",
};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use config::Config;
use sls_compose::compose::{SequentialSuffix, UuidSuffix, VolatileIdSource};
use sls_compose::{OutputFormat, ServiceFile};
use std::io::Write;
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Compose a serverless declaration into a CloudFormation template
#[derive(Parser, Debug)]
#[command(name = "sls-compose", version, about, long_about = None)]
struct Args {
    /// Declaration file (YAML or JSON)
    declaration: PathBuf,

    /// Stage to compose for
    #[arg(short, long)]
    stage: Option<String>,

    /// Output format
    #[arg(short, long, value_enum)]
    format: Option<Format>,

    /// Write the template to a file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Use counter-based deployment identifiers for reproducible output
    #[arg(long)]
    deterministic: bool,

    /// Log level for debugging
    #[arg(long, value_enum, default_value = "off")]
    log_level: LogLevel,

    /// Write logs to a file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Save the effective stage and format as defaults
    #[arg(long)]
    remember: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Format {
    Json,
    Yaml,
}

impl From<Format> for OutputFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Json => OutputFormat::Json,
            Format::Yaml => OutputFormat::Yaml,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

fn setup_logging(
    level: LogLevel,
    log_file: Option<&PathBuf>,
) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let Some(tracing_level) = level.to_tracing_level() else {
        return Ok(None);
    };

    let (non_blocking, guard) = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {:?}", path))?;
            tracing_appender::non_blocking(file)
        }
        None => tracing_appender::non_blocking(std::io::stderr()),
    };

    tracing_subscriber::fmt()
        .with_max_level(tracing_level)
        .with_writer(non_blocking.with_max_level(tracing_level))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("sls-compose {} started with log level: {:?}", VERSION, level);

    Ok(Some(guard))
}

fn main() -> Result<()> {
    let args = Args::parse();

    let _log_guard = setup_logging(args.log_level, args.log_file.as_ref())?;

    let mut config = Config::load();

    let content = std::fs::read_to_string(&args.declaration)
        .with_context(|| format!("Failed to read declaration {:?}", args.declaration))?;
    let mut file = ServiceFile::parse(&content)
        .with_context(|| format!("Failed to parse declaration {:?}", args.declaration))?;

    let stage = config.effective_stage(args.stage.as_deref(), file.stage.as_deref());
    let format = config.effective_format(args.format.map(OutputFormat::from));
    file.stage = Some(stage.clone());
    tracing::info!("composing {:?} for stage {}", args.declaration, stage);

    let mut ids: Box<dyn VolatileIdSource> = if args.deterministic {
        Box::new(SequentialSuffix::new())
    } else {
        Box::new(UuidSuffix)
    };
    let composition = file
        .into_declaration()
        .context("Invalid declaration")?
        .build_with(ids.as_mut())
        .context("Composition failed")?;
    let rendered = composition.render(format)?;

    match &args.output {
        Some(path) => {
            std::fs::write(path, &rendered)
                .with_context(|| format!("Failed to write template {:?}", path))?;
            tracing::info!("template written to {:?}", path);
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(rendered.as_bytes())?;
            if !rendered.ends_with('\n') {
                stdout.write_all(b"\n")?;
            }
        }
    }

    if args.remember {
        config
            .remember(&stage, format)
            .context("Failed to save configuration")?;
    }

    Ok(())
}
