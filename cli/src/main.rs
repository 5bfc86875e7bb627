//! CLI entrypoint for semantra
//!
//! This is the main binary that wires together all layers using
//! dependency injection.

mod handlers;

use anyhow::{Context, Result, bail};
use clap::Parser;
use semantra_application::{Engine, EngineDeps, EngineError, LlmGateway};
use semantra_infrastructure::{
    CommandToolInvoker, ConfigLoader, FileConfig, FileLlmConfig, FileLoggingConfig, JsonSnapshot,
    JsonlProvenanceLedger, LlmProvider, ManifestDocumentService, ManifestError, MemoryStore,
    OfflineLlmGateway,
};
use semantra_presentation::{Cli, ConsoleFormatter, OutputConfig};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        // Engine failures map to their own exit codes
        if let Some(engine_error) = e.downcast_ref::<EngineError>() {
            eprintln!("Error: {:#}", e);
            std::process::exit(engine_error.exit_code());
        }
        return Err(e);
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    if cli.show_config {
        ConfigLoader::print_config_sources(cli.config.as_deref());
        return Ok(());
    }

    let config = if cli.no_config {
        ConfigLoader::load_defaults()
    } else {
        ConfigLoader::load(cli.config.as_deref())?
    };

    // Held until the end of the run so buffered log lines reach the file
    let _log_guard = init_logging(cli.verbose, &config.logging)?;
    info!("Starting semantra");

    let issues = config.validate();
    if !issues.is_empty() {
        eprint!("{}", ConsoleFormatter::format_config_issues(&issues));
    }
    let errors = issues.iter().filter(|i| i.severity.is_error()).count();
    if errors > 0 {
        bail!("configuration has {} error(s)", errors);
    }

    let output = OutputConfig::resolve(
        cli.output.map(Into::into),
        config.output.format,
        config.output.color,
        cli.quiet,
    );
    if !output.color {
        ConsoleFormatter::set_color(false);
    }

    let Some(command) = cli.command else {
        bail!("No command given. Run `semantra --help` for the list of commands.");
    };

    // === Dependency Injection ===
    let snapshot = JsonSnapshot::new(&config.storage.snapshot);
    let store = Arc::new(match snapshot.load()? {
        Some(saved) => {
            debug!("Restored state from {}", snapshot.path().display());
            MemoryStore::from_snapshot(saved)
        }
        None => MemoryStore::new(),
    });
    let ledger = Arc::new(
        JsonlProvenanceLedger::open(&config.storage.provenance_log).with_context(|| {
            format!(
                "opening provenance log {}",
                config.storage.provenance_log.display()
            )
        })?,
    );
    let documents = Arc::new(load_documents(&config)?);

    let deps = EngineDeps {
        gateway: build_gateway(&config.llm)?,
        documents: documents.clone(),
        invoker: Arc::new(CommandToolInvoker::from_config(&config.tools)),
        ledger,
        stores: store.stores(),
        tools: config.tool_registry(),
    };
    let engine = Engine::start(deps, config.to_engine_config()).await?;

    let app = handlers::App {
        engine,
        documents,
        output,
    };
    let result = app.dispatch(command).await;

    // Persist whatever the command got done, even when it failed midway
    if let Err(e) = snapshot.save(&store.snapshot()) {
        error!("Failed to save state: {}", e);
        if result.is_ok() {
            return Err(e.into());
        }
    }
    result
}

/// Stderr logging filtered by `-v`, `RUST_LOG` or `[logging] level`, plus an
/// optional daily-rolling file.
fn init_logging(verbose: u8, logging: &FileLoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = match verbose {
        0 => match std::env::var("RUST_LOG") {
            Ok(directives) if !directives.is_empty() => EnvFilter::new(directives),
            _ => EnvFilter::new(logging.level.as_deref().unwrap_or("warn")),
        },
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"), // -vvv or more
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    let (file_layer, guard) = match &logging.file {
        Some(path) => {
            let directory = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| std::path::Path::new("."));
            let Some(file_name) = path.file_name() else {
                bail!("[logging] file must name a file, got {}", path.display());
            };
            std::fs::create_dir_all(directory)
                .with_context(|| format!("creating log directory {}", directory.display()))?;
            let appender = tracing_appender::rolling::daily(directory, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();
    Ok(guard)
}

/// A missing manifest is an empty corpus; a malformed one is fatal.
fn load_documents(config: &FileConfig) -> Result<ManifestDocumentService> {
    match ManifestDocumentService::load(&config.storage.documents) {
        Ok(documents) => {
            debug!(
                "Loaded {} document(s) from {}",
                documents.len(),
                config.storage.documents.display()
            );
            Ok(documents)
        }
        Err(ManifestError::Io { path, source }) if source.kind() == std::io::ErrorKind::NotFound => {
            warn!("Document manifest {} not found; no documents known", path.display());
            Ok(ManifestDocumentService::default())
        }
        Err(e) => Err(e.into()),
    }
}

fn build_gateway(config: &FileLlmConfig) -> Result<Arc<dyn LlmGateway>> {
    match config.provider {
        LlmProvider::None => Ok(Arc::new(OfflineLlmGateway::default())),
        #[cfg(feature = "ollama")]
        LlmProvider::Ollama => {
            let gateway = semantra_infrastructure::OllamaLlmGateway::new(
                config.endpoint.clone(),
                std::time::Duration::from_secs(config.timeout_secs),
            )?;
            debug!("Using Ollama at {}", gateway.endpoint());
            Ok(Arc::new(gateway))
        }
        #[cfg(not(feature = "ollama"))]
        LlmProvider::Ollama => {
            warn!("Built without the `ollama` feature; proposals will fail");
            Ok(Arc::new(OfflineLlmGateway::new(
                "semantra was built without the ollama feature",
            )))
        }
    }
}
