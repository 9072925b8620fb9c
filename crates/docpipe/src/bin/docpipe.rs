//! docpipe CLI - run documents through the ingestion pipeline.
//!
//! ```bash
//! docpipe scan.png
//! docpipe --config docpipe.json --format json --no-vlm report.pdf invoice.jpg
//! ```

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use docpipe::config::{apply_env_overrides, load_config, validate_config};
use docpipe::pipeline::ProcessParams;
use docpipe::processor::is_supported_extension;
use docpipe::{telemetry, Config, DocpipeError, Engine, OutputFormat, Task, TaskStatus};

const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Extract, enhance, chunk and index documents.
#[derive(Parser)]
#[command(name = "docpipe", version, about)]
struct Cli {
    /// Files to process (pdf, png, jpg, jpeg, tiff, tif, bmp, webp)
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// JSON configuration file (defaults are used when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output format: markdown or json
    #[arg(short, long, default_value = "markdown")]
    format: OutputFormat,

    /// OCR language hint, repeatable (e.g. --lang chi_tra --lang eng)
    #[arg(long = "lang")]
    languages: Vec<String>,

    /// Skip vision-language enhancement
    #[arg(long)]
    no_vlm: bool,

    /// Skip vector indexing
    #[arg(long)]
    no_index: bool,

    /// Index collection to store chunks in
    #[arg(long)]
    collection: Option<String>,
}

fn resolve_config(path: Option<&PathBuf>) -> Result<Config, DocpipeError> {
    let config = match path {
        Some(path) => load_config(path)?,
        None => {
            let mut config = Config::default();
            apply_env_overrides(&mut config);
            validate_config(&config)?;
            config
        }
    };
    config.ensure_directories()?;
    Ok(config)
}

fn print_outcome(file: &Path, task: Option<&Task>) {
    let name = file.display();
    match task {
        Some(task) if task.status == TaskStatus::Completed => {
            let output = task
                .result
                .as_ref()
                .and_then(|r| r.metadata.get_str("outputFile"))
                .unwrap_or("<unknown>");
            let chunks = task.result.as_ref().map_or(0, |r| r.chunks_count);
            println!("{}: completed, {} chunks -> {}", name, chunks, output);
        }
        Some(task) => {
            println!(
                "{}: {} ({})",
                name,
                task.status,
                task.error.as_deref().unwrap_or("no error recorded")
            );
        }
        None => println!("{}: task record missing", name),
    }
}

async fn run(cli: Cli) -> Result<bool, DocpipeError> {
    let config = resolve_config(cli.config.as_ref())?;
    if let Err(e) = telemetry::init_logging(&config.logging) {
        eprintln!("Logging disabled: {}", e);
    }

    let engine = Engine::from_config(&config)?;
    let mut params = ProcessParams::from_config(&config).with_format(cli.format);
    params.languages = cli.languages;
    params.collection = cli.collection;
    if cli.no_vlm {
        params.enable_vlm = false;
    }
    if cli.no_index {
        params.store_in_index = false;
    }

    let mut all_ok = true;
    let mut submitted = Vec::new();
    for file in cli.files {
        if !is_supported_extension(&file) {
            eprintln!("{}: unsupported file type", file.display());
            all_ok = false;
            continue;
        }
        let task = engine.create_task(None)?;
        tracing::info!(task_id = %task.task_id, file = %file.display(), "Submitted");
        let handle = engine.submit(&task.task_id, &file, params.clone());
        submitted.push((file, task.task_id, handle));
    }

    // Poll the store the way an out-of-band client would
    let mut ticker = tokio::time::interval(POLL_INTERVAL);
    loop {
        ticker.tick().await;
        let pending = submitted.iter().any(|(_, id, _)| {
            engine
                .get_task_status(id)
                .is_some_and(|task| !task.is_terminal())
        });
        if !pending {
            break;
        }
    }

    for (file, task_id, handle) in submitted {
        // pipeline errors are already recorded on the task
        if let Err(e) = handle.await {
            tracing::error!(task_id = %task_id, "Background task aborted: {}", e);
        }
        let task = engine.get_task_status(&task_id);
        all_ok &= task
            .as_ref()
            .is_some_and(|t| t.status == TaskStatus::Completed);
        print_outcome(&file, task.as_ref());
    }

    Ok(all_ok)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
