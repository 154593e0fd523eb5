use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dream::assemble::{ClipAssembler, DEFAULT_FFMPEG};
use dream::command::{Generator, DEFAULT_GENERATOR_SCRIPT, DEFAULT_RUNTIME};
use dream::config::{resolve_config, DEFAULT_CONFIG_PATH};
use dream::error::exit_code_for;
use dream::pipeline::{DreamRun, RunOptions, DEFAULT_OUTPUT_FOLDER};
use dream::process::SystemRunner;
use dream::script::load_script;

const VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("DREAM_GIT_HASH"), ")");

#[derive(Debug, Parser)]
#[command(name = "dream")]
#[command(version = VERSION)]
#[command(about = "Chain generated clips into one continuous video")]
struct Cli {
    /// Script with one `<seconds> <generator options>` line per step.
    script: PathBuf,

    /// YAML config with a `video` section.
    #[arg(long = "config-path", alias = "config_path")]
    config_path: Option<PathBuf>,

    /// Generator script handed to the runtime.
    #[arg(long = "generate-script-path", default_value = DEFAULT_GENERATOR_SCRIPT)]
    generate_script_path: PathBuf,

    /// Program that runs the generator script.
    #[arg(long, default_value = DEFAULT_RUNTIME)]
    runtime: String,

    #[arg(short = 'o', long = "output-folder", default_value = DEFAULT_OUTPUT_FOLDER)]
    output_folder: PathBuf,

    /// Reuse an existing output folder.
    #[arg(long)]
    force: bool,

    /// Attach audio from the given file to the output video.
    #[arg(short = 'a', long = "audio-file")]
    audio_file: Option<PathBuf>,

    #[arg(long, default_value = DEFAULT_FFMPEG)]
    ffmpeg: String,

    /// Print each generator command instead of running it.
    #[arg(long)]
    dry_run: bool,

    /// Print a JSON run summary when done.
    #[arg(long)]
    json: bool,
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("error: {error:#}");
            ExitCode::from(u8::try_from(exit_code_for(&error)).unwrap_or(1))
        }
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dream=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn run(cli: Cli) -> Result<()> {
    let work_dir = std::env::current_dir().context("failed to resolve current directory")?;

    let mut options = RunOptions::new(&cli.output_folder, &work_dir);
    options.force = cli.force;
    options.generator = Generator::new(cli.runtime, cli.generate_script_path);
    options.audio = cli.audio_file;
    options.dry_run = cli.dry_run;

    let mut runner = SystemRunner;
    let mut dream = DreamRun::new(options, &mut runner, ClipAssembler::new(cli.ffmpeg))?;
    dream.prepare_output_folder()?;

    let config = match resolve_config(cli.config_path.as_deref())? {
        Some((path, config)) => {
            tracing::info!(config = %path.display(), "loaded config");
            Some(config)
        }
        None => {
            tracing::warn!(
                "no config at {DEFAULT_CONFIG_PATH}; using default frame rate and dimensions"
            );
            None
        }
    };
    let lines = load_script(&cli.script)?;
    tracing::info!(steps = lines.len(), script = %cli.script.display(), "loaded script");

    let summary = dream.with_config(config).execute(&lines)?;
    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&summary).context("failed to serialize run summary")?
        );
    }
    Ok(())
}
