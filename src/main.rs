use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use typewire::error::ErrorEnvelope;
use typewire::fonts::Variant;
use typewire::interrupt::{install_ctrlc_handler, CancelFlag};
use typewire::manifest::{load_and_check, load_session_config};
use typewire::render::Frame;
use typewire::schema::{OutputConfig, PreviewConfig, SessionConfig, StreamTarget};
use typewire::{MemorySink, Pacing, StreamSession};

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("TYPEWIRE_GIT_HASH"),
    ")"
);

#[derive(Debug, Parser)]
#[command(name = "typewire")]
#[command(version = VERSION)]
#[command(about = "Typewriter-style text video for live streams and local preview")]
struct Cli {
    /// Log at debug level (RUST_LOG takes precedence).
    #[arg(short, long, global = true)]
    verbose: bool,
    /// Print results and errors as JSON on stdout.
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Validate a session manifest and load its fonts.
    Check { manifest: PathBuf },
    /// Render text files (or stdin) to the configured output.
    Run {
        manifest: PathBuf,
        /// Stream to this URL instead of the manifest's output.
        #[arg(long, conflicts_with = "preview")]
        url: Option<String>,
        /// Show a local preview window instead of streaming.
        #[arg(long)]
        preview: bool,
        /// Reveal rate in characters per second.
        #[arg(long)]
        rate: Option<f32>,
        /// Skip the idle screen between blocks.
        #[arg(long)]
        no_idle: bool,
        /// Text blocks to render in order; `-` or nothing reads stdin.
        files: Vec<PathBuf>,
    },
    /// Render one block without pacing and save its final frame as PNG.
    Still {
        manifest: PathBuf,
        file: PathBuf,
        #[arg(short = 'o', long = "output")]
        output: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Check { manifest } => run_check(&manifest, cli.json),
        Commands::Run {
            manifest,
            url,
            preview,
            rate,
            no_idle,
            files,
        } => run_stream(&manifest, url, preview, rate, no_idle, &files),
        Commands::Still {
            manifest,
            file,
            output,
        } => run_still(&manifest, &file, &output, cli.json),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            if cli.json {
                let envelope = ErrorEnvelope::from_anyhow(&error);
                match serde_json::to_string(&envelope) {
                    Ok(json) => println!("{json}"),
                    Err(_) => eprintln!("error: {error:#}"),
                }
            } else {
                eprintln!("error: {error:#}");
            }
            ExitCode::from(1)
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn run_check(manifest_path: &Path, json: bool) -> Result<()> {
    let (config, _fonts) = load_and_check(manifest_path)?;

    if json {
        let summary = serde_json::json!({
            "ok": true,
            "manifest": manifest_path.display().to_string(),
            "width": config.canvas.width,
            "height": config.canvas.height,
            "fps": config.fps,
            "mode": config.output.mode_name(),
            "pixel_format": config.pixel_format.ffmpeg_name(),
        });
        println!("{summary}");
    } else {
        println!(
            "OK: {} ({}x{}, {} fps, {} mode, {})",
            manifest_path.display(),
            config.canvas.width,
            config.canvas.height,
            config.fps,
            config.output.mode_name(),
            config.pixel_format.ffmpeg_name()
        );
    }
    Ok(())
}

fn run_stream(
    manifest_path: &Path,
    url: Option<String>,
    preview: bool,
    rate: Option<f32>,
    no_idle: bool,
    files: &[PathBuf],
) -> Result<()> {
    let mut config = load_session_config(manifest_path)?;
    apply_overrides(&mut config, url, preview, rate);
    config.validate().context("invalid command line overrides")?;

    let cancel = CancelFlag::new();
    install_ctrlc_handler(&cancel)?;
    let mut session = StreamSession::open(config)?.with_cancel_flag(cancel);

    for input in block_inputs(files) {
        let text = read_block(&input)?;
        let summary = session
            .render_block(&text, None)
            .with_context(|| format!("failed rendering {}", input.display()))?;
        if summary.cancelled {
            break;
        }
        if !no_idle && session.display_idle(None)?.cancelled {
            break;
        }
    }

    let frames = session.frames_emitted();
    session.close()?;
    tracing::info!(frames, "done");
    Ok(())
}

fn apply_overrides(
    config: &mut SessionConfig,
    url: Option<String>,
    preview: bool,
    rate: Option<f32>,
) {
    if let Some(url) = url {
        match &mut config.output {
            OutputConfig::Stream(target) => target.url = url,
            OutputConfig::Preview(_) => config.output = OutputConfig::Stream(StreamTarget::new(url)),
        }
    }
    if preview && !matches!(config.output, OutputConfig::Preview(_)) {
        config.output = OutputConfig::Preview(PreviewConfig::default());
    }
    if let Some(rate) = rate {
        config.reveal.chars_per_second = rate;
    }
}

fn run_still(manifest_path: &Path, input: &Path, output: &Path, json: bool) -> Result<()> {
    let (config, fonts) = load_and_check(manifest_path)?;
    let background = config.colors.background;
    let (width, height) = (config.canvas.width, config.canvas.height);

    let text = read_block(input)?;
    let missing = fonts.missing_codepoints(Variant::Regular, &text);
    if !missing.is_empty() {
        tracing::warn!(?missing, "regular font has no glyph for some characters");
    }
    let mut session = StreamSession::with_parts(config, fonts, MemorySink::keep_last(1))?
        .with_pacing(Pacing::Unpaced);
    let summary = session.render_block(&text, None)?;

    let frame = session
        .sink()
        .last_frame()
        .cloned()
        .unwrap_or_else(|| Frame::new(width, height, background));
    frame.save_png(output)?;
    session.close()?;

    if json {
        let result = serde_json::json!({
            "ok": true,
            "output": output.display().to_string(),
            "frames": summary.frames,
            "final_offset": summary.final_offset,
        });
        println!("{result}");
    } else {
        println!(
            "Wrote {} ({} frames, offset {:.1}px)",
            output.display(),
            summary.frames,
            summary.final_offset
        );
    }
    Ok(())
}

fn block_inputs(files: &[PathBuf]) -> Vec<PathBuf> {
    if files.is_empty() {
        vec![PathBuf::from("-")]
    } else {
        files.to_vec()
    }
}

fn read_block(input: &Path) -> Result<String> {
    if input == Path::new("-") {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("failed to read text from stdin")?;
        return Ok(text);
    }
    fs::read_to_string(input).with_context(|| format!("failed to read {}", input.display()))
}
