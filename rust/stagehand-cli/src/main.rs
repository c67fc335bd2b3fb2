//! Stagehand CLI: load a script bundle and run it headless.

use clap::{Parser, Subcommand};
use stagehand_rt::{Engine, EngineConfig, EngineError, ScriptBundle};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info};

fn green(s: &str) -> String {
    format!("\x1b[32m{}\x1b[0m", s)
}
fn red(s: &str) -> String {
    format!("\x1b[31m{}\x1b[0m", s)
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{}\x1b[0m", s)
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{}\x1b[0m", s)
}
fn gray(s: &str) -> String {
    format!("\x1b[90m{}\x1b[0m", s)
}
fn status_label(label: &str) -> String {
    format!("\x1b[1;32m{:>12}\x1b[0m", label)
}

#[derive(Parser)]
#[command(name = "stagehand", version, about = "Run block-script bundles headless")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a bundle and report what would be skipped
    Check {
        /// Path to the bundle JSON file
        bundle: PathBuf,
    },
    /// Load a bundle, click the green flag and run frames
    Run {
        /// Path to the bundle JSON file
        bundle: PathBuf,

        /// Engine config file (TOML)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Stop after this many frames even if scripts are still running
        #[arg(long, default_value_t = 300)]
        frames: usize,

        /// Don't stop to redraw; run as many passes as fit in a frame
        #[arg(long)]
        turbo: bool,

        /// Frame rate override
        #[arg(long)]
        fps: Option<f64>,

        /// Run frames back to back instead of pacing them to the frame rate
        #[arg(long)]
        no_sleep: bool,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Check { bundle } => cmd_check(&bundle),
        Commands::Run {
            bundle,
            config,
            frames,
            turbo,
            fps,
            no_sleep,
        } => cmd_run(&bundle, config.as_deref(), frames, turbo, fps, !no_sleep),
    };
    if let Err(e) = result {
        eprintln!("{} {}", red("error:"), e);
        std::process::exit(1);
    }
}

fn load_engine(bundle_path: &Path, config: EngineConfig) -> Result<Engine, EngineError> {
    let bundle = ScriptBundle::load(bundle_path)?;
    let mut engine = Engine::new(config);
    let summary = engine.load(&bundle)?;
    println!(
        "{} {} {}",
        status_label("Loaded"),
        bundle_path.display(),
        gray(&format!(
            "({} targets, {} scripts, {} monitors)",
            summary.targets, summary.scripts, summary.monitors
        ))
    );
    if summary.skipped > 0 {
        println!(
            "{} {} scripts skipped; unsupported blocks: {}",
            yellow("warning:"),
            summary.skipped,
            engine
                .unsupported_blocks()
                .iter()
                .cloned()
                .collect::<Vec<_>>()
                .join(", ")
        );
    }
    Ok(engine)
}

fn cmd_check(bundle: &Path) -> Result<(), EngineError> {
    let engine = load_engine(bundle, EngineConfig::default())?;
    if engine.unsupported_blocks().is_empty() {
        println!("{} {}", green("✓"), bold("every block is supported"));
    }
    Ok(())
}

fn cmd_run(
    bundle: &Path,
    config_path: Option<&Path>,
    frames: usize,
    turbo: bool,
    fps: Option<f64>,
    pace: bool,
) -> Result<(), EngineError> {
    let config = match config_path {
        Some(path) => EngineConfig::load_from(path)?,
        None => EngineConfig::default(),
    }
    .with_env_overrides();

    let mut engine = load_engine(bundle, config)?;
    if turbo {
        engine.set_turbo_mode(true);
    }
    if let Some(fps) = fps {
        engine.set_fps(fps);
    }

    engine.start();
    let frame = engine.config().frame_duration();
    let started = Instant::now();
    let mut ran = 0;
    while ran < frames && engine.is_running() {
        let frame_start = Instant::now();
        engine.step();
        ran += 1;
        if pace {
            if let Some(rest) = frame.checked_sub(frame_start.elapsed()) {
                std::thread::sleep(rest);
            }
        }
    }
    debug!(frames = ran, elapsed = ?started.elapsed(), "run finished");
    if engine.is_running() {
        info!(frames = ran, "frame limit reached with scripts still running");
        engine.stop();
    }

    println!(
        "{} {} frames in {:.2}s",
        status_label("Finished"),
        ran,
        started.elapsed().as_secs_f64()
    );
    print_state(&engine);
    Ok(())
}

fn print_state(engine: &Engine) {
    for target in engine.targets().filter(|t| !t.is_clone()) {
        if target.variables.is_empty() && target.lists.is_empty() {
            continue;
        }
        println!("{}", bold(&target.name));
        for variable in &target.variables {
            println!("  {} = {}", variable.name, variable.value);
        }
        for list in &target.lists {
            println!("  {} = [{}]", list.name, list.joined());
        }
    }
    let visible: Vec<_> = engine.monitors().iter().filter(|m| m.visible).collect();
    if !visible.is_empty() {
        println!("{}", bold("monitors"));
        for monitor in visible {
            println!("  {} = {}", monitor.name, monitor.value());
        }
    }
}
