mod config;
mod shutdown;
mod timer;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use clap::Parser;
use loadwatch::memory::SystemProcessProvider;
use loadwatch::{Attachment, EngineConfig, HookEngine, LoadListener};
use owo_colors::OwoColorize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::CliConfig;
use crate::shutdown::ShutdownSignal;
use crate::timer::{LoadTimer, format_duration};

#[derive(Parser)]
#[command(name = "loadwatch")]
#[command(about = "Load remover for Midnight Club 2")]
struct Args {
    #[arg(short, long, default_value = "loadwatch.toml")]
    config: PathBuf,

    /// Milliseconds between polls (overrides the config file)
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Process name substring to attach to (overrides the config file)
    #[arg(long)]
    process_name: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

/// Prints loading transitions and keeps the running totals
struct TimerListener {
    timer: LoadTimer,
}

impl TimerListener {
    fn new() -> Self {
        Self {
            timer: LoadTimer::new(Instant::now()),
        }
    }

    fn print_summary(&self) {
        let now = Instant::now();
        println!(
            "Real time {}  |  loading {} ({} loads)  |  without loads {}",
            format_duration(self.timer.real_time(now)),
            format_duration(self.timer.loading_time(now)),
            self.timer.loads(),
            format_duration(self.timer.game_time(now)).bold(),
        );
    }
}

impl LoadListener for TimerListener {
    fn on_loading(&mut self, loading: bool) {
        let now = Instant::now();
        if !self.timer.set_loading(loading, now) {
            return;
        }
        let elapsed = format_duration(self.timer.game_time(now));
        if loading {
            println!("[{}] {}", elapsed, "LOADING".yellow().bold());
        } else {
            println!("[{}] {}", elapsed, "RUNNING".green().bold());
        }
    }
}

fn print_attachment(attachment: Option<&Attachment>) {
    match attachment {
        Some(a) => println!(
            "{} pid {} ({} build, head at {:#x})",
            "Hooked".green(),
            a.pid,
            a.variant,
            a.head
        ),
        None => println!("{} waiting for Midnight Club 2...", "Detached,".red()),
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive(format!("loadwatch={}", level).parse()?)
                .add_directive(format!("loadwatch_cli={}", level).parse()?),
        )
        .init();

    let config = CliConfig::load_or_default(&args.config)
        .with_overrides(args.process_name, args.interval_ms);
    info!(
        "Watching for \"{}\" every {} ms",
        config.process_name,
        config.interval().as_millis()
    );

    let shutdown = Arc::new(ShutdownSignal::new());
    let shutdown_ctrlc = Arc::clone(&shutdown);
    ctrlc::set_handler(move || {
        info!("Received shutdown signal, stopping...");
        shutdown_ctrlc.trigger();
    })?;

    let engine_config = EngineConfig::builder()
        .process_name(config.process_name.as_str())
        .build();
    let mut engine =
        HookEngine::with_config(SystemProcessProvider, TimerListener::new(), engine_config);

    println!("Waiting for Midnight Club 2... (Ctrl+C to quit)");
    let mut attached_pid = None;
    while !shutdown.is_shutdown() {
        engine.update();

        let attachment = engine.attachment();
        let pid = attachment.as_ref().map(|a| a.pid);
        if pid != attached_pid {
            print_attachment(attachment.as_ref());
            attached_pid = pid;
        }

        if shutdown.wait(config.interval()) {
            break;
        }
    }

    engine.shutdown();
    engine.listener().print_summary();
    Ok(())
}
