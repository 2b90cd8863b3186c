use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc};
use std::thread;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use petfactory_core::orchestrator::{spawn_merge, Engine, RunMode};
use petfactory_core::pause::PauseToken;
use petfactory_core::platform::{create_platform, hotkey};
use petfactory_core::settings::{Destination, Settings, Timings};
use petfactory_core::signal::SignalChannel;
use petfactory_core::types::Command;
use petfactory_core::vision::{Catalog, GlyphRecognizer, NumericReader};
use petfactory_core::logger;

#[derive(Parser)]
#[command(name = "petfactory", version, about = "Levels and merges companion pets across game clients")]
struct Cli {
    /// Use the simulated screen instead of real windows
    #[arg(long, global = true)]
    stub: bool,

    #[arg(long, global = true, default_value = "settings.json")]
    settings: PathBuf,

    /// Override the goal level from settings
    #[arg(long, global = true)]
    goal: Option<u32>,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Scan every client, level ready pets, then follow alerts until done
    Run,
    /// Scan every client and print a per-slot report
    Analyze,
    /// Merge pets on one client, then travel and start AFK
    Merge(MergeArgs),
    /// Delete leftover signal files
    Clean,
}

#[derive(Args)]
struct MergeArgs {
    /// Display name of the client to merge on
    #[arg(long)]
    instance: String,
    /// Receiver slot, 1-8
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=8))]
    receiver: Option<u8>,
    /// First provider slot, 1-8; every slot from here on gets merged
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=8))]
    provider: Option<u8>,
    #[arg(long)]
    catalyst: bool,
    #[arg(long)]
    max_merges: Option<u32>,
    /// Slot to carry after arriving, 1-8
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=8))]
    final_slot: Option<u8>,
    /// thermopylae or larissa
    #[arg(long)]
    destination: Option<Destination>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    logger::init(&cwd.join("logs"));

    let mut settings = Settings::load(&cli.settings);
    if !cli.settings.exists() && settings.save(&cli.settings) {
        logger::info(&format!("wrote default settings to {}", cli.settings.display()));
    }
    if let Some(goal) = cli.goal {
        settings.goal.target_level = goal;
    }
    if cli.stub {
        // nothing renders on the simulated screen; fail waits fast
        settings.retry.max_attempts = Some(3);
        settings.timings = Timings::instant();
        settings.poll_interval_secs = 1;
    }

    // Forward log lines to stdout
    let (log_tx, log_rx) = mpsc::channel();
    logger::set_sink(log_tx);
    thread::spawn(move || {
        for line in log_rx {
            println!("{}", line.render());
        }
    });
    logger::info("petfactory started");

    if let Cmd::Clean = cli.command {
        let removed = SignalChannel::new(settings.signal_dir.clone()).clean_stale();
        logger::info(&format!("removed {} signal file(s)", removed));
        return Ok(());
    }

    let token = PauseToken::new();
    hotkey::start_hotkey_listener(token.clone());
    let (cmd_tx, cmd_rx) = mpsc::channel();
    spawn_stdin_commands(cmd_tx);

    let catalog = Arc::new(load_catalog(&settings.assets_dir, cli.stub)?);
    let mut engine = Engine::new(create_platform(cli.stub), catalog, settings.clone(), token)
        .with_commands(cmd_rx);
    if settings.ocr.metric_region.is_some() {
        let digits = settings.assets_dir.join("digits");
        match GlyphRecognizer::load(&digits) {
            Ok(glyphs) => engine = engine.with_reader(Arc::new(NumericReader::new(Box::new(glyphs)))),
            Err(e) => logger::warn(&format!("on-screen metric reading disabled: {:#}", e)),
        }
    }

    match cli.command {
        Cmd::Run => engine.run(RunMode::Full),
        Cmd::Analyze => engine.run(RunMode::Analyze),
        Cmd::Merge(args) => {
            let mut cfg = settings.merge;
            if let Some(s) = args.receiver {
                cfg.receiver_slot = s as usize - 1;
            }
            if let Some(s) = args.provider {
                cfg.provider_slot = s as usize - 1;
            }
            if let Some(s) = args.final_slot {
                cfg.final_slot = s as usize - 1;
            }
            cfg.use_catalyst |= args.catalyst;
            cfg.max_merges = args.max_merges.or(cfg.max_merges);
            if let Some(d) = args.destination {
                cfg.destination = d;
            }
            let handle = spawn_merge(engine, args.instance, cfg);
            let report = handle
                .join()
                .map_err(|_| anyhow::anyhow!("merge thread panicked"))??;
            logger::info(&format!(
                "merged {} pet(s), collected {}, catalyst depleted: {}",
                report.merges_completed, report.pets_collected, report.catalyst_depleted
            ));
        }
        Cmd::Clean => {}
    }
    Ok(())
}

fn load_catalog(dir: &Path, stub: bool) -> Result<Catalog> {
    match Catalog::load(dir) {
        Ok(c) => Ok(c),
        Err(e) if stub => {
            logger::warn(&format!("{:#}, continuing with an empty catalog", e));
            Ok(Catalog::default())
        }
        Err(e) => Err(e).context("reference images are required"),
    }
}

/// `p` toggles pause, `s` stops, `q` quits.
fn spawn_stdin_commands(tx: mpsc::Sender<Command>) {
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            let cmd = match line.trim() {
                "p" => Command::TogglePause,
                "s" => Command::Stop,
                "q" => Command::Quit,
                _ => continue,
            };
            if tx.send(cmd).is_err() {
                break;
            }
        }
    });
}
