//! Headless demo shell for the Slither arena core.
//!
//! Wires a field to the baseline forager brains, respawns killed bots through
//! the admission queue, and optionally dumps an ASCII view of the playfield
//! (head `#`, body `+`, food `*`).

use anyhow::{Context, Result};
use clap::Parser;
use slither_brain::ForagerBrain;
use slither_core::{ArenaConfig, BotId, BotStats, Field, UpdateTracker};
use std::{thread, time::Duration};
use tracing::{debug, info, warn};

#[derive(Parser, Debug)]
#[command(name = "slither", about = "Headless Slither arena demo")]
struct AppCli {
    /// World width in world units.
    #[arg(long, default_value_t = 120.0)]
    width: f32,

    /// World height in world units.
    #[arg(long, default_value_t = 60.0)]
    height: f32,

    /// Number of forager bots to admit at startup.
    #[arg(long, default_value_t = 6)]
    bots: usize,

    /// Static food target.
    #[arg(long, default_value_t = 120)]
    food: usize,

    /// Number of ticks to simulate.
    #[arg(long, default_value_t = 600)]
    ticks: u64,

    /// RNG seed for reproducible runs.
    #[arg(long)]
    seed: Option<u64>,

    /// Millisecond pause between ticks.
    #[arg(long, default_value_t = 0)]
    tick_ms: u64,

    /// Dump an ASCII view of the field every N frames (0 disables).
    #[arg(long, default_value_t = 0)]
    dump_every: u64,
}

fn main() -> Result<()> {
    let cli = AppCli::parse();
    init_tracing();

    let config = ArenaConfig {
        world_width: cli.width,
        world_height: cli.height,
        static_food_count: cli.food,
        rng_seed: cli.seed,
        ..ArenaConfig::default()
    };
    let mut field =
        Field::new(config, Box::new(LogTracker)).context("building the arena field")?;

    // Killed bots come back as fresh foragers on the next tick.
    let mut respawns = 0usize;
    field.add_kill_callback(Box::new(move |admissions, _victim, _killer| {
        respawns += 1;
        admissions.schedule(
            format!("forager-r{respawns}"),
            Box::new(ForagerBrain::default()),
        );
    }));

    for index in 0..cli.bots {
        let name = format!("forager-{index}");
        match field.admit_bot(name.as_str(), Box::new(ForagerBrain::default())) {
            Ok(id) => debug!(?id, name = %name, "bot admitted"),
            Err(error) => warn!(%error, name = %name, "bot not admitted"),
        }
    }

    info!(
        width = cli.width,
        height = cli.height,
        bots = field.bot_count(),
        food = field.food_count(),
        workers = field.config().worker_threads,
        "starting arena"
    );

    for _ in 0..cli.ticks {
        let report = field.step().context("advancing the simulation")?;
        if report.frame.0.is_multiple_of(60) {
            info!(
                frame = report.frame.0,
                bots = report.bots_alive,
                food = report.food_items,
                consumed = report.food_consumed,
                "tick"
            );
        }
        if cli.dump_every > 0 && report.frame.0.is_multiple_of(cli.dump_every) {
            println!("frame {}\n{}", report.frame.0, render_ascii(&field));
        }
        if cli.tick_ms > 0 {
            thread::sleep(Duration::from_millis(cli.tick_ms));
        }
    }

    info!(frame = field.frame().0, bots = field.bot_count(), "arena stopped");
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// Tracker that forwards arena events to the tracing subscriber.
struct LogTracker;

impl UpdateTracker for LogTracker {
    fn bot_spawned(&mut self, bot: BotId) {
        debug!(?bot, "bot spawned");
    }

    fn bot_killed(&mut self, killer: BotId, victim: BotId) {
        if killer == victim {
            info!(?victim, "bot starved while boosting");
        } else {
            info!(?killer, ?victim, "bot killed");
        }
    }

    fn bot_log_message(&mut self, viewer_key: u64, message: &str) {
        debug!(viewer_key, message, "bot log");
    }

    fn bot_stats(&mut self, bot: BotId, stats: &BotStats) {
        debug!(
            ?bot,
            mass = stats.mass,
            segments = stats.segment_count,
            "bot stats"
        );
    }
}

/// One character per world unit: `#` heads, `+` bodies, `*` food.
fn render_ascii(field: &Field) -> String {
    let torus = field.torus();
    let width = (torus.width().ceil() as usize).max(1);
    let height = (torus.height().ceil() as usize).max(1);
    let mut grid = vec![b'.'; width * height];

    let plot = |x: f32, y: f32, glyph: u8, grid: &mut Vec<u8>| {
        let cx = (x as usize).min(width - 1);
        let cy = (y as usize).min(height - 1);
        grid[cy * width + cx] = glyph;
    };

    for food in field.food() {
        let pos = food.pos();
        plot(pos.x, pos.y, b'*', &mut grid);
    }
    for (_, bot) in field.bots() {
        let mut glyph = b'#';
        for seg in bot.snake().segments() {
            plot(seg.x, seg.y, glyph, &mut grid);
            glyph = b'+';
        }
    }

    let mut out = String::with_capacity((width + 1) * height);
    for row in grid.chunks(width) {
        out.push_str(&String::from_utf8_lossy(row));
        out.push('\n');
    }
    out
}
