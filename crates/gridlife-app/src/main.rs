//! An implementation of artificial life.
//!
//! Boots a toroidal grid populated by bytecode organisms, keeps a minimum
//! population alive, records population history, auto-saves the world, and
//! renders it to the terminal as it evolves.

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use crossterm::{
    cursor::{Hide, MoveTo, MoveToNextLine, Show},
    event::{self, Event, KeyCode, KeyModifiers},
    execute, queue,
    style::Print,
    terminal::{
        disable_raw_mode, enable_raw_mode, Clear, ClearType, EnterAlternateScreen,
        LeaveAlternateScreen,
    },
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use gridlife_app::{render, sim, stats};
use gridlife_census::{Census, DirCensus};
use gridlife_chanbuf as chanbuf;
use gridlife_core::{
    maintain, Grid, GridOptions, Occupant, RenderGate, Shutdown, UpdateBatch,
};
use gridlife_app::sim::Genome;
use gridlife_storage as storage;

#[derive(Parser, Debug)]
#[command(name = "gridlife", version, about = "Evolving bytecode organisms on a toroidal grid")]
struct Cli {
    /// Render the world to the terminal.
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    print: bool,

    /// Renderer refresh rate in Hz.
    #[arg(long = "print-hz", default_value_t = 10.0)]
    print_hz: f64,

    /// Maintain at least this many organisms.
    #[arg(long = "min", default_value_t = 50)]
    min_organisms: usize,

    /// Block world mutations until their effects have been rendered.
    #[arg(long, default_value_t = false)]
    sync: bool,

    /// Auto-save the world to this file.
    #[arg(long = "save-file", default_value = "/tmp/autosave.dat")]
    save_file: PathBuf,

    /// Seconds between auto-saves (0 disables).
    #[arg(long = "save-every", default_value_t = 3)]
    save_every: u64,

    /// Width of the world.
    #[arg(long, default_value_t = 200)]
    width: i32,

    /// Height of the world.
    #[arg(long, default_value_t = 50)]
    height: i32,

    /// Directory for recorded populations.
    #[arg(long = "census-dir", default_value = "/tmp/census")]
    census_dir: PathBuf,

    /// Trace every component.
    #[arg(long = "trace-all", default_value_t = false)]
    trace_all: bool,

    /// Trace CPU execution.
    #[arg(long = "trace-cpu", default_value_t = false)]
    trace_cpu: bool,

    /// Trace grid mutations.
    #[arg(long = "trace-grid", default_value_t = false)]
    trace_grid: bool,

    /// Trace the population maintainer.
    #[arg(long = "trace-maintain", default_value_t = false)]
    trace_maintain: bool,

    /// Trace organism actions.
    #[arg(long = "trace-org", default_value_t = false)]
    trace_org: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli)?;
    run(cli)
}

fn init_tracing(cli: &Cli) -> Result<()> {
    let mut filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    if cli.trace_all {
        filter = filter.add_directive("gridlife=trace".parse()?);
    }
    for (enabled, directive) in [
        (cli.trace_cpu, "gridlife::cpu=trace"),
        (cli.trace_grid, "gridlife::grid=trace"),
        (cli.trace_maintain, "gridlife::maintain=trace"),
        (cli.trace_org, "gridlife::org=trace"),
    ] {
        if enabled {
            filter = filter.add_directive(directive.parse()?);
        }
    }
    let _ = tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(filter)
        .try_init();
    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    let shutdown = Shutdown::new();
    let gate = if cli.sync && cli.print {
        Some(Arc::new(RenderGate::new()))
    } else {
        if cli.sync {
            warn!("--sync has no effect without --print");
        }
        None
    };

    let grid = Grid::with_options(
        0,
        0,
        GridOptions {
            empty: Some(Arc::new(|occ: &Occupant| occ.is_food())),
            gate: gate.clone(),
        },
    );

    restore_world(&cli, &grid)?;
    grid.resize(cli.width, cli.height, |_, _, _| {});
    if grid.occupant_count() == 0 {
        sim::seed_food(&grid, 4, 1000);
    }

    let census: Arc<DirCensus<Genome>> = Arc::new(
        DirCensus::new(&cli.census_dir, Box::new(|p| p.count > 30)).with_context(|| {
            format!("failed to open census directory {}", cli.census_dir.display())
        })?,
    );
    start_census(&grid, &census);
    start_maintainer(&cli, &grid, &census);
    let updates_seen = start_update_counter(&grid);
    start_autosave(&cli, &grid, &shutdown);

    let resumed = gridlife_cpu::start_all(&grid);
    info!(resumed, width = cli.width, height = cli.height, "world running");

    if cli.print {
        let outcome = run_terminal(&cli, &grid, &census, gate.as_deref(), &updates_seen);
        shutdown.trigger();
        grid.close_subscribers();
        if cli.save_every > 0 {
            if let Err(err) = storage::save(&cli.save_file, &grid) {
                warn!(%err, "final save failed");
            }
        }
        outcome
    } else {
        // Headless: run until the process is killed.
        loop {
            thread::park();
        }
    }
}

fn restore_world(cli: &Cli, grid: &Grid) -> Result<()> {
    match storage::restore(&cli.save_file, grid) {
        Ok(()) => {
            info!(path = %cli.save_file.display(), "restored autosave");
            Ok(())
        }
        Err(storage::StorageError::Io(err)) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err).with_context(|| {
            format!("failed to restore autosave {}", cli.save_file.display())
        }),
    }
}

fn start_census(grid: &Grid, census: &Arc<DirCensus<Genome>>) {
    let (_, rx) = grid.subscribe();
    let key_fn = sim::genome_key_fn();
    gridlife_census::scan_grid(census.as_ref(), grid, &key_fn);
    let census = Arc::clone(census);
    thread::Builder::new()
        .name("census".into())
        .spawn(move || gridlife_census::watch(census.as_ref(), rx, &key_fn))
        .expect("failed to spawn census task");
}

fn start_maintainer(cli: &Cli, grid: &Grid, census: &Arc<DirCensus<Genome>>) {
    let counts: maintain::CounterFn = Arc::new(|occ: &Occupant| occ.is_organism());
    let initial = maintain::count(grid, &counts);
    let (_, rx) = grid.subscribe();
    let spawner: maintain::SpawnFn = {
        let grid = grid.clone();
        let census = Arc::clone(census);
        Arc::new(move || {
            sim::spawn_organism(&grid, &census);
        })
    };
    let keep = cli.min_organisms;
    thread::Builder::new()
        .name("maintain".into())
        .spawn(move || maintain::run(rx, counts, spawner, keep, initial))
        .expect("failed to spawn maintainer task");
}

fn start_update_counter(grid: &Grid) -> Arc<AtomicU64> {
    let seen = Arc::new(AtomicU64::new(0));
    let (_, rx) = grid.subscribe();
    let counter = Arc::clone(&seen);
    thread::Builder::new()
        .name("update-counter".into())
        .spawn(move || {
            while let Ok(batch) = rx.recv() {
                counter.fetch_add(batch.len() as u64, Ordering::Relaxed);
            }
        })
        .expect("failed to spawn update counter task");
    seen
}

fn start_autosave(cli: &Cli, grid: &Grid, shutdown: &Shutdown) {
    if cli.save_every == 0 {
        return;
    }
    let path = cli.save_file.clone();
    let grid = grid.clone();
    let shutdown = shutdown.clone();
    let period = Duration::from_secs(cli.save_every);
    thread::Builder::new()
        .name("autosave".into())
        .spawn(move || storage::run_loop(&path, &grid, period, &shutdown))
        .expect("failed to spawn autosave task");
}

fn run_terminal(
    cli: &Cli,
    grid: &Grid,
    census: &DirCensus<Genome>,
    gate: Option<&RenderGate>,
    updates_seen: &AtomicU64,
) -> Result<()> {
    // Insulate the renderer from the bus: keep only the newest batch and
    // flush it at the configured frame rate.
    let (sub_id, rx) = grid.subscribe();
    let queue = chanbuf::ring::<UpdateBatch>(1);
    {
        let queue = Arc::clone(&queue);
        thread::Builder::new()
            .name("render-feed".into())
            .spawn(move || chanbuf::feed(queue.as_ref(), &rx))
            .expect("failed to spawn render feed task");
    }
    let interval = Duration::from_secs_f64(1.0 / cli.print_hz.max(0.1));
    let frames = chanbuf::tick(queue, interval, true);

    let mut stdout = io::stdout();
    enable_raw_mode().context("failed to enable raw mode")?;
    execute!(stdout, EnterAlternateScreen, Hide).context("failed to enter alternate screen")?;

    let step_rate = stats::MovingAvg::new(Duration::from_secs(5));
    let mut last_steps = gridlife_cpu::step_count();
    let mut last_frame = std::time::Instant::now();

    let result = (|| -> Result<()> {
        loop {
            if frames.try_recv().is_ok() {
                let now = std::time::Instant::now();
                let steps = gridlife_cpu::step_count();
                let elapsed = now.duration_since(last_frame).as_secs_f64();
                if elapsed > 0.0 {
                    step_rate.add((steps - last_steps) as f64 / elapsed);
                }
                last_steps = steps;
                last_frame = now;

                draw_frame(&mut stdout, grid, census, updates_seen, step_rate.value())?;
                if let Some(gate) = gate {
                    gate.broadcast();
                }
            }
            if event::poll(Duration::from_millis(15))? {
                if let Event::Key(key) = event::read()? {
                    let ctrl_c = key.code == KeyCode::Char('c')
                        && key.modifiers.contains(KeyModifiers::CONTROL);
                    if ctrl_c || matches!(key.code, KeyCode::Char('q') | KeyCode::Esc) {
                        return Ok(());
                    }
                }
            }
        }
    })();

    // Unblock any organism stuck on the render gate before tearing down.
    if let Some(gate) = gate {
        gate.broadcast();
    }
    grid.unsubscribe(sub_id);
    execute!(stdout, Show, LeaveAlternateScreen).ok();
    disable_raw_mode().ok();
    result
}

fn draw_frame(
    out: &mut impl Write,
    grid: &Grid,
    census: &DirCensus<Genome>,
    updates_seen: &AtomicU64,
    steps_per_sec: f64,
) -> Result<()> {
    queue!(out, MoveTo(0, 0))?;
    for line in render::world_lines(grid) {
        queue!(out, Print(line), Clear(ClearType::UntilNewLine), MoveToNextLine(1))?;
    }
    queue!(
        out,
        Print(format!(
            "{} updates, {} steps ({steps_per_sec:.0}/s)",
            updates_seen.load(Ordering::Relaxed),
            gridlife_cpu::step_count()
        )),
        Clear(ClearType::UntilNewLine),
        MoveToNextLine(1),
        Print(format!(
            "{}/{} orgs ({}/{} species, {} recorded)",
            census.count(),
            census.count_all_time(),
            census.distinct(),
            census.distinct_all_time(),
            census.num_recorded()
        )),
        Clear(ClearType::UntilNewLine),
        MoveToNextLine(1),
        Print("q to quit"),
        Clear(ClearType::UntilNewLine)
    )?;
    out.flush()?;
    Ok(())
}
