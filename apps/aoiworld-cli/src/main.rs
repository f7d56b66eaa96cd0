use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use aoiworld_common::Pose;
use aoiworld_grid::{CellId, SpatialIndex};
use aoiworld_interest::{ChannelTransport, FanOut, Gateway};
use aoiworld_kernel::{splitmix64, WorldConfig};
use aoiworld_tools::{WorldInspector, WorldSummary};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "aoiworld-cli", about = "CLI tool for aoiworld operations")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// World config (YAML). Defaults are used when omitted.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print version and the active world configuration
    Info,
    /// Print every cell with its bounds
    Layout,
    /// List the 3x3 neighborhood of a cell
    Neighbors {
        /// Cell id (row-major, 0-indexed)
        #[arg(long)]
        cell: u32,
    },
    /// Run concurrent simulated clients against one world
    Simulate {
        /// Number of client threads
        #[arg(long, default_value = "16")]
        clients: u32,
        /// Moves per client
        #[arg(long, default_value = "200")]
        steps: u32,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Outcome of a simulation run.
#[derive(Debug, Serialize)]
struct SimulationReport {
    clients: u32,
    steps: u32,
    delivered: usize,
    failed: usize,
    received: usize,
    violations: usize,
    summary: WorldSummary,
    /// Rendered occupancy map, one line per grid row.
    occupancy: String,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    let config = match &cli.config {
        Some(path) => WorldConfig::load(path)?,
        None => WorldConfig::default(),
    };

    match cli.command {
        Commands::Info => {
            println!("aoiworld-cli v{}", env!("CARGO_PKG_VERSION"));
            println!("grid: {}", aoiworld_grid::crate_info());
            let g = config.grid;
            println!(
                "world: x[{}, {}) z[{}, {}) {}x{} cells of {}x{}",
                g.min_x,
                g.max_x,
                g.min_z,
                g.max_z,
                g.cols,
                g.rows,
                g.cell_width(),
                g.cell_height()
            );
            let s = config.spawn;
            println!(
                "spawn: x[{}, {}) z[{}, {}) y={} seed={}",
                s.min_x, s.max_x, s.min_z, s.max_z, s.elevation, config.seed
            );
        }
        Commands::Layout => {
            let index = SpatialIndex::new(config.grid)?;
            print!("{index}");
        }
        Commands::Neighbors { cell } => {
            let index = SpatialIndex::new(config.grid)?;
            let id = CellId(cell);
            let Some(center) = index.cell(id) else {
                anyhow::bail!("cell {cell} does not exist (grid has {} cells)", index.cell_count());
            };
            println!("Neighborhood of {center}");
            for neighbor in index.neighbors_of(id) {
                if let Some(c) = index.cell(neighbor) {
                    let b = c.bounds();
                    println!(
                        "  cell {} x[{}, {}) z[{}, {})",
                        c.id(),
                        b.min_x,
                        b.max_x,
                        b.min_z,
                        b.max_z
                    );
                }
            }
        }
        Commands::Simulate {
            clients,
            steps,
            json,
        } => {
            let report = simulate(&config, clients, steps)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!(
                    "Simulation: clients={} steps={} delivered={} failed={} received={}",
                    report.clients, report.steps, report.delivered, report.failed, report.received
                );
                println!("{}", report.summary);
                print!("{}", report.occupancy);
            }
            if report.violations > 0 {
                anyhow::bail!("membership audit found {} violations", report.violations);
            }
        }
    }

    Ok(())
}

/// Every client connects, wanders, chats now and then, and drains its inbox.
/// Even-numbered clients disconnect at the end so the final world is half
/// populated.
fn simulate(config: &WorldConfig, clients: u32, steps: u32) -> anyhow::Result<SimulationReport> {
    let transport = Arc::new(ChannelTransport::new());
    let gateway = Gateway::from_config(config, Arc::clone(&transport))?;
    let grid = config.grid;
    let delivered = AtomicUsize::new(0);
    let failed = AtomicUsize::new(0);
    let received = AtomicUsize::new(0);

    let _span = tracing::info_span!("simulate", clients, steps).entered();
    std::thread::scope(|s| {
        for client in 0..clients {
            let gateway = &gateway;
            let transport = &transport;
            let (delivered, failed, received) = (&delivered, &failed, &received);
            s.spawn(move || {
                let (conn, inbox) = transport.attach();
                let id = match gateway.on_connect(conn) {
                    Ok(id) => id,
                    Err(err) => {
                        tracing::warn!(client, %err, "connect refused");
                        return;
                    }
                };

                let mut state = config.seed ^ u64::from(client).wrapping_mul(0x9e37_79b9);
                let mut total = FanOut::default();
                for step in 0..steps {
                    state = splitmix64(state);
                    let x = grid.min_x as f32 + (state % grid.width() as u64) as f32;
                    state = splitmix64(state);
                    let z = grid.min_z as f32 + (state % grid.height() as u64) as f32;
                    let facing = (state % 360) as f32;
                    total = total.merge(gateway.on_move(id, Pose::new(x, 0.0, z, facing)));
                    if step % 50 == 0 {
                        total = total.merge(gateway.on_chat(id, &format!("{id} says hi at step {step}")));
                    }
                    received.fetch_add(inbox.try_iter().count(), Ordering::Relaxed);
                }

                if client % 2 == 0 {
                    total = total.merge(gateway.on_disconnect(id));
                    transport.detach(conn);
                }
                received.fetch_add(inbox.try_iter().count(), Ordering::Relaxed);
                delivered.fetch_add(total.delivered, Ordering::Relaxed);
                failed.fetch_add(total.failed, Ordering::Relaxed);
            });
        }
    });

    let snapshot = gateway.registry().snapshot();
    let violations = WorldInspector::audit(&snapshot);
    for violation in &violations {
        tracing::error!(%violation, "membership violation");
    }
    tracing::info!(
        entities = snapshot.entities.len(),
        violations = violations.len(),
        "simulation finished"
    );

    Ok(SimulationReport {
        clients,
        steps,
        delivered: delivered.into_inner(),
        failed: failed.into_inner(),
        received: received.into_inner(),
        violations: violations.len(),
        summary: WorldInspector::summary(&snapshot),
        occupancy: WorldInspector::occupancy_map(&snapshot),
    })
}
