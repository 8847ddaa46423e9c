//! World persistence: a postcard-encoded snapshot of the grid, written
//! atomically, plus the periodic autosave loop.
//!
//! Occupant polymorphism round-trips through the closed [`SavedOccupant`]
//! enum: the discriminant picks the concrete type at decode time, so every
//! occupant kind that should survive a save must have a variant here.

use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use gridlife_core::{Energetic, Food, Grid, Occupant, Organism, PutWhen, Shutdown};
use gridlife_cpu::{Bytecode, Cpu};

/// Errors from saving or restoring world state.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("autosave io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("autosave codec error: {0}")]
    Codec(#[from] postcard::Error),
}

/// Persisted form of a CPU driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedCpu {
    pub ip: u64,
    pub registers: [u8; 4],
    pub code: Bytecode,
}

/// Persisted form of a cell occupant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SavedOccupant {
    Food { energy: i64 },
    Organism {
        energy: i64,
        direction: u8,
        cpu: Option<SavedCpu>,
    },
    Null,
}

/// One occupied cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedCell {
    pub x: i32,
    pub y: i32,
    pub occupant: SavedOccupant,
}

/// The whole world: extents plus every occupied cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldSnapshot {
    pub width: i32,
    pub height: i32,
    pub cells: Vec<SavedCell>,
}

fn save_occupant(occupant: &Occupant) -> SavedOccupant {
    match occupant {
        Occupant::Food(food) => SavedOccupant::Food {
            energy: food.energy(),
        },
        Occupant::Organism(org) => {
            let cpu = org.driver().and_then(|driver| {
                driver.as_any().downcast_ref::<Cpu>().map(|cpu| {
                    let (ip, registers) = cpu.state_snapshot();
                    SavedCpu {
                        ip: ip as u64,
                        registers,
                        code: cpu.code().clone(),
                    }
                })
            });
            SavedOccupant::Organism {
                energy: org.energy(),
                direction: org.direction(),
                cpu,
            }
        }
        Occupant::Null => SavedOccupant::Null,
    }
}

fn load_occupant(saved: SavedOccupant) -> Occupant {
    match saved {
        SavedOccupant::Food { energy } => Occupant::Food(Food::new(energy)),
        SavedOccupant::Organism {
            energy,
            direction,
            cpu,
        } => {
            let org = Organism::with_direction(direction);
            org.add(energy);
            if let Some(saved_cpu) = cpu {
                let cpu = Cpu::with_state(saved_cpu.code, saved_cpu.ip as usize, saved_cpu.registers);
                org.set_driver(Arc::new(cpu));
            }
            Occupant::Organism(org)
        }
        SavedOccupant::Null => Occupant::Null,
    }
}

/// Captures the current world state.
#[must_use]
pub fn snapshot(grid: &Grid) -> WorldSnapshot {
    let mut points = Vec::new();
    let (width, height, _) = grid.locations(&mut points);
    let cells = points
        .into_iter()
        .map(|point| SavedCell {
            x: point.x,
            y: point.y,
            occupant: save_occupant(&point.value),
        })
        .collect();
    WorldSnapshot {
        width,
        height,
        cells,
    }
}

/// Encodes `grid` to a temporary file beside `path`, then atomically
/// renames it into place.
pub fn save(path: &Path, grid: &Grid) -> Result<(), StorageError> {
    let world = snapshot(grid);
    let encoded = postcard::to_allocvec(&world)?;

    let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
    if let Some(dir) = dir {
        fs::create_dir_all(dir)?;
    }
    let mut staged = tempfile::NamedTempFile::new_in(dir.unwrap_or_else(|| Path::new(".")))?;
    staged.write_all(&encoded)?;
    staged.persist(path).map_err(|err| err.error)?;
    debug!(target: "gridlife::autosave", path = %path.display(), cells = world.cells.len(), "saved world");
    Ok(())
}

/// Decodes the file at `path` into `grid`: the grid is resized to the saved
/// extents and every saved occupant is placed unconditionally.
pub fn restore(path: &Path, grid: &Grid) -> Result<(), StorageError> {
    let bytes = fs::read(path)?;
    let world: WorldSnapshot = postcard::from_bytes(&bytes)?;
    grid.resize(world.width, world.height, |_, _, _| {});
    for cell in world.cells {
        grid.put(cell.x, cell.y, load_occupant(cell.occupant), PutWhen::Always);
    }
    debug!(target: "gridlife::autosave", path = %path.display(), "restored world");
    Ok(())
}

/// Saves `grid` to `path` every `period` until `shutdown` triggers. IO
/// failures are logged and retried on the next round.
pub fn run_loop(path: &Path, grid: &Grid, period: Duration, shutdown: &Shutdown) {
    while !shutdown.is_triggered() {
        thread::sleep(period);
        if shutdown.is_triggered() {
            return;
        }
        if let Err(err) = save(path, grid) {
            warn!(target: "gridlife::autosave", %err, "autosave failed");
        }
    }
}
