//! Level persistence as gzip-compressed JSON.
//!
//! Each level lives in `<dir>/<uuid>.json.gz` holding its [`LevelData`].
//! Block ids are stored through the level's name palette, so a save
//! survives extensions being added or removed as long as every block it
//! uses is still registered.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use anyhow::{Context, Result, bail};
use bricklayer_engine::sync::Authority;
use bricklayer_engine::world::{BlockCatalog, Level, LevelData};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use rayon::prelude::*;
use uuid::Uuid;

const EXTENSION: &str = ".json.gz";

pub fn level_path(dir: &Path, id: Uuid) -> PathBuf {
    dir.join(format!("{id}{EXTENSION}"))
}

/// Write one level. The file is replaced atomically, so a crash mid-save
/// leaves the previous version intact.
pub fn save_level(data: &LevelData, dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    let path = level_path(dir, data.id);
    let tmp = path.with_extension("tmp");

    let file = File::create(&tmp).with_context(|| format!("creating {}", tmp.display()))?;
    let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
    serde_json::to_writer(&mut encoder, data).with_context(|| format!("serializing level {}", data.id))?;
    encoder.finish()?.flush()?;

    fs::rename(&tmp, &path).with_context(|| format!("replacing {}", path.display()))?;
    Ok(path)
}

pub fn read_level(path: &Path) -> Result<LevelData> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let decoder = GzDecoder::new(BufReader::new(file));
    serde_json::from_reader(decoder).with_context(|| format!("parsing {}", path.display()))
}

/// Save every open level that changed since its last save. Levels are
/// snapshotted one lock at a time and written in parallel with no lock held.
///
/// A level that fails to write is marked dirty again so the next save
/// retries it. Returns the number of levels written.
pub fn save_dirty(authority: &Authority, dir: &Path) -> Result<usize> {
    let start = Instant::now();
    let pending: Vec<(Arc<Mutex<Level>>, LevelData)> = authority
        .handles()
        .into_iter()
        .filter_map(|handle| {
            let data = {
                let mut level = handle.lock().expect("level poisoned");
                level.take_dirty().then(|| level.to_data())
            };
            data.map(|data| (handle, data))
        })
        .collect();
    if pending.is_empty() {
        tracing::info!("Level save: nothing to save (no dirty levels)");
        return Ok(0);
    }

    let failures: Vec<anyhow::Error> = pending
        .par_iter()
        .filter_map(|(handle, data)| match save_level(data, dir) {
            Ok(_) => None,
            Err(e) => {
                handle.lock().expect("level poisoned").mark_dirty();
                Some(e)
            }
        })
        .collect();

    for e in &failures {
        tracing::error!("Level save failed: {e:#}");
    }
    let written = pending.len() - failures.len();
    tracing::info!("Levels saved: {} of {} dirty ({:.2?})", written, pending.len(), start.elapsed());
    if !failures.is_empty() {
        bail!("{} of {} levels failed to save", failures.len(), pending.len());
    }
    Ok(written)
}

/// Load every level saved under `dir`, mapped onto `catalog`.
///
/// A missing directory yields no levels. A file that cannot be read, or
/// that uses a block the catalog lacks, is skipped with an error logged so
/// the remaining levels still come up.
pub fn load_all(dir: &Path, catalog: &Arc<BlockCatalog>) -> Result<Vec<Level>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let start = Instant::now();
    let mut paths = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("listing {}", dir.display()))? {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if name.ends_with(EXTENSION) {
            paths.push(path);
        } else if !name.ends_with(".tmp") {
            tracing::warn!("Skipping unexpected file in level dir: {}", name);
        }
    }
    paths.sort();

    let levels: Vec<Level> = paths
        .par_iter()
        .filter_map(|path| {
            let loaded = read_level(path)
                .and_then(|data| Level::from_data(data, Arc::clone(catalog)).map_err(anyhow::Error::from));
            match loaded {
                Ok(level) => Some(level),
                Err(e) => {
                    tracing::error!("Failed to load {}: {e:#}", path.display());
                    None
                }
            }
        })
        .collect();

    tracing::info!("Loaded {} levels from {} ({:.2?})", levels.len(), dir.display(), start.elapsed());
    Ok(levels)
}
