//! Live web dashboard: server counters, open levels and connected sessions.
//!
//! Everything the dashboard reads is either an atomic counter or a short
//! lock on a level, so a slow browser never holds up gameplay.

pub mod metrics;
pub mod server;

use bricklayer_engine::sync::Authority;
use serde::Serialize;
use uuid::Uuid;

pub use metrics::{Metrics, MetricsSnapshot};

#[derive(Clone, Debug, Serialize)]
pub struct LevelView {
    pub id: Uuid,
    pub name: String,
    pub creator: String,
    pub width: u16,
    pub height: u16,
    pub plays: u32,
    pub dirty: bool,
    pub players: Vec<String>,
}

/// Every open level, sorted by name.
pub fn level_views(authority: &Authority) -> Vec<LevelView> {
    let mut views: Vec<LevelView> = authority
        .handles()
        .into_iter()
        .map(|handle| {
            let level = handle.lock().expect("level poisoned");
            LevelView {
                id: level.id(),
                name: level.meta().name.clone(),
                creator: level.meta().creator.username.clone(),
                width: level.width(),
                height: level.height(),
                plays: level.meta().plays,
                dirty: level.is_dirty(),
                players: level.roster().iter().map(|p| p.username.clone()).collect(),
            }
        })
        .collect();
    views.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
    views
}
