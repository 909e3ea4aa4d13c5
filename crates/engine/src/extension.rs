//! Extensions: the unit of gameplay customization.
//!
//! An extension contributes block types while the catalog is still being
//! built and subscribes to game events. Everything it does later happens
//! through the handlers it registered.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::event::{EventError, EventManager};
use crate::world::{CatalogBuilder, CatalogError};

/// Metadata describing an extension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtensionManifest {
    /// Short display name.
    pub name: String,
    /// Unique across all extensions, e.g. `org.example.protect`.
    pub identifier: String,
    pub description: String,
    pub authors: Vec<String>,
    /// Identifiers that must load before this one.
    pub dependencies: Vec<String>,
    pub version: String,
}

impl ExtensionManifest {
    pub fn new(name: impl Into<String>, identifier: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            identifier: identifier.into(),
            version: version.into(),
            ..Self::default()
        }
    }

    pub fn depends_on(mut self, identifier: impl Into<String>) -> Self {
        self.dependencies.push(identifier.into());
        self
    }

    /// `Name (identifier) vVersion`
    pub fn info_string(&self) -> String {
        format!("{} ({}) v{}", self.name, self.identifier, self.version)
    }
}

impl Default for ExtensionManifest {
    fn default() -> Self {
        Self {
            name: String::new(),
            identifier: String::new(),
            description: String::new(),
            authors: Vec::new(),
            dependencies: Vec::new(),
            version: "0.1.0".into(),
        }
    }
}

pub trait Extension: Send + Sync {
    fn manifest(&self) -> &ExtensionManifest;

    /// Add block types. Runs before the catalog is frozen.
    fn register_blocks(&self, _blocks: &mut CatalogBuilder) -> Result<(), CatalogError> {
        Ok(())
    }

    /// Register event handlers.
    fn subscribe(&self, _events: &EventManager) -> Result<(), EventError> {
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExtensionError {
    #[error("{extension} needs {dependency}, which is not loaded")]
    DependencyUnmet { extension: String, dependency: String },
    #[error("another extension already uses the identifier {0}")]
    DuplicateIdentifier(String),
    #[error("{extension} failed to register its blocks")]
    Registration {
        extension: String,
        #[source]
        source: CatalogError,
    },
    #[error("{extension} failed to subscribe to events")]
    Subscription {
        extension: String,
        #[source]
        source: EventError,
    },
}

/// What happened to each extension offered to [`load`].
#[derive(Default)]
pub struct LoadReport {
    /// In load order.
    pub loaded: Vec<Arc<dyn Extension>>,
    pub skipped: Vec<ExtensionError>,
    pub disabled: Vec<String>,
}

impl LoadReport {
    pub fn loaded_identifiers(&self) -> Vec<&str> {
        self.loaded.iter().map(|e| e.manifest().identifier.as_str()).collect()
    }
}

impl fmt::Debug for LoadReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadReport")
            .field("loaded", &self.loaded_identifiers())
            .field("skipped", &self.skipped)
            .field("disabled", &self.disabled)
            .finish()
    }
}

/// Load `extensions` into the catalog builder and the event manager.
///
/// Order is deterministic: identifiers ascending, except that an extension
/// always comes after its dependencies. An extension whose dependency is
/// missing, disabled, failed or part of a cycle is skipped, as is one whose
/// registration fails. Skipping one never stops the others.
///
/// Blocks are registered into a copy of the builder that is only kept if the
/// extension loads completely. Handlers registered before a failing
/// `subscribe` returned stay registered.
pub fn load(
    mut extensions: Vec<Arc<dyn Extension>>,
    disabled: &[String],
    blocks: &mut CatalogBuilder,
    events: &EventManager,
) -> LoadReport {
    let mut report = LoadReport::default();
    extensions.sort_by(|a, b| a.manifest().identifier.cmp(&b.manifest().identifier));

    let mut pending: Vec<Arc<dyn Extension>> = Vec::new();
    for extension in extensions {
        let id = extension.manifest().identifier.clone();
        if disabled.contains(&id) {
            tracing::info!("Extension {id} is disabled");
            report.disabled.push(id);
        } else if pending.iter().any(|p| p.manifest().identifier == id) {
            skip(&mut report, ExtensionError::DuplicateIdentifier(id));
        } else {
            pending.push(extension);
        }
    }

    let mut loaded: BTreeSet<String> = BTreeSet::new();
    loop {
        let mut progressed = false;
        let mut waiting = Vec::new();
        for extension in pending {
            let manifest = extension.manifest();
            if manifest.dependencies.iter().all(|d| loaded.contains(d)) {
                progressed = true;
                match load_one(extension.as_ref(), blocks, events) {
                    Ok(()) => {
                        tracing::info!("Loaded extension {}", manifest.info_string());
                        loaded.insert(manifest.identifier.clone());
                        report.loaded.push(extension);
                    }
                    Err(err) => skip(&mut report, err),
                }
            } else {
                waiting.push(extension);
            }
        }
        pending = waiting;
        if !progressed || pending.is_empty() {
            break;
        }
    }

    // Whatever is left waits on something that will never load.
    for extension in pending {
        let manifest = extension.manifest();
        let dependency = manifest
            .dependencies
            .iter()
            .find(|d| !loaded.contains(*d))
            .cloned()
            .unwrap_or_default();
        skip(
            &mut report,
            ExtensionError::DependencyUnmet {
                extension: manifest.identifier.clone(),
                dependency,
            },
        );
    }
    report
}

fn load_one(extension: &dyn Extension, blocks: &mut CatalogBuilder, events: &EventManager) -> Result<(), ExtensionError> {
    let id = &extension.manifest().identifier;
    let mut staged = blocks.clone();
    extension
        .register_blocks(&mut staged)
        .map_err(|source| ExtensionError::Registration {
            extension: id.clone(),
            source,
        })?;
    extension.subscribe(events).map_err(|source| ExtensionError::Subscription {
        extension: id.clone(),
        source,
    })?;
    *blocks = staged;
    Ok(())
}

fn skip(report: &mut LoadReport, err: ExtensionError) {
    tracing::warn!("Skipping extension: {err}");
    report.skipped.push(err);
}
