//! The stock block set and catalog assembly.
//!
//! Core blocks are registered first, so their ids are fixed no matter which
//! extensions load after them.

use std::sync::Arc;

use bricklayer_engine::event::EventManager;
use bricklayer_engine::extension::{self, Extension, LoadReport};
use bricklayer_engine::world::{BlockCatalog, BlockId, CatalogBuilder, CatalogError, Collision, LayerMask};

pub const AIR: BlockId = BlockId::AIR;
pub const DEFAULT: BlockId = BlockId::DEFAULT;
pub const WOOD: BlockId = BlockId(2);
pub const STONE: BlockId = BlockId(3);
pub const BRICK: BlockId = BlockId(4);
pub const GLASS: BlockId = BlockId(5);
pub const WALLPAPER: BlockId = BlockId(6);

/// `(name, layers, collision)` in registration order, starting at id 2.
const CORE: [(&str, LayerMask, Collision); 5] = [
    ("Wood", LayerMask::All, Collision::Impassable),
    ("Stone", LayerMask::All, Collision::Impassable),
    ("Brick", LayerMask::All, Collision::Impassable),
    ("Glass", LayerMask::Foreground, Collision::Impassable),
    ("Wallpaper", LayerMask::Background, Collision::Passable),
];

pub fn register_core(blocks: &mut CatalogBuilder) -> Result<(), CatalogError> {
    for (name, layer, collision) in CORE {
        blocks.register(name, layer, collision)?;
    }
    Ok(())
}

/// Build the frozen catalog: core blocks, then whatever the extensions
/// contribute. Extension handlers are subscribed to `events` on the way.
pub fn build_catalog(
    extensions: Vec<Arc<dyn Extension>>,
    disabled: &[String],
    events: &EventManager,
) -> Result<(Arc<BlockCatalog>, LoadReport), CatalogError> {
    let mut builder = CatalogBuilder::new();
    register_core(&mut builder)?;
    let report = extension::load(extensions, disabled, &mut builder, events);
    let catalog = builder.freeze();
    tracing::info!(
        "Block catalog ready: {} types, {} extensions loaded",
        catalog.len(),
        report.loaded.len()
    );
    Ok((catalog, report))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_ids_are_fixed() {
        let events = EventManager::new();
        let (catalog, report) = build_catalog(Vec::new(), &[], &events).unwrap();
        assert!(report.loaded.is_empty());
        assert_eq!(catalog.id_of("Wood"), Some(WOOD));
        assert_eq!(catalog.id_of("Wallpaper"), Some(WALLPAPER));
        assert_eq!(catalog.resolve(GLASS).unwrap().layer(), LayerMask::Foreground);
        assert!(!catalog.resolve(WALLPAPER).unwrap().is_solid());
    }
}
