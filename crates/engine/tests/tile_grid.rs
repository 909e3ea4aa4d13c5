//! Catalog, grid and level behaviour without any networking.

use std::sync::{Arc, Mutex};

use bricklayer_engine::event::{EventError, Priority};
use bricklayer_engine::world::{
    BlockCatalog, BlockId, CatalogBuilder, CatalogError, Collision, Layer, LayerMask, Level, LevelMeta, Origin,
    PlayerRef, TileGrid, TilePos, WorldError,
};
use uuid::Uuid;

fn catalog() -> Arc<BlockCatalog> {
    let mut builder = CatalogBuilder::new();
    builder.register("Wood", LayerMask::All, Collision::Impassable).unwrap();
    builder.register("Wallpaper", LayerMask::Background, Collision::Passable).unwrap();
    builder.freeze()
}

fn level(width: u16, height: u16) -> Level {
    let creator = PlayerRef {
        uuid: Uuid::nil(),
        username: "builder".into(),
    };
    Level::generate(LevelMeta::new("Test", creator), width, height, catalog()).unwrap()
}

const WOOD: BlockId = BlockId(2);

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

#[test]
fn catalog_ids_follow_registration_order() {
    let catalog = catalog();
    assert_eq!(catalog.id_of("Air"), Some(BlockId::AIR));
    assert_eq!(catalog.id_of("Default"), Some(BlockId::DEFAULT));
    assert_eq!(catalog.id_of("Wood"), Some(WOOD));
    assert_eq!(catalog.resolve(WOOD).unwrap().name(), "Wood");
    assert_eq!(catalog.names(), ["Air", "Default", "Wood", "Wallpaper"]);
}

#[test]
fn two_builds_with_the_same_registrations_agree() {
    assert_eq!(catalog().names(), catalog().names());
    assert!(catalog().matches_names(&catalog().names()));
}

#[test]
fn duplicate_names_are_refused() {
    let mut builder = CatalogBuilder::new();
    let err = builder.register("Air", LayerMask::All, Collision::Passable).unwrap_err();
    assert_eq!(err, CatalogError::DuplicateName("Air".into()));
    assert_eq!(builder.len(), 2);
}

#[test]
fn unknown_ids_do_not_resolve() {
    let catalog = catalog();
    assert!(matches!(catalog.resolve(BlockId(99)), Err(WorldError::UnknownBlockTypeId(BlockId(99)))));
    assert!(matches!(catalog.resolve(BlockId(-1)), Err(WorldError::UnknownBlockTypeId(_))));
}

// ---------------------------------------------------------------------------
// Grid
// ---------------------------------------------------------------------------

#[test]
fn grid_set_reports_only_real_changes() {
    let mut grid = TileGrid::new(4, 4).unwrap();
    let pos = TilePos::foreground(1, 2);
    assert_eq!(grid.set(pos, WOOD).unwrap(), Some(BlockId::AIR));
    assert_eq!(grid.set(pos, WOOD).unwrap(), None);
    assert_eq!(grid.get(pos).unwrap().block, WOOD);
    // The other layer is untouched.
    assert_eq!(grid.get(TilePos::background(1, 2)).unwrap().block, BlockId::AIR);
}

#[test]
fn grid_from_cells_checks_the_volume() {
    let err = TileGrid::from_cells(3, 3, vec![BlockId::AIR; 17]).unwrap_err();
    assert!(matches!(err, WorldError::MalformedLevel { expected: 18, actual: 17 }));
}

#[test]
fn grid_sizes_are_checked_not_clamped() {
    assert!(matches!(TileGrid::new(0, 4), Err(WorldError::InvalidSize { width: 0, height: 4 })));
    assert!(matches!(TileGrid::new(TileGrid::MAX_SIDE + 1, 1), Err(WorldError::InvalidSize { .. })));
    assert!(matches!(TileGrid::new(2100, 2100), Err(WorldError::InvalidSize { .. })));
    assert!(TileGrid::new(2000, 2000).is_ok());
    let err = TileGrid::from_cells(2100, 2100, Vec::new()).unwrap_err();
    assert!(matches!(err, WorldError::InvalidSize { width: 2100, height: 2100 }));
}

#[test]
fn generated_levels_leave_room_for_the_spawn() {
    let creator = PlayerRef {
        uuid: Uuid::nil(),
        username: "builder".into(),
    };
    for (width, height) in [(1, 10), (10, 2), (0, 0)] {
        let err = Level::generate(LevelMeta::new("Tiny", creator.clone()), width, height, catalog()).unwrap_err();
        assert!(matches!(err, WorldError::InvalidSize { .. }), "{width} x {height}");
    }
    let smallest = level(Level::MIN_SIDE, Level::MIN_SIDE);
    let spawn = smallest.spawn();
    let at_spawn = TilePos::foreground(spawn.x as i32, spawn.y as i32);
    assert_eq!(smallest.tile(at_spawn).unwrap().block, BlockId::AIR);
}

#[test]
fn generated_level_is_framed() {
    let level = level(5, 4);
    let grid = level.tiles();
    for x in 0..5 {
        assert_eq!(grid.get(TilePos::foreground(x, 0)).unwrap().block, BlockId::DEFAULT);
        assert_eq!(grid.get(TilePos::foreground(x, 3)).unwrap().block, BlockId::DEFAULT);
    }
    assert_eq!(grid.get(TilePos::foreground(2, 2)).unwrap().block, BlockId::AIR);
    assert_eq!(grid.count(BlockId::DEFAULT), 14);
    assert!(level.is_dirty());
}

// ---------------------------------------------------------------------------
// Level writes and the mutation hook
// ---------------------------------------------------------------------------

#[test]
fn out_of_bounds_writes_fail_without_mutating() {
    let mut level = level(8, 6);
    let calls = Arc::new(Mutex::new(0));
    {
        let calls = Arc::clone(&calls);
        level.set_mutation_hook(move |_, _| {
            *calls.lock().unwrap() += 1;
            Ok(())
        });
    }
    let before = level.tiles().clone();

    for (x, y, layer) in [(8, 0, 1), (0, -1, 1), (0, 0, 2), (-1, 3, 0), (0, 6, 0)] {
        let err = level.set_at(x, y, layer, WOOD).unwrap_err();
        assert!(matches!(err, WorldError::OutOfBounds { .. }), "{x},{y},{layer}: {err}");
    }
    assert!(matches!(level.tile_at(0, 0, -1), Err(WorldError::OutOfBounds { layer: -1, .. })));
    assert_eq!(level.tiles(), &before);
    assert_eq!(*calls.lock().unwrap(), 0);
}

#[test]
fn bounds_are_checked_before_the_block_id() {
    let mut level = level(8, 6);
    let err = level.set(TilePos::foreground(8, 0), BlockId(42)).unwrap_err();
    assert!(matches!(err, WorldError::OutOfBounds { x: 8, y: 0, layer: 1 }), "{err}");
}

#[test]
fn unknown_block_ids_are_refused_before_writing() {
    let mut level = level(8, 6);
    let err = level.set(TilePos::foreground(2, 2), BlockId(42)).unwrap_err();
    assert!(matches!(err, WorldError::UnknownBlockTypeId(BlockId(42))));
    assert_eq!(level.tile(TilePos::foreground(2, 2)).unwrap().block, BlockId::AIR);
}

#[test]
fn hook_sees_the_write_already_applied() {
    let mut level = level(8, 6);
    let observed = Arc::new(Mutex::new(Vec::new()));
    {
        let observed = Arc::clone(&observed);
        level.set_mutation_hook(move |level: &Level, change| {
            let now = level.tile(change.pos).unwrap().block;
            observed.lock().unwrap().push((now, change.old, change.origin));
            Ok(())
        });
    }
    let change = level.set(TilePos::new(3, 5, Layer::Foreground), WOOD).unwrap().unwrap();
    assert_eq!((change.new, change.old), (WOOD, BlockId::DEFAULT));
    assert_eq!(*observed.lock().unwrap(), [(WOOD, BlockId::DEFAULT, Origin::Local)]);
}

#[test]
fn no_op_writes_do_not_reach_the_hook() {
    let mut level = level(8, 6);
    let calls = Arc::new(Mutex::new(0));
    {
        let calls = Arc::clone(&calls);
        level.set_mutation_hook(move |_, _| {
            *calls.lock().unwrap() += 1;
            Ok(())
        });
    }
    let pos = TilePos::background(2, 2);
    assert!(level.set(pos, WOOD).unwrap().is_some());
    assert!(level.set(pos, WOOD).unwrap().is_none());
    assert_eq!(*calls.lock().unwrap(), 1);
}

#[test]
fn a_failing_hook_keeps_the_write() {
    let mut level = level(8, 6);
    level.set_mutation_hook(|_, _| {
        Err(EventError::HandlerFailed {
            event: "BlockPlaced",
            priority: Priority::NORMAL.value(),
            source: "observer failed".into(),
        })
    });
    let pos = TilePos::foreground(2, 2);
    let err = level.set(pos, WOOD).unwrap_err();
    assert!(matches!(err, WorldError::Hook(_)));
    assert_eq!(level.tile(pos).unwrap().block, WOOD);
}

// ---------------------------------------------------------------------------
// Level data
// ---------------------------------------------------------------------------

#[test]
fn palette_is_remapped_onto_the_loading_catalog() {
    let mut source = level(4, 4);
    source.set(TilePos::background(1, 1), BlockId(3)).unwrap(); // Wallpaper
    source.set(TilePos::foreground(2, 2), WOOD).unwrap();
    let data = source.to_data();

    // Same names, different registration order.
    let mut builder = CatalogBuilder::new();
    builder.register("Wallpaper", LayerMask::Background, Collision::Passable).unwrap();
    builder.register("Wood", LayerMask::All, Collision::Impassable).unwrap();
    let reordered = builder.freeze();

    let loaded = Level::from_data(data, Arc::clone(&reordered)).unwrap();
    assert_eq!(loaded.id(), source.id());
    assert_eq!(loaded.tile(TilePos::background(1, 1)).unwrap().block, BlockId(2));
    assert_eq!(loaded.tile(TilePos::foreground(2, 2)).unwrap().block, BlockId(3));
    assert_eq!(loaded.block_type(TilePos::foreground(2, 2)).unwrap().name(), "Wood");
    assert!(!loaded.is_dirty());
}

#[test]
fn loading_with_a_missing_block_name_fails() {
    let data = level(4, 4).to_data();
    let bare = CatalogBuilder::new().freeze();
    let err = Level::from_data(data, bare).unwrap_err();
    assert!(matches!(err, WorldError::UnknownBlockName(name) if name == "Wood"));
}
