//! Game-agnostic core of Bricklayer: the authoritative world-mutation pipeline.
//!
//! A tile edit flows through four layers, leaves first:
//!
//! - [`world::block`]: the catalog that numbers block types.
//! - [`event`]: the priority-ordered, cancellable event bus extensions hook into.
//! - [`world`]: tile grids and the [`world::Level`] that owns one, with its
//!   single mutation hook.
//! - [`sync`] and [`protocol`]: the server authority and client mirror that
//!   turn mutations into wire messages and back.

pub mod event;
pub mod extension;
pub mod protocol;
pub mod sync;
pub mod world;
