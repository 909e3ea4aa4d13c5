//! Extensions shipped with the server. Any of them can be switched off
//! through `disabled_extensions` in the config.

use std::sync::Arc;

use bricklayer_engine::event::{BlockPlacedArgs, BlockPlacingArgs, ChatArgs, EventArgs, EventError, EventManager, Priority, handler};
use bricklayer_engine::extension::{Extension, ExtensionManifest};
use bricklayer_engine::world::Layer;

pub const EDIT_LOG: &str = "bricklayer.editlog";
pub const BORDER_GUARD: &str = "bricklayer.borderguard";
pub const CHAT_TIDY: &str = "bricklayer.chattidy";

/// Longest chat line relayed, in characters.
pub const MAX_CHAT_LEN: usize = 256;

pub fn builtin() -> Vec<Arc<dyn Extension>> {
    vec![Arc::new(EditLog::new()), Arc::new(BorderGuard::new()), Arc::new(ChatTidy::new())]
}

fn manifest(name: &str, identifier: &str, description: &str) -> ExtensionManifest {
    let mut manifest = ExtensionManifest::new(name, identifier, env!("CARGO_PKG_VERSION"));
    manifest.description = description.into();
    manifest.authors = vec!["Bricklayer".into()];
    manifest
}

// ── Edit log ────────────────────────────────────────────────────────────

/// Traces every tile change once all other observers have seen it.
pub struct EditLog(ExtensionManifest);

impl EditLog {
    pub fn new() -> Self {
        Self(manifest("Edit Log", EDIT_LOG, "Traces every tile change."))
    }
}

impl Default for EditLog {
    fn default() -> Self {
        Self::new()
    }
}

impl Extension for EditLog {
    fn manifest(&self) -> &ExtensionManifest {
        &self.0
    }

    fn subscribe(&self, events: &EventManager) -> Result<(), EventError> {
        events.block_placed.add_handler(
            handler(|args: &mut BlockPlacedArgs| {
                tracing::debug!(
                    "[{}] ({}, {}, {:?}) {} -> {} by {:?}",
                    args.level,
                    args.x,
                    args.y,
                    args.layer,
                    args.old,
                    args.new,
                    args.origin
                );
                Ok(())
            }),
            Priority::FINAL,
            true,
        )
    }
}

// ── Border guard ────────────────────────────────────────────────────────

/// Keeps players from breaking the foreground frame around every level.
pub struct BorderGuard(ExtensionManifest);

impl BorderGuard {
    pub fn new() -> Self {
        Self(manifest(
            "Border Guard",
            BORDER_GUARD,
            "Rejects player edits to the outermost foreground ring.",
        ))
    }
}

impl Default for BorderGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Extension for BorderGuard {
    fn manifest(&self) -> &ExtensionManifest {
        &self.0
    }

    fn subscribe(&self, events: &EventManager) -> Result<(), EventError> {
        events.block_placing.add_handler(
            handler(|args: &mut BlockPlacingArgs| {
                if args.pos.layer == Layer::Foreground && args.on_border() {
                    args.cancel();
                }
                Ok(())
            }),
            Priority::INITIAL,
            false,
        )
    }
}

// ── Chat tidy ───────────────────────────────────────────────────────────

/// Trims chat lines, caps their length and drops empty ones.
pub struct ChatTidy(ExtensionManifest);

impl ChatTidy {
    pub fn new() -> Self {
        Self(manifest("Chat Tidy", CHAT_TIDY, "Trims, caps and drops empty chat lines."))
    }
}

impl Default for ChatTidy {
    fn default() -> Self {
        Self::new()
    }
}

impl Extension for ChatTidy {
    fn manifest(&self) -> &ExtensionManifest {
        &self.0
    }

    fn subscribe(&self, events: &EventManager) -> Result<(), EventError> {
        events.chat_received.add_handler(
            handler(|args: &mut ChatArgs| {
                let tidy: String = args.message.trim().chars().take(MAX_CHAT_LEN).collect();
                if tidy.is_empty() {
                    args.cancel();
                } else {
                    args.message = tidy;
                }
                Ok(())
            }),
            Priority::LOW,
            false,
        )
    }
}
