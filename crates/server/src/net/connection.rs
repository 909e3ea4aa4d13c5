//! Per-client connection handler.
//!
//! Hello -> Welcome -> (JoinLevel | BlockPlace | Chat)*
//!
//! Reads happen on the connection task. Writes go through the session's
//! outbox to a dedicated writer task, so the authority never waits on a
//! socket while it holds a level.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use bricklayer_engine::protocol::Message;
use bricklayer_engine::sync::{PeerTransport, SyncError};
use bricklayer_engine::world::WorldError;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc;
use uuid::Uuid;

use super::ServerContext;
use super::framing::{protocol_error, read_message, write_message};
use crate::session::SessionInfo;

/// Longest accepted username, in characters.
pub const MAX_USERNAME_LEN: usize = 32;

/// Handle a single client from handshake to disconnect.
pub async fn handle(stream: TcpStream, addr: SocketAddr, ctx: Arc<ServerContext>) -> Result<()> {
    let (mut read, mut write) = stream.into_split();

    // ── Handshake ───────────────────────────────────────────────────────
    let username = match read_message(&mut read).await {
        Ok(Some(Message::Hello { username })) => username.trim().to_string(),
        Ok(Some(other)) => {
            return refuse(&mut write, &ctx, format!("Expected Hello, got {}", other.kind())).await;
        }
        Ok(None) => return Ok(()),
        Err(e) => match protocol_error(&e) {
            Some(p) => return refuse(&mut write, &ctx, format!("Malformed message: {p}")).await,
            None => return Err(e),
        },
    };
    if !valid_username(&username) {
        return refuse(&mut write, &ctx, "Invalid username".into()).await;
    }

    let peer = ctx.sessions.allocate_peer();
    let info = SessionInfo {
        peer,
        uuid: offline_uuid(&username),
        username,
        addr,
        level: None,
    };
    let (outbox, rx) = mpsc::unbounded_channel();
    if !ctx.sessions.register(info.clone(), outbox, ctx.config.max_players) {
        return refuse(&mut write, &ctx, "Server is full".into()).await;
    }
    tracing::info!("{} logged in as {} ({})", addr, info.username, peer);
    ctx.sessions.send(peer, ctx.welcome(peer));
    let mut writer = tokio::spawn(write_loop(write, rx));

    // ── Play ────────────────────────────────────────────────────────────
    // Once the writer is gone nothing reaches the client any more, so the
    // read side is dropped with it.
    let (result, written) = tokio::select! {
        result = play(&ctx, &info, &mut read) => (result, None),
        written = &mut writer => (Ok(()), Some(written)),
    };

    // ── Cleanup ─────────────────────────────────────────────────────────
    if let Some(level) = ctx.sessions.level_of(peer) {
        if let Err(e) = ctx.authority.leave(level, peer) {
            tracing::warn!("{} leaving level {}: {}", info.username, level, e);
        }
    }
    // Dropping the last outbox sender lets the writer flush and stop.
    ctx.sessions.deregister(peer);
    let written = match written {
        Some(written) => written,
        None => writer.await,
    };
    match written {
        Ok(Err(e)) => tracing::debug!("Writer for {} stopped: {:#}", peer, e),
        Err(e) => tracing::warn!("Writer for {} panicked: {}", peer, e),
        Ok(Ok(())) => {}
    }
    tracing::info!("{} disconnected", info.username);
    result
}

async fn play(ctx: &ServerContext, info: &SessionInfo, read: &mut OwnedReadHalf) -> Result<()> {
    loop {
        let message = match read_message(read).await {
            Ok(Some(message)) => message,
            Ok(None) => return Ok(()),
            Err(e) => match protocol_error(&e) {
                Some(p) => {
                    kick(ctx, info, format!("Malformed message: {p}"));
                    return Ok(());
                }
                None => return Err(e),
            },
        };

        if let Err(e) = dispatch(ctx, info, message) {
            if is_peer_fault(&e) {
                kick(ctx, info, e.to_string());
                return Ok(());
            }
            // The peer did nothing wrong; an event handler failed.
            tracing::error!("Handling message from {} failed: {}", info.username, e);
        }
    }
}

fn dispatch(ctx: &ServerContext, info: &SessionInfo, message: Message) -> Result<(), SyncError> {
    let peer = info.peer;
    match message {
        Message::JoinLevel { level } => {
            if let Some(current) = ctx.sessions.level_of(peer) {
                ctx.sessions.set_level(peer, None);
                ctx.authority.leave(current, peer)?;
            }
            let joined = ctx.authority.join(level, info.participant());
            // Only an unknown level leaves the roster untouched.
            if !matches!(joined, Err(SyncError::UnknownLevel(_))) {
                ctx.sessions.set_level(peer, Some(level));
            }
            joined?;
        }
        Message::BlockPlace(edit) => {
            let level = ctx.sessions.level_of(peer).ok_or(SyncError::Unexpected("BlockPlace"))?;
            let start = Instant::now();
            let outcome = ctx.authority.apply_edit(level, peer, edit)?;
            ctx.metrics.record_edit(&outcome, start.elapsed());
        }
        Message::Chat { text, .. } => {
            let level = ctx.sessions.level_of(peer).ok_or(SyncError::Unexpected("Chat"))?;
            if ctx.authority.chat(level, peer, &text)? {
                ctx.metrics.chat();
            }
        }
        other => return Err(SyncError::Unexpected(other.kind())),
    }
    Ok(())
}

/// Whether `err` means the peer broke the protocol, as opposed to a
/// server-side handler failing on a well-formed request.
fn is_peer_fault(err: &SyncError) -> bool {
    !matches!(
        err,
        SyncError::Event(_) | SyncError::World(WorldError::Hook(_)) | SyncError::InvalidRewrite { .. }
    )
}

/// Queue a `Disconnect` for a registered session. The writer task stops
/// after sending it.
fn kick(ctx: &ServerContext, info: &SessionInfo, reason: String) {
    tracing::warn!("Disconnecting {}: {}", info.username, reason);
    ctx.metrics.disconnected();
    ctx.sessions.send(info.peer, Message::Disconnect { reason });
}

/// Turn away a client that never became a session.
async fn refuse(write: &mut OwnedWriteHalf, ctx: &ServerContext, reason: String) -> Result<()> {
    tracing::info!("Refusing connection: {}", reason);
    ctx.metrics.disconnected();
    write_message(write, &Message::Disconnect { reason }).await?;
    write.shutdown().await?;
    Ok(())
}

async fn write_loop(mut write: OwnedWriteHalf, mut outbox: mpsc::UnboundedReceiver<Message>) -> Result<()> {
    while let Some(message) = outbox.recv().await {
        write_message(&mut write, &message).await?;
        if matches!(message, Message::Disconnect { .. }) {
            break;
        }
    }
    write.shutdown().await?;
    Ok(())
}

fn valid_username(name: &str) -> bool {
    let len = name.chars().count();
    (1..=MAX_USERNAME_LEN).contains(&len) && !name.chars().any(char::is_control)
}

/// Generate an offline-mode UUID from a player name.
pub fn offline_uuid(name: &str) -> Uuid {
    Uuid::new_v3(&Uuid::NAMESPACE_URL, format!("OfflinePlayer:{}", name).as_bytes())
}
