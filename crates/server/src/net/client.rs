//! The client end of a Bricklayer connection.
//!
//! [`RemoteClient`] does the handshake and hands out a [`ClientMirror`] per
//! joined level. Outbound traffic, including edits the mirror forwards, goes
//! through a channel to a writer task just like on the server side.

use std::sync::Arc;

use anyhow::{Result, bail};
use bricklayer_engine::event::EventManager;
use bricklayer_engine::protocol::{LevelSummary, Message};
use bricklayer_engine::sync::{ClientMirror, Upstream, check_compatible};
use bricklayer_engine::world::{BlockCatalog, PeerId};
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::framing::{read_message, write_message};

/// [`Upstream`] backed by the connection's outbound channel.
pub struct ChannelUpstream(mpsc::UnboundedSender<Message>);

impl Upstream for ChannelUpstream {
    fn send(&self, message: Message) {
        let kind = message.kind();
        if self.0.send(message).is_err() {
            tracing::debug!("Connection closed, dropping {}", kind);
        }
    }
}

pub struct RemoteClient {
    peer: PeerId,
    server_name: String,
    intro: String,
    block_names: Vec<String>,
    levels: Vec<LevelSummary>,
    read: OwnedReadHalf,
    upstream: Arc<ChannelUpstream>,
    writer: JoinHandle<Result<()>>,
}

impl RemoteClient {
    /// Connect and complete the handshake.
    pub async fn connect(addr: impl ToSocketAddrs, username: &str) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        let (mut read, write) = stream.into_split();
        let (tx, rx) = mpsc::unbounded_channel();
        let upstream = Arc::new(ChannelUpstream(tx));
        let writer = tokio::spawn(write_loop(write, rx));

        upstream.send(Message::Hello {
            username: username.to_string(),
        });
        match read_message(&mut read).await? {
            Some(Message::Welcome {
                peer,
                server_name,
                intro,
                block_names,
                levels,
            }) => {
                tracing::info!("Connected to {} as {}", server_name, peer);
                Ok(Self {
                    peer,
                    server_name,
                    intro,
                    block_names,
                    levels,
                    read,
                    upstream,
                    writer,
                })
            }
            Some(Message::Disconnect { reason }) => bail!("refused: {reason}"),
            Some(other) => bail!("expected Welcome, got {}", other.kind()),
            None => bail!("server closed the connection during the handshake"),
        }
    }

    pub fn peer(&self) -> PeerId {
        self.peer
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    pub fn intro(&self) -> &str {
        &self.intro
    }

    pub fn block_names(&self) -> &[String] {
        &self.block_names
    }

    /// Levels as listed in the handshake.
    pub fn levels(&self) -> &[LevelSummary] {
        &self.levels
    }

    pub fn upstream(&self) -> Arc<dyn Upstream> {
        self.upstream.clone()
    }

    pub fn send(&self, message: Message) {
        self.upstream.send(message);
    }

    /// Next message from the server; `None` once it hangs up.
    pub async fn recv(&mut self) -> Result<Option<Message>> {
        read_message(&mut self.read).await
    }

    /// Join `level` and build a mirror of it. Fails before sending anything
    /// if the server's block catalog differs from `catalog`.
    pub async fn join(
        &mut self,
        level: Uuid,
        catalog: Arc<BlockCatalog>,
        events: Arc<EventManager>,
    ) -> Result<ClientMirror> {
        check_compatible(&catalog, &self.block_names)?;
        self.send(Message::JoinLevel { level });
        loop {
            match self.recv().await? {
                Some(Message::LevelSnapshot(snapshot)) => {
                    return Ok(ClientMirror::new(self.peer, *snapshot, catalog, events, self.upstream())?);
                }
                Some(Message::Disconnect { reason }) => bail!("disconnected: {reason}"),
                // Traffic for the level being left can still be in flight.
                Some(other) => tracing::debug!("Ignoring {} while joining", other.kind()),
                None => bail!("server closed the connection"),
            }
        }
    }

    /// Drop the connection without waiting for queued messages.
    pub fn close(self) {
        self.writer.abort();
    }
}

async fn write_loop(mut write: OwnedWriteHalf, mut outbox: mpsc::UnboundedReceiver<Message>) -> Result<()> {
    while let Some(message) = outbox.recv().await {
        write_message(&mut write, &message).await?;
    }
    write.shutdown().await?;
    Ok(())
}
