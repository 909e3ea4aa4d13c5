//! Full server over real TCP: handshake, broadcast scoping, corrections
//! and the disconnect policy.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bricklayer_engine::event::EventManager;
use bricklayer_engine::extension::Extension;
use bricklayer_engine::protocol::{BlockEdit, Message};
use bricklayer_engine::sync::{ClientMirror, SyncError};
use bricklayer_engine::world::{
    BlockCatalog, BlockId, CatalogBuilder, Collision, LayerMask, Level, LevelMeta, PeerId, PlayerRef, TilePos,
};
use bricklayer_server::block::{self, WOOD};
use bricklayer_server::config::ServerConfig;
use bricklayer_server::extensions;
use bricklayer_server::net::client::RemoteClient;
use bricklayer_server::net::framing::{read_message, write_message};
use bricklayer_server::net::{ServerContext, listener};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use uuid::Uuid;

const WAIT: Duration = Duration::from_secs(5);

struct Server {
    ctx: Arc<ServerContext>,
    addr: SocketAddr,
    catalog: Arc<BlockCatalog>,
    a: Uuid,
    b: Uuid,
}

impl Server {
    async fn start(extensions: Vec<Arc<dyn Extension>>, config: ServerConfig) -> Self {
        let events = Arc::new(EventManager::new());
        let (catalog, _) = block::build_catalog(extensions, &[], &events).unwrap();
        let ctx = Arc::new(ServerContext::new(config, Arc::clone(&catalog), events));
        let a = ctx.authority.open(level("A", &catalog));
        let b = ctx.authority.open(level("B", &catalog));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(listener::serve(Arc::clone(&ctx), listener));
        Self { ctx, addr, catalog, a, b }
    }

    async fn plain() -> Self {
        Self::start(Vec::new(), ServerConfig::default()).await
    }

    async fn connect(&self, name: &str) -> RemoteClient {
        RemoteClient::connect(self.addr, name).await.unwrap()
    }

    async fn join(&self, client: &mut RemoteClient, level: Uuid) -> ClientMirror {
        client
            .join(level, Arc::clone(&self.catalog), Arc::new(EventManager::new()))
            .await
            .unwrap()
    }

    fn tile(&self, level: Uuid, pos: TilePos) -> BlockId {
        let handle = self.ctx.authority.level(level).unwrap();
        let level = handle.lock().unwrap();
        level.tile(pos).unwrap().block
    }
}

fn level(name: &str, catalog: &Arc<BlockCatalog>) -> Level {
    let creator = PlayerRef {
        uuid: Uuid::nil(),
        username: "server".into(),
    };
    Level::generate(LevelMeta::new(name, creator), 16, 12, Arc::clone(catalog)).unwrap()
}

async fn next(client: &mut RemoteClient) -> Message {
    tokio::time::timeout(WAIT, client.recv())
        .await
        .expect("timed out waiting for a message")
        .unwrap()
        .expect("server closed the connection")
}

/// Chat is echoed to its sender, so once a client reads its own line back
/// everything the server did for its earlier messages has been read too.
/// Other players' chat lines are left out of the result.
async fn drain_until_own_chat(client: &mut RemoteClient, marker: &str) -> Vec<Message> {
    client.send(Message::Chat {
        peer: client.peer(),
        text: marker.into(),
    });
    let mut seen = Vec::new();
    loop {
        match next(client).await {
            Message::Chat { peer, text } if peer == client.peer() && text == marker => return seen,
            Message::Chat { .. } => {}
            other => seen.push(other),
        }
    }
}

// ---------------------------------------------------------------------------
// Handshake
// ---------------------------------------------------------------------------

#[tokio::test]
async fn welcome_carries_name_intro_catalog_and_levels() {
    let config = ServerConfig {
        name: "Brickworks".into(),
        intro: "$Name: $Online online in $Rooms rooms".into(),
        ..ServerConfig::default()
    };
    let server = Server::start(Vec::new(), config).await;
    let client = server.connect("ada").await;

    assert_eq!(client.server_name(), "Brickworks");
    assert_eq!(client.intro(), "Brickworks: 1 online in 2 rooms");
    assert_eq!(client.block_names(), server.catalog.names());
    let names: Vec<&str> = client.levels().iter().map(|l| l.name.as_str()).collect();
    assert_eq!(names, ["A", "B"]);
}

#[tokio::test]
async fn mismatched_catalog_refuses_to_join() {
    let server = Server::plain().await;
    let mut client = server.connect("ada").await;

    let mut other = CatalogBuilder::new();
    other.register("Marble", LayerMask::All, Collision::Impassable).unwrap();
    let err = client
        .join(server.a, other.freeze(), Arc::new(EventManager::new()))
        .await
        .unwrap_err();
    assert!(matches!(err.downcast_ref::<SyncError>(), Some(SyncError::Incompatible)));
}

#[tokio::test]
async fn full_server_turns_players_away() {
    let config = ServerConfig {
        max_players: 1,
        ..ServerConfig::default()
    };
    let server = Server::start(Vec::new(), config).await;
    let _first = server.connect("ada").await;

    let err = RemoteClient::connect(server.addr, "bob").await.err().unwrap();
    assert!(err.to_string().contains("Server is full"), "{err}");
}

// ---------------------------------------------------------------------------
// Edits
// ---------------------------------------------------------------------------

#[tokio::test]
async fn edit_reaches_the_level_but_not_its_author_or_other_levels() {
    let server = Server::plain().await;
    let mut p1 = server.connect("p1").await;
    let mut p2 = server.connect("p2").await;
    let mut p3 = server.connect("p3").await;
    let mut m1 = server.join(&mut p1, server.a).await;
    let _m2 = server.join(&mut p2, server.a).await;
    let _m3 = server.join(&mut p3, server.b).await;

    let pos = TilePos::foreground(3, 5);
    assert!(m1.place(pos, WOOD).unwrap().is_some());

    // P2 receives exactly the payload P1 sent.
    assert_eq!(
        next(&mut p2).await,
        Message::BlockPlace(BlockEdit {
            x: 3,
            y: 5,
            layer: 1,
            block: WOOD,
        })
    );
    assert_eq!(server.tile(server.a, pos), WOOD);

    // P1 only learned that P2 arrived; its edit never came back.
    let p1_saw = drain_until_own_chat(&mut p1, "p1 done").await;
    assert!(matches!(&p1_saw[..], [Message::PlayerJoined { username, .. }] if username == "p2"));
    // P3 is in another level and saw nothing at all.
    assert!(drain_until_own_chat(&mut p3, "p3 done").await.is_empty());
}

#[tokio::test]
async fn repeating_an_edit_broadcasts_nothing() {
    let server = Server::plain().await;
    let mut p1 = server.connect("p1").await;
    let mut p2 = server.connect("p2").await;
    let _m1 = server.join(&mut p1, server.a).await;
    let _m2 = server.join(&mut p2, server.a).await;

    let edit = BlockEdit::new(TilePos::background(4, 4), WOOD);
    p1.send(Message::BlockPlace(edit));
    p1.send(Message::BlockPlace(edit));

    // Once P1's marker is back, both edits have been handled.
    drain_until_own_chat(&mut p1, "p1 done").await;
    let snap = server.ctx.metrics.snapshot(0);
    assert_eq!((snap.edits_applied, snap.edits_unchanged), (1, 1));

    let p2_saw = drain_until_own_chat(&mut p2, "p2 done").await;
    assert_eq!(p2_saw, [Message::BlockPlace(edit)]);
}

#[tokio::test]
async fn cancelled_edit_is_corrected_on_the_author_only() {
    let server = Server::start(extensions::builtin(), ServerConfig::default()).await;
    let mut p1 = server.connect("p1").await;
    let mut p2 = server.connect("p2").await;
    let mut m1 = server.join(&mut p1, server.a).await;
    let _m2 = server.join(&mut p2, server.a).await;
    let _ = next(&mut p1).await; // PlayerJoined for p2

    // The frame is guarded; P1's optimistic copy changes anyway.
    let frame = TilePos::foreground(0, 5);
    m1.place(frame, WOOD).unwrap();
    assert_eq!(m1.level().tile(frame).unwrap().block, WOOD);

    let correction = next(&mut p1).await;
    assert_eq!(correction, Message::BlockPlace(BlockEdit::new(frame, BlockId::DEFAULT)));
    m1.receive(correction).unwrap();
    assert_eq!(m1.level().tile(frame).unwrap().block, BlockId::DEFAULT);
    assert_eq!(server.tile(server.a, frame), BlockId::DEFAULT);

    assert!(drain_until_own_chat(&mut p2, "p2 done").await.is_empty());
    assert!(drain_until_own_chat(&mut p1, "p1 done").await.is_empty());
    assert_eq!(server.ctx.metrics.snapshot(0).edits_rejected, 1);
}

#[tokio::test]
async fn mirrors_converge_after_both_sides_edit() {
    let server = Server::plain().await;
    let mut p1 = server.connect("p1").await;
    let mut p2 = server.connect("p2").await;
    let mut m1 = server.join(&mut p1, server.a).await;
    let mut m2 = server.join(&mut p2, server.a).await;
    m1.receive(next(&mut p1).await).unwrap(); // PlayerJoined for p2
    assert_eq!(m1.level().roster().len(), 2);

    m1.place(TilePos::foreground(2, 2), WOOD).unwrap();
    m2.place(TilePos::background(5, 5), block::WALLPAPER).unwrap();

    // P1, then P2, then P1 again: by the last round both edits are known
    // to have been handled, whichever reached the server first.
    for marker in ["p1 first", "p2", "p1 second"] {
        let (client, mirror) = if marker == "p2" { (&mut p2, &mut m2) } else { (&mut p1, &mut m1) };
        for message in drain_until_own_chat(client, marker).await {
            mirror.receive(message).unwrap();
        }
    }
    let handle = server.ctx.authority.level(server.a).unwrap();
    let authoritative = handle.lock().unwrap().tiles().clone();
    assert_eq!(m1.level().tiles(), &authoritative);
    assert_eq!(m2.level().tiles(), &authoritative);
}

// ---------------------------------------------------------------------------
// Roster and disconnects
// ---------------------------------------------------------------------------

#[tokio::test]
async fn leaving_players_are_announced() {
    let server = Server::plain().await;
    let mut p1 = server.connect("p1").await;
    let mut p2 = server.connect("p2").await;
    let _m1 = server.join(&mut p1, server.a).await;
    let _m2 = server.join(&mut p2, server.a).await;
    let p2_peer = p2.peer();
    let _ = next(&mut p1).await; // PlayerJoined

    p2.close();
    assert_eq!(next(&mut p1).await, Message::PlayerLeft { peer: p2_peer });
}

#[tokio::test]
async fn edits_before_joining_disconnect() {
    let server = Server::plain().await;
    let mut p1 = server.connect("p1").await;
    p1.send(Message::BlockPlace(BlockEdit::new(TilePos::foreground(1, 1), WOOD)));

    assert!(matches!(next(&mut p1).await, Message::Disconnect { .. }));
    assert_eq!(tokio::time::timeout(WAIT, p1.recv()).await.unwrap().unwrap(), None);
}

#[tokio::test]
async fn out_of_bounds_edits_disconnect() {
    let server = Server::plain().await;
    let mut p1 = server.connect("p1").await;
    let _m1 = server.join(&mut p1, server.a).await;
    p1.send(Message::BlockPlace(BlockEdit {
        x: 3,
        y: 5,
        layer: 2,
        block: WOOD,
    }));

    match next(&mut p1).await {
        Message::Disconnect { reason } => assert!(reason.contains("outside the level"), "{reason}"),
        other => panic!("expected Disconnect, got {other:?}"),
    }
}

#[tokio::test]
async fn malformed_frames_disconnect() {
    let server = Server::plain().await;
    let stream = TcpStream::connect(server.addr).await.unwrap();
    let (mut read, mut write) = stream.into_split();

    write_message(&mut write, &Message::Hello { username: "raw".into() }).await.unwrap();
    assert!(matches!(read_message(&mut read).await.unwrap(), Some(Message::Welcome { .. })));

    write.write_all(&[0, 0, 0, 4, 0, 0, 0, 0x7f]).await.unwrap();
    assert!(matches!(read_message(&mut read).await.unwrap(), Some(Message::Disconnect { .. })));
    assert_eq!(server.ctx.metrics.snapshot(0).disconnects, 1);
}

#[tokio::test]
async fn unsendable_snapshot_ends_the_session() {
    // A largest-area level plus a palette this long no longer fits a frame.
    let mut builder = CatalogBuilder::new();
    builder.register("x".repeat(1_000_000), LayerMask::All, Collision::Impassable).unwrap();
    let catalog = builder.freeze();
    let ctx = Arc::new(ServerContext::new(ServerConfig::default(), Arc::clone(&catalog), Arc::new(EventManager::new())));
    let creator = PlayerRef {
        uuid: Uuid::nil(),
        username: "server".into(),
    };
    let huge = Level::generate(LevelMeta::new("Huge", creator), 2000, 2000, Arc::clone(&catalog)).unwrap();
    let huge = ctx.authority.open(huge);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(listener::serve(Arc::clone(&ctx), listener));

    let stream = TcpStream::connect(addr).await.unwrap();
    let (mut read, mut write) = stream.into_split();
    write_message(&mut write, &Message::Hello { username: "ada".into() }).await.unwrap();
    assert!(matches!(read_message(&mut read).await.unwrap(), Some(Message::Welcome { .. })));

    write_message(&mut write, &Message::JoinLevel { level: huge }).await.unwrap();
    let after = tokio::time::timeout(WAIT, read_message(&mut read)).await.unwrap();
    assert!(matches!(after, Ok(None) | Err(_)), "{after:?}");

    tokio::time::timeout(WAIT, async {
        while !ctx.sessions.is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("session was never cleaned up");
}

#[tokio::test]
async fn chat_is_relayed_with_the_senders_peer() {
    let server = Server::start(extensions::builtin(), ServerConfig::default()).await;
    let mut p1 = server.connect("p1").await;
    let mut p2 = server.connect("p2").await;
    let _m1 = server.join(&mut p1, server.a).await;
    let _m2 = server.join(&mut p2, server.a).await;

    // The peer a client claims is ignored.
    p1.send(Message::Chat {
        peer: PeerId(999),
        text: "  hi all  ".into(),
    });
    assert_eq!(
        next(&mut p2).await,
        Message::Chat {
            peer: p1.peer(),
            text: "hi all".into(),
        }
    );
}
