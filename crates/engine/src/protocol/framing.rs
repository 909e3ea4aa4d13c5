// Length-delimited framing: a 4-byte big-endian length prefix, then the
// message body. The async read/write loops live with the transport; this
// module only owns the format and its size limit.

use super::{Message, ProtocolError};

/// Largest accepted body. Level snapshots are the biggest messages;
/// [`TileGrid::MAX_AREA`](crate::world::TileGrid::MAX_AREA) keeps them under it.
pub const MAX_FRAME_SIZE: u32 = 16 * 1024 * 1024;

/// Bytes in the length prefix.
pub const HEADER_LEN: usize = 4;

/// Encode `message` and prepend its length.
pub fn encode_frame(message: &Message) -> Result<Vec<u8>, ProtocolError> {
    let body = message.encode()?;
    let len = u32::try_from(body.len())
        .ok()
        .filter(|len| *len <= MAX_FRAME_SIZE)
        .ok_or(ProtocolError::FrameTooLarge(body.len()))?;
    let mut frame = Vec::with_capacity(HEADER_LEN + body.len());
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Validate a received length prefix.
pub fn frame_len(header: [u8; HEADER_LEN]) -> Result<usize, ProtocolError> {
    let len = u32::from_be_bytes(header);
    if len > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(len as usize));
    }
    Ok(len as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_matches_body() {
        let frame = encode_frame(&Message::Hello { username: "ada".into() }).unwrap();
        let len = frame_len(frame[..4].try_into().unwrap()).unwrap();
        assert_eq!(len, frame.len() - HEADER_LEN);
        assert_eq!(Message::decode(&frame[HEADER_LEN..]).unwrap(), Message::Hello { username: "ada".into() });
    }

    #[test]
    fn largest_level_snapshot_fits_a_frame() {
        use super::super::Snapshot;
        use crate::world::{LevelData, LevelMeta, Participant, PeerId, PlayerRef, Spawn, TileGrid};
        use uuid::Uuid;

        let side = 2000;
        assert_eq!(side as usize * side as usize, TileGrid::MAX_AREA);
        let creator = PlayerRef {
            uuid: Uuid::nil(),
            username: "x".repeat(32),
        };
        let snapshot = Snapshot {
            level: LevelData {
                id: Uuid::nil(),
                meta: LevelMeta::new("x".repeat(64), creator),
                spawn: Spawn::new(1, 1),
                width: side,
                height: side,
                palette: (0..256).map(|i| format!("Block number {i}")).collect(),
                cells: vec![0; TileGrid::volume(side, side)],
            },
            roster: (0..64)
                .map(|i| Participant {
                    peer: PeerId(i),
                    uuid: Uuid::nil(),
                    username: "x".repeat(32),
                })
                .collect(),
        };
        assert!(encode_frame(&Message::LevelSnapshot(Box::new(snapshot))).is_ok());
    }

    #[test]
    fn rejects_oversized_prefix() {
        let header = (MAX_FRAME_SIZE + 1).to_be_bytes();
        assert!(matches!(frame_len(header), Err(ProtocolError::FrameTooLarge(_))));
    }
}
