//! Async reads and writes of length-prefixed [`Message`] frames.
//!
//! Decoding failures come back as [`ProtocolError`] inside the
//! `anyhow::Error`, so callers can tell a misbehaving peer from a broken
//! socket with `downcast_ref`.

use anyhow::Result;
use bricklayer_engine::protocol::framing::{self, HEADER_LEN};
use bricklayer_engine::protocol::{Message, ProtocolError};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Read the next message. `None` means the peer closed the stream.
pub async fn read_message<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Option<Message>> {
    let mut header = [0u8; HEADER_LEN];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let len = framing::frame_len(header)?;
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Ok(Some(Message::decode(&body)?))
}

pub async fn write_message<W: AsyncWrite + Unpin>(writer: &mut W, message: &Message) -> Result<()> {
    let frame = framing::encode_frame(message)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

/// The protocol error behind `err`, if that is what it is.
pub fn protocol_error(err: &anyhow::Error) -> Option<&ProtocolError> {
    err.downcast_ref::<ProtocolError>()
}
