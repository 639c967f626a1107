//! Source RCON framing.
//!
//! ```text
//! size:i32 | id:i32 | type:i32 | body | 0x00 0x00     (little-endian)
//! ```
//! `size` counts every byte after itself, so an empty body gives `size = 10`.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use zerocopy::byteorder::little_endian::I32;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use super::error::RconError;

pub const SERVERDATA_AUTH: i32 = 3;
pub const SERVERDATA_EXECCOMMAND: i32 = 2;
pub const SERVERDATA_AUTH_RESPONSE: i32 = 2;
pub const SERVERDATA_RESPONSE_VALUE: i32 = 0;

/// Largest `size` accepted in either direction.
pub const MAX_FRAME_SIZE: usize = 64 * 1024;
/// id + type + two terminators.
const MIN_FRAME_SIZE: usize = 10;
const HEADER_LEN: usize = 12;

#[derive(FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
struct Header {
    size: I32,
    id: I32,
    kind: I32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub id: i32,
    pub kind: i32,
    pub body: String,
}

impl Frame {
    pub fn new(id: i32, kind: i32, body: impl Into<String>) -> Self {
        Self {
            id,
            kind,
            body: body.into(),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, RconError> {
        let size = self.body.len() + MIN_FRAME_SIZE;
        if size > MAX_FRAME_SIZE {
            return Err(RconError::Protocol(format!(
                "outgoing frame of {size} bytes exceeds {MAX_FRAME_SIZE}"
            )));
        }
        if self.body.as_bytes().contains(&0) {
            return Err(RconError::Protocol("frame body contains NUL".into()));
        }

        let header = Header {
            size: I32::new(size as i32),
            id: I32::new(self.id),
            kind: I32::new(self.kind),
        };
        let mut buf = Vec::with_capacity(4 + size);
        buf.extend_from_slice(header.as_bytes());
        buf.extend_from_slice(self.body.as_bytes());
        buf.extend_from_slice(&[0, 0]);
        Ok(buf)
    }
}

pub async fn write_frame<W>(writer: &mut W, frame: &Frame) -> Result<(), RconError>
where
    W: AsyncWrite + Unpin,
{
    let bytes = frame.encode()?;
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    Ok(())
}

pub async fn read_frame<R>(reader: &mut R) -> Result<Frame, RconError>
where
    R: AsyncRead + Unpin,
{
    let mut head = [0u8; HEADER_LEN];
    reader.read_exact(&mut head).await?;
    let header = Header::read_from_bytes(&head)
        .map_err(|_| RconError::Protocol("short frame header".into()))?;

    let size = header.size.get();
    let size = usize::try_from(size)
        .ok()
        .filter(|size| (MIN_FRAME_SIZE..=MAX_FRAME_SIZE).contains(size))
        .ok_or_else(|| RconError::Protocol(format!("invalid frame size {size}")))?;

    // Body plus both terminators; id and type are already consumed.
    let mut rest = vec![0u8; size - 8];
    reader.read_exact(&mut rest).await?;
    if rest[rest.len() - 2..] != [0, 0] {
        return Err(RconError::Protocol("frame is not NUL-terminated".into()));
    }
    rest.truncate(rest.len() - 2);

    Ok(Frame {
        id: header.id.get(),
        kind: header.kind.get(),
        body: String::from_utf8_lossy(&rest).into_owned(),
    })
}
