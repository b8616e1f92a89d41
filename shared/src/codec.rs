//! Framing: 4-byte big-endian length prefix + bincode body.

use crate::protocol::Message;
use bincode::{deserialize, serialize};
use log::trace;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};

pub const LEN_SIZE: usize = 4;
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

#[derive(Debug, Error)]
pub enum FrameError {
    /// Peer closed the stream before a complete frame arrived.
    #[error("end of stream ({buffered} bytes of an unfinished frame discarded)")]
    EndOfStream { buffered: usize },
    #[error("frame need more bytes")]
    NeedMore,
    #[error("frame of {0} bytes exceeds the size limit")]
    TooLarge(usize),
    #[error("malformed frame body: {0}")]
    Malformed(#[from] bincode::Error),
    #[error("read error: {0}")]
    Io(#[from] std::io::Error),
}

/// Encodes one message as a complete frame.
pub fn encode_frame(msg: &Message) -> Result<Vec<u8>, FrameError> {
    let body = serialize(msg)?;
    if body.len() > MAX_FRAME_LEN {
        return Err(FrameError::TooLarge(body.len()));
    }
    let mut out = Vec::with_capacity(LEN_SIZE + body.len());
    out.extend_from_slice(&(body.len() as u32).to_be_bytes());
    out.extend_from_slice(&body);
    Ok(out)
}

/// Decodes one frame from the front of `bytes`, returning the message and the
/// number of bytes consumed.
pub fn decode_frame(bytes: &[u8]) -> Result<(Message, usize), FrameError> {
    if bytes.len() < LEN_SIZE {
        return Err(FrameError::NeedMore);
    }
    let len = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
    if len > MAX_FRAME_LEN {
        return Err(FrameError::TooLarge(len));
    }
    if bytes.len() < LEN_SIZE + len {
        return Err(FrameError::NeedMore);
    }
    let msg = deserialize(&bytes[LEN_SIZE..LEN_SIZE + len])?;
    Ok((msg, LEN_SIZE + len))
}

/// Incremental frame reader over an async byte stream.
///
/// Partial progress lives in the reader, not in the future, so
/// [`FrameReader::read_frame`] can be dropped mid-frame (e.g. by an idle
/// timeout) and called again without losing bytes.
pub struct FrameReader<R> {
    inner: R,
    header: [u8; LEN_SIZE],
    header_filled: usize,
    body: Vec<u8>,
    body_filled: usize,
    body_len: Option<usize>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            header: [0; LEN_SIZE],
            header_filled: 0,
            body: Vec::new(),
            body_filled: 0,
            body_len: None,
        }
    }

    fn buffered(&self) -> usize {
        self.header_filled + self.body_filled
    }

    pub async fn read_frame(&mut self) -> Result<Message, FrameError> {
        while self.header_filled < LEN_SIZE {
            let n = self
                .inner
                .read(&mut self.header[self.header_filled..])
                .await?;
            if n == 0 {
                return Err(FrameError::EndOfStream {
                    buffered: self.buffered(),
                });
            }
            self.header_filled += n;
        }

        let len = match self.body_len {
            Some(len) => len,
            None => {
                let len = u32::from_be_bytes(self.header) as usize;
                if len > MAX_FRAME_LEN {
                    return Err(FrameError::TooLarge(len));
                }
                self.body.resize(len, 0);
                self.body_filled = 0;
                self.body_len = Some(len);
                len
            }
        };

        while self.body_filled < len {
            let n = self.inner.read(&mut self.body[self.body_filled..]).await?;
            if n == 0 {
                return Err(FrameError::EndOfStream {
                    buffered: self.buffered(),
                });
            }
            self.body_filled += n;
        }

        trace!("decoded frame body of {} bytes", len);
        let result = deserialize(&self.body[..len]).map_err(FrameError::from);

        self.header_filled = 0;
        self.body_filled = 0;
        self.body_len = None;
        result
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}
