//! Frame codec.
//!
//! [`encode_frame`] and [`decode_frame`] work on whole buffers; [`FrameCodec`]
//! plugs the same logic into `tokio_util` framed streams.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::{ProtocolError, Result};
use crate::frame::Frame;

/// Size of the length prefix on every frame.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Smallest max-frame-size either side may announce.
pub const MIN_FRAME_SIZE: usize = 256;

/// Max-frame-size announced when none is configured.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16_384;

/// Encode `frame` with its length prefix.
///
/// `max_frame_size` bounds the frame excluding the prefix, as negotiated at
/// HELLO. Oversized frames fail with [`ProtocolError::FrameTooLarge`].
pub fn encode_frame(frame: &Frame, max_frame_size: usize) -> Result<Bytes> {
    let mut buf = BytesMut::with_capacity(64);
    buf.put_u32(0);
    frame.encode_body(&mut buf)?;

    let body_len = buf.len() - LENGTH_PREFIX_SIZE;
    if body_len > max_frame_size {
        return Err(ProtocolError::FrameTooLarge {
            size: body_len,
            max: max_frame_size,
        });
    }
    let prefix = u32::try_from(body_len).map_err(|_| ProtocolError::FrameTooLarge {
        size: body_len,
        max: max_frame_size,
    })?;
    buf[..LENGTH_PREFIX_SIZE].copy_from_slice(&prefix.to_be_bytes());
    Ok(buf.freeze())
}

/// Decode one frame from the front of `buf`.
///
/// Returns the frame and the number of bytes consumed, prefix included.
pub fn decode_frame(buf: &[u8]) -> Result<(Frame, usize)> {
    if buf.len() < LENGTH_PREFIX_SIZE {
        return Err(ProtocolError::malformed("buffer shorter than length prefix"));
    }
    let declared = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
    let total = LENGTH_PREFIX_SIZE + declared;
    if buf.len() < total {
        return Err(ProtocolError::malformed(format!(
            "declared length {} exceeds buffer of {} bytes",
            declared,
            buf.len() - LENGTH_PREFIX_SIZE
        )));
    }
    let frame = Frame::decode_body(Bytes::copy_from_slice(&buf[LENGTH_PREFIX_SIZE..total]))?;
    Ok((frame, total))
}

/// Length-prefixed frame codec for `FramedRead`/`FramedWrite`.
///
/// The limit starts at the agent's own max-frame-size and is tightened to the
/// negotiated value once the handshake completes. Length prefixes above the
/// limit are rejected before the body is buffered.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    max_frame_size: usize,
}

impl FrameCodec {
    pub fn new(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }

    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    pub fn set_max_frame_size(&mut self, max_frame_size: usize) {
        self.max_frame_size = max_frame_size;
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_SIZE)
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        if src.len() < LENGTH_PREFIX_SIZE {
            return Ok(None);
        }

        let declared = u32::from_be_bytes([src[0], src[1], src[2], src[3]]) as usize;
        if declared > self.max_frame_size {
            return Err(ProtocolError::FrameTooLarge {
                size: declared,
                max: self.max_frame_size,
            });
        }

        let total = LENGTH_PREFIX_SIZE + declared;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        src.advance(LENGTH_PREFIX_SIZE);
        let body = src.split_to(declared).freeze();
        Frame::decode_body(body).map(Some)
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<()> {
        let encoded = encode_frame(&frame, self.max_frame_size)?;
        dst.extend_from_slice(&encoded);
        Ok(())
    }
}
