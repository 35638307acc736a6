//! Reassembly of fragmented NOTIFY payloads.
//!
//! A fragmented NOTIFY arrives as a NOTIFY frame without FIN followed by
//! UNSET frames sharing its stream-id/frame-id, the last one with FIN set.
//! Partial payloads are buffered here until complete; the buffer is bounded
//! both in total bytes and in the number of partial frames.

use std::collections::HashMap;

use bytes::{Bytes, BytesMut};

use crate::error::{DisconnectStatus, ProtocolError, Result};
use crate::frame::{Frame, FrameType, Payload};

/// Result of feeding one fragment.
#[derive(Debug, PartialEq, Eq)]
pub enum Fragment {
    /// More fragments are expected.
    Incomplete,
    /// The full NOTIFY payload, ready to be parsed into messages.
    Complete(Bytes),
    /// The peer abandoned the frame; nothing to answer.
    Aborted,
}

#[derive(Debug)]
pub struct ReassemblyBuffer {
    pending: HashMap<(u64, u64), BytesMut>,
    buffered_bytes: usize,
    max_bytes: usize,
    max_pending: usize,
}

impl ReassemblyBuffer {
    pub fn new(max_bytes: usize, max_pending: usize) -> Self {
        Self {
            pending: HashMap::new(),
            buffered_bytes: 0,
            max_bytes,
            max_pending,
        }
    }

    /// Feed a NOTIFY-without-FIN or UNSET frame.
    pub fn accept(&mut self, frame: &Frame) -> Result<Fragment> {
        let key = (frame.stream_id, frame.frame_id);
        if frame.flags.is_abort() {
            if let Some(buf) = self.pending.remove(&key) {
                self.buffered_bytes -= buf.len();
            }
            tracing::debug!(
                stream_id = frame.stream_id,
                frame_id = frame.frame_id,
                "Fragmented frame aborted by peer"
            );
            return Ok(Fragment::Aborted);
        }

        let chunk = match &frame.payload {
            Payload::Raw(raw) => raw,
            _ => return Err(ProtocolError::malformed("fragment without raw payload")),
        };

        match frame.frame_type {
            FrameType::Notify => {
                if self.pending.contains_key(&key) {
                    return Err(fragment_error(
                        format!("stream {} frame {} restarted", key.0, key.1),
                        DisconnectStatus::InterlacedFrames,
                    ));
                }
                if self.pending.len() >= self.max_pending {
                    return Err(fragment_error(
                        format!("more than {} partial frames", self.max_pending),
                        DisconnectStatus::ResourceAllocation,
                    ));
                }
                self.reserve(chunk.len())?;
                self.pending.insert(key, BytesMut::from(&chunk[..]));
                Ok(Fragment::Incomplete)
            }
            FrameType::Unset => {
                if !self.pending.contains_key(&key) {
                    return Err(fragment_error(
                        format!("no partial frame for stream {} frame {}", key.0, key.1),
                        DisconnectStatus::FrameIdNotFound,
                    ));
                }
                self.reserve(chunk.len())?;
                let Some(buf) = self.pending.get_mut(&key) else {
                    return Ok(Fragment::Incomplete);
                };
                buf.extend_from_slice(chunk);

                if !frame.flags.is_fin() {
                    return Ok(Fragment::Incomplete);
                }
                match self.pending.remove(&key) {
                    Some(buf) => {
                        self.buffered_bytes -= buf.len();
                        Ok(Fragment::Complete(buf.freeze()))
                    }
                    None => Ok(Fragment::Incomplete),
                }
            }
            other => Err(ProtocolError::UnexpectedFrame {
                frame_type: other.name(),
                state: "reassembling",
            }),
        }
    }

    fn reserve(&mut self, len: usize) -> Result<()> {
        let total = self.buffered_bytes + len;
        if total > self.max_bytes {
            return Err(fragment_error(
                format!("{} buffered bytes exceeds limit {}", total, self.max_bytes),
                DisconnectStatus::ResourceAllocation,
            ));
        }
        self.buffered_bytes = total;
        Ok(())
    }

    /// Number of partially received frames.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn buffered_bytes(&self) -> usize {
        self.buffered_bytes
    }
}

fn fragment_error(reason: String, status: DisconnectStatus) -> ProtocolError {
    ProtocolError::InvalidFragment { reason, status }
}
