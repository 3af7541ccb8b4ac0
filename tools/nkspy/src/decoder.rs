use nanok_trace::hdlc::{ESC, ESC_XOR, FLAG};
use thiserror::Error;

/// Sequence, kind, four timestamp bytes and the checksum.
const MIN_FRAME: usize = 7;

/// One verified trace frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceFrame {
    /// Sequence counter maintained by the target, also advanced for frames
    /// it had to drop.
    pub seq: u8,
    /// Raw record kind.
    pub kind: u8,
    /// Target cycle counter when the record was written.
    pub timestamp: u32,
    pub payload: Vec<u8>,
}

/// Errors produced while decoding HDLC frames.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("frame too short (len={0})")]
    FrameTooShort(usize),
    #[error("checksum mismatch: expected {expected:#04x}, found {found:#04x}")]
    InvalidChecksum { expected: u8, found: u8 },
}

/// Incremental HDLC decoder that accepts arbitrary byte chunks and yields
/// verified frames.
#[derive(Debug, Default)]
pub struct HdlcDecoder {
    buffer: Vec<u8>,
    escape_next: bool,
}

impl HdlcDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears any partial frame state.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.escape_next = false;
    }

    /// Feeds raw bytes into the decoder and returns the frames completed by
    /// them. A bad frame is reported at once; frames completed before it in
    /// the same chunk are lost with it, the decoder itself stays usable.
    pub fn push_bytes(&mut self, input: &[u8]) -> Result<Vec<TraceFrame>, DecodeError> {
        let mut frames = Vec::new();

        for &byte in input {
            if byte == FLAG {
                self.escape_next = false;
                if !self.buffer.is_empty() {
                    let frame_bytes = std::mem::take(&mut self.buffer);
                    frames.push(Self::decode_frame(&frame_bytes)?);
                }
                continue;
            }

            if self.escape_next {
                self.buffer.push(byte ^ ESC_XOR);
                self.escape_next = false;
            } else if byte == ESC {
                self.escape_next = true;
            } else {
                self.buffer.push(byte);
            }
        }

        Ok(frames)
    }

    fn decode_frame(data: &[u8]) -> Result<TraceFrame, DecodeError> {
        if data.len() < MIN_FRAME {
            return Err(DecodeError::FrameTooShort(data.len()));
        }

        let (body, checksum) = data.split_at(data.len() - 1);
        let expected = !body.iter().fold(0u8, |sum, byte| sum.wrapping_add(*byte));
        if checksum[0] != expected {
            return Err(DecodeError::InvalidChecksum {
                expected,
                found: checksum[0],
            });
        }

        Ok(TraceFrame {
            seq: body[0],
            kind: body[1],
            timestamp: u32::from_le_bytes([body[2], body[3], body[4], body[5]]),
            payload: body[6..].to_vec(),
        })
    }
}
