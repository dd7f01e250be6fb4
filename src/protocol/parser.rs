//! Streaming frame decoder.
//!
//! [`FrameParser`] consumes inbound transport chunks of arbitrary size and
//! emits completed frames in arrival order. Two independent forms of
//! fragmentation are handled here: a single frame split across several
//! chunks (header prefixes are buffered, payloads unmasked incrementally),
//! and a message split across several frames (which is the
//! [`assembler`](crate::protocol::assembler)'s concern — this module never
//! looks past one frame).

use crate::config::{Config, Limits};
use crate::connection::Role;
use crate::error::{Error, Result};
use crate::protocol::frame::{Frame, OpCode, MAX_CONTROL_PAYLOAD};
use crate::protocol::mask::apply_mask_offset;

/// Longest possible frame header: 2 fixed bytes + 8 length bytes + 4 key
/// bytes.
const MAX_HEADER: usize = 14;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Collecting header bytes into the pending buffer.
    Header,
    /// Consuming payload bytes of the current frame.
    Payload,
}

/// Chunk-fed WebSocket frame decoder.
///
/// Feed each inbound chunk as it arrives; completed frames are appended to
/// the caller's vector. All framing violations surface as errors carrying a
/// precise close code via [`Error::close_code`].
#[derive(Debug)]
pub struct FrameParser {
    role: Role,
    limits: Limits,
    allow_zero_mask_key: bool,

    phase: Phase,
    header: Vec<u8>,

    // Per-frame state, valid in the payload phase.
    fin: bool,
    opcode: OpCode,
    mask: Option<[u8; 4]>,
    mask_offset: usize,
    remaining: usize,
    payload: Vec<u8>,
}

impl FrameParser {
    /// Create a parser for the given role.
    #[must_use]
    pub fn new(role: Role, config: &Config) -> Self {
        Self {
            role,
            limits: config.limits.clone(),
            allow_zero_mask_key: config.allow_zero_mask_key,
            phase: Phase::Header,
            header: Vec::with_capacity(MAX_HEADER),
            fin: false,
            opcode: OpCode::Continuation,
            mask: None,
            mask_offset: 0,
            remaining: 0,
            payload: Vec::new(),
        }
    }

    /// Whether the parser sits exactly on a frame boundary.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.phase == Phase::Header && self.header.is_empty()
    }

    /// Consume one inbound chunk, appending completed frames to `out`.
    ///
    /// After an error the parser must not be fed again; the connection is
    /// expected to close.
    ///
    /// # Errors
    ///
    /// Any frame-engine kind; see [`Error::close_code`] for the close code
    /// each maps to.
    pub fn feed(&mut self, mut chunk: &[u8], out: &mut Vec<Frame>) -> Result<()> {
        loop {
            match self.phase {
                Phase::Header => {
                    // The required header length grows as the length code and
                    // mask bit come into view.
                    loop {
                        let needed = self.header_len_needed();
                        if self.header.len() >= needed {
                            break;
                        }
                        if chunk.is_empty() {
                            return Ok(());
                        }
                        let take = (needed - self.header.len()).min(chunk.len());
                        self.header.extend_from_slice(&chunk[..take]);
                        chunk = &chunk[take..];
                    }
                    self.begin_payload()?;
                    if self.remaining == 0 {
                        self.finish_frame(out);
                    }
                }
                Phase::Payload => {
                    if chunk.is_empty() {
                        return Ok(());
                    }
                    let take = self.remaining.min(chunk.len());
                    let start = self.payload.len();
                    self.payload.extend_from_slice(&chunk[..take]);
                    if let Some(key) = self.mask {
                        self.mask_offset =
                            apply_mask_offset(&mut self.payload[start..], key, self.mask_offset);
                    }
                    self.remaining -= take;
                    chunk = &chunk[take..];
                    if self.remaining == 0 {
                        self.finish_frame(out);
                    }
                }
            }
        }
    }

    /// End-of-stream check: a partial frame left behind is a protocol error,
    /// reported with a kind naming the header stage the stream died in.
    ///
    /// # Errors
    ///
    /// One of the truncation kinds, or `IncompleteFrame` mid-payload.
    pub fn finish(&self) -> Result<()> {
        match self.phase {
            Phase::Header if self.header.is_empty() => Ok(()),
            Phase::Header => {
                if self.header.len() < 2 {
                    return Err(Error::TruncatedHeader);
                }
                let masked = self.header[1] & 0x80 != 0;
                let ext = match self.header[1] & 0x7F {
                    126 => 2,
                    127 => 8,
                    _ => 0,
                };
                if self.header.len() < 2 + ext {
                    if ext == 2 {
                        Err(Error::TruncatedLength16)
                    } else {
                        Err(Error::TruncatedLength64)
                    }
                } else {
                    debug_assert!(masked);
                    Err(Error::TruncatedMaskKey)
                }
            }
            Phase::Payload => Err(Error::IncompleteFrame {
                needed: self.remaining,
            }),
        }
    }

    /// How many header bytes the frame needs given what has arrived so far.
    fn header_len_needed(&self) -> usize {
        if self.header.len() < 2 {
            return 2;
        }
        let byte1 = self.header[1];
        let ext = match byte1 & 0x7F {
            126 => 2,
            127 => 8,
            _ => 0,
        };
        2 + ext + if byte1 & 0x80 != 0 { 4 } else { 0 }
    }

    /// Validate the complete header and switch to payload consumption.
    fn begin_payload(&mut self) -> Result<()> {
        let byte0 = self.header[0];
        let byte1 = self.header[1];

        if byte0 & 0x70 != 0 {
            return Err(Error::ReservedBitsSet);
        }

        let masked = byte1 & 0x80 != 0;
        if self.role.requires_masked_input() && !masked {
            return Err(Error::UnmaskedClientFrame);
        }
        if !self.role.requires_masked_input() && masked {
            return Err(Error::MaskedServerFrame);
        }

        let (len, mut offset) = match byte1 & 0x7F {
            code @ 0..=125 => (code as usize, 2),
            126 => (
                u16::from_be_bytes([self.header[2], self.header[3]]) as usize,
                4,
            ),
            _ => {
                let raw = u64::from_be_bytes([
                    self.header[2],
                    self.header[3],
                    self.header[4],
                    self.header[5],
                    self.header[6],
                    self.header[7],
                    self.header[8],
                    self.header[9],
                ]);
                let len = usize::try_from(raw).map_err(|_| Error::FrameTooLarge {
                    size: usize::MAX,
                    max: self.limits.max_frame_size,
                })?;
                (len, 10)
            }
        };

        let key = if masked {
            let key = [
                self.header[offset],
                self.header[offset + 1],
                self.header[offset + 2],
                self.header[offset + 3],
            ];
            offset += 4;
            if key == [0, 0, 0, 0] && !self.allow_zero_mask_key {
                return Err(Error::ZeroMaskKey);
            }
            Some(key)
        } else {
            None
        };
        debug_assert_eq!(offset, self.header.len());

        let opcode = OpCode::from_u8(byte0 & 0x0F)?;
        let fin = byte0 & 0x80 != 0;
        if opcode.is_control() {
            if !fin {
                return Err(Error::FragmentedControlFrame);
            }
            if len > MAX_CONTROL_PAYLOAD {
                return Err(Error::ControlFrameTooLarge(len));
            }
        }
        self.limits.check_frame_size(len)?;

        self.fin = fin;
        self.opcode = opcode;
        self.mask = key;
        self.mask_offset = 0;
        self.remaining = len;
        self.payload = Vec::with_capacity(len);
        self.header.clear();
        self.phase = Phase::Payload;
        Ok(())
    }

    fn finish_frame(&mut self, out: &mut Vec<Frame>) {
        out.push(Frame::new(
            self.fin,
            self.opcode,
            std::mem::take(&mut self.payload),
        ));
        self.mask = None;
        self.mask_offset = 0;
        self.phase = Phase::Header;
    }
}
