//! Frame-level wire codec (RFC 6455 Section 5.2).
//!
//! Pure mapping between an in-memory frame description and its wire bytes.
//! Streaming concerns (chunk reassembly, incremental unmasking) live in
//! [`parser`](crate::protocol::parser); this module is stateless.

use bytes::{BufMut, BytesMut};

use crate::error::{Error, Result};
use crate::protocol::mask::apply_mask;

/// Maximum payload size for control frames (RFC 6455 Section 5.5).
pub const MAX_CONTROL_PAYLOAD: usize = 125;

/// Pre-built empty ping frame, unmasked (server role).
pub const PING_FRAME: [u8; 2] = [0x89, 0x00];
/// Pre-built empty pong frame, unmasked (server role).
pub const PONG_FRAME: [u8; 2] = [0x8A, 0x00];
/// Pre-built empty ping frame, masked (client role). The all-zero masking
/// key is permitted by the RFC; the XOR is a no-op on the empty payload.
pub const PING_FRAME_MASKED: [u8; 6] = [0x89, 0x80, 0x00, 0x00, 0x00, 0x00];
/// Pre-built empty pong frame, masked (client role).
pub const PONG_FRAME_MASKED: [u8; 6] = [0x8A, 0x80, 0x00, 0x00, 0x00, 0x00];

/// WebSocket frame opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
#[non_exhaustive]
pub enum OpCode {
    /// Continuation frame (0x0): next fragment of an open message.
    Continuation = 0x0,
    /// Text frame (0x1): payload is UTF-8.
    Text = 0x1,
    /// Binary frame (0x2).
    Binary = 0x2,
    /// Close frame (0x8).
    Close = 0x8,
    /// Ping frame (0x9).
    Ping = 0x9,
    /// Pong frame (0xA).
    Pong = 0xA,
}

impl OpCode {
    /// Decode an opcode nibble.
    ///
    /// # Errors
    ///
    /// `Error::ReservedOpcode` for the reserved values 0x3-0x7 and 0xB-0xF.
    pub const fn from_u8(byte: u8) -> Result<Self> {
        match byte {
            0x0 => Ok(OpCode::Continuation),
            0x1 => Ok(OpCode::Text),
            0x2 => Ok(OpCode::Binary),
            0x8 => Ok(OpCode::Close),
            0x9 => Ok(OpCode::Ping),
            0xA => Ok(OpCode::Pong),
            other => Err(Error::ReservedOpcode(other)),
        }
    }

    /// The wire nibble for this opcode.
    #[inline]
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Close, Ping and Pong are control opcodes.
    #[inline]
    #[must_use]
    pub const fn is_control(self) -> bool {
        matches!(self, OpCode::Close | OpCode::Ping | OpCode::Pong)
    }

    /// Continuation, Text and Binary are data opcodes.
    #[inline]
    #[must_use]
    pub const fn is_data(self) -> bool {
        matches!(self, OpCode::Continuation | OpCode::Text | OpCode::Binary)
    }
}

impl std::fmt::Display for OpCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            OpCode::Continuation => "Continuation",
            OpCode::Text => "Text",
            OpCode::Binary => "Binary",
            OpCode::Close => "Close",
            OpCode::Ping => "Ping",
            OpCode::Pong => "Pong",
        };
        f.write_str(name)
    }
}

/// A single WebSocket frame.
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-------+-+-------------+-------------------------------+
/// |F|R|R|R| opcode|M| Payload len |    Extended payload length    |
/// |I|S|S|S|  (4)  |A|     (7)     |             (16/64)           |
/// |N|V|V|V|       |S|             |   (if payload len==126/127)   |
/// | |1|2|3|       |K|             |                               |
/// +-+-+-+-+-------+-+-------------+-------------------------------+
/// |                         Masking key (if MASK)                 |
/// +---------------------------------------------------------------+
/// |                         Payload data                          |
/// +---------------------------------------------------------------+
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Final fragment of a message.
    pub fin: bool,
    /// Reserved bit 1; must be clear without a negotiated extension.
    pub rsv1: bool,
    /// Reserved bit 2.
    pub rsv2: bool,
    /// Reserved bit 3.
    pub rsv3: bool,
    /// Frame opcode.
    pub opcode: OpCode,
    payload: Vec<u8>,
}

impl Frame {
    /// Create a frame.
    #[must_use]
    pub fn new(fin: bool, opcode: OpCode, payload: Vec<u8>) -> Self {
        Self {
            fin,
            rsv1: false,
            rsv2: false,
            rsv3: false,
            opcode,
            payload,
        }
    }

    /// Single unfragmented text frame.
    #[must_use]
    pub fn text(data: impl Into<Vec<u8>>) -> Self {
        Self::new(true, OpCode::Text, data.into())
    }

    /// Single unfragmented binary frame.
    #[must_use]
    pub fn binary(data: impl Into<Vec<u8>>) -> Self {
        Self::new(true, OpCode::Binary, data.into())
    }

    /// Ping frame.
    #[must_use]
    pub fn ping(data: impl Into<Vec<u8>>) -> Self {
        Self::new(true, OpCode::Ping, data.into())
    }

    /// Pong frame.
    #[must_use]
    pub fn pong(data: impl Into<Vec<u8>>) -> Self {
        Self::new(true, OpCode::Pong, data.into())
    }

    /// Close frame. The status code is encoded as the canonical two-byte
    /// big-endian integer followed by the UTF-8 reason.
    #[must_use]
    pub fn close(code: Option<u16>, reason: &str) -> Self {
        let payload = match code {
            Some(code) => {
                let mut data = code.to_be_bytes().to_vec();
                data.extend_from_slice(reason.as_bytes());
                data
            }
            None => Vec::new(),
        };
        Self::new(true, OpCode::Close, payload)
    }

    /// Borrow the payload bytes.
    #[inline]
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Take ownership of the payload.
    #[must_use]
    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    /// Enforce the frame-level invariants: reserved bits clear, control
    /// frames final with at most 125 payload bytes.
    ///
    /// # Errors
    ///
    /// `ReservedBitsSet`, `FragmentedControlFrame` or `ControlFrameTooLarge`.
    pub fn validate(&self) -> Result<()> {
        if self.rsv1 || self.rsv2 || self.rsv3 {
            return Err(Error::ReservedBitsSet);
        }
        if self.opcode.is_control() {
            if !self.fin {
                return Err(Error::FragmentedControlFrame);
            }
            if self.payload.len() > MAX_CONTROL_PAYLOAD {
                return Err(Error::ControlFrameTooLarge(self.payload.len()));
            }
        }
        Ok(())
    }

    /// One-shot decode of a frame from the front of `buf`.
    ///
    /// Returns the frame (payload unmasked) and the number of bytes
    /// consumed. Length encodings longer than necessary are accepted.
    ///
    /// # Errors
    ///
    /// - `Error::IncompleteFrame` when `buf` holds less than one full frame
    /// - `Error::ReservedOpcode` for reserved opcode values
    pub fn parse(buf: &[u8]) -> Result<(Self, usize)> {
        if buf.len() < 2 {
            return Err(Error::IncompleteFrame {
                needed: 2 - buf.len(),
            });
        }

        let byte0 = buf[0];
        let byte1 = buf[1];
        let fin = byte0 & 0x80 != 0;
        let rsv1 = byte0 & 0x40 != 0;
        let rsv2 = byte0 & 0x20 != 0;
        let rsv3 = byte0 & 0x10 != 0;
        let opcode = OpCode::from_u8(byte0 & 0x0F)?;
        let masked = byte1 & 0x80 != 0;

        let (payload_len, mut offset) = match byte1 & 0x7F {
            len @ 0..=125 => (len as usize, 2),
            126 => {
                if buf.len() < 4 {
                    return Err(Error::IncompleteFrame {
                        needed: 4 - buf.len(),
                    });
                }
                (u16::from_be_bytes([buf[2], buf[3]]) as usize, 4)
            }
            _ => {
                if buf.len() < 10 {
                    return Err(Error::IncompleteFrame {
                        needed: 10 - buf.len(),
                    });
                }
                let len = u64::from_be_bytes([
                    buf[2], buf[3], buf[4], buf[5], buf[6], buf[7], buf[8], buf[9],
                ]);
                let len = usize::try_from(len).map_err(|_| Error::FrameTooLarge {
                    size: usize::MAX,
                    max: usize::MAX,
                })?;
                (len, 10)
            }
        };

        let key = if masked {
            if buf.len() < offset + 4 {
                return Err(Error::IncompleteFrame {
                    needed: offset + 4 - buf.len(),
                });
            }
            let key = [buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]];
            offset += 4;
            Some(key)
        } else {
            None
        };

        let total = offset
            .checked_add(payload_len)
            .ok_or(Error::FrameTooLarge {
                size: payload_len,
                max: usize::MAX - offset,
            })?;
        if buf.len() < total {
            return Err(Error::IncompleteFrame {
                needed: total - buf.len(),
            });
        }

        let mut payload = buf[offset..total].to_vec();
        if let Some(key) = key {
            apply_mask(&mut payload, key);
        }

        Ok((
            Frame {
                fin,
                rsv1,
                rsv2,
                rsv3,
                opcode,
                payload,
            },
            total,
        ))
    }

    /// Serialize this frame into `buf`, choosing the smallest length
    /// encoding that fits. When `mask` is given the key is written and the
    /// payload is XOR-transformed inside `buf`; the frame's own payload is
    /// left untouched.
    pub fn write_into(&self, buf: &mut BytesMut, mask: Option<[u8; 4]>) {
        let len = self.payload.len();
        buf.reserve(self.wire_size(mask.is_some()));

        let mut byte0 = self.opcode.as_u8();
        if self.fin {
            byte0 |= 0x80;
        }
        if self.rsv1 {
            byte0 |= 0x40;
        }
        if self.rsv2 {
            byte0 |= 0x20;
        }
        if self.rsv3 {
            byte0 |= 0x10;
        }
        buf.put_u8(byte0);

        let mask_bit = if mask.is_some() { 0x80 } else { 0x00 };
        if len <= 125 {
            buf.put_u8(mask_bit | len as u8);
        } else if len <= 65535 {
            buf.put_u8(mask_bit | 126);
            buf.put_u16(len as u16);
        } else {
            buf.put_u8(mask_bit | 127);
            buf.put_u64(len as u64);
        }

        if let Some(key) = mask {
            buf.put_slice(&key);
            let start = buf.len();
            buf.put_slice(&self.payload);
            apply_mask(&mut buf[start..], key);
        } else {
            buf.put_slice(&self.payload);
        }
    }

    /// Serialize into a fresh buffer.
    #[must_use]
    pub fn encode(&self, mask: Option<[u8; 4]>) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(self.wire_size(mask.is_some()));
        self.write_into(&mut buf, mask);
        buf.to_vec()
    }

    /// Number of bytes this frame occupies on the wire.
    #[must_use]
    pub fn wire_size(&self, masked: bool) -> usize {
        let len = self.payload.len();
        let extended = if len <= 125 {
            0
        } else if len <= 65535 {
            2
        } else {
            8
        };
        2 + extended + if masked { 4 } else { 0 } + len
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_from_u8() {
        assert_eq!(OpCode::from_u8(0x0).unwrap(), OpCode::Continuation);
        assert_eq!(OpCode::from_u8(0x1).unwrap(), OpCode::Text);
        assert_eq!(OpCode::from_u8(0x2).unwrap(), OpCode::Binary);
        assert_eq!(OpCode::from_u8(0x8).unwrap(), OpCode::Close);
        assert_eq!(OpCode::from_u8(0x9).unwrap(), OpCode::Ping);
        assert_eq!(OpCode::from_u8(0xA).unwrap(), OpCode::Pong);
        for reserved in [0x3, 0x4, 0x5, 0x6, 0x7, 0xB, 0xC, 0xD, 0xE, 0xF] {
            assert!(matches!(
                OpCode::from_u8(reserved),
                Err(Error::ReservedOpcode(v)) if v == reserved
            ));
        }
    }

    #[test]
    fn test_opcode_classes() {
        assert!(OpCode::Close.is_control());
        assert!(OpCode::Ping.is_control());
        assert!(OpCode::Pong.is_control());
        assert!(OpCode::Continuation.is_data());
        assert!(OpCode::Text.is_data());
        assert!(OpCode::Binary.is_data());
        assert!(!OpCode::Text.is_control());
        assert!(!OpCode::Close.is_data());
    }

    #[test]
    fn test_parse_unmasked_text() {
        // RFC 6455 Section 5.7: unmasked "Hello".
        let data = [0x81, 0x05, 0x48, 0x65, 0x6c, 0x6c, 0x6f];
        let (frame, len) = Frame::parse(&data).unwrap();
        assert_eq!(len, 7);
        assert!(frame.fin);
        assert_eq!(frame.opcode, OpCode::Text);
        assert_eq!(frame.payload(), b"Hello");
    }

    #[test]
    fn test_parse_masked_text() {
        // RFC 6455 Section 5.7: masked "Hello" under key 37 fa 21 3d.
        let data = [
            0x81, 0x85, 0x37, 0xfa, 0x21, 0x3d, 0x7f, 0x9f, 0x4d, 0x51, 0x58,
        ];
        let (frame, len) = Frame::parse(&data).unwrap();
        assert_eq!(len, 11);
        assert_eq!(frame.opcode, OpCode::Text);
        assert_eq!(frame.payload(), b"Hello");
    }

    #[test]
    fn test_parse_close() {
        let data = [0x88, 0x02, 0x03, 0xe8];
        let (frame, len) = Frame::parse(&data).unwrap();
        assert_eq!(len, 4);
        assert_eq!(frame.opcode, OpCode::Close);
        assert_eq!(frame.payload(), &[0x03, 0xe8]);
    }

    #[test]
    fn test_parse_fragment_pair() {
        let first = [0x01, 0x03, 0x48, 0x65, 0x6c];
        let (frame, _) = Frame::parse(&first).unwrap();
        assert!(!frame.fin);
        assert_eq!(frame.opcode, OpCode::Text);
        assert_eq!(frame.payload(), b"Hel");

        let second = [0x80, 0x02, 0x6c, 0x6f];
        let (frame, _) = Frame::parse(&second).unwrap();
        assert!(frame.fin);
        assert_eq!(frame.opcode, OpCode::Continuation);
        assert_eq!(frame.payload(), b"lo");
    }

    #[test]
    fn test_parse_extended_16() {
        let mut data = vec![0x82, 0x7e, 0x01, 0x00];
        data.extend(vec![0xab; 256]);
        let (frame, len) = Frame::parse(&data).unwrap();
        assert_eq!(len, 4 + 256);
        assert_eq!(frame.payload().len(), 256);
    }

    #[test]
    fn test_parse_extended_64() {
        let mut data = vec![0x82, 0x7f];
        data.extend(65536u64.to_be_bytes());
        data.extend(vec![0xcd; 65536]);
        let (frame, len) = Frame::parse(&data).unwrap();
        assert_eq!(len, 10 + 65536);
        assert_eq!(frame.payload().len(), 65536);
    }

    #[test]
    fn test_parse_overlong_length_encoding_accepted() {
        // A 5-byte payload announced through the 16-bit form.
        let data = [0x81, 0x7e, 0x00, 0x05, 0x48, 0x65, 0x6c, 0x6c, 0x6f];
        let (frame, len) = Frame::parse(&data).unwrap();
        assert_eq!(len, 9);
        assert_eq!(frame.payload(), b"Hello");
    }

    #[test]
    fn test_parse_incomplete() {
        assert!(matches!(
            Frame::parse(&[0x81]),
            Err(Error::IncompleteFrame { needed: 1 })
        ));
        assert!(matches!(
            Frame::parse(&[0x81, 0x05, 0x48, 0x65, 0x6c]),
            Err(Error::IncompleteFrame { needed: 2 })
        ));
        assert!(matches!(
            Frame::parse(&[0x82, 0x7e, 0x01]),
            Err(Error::IncompleteFrame { needed: 1 })
        ));
        assert!(matches!(
            Frame::parse(&[0x82, 0x7f, 0x00, 0x00, 0x00]),
            Err(Error::IncompleteFrame { needed: 5 })
        ));
        assert!(matches!(
            Frame::parse(&[0x81, 0x85, 0x37, 0xfa]),
            Err(Error::IncompleteFrame { .. })
        ));
    }

    #[test]
    fn test_parse_reserved_opcode() {
        assert!(matches!(
            Frame::parse(&[0x83, 0x00]),
            Err(Error::ReservedOpcode(0x03))
        ));
        assert!(matches!(
            Frame::parse(&[0x8b, 0x00]),
            Err(Error::ReservedOpcode(0x0B))
        ));
    }

    #[test]
    fn test_write_unmasked() {
        let frame = Frame::text(b"Hello".to_vec());
        assert_eq!(
            frame.encode(None),
            vec![0x81, 0x05, 0x48, 0x65, 0x6c, 0x6c, 0x6f]
        );
    }

    #[test]
    fn test_write_masked() {
        let frame = Frame::text(b"Hello".to_vec());
        let out = frame.encode(Some([0x37, 0xfa, 0x21, 0x3d]));
        assert_eq!(out[0], 0x81);
        assert_eq!(out[1], 0x85);
        assert_eq!(&out[2..6], &[0x37, 0xfa, 0x21, 0x3d]);
        assert_eq!(&out[6..11], &[0x7f, 0x9f, 0x4d, 0x51, 0x58]);
        // The frame's own payload stays unmasked.
        assert_eq!(frame.payload(), b"Hello");
    }

    #[test]
    fn test_write_length_encodings() {
        let frame = Frame::binary(vec![0xab; 256]);
        let out = frame.encode(None);
        assert_eq!(out[1], 0x7e);
        assert_eq!(&out[2..4], &[0x01, 0x00]);
        assert_eq!(out.len(), 4 + 256);

        let frame = Frame::binary(vec![0xcd; 65536]);
        let out = frame.encode(None);
        assert_eq!(out[1], 0x7f);
        assert_eq!(&out[2..10], &65536u64.to_be_bytes());
        assert_eq!(out.len(), 10 + 65536);
    }

    #[test]
    fn test_length_encoding_thresholds() {
        for (len, header) in [(125usize, 2usize), (126, 4), (65535, 4), (65536, 10)] {
            let frame = Frame::binary(vec![0u8; len]);
            assert_eq!(frame.wire_size(false), header + len);
            let out = frame.encode(None);
            assert_eq!(out.len(), header + len);
            let (parsed, consumed) = Frame::parse(&out).unwrap();
            assert_eq!(consumed, out.len());
            assert_eq!(parsed.payload().len(), len);
        }
    }

    #[test]
    fn test_roundtrip_masked() {
        let frame = Frame::binary(b"masked roundtrip".to_vec());
        let out = frame.encode(Some([0x12, 0x34, 0x56, 0x78]));
        let (parsed, consumed) = Frame::parse(&out).unwrap();
        assert_eq!(consumed, out.len());
        assert_eq!(parsed.payload(), frame.payload());
        assert_eq!(parsed.opcode, frame.opcode);
    }

    #[test]
    fn test_close_frame_canonical_body() {
        let frame = Frame::close(Some(1000), "bye");
        let payload = frame.payload();
        assert_eq!(&payload[..2], &[0x03, 0xe8]);
        assert_eq!(&payload[2..], b"bye");

        let bare = Frame::close(None, "");
        assert!(bare.payload().is_empty());
    }

    #[test]
    fn test_preformatted_control_frames() {
        assert_eq!(Frame::ping(Vec::new()).encode(None), PING_FRAME);
        assert_eq!(Frame::pong(Vec::new()).encode(None), PONG_FRAME);
        assert_eq!(
            Frame::ping(Vec::new()).encode(Some([0, 0, 0, 0])),
            PING_FRAME_MASKED
        );
        assert_eq!(
            Frame::pong(Vec::new()).encode(Some([0, 0, 0, 0])),
            PONG_FRAME_MASKED
        );
    }

    #[test]
    fn test_validate() {
        assert!(Frame::text(b"ok".to_vec()).validate().is_ok());
        assert!(Frame::ping(vec![0u8; 125]).validate().is_ok());

        let mut frame = Frame::ping(b"x".to_vec());
        frame.fin = false;
        assert!(matches!(
            frame.validate(),
            Err(Error::FragmentedControlFrame)
        ));

        let frame = Frame::ping(vec![0u8; 126]);
        assert!(matches!(
            frame.validate(),
            Err(Error::ControlFrameTooLarge(126))
        ));

        let mut frame = Frame::text(b"x".to_vec());
        frame.rsv1 = true;
        assert!(matches!(frame.validate(), Err(Error::ReservedBitsSet)));
    }

    #[test]
    fn test_wire_size_matches_encode() {
        for len in [0usize, 1, 125, 126, 127, 65535, 65536] {
            let frame = Frame::binary(vec![0u8; len]);
            assert_eq!(frame.encode(None).len(), frame.wire_size(false));
            assert_eq!(
                frame.encode(Some([1, 2, 3, 4])).len(),
                frame.wire_size(true)
            );
        }
    }
}
