//! Fragmented-message reassembly.
//!
//! One message is one initial Text or Binary frame, zero or more
//! continuation frames, and a FIN bit on the last. Control frames may arrive
//! between fragments and must leave the reassembly state untouched.

use bytes::BytesMut;

use crate::config::Limits;
use crate::error::{Error, Result};
use crate::protocol::frame::{Frame, OpCode};
use crate::protocol::utf8::Utf8Validator;

/// A fully reassembled message.
#[derive(Debug)]
pub struct AssembledMessage {
    /// The opcode of the first fragment: Text or Binary.
    pub opcode: OpCode,
    /// The concatenated payload.
    pub payload: Vec<u8>,
}

impl AssembledMessage {
    /// Consume as text. The payload has already passed incremental UTF-8
    /// validation, but the conversion re-checks rather than trusting it.
    ///
    /// # Errors
    ///
    /// `Error::InvalidUtf8` when the payload is not UTF-8.
    pub fn into_text(self) -> Result<String> {
        String::from_utf8(self.payload).map_err(|_| Error::InvalidUtf8)
    }

    /// Consume as binary.
    #[must_use]
    pub fn into_binary(self) -> Vec<u8> {
        self.payload
    }
}

/// Reassembles fragmented messages and enforces the message-sequencing
/// invariants.
pub struct MessageAssembler {
    limits: Limits,
    buffer: BytesMut,
    opcode: Option<OpCode>,
    fragment_count: usize,
    utf8: Option<Utf8Validator>,
}

impl MessageAssembler {
    /// Create an assembler bound by `limits`.
    #[must_use]
    pub fn new(limits: Limits) -> Self {
        Self {
            limits,
            buffer: BytesMut::new(),
            opcode: None,
            fragment_count: 0,
            utf8: None,
        }
    }

    /// Push the next data frame. Control frames are ignored here. Returns
    /// the finished message when the frame carries FIN.
    ///
    /// # Errors
    ///
    /// - `Error::UnexpectedContinuation` — continuation with no open message
    /// - `Error::InterleavedDataFrame` — Text/Binary while a message is open
    /// - `Error::MessageTooLarge` / `Error::TooManyFragments` — limits
    /// - `Error::InvalidUtf8` — text payload fails incremental validation
    pub fn push(&mut self, frame: Frame) -> Result<Option<AssembledMessage>> {
        if frame.opcode.is_control() {
            return Ok(None);
        }

        match frame.opcode {
            OpCode::Continuation => {
                if self.opcode.is_none() {
                    return Err(Error::UnexpectedContinuation);
                }
            }
            opcode => {
                if self.opcode.is_some() {
                    return Err(Error::InterleavedDataFrame);
                }
                self.opcode = Some(opcode);
                if opcode == OpCode::Text {
                    self.utf8 = Some(Utf8Validator::new());
                }
            }
        }

        self.fragment_count += 1;
        self.limits.check_fragment_count(self.fragment_count)?;
        self.limits
            .check_message_size(self.buffer.len() + frame.payload().len())?;

        if let Some(validator) = self.utf8.as_mut() {
            validator.push(frame.payload(), frame.fin)?;
        }

        self.buffer.extend_from_slice(frame.payload());

        if frame.fin {
            let payload = self.buffer.split().to_vec();
            let opcode = self.opcode.take().unwrap_or(OpCode::Binary);
            self.fragment_count = 0;
            self.utf8 = None;
            Ok(Some(AssembledMessage { opcode, payload }))
        } else {
            Ok(None)
        }
    }

    /// Whether a message is currently open.
    #[must_use]
    pub fn is_assembling(&self) -> bool {
        self.opcode.is_some()
    }

    /// Drop any partially assembled message.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.opcode = None;
        self.fragment_count = 0;
        self.utf8 = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assembler() -> MessageAssembler {
        MessageAssembler::new(Limits::default())
    }

    #[test]
    fn test_single_frame_message() {
        let mut asm = assembler();
        let msg = asm.push(Frame::text(b"Hello".to_vec())).unwrap().unwrap();
        assert_eq!(msg.opcode, OpCode::Text);
        assert_eq!(msg.payload, b"Hello");
        assert!(!asm.is_assembling());
    }

    #[test]
    fn test_two_fragments() {
        let mut asm = assembler();
        assert!(asm
            .push(Frame::new(false, OpCode::Text, b"Hi.".to_vec()))
            .unwrap()
            .is_none());
        assert!(asm.is_assembling());

        let msg = asm
            .push(Frame::new(true, OpCode::Continuation, b"!".to_vec()))
            .unwrap()
            .unwrap();
        assert_eq!(msg.opcode, OpCode::Text);
        assert_eq!(msg.payload, b"Hi.!");
        assert!(!asm.is_assembling());
    }

    #[test]
    fn test_many_fragments() {
        let mut asm = assembler();
        asm.push(Frame::new(false, OpCode::Binary, vec![1, 2])).unwrap();
        asm.push(Frame::new(false, OpCode::Continuation, vec![3, 4]))
            .unwrap();
        let msg = asm
            .push(Frame::new(true, OpCode::Continuation, vec![5, 6]))
            .unwrap()
            .unwrap();
        assert_eq!(msg.opcode, OpCode::Binary);
        assert_eq!(msg.payload, vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_control_frame_does_not_disturb_state() {
        let mut asm = assembler();
        asm.push(Frame::new(false, OpCode::Text, b"Hel".to_vec()))
            .unwrap();

        assert!(asm.push(Frame::ping(b"keepalive".to_vec())).unwrap().is_none());
        assert!(asm.is_assembling());

        let msg = asm
            .push(Frame::new(true, OpCode::Continuation, b"lo".to_vec()))
            .unwrap()
            .unwrap();
        assert_eq!(msg.payload, b"Hello");
    }

    #[test]
    fn test_bare_continuation_rejected() {
        let mut asm = assembler();
        let err = asm
            .push(Frame::new(true, OpCode::Continuation, b"x".to_vec()))
            .unwrap_err();
        assert_eq!(err, Error::UnexpectedContinuation);
        assert_eq!(err.close_code().as_u16(), 1002);
    }

    #[test]
    fn test_interleaved_data_opcode_rejected() {
        let mut asm = assembler();
        asm.push(Frame::new(false, OpCode::Text, b"first".to_vec()))
            .unwrap();
        let err = asm.push(Frame::text(b"second".to_vec())).unwrap_err();
        assert_eq!(err, Error::InterleavedDataFrame);
        assert_eq!(err.close_code().as_u16(), 1002);
    }

    #[test]
    fn test_message_size_limit() {
        let mut asm = MessageAssembler::new(Limits::default().with_max_message_size(8));
        asm.push(Frame::new(false, OpCode::Binary, vec![0u8; 6]))
            .unwrap();
        let err = asm
            .push(Frame::new(true, OpCode::Continuation, vec![0u8; 3]))
            .unwrap_err();
        assert!(matches!(err, Error::MessageTooLarge { size: 9, max: 8 }));
    }

    #[test]
    fn test_fragment_count_limit() {
        let mut asm = MessageAssembler::new(Limits::default().with_max_fragment_count(2));
        asm.push(Frame::new(false, OpCode::Binary, vec![1])).unwrap();
        asm.push(Frame::new(false, OpCode::Continuation, vec![2]))
            .unwrap();
        let err = asm
            .push(Frame::new(true, OpCode::Continuation, vec![3]))
            .unwrap_err();
        assert!(matches!(err, Error::TooManyFragments { count: 3, max: 2 }));
    }

    #[test]
    fn test_utf8_across_fragments() {
        // U+1F389 split across two fragments.
        let mut asm = assembler();
        asm.push(Frame::new(false, OpCode::Text, vec![0xf0, 0x9f]))
            .unwrap();
        let msg = asm
            .push(Frame::new(true, OpCode::Continuation, vec![0x8e, 0x89]))
            .unwrap()
            .unwrap();
        assert_eq!(msg.into_text().unwrap(), "\u{1F389}");
    }

    #[test]
    fn test_invalid_utf8_rejected_early() {
        let mut asm = assembler();
        let err = asm
            .push(Frame::new(true, OpCode::Text, vec![0x80, 0x81]))
            .unwrap_err();
        assert_eq!(err, Error::InvalidUtf8);
        assert_eq!(err.close_code().as_u16(), 1007);
    }

    #[test]
    fn test_binary_skips_utf8_validation() {
        let mut asm = assembler();
        let msg = asm
            .push(Frame::binary(vec![0x80, 0x81, 0xff]))
            .unwrap()
            .unwrap();
        assert_eq!(msg.into_binary(), vec![0x80, 0x81, 0xff]);
    }

    #[test]
    fn test_reset() {
        let mut asm = assembler();
        asm.push(Frame::new(false, OpCode::Text, b"partial".to_vec()))
            .unwrap();
        asm.reset();
        assert!(!asm.is_assembling());

        let msg = asm.push(Frame::text(b"fresh".to_vec())).unwrap().unwrap();
        assert_eq!(msg.payload, b"fresh");
    }

    #[test]
    fn test_back_to_back_messages() {
        let mut asm = assembler();
        let first = asm.push(Frame::text(b"one".to_vec())).unwrap().unwrap();
        let second = asm.push(Frame::binary(vec![0x02])).unwrap().unwrap();
        assert_eq!(first.opcode, OpCode::Text);
        assert_eq!(second.opcode, OpCode::Binary);
    }
}
