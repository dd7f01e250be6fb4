//! WebSocket protocol core (RFC 6455): wire codec, masking, streaming frame
//! decode, message reassembly, and the upgrade handshake.

pub mod assembler;
pub mod frame;
pub mod handshake;
pub mod mask;
pub mod parser;
pub mod utf8;

pub use assembler::{AssembledMessage, MessageAssembler};
pub use frame::{Frame, OpCode};
pub use handshake::{compute_accept_key, HandshakeRequest, HandshakeResponse, WS_GUID};
pub use mask::{apply_mask, apply_mask_offset};
pub use parser::FrameParser;
pub use utf8::{validate_utf8, Utf8Validator};
