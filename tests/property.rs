//! Property-based tests for the frame codec, mask engine, and streaming
//! parser.

use proptest::prelude::*;

use wscore::protocol::{apply_mask, apply_mask_offset, Frame, HandshakeRequest, OpCode};
use wscore::{Config, FrameParser, Role};

fn data_opcode() -> impl Strategy<Value = OpCode> {
    prop_oneof![
        Just(OpCode::Text),
        Just(OpCode::Binary),
        Just(OpCode::Continuation),
    ]
}

fn control_opcode() -> impl Strategy<Value = OpCode> {
    prop_oneof![Just(OpCode::Close), Just(OpCode::Ping), Just(OpCode::Pong)]
}

proptest! {
    // Round trip: parse(encode(frame)) == frame, unmasked.
    #[test]
    fn roundtrip_unmasked(
        fin in any::<bool>(),
        opcode in data_opcode(),
        payload in prop::collection::vec(any::<u8>(), 0..1000)
    ) {
        let frame = Frame::new(fin, opcode, payload);
        let wire = frame.encode(None);
        prop_assert_eq!(wire.len(), frame.wire_size(false));

        let (parsed, consumed) = Frame::parse(&wire).unwrap();
        prop_assert_eq!(consumed, wire.len());
        prop_assert_eq!(parsed.fin, frame.fin);
        prop_assert_eq!(parsed.opcode, frame.opcode);
        prop_assert_eq!(parsed.payload(), frame.payload());
    }

    // Round trip with masking: the parser unmasks back to the original.
    #[test]
    fn roundtrip_masked(
        fin in any::<bool>(),
        opcode in data_opcode(),
        payload in prop::collection::vec(any::<u8>(), 0..500),
        key in any::<[u8; 4]>()
    ) {
        let frame = Frame::new(fin, opcode, payload);
        let wire = frame.encode(Some(key));
        prop_assert_eq!(wire.len(), frame.wire_size(true));

        let (parsed, consumed) = Frame::parse(&wire).unwrap();
        prop_assert_eq!(consumed, wire.len());
        prop_assert_eq!(parsed.payload(), frame.payload());
    }

    // Masking is an involution: unmask(mask(p, k), k) == p.
    #[test]
    fn mask_involution(
        data in prop::collection::vec(any::<u8>(), 0..2000),
        key in any::<[u8; 4]>()
    ) {
        let mut masked = data.clone();
        apply_mask(&mut masked, key);
        apply_mask(&mut masked, key);
        prop_assert_eq!(masked, data);
    }

    // Splitting a payload at any point and carrying the offset gives the
    // same transform as masking it whole.
    #[test]
    fn mask_offset_split_equivalence(
        data in prop::collection::vec(any::<u8>(), 1..600),
        key in any::<[u8; 4]>(),
        split in any::<prop::sample::Index>()
    ) {
        let split = split.index(data.len());

        let mut whole = data.clone();
        apply_mask(&mut whole, key);

        let mut parts = data;
        let (head, tail) = parts.split_at_mut(split);
        let offset = apply_mask_offset(head, key, 0);
        apply_mask_offset(tail, key, offset);

        prop_assert_eq!(parts, whole);
    }

    // The streaming parser delivers the same frames no matter where the
    // byte stream is split.
    #[test]
    fn parser_split_equivalence(
        payload in prop::collection::vec(any::<u8>(), 0..400),
        key in any::<[u8; 4]>(),
        split in any::<prop::sample::Index>()
    ) {
        let wire = Frame::binary(payload.clone()).encode(Some(key));
        let split = split.index(wire.len());

        let mut whole_parser = FrameParser::new(Role::Server, &Config::server());
        let mut whole = Vec::new();
        whole_parser.feed(&wire, &mut whole).unwrap();

        let mut split_parser = FrameParser::new(Role::Server, &Config::server());
        let mut pieces = Vec::new();
        split_parser.feed(&wire[..split], &mut pieces).unwrap();
        split_parser.feed(&wire[split..], &mut pieces).unwrap();

        prop_assert_eq!(whole.len(), 1);
        prop_assert_eq!(pieces.len(), 1);
        prop_assert_eq!(whole[0].payload(), payload.as_slice());
        prop_assert_eq!(pieces[0].payload(), payload.as_slice());
    }

    // Control frames within the 125-byte bound validate; larger ones fail.
    #[test]
    fn control_frame_size_rule(
        opcode in control_opcode(),
        payload in prop::collection::vec(any::<u8>(), 0..256)
    ) {
        let len = payload.len();
        let frame = Frame::new(true, opcode, payload);
        prop_assert_eq!(frame.validate().is_ok(), len <= 125);
    }

    // The smallest length encoding is always chosen.
    #[test]
    fn shortest_length_encoding(len in 0usize..70000) {
        let frame = Frame::binary(vec![0u8; len]);
        let wire = frame.encode(None);
        let expected_header = if len <= 125 { 2 } else if len <= 65535 { 4 } else { 10 };
        prop_assert_eq!(wire.len(), expected_header + len);
    }

    // Truncating a frame always yields IncompleteFrame, never a panic or a
    // bogus success.
    #[test]
    fn truncation_detected(
        payload in prop::collection::vec(any::<u8>(), 1..300),
        cut in any::<prop::sample::Index>()
    ) {
        let wire = Frame::binary(payload).encode(None);
        let cut = 1 + cut.index(wire.len() - 1);
        if cut < wire.len() {
            prop_assert!(Frame::parse(&wire[..cut]).is_err());
        }
    }

    // Arbitrary bytes never panic the handshake parser.
    #[test]
    fn handshake_parse_no_panic(data in prop::collection::vec(any::<u8>(), 0..2000)) {
        let _ = HandshakeRequest::parse(&data);
    }
}

mod targeted {
    use super::*;

    /// The full inbound pipeline at the length-encoding thresholds.
    #[test]
    fn parser_handles_threshold_sizes() {
        for len in [0usize, 1, 125, 126, 127, 65535, 65536, 131072] {
            let payload: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
            let wire = Frame::binary(payload.clone()).encode(Some([0x37, 0xfa, 0x21, 0x3d]));

            let mut parser = FrameParser::new(Role::Server, &Config::server());
            let mut frames = Vec::new();
            for piece in wire.chunks(4096) {
                parser.feed(piece, &mut frames).unwrap();
            }

            assert_eq!(frames.len(), 1, "len {}", len);
            assert_eq!(frames[0].payload(), payload.as_slice(), "len {}", len);
        }
    }

    #[test]
    fn accept_key_rfc_vector() {
        assert_eq!(
            wscore::compute_accept_key("dGhlIHNhbXBsZSBub25jZQ=="),
            "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
        );
    }

    #[test]
    fn accept_key_shape() {
        // SHA-1 output is 20 bytes; base64 of that is always 28 chars.
        for key in ["", "x", "dGhlIHNhbXBsZSBub25jZQ==", "0123456789abcdef"] {
            assert_eq!(wscore::compute_accept_key(key).len(), 28);
        }
    }

    #[test]
    fn zero_and_ff_masks() {
        for key in [[0u8; 4], [0xff; 4]] {
            let wire = Frame::text(b"test payload".to_vec()).encode(Some(key));
            let (parsed, _) = Frame::parse(&wire).unwrap();
            assert_eq!(parsed.payload(), b"test payload");
        }
    }
}
