//! Property-based tests using proptest
//!
//! Wire codec, chat splitting, compression and progress invariants checked
//! across randomly generated inputs.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use proptest::prelude::*;
use voxel_protocol::core::codec::{
    angle_to_byte, byte_to_angle, decode_string, decode_string_into, encode_string, from_fixed,
    to_fixed, STRING_LEN,
};
use voxel_protocol::protocol::chat::{split_message, MessageAssembler, MessageKind, ASSEMBLER_CAPACITY};
use voxel_protocol::protocol::extensions::{extension_hash, ExtensionTable};
use voxel_protocol::protocol::transfer::percent;
use voxel_protocol::utils::compression::{compress, decompress, CompressionKind};

// Property: decode(encode(s)) strips only trailing padding
proptest! {
    #[test]
    fn prop_string_field_roundtrip(text in "[ -~]{0,64}") {
        let mut field = [0u8; STRING_LEN];
        encode_string(&text, &mut field);

        let trimmed = text.trim_end_matches(' ');
        let decoded = decode_string(&field);
        if trimmed.is_empty() {
            prop_assert_eq!(decoded, None);
        } else {
            prop_assert_eq!(decoded.as_deref(), Some(trimmed));
        }

        let mut dst = String::from("stale");
        let len = decode_string_into(&field, &mut dst);
        prop_assert_eq!(dst.as_str(), trimmed);
        prop_assert_eq!(len, trimmed.len());
    }
}

// Property: coordinates on the 1/32 grid survive the fixed-point conversion
proptest! {
    #[test]
    fn prop_aligned_coordinates_are_lossless(raw in -1_000_000i32..1_000_000) {
        let value = from_fixed(raw);
        prop_assert_eq!(to_fixed(value), raw);
    }

    #[test]
    fn prop_unaligned_coordinates_round_to_nearest(value in -10_000.0f32..10_000.0) {
        let fixed = to_fixed(value);
        let back = from_fixed(fixed);
        prop_assert!((back - value).abs() <= 1.0 / 64.0 + f32::EPSILON * value.abs());
    }
}

// Property: every angle byte maps back to itself
proptest! {
    #[test]
    fn prop_angle_byte_roundtrip(byte in any::<u8>()) {
        prop_assert_eq!(angle_to_byte(byte_to_angle(byte)), byte);
    }
}

// Property: split chat lines always fit one frame
proptest! {
    #[test]
    fn prop_split_lines_fit(text in "[ -~]{0,400}") {
        for line in split_message(&text, MessageKind::Chat) {
            prop_assert!(line.chars().count() <= STRING_LEN);
        }
    }

    #[test]
    fn prop_continuations_are_prefixed(text in "[a-z]{63,300}") {
        let lines = split_message(&text, MessageKind::Chat);
        prop_assert!(lines.len() >= 2);
        for line in &lines[1..] {
            prop_assert!(line.starts_with("> "));
        }
    }
}

// Property: the long-message buffer never exceeds its capacity
proptest! {
    #[test]
    fn prop_assembler_is_bounded(fragments in prop::collection::vec("[a-z]{1,64}", 0..10)) {
        let mut assembler = MessageAssembler::new();
        let mut total = 0;
        for fragment in &fragments {
            let fits = total + fragment.len() <= ASSEMBLER_CAPACITY;
            prop_assert_eq!(assembler.append(fragment), fits);
            total = (total + fragment.len()).min(ASSEMBLER_CAPACITY);
        }
        prop_assert_eq!(assembler.as_str().len(), total);
    }
}

// Property: percent never decreases while input drains
proptest! {
    #[test]
    fn prop_percent_monotonic(total in 1usize..5_000_000, steps in 1usize..64) {
        let step = (total / steps).max(1);
        let mut last = 0u8;
        let mut queued = total;
        loop {
            let p = percent(queued, total);
            prop_assert!(p >= last);
            last = p;
            if queued == 0 {
                break;
            }
            queued = queued.saturating_sub(step);
        }
        prop_assert_eq!(last, 100);
    }
}

// Property: both stream formats decompress to their input
proptest! {
    #[test]
    fn prop_compression_roundtrip(data in prop::collection::vec(any::<u8>(), 0..20_000)) {
        for kind in [CompressionKind::Gzip, CompressionKind::Deflate] {
            let packed = compress(&data, kind).unwrap();
            prop_assert_eq!(decompress(&packed, kind).unwrap(), data.clone());
        }
    }

    #[test]
    fn prop_extension_hash_is_crc32(name in "[A-Za-z]{1,32}") {
        prop_assert_eq!(extension_hash(&name), crc32fast::hash(name.as_bytes()));
    }
}

#[test]
fn advertised_hashes_match_names() {
    for ext in ExtensionTable::standard().iter() {
        assert_eq!(ext.hash, crc32fast::hash(ext.name.as_bytes()), "{}", ext.name);
    }
}
