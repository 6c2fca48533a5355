#![no_main]

use libfuzzer_sys::fuzz_target;
use voxel_protocol::utils::compression::{compress, decompress, CompressionKind};

fuzz_target!(|data: &[u8]| {
    for kind in [CompressionKind::Gzip, CompressionKind::Deflate] {
        if let Ok(packed) = compress(data, kind) {
            assert_eq!(decompress(&packed, kind).ok().as_deref(), Some(data));
        }
        // Garbage input must fail cleanly within the size cap.
        let _ = decompress(data, kind);
    }
});
