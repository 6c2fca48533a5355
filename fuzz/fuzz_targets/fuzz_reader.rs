#![no_main]

use libfuzzer_sys::fuzz_target;
use voxel_protocol::core::codec::FrameReader;

fuzz_target!(|data: &[u8]| {
    let mut reader = FrameReader::new(data);
    let _ = reader.read_u8();
    let _ = reader.read_position(data.first().is_some_and(|b| b & 1 == 1));
    let _ = reader.read_angles();
    let _ = reader.read_string();
    let _ = reader.read_block_pos();
    let _ = reader.read_i32();
});
