#![allow(clippy::unwrap_used)]

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use voxel_protocol::core::codec::{
    decode_string_into, encode_string, Angles, BlockPos, FrameReader, Vec3, STRING_LEN,
};
use voxel_protocol::protocol::chat::{split_message, MessageKind};
use voxel_protocol::protocol::outbound;

fn bench_strings(c: &mut Criterion) {
    let mut group = c.benchmark_group("string_field");
    group.throughput(Throughput::Bytes(STRING_LEN as u64));

    let text = "The quick brown fox jumps over the lazy dog";
    group.bench_function("encode", |b| {
        let mut field = [0u8; STRING_LEN];
        b.iter(|| encode_string(black_box(text), &mut field))
    });

    let mut field = [0u8; STRING_LEN];
    encode_string(text, &mut field);
    group.bench_function("decode_into", |b| {
        let mut dst = String::with_capacity(STRING_LEN);
        b.iter(|| decode_string_into(black_box(&field), &mut dst))
    });
    group.finish();
}

fn bench_frames(c: &mut Criterion) {
    let mut group = c.benchmark_group("frames");
    let pos = Vec3::new(128.5, 64.0, 99.25);
    let angles = Angles::new(90.0, 45.0);

    for wide in [false, true] {
        group.bench_function(format!("position_wide_{wide}"), |b| {
            b.iter(|| outbound::position_orientation(3, black_box(pos), angles, wide))
        });
    }
    group.bench_function("set_block", |b| {
        b.iter(|| outbound::set_block(black_box(BlockPos::new(10, 20, 30)), 1))
    });
    group.bench_function("chat", |b| {
        b.iter(|| outbound::chat(MessageKind::Chat, black_box("&ehello &fworld"), false))
    });

    let frame = outbound::position_orientation(3, pos, angles, true);
    group.bench_function("read_position_wide", |b| {
        b.iter(|| {
            let mut reader = FrameReader::new(&frame.payload()[1..]);
            reader.read_position(true).unwrap()
        })
    });
    group.finish();
}

fn bench_split(c: &mut Criterion) {
    let long = "lorem ipsum dolor sit amet ".repeat(20);
    c.bench_function("split_message_540b", |b| {
        b.iter(|| split_message(black_box(&long), MessageKind::Chat))
    });
}

criterion_group!(benches, bench_strings, bench_frames, bench_split);
criterion_main!(benches);
