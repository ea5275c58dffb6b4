use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

use dgft::{segment_bytes, Assembler, Packet};

fn bench_segment(c: &mut Criterion) {
    let data = vec![0xA5u8; 1024 * 1024];

    let mut group = c.benchmark_group("segment");
    group.throughput(Throughput::Bytes(data.len() as u64));
    group.bench_function("1MiB/1024", |b| {
        b.iter(|| segment_bytes(black_box(&data), 1024).unwrap())
    });
    group.finish();
}

fn bench_codec(c: &mut Criterion) {
    let packet = Packet::data(42, vec![7u8; 1024].into());
    let wire = packet.to_bytes();

    c.bench_function("encode 1024", |b| b.iter(|| black_box(&packet).to_bytes()));
    c.bench_function("decode 1024", |b| {
        b.iter(|| Packet::from_bytes(black_box(&wire), 1024).unwrap())
    });
}

fn bench_assemble(c: &mut Criterion) {
    let packets = segment_bytes(&vec![0x5Au8; 1024 * 1024], 1024).unwrap();

    let mut group = c.benchmark_group("assemble");
    group.throughput(Throughput::Bytes(1024 * 1024));
    group.bench_function("1MiB in order", |b| {
        b.iter(|| {
            let mut assembler = Assembler::new(true);
            let mut completed = None;
            for packet in packets.iter().cloned() {
                completed = assembler.on_packet(packet);
            }
            completed
        })
    });
    group.finish();
}

criterion_group!(benches, bench_segment, bench_codec, bench_assemble);
criterion_main!(benches);
