//! Wire frame codec benchmarks.

use cartsync_bench::random_items;
use cartsync_protocol::{ChannelKey, ClientFrame, ConnectionId, MutationEvent, SequencedEvent, ServerFrame, UserId};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn bench_frames(c: &mut Criterion) {
    let mut group = c.benchmark_group("frames");
    let channel = ChannelKey::for_user(&UserId::new("42"));
    let item = random_items(1).remove(0).with_image("https://img.example/mug.png", "A mug");

    let publish = ClientFrame::Publish {
        channel: channel.clone(),
        event: MutationEvent::upserted(item),
    };
    group.bench_function("encode_publish", |b| {
        b.iter(|| black_box(black_box(&publish).encode().unwrap()));
    });

    let event = ServerFrame::Event(SequencedEvent {
        channel,
        sequence: 1,
        origin: ConnectionId::new_v4(),
        event: MutationEvent::CountSync { count: 3 },
    });
    let bytes = event.encode().unwrap();
    group.bench_function("decode_event", |b| {
        b.iter(|| black_box(ServerFrame::decode(black_box(&bytes)).unwrap()));
    });

    group.finish();
}

criterion_group!(benches, bench_frames);
criterion_main!(benches);
