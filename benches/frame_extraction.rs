use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use multicam_recorder::recorder::JpegSplitter;
use multicam_recorder::{TaskRegistry, VideoFormat};
use tokio::runtime::Runtime;

/// Multipart MJPEG body with `frames` parts of `frame_size` bytes each
fn mjpeg_body(frames: usize, frame_size: usize) -> Vec<u8> {
    let mut body = Vec::with_capacity(frames * (frame_size + 64));
    for i in 0..frames {
        body.extend_from_slice(b"--frame\r\nContent-Type: image/jpeg\r\n\r\n");
        body.extend_from_slice(&[0xFF, 0xD8]);
        body.extend((0..frame_size).map(|b| ((b + i) % 251) as u8));
        body.extend_from_slice(&[0xFF, 0xD9]);
        body.extend_from_slice(b"\r\n");
    }
    body
}

/// Benchmark splitting a stream delivered in network-sized chunks
fn bench_jpeg_splitting(c: &mut Criterion) {
    let body = mjpeg_body(30, 64 * 1024);
    let mut group = c.benchmark_group("jpeg_splitter");
    group.throughput(Throughput::Bytes(body.len() as u64));

    for chunk_size in [4 * 1024, 64 * 1024] {
        group.bench_function(format!("chunks_{}k", chunk_size / 1024), |b| {
            b.iter(|| {
                let mut splitter = JpegSplitter::new();
                let mut frames = 0;
                for chunk in body.chunks(chunk_size) {
                    splitter.push(black_box(chunk)).unwrap();
                    while splitter.next_frame().is_some() {
                        frames += 1;
                    }
                }
                frames
            })
        });
    }
    group.finish();
}

/// Benchmark task registration and snapshot reads
fn bench_task_registry(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    c.bench_function("register_and_snapshot", |b| {
        b.iter(|| {
            rt.block_on(async {
                let registry = TaskRegistry::default();
                for i in 0..100 {
                    let task = registry.register(&format!("cam{}", i), VideoFormat::Mp4).await.unwrap();
                    black_box(registry.snapshot(&task.id).await);
                }
            })
        })
    });
}

criterion_group!(benches, bench_jpeg_splitting, bench_task_registry);
criterion_main!(benches);
