use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ringseq::{Config, ReorderConfig, Reorderer, Ring, SeqMessage, SeqMpsc, ShardedMpsc};
use std::sync::Arc;
use std::thread;

const MSG_PER_PRODUCER: u64 = 1_000_000;

fn bench_spsc(c: &mut Criterion) {
    let mut group = c.benchmark_group("spsc");
    group.throughput(Throughput::Elements(MSG_PER_PRODUCER));

    group.bench_function("push_pop", |b| {
        b.iter(|| {
            let ring = Arc::new(Ring::<u64>::new(Config::new(16, 1, false)));
            let producer_ring = Arc::clone(&ring);

            let producer = thread::spawn(move || {
                for i in 0..MSG_PER_PRODUCER {
                    while !producer_ring.push(i) {
                        std::hint::spin_loop();
                    }
                }
            });

            let mut count = 0u64;
            while count < MSG_PER_PRODUCER {
                match ring.pop() {
                    Some(v) => {
                        black_box(v);
                        count += 1;
                    }
                    None => std::hint::spin_loop(),
                }
            }

            producer.join().unwrap();
        });
    });

    group.bench_function("bulk_64", |b| {
        b.iter(|| {
            let ring = Arc::new(Ring::<u64>::new(Config::new(16, 1, false)));
            let producer_ring = Arc::clone(&ring);

            let producer = thread::spawn(move || {
                let chunk: Vec<u64> = (0..64).collect();
                let mut sent = 0u64;
                while sent < MSG_PER_PRODUCER {
                    let n = producer_ring.push_bulk(&chunk) as u64;
                    if n == 0 {
                        std::hint::spin_loop();
                    }
                    sent += n;
                }
            });

            let mut buf = [0u64; 64];
            let mut count = 0u64;
            while count < MSG_PER_PRODUCER {
                let n = ring.pop_bulk(&mut buf) as u64;
                if n == 0 {
                    std::hint::spin_loop();
                }
                black_box(&buf);
                count += n;
            }

            producer.join().unwrap();
        });
    });

    group.finish();
}

fn bench_mpsc(c: &mut Criterion) {
    let mut group = c.benchmark_group("mpsc");

    for &num_producers in &[2usize, 4, 8] {
        let total = MSG_PER_PRODUCER * num_producers as u64;
        group.throughput(Throughput::Elements(total));

        group.bench_with_input(
            BenchmarkId::new("sharded", num_producers),
            &num_producers,
            |b, &n| {
                b.iter(|| {
                    let queue =
                        Arc::new(ShardedMpsc::<u64>::new(Config::new(14, n.max(2), false)));
                    let mut handles = Vec::new();

                    for _ in 0..n {
                        let q = Arc::clone(&queue);
                        handles.push(thread::spawn(move || {
                            let mut producer = q.register().unwrap();
                            for i in 0..MSG_PER_PRODUCER {
                                while !producer.push(i) {
                                    std::hint::spin_loop();
                                }
                            }
                        }));
                    }

                    let target = MSG_PER_PRODUCER * n as u64;
                    let mut buf = [0u64; 256];
                    let mut count = 0u64;
                    while count < target {
                        let got = queue.pop_bulk(&mut buf) as u64;
                        if got == 0 {
                            std::hint::spin_loop();
                        }
                        black_box(&buf);
                        count += got;
                    }

                    for h in handles {
                        h.join().unwrap();
                    }
                });
            },
        );

        group.bench_with_input(
            BenchmarkId::new("slot_seq", num_producers),
            &num_producers,
            |b, &n| {
                b.iter(|| {
                    let queue = Arc::new(SeqMpsc::<u64>::new(Config::new(14, n.max(2), false)));
                    let mut handles = Vec::new();

                    for _ in 0..n {
                        let q = Arc::clone(&queue);
                        handles.push(thread::spawn(move || {
                            for i in 0..MSG_PER_PRODUCER {
                                while !q.push(i) {
                                    std::hint::spin_loop();
                                }
                            }
                        }));
                    }

                    let target = MSG_PER_PRODUCER * n as u64;
                    let mut count = 0u64;
                    while count < target {
                        match queue.pop() {
                            Some(v) => {
                                black_box(v);
                                count += 1;
                            }
                            None => std::hint::spin_loop(),
                        }
                    }

                    for h in handles {
                        h.join().unwrap();
                    }
                });
            },
        );
    }

    group.finish();
}

fn bench_reorder_pipeline(c: &mut Criterion) {
    const TOTAL: u64 = 200_000;
    const WORKERS: u64 = 4;

    let mut group = c.benchmark_group("reorder");
    group.throughput(Throughput::Elements(TOTAL));
    group.sample_size(10);

    group.bench_function("scatter_gather", |b| {
        b.iter(|| {
            let queue = Arc::new(ShardedMpsc::<SeqMessage<u64>>::new(Config::new(
                12,
                WORKERS as usize,
                false,
            )));
            let reorderer = Reorderer::new(Arc::clone(&queue), ReorderConfig::default());

            let mut handles = Vec::new();
            for w in 0..WORKERS {
                let q = Arc::clone(&queue);
                handles.push(thread::spawn(move || {
                    let mut producer = q.register().unwrap();
                    let mut seq = w;
                    while seq < TOTAL {
                        while !producer.push(SeqMessage::new(seq, seq)) {
                            std::hint::spin_loop();
                        }
                        seq += WORKERS;
                    }
                }));
            }

            let mut expected = 0u64;
            while expected < TOTAL {
                match reorderer.get_next() {
                    Some(msg) => {
                        black_box(msg.payload);
                        expected += 1;
                    }
                    None => std::hint::spin_loop(),
                }
            }

            for h in handles {
                h.join().unwrap();
            }
        });
    });

    group.finish();
}

criterion_group!(benches, bench_spsc, bench_mpsc, bench_reorder_pipeline);
criterion_main!(benches);
