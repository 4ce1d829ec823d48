use criterion::*;

fn criterion_benchmark(c: &mut Criterion) {
    let threads = num_cpus::get().max(1);

    let tasks = 1000u64;

    let mut group = c.benchmark_group("pool");
    group.sample_size(10);

    group.bench_function("workqueue", |b| {
        b.iter_batched(
            || {
                workqueue::builder()
                    .workers(threads)
                    .build(|task: u64| {
                        let _ = black_box(task + 9);
                    })
            },
            |pool| {
                for task in 0..tasks {
                    pool.enqueue(task).unwrap();
                }

                pool.shutdown();
            },
            BatchSize::LargeInput,
        );
    });

    group.bench_function("threadpool", |b| {
        b.iter_batched(
            || threadpool::ThreadPool::new(threads),
            |pool| {
                for task in 0..tasks {
                    pool.execute(move || {
                        let _ = black_box(task + 9);
                    });
                }

                pool.join();
            },
            BatchSize::LargeInput,
        );
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
