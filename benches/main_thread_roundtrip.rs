//! Threading framework benchmarks
//!
//! # Metrics
//! - `main_thread/roundtrip`: worker to main thread and back, main thread pumping
//! - `main_thread/inline`: `run_on_main_thread` called on the main thread
//! - `pool/throughput`: batches of trivial tasks through the default pool
//!
//! # Usage
//! ```bash
//! cargo bench --bench main_thread_roundtrip
//! ```

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use farmtask::threading::{
    CountDownLatch, DefaultThreadPool, FnTask, MainThreadExecutor, StdSyncFactory, SyncFactory,
    TaskBase, ThreadPool,
};
use std::hint::black_box;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn bench_main_thread_roundtrip(c: &mut Criterion) {
    let executor = Arc::new(MainThreadExecutor::new(Arc::new(StdSyncFactory)));

    c.bench_function("main_thread/roundtrip", |b| {
        b.iter_custom(|iters| {
            let worker_executor = Arc::clone(&executor);
            let start = Instant::now();
            let worker = thread::spawn(move || {
                for i in 0..iters {
                    let value = worker_executor
                        .run_on_main_thread(move || Ok(i * 2), None)
                        .unwrap_or_default();
                    black_box(value);
                }
            });
            executor
                .pump_while(|| !worker.is_finished())
                .unwrap_or_default();
            let elapsed = start.elapsed();
            let _ = worker.join();
            elapsed
        })
    });

    c.bench_function("main_thread/inline", |b| {
        b.iter(|| executor.run_on_main_thread(|| Ok(black_box(7u64)), None))
    });
}

fn bench_pool_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("pool/throughput");
    group.measurement_time(Duration::from_secs(5));

    for workers in [1usize, 4] {
        let pool = DefaultThreadPool::new(Some(workers)).expect("Failed to start thread pool");

        for batch in [16usize, 256] {
            group.throughput(Throughput::Elements(batch as u64));
            group.bench_with_input(
                BenchmarkId::new(format!("{}_workers", workers), batch),
                &batch,
                |b, &batch| {
                    b.iter(|| {
                        let latch = Arc::new(CountDownLatch::new(pool.create_wait_condition(batch)));
                        for _ in 0..batch {
                            let latch = Arc::clone(&latch);
                            let _ = pool.add_task(Arc::new(FnTask::new(
                                TaskBase::new(),
                                move |_| {
                                    latch.decrease();
                                    Ok(())
                                },
                            )));
                        }
                        latch.wait();
                    })
                },
            );
        }

        pool.shutdown(true);
    }

    group.finish();
}

criterion_group!(benches, bench_main_thread_roundtrip, bench_pool_throughput);
criterion_main!(benches);
