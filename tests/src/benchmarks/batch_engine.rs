//! # Batch Engine Benchmarks
//!
//! - Analysis: graph construction, conflict detection and levelling
//! - Proof: linearizability search over an executed batch
//! - End to end: one batch through the processor, independent vs contended

use crate::integration::fixtures::{default_config, engine, independent_transfers, random_transfers};
use criterion::{black_box, BenchmarkId, Criterion, Throughput};
use pl_batch_engine::algorithms::{build_dependency_graph, compute_levels, detect_conflicts};
use pl_batch_engine::execution::{Cancellation, ParallelExecutor, RayonWorkerPool};
use pl_batch_engine::proofs::LinearizabilityProver;
use pl_batch_engine::{AccountState, BatchProcessingApi};
use primitive_types::H160;
use std::time::Duration;

const FUNDED: u128 = 1_000_000_000_000;

fn funded(accounts: u64) -> AccountState {
    (0..accounts)
        .map(|i| (H160::from_low_u64_be(i), FUNDED))
        .collect()
}

pub fn bench_analysis(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch-analysis");

    for size in [100usize, 1_000] {
        let txs = random_transfers(7, size, 500);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("graph_conflicts_levels", size), &txs, |b, txs| {
            b.iter(|| {
                let graph = build_dependency_graph(txs).unwrap();
                let conflicts = detect_conflicts(txs, &graph);
                let levels = compute_levels(&graph).unwrap();
                black_box((conflicts.len(), levels.len()))
            })
        });
    }

    group.finish();
}

pub fn bench_linearizability(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch-proof");
    group.measurement_time(Duration::from_secs(10));
    let pool = RayonWorkerPool::new(4).unwrap();
    let prover = LinearizabilityProver::new(Duration::from_secs(30));

    for size in [50usize, 200] {
        let txs = random_transfers(11, size, 100);
        let graph = build_dependency_graph(&txs).unwrap();
        let levels = compute_levels(&graph).unwrap();
        let execution =
            ParallelExecutor::new(&pool).execute(&txs, &levels, funded(100), &Cancellation::never());

        group.throughput(Throughput::Elements(size as u64));
        group.bench_function(BenchmarkId::new("prove", size), |b| {
            b.iter(|| black_box(prover.prove(&txs, &graph, &execution).unwrap().valid))
        });
    }

    group.finish();
}

pub fn bench_end_to_end(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch-end-to-end");
    group.measurement_time(Duration::from_secs(10));
    let runtime = tokio::runtime::Runtime::new().unwrap();

    for size in [100usize, 500] {
        let independent = engine(default_config(), &vec![FUNDED; 2 * size]);
        let txs = independent_transfers(size, 1);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_function(BenchmarkId::new("independent", size), |b| {
            b.iter(|| {
                let result = runtime.block_on(independent.processor.process_batch(txs.clone()));
                assert!(result.success);
                black_box(result.levels)
            })
        });

        let contended = engine(default_config(), &vec![FUNDED; 20]);
        let txs = random_transfers(13, size, 20);
        group.bench_function(BenchmarkId::new("contended", size), |b| {
            b.iter(|| {
                let result = runtime.block_on(contended.processor.process_batch(txs.clone()));
                assert!(result.success);
                black_box(result.levels)
            })
        });
    }

    group.finish();
}
