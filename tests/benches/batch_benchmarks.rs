//! # Parallel-Ledger Batch Benchmarks
//!
//! | Stage | Claim |
//! |-------|-------|
//! | Analysis | graph, conflicts and levels in near-linear time for sparse batches |
//! | Proof | witness search stays linear when every conflict is ordered |
//! | End to end | independent batches run as a single level |

use criterion::{criterion_group, criterion_main};
use pl_tests::benchmarks::batch_engine::{bench_analysis, bench_end_to_end, bench_linearizability};

criterion_group!(benches, bench_analysis, bench_linearizability, bench_end_to_end);

criterion_main!(benches);
