//! # Batch Scenarios
//!
//! 1. Disjoint accounts run in one level with no conflicts
//! 2. Write then read of the same account gives a RAW edge and two levels
//! 3. Contradicting declared order is rejected with the cycle
//! 4. 100 transfers over 50 accounts conserve total value and prove
//! 5. A minting transaction rolls every account back
//! 6. Proof budget exhaustion falls back to serial execution
//!
//! Plus atomic-batch lowering equivalence and oracle gating.

#[cfg(test)]
mod tests {
    use super::super::fixtures::*;
    use pl_batch_engine::execution::replay_serial;
    use pl_batch_engine::{
        AtomicBatch, AtomicStep, BatchProcessingApi, CommitState, DependencyKind, EngineConfig,
        ErrorCode, ExecutionMode, Operation, ProofStatus, Transaction, TraceEventKind,
    };
    use std::time::Duration;

    fn debit(id: u64, account: u64, amount: u128) -> Transaction {
        Transaction::builder(make_hash(id), "debit")
            .bind("a", make_addr(account))
            .operation(Operation::Debit {
                account: "a".into(),
                amount,
            })
            .build()
    }

    #[tokio::test]
    async fn scenario_1_disjoint_accounts_share_a_level() {
        let e = engine(default_config(), &[50, 0, 50, 0]);
        let txs = vec![
            Transaction::transfer(make_hash(1), make_addr(0), make_addr(1), 20),
            Transaction::transfer(make_hash(2), make_addr(2), make_addr(3), 30),
        ];

        let result = e.processor.process_batch(txs).await;

        assert!(result.success, "{:?}", result.error);
        assert_eq!(result.levels, 1);
        assert!(result.conflicts.is_empty());
        assert_eq!(result.commit_state, CommitState::Committed);
        assert_eq!(e.store.balance(&make_addr(1)).await, 20);
        assert_eq!(e.store.balance(&make_addr(3)).await, 30);
    }

    #[tokio::test]
    async fn scenario_2_write_then_read_orders_by_raw_edge() {
        let e = engine(default_config(), &[10]);
        let txs = vec![
            Transaction::builder(make_hash(1), "deposit")
                .bind("a", make_addr(0))
                .operation(Operation::Credit {
                    account: "a".into(),
                    amount: 5,
                })
                .operation(Operation::Debit {
                    account: "a".into(),
                    amount: 5,
                })
                .build(),
            Transaction::builder(make_hash(2), "audit")
                .bind("a", make_addr(0))
                .operation(Operation::Read {
                    account: "a".into(),
                })
                .build(),
        ];

        let result = e.processor.process_batch(txs).await;

        assert!(result.success, "{:?}", result.error);
        assert_eq!(result.levels, 2);
        assert_eq!(result.conflicts.len(), 1);
        assert_eq!(result.conflicts[0].kind, DependencyKind::ReadAfterWrite);
        assert_eq!(result.conflicts[0].first, make_hash(1));
        assert_eq!(result.conflicts[0].second, make_hash(2));

        let written = result.trace.observed_writes(&make_hash(1))[&make_addr(0)];
        let read = result.trace.observed_reads(&make_hash(2))[&make_addr(0)];
        assert_eq!(read, written);
    }

    #[tokio::test]
    async fn scenario_3_contradicting_order_is_a_cycle() {
        let e = engine(default_config(), &[10]);
        let first = Transaction::builder(make_hash(1), "first")
            .bind("a", make_addr(0))
            .operation(Operation::SetBalance {
                account: "a".into(),
                value: 10,
            })
            .depends_on(make_hash(2))
            .build();
        let second = Transaction::builder(make_hash(2), "second")
            .bind("a", make_addr(0))
            .operation(Operation::SetBalance {
                account: "a".into(),
                value: 10,
            })
            .build();

        let result = e.processor.process_batch(vec![first, second]).await;

        assert!(!result.success);
        assert_eq!(result.error_code, Some(ErrorCode::CircularDependency));
        assert_eq!(result.cycle, Some(vec![make_hash(1), make_hash(2)]));
        assert!(result.trace.events.is_empty());
        assert_eq!(e.store.balance(&make_addr(0)).await, 10);
        assert_eq!(e.sink.outcomes(), vec!["rejected"]);
    }

    #[tokio::test]
    async fn scenario_4_hundred_transfers_conserve_value() {
        let balances = vec![1_000u128; 50];
        let e = engine(default_config(), &balances);
        let before = e.store.total().await;

        let result = e.processor.process_batch(random_transfers(4, 100, 50)).await;

        assert!(result.success, "{:?}", result.error);
        assert_eq!(result.mode, ExecutionMode::Parallel);
        assert_eq!(e.store.total().await, before);

        let proof = result.linearizability.unwrap();
        assert_eq!(proof.status, ProofStatus::Proven);
        assert!(proof.artifact.unwrap().verify_digest());
        assert!(result.conservation.unwrap().valid);
        assert!(result.throughput_improvement >= 1.0);
    }

    #[tokio::test]
    async fn scenario_5_minting_rolls_back_all_accounts() {
        let balances: Vec<u128> = (0..50).map(|i| 100 + i).collect();
        let e = engine(default_config(), &balances);
        let before = e.store.snapshot().await;

        let mut txs = random_transfers(5, 40, 50);
        txs.push(
            Transaction::builder(make_hash(999), "overpay")
                .bind("src", make_addr(3))
                .bind("dst", make_addr(4))
                .operation(Operation::Debit {
                    account: "src".into(),
                    amount: 1,
                })
                .operation(Operation::Credit {
                    account: "dst".into(),
                    amount: 2,
                })
                .build(),
        );

        let result = e.processor.process_batch(txs).await;

        assert!(!result.success);
        assert_eq!(result.error_code, Some(ErrorCode::ConservationViolation));
        assert_eq!(result.offending_tx, Some(make_hash(999)));
        assert_eq!(result.commit_state, CommitState::RolledBack);
        assert_eq!(e.store.snapshot().await, before);
        assert!(result
            .trace
            .events
            .iter()
            .any(|ev| ev.kind == TraceEventKind::Rollback));
    }

    #[tokio::test]
    async fn scenario_6_budget_exhaustion_falls_back_to_serial() {
        let config = EngineConfig {
            worker_count: 4,
            proof_budget: Duration::ZERO,
            ..Default::default()
        };
        let balances = vec![100u128; 20];
        let e = engine(config, &balances);
        let initial = e.store.snapshot().await;
        let txs = random_transfers(6, 30, 20);

        let result = e.processor.process_batch(txs.clone()).await;

        assert!(result.success, "{:?}", result.error);
        assert!(result.used_serial_fallback());
        assert_eq!(result.throughput_improvement, 1.0);

        let order = result.linearizability.unwrap().serial_order.unwrap();
        let serial = replay_serial(&txs, &order, &initial).unwrap();
        assert_eq!(e.store.snapshot().await, serial);
        assert_eq!(e.sink.outcomes(), vec!["serial_fallback"]);
    }

    #[tokio::test]
    async fn test_failed_transaction_rolls_back_committed_levels() {
        let e = engine(default_config(), &[10, 0]);
        let txs = vec![
            Transaction::transfer(make_hash(1), make_addr(0), make_addr(1), 10),
            debit(2, 1, 11),
        ];

        let result = e.processor.process_batch(txs).await;

        assert_eq!(result.error_code, Some(ErrorCode::TransactionFailed));
        assert_eq!(result.offending_tx, Some(make_hash(2)));
        assert_eq!(e.store.balance(&make_addr(0)).await, 10);
        assert_eq!(e.store.balance(&make_addr(1)).await, 0);
    }

    #[tokio::test]
    async fn test_atomic_batch_matches_lowered_transactions() {
        let batch = AtomicBatch::new("payroll")
            .bind("treasury", make_addr(0))
            .bind("alice", make_addr(1))
            .bind("bob", make_addr(2))
            .step(AtomicStep::new("alice").operation(Operation::Transfer {
                from: "treasury".into(),
                to: "alice".into(),
                amount: 300,
            }))
            .step(AtomicStep::new("bob").operation(Operation::Transfer {
                from: "treasury".into(),
                to: "bob".into(),
                amount: 200,
            }))
            .oracle_proof(attested("EUR/USD=1.08"));

        let via_batch = engine(default_config(), &[1_000]);
        let atomic = via_batch.processor.process_atomic_batch(batch.clone()).await;

        let via_list = engine(default_config(), &[1_000]);
        let listed = via_list
            .processor
            .process_batch(batch.lower().unwrap())
            .await;

        assert!(atomic.success && listed.success);
        assert_eq!(atomic.levels, listed.levels);
        assert_eq!(atomic.conflicts, listed.conflicts);
        assert_eq!(atomic.final_state, listed.final_state);
        assert_eq!(via_batch.store.snapshot().await, via_list.store.snapshot().await);
    }

    #[tokio::test]
    async fn test_forged_attestation_blocks_whole_batch() {
        let e = engine(default_config(), &[100, 100]);
        let mut forged = attested("EUR/USD=1.08");
        forged.claim = "EUR/USD=9.99".into();
        let txs = vec![
            Transaction::transfer(make_hash(1), make_addr(0), make_addr(2), 10),
            Transaction::builder(make_hash(2), "fx")
                .bind("a", make_addr(1))
                .bind("b", make_addr(3))
                .operation(Operation::Transfer {
                    from: "a".into(),
                    to: "b".into(),
                    amount: 10,
                })
                .oracle_proof(forged)
                .build(),
        ];

        let result = e.processor.process_batch(txs).await;

        assert_eq!(result.error_code, Some(ErrorCode::OracleValidation));
        assert_eq!(result.offending_tx, Some(make_hash(2)));
        assert_eq!(e.store.balance(&make_addr(2)).await, 0);
    }

    #[tokio::test]
    async fn test_concurrent_batches_on_disjoint_accounts() {
        let e = engine(default_config(), &[10u128; 8]);
        let left = vec![Transaction::transfer(make_hash(1), make_addr(0), make_addr(1), 5)];
        let right = vec![Transaction::transfer(make_hash(2), make_addr(4), make_addr(5), 5)];

        let (a, b) = tokio::join!(
            e.processor.process_batch(left),
            e.processor.process_batch(right)
        );

        assert!(a.success && b.success);
        assert_ne!(a.batch_id, b.batch_id);
        assert_eq!(e.store.total().await, Some(80));
    }

    #[tokio::test]
    async fn test_largest_disjoint_batch_is_proven_in_parallel() {
        let config = default_config();
        let count = config.max_batch_size;
        let e = engine(config, &vec![1u128; 2 * count]);

        let result = e.processor.process_batch(independent_transfers(count, 1)).await;

        assert!(result.success, "{:?}", result.error);
        assert_eq!(result.mode, ExecutionMode::Parallel);
        assert_eq!(result.levels, 1);
        let proof = result.linearizability.unwrap();
        assert_eq!(proof.status, ProofStatus::Proven);
        assert_eq!(proof.serial_order.unwrap().len(), count);
    }

    #[tokio::test]
    async fn test_hot_account_batch_commits_serially_ordered() {
        let e = engine(default_config(), &[1_000u128; 2]);
        let txs: Vec<_> = (0..1_000u64)
            .map(|i| Transaction::transfer(make_hash(i + 1), make_addr(0), make_addr(1), 1))
            .collect();

        let result = e.processor.process_batch(txs).await;

        assert!(result.success, "{:?}", result.error);
        assert_eq!(result.mode, ExecutionMode::Parallel);
        assert_eq!(result.levels, 1_000);
        assert_eq!(result.conflicts.len(), 1_000 * 999 / 2);
        assert_eq!(e.store.balance(&make_addr(1)).await, 2_000);
    }
}
