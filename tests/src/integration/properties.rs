//! # Batch Properties
//!
//! Randomized checks of the processor end to end: conflict classification,
//! acyclicity, atomicity, conservation, witness replay and determinism.

#[cfg(test)]
mod tests {
    use super::super::fixtures::*;
    use pl_batch_engine::execution::replay_serial;
    use pl_batch_engine::{
        AccountState, BatchProcessingApi, BatchResult, CommitState, ErrorCode, Operation, Transaction,
    };
    use proptest::prelude::*;
    use std::collections::HashMap;

    const ACCOUNTS: u64 = 6;

    /// `(from, to, amount, declared dependency index)`
    type Spec = (u64, u64, u128, Option<usize>);

    fn spec_strategy() -> impl Strategy<Value = Vec<Spec>> {
        prop::collection::vec(
            (
                0..ACCOUNTS,
                0..ACCOUNTS,
                0u128..40,
                prop::option::weighted(0.2, 0usize..12),
            ),
            1..12,
        )
    }

    fn balances_strategy() -> impl Strategy<Value = Vec<u128>> {
        prop::collection::vec(0u128..60, ACCOUNTS as usize)
    }

    fn build(specs: &[Spec], declared: bool) -> Vec<Transaction> {
        specs
            .iter()
            .enumerate()
            .map(|(i, (from, to, amount, dep))| {
                let mut builder = Transaction::builder(make_hash(i as u64 + 1), "transfer")
                    .bind("from", make_addr(*from))
                    .bind("to", make_addr(*to))
                    .operation(Operation::Transfer {
                        from: "from".into(),
                        to: "to".into(),
                        amount: *amount,
                    });
                if declared {
                    if let Some(d) = dep.map(|d| d % specs.len()).filter(|d| *d != i) {
                        builder = builder.depends_on(make_hash(d as u64 + 1));
                    }
                }
                builder.build()
            })
            .collect()
    }

    fn run(balances: &[u128], txs: Vec<Transaction>) -> (Engine, BatchResult) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let e = engine(default_config(), balances);
        let result = runtime.block_on(e.processor.process_batch(txs));
        (e, result)
    }

    fn snapshot(e: &Engine) -> AccountState {
        tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap()
            .block_on(e.store.snapshot())
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(48))]

        #[test]
        fn prop_reported_conflicts_match_access_sets(specs in spec_strategy(), balances in balances_strategy()) {
            let txs = build(&specs, false);
            let (_, result) = run(&balances, txs.clone());

            let mut expected = 0;
            for i in 0..txs.len() {
                for j in (i + 1)..txs.len() {
                    let kind = txs[i].access_sets().conflict_with_later(txs[j].access_sets());
                    let found: Vec<_> = result
                        .conflicts
                        .iter()
                        .filter(|c| c.first == txs[i].id() && c.second == txs[j].id())
                        .collect();
                    match kind {
                        None => prop_assert!(found.is_empty()),
                        Some((kind, account)) => {
                            expected += 1;
                            prop_assert_eq!(found.len(), 1);
                            prop_assert_eq!(found[0].kind, kind);
                            prop_assert_eq!(found[0].account, account);
                        }
                    }
                }
            }
            prop_assert_eq!(result.conflicts.len(), expected);
        }

        #[test]
        fn prop_declared_order_is_acyclic_or_rejected(specs in spec_strategy(), balances in balances_strategy()) {
            let txs = build(&specs, true);
            let before = balances.clone();
            let (e, result) = run(&balances, txs.clone());

            if result.error_code == Some(ErrorCode::CircularDependency) {
                let cycle = result.cycle.clone().unwrap();
                prop_assert!(!cycle.is_empty());
                prop_assert!(result.trace.events.is_empty());
                let store = snapshot(&e);
                for (i, value) in before.iter().enumerate() {
                    prop_assert_eq!(store[&make_addr(i as u64)], *value);
                }
                return Ok(());
            }

            if result.independent_sets.is_empty() {
                return Ok(());
            }
            let level_of: HashMap<_, _> = result
                .independent_sets
                .iter()
                .enumerate()
                .flat_map(|(level, ids)| ids.iter().map(move |id| (*id, level)))
                .collect();
            prop_assert_eq!(level_of.len(), txs.len());
            for tx in &txs {
                for dep in tx.depends_on() {
                    prop_assert!(level_of[dep] < level_of[&tx.id()]);
                }
            }
            for conflict in &result.conflicts {
                prop_assert!(level_of[&conflict.first] < level_of[&conflict.second]);
            }
        }

        #[test]
        fn prop_disjoint_batch_is_one_level(count in 1usize..24) {
            let balances = vec![5u128; 2 * count];
            let (_, result) = run(&balances, independent_transfers(count, 5));

            prop_assert!(result.success);
            prop_assert_eq!(result.levels, 1);
            prop_assert_eq!(result.independent_sets[0].len(), count);
            prop_assert!(result.conflicts.is_empty());
        }

        #[test]
        fn prop_store_is_untouched_or_matches_witness(specs in spec_strategy(), balances in balances_strategy()) {
            let txs = build(&specs, false);
            let initial: AccountState = balances
                .iter()
                .enumerate()
                .map(|(i, v)| (make_addr(i as u64), *v))
                .collect();
            let (e, result) = run(&balances, txs.clone());
            let store = snapshot(&e);

            if result.success {
                prop_assert_eq!(result.commit_state, CommitState::Committed);
                let order = result
                    .linearizability
                    .as_ref()
                    .and_then(|p| p.serial_order.clone())
                    .unwrap();
                let replayed = replay_serial(&txs, &order, &initial).unwrap();
                prop_assert_eq!(&store, &replayed);
                for (account, value) in &result.final_state {
                    prop_assert_eq!(replayed[account], *value);
                }
            } else {
                prop_assert_eq!(result.commit_state, CommitState::RolledBack);
                prop_assert_eq!(&store, &initial);
            }
        }

        #[test]
        fn prop_total_value_is_preserved(specs in spec_strategy(), balances in balances_strategy()) {
            let before: u128 = balances.iter().sum();
            let (e, result) = run(&balances, build(&specs, false));

            prop_assert_eq!(total(&snapshot(&e)), before);
            if result.success {
                prop_assert!(result.conservation.unwrap().valid);
            }
        }

        #[test]
        fn prop_analysis_is_byte_identical_across_runs(specs in spec_strategy(), balances in balances_strategy()) {
            let txs = build(&specs, true);
            let (_, first) = run(&balances, txs.clone());
            let (_, second) = run(&balances, txs);

            prop_assert_eq!(
                serde_json::to_vec(&first.conflicts).unwrap(),
                serde_json::to_vec(&second.conflicts).unwrap()
            );
            prop_assert_eq!(first.independent_sets, second.independent_sets);
            prop_assert_eq!(first.error_code, second.error_code);
            prop_assert_eq!(first.cycle, second.cycle);
        }
    }

    #[tokio::test]
    async fn test_resubmitted_cycle_gives_same_diagnostic() {
        let e = engine(default_config(), &[10, 10, 10]);
        let transfer = |id: u64, from: u64, to: u64| {
            Transaction::builder(make_hash(id), "transfer")
                .bind("a", make_addr(from))
                .bind("b", make_addr(to))
                .operation(Operation::Transfer {
                    from: "a".into(),
                    to: "b".into(),
                    amount: 1,
                })
        };
        let batch = vec![
            transfer(1, 0, 1).depends_on(make_hash(3)).build(),
            transfer(2, 1, 2).build(),
            transfer(3, 2, 0).build(),
        ];

        let first = e.processor.process_batch(batch.clone()).await;
        let second = e.processor.process_batch(batch).await;

        assert_eq!(first.error_code, Some(ErrorCode::CircularDependency));
        assert_eq!(first.cycle, second.cycle);
        assert_eq!(first.error, second.error);
        assert_ne!(first.batch_id, second.batch_id);
        assert_eq!(e.store.total().await, Some(30));
        assert_eq!(e.sink.outcomes(), vec!["rejected", "rejected"]);
    }
}
