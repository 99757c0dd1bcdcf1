//! End-to-end integration tests for the ebb chain state.
//!
//! Each test boots a chain engine at genesis, feeds it whole blocks, and
//! verifies the complete lifecycle from the outside: linear growth, spend
//! tracking through the status cache, out-of-order delivery, a deep chain
//! switch with forks on both sides of the branch point, and the full
//! double-spend diagnostic surface.
//!
//! Coinbase maturity runs at its production value throughout, so every
//! scenario carries a long coinbase prefix before any output is spent.

use ebb_chain::{ChainConfig, RejectReason, SpendConflict, SubmitOutcome};
use ebb_core::constants::COINBASE_MATURITY;
use ebb_core::genesis;
use ebb_core::types::*;
use ebb_core::utxo::SpendStatus;
use ebb_tests::helpers::*;

// ======================================================================
// E2E Test 1: Linear growth and spend tracking
// Grow past coinbase maturity, spend one coinbase output, and verify the
// tip, the UTXO census, and the spend status of every probe point.
// ======================================================================

#[test]
fn e2e_linear_growth_and_spend_tracking() {
    let mut engine = test_engine(ChainConfig::default());
    assert_eq!(engine.config().coinbase_maturity, COINBASE_MATURITY);

    let prefix = grow(&mut engine, genesis::genesis_hash(), 1, 120, 0);
    assert_eq!(engine.active_tip_height(), 120);
    assert_eq!(engine.utxo_count(), 121, "genesis coinbase plus 120 mined");

    // Spend the oldest coinbase, now well past maturity.
    let (tip_hash, spent_op) = (prefix[119].0, prefix[0].1);
    let spend = make_spend(&[spent_op]);
    let change_op = outpoint_of(&spend);
    let block = make_block(tip_hash, vec![make_coinbase(121, 0), spend]);

    assert_eq!(engine.submit_block(block).unwrap(), SubmitOutcome::Accepted);
    assert_eq!(engine.active_tip_height(), 121);
    assert_eq!(engine.utxo_count(), 122);
    assert_eq!(engine.utxo_generation(), 122, "one apply per connected block");

    assert!(engine.is_output_spent(&spent_op));
    assert_eq!(
        engine.spend_status(&spent_op),
        SpendStatus::Spent {
            spent_height: 121,
            created_height: 1
        }
    );
    assert_eq!(
        engine.spend_status(&change_op),
        SpendStatus::Unspent { created_height: 121 }
    );
    assert!(engine.cache_stats().lookups() > 0);
}

// ======================================================================
// E2E Test 2: Out-of-order delivery
// Deliver a 30-block chain in reverse. Everything pools as orphans until
// the first block lands, then the whole chain connects in one cascade.
// ======================================================================

#[test]
fn e2e_out_of_order_delivery() {
    let mut engine = test_engine(ChainConfig::default());

    let mut blocks = Vec::new();
    let mut prev = genesis::genesis_hash();
    for height in 1..=30 {
        let block = make_block(prev, vec![make_coinbase(height, 0)]);
        prev = block.header.hash();
        blocks.push(block);
    }
    let tip = prev;

    for block in blocks.iter().skip(1).rev() {
        assert_eq!(
            engine.submit_block(block.clone()).unwrap(),
            SubmitOutcome::Orphaned
        );
    }
    assert_eq!(engine.orphan_count(), 29);
    assert_eq!(engine.active_tip_height(), 0, "nothing connects without the root");

    assert_eq!(
        engine.submit_block(blocks[0].clone()).unwrap(),
        SubmitOutcome::Accepted
    );
    assert_eq!(engine.orphan_count(), 0);
    assert_eq!(engine.active_tip_hash(), tip);
    assert_eq!(engine.active_tip_height(), 30);
    assert_eq!(engine.utxo_count(), 31);
}

// ======================================================================
// E2E Test 3: Full fork lifecycle
// One long main chain with spends, a losing fork with its own spends, a
// winning fork that respends an output the abandoned segment had spent,
// and finally a battery of double-spend probes against the losing fork
// exercising every conflict classification.
// ======================================================================

#[test]
fn e2e_full_fork_lifecycle() {
    let mut engine = test_engine(ChainConfig::default());

    // Long coinbase prefix so heights 400+ may spend any of the six
    // earliest coinbase outputs.
    let prefix = grow(&mut engine, genesis::genesis_hash(), 1, 399, 0);
    let spare: Vec<OutPoint> = prefix[..6].iter().map(|(_, op)| *op).collect();
    let (a, b, c, d, e, f) = (spare[0], spare[1], spare[2], spare[3], spare[4], spare[5]);

    // Main chain M1..M50 at heights 400..=449, spending A, B, and C.
    let mut main = Vec::new();
    let mut prev = prefix[398].0;
    for i in 0..50u64 {
        let height = 400 + i;
        let mut txs = vec![make_coinbase(height, 1)];
        match i {
            2 => txs.push(make_spend(&[a])),
            11 => txs.push(make_spend(&[b])),
            13 => txs.push(make_spend(&[c])),
            _ => {}
        }
        let block = make_block(prev, txs);
        prev = block.header.hash();
        assert_eq!(engine.submit_block(block).unwrap(), SubmitOutcome::Accepted);
        main.push(prev);
    }
    assert_eq!(engine.active_tip_hash(), main[49]);
    assert_eq!(engine.active_tip_height(), 449);
    assert!(engine.is_output_spent(&a));
    assert!(engine.is_output_spent(&b));
    assert!(engine.is_output_spent(&c));

    // A losing fork F1..F10 off M15, spending D and E on its own branch.
    // Screening accepts the spends (both outputs predate the branch point)
    // but the branch never outweighs the main chain.
    let mut losing = Vec::new();
    let mut prev = main[14];
    for i in 0..10u64 {
        let height = 415 + i;
        let mut txs = vec![make_coinbase(height, 2)];
        match i {
            1 => txs.push(make_spend(&[d])),
            4 => txs.push(make_spend(&[e])),
            _ => {}
        }
        let block = make_block(prev, txs);
        prev = block.header.hash();
        assert_eq!(
            engine.submit_block(block).unwrap(),
            SubmitOutcome::StoredInactive
        );
        losing.push(prev);
    }
    assert_eq!(engine.active_tip_hash(), main[49], "lighter fork never activates");
    assert!(!engine.is_output_spent(&d), "inactive branch spends are invisible");
    assert!(!engine.is_output_spent(&e));

    // A winning fork N1..N60 off M10. N5 respends B: the active chain
    // spent it at height 411, past this fork's branch point at 409, so
    // the branch is free to spend it itself.
    let mut winning = Vec::new();
    let mut prev = main[9];
    for i in 0..60u64 {
        let height = 410 + i;
        let mut txs = vec![make_coinbase(height, 3)];
        if i == 4 {
            txs.push(make_spend(&[b]));
        }
        let block = make_block(prev, txs);
        prev = block.header.hash();
        let outcome = engine.submit_block(block).unwrap();
        match i {
            // Strictly lighter than the main chain.
            0..=38 => assert_eq!(outcome, SubmitOutcome::StoredInactive),
            // Equal weight; either side of the tie is a valid resolution.
            39 => {}
            _ => assert_eq!(outcome, SubmitOutcome::Accepted),
        }
        winning.push(prev);
    }
    assert_eq!(engine.active_tip_hash(), winning[59]);
    assert_eq!(engine.active_tip_height(), 469);

    // The switch rewound M11..M50 and replayed the winning branch: A's
    // spend (M3) survives, C's spend (M14) is forgotten, and B is now
    // spent by N5 instead of M12.
    assert_eq!(
        engine.spend_status(&a),
        SpendStatus::Spent {
            spent_height: 402,
            created_height: 1
        }
    );
    assert_eq!(
        engine.spend_status(&b),
        SpendStatus::Spent {
            spent_height: 414,
            created_height: 2
        }
    );
    assert_eq!(
        engine.spend_status(&c),
        SpendStatus::Unspent { created_height: 3 }
    );
    assert!(!engine.is_output_spent(&d));
    assert!(!engine.is_output_spent(&e));

    // Double-spend probes extending the losing fork. Its branch point
    // relative to the new active chain is M10, so the replayed branch
    // context covers M11..M15 and F1..F10.
    let probes = [
        (a, SpendConflict::BeforeBranchPoint),
        (b, SpendConflict::WithinBranch),
        (c, SpendConflict::WithinBranch),
        (d, SpendConflict::WithinBranch),
        (e, SpendConflict::WithinBranch),
    ];
    for (i, (op, expected)) in probes.iter().enumerate() {
        let tag = 10 + i as u8;
        let block = make_block(losing[9], vec![make_coinbase(425, tag), make_spend(&[*op])]);
        let hash = block.header.hash();
        let outcome = engine.submit_block(block.clone()).unwrap();
        let SubmitOutcome::Rejected(rejection) = outcome else {
            panic!("probe {i} not rejected: {outcome:?}");
        };
        assert_eq!(rejection.block_hash, hash);
        let RejectReason::DoubleSpend(ds) = rejection.reason else {
            panic!("probe {i} rejected for the wrong reason: {}", rejection.reason);
        };
        assert_eq!(ds.outpoint, *op, "probe {i}");
        assert_eq!(ds.conflict, *expected, "probe {i}");

        assert_eq!(engine.active_tip_hash(), winning[59], "rejection must not move the tip");
        assert_eq!(
            engine.submit_block(block).unwrap(),
            SubmitOutcome::Duplicate,
            "rejected blocks stay known"
        );
    }

    // Two competing spenders of F inside one block.
    let spend_f = make_spend(&[f]);
    let rival_f = {
        let mut tx = make_spend(&[f]);
        tx.inputs[0].witness = vec![1; 64];
        tx
    };
    let block = make_block(losing[9], vec![make_coinbase(425, 15), spend_f, rival_f]);
    let outcome = engine.submit_block(block).unwrap();
    let SubmitOutcome::Rejected(rejection) = outcome else {
        panic!("same-block conflict not rejected: {outcome:?}");
    };
    let RejectReason::DoubleSpend(ds) = rejection.reason else {
        panic!("same-block conflict rejected for the wrong reason: {}", rejection.reason);
    };
    assert_eq!(ds.outpoint, f);
    assert_eq!(ds.conflict, SpendConflict::SameBlock);
    assert_eq!(engine.active_tip_hash(), winning[59]);

    // The tree retains every branch; only the probes are invalid.
    assert_eq!(engine.block_count(), 1 + 399 + 50 + 10 + 60 + 6);
    assert!(!engine.needs_rebuild());
}

// ======================================================================
// E2E Test 4: Runtime cache bypass adjustment
// Raise the bypass percentage mid-run and verify queries shift from the
// cached path to the authoritative path without changing any answer.
// ======================================================================

#[test]
fn e2e_runtime_bypass_adjustment() {
    use std::sync::Arc;

    use ebb_chain::ChainEngine;
    use ebb_core::traits::{AcceptAll, UniformWeight};

    // Bypass exactly when the configured percentage is 100, so the toggle
    // below is fully deterministic.
    let mut engine = ChainEngine::new(
        ChainConfig::default(),
        Arc::new(AcceptAll),
        Arc::new(UniformWeight),
    )
    .unwrap()
    .with_bypass_decider(|percent| percent == 100);

    let chain = grow(&mut engine, genesis::genesis_hash(), 1, 3, 0);
    let op = chain[0].1;

    let cached_answer = engine.spend_status(&op);
    engine.spend_status(&op);
    let stats = engine.cache_stats();
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.bypasses, 0);

    engine.set_cache_bypass_percent(100).unwrap();
    let bypass_answer = engine.spend_status(&op);
    assert_eq!(engine.cache_stats().bypasses, 1);
    assert_eq!(cached_answer, bypass_answer, "both paths serve the same truth");

    engine.set_cache_bypass_percent(0).unwrap();
    engine.spend_status(&op);
    assert_eq!(engine.cache_stats().hits, 2, "cached path resumes");

    assert!(engine.set_cache_bypass_percent(101).is_err());
    assert_eq!(engine.config().cache_bypass_percent, 0);
}
