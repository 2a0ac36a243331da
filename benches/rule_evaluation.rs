//! Benchmarks for rule matching and engine evaluation

use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;
use std::time::Duration;
use tx_alert_monitor::blockchain::WatchSet;
use tx_alert_monitor::models::{Severity, Transaction};
use tx_alert_monitor::notify::{DispatchMode, Fanout};
use tx_alert_monitor::rules::{AlertRule, RuleCondition, RuleEngine};

const WATCHED: &str = "0xF977814e90dA44bFA03b6295A0616a897441aceC";

fn create_transaction(i: usize) -> Transaction {
    Transaction {
        hash: format!("0x{:064x}", i),
        from: WATCHED.to_string(),
        to: Some(format!("0x{:040x}", i)),
        value: (i % 50) as f64,
        timestamp: Utc::now(),
        block_number: 50_000_000 + i as u64,
    }
}

fn create_rules(count: usize) -> Vec<AlertRule> {
    (0..count)
        .map(|i| {
            AlertRule::new(format!("rule-{}", i))
                .with_condition(RuleCondition::new("value", ">", (i % 40) as f64))
                .with_condition(RuleCondition::new("from", "==", WATCHED))
                .with_severity(Severity::High)
        })
        .collect()
}

fn benchmark_rule_matching(c: &mut Criterion) {
    let rule = AlertRule::new("big-tx")
        .with_condition(RuleCondition::new("value", ">", 10.0))
        .with_condition(RuleCondition::new("to", "==", "0x1234567890123456789012345678901234567890"));
    let transactions: Vec<Transaction> = (0..1000).map(create_transaction).collect();

    c.bench_function("rule_matches_1k_transactions", |b| {
        b.iter(|| {
            transactions
                .iter()
                .filter(|tx| rule.matches(black_box(tx)))
                .count()
        });
    });
}

fn benchmark_watch_set(c: &mut Criterion) {
    let addresses: Vec<String> = (0..100).map(|i| format!("0x{:040x}", i)).collect();
    let watch = WatchSet::parse(&addresses).unwrap();
    let transactions: Vec<Transaction> = (0..1000).map(create_transaction).collect();

    c.bench_function("watch_set_relevance_1k_transactions", |b| {
        b.iter(|| {
            transactions
                .iter()
                .filter(|tx| watch.is_relevant(black_box(tx)))
                .count()
        });
    });
}

fn benchmark_engine_evaluate(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("engine_evaluate");

    for rule_count in [1usize, 10, 100] {
        // Sinkless fan-out isolates rule evaluation from delivery
        let engine = RuleEngine::with_rules(
            Arc::new(Fanout::new(DispatchMode::Sequential)),
            create_rules(rule_count)
                .into_iter()
                .map(|rule| rule.with_cooldown(Duration::ZERO))
                .collect(),
        )
        .unwrap();
        let transaction = create_transaction(45);

        group.bench_with_input(BenchmarkId::from_parameter(rule_count), &rule_count, |b, _| {
            b.iter(|| runtime.block_on(engine.evaluate(black_box(&transaction))).unwrap().len());
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    benchmark_rule_matching,
    benchmark_watch_set,
    benchmark_engine_evaluate
);
criterion_main!(benches);
