use chrono::{TimeZone, Utc};
use criterion::{criterion_group, criterion_main, Criterion};
use std::sync::Arc;
use tally::{DailyAggregator, FjallStore, Observation, Period, RollupEngine, Statistics};

fn period_calculus(c: &mut Criterion) {
    let ts = Utc.with_ymd_and_hms(2024, 7, 19, 13, 37, 42).unwrap();

    for period in Period::ALL {
        c.bench_function(&format!("begins at ({period})"), |b| {
            b.iter(|| period.begins_at(ts));
        });

        c.bench_function(&format!("ends at ({period})"), |b| {
            b.iter(|| period.ends_at(ts));
        });
    }
}

fn fold(c: &mut Criterion) {
    c.bench_function("fold single", |b| {
        let dir = tempfile::tempdir().unwrap();
        let keyspace = fjall::Config::new(&dir).open_transactional().unwrap();
        let store = Arc::new(FjallStore::new(&keyspace).unwrap());
        let aggregator = DailyAggregator::new(store, 3);

        let ts = Utc.with_ymd_and_hms(2024, 7, 19, 13, 37, 42).unwrap();
        let observation = Observation::new("alert.type.fire", ts, Some(52.74), 1).unwrap();

        b.iter(|| {
            aggregator.fold(&observation).unwrap();
        });
    });
}

fn submit(c: &mut Criterion) {
    c.bench_function("submit single", |b| {
        let dir = tempfile::tempdir().unwrap();
        let stats = Statistics::new(&dir).unwrap();

        let ts = Utc.with_ymd_and_hms(2024, 7, 19, 13, 37, 42).unwrap();

        b.iter(|| {
            stats.record("alert.type.fire", ts).unwrap();
        });

        stats.flush();
    });
}

fn rollup(c: &mut Criterion) {
    c.bench_function("rollup month (31 days)", |b| {
        let dir = tempfile::tempdir().unwrap();
        let keyspace = fjall::Config::new(&dir).open_transactional().unwrap();
        let store = Arc::new(FjallStore::new(&keyspace).unwrap());

        let aggregator = DailyAggregator::new(store.clone(), 3);
        for d in 1..=31 {
            let ts = Utc.with_ymd_and_hms(2024, 7, d, 12, 0, 0).unwrap();
            let observation = Observation::new("alert.type.fire", ts, None, 3).unwrap();
            aggregator.fold(&observation).unwrap();
        }

        let engine = RollupEngine::new(store, 3);
        let ts = Utc.with_ymd_and_hms(2024, 7, 19, 0, 0, 0).unwrap();

        b.iter(|| {
            engine.rollup("alert.type.fire", Period::Month, ts).unwrap();
        });
    });
}

criterion_group!(benches, period_calculus, fold, submit, rollup);
criterion_main!(benches);
