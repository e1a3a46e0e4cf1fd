use chrono::{DateTime, Datelike, Days, TimeZone, Utc};
use rand::Rng;
use std::path::Path;
use std::time::Instant;
use tally::{Period, Statistics};

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

const ALERT_TYPES: [&str; 4] = ["accident", "fire", "fall", "panic"];

fn main() -> tally::Result<()> {
    env_logger::builder()
        .filter_module("lsm_tree", log::LevelFilter::Warn)
        .filter_module("fjall", log::LevelFilter::Info)
        .filter_module("tally", log::LevelFilter::Debug)
        .parse_default_env()
        .init();

    let path = Path::new(".statsy");

    if path.try_exists()? {
        std::fs::remove_dir_all(path)?;
    }

    let stats = Statistics::builder().workers(4).open(path)?;

    let mut rng = rand::thread_rng();

    let first_day = Utc
        .with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
        .single()
        .ok_or(tally::Error::InvalidArgument("invalid start date"))?;

    let start = Instant::now();
    let mut submitted = 0;

    // Simulate 100 days of alerts, closing each day at midnight like a daily timer would
    let mut day = first_day;

    for _ in 0..100 {
        for _ in 0..rng.gen_range(50..150) {
            let alert_type = ALERT_TYPES[rng.gen_range(0..ALERT_TYPES.len())];
            let ts = day + chrono::Duration::seconds(rng.gen_range(0..86_400));

            stats.record(&format!("alert.type.{alert_type}"), ts)?;
            stats.record_value("alert.response_secs", ts, rng.gen_range(30.0..900.0))?;
            submitted += 2;
        }

        let today = day + Days::new(1);

        // Injured persons are counted elsewhere, only the daily total is reported
        let injured = rng.gen_range(0..10);
        stats.flush();
        stats.end_of_day(today, [("affected.type.injured", injured)])?;

        let summary = stats.sweep(today)?;
        if summary.rolled_up > 0 {
            log::info!("{}: {summary:?}", day.date_naive());
        }

        day = today;
    }

    log::info!("ingested {submitted} observations in {:?}", start.elapsed());

    for name in stats.list_names("alert.")? {
        print_months(&stats, &name, first_day, day)?;
    }
    print_months(&stats, "affected.type.injured", first_day, day)?;

    stats.shutdown();

    Ok(())
}

fn print_months(
    stats: &Statistics,
    name: &str,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> tally::Result<()> {
    println!("{name}");

    for (start, bucket) in stats.query(name, Period::Month, from, to)? {
        match bucket.mean() {
            Some(mean) => println!(
                "  {}-{:02}: {:>6} samples, mean {mean:.1}",
                start.year(),
                start.month(),
                bucket.count
            ),
            None => println!(
                "  {}-{:02}: {:>6} samples",
                start.year(),
                start.month(),
                bucket.count
            ),
        }
    }

    Ok(())
}
