use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{Days, NaiveDate};
use tokio_postgres::{Config, NoTls};
use ulid::Ulid;

const ROOMS: usize = 10;
const ALL_WEEK: &str = r#"[{"days":["Sun","Mon","Tue","Wed","Thu","Fri","Sat"],"start":"00:00","end":"23:59"}]"#;

struct Target {
    host: String,
    port: u16,
    user: String,
    password: String,
}

async fn connect(target: &Target) -> tokio_postgres::Client {
    let mut config = Config::new();
    config
        .host(&target.host)
        .port(target.port)
        .dbname("roombook")
        .user(&target.user)
        .password(&target.password);

    let (client, conn) = config.connect(NoTls).await.expect("connect failed");
    tokio::spawn(async move {
        if let Err(e) = conn.await {
            eprintln!("connection error: {e}");
        }
    });
    client
}

fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let idx = ((sorted.len() as f64) * p / 100.0) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn print_latency(label: &str, latencies: &mut [Duration]) {
    if latencies.is_empty() {
        println!("  {label}: no samples");
        return;
    }
    latencies.sort();
    let total: Duration = latencies.iter().sum();
    let avg = total / latencies.len() as u32;
    println!("  {label}:");
    println!(
        "    n={}, avg={:.2}ms, p50={:.2}ms, p95={:.2}ms, p99={:.2}ms, max={:.2}ms",
        latencies.len(),
        avg.as_secs_f64() * 1000.0,
        percentile(latencies, 50.0).as_secs_f64() * 1000.0,
        percentile(latencies, 95.0).as_secs_f64() * 1000.0,
        percentile(latencies, 99.0).as_secs_f64() * 1000.0,
        latencies[latencies.len() - 1].as_secs_f64() * 1000.0,
    );
}

fn day(offset: u64) -> NaiveDate {
    let base = NaiveDate::from_ymd_opt(2030, 1, 7).unwrap_or_default();
    base.checked_add_days(Days::new(offset)).unwrap_or(base)
}

fn book_sql(bid: Ulid, room: usize, date: NaiveDate, hour: u32) -> String {
    format!(
        r#"INSERT INTO bookings (id, building_id, room, date, start, "end") VALUES ('{}', '{bid}', 'R-{room}', '{date}', '{hour:02}:00', '{:02}:00')"#,
        Ulid::new(),
        hour + 1
    )
}

/// One building with `ROOMS` rooms open around the clock.
async fn setup(target: &Target) -> Ulid {
    let client = connect(target).await;
    let bid = Ulid::new();
    client
        .batch_execute(&format!(
            "INSERT INTO buildings (id, name) VALUES ('{bid}', 'Bench {bid}')"
        ))
        .await
        .unwrap();
    for r in 0..ROOMS {
        client
            .batch_execute(&format!(
                "INSERT INTO rooms (building_id, name, seats, schedule) VALUES ('{bid}', 'R-{r}', 20, '{ALL_WEEK}')"
            ))
            .await
            .unwrap();
    }
    println!("  created building {bid} with {ROOMS} rooms");
    bid
}

async fn phase1_sequential(target: &Target, bid: Ulid) {
    let client = connect(target).await;
    let n = 2000u64;
    let mut latencies = Vec::with_capacity(n as usize);
    let start = Instant::now();

    for i in 0..n {
        let sql = book_sql(bid, 0, day(i / 20), (i % 20) as u32);
        let t = Instant::now();
        client.batch_execute(&sql).await.unwrap();
        latencies.push(t.elapsed());
    }

    let elapsed = start.elapsed();
    let ops = n as f64 / elapsed.as_secs_f64();
    println!("  {n} bookings in {:.2}s = {ops:.0} ops/sec", elapsed.as_secs_f64());
    print_latency("write latency", &mut latencies);
}

/// Many sessions race for the same slots; each slot must be won exactly once.
async fn phase2_contention(target: &Target, bid: Ulid) {
    let n_tasks = 20;
    let slots = 50u32;
    let confirmed = Arc::new(AtomicUsize::new(0));
    let rejected = Arc::new(AtomicUsize::new(0));

    let start = Instant::now();
    let mut handles = Vec::new();
    for _ in 0..n_tasks {
        let client = connect(target).await;
        let confirmed = confirmed.clone();
        let rejected = rejected.clone();
        handles.push(tokio::spawn(async move {
            for s in 0..slots {
                let sql = book_sql(bid, 1, day(1000 + u64::from(s / 20)), s % 20);
                match client.batch_execute(&sql).await {
                    Ok(()) => confirmed.fetch_add(1, Ordering::Relaxed),
                    Err(_) => rejected.fetch_add(1, Ordering::Relaxed),
                };
            }
        }));
    }
    for h in handles {
        h.await.unwrap();
    }

    let elapsed = start.elapsed();
    let won = confirmed.load(Ordering::Relaxed);
    let lost = rejected.load(Ordering::Relaxed);
    println!(
        "  {n_tasks} sessions x {slots} slots: {won} confirmed, {lost} rejected in {:.2}s",
        elapsed.as_secs_f64()
    );
    if won != slots as usize {
        println!("  !! expected exactly {slots} confirmations");
    }
}

async fn phase3_read_under_load(target: &Target, bid: Ulid) {
    let stop = Arc::new(AtomicBool::new(false));
    let mut writer_handles = Vec::new();
    for w in 0..5usize {
        let client = connect(target).await;
        let stop = stop.clone();
        writer_handles.push(tokio::spawn(async move {
            let mut i = 0u64;
            while !stop.load(Ordering::Relaxed) {
                let sql = book_sql(bid, 2 + w, day(2000 + i / 20), (i % 20) as u32);
                let _ = client.batch_execute(&sql).await;
                i += 1;
            }
        }));
    }

    let n_readers = 10;
    let reads_per_reader = 500;
    let mut reader_handles = Vec::new();
    for r in 0..n_readers {
        let client = connect(target).await;
        reader_handles.push(tokio::spawn(async move {
            let mut latencies = Vec::with_capacity(reads_per_reader);
            for i in 0..reads_per_reader {
                let date = day(2000 + ((r * reads_per_reader + i) % 30) as u64);
                let t = Instant::now();
                client
                    .batch_execute(&format!(
                        r#"SELECT * FROM available_rooms WHERE building_id = '{bid}' AND date = '{date}' AND start = '10:00' AND "end" = '11:00'"#
                    ))
                    .await
                    .unwrap();
                latencies.push(t.elapsed());
            }
            latencies
        }));
    }

    let mut all_latencies = Vec::new();
    for h in reader_handles {
        all_latencies.extend(h.await.unwrap());
    }

    stop.store(true, Ordering::Relaxed);
    for h in writer_handles {
        let _ = h.await;
    }

    print_latency("available_rooms query", &mut all_latencies);
}

#[tokio::main]
async fn main() {
    let target = Target {
        host: std::env::var("ROOMBOOK_HOST").unwrap_or_else(|_| "127.0.0.1".into()),
        port: std::env::var("ROOMBOOK_PORT")
            .unwrap_or_else(|_| "5433".into())
            .parse()
            .expect("invalid ROOMBOOK_PORT"),
        user: std::env::var("ROOMBOOK_ADMIN_EMAIL").expect("ROOMBOOK_ADMIN_EMAIL must name the server's admin"),
        password: std::env::var("ROOMBOOK_ADMIN_PASSWORD").expect("ROOMBOOK_ADMIN_PASSWORD must be the admin's password"),
    };

    println!("=== roombook stress benchmark ===");
    println!("target: {}:{}\n", target.host, target.port);

    println!("[setup]");
    let bid = setup(&target).await;

    println!("\n[phase 1] sequential booking throughput");
    phase1_sequential(&target, bid).await;

    println!("\n[phase 2] contention on shared slots");
    phase2_contention(&target, bid).await;

    println!("\n[phase 3] read latency under write load");
    phase3_read_under_load(&target, bid).await;

    println!("\n=== done ===");
}
