use std::thread;
use std::time::Instant;

use file_log_sink::env::{env_or, FILE_LOG_DIRECTORY_ENV};
use file_log_sink::groups::GroupOption;
use file_log_sink::{FileLoggerOptions, FileLoggerProvider, LogLevel, LogRecord};

const CATEGORIES: [&str; 4] = [
    "grouped_load::http::client",
    "grouped_load::http::server",
    "grouped_load::db",
    "grouped_load::jobs",
];

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let options = FileLoggerOptions {
        application_name: "grouped_load".to_string(),
        log_file_directory: env_or(FILE_LOG_DIRECTORY_ENV, "logs/{ApplicationName}"),
        // small ceiling so the run exercises rotation
        log_file_max_size_in_kilobytes: 1024,
        group_options: vec![
            GroupOption::new("Http", ["grouped_load::http::*"]),
            GroupOption::new("Db", ["grouped_load::db*"]),
        ],
        ..FileLoggerOptions::default()
    };

    let provider = FileLoggerProvider::builder()
        .buffer_pool(8, 4 * 1024)
        .build(&options)?;

    let producers: u64 = 4;
    let per_producer: u64 = 50_000;
    let start = Instant::now();

    let threads: Vec<_> = (0..producers)
        .map(|p| {
            let sink = provider.handle();
            thread::spawn(move || {
                for i in 0..per_producer {
                    let category = CATEGORIES[(i % CATEGORIES.len() as u64) as usize];
                    let record = LogRecord::new(LogLevel::Warning, category, "grouped load test")
                        .with_extra("producer", p)
                        .with_extra("iteration", i);
                    sink.enqueue(record);
                }
            })
        })
        .collect();
    for t in threads {
        let _ = t.join();
    }

    let n = producers * per_producer;
    let elapsed = start.elapsed();
    println!("grouped config: sent {} records from {} threads in {:?} (~{:.0} rec/s)",
        n,
        producers,
        elapsed,
        n as f64 / elapsed.as_secs_f64()
    );

    let pool = provider.buffer_pool().metrics().snapshot();
    let metrics = provider.shutdown();
    println!("written {} dropped {} in {:?}; buffer pool hits {} misses {}",
        metrics.written,
        metrics.dropped,
        start.elapsed(),
        pool.hits,
        pool.misses
    );
    Ok(())
}
