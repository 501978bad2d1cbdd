use std::time::Instant;
use tracing::error;

use file_log_sink::init::{init_tracing_with_config, LayerConfig};
use file_log_sink::{FileLoggerOptions, FileLoggerProvider};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut options = FileLoggerOptions {
        application_name: "default_load".to_string(),
        ..FileLoggerOptions::default()
    };
    options.apply_env()?;

    let provider = FileLoggerProvider::new(&options)?;
    init_tracing_with_config(
        provider.handle(),
        LayerConfig {
            enable_stdout: false,
            ..LayerConfig::default()
        },
    )?;

    let n: u64 = 100_000;
    let start = Instant::now();

    for i in 0..n {
        error!(iteration = i, "default load test error");
    }

    let elapsed = start.elapsed();
    println!("default config: sent {} events in {:?} (~{:.0} ev/s)",
        n,
        elapsed,
        n as f64 / elapsed.as_secs_f64()
    );

    // Blocks until the worker has written everything queued
    let metrics = provider.shutdown();
    let total = start.elapsed();
    println!("written {} records to {} in {:?} (dropped {})",
        metrics.written,
        options.log_file_directory,
        total,
        metrics.dropped
    );
    Ok(())
}
