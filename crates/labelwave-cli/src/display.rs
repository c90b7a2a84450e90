//! Terminal output: run header, per-wave progress line, final summary.
//!
//! Logs go to stderr through `tracing`; the summary goes to stdout.

use std::io::Write;
use std::path::Path;

use labelwave_pipeline::{RunOptions, RunSummary, WaveProgress};

pub fn print_header(db: &Path, table: &str, options: &RunOptions) {
    println!("=== labelwave ===");
    println!("Mode:       {}", if options.dry_run { "dry run" } else { "live" });
    println!("Source:     {} ({table})", db.display());
    println!(
        "Batching:   {} records/batch, {} attempts/batch",
        options.batch_size, options.retry.max_attempts
    );
    if let Some(limit) = options.limit {
        println!("Limit:      {limit} records");
    }
    if let Some(min) = options.min_confidence {
        println!("Confidence: >= {min:.2}");
    }
    println!();
}

pub fn progress_line(event: &WaveProgress) -> String {
    let secs = event.elapsed.as_secs_f64();
    let percent = if event.total_batches > 0 {
        event.completed_batches * 100 / event.total_batches
    } else {
        100
    };
    let rate = if secs > 0.0 {
        event.processed as f64 / secs
    } else {
        0.0
    };
    format!(
        "wave {}/{} | batches {}/{} ({percent}%) | processed {} | errors {} | {rate:.1} rec/s | {secs:.1}s",
        event.wave,
        event.total_waves,
        event.completed_batches,
        event.total_batches,
        event.processed,
        event.errors,
    )
}

pub fn print_progress(event: &WaveProgress) {
    print!("\r{}", progress_line(event));
    std::io::stdout().flush().ok();
}

pub fn print_summary(summary: &RunSummary) {
    println!();
    println!("Providers:  {}", summary.providers.join(", "));
    if summary.stats.skipped > 0 {
        println!(
            "Resumed:    {} records skipped as already processed",
            summary.stats.skipped
        );
    }

    if summary.dry_run {
        println!(
            "Dry run:    {} records in {} batches over {} waves; no backend calls made",
            summary.pending, summary.batches, summary.waves
        );
        return;
    }
    if summary.pending == 0 {
        println!("Nothing to label.");
    }

    println!("\n=== Done ===");
    print!("{}", summary.stats);
    if summary.checkpoint_cleared {
        println!("\nAll records processed; checkpoint deleted.");
    } else {
        println!("\nCheckpoint kept; rerun to resume.");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn progress_line_reports_rate_and_share() {
        let event = WaveProgress {
            wave: 1,
            total_waves: 2,
            completed_batches: 2,
            total_batches: 3,
            processed: 40,
            errors: 0,
            elapsed: Duration::from_secs(4),
        };
        let line = progress_line(&event);
        assert!(line.starts_with("wave 1/2 | batches 2/3 (66%)"), "{line}");
        assert!(line.contains("processed 40"));
        assert!(line.contains("10.0 rec/s"));
    }

    #[test]
    fn progress_line_handles_zero_elapsed() {
        let event = WaveProgress {
            wave: 1,
            total_waves: 1,
            completed_batches: 1,
            total_batches: 1,
            processed: 5,
            errors: 0,
            elapsed: Duration::ZERO,
        };
        assert!(progress_line(&event).contains("0.0 rec/s"));
    }
}
