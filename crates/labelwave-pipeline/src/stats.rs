//! Run statistics and the terminal summary.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use labelwave_core::{LabelResult, Taxonomy};

/// Values shown per field in the summary.
pub const TOP_VALUES: usize = 10;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ProviderStats {
    pub success: usize,
    pub error: usize,
    pub batches: usize,
    pub cumulative_time: Duration,
}

impl ProviderStats {
    pub fn avg_batch_time(&self) -> Option<Duration> {
        (self.batches > 0).then(|| self.cumulative_time / self.batches as u32)
    }
}

/// Counters for one run. Purely additive.
#[derive(Debug, Clone, Default)]
pub struct RunStatistics {
    providers: Vec<(String, ProviderStats)>,
    labels: BTreeMap<String, BTreeMap<String, usize>>,
    pub processed: usize,
    pub errors: usize,
    pub filtered: usize,
    pub skipped: usize,
    pub elapsed: Duration,
}

impl RunStatistics {
    /// Empty counters for the given providers and the taxonomy's choice fields.
    pub fn new<'a>(provider_names: impl IntoIterator<Item = &'a str>, taxonomy: &Taxonomy) -> Self {
        Self {
            providers: provider_names
                .into_iter()
                .map(|name| (name.to_string(), ProviderStats::default()))
                .collect(),
            labels: taxonomy
                .choice_fields()
                .map(|f| (f.name.clone(), BTreeMap::new()))
                .collect(),
            ..Self::default()
        }
    }

    /// Account one settled batch against provider `index`.
    pub fn record_batch(
        &mut self,
        index: usize,
        elapsed: Duration,
        success: usize,
        error: usize,
        filtered: usize,
    ) {
        if let Some((_, stats)) = self.providers.get_mut(index) {
            stats.success += success;
            stats.error += error;
            stats.batches += 1;
            stats.cumulative_time += elapsed;
        }
        self.processed += success;
        self.errors += error;
        self.filtered += filtered;
    }

    /// Count choice values of persisted results.
    pub fn record_labels<'r>(&mut self, results: impl IntoIterator<Item = &'r LabelResult>) {
        for result in results {
            for (field, counts) in self.labels.iter_mut() {
                if let Some(value) = result.text(field) {
                    *counts.entry(value.to_string()).or_default() += 1;
                }
            }
        }
    }

    pub fn provider(&self, name: &str) -> Option<&ProviderStats> {
        self.providers
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, s)| s)
    }

    pub fn providers(&self) -> impl Iterator<Item = (&str, &ProviderStats)> {
        self.providers.iter().map(|(n, s)| (n.as_str(), s))
    }

    /// Most frequent values of `field`, count descending then value ascending.
    pub fn top_values(&self, field: &str, n: usize) -> Vec<(&str, usize)> {
        let Some(counts) = self.labels.get(field) else {
            return Vec::new();
        };
        let mut values: Vec<(&str, usize)> =
            counts.iter().map(|(v, c)| (v.as_str(), *c)).collect();
        values.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
        values.truncate(n);
        values
    }

    /// Records persisted per second of wall time.
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.processed as f64 / secs
        } else {
            0.0
        }
    }
}

impl fmt::Display for RunStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Processed: {}  Errors: {}  Filtered: {}  Skipped: {}",
            self.processed, self.errors, self.filtered, self.skipped
        )?;
        writeln!(
            f,
            "Elapsed: {:.1}s  Throughput: {:.1} records/s",
            self.elapsed.as_secs_f64(),
            self.throughput()
        )?;

        writeln!(f, "\nProviders:")?;
        for (name, stats) in &self.providers {
            let share = if self.processed > 0 {
                stats.success as f64 * 100.0 / self.processed as f64
            } else {
                0.0
            };
            let avg = stats
                .avg_batch_time()
                .map(|d| format!("{}ms/batch", d.as_millis()))
                .unwrap_or_else(|| "-".into());
            writeln!(
                f,
                "  {name:<20} success {:>6}  error {:>6}  share {share:>5.1}%  avg {avg}",
                stats.success, stats.error
            )?;
        }

        if self.processed > 0 {
            for field in self.labels.keys() {
                writeln!(f, "\n{field}:")?;
                for (value, count) in self.top_values(field, TOP_VALUES) {
                    let pct = count as f64 * 100.0 / self.processed as f64;
                    writeln!(f, "  {value:<24} {count:>6} ({pct:.1}%)")?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use labelwave_core::LabelValue;

    use super::*;

    fn result(sentiment: &str) -> LabelResult {
        LabelResult {
            record_id: 1,
            fields: BTreeMap::from([
                ("sentiment".to_string(), LabelValue::Text(sentiment.into())),
                ("why_motivation".to_string(), LabelValue::Text("free text".into())),
            ]),
            confidence: None,
        }
    }

    #[test]
    fn batches_accumulate_per_provider() {
        let mut stats = RunStatistics::new(["a", "b"], &Taxonomy::default_ugc());
        stats.record_batch(0, Duration::from_millis(100), 20, 0, 0);
        stats.record_batch(1, Duration::from_millis(300), 15, 3, 2);
        stats.record_batch(0, Duration::from_millis(200), 7, 0, 0);

        let a = stats.provider("a").unwrap();
        assert_eq!((a.success, a.error, a.batches), (27, 0, 2));
        assert_eq!(a.avg_batch_time(), Some(Duration::from_millis(150)));
        assert_eq!(stats.processed, 42);
        assert_eq!(stats.errors, 3);
        assert_eq!(stats.filtered, 2);
    }

    #[test]
    fn histograms_track_choice_fields_only() {
        let mut stats = RunStatistics::new(["a"], &Taxonomy::default_ugc());
        let results = [result("positive"), result("negative"), result("positive")];
        stats.record_labels(&results);

        assert_eq!(stats.top_values("sentiment", 10), vec![("positive", 2), ("negative", 1)]);
        assert!(stats.top_values("why_motivation", 10).is_empty());
        assert_eq!(stats.top_values("sentiment", 1), vec![("positive", 2)]);
    }

    #[test]
    fn summary_renders_providers_and_distributions() {
        let mut stats = RunStatistics::new(["openai-1"], &Taxonomy::default_ugc());
        stats.record_batch(0, Duration::from_millis(500), 2, 0, 0);
        stats.record_labels(&[result("positive"), result("positive")]);
        stats.elapsed = Duration::from_secs(1);

        let text = stats.to_string();
        assert!(text.contains("Processed: 2"));
        assert!(text.contains("openai-1"));
        assert!(text.contains("500ms/batch"));
        assert!(text.contains("sentiment:"));
        assert!(text.contains("positive"));
    }

    #[test]
    fn unknown_provider_index_is_ignored() {
        let mut stats = RunStatistics::new(["a"], &Taxonomy::default_ugc());
        stats.record_batch(5, Duration::ZERO, 1, 0, 0);
        assert_eq!(stats.provider("a").unwrap().batches, 0);
        assert_eq!(stats.processed, 1);
    }
}
