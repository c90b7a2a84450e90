//! Fake backends shared by the pipeline tests.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use labelwave_ai::{Backend, Prompt, Provider, ProviderError};

/// Ids in a rendered batch, in order.
pub fn prompt_ids(prompt: &Prompt) -> Vec<i64> {
    prompt
        .user
        .lines()
        .filter_map(|l| l.strip_prefix("[ID: ")?.strip_suffix(']')?.parse().ok())
        .collect()
}

/// Concurrency gauge shared between fakes.
#[derive(Debug, Default)]
pub struct Gauge {
    now: AtomicUsize,
    peak: AtomicUsize,
}

impl Gauge {
    fn enter(&self) {
        let now = self.now.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.now.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

/// Answers every batch correctly after `delay`, labelling every record
/// `sentiment: positive`.
pub struct Echo {
    delay: Duration,
    confidence: Option<f64>,
    shared: Arc<Gauge>,
    own: Gauge,
    /// Ids per completed call.
    completed: Mutex<Vec<Vec<i64>>>,
}

impl Echo {
    pub fn new(delay: Duration, shared: Arc<Gauge>) -> Arc<Self> {
        Self::with_confidence(delay, shared, None)
    }

    /// Like [`Echo::new`], but every entry also reports `confidence`.
    pub fn with_confidence(
        delay: Duration,
        shared: Arc<Gauge>,
        confidence: Option<f64>,
    ) -> Arc<Self> {
        Arc::new(Self {
            delay,
            confidence,
            shared,
            own: Gauge::default(),
            completed: Mutex::new(Vec::new()),
        })
    }

    pub fn own_peak(&self) -> usize {
        self.own.peak()
    }

    pub fn completed(&self) -> Vec<Vec<i64>> {
        self.completed.lock().unwrap().clone()
    }
}

#[async_trait]
impl Backend for Echo {
    async fn classify(&self, prompt: &Prompt) -> Result<String, ProviderError> {
        self.shared.enter();
        self.own.enter();
        tokio::time::sleep(self.delay).await;
        self.own.exit();
        self.shared.exit();

        let ids = prompt_ids(prompt);
        let reply: Vec<_> = ids
            .iter()
            .map(|id| {
                let mut entry = BTreeMap::from([
                    ("id", serde_json::json!(id)),
                    ("sentiment", serde_json::json!("positive")),
                    ("intent", serde_json::json!("recipe_share")),
                ]);
                if let Some(confidence) = self.confidence {
                    entry.insert("confidence", serde_json::json!(confidence));
                }
                entry
            })
            .collect();
        self.completed.lock().unwrap().push(ids);
        Ok(format!("Here you go:\n{}", serde_json::to_string(&reply)?))
    }
}

/// Always replies with prose.
pub struct Garbage;

#[async_trait]
impl Backend for Garbage {
    async fn classify(&self, _prompt: &Prompt) -> Result<String, ProviderError> {
        Ok("I'm not able to classify these posts.".into())
    }
}

pub fn provider(name: &str, backend: Arc<dyn Backend>) -> Provider {
    Provider::new(name, Duration::from_millis(10), backend)
}
