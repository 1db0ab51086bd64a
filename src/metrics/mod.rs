//! Metrics sink abstraction
//!
//! The deploy engine reports a handful of signals (task duration, failure
//! events) through this narrow interface. Where those numbers actually go is
//! the embedding pipeline's business; the default sink writes them to the
//! log so local runs still show timings.

use std::future::Future;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertType {
    Info,
    Warning,
    Error,
    Success,
}

pub trait StatsSink: Send + Sync {
    fn event(&self, title: &str, body: &str, alert_type: AlertType, tags: &[String]);

    fn distribution(&self, metric: &str, duration: Duration, tags: &[String]);
}

/// Default sink: logs via tracing.
#[derive(Debug, Default)]
pub struct LogStats;

impl StatsSink for LogStats {
    fn event(&self, title: &str, body: &str, alert_type: AlertType, tags: &[String]) {
        match alert_type {
            AlertType::Error => tracing::error!(?tags, "{title}: {body}"),
            AlertType::Warning => tracing::warn!(?tags, "{title}: {body}"),
            _ => tracing::info!(?tags, "{title}: {body}"),
        }
    }

    fn distribution(&self, metric: &str, duration: Duration, tags: &[String]) {
        tracing::info!(?tags, "{metric}: {:.3}s", duration.as_secs_f64());
    }
}

/// Time a labeled async operation and record its duration. The tag set is
/// built after the operation completes, so outcome tags (`status:<s>`) can
/// be derived from the result.
pub async fn measure<T, F, G>(stats: &dyn StatsSink, metric: &str, operation: F, tags: G) -> T
where
    F: Future<Output = T>,
    G: FnOnce(&T) -> Vec<String>,
{
    let started = Instant::now();
    let result = operation.await;
    stats.distribution(metric, started.elapsed(), &tags(&result));
    result
}

/// Standard tag set for a task: `context:<ctx>` plus `status:<s>` when the
/// outcome is known.
pub fn task_tags(context: &str, status: Option<&str>) -> Vec<String> {
    let mut tags = vec![format!("context:{context}")];
    if let Some(status) = status {
        tags.push(format!("status:{status}"));
    }
    tags
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingStats {
        distributions: Mutex<Vec<(String, Vec<String>)>>,
    }

    impl StatsSink for RecordingStats {
        fn event(&self, _: &str, _: &str, _: AlertType, _: &[String]) {}

        fn distribution(&self, metric: &str, _: Duration, tags: &[String]) {
            self.distributions
                .lock()
                .unwrap()
                .push((metric.to_string(), tags.to_vec()));
        }
    }

    #[tokio::test]
    async fn test_measure_records_distribution_and_passes_through() {
        let stats = RecordingStats::default();
        let out = measure(&stats, "task_duration", async { 7 }, |out| {
            let status = if *out == 7 { "success" } else { "failed" };
            task_tags("minikube", Some(status))
        })
        .await;
        assert_eq!(out, 7);

        let recorded = stats.distributions.lock().unwrap();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].0, "task_duration");
        assert!(recorded[0].1.contains(&"context:minikube".to_string()));
        assert!(recorded[0].1.contains(&"status:success".to_string()));
    }
}
