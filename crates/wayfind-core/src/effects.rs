//! Fire-and-forget dispatch of discovery side effects.
//!
//! Each sink runs on its own task, so a slow audio player never delays a
//! notification and neither delays the engine. Failures are logged only.

use std::sync::Arc;

use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

use crate::traits::EffectSink;

/// Runs every registered [`EffectSink`] for each new discovery.
#[derive(Clone, Default)]
pub struct EffectDispatcher {
    sinks: Vec<Arc<dyn EffectSink>>,
    tracker: TaskTracker,
}

impl std::fmt::Debug for EffectDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.sinks.iter().map(|s| s.name()).collect();
        f.debug_struct("EffectDispatcher")
            .field("sinks", &names)
            .field("in_flight", &self.tracker.len())
            .finish()
    }
}

impl EffectDispatcher {
    /// Create a dispatcher with no sinks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sink.
    pub fn with_sink(mut self, sink: Arc<dyn EffectSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    /// Start every sink for the discovered place and return immediately.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn dispatch(&self, place_name: &str) {
        for sink in &self.sinks {
            let sink = Arc::clone(sink);
            let place_name = place_name.to_string();
            self.tracker.spawn(async move {
                match sink.on_discovery(&place_name).await {
                    Ok(()) => debug!("{} effect completed for {}", sink.name(), place_name),
                    Err(e) => warn!("{} effect failed for {}: {}", sink.name(), place_name, e),
                }
            });
        }
    }

    /// Number of effect tasks still running.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Wait for every effect dispatched so far to finish.
    pub async fn drain(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::RecordingSink;

    #[tokio::test]
    async fn test_dispatch_reaches_every_sink() {
        let notify = Arc::new(RecordingSink::new("notification"));
        let sound = Arc::new(RecordingSink::new("sound"));
        let dispatcher = EffectDispatcher::new()
            .with_sink(notify.clone())
            .with_sink(sound.clone());
        assert_eq!(dispatcher.len(), 2);

        dispatcher.dispatch("Springfield");
        dispatcher.drain().await;

        assert_eq!(notify.calls(), vec!["Springfield".to_string()]);
        assert_eq!(sound.calls(), vec!["Springfield".to_string()]);
        assert_eq!(dispatcher.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_failing_sink_does_not_block_others() {
        let broken = Arc::new(RecordingSink::new("notification"));
        broken.set_should_fail(true);
        let sound = Arc::new(RecordingSink::new("sound"));
        let dispatcher = EffectDispatcher::new()
            .with_sink(broken.clone())
            .with_sink(sound.clone());

        dispatcher.dispatch("Shelbyville");
        dispatcher.drain().await;

        assert_eq!(broken.calls().len(), 1);
        assert_eq!(sound.calls(), vec!["Shelbyville".to_string()]);
    }

    #[tokio::test]
    async fn test_drain_can_be_repeated() {
        let sink = Arc::new(RecordingSink::new("sound"));
        let dispatcher = EffectDispatcher::new().with_sink(sink.clone());

        dispatcher.dispatch("A");
        dispatcher.drain().await;
        dispatcher.dispatch("B");
        dispatcher.drain().await;

        assert_eq!(sink.calls(), vec!["A".to_string(), "B".to_string()]);
    }

    #[tokio::test]
    async fn test_empty_dispatcher() {
        let dispatcher = EffectDispatcher::new();
        assert!(dispatcher.is_empty());
        dispatcher.dispatch("Nowhere");
        dispatcher.drain().await;
    }
}
