//! Environment observation with new-element marking and a settle timeout.

use std::collections::HashSet;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, warn};
use wayfarer_core::environment::{CaptureOptions, Environment, EnvironmentSnapshot};
use wayfarer_core::error::EnvironmentError;

/// Captures snapshots for one run and remembers the previous one.
#[derive(Debug)]
pub struct EnvironmentObserver {
    options: CaptureOptions,
    settle_timeout: Duration,
    /// Structural hashes seen in the previous capture
    previous_hashes: Option<HashSet<String>>,
    last: Option<EnvironmentSnapshot>,
}

impl EnvironmentObserver {
    pub fn new(options: CaptureOptions, settle_timeout: Duration) -> Self {
        Self {
            options,
            settle_timeout,
            previous_hashes: None,
            last: None,
        }
    }

    pub fn options(&self) -> &CaptureOptions {
        &self.options
    }

    /// Capture the current surface.
    ///
    /// A capture that does not settle in time falls back to the previous
    /// snapshot flagged `stale`. Any failure with nothing to fall back on,
    /// and any hard capture failure, is [`EnvironmentError::Unreachable`].
    pub async fn capture(&mut self, env: &mut dyn Environment) -> Result<EnvironmentSnapshot, EnvironmentError> {
        let captured = tokio::time::timeout(self.settle_timeout, env.capture(&self.options)).await;

        let mut snapshot = match captured {
            Ok(Ok(snapshot)) => snapshot,
            Ok(Err(EnvironmentError::Unreachable(reason))) => {
                return Err(EnvironmentError::Unreachable(reason));
            }
            Ok(Err(e)) => {
                return Err(EnvironmentError::Unreachable(format!("capture failed: {e}")));
            }
            Err(_) => {
                let after_ms = self.settle_timeout.as_millis() as u64;
                let Some(last) = &self.last else {
                    return Err(EnvironmentError::Unreachable(format!(
                        "environment did not settle within {after_ms}ms"
                    )));
                };
                warn!(after_ms, location = %last.location, "Environment did not settle, reusing last snapshot");
                let mut stale = last.clone();
                stale.stale = true;
                stale.captured_at = Utc::now();
                for element in &mut stale.elements {
                    element.is_new = false;
                }
                return Ok(stale);
            }
        };

        if !self.options.use_visual_reference {
            snapshot.visual = None;
        }

        if self.options.cache_structural_hashes {
            if let Some(previous) = &self.previous_hashes {
                for element in &mut snapshot.elements {
                    element.is_new = !previous.contains(&element.structural_hash);
                }
            }
            self.previous_hashes = Some(
                snapshot
                    .elements
                    .iter()
                    .map(|e| e.structural_hash.clone())
                    .collect(),
            );
        }

        debug!(
            location = %snapshot.location,
            elements = snapshot.elements.len(),
            new = snapshot.elements.iter().filter(|e| e.is_new).count(),
            "Captured snapshot"
        );
        self.last = Some(snapshot.clone());
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::MockEnvironment;
    use wayfarer_core::environment::AddressableElement;

    fn observer(options: CaptureOptions) -> EnvironmentObserver {
        EnvironmentObserver::new(options, Duration::from_millis(5_000))
    }

    #[tokio::test]
    async fn marks_elements_new_since_last_capture() {
        let mut env = MockEnvironment::new("https://shop.test/")
            .with_elements(vec![AddressableElement::new(0, "a", "Home").with_hash("h-home")]);
        let mut observer = observer(CaptureOptions::default());

        let first = observer.capture(&mut env).await.unwrap();
        assert!(!first.elements[0].is_new);

        env.set_elements(vec![
            AddressableElement::new(0, "a", "Home").with_hash("h-home"),
            AddressableElement::new(1, "button", "Cart").with_hash("h-cart"),
        ]);
        let second = observer.capture(&mut env).await.unwrap();
        assert!(!second.elements[0].is_new);
        assert!(second.elements[1].is_new);
    }

    #[tokio::test]
    async fn no_markers_without_hash_cache() {
        let mut env = MockEnvironment::new("https://shop.test/");
        let options = CaptureOptions {
            cache_structural_hashes: false,
            ..CaptureOptions::default()
        };
        let mut observer = observer(options);
        observer.capture(&mut env).await.unwrap();
        env.set_elements(vec![AddressableElement::new(0, "a", "New")]);
        let snapshot = observer.capture(&mut env).await.unwrap();
        assert!(!snapshot.elements[0].is_new);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_capture_reuses_last_snapshot_as_stale() {
        let mut env = MockEnvironment::new("https://shop.test/");
        let mut observer = EnvironmentObserver::new(CaptureOptions::default(), Duration::from_millis(100));
        observer.capture(&mut env).await.unwrap();

        env.set_capture_delay(Duration::from_secs(10));
        let snapshot = observer.capture(&mut env).await.unwrap();
        assert!(snapshot.stale);
        assert_eq!(snapshot.location, "https://shop.test/");
    }

    #[tokio::test(start_paused = true)]
    async fn slow_first_capture_is_unreachable() {
        let mut env = MockEnvironment::new("https://shop.test/");
        env.set_capture_delay(Duration::from_secs(10));
        let mut observer = EnvironmentObserver::new(CaptureOptions::default(), Duration::from_millis(100));
        let err = observer.capture(&mut env).await.unwrap_err();
        assert!(matches!(err, EnvironmentError::Unreachable(_)));
    }

    #[tokio::test]
    async fn hard_failures_are_unreachable() {
        let mut env = MockEnvironment::new("https://shop.test/");
        let mut observer = observer(CaptureOptions::default());
        observer.capture(&mut env).await.unwrap();

        env.fail_captures();
        let err = observer.capture(&mut env).await.unwrap_err();
        assert_eq!(err.kind(), wayfarer_core::ErrorKind::EnvironmentUnreachable);
    }
}
