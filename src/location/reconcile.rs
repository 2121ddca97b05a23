//! Multi-provider reconciliation.
//!
//! Every provider is asked concurrently, each under its own timeout. Once all
//! calls have settled the successful answers are scored and the best one wins.
//! Equal scores go to the provider listed first.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::providers::GeocodingProvider;
use super::scoring::score_address;
use super::types::{Position, ProviderError, ScoredAddress};

pub const DEFAULT_PROVIDER_TIMEOUT: Duration = Duration::from_secs(5);

/// Queries a fixed, priority-ordered set of providers.
#[derive(Clone)]
pub struct ProviderReconciler {
    providers: Vec<Arc<dyn GeocodingProvider>>,
    timeout: Duration,
}

impl ProviderReconciler {
    /// `providers` order is the tie-break priority, first wins.
    pub fn new(providers: Vec<Arc<dyn GeocodingProvider>>, timeout: Duration) -> Self {
        Self { providers, timeout }
    }

    pub fn providers(&self) -> &[Arc<dyn GeocodingProvider>] {
        &self.providers
    }

    /// Best-scoring address for `position`, or `None` if every provider failed.
    pub async fn reconcile(&self, position: &Position) -> Option<ScoredAddress> {
        self.reconcile_ranked(position).await.into_iter().next()
    }

    /// All successful provider answers, best first.
    pub async fn reconcile_ranked(&self, position: &Position) -> Vec<ScoredAddress> {
        let at = position.coords;
        let handles: Vec<_> = self
            .providers
            .iter()
            .map(|provider| {
                let provider = Arc::clone(provider);
                let timeout = self.timeout;
                tokio::spawn(async move {
                    match tokio::time::timeout(timeout, provider.reverse_geocode(at)).await {
                        Ok(result) => result,
                        Err(_) => Err(ProviderError::Timeout),
                    }
                })
            })
            .collect();

        let mut scored = Vec::with_capacity(handles.len());
        for (provider, handle) in self.providers.iter().zip(handles) {
            match handle.await {
                Ok(Ok(address)) => {
                    let s = score_address(address, position.accuracy_m);
                    debug!("provider {}: score {} ({:?})", provider.id(), s.confidence, s.issues);
                    scored.push(s);
                }
                Ok(Err(e)) => warn!("provider {} dropped: {}", provider.id(), e),
                Err(e) => warn!("provider {} task failed: {}", provider.id(), e),
            }
        }

        // Stable sort keeps provider priority among equal scores.
        scored.sort_by(|a, b| b.confidence.cmp(&a.confidence));
        scored
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::geo::LatLng;
    use crate::location::types::{GeocodedAddress, SourceTrust};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Instant;

    /// Provider with a canned answer and an optional delay.
    pub(crate) struct StubProvider {
        pub id: &'static str,
        pub trust: SourceTrust,
        pub answer: Result<GeocodedAddress, ProviderError>,
        pub delay: Duration,
        pub calls: AtomicU32,
    }

    impl StubProvider {
        pub(crate) fn ok(id: &'static str, trust: SourceTrust, city: Option<&str>, region: Option<&str>, postal: Option<&str>) -> Self {
            Self {
                id,
                trust,
                answer: Ok(GeocodedAddress {
                    city: city.map(String::from),
                    region: region.map(String::from),
                    postal_code: postal.map(String::from),
                    source: id.to_string(),
                    trust,
                    ..Default::default()
                }),
                delay: Duration::ZERO,
                calls: AtomicU32::new(0),
            }
        }

        pub(crate) fn failing(id: &'static str) -> Self {
            Self {
                id,
                trust: SourceTrust::Open,
                answer: Err(ProviderError::Unreachable("connection refused".into())),
                delay: Duration::ZERO,
                calls: AtomicU32::new(0),
            }
        }

        pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }
    }

    #[async_trait]
    impl GeocodingProvider for StubProvider {
        fn id(&self) -> &str {
            self.id
        }

        fn trust(&self) -> SourceTrust {
            self.trust
        }

        async fn reverse_geocode(&self, _at: LatLng) -> Result<GeocodedAddress, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.answer.clone()
        }
    }

    fn position(accuracy: Option<f64>) -> Position {
        Position::now(26.8467, 80.9462, accuracy).unwrap()
    }

    fn reconciler(providers: Vec<StubProvider>) -> ProviderReconciler {
        let providers = providers
            .into_iter()
            .map(|p| Arc::new(p) as Arc<dyn GeocodingProvider>)
            .collect();
        ProviderReconciler::new(providers, Duration::from_millis(300))
    }

    #[tokio::test]
    async fn test_selects_highest_score() {
        // Unknown accuracy: scores come from trust + completeness only.
        let r = reconciler(vec![
            StubProvider::ok("a", SourceTrust::Open, Some("Lucknow"), None, None),          // 40
            StubProvider::ok("b", SourceTrust::High, Some("Lucknow"), Some("UP"), Some("226001")).with_delay(Duration::from_millis(20)), // 60
            StubProvider::ok("c", SourceTrust::High, None, Some("UP"), None),               // 35
        ]);
        let ranked = r.reconcile_ranked(&position(None)).await;
        let scores: Vec<u8> = ranked.iter().map(|s| s.confidence).collect();
        assert_eq!(scores, vec![60, 40, 35]);

        let best = r.reconcile(&position(None)).await.unwrap();
        assert_eq!(best.address.source, "b");
        assert_eq!(best.confidence, 60);
    }

    #[tokio::test]
    async fn test_best_of_40_60_75() {
        // accuracy 80 m → +40
        let r = reconciler(vec![
            StubProvider::ok("forty", SourceTrust::Unrated, None, None, None),                 // 40
            StubProvider::ok("sixty", SourceTrust::Unrated, Some("Lucknow"), None, None),      // 60
            StubProvider::ok("seventy-five", SourceTrust::High, None, Some("UP"), None)
                .with_delay(Duration::from_millis(10)),                                          // 75
        ]);
        let ranked = r.reconcile_ranked(&position(Some(80.0))).await;
        let scores: Vec<u8> = ranked.iter().map(|s| s.confidence).collect();
        assert_eq!(scores, vec![75, 60, 40]);

        let best = r.reconcile(&position(Some(80.0))).await.unwrap();
        assert_eq!(best.address.source, "seventy-five");
        assert_eq!(best.confidence, 75);
        // The winner is returned whole; the city from "sixty" is not merged in.
        assert_eq!(best.address.city, None);
    }

    #[tokio::test]
    async fn test_failures_dropped() {
        let r = reconciler(vec![
            StubProvider::failing("down"),
            StubProvider::ok("up", SourceTrust::Open, Some("Lucknow"), None, None),
        ]);
        let ranked = r.reconcile_ranked(&position(Some(50.0))).await;
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].address.source, "up");
    }

    #[tokio::test]
    async fn test_all_fail_returns_none() {
        let r = reconciler(vec![StubProvider::failing("x"), StubProvider::failing("y")]);
        assert!(r.reconcile(&position(Some(50.0))).await.is_none());
    }

    #[tokio::test]
    async fn test_no_providers() {
        let r = reconciler(vec![]);
        assert!(r.reconcile(&position(Some(50.0))).await.is_none());
    }

    #[tokio::test]
    async fn test_tie_prefers_earlier_provider() {
        let r = reconciler(vec![
            StubProvider::ok("first", SourceTrust::Open, Some("A"), None, None)
                .with_delay(Duration::from_millis(30)),
            StubProvider::ok("second", SourceTrust::Open, Some("B"), None, None),
        ]);
        let best = r.reconcile(&position(Some(50.0))).await.unwrap();
        assert_eq!(best.address.source, "first");
    }

    #[tokio::test]
    async fn test_slow_provider_times_out_without_blocking_others() {
        let r = reconciler(vec![
            StubProvider::ok("slow", SourceTrust::High, Some("A"), Some("B"), Some("C"))
                .with_delay(Duration::from_secs(5)),
            StubProvider::ok("fast", SourceTrust::Open, Some("A"), None, None),
        ]);
        let started = Instant::now();
        let ranked = r.reconcile_ranked(&position(Some(50.0))).await;
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].address.source, "fast");
    }

    #[tokio::test]
    async fn test_providers_queried_concurrently() {
        let delay = Duration::from_millis(150);
        let r = reconciler(vec![
            StubProvider::ok("a", SourceTrust::Open, Some("A"), None, None).with_delay(delay),
            StubProvider::ok("b", SourceTrust::Open, Some("B"), None, None).with_delay(delay),
            StubProvider::ok("c", SourceTrust::Open, Some("C"), None, None).with_delay(delay),
        ]);
        let started = Instant::now();
        let ranked = r.reconcile_ranked(&position(Some(50.0))).await;
        assert_eq!(ranked.len(), 3);
        // Sequential calls would take at least 450 ms.
        assert!(started.elapsed() < Duration::from_millis(400));
    }
}
