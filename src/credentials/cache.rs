//! Expiring credential cache with singleflight refresh.
//!
//! State machine per resolver: Idle -> Fetching -> Ready -> Fetching ...
//! A single mutex guards `{current, in_flight}`; at most one network fetch
//! exists at any instant and every concurrent caller observes its result.
//! The lock is never held across the network call itself.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};

use super::{CredentialProvider, ExpiringCredential};
use crate::errors::CredentialError;

/// Refresh when the cached credential has less than this much life left.
const DEFAULT_EXPIRY_GUARD: Duration = Duration::from_secs(180);

type FetchResult = Result<ExpiringCredential, CredentialError>;

struct CacheState {
    current: Option<ExpiringCredential>,
    /// Receiver for the in-flight fetch; `None` while Idle/Ready.
    in_flight: Option<watch::Receiver<Option<FetchResult>>>,
}

/// Wraps a provider with the expiring cache.
pub struct CachedProvider {
    provider: Arc<dyn CredentialProvider>,
    guard: Duration,
    state: Arc<Mutex<CacheState>>,
}

impl CachedProvider {
    pub fn new(provider: Arc<dyn CredentialProvider>) -> Self {
        Self::with_guard(provider, DEFAULT_EXPIRY_GUARD)
    }

    /// Cache with a non-default expiry guard window.
    pub fn with_guard(provider: Arc<dyn CredentialProvider>, guard: Duration) -> Self {
        Self {
            provider,
            guard,
            state: Arc::new(Mutex::new(CacheState {
                current: None,
                in_flight: None,
            })),
        }
    }

    /// Return the cached credential if still fresh, otherwise join or start
    /// a refresh.
    pub async fn get_credential(&self) -> FetchResult {
        let mut rx = {
            let mut state = self.state.lock().await;

            if let Some(current) = &state.current {
                if !current.is_expiring_within(self.guard) {
                    return Ok(current.clone());
                }
            }

            match &state.in_flight {
                Some(rx) => rx.clone(),
                None => {
                    let (tx, rx) = watch::channel(None);
                    state.in_flight = Some(rx.clone());

                    // The fetch is deliberately detached: dropping a caller
                    // must not cancel a refresh other callers are joined on.
                    let provider = Arc::clone(&self.provider);
                    let shared = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        let result = provider.get_credential().await;
                        let mut state = shared.lock().await;
                        state.in_flight = None;
                        if let Ok(credential) = &result {
                            state.current = Some(credential.clone());
                        }
                        let _ = tx.send(Some(result));
                    });

                    rx
                }
            }
        };

        // Wait outside the lock for the fetch to publish.
        loop {
            {
                let value = rx.borrow_and_update();
                if let Some(result) = value.as_ref() {
                    return result.clone();
                }
            }
            if rx.changed().await.is_err() {
                return Err(CredentialError::ProviderFailed {
                    provider: "cache",
                    message: "credential refresh task dropped".into(),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::Credential;
    use chrono::Utc;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Provider that counts fetches and can hand out short-lived credentials.
    struct CountingProvider {
        fetches: AtomicUsize,
        lifetime: Option<chrono::Duration>,
        fail: bool,
        delay: Duration,
    }

    impl CountingProvider {
        fn new(lifetime: Option<chrono::Duration>) -> Self {
            Self {
                fetches: AtomicUsize::new(0),
                lifetime,
                fail: false,
                delay: Duration::from_millis(0),
            }
        }
    }

    impl CredentialProvider for CountingProvider {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn get_credential(
            &self,
        ) -> Pin<Box<dyn Future<Output = FetchResult> + Send + '_>> {
            Box::pin(async move {
                tokio::time::sleep(self.delay).await;
                let n = self.fetches.fetch_add(1, Ordering::SeqCst) + 1;
                if self.fail {
                    return Err(CredentialError::ProviderFailed {
                        provider: "counting",
                        message: "forced failure".into(),
                    });
                }
                Ok(ExpiringCredential {
                    credential: Credential::new(format!("AKID{n}"), "secret", None),
                    expiration: self.lifetime.map(|l| Utc::now() + l),
                })
            })
        }
    }

    #[tokio::test]
    async fn test_fresh_credential_served_from_cache() {
        let provider = Arc::new(CountingProvider::new(Some(chrono::Duration::hours(1))));
        let cache = CachedProvider::new(provider.clone());

        let first = cache.get_credential().await.unwrap();
        let second = cache.get_credential().await.unwrap();
        assert_eq!(first.credential.access_key_id, "AKID1");
        assert_eq!(second.credential.access_key_id, "AKID1");
        assert_eq!(provider.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_expiring_credential_triggers_refresh() {
        // Lifetime shorter than the guard window: every call refreshes.
        let provider = Arc::new(CountingProvider::new(Some(chrono::Duration::seconds(30))));
        let cache =
            CachedProvider::with_guard(provider.clone(), Duration::from_secs(180));

        cache.get_credential().await.unwrap();
        cache.get_credential().await.unwrap();
        assert_eq!(provider.fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_fetch() {
        let provider = Arc::new(CountingProvider {
            fetches: AtomicUsize::new(0),
            lifetime: Some(chrono::Duration::hours(1)),
            fail: false,
            delay: Duration::from_millis(50),
        });
        let cache = Arc::new(CachedProvider::new(provider.clone()));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = Arc::clone(&cache);
            handles.push(tokio::spawn(async move {
                cache.get_credential().await.unwrap()
            }));
        }
        for handle in handles {
            let cred = handle.await.unwrap();
            assert_eq!(cred.credential.access_key_id, "AKID1");
        }
        assert_eq!(provider.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failure_is_not_cached() {
        let provider = Arc::new(CountingProvider {
            fetches: AtomicUsize::new(0),
            lifetime: None,
            fail: true,
            delay: Duration::from_millis(0),
        });
        let cache = CachedProvider::new(provider.clone());

        assert!(cache.get_credential().await.is_err());
        assert!(cache.get_credential().await.is_err());
        // Both calls went to the provider: errors never enter the cache.
        assert_eq!(provider.fetches.load(Ordering::SeqCst), 2);
    }
}
