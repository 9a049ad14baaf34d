//! Replay protection for accepted assertions.
//!
//! The guard remembers each accepted assertion id until the expiry it was
//! recorded with. Expired entries are never swept; they are overwritten
//! the next time the same id is seen. State is process-local.

use std::fmt;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;

use crate::error::{SamlError, SamlResult};

/// Independent id spaces tracked by the guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplayNamespace {
    /// Assertions carrying an authentication statement.
    Authn,
    /// Assertions carrying the matching dataset.
    MatchingDataset,
    /// Assertions returned by the matching service.
    MatchingService,
}

impl fmt::Display for ReplayNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Authn => "authn",
            Self::MatchingDataset => "matching dataset",
            Self::MatchingService => "matching service",
        })
    }
}

/// Concurrent, lazily-expiring set of seen assertion ids.
///
/// One instance is shared by every validator in the process.
#[derive(Debug, Default)]
pub struct ReplayGuard {
    authn: DashMap<String, DateTime<Utc>>,
    matching_dataset: DashMap<String, DateTime<Utc>>,
    matching_service: DashMap<String, DateTime<Utc>>,
}

impl ReplayGuard {
    /// Creates an empty guard.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self, namespace: ReplayNamespace) -> &DashMap<String, DateTime<Utc>> {
        match namespace {
            ReplayNamespace::Authn => &self.authn,
            ReplayNamespace::MatchingDataset => &self.matching_dataset,
            ReplayNamespace::MatchingService => &self.matching_service,
        }
    }

    /// Records `id` until `expiry`, unless it is already recorded and
    /// still live at `now`.
    ///
    /// The check and the insert happen under the same shard lock, so two
    /// concurrent calls for one id cannot both succeed.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::DuplicateAssertion`] if `id` is live. The
    /// issuer is reported for the matching dataset namespace only.
    pub fn check_and_record(
        &self,
        id: &str,
        namespace: ReplayNamespace,
        expiry: DateTime<Utc>,
        now: DateTime<Utc>,
        issuer: Option<&str>,
    ) -> SamlResult<()> {
        match self.entries(namespace).entry(id.to_string()) {
            Entry::Occupied(mut entry) => {
                if now < *entry.get() {
                    return Err(SamlError::DuplicateAssertion {
                        id: id.to_string(),
                        namespace,
                        issuer: match namespace {
                            ReplayNamespace::MatchingDataset => issuer.map(str::to_string),
                            ReplayNamespace::Authn | ReplayNamespace::MatchingService => None,
                        },
                    });
                }
                tracing::debug!(assertion_id = id, %namespace, "Replacing expired replay entry");
                entry.insert(expiry);
            }
            Entry::Vacant(entry) => {
                entry.insert(expiry);
            }
        }
        Ok(())
    }

    /// Drops the record of `id` if it still holds `expiry`, undoing a
    /// [`check_and_record`](Self::check_and_record) whose response was
    /// refused afterwards. A record since replaced is left alone.
    pub fn release(&self, id: &str, namespace: ReplayNamespace, expiry: DateTime<Utc>) -> bool {
        let released = self
            .entries(namespace)
            .remove_if(id, |_, recorded| *recorded == expiry)
            .is_some();
        if released {
            tracing::debug!(assertion_id = id, %namespace, "Released replay entry");
        }
        released
    }

    /// Whether `id` is recorded and still live at `now`. Never records.
    #[must_use]
    pub fn is_duplicate(&self, id: &str, namespace: ReplayNamespace, now: DateTime<Utc>) -> bool {
        self.entries(namespace)
            .get(id)
            .is_some_and(|expiry| now < *expiry)
    }

    /// Number of tracked entries across all namespaces, expired or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.authn.len() + self.matching_dataset.len() + self.matching_service.len()
    }

    /// True if nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, TimeZone};

    use super::*;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 1, 9, 0, 0).unwrap()
    }

    #[test]
    fn duplicate_within_window_is_rejected() {
        let guard = ReplayGuard::new();
        let expiry = t0() + Duration::minutes(5);
        guard
            .check_and_record("A", ReplayNamespace::Authn, expiry, t0(), None)
            .unwrap();

        let err = guard
            .check_and_record("A", ReplayNamespace::Authn, expiry, t0() + Duration::minutes(1), None)
            .unwrap_err();
        assert_eq!(err.code(), "duplicate_assertion");
    }

    #[test]
    fn expired_entry_is_overwritten() {
        let guard = ReplayGuard::new();
        let expiry = t0() + Duration::minutes(5);
        guard
            .check_and_record("A", ReplayNamespace::Authn, expiry, t0(), None)
            .unwrap();

        let later = t0() + Duration::minutes(6);
        guard
            .check_and_record("A", ReplayNamespace::Authn, later + Duration::minutes(5), later, None)
            .unwrap();
        assert!(guard.is_duplicate("A", ReplayNamespace::Authn, later));
        assert_eq!(guard.len(), 1);
    }

    #[test]
    fn expiry_instant_itself_is_not_live() {
        let guard = ReplayGuard::new();
        let expiry = t0() + Duration::minutes(5);
        guard
            .check_and_record("A", ReplayNamespace::Authn, expiry, t0(), None)
            .unwrap();
        assert!(!guard.is_duplicate("A", ReplayNamespace::Authn, expiry));
    }

    #[test]
    fn namespaces_are_independent() {
        let guard = ReplayGuard::new();
        let expiry = t0() + Duration::minutes(5);
        guard
            .check_and_record("A", ReplayNamespace::Authn, expiry, t0(), None)
            .unwrap();

        assert!(!guard.is_duplicate("A", ReplayNamespace::MatchingDataset, t0()));
        guard
            .check_and_record("A", ReplayNamespace::MatchingDataset, expiry, t0(), Some("idp"))
            .unwrap();
        assert_eq!(guard.len(), 2);
    }

    #[test]
    fn release_only_drops_the_matching_record() {
        let guard = ReplayGuard::new();
        let expiry = t0() + Duration::minutes(5);
        guard
            .check_and_record("A", ReplayNamespace::MatchingDataset, expiry, t0(), None)
            .unwrap();

        assert!(!guard.release("A", ReplayNamespace::MatchingDataset, expiry + Duration::seconds(1)));
        assert!(!guard.release("A", ReplayNamespace::Authn, expiry));
        assert!(guard.is_duplicate("A", ReplayNamespace::MatchingDataset, t0()));

        assert!(guard.release("A", ReplayNamespace::MatchingDataset, expiry));
        assert!(!guard.is_duplicate("A", ReplayNamespace::MatchingDataset, t0()));
        assert!(guard.is_empty());
        guard
            .check_and_record("A", ReplayNamespace::MatchingDataset, expiry, t0(), None)
            .unwrap();
    }

    #[test]
    fn matching_dataset_duplicate_names_the_issuer() {
        let guard = ReplayGuard::new();
        let expiry = t0() + Duration::minutes(5);
        guard
            .check_and_record("M", ReplayNamespace::MatchingDataset, expiry, t0(), Some("https://idp.test"))
            .unwrap();

        let err = guard
            .check_and_record("M", ReplayNamespace::MatchingDataset, expiry, t0(), Some("https://idp.test"))
            .unwrap_err();
        assert!(err.to_string().contains("from https://idp.test"));

        guard
            .check_and_record("N", ReplayNamespace::Authn, expiry, t0(), Some("https://idp.test"))
            .unwrap();
        let err = guard
            .check_and_record("N", ReplayNamespace::Authn, expiry, t0(), Some("https://idp.test"))
            .unwrap_err();
        assert!(!err.to_string().contains("from"));
    }

    #[test]
    fn is_duplicate_does_not_record() {
        let guard = ReplayGuard::new();
        assert!(!guard.is_duplicate("A", ReplayNamespace::Authn, t0()));
        assert!(guard.is_empty());
    }

    #[test]
    fn concurrent_replays_admit_exactly_one() {
        let guard = Arc::new(ReplayGuard::new());
        let expiry = t0() + Duration::minutes(5);

        let accepted = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..16)
                .map(|_| {
                    let guard = Arc::clone(&guard);
                    scope.spawn(move || {
                        guard
                            .check_and_record("race", ReplayNamespace::Authn, expiry, t0(), None)
                            .is_ok()
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .filter(|ok| *ok)
                .count()
        });

        assert_eq!(accepted, 1);
    }
}
