//! Per-identity daily admission control.
//!
//! Anonymous identities are counted by the local store, authenticated ones by
//! the remote store; a given identity only ever touches one of them.

use std::sync::Arc;
use std::sync::atomic::{AtomicI32, AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use dashmap::DashMap;
use pagesmith_api_types::QuotaStatus;
use thiserror::Error;
use tracing::{debug, info};

use crate::application::error::AppError;
use crate::domain::quota::{
    Identity, IdentityClass, QuotaLimits, QuotaRecord, QuotaState, QuotaWindow,
};
use crate::infra::error::InfraError;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QuotaStoreError {
    #[error("quota store unavailable: {0}")]
    Unavailable(String),
    #[error("quota record is corrupt: {0}")]
    Corrupt(String),
}

impl From<QuotaStoreError> for AppError {
    fn from(error: QuotaStoreError) -> Self {
        match error {
            QuotaStoreError::Unavailable(message) => AppError::Infra(InfraError::database(message)),
            QuotaStoreError::Corrupt(message) => AppError::Unexpected(message),
        }
    }
}

#[async_trait]
pub trait QuotaStore: Send + Sync {
    async fn load(&self, key: &str) -> Result<Option<QuotaRecord>, QuotaStoreError>;

    /// Roll the record into `window` and count one use, saturating at `limit`.
    ///
    /// Must be atomic per key: concurrent commits never push the counter past
    /// the limit.
    async fn commit(
        &self,
        key: &str,
        limit: u32,
        window: NaiveDate,
    ) -> Result<QuotaRecord, QuotaStoreError>;

    async fn discard(&self, key: &str) -> Result<(), QuotaStoreError>;
}

/// In-process store; the dashmap entry lock serializes writers per key.
///
/// Records from earlier windows are swept the first time a commit arrives in
/// a newer window, so the map only ever holds the current day's identities.
#[derive(Debug, Clone)]
pub struct MemoryQuotaStore {
    records: Arc<DashMap<String, QuotaRecord>>,
    /// Day number (from CE) of the newest window swept so far.
    swept: Arc<AtomicI32>,
}

impl Default for MemoryQuotaStore {
    fn default() -> Self {
        Self {
            records: Arc::new(DashMap::new()),
            swept: Arc::new(AtomicI32::new(i32::MIN)),
        }
    }
}

impl MemoryQuotaStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every record older than `window`, once per new window.
    fn sweep_stale(&self, window: NaiveDate) {
        let day = window.num_days_from_ce();
        if self.swept.fetch_max(day, Ordering::AcqRel) >= day {
            return;
        }
        let before = self.records.len();
        self.records.retain(|_, record| record.window_date >= window);
        let evicted = before.saturating_sub(self.records.len());
        if evicted > 0 {
            debug!(evicted, window = %window, "swept stale quota records");
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl QuotaStore for MemoryQuotaStore {
    async fn load(&self, key: &str) -> Result<Option<QuotaRecord>, QuotaStoreError> {
        Ok(self.records.get(key).map(|record| record.clone()))
    }

    async fn commit(
        &self,
        key: &str,
        limit: u32,
        window: NaiveDate,
    ) -> Result<QuotaRecord, QuotaStoreError> {
        self.sweep_stale(window);
        let mut entry = self
            .records
            .entry(key.to_string())
            .or_insert_with(|| QuotaRecord::fresh(key, window, limit));
        entry.limit = limit;
        entry.roll_window(window);
        entry.record_use();
        Ok(entry.clone())
    }

    async fn discard(&self, key: &str) -> Result<(), QuotaStoreError> {
        self.records.remove(key);
        Ok(())
    }
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    millis: AtomicI64,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            millis: AtomicI64::new(start.timestamp_millis()),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.millis.fetch_add(by.num_milliseconds(), Ordering::SeqCst);
    }

    pub fn set(&self, to: DateTime<Utc>) {
        self.millis.store(to.timestamp_millis(), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.millis.load(Ordering::SeqCst)).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub retry_after_seconds: u64,
}

impl Admission {
    /// Turn a refusal into the error the HTTP layer renders as 429.
    pub fn into_result(self) -> Result<Self, AppError> {
        if self.allowed {
            Ok(self)
        } else {
            Err(AppError::QuotaExceeded {
                limit: self.limit,
                retry_after_seconds: self.retry_after_seconds,
            })
        }
    }
}

#[derive(Clone)]
pub struct QuotaGate {
    window: QuotaWindow,
    limits: QuotaLimits,
    local: Arc<dyn QuotaStore>,
    remote: Arc<dyn QuotaStore>,
    clock: Arc<dyn Clock>,
}

impl QuotaGate {
    pub fn new(
        window: QuotaWindow,
        limits: QuotaLimits,
        local: Arc<dyn QuotaStore>,
        remote: Arc<dyn QuotaStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            window,
            limits,
            local,
            remote,
            clock,
        }
    }

    pub fn limits(&self) -> QuotaLimits {
        self.limits
    }

    fn store_for(&self, identity: &Identity) -> &Arc<dyn QuotaStore> {
        match identity.class() {
            IdentityClass::Anonymous => &self.local,
            IdentityClass::Authenticated => &self.remote,
        }
    }

    /// Current record for the identity, rolled into today's window.
    async fn current(
        &self,
        identity: &Identity,
        now: DateTime<Utc>,
    ) -> Result<Option<QuotaRecord>, QuotaStoreError> {
        let limit = self.limits.for_class(identity.class());
        let record = self.store_for(identity).load(&identity.key()).await?;
        Ok(record.map(|mut record| {
            record.limit = limit;
            self.window.roll(&mut record, now);
            record
        }))
    }

    /// Check whether one more use fits today's budget. Never mutates the store.
    pub async fn admit(&self, identity: &Identity) -> Result<Admission, QuotaStoreError> {
        let now = self.clock.now();
        let limit = self.limits.for_class(identity.class());
        let used = self
            .current(identity, now)
            .await?
            .map(|record| record.used_count)
            .unwrap_or(0);
        let remaining = limit.saturating_sub(used);
        Ok(Admission {
            allowed: remaining > 0,
            limit,
            remaining,
            retry_after_seconds: self.window.seconds_until_rollover(now),
        })
    }

    /// Count one successful use. Call only after the gated work completed.
    pub async fn commit(&self, identity: &Identity) -> Result<QuotaRecord, QuotaStoreError> {
        let now = self.clock.now();
        let limit = self.limits.for_class(identity.class());
        let record = self
            .store_for(identity)
            .commit(&identity.key(), limit, self.window.window_of(now))
            .await?;
        debug!(
            identity = %record.identity_key,
            used = record.used_count,
            limit = record.limit,
            "quota committed"
        );
        Ok(record)
    }

    pub async fn status(&self, identity: &Identity) -> Result<QuotaStatus, QuotaStoreError> {
        let now = self.clock.now();
        let limit = self.limits.for_class(identity.class());
        let record = self.current(identity, now).await?;
        let (state, used) = match &record {
            None => (QuotaState::Fresh, 0),
            Some(record) if record.used_count == 0 => (QuotaState::Fresh, 0),
            Some(record) => (record.state(), record.used_count),
        };
        Ok(QuotaStatus {
            identity_class: identity.class(),
            state,
            window_date: self.window.window_of(now).to_string(),
            used,
            limit,
            remaining: limit.saturating_sub(used),
            retry_after_seconds: self.window.seconds_until_rollover(now),
        })
    }

    /// Handle a sign-in or sign-out transition.
    ///
    /// On sign-in the anonymous counter of the previous identity is dropped,
    /// never merged into the new one. Only an authenticated caller may discard
    /// a counter, so one anonymous client cannot wipe another's. An
    /// authenticated record always stays authoritative.
    pub async fn sync_identity(
        &self,
        previous: Option<&Identity>,
        current: &Identity,
    ) -> Result<QuotaStatus, QuotaStoreError> {
        if let Some(previous) = previous.filter(|previous| *previous != current) {
            if previous.class() == IdentityClass::Anonymous
                && current.class() == IdentityClass::Authenticated
            {
                self.local.discard(&previous.key()).await?;
                info!(
                    previous = %previous.key(),
                    current = %current.key(),
                    "discarded anonymous quota record on identity change"
                );
            }
        }
        self.status(current).await
    }
}
