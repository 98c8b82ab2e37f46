use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::debug;
use uuid::Uuid;

/// Output parked for the next flow to pick up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferPayload {
    pub filename: String,
    pub bytes: Vec<u8>,
    pub page_count: usize,
}

#[derive(Debug)]
struct Parcel {
    payload: TransferPayload,
    deposited_at: Instant,
}

/// One-shot, token-addressed hand-off of assembled documents.
///
/// Single-process only: every handler shares this map through the HTTP state.
/// A token can be taken once; entries expire after `ttl` and the oldest is
/// evicted once `max_entries` are parked.
#[derive(Clone)]
pub struct TransferMailbox {
    inner: Arc<DashMap<String, Parcel>>,
    ttl: Duration,
    max_entries: usize,
}

impl TransferMailbox {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
            ttl,
            max_entries: max_entries.max(1),
        }
    }

    pub fn deposit(&self, payload: TransferPayload) -> String {
        self.purge_expired();
        while self.inner.len() >= self.max_entries {
            let oldest = self
                .inner
                .iter()
                .min_by_key(|entry| entry.value().deposited_at)
                .map(|entry| entry.key().clone());
            match oldest {
                Some(token) => {
                    self.inner.remove(&token);
                    debug!(token = %token, "evicted oldest transfer");
                }
                None => break,
            }
        }

        let token = Uuid::new_v4().simple().to_string();
        self.inner.insert(
            token.clone(),
            Parcel {
                payload,
                deposited_at: Instant::now(),
            },
        );
        token
    }

    /// Remove and return the payload. Unknown, taken and expired tokens yield `None`.
    pub fn take(&self, token: &str) -> Option<TransferPayload> {
        let (_, parcel) = self.inner.remove(token)?;
        if parcel.deposited_at.elapsed() > self.ttl {
            return None;
        }
        Some(parcel.payload)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    fn purge_expired(&self) {
        let ttl = self.ttl;
        self.inner
            .retain(|_, parcel| parcel.deposited_at.elapsed() <= ttl);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(name: &str) -> TransferPayload {
        TransferPayload {
            filename: name.to_string(),
            bytes: b"%PDF-1.7".to_vec(),
            page_count: 1,
        }
    }

    #[test]
    fn take_is_one_shot() {
        let mailbox = TransferMailbox::new(Duration::from_secs(60), 4);
        let token = mailbox.deposit(payload("a.pdf"));
        assert_eq!(mailbox.take(&token), Some(payload("a.pdf")));
        assert_eq!(mailbox.take(&token), None);
        assert!(mailbox.is_empty());
    }

    #[test]
    fn expired_entries_are_not_returned() {
        let mailbox = TransferMailbox::new(Duration::ZERO, 4);
        let token = mailbox.deposit(payload("a.pdf"));
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(mailbox.take(&token), None);
    }

    #[test]
    fn capacity_evicts_oldest() {
        let mailbox = TransferMailbox::new(Duration::from_secs(60), 2);
        let first = mailbox.deposit(payload("1.pdf"));
        std::thread::sleep(Duration::from_millis(2));
        let second = mailbox.deposit(payload("2.pdf"));
        std::thread::sleep(Duration::from_millis(2));
        let third = mailbox.deposit(payload("3.pdf"));

        assert_eq!(mailbox.len(), 2);
        assert_eq!(mailbox.take(&first), None);
        assert!(mailbox.take(&second).is_some());
        assert!(mailbox.take(&third).is_some());
    }
}
