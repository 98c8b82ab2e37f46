//! Client-side identity and the read-only quota replica.

use std::path::Path;

use pagesmith_api_types::{HEADER_QUOTA_LIMIT, HEADER_QUOTA_REMAINING, QuotaStatus};
use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::client::CliError;

/// Last quota figures the server reported. Never authoritative: the server
/// decides admission, this only answers "how many are left" between calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaReplica {
    pub limit: u32,
    pub remaining: u32,
}

impl QuotaReplica {
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let read = |name: &str| {
            headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.trim().parse().ok())
        };
        Some(Self {
            limit: read(HEADER_QUOTA_LIMIT)?,
            remaining: read(HEADER_QUOTA_REMAINING)?,
        })
    }

    pub fn from_status(status: &QuotaStatus) -> Self {
        Self {
            limit: status.limit,
            remaining: status.remaining,
        }
    }

    pub fn describe(&self) -> String {
        format!("{} of {} documents left today", self.remaining, self.limit)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub client_id: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub quota: Option<QuotaReplica>,
}

impl Session {
    pub fn fresh() -> Self {
        Self {
            client_id: Uuid::new_v4().simple().to_string(),
            user: None,
            quota: None,
        }
    }

    pub fn load_or_create(path: &Path) -> Result<Self, CliError> {
        match std::fs::read(path) {
            Ok(data) => serde_json::from_slice(&data)
                .map_err(|e| CliError::Session(format!("{}: {e}", path.display()))),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::fresh()),
            Err(err) => Err(CliError::Session(format!("{}: {err}", path.display()))),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), CliError> {
        let data = serde_json::to_vec_pretty(self).map_err(|e| CliError::Session(e.to_string()))?;
        std::fs::write(path, data)
            .map_err(|err| CliError::Session(format!("{}: {err}", path.display())))
    }

    /// Replace the replica when the response carried quota headers.
    pub fn observe(&mut self, replica: Option<QuotaReplica>) {
        if replica.is_some() {
            self.quota = replica;
        }
    }
}
