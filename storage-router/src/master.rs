//! Thin `reqwest` client for the two master endpoints the control loops poll.

use std::collections::HashMap;

use serde::Deserialize;

use crate::discovery::{Replica, ReplicaGroup};
use crate::error::RouterError;

#[derive(Debug, Deserialize)]
struct FidRangeResponse {
    start: u64,
    end: u64,
}

pub struct MasterClient {
    base_url: String,
    client: reqwest::Client,
}

impl MasterClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::new(),
        }
    }

    /// `GET /cm/v1/chunkmaster/route` — the full chunk-server topology,
    /// keyed by group id.
    pub async fn fetch_topology(&self) -> Result<HashMap<u16, ReplicaGroup>, RouterError> {
        let url = format!("{}/cm/v1/chunkmaster/route", self.base_url);
        let raw: HashMap<String, Vec<Replica>> = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| RouterError::MasterUnavailable(e.to_string()))?
            .error_for_status()
            .map_err(|e| RouterError::MasterUnavailable(e.to_string()))?
            .json()
            .await
            .map_err(|e| RouterError::MasterUnavailable(e.to_string()))?;

        raw.into_iter()
            .map(|(id, mut replicas)| {
                let group_id: u16 = id
                    .parse()
                    .map_err(|_| RouterError::MasterUnavailable(format!("bad group id {id:?}")))?;
                for replica in &mut replicas {
                    replica.group_id = group_id;
                }
                Ok((group_id, ReplicaGroup(replicas)))
            })
            .collect()
    }

    /// `GET /cm/v1/chunkmaster/fid` — the next unused `[start, end)` fid
    /// window.
    pub async fn fetch_fid_range(&self) -> Result<(u64, u64), RouterError> {
        let url = format!("{}/cm/v1/chunkmaster/fid", self.base_url);
        let resp: FidRangeResponse = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| RouterError::MasterUnavailable(e.to_string()))?
            .error_for_status()
            .map_err(|e| RouterError::MasterUnavailable(e.to_string()))?
            .json()
            .await
            .map_err(|e| RouterError::MasterUnavailable(e.to_string()))?;
        Ok((resp.start, resp.end))
    }
}
