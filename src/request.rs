// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use bytes::Bytes;
use std::fmt;
use std::sync::Arc;
use url::Url;

use crate::requester::HttpClient;

/// One `ipfs://` (or gateway) URL to retrieve.
#[derive(Clone)]
pub struct IpfsTrustlessRequest {
    pub url: Url,
    pub http_client: Arc<dyn HttpClient>,
    /// Only fetch the blocks describing the entity, not its bytes.
    pub only_structure: bool,
}

impl IpfsTrustlessRequest {
    pub fn new(url: Url, http_client: Arc<dyn HttpClient>) -> Self {
        Self {
            url,
            http_client,
            only_structure: false,
        }
    }

    pub fn with_only_structure(mut self, only_structure: bool) -> Self {
        self.only_structure = only_structure;
        self
    }
}

impl fmt::Debug for IpfsTrustlessRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IpfsTrustlessRequest")
            .field("url", &self.url.as_str())
            .field("only_structure", &self.only_structure)
            .finish_non_exhaustive()
    }
}

/// One chunk of an assembled response. Large bodies are split over several
/// chunks that share everything but `body` and `is_last_chunk`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpfsTrustlessResponse {
    pub mime: String,
    pub status: u16,
    pub body: Bytes,
    /// Redirect target of `301` responses.
    pub location: Option<Url>,
    /// Size of the whole entity, not of this chunk.
    pub total_size: u64,
    pub is_last_chunk: bool,
}
