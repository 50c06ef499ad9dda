// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Gateway side of a trustless retrieval: maps an IPFS URL onto a gateway
//! request for a CAR response and issues it.

mod target;

pub use target::TrustlessTarget;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use std::io;
use std::sync::Arc;
use tracing::{debug, instrument};
use url::Url;

use crate::config::{GatewayConfig, ResolveMethod};
use crate::error::Error;
use crate::request::IpfsTrustlessRequest;

/// Media type of CAR responses, see <https://www.iana.org/assignments/media-types/application/vnd.ipld.car>
pub const CAR_MIME: &str = "application/vnd.ipld.car";

/// Query appended to every gateway request.
const CAR_QUERY: &str = "format=car&dag-scope=entity&order=dfs";
/// Asks for the blocks needed to describe the entity but none of its bytes.
const STRUCTURE_ONLY_QUERY: &str = "entity-bytes=0:0";

/// Response body as it comes off the wire.
pub type ChunkStream = BoxStream<'static, io::Result<Bytes>>;

/// Outbound HTTP used for gateway requests.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Issues a `GET` with the given `Accept` header. Statuses outside of
    /// `2xx` are reported as [`Error::HttpStatus`].
    async fn get(&self, url: &Url, accept: &str) -> Result<ChunkStream, Error>;
}

/// Issues at most one gateway request for one [`IpfsTrustlessRequest`].
pub struct ContentRequester {
    target: TrustlessTarget,
    request_url: Url,
    http_client: Arc<dyn HttpClient>,
    started: bool,
}

impl ContentRequester {
    pub fn new(request: &IpfsTrustlessRequest, gateway: &GatewayConfig) -> Result<Self, Error> {
        let target = TrustlessTarget::from_url(&request.url)?;
        let request_url = gateway_request_url(&request.url, &target, gateway, request.only_structure);
        Ok(Self {
            target,
            request_url,
            http_client: request.http_client.clone(),
            started: false,
        })
    }

    pub fn target(&self) -> &TrustlessTarget {
        &self.target
    }

    pub fn gateway_request_url(&self) -> &Url {
        &self.request_url
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Sends the request and hands back the response body. Dropping the
    /// returned stream aborts the transfer.
    #[instrument(skip(self), fields(url = %self.request_url))]
    pub async fn request(&mut self) -> Result<ChunkStream, Error> {
        if self.started {
            return Err(Error::RequestAlreadyStarted);
        }
        self.started = true;
        debug!("requesting CAR from gateway");
        self.http_client.get(&self.request_url, CAR_MIME).await
    }
}

/// Builds the URL actually sent to the gateway.
///
/// `ipfs://` URLs are moved onto the configured gateway, gateway URLs are
/// kept. Existing query parameters survive, the fragment does not.
pub fn gateway_request_url(
    url: &Url,
    target: &TrustlessTarget,
    gateway: &GatewayConfig,
    only_structure: bool,
) -> Url {
    let mut request_url = if url.scheme() == "ipfs" {
        let base = match gateway.resolve_method {
            ResolveMethod::Gateway => &gateway.public_gateway,
            ResolveMethod::Local => &gateway.local_gateway,
        };
        let mut request_url = base.clone();
        let mut path = format!("{}/ipfs/{}", base.path().trim_end_matches('/'), target.cid());
        path.push_str(url.path());
        request_url.set_path(&path);
        request_url.set_query(url.query());
        request_url
    } else {
        url.clone()
    };

    let mut query = request_url
        .query()
        .filter(|q| !q.is_empty())
        .map(|q| format!("{q}&"))
        .unwrap_or_default();
    query.push_str(CAR_QUERY);
    if only_structure {
        query.push('&');
        query.push_str(STRUCTURE_ONLY_QUERY);
    }
    request_url.set_query(Some(&query));
    request_url.set_fragment(None);
    request_url
}
