// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Drives one trustless retrieval from URL to response.
//!
//! ```text
//!  Idle ──► Requesting ──► Decoding ──► Assembling ──► Idle
//!               │              │
//!               └──────────────┴──────► Idle (failure)
//! ```
//!
//! Collected blocks are dropped on every return to `Idle`.

pub mod assemble;

use futures::TryStreamExt as _;
use tracing::{debug, info, instrument, warn};

use crate::car::{CarBlockReader, CarBlockStream};
use crate::config::{Config, GatewayConfig, RetrievalConfig};
use crate::dag::DagNodesCollector;
use crate::error::Error;
use crate::request::{IpfsTrustlessRequest, IpfsTrustlessResponse};
use crate::requester::ContentRequester;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrchestratorState {
    #[default]
    Idle,
    /// Waiting for the gateway to answer.
    Requesting,
    /// Receiving and decoding the CAR body.
    Decoding,
    Assembling,
}

/// Serves one request at a time. Concurrent retrievals need one orchestrator
/// each.
#[derive(Debug)]
pub struct BlockOrchestrator {
    gateway: GatewayConfig,
    retrieval: RetrievalConfig,
    state: OrchestratorState,
    collector: DagNodesCollector,
}

impl BlockOrchestrator {
    pub fn new(gateway: GatewayConfig, retrieval: RetrievalConfig) -> Self {
        Self {
            gateway,
            retrieval,
            state: OrchestratorState::Idle,
            collector: DagNodesCollector::new(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.gateway.clone(), config.retrieval.clone())
    }

    pub fn state(&self) -> OrchestratorState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state != OrchestratorState::Idle
    }

    /// Blocks collected by the request in flight. Empty when idle.
    pub fn collected_blocks(&self) -> &DagNodesCollector {
        &self.collector
    }

    /// Drops all collected blocks and returns to `Idle`. Needed after a
    /// `build_response` future was dropped before completing.
    pub fn reset(&mut self) {
        if self.is_active() {
            debug!(state = ?self.state, blocks = self.collector.len(), "resetting active orchestrator");
        }
        self.state = OrchestratorState::Idle;
        self.collector.clear();
    }

    /// Retrieves `request` and hands the outcome to `callback`: one or more
    /// response chunks, or exactly one error.
    ///
    /// Fails with [`Error::Busy`], without calling `callback`, while another
    /// request is active.
    #[instrument(skip_all, fields(url = %request.url))]
    pub async fn build_response<F>(
        &mut self,
        request: IpfsTrustlessRequest,
        mut callback: F,
    ) -> Result<(), Error>
    where
        F: FnMut(Result<IpfsTrustlessResponse, Error>),
    {
        if self.is_active() {
            warn!(state = ?self.state, "orchestrator is busy");
            return Err(Error::Busy);
        }
        self.collector.clear();
        self.state = OrchestratorState::Requesting;

        let result = self.fetch_and_assemble(&request).await;
        self.state = OrchestratorState::Idle;
        self.collector.clear();

        match result {
            Ok(responses) => {
                if let Some(first) = responses.first() {
                    info!(
                        status = first.status,
                        total_size = first.total_size,
                        chunks = responses.len(),
                        "response assembled"
                    );
                }
                for response in responses {
                    callback(Ok(response));
                }
            }
            Err(e) => {
                warn!("retrieval failed: {e}");
                callback(Err(e));
            }
        }
        Ok(())
    }

    async fn fetch_and_assemble(
        &mut self,
        request: &IpfsTrustlessRequest,
    ) -> Result<Vec<IpfsTrustlessResponse>, Error> {
        let mut requester = ContentRequester::new(request, &self.gateway)?;
        let chunks = requester.request().await?;

        self.state = OrchestratorState::Decoding;
        let mut blocks = CarBlockStream::new(
            chunks,
            CarBlockReader::new(self.retrieval.max_frame_size),
        );
        while let Some(block) = blocks.try_next().await? {
            self.collector.collect_block(block);
        }
        debug!(blocks = self.collector.len(), "CAR stream complete");

        self.state = OrchestratorState::Assembling;
        let assembled = assemble::assemble(
            &self.collector,
            requester.target(),
            request,
            &self.retrieval,
        )?;
        Ok(assembled.into_chunks(self.retrieval.response_chunk_size))
    }
}
