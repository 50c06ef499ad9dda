// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Trustless retrieval of UnixFS entities from IPFS HTTP gateways.
//!
//! A gateway is asked for a CARv1 archive of the entity
//! (`?format=car&dag-scope=entity&order=dfs`), the archive is decoded while it
//! streams in, every block is checked against its CID and the entity is
//! reassembled from the verified blocks. See [`orchestrator::BlockOrchestrator`]
//! for the entry point.

pub mod block;
pub mod car;
mod cli;
pub mod config;
pub mod dag;
pub mod error;
pub mod orchestrator;
pub mod request;
pub mod requester;
#[cfg(test)]
mod test_utils;
pub mod unixfs;
pub mod utils;

pub use block::Block;
pub use cli::main as fetch_main;
pub use config::Config;
pub use error::Error;
pub use orchestrator::BlockOrchestrator;
pub use request::{IpfsTrustlessRequest, IpfsTrustlessResponse};
