// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use cid::Cid;
use std::io;

use crate::car::DecodeError;
use crate::unixfs::UnixFsType;

/// Everything that can end a trustless retrieval.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("transport error: {0}")]
    Transport(#[from] io::Error),
    #[error("gateway answered with HTTP status {0}")]
    HttpStatus(u16),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("invalid IPFS URL: {0}")]
    InvalidUrl(String),
    #[error("the request was already started")]
    RequestAlreadyStarted,
    #[error("another request is still active")]
    Busy,
    #[error("the CAR response carried no header")]
    MissingHeader,
    #[error("{0} is not among the roots of the CAR response")]
    UnexpectedRoot(Cid),
    #[error("root block {0} is missing from the CAR response")]
    RootNotFound(Cid),
    #[error("block {0} is missing from the CAR response")]
    MissingBlock(Cid),
    #[error("content block {0} failed verification")]
    UnverifiedContent(Cid),
    #[error("no link named {segment:?} under {parent}")]
    PathNotFound { parent: Cid, segment: String },
    #[error("{0} is not a directory")]
    NotADirectory(Cid),
    #[error("UnixFS node {cid} of type {node_type} is not supported")]
    UnsupportedNodeType { cid: Cid, node_type: UnixFsType },
    #[error("block sizes of {cid} do not match its children")]
    BlockSizeMismatch { cid: Cid },
    #[error("file {cid} declares {expected} bytes but {actual} were assembled")]
    FileSizeMismatch { cid: Cid, expected: u64, actual: u64 },
    #[error("assembled data exceeds the {limit} byte limit")]
    MaxBufferedData { limit: u64 },
    #[error("assembly visited more than {limit} DAG nodes")]
    MaxDagNodes { limit: u64 },
    #[error("declared sizes of {0} overflow")]
    SizeOverflow(Cid),
}

impl Error {
    /// Failures caused by the gateway connection rather than by the data.
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Transport(_) | Error::HttpStatus(_))
    }
}
