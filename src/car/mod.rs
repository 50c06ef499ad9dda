// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Streaming decoder for the CARv1 responses of trustless gateways.
//!
//! A CARv1 stream is a sequence of varint-prefixed frames. The first frame is
//! the DAG-CBOR header, every following frame is a CID immediately followed by
//! the block it addresses:
//!
//! ```text
//! ┌──────────────┬────────────────────┐
//! │varint: length│header: {version: 1,│
//! │              │  roots: [cid, ..]} │
//! ├──────────────┼─────────┬──────────┤
//! │varint: length│cid      │block     │
//! ├──────────────┼─────────┼──────────┤
//! │varint: length│cid      │block     │
//! └──────────────┴─────────┴──────────┘
//! ```
//!
//! Gateways are not trusted: every block is re-hashed against its CID. A
//! mismatching content block is still emitted with `verified: false`, a
//! mismatching metadata node fails the stream.

pub mod decoder;
pub mod reader;

pub use decoder::{
    BlockInfo, BlockKind, CarV1Header, ContentBlock, decode_block, decode_block_content,
    decode_block_info, decode_carv1_header, decode_varint,
};
pub use reader::{CarBlockReader, CarBlockStream};

use cid::Cid;

/// Framing and integrity failures. All of them are fatal for the stream they
/// occur in.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("invalid varint: {0}")]
    InvalidVarint(String),
    #[error("zero-length frame")]
    EmptyFrame,
    #[error("frame of {len} bytes exceeds the {max} byte limit")]
    FrameTooLarge { len: u64, max: usize },
    #[error("invalid CID: {0}")]
    InvalidCid(String),
    #[error("invalid CAR header: {0}")]
    InvalidHeader(String),
    #[error("unsupported CAR version {0}, only CARv1 is supported")]
    UnsupportedCarVersion(u64),
    #[error("CAR header has no version")]
    MissingCarVersion,
    #[error("CAR header has no roots")]
    EmptyRoots,
    #[error("unsupported codec {0:#x}")]
    UnsupportedCodec(u64),
    #[error("unsupported multihash code {0:#x}")]
    UnsupportedHashCode(u64),
    #[error("invalid UnixFS node {cid}: {reason}")]
    InvalidUnixFs { cid: Cid, reason: String },
    #[error("block {0} does not match its CID")]
    DigestMismatch(Cid),
    #[error("block {0} is not a content block")]
    NotContent(Cid),
    #[error("stream ended without a CAR header")]
    MissingHeader,
    #[error("stream ended in the middle of a frame, {remaining} bytes left over")]
    TruncatedStream { remaining: usize },
    #[error("decoding was halted by an earlier error")]
    Halted,
}
