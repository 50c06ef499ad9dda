// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Stateless decoding of CARv1 frames.
//!
//! None of these functions perform I/O or keep state; the streaming side lives
//! in [`super::reader`].

use bytes::Bytes;
use cid::Cid;
use nunny::Vec as NonEmpty;
use serde::de::{Deserialize, Deserializer, IgnoredAny, MapAccess, Visitor};
use std::fmt;

use crate::block::{Block, DirManifest};
use crate::unixfs::{UnixFsError, decode_dag_pb};
use crate::utils::multihash::digest_matches;

use super::DecodeError;

/// Multicodec of raw leaves.
pub const RAW_CODEC: u64 = 0x55;
/// Multicodec of `dag-pb` nodes.
pub const DAG_PB_CODEC: u64 = 0x70;

/// The only CAR version this decoder accepts.
const CARV1: u64 = 1;

/// Body of the first varint frame of a CARv1 stream.
/// See <https://ipld.io/specs/transport/car/carv1/#header>
#[derive(Debug, PartialEq, Eq)]
pub struct CarV1Header {
    pub roots: NonEmpty<Cid>,
    pub version: u64,
}

/// Header fields exactly as found on the wire, before validation.
#[derive(Debug, Default)]
struct RawCarHeader {
    version: Option<u64>,
    roots: Option<Vec<Cid>>,
}

impl<'de> Deserialize<'de> for RawCarHeader {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct HeaderVisitor;

        impl<'de> Visitor<'de> for HeaderVisitor {
            type Value = RawCarHeader;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a CAR header map")
            }

            // Unknown keys are skipped and a repeated key overrides the earlier value.
            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut header = RawCarHeader::default();
                while let Some(key) = map.next_key::<String>()? {
                    match key.as_str() {
                        "version" => header.version = Some(map.next_value()?),
                        "roots" => header.roots = Some(map.next_value()?),
                        _ => {
                            map.next_value::<IgnoredAny>()?;
                        }
                    }
                }
                Ok(header)
            }
        }

        deserializer.deserialize_map(HeaderVisitor)
    }
}

/// What a block frame is, without materializing file content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockInfo {
    pub cid: Cid,
    pub kind: BlockKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockKind {
    /// File bytes; decode them with [`decode_block_content`].
    Content,
    /// A verified directory or file-manifest node.
    Metadata(DirManifest),
}

impl BlockInfo {
    pub fn is_content(&self) -> bool {
        matches!(self.kind, BlockKind::Content)
    }
}

/// A decoded file chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentBlock {
    pub cid: Cid,
    pub data: Bytes,
    pub verified: bool,
}

/// Reads an unsigned varint prefix of `buf`.
///
/// `Ok(None)` means `buf` ends in the middle of the varint and the caller has
/// to wait for more bytes.
pub fn decode_varint(buf: &[u8]) -> Result<Option<(u64, &[u8])>, DecodeError> {
    match unsigned_varint::decode::u64(buf) {
        Ok((value, remaining)) => Ok(Some((value, remaining))),
        Err(unsigned_varint::decode::Error::Insufficient) => Ok(None),
        Err(e) => Err(DecodeError::InvalidVarint(e.to_string())),
    }
}

/// Decodes the body of the header frame.
pub fn decode_carv1_header(frame: &[u8]) -> Result<CarV1Header, DecodeError> {
    let raw: RawCarHeader = serde_ipld_dagcbor::from_slice(frame)
        .map_err(|e| DecodeError::InvalidHeader(e.to_string()))?;
    match raw.version {
        Some(CARV1) => {}
        Some(version) => return Err(DecodeError::UnsupportedCarVersion(version)),
        None => return Err(DecodeError::MissingCarVersion),
    }
    let roots = raw
        .roots
        .and_then(|roots| NonEmpty::new(roots).ok())
        .ok_or(DecodeError::EmptyRoots)?;
    Ok(CarV1Header {
        roots,
        version: CARV1,
    })
}

/// Splits a block frame into its CID and the block bytes.
fn split_block_frame(frame: &[u8]) -> Result<(Cid, &[u8]), DecodeError> {
    if frame.is_empty() {
        return Err(DecodeError::EmptyFrame);
    }
    let mut cursor = frame;
    let cid = Cid::read_bytes(&mut cursor).map_err(|e| DecodeError::InvalidCid(e.to_string()))?;
    Ok((cid, cursor))
}

/// A block frame split by kind, borrowing from the frame.
enum Classified<'a> {
    Content(&'a [u8]),
    Metadata(DirManifest),
}

/// Sorts `block` into content or metadata. Metadata nodes are verified here,
/// content is left to the caller.
fn classify<'a>(cid: &Cid, block: &'a [u8]) -> Result<Classified<'a>, DecodeError> {
    match cid.codec() {
        RAW_CODEC => Ok(Classified::Content(block)),
        DAG_PB_CODEC => {
            let node = decode_dag_pb(block).map_err(|e| unixfs_error(*cid, e))?;
            if node.is_leaf() {
                return Ok(Classified::Content(node.data.unwrap_or_default()));
            }
            match digest_matches(cid, block) {
                Some(true) => Ok(Classified::Metadata(DirManifest::from(node))),
                Some(false) => Err(DecodeError::DigestMismatch(*cid)),
                None => Err(DecodeError::UnsupportedHashCode(cid.hash().code())),
            }
        }
        codec => Err(DecodeError::UnsupportedCodec(codec)),
    }
}

/// Classifies a block frame. Metadata nodes are parsed and verified here,
/// content is left for [`decode_block_content`].
pub fn decode_block_info(frame: &[u8]) -> Result<BlockInfo, DecodeError> {
    let (cid, block) = split_block_frame(frame)?;
    let kind = match classify(&cid, block)? {
        Classified::Content(_) => BlockKind::Content,
        Classified::Metadata(manifest) => BlockKind::Metadata(manifest),
    };
    Ok(BlockInfo { cid, kind })
}

/// Decodes a content frame and checks its bytes against the CID.
///
/// For `dag-pb` leaves the returned data is the UnixFS payload, while the
/// hash covers the whole encoded node. The data shares memory with `frame`.
pub fn decode_block_content(frame: &Bytes) -> Result<ContentBlock, DecodeError> {
    let (cid, block) = split_block_frame(frame)?;
    match classify(&cid, block)? {
        Classified::Content(data) => Ok(ContentBlock {
            cid,
            data: frame.slice_ref(data),
            verified: digest_matches(&cid, block).unwrap_or(false),
        }),
        Classified::Metadata(_) => Err(DecodeError::NotContent(cid)),
    }
}

/// Decodes any block frame into a [`Block`], parsing it only once.
pub fn decode_block(frame: &Bytes) -> Result<Block, DecodeError> {
    let (cid, block) = split_block_frame(frame)?;
    Ok(match classify(&cid, block)? {
        Classified::Content(data) => Block::Content {
            cid,
            data: frame.slice_ref(data),
            verified: digest_matches(&cid, block).unwrap_or(false),
        },
        Classified::Metadata(manifest) => Block::Metadata { cid, manifest },
    })
}

fn unixfs_error(cid: Cid, e: UnixFsError) -> DecodeError {
    DecodeError::InvalidUnixFs {
        cid,
        reason: e.to_string(),
    }
}
