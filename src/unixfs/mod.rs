// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Decoding of `dag-pb` blocks carrying UnixFS nodes.

pub mod pb;

use cid::Cid;
use quick_protobuf::{BytesReader, MessageRead as _};
use serde::Serialize;
use std::{borrow::Cow, fmt};

use crate::block::{DjLink, UnixTime};

/// UnixFS node types, see <https://github.com/ipfs/specs/blob/main/UNIXFS.md#data-format>
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UnixFsType {
    Raw,
    Directory,
    File,
    Metadata,
    Symlink,
    HamtShard,
}

impl UnixFsType {
    /// Node types whose payload is file content.
    pub fn is_file_like(self) -> bool {
        matches!(self, UnixFsType::File | UnixFsType::Raw)
    }
}

impl TryFrom<i32> for UnixFsType {
    type Error = UnixFsError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => UnixFsType::Raw,
            1 => UnixFsType::Directory,
            2 => UnixFsType::File,
            3 => UnixFsType::Metadata,
            4 => UnixFsType::Symlink,
            5 => UnixFsType::HamtShard,
            other => return Err(UnixFsError::UnknownType(other)),
        })
    }
}

impl fmt::Display for UnixFsType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UnixFsType::Raw => "raw",
            UnixFsType::Directory => "directory",
            UnixFsType::File => "file",
            UnixFsType::Metadata => "metadata",
            UnixFsType::Symlink => "symlink",
            UnixFsType::HamtShard => "hamt-shard",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UnixFsError {
    #[error("malformed protobuf: {0}")]
    Protobuf(String),
    #[error("dag-pb node carries no UnixFS data")]
    MissingData,
    #[error("UnixFS data has no type")]
    MissingType,
    #[error("unknown UnixFS type {0}")]
    UnknownType(i32),
    #[error("link {index} has no hash")]
    MissingLinkHash { index: usize },
    #[error("link {index} has an invalid CID: {reason}")]
    InvalidLinkCid { index: usize, reason: String },
}

impl From<quick_protobuf::Error> for UnixFsError {
    fn from(e: quick_protobuf::Error) -> Self {
        UnixFsError::Protobuf(e.to_string())
    }
}

/// A decoded `dag-pb` node with its UnixFS payload, borrowing from the block bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct UnixFsNode<'a> {
    pub node_type: UnixFsType,
    pub links: Vec<DjLink>,
    pub data: Option<&'a [u8]>,
    pub filesize: Option<u64>,
    pub blocksizes: Vec<u64>,
    pub hash_type: Option<u64>,
    pub fanout: Option<u64>,
    pub mode: Option<u32>,
    pub mtime: Option<UnixTime>,
}

impl UnixFsNode<'_> {
    /// A file chunk that does not point anywhere else.
    pub fn is_leaf(&self) -> bool {
        self.node_type.is_file_like() && self.links.is_empty()
    }
}

/// Decodes a `dag-pb` block and its UnixFS `Data` message.
pub fn decode_dag_pb(block: &[u8]) -> Result<UnixFsNode<'_>, UnixFsError> {
    let mut reader = BytesReader::from_bytes(block);
    let node = pb::PbNode::from_reader(&mut reader, block)?;

    let links = node
        .Links
        .into_iter()
        .enumerate()
        .map(|(index, link)| {
            let hash = link.Hash.ok_or(UnixFsError::MissingLinkHash { index })?;
            let hash = Cid::try_from(hash.as_ref()).map_err(|e| UnixFsError::InvalidLinkCid {
                index,
                reason: e.to_string(),
            })?;
            Ok(DjLink {
                hash,
                name: link.Name.map(|n| n.into_owned()).unwrap_or_default(),
                size: link.Tsize.unwrap_or_default(),
            })
        })
        .collect::<Result<Vec<_>, UnixFsError>>()?;

    let payload = match node.Data {
        Some(Cow::Borrowed(payload)) => payload,
        // `PbNode::from_reader` only ever borrows
        Some(Cow::Owned(_)) | None => return Err(UnixFsError::MissingData),
    };
    let mut reader = BytesReader::from_bytes(payload);
    let data = pb::Data::from_reader(&mut reader, payload)?;
    let node_type = UnixFsType::try_from(data.Type.ok_or(UnixFsError::MissingType)?)?;

    Ok(UnixFsNode {
        node_type,
        links,
        data: match data.Data {
            Some(Cow::Borrowed(d)) => Some(d),
            Some(Cow::Owned(_)) => return Err(UnixFsError::MissingData),
            None => None,
        },
        filesize: data.filesize,
        blocksizes: data.blocksizes,
        hash_type: data.hashType,
        fanout: data.fanout,
        mode: data.mode,
        mtime: data.mtime.map(|t| UnixTime {
            seconds: t.Seconds,
            nanos: t.FractionalNanoseconds,
        }),
    })
}
