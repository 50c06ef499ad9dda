// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Decoded CAR frames.
//!
//! Every frame of a trustless CAR response becomes exactly one [`Block`]:
//! the leading header frame becomes [`Block::Root`], UnixFS nodes that point
//! to other nodes become [`Block::Metadata`] and file chunks become
//! [`Block::Content`]. Only content blocks carry a verification outcome.

use bytes::Bytes;
use cid::Cid;
use nunny::Vec as NonEmpty;
use serde::Serialize;

use crate::unixfs::{UnixFsNode, UnixFsType};

/// One child reference of a UnixFS node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DjLink {
    pub hash: Cid,
    pub name: String,
    /// Cumulative size of the linked sub-DAG, as declared by the parent.
    pub size: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct UnixTime {
    pub seconds: i64,
    pub nanos: Option<u32>,
}

/// Parsed fields of a directory or file-manifest node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirManifest {
    pub node_type: UnixFsType,
    pub links: Vec<DjLink>,
    /// Small payload embedded in the node itself.
    pub data: Option<Bytes>,
    pub filesize: Option<u64>,
    /// Size of the file content below each link, in link order.
    pub blocksizes: Vec<u64>,
    pub hash_type: Option<u64>,
    pub fanout: Option<u64>,
    pub mode: Option<u32>,
    pub mtime: Option<UnixTime>,
}

impl DirManifest {
    /// Number of file bytes this node stands for. For directories this is the
    /// sum of the cumulative sizes of their entries.
    ///
    /// `None` when the declared sizes overflow a `u64`.
    pub fn declared_size(&self) -> Option<u64> {
        if self.node_type == UnixFsType::Directory {
            return checked_sum(self.links.iter().map(|link| link.size));
        }
        match self.filesize {
            Some(filesize) => Some(filesize),
            None => checked_sum(self.blocksizes.iter().copied())?
                .checked_add(self.data.as_ref().map_or(0, |d| d.len() as u64)),
        }
    }

    pub fn find_link(&self, name: &str) -> Option<&DjLink> {
        self.links.iter().find(|link| link.name == name)
    }
}

fn checked_sum(sizes: impl IntoIterator<Item = u64>) -> Option<u64> {
    sizes.into_iter().try_fold(0u64, u64::checked_add)
}

impl From<UnixFsNode<'_>> for DirManifest {
    fn from(node: UnixFsNode<'_>) -> Self {
        DirManifest {
            node_type: node.node_type,
            links: node.links,
            data: node.data.map(Bytes::copy_from_slice),
            filesize: node.filesize,
            blocksizes: node.blocksizes,
            hash_type: node.hash_type,
            fanout: node.fanout,
            mode: node.mode,
            mtime: node.mtime,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    /// The CAR header pseudo-block. It has no CID of its own.
    Root(NonEmpty<Cid>),
    Metadata { cid: Cid, manifest: DirManifest },
    Content {
        cid: Cid,
        data: Bytes,
        /// Whether the block bytes hash to `cid`.
        verified: bool,
    },
}

impl Block {
    /// `None` for the header pseudo-block.
    pub fn cid(&self) -> Option<&Cid> {
        match self {
            Block::Root(_) => None,
            Block::Metadata { cid, .. } | Block::Content { cid, .. } => Some(cid),
        }
    }

    pub fn is_root(&self) -> bool {
        matches!(self, Block::Root(_))
    }

    pub fn is_metadata(&self) -> bool {
        matches!(self, Block::Metadata { .. })
    }

    pub fn is_content(&self) -> bool {
        matches!(self, Block::Content { .. })
    }

    /// `Some` exactly for content blocks.
    pub fn verified(&self) -> Option<bool> {
        match self {
            Block::Content { verified, .. } => Some(*verified),
            _ => None,
        }
    }

    pub fn roots(&self) -> Option<&NonEmpty<Cid>> {
        match self {
            Block::Root(roots) => Some(roots),
            _ => None,
        }
    }

    pub fn manifest(&self) -> Option<&DirManifest> {
        match self {
            Block::Metadata { manifest, .. } => Some(manifest),
            _ => None,
        }
    }
}

/// A block of the DAG itself, as kept by [`crate::dag::DagNodesCollector`].
/// Unlike [`Block`] it can never be the CAR header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DagNode {
    Metadata { cid: Cid, manifest: DirManifest },
    Content { cid: Cid, data: Bytes, verified: bool },
}

impl DagNode {
    pub fn cid(&self) -> &Cid {
        match self {
            DagNode::Metadata { cid, .. } | DagNode::Content { cid, .. } => cid,
        }
    }

    pub fn is_metadata(&self) -> bool {
        matches!(self, DagNode::Metadata { .. })
    }

    pub fn manifest(&self) -> Option<&DirManifest> {
        match self {
            DagNode::Metadata { manifest, .. } => Some(manifest),
            DagNode::Content { .. } => None,
        }
    }

    /// File bytes this node stands for: the payload length of a content
    /// block, or the declared size of a metadata node.
    pub fn declared_size(&self) -> Option<u64> {
        match self {
            DagNode::Metadata { manifest, .. } => manifest.declared_size(),
            DagNode::Content { data, .. } => Some(data.len() as u64),
        }
    }
}
