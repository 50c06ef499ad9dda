// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Per-request store of decoded blocks.

use ahash::HashMap;
use cid::Cid;
use nunny::Vec as NonEmpty;
use tracing::debug;

use crate::block::{Block, DagNode};
use crate::error::Error;

/// Owns every block of one CAR response, keyed by CID.
///
/// CIDv0 and CIDv1 spellings of the same node share a key.
#[derive(Debug, Default)]
pub struct DagNodesCollector {
    root: Option<Block>,
    nodes: HashMap<Cid, DagNode>,
}

fn key(cid: &Cid) -> Cid {
    cid.into_v1().unwrap_or(*cid)
}

impl DagNodesCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes ownership of `block`. A new header replaces the previous one.
    pub fn collect_block(&mut self, block: Block) {
        let node = match block {
            Block::Root(roots) => {
                if self.root.is_some() {
                    debug!("replacing CAR roots");
                }
                self.root = Some(Block::Root(roots));
                return;
            }
            Block::Metadata { cid, manifest } => DagNode::Metadata { cid, manifest },
            Block::Content { cid, data, verified } => DagNode::Content {
                cid,
                data,
                verified,
            },
        };
        self.nodes.insert(key(node.cid()), node);
    }

    pub fn get_root_block(&self) -> Option<&Block> {
        self.root.as_ref()
    }

    pub fn roots(&self) -> Option<&NonEmpty<Cid>> {
        self.root.as_ref().and_then(Block::roots)
    }

    pub fn get_block_by_cid(&self, cid: &Cid) -> Option<&DagNode> {
        self.nodes.get(&key(cid))
    }

    /// Number of collected blocks, header included.
    pub fn len(&self) -> usize {
        self.nodes.len() + usize::from(self.root.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.root = None;
        self.nodes.clear();
    }

    /// Pre-order depth-first walk from `start`, following metadata links in
    /// link order.
    ///
    /// A node linked several times is visited each time, and every visit counts
    /// against `max_nodes`. The walk stops after the first missing block or
    /// once the budget is spent.
    pub fn dfs(&self, start: Cid, max_nodes: u64) -> Dfs<'_> {
        Dfs {
            collector: self,
            stack: vec![start],
            visited: 0,
            max_nodes,
            failed: false,
        }
    }
}

/// Iterator returned by [`DagNodesCollector::dfs`].
pub struct Dfs<'a> {
    collector: &'a DagNodesCollector,
    stack: Vec<Cid>,
    visited: u64,
    max_nodes: u64,
    failed: bool,
}

impl<'a> Iterator for Dfs<'a> {
    type Item = Result<&'a DagNode, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let cid = self.stack.pop()?;
        if self.visited >= self.max_nodes {
            self.failed = true;
            return Some(Err(Error::MaxDagNodes {
                limit: self.max_nodes,
            }));
        }
        self.visited += 1;
        let Some(node) = self.collector.get_block_by_cid(&cid) else {
            self.failed = true;
            return Some(Err(Error::MissingBlock(cid)));
        };
        if let Some(manifest) = node.manifest() {
            self.stack
                .extend(manifest.links.iter().rev().map(|link| link.hash));
        }
        Some(Ok(node))
    }
}
