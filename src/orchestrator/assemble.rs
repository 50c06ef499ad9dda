// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Turns the blocks of a finished CAR response into the bytes of the
//! requested entity.
//!
//! Files are reassembled by a pre-order walk: the embedded data of a node
//! comes first, then each of its links in link table order, recursively.
//! Directories are either redirected to their slash-terminated URL or listed
//! as JSON.

use ahash::HashSet;
use bytes::{Bytes, BytesMut};
use cid::Cid;
use serde_json::json;
use tracing::debug;

use crate::block::{DagNode, DirManifest};
use crate::config::RetrievalConfig;
use crate::dag::DagNodesCollector;
use crate::error::Error;
use crate::request::{IpfsTrustlessRequest, IpfsTrustlessResponse};
use crate::requester::TrustlessTarget;
use crate::unixfs::UnixFsType;

const JSON_MIME: &str = "application/json";
const TEXT_MIME: &str = "text/plain; charset=utf-8";
const BINARY_MIME: &str = "application/octet-stream";

/// A complete response before it is split into chunks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assembled {
    pub mime: String,
    pub status: u16,
    pub body: Bytes,
    pub location: Option<url::Url>,
    pub total_size: u64,
}

impl Assembled {
    /// Splits the body into chunks of at most `chunk_size` bytes. There is
    /// always at least one chunk, and only the last one is flagged as such.
    pub fn into_chunks(self, chunk_size: usize) -> Vec<IpfsTrustlessResponse> {
        let chunk_size = chunk_size.max(1);
        let mut bodies = Vec::new();
        let mut rest = self.body;
        while rest.len() > chunk_size {
            bodies.push(rest.split_to(chunk_size));
        }
        bodies.push(rest);

        let last = bodies.len() - 1;
        bodies
            .into_iter()
            .enumerate()
            .map(|(i, body)| IpfsTrustlessResponse {
                mime: self.mime.clone(),
                status: self.status,
                body,
                location: self.location.clone(),
                total_size: self.total_size,
                is_last_chunk: i == last,
            })
            .collect()
    }
}

/// CIDv0 and CIDv1 of the same node compare equal.
fn same_node(a: &Cid, b: &Cid) -> bool {
    a.codec() == b.codec() && a.hash() == b.hash()
}

pub fn assemble(
    collector: &DagNodesCollector,
    target: &TrustlessTarget,
    request: &IpfsTrustlessRequest,
    limits: &RetrievalConfig,
) -> Result<Assembled, Error> {
    let roots = collector.roots().ok_or(Error::MissingHeader)?;
    let root_cid = *target.cid();
    if !roots.iter().any(|root| same_node(root, &root_cid)) {
        return Err(Error::UnexpectedRoot(root_cid));
    }
    let root = collector
        .get_block_by_cid(&root_cid)
        .ok_or(Error::RootNotFound(root_cid))?;
    let (cid, block) = resolve_path(collector, root_cid, root, target.path())?;
    let name = target.path().last().map(String::as_str);

    match block {
        DagNode::Content { data, verified, .. } => {
            if !verified {
                return Err(Error::UnverifiedContent(cid));
            }
            let body = if request.only_structure {
                Bytes::new()
            } else {
                data.clone()
            };
            Ok(file_response(name, body, data.len() as u64))
        }
        DagNode::Metadata { manifest, .. } => match manifest.node_type {
            UnixFsType::Directory => directory_response(cid, manifest, request),
            UnixFsType::File | UnixFsType::Raw => {
                if request.only_structure {
                    let total_size = manifest
                        .declared_size()
                        .ok_or(Error::SizeOverflow(cid))?;
                    return Ok(file_response(name, Bytes::new(), total_size));
                }
                let body = assemble_file(collector, cid, manifest, limits)?;
                let total_size = body.len() as u64;
                Ok(file_response(name, body, total_size))
            }
            node_type => Err(Error::UnsupportedNodeType { cid, node_type }),
        },
    }
}

/// Follows `path` through directory nodes, one link name per segment.
fn resolve_path<'a>(
    collector: &'a DagNodesCollector,
    mut cid: Cid,
    mut block: &'a DagNode,
    path: &[String],
) -> Result<(Cid, &'a DagNode), Error> {
    for segment in path {
        let manifest = match block.manifest() {
            Some(m) if m.node_type == UnixFsType::Directory => m,
            Some(m) if m.node_type == UnixFsType::HamtShard => {
                return Err(Error::UnsupportedNodeType {
                    cid,
                    node_type: m.node_type,
                });
            }
            _ => return Err(Error::NotADirectory(cid)),
        };
        let link = manifest
            .find_link(segment)
            .ok_or_else(|| Error::PathNotFound {
                parent: cid,
                segment: segment.clone(),
            })?;
        cid = link.hash;
        block = collector
            .get_block_by_cid(&cid)
            .ok_or(Error::MissingBlock(cid))?;
    }
    Ok((cid, block))
}

fn assemble_file(
    collector: &DagNodesCollector,
    cid: Cid,
    manifest: &DirManifest,
    limits: &RetrievalConfig,
) -> Result<Bytes, Error> {
    let limit = limits.max_buffered_data;
    let mut body = BytesMut::new();
    // nodes linked more than once are only checked on their first visit
    let mut checked = HashSet::default();
    for node in collector.dfs(cid, limits.max_dag_nodes) {
        let chunk = match node? {
            DagNode::Content { cid, data, verified } => {
                if !verified {
                    return Err(Error::UnverifiedContent(*cid));
                }
                Some(data)
            }
            DagNode::Metadata { cid, manifest } => {
                if !manifest.node_type.is_file_like() {
                    return Err(Error::UnsupportedNodeType {
                        cid: *cid,
                        node_type: manifest.node_type,
                    });
                }
                if checked.insert(*cid) {
                    check_blocksizes(collector, cid, manifest)?;
                }
                manifest.data.as_ref()
            }
        };
        if let Some(chunk) = chunk {
            if (body.len() + chunk.len()) as u64 > limit {
                return Err(Error::MaxBufferedData { limit });
            }
            body.extend_from_slice(chunk);
        }
    }

    let actual = body.len() as u64;
    match manifest.filesize {
        Some(expected) if expected != actual => Err(Error::FileSizeMismatch {
            cid,
            expected,
            actual,
        }),
        _ => {
            debug!(%cid, size = actual, "file assembled");
            Ok(body.freeze())
        }
    }
}

/// Each `blocksizes` entry must match the size of the child it stands for.
fn check_blocksizes(
    collector: &DagNodesCollector,
    cid: &Cid,
    manifest: &DirManifest,
) -> Result<(), Error> {
    if manifest.blocksizes.is_empty() {
        return Ok(());
    }
    let mismatch = || Error::BlockSizeMismatch { cid: *cid };
    if manifest.blocksizes.len() != manifest.links.len() {
        return Err(mismatch());
    }
    for (link, size) in manifest.links.iter().zip(&manifest.blocksizes) {
        let child = collector
            .get_block_by_cid(&link.hash)
            .ok_or(Error::MissingBlock(link.hash))?;
        let declared = child
            .declared_size()
            .ok_or(Error::SizeOverflow(link.hash))?;
        if declared != *size {
            return Err(mismatch());
        }
    }
    Ok(())
}

fn file_response(name: Option<&str>, body: Bytes, total_size: u64) -> Assembled {
    Assembled {
        mime: guess_mime(name, &body),
        status: 200,
        body,
        location: None,
        total_size,
    }
}

fn directory_response(
    cid: Cid,
    manifest: &DirManifest,
    request: &IpfsTrustlessRequest,
) -> Result<Assembled, Error> {
    if !request.url.path().ends_with('/') {
        let mut location = request.url.clone();
        location.set_path(&format!("{}/", request.url.path()));
        return Ok(Assembled {
            mime: TEXT_MIME.into(),
            status: 301,
            body: Bytes::new(),
            location: Some(location),
            total_size: 0,
        });
    }
    let total_size = manifest.declared_size().ok_or(Error::SizeOverflow(cid))?;
    let body = if request.only_structure {
        Bytes::new()
    } else {
        let entries: Vec<_> = manifest
            .links
            .iter()
            .map(|link| json!({ "name": link.name, "cid": link.hash.to_string(), "size": link.size }))
            .collect();
        Bytes::from(serde_json::Value::from(entries).to_string())
    };
    Ok(Assembled {
        mime: JSON_MIME.into(),
        status: 200,
        body,
        location: None,
        total_size,
    })
}

/// Guesses from the file name, else from the bytes.
fn guess_mime(name: Option<&str>, body: &[u8]) -> String {
    name.and_then(|name| mime_guess::from_path(name).first())
        .map(|mime| mime.to_string())
        .unwrap_or_else(|| {
            if std::str::from_utf8(body).is_ok() {
                TEXT_MIME
            } else {
                BINARY_MIME
            }
            .to_owned()
        })
}
