// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! CAR fixtures and HTTP doubles shared by the unit tests.

use async_trait::async_trait;
use bytes::Bytes;
use cid::Cid;
use futures::{StreamExt as _, stream};
use parking_lot::Mutex;
use serde::Serialize;
use std::io;
use url::Url;

use crate::car::decoder::{DAG_PB_CODEC, RAW_CODEC};
use crate::error::Error;
use crate::requester::{ChunkStream, HttpClient};
use crate::utils::multihash::prelude::*;

const UNIXFS_DIRECTORY: i32 = 1;
const UNIXFS_FILE: i32 = 2;

pub fn raw_cid(data: &[u8]) -> Cid {
    Cid::new_v1(RAW_CODEC, MultihashCode::Sha2_256.digest(data))
}

pub fn dag_pb_cid(block: &[u8]) -> Cid {
    Cid::new_v1(DAG_PB_CODEC, MultihashCode::Sha2_256.digest(block))
}

fn put_varint(buf: &mut Vec<u8>, value: u64) {
    let mut tmp = unsigned_varint::encode::u64_buffer();
    buf.extend_from_slice(unsigned_varint::encode::u64(value, &mut tmp));
}

fn put_bytes_field(buf: &mut Vec<u8>, tag: u8, bytes: &[u8]) {
    buf.push(tag);
    put_varint(buf, bytes.len() as u64);
    buf.extend_from_slice(bytes);
}

/// Encodes a UnixFS `Data` message, with unpacked `blocksizes`.
pub fn unixfs_data(ty: i32, data: Option<&[u8]>, filesize: Option<u64>, blocksizes: &[u64]) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.push(0x08);
    put_varint(&mut buf, ty as u64);
    if let Some(data) = data {
        put_bytes_field(&mut buf, 0x12, data);
    }
    if let Some(filesize) = filesize {
        buf.push(0x18);
        put_varint(&mut buf, filesize);
    }
    for size in blocksizes {
        buf.push(0x20);
        put_varint(&mut buf, *size);
    }
    buf
}

/// Encodes a `dag-pb` node in canonical order: links first, then `Data`.
/// `Data` is always written, even when empty.
pub fn pb_node(links: &[(Cid, &str, u64)], data: &[u8]) -> Vec<u8> {
    let mut buf = Vec::new();
    for (cid, name, tsize) in links {
        let mut link = Vec::new();
        put_bytes_field(&mut link, 0x0a, &cid.to_bytes());
        put_bytes_field(&mut link, 0x12, name.as_bytes());
        link.push(0x18);
        put_varint(&mut link, *tsize);
        put_bytes_field(&mut buf, 0x12, &link);
    }
    put_bytes_field(&mut buf, 0x0a, data);
    buf
}

/// DAG-CBOR encoding of a CID: tag 42 around the bytes with a multibase
/// identity prefix.
pub fn cbor_cid(cid: &Cid) -> Vec<u8> {
    let bytes = cid.to_bytes();
    let len = bytes.len() + 1;
    let mut buf = vec![0xd8, 0x2a];
    match len {
        0..24 => buf.push(0x40 | len as u8),
        24..256 => buf.extend([0x58, len as u8]),
        _ => buf.extend([0x59, (len >> 8) as u8, len as u8]),
    }
    buf.push(0x00);
    buf.extend(bytes);
    buf
}

pub fn encode_header(roots: &[Cid], version: u64) -> Vec<u8> {
    #[derive(Serialize)]
    struct Header<'a> {
        roots: &'a [Cid],
        version: u64,
    }
    serde_ipld_dagcbor::to_vec(&Header { roots, version }).unwrap()
}

/// Body of a block frame: the CID bytes followed by the block.
pub fn block_frame_body(cid: &Cid, block: &[u8]) -> Vec<u8> {
    let mut buf = cid.to_bytes();
    buf.extend_from_slice(block);
    buf
}

fn push_varint_frame(buf: &mut Vec<u8>, frame: &[u8]) {
    put_varint(buf, frame.len() as u64);
    buf.extend_from_slice(frame);
}

/// Builds CARv1 archives frame by frame. Blocks are written in the order they
/// are added.
#[derive(Debug, Default)]
pub struct CarFixture {
    body: Vec<u8>,
}

/// A finished archive together with what it encodes.
#[derive(Debug, Clone)]
pub struct FixtureCar {
    pub car: Vec<u8>,
    pub root: Cid,
    /// The file entity, equal to `root` unless the root is a directory.
    pub file: Cid,
    pub content: Vec<u8>,
}

impl CarFixture {
    pub fn push_frame(&mut self, cid: &Cid, block: &[u8]) {
        push_varint_frame(&mut self.body, &block_frame_body(cid, block));
    }

    pub fn raw_leaf(&mut self, data: &[u8]) -> Cid {
        let cid = raw_cid(data);
        self.push_frame(&cid, data);
        cid
    }

    /// A `dag-pb` file node without links.
    pub fn file_leaf(&mut self, data: &[u8]) -> Cid {
        let node = pb_node(&[], &unixfs_data(UNIXFS_FILE, Some(data), Some(data.len() as u64), &[]));
        let cid = dag_pb_cid(&node);
        self.push_frame(&cid, &node);
        cid
    }

    /// A file node over `children`, given as `(cid, content size)`.
    pub fn file(&mut self, data: Option<&[u8]>, children: &[(Cid, u64)]) -> Cid {
        let node = file_node(data, children);
        let cid = dag_pb_cid(&node);
        self.push_frame(&cid, &node);
        cid
    }

    pub fn directory(&mut self, entries: &[(&str, Cid, u64)]) -> Cid {
        let node = directory_node(entries);
        let cid = dag_pb_cid(&node);
        self.push_frame(&cid, &node);
        cid
    }

    pub fn to_car(&self, roots: &[Cid]) -> Vec<u8> {
        let mut car = Vec::new();
        push_varint_frame(&mut car, &encode_header(roots, 1));
        car.extend_from_slice(&self.body);
        car
    }

    /// `hello world\n` as a single raw block.
    pub fn single_block_file() -> FixtureCar {
        let content = b"hello world\n".to_vec();
        let mut fixture = CarFixture::default();
        let root = fixture.raw_leaf(&content);
        FixtureCar {
            car: fixture.to_car(&[root]),
            root,
            file: root,
            content,
        }
    }

    /// A directory holding `file.txt`, a 1026 byte text file split into seven
    /// raw leaves. Ten frames in depth-first order: header, directory, file,
    /// leaves.
    pub fn multi_block_file() -> FixtureCar {
        let content = lorem(1026);
        let leaves: Vec<&[u8]> = content.chunks(147).collect();
        let children: Vec<(Cid, u64)> = leaves
            .iter()
            .map(|leaf| (raw_cid(leaf), leaf.len() as u64))
            .collect();
        let file = file_node(None, &children);
        let file_cid = dag_pb_cid(&file);
        let dir = directory_node(&[("file.txt", file_cid, (file.len() + content.len()) as u64)]);
        let dir_cid = dag_pb_cid(&dir);

        let mut fixture = CarFixture::default();
        fixture.push_frame(&dir_cid, &dir);
        fixture.push_frame(&file_cid, &file);
        for leaf in &leaves {
            fixture.raw_leaf(leaf);
        }
        FixtureCar {
            car: fixture.to_car(&[dir_cid]),
            root: dir_cid,
            file: file_cid,
            content,
        }
    }
}

pub fn file_node(data: Option<&[u8]>, children: &[(Cid, u64)]) -> Vec<u8> {
    let blocksizes: Vec<u64> = children.iter().map(|(_, size)| *size).collect();
    let filesize = data.map_or(0, |d| d.len() as u64) + blocksizes.iter().sum::<u64>();
    let links: Vec<(Cid, &str, u64)> = children.iter().map(|(cid, size)| (*cid, "", *size)).collect();
    pb_node(&links, &unixfs_data(UNIXFS_FILE, data, Some(filesize), &blocksizes))
}

pub fn directory_node(entries: &[(&str, Cid, u64)]) -> Vec<u8> {
    let links: Vec<(Cid, &str, u64)> = entries
        .iter()
        .map(|(name, cid, size)| (*cid, *name, *size))
        .collect();
    pb_node(&links, &unixfs_data(UNIXFS_DIRECTORY, None, None, &[]))
}

fn lorem(len: usize) -> Vec<u8> {
    const TEXT: &[u8] = b"Lorem ipsum dolor sit amet, consectetur adipiscing elit, sed do \
        eiusmod tempor incididunt ut labore et dolore magna aliqua.\n";
    TEXT.iter().copied().cycle().take(len).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Behavior {
    Serve,
    FailAfter(usize),
    Status(u16),
    Stall,
}

/// In-memory gateway serving a fixed body in fixed-size chunks.
#[derive(Debug)]
pub struct MockHttpClient {
    body: Vec<u8>,
    chunk_size: usize,
    behavior: Behavior,
    requested: Mutex<Vec<(Url, String)>>,
}

impl MockHttpClient {
    pub fn serving(body: Vec<u8>, chunk_size: usize) -> Self {
        Self {
            body,
            chunk_size: chunk_size.max(1),
            behavior: Behavior::Serve,
            requested: Mutex::default(),
        }
    }

    /// Breaks the connection after `chunks` chunks.
    pub fn failing_after(mut self, chunks: usize) -> Self {
        self.behavior = Behavior::FailAfter(chunks);
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.behavior = Behavior::Status(status);
        self
    }

    /// Sends the first chunk and then never anything again.
    pub fn stalling(mut self) -> Self {
        self.behavior = Behavior::Stall;
        self
    }

    /// Every `(url, accept)` pair requested so far.
    pub fn requests(&self) -> Vec<(Url, String)> {
        self.requested.lock().clone()
    }
}

#[async_trait]
impl HttpClient for MockHttpClient {
    async fn get(&self, url: &Url, accept: &str) -> Result<ChunkStream, Error> {
        self.requested.lock().push((url.clone(), accept.to_owned()));
        let chunks: Vec<io::Result<Bytes>> = self
            .body
            .chunks(self.chunk_size)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        Ok(match self.behavior {
            Behavior::Serve => stream::iter(chunks).boxed(),
            Behavior::FailAfter(n) => stream::iter(chunks.into_iter().take(n))
                .chain(stream::once(async {
                    Err(io::Error::new(io::ErrorKind::ConnectionReset, "connection reset"))
                }))
                .boxed(),
            Behavior::Status(status) => return Err(Error::HttpStatus(status)),
            Behavior::Stall => stream::iter(chunks.into_iter().take(1))
                .chain(stream::pending())
                .boxed(),
        })
    }
}
