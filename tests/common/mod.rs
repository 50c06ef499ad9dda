// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

#![allow(dead_code)]

use assert_cmd::{Command, cargo::cargo_bin_cmd};
use async_trait::async_trait;
use bytes::Bytes;
use cid::Cid;
use futures::{StreamExt as _, stream};
use ipfs_trustless::error::Error;
use ipfs_trustless::requester::{ChunkStream, HttpClient};
use ipfs_trustless::utils::multihash::prelude::*;
use serde::Serialize;
use url::Url;

pub fn fetch_cmd() -> Command {
    cargo_bin_cmd!("ipfs-fetch")
}

pub fn raw_cid(data: &[u8]) -> Cid {
    Cid::new_v1(0x55, MultihashCode::Sha2_256.digest(data))
}

pub fn dag_pb_cid(node: &[u8]) -> Cid {
    Cid::new_v1(0x70, MultihashCode::Sha2_256.digest(node))
}

fn varint(buf: &mut Vec<u8>, value: usize) {
    let mut tmp = unsigned_varint::encode::usize_buffer();
    buf.extend_from_slice(unsigned_varint::encode::usize(value, &mut tmp));
}

fn field(buf: &mut Vec<u8>, tag: u8, bytes: &[u8]) {
    buf.push(tag);
    varint(buf, bytes.len());
    buf.extend_from_slice(bytes);
}

/// A UnixFS file node linking `children`, given as `(cid, size)`.
pub fn file_node(children: &[(Cid, usize)]) -> Vec<u8> {
    let mut data = vec![0x08, 0x02, 0x18];
    varint(&mut data, children.iter().map(|(_, size)| size).sum());
    for (_, size) in children {
        data.push(0x20);
        varint(&mut data, *size);
    }
    let mut node = Vec::new();
    for (cid, size) in children {
        let mut link = Vec::new();
        field(&mut link, 0x0a, &cid.to_bytes());
        field(&mut link, 0x12, b"");
        link.push(0x18);
        varint(&mut link, *size);
        field(&mut node, 0x12, &link);
    }
    field(&mut node, 0x0a, &data);
    node
}

/// A CARv1 archive holding `blocks` in the given order.
pub fn car(roots: &[Cid], blocks: &[(Cid, Vec<u8>)]) -> Vec<u8> {
    #[derive(Serialize)]
    struct Header<'a> {
        roots: &'a [Cid],
        version: u64,
    }
    let header = serde_ipld_dagcbor::to_vec(&Header { roots, version: 1 }).unwrap();
    let mut car = Vec::new();
    varint(&mut car, header.len());
    car.extend(header);
    for (cid, block) in blocks {
        let cid = cid.to_bytes();
        varint(&mut car, cid.len() + block.len());
        car.extend(cid);
        car.extend_from_slice(block);
    }
    car
}

/// Gateway double answering every request with the same body.
pub struct StaticGateway {
    pub body: Vec<u8>,
    pub chunk_size: usize,
}

#[async_trait]
impl HttpClient for StaticGateway {
    async fn get(&self, _url: &Url, _accept: &str) -> Result<ChunkStream, Error> {
        let chunks: Vec<std::io::Result<Bytes>> = self
            .body
            .chunks(self.chunk_size)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        Ok(stream::iter(chunks).boxed())
    }
}
