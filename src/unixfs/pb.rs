// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Protobuf messages of the `dag-pb` codec and the UnixFS `Data` payload.
//!
//! Field layout follows <https://ipld.io/specs/codecs/dag-pb/spec/> and
//! <https://github.com/ipfs/specs/blob/main/UNIXFS.md>. Only decoding is
//! implemented; unknown fields are skipped.

#![allow(non_snake_case)]

use quick_protobuf::{BytesReader, MessageRead, Result};
use std::borrow::Cow;

/// `PBLink` of the `dag-pb` codec.
#[derive(Debug, Default, PartialEq, Clone)]
pub struct PbLink<'a> {
    pub Hash: Option<Cow<'a, [u8]>>,
    pub Name: Option<Cow<'a, str>>,
    pub Tsize: Option<u64>,
}

impl<'a> MessageRead<'a> for PbLink<'a> {
    fn from_reader(r: &mut BytesReader, bytes: &'a [u8]) -> Result<Self> {
        let mut msg = Self::default();
        while !r.is_eof() {
            match r.next_tag(bytes) {
                Ok(10) => msg.Hash = Some(r.read_bytes(bytes).map(Cow::Borrowed)?),
                Ok(18) => msg.Name = Some(r.read_string(bytes).map(Cow::Borrowed)?),
                Ok(24) => msg.Tsize = Some(r.read_uint64(bytes)?),
                Ok(t) => {
                    r.read_unknown(bytes, t)?;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(msg)
    }
}

/// `PBNode` of the `dag-pb` codec. Canonical encoders write `Links` before
/// `Data` even though the field numbers are the other way around.
#[derive(Debug, Default, PartialEq, Clone)]
pub struct PbNode<'a> {
    pub Links: Vec<PbLink<'a>>,
    pub Data: Option<Cow<'a, [u8]>>,
}

impl<'a> MessageRead<'a> for PbNode<'a> {
    fn from_reader(r: &mut BytesReader, bytes: &'a [u8]) -> Result<Self> {
        let mut msg = Self::default();
        while !r.is_eof() {
            match r.next_tag(bytes) {
                Ok(10) => msg.Data = Some(r.read_bytes(bytes).map(Cow::Borrowed)?),
                Ok(18) => msg.Links.push(r.read_message::<PbLink>(bytes)?),
                Ok(t) => {
                    r.read_unknown(bytes, t)?;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(msg)
    }
}

/// UnixFS modification time.
#[derive(Debug, Default, PartialEq, Eq, Clone, Copy)]
pub struct UnixTime {
    pub Seconds: i64,
    pub FractionalNanoseconds: Option<u32>,
}

impl<'a> MessageRead<'a> for UnixTime {
    fn from_reader(r: &mut BytesReader, bytes: &'a [u8]) -> Result<Self> {
        let mut msg = Self::default();
        while !r.is_eof() {
            match r.next_tag(bytes) {
                Ok(8) => msg.Seconds = r.read_int64(bytes)?,
                Ok(21) => msg.FractionalNanoseconds = Some(r.read_fixed32(bytes)?),
                Ok(t) => {
                    r.read_unknown(bytes, t)?;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(msg)
    }
}

/// UnixFS `Data` message, carried in [`PbNode::Data`].
///
/// `Type` is kept as the raw enum value so that an unknown node type can be
/// reported by the caller instead of being coerced to a default.
#[derive(Debug, Default, PartialEq, Clone)]
pub struct Data<'a> {
    pub Type: Option<i32>,
    pub Data: Option<Cow<'a, [u8]>>,
    pub filesize: Option<u64>,
    pub blocksizes: Vec<u64>,
    pub hashType: Option<u64>,
    pub fanout: Option<u64>,
    pub mode: Option<u32>,
    pub mtime: Option<UnixTime>,
}

impl<'a> MessageRead<'a> for Data<'a> {
    fn from_reader(r: &mut BytesReader, bytes: &'a [u8]) -> Result<Self> {
        let mut msg = Self::default();
        while !r.is_eof() {
            match r.next_tag(bytes) {
                Ok(8) => msg.Type = Some(r.read_int32(bytes)?),
                Ok(18) => msg.Data = Some(r.read_bytes(bytes).map(Cow::Borrowed)?),
                Ok(24) => msg.filesize = Some(r.read_uint64(bytes)?),
                // proto2 encoders emit unpacked repeated fields, be lenient about packed ones
                Ok(32) => msg.blocksizes.push(r.read_uint64(bytes)?),
                Ok(34) => msg
                    .blocksizes
                    .extend(r.read_packed(bytes, |r, bytes| r.read_uint64(bytes))?),
                Ok(40) => msg.hashType = Some(r.read_uint64(bytes)?),
                Ok(48) => msg.fanout = Some(r.read_uint64(bytes)?),
                Ok(56) => msg.mode = Some(r.read_uint32(bytes)?),
                Ok(66) => msg.mtime = Some(r.read_message::<UnixTime>(bytes)?),
                Ok(t) => {
                    r.read_unknown(bytes, t)?;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(msg)
    }
}
