// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use bytes::{Buf as _, Bytes, BytesMut};
use futures::{Stream, ready};
use pin_project_lite::pin_project;
use std::collections::VecDeque;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tracing::{debug, trace, warn};

use super::DecodeError;
use super::decoder::{decode_block, decode_carv1_header, decode_varint};
use crate::block::Block;
use crate::error::Error;

/// Largest frame accepted by default. Gateways chunk files into blocks of at
/// most 1 MiB, so this leaves plenty of room.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 4 * 1024 * 1024;

/// Sans-IO CARv1 decoder. Bytes go in chunk by chunk, complete frames come out
/// as [`Block`]s in stream order, header first.
#[derive(Debug)]
pub struct CarBlockReader {
    is_header_retrieved: bool,
    /// Bytes of a frame that is not complete yet.
    buffer: BytesMut,
    halted: bool,
    max_frame_size: usize,
}

impl Default for CarBlockReader {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_SIZE)
    }
}

impl CarBlockReader {
    pub fn new(max_frame_size: usize) -> Self {
        Self {
            is_header_retrieved: false,
            buffer: BytesMut::new(),
            halted: false,
            max_frame_size,
        }
    }

    pub fn is_header_retrieved(&self) -> bool {
        self.is_header_retrieved
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Number of bytes waiting for the rest of their frame.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Feeds one chunk of the response body and returns every block completed
    /// by it.
    ///
    /// The first error halts the reader: blocks of the failing chunk are
    /// discarded and later chunks are ignored.
    pub fn on_data_received(&mut self, chunk: &[u8]) -> Result<Vec<Block>, DecodeError> {
        if self.halted {
            trace!(len = chunk.len(), "reader halted, dropping chunk");
            return Ok(Vec::new());
        }
        self.buffer.extend_from_slice(chunk);
        let mut blocks = Vec::new();
        match self.drain_frames(&mut blocks) {
            Ok(()) => {
                trace!(
                    decoded = blocks.len(),
                    buffered = self.buffer.len(),
                    "chunk consumed"
                );
                Ok(blocks)
            }
            Err(e) => {
                warn!("CAR decoding failed: {e}");
                self.halted = true;
                self.buffer.clear();
                Err(e)
            }
        }
    }

    /// Signals the end of the response body.
    pub fn on_complete(&mut self) -> Result<(), DecodeError> {
        if self.halted {
            return Err(DecodeError::Halted);
        }
        if !self.buffer.is_empty() {
            return Err(DecodeError::TruncatedStream {
                remaining: self.buffer.len(),
            });
        }
        if !self.is_header_retrieved {
            return Err(DecodeError::MissingHeader);
        }
        Ok(())
    }

    fn drain_frames(&mut self, blocks: &mut Vec<Block>) -> Result<(), DecodeError> {
        loop {
            let (len, prefix_len) = match decode_varint(&self.buffer)? {
                Some((len, rest)) => (len, self.buffer.len() - rest.len()),
                None => return Ok(()),
            };
            if len == 0 {
                return Err(DecodeError::EmptyFrame);
            }
            let frame_len = usize::try_from(len)
                .ok()
                .filter(|len| *len <= self.max_frame_size)
                .ok_or(DecodeError::FrameTooLarge {
                    len,
                    max: self.max_frame_size,
                })?;
            if self.buffer.len() - prefix_len < frame_len {
                return Ok(());
            }
            self.buffer.advance(prefix_len);
            let frame = self.buffer.split_to(frame_len).freeze();
            blocks.push(self.decode_frame(frame)?);
        }
    }

    fn decode_frame(&mut self, frame: Bytes) -> Result<Block, DecodeError> {
        if !self.is_header_retrieved {
            let header = decode_carv1_header(&frame)?;
            self.is_header_retrieved = true;
            debug!(roots = header.roots.len(), "CAR header decoded");
            return Ok(Block::Root(header.roots));
        }
        let block = decode_block(&frame)?;
        if let Block::Content {
            cid,
            verified: false,
            ..
        } = &block
        {
            warn!(%cid, "content block does not match its CID");
        }
        debug!(cid = ?block.cid(), len = frame.len(), "block decoded");
        Ok(block)
    }
}

pin_project! {
    /// Stream of decoded blocks over a stream of body chunks.
    ///
    /// Blocks come out in stream order. A transport or decode failure is
    /// yielded once, after which the stream is exhausted. The stream only ends
    /// cleanly when the body was a complete CARv1 archive.
    pub struct CarBlockStream<S> {
        #[pin]
        inner: S,
        reader: CarBlockReader,
        pending: VecDeque<Block>,
        done: bool,
    }
}

impl<S> CarBlockStream<S> {
    pub fn new(inner: S, reader: CarBlockReader) -> Self {
        Self {
            inner,
            reader,
            pending: VecDeque::new(),
            done: false,
        }
    }

    pub fn reader(&self) -> &CarBlockReader {
        &self.reader
    }
}

impl<S> Stream for CarBlockStream<S>
where
    S: Stream<Item = io::Result<Bytes>>,
{
    type Item = Result<Block, Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();
        loop {
            if let Some(block) = this.pending.pop_front() {
                return Poll::Ready(Some(Ok(block)));
            }
            if *this.done {
                return Poll::Ready(None);
            }
            match ready!(this.inner.as_mut().poll_next(cx)) {
                Some(Ok(chunk)) => match this.reader.on_data_received(&chunk) {
                    Ok(blocks) => this.pending.extend(blocks),
                    Err(e) => {
                        *this.done = true;
                        return Poll::Ready(Some(Err(e.into())));
                    }
                },
                Some(Err(e)) => {
                    *this.done = true;
                    return Poll::Ready(Some(Err(Error::Transport(e))));
                }
                None => {
                    *this.done = true;
                    if let Err(e) = this.reader.on_complete() {
                        return Poll::Ready(Some(Err(e.into())));
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{CarFixture, raw_cid};
    use futures::{StreamExt as _, TryStreamExt as _, stream};
    use quickcheck_macros::quickcheck;

    fn read_all(reader: &mut CarBlockReader, chunks: impl IntoIterator<Item = Vec<u8>>) -> Vec<Block> {
        let mut blocks = Vec::new();
        for chunk in chunks {
            blocks.extend(reader.on_data_received(&chunk).unwrap());
        }
        reader.on_complete().unwrap();
        blocks
    }

    #[test]
    fn header_comes_first() {
        let fixture = CarFixture::multi_block_file();
        let blocks = read_all(&mut CarBlockReader::default(), [fixture.car.clone()]);
        assert_eq!(blocks.len(), 10);
        assert_eq!(blocks[0].roots().unwrap().first(), &fixture.root);
        assert!(blocks[1..].iter().all(|b| !b.is_root()));
        assert_eq!(blocks.iter().filter(|b| b.is_metadata()).count(), 2);
        assert_eq!(blocks.iter().filter(|b| b.is_content()).count(), 7);
        assert!(blocks.iter().filter_map(Block::verified).all(|v| v));
    }

    #[quickcheck]
    fn chunk_boundaries_do_not_matter(sizes: Vec<u8>) -> bool {
        let car = CarFixture::multi_block_file().car;
        let whole = read_all(&mut CarBlockReader::default(), [car.clone()]);

        let mut chunks = Vec::new();
        let mut rest = &car[..];
        let mut sizes = sizes.into_iter().map(|s| usize::from(s) + 1).cycle();
        while !rest.is_empty() {
            let size = sizes.next().unwrap_or(1).min(rest.len());
            let (chunk, tail) = rest.split_at(size);
            chunks.push(chunk.to_vec());
            rest = tail;
        }
        read_all(&mut CarBlockReader::default(), chunks) == whole
    }

    #[test]
    fn byte_at_a_time() {
        let car = CarFixture::single_block_file().car;
        let blocks = read_all(
            &mut CarBlockReader::default(),
            car.iter().map(|b| vec![*b]),
        );
        assert_eq!(blocks.len(), 2);
        assert!(matches!(&blocks[1], Block::Content { data, verified: true, .. } if data.len() == 12));
    }

    #[test]
    fn split_varint_waits_for_more_bytes() {
        let mut fixture = CarFixture::default();
        let leaf = fixture.raw_leaf(&[7u8; 200]);
        let car = fixture.to_car(&[leaf]);
        let header_len = car.len() - 200 - leaf.encoded_len() - 2;

        let mut reader = CarBlockReader::default();
        // header plus the first byte of the two byte block varint
        let blocks = reader.on_data_received(&car[..header_len + 1]).unwrap();
        assert_eq!(blocks.len(), 1);
        assert_eq!(reader.buffered_len(), 1);
        let blocks = reader.on_data_received(&car[header_len + 1..]).unwrap();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].cid(), Some(&leaf));
        reader.on_complete().unwrap();
    }

    #[test]
    fn truncated_stream_is_an_error() {
        let car = CarFixture::single_block_file().car;
        let mut reader = CarBlockReader::default();
        reader.on_data_received(&car[..car.len() - 3]).unwrap();
        assert!(matches!(
            reader.on_complete(),
            Err(DecodeError::TruncatedStream { .. })
        ));
    }

    #[test]
    fn empty_body_has_no_header() {
        let mut reader = CarBlockReader::default();
        assert_eq!(reader.on_complete(), Err(DecodeError::MissingHeader));
    }

    #[test]
    fn zero_length_frame_halts_the_reader() {
        let mut fixture = CarFixture::default();
        let leaf = fixture.raw_leaf(b"leaf");
        let mut car = fixture.to_car(&[leaf]);
        car.push(0x00);
        let mut reader = CarBlockReader::default();
        assert_eq!(reader.on_data_received(&car), Err(DecodeError::EmptyFrame));
        assert!(reader.is_halted());
        assert_eq!(reader.on_data_received(&car), Ok(vec![]));
        assert_eq!(reader.on_complete(), Err(DecodeError::Halted));
    }

    #[test]
    fn oversized_frame_is_rejected() {
        let mut fixture = CarFixture::default();
        let leaf = fixture.raw_leaf(&[1u8; 64]);
        let car = fixture.to_car(&[leaf]);
        let mut reader = CarBlockReader::new(32);
        assert!(matches!(
            reader.on_data_received(&car),
            Err(DecodeError::FrameTooLarge { max: 32, .. })
        ));
    }

    #[test]
    fn tampered_leaf_is_flagged_not_rejected() {
        let mut fixture = CarFixture::default();
        let cid = raw_cid(b"genuine");
        fixture.push_frame(&cid, b"forged!");
        let car = fixture.to_car(&[cid]);
        let blocks = read_all(&mut CarBlockReader::default(), [car]);
        assert_eq!(blocks[1].verified(), Some(false));
    }

    #[tokio::test]
    async fn stream_yields_blocks_then_ends() {
        let fixture = CarFixture::multi_block_file();
        let chunks: Vec<io::Result<Bytes>> = fixture
            .car
            .chunks(100)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        let blocks: Vec<Block> = CarBlockStream::new(stream::iter(chunks), CarBlockReader::default())
            .try_collect()
            .await
            .unwrap();
        assert_eq!(blocks.len(), 10);
        assert!(blocks[0].is_root());
    }

    #[tokio::test]
    async fn transport_error_is_yielded_once() {
        let car = CarFixture::single_block_file().car;
        let chunks = vec![
            Ok(Bytes::copy_from_slice(&car[..10])),
            Err(io::Error::other("connection reset")),
            Ok(Bytes::copy_from_slice(&car[10..])),
        ];
        let mut blocks = CarBlockStream::new(stream::iter(chunks), CarBlockReader::default());
        assert!(matches!(blocks.next().await, Some(Err(Error::Transport(_)))));
        assert!(blocks.next().await.is_none());
    }

    #[tokio::test]
    async fn truncated_body_fails_the_stream() {
        let car = CarFixture::single_block_file().car;
        let chunks = vec![Ok(Bytes::copy_from_slice(&car[..car.len() - 1]))];
        let results: Vec<_> = CarBlockStream::new(stream::iter(chunks), CarBlockReader::default())
            .collect()
            .await;
        assert!(results[0].as_ref().is_ok_and(Block::is_root));
        assert!(matches!(
            results.last(),
            Some(Err(Error::Decode(DecodeError::TruncatedStream { remaining: 48 })))
        ));
    }
}
