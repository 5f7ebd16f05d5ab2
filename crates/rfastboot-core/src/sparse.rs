//! Sparse image model
//!
//! A sparse image describes a large, mostly empty partition image as an
//! ordered run of chunks:
//!
//! - `Raw` - literal data, a whole number of blocks
//! - `Fill` - a block-aligned run repeating one 32-bit word
//! - `DontCare` - blocks left untouched on the device
//!
//! Only `Raw` and `Fill` chunks are stored; gaps between them are implicit
//! `DontCare` runs. Transfer lengths follow the Android sparse format
//! (28-byte file header, 12-byte chunk headers) so that splitting against a
//! device's download limit is exact. The byte-level encoding itself belongs
//! to the transport.

use std::collections::BTreeMap;
use std::io::Read;

use crate::error::{Error, Result};

/// Default sparse block size
pub const DEFAULT_BLOCK_SIZE: u32 = 4096;

/// Size of the sparse file header on the wire
pub const SPARSE_HEADER_LEN: u64 = 28;

/// Size of each chunk header on the wire
pub const CHUNK_HEADER_LEN: u64 = 12;

/// Largest piece produced when splitting, whatever the device limit
pub const RESPARSE_LIMIT: u64 = 1 << 30;

/// A single sparse chunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Chunk {
    /// Literal data; length is a multiple of the block size
    Raw(Vec<u8>),
    /// `blocks` blocks filled with `value`
    Fill {
        /// 32-bit fill word (native byte order of the image)
        value: u32,
        /// Number of blocks
        blocks: u32,
    },
    /// `blocks` blocks whose content does not matter
    DontCare {
        /// Number of blocks
        blocks: u32,
    },
}

impl Chunk {
    /// Number of blocks covered by this chunk
    pub fn blocks(&self, block_size: u32) -> u32 {
        match self {
            Self::Raw(data) => (data.len() / block_size as usize) as u32,
            Self::Fill { blocks, .. } | Self::DontCare { blocks } => *blocks,
        }
    }

    /// Payload bytes following the chunk header on the wire
    pub fn payload_len(&self) -> u64 {
        match self {
            Self::Raw(data) => data.len() as u64,
            Self::Fill { .. } => 4,
            Self::DontCare { .. } => 0,
        }
    }
}

/// An in-memory sparse image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SparseImage {
    block_size: u32,
    total_blocks: u32,
    /// Data chunks keyed by their first block
    chunks: BTreeMap<u32, Chunk>,
}

impl SparseImage {
    /// Create an empty (all don't-care) image covering `len` bytes
    pub fn new(block_size: u32, len: u64) -> Result<Self> {
        if block_size == 0 || block_size % 4 != 0 {
            return Err(Error::Sparse(format!("invalid block size {}", block_size)));
        }
        let total_blocks = u32::try_from(len.div_ceil(block_size as u64))
            .map_err(|_| Error::Sparse(format!("image of {} bytes is too large", len)))?;
        Ok(Self {
            block_size,
            total_blocks,
            chunks: BTreeMap::new(),
        })
    }

    /// Build a sparse image from raw bytes, detecting fill runs
    pub fn from_raw(data: &[u8], block_size: u32) -> Result<Self> {
        let mut reader = data;
        Self::from_reader(&mut reader, data.len() as u64, block_size)
    }

    /// Build a sparse image by reading `len` bytes block by block
    ///
    /// Blocks consisting of a single repeated 32-bit word collapse into
    /// `Fill` chunks; everything else is kept as `Raw`. A trailing partial
    /// block is zero-padded.
    pub fn from_reader<R: Read>(reader: &mut R, len: u64, block_size: u32) -> Result<Self> {
        let mut image = Self::new(block_size, len)?;
        let mut runs = RunCollector::new(0);
        let mut block = vec![0u8; block_size as usize];
        let mut remaining = len;

        while remaining > 0 {
            let n = remaining.min(block_size as u64) as usize;
            reader.read_exact(&mut block[..n])?;
            block[n..].fill(0);
            runs.push(&mut image, &block)?;
            remaining -= n as u64;
        }
        runs.flush(&mut image)?;

        Ok(image)
    }

    /// Block size in bytes
    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    /// Number of blocks covered by the image
    pub fn total_blocks(&self) -> u32 {
        self.total_blocks
    }

    /// Logical (expanded) length in bytes
    pub fn len(&self) -> u64 {
        self.total_blocks as u64 * self.block_size as u64
    }

    /// Whether the image covers no blocks
    pub fn is_empty(&self) -> bool {
        self.total_blocks == 0
    }

    /// Data chunks in block order, without the implicit don't-care gaps
    pub fn data_chunks(&self) -> impl Iterator<Item = (u32, &Chunk)> {
        self.chunks.iter().map(|(start, chunk)| (*start, chunk))
    }

    /// All chunks in block order, including don't-care gaps
    pub fn chunks(&self) -> Vec<(u32, Chunk)> {
        let mut out = Vec::with_capacity(self.chunks.len() * 2 + 1);
        let mut pos = 0;
        for (&start, chunk) in &self.chunks {
            if start > pos {
                out.push((pos, Chunk::DontCare { blocks: start - pos }));
            }
            out.push((start, chunk.clone()));
            pos = start + chunk.blocks(self.block_size);
        }
        if pos < self.total_blocks {
            out.push((pos, Chunk::DontCare {
                blocks: self.total_blocks - pos,
            }));
        }
        out
    }

    /// Bytes this image occupies on the wire
    pub fn transfer_len(&self) -> u64 {
        SPARSE_HEADER_LEN
            + self
                .chunks()
                .iter()
                .map(|(_, chunk)| CHUNK_HEADER_LEN + chunk.payload_len())
                .sum::<u64>()
    }

    /// Place raw data at `block`; the data is zero-padded to a whole block
    pub fn add_raw(&mut self, block: u32, mut data: Vec<u8>) -> Result<()> {
        let bs = self.block_size as usize;
        if data.is_empty() {
            return Ok(());
        }
        data.resize(data.len().div_ceil(bs) * bs, 0);
        let chunk = Chunk::Raw(data);
        self.insert(block, chunk)
    }

    /// Fill `blocks` blocks starting at `block` with `value`
    pub fn add_fill(&mut self, block: u32, value: u32, blocks: u32) -> Result<()> {
        if blocks == 0 {
            return Ok(());
        }
        self.insert(block, Chunk::Fill { value, blocks })
    }

    /// Place data at `block`, collapsing fill runs like [`Self::from_raw`]
    pub fn add_data(&mut self, block: u32, data: &[u8]) -> Result<()> {
        let bs = self.block_size as usize;
        let mut runs = RunCollector::new(block);
        let mut padded = vec![0u8; bs];
        for piece in data.chunks(bs) {
            padded[..piece.len()].copy_from_slice(piece);
            padded[piece.len()..].fill(0);
            runs.push(self, &padded)?;
        }
        runs.flush(self)
    }

    fn insert(&mut self, block: u32, chunk: Chunk) -> Result<()> {
        let end = block as u64 + chunk.blocks(self.block_size) as u64;
        if end > self.total_blocks as u64 {
            return Err(Error::Sparse(format!(
                "chunk at block {} ends past the image ({} blocks)",
                block, self.total_blocks
            )));
        }
        let overlaps_prev = self
            .chunks
            .range(..=block)
            .next_back()
            .is_some_and(|(start, prev)| *start + prev.blocks(self.block_size) > block);
        let overlaps_next = self
            .chunks
            .range(block..)
            .next()
            .is_some_and(|(start, _)| (*start as u64) < end);
        if overlaps_prev || overlaps_next {
            return Err(Error::Sparse(format!("overlapping chunk at block {}", block)));
        }
        self.chunks.insert(block, chunk);
        Ok(())
    }

    fn empty_like(&self) -> Self {
        Self {
            block_size: self.block_size,
            total_blocks: self.total_blocks,
            chunks: BTreeMap::new(),
        }
    }

    /// Split into pieces whose transfer length is at most `max_len`
    ///
    /// Every piece spans the full image length, with the blocks it does not
    /// carry marked don't-care, so writing the pieces in order produces the
    /// same result as writing this image. Raw chunks are split at block
    /// boundaries when they do not fit.
    pub fn resparse(&self, max_len: u64) -> Result<Vec<SparseImage>> {
        let bs = self.block_size as u64;
        // File header plus a leading and a trailing don't-care chunk
        let overhead = SPARSE_HEADER_LEN + 2 * CHUNK_HEADER_LEN;
        if max_len < overhead + CHUNK_HEADER_LEN + bs {
            return Err(Error::Sparse(format!(
                "limit of {} bytes cannot carry a single {} byte block",
                max_len, bs
            )));
        }

        let mut pieces = Vec::new();
        let mut piece = self.empty_like();
        let mut len = overhead;
        let mut last_end: Option<u32> = None;

        for (&first, chunk) in &self.chunks {
            let mut start = first;
            let mut chunk = chunk.clone();
            loop {
                let gap = match last_end {
                    Some(end) if end < start => CHUNK_HEADER_LEN,
                    _ => 0,
                };
                let cost = gap + CHUNK_HEADER_LEN + chunk.payload_len();
                if len + cost <= max_len {
                    len += cost;
                    last_end = Some(start + chunk.blocks(self.block_size));
                    piece.chunks.insert(start, chunk);
                    break;
                }

                let split = match &chunk {
                    Chunk::Raw(data) => {
                        let avail = max_len.saturating_sub(len + gap + CHUNK_HEADER_LEN);
                        let fit = (avail / bs) as usize;
                        (fit > 0).then(|| {
                            let at = fit * bs as usize;
                            (fit as u32, data[..at].to_vec(), data[at..].to_vec())
                        })
                    }
                    _ => None,
                };
                if let Some((fit, head, tail)) = split {
                    piece.chunks.insert(start, Chunk::Raw(head));
                    start += fit;
                    chunk = Chunk::Raw(tail);
                }

                if piece.chunks.is_empty() {
                    return Err(Error::Sparse(format!(
                        "chunk at block {} does not fit in {} bytes",
                        start, max_len
                    )));
                }
                pieces.push(std::mem::replace(&mut piece, self.empty_like()));
                len = overhead;
                last_end = None;
            }
        }

        if !piece.chunks.is_empty() || pieces.is_empty() {
            pieces.push(piece);
        }

        log::debug!(
            "Resparsed {} byte image into {} piece(s) of at most {} bytes",
            self.transfer_len(),
            pieces.len(),
            max_len
        );
        Ok(pieces)
    }

    /// Replay the image onto `target`, growing it as needed
    ///
    /// Don't-care blocks leave `target` untouched.
    pub fn apply(&self, target: &mut Vec<u8>) {
        let bs = self.block_size as usize;
        for (&start, chunk) in &self.chunks {
            let offset = start as usize * bs;
            let end = offset + chunk.blocks(self.block_size) as usize * bs;
            if target.len() < end {
                target.resize(end, 0);
            }
            match chunk {
                Chunk::Raw(data) => target[offset..end].copy_from_slice(data),
                Chunk::Fill { value, .. } => {
                    let word = value.to_ne_bytes();
                    for dst in target[offset..end].chunks_exact_mut(4) {
                        dst.copy_from_slice(&word);
                    }
                }
                Chunk::DontCare { .. } => {}
            }
        }
    }

    /// Expand to a full raw image with don't-care blocks zeroed
    pub fn to_raw(&self) -> Vec<u8> {
        let mut out = vec![0u8; self.len() as usize];
        self.apply(&mut out);
        out
    }
}

/// Accumulates consecutive blocks into Raw or Fill runs
struct RunCollector {
    start: u32,
    run: Option<Chunk>,
}

impl RunCollector {
    fn new(start: u32) -> Self {
        Self { start, run: None }
    }

    fn push(&mut self, image: &mut SparseImage, block: &[u8]) -> Result<()> {
        let fill = fill_value(block);
        let extended = match (&mut self.run, fill) {
            (Some(Chunk::Fill { value, blocks }), Some(v)) if *value == v => {
                *blocks += 1;
                true
            }
            (Some(Chunk::Raw(data)), None) => {
                data.extend_from_slice(block);
                true
            }
            _ => false,
        };
        if !extended {
            self.flush(image)?;
            self.run = Some(match fill {
                Some(value) => Chunk::Fill { value, blocks: 1 },
                None => Chunk::Raw(block.to_vec()),
            });
        }
        Ok(())
    }

    fn flush(&mut self, image: &mut SparseImage) -> Result<()> {
        if let Some(chunk) = self.run.take() {
            let blocks = chunk.blocks(image.block_size);
            image.insert(self.start, chunk)?;
            self.start += blocks;
        }
        Ok(())
    }
}

/// The repeated word if `block` consists of a single 32-bit value
fn fill_value(block: &[u8]) -> Option<u32> {
    let first: [u8; 4] = block.get(..4)?.try_into().ok()?;
    block
        .chunks_exact(4)
        .all(|word| word == first)
        .then(|| u32::from_ne_bytes(first))
}

#[cfg(test)]
mod tests {
    use super::*;

    const BS: u32 = 4096;

    fn pattern(len: usize, seed: u8) -> Vec<u8> {
        (0..len).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed)).collect()
    }

    #[test]
    fn test_from_raw_detects_fill() {
        let mut data = vec![0u8; 3 * BS as usize];
        data.extend(pattern(2 * BS as usize, 7));
        data.extend(vec![0xAA; BS as usize]);

        let image = SparseImage::from_raw(&data, BS).unwrap();
        let chunks: Vec<_> = image.data_chunks().collect();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0], (0, &Chunk::Fill { value: 0, blocks: 3 }));
        assert!(matches!(chunks[1], (3, Chunk::Raw(d)) if d.len() == 2 * BS as usize));
        assert!(matches!(chunks[2], (5, Chunk::Fill { value: 0xAAAA_AAAA, blocks: 1 })));
        assert_eq!(image.to_raw(), data);
    }

    #[test]
    fn test_partial_trailing_block_is_padded() {
        let data = pattern(BS as usize + 10, 1);
        let image = SparseImage::from_raw(&data, BS).unwrap();
        assert_eq!(image.total_blocks(), 2);
        let raw = image.to_raw();
        assert_eq!(&raw[..data.len()], &data[..]);
        assert!(raw[data.len()..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_transfer_len_counts_gaps() {
        let mut image = SparseImage::new(BS, 10 * BS as u64).unwrap();
        image.add_raw(2, pattern(BS as usize, 3)).unwrap();
        image.add_fill(5, 0, 2).unwrap();
        // gap(0..2) raw(2) gap(3..5) fill(5..7) gap(7..10)
        let expected = SPARSE_HEADER_LEN + 5 * CHUNK_HEADER_LEN + BS as u64 + 4;
        assert_eq!(image.transfer_len(), expected);
        assert_eq!(image.chunks().len(), 5);
    }

    #[test]
    fn test_overlapping_chunks_rejected() {
        let mut image = SparseImage::new(BS, 10 * BS as u64).unwrap();
        image.add_raw(2, pattern(2 * BS as usize, 3)).unwrap();
        assert!(image.add_fill(3, 0, 1).is_err());
        assert!(image.add_fill(1, 0, 2).is_err());
        assert!(image.add_fill(9, 0, 2).is_err());
        image.add_fill(4, 0, 1).unwrap();
    }

    #[test]
    fn test_resparse_round_trip() {
        let mut image = SparseImage::new(BS, 64 * BS as u64).unwrap();
        image.add_raw(0, pattern(5 * BS as usize, 9)).unwrap();
        image.add_fill(8, 0x1234_5678, 20).unwrap();
        image.add_raw(30, pattern(11 * BS as usize, 4)).unwrap();
        image.add_raw(50, pattern(BS as usize, 2)).unwrap();

        let limit = 3 * BS as u64;
        let pieces = image.resparse(limit).unwrap();
        assert!(pieces.len() > 1);

        let mut replayed = vec![0u8; image.len() as usize];
        for piece in &pieces {
            assert!(piece.transfer_len() <= limit, "piece exceeds limit");
            assert_eq!(piece.len(), image.len());
            piece.apply(&mut replayed);
        }
        assert_eq!(replayed, image.to_raw());
    }

    #[test]
    fn test_resparse_under_limit_is_single_piece() {
        let image = SparseImage::from_raw(&pattern(4 * BS as usize, 5), BS).unwrap();
        let pieces = image.resparse(image.transfer_len() + 100).unwrap();
        assert_eq!(pieces, vec![image]);
    }

    #[test]
    fn test_resparse_limit_too_small() {
        let image = SparseImage::from_raw(&pattern(BS as usize, 5), BS).unwrap();
        assert!(image.resparse(BS as u64).is_err());
    }

    #[test]
    fn test_resparse_empty_image() {
        let image = SparseImage::new(BS, 8 * BS as u64).unwrap();
        let pieces = image.resparse(2 * BS as u64).unwrap();
        assert_eq!(pieces.len(), 1);
        assert_eq!(pieces[0].data_chunks().count(), 0);
    }

    #[test]
    fn test_add_data_at_offset() {
        let mut image = SparseImage::new(BS, 16 * BS as u64).unwrap();
        let mut data = pattern(BS as usize, 1);
        data.extend(vec![0u8; 2 * BS as usize]);
        image.add_data(4, &data).unwrap();
        let raw = image.to_raw();
        assert_eq!(&raw[4 * BS as usize..7 * BS as usize], &data[..]);
        assert_eq!(image.data_chunks().count(), 2);
    }
}
