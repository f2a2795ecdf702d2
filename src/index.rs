//! Block index: per-member compressed lengths plus the geometry needed to
//! translate an uncompressed offset into a compressed member offset.

use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use log::debug;

use crate::error::{map_io, Error, Result};

/// Uncompressed bytes per block unless the writer is configured otherwise.
///
/// Decoders never assume this value: every index records the block size the
/// stream was actually written with.
pub const DEFAULT_BLOCK_SIZE: u32 = 128 * 1024;

const INDEX_MAGIC: [u8; 4] = *b"SGZI";
const INDEX_VERSION: u8 = 1;

/// Side-channel index for one block-aligned gzip stream.
///
/// Entry *i* of the length list is the total compressed size of member *i*
/// (header, deflate payload, and trailer); the prefix sum of the list gives
/// the byte offset at which each member begins. The index is built by
/// [`Writer`](crate::Writer), sealed at [`finish`](crate::Writer::finish),
/// and read-only afterwards; seeking readers share it behind an `Arc`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockIndex {
    block_size: u32,
    size: u64,
    block_lengths: Vec<u32>,
}

impl BlockIndex {
    pub(crate) fn new(block_size: u32) -> Self {
        assert!(block_size > 0, "block size must be non-zero");
        Self { block_size, size: 0, block_lengths: Vec::new() }
    }

    /// Rebuilds an index from externally persisted fields.
    ///
    /// # Errors
    ///
    /// `Error::Index` if the block size is zero, any length is zero, or the
    /// number of lengths disagrees with the total size (one block per
    /// `block_size` bytes, rounded up; exactly one for an empty stream).
    pub fn from_parts(block_size: u32, size: u64, block_lengths: Vec<u32>) -> Result<Self> {
        if block_size == 0 {
            return Err(Error::Index("zero block size"));
        }
        if block_lengths.len() as u64 != expected_blocks(size, block_size) {
            return Err(Error::Index("block count does not match total size"));
        }
        if block_lengths.iter().any(|&len| len == 0) {
            return Err(Error::Index("zero-length block"));
        }
        Ok(Self { block_size, size, block_lengths })
    }

    pub(crate) fn append(&mut self, compressed_len: u32) {
        self.block_lengths.push(compressed_len);
    }

    pub(crate) fn add_size(&mut self, n: u64) {
        self.size += n;
    }

    /// Uncompressed bytes per block (the last block may hold fewer).
    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    /// Total uncompressed size of the stream.
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn num_blocks(&self) -> usize {
        self.block_lengths.len()
    }

    /// Compressed length of each member, in stream order.
    pub fn block_lengths(&self) -> &[u32] {
        &self.block_lengths
    }

    /// Total compressed size of the stream.
    pub fn compressed_size(&self) -> u64 {
        self.block_lengths.iter().map(|&len| u64::from(len)).sum()
    }

    /// Byte offset in the compressed stream at which member `block` begins.
    ///
    /// # Panics
    ///
    /// Panics if `block > num_blocks()`; `block == num_blocks()` yields the
    /// end-of-stream offset.
    pub fn compressed_offset(&self, block: usize) -> u64 {
        self.block_lengths[..block].iter().map(|&len| u64::from(len)).sum()
    }

    /// Serializes the index in its portable little-endian encoding.
    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        let count = u32::try_from(self.block_lengths.len())
            .map_err(|_| Error::Index("too many blocks to serialize"))?;
        w.write_all(&INDEX_MAGIC)?;
        w.write_u8(INDEX_VERSION)?;
        w.write_u32::<LittleEndian>(self.block_size)?;
        w.write_u64::<LittleEndian>(self.size)?;
        w.write_u32::<LittleEndian>(count)?;
        for &len in &self.block_lengths {
            w.write_u32::<LittleEndian>(len)?;
        }
        Ok(())
    }

    /// Deserializes an index previously written by [`write_to`](Self::write_to).
    ///
    /// # Errors
    ///
    /// `Error::Index` on a bad magic, an unknown format version, or field
    /// combinations violating the index invariants; `Error::UnexpectedEof`
    /// on truncation.
    pub fn read_from<R: Read>(r: &mut R) -> Result<Self> {
        let mut magic = [0u8; 4];
        r.read_exact(&mut magic).map_err(map_io)?;
        if magic != INDEX_MAGIC {
            return Err(Error::Index("bad magic"));
        }
        let version = r.read_u8().map_err(map_io)?;
        if version != INDEX_VERSION {
            return Err(Error::Index("unsupported format version"));
        }
        let block_size = r.read_u32::<LittleEndian>().map_err(map_io)?;
        let size = r.read_u64::<LittleEndian>().map_err(map_io)?;
        let count = r.read_u32::<LittleEndian>().map_err(map_io)? as usize;
        let mut block_lengths = Vec::with_capacity(count.min(1 << 16));
        for _ in 0..count {
            block_lengths.push(r.read_u32::<LittleEndian>().map_err(map_io)?);
        }
        debug!("block index loaded: {} blocks of {} bytes, {} total", count, block_size, size);
        Self::from_parts(block_size, size, block_lengths)
    }
}

fn expected_blocks(size: u64, block_size: u32) -> u64 {
    if size == 0 {
        1
    } else {
        size.div_ceil(u64::from(block_size))
    }
}
