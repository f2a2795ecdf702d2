//! Index-driven random access over block-aligned gzip streams.

use std::io::{self, BufRead, Read, Seek, SeekFrom, Write};
use std::sync::Arc;

use log::debug;

use crate::error::{Error, Result};
use crate::index::BlockIndex;
use crate::reader::Reader;

/// Random-access gzip decompressor.
///
/// Wraps a [`Reader`] and a shared [`BlockIndex`]. A seek target in the
/// uncompressed stream is split into a block number and an intra-block
/// residue; the index translates the block number into a compressed byte
/// offset, the underlying source is repositioned there, the reader is
/// restarted on that member's header, and the residue is decoded and
/// discarded. The index is the sole source of truth for member offsets;
/// the compressed bytes are never scanned for boundaries.
///
/// The index is immutable and may be shared across any number of seeking
/// readers, each owning its own source handle and decoder state.
pub struct SeekReader<R: BufRead + Seek> {
    reader: Reader<R>,
    index: Arc<BlockIndex>,
    /// Current position in the uncompressed stream.
    pos: u64,
    /// Set when a seek failed partway; cleared by the next successful seek.
    poisoned: bool,
}

impl<R: BufRead + Seek> SeekReader<R> {
    /// Creates a seeking reader over `source`, which must be positioned at
    /// the start of the compressed stream.
    ///
    /// The first member header is parsed immediately (so the header
    /// accessors work), but no payload is decoded until the first read or
    /// seek.
    pub fn new(source: R, index: Arc<BlockIndex>) -> Result<Self> {
        Ok(Self { reader: Reader::new(source)?, index, pos: 0, poisoned: false })
    }

    /// Equivalent to [`new`](Self::new) followed by a seek to `offset`.
    pub fn new_at(source: R, index: Arc<BlockIndex>, offset: u64) -> Result<Self> {
        let mut reader = Self::new(source, index)?;
        reader.seek_to(SeekFrom::Start(offset))?;
        Ok(reader)
    }

    /// File name from the first member's header, if present.
    pub fn name(&self) -> Option<&str> {
        self.reader.name.as_deref()
    }

    /// Modification time from the first member's header; 0 when unset.
    pub fn mtime(&self) -> u32 {
        self.reader.mtime
    }

    /// Comment from the first member's header, if present.
    pub fn comment(&self) -> Option<&str> {
        self.reader.comment.as_deref()
    }

    /// See [`Reader::multistream`]. Every successful seek re-enables
    /// multistream mode so reads traverse block boundaries transparently.
    pub fn multistream(&mut self, enabled: bool) {
        self.reader.multistream(enabled);
    }

    pub fn index(&self) -> &BlockIndex {
        &self.index
    }

    /// Current position in the uncompressed stream.
    pub fn position(&self) -> u64 {
        self.pos
    }

    /// Drains the remaining decompressed bytes into `sink`.
    pub fn write_to<W: Write>(&mut self, sink: &mut W) -> Result<u64> {
        if self.poisoned {
            return Err(Error::Io(poisoned_error()));
        }
        let written = self.reader.write_to(sink)?;
        self.pos += written;
        Ok(written)
    }

    /// Releases the decoder and returns the source without closing it.
    pub fn into_inner(self) -> R {
        self.reader.into_inner()
    }

    /// Repositions the reader in the uncompressed stream.
    ///
    /// All three `SeekFrom` variants are supported; end-relative offsets
    /// resolve against the index's total size. Seeking to exactly the total
    /// size is valid and positions the reader at end of stream.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidSeek` when the resolved target is negative or past
    ///   the end of the uncompressed stream; returned before any I/O, with
    ///   the prior position intact.
    /// - `Error::Header` when the member promised by the index does not
    ///   parse, meaning the index is inconsistent with the stream.
    /// - I/O errors from the underlying source's seek, verbatim. Any
    ///   failure after the reposition poisons the reader until a seek
    ///   completes.
    pub fn seek_to(&mut self, pos: SeekFrom) -> Result<u64> {
        let size = self.index.size();
        let target = match pos {
            SeekFrom::Start(offset) => i128::from(offset),
            SeekFrom::Current(delta) => i128::from(self.pos) + i128::from(delta),
            SeekFrom::End(delta) => i128::from(size) + i128::from(delta),
        };
        if target < 0 || target > i128::from(size) {
            return Err(Error::InvalidSeek(target.clamp(
                i128::from(i64::MIN),
                i128::from(i64::MAX),
            ) as i64));
        }
        let target = target as u64;
        if !self.poisoned && target == self.pos {
            return Ok(target);
        }

        let block_size = u64::from(self.index.block_size());
        let block = (target / block_size) as usize;
        let residue = target % block_size;
        debug!("seek to {}: block {}, residue {}", target, block, residue);

        let result = self.position_at(block, residue);
        self.reader.multistream(true);
        match result {
            Ok(()) => {
                self.pos = target;
                self.poisoned = false;
                Ok(target)
            }
            Err(err) => {
                self.poisoned = true;
                Err(err)
            }
        }
    }

    /// Repositions the source at the start of `block` and discards
    /// `residue` decoded bytes. Multistream mode is left disabled so the
    /// discard cannot silently run into the next member; the caller
    /// restores it.
    fn position_at(&mut self, block: usize, residue: u64) -> Result<()> {
        if block == self.index.num_blocks() {
            // Exactly at the end of the stream on a block boundary.
            self.reader.force_eof();
            return Ok(());
        }
        let offset = self.index.compressed_offset(block);
        self.reader.get_mut().seek(SeekFrom::Start(offset)).map_err(Error::Io)?;
        self.reader.multistream(false);
        self.reader.reinit()?;
        if self.reader.at_eof() {
            // The index promises a member here; the stream is shorter.
            return Err(Error::UnexpectedEof);
        }
        if residue > 0 {
            self.reader.discard(residue)?;
        }
        Ok(())
    }
}

impl<R: BufRead + Seek> Read for SeekReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.poisoned {
            return Err(poisoned_error());
        }
        let n = self.reader.read_decoded(buf).map_err(io::Error::from)?;
        self.pos += n as u64;
        Ok(n)
    }
}

impl<R: BufRead + Seek> Seek for SeekReader<R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.seek_to(pos).map_err(io::Error::from)
    }
}

fn poisoned_error() -> io::Error {
    io::Error::other("reader poisoned by a failed seek; seek again to recover")
}
