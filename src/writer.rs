//! Block-boundary gzip compressor.

use std::io::{self, Write};

use byteorder::{LittleEndian, WriteBytesExt};
use flate2::write::DeflateEncoder;
use flate2::Compression;
use log::trace;

use crate::count::CountWriter;
use crate::error::{Error, Result};
use crate::header::{self, MemberHeader};
use crate::index::{BlockIndex, DEFAULT_BLOCK_SIZE};

/// Gzip compressor that partitions its input into fixed-size blocks and
/// emits one self-contained gzip member per block.
///
/// The deflate dictionary is reset at every block boundary (each block gets
/// a fresh encoder), so any member can later be decompressed without its
/// predecessors. The compressed length of every member is recorded in a
/// [`BlockIndex`], the map a [`SeekReader`](crate::SeekReader) needs for
/// random access. The emitted bytes are a plain concatenated-member gzip
/// stream that any RFC 1952 decoder accepts.
///
/// Arbitrary-length writes are accepted and split at exact block
/// boundaries; no block ever stages more than `block_size` bytes. Call
/// [`finish`](Self::finish) to flush the trailing block and obtain the
/// sealed index.
pub struct Writer<W: Write> {
    out: CountWriter<W>,
    level: Compression,
    xfl: u8,
    header: MemberHeader,
    header_frozen: bool,
    buf: Vec<u8>,
    block_size: u32,
    index: BlockIndex,
    /// Kind and message of the first sink failure, replayed on every later
    /// operation so repeated writes fail with the same class of error.
    poison: Option<(io::ErrorKind, String)>,
}

impl<W: Write> Writer<W> {
    /// Wraps `sink` with the default compression level and block size.
    pub fn new(sink: W) -> Self {
        Self::with_options(sink, -1, DEFAULT_BLOCK_SIZE)
            .expect("default compression level is valid")
    }

    /// Wraps `sink` with an explicit compression level.
    ///
    /// Accepted levels are -2 (Huffman-only), -1 (default), 0 (store), and
    /// 1..=9 (fastest to best).
    ///
    /// # Errors
    ///
    /// `Error::InvalidLevel` for any other value, before a byte is written.
    pub fn with_level(sink: W, level: i32) -> Result<Self> {
        Self::with_options(sink, level, DEFAULT_BLOCK_SIZE)
    }

    /// Wraps `sink` with an explicit level and uncompressed block size.
    ///
    /// Smaller blocks mean finer-grained seeks and a worse compression
    /// ratio.
    ///
    /// # Panics
    ///
    /// Panics if `block_size` is zero.
    pub fn with_options(sink: W, level: i32, block_size: u32) -> Result<Self> {
        let compression = match level {
            // The deflate backend exposes no Huffman-only strategy; the
            // fastest level is the closest supported encoding.
            -2 => Compression::fast(),
            -1 => Compression::default(),
            0..=9 => Compression::new(level as u32),
            _ => return Err(Error::InvalidLevel(level)),
        };
        Ok(Self {
            out: CountWriter::new(sink),
            level: compression,
            xfl: header::xfl_for_level(level),
            header: MemberHeader::default(),
            header_frozen: false,
            buf: Vec::with_capacity(block_size as usize),
            block_size,
            index: BlockIndex::new(block_size),
            poison: None,
        })
    }

    /// Sets the metadata emitted in every member header of this stream.
    ///
    /// # Errors
    ///
    /// `Error::HeaderFrozen` once the first write has committed the header,
    /// and `Error::Header` for metadata the wire format cannot carry (an
    /// embedded NUL in the name or comment, an oversize extra field). A
    /// rejected header leaves the writer untouched.
    pub fn set_header(&mut self, header: MemberHeader) -> Result<()> {
        if self.header_frozen {
            return Err(Error::HeaderFrozen);
        }
        header::validate_member_header(&header)?;
        self.header = header;
        Ok(())
    }

    /// Finalizes the stream: emits the trailing (possibly empty) member and
    /// returns the sink together with the sealed block index.
    ///
    /// An empty input still produces exactly one empty member. An input
    /// that is an exact multiple of the block size gains no extra member.
    pub fn finish(mut self) -> Result<(W, BlockIndex)> {
        if let Some(err) = self.replay_poison() {
            return Err(Error::Io(err));
        }
        if !self.buf.is_empty() || self.index.num_blocks() == 0 {
            self.emit_block()?;
        }
        Ok((self.out.into_inner(), self.index))
    }

    /// Reconstructs the remembered sink failure, kind and message intact.
    fn replay_poison(&self) -> Option<io::Error> {
        self.poison.as_ref().map(|(kind, msg)| io::Error::new(*kind, msg.clone()))
    }

    /// Compresses the staged block as one gzip member and records its
    /// compressed length.
    fn emit_block(&mut self) -> io::Result<()> {
        self.out.reset_count();
        header::write_member_header(&mut self.out, &self.header, self.xfl)
            .map_err(io::Error::from)?;

        let mut encoder = DeflateEncoder::new(&mut self.out, self.level);
        encoder.write_all(&self.buf)?;
        encoder.finish()?;

        self.out.write_u32::<LittleEndian>(crc32fast::hash(&self.buf))?;
        self.out.write_u32::<LittleEndian>(self.buf.len() as u32)?;

        let len = u32::try_from(self.out.written()).map_err(|_| {
            io::Error::new(io::ErrorKind::InvalidData, "compressed member exceeds 4 GiB")
        })?;
        trace!(
            "block {}: {} bytes in, {} bytes out",
            self.index.num_blocks(),
            self.buf.len(),
            len
        );
        self.index.append(len);
        self.index.add_size(self.buf.len() as u64);
        self.buf.clear();
        Ok(())
    }
}

impl<W: Write> Write for Writer<W> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if let Some(err) = self.replay_poison() {
            return Err(err);
        }
        if data.is_empty() {
            return Ok(0);
        }
        self.header_frozen = true;
        let mut rest = data;
        while !rest.is_empty() {
            let room = self.block_size as usize - self.buf.len();
            let take = room.min(rest.len());
            self.buf.extend_from_slice(&rest[..take]);
            rest = &rest[take..];
            if self.buf.len() == self.block_size as usize {
                if let Err(err) = self.emit_block() {
                    self.poison = Some((err.kind(), err.to_string()));
                    return Err(err);
                }
            }
        }
        Ok(data.len())
    }

    /// Flushes the underlying sink. Staged bytes stay buffered until a
    /// block boundary or [`finish`](Self::finish); emitting them early
    /// would split a member short of its block.
    fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}
