//! Streaming gzip decompressor.

use std::io::{self, BufRead, Read, Seek, SeekFrom, Write};
use std::mem;

use flate2::{Decompress, FlushDecompress, Status};
use log::trace;

use crate::error::{Error, Result};
use crate::header::{self, OS_UNKNOWN};

/// Reused buffer for bulk draining and residue discard.
const SCRATCH_LEN: usize = 32 * 1024;

/// Sequential gzip decompressor.
///
/// The `BufRead` bound is deliberate: the reader consumes exactly the
/// compressed bytes belonging to each member and never reads ahead in the
/// underlying source, so a source shared across [`restart`](Self::restart)
/// calls (or repositioned by a [`SeekReader`](crate::SeekReader)) stays
/// byte-accurate at member boundaries. Wrap plain files in a
/// `std::io::BufReader`.
///
/// By default the reader is in multistream mode and decodes concatenated
/// members as one continuous stream; see [`multistream`](Self::multistream).
/// The public header fields always describe the *first* member.
pub struct Reader<R: BufRead> {
    source: R,
    inflate: Decompress,
    crc: crc32fast::Hasher,
    member_size: u32,
    multistream: bool,
    done: bool,
    /// Error discovered by a call that had already produced bytes; delivered
    /// by the next read.
    pending: Option<Error>,
    scratch: Vec<u8>,
    /// File name from the first member's header, if present.
    pub name: Option<String>,
    /// Modification time from the first member's header; 0 when unset.
    pub mtime: u32,
    /// Comment from the first member's header, if present.
    pub comment: Option<String>,
    /// Extra field from the first member's header, if present.
    pub extra: Option<Vec<u8>>,
    /// Operating system byte from the first member's header.
    pub os: u8,
}

impl<R: BufRead> Reader<R> {
    /// Creates a reader and parses the first member header immediately.
    ///
    /// A source with no bytes at all yields a reader that is already at
    /// end of stream; reads return 0.
    ///
    /// # Errors
    ///
    /// `Error::Header` if the first bytes are not a gzip header,
    /// `Error::UnexpectedEof` if the source ends mid-header, and I/O errors
    /// verbatim.
    pub fn new(source: R) -> Result<Self> {
        let mut reader = Self {
            source,
            inflate: Decompress::new(false),
            crc: crc32fast::Hasher::new(),
            member_size: 0,
            multistream: true,
            done: false,
            pending: None,
            scratch: Vec::new(),
            name: None,
            mtime: 0,
            comment: None,
            extra: None,
            os: OS_UNKNOWN,
        };
        reader.reinit()?;
        Ok(reader)
    }

    /// Replaces the byte source and restarts decoding from a fresh first
    /// header, reusing the decompressor state and internal buffers.
    ///
    /// Multistream mode is re-enabled. A source that is already exhausted
    /// leaves the reader at end of stream rather than failing.
    pub fn reset(&mut self, source: R) -> Result<()> {
        self.source = source;
        self.multistream = true;
        self.reinit()
    }

    /// Restarts decoding at the source's current position: the in-place
    /// counterpart of [`reset`](Self::reset) for callers that keep
    /// ownership of the source inside the reader.
    ///
    /// After draining one member with multistream mode off, the source sits
    /// exactly at the next member boundary, so `restart` continues with the
    /// following member.
    pub fn restart(&mut self) -> Result<()> {
        self.multistream = true;
        self.reinit()
    }

    /// Discards decode state and parses a first header from the current
    /// source position, leaving the multistream flag alone.
    pub(crate) fn reinit(&mut self) -> Result<()> {
        self.pending = None;
        self.done = false;
        self.member_size = 0;
        self.crc = crc32fast::Hasher::new();
        self.inflate.reset(false);
        match header::read_member_header(&mut self.source)? {
            Some(hdr) => {
                self.name = hdr.name;
                self.mtime = hdr.mtime;
                self.comment = hdr.comment;
                self.extra = hdr.extra;
                self.os = hdr.os;
            }
            None => self.done = true,
        }
        Ok(())
    }

    /// Controls transparent continuation across concatenated members.
    ///
    /// When enabled (the default), a member boundary is crossed by parsing
    /// and validating the next header in place; the public header fields
    /// keep the first member's values. When disabled, reads report end of
    /// stream at each member boundary and [`restart`](Self::restart)
    /// continues with the next member.
    pub fn multistream(&mut self, enabled: bool) {
        self.multistream = enabled;
    }

    pub fn get_ref(&self) -> &R {
        &self.source
    }

    pub fn get_mut(&mut self) -> &mut R {
        &mut self.source
    }

    /// Releases the decoder and returns the source without closing it.
    pub fn into_inner(self) -> R {
        self.source
    }

    pub(crate) fn at_eof(&self) -> bool {
        self.done && self.pending.is_none()
    }

    pub(crate) fn force_eof(&mut self) {
        self.pending = None;
        self.done = true;
    }

    /// Core decode loop shared by the `Read` impl, [`write_to`](Self::write_to)
    /// and the seek reader's residue discard.
    pub(crate) fn read_decoded(&mut self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if let Some(err) = self.pending.take() {
            self.done = true;
            return Err(err);
        }
        if self.done {
            return Ok(0);
        }
        loop {
            let input_exhausted;
            let consumed;
            let produced;
            let status;
            {
                let input = self.source.fill_buf().map_err(Error::Io)?;
                input_exhausted = input.is_empty();
                let before_in = self.inflate.total_in();
                let before_out = self.inflate.total_out();
                status = self.inflate.decompress(input, buf, FlushDecompress::None)?;
                consumed = (self.inflate.total_in() - before_in) as usize;
                produced = (self.inflate.total_out() - before_out) as usize;
            }
            self.source.consume(consumed);
            if produced > 0 {
                self.crc.update(&buf[..produced]);
                self.member_size = self.member_size.wrapping_add(produced as u32);
            }
            match status {
                Status::StreamEnd => match self.finish_member() {
                    Ok(()) => {
                        if produced > 0 {
                            return Ok(produced);
                        }
                        if self.done {
                            return Ok(0);
                        }
                        // The next member has started without any output
                        // yet; keep decoding.
                    }
                    Err(err) => {
                        if produced > 0 {
                            self.pending = Some(err);
                            return Ok(produced);
                        }
                        self.done = true;
                        return Err(err);
                    }
                },
                Status::Ok | Status::BufError => {
                    if produced > 0 {
                        return Ok(produced);
                    }
                    if input_exhausted {
                        self.done = true;
                        return Err(Error::UnexpectedEof);
                    }
                }
            }
        }
    }

    /// Validates the trailer of the member that just ended and, in
    /// multistream mode, lines up the next member.
    fn finish_member(&mut self) -> Result<()> {
        let (crc, isize) = header::read_member_trailer(&mut self.source)?;
        let digest = mem::replace(&mut self.crc, crc32fast::Hasher::new()).finalize();
        if digest != crc {
            return Err(Error::Checksum { expected: crc, actual: digest });
        }
        if isize != self.member_size {
            return Err(Error::Checksum { expected: isize, actual: self.member_size });
        }
        trace!("member complete: {} bytes", self.member_size);
        self.member_size = 0;
        if !self.multistream {
            self.done = true;
            return Ok(());
        }
        match header::read_member_header(&mut self.source)? {
            // Header fields keep the first member's values.
            Some(_) => self.inflate.reset(false),
            None => self.done = true,
        }
        Ok(())
    }

    /// Drains all remaining decompressed bytes into `sink` and returns how
    /// many were written.
    pub fn write_to<W: Write>(&mut self, sink: &mut W) -> Result<u64> {
        let mut scratch = mem::take(&mut self.scratch);
        if scratch.is_empty() {
            scratch.resize(SCRATCH_LEN, 0);
        }
        let mut written = 0u64;
        let result = loop {
            match self.read_decoded(&mut scratch) {
                Ok(0) => break Ok(written),
                Ok(n) => {
                    if let Err(err) = sink.write_all(&scratch[..n]) {
                        break Err(Error::Io(err));
                    }
                    written += n as u64;
                }
                Err(err) => break Err(err),
            }
        };
        self.scratch = scratch;
        result
    }

    /// Reads and throws away exactly `count` decompressed bytes.
    pub(crate) fn discard(&mut self, mut count: u64) -> Result<()> {
        let mut scratch = mem::take(&mut self.scratch);
        if scratch.is_empty() {
            scratch.resize(SCRATCH_LEN, 0);
        }
        let mut result = Ok(());
        while count > 0 {
            let want = scratch.len().min(usize::try_from(count).unwrap_or(usize::MAX));
            match self.read_decoded(&mut scratch[..want]) {
                Ok(0) => {
                    result = Err(Error::UnexpectedEof);
                    break;
                }
                Ok(n) => count -= n as u64,
                Err(err) => {
                    result = Err(err);
                    break;
                }
            }
        }
        self.scratch = scratch;
        result
    }
}

impl<R: BufRead> Read for Reader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read_decoded(buf).map_err(io::Error::from)
    }
}

impl<R: BufRead> Seek for Reader<R> {
    /// A plain streaming reader has no block index to seek with; see
    /// [`SeekReader`](crate::SeekReader).
    fn seek(&mut self, _pos: SeekFrom) -> io::Result<u64> {
        Err(Error::Unsupported.into())
    }
}
