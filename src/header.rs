//! RFC 1952 member framing: header and trailer emission and parsing.

use std::io::{BufRead, Read, Write};

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};

use crate::error::{map_io, Error, Result};

pub(crate) const GZIP_ID1: u8 = 0x1f;
pub(crate) const GZIP_ID2: u8 = 0x8b;
pub(crate) const METHOD_DEFLATE: u8 = 0x08;

const FLG_HCRC: u8 = 1 << 1;
const FLG_EXTRA: u8 = 1 << 2;
const FLG_NAME: u8 = 1 << 3;
const FLG_COMMENT: u8 = 1 << 4;
/// Bits 5..=7 must be zero per RFC 1952.
const FLG_RESERVED: u8 = 0xe0;

/// OS byte meaning "unknown", the default for emitted members.
pub const OS_UNKNOWN: u8 = 255;

/// Gzip header metadata carried by every member of a stream.
///
/// The block compressor emits the same metadata, mtime included, for every
/// member it produces, so a stream compresses deterministically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberHeader {
    /// Original file name, without any NUL bytes.
    pub name: Option<String>,
    /// Modification time in seconds since the Unix epoch; 0 means unset.
    pub mtime: u32,
    /// Free-form comment, without any NUL bytes.
    pub comment: Option<String>,
    /// Raw extra-field bytes (subfield framing is the caller's concern).
    pub extra: Option<Vec<u8>>,
    /// Operating system byte.
    pub os: u8,
}

impl Default for MemberHeader {
    fn default() -> Self {
        Self { name: None, mtime: 0, comment: None, extra: None, os: OS_UNKNOWN }
    }
}

/// XFL byte derived from the deflate level: 2 flags best compression,
/// 4 flags fastest.
pub(crate) fn xfl_for_level(level: i32) -> u8 {
    match level {
        9 => 2,
        -2 | 1 => 4,
        _ => 0,
    }
}

/// Checks that a header is encodable on the wire: no interior NUL in the
/// name or comment, and an extra field within the 16-bit length limit.
///
/// The writer runs this when metadata is set, so a bad header is rejected
/// before any byte reaches the sink.
pub(crate) fn validate_member_header(hdr: &MemberHeader) -> Result<()> {
    if let Some(name) = &hdr.name {
        if name.as_bytes().contains(&0) {
            return Err(Error::Header("embedded NUL in header string"));
        }
    }
    if let Some(comment) = &hdr.comment {
        if comment.as_bytes().contains(&0) {
            return Err(Error::Header("embedded NUL in header string"));
        }
    }
    if let Some(extra) = &hdr.extra {
        if u16::try_from(extra.len()).is_err() {
            return Err(Error::Header("extra field exceeds 65535 bytes"));
        }
    }
    Ok(())
}

/// Writes one member header.
///
/// # Errors
///
/// `Error::Header` if a name or comment contains an interior NUL, or the
/// extra field exceeds the 16-bit length the wire format allows.
pub(crate) fn write_member_header<W: Write>(
    w: &mut W,
    hdr: &MemberHeader,
    xfl: u8,
) -> Result<()> {
    let mut flg = 0u8;
    if hdr.extra.is_some() {
        flg |= FLG_EXTRA;
    }
    if hdr.name.is_some() {
        flg |= FLG_NAME;
    }
    if hdr.comment.is_some() {
        flg |= FLG_COMMENT;
    }

    w.write_all(&[GZIP_ID1, GZIP_ID2, METHOD_DEFLATE, flg])?;
    w.write_u32::<LittleEndian>(hdr.mtime)?;
    w.write_all(&[xfl, hdr.os])?;

    if let Some(extra) = &hdr.extra {
        let len = u16::try_from(extra.len())
            .map_err(|_| Error::Header("extra field exceeds 65535 bytes"))?;
        w.write_u16::<LittleEndian>(len)?;
        w.write_all(extra)?;
    }
    if let Some(name) = &hdr.name {
        write_zero_terminated(w, name.as_bytes())?;
    }
    if let Some(comment) = &hdr.comment {
        write_zero_terminated(w, comment.as_bytes())?;
    }
    Ok(())
}

fn write_zero_terminated<W: Write>(w: &mut W, bytes: &[u8]) -> Result<()> {
    if bytes.contains(&0) {
        return Err(Error::Header("embedded NUL in header string"));
    }
    w.write_all(bytes)?;
    w.write_all(&[0])?;
    Ok(())
}

/// Parses one member header from the current source position.
///
/// Returns `Ok(None)` when the source is cleanly exhausted before the first
/// header byte; that is the end of a well-formed multi-member stream, not an
/// error.
///
/// # Errors
///
/// - `Error::Header` on a magic or method mismatch, reserved flag bits, or a
///   failed header CRC.
/// - `Error::UnexpectedEof` when the source ends mid-header.
pub(crate) fn read_member_header<R: BufRead>(r: &mut R) -> Result<Option<MemberHeader>> {
    if r.fill_buf().map_err(Error::Io)?.is_empty() {
        return Ok(None);
    }

    // All header bytes are retained in order so an FHCRC field can be
    // verified over exactly the bytes that preceded it.
    let mut raw = vec![0u8; 10];
    read_exact(r, &mut raw)?;

    if raw[0] != GZIP_ID1 || raw[1] != GZIP_ID2 {
        return Err(Error::Header("bad magic bytes"));
    }
    if raw[2] != METHOD_DEFLATE {
        return Err(Error::Header("unknown compression method"));
    }
    let flg = raw[3];
    if flg & FLG_RESERVED != 0 {
        return Err(Error::Header("reserved flag bits set"));
    }
    let mtime = LittleEndian::read_u32(&raw[4..8]);
    let os = raw[9];

    let mut extra = None;
    if flg & FLG_EXTRA != 0 {
        let mut lenbuf = [0u8; 2];
        read_exact(r, &mut lenbuf)?;
        raw.extend_from_slice(&lenbuf);
        let len = LittleEndian::read_u16(&lenbuf) as usize;
        let start = raw.len();
        raw.resize(start + len, 0);
        read_exact(r, &mut raw[start..])?;
        extra = Some(raw[start..].to_vec());
    }

    let name = if flg & FLG_NAME != 0 { Some(read_zero_terminated(r, &mut raw)?) } else { None };
    let comment =
        if flg & FLG_COMMENT != 0 { Some(read_zero_terminated(r, &mut raw)?) } else { None };

    if flg & FLG_HCRC != 0 {
        let expected = (crc32fast::hash(&raw) & 0xffff) as u16;
        let mut crcbuf = [0u8; 2];
        read_exact(r, &mut crcbuf)?;
        let actual = LittleEndian::read_u16(&crcbuf);
        if actual != expected {
            return Err(Error::Header("header checksum mismatch"));
        }
    }

    Ok(Some(MemberHeader { name, mtime, comment, extra, os }))
}

/// Reads the 8-byte member trailer: CRC-32 of the payload and ISIZE.
pub(crate) fn read_member_trailer<R: Read>(r: &mut R) -> Result<(u32, u32)> {
    let mut buf = [0u8; 8];
    read_exact(r, &mut buf)?;
    Ok((LittleEndian::read_u32(&buf[..4]), LittleEndian::read_u32(&buf[4..])))
}

fn read_exact<R: Read>(r: &mut R, buf: &mut [u8]) -> Result<()> {
    r.read_exact(buf).map_err(map_io)
}

fn read_zero_terminated<R: BufRead>(r: &mut R, raw: &mut Vec<u8>) -> Result<String> {
    let start = raw.len();
    let n = r.read_until(0, raw).map_err(Error::Io)?;
    if n == 0 || raw.last() != Some(&0) {
        return Err(Error::UnexpectedEof);
    }
    let bytes = &raw[start..raw.len() - 1];
    Ok(String::from_utf8_lossy(bytes).into_owned())
}
