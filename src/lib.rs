//! Seekable gzip codec.
//!
//! [`Writer`] emits a standard gzip stream (a concatenation of RFC 1952
//! members that any gzip decoder accepts) while partitioning the input
//! into fixed-size blocks, one independent member per block with the
//! deflate dictionary reset at every boundary. The compressed length of
//! each member is recorded in a [`BlockIndex`].
//!
//! Given the stream and its index, [`SeekReader`] serves random-access
//! reads: an uncompressed offset maps to a member offset by prefix sum,
//! the source is repositioned there, and at most one block of residue is
//! decoded and discarded. [`Reader`] is the plain sequential decoder the
//! seeking variant is built on.
//!
//! Cross-block dictionary reuse is deliberately sacrificed: it costs a
//! little compression ratio and buys O(1) seeks with full gzip
//! interoperability.
//!
//! ```
//! use std::io::{Cursor, Read, Seek, SeekFrom, Write};
//! use std::sync::Arc;
//!
//! use seekgz::{SeekReader, Writer};
//!
//! # fn main() -> seekgz::Result<()> {
//! let mut writer = Writer::new(Vec::new());
//! writer.write_all(b"she sells seashells by the seashore\n")?;
//! let (compressed, index) = writer.finish()?;
//!
//! let mut reader = SeekReader::new(Cursor::new(&compressed[..]), Arc::new(index))?;
//! reader.seek(SeekFrom::Start(17))?;
//! let mut tail = String::new();
//! reader.read_to_string(&mut tail)?;
//! assert_eq!(tail, "ls by the seashore\n");
//! # Ok(())
//! # }
//! ```

mod count;
mod error;
mod header;
mod index;
mod reader;
mod seek;
mod writer;

pub use count::CountWriter;
pub use error::{Error, Result};
pub use header::{MemberHeader, OS_UNKNOWN};
pub use index::{BlockIndex, DEFAULT_BLOCK_SIZE};
pub use reader::Reader;
pub use seek::SeekReader;
pub use writer::Writer;
