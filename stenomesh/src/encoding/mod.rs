//! Serialization and encodings.
//!
//! This module provides decoders and encoders for the mesh formats supported
//! by Stenomesh. Each encoding has a corresponding sub-module. The following
//! table summarizes the encodings:
//!
//! | Feature        | Default | Encoding     | Read | Write | Message |
//! |----------------|---------|--------------|------|-------|---------|
//! | `encoding-ply` | Yes     | [PLY] binary | Yes  | No    | No      |
//! |                | Yes     | [STL] binary | Yes  | Yes   | Yes     |
//! |                | Yes     | [STL] ASCII  | Yes  | No    | No      |
//!
//! Most code should use [`decode`], which sniffs the format from the first
//! bytes of a stream and dispatches to the matching decoder. Output is always
//! written as binary STL via [`ToStl`].
//!
//! [PLY]: https://en.wikipedia.org/wiki/PLY_(file_format)
//! [STL]: https://en.wikipedia.org/wiki/STL_(file_format)
//! [`decode`]: crate::encoding::decode
//! [`ToStl`]: crate::encoding::stl::ToStl

pub mod ply;
pub mod stl;

use std::io::{self, BufRead, Cursor, Read};
use thiserror::Error;
use tracing::debug;

use crate::encoding::stl::ascii;
use crate::encoding::stl::{FromStl, HEADER_SIZE};
use crate::mesh::{Mesh, MeshError, DEFAULT_ARITY};

/// Number of bytes inspected to identify a format.
pub const MAGIC_SIZE: usize = 5;

const PLY_END_HEADER: &str = "end_header";

// Upper bound on buffer reservations computed from counts declared by a
// stream. Larger buffers still grow as data is actually read.
pub(crate) const PREALLOCATION_LIMIT: usize = 1 << 24;

#[derive(Debug, Error)]
pub enum EncodingError {
    #[error("malformed data: {0}")]
    Malformed(String),
    #[error("{0} not found")]
    ElementNotFound(&'static str),
    #[error("input truncated")]
    Truncated,
    #[error("unsupported encoding: {0}")]
    Unsupported(String),
    #[error("message overflows available storage; {length} bytes exceed capacity of {}", .capacity.max(&0))]
    CapacityExceeded { length: usize, capacity: i64 },
    #[error("numeric value cannot be represented in target type")]
    NumericCast,
    #[error(transparent)]
    Mesh(#[from] MeshError),
    #[error(transparent)]
    Io(io::Error),
}

impl From<io::Error> for EncodingError {
    fn from(error: io::Error) -> Self {
        match error.kind() {
            io::ErrorKind::UnexpectedEof => EncodingError::Truncated,
            _ => EncodingError::Io(error),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Format {
    Ply,
    StlAscii,
    StlBinary,
}

impl Format {
    /// Identifies a format from the leading token of a stream.
    ///
    /// The token ends at the first space or control character. Binary STL
    /// has no magic number, so it is assumed when nothing else matches.
    pub fn from_magic(magic: &[u8]) -> Self {
        let end = magic
            .iter()
            .position(|&byte| byte <= b' ')
            .unwrap_or(magic.len());
        match &magic[..end] {
            b"ply" | b"PLY" => Format::Ply,
            b"solid" => Format::StlAscii,
            _ => Format::StlBinary,
        }
    }
}

/// A stream split into its header and the data that follows it.
#[derive(Debug)]
pub enum Sniffed<R> {
    /// The complete PLY header, rewound to its start, and the payload.
    Ply { header: Cursor<Vec<u8>>, data: R },
    /// The trimmed name from the `solid` line and the remaining text.
    StlAscii { name: String, data: R },
    /// The fixed size header and the face table.
    StlBinary {
        header: [u8; HEADER_SIZE],
        data: R,
    },
}

impl<R> Sniffed<R> {
    pub fn format(&self) -> Format {
        match self {
            Sniffed::Ply { .. } => Format::Ply,
            Sniffed::StlAscii { .. } => Format::StlAscii,
            Sniffed::StlBinary { .. } => Format::StlBinary,
        }
    }
}

/// Identifies the format of a stream and buffers its header.
///
/// Exactly [`MAGIC_SIZE`] bytes are read to identify the format. The header
/// is then completed without consuming any data beyond it: 80 bytes for
/// binary STL, the first line for ASCII STL, and every line through
/// `end_header` for PLY.
///
/// # Errors
///
/// Returns `EncodingError::Truncated` if the stream ends before the header
/// is complete.
///
/// [`MAGIC_SIZE`]: crate::encoding::MAGIC_SIZE
pub fn sniff<R>(mut read: R) -> Result<Sniffed<R>, EncodingError>
where
    R: BufRead,
{
    let mut magic = [0u8; MAGIC_SIZE];
    read.read_exact(&mut magic)?;
    let format = Format::from_magic(&magic);
    debug!(?format, "sniffed format");
    match format {
        Format::Ply => {
            let mut header = magic.to_vec();
            let mut start = header
                .iter()
                .rposition(|&byte| byte == b'\n')
                .map_or(0, |position| position + 1);
            loop {
                if read.read_until(b'\n', &mut header)? == 0 {
                    return Err(EncodingError::Truncated);
                }
                if String::from_utf8_lossy(&header[start..]).contains(PLY_END_HEADER) {
                    break;
                }
                start = header.len();
            }
            Ok(Sniffed::Ply {
                header: Cursor::new(header),
                data: read,
            })
        }
        Format::StlAscii => {
            let mut line = Vec::new();
            read.read_until(b'\n', &mut line)?;
            let name = String::from_utf8_lossy(&line).trim().to_owned();
            Ok(Sniffed::StlAscii { name, data: read })
        }
        Format::StlBinary => {
            let mut header = [0u8; HEADER_SIZE];
            header[..MAGIC_SIZE].copy_from_slice(&magic);
            read.read_exact(&mut header[MAGIC_SIZE..])?;
            Ok(Sniffed::StlBinary { header, data: read })
        }
    }
}

/// Decodes a triangular mesh from any supported encoding.
///
/// See [`decode_with_arity`].
///
/// [`decode_with_arity`]: crate::encoding::decode_with_arity
pub fn decode<R>(read: R) -> Result<Mesh, EncodingError>
where
    R: BufRead,
{
    decode_with_arity(read, DEFAULT_ARITY)
}

/// Decodes a mesh with the given face arity from any supported encoding.
///
/// STL can only describe triangles, so an arity other than three is only
/// meaningful for PLY.
///
/// # Errors
///
/// Returns an error if the format is malformed or unsupported, if a PLY
/// payload is truncated, or if an STL stream is decoded with an arity other
/// than three.
pub fn decode_with_arity<R>(read: R, arity: usize) -> Result<Mesh, EncodingError>
where
    R: BufRead,
{
    let mesh = match sniff(read)? {
        Sniffed::Ply { header, data } => decode_ply(header, data, arity)?,
        Sniffed::StlAscii { name, data } => {
            expect_triangles(arity)?;
            ascii::decode(name, data)?
        }
        Sniffed::StlBinary { header, data } => {
            expect_triangles(arity)?;
            Mesh::from_stl(&header, data)?
        }
    };
    debug!(
        vertices = mesh.vertex_count(),
        faces = mesh.face_count(),
        "decoded mesh"
    );
    Ok(mesh)
}

fn expect_triangles(arity: usize) -> Result<(), EncodingError> {
    if arity == DEFAULT_ARITY {
        Ok(())
    }
    else {
        Err(MeshError::ArityConflict {
            expected: DEFAULT_ARITY,
            actual: arity,
        }
        .into())
    }
}

#[cfg(feature = "encoding-ply")]
fn decode_ply<R>(header: Cursor<Vec<u8>>, data: R, arity: usize) -> Result<Mesh, EncodingError>
where
    R: Read,
{
    use crate::encoding::ply::FromPly;

    Mesh::from_ply(header, data, arity)
}

#[cfg(not(feature = "encoding-ply"))]
fn decode_ply<R>(_: Cursor<Vec<u8>>, _: R, _: usize) -> Result<Mesh, EncodingError>
where
    R: Read,
{
    Err(EncodingError::Unsupported(
        "PLY support is disabled (feature `encoding-ply`)".to_owned(),
    ))
}
