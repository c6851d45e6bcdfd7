//! [STL](https://en.wikipedia.org/wiki/STL_(file_format)) encoding.
//!
//! This module reads binary and ASCII STL and writes binary STL. Binary STL
//! is laid out as follows; all multi-byte fields are little-endian:
//!
//! | Offset        | Size | Content                                    |
//! |---------------|------|--------------------------------------------|
//! | 0             | 80   | Header                                     |
//! | 80            | 4    | Face count `n` (u32)                       |
//! | 84 + 50 * `i` | 12   | Normal (3 x f32)                           |
//! |               | 36   | Vertex positions (3 x 3 x f32)             |
//! |               | 2    | Attribute (see the [`channel`] module)     |
//!
//! STL has no shared vertices: each face record holds three positions of its
//! own. Decoding therefore produces three new vertices per face. Use
//! `Mesh::merge_vertices` to join them.
//!
//! Normals stored in a file are never trusted. They are discarded when
//! decoding and computed from the positions when encoding.
//!
//! # Examples
//!
//! Hiding a message in a mesh and reading it back:
//!
//! ```rust
//! use nalgebra::Point3;
//! use stenomesh::encoding;
//! use stenomesh::encoding::stl::{StlEncoding, ToStl};
//! use stenomesh::mesh::Mesh;
//!
//! let mut mesh = Mesh::from_raw_buffers_with_arity(
//!     vec![0, 1, 2, 0, 2, 3, 0, 3, 1, 1, 3, 2],
//!     vec![
//!         Point3::new(0.0, 0.0, 0.0),
//!         Point3::new(1.0, 0.0, 0.0),
//!         Point3::new(0.0, 1.0, 0.0),
//!         Point3::new(0.0, 0.0, 1.0),
//!     ],
//!     3,
//! )
//! .unwrap();
//! mesh.message = Some(b"hey".to_vec());
//!
//! let mut stl = Vec::new();
//! mesh.to_stl(&StlEncoding::default(), &mut stl).unwrap();
//! let decoded = encoding::decode(stl.as_slice()).unwrap();
//! assert_eq!(Some(b"hey".to_vec()), decoded.message);
//! ```
//!
//! [`channel`]: crate::encoding::stl::channel

pub mod ascii;
pub mod channel;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use nalgebra::{Point3, Vector3};
use std::cmp;
use std::io::{self, Read, Write};
use tracing::{debug, warn};

use crate::encoding::stl::channel::{ChannelReader, ChannelWriter, ATTRIBUTE_SIZE};
use crate::encoding::{EncodingError, PREALLOCATION_LIMIT};
use crate::mesh::{Mesh, MeshError, Position, DEFAULT_ARITY};

/// Size of the binary STL header.
pub const HEADER_SIZE: usize = 80;

/// Size of a face record in binary STL.
pub const RECORD_SIZE: usize = 50;

const COUNT_SIZE: usize = 4;
const ASCII_MAGIC: &[u8] = b"solid";

/// Gets the size of a binary STL stream with `face_count` faces.
pub fn encoded_size(face_count: usize) -> usize {
    HEADER_SIZE + COUNT_SIZE + RECORD_SIZE * face_count
}

/// Options for writing binary STL.
#[derive(Clone, Debug, PartialEq)]
pub struct StlEncoding {
    /// Per-axis multiplier applied to every written position.
    pub scale: Vector3<f32>,
    /// Writes a message even if it does not fit in the attribute channel.
    /// The message is truncated and cannot be fully extracted.
    pub ignore_capacity: bool,
}

impl Default for StlEncoding {
    fn default() -> Self {
        StlEncoding {
            scale: Vector3::repeat(1.0),
            ignore_capacity: false,
        }
    }
}

pub trait FromStl: Sized {
    /// Decodes binary STL from its header and the face table that follows.
    fn from_stl<R>(header: &[u8; HEADER_SIZE], data: R) -> Result<Self, EncodingError>
    where
        R: Read;
}

pub trait ToStl {
    /// Encodes binary STL and returns the number of bytes written.
    fn to_stl<W>(&self, encoding: &StlEncoding, write: W) -> Result<usize, EncodingError>
    where
        W: Write;
}

impl FromStl for Mesh {
    /// Decodes binary STL.
    ///
    /// Decoding is tolerant of truncation: if the data ends before the
    /// declared number of faces has been read, the faces read so far are
    /// returned. The message is extracted from the attribute channel of the
    /// faces that were read.
    fn from_stl<R>(header: &[u8; HEADER_SIZE], mut data: R) -> Result<Self, EncodingError>
    where
        R: Read,
    {
        let mut mesh = Mesh::new();
        let end = header
            .iter()
            .rposition(|&byte| byte != 0)
            .map_or(0, |position| position + 1);
        mesh.comment = String::from_utf8_lossy(&header[..end]).into_owned();

        let face_count = match data.read_u32::<LittleEndian>() {
            Ok(count) => count as usize,
            Err(error) if error.kind() == io::ErrorKind::UnexpectedEof => {
                warn!("binary STL ends before face count");
                return Ok(mesh);
            }
            Err(error) => return Err(error.into()),
        };
        let reservation = cmp::min(face_count, PREALLOCATION_LIMIT);
        mesh.reserve(reservation * DEFAULT_ARITY, reservation);

        let mut channel = ChannelReader::with_capacity(reservation);
        let mut scalars = [0f32; 12];
        let mut attribute = [0u8; ATTRIBUTE_SIZE];
        for index in 0..face_count {
            let record = data
                .read_f32_into::<LittleEndian>(&mut scalars)
                .and_then(|_| data.read_exact(&mut attribute));
            match record {
                Ok(()) => {}
                Err(error) if error.kind() == io::ErrorKind::UnexpectedEof => {
                    warn!(
                        read = index,
                        declared = face_count,
                        "binary STL truncated; keeping faces read so far"
                    );
                    break;
                }
                Err(error) => return Err(error.into()),
            }
            // The first three scalars are the normal.
            let mut face = [0u32; DEFAULT_ARITY];
            for (slot, position) in face.iter_mut().zip(scalars[3..].chunks_exact(3)) {
                *slot = mesh.push_vertex(Point3::new(position[0], position[1], position[2]))?;
            }
            mesh.push_face(&face)?;
            channel.push(attribute);
        }
        mesh.message = channel.into_message();
        debug!(
            faces = mesh.face_count(),
            message = mesh.message.as_ref().map_or(0, Vec::len),
            "decoded binary STL"
        );
        Ok(mesh)
    }
}

impl ToStl for Mesh {
    /// Encodes binary STL.
    ///
    /// # Errors
    ///
    /// Returns an error if the mesh is not triangular, if it has more faces
    /// than the format can count, or if the message overflows the attribute
    /// channel and `ignore_capacity` is not set. Nothing is written when an
    /// error is returned for any of these reasons.
    fn to_stl<W>(&self, encoding: &StlEncoding, mut write: W) -> Result<usize, EncodingError>
    where
        W: Write,
    {
        if self.arity() != DEFAULT_ARITY {
            return Err(MeshError::ArityConflict {
                expected: DEFAULT_ARITY,
                actual: self.arity(),
            }
            .into());
        }
        let face_count = u32::try_from(self.face_count()).map_err(|_| {
            EncodingError::Unsupported(format!("{} faces exceed STL count", self.face_count()))
        })?;
        let message = self.message.as_deref().filter(|message| !message.is_empty());
        if let Some(message) = message {
            let capacity = channel::capacity(self.face_count());
            let overflow = u32::try_from(message.len()).is_err()
                || (message.len() as i64) > capacity;
            if overflow {
                if encoding.ignore_capacity && u32::try_from(message.len()).is_ok() {
                    warn!(
                        length = message.len(),
                        capacity, "message overflows attribute channel; truncating"
                    );
                }
                else {
                    return Err(EncodingError::CapacityExceeded {
                        length: message.len(),
                        capacity,
                    });
                }
            }
        }

        let mut header = [0u8; HEADER_SIZE];
        let comment = self.comment.as_bytes();
        let length = cmp::min(comment.len(), HEADER_SIZE);
        header[..length].copy_from_slice(&comment[..length]);
        if header.starts_with(ASCII_MAGIC) {
            warn!("header begins with `solid`; readers may mistake the output for ASCII STL");
        }
        write.write_all(&header)?;
        write.write_u32::<LittleEndian>(face_count)?;

        let mut channel = ChannelWriter::new(message);
        for face in self.as_face_slice() {
            let [a, b, c] = [0usize, 1, 2].map(|index| {
                scale_position(&self.as_vertex_slice()[face[index] as usize], &encoding.scale)
            });
            // Degenerate faces produce a NaN normal, which is written as is.
            let normal = (b - a).cross(&(c - a)).normalize();
            for scalar in normal
                .iter()
                .chain(a.coords.iter())
                .chain(b.coords.iter())
                .chain(c.coords.iter())
            {
                write.write_f32::<LittleEndian>(*scalar)?;
            }
            write.write_all(&channel.next_attribute())?;
        }
        write.flush()?;
        let size = encoded_size(self.face_count());
        debug!(
            faces = self.face_count(),
            message = message.map_or(0, <[u8]>::len),
            size,
            "encoded binary STL"
        );
        Ok(size)
    }
}

fn scale_position(position: &Position, scale: &Vector3<f32>) -> Position {
    Point3::from(position.coords.component_mul(scale))
}
