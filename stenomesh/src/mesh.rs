//! Indexed polygonal meshes.
//!
//! This module provides `Mesh`, the representation that every decoder writes
//! into and every encoder reads from. A `Mesh` is composed of a _vertex
//! buffer_ of positions and a _face buffer_ of ordered indices into those
//! positions. The insertion order of vertices is the implicit index used by
//! faces.
//!
//! Every face has the same _arity_ (number of indices). Arity is chosen when
//! a `Mesh` is constructed and cannot change afterwards. Triangles (arity 3)
//! are the default and the only arity that STL can represent.
//!
//! Besides geometry, a `Mesh` carries a free-form comment (header text) and
//! an optional message: the payload that is hidden in or extracted from the
//! attribute channel of binary STL.
//!
//! # Examples
//!
//! Constructing a triangle from raw buffers:
//!
//! ```rust
//! use nalgebra::Point3;
//! use stenomesh::mesh::Mesh;
//!
//! let mesh = Mesh::from_raw_buffers_with_arity(
//!     vec![0, 1, 2],
//!     vec![
//!         Point3::new(0.0, 0.0, 0.0),
//!         Point3::new(1.0, 0.0, 0.0),
//!         Point3::new(0.0, 1.0, 0.0),
//!     ],
//!     3,
//! )
//! .unwrap();
//! assert_eq!(1, mesh.face_count());
//! ```

use nalgebra::Point3;
use smallvec::SmallVec;
use thiserror::Error;

/// Smallest arity that describes a polygon.
pub const MIN_ARITY: usize = 3;

/// Arity used by `Mesh::new` and by STL.
pub const DEFAULT_ARITY: usize = 3;

pub type Position = Point3<f32>;

/// Ordered vertex indices of a single polygon.
pub type Face = SmallVec<[u32; 4]>;

#[derive(Debug, Error, PartialEq)]
pub enum MeshError {
    #[error("index into vertex data out of bounds")]
    IndexOutOfBounds,
    #[error("index buffer conflicts with arity")]
    IndexUnaligned,
    #[error("conflicting arity; expected {expected}, but got {actual}")]
    ArityConflict { expected: usize, actual: usize },
    #[error("arity {0} does not describe a polygon")]
    ArityInvalid(usize),
    #[error("vertex count exceeds the range of indices")]
    IndexOverflow,
}

/// Indexed polygonal mesh with a uniform arity.
///
/// See the module documentation for more information.
#[derive(Clone, Debug, PartialEq)]
pub struct Mesh {
    vertices: Vec<Position>,
    faces: Vec<Face>,
    arity: usize,
    /// Provenance or header text.
    pub comment: String,
    /// Payload carried by the STL attribute channel.
    pub message: Option<Vec<u8>>,
}

impl Mesh {
    /// Creates an empty triangular `Mesh`.
    pub fn new() -> Self {
        Mesh {
            vertices: Vec::new(),
            faces: Vec::new(),
            arity: DEFAULT_ARITY,
            comment: String::new(),
            message: None,
        }
    }

    /// Creates an empty `Mesh` with the given arity.
    ///
    /// # Errors
    ///
    /// Returns an error if `arity` is less than three.
    pub fn with_arity(arity: usize) -> Result<Self, MeshError> {
        if arity < MIN_ARITY {
            Err(MeshError::ArityInvalid(arity))
        }
        else {
            Ok(Mesh {
                arity,
                ..Mesh::new()
            })
        }
    }

    /// Creates a `Mesh` from a flat index buffer and a vertex buffer.
    ///
    /// Each consecutive run of `arity` indices forms a face.
    ///
    /// # Errors
    ///
    /// Returns an error if the arity is invalid, if the length of the index
    /// buffer is not a multiple of the arity, or if any index is out of
    /// bounds.
    pub fn from_raw_buffers_with_arity<I, J>(
        indices: I,
        vertices: J,
        arity: usize,
    ) -> Result<Self, MeshError>
    where
        I: IntoIterator<Item = u32>,
        J: IntoIterator<Item = Position>,
    {
        let mut mesh = Mesh::with_arity(arity)?;
        mesh.vertices.extend(vertices);
        let indices = indices.into_iter().collect::<Vec<_>>();
        if indices.len() % arity != 0 {
            return Err(MeshError::IndexUnaligned);
        }
        mesh.faces.reserve(indices.len() / arity);
        for face in indices.chunks_exact(arity) {
            mesh.push_face(face)?;
        }
        Ok(mesh)
    }

    /// Appends a vertex and returns its index.
    ///
    /// # Errors
    ///
    /// Returns an error if the index of the vertex cannot be represented by
    /// a `u32`.
    pub fn push_vertex(&mut self, position: Position) -> Result<u32, MeshError> {
        let index = next_index(self.vertices.len())?;
        self.vertices.push(position);
        Ok(index)
    }

    /// Appends a face.
    ///
    /// # Errors
    ///
    /// Returns an error if the number of indices differs from the arity of
    /// the mesh or if any index is out of bounds.
    pub fn push_face(&mut self, indices: &[u32]) -> Result<(), MeshError> {
        if indices.len() != self.arity {
            return Err(MeshError::ArityConflict {
                expected: self.arity,
                actual: indices.len(),
            });
        }
        let n = self.vertices.len();
        if indices.iter().any(|&index| index as usize >= n) {
            return Err(MeshError::IndexOutOfBounds);
        }
        self.faces.push(Face::from_slice(indices));
        Ok(())
    }

    pub(crate) fn reserve(&mut self, vertices: usize, faces: usize) {
        self.vertices.reserve(vertices);
        self.faces.reserve(faces);
    }

    pub(crate) fn replace_raw_buffers(&mut self, faces: Vec<Face>, vertices: Vec<Position>) {
        self.faces = faces;
        self.vertices = vertices;
    }

    pub fn into_raw_buffers(self) -> (Vec<Face>, Vec<Position>) {
        let Mesh {
            faces, vertices, ..
        } = self;
        (faces, vertices)
    }

    /// Gets a slice of the vertex data.
    pub fn as_vertex_slice(&self) -> &[Position] {
        self.vertices.as_slice()
    }

    /// Gets a slice of the face data.
    pub fn as_face_slice(&self) -> &[Face] {
        self.faces.as_slice()
    }

    /// Gets the positions of the vertices of a face in order.
    pub fn face_positions<'a>(&'a self, face: &'a Face) -> impl 'a + Iterator<Item = &'a Position> {
        face.iter().map(move |&index| &self.vertices[index as usize])
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    pub fn arity(&self) -> usize {
        self.arity
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() && self.faces.is_empty()
    }
}

fn next_index(count: usize) -> Result<u32, MeshError> {
    u32::try_from(count).map_err(|_| MeshError::IndexOverflow)
}

impl Default for Mesh {
    fn default() -> Self {
        Mesh::new()
    }
}
