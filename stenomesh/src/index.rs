//! Indexing and vertex merging.
//!
//! This module provides _indexers_ that disambiguate vertex data by a key and
//! the merge operation built on top of them. Merging collapses vertices that
//! are nearly coincident into a single vertex and removes faces that become
//! degenerate as a result.
//!
//! Nearness is decided by quantization: each coordinate is scaled by the
//! inverse of a tolerance and truncated toward zero, forming a
//! [`QuantizedKey`]. Vertices with equal keys occupy the same cell and are
//! merged. The first vertex seen in a cell represents that cell.
//!
//! # Examples
//!
//! ```rust
//! use nalgebra::Point3;
//! use stenomesh::mesh::Mesh;
//!
//! let mut mesh = Mesh::from_raw_buffers_with_arity(
//!     vec![0, 1, 2, 3, 4, 5],
//!     vec![
//!         Point3::new(0.0, 0.0, 0.0),
//!         Point3::new(1.0, 0.0, 0.0),
//!         Point3::new(0.0, 1.0, 0.0),
//!         Point3::new(1.0, 0.0, 0.0),
//!         Point3::new(1.0, 1.0, 0.0),
//!         Point3::new(0.0, 1.0, 0.0),
//!     ],
//!     3,
//! )
//! .unwrap();
//! mesh.merge_vertices(0.01).unwrap();
//! assert_eq!(4, mesh.vertex_count());
//! ```
//!
//! [`QuantizedKey`]: crate::index::QuantizedKey

use ahash::AHashMap;
use itertools::Itertools;
use std::hash::Hash;
use thiserror::Error;
use tracing::debug;

use crate::mesh::{Face, Mesh, Position};

#[derive(Debug, Error, PartialEq)]
pub enum MergeError {
    #[error("merge tolerance must be positive and finite, but got {0}")]
    InvalidTolerance(f64),
}

/// Cell of a position quantized by a tolerance.
///
/// Never persisted; only used to find nearly coincident vertices.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct QuantizedKey([i64; 3]);

impl QuantizedKey {
    /// Quantizes a position.
    ///
    /// `scale` is the inverse of the tolerance. Each scaled coordinate is
    /// truncated toward zero.
    pub fn new(position: &Position, scale: f64) -> Self {
        QuantizedKey([
            (f64::from(position.x) * scale) as i64,
            (f64::from(position.y) * scale) as i64,
            (f64::from(position.z) * scale) as i64,
        ])
    }
}

/// Vertex indexer.
///
/// Disambiguates vertices by a key and assigns sequential indices in order
/// of first occurrence.
pub trait Indexer<T, K> {
    /// Indexes a vertex using a keying function.
    ///
    /// Returns a tuple containing the index and optionally the vertex. The
    /// vertex is only returned the first time its key is seen; the caller is
    /// expected to append it to its vertex buffer.
    fn index<F>(&mut self, vertex: T, f: F) -> (usize, Option<T>)
    where
        F: Fn(&T) -> K;
}

/// Hashing vertex indexer.
///
/// Keys must implement `Hash`. The first vertex seen for a key wins.
pub struct HashIndexer<K>
where
    K: Eq + Hash,
{
    hash: AHashMap<K, usize>,
    n: usize,
}

impl<K> HashIndexer<K>
where
    K: Eq + Hash,
{
    /// Creates a new `HashIndexer`.
    pub fn new() -> Self {
        HashIndexer {
            hash: AHashMap::new(),
            n: 0,
        }
    }

    /// Creates a new `HashIndexer` with room for `capacity` distinct keys.
    pub fn with_capacity(capacity: usize) -> Self {
        HashIndexer {
            hash: AHashMap::with_capacity(capacity),
            n: 0,
        }
    }
}

impl<K> Default for HashIndexer<K>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        HashIndexer::new()
    }
}

impl<T, K> Indexer<T, K> for HashIndexer<K>
where
    K: Eq + Hash,
{
    fn index<F>(&mut self, input: T, f: F) -> (usize, Option<T>)
    where
        F: Fn(&T) -> K,
    {
        let mut vertex = None;
        let mut n = self.n;
        let index = self.hash.entry(f(&input)).or_insert_with(|| {
            vertex = Some(input);
            let m = n;
            n += 1;
            m
        });
        self.n = n;
        (*index, vertex)
    }
}

/// Summary of a merge.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct MergeReport {
    pub vertices_removed: usize,
    pub faces_removed: usize,
}

impl Mesh {
    /// Merges vertices that fall into the same quantization cell.
    ///
    /// Faces are rewritten with merged indices and any face whose indices are
    /// no longer pairwise distinct is removed. Vertices are then renumbered
    /// in order of first reference by a remaining face, so vertices that are
    /// only referenced by removed faces are dropped too. Merging a merged
    /// mesh again with the same tolerance has no effect.
    ///
    /// # Errors
    ///
    /// Returns an error if `tolerance` is not positive and finite.
    pub fn merge_vertices(&mut self, tolerance: f64) -> Result<MergeReport, MergeError> {
        if !(tolerance.is_finite() && tolerance > 0.0) {
            return Err(MergeError::InvalidTolerance(tolerance));
        }
        let scale = 1.0 / tolerance;
        let (vertex_count, face_count) = (self.vertex_count(), self.face_count());

        let mut indexer = HashIndexer::with_capacity(vertex_count);
        let mut cells = Vec::new();
        let mut faces = Vec::with_capacity(face_count);
        for face in self.as_face_slice() {
            let face = face
                .iter()
                .map(|&index| {
                    let position = self.as_vertex_slice()[index as usize];
                    let (index, vertex) =
                        indexer.index(position, |position| QuantizedKey::new(position, scale));
                    if let Some(vertex) = vertex {
                        cells.push(vertex);
                    }
                    index as u32
                })
                .collect::<Face>();
            if face.iter().all_unique() {
                faces.push(face);
            }
        }

        // Compact cells into vertices in order of first reference.
        let mut remap = vec![None; cells.len()];
        let mut vertices = Vec::with_capacity(cells.len());
        for face in faces.iter_mut() {
            for index in face.iter_mut() {
                let cell = *index as usize;
                *index = *remap[cell].get_or_insert_with(|| {
                    vertices.push(cells[cell]);
                    (vertices.len() - 1) as u32
                });
            }
        }

        let report = MergeReport {
            vertices_removed: vertex_count - vertices.len(),
            faces_removed: face_count - faces.len(),
        };
        debug!(
            tolerance,
            vertices_removed = report.vertices_removed,
            faces_removed = report.faces_removed,
            "merged vertices"
        );
        self.replace_raw_buffers(faces, vertices);
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use nalgebra::Point3;

    use crate::index::{HashIndexer, Indexer, MergeError, MergeReport, QuantizedKey};
    use crate::mesh::tests::cube;
    use crate::mesh::Mesh;

    /// Triangle soup of the unit cube: every face owns three vertices.
    fn cube_soup() -> Mesh {
        let cube = cube();
        let mut soup = Mesh::new();
        for face in cube.as_face_slice() {
            let indices = cube
                .face_positions(face)
                .map(|position| soup.push_vertex(*position).unwrap())
                .collect::<Vec<_>>();
            soup.push_face(&indices).unwrap();
        }
        soup
    }

    #[test]
    fn quantize_truncates_toward_zero() {
        let key = QuantizedKey::new(&Point3::new(0.019, -0.019, 0.5), 100.0);
        assert_eq!(QuantizedKey([1, -1, 50]), key);
        assert_eq!(
            QuantizedKey::new(&Point3::new(0.004, 0.0, 0.0), 100.0),
            QuantizedKey::new(&Point3::new(-0.004, 0.0, 0.0), 100.0),
        );
    }

    #[test]
    fn hash_indexer_first_seen_wins() {
        let mut indexer = HashIndexer::default();
        let (a, vertex) = indexer.index((1, 'a'), |vertex| vertex.0);
        assert_eq!((0, Some((1, 'a'))), (a, vertex));
        let (b, vertex) = indexer.index((2, 'b'), |vertex| vertex.0);
        assert_eq!((1, Some((2, 'b'))), (b, vertex));
        let (c, vertex) = indexer.index((1, 'c'), |vertex| vertex.0);
        assert_eq!((0, None), (c, vertex));
    }

    #[test]
    fn merge_soup_into_cube() {
        let mut mesh = cube_soup();
        assert_eq!(36, mesh.vertex_count());

        let report = mesh.merge_vertices(0.01).unwrap();
        assert_eq!(8, mesh.vertex_count());
        assert_eq!(12, mesh.face_count());
        assert_eq!(
            MergeReport {
                vertices_removed: 28,
                faces_removed: 0,
            },
            report,
        );
    }

    #[test]
    fn merge_is_idempotent() {
        let mut mesh = cube_soup();
        mesh.merge_vertices(0.5).unwrap();
        let once = mesh.clone();
        mesh.merge_vertices(0.5).unwrap();
        assert_eq!(once, mesh);
    }

    #[test]
    fn merge_near_and_keep_far() {
        let mut mesh = Mesh::from_raw_buffers_with_arity(
            vec![0, 1, 2, 3, 4, 5],
            vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(0.0, 1.0, 0.0),
                // Within tolerance of the first vertex.
                Point3::new(0.004, 0.0, 0.0),
                // Beyond tolerance of the second vertex.
                Point3::new(1.02, 0.0, 0.0),
                Point3::new(0.0, 1.0, 0.0),
            ],
            3,
        )
        .unwrap();
        mesh.merge_vertices(0.01).unwrap();

        assert_eq!(4, mesh.vertex_count());
        assert_eq!(2, mesh.face_count());
        assert_eq!(&[0, 1, 2], mesh.as_face_slice()[0].as_slice());
        assert_eq!(&[0, 3, 2], mesh.as_face_slice()[1].as_slice());
    }

    #[test]
    fn merge_drops_degenerate_faces_and_orphans() {
        let mut mesh = Mesh::from_raw_buffers_with_arity(
            vec![0, 1, 2, 3, 4, 5],
            vec![
                // Collapses into a segment.
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(0.001, 0.0, 0.0),
                Point3::new(5.0, 5.0, 5.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(1.0, 1.0, 0.0),
                Point3::new(0.0, 1.0, 0.0),
            ],
            3,
        )
        .unwrap();
        let report = mesh.merge_vertices(0.01).unwrap();

        assert_eq!(1, mesh.face_count());
        assert_eq!(3, mesh.vertex_count());
        assert_eq!(1, report.faces_removed);
        assert_eq!(&[0, 1, 2], mesh.as_face_slice()[0].as_slice());
        assert_eq!(Point3::new(1.0, 0.0, 0.0), mesh.as_vertex_slice()[0]);
    }

    #[test]
    fn reject_zero_tolerance() {
        let mut mesh = cube();
        assert_eq!(
            Err(MergeError::InvalidTolerance(0.0)),
            mesh.merge_vertices(0.0)
        );
        assert!(mesh.merge_vertices(f64::NAN).is_err());
        assert_eq!(8, mesh.vertex_count());
    }
}
