//! **Stenomesh** transcodes polygonal meshes into binary STL and hides an
//! arbitrary message in the attribute field of each face record.
//!
//! Meshes are read from binary PLY, binary STL, or ASCII STL. The format is
//! identified from the first bytes of the input, so callers generally use
//! [`encoding::decode`] and never name a format. A decoded [`Mesh`] may then
//! have its near-coincident vertices merged and its extent validated before
//! it is written back out via [`ToStl`].
//!
//! The message is not encrypted. Anyone who knows where to look can read it.
//!
//! # Examples
//!
//! Hiding a message in a mesh and reading it back:
//!
//! ```rust
//! use stenomesh::encoding::{self, stl::StlEncoding};
//! use stenomesh::prelude::*;
//!
//! let mut mesh = encoding::decode(&include_bytes!("../../data/triangle.ply")[..]).unwrap();
//! mesh.message = Some(b"hi".to_vec());
//!
//! let mut stl = Vec::new();
//! // One triangle only has room for a length prefix.
//! assert!(mesh.to_stl(&StlEncoding::default(), &mut stl).is_err());
//!
//! mesh.message = None;
//! mesh.to_stl(&StlEncoding::default(), &mut stl).unwrap();
//! let decoded = encoding::decode(stl.as_slice()).unwrap();
//! assert_eq!(1, decoded.face_count());
//! ```
//!
//! [`encoding::decode`]: crate::encoding::decode
//! [`Mesh`]: crate::mesh::Mesh
//! [`ToStl`]: crate::encoding::stl::ToStl
#![allow(unknown_lints)] // Allow clippy lints.

pub mod bounds;
pub mod encoding;
pub mod index;
pub mod mesh;

pub mod prelude {
    //! Re-exports commonly used types and traits.
    //!
    //! Encoding traits are re-exported anonymously so that their functions
    //! can be called on `Mesh` without lengthy imports.

    #[cfg(feature = "encoding-ply")]
    pub use crate::encoding::ply::FromPly as _;
    pub use crate::encoding::stl::{FromStl as _, ToStl as _};
    pub use crate::mesh::Mesh;
}

pub use crate::bounds::{Axis, BoundingBox};
pub use crate::mesh::{Mesh, Position};
