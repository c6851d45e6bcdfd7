//! ASCII STL decoding.
//!
//! ASCII STL is keyword delimited:
//!
//! ```text
//! solid name
//!   facet normal ni nj nk
//!     outer loop
//!       vertex v1x v1y v1z
//!       vertex v2x v2y v2z
//!       vertex v3x v3y v3z
//!     endloop
//!   endfacet
//! endsolid name
//! ```
//!
//! Only the `normal` and `vertex` keywords are significant. Each is followed
//! by three numbers separated by whitespace, commas or semicolons, either on
//! the same line or on the next line that consists only of numbers. ASCII
//! STL has no attribute channel and so never carries a message.

use nalgebra::Point3;
use std::io::BufRead;
use tracing::warn;

use crate::encoding::EncodingError;
use crate::mesh::{Mesh, Position, DEFAULT_ARITY};

const NORMAL: &str = "normal";
const VERTEX: &str = "vertex";
const DELIMITERS: &[char] = &[' ', '\t', ',', ';'];

/// Decodes the text that follows the `solid` line.
///
/// `name` becomes the comment of the mesh. Like binary STL, every facet
/// produces three new vertices. A facet that is cut off by the end of the
/// stream is discarded.
///
/// # Errors
///
/// Returns an error if a numeric line holds fewer than three numbers or a
/// number cannot be parsed.
pub fn decode<R>(name: String, read: R) -> Result<Mesh, EncodingError>
where
    R: BufRead,
{
    let mut mesh = Mesh::new();
    mesh.comment = name;
    let mut scanner = Scanner::new(read);
    let mut partial = false;
    'facets: while scanner.seek(NORMAL)? {
        // The normal is recomputed on encode.
        if scanner.read_triplet()?.is_none() {
            partial = true;
            break;
        }
        let mut positions = [Position::origin(); DEFAULT_ARITY];
        for position in positions.iter_mut() {
            let triplet = match scanner.seek(VERTEX)? {
                true => scanner.read_triplet()?,
                false => None,
            };
            match triplet {
                Some(triplet) => *position = Point3::from(triplet),
                None => {
                    partial = true;
                    break 'facets;
                }
            }
        }
        let mut face = [0u32; DEFAULT_ARITY];
        for (slot, position) in face.iter_mut().zip(positions) {
            *slot = mesh.push_vertex(position)?;
        }
        mesh.push_face(&face)?;
    }
    if partial {
        warn!("ASCII STL ends inside a facet; discarding it");
    }
    Ok(mesh)
}

// Line oriented substring scanner.
struct Scanner<R> {
    read: R,
    line: String,
    cursor: usize,
}

impl<R> Scanner<R>
where
    R: BufRead,
{
    fn new(read: R) -> Self {
        Scanner {
            read,
            line: String::new(),
            cursor: 0,
        }
    }

    fn next_line(&mut self) -> Result<bool, EncodingError> {
        let mut line = Vec::new();
        if self.read.read_until(b'\n', &mut line)? == 0 {
            return Ok(false);
        }
        self.line = String::from_utf8_lossy(&line).into_owned();
        self.cursor = 0;
        Ok(true)
    }

    /// Advances past the next occurrence of `keyword`. Returns `false` at the
    /// end of the stream.
    fn seek(&mut self, keyword: &'static str) -> Result<bool, EncodingError> {
        loop {
            if let Some(position) = self.line[self.cursor..].find(keyword) {
                self.cursor += position + keyword.len();
                return Ok(true);
            }
            if !self.next_line()? {
                return Ok(false);
            }
        }
    }

    /// Reads three numbers from the rest of the current line or, if it is not
    /// numeric, from the next numeric line. Returns `None` at the end of the
    /// stream.
    fn read_triplet(&mut self) -> Result<Option<[f32; 3]>, EncodingError> {
        loop {
            let text = &self.line[self.cursor..];
            if is_numeric(text) {
                let triplet = parse_triplet(text)?;
                self.cursor = self.line.len();
                return Ok(Some(triplet));
            }
            if !self.next_line()? {
                return Ok(None);
            }
        }
    }
}

fn is_numeric(text: &str) -> bool {
    let text = text.trim();
    !text.is_empty()
        && text.chars().all(|c| {
            c.is_ascii_digit() || matches!(c, '+' | '-' | '.' | 'e' | 'E') || DELIMITERS.contains(&c)
        })
}

fn parse_triplet(text: &str) -> Result<[f32; 3], EncodingError> {
    let mut tokens = text
        .trim()
        .split(DELIMITERS)
        .filter(|token| !token.is_empty());
    let mut triplet = [0f32; 3];
    for scalar in triplet.iter_mut() {
        let token = tokens
            .next()
            .ok_or_else(|| EncodingError::Malformed(format!("expected three numbers: `{}`", text.trim())))?;
        *scalar = token
            .parse()
            .map_err(|_| EncodingError::Malformed(format!("invalid number `{}`", token)))?;
    }
    Ok(triplet)
}

#[cfg(test)]
mod tests {
    use nalgebra::Point3;

    use crate::encoding::stl::ascii::{self, is_numeric};
    use crate::encoding::{self, EncodingError};

    const TRIANGLES: &str = "solid demo \n\
        facet normal 0 0 -1\n\
          outer loop\n\
            vertex 0 0 0\n\
            vertex 1 0 0\n\
            vertex 0 1 0\n\
          endloop\n\
        endfacet\n\
        facet normal 0.0e0,0.0;1.0\n\
          outer loop\n\
            vertex\n\
              -1.5 2.25 +3\n\
            vertex 1e1\t0 0\n\
            vertex 0;1;0\n\
          endloop\n\
        endfacet\n\
        endsolid demo\n";

    #[test]
    fn numeric_lines() {
        assert!(is_numeric(" 1.0 -2e3\t+4,5;6\r\n"));
        assert!(!is_numeric("   \n"));
        assert!(!is_numeric("vertex 1 2 3"));
        assert!(!is_numeric("outer loop"));
    }

    #[test]
    fn decode_triangles() {
        let mesh = encoding::decode(TRIANGLES.as_bytes()).unwrap();
        assert_eq!("demo", mesh.comment);
        assert_eq!(2, mesh.face_count());
        assert_eq!(6, mesh.vertex_count());
        assert_eq!(&[3, 4, 5], mesh.as_face_slice()[1].as_slice());
        assert_eq!(
            &[
                Point3::new(-1.5, 2.25, 3.0),
                Point3::new(10.0, 0.0, 0.0),
                Point3::new(0.0, 1.0, 0.0),
            ],
            &mesh.as_vertex_slice()[3..],
        );
        assert!(mesh.message.is_none());
    }

    #[test]
    fn discard_partial_facet() {
        let text = "facet normal 0 0 1\nouter loop\nvertex 0 0 0\nvertex 1 0 0\n";
        let mesh = ascii::decode("partial".to_owned(), text.as_bytes()).unwrap();
        assert_eq!(0, mesh.face_count());
        assert_eq!(0, mesh.vertex_count());
    }

    #[test]
    fn reject_short_coordinates() {
        let text = "facet normal 0 0 1\nouter loop\nvertex 0 0\n";
        assert!(matches!(
            ascii::decode(String::new(), text.as_bytes()),
            Err(EncodingError::Malformed(_))
        ));
    }

    #[test]
    fn empty_solid() {
        let mesh = encoding::decode(&b"solid\nendsolid\n"[..]).unwrap();
        assert!(mesh.is_empty());
        assert!(mesh.comment.is_empty());
    }
}
