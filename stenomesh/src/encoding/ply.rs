//! [PLY](https://en.wikipedia.org/wiki/PLY_(file_format)) encoding.
//!
//! This module provides support for reading binary little-endian PLY via the
//! `FromPly` trait. ASCII and big-endian payloads are not supported.
//!
//! Headers are tokenized with the [`ply-rs`](https://crates.io/crates/ply-rs)
//! crate. Payloads are read by a `PlyReader`, which walks every element and
//! property declared by the header and packs requested properties into
//! `TypedBuffer`s. A `TypedBuffer` keeps the numeric kind of its source, so
//! values are cast into the target representation once, via
//! `TypedBuffer::cast`.
//!
//! # Examples
//!
//! Decoding a PLY stream into a `Mesh`:
//!
//! ```rust
//! use stenomesh::encoding;
//! use std::io::BufReader;
//!
//! # fn read() -> &'static [u8] { include_bytes!("../../../data/triangle.ply") }
//! let mesh = encoding::decode(BufReader::new(read())).unwrap();
//! assert_eq!(1, mesh.face_count());
//! ```

#![cfg(feature = "encoding-ply")]

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt};
use nalgebra::Point3;
use num::cast;
use ply_rs::parser::Parser;
use ply_rs::ply::{DefaultElement, Encoding, ScalarType};
use std::cmp;
use std::io::{BufRead, Read};
use tracing::debug;

use crate::encoding::{EncodingError, PREALLOCATION_LIMIT};
use crate::mesh::Mesh;

pub use ply_rs::ply::{
    ElementDef as ElementDefinition, Header, PropertyDef as PropertyDefinition, PropertyType,
};

const VERTEX_ELEMENT: &str = "vertex";
const VERTEX_PROPERTIES: [&str; 3] = ["x", "y", "z"];
const FACE_PROPERTIES: [&str; 2] = ["vertex_index", "vertex_indices"];

/// Numeric kind of a source property.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NumericKind {
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Float32,
    Float64,
}

impl NumericKind {
    /// Width of a single value in bytes.
    pub fn width(self) -> usize {
        match self {
            NumericKind::Int8 | NumericKind::UInt8 => 1,
            NumericKind::Int16 | NumericKind::UInt16 => 2,
            NumericKind::Int32 | NumericKind::UInt32 | NumericKind::Float32 => 4,
            NumericKind::Float64 => 8,
        }
    }

    pub fn is_integer(self) -> bool {
        !matches!(self, NumericKind::Float32 | NumericKind::Float64)
    }
}

impl From<ScalarType> for NumericKind {
    fn from(scalar: ScalarType) -> Self {
        match scalar {
            ScalarType::Char => NumericKind::Int8,
            ScalarType::UChar => NumericKind::UInt8,
            ScalarType::Short => NumericKind::Int16,
            ScalarType::UShort => NumericKind::UInt16,
            ScalarType::Int => NumericKind::Int32,
            ScalarType::UInt => NumericKind::UInt32,
            ScalarType::Float => NumericKind::Float32,
            ScalarType::Double => NumericKind::Float64,
        }
    }
}

/// Tightly packed, row-major values of a single numeric kind.
///
/// Holds `count` elements of one or more values each; `bytes` has length
/// `count * values_per_element * kind.width()`.
#[derive(Clone, Debug, PartialEq)]
pub struct TypedBuffer {
    pub kind: NumericKind,
    pub count: usize,
    pub bytes: Vec<u8>,
}

impl TypedBuffer {
    /// Casts every value in the buffer into `T`.
    ///
    /// # Errors
    ///
    /// Returns an error if any value cannot be represented by `T`, such as a
    /// negative integer cast into an unsigned type.
    pub fn cast<T>(&self) -> Result<Vec<T>, EncodingError>
    where
        T: num::NumCast,
    {
        let values = self.bytes.chunks_exact(self.kind.width());
        match self.kind {
            NumericKind::Int8 => num_cast_values(values, |bytes| bytes[0] as i8),
            NumericKind::UInt8 => num_cast_values(values, |bytes| bytes[0]),
            NumericKind::Int16 => num_cast_values(values, LittleEndian::read_i16),
            NumericKind::UInt16 => num_cast_values(values, LittleEndian::read_u16),
            NumericKind::Int32 => num_cast_values(values, LittleEndian::read_i32),
            NumericKind::UInt32 => num_cast_values(values, LittleEndian::read_u32),
            NumericKind::Float32 => num_cast_values(values, LittleEndian::read_f32),
            NumericKind::Float64 => num_cast_values(values, LittleEndian::read_f64),
        }
    }
}

/// Properties to extract from an element.
#[derive(Clone, Debug)]
pub struct Request {
    pub element: String,
    pub properties: Vec<String>,
    /// Expected length of list properties.
    pub list_size: Option<usize>,
}

impl Request {
    pub fn new<I, S>(element: &str, properties: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Request {
            element: element.to_owned(),
            properties: properties.into_iter().map(Into::into).collect(),
            list_size: None,
        }
    }

    pub fn with_list_size(mut self, list_size: usize) -> Self {
        self.list_size = Some(list_size);
        self
    }
}

// Resolved request: the numeric kind shared by its properties and the slot of
// each property of its element (`None` if the property is skipped).
struct Plan {
    kind: NumericKind,
    count: usize,
    slots: Vec<Option<usize>>,
}

/// Reader for binary little-endian PLY payloads.
pub struct PlyReader {
    header: Header,
}

impl PlyReader {
    /// Tokenizes a header.
    ///
    /// # Errors
    ///
    /// Returns an error if the header is malformed or if its format is not
    /// binary little-endian.
    pub fn from_header<H>(mut header: H) -> Result<Self, EncodingError>
    where
        H: BufRead,
    {
        let header = Parser::<DefaultElement>::new()
            .read_header(&mut header)
            .map_err(|error| EncodingError::Malformed(error.to_string()))?;
        match header.encoding {
            Encoding::BinaryLittleEndian => Ok(PlyReader { header }),
            Encoding::BinaryBigEndian => Err(EncodingError::Unsupported(
                "big-endian PLY".to_owned(),
            )),
            Encoding::Ascii => Err(EncodingError::Unsupported("ASCII PLY".to_owned())),
        }
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Joins the comments of the header with newlines.
    pub fn comment(&self) -> String {
        self.header.comments.join("\n")
    }

    pub fn element(&self, name: &str) -> Option<&ElementDefinition> {
        self.header.elements.get(name)
    }

    /// Finds the first element and list property that carry face indices.
    pub fn face_property(&self) -> Option<(&ElementDefinition, &PropertyDefinition)> {
        self.header.elements.values().find_map(|element| {
            FACE_PROPERTIES
                .iter()
                .find_map(|name| element.properties.get(*name))
                .map(|property| (element, property))
        })
    }

    /// Reads the payload and extracts the requested properties.
    ///
    /// Elements are read in header order until every requested element has
    /// been read. Buffers are returned in the order of `requests`.
    ///
    /// # Errors
    ///
    /// Returns an error if a requested element or property is missing, if
    /// the properties of a request have different numeric kinds, if a list
    /// length differs from the requested list size, or if the payload is
    /// truncated.
    pub fn read_buffers<R>(
        &self,
        mut data: R,
        requests: &[Request],
    ) -> Result<Vec<TypedBuffer>, EncodingError>
    where
        R: Read,
    {
        let plans = requests
            .iter()
            .map(|request| self.plan(request))
            .collect::<Result<Vec<_>, _>>()?;
        let mut buffers = requests
            .iter()
            .zip(plans.iter())
            .map(|(request, plan)| {
                let width = plan.kind.width()
                    * request.properties.len()
                    * request.list_size.unwrap_or(1);
                TypedBuffer {
                    kind: plan.kind,
                    count: plan.count,
                    bytes: Vec::with_capacity(cmp::min(
                        plan.count.saturating_mul(width),
                        PREALLOCATION_LIMIT,
                    )),
                }
            })
            .collect::<Vec<_>>();

        let mut pending = requests.len();
        let mut scratch = Vec::new();
        // Bytes of each requested property of the current row, per request.
        let mut rows = requests
            .iter()
            .map(|request| vec![Vec::new(); request.properties.len()])
            .collect::<Vec<_>>();
        for element in self.header.elements.values() {
            if pending == 0 {
                break;
            }
            let targets = requests
                .iter()
                .enumerate()
                .filter(|(_, request)| request.element == element.name)
                .map(|(index, _)| index)
                .collect::<Vec<_>>();
            for _ in 0..element.count {
                self.read_row(&mut data, element, &mut scratch, |position, bytes| {
                    for &target in &targets {
                        if let Some(slot) = plans[target].slots[position] {
                            if let Some(list_size) = requests[target].list_size {
                                if bytes.len() != list_size * plans[target].kind.width() {
                                    return Err(EncodingError::Malformed(format!(
                                        "list `{}` does not have {} items",
                                        requests[target].properties[slot], list_size,
                                    )));
                                }
                            }
                            let row = &mut rows[target][slot];
                            row.clear();
                            row.extend_from_slice(bytes);
                        }
                    }
                    Ok(())
                })?;
                for &target in &targets {
                    for row in &rows[target] {
                        buffers[target].bytes.extend_from_slice(row);
                    }
                }
            }
            pending -= targets.len();
        }
        Ok(buffers)
    }

    fn plan(&self, request: &Request) -> Result<Plan, EncodingError> {
        let element = self
            .header
            .elements
            .get(&request.element)
            .ok_or_else(|| EncodingError::Malformed(format!("no element `{}`", request.element)))?;
        let mut kind = None;
        let mut slots = vec![None; element.properties.len()];
        for (slot, name) in request.properties.iter().enumerate() {
            let (position, property) = element
                .properties
                .values()
                .enumerate()
                .find(|(_, property)| property.name == *name)
                .ok_or_else(|| {
                    EncodingError::Malformed(format!(
                        "no property `{}` in element `{}`",
                        name, element.name
                    ))
                })?;
            let scalar = match (&property.data_type, request.list_size) {
                (PropertyType::Scalar(scalar), None) => scalar,
                (PropertyType::List(_, scalar), Some(_)) => scalar,
                _ => {
                    return Err(EncodingError::Malformed(format!(
                        "property `{}` has an unexpected type",
                        name
                    )))
                }
            };
            let scalar = NumericKind::from(scalar.clone());
            if *kind.get_or_insert(scalar) != scalar {
                return Err(EncodingError::Unsupported(format!(
                    "mixed numeric kinds in element `{}`",
                    element.name
                )));
            }
            slots[position] = Some(slot);
        }
        let kind = kind.ok_or_else(|| EncodingError::Malformed("empty request".to_owned()))?;
        Ok(Plan {
            kind,
            count: element.count,
            slots,
        })
    }

    // Reads one row of an element, passing the raw bytes of each property to
    // `f`. The bytes of a list exclude its length.
    fn read_row<R, F>(
        &self,
        data: &mut R,
        element: &ElementDefinition,
        scratch: &mut Vec<u8>,
        mut f: F,
    ) -> Result<(), EncodingError>
    where
        R: Read,
        F: FnMut(usize, &[u8]) -> Result<(), EncodingError>,
    {
        for (position, property) in element.properties.values().enumerate() {
            let length = match &property.data_type {
                PropertyType::Scalar(scalar) => NumericKind::from(scalar.clone()).width(),
                PropertyType::List(count, scalar) => {
                    let count = read_list_count(data, NumericKind::from(count.clone()))?;
                    count * NumericKind::from(scalar.clone()).width()
                }
            };
            scratch.resize(length, 0);
            data.read_exact(scratch)?;
            f(position, scratch)?;
        }
        Ok(())
    }
}

pub trait FromPly: Sized {
    /// Decodes a header and the binary payload that follows it.
    fn from_ply<H, R>(header: H, data: R, arity: usize) -> Result<Self, EncodingError>
    where
        H: BufRead,
        R: Read;
}

impl FromPly for Mesh {
    fn from_ply<H, R>(header: H, data: R, arity: usize) -> Result<Self, EncodingError>
    where
        H: BufRead,
        R: Read,
    {
        let mut mesh = Mesh::with_arity(arity)?;
        let reader = PlyReader::from_header(header)?;
        mesh.comment = reader.comment();

        let vertices = reader
            .element(VERTEX_ELEMENT)
            .filter(|element| {
                VERTEX_PROPERTIES
                    .iter()
                    .all(|name| element.properties.contains_key(*name))
            })
            .map(|_| Request::new(VERTEX_ELEMENT, VERTEX_PROPERTIES))
            .ok_or(EncodingError::ElementNotFound("vertices"))?;
        let faces = reader
            .face_property()
            .filter(|(_, property)| matches!(property.data_type, PropertyType::List(..)))
            .map(|(element, property)| {
                Request::new(&element.name, [property.name.as_str()]).with_list_size(arity)
            })
            .ok_or(EncodingError::ElementNotFound("faces"))?;

        let buffers = reader.read_buffers(data, &[vertices, faces])?;
        let (vertices, faces) = (&buffers[0], &buffers[1]);
        if !faces.kind.is_integer() {
            return Err(EncodingError::Unsupported(format!(
                "face indices of kind {:?}",
                faces.kind
            )));
        }
        debug!(
            vertex_kind = ?vertices.kind,
            face_kind = ?faces.kind,
            vertices = vertices.count,
            faces = faces.count,
            "read PLY buffers"
        );

        let positions = vertices.cast::<f32>()?;
        let indices = faces.cast::<u32>()?;
        mesh.reserve(vertices.count, faces.count);
        for position in positions.chunks_exact(3) {
            mesh.push_vertex(Point3::new(position[0], position[1], position[2]))?;
        }
        for face in indices.chunks_exact(arity) {
            mesh.push_face(face)?;
        }
        Ok(mesh)
    }
}

fn read_list_count<R>(data: &mut R, kind: NumericKind) -> Result<usize, EncodingError>
where
    R: Read,
{
    let count = match kind {
        NumericKind::Int8 => i64::from(data.read_i8()?),
        NumericKind::UInt8 => i64::from(data.read_u8()?),
        NumericKind::Int16 => i64::from(data.read_i16::<LittleEndian>()?),
        NumericKind::UInt16 => i64::from(data.read_u16::<LittleEndian>()?),
        NumericKind::Int32 => i64::from(data.read_i32::<LittleEndian>()?),
        NumericKind::UInt32 => i64::from(data.read_u32::<LittleEndian>()?),
        NumericKind::Float32 | NumericKind::Float64 => {
            return Err(EncodingError::Malformed(
                "list length must be an integer".to_owned(),
            ));
        }
    };
    usize::try_from(count)
        .map_err(|_| EncodingError::Malformed(format!("negative list length {}", count)))
}

fn num_cast_values<'a, I, T, U, F>(values: I, f: F) -> Result<Vec<U>, EncodingError>
where
    I: Iterator<Item = &'a [u8]>,
    T: num::NumCast,
    U: num::NumCast,
    F: Fn(&[u8]) -> T,
{
    values
        .map(|bytes| cast::cast(f(bytes)).ok_or(EncodingError::NumericCast))
        .collect::<Result<_, _>>()
}
