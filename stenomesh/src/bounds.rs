//! Axis-aligned bounds and extent validation.

use nalgebra::Vector3;
use std::fmt::{self, Display, Formatter};
use thiserror::Error;

use crate::mesh::{Mesh, Position};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }
}

impl Display for Axis {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            Axis::X => "x",
            Axis::Y => "y",
            Axis::Z => "z",
        };
        formatter.write_str(name)
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("mesh has no vertices")]
    Empty,
    #[error("extent along {axis} is {extent}, which is less than the minimum {minimum}")]
    ExtentBelowMinimum {
        axis: Axis,
        extent: f32,
        minimum: f32,
    },
}

/// Component-wise minimum and maximum of a set of positions.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub min: Position,
    pub max: Position,
}

impl BoundingBox {
    /// Computes the bounds of positions.
    ///
    /// Returns `None` if there are no positions.
    pub fn from_positions<'a, I>(positions: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a Position>,
    {
        let mut positions = positions.into_iter();
        let first = *positions.next()?;
        Some(positions.fold(
            BoundingBox {
                min: first,
                max: first,
            },
            |bounds, position| BoundingBox {
                min: bounds.min.inf(position),
                max: bounds.max.sup(position),
            },
        ))
    }

    /// Gets the length of the edges of the box along each axis.
    pub fn extent(&self) -> Vector3<f32> {
        self.max - self.min
    }

    /// Gets the length of the shortest edge of the box.
    pub fn min_edge(&self) -> f32 {
        self.extent().min()
    }

    /// Converts a percentage of the shortest edge into a merge tolerance.
    pub fn relative_tolerance(&self, percentage: f64) -> f64 {
        percentage / 100.0 * f64::from(self.min_edge())
    }

    /// Fails if the extent along any axis is strictly less than the minimum
    /// for that axis. A minimum of zero disables the check for its axis.
    pub fn validate(&self, minimum: &Vector3<f32>) -> Result<(), ValidationError> {
        let extent = self.extent();
        for axis in Axis::ALL {
            let (extent, minimum) = (extent[axis.index()], minimum[axis.index()]);
            if minimum > 0.0 && extent < minimum {
                return Err(ValidationError::ExtentBelowMinimum {
                    axis,
                    extent,
                    minimum,
                });
            }
        }
        Ok(())
    }
}

impl Mesh {
    /// Computes the bounds of the vertices of the mesh.
    ///
    /// The bounds of an empty mesh are undefined, so `None` is returned
    /// rather than a degenerate box at the origin.
    pub fn bounding_box(&self) -> Option<BoundingBox> {
        BoundingBox::from_positions(self.as_vertex_slice())
    }

    /// Validates the extent of the mesh against a per-axis minimum.
    ///
    /// A minimum of all zeros always passes, even for an empty mesh.
    ///
    /// # Errors
    ///
    /// Returns an error if the mesh is empty or if its extent along any
    /// checked axis is less than the minimum.
    pub fn validate_extent(&self, minimum: &Vector3<f32>) -> Result<(), ValidationError> {
        if minimum.iter().all(|&minimum| minimum <= 0.0) {
            return Ok(());
        }
        self.bounding_box()
            .ok_or(ValidationError::Empty)?
            .validate(minimum)
    }
}
