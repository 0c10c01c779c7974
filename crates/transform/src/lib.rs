//! Coordinate operation selection and grid-backed transformation.
//!
//! Given a precomputed ranked list of candidate operations between two
//! coordinate reference systems, this crate selects the concrete
//! operation to apply to each point (retrying with exclusions when a
//! grid declines the point), carries out the grid-backed datum shifts
//! themselves, and transforms axis-aligned rectangles across the
//! antimeridian and pole singularities.

pub mod bounds;
pub mod candidate;
pub mod dispatcher;
pub mod gridshift;
pub mod interp;
pub mod selector;

pub use bounds::transform_bounds;
pub use candidate::{
    prepare_candidates, AxisOrder, CandidateOperation, CoordOperation, ProposedOperation,
};
pub use dispatcher::{StridedMut, Transformer, TransformerBuilder};
pub use gridshift::{CatalogShift, HorizontalGridShift, VerticalGridShift};
