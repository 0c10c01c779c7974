//! Per-point transform dispatch: candidate selection, retry with
//! exclusion, the grid-free fallback, and the batch entry points.

use std::sync::Arc;

use geo_common::{Coord, Direction, ShiftError, ShiftResult};
use grid_store::GridRegistry;

use crate::candidate::{prepare_candidates, CandidateOperation, CoordOperation, ProposedOperation};
use crate::selector::select;

/// Retries after the first attempt; also the size of the per-call
/// exclusion set.
const MAX_RETRIES: usize = 2;

/// Exclusion set for the lifetime of one `transform` call.
struct RetryState {
    excluded: [usize; MAX_RETRIES],
    len: usize,
}

impl RetryState {
    fn new() -> Self {
        Self {
            excluded: [usize::MAX; MAX_RETRIES],
            len: 0,
        }
    }

    fn as_slice(&self) -> &[usize] {
        &self.excluded[..self.len]
    }

    fn exclude(&mut self, index: usize) {
        if self.len < MAX_RETRIES {
            self.excluded[self.len] = index;
            self.len += 1;
        }
    }
}

#[derive(Clone)]
enum Operations {
    /// A single fixed operation; selection never runs.
    Single(Arc<dyn CoordOperation>),
    /// A ranked candidate list selected from per point.
    Candidates(Vec<CandidateOperation>),
}

/// A transformation context between a fixed source and target CRS.
///
/// Built from either a single fixed operation or a ranked proposal list
/// from the catalog layer. One instance must not be driven from several
/// threads at once; clone it instead, which shares the underlying
/// operations but gives each thread its own last-used-operation cache.
#[derive(Clone)]
pub struct Transformer {
    registry: Arc<GridRegistry>,
    ops: Operations,
    report_missing_grids: bool,
    skip_noninstantiable: bool,
    last_used: Option<usize>,
}

/// Builder for [`Transformer`].
pub struct TransformerBuilder {
    registry: Arc<GridRegistry>,
    single: Option<Arc<dyn CoordOperation>>,
    proposals: Vec<ProposedOperation>,
    report_missing_grids: bool,
    skip_noninstantiable: bool,
}

impl TransformerBuilder {
    pub fn new() -> Self {
        Self::with_registry(GridRegistry::global())
    }

    /// Use a private registry instead of the process-wide one.
    pub fn with_registry(registry: Arc<GridRegistry>) -> Self {
        Self {
            registry,
            single: None,
            proposals: Vec::new(),
            report_missing_grids: false,
            skip_noninstantiable: false,
        }
    }

    /// A single fixed operation; ignored when proposals are given.
    pub fn operation(mut self, op: Arc<dyn CoordOperation>) -> Self {
        self.single = Some(op);
        self
    }

    /// The ranked proposal list from the catalog layer.
    pub fn proposals(mut self, proposals: Vec<ProposedOperation>) -> Self {
        self.proposals = proposals;
        self
    }

    /// Log a diagnostic naming every locally missing grid of a failed
    /// candidate.
    pub fn report_missing_grids(mut self, yes: bool) -> Self {
        self.report_missing_grids = yes;
        self
    }

    /// Skip candidates whose operation cannot be instantiated (e.g. a
    /// mandatory grid does not resolve locally).
    pub fn skip_noninstantiable(mut self, yes: bool) -> Self {
        self.skip_noninstantiable = yes;
        self
    }

    pub fn build(self) -> ShiftResult<Transformer> {
        let ops = if !self.proposals.is_empty() {
            Operations::Candidates(prepare_candidates(self.proposals))
        } else if let Some(op) = self.single {
            Operations::Single(op)
        } else {
            return Err(ShiftError::InvalidParameter {
                param: "operations".to_string(),
                message: "a transformer needs an operation or a proposal list".to_string(),
            });
        };
        Ok(Transformer {
            registry: self.registry,
            ops,
            report_missing_grids: self.report_missing_grids,
            skip_noninstantiable: self.skip_noninstantiable,
            last_used: None,
        })
    }
}

impl Default for TransformerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl Transformer {
    /// Transform a single coordinate.
    ///
    /// A coordinate that already contains a NaN component yields an
    /// all-NaN coordinate without invoking any operation. With a
    /// candidate list, the best unexcluded candidate is selected per
    /// point and applied; a candidate that declines the point (sentinel
    /// result) is excluded and selection retried, up to three attempts.
    /// Network errors from a remote-resource-backed candidate propagate
    /// immediately since retrying cannot help. When the retries
    /// exhaust, the first candidate in original order that needs no
    /// grids is applied regardless of spatial match.
    pub fn transform(&mut self, direction: Direction, coord: Coord) -> ShiftResult<Coord> {
        if coord.has_nan() {
            return Ok(Coord::nan());
        }
        match &self.ops {
            Operations::Single(op) => {
                let out = op.apply(direction, coord)?;
                if out.is_error() {
                    return Err(out_of_domain(coord));
                }
                self.last_used = Some(0);
                Ok(out)
            }
            Operations::Candidates(candidates) => {
                let mut retry = RetryState::new();
                for attempt in 0..=MAX_RETRIES {
                    let Some(best) = select(
                        candidates,
                        retry.as_slice(),
                        self.skip_noninstantiable,
                        direction,
                        coord,
                    ) else {
                        break;
                    };
                    let alt = &candidates[best];
                    if self.last_used != Some(best) {
                        tracing::debug!(operation = %alt.name, "using coordinate operation");
                        self.last_used = Some(best);
                    }

                    match alt.apply(direction, coord) {
                        Err(err @ ShiftError::Network(_)) => return Err(err),
                        Ok(out) if !out.is_error() => return Ok(out),
                        Err(err) => {
                            tracing::debug!(operation = %alt.name, %err, "coordinate operation failed");
                        }
                        Ok(_) => {}
                    }
                    if self.report_missing_grids {
                        report_missing_grids(&self.registry, alt);
                    }
                    if attempt == MAX_RETRIES {
                        break;
                    }
                    tracing::debug!(
                        operation = %alt.name,
                        "did not result in valid result, retrying with another operation"
                    );
                    retry.exclude(best);
                }

                // No candidate whose area of use matches produced a
                // result: scan the full list in original order and use
                // the first operation that does not require grids.
                for (i, alt) in candidates.iter().enumerate() {
                    if !alt.required_grids().is_empty() {
                        continue;
                    }
                    if self.last_used != Some(i) {
                        tracing::debug!(
                            operation = %alt.name,
                            "using operation as a fallback due to lack of more appropriate operations"
                        );
                        self.last_used = Some(i);
                    }
                    let out = alt.apply(direction, coord)?;
                    if out.is_error() {
                        return Err(out_of_domain(coord));
                    }
                    return Ok(out);
                }

                Err(ShiftError::NoOperation)
            }
        }
    }

    /// The operation applied by the most recent `transform` call on
    /// this instance, if any.
    pub fn last_used_operation(&self) -> Option<&Arc<dyn CoordOperation>> {
        match &self.ops {
            Operations::Single(op) => self.last_used.map(|_| op),
            Operations::Candidates(candidates) => {
                self.last_used.map(|i| candidates[i].op())
            }
        }
    }

    /// Batch transform an array of coordinates in place.
    ///
    /// Every element is processed even when earlier elements fail;
    /// failed elements are overwritten with the sentinel coordinate.
    /// Returns `Ok` when every element succeeded, the shared error when
    /// all failures have the same cause, and the generic mixed-failure
    /// error otherwise ([`ShiftError::code`] gives the aggregate code).
    pub fn transform_array(
        &mut self,
        direction: Direction,
        coords: &mut [Coord],
    ) -> ShiftResult<()> {
        let mut aggregate = BatchErrors::default();
        for coord in coords.iter_mut() {
            match self.transform(direction, *coord) {
                Ok(out) => *coord = out,
                Err(err) => {
                    *coord = Coord::error();
                    aggregate.record(err);
                }
            }
        }
        aggregate.finish()
    }

    /// Batch transform over strided component arrays, in place.
    ///
    /// Each of the four components is its own array with an independent
    /// element stride. An empty component is read as the constant zero;
    /// a length-1 component is a constant broadcast along the longer
    /// arrays and is overwritten with its final transformed value. The
    /// number of tuples processed is the length of the shortest
    /// non-constant component. Failure aggregation matches
    /// [`Self::transform_array`]; every tuple is processed either way.
    ///
    /// Returns the number of tuples processed.
    pub fn transform_generic(
        &mut self,
        direction: Direction,
        mut x: StridedMut<'_>,
        mut y: StridedMut<'_>,
        mut z: StridedMut<'_>,
        mut t: StridedMut<'_>,
    ) -> ShiftResult<usize> {
        let counts = [x.len(), y.len(), z.len(), t.len()];
        if counts.iter().all(|&n| n == 0) {
            return Ok(0);
        }
        let n = counts.iter().copied().filter(|&n| n > 1).min().unwrap_or(1);

        let mut coord = Coord::new(0.0, 0.0, 0.0, 0.0);
        let mut aggregate = BatchErrors::default();
        for i in 0..n {
            coord = Coord::new(x.read(i), y.read(i), z.read(i), t.read(i));
            coord = match self.transform(direction, coord) {
                Ok(out) => out,
                Err(err) => {
                    aggregate.record(err);
                    Coord::error()
                }
            };
            x.write(i, coord.x);
            y.write(i, coord.y);
            z.write(i, coord.z);
            t.write(i, coord.t);
        }

        // Constants receive their final transformed value.
        x.write_constant(coord.x);
        y.write_constant(coord.y);
        z.write_constant(coord.z);
        t.write_constant(coord.t);

        aggregate.finish()?;
        Ok(n)
    }
}

fn out_of_domain(coord: Coord) -> ShiftError {
    ShiftError::OutOfDomain(format!("({}, {})", coord.x, coord.y))
}

/// Name every grid the failed candidate needs that is not available
/// locally.
fn report_missing_grids(registry: &GridRegistry, alt: &CandidateOperation) {
    for grid in alt.required_grids() {
        if !registry.grid_is_available(&grid) {
            tracing::error!(
                operation = %alt.name,
                grid = %grid,
                "attempt to use coordinate operation failed: grid is not available; \
                 consult the resource file index of your grid distribution for where to obtain it"
            );
        }
    }
}

/// Aggregate failure tracking for the batch entry points: the specific
/// error when every failure shares a cause, else the generic one.
#[derive(Default)]
struct BatchErrors {
    first: Option<ShiftError>,
    mixed: bool,
}

impl BatchErrors {
    fn record(&mut self, err: ShiftError) {
        match &self.first {
            None => self.first = Some(err),
            Some(first) if !self.mixed && first.code() != err.code() => self.mixed = true,
            _ => {}
        }
    }

    fn finish(self) -> ShiftResult<()> {
        if self.mixed {
            return Err(ShiftError::MixedTransformFailure);
        }
        match self.first {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// A mutable strided view over one coordinate component.
///
/// `stride` is in elements: `data[0], data[stride], ...`. A view over
/// an empty slice stands for an absent component.
pub struct StridedMut<'a> {
    data: &'a mut [f64],
    stride: usize,
}

impl<'a> StridedMut<'a> {
    pub fn new(data: &'a mut [f64], stride: usize) -> Self {
        Self {
            data,
            stride: stride.max(1),
        }
    }

    /// A contiguous view (stride 1).
    pub fn from_slice(data: &'a mut [f64]) -> Self {
        Self::new(data, 1)
    }

    /// An absent component; read as the constant zero, never written.
    pub fn none() -> StridedMut<'static> {
        StridedMut {
            data: &mut [],
            stride: 1,
        }
    }

    /// Number of logical elements.
    fn len(&self) -> usize {
        if self.data.is_empty() {
            0
        } else {
            (self.data.len() - 1) / self.stride + 1
        }
    }

    /// Value for tuple `i`: the element for full-length components, the
    /// constant for length-1 components, zero when absent.
    fn read(&self, i: usize) -> f64 {
        match self.len() {
            0 => 0.0,
            1 => self.data[0],
            _ => self.data[i * self.stride],
        }
    }

    /// Write back tuple `i` (full-length components only).
    fn write(&mut self, i: usize, value: f64) {
        if self.len() > 1 {
            self.data[i * self.stride] = value;
        }
    }

    /// Write the final value into a length-1 constant.
    fn write_constant(&mut self, value: f64) {
        if self.len() == 1 {
            self.data[0] = value;
        }
    }
}
