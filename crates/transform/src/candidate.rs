//! Candidate coordinate operations and their preparation.

use std::sync::{Arc, OnceLock};

use geo_common::{BoundingBox, Coord, Direction, ShiftResult};

/// The evaluate capability of one fully-parameterized operation.
///
/// Implementations return the failure-sentinel coordinate for points
/// they cannot transform (outside grid coverage, no convergence);
/// `Err` is reserved for conditions that must not be absorbed by the
/// retry loop, such as network failures while fetching a remote grid.
pub trait CoordOperation: Send + Sync {
    fn forward(&self, coord: Coord) -> ShiftResult<Coord>;
    fn inverse(&self, coord: Coord) -> ShiftResult<Coord>;

    fn apply(&self, direction: Direction, coord: Coord) -> ShiftResult<Coord> {
        match direction {
            Direction::Forward => self.forward(coord),
            Direction::Inverse => self.inverse(coord),
        }
    }

    /// Names of the grids this operation needs. Used by the fallback
    /// scan and by missing-grid diagnostics.
    fn required_grids(&self) -> Vec<String> {
        Vec::new()
    }

    /// Whether the operation can actually be instantiated (e.g. all of
    /// its mandatory grids resolve locally).
    fn is_instantiable(&self) -> bool {
        true
    }
}

/// Axis order and unit of one side of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisOrder {
    /// Geographic, (longitude, latitude) in degrees.
    LonLatDegree,
    /// Geographic, (latitude, longitude) in degrees.
    LatLonDegree,
    /// Anything else: projected, geocentric...
    Other,
}

/// One proposal from the catalog layer's ranked operation list.
pub struct ProposedOperation {
    pub op: Arc<dyn CoordOperation>,
    pub name: String,
    /// Area-of-use name; None or "unknown" counts as unknown.
    pub area_name: Option<String>,
    /// Accuracy in metres; None is unknown.
    pub accuracy: Option<f64>,
    /// Area of use in lon/lat degrees. None means worldwide. West may
    /// exceed east for areas crossing the antimeridian.
    pub area_of_use: Option<BoundingBox>,
    /// Explicit side bboxes in each side's own axis order and unit;
    /// when absent, the area of use stands in.
    pub src_bbox: Option<BoundingBox>,
    pub dst_bbox: Option<BoundingBox>,
    pub src_axis: AxisOrder,
    pub dst_axis: AxisOrder,
    /// For sides that are not natively geographic: maps a native
    /// coordinate to lon/lat degrees for the spatial test.
    pub src_to_lon_lat: Option<Arc<dyn CoordOperation>>,
    pub dst_to_lon_lat: Option<Arc<dyn CoordOperation>>,
}

/// Operations whose selection must not be displaced by a smaller-area
/// challenger of equal accuracy.
const PRIORITY_OPERATION_NAMES: &[&str] = &[
    "NAD83 to NAD83(HARN) (47)",
    "NAD83 to NAD83(HARN) (48)",
    "NAD83 to NAD83(HARN) (49)",
    "NAD83 to NAD83(HARN) (50)",
    "GDA94 to WGS 84 (1)",
    "GDA2020 to WGS 84 (2)",
];

fn is_priority_operation(name: &str) -> bool {
    PRIORITY_OPERATION_NAMES.iter().any(|p| name.contains(p))
}

/// One prepared candidate. Immutable once constructed; instantiability
/// is computed lazily and cached.
#[derive(Clone)]
pub struct CandidateOperation {
    /// Index in the original ranked list. Candidates split across the
    /// antimeridian share an index.
    pub index: usize,
    pub name: String,
    pub area_name: String,
    pub src_bbox: BoundingBox,
    pub dst_bbox: BoundingBox,
    /// Accuracy in metres; None is unknown.
    pub accuracy: Option<f64>,
    /// Footprint ranking key: solid angle of the area of use.
    pub pseudo_area: f64,
    pub is_offshore: bool,
    pub is_unknown_area_name: bool,
    pub is_priority_op: bool,
    pub src_is_lon_lat_degree: bool,
    pub src_is_lat_lon_degree: bool,
    pub dst_is_lon_lat_degree: bool,
    pub dst_is_lat_lon_degree: bool,
    pub src_to_lon_lat: Option<Arc<dyn CoordOperation>>,
    pub dst_to_lon_lat: Option<Arc<dyn CoordOperation>>,
    op: Arc<dyn CoordOperation>,
    instantiable: OnceLock<bool>,
}

impl CandidateOperation {
    pub fn op(&self) -> &Arc<dyn CoordOperation> {
        &self.op
    }

    pub fn apply(&self, direction: Direction, coord: Coord) -> ShiftResult<Coord> {
        self.op.apply(direction, coord)
    }

    pub fn required_grids(&self) -> Vec<String> {
        self.op.required_grids()
    }

    /// Lazily computed, cached once per candidate.
    pub fn is_instantiable(&self) -> bool {
        *self.instantiable.get_or_init(|| self.op.is_instantiable())
    }
}

impl std::fmt::Debug for CandidateOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CandidateOperation")
            .field("index", &self.index)
            .field("name", &self.name)
            .field("accuracy", &self.accuracy)
            .field("pseudo_area", &self.pseudo_area)
            .finish()
    }
}

/// Solid angle of a lon/lat degree rectangle: integrate cos(lat)
/// between the south and north edges.
fn pseudo_area_of(bbox: &BoundingBox) -> f64 {
    use geo_common::angle::DEG_TO_RAD;
    let w = bbox.min_x * DEG_TO_RAD;
    let s = bbox.min_y * DEG_TO_RAD;
    let mut e = bbox.max_x * DEG_TO_RAD;
    let n = bbox.max_y * DEG_TO_RAD;
    if w > e {
        e += 2.0 * std::f64::consts::PI;
    }
    (e - w) * (n.sin() - s.sin())
}

fn side_bbox(explicit: &Option<BoundingBox>, area: &BoundingBox, axis: AxisOrder) -> BoundingBox {
    if let Some(bbox) = explicit {
        return *bbox;
    }
    match axis {
        AxisOrder::LatLonDegree => BoundingBox::new(area.min_y, area.min_x, area.max_y, area.max_x),
        _ => *area,
    }
}

/// Prepare the candidate list from the catalog layer's proposals.
///
/// Areas of use crossing the antimeridian (west > east) are split into
/// two candidates sharing the original index, so that the per-point
/// containment tests stay simple interval checks.
pub fn prepare_candidates(proposals: Vec<ProposedOperation>) -> Vec<CandidateOperation> {
    let mut candidates = Vec::with_capacity(proposals.len());
    for (index, proposal) in proposals.into_iter().enumerate() {
        let area = proposal.area_of_use.unwrap_or_else(BoundingBox::whole_world);
        let pieces: Vec<BoundingBox> = if area.min_x <= area.max_x {
            vec![area]
        } else {
            vec![
                BoundingBox::new(area.min_x, area.min_y, 180.0, area.max_y),
                BoundingBox::new(-180.0, area.min_y, area.max_x, area.max_y),
            ]
        };

        let area_name = proposal.area_name.clone().unwrap_or_default();
        for piece in pieces {
            candidates.push(CandidateOperation {
                index,
                name: proposal.name.clone(),
                area_name: area_name.clone(),
                src_bbox: side_bbox(&proposal.src_bbox, &piece, proposal.src_axis),
                dst_bbox: side_bbox(&proposal.dst_bbox, &piece, proposal.dst_axis),
                accuracy: proposal.accuracy,
                pseudo_area: pseudo_area_of(&piece),
                is_offshore: area_name.contains("- offshore"),
                is_unknown_area_name: area_name.is_empty() || area_name == "unknown",
                is_priority_op: is_priority_operation(&proposal.name),
                src_is_lon_lat_degree: proposal.src_axis == AxisOrder::LonLatDegree,
                src_is_lat_lon_degree: proposal.src_axis == AxisOrder::LatLonDegree,
                dst_is_lon_lat_degree: proposal.dst_axis == AxisOrder::LonLatDegree,
                dst_is_lat_lon_degree: proposal.dst_axis == AxisOrder::LatLonDegree,
                src_to_lon_lat: proposal.src_to_lon_lat.clone(),
                dst_to_lon_lat: proposal.dst_to_lon_lat.clone(),
                op: proposal.op.clone(),
                instantiable: OnceLock::new(),
            });
        }
    }
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Identity operation used across the candidate tests.
    pub(crate) struct Identity;

    impl CoordOperation for Identity {
        fn forward(&self, coord: Coord) -> ShiftResult<Coord> {
            Ok(coord)
        }
        fn inverse(&self, coord: Coord) -> ShiftResult<Coord> {
            Ok(coord)
        }
    }

    fn proposal(area: Option<BoundingBox>) -> ProposedOperation {
        ProposedOperation {
            op: Arc::new(Identity),
            name: "test op".to_string(),
            area_name: Some("Testland".to_string()),
            accuracy: Some(1.0),
            area_of_use: area,
            src_bbox: None,
            dst_bbox: None,
            src_axis: AxisOrder::LonLatDegree,
            dst_axis: AxisOrder::LonLatDegree,
            src_to_lon_lat: None,
            dst_to_lon_lat: None,
        }
    }

    #[test]
    fn test_antimeridian_area_is_split() {
        // Fiji-style area of use crossing +/-180.
        let candidates =
            prepare_candidates(vec![proposal(Some(BoundingBox::new(176.0, -20.0, -178.0, -15.0)))]);
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].index, candidates[1].index);
        assert_eq!(candidates[0].src_bbox.max_x, 180.0);
        assert_eq!(candidates[1].src_bbox.min_x, -180.0);
    }

    #[test]
    fn test_worldwide_default_and_pseudo_area() {
        let candidates = prepare_candidates(vec![
            proposal(None),
            proposal(Some(BoundingBox::new(0.0, 0.0, 10.0, 10.0))),
        ]);
        assert_eq!(candidates.len(), 2);
        assert!(candidates[0].src_bbox.is_whole_world());
        assert!(candidates[0].pseudo_area > candidates[1].pseudo_area);
    }

    #[test]
    fn test_offshore_and_priority_flags() {
        let mut p = proposal(Some(BoundingBox::new(0.0, 0.0, 10.0, 10.0)));
        p.area_name = Some("Tunisia - offshore".to_string());
        p.name = "GDA94 to WGS 84 (1)".to_string();
        let candidates = prepare_candidates(vec![p]);
        assert!(candidates[0].is_offshore);
        assert!(candidates[0].is_priority_op);
        assert!(!candidates[0].is_unknown_area_name);
    }

    #[test]
    fn test_lat_lon_side_swaps_area() {
        let mut p = proposal(Some(BoundingBox::new(0.0, 40.0, 10.0, 50.0)));
        p.src_axis = AxisOrder::LatLonDegree;
        let candidates = prepare_candidates(vec![p]);
        assert_eq!(candidates[0].src_bbox.min_x, 40.0);
        assert_eq!(candidates[0].src_bbox.min_y, 0.0);
    }
}
