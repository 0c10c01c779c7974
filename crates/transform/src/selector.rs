//! Per-point selection of the best candidate operation.

use geo_common::angle::normalize_longitude_degrees;
use geo_common::{Coord, Direction};

use crate::candidate::CandidateOperation;

/// Accuracy encoding used by the ranking comparisons: unknown sorts as
/// a negative value that no known accuracy improves on.
fn accuracy_value(candidate: &CandidateOperation) -> f64 {
    candidate.accuracy.unwrap_or(-1.0)
}

/// Spatial test of one candidate against the point, honoring the
/// relevant side's axis order and unit.
fn spatial_criterion_ok(alt: &CandidateOperation, direction: Direction, coord: Coord) -> bool {
    let (bbox, helper, is_lon_lat, is_lat_lon) = match direction {
        Direction::Forward => (
            &alt.src_bbox,
            &alt.src_to_lon_lat,
            alt.src_is_lon_lat_degree,
            alt.src_is_lat_lon_degree,
        ),
        Direction::Inverse => (
            &alt.dst_bbox,
            &alt.dst_to_lon_lat,
            alt.dst_is_lon_lat_degree,
            alt.dst_is_lat_lon_degree,
        ),
    };

    if let Some(helper) = helper {
        // Not natively geographic: the whole globe trivially matches,
        // anything else goes through the helper projection first.
        if bbox.is_whole_world() {
            return true;
        }
        return match helper.forward(coord) {
            Ok(lon_lat) if !lon_lat.is_error() => bbox.contains_point(lon_lat.x, lon_lat.y),
            _ => false,
        };
    }

    if bbox.contains_point(coord.x, coord.y) {
        return true;
    }
    if is_lon_lat && coord.y >= bbox.min_y && coord.y <= bbox.max_y {
        let lon = normalize_longitude_degrees(coord.x);
        return lon >= bbox.min_x && lon <= bbox.max_x;
    }
    if is_lat_lon && coord.x >= bbox.min_x && coord.x <= bbox.max_x {
        let lon = normalize_longitude_degrees(coord.y);
        return lon >= bbox.min_y && lon <= bbox.max_y;
    }
    false
}

/// Select the candidate matching the point's area of use with the best
/// accuracy, skipping excluded indices.
///
/// Among spatially matching candidates: strictly better known accuracy
/// wins; on an accuracy tie a strictly smaller pseudo-area wins unless
/// the incumbent is a priority operation or only the challenger's area
/// name is unknown; an offshore candidate never displaces an incumbent.
/// With `skip_noninstantiable`, candidates that cannot be instantiated
/// are passed over (computed lazily, cached on the candidate).
pub fn select(
    candidates: &[CandidateOperation],
    excluded: &[usize],
    skip_noninstantiable: bool,
    direction: Direction,
    coord: Coord,
) -> Option<usize> {
    let mut best: Option<usize> = None;
    let mut best_accuracy = f64::MAX;

    for (i, alt) in candidates.iter().enumerate() {
        if excluded.contains(&i) {
            continue;
        }
        if !spatial_criterion_ok(alt, direction, coord) {
            continue;
        }

        let accuracy = accuracy_value(alt);
        let wins = match best {
            None => true,
            Some(ibest) => {
                let incumbent = &candidates[ibest];
                ((accuracy >= 0.0 && accuracy < best_accuracy)
                    || (accuracy == best_accuracy
                        && alt.pseudo_area < incumbent.pseudo_area
                        && !(alt.is_unknown_area_name && !incumbent.is_unknown_area_name)
                        && !incumbent.is_priority_op))
                    && !alt.is_offshore
            }
        };
        if wins {
            if skip_noninstantiable && !alt.is_instantiable() {
                continue;
            }
            best = Some(i);
            best_accuracy = accuracy;
        }
    }

    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::{prepare_candidates, AxisOrder, CoordOperation, ProposedOperation};
    use geo_common::{BoundingBox, ShiftResult};
    use std::sync::Arc;

    struct Identity;
    impl CoordOperation for Identity {
        fn forward(&self, coord: Coord) -> ShiftResult<Coord> {
            Ok(coord)
        }
        fn inverse(&self, coord: Coord) -> ShiftResult<Coord> {
            Ok(coord)
        }
    }

    struct NotInstantiable;
    impl CoordOperation for NotInstantiable {
        fn forward(&self, coord: Coord) -> ShiftResult<Coord> {
            Ok(coord)
        }
        fn inverse(&self, coord: Coord) -> ShiftResult<Coord> {
            Ok(coord)
        }
        fn is_instantiable(&self) -> bool {
            false
        }
    }

    fn proposal(
        name: &str,
        area_name: &str,
        accuracy: Option<f64>,
        area: BoundingBox,
    ) -> ProposedOperation {
        ProposedOperation {
            op: Arc::new(Identity),
            name: name.to_string(),
            area_name: Some(area_name.to_string()),
            accuracy,
            area_of_use: Some(area),
            src_bbox: None,
            dst_bbox: None,
            src_axis: AxisOrder::LonLatDegree,
            dst_axis: AxisOrder::LonLatDegree,
            src_to_lon_lat: None,
            dst_to_lon_lat: None,
        }
    }

    #[test]
    fn test_better_accuracy_wins() {
        let candidates = prepare_candidates(vec![
            proposal("coarse", "World", Some(5.0), BoundingBox::whole_world()),
            proposal("fine", "Local", Some(0.1), BoundingBox::new(0.0, 40.0, 10.0, 50.0)),
        ]);
        let picked = select(&candidates, &[], false, Direction::Forward, Coord::xy(5.0, 45.0));
        assert_eq!(picked, Some(1));
        // Outside the fine area only the coarse one matches.
        let picked = select(&candidates, &[], false, Direction::Forward, Coord::xy(100.0, 0.0));
        assert_eq!(picked, Some(0));
    }

    #[test]
    fn test_equal_accuracy_smaller_pseudo_area_wins() {
        let candidates = prepare_candidates(vec![
            proposal("big", "Region", Some(1.0), BoundingBox::new(-20.0, 20.0, 40.0, 60.0)),
            proposal("small", "Subregion", Some(1.0), BoundingBox::new(0.0, 40.0, 10.0, 50.0)),
        ]);
        let picked = select(&candidates, &[], false, Direction::Forward, Coord::xy(5.0, 45.0));
        assert_eq!(picked, Some(1));
    }

    #[test]
    fn test_offshore_never_beats_onshore() {
        let candidates = prepare_candidates(vec![
            proposal("onshore", "Tunisia - onshore", Some(1.0), BoundingBox::new(5.0, 30.0, 12.0, 38.0)),
            proposal("offshore", "Tunisia - offshore", Some(1.0), BoundingBox::new(9.0, 33.0, 11.0, 35.0)),
        ]);
        // The offshore candidate has the smaller area but must not win.
        let picked = select(&candidates, &[], false, Direction::Forward, Coord::xy(10.0, 34.0));
        assert_eq!(picked, Some(0));
    }

    #[test]
    fn test_priority_incumbent_not_displaced() {
        let candidates = prepare_candidates(vec![
            proposal("GDA94 to WGS 84 (1)", "Australia", Some(1.0), BoundingBox::new(110.0, -45.0, 155.0, -10.0)),
            proposal("state", "Victoria", Some(1.0), BoundingBox::new(140.0, -40.0, 150.0, -34.0)),
        ]);
        let picked = select(&candidates, &[], false, Direction::Forward, Coord::xy(145.0, -37.0));
        assert_eq!(picked, Some(0));
    }

    #[test]
    fn test_longitude_wraparound_periodicity() {
        let candidates = prepare_candidates(vec![proposal(
            "regional",
            "Region",
            Some(1.0),
            BoundingBox::new(-125.0, 24.0, -66.0, 50.0),
        )]);
        for offset in [-720.0, -360.0, 0.0, 360.0, 720.0] {
            let picked = select(
                &candidates,
                &[],
                false,
                Direction::Forward,
                Coord::xy(-100.0 + offset, 40.0),
            );
            assert_eq!(picked, Some(0), "offset {offset}");
        }
    }

    #[test]
    fn test_excluded_candidates_skipped() {
        let candidates = prepare_candidates(vec![
            proposal("first", "Region", Some(1.0), BoundingBox::new(0.0, 40.0, 10.0, 50.0)),
            proposal("second", "Region2", Some(2.0), BoundingBox::new(0.0, 40.0, 10.0, 50.0)),
        ]);
        let point = Coord::xy(5.0, 45.0);
        assert_eq!(select(&candidates, &[], false, Direction::Forward, point), Some(0));
        assert_eq!(select(&candidates, &[0], false, Direction::Forward, point), Some(1));
        assert_eq!(select(&candidates, &[0, 1], false, Direction::Forward, point), None);
    }

    #[test]
    fn test_skip_noninstantiable() {
        let mut p = proposal("gridded", "Region", Some(0.1), BoundingBox::new(0.0, 40.0, 10.0, 50.0));
        p.op = Arc::new(NotInstantiable);
        let candidates = prepare_candidates(vec![
            p,
            proposal("fallback", "Region", Some(5.0), BoundingBox::new(0.0, 40.0, 10.0, 50.0)),
        ]);
        let point = Coord::xy(5.0, 45.0);
        assert_eq!(select(&candidates, &[], false, Direction::Forward, point), Some(0));
        assert_eq!(select(&candidates, &[], true, Direction::Forward, point), Some(1));
    }

    #[test]
    fn test_geocentric_side_uses_helper() {
        struct ToLonLat;
        impl CoordOperation for ToLonLat {
            fn forward(&self, _coord: Coord) -> ShiftResult<Coord> {
                // Every native point maps to a fixed lon/lat inside the
                // candidate's area.
                Ok(Coord::xy(5.0, 45.0))
            }
            fn inverse(&self, coord: Coord) -> ShiftResult<Coord> {
                Ok(coord)
            }
        }

        let mut p = proposal("geocentric", "Region", Some(1.0), BoundingBox::new(0.0, 40.0, 10.0, 50.0));
        p.src_axis = AxisOrder::Other;
        p.src_to_lon_lat = Some(Arc::new(ToLonLat));
        let candidates = prepare_candidates(vec![p]);

        // The native coordinate is far outside the bbox but projects
        // inside it.
        let picked = select(
            &candidates,
            &[],
            false,
            Direction::Forward,
            Coord::new(6_378_137.0, 0.0, 0.0, 0.0),
        );
        assert_eq!(picked, Some(0));
    }
}
