//! Rectangle transformation across the antimeridian and poles.
//!
//! The source rectangle's boundary is densified into a closed ring,
//! every ring point is transformed, and the output envelope is derived
//! from the ring. Angular outputs need antimeridian-aware min/max and a
//! pole special case; everything else is a plain per-axis envelope.

use geo_common::{BoundingBox, Coord, Direction, ShiftError, ShiftResult};

use crate::dispatcher::Transformer;

const MAX_DENSIFY_PTS: usize = 10_000;

/// Consecutive ring longitudes at least this far apart are evidence of
/// an antimeridian crossing. Significantly larger than the widest
/// possible honest step between densified ring points (120 with two
/// extra points per side), smaller than the 240 seen on a crossing,
/// and large enough that latitudes can never trigger it.
const CROSSING_JUMP: f64 = 200.0;

/// Failed ring points carry this value and are skipped by the envelope
/// scans.
const BAD: f64 = f64::INFINITY;

/// Transform an axis-aligned rectangle, densifying its edges to follow
/// nonlinear transforms, and return the envelope of the result.
///
/// `x` is the first axis of the rectangle; for angular sides this is
/// longitude in degrees. `densify_pts` extra points are added per edge
/// (0 to 10000, and at least 2 when the output is angular). A source
/// rectangle with `max_x < min_x` is accepted only when the input is
/// angular, meaning it spans the antimeridian. Likewise the result: an
/// angular output envelope with `max_x < min_x` crossed the
/// antimeridian and describes the union of `[min_x, 180]` and
/// `[-180, max_x]`.
pub fn transform_bounds(
    transformer: &mut Transformer,
    direction: Direction,
    bounds: BoundingBox,
    densify_pts: usize,
    degree_input: bool,
    degree_output: bool,
) -> ShiftResult<BoundingBox> {
    if densify_pts > MAX_DENSIFY_PTS {
        return Err(ShiftError::InvalidParameter {
            param: "densify_pts".to_string(),
            message: format!("must be between 0 and {MAX_DENSIFY_PTS}"),
        });
    }
    if degree_output && densify_pts < 2 {
        return Err(ShiftError::InvalidParameter {
            param: "densify_pts".to_string(),
            message: "must be at least 2 if the output is angular".to_string(),
        });
    }
    if bounds.max_y < bounds.min_y {
        return Err(ShiftError::InvalidBbox(
            "latitude max < latitude min".to_string(),
        ));
    }
    if bounds.max_x < bounds.min_x && !degree_input {
        return Err(ShiftError::InvalidBbox(
            "x max < x min on a non-angular axis".to_string(),
        ));
    }

    let side_pts = densify_pts + 1;
    let delta_x = if degree_input && bounds.max_x < bounds.min_x {
        // Antimeridian-spanning input.
        (bounds.max_x - bounds.min_x + 360.0) / side_pts as f64
    } else {
        (bounds.max_x - bounds.min_x) / side_pts as f64
    };
    let delta_y = (bounds.max_y - bounds.min_y) / side_pts as f64;

    let north_pole_in = degree_output && pole_in_bounds(transformer, direction, &bounds, 90.0);
    let south_pole_in = degree_output && pole_in_bounds(transformer, direction, &bounds, -90.0);

    // The densified boundary must be a linear ring for the
    // antimeridian crossing detection to work.
    let ring_len = side_pts * 4;
    let mut xs = vec![0.0f64; ring_len];
    let mut ys = vec![0.0f64; ring_len];
    for i in 0..side_pts {
        let f = i as f64;
        // min_x edge, top down
        xs[i] = bounds.min_x;
        ys[i] = bounds.max_y - f * delta_y;
        // min_y edge, west to east
        xs[i + side_pts] = bounds.min_x + f * delta_x;
        ys[i + side_pts] = bounds.min_y;
        // max_x edge, bottom up
        xs[i + side_pts * 2] = bounds.max_x;
        ys[i + side_pts * 2] = bounds.min_y + f * delta_y;
        // max_y edge, east to west
        xs[i + side_pts * 3] = bounds.max_x - f * delta_x;
        ys[i + side_pts * 3] = bounds.max_y;
    }
    for i in 0..ring_len {
        match transformer.transform(direction, Coord::xy(xs[i], ys[i])) {
            Ok(out) if out.x.is_finite() && out.y.is_finite() => {
                xs[i] = out.x;
                ys[i] = out.y;
            }
            _ => {
                xs[i] = BAD;
                ys[i] = BAD;
            }
        }
    }

    let out_ymin = simple_min(&ys);
    let out_ymax = simple_max(&ys);

    let mut crossed_antimeridian = false;
    let mut envelope = if !degree_output {
        let (Some(xmin), Some(xmax), Some(ymin), Some(ymax)) =
            (simple_min(&xs), simple_max(&xs), out_ymin, out_ymax)
        else {
            return Err(ShiftError::OutOfDomain(
                "every boundary point failed to transform".to_string(),
            ));
        };
        BoundingBox::new(xmin, ymin, xmax, ymax)
    } else if north_pole_in {
        let ymin = out_ymin.ok_or_else(all_points_failed)?;
        BoundingBox::new(-180.0, ymin, 180.0, 90.0)
    } else if south_pole_in {
        let ymax = out_ymax.ok_or_else(all_points_failed)?;
        BoundingBox::new(-180.0, -90.0, 180.0, ymax)
    } else {
        let (Some(ymin), Some(ymax)) = (out_ymin, out_ymax) else {
            return Err(all_points_failed());
        };
        let xmin = antimeridian_min(&xs);
        let xmax = antimeridian_max(&xs);
        crossed_antimeridian = xmin > xmax;
        BoundingBox::new(xmin, ymin, xmax, ymax)
    };

    // The envelope of the boundary can miss interior extrema (e.g. the
    // apex of an azimuthal projection); sample interior rows of the
    // source rectangle unless the output wraps the antimeridian, where
    // plain min/max no longer applies.
    if !crossed_antimeridian {
        for j in 1..side_pts.saturating_sub(1) {
            for i in 0..side_pts {
                let src = Coord::xy(
                    bounds.min_x + i as f64 * delta_x,
                    bounds.min_y + j as f64 * delta_y,
                );
                if let Ok(out) = transformer.transform(direction, src) {
                    if out.x.is_finite() && out.y.is_finite() {
                        envelope.min_x = envelope.min_x.min(out.x);
                        envelope.max_x = envelope.max_x.max(out.x);
                        envelope.min_y = envelope.min_y.min(out.y);
                        envelope.max_y = envelope.max_y.max(out.y);
                    }
                }
            }
        }
    }

    Ok(envelope)
}

fn all_points_failed() -> ShiftError {
    ShiftError::OutOfDomain("every boundary point failed to transform".to_string())
}

/// Whether the source rectangle contains the given pole, tested by
/// mapping the pole back into the source frame.
fn pole_in_bounds(
    transformer: &mut Transformer,
    direction: Direction,
    bounds: &BoundingBox,
    pole_lat: f64,
) -> bool {
    match transformer.transform(direction.opposite(), Coord::xy(0.0, pole_lat)) {
        Ok(pole) => {
            bounds.min_x < pole.x
                && pole.x < bounds.max_x
                && bounds.min_y < pole.y
                && pole.y < bounds.max_y
        }
        Err(_) => false,
    }
}

fn simple_min(data: &[f64]) -> Option<f64> {
    data.iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(None, |acc, v| Some(acc.map_or(v, |a: f64| a.min(v))))
}

fn simple_max(data: &[f64]) -> Option<f64> {
    data.iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(None, |acc, v| Some(acc.map_or(v, |a: f64| a.max(v))))
}

/// Index of the nearest preceding valid ring value, wrapping around the
/// ring start.
fn previous_valid(data: &[f64], i: usize) -> usize {
    let mut prev = if i == 0 { data.len() - 1 } else { i - 1 };
    while data[prev] == BAD && prev != i {
        prev = if prev == 0 { data.len() - 1 } else { prev - 1 };
    }
    prev
}

/// Minimum longitude of a ring that may cross the antimeridian.
///
/// Walks the ring counting jumps of at least [`CROSSING_JUMP`] between
/// consecutive points. Two crossings mean the ring straddles ±180 and
/// the inclusive bound is the minimum of the positive side; four mean
/// the ring wraps the full domain.
fn antimeridian_min(data: &[f64]) -> f64 {
    let mut positive_min = BAD;
    let mut min_value = BAD;
    let mut crossings = 0u32;
    let mut on_positive_side = false;

    for i in 0..data.len() {
        if data[i] == BAD {
            continue;
        }
        let delta = data[previous_valid(data, i)] - data[i];
        if delta >= CROSSING_JUMP && delta != BAD {
            // stepped 180 -> -180
            if crossings == 0 {
                positive_min = min_value;
            }
            crossings += 1;
            on_positive_side = false;
        } else if delta <= -CROSSING_JUMP && delta != BAD {
            // stepped -180 -> 180
            if crossings == 0 {
                positive_min = data[i];
            }
            crossings += 1;
            on_positive_side = true;
        }
        if on_positive_side && data[i] < positive_min {
            positive_min = data[i];
        }
        if data[i] < min_value {
            min_value = data[i];
        }
    }

    match crossings {
        2 => positive_min,
        4 => -180.0,
        _ => min_value,
    }
}

/// Maximum longitude of a ring that may cross the antimeridian; the
/// mirror of [`antimeridian_min`].
fn antimeridian_max(data: &[f64]) -> f64 {
    let mut negative_max = -BAD;
    let mut max_value = -BAD;
    let mut crossings = 0u32;
    let mut on_negative_side = false;

    for i in 0..data.len() {
        if data[i] == BAD {
            continue;
        }
        let delta = data[previous_valid(data, i)] - data[i];
        if delta >= CROSSING_JUMP && delta != BAD {
            if crossings == 0 {
                negative_max = data[i];
            }
            crossings += 1;
            on_negative_side = true;
        } else if delta <= -CROSSING_JUMP && delta != BAD {
            if crossings == 0 {
                negative_max = max_value;
            }
            crossings += 1;
            on_negative_side = false;
        }
        if on_negative_side && data[i] > negative_max {
            negative_max = data[i];
        }
        if data[i] > max_value {
            max_value = data[i];
        }
    }

    match crossings {
        2 => negative_max,
        4 => 180.0,
        _ => max_value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::CoordOperation;
    use crate::dispatcher::TransformerBuilder;
    use grid_store::GridRegistry;
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

    /// Doubles x and y; the inverse halves them.
    struct Scale2;
    impl CoordOperation for Scale2 {
        fn forward(&self, coord: Coord) -> ShiftResult<Coord> {
            Ok(Coord::new(coord.x * 2.0, coord.y * 2.0, coord.z, coord.t))
        }
        fn inverse(&self, coord: Coord) -> ShiftResult<Coord> {
            Ok(Coord::new(coord.x / 2.0, coord.y / 2.0, coord.z, coord.t))
        }
    }

    /// A north-polar azimuthal toy projection: the projected origin is
    /// the pole, the projected radius is the colatitude in degrees.
    struct PolarAzimuthal;
    impl CoordOperation for PolarAzimuthal {
        fn forward(&self, coord: Coord) -> ShiftResult<Coord> {
            let r = (coord.x * coord.x + coord.y * coord.y).sqrt();
            let lon = coord.x.atan2(-coord.y).to_degrees();
            Ok(Coord::new(lon, 90.0 - r, coord.z, coord.t))
        }
        fn inverse(&self, coord: Coord) -> ShiftResult<Coord> {
            let r = 90.0 - coord.y;
            let lon = coord.x.to_radians();
            Ok(Coord::new(r * lon.sin(), -r * lon.cos(), coord.z, coord.t))
        }
    }

    fn transformer(op: impl CoordOperation + 'static) -> Transformer {
        TransformerBuilder::with_registry(Arc::new(GridRegistry::new()))
            .operation(Arc::new(op))
            .build()
            .unwrap()
    }

    #[test]
    fn test_rejects_bad_arguments() {
        let mut tf = transformer(Identity);
        let rect = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        assert!(matches!(
            transform_bounds(&mut tf, Direction::Forward, rect, 10_001, false, false),
            Err(ShiftError::InvalidParameter { .. })
        ));
        // Angular output needs at least two densification points.
        assert!(matches!(
            transform_bounds(&mut tf, Direction::Forward, rect, 1, false, true),
            Err(ShiftError::InvalidParameter { .. })
        ));
        // max < min is only meaningful for an angular x axis.
        let degenerate = BoundingBox::new(10.0, 0.0, 0.0, 10.0);
        assert!(matches!(
            transform_bounds(&mut tf, Direction::Forward, degenerate, 2, false, false),
            Err(ShiftError::InvalidBbox(_))
        ));
        let degenerate_y = BoundingBox::new(0.0, 10.0, 10.0, 0.0);
        assert!(matches!(
            transform_bounds(&mut tf, Direction::Forward, degenerate_y, 2, true, true),
            Err(ShiftError::InvalidBbox(_))
        ));
    }

    #[test]
    fn test_plain_envelope_non_angular() {
        let mut tf = transformer(Scale2);
        let rect = BoundingBox::new(1.0, 2.0, 3.0, 4.0);
        let out = transform_bounds(&mut tf, Direction::Forward, rect, 0, false, false).unwrap();
        assert_eq!(out, BoundingBox::new(2.0, 4.0, 6.0, 8.0));
        let back = transform_bounds(&mut tf, Direction::Inverse, out, 0, false, false).unwrap();
        assert_eq!(back, rect);
    }

    #[test]
    fn test_antimeridian_crossing_rectangle() {
        // Fiji-style rectangle straddling +/-180.
        let mut tf = transformer(Identity);
        let rect = BoundingBox::new(170.0, -20.0, -170.0, 20.0);
        let out = transform_bounds(&mut tf, Direction::Forward, rect, 2, true, true).unwrap();
        assert_eq!(out.min_x, 170.0);
        assert_eq!(out.max_x, -170.0);
        // Crossed: the envelope spans [170, 180] u [-180, -170], width
        // well under a full turn.
        assert!(out.max_x < out.min_x);
        let width = out.max_x - out.min_x + 360.0;
        assert!(width > 0.0 && width < 360.0);
        assert_eq!(out.min_y, -20.0);
        assert_eq!(out.max_y, 20.0);
    }

    #[test]
    fn test_non_crossing_rectangle_is_unchanged() {
        let mut tf = transformer(Identity);
        let rect = BoundingBox::new(-10.0, 40.0, 10.0, 50.0);
        let out = transform_bounds(&mut tf, Direction::Forward, rect, 5, true, true).unwrap();
        assert_eq!(out, rect);
    }

    #[test]
    fn test_pole_inside_rectangle_spans_full_band() {
        // A projected rectangle around the pole: the output must cover
        // every longitude up to the pole.
        let mut tf = transformer(PolarAzimuthal);
        let rect = BoundingBox::new(-10.0, -10.0, 10.0, 10.0);
        let out = transform_bounds(&mut tf, Direction::Forward, rect, 21, false, true).unwrap();
        assert_eq!(out.min_x, -180.0);
        assert_eq!(out.max_x, 180.0);
        assert_eq!(out.max_y, 90.0);
        // The corners reach sqrt(200) degrees of colatitude.
        let corner_lat = 90.0 - 200f64.sqrt();
        assert!((out.min_y - corner_lat).abs() < 0.5);
    }

    #[test]
    fn test_pole_outside_rectangle_stays_narrow() {
        // Same projection, but a rectangle away from the pole.
        let mut tf = transformer(PolarAzimuthal);
        let rect = BoundingBox::new(5.0, -30.0, 15.0, -20.0);
        let out = transform_bounds(&mut tf, Direction::Forward, rect, 21, false, true).unwrap();
        assert!(out.max_x - out.min_x < 360.0);
        assert!(out.max_y < 90.0);
    }

    #[test]
    fn test_interior_extremum_captured() {
        // The pole sits strictly inside the rectangle's interior; the
        // boundary ring alone would miss latitude 90 on no edge point,
        // but the full-band pole case plus interior sampling covers it.
        let mut tf = transformer(PolarAzimuthal);
        let rect = BoundingBox::new(-5.0, -5.0, 5.0, 5.0);
        let out = transform_bounds(&mut tf, Direction::Forward, rect, 3, false, true).unwrap();
        assert_eq!(out.max_y, 90.0);
    }
}
