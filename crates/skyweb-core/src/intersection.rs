//! Segment-versus-airspace predicates in planar lon/lat degrees.

use crate::models::IntersectionType;
use geo::line_intersection::{line_intersection, LineIntersection};
use geo::{Contains, Coord, Intersects, Line, MultiPolygon, Point};

/// Build a planar line from (lat, lon) endpoints. Returns `None` for a
/// zero-length segment.
pub fn segment_line(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> Option<Line<f64>> {
    let start = Coord { x: lon1, y: lat1 };
    let end = Coord { x: lon2, y: lat2 };
    if (start.x - end.x).abs() <= f64::EPSILON && (start.y - end.y).abs() <= f64::EPSILON {
        return None;
    }
    Some(Line::new(start, end))
}

/// Whether the segment touches the airspace at all.
pub fn segment_intersects(line: &Line<f64>, area: &MultiPolygon<f64>) -> bool {
    line.intersects(area)
}

/// Classify a segment against an airspace.
///
/// Priority is fixed: INSIDE, CROSSES, EXIT, ENTRY, then CROSSES as the
/// default for boundary-touching and degenerate cases.
pub fn classify_segment(line: &Line<f64>, area: &MultiPolygon<f64>) -> IntersectionType {
    let start_inside = area.contains(&Point::from(line.start));
    let end_inside = area.contains(&Point::from(line.end));

    if start_inside && end_inside {
        return IntersectionType::Inside;
    }
    if segment_crosses(line, area) {
        return IntersectionType::Crosses;
    }
    if start_inside {
        return IntersectionType::Exit;
    }
    if end_inside {
        return IntersectionType::Entry;
    }
    IntersectionType::Crosses
}

/// OGC "crosses" for a line against an area: part of the segment lies in the
/// interior and part lies in the exterior.
///
/// The segment is split at every boundary intersection and each piece is
/// probed at its midpoint.
pub fn segment_crosses(line: &Line<f64>, area: &MultiPolygon<f64>) -> bool {
    let mut params = vec![0.0, 1.0];
    for polygon in &area.0 {
        let rings = std::iter::once(polygon.exterior()).chain(polygon.interiors());
        for ring in rings {
            for edge in ring.lines() {
                match line_intersection(*line, edge) {
                    Some(LineIntersection::SinglePoint { intersection, .. }) => {
                        params.push(param_along(line, intersection));
                    }
                    Some(LineIntersection::Collinear { intersection }) => {
                        params.push(param_along(line, intersection.start));
                        params.push(param_along(line, intersection.end));
                    }
                    None => {}
                }
            }
        }
    }
    params.sort_by(|a, b| a.total_cmp(b));
    params.dedup_by(|a, b| (*a - *b).abs() < 1e-12);

    let mut interior = false;
    let mut exterior = false;
    for pair in params.windows(2) {
        let mid = (pair[0] + pair[1]) / 2.0;
        let probe = Point::from(point_at(line, mid));
        if area.contains(&probe) {
            interior = true;
        } else if !area.intersects(&probe) {
            exterior = true;
        }
        if interior && exterior {
            return true;
        }
    }
    false
}

/// Planar distance (degrees) between a segment and an airspace boundary.
///
/// Zero when they intersect.
pub fn segment_distance(line: &Line<f64>, area: &MultiPolygon<f64>) -> f64 {
    if line.intersects(area) {
        return 0.0;
    }
    let mut best = f64::INFINITY;
    for polygon in &area.0 {
        let rings = std::iter::once(polygon.exterior()).chain(polygon.interiors());
        for ring in rings {
            for edge in ring.lines() {
                best = best.min(segment_to_segment_distance(line, &edge));
            }
        }
    }
    best
}

fn param_along(line: &Line<f64>, point: Coord<f64>) -> f64 {
    let d = line.delta();
    let len_sq = d.x * d.x + d.y * d.y;
    if len_sq <= 0.0 {
        return 0.0;
    }
    (((point.x - line.start.x) * d.x + (point.y - line.start.y) * d.y) / len_sq).clamp(0.0, 1.0)
}

fn point_at(line: &Line<f64>, t: f64) -> Coord<f64> {
    Coord {
        x: line.start.x + line.dx() * t,
        y: line.start.y + line.dy() * t,
    }
}

fn segment_to_segment_distance(a: &Line<f64>, b: &Line<f64>) -> f64 {
    if segments_intersect_2d(a, b) {
        return 0.0;
    }
    let d1 = point_segment_distance(a.start, b);
    let d2 = point_segment_distance(a.end, b);
    let d3 = point_segment_distance(b.start, a);
    let d4 = point_segment_distance(b.end, a);
    d1.min(d2).min(d3).min(d4)
}

fn segments_intersect_2d(a: &Line<f64>, b: &Line<f64>) -> bool {
    const EPS: f64 = 1e-12;

    fn orient(p: Coord<f64>, q: Coord<f64>, r: Coord<f64>) -> f64 {
        (q.x - p.x) * (r.y - p.y) - (q.y - p.y) * (r.x - p.x)
    }

    fn on_segment(p: Coord<f64>, q: Coord<f64>, r: Coord<f64>) -> bool {
        r.x >= p.x.min(q.x) - EPS
            && r.x <= p.x.max(q.x) + EPS
            && r.y >= p.y.min(q.y) - EPS
            && r.y <= p.y.max(q.y) + EPS
    }

    let o1 = orient(a.start, a.end, b.start);
    let o2 = orient(a.start, a.end, b.end);
    let o3 = orient(b.start, b.end, a.start);
    let o4 = orient(b.start, b.end, a.end);

    if o1.abs() <= EPS && on_segment(a.start, a.end, b.start) {
        return true;
    }
    if o2.abs() <= EPS && on_segment(a.start, a.end, b.end) {
        return true;
    }
    if o3.abs() <= EPS && on_segment(b.start, b.end, a.start) {
        return true;
    }
    if o4.abs() <= EPS && on_segment(b.start, b.end, a.end) {
        return true;
    }

    let a_crosses = (o1 > EPS && o2 < -EPS) || (o1 < -EPS && o2 > EPS);
    let b_crosses = (o3 > EPS && o4 < -EPS) || (o3 < -EPS && o4 > EPS);
    a_crosses && b_crosses
}

fn point_segment_distance(p: Coord<f64>, seg: &Line<f64>) -> f64 {
    let t = param_along(seg, p);
    let closest = point_at(seg, t);
    ((p.x - closest.x).powi(2) + (p.y - closest.y).powi(2)).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{polygon, MultiPolygon};

    fn unit_square() -> MultiPolygon<f64> {
        MultiPolygon(vec![polygon![
            (x: 0.0, y: 0.0),
            (x: 1.0, y: 0.0),
            (x: 1.0, y: 1.0),
            (x: 0.0, y: 1.0),
            (x: 0.0, y: 0.0),
        ]])
    }

    fn line(lon1: f64, lat1: f64, lon2: f64, lat2: f64) -> Line<f64> {
        segment_line(lat1, lon1, lat2, lon2).expect("non-degenerate")
    }

    #[test]
    fn zero_length_segment_is_rejected() {
        assert!(segment_line(48.0, 2.0, 48.0, 2.0).is_none());
    }

    #[test]
    fn inside_when_both_endpoints_contained() {
        let l = line(0.2, 0.2, 0.8, 0.7);
        assert_eq!(classify_segment(&l, &unit_square()), IntersectionType::Inside);
    }

    #[test]
    fn crosses_when_passing_through() {
        let l = line(-0.5, 0.5, 1.5, 0.5);
        assert_eq!(classify_segment(&l, &unit_square()), IntersectionType::Crosses);
    }

    #[test]
    fn one_endpoint_inside_and_one_outside_crosses() {
        let l = line(0.5, 0.5, 2.0, 0.5);
        assert!(segment_crosses(&l, &unit_square()));
        assert_eq!(classify_segment(&l, &unit_square()), IntersectionType::Crosses);
    }

    #[test]
    fn exit_and_entry_swap_with_direction() {
        // Starts inside and stops on the boundary: never reaches the exterior.
        let forward = line(0.5, 0.5, 1.0, 0.5);
        let backward = line(1.0, 0.5, 0.5, 0.5);
        assert_eq!(classify_segment(&forward, &unit_square()), IntersectionType::Exit);
        assert_eq!(classify_segment(&backward, &unit_square()), IntersectionType::Entry);
    }

    #[test]
    fn inside_and_crosses_are_direction_stable() {
        let area = unit_square();
        for (a, b) in [((0.2, 0.2), (0.8, 0.7)), ((-0.5, 0.5), (1.5, 0.5))] {
            let forward = line(a.0, a.1, b.0, b.1);
            let backward = line(b.0, b.1, a.0, a.1);
            assert_eq!(classify_segment(&forward, &area), classify_segment(&backward, &area));
        }
    }

    #[test]
    fn boundary_touch_defaults_to_crosses() {
        // Runs along the top edge only.
        let l = line(-0.5, 1.0, 1.5, 1.0);
        assert!(segment_intersects(&l, &unit_square()));
        assert!(!segment_crosses(&l, &unit_square()));
        assert_eq!(classify_segment(&l, &unit_square()), IntersectionType::Crosses);
    }

    #[test]
    fn distance_to_nearby_airspace() {
        let l = line(-0.5, 1.05, 1.5, 1.05);
        assert!(!segment_intersects(&l, &unit_square()));
        let d = segment_distance(&l, &unit_square());
        assert!((d - 0.05).abs() < 1e-9, "got {d}");
    }

    #[test]
    fn distance_is_zero_when_intersecting() {
        let l = line(-0.5, 0.5, 1.5, 0.5);
        assert_eq!(segment_distance(&l, &unit_square()), 0.0);
    }
}
