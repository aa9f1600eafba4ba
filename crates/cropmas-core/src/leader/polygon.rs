//! Polygon helpers for leader areas: shoelace area, segment intersection and
//! ray-cast point-in-polygon tests.

/// Drop consecutive duplicates, including a closing point equal to the first.
pub fn dedup_ring(points: &mut Vec<(i32, i32)>) {
    points.dedup();
    while points.len() > 1 && points.first() == points.last() {
        points.pop();
    }
}

/// Absolute shoelace area of a closed polygon given by its vertices in order.
pub fn shoelace_area(points: &[(i32, i32)]) -> f64 {
    let n = points.len();
    if n < 3 {
        return 0.0;
    }
    let twice: i64 = (0..n)
        .map(|i| {
            let (x0, y0) = points[i];
            let (x1, y1) = points[(i + 1) % n];
            x0 as i64 * y1 as i64 - x1 as i64 * y0 as i64
        })
        .sum();
    twice.abs() as f64 * 0.5
}

/// True if segment `a0–a1` touches segment `b0–b1`.
///
/// Each segment is turned into an implicit line `a·x + b·y + c`; the
/// segments intersect when each one's endpoints are not strictly on the
/// same side of the other's line. Collinear segments count as touching.
pub fn segments_intersect(a0: (i32, i32), a1: (i32, i32), b0: (i32, i32), b1: (i32, i32)) -> bool {
    let side = |p: (i32, i32), q: (i32, i32), r: (i32, i32)| -> i64 {
        let a = (q.1 - p.1) as i64;
        let b = (p.0 - q.0) as i64;
        let c = q.0 as i64 * p.1 as i64 - p.0 as i64 * q.1 as i64;
        a * r.0 as i64 + b * r.1 as i64 + c
    };
    let d1 = side(a0, a1, b0);
    let d2 = side(a0, a1, b1);
    if (d1 > 0 && d2 > 0) || (d1 < 0 && d2 < 0) {
        return false;
    }
    let d3 = side(b0, b1, a0);
    let d4 = side(b0, b1, a1);
    !((d3 > 0 && d4 > 0) || (d3 < 0 && d4 < 0))
}

/// Parity test: counts how many polygon edges the segment from `origin` to
/// `point` crosses. `origin` must lie outside the polygon.
pub fn ray_cast(polygon: &[(i32, i32)], origin: (i32, i32), point: (i32, i32)) -> bool {
    let n = polygon.len();
    if n < 3 {
        return false;
    }
    let crossings = (0..n)
        .filter(|&i| segments_intersect(origin, point, polygon[i], polygon[(i + 1) % n]))
        .count();
    crossings % 2 == 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn square(s: i32) -> Vec<(i32, i32)> {
        vec![(-s, s), (s, s), (s, -s), (-s, -s)]
    }

    #[test]
    fn shoelace_of_square() {
        assert_relative_eq!(shoelace_area(&square(10)), 400.0);
        let mut rev = square(10);
        rev.reverse();
        assert_relative_eq!(shoelace_area(&rev), 400.0);
    }

    #[test]
    fn shoelace_degenerate_inputs() {
        assert_eq!(shoelace_area(&[]), 0.0);
        assert_eq!(shoelace_area(&[(0, 0), (5, 5)]), 0.0);
        // Collinear points enclose nothing.
        assert_eq!(shoelace_area(&[(0, 0), (1, 0), (2, 0)]), 0.0);
    }

    #[test]
    fn dedup_removes_repeated_corners() {
        let mut ring = vec![(0, 0), (0, 0), (4, 0), (4, 4), (4, 4), (0, 4), (0, 0)];
        dedup_ring(&mut ring);
        assert_eq!(ring, vec![(0, 0), (4, 0), (4, 4), (0, 4)]);
    }

    #[test]
    fn crossing_and_disjoint_segments() {
        assert!(segments_intersect((0, 0), (4, 4), (0, 4), (4, 0)));
        assert!(!segments_intersect((0, 0), (1, 1), (3, 0), (3, 5)));
        // Parallel but offset.
        assert!(!segments_intersect((0, 0), (4, 0), (0, 1), (4, 1)));
    }

    #[test]
    fn ray_cast_inside_and_outside() {
        let poly = square(10);
        let origin = (-11, -10);
        assert!(ray_cast(&poly, origin, (0, 0)));
        assert!(ray_cast(&poly, origin, (7, 3)));
        assert!(!ray_cast(&poly, origin, (15, 0)));
        assert!(!ray_cast(&poly, origin, (0, 25)));
    }
}
