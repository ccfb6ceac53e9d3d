//! Polygon validation and route planning.
//!
//! A patrol walks every boundary edge once, in ring order, starting from a
//! chosen vertex. [`Boundary`] holds the cleaned ring (no closing vertex, no
//! repeated vertices) of a polygon that passed validation.

use geo::algorithm::line_intersection::line_intersection;
use geo::{Area, Coord, Line, LineString, Polygon};

use crate::errors::GeometryError;

/// Vertices closer than this are treated as the same vertex.
const VERTEX_EPSILON: f64 = 1e-9;

/// One boundary edge, walked as one travel leg.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    /// Position of the edge in the walking order.
    pub index: usize,
    pub start: Coord,
    pub end: Coord,
    /// Planned length in meters, always > 0.
    pub length: f64,
}

impl Segment {
    fn new(index: usize, start: Coord, end: Coord) -> Self {
        Self {
            index,
            start,
            end,
            length: distance(start, end),
        }
    }

    /// Unit vector from start to end.
    pub fn direction(&self) -> Coord {
        (self.end - self.start) / self.length
    }

    /// Bearing of the edge in radians (counter-clockwise from +x).
    pub fn bearing(&self) -> f64 {
        let d = self.end - self.start;
        d.y.atan2(d.x)
    }

    /// Distance travelled along the edge by the projection of `p`.
    pub fn progress(&self, p: Coord) -> f64 {
        let dir = self.direction();
        let rel = p - self.start;
        rel.x * dir.x + rel.y * dir.y
    }

    /// Signed perpendicular distance of `p` from the edge line (left is positive).
    pub fn lateral(&self, p: Coord) -> f64 {
        let dir = self.direction();
        let rel = p - self.start;
        dir.x * rel.y - dir.y * rel.x
    }

    /// Point on the edge `along` meters from the start, clamped to the edge.
    pub fn point_at(&self, along: f64) -> Coord {
        self.start + self.direction() * along.clamp(0.0, self.length)
    }
}

/// A validated simple polygon ring.
#[derive(Debug, Clone, PartialEq)]
pub struct Boundary {
    vertices: Vec<Coord>,
}

impl Boundary {
    /// Validates the exterior ring of `polygon`. Interior rings are ignored.
    pub fn from_polygon(polygon: &Polygon<f64>) -> Result<Self, GeometryError> {
        Self::from_coords(polygon.exterior().coords().copied())
    }

    /// Validates a ring given as vertices, explicitly closed or not.
    pub fn from_coords(coords: impl IntoIterator<Item = Coord>) -> Result<Self, GeometryError> {
        let mut vertices: Vec<Coord> = Vec::new();
        for (i, c) in coords.into_iter().enumerate() {
            if !c.x.is_finite() || !c.y.is_finite() {
                return Err(GeometryError::NonFinite(i));
            }
            if vertices
                .last()
                .is_none_or(|last| distance(*last, c) > VERTEX_EPSILON)
            {
                vertices.push(c);
            }
        }
        while vertices.len() > 1
            && distance(vertices[0], vertices[vertices.len() - 1]) <= VERTEX_EPSILON
        {
            vertices.pop();
        }

        if vertices.len() < 3 {
            return Err(GeometryError::TooFewVertices(vertices.len()));
        }

        let boundary = Self { vertices };
        boundary.check_simple()?;
        if boundary.area() <= VERTEX_EPSILON {
            return Err(GeometryError::ZeroArea);
        }
        Ok(boundary)
    }

    pub fn vertices(&self) -> &[Coord] {
        &self.vertices
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    pub fn to_polygon(&self) -> Polygon<f64> {
        Polygon::new(LineString::from(self.vertices.clone()), vec![])
    }

    pub fn area(&self) -> f64 {
        self.to_polygon().unsigned_area()
    }

    pub fn perimeter(&self) -> f64 {
        self.edges().map(|line| distance(line.start, line.end)).sum()
    }

    /// Edges in ring order starting at `start_vertex` (modulo the vertex count).
    pub fn segments(&self, start_vertex: usize) -> Vec<Segment> {
        let n = self.vertices.len();
        (0..n)
            .map(|k| {
                let a = self.vertices[(start_vertex + k) % n];
                let b = self.vertices[(start_vertex + k + 1) % n];
                Segment::new(k, a, b)
            })
            .collect()
    }

    fn edges(&self) -> impl Iterator<Item = Line<f64>> + '_ {
        let n = self.vertices.len();
        (0..n).map(move |i| Line::new(self.vertices[i], self.vertices[(i + 1) % n]))
    }

    fn check_simple(&self) -> Result<(), GeometryError> {
        let edges: Vec<Line<f64>> = self.edges().collect();
        let n = edges.len();

        for i in 0..n {
            // Adjacent edges may only meet at their shared vertex
            let (a, b) = (edges[i], edges[(i + 1) % n]);
            let (u, v) = (a.delta(), b.delta());
            let cross = u.x * v.y - u.y * v.x;
            let dot = u.x * v.x + u.y * v.y;
            if cross.abs() <= VERTEX_EPSILON * a.delta().x.hypot(a.delta().y) && dot < 0.0 {
                return Err(GeometryError::SelfIntersecting(i, (i + 1) % n));
            }

            for j in (i + 2)..n {
                if i == 0 && j == n - 1 {
                    continue;
                }
                if line_intersection(edges[i], edges[j]).is_some() {
                    return Err(GeometryError::SelfIntersecting(i, j));
                }
            }
        }
        Ok(())
    }
}

/// Decomposes a polygon boundary into the ordered edges a patrol walks.
///
/// Every edge appears exactly once, in ring order from `start_vertex`.
pub fn plan_route(
    polygon: &Polygon<f64>,
    start_vertex: usize,
) -> Result<Vec<Segment>, GeometryError> {
    Ok(Boundary::from_polygon(polygon)?.segments(start_vertex))
}

/// Euclidean distance between two planar coordinates.
pub fn distance(a: Coord, b: Coord) -> f64 {
    (b.x - a.x).hypot(b.y - a.y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;

    fn square() -> Polygon<f64> {
        polygon![(x: 0.0, y: 0.0), (x: 0.0, y: 100.0), (x: 100.0, y: 100.0), (x: 100.0, y: 0.0)]
    }

    #[test]
    fn test_square_route() {
        let route = plan_route(&square(), 0).unwrap();
        assert_eq!(route.len(), 4);
        for seg in &route {
            assert!((seg.length - 100.0).abs() < 1e-9);
        }
        assert_eq!(route[0].start, Coord { x: 0.0, y: 0.0 });
        assert_eq!(route[3].end, Coord { x: 0.0, y: 0.0 });
        // Consecutive segments connect
        for pair in route.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
    }

    #[test]
    fn test_start_vertex_rotates_route() {
        let route = plan_route(&square(), 2).unwrap();
        assert_eq!(route[0].start, Coord { x: 100.0, y: 100.0 });
        assert_eq!(route[0].index, 0);
        let wrapped = plan_route(&square(), 6).unwrap();
        assert_eq!(route, wrapped);
    }

    #[test]
    fn test_closing_and_duplicate_vertices_collapse() {
        let coords = vec![
            Coord { x: 0.0, y: 0.0 },
            Coord { x: 10.0, y: 0.0 },
            Coord { x: 10.0, y: 0.0 },
            Coord { x: 10.0, y: 10.0 },
            Coord { x: 0.0, y: 0.0 },
        ];
        let boundary = Boundary::from_coords(coords).unwrap();
        assert_eq!(boundary.len(), 3);
        assert!((boundary.area() - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_too_few_vertices() {
        let coords = vec![Coord { x: 0.0, y: 0.0 }, Coord { x: 1.0, y: 1.0 }];
        assert_eq!(
            Boundary::from_coords(coords).unwrap_err(),
            GeometryError::TooFewVertices(2)
        );
    }

    #[test]
    fn test_collinear_ring_is_degenerate() {
        let coords = vec![
            Coord { x: 0.0, y: 0.0 },
            Coord { x: 5.0, y: 0.0 },
            Coord { x: 10.0, y: 0.0 },
        ];
        assert!(matches!(
            Boundary::from_coords(coords).unwrap_err(),
            GeometryError::ZeroArea | GeometryError::SelfIntersecting(..)
        ));
    }

    #[test]
    fn test_bowtie_is_rejected() {
        let bowtie = polygon![(x: 0.0, y: 0.0), (x: 10.0, y: 10.0), (x: 10.0, y: 0.0), (x: 0.0, y: 10.0)];
        assert!(matches!(
            plan_route(&bowtie, 0),
            Err(GeometryError::SelfIntersecting(_, _))
        ));
    }

    #[test]
    fn test_non_finite_vertex() {
        let coords = vec![
            Coord { x: 0.0, y: 0.0 },
            Coord { x: f64::NAN, y: 0.0 },
            Coord { x: 1.0, y: 1.0 },
        ];
        assert_eq!(Boundary::from_coords(coords).unwrap_err(), GeometryError::NonFinite(1));
    }

    #[test]
    fn test_segment_projection() {
        let seg = plan_route(&square(), 0).unwrap()[0]; // (0,0) -> (0,100)
        let p = Coord { x: -3.0, y: 40.0 };
        assert!((seg.progress(p) - 40.0).abs() < 1e-9);
        assert!((seg.lateral(p) - 3.0).abs() < 1e-9);
        assert_eq!(seg.point_at(250.0), Coord { x: 0.0, y: 100.0 });
        assert!((seg.bearing() - std::f64::consts::FRAC_PI_2).abs() < 1e-12);
    }

    #[test]
    fn test_perimeter() {
        let boundary = Boundary::from_polygon(&square()).unwrap();
        assert!((boundary.perimeter() - 400.0).abs() < 1e-9);
    }
}
