use crate::structs::{OrientedEdge, Shell, ShellEdge, ShellFace};
use itertools::Itertools;
use meshstep_core::report::SewingReport;
use nalgebra::Point3;
use std::collections::HashMap;
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FaceError {
    #[error("polygon corner is not finite")]
    NonFinite,
    #[error("polygon has coincident corners")]
    Coincident,
    #[error("polygon corners are collinear")]
    Collinear,
}

/// Closed polygon v0 -> v1 -> v2 -> v0.
#[derive(Debug, Clone)]
pub struct Wire {
    corners: [Point3<f64>; 3],
}

/// Planar face bounded by a triangular wire.
#[derive(Debug, Clone)]
pub struct PlanarFace {
    corners: [Point3<f64>; 3],
}

pub fn make_polygon(corners: [Point3<f64>; 3], tolerance: f64) -> Result<Wire, FaceError> {
    if corners.iter().any(|p| !p.coords.iter().all(|c| c.is_finite())) {
        return Err(FaceError::NonFinite);
    }
    for (a, b) in corners.iter().circular_tuple_windows() {
        if (b - a).norm() <= tolerance {
            return Err(FaceError::Coincident);
        }
    }
    Ok(Wire { corners })
}

pub fn make_face(wire: &Wire, tolerance: f64) -> Result<PlanarFace, FaceError> {
    let [p0, p1, p2] = wire.corners;
    let normal = (p1 - p0).cross(&(p2 - p0));
    if normal.norm() <= tolerance * tolerance {
        return Err(FaceError::Collinear);
    }
    Ok(PlanarFace {
        corners: wire.corners,
    })
}

/// Accumulates planar faces and merges them into a shell.
pub struct Sewing {
    tolerance: f64,
    faces: Vec<PlanarFace>,
    rejected: usize,
}

impl Sewing {
    pub fn new(tolerance: f64) -> Self {
        Self {
            tolerance: if tolerance > 0.0 {
                tolerance
            } else {
                DEFAULT_TOLERANCE
            },
            faces: Vec::new(),
            rejected: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }

    /// Build polygon, wire and face for one triangle. Invalid triangles are
    /// counted and reported back, never added.
    pub fn add_triangle(&mut self, corners: [Point3<f64>; 3]) -> Result<(), FaceError> {
        let face = make_polygon(corners, self.tolerance).and_then(|w| make_face(&w, self.tolerance));
        match face {
            Ok(face) => {
                self.faces.push(face);
                Ok(())
            }
            Err(err) => {
                self.rejected += 1;
                Err(err)
            }
        }
    }

    pub fn perform(self) -> (Shell, SewingReport) {
        let mut report = SewingReport {
            faces_skipped: self.rejected,
            ..SewingReport::default()
        };

        let mut points = PointMerger::new(self.tolerance);
        let mut edge_ids: HashMap<(usize, usize), usize> = HashMap::new();
        // Forward and reverse traversals per edge.
        let mut edge_uses: Vec<(usize, usize)> = Vec::new();
        let mut shell = Shell::default();

        for face in &self.faces {
            let ids = face.corners.map(|p| points.id(p));
            if ids[0] == ids[1] || ids[1] == ids[2] || ids[0] == ids[2] {
                // Collapsed by the merge.
                report.faces_skipped += 1;
                continue;
            }

            let mut bound = Vec::with_capacity(3);
            for (a, b) in ids.iter().copied().circular_tuple_windows() {
                let key = if a < b { (a, b) } else { (b, a) };
                let edge = *edge_ids.entry(key).or_insert_with(|| {
                    shell.edges.push(ShellEdge { start: a, end: b });
                    edge_uses.push((0, 0));
                    shell.edges.len() - 1
                });
                let same_sense = shell.edges[edge].start == a;
                if same_sense {
                    edge_uses[edge].0 += 1;
                } else {
                    edge_uses[edge].1 += 1;
                }
                bound.push(OrientedEdge { edge, same_sense });
            }

            let [p0, p1, p2] = face.corners;
            let normal = (p1 - p0).cross(&(p2 - p0)).normalize();
            shell.faces.push(ShellFace {
                vertices: ids,
                bound: [bound[0], bound[1], bound[2]],
                normal,
            });
        }

        shell.points = points.into_points();
        report.faces_added = shell.faces.len();
        for &(forward, reverse) in &edge_uses {
            match forward + reverse {
                1 => report.free_edges += 1,
                2 => {
                    report.shared_edges += 1;
                    if forward != 1 {
                        report.misoriented_edges += 1;
                    }
                }
                _ => report.multiple_edges += 1,
            }
        }
        let volume = enclosed_volume(&shell);
        let scale = extent(&shell.points);
        shell.closed = !shell.faces.is_empty()
            && report.free_edges == 0
            && report.multiple_edges == 0
            && report.misoriented_edges == 0
            && volume.abs() > self.tolerance * scale * scale;
        report.closed = shell.closed;

        debug!(
            faces = report.faces_added,
            skipped = report.faces_skipped,
            free_edges = report.free_edges,
            volume,
            closed = report.closed,
            "sewing done"
        );
        (shell, report)
    }
}

/// Signed volume of the faces, measured from the first point.
fn enclosed_volume(shell: &Shell) -> f64 {
    let Some(origin) = shell.points.first() else {
        return 0.0;
    };
    shell
        .faces
        .iter()
        .map(|face| {
            let [a, b, c] = face.vertices.map(|v| shell.points[v] - origin);
            a.dot(&b.cross(&c))
        })
        .sum::<f64>()
        / 6.0
}

/// Bounding box diagonal.
fn extent(points: &[Point3<f64>]) -> f64 {
    let Some(first) = points.first() else {
        return 0.0;
    };
    let (min, max) = points.iter().fold((*first, *first), |(min, max), p| {
        (min.inf(p), max.sup(p))
    });
    (max - min).norm()
}

/// Snaps points closer than the tolerance onto the first one seen.
struct PointMerger {
    tolerance: f64,
    grid: HashMap<(i64, i64, i64), Vec<usize>>,
    points: Vec<Point3<f64>>,
}

impl PointMerger {
    fn new(tolerance: f64) -> Self {
        Self {
            tolerance,
            grid: HashMap::new(),
            points: Vec::new(),
        }
    }

    fn cell(&self, p: &Point3<f64>) -> (i64, i64, i64) {
        (
            (p.x / self.tolerance).floor() as i64,
            (p.y / self.tolerance).floor() as i64,
            (p.z / self.tolerance).floor() as i64,
        )
    }

    fn id(&mut self, p: Point3<f64>) -> usize {
        let (cx, cy, cz) = self.cell(&p);
        for dx in -1..=1 {
            for dy in -1..=1 {
                for dz in -1..=1 {
                    let neighbour = (
                        cx.saturating_add(dx),
                        cy.saturating_add(dy),
                        cz.saturating_add(dz),
                    );
                    let Some(bucket) = self.grid.get(&neighbour) else {
                        continue;
                    };
                    if let Some(&id) = bucket
                        .iter()
                        .find(|&&id| (self.points[id] - p).norm() <= self.tolerance)
                    {
                        return id;
                    }
                }
            }
        }
        let id = self.points.len();
        self.points.push(p);
        self.grid.entry((cx, cy, cz)).or_default().push(id);
        id
    }

    fn into_points(self) -> Vec<Point3<f64>> {
        self.points
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(x: f64, y: f64, z: f64) -> Point3<f64> {
        Point3::new(x, y, z)
    }

    #[test]
    fn rejects_degenerate_polygons() {
        let mut sewing = Sewing::new(1e-6);
        assert_eq!(
            Err(FaceError::Coincident),
            sewing.add_triangle([p(0.0, 0.0, 0.0), p(0.0, 0.0, 0.0), p(1.0, 0.0, 0.0)])
        );
        assert_eq!(
            Err(FaceError::Collinear),
            sewing.add_triangle([p(0.0, 0.0, 0.0), p(1.0, 0.0, 0.0), p(2.0, 0.0, 0.0)])
        );
        assert!(sewing.is_empty());
        let (shell, report) = sewing.perform();
        assert!(shell.is_empty());
        assert_eq!(2, report.faces_skipped);
    }

    #[test]
    fn merges_points_within_tolerance() {
        let mut sewing = Sewing::new(1e-6);
        sewing
            .add_triangle([p(0.0, 0.0, 0.0), p(1.0, 0.0, 0.0), p(0.0, 1.0, 0.0)])
            .unwrap();
        sewing
            .add_triangle([p(1.0, 5e-7, 0.0), p(1.0, 1.0, 0.0), p(0.0, 1.0, 0.0)])
            .unwrap();
        let (shell, report) = sewing.perform();
        assert_eq!(4, shell.points.len());
        assert_eq!(5, shell.edges.len());
        assert_eq!(1, report.shared_edges);
        assert_eq!(4, report.free_edges);
        assert!(!shell.closed);
    }

    #[test]
    fn doubled_triangle_is_not_a_solid() {
        let mut sewing = Sewing::new(1e-6);
        let (a, b, c) = (p(0.0, 0.0, 0.0), p(1.0, 0.0, 0.0), p(0.0, 1.0, 0.0));
        sewing.add_triangle([a, b, c]).unwrap();
        sewing.add_triangle([a, c, b]).unwrap();
        let (shell, report) = sewing.perform();
        assert_eq!(3, report.shared_edges);
        assert_eq!(0, report.free_edges);
        assert!(!report.closed);
        assert!(!shell.closed);
    }

    #[test]
    fn flipped_face_breaks_closure() {
        let tetra = [
            [p(0.0, 0.0, 0.0), p(0.0, 1.0, 0.0), p(1.0, 0.0, 0.0)],
            [p(0.0, 0.0, 0.0), p(1.0, 0.0, 0.0), p(0.0, 0.0, 1.0)],
            [p(0.0, 0.0, 0.0), p(0.0, 0.0, 1.0), p(0.0, 1.0, 0.0)],
            [p(1.0, 0.0, 0.0), p(0.0, 1.0, 0.0), p(0.0, 0.0, 1.0)],
        ];

        let mut sewing = Sewing::new(1e-6);
        for tri in tetra {
            sewing.add_triangle(tri).unwrap();
        }
        let (_, report) = sewing.perform();
        assert!(report.closed);

        let mut sewing = Sewing::new(1e-6);
        for (i, [a, b, c]) in tetra.into_iter().enumerate() {
            let tri = if i == 3 { [a, c, b] } else { [a, b, c] };
            sewing.add_triangle(tri).unwrap();
        }
        let (shell, report) = sewing.perform();
        assert_eq!(6, report.shared_edges);
        assert_eq!(3, report.misoriented_edges);
        assert!(!shell.closed);
    }

    #[test]
    fn far_from_origin_points_do_not_overflow_the_grid() {
        let mut sewing = Sewing::new(1e-6);
        let base = 1e13;
        sewing
            .add_triangle([p(base, 0.0, 0.0), p(base + 1.0, 0.0, 0.0), p(base, 1.0, 0.0)])
            .unwrap();
        sewing
            .add_triangle([p(base + 1.0, 0.0, 0.0), p(base + 1.0, 1.0, 0.0), p(base, 1.0, 0.0)])
            .unwrap();
        let (shell, report) = sewing.perform();
        assert_eq!(4, shell.points.len());
        assert_eq!(1, report.shared_edges);
    }
}
