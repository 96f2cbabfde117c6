use crate::geom::{BBox3, Vec3};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MeshError {
    #[error("mesh has no faces")]
    Empty,
    #[error("face {face} references vertex {index} but the mesh has {vertex_count} vertices")]
    InvalidIndex {
        face: usize,
        index: u32,
        vertex_count: usize,
    },
    #[error("vertex {0} has a non-finite coordinate")]
    NonFinite(usize),
}

/// Indexed triangle mesh. Faces are counter-clockwise when seen from outside.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TriMesh {
    pub vertices: Vec<Vec3>,
    pub faces: Vec<[u32; 3]>,
}

impl TriMesh {
    pub fn new(vertices: Vec<Vec3>, faces: Vec<[u32; 3]>) -> Self {
        Self { vertices, faces }
    }

    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }

    pub fn validate(&self) -> Result<(), MeshError> {
        if self.faces.is_empty() {
            return Err(MeshError::Empty);
        }
        let vertex_count = self.vertices.len();
        for (face, tri) in self.faces.iter().enumerate() {
            for &index in tri {
                if index as usize >= vertex_count {
                    return Err(MeshError::InvalidIndex {
                        face,
                        index,
                        vertex_count,
                    });
                }
            }
        }
        if let Some(bad) = self.vertices.iter().position(|v| !v.is_finite()) {
            return Err(MeshError::NonFinite(bad));
        }
        Ok(())
    }

    pub fn triangle(&self, face: usize) -> [Vec3; 3] {
        let [a, b, c] = self.faces[face];
        [
            self.vertices[a as usize],
            self.vertices[b as usize],
            self.vertices[c as usize],
        ]
    }

    pub fn extents(&self) -> Option<BBox3> {
        if self.vertices.is_empty() {
            return None;
        }
        let mut bbox = BBox3::empty();
        for v in &self.vertices {
            bbox.include_point(*v);
        }
        Some(bbox)
    }

    /// Edge use counts keyed by `(min, max)` vertex index.
    pub fn edge_uses(&self) -> HashMap<(u32, u32), usize> {
        let mut uses = HashMap::new();
        for tri in &self.faces {
            for i in 0..3 {
                let a = tri[i];
                let b = tri[(i + 1) % 3];
                *uses.entry(undirected(a, b)).or_insert(0) += 1;
            }
        }
        uses
    }

    pub fn boundary_edge_count(&self) -> usize {
        self.edge_uses().values().filter(|&&n| n == 1).count()
    }

    /// Every edge is shared by exactly two faces.
    pub fn is_watertight(&self) -> bool {
        !self.faces.is_empty() && self.edge_uses().values().all(|&n| n == 2)
    }

    /// Signed volume by the divergence theorem; positive for outward winding.
    pub fn signed_volume(&self) -> f64 {
        let mut vol = 0.0;
        for face in 0..self.faces.len() {
            let [a, b, c] = self.triangle(face);
            vol += a.dot(b.cross(c));
        }
        vol / 6.0
    }

    pub fn stats(&self) -> MeshStats {
        MeshStats {
            vertices: self.vertices.len(),
            faces: self.faces.len(),
            boundary_edges: self.boundary_edge_count(),
            watertight: self.is_watertight(),
        }
    }
}

pub(crate) fn undirected(a: u32, b: u32) -> (u32, u32) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct MeshStats {
    pub vertices: usize,
    pub faces: usize,
    pub boundary_edges: usize,
    pub watertight: bool,
}
