use nalgebra::{Point3, Vector3};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShellEdge {
    pub start: usize, // Vertex ID
    pub end: usize,   // Vertex ID
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrientedEdge {
    pub edge: usize,
    /// Traversed start -> end.
    pub same_sense: bool,
}

#[derive(Debug, Clone)]
pub struct ShellFace {
    pub vertices: [usize; 3],
    pub bound: [OrientedEdge; 3],
    pub normal: Vector3<f64>,
}

/// Sewn faceted shell: planar triangles sharing vertices and edges.
#[derive(Debug, Clone, Default)]
pub struct Shell {
    pub points: Vec<Point3<f64>>,
    pub edges: Vec<ShellEdge>,
    pub faces: Vec<ShellFace>,
    pub closed: bool,
}

impl Shell {
    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }
}
