//! GLB/GLTF mesh import and a minimal binary glTF export.
//!
//! Import flattens the default scene into one triangle mesh: node transforms
//! are composed down the hierarchy and every triangle primitive is appended.
//! Point and line primitives are ignored.

use meshstep_core::geom::Vec3;
use meshstep_core::model::TriMesh;
use nalgebra::{Matrix4, Vector4};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum GltfError {
    #[error("load glTF: {path:?}")]
    Load {
        path: PathBuf,
        #[source]
        source: gltf::Error,
    },
    #[error("primitive {primitive} of mesh {mesh} references vertex {index} (has {count})")]
    InvalidIndex {
        mesh: usize,
        primitive: usize,
        index: u32,
        count: usize,
    },
    #[error("write GLB: {path:?}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("serialize glTF JSON")]
    Json(#[from] serde_json::Error),
}

const MAX_NODE_DEPTH: usize = 64;

pub fn import_gltf(path: &Path) -> Result<TriMesh, GltfError> {
    let load_err = |source| GltfError::Load {
        path: path.to_path_buf(),
        source,
    };
    let gltf::Gltf { document, blob } = gltf::Gltf::open(path).map_err(load_err)?;
    let buffers = gltf::import_buffers(&document, path.parent(), blob).map_err(load_err)?;

    let mut importer = GltfImporter::new(&buffers);
    match document.default_scene().or_else(|| document.scenes().next()) {
        Some(scene) => {
            for node in scene.nodes() {
                importer.import_node(&node, &Matrix4::identity(), 0)?;
            }
        }
        None => {
            debug!("glTF has no scene, importing meshes untransformed");
            for mesh in document.meshes() {
                importer.import_mesh(&mesh, &Matrix4::identity())?;
            }
        }
    }

    debug!(
        vertices = importer.mesh.vertices.len(),
        faces = importer.mesh.faces.len(),
        "imported glTF"
    );
    Ok(importer.mesh)
}

struct GltfImporter<'a> {
    buffers: &'a [gltf::buffer::Data],
    mesh: TriMesh,
}

impl<'a> GltfImporter<'a> {
    fn new(buffers: &'a [gltf::buffer::Data]) -> Self {
        Self {
            buffers,
            mesh: TriMesh::default(),
        }
    }

    fn import_node(
        &mut self,
        node: &gltf::Node<'_>,
        parent_tx: &Matrix4<f64>,
        depth: usize,
    ) -> Result<(), GltfError> {
        if depth > MAX_NODE_DEPTH {
            warn!(node = node.index(), "node hierarchy too deep, truncated");
            return Ok(());
        }
        let local = Matrix4::<f32>::from(node.transform().matrix()).cast::<f64>();
        let tx = parent_tx * local;

        if let Some(mesh) = node.mesh() {
            self.import_mesh(&mesh, &tx)?;
        }
        for child in node.children() {
            self.import_node(&child, &tx, depth + 1)?;
        }
        Ok(())
    }

    fn import_mesh(&mut self, mesh: &gltf::Mesh<'_>, tx: &Matrix4<f64>) -> Result<(), GltfError> {
        // Mirroring transforms turn the winding inside out.
        let mirrored = tx.fixed_view::<3, 3>(0, 0).into_owned().determinant() < 0.0;

        for primitive in mesh.primitives() {
            let buffers = self.buffers;
            let reader =
                primitive.reader(|buffer| buffers.get(buffer.index()).map(|d| d.0.as_slice()));
            let Some(positions) = reader.read_positions() else {
                warn!(
                    mesh = mesh.index(),
                    primitive = primitive.index(),
                    "primitive without positions skipped"
                );
                continue;
            };
            let positions = positions.collect::<Vec<_>>();
            let indices = match reader.read_indices() {
                Some(indices) => indices.into_u32().collect::<Vec<_>>(),
                None => (0..positions.len() as u32).collect(),
            };
            if let Some(&bad) = indices.iter().find(|&&i| i as usize >= positions.len()) {
                return Err(GltfError::InvalidIndex {
                    mesh: mesh.index(),
                    primitive: primitive.index(),
                    index: bad,
                    count: positions.len(),
                });
            }

            let triangles = match triangulate(primitive.mode(), &indices) {
                Some(t) => t,
                None => {
                    debug!(mode = ?primitive.mode(), "non-triangle primitive skipped");
                    continue;
                }
            };

            let base = self.mesh.vertices.len() as u32;
            self.mesh.vertices.extend(positions.iter().map(|p| {
                let v = tx * Vector4::new(p[0] as f64, p[1] as f64, p[2] as f64, 1.0);
                Vec3::new(v.x, v.y, v.z)
            }));
            self.mesh.faces.extend(triangles.into_iter().map(|[a, b, c]| {
                if mirrored {
                    [base + a, base + c, base + b]
                } else {
                    [base + a, base + b, base + c]
                }
            }));
        }
        Ok(())
    }
}

fn triangulate(mode: gltf::mesh::Mode, indices: &[u32]) -> Option<Vec<[u32; 3]>> {
    use gltf::mesh::Mode;
    let n = indices.len();
    let tris = match mode {
        Mode::Triangles => indices
            .chunks_exact(3)
            .map(|c| [c[0], c[1], c[2]])
            .collect(),
        Mode::TriangleStrip => (0..n.saturating_sub(2))
            .map(|i| {
                if i % 2 == 0 {
                    [indices[i], indices[i + 1], indices[i + 2]]
                } else {
                    [indices[i + 1], indices[i], indices[i + 2]]
                }
            })
            .collect(),
        Mode::TriangleFan => (1..n.saturating_sub(1))
            .map(|i| [indices[0], indices[i], indices[i + 1]])
            .collect(),
        Mode::Points | Mode::Lines | Mode::LineLoop | Mode::LineStrip => return None,
    };
    Some(tris)
}

const GLB_MAGIC: &[u8; 4] = b"glTF";
const CHUNK_JSON: u32 = 0x4E4F_534A;
const CHUNK_BIN: u32 = 0x004E_4942;

/// Write `mesh` as a single-node binary glTF. A mesh without faces produces a
/// scene whose only node carries no geometry.
pub fn export_glb(path: &Path, mesh: &TriMesh, name: &str) -> Result<(), GltfError> {
    let mut bin = Vec::new();
    let json = if mesh.faces.is_empty() {
        serde_json::json!({
            "asset": { "version": "2.0", "generator": "meshstep" },
            "scene": 0,
            "scenes": [{ "nodes": [0] }],
            "nodes": [{ "name": name }],
        })
    } else {
        let mut min = [f32::INFINITY; 3];
        let mut max = [f32::NEG_INFINITY; 3];
        for v in &mesh.vertices {
            let p = [v.x as f32, v.y as f32, v.z as f32];
            for axis in 0..3 {
                min[axis] = min[axis].min(p[axis]);
                max[axis] = max[axis].max(p[axis]);
            }
            for c in p {
                bin.extend_from_slice(&c.to_le_bytes());
            }
        }
        let positions_len = bin.len();
        for tri in &mesh.faces {
            for i in tri {
                bin.extend_from_slice(&i.to_le_bytes());
            }
        }
        let indices_len = bin.len() - positions_len;

        serde_json::json!({
            "asset": { "version": "2.0", "generator": "meshstep" },
            "scene": 0,
            "scenes": [{ "nodes": [0] }],
            "nodes": [{ "name": name, "mesh": 0 }],
            "meshes": [{
                "name": name,
                "primitives": [{ "attributes": { "POSITION": 0 }, "indices": 1, "mode": 4 }],
            }],
            "buffers": [{ "byteLength": bin.len() }],
            "bufferViews": [
                { "buffer": 0, "byteOffset": 0, "byteLength": positions_len, "target": 34962 },
                { "buffer": 0, "byteOffset": positions_len, "byteLength": indices_len, "target": 34963 },
            ],
            "accessors": [
                {
                    "bufferView": 0,
                    "componentType": 5126,
                    "count": mesh.vertices.len(),
                    "type": "VEC3",
                    "min": min,
                    "max": max,
                },
                {
                    "bufferView": 1,
                    "componentType": 5125,
                    "count": mesh.faces.len() * 3,
                    "type": "SCALAR",
                },
            ],
        })
    };

    let mut json = serde_json::to_vec(&json)?;
    while json.len() % 4 != 0 {
        json.push(b' ');
    }
    while bin.len() % 4 != 0 {
        bin.push(0);
    }

    let mut total = 12 + 8 + json.len();
    if !bin.is_empty() {
        total += 8 + bin.len();
    }
    let mut out = Vec::with_capacity(total);
    out.extend_from_slice(GLB_MAGIC);
    out.extend_from_slice(&2u32.to_le_bytes());
    out.extend_from_slice(&(total as u32).to_le_bytes());
    out.extend_from_slice(&(json.len() as u32).to_le_bytes());
    out.extend_from_slice(&CHUNK_JSON.to_le_bytes());
    out.extend_from_slice(&json);
    if !bin.is_empty() {
        out.extend_from_slice(&(bin.len() as u32).to_le_bytes());
        out.extend_from_slice(&CHUNK_BIN.to_le_bytes());
        out.extend_from_slice(&bin);
    }

    std::fs::write(path, out).map_err(|source| GltfError::Write {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use gltf::mesh::Mode;

    #[test]
    fn strips_alternate_winding() {
        let tris = triangulate(Mode::TriangleStrip, &[0, 1, 2, 3]).unwrap();
        assert_eq!(vec![[0, 1, 2], [2, 1, 3]], tris);
    }

    #[test]
    fn fans_share_first_vertex() {
        let tris = triangulate(Mode::TriangleFan, &[0, 1, 2, 3]).unwrap();
        assert_eq!(vec![[0, 1, 2], [0, 2, 3]], tris);
    }

    #[test]
    fn lines_are_not_triangulated() {
        assert!(triangulate(Mode::Lines, &[0, 1]).is_none());
        assert!(triangulate(Mode::Triangles, &[0, 1]).unwrap().is_empty());
    }
}
