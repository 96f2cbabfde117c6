//! STL import/export backed by `stl_io`.
//!
//! Export is always binary. Import accepts ASCII or binary and merges vertices
//! with identical coordinates, so faces that touch share indices.

use crate::geom::{triangle_normal, Vec3};
use crate::model::TriMesh;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use stl_io::{Normal, Triangle, Vertex};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StlError {
    #[error("read STL {path:?}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("write STL {path:?}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub fn read_stl(path: &Path) -> Result<TriMesh, StlError> {
    let read_err = |source| StlError::Read {
        path: path.to_path_buf(),
        source,
    };
    let file = File::open(path).map_err(read_err)?;
    let mut reader = BufReader::new(file);
    let indexed = stl_io::read_stl(&mut reader).map_err(read_err)?;

    let vertices = indexed
        .vertices
        .iter()
        .map(|v| Vec3::new(v[0] as f64, v[1] as f64, v[2] as f64))
        .collect();
    let faces = indexed
        .faces
        .iter()
        .map(|f| {
            [
                f.vertices[0] as u32,
                f.vertices[1] as u32,
                f.vertices[2] as u32,
            ]
        })
        .collect();
    Ok(TriMesh::new(vertices, faces))
}

pub fn write_stl(path: &Path, mesh: &TriMesh) -> Result<(), StlError> {
    let write_err = |source| StlError::Write {
        path: path.to_path_buf(),
        source,
    };

    let triangles = (0..mesh.faces.len())
        .map(|face| {
            let [a, b, c] = mesh.triangle(face);
            let n = triangle_normal(a, b, c)
                .normalized()
                .unwrap_or_else(Vec3::zero);
            Triangle {
                normal: Normal::new(to_f32(n)),
                vertices: [
                    Vertex::new(to_f32(a)),
                    Vertex::new(to_f32(b)),
                    Vertex::new(to_f32(c)),
                ],
            }
        })
        .collect::<Vec<_>>();

    let file = File::create(path).map_err(write_err)?;
    let mut writer = BufWriter::new(file);
    stl_io::write_stl(&mut writer, triangles.iter()).map_err(write_err)?;
    writer.flush().map_err(write_err)?;
    Ok(())
}

fn to_f32(v: Vec3) -> [f32; 3] {
    [v.x as f32, v.y as f32, v.z as f32]
}
