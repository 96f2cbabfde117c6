use meshstep_core::geom::Vec3;
use meshstep_core::model::TriMesh;
use meshstep_gltf::{export_glb, import_gltf};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};

/// Hand-assembled GLB with caller-supplied scenes, nodes and meshes.
#[derive(Default)]
struct Fixture {
    bin: Vec<u8>,
    views: Vec<Value>,
    accessors: Vec<Value>,
}

impl Fixture {
    fn view(&mut self, bytes: &[u8]) -> usize {
        self.views.push(json!({
            "buffer": 0,
            "byteOffset": self.bin.len(),
            "byteLength": bytes.len(),
        }));
        self.bin.extend_from_slice(bytes);
        self.views.len() - 1
    }

    fn positions(&mut self, points: &[[f32; 3]]) -> usize {
        let mut min = [f32::INFINITY; 3];
        let mut max = [f32::NEG_INFINITY; 3];
        let mut bytes = Vec::new();
        for p in points {
            for axis in 0..3 {
                min[axis] = min[axis].min(p[axis]);
                max[axis] = max[axis].max(p[axis]);
                bytes.extend_from_slice(&p[axis].to_le_bytes());
            }
        }
        let view = self.view(&bytes);
        self.accessors.push(json!({
            "bufferView": view,
            "componentType": 5126,
            "count": points.len(),
            "type": "VEC3",
            "min": min,
            "max": max,
        }));
        self.accessors.len() - 1
    }

    fn indices(&mut self, indices: &[u32]) -> usize {
        let bytes = indices
            .iter()
            .flat_map(|i| i.to_le_bytes())
            .collect::<Vec<_>>();
        let view = self.view(&bytes);
        self.accessors.push(json!({
            "bufferView": view,
            "componentType": 5125,
            "count": indices.len(),
            "type": "SCALAR",
        }));
        self.accessors.len() - 1
    }

    fn write(self, dir: &Path, file_name: &str, mut doc: Value) -> PathBuf {
        doc["asset"] = json!({ "version": "2.0" });
        doc["buffers"] = json!([{ "byteLength": self.bin.len() }]);
        doc["bufferViews"] = Value::Array(self.views);
        doc["accessors"] = Value::Array(self.accessors);

        let mut json = serde_json::to_vec(&doc).unwrap();
        while json.len() % 4 != 0 {
            json.push(b' ');
        }
        let bin = self.bin;
        let total = 12 + 8 + json.len() + 8 + bin.len();
        let mut out = Vec::with_capacity(total);
        out.extend_from_slice(b"glTF");
        out.extend_from_slice(&2u32.to_le_bytes());
        out.extend_from_slice(&(total as u32).to_le_bytes());
        out.extend_from_slice(&(json.len() as u32).to_le_bytes());
        out.extend_from_slice(b"JSON");
        out.extend_from_slice(&json);
        out.extend_from_slice(&(bin.len() as u32).to_le_bytes());
        out.extend_from_slice(b"BIN\0");
        out.extend_from_slice(&bin);

        let path = dir.join(file_name);
        std::fs::write(&path, out).unwrap();
        path
    }
}

const TRIANGLE: [[f32; 3]; 3] = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];

/// Fixture with one indexed triangle as mesh 0.
fn one_triangle() -> (Fixture, Value) {
    let mut fixture = Fixture::default();
    let positions = fixture.positions(&TRIANGLE);
    let indices = fixture.indices(&[0, 1, 2]);
    let meshes = json!([{
        "primitives": [{ "attributes": { "POSITION": positions }, "indices": indices }],
    }]);
    (fixture, meshes)
}

fn cube() -> TriMesh {
    TriMesh::new(
        vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(1.0, 1.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
            Vec3::new(0.0, 0.0, 1.0),
            Vec3::new(1.0, 0.0, 1.0),
            Vec3::new(1.0, 1.0, 1.0),
            Vec3::new(0.0, 1.0, 1.0),
        ],
        vec![
            [0, 2, 1],
            [0, 3, 2],
            [4, 5, 6],
            [4, 6, 7],
            [0, 1, 5],
            [0, 5, 4],
            [3, 7, 6],
            [3, 6, 2],
            [0, 4, 7],
            [0, 7, 3],
            [1, 2, 6],
            [1, 6, 5],
        ],
    )
}

#[test]
fn exported_glb_imports_back() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("chair.glb");
    let mesh = cube();
    export_glb(&path, &mesh, "chair").unwrap();

    let bytes = std::fs::read(&path).unwrap();
    assert_eq!(b"glTF", &bytes[..4]);
    assert_eq!(0, bytes.len() % 4);

    let back = import_gltf(&path).unwrap();
    assert_eq!(mesh, back);
    assert!(back.is_watertight());
}

#[test]
fn mesh_without_faces_imports_as_empty() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.glb");
    export_glb(&path, &TriMesh::default(), "empty").unwrap();

    let mesh = import_gltf(&path).unwrap();
    assert!(mesh.is_empty());
}

#[test]
fn garbage_file_is_a_load_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.glb");
    std::fs::write(&path, b"not a gltf file").unwrap();
    let err = import_gltf(&path).unwrap_err();
    assert!(format!("{err}").contains("broken.glb"));
}

#[test]
fn node_transforms_compose_down_the_hierarchy() {
    let dir = tempfile::tempdir().unwrap();
    let (fixture, meshes) = one_triangle();
    let path = fixture.write(
        dir.path(),
        "nested.glb",
        json!({
            "scene": 0,
            "scenes": [{ "nodes": [0] }],
            "nodes": [
                { "translation": [10.0, 0.0, 0.0], "children": [1] },
                { "translation": [0.0, 5.0, 0.0], "mesh": 0 },
            ],
            "meshes": meshes,
        }),
    );

    let mesh = import_gltf(&path).unwrap();
    assert_eq!(
        vec![
            Vec3::new(10.0, 5.0, 0.0),
            Vec3::new(11.0, 5.0, 0.0),
            Vec3::new(10.0, 6.0, 0.0),
        ],
        mesh.vertices
    );
    assert_eq!(vec![[0, 1, 2]], mesh.faces);
}

#[test]
fn mirrored_node_keeps_faces_outward() {
    let dir = tempfile::tempdir().unwrap();
    let (fixture, meshes) = one_triangle();
    let path = fixture.write(
        dir.path(),
        "mirrored.glb",
        json!({
            "scene": 0,
            "scenes": [{ "nodes": [0] }],
            "nodes": [{ "scale": [-1.0, 1.0, 1.0], "mesh": 0 }],
            "meshes": meshes,
        }),
    );

    let mesh = import_gltf(&path).unwrap();
    assert_eq!(Vec3::new(-1.0, 0.0, 0.0), mesh.vertices[1]);
    assert_eq!(vec![[0, 2, 1]], mesh.faces);
}

#[test]
fn unindexed_primitive_uses_vertex_order() {
    let dir = tempfile::tempdir().unwrap();
    let mut fixture = Fixture::default();
    let positions = fixture.positions(&[
        [0.0, 0.0, 0.0],
        [1.0, 0.0, 0.0],
        [0.0, 1.0, 0.0],
        [0.0, 0.0, 1.0],
        [1.0, 0.0, 1.0],
        [0.0, 1.0, 1.0],
    ]);
    let path = fixture.write(
        dir.path(),
        "soup.glb",
        json!({
            "scene": 0,
            "scenes": [{ "nodes": [0] }],
            "nodes": [{ "mesh": 0 }],
            "meshes": [{ "primitives": [{ "attributes": { "POSITION": positions } }] }],
        }),
    );

    let mesh = import_gltf(&path).unwrap();
    assert_eq!(6, mesh.vertices.len());
    assert_eq!(vec![[0, 1, 2], [3, 4, 5]], mesh.faces);
}

#[test]
fn first_scene_is_used_without_a_default() {
    let dir = tempfile::tempdir().unwrap();
    let (fixture, meshes) = one_triangle();
    let path = fixture.write(
        dir.path(),
        "scenes.glb",
        json!({
            "scenes": [{ "nodes": [0] }, { "nodes": [1] }],
            "nodes": [
                { "translation": [0.0, 0.0, 1.0], "mesh": 0 },
                { "mesh": 0 },
            ],
            "meshes": meshes,
        }),
    );

    let mesh = import_gltf(&path).unwrap();
    assert_eq!(3, mesh.vertices.len());
    assert!(mesh.vertices.iter().all(|v| v.z == 1.0));
}

#[test]
fn sceneless_file_imports_meshes_untransformed() {
    let dir = tempfile::tempdir().unwrap();
    let (fixture, meshes) = one_triangle();
    let path = fixture.write(
        dir.path(),
        "sceneless.glb",
        json!({
            "nodes": [{ "translation": [7.0, 0.0, 0.0], "mesh": 0 }],
            "meshes": meshes,
        }),
    );

    let mesh = import_gltf(&path).unwrap();
    let expected = TRIANGLE
        .iter()
        .map(|p| Vec3::new(p[0] as f64, p[1] as f64, p[2] as f64))
        .collect::<Vec<_>>();
    assert_eq!(expected, mesh.vertices);
    assert_eq!(vec![[0, 1, 2]], mesh.faces);
}

#[test]
fn point_and_line_primitives_are_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let mut fixture = Fixture::default();
    let positions = fixture.positions(&TRIANGLE);
    let indices = fixture.indices(&[0, 1, 2]);
    let path = fixture.write(
        dir.path(),
        "mixed.glb",
        json!({
            "scene": 0,
            "scenes": [{ "nodes": [0] }],
            "nodes": [{ "mesh": 0 }],
            "meshes": [{
                "primitives": [
                    { "attributes": { "POSITION": positions }, "mode": 1 },
                    { "attributes": { "POSITION": positions }, "mode": 0 },
                    { "attributes": { "POSITION": positions }, "indices": indices, "mode": 4 },
                ],
            }],
        }),
    );

    let mesh = import_gltf(&path).unwrap();
    assert_eq!(3, mesh.vertices.len());
    assert_eq!(vec![[0, 1, 2]], mesh.faces);
}
