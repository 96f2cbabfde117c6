//! Best-effort mesh cleanup.
//!
//! Every step works on a copy and is adopted only when it succeeds and leaves
//! at least one face, so a failing step never poisons the steps after it.

use crate::geom::Vec3;
use crate::model::{undirected, MeshError, TriMesh};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum RepairError {
    #[error("invalid mesh")]
    Invalid(#[from] MeshError),
    #[error("step left the mesh without faces")]
    Emptied,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RepairConfig {
    pub enabled: bool,
    /// Boundary loops longer than this are left open by the regular pass.
    pub max_hole_edges: usize,
    pub degenerate_area: f64,
    /// Weld, dedupe and fill every hole after the regular pass.
    pub aggressive: bool,
    pub weld_epsilon: f64,
}

impl Default for RepairConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_hole_edges: 64,
            degenerate_area: 1e-12,
            aggressive: true,
            weld_epsilon: 1e-6,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RepairStats {
    pub holes_filled: usize,
    pub faces_flipped: usize,
    pub degenerate_faces_removed: usize,
    pub vertices_welded: usize,
    pub duplicate_faces_removed: usize,
    pub aggressive_applied: bool,
    pub failed_steps: Vec<String>,
}

pub fn repair_in_place(mesh: &mut TriMesh, cfg: &RepairConfig) -> RepairStats {
    let mut stats = RepairStats::default();

    if !mesh.is_watertight() {
        if let Some(n) = guarded("fill_holes", mesh, &mut stats, |m| {
            fill_holes(m, cfg.max_hole_edges)
        }) {
            stats.holes_filled += n;
        }
    }

    if let Some(n) = guarded("fix_normals", mesh, &mut stats, fix_normals) {
        stats.faces_flipped += n;
    }

    if let Some(n) = guarded("remove_degenerate_faces", mesh, &mut stats, |m| {
        remove_degenerate_faces(m, cfg.degenerate_area)
    }) {
        stats.degenerate_faces_removed += n;
    }

    if cfg.aggressive {
        if let Some(agg) = guarded("aggressive_repair", mesh, &mut stats, |m| {
            aggressive_repair(m, cfg)
        }) {
            stats.vertices_welded += agg.vertices_welded;
            stats.duplicate_faces_removed += agg.duplicate_faces_removed;
            stats.holes_filled += agg.holes_filled;
            stats.faces_flipped += agg.faces_flipped;
            stats.aggressive_applied = true;
        }
    }

    stats
}

fn guarded<T>(
    name: &str,
    mesh: &mut TriMesh,
    stats: &mut RepairStats,
    step: impl FnOnce(&mut TriMesh) -> Result<T, RepairError>,
) -> Option<T> {
    let mut work = mesh.clone();
    let result = step(&mut work).and_then(|out| {
        if work.faces.is_empty() {
            Err(RepairError::Emptied)
        } else {
            Ok(out)
        }
    });
    match result {
        Ok(out) => {
            *mesh = work;
            Some(out)
        }
        Err(err) => {
            warn!(step = name, error = %err, "repair step skipped");
            stats.failed_steps.push(name.to_string());
            None
        }
    }
}

/// Capped volume at or below this fraction of the cubed extent counts as none.
const SHEET_VOLUME_RATIO: f64 = 1e-9;

/// Close boundary loops of at most `max_edges` edges. Returns the number of
/// loops filled.
///
/// Caps that would close a component without enclosing any volume are
/// dropped: such a component is an open sheet, and capping it only mirrors
/// the sheet onto itself.
pub fn fill_holes(mesh: &mut TriMesh, max_edges: usize) -> Result<usize, RepairError> {
    mesh.validate()?;
    let loops = boundary_loops(mesh);
    if loops.is_empty() {
        return Ok(0);
    }

    let roots = vertex_components(mesh);
    let mut open_edges: HashMap<u32, usize> = HashMap::new();
    for (&(a, _), &uses) in &mesh.edge_uses() {
        if uses == 1 {
            *open_edges.entry(roots[a as usize]).or_default() += 1;
        }
    }

    let mut by_component: BTreeMap<u32, Vec<Vec<u32>>> = BTreeMap::new();
    for lp in loops {
        if lp.len() > max_edges {
            debug!(edges = lp.len(), "hole larger than limit, left open");
            continue;
        }
        by_component
            .entry(roots[lp[0] as usize])
            .or_default()
            .push(lp);
    }

    let scale = mesh.extents().map(|b| b.diag()).unwrap_or(0.0);
    let mut filled = 0;

    for (root, loops) in by_component {
        let mut new_vertices = Vec::new();
        let mut caps = Vec::new();
        for lp in &loops {
            // Filling faces run against the boundary half-edges.
            if lp.len() == 3 {
                caps.push([lp[0], lp[2], lp[1]]);
                continue;
            }
            let mut centroid = Vec3::zero();
            for &v in lp {
                centroid = centroid + mesh.vertices[v as usize];
            }
            let c = (mesh.vertices.len() + new_vertices.len()) as u32;
            new_vertices.push(centroid * (1.0 / lp.len() as f64));
            for (&a, &b) in lp.iter().zip(lp.iter().cycle().skip(1)) {
                caps.push([b, a, c]);
            }
        }

        let capped_edges: usize = loops.iter().map(Vec::len).sum();
        let closes = open_edges.get(&root).copied().unwrap_or(0) == capped_edges;
        if closes {
            let vertex = |i: u32| {
                mesh.vertices
                    .get(i as usize)
                    .copied()
                    .unwrap_or_else(|| new_vertices[i as usize - mesh.vertices.len()])
            };
            let origin = vertex(loops[0][0]);
            let component_faces = mesh
                .faces
                .iter()
                .filter(|tri| roots[tri[0] as usize] == root);
            let volume: f64 = component_faces
                .chain(caps.iter())
                .map(|&[a, b, c]| {
                    let (a, b, c) = (vertex(a) - origin, vertex(b) - origin, vertex(c) - origin);
                    a.dot(b.cross(c))
                })
                .sum::<f64>()
                / 6.0;
            if volume.abs() <= SHEET_VOLUME_RATIO * scale.powi(3) {
                debug!(loops = loops.len(), "open sheet left uncapped");
                continue;
            }
        }

        mesh.vertices.extend(new_vertices);
        mesh.faces.extend(caps);
        filled += loops.len();
    }

    debug!(filled, "holes filled");
    Ok(filled)
}

/// Union-find root of every vertex, joining vertices that share a face.
fn vertex_components(mesh: &TriMesh) -> Vec<u32> {
    fn find(parent: &mut [u32], mut v: u32) -> u32 {
        while parent[v as usize] != v {
            let grand = parent[parent[v as usize] as usize];
            parent[v as usize] = grand;
            v = grand;
        }
        v
    }

    let mut parent = (0..mesh.vertices.len() as u32).collect::<Vec<_>>();
    for &[a, b, c] in &mesh.faces {
        let ra = find(&mut parent, a);
        for other in [b, c] {
            let ro = find(&mut parent, other);
            if ro != ra {
                parent[ro as usize] = ra;
            }
        }
    }
    (0..mesh.vertices.len() as u32)
        .map(|v| find(&mut parent, v))
        .collect()
}

/// Closed boundary loops, each in the direction of its faces' half-edges.
pub fn boundary_loops(mesh: &TriMesh) -> Vec<Vec<u32>> {
    let uses = mesh.edge_uses();
    let mut outgoing: HashMap<u32, Vec<u32>> = HashMap::new();
    let mut half_edges = Vec::new();
    for tri in &mesh.faces {
        for i in 0..3 {
            let a = tri[i];
            let b = tri[(i + 1) % 3];
            if uses.get(&undirected(a, b)) == Some(&1) {
                outgoing.entry(a).or_default().push(b);
                half_edges.push((a, b));
            }
        }
    }

    let mut used: HashSet<(u32, u32)> = HashSet::new();
    let mut loops = Vec::new();

    for &(start, first) in &half_edges {
        if used.contains(&(start, first)) {
            continue;
        }
        used.insert((start, first));
        let mut lp = vec![start];
        let mut current = first;
        let mut closed = false;

        for _ in 0..half_edges.len() {
            if current == start {
                closed = true;
                break;
            }
            lp.push(current);
            let next = outgoing
                .get(&current)
                .and_then(|targets| targets.iter().find(|&&t| !used.contains(&(current, t))))
                .copied();
            let Some(next) = next else {
                break;
            };
            used.insert((current, next));
            current = next;
        }

        if closed && lp.len() >= 3 {
            loops.push(lp);
        } else {
            warn!(start, "boundary loop does not close, skipped");
        }
    }

    loops
}

/// Make winding consistent across shared edges and point closed components
/// outward. Returns the number of faces flipped.
pub fn fix_normals(mesh: &mut TriMesh) -> Result<usize, RepairError> {
    mesh.validate()?;

    let mut edge_faces: HashMap<(u32, u32), Vec<usize>> = HashMap::new();
    for (fi, tri) in mesh.faces.iter().enumerate() {
        for i in 0..3 {
            edge_faces
                .entry(undirected(tri[i], tri[(i + 1) % 3]))
                .or_default()
                .push(fi);
        }
    }

    let mut visited = vec![false; mesh.faces.len()];
    let mut flipped = vec![false; mesh.faces.len()];

    for seed in 0..mesh.faces.len() {
        if visited[seed] {
            continue;
        }
        visited[seed] = true;
        let mut component = vec![seed];
        let mut queue = VecDeque::from([seed]);

        while let Some(fi) = queue.pop_front() {
            let tri = mesh.faces[fi];
            for i in 0..3 {
                let (a, b) = (tri[i], tri[(i + 1) % 3]);
                let Some(neighbors) = edge_faces.get(&undirected(a, b)) else {
                    continue;
                };
                if neighbors.len() != 2 {
                    continue;
                }
                for &nj in neighbors {
                    if nj == fi || visited[nj] {
                        continue;
                    }
                    visited[nj] = true;
                    // A consistent neighbour walks the shared edge as b -> a.
                    if has_half_edge(mesh.faces[nj], a, b) {
                        mesh.faces[nj].swap(1, 2);
                        flipped[nj] = !flipped[nj];
                    }
                    component.push(nj);
                    queue.push_back(nj);
                }
            }
        }

        if component_is_closed(&component, mesh, &edge_faces)
            && component_volume(&component, mesh) < 0.0
        {
            for &fi in &component {
                mesh.faces[fi].swap(1, 2);
                flipped[fi] = !flipped[fi];
            }
        }
    }

    Ok(flipped.iter().filter(|&&f| f).count())
}

fn has_half_edge(tri: [u32; 3], a: u32, b: u32) -> bool {
    (0..3).any(|i| tri[i] == a && tri[(i + 1) % 3] == b)
}

fn component_is_closed(
    component: &[usize],
    mesh: &TriMesh,
    edge_faces: &HashMap<(u32, u32), Vec<usize>>,
) -> bool {
    component.iter().all(|&fi| {
        let tri = mesh.faces[fi];
        (0..3).all(|i| {
            edge_faces
                .get(&undirected(tri[i], tri[(i + 1) % 3]))
                .is_some_and(|faces| faces.len() == 2)
        })
    })
}

/// Measured from the component's first vertex so far-off meshes keep precision.
fn component_volume(component: &[usize], mesh: &TriMesh) -> f64 {
    let Some(&first) = component.first() else {
        return 0.0;
    };
    let origin = mesh.triangle(first)[0];
    component
        .iter()
        .map(|&fi| {
            let [a, b, c] = mesh.triangle(fi);
            (a - origin).dot((b - origin).cross(c - origin))
        })
        .sum::<f64>()
        / 6.0
}

/// Drop faces with repeated indices or an area at or below `min_area`.
pub fn remove_degenerate_faces(mesh: &mut TriMesh, min_area: f64) -> Result<usize, RepairError> {
    mesh.validate()?;
    let before = mesh.faces.len();
    let vertices = &mesh.vertices;
    mesh.faces.retain(|&[a, b, c]| {
        if a == b || b == c || a == c {
            return false;
        }
        let area = crate::geom::triangle_area(
            vertices[a as usize],
            vertices[b as usize],
            vertices[c as usize],
        );
        area > min_area
    });
    Ok(before - mesh.faces.len())
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AggressiveStats {
    pub vertices_welded: usize,
    pub duplicate_faces_removed: usize,
    pub holes_filled: usize,
    pub faces_flipped: usize,
}

/// Weld near-coincident vertices, drop duplicate and collapsed faces, compact
/// the vertex list and close every remaining hole.
pub fn aggressive_repair(
    mesh: &mut TriMesh,
    cfg: &RepairConfig,
) -> Result<AggressiveStats, RepairError> {
    mesh.validate()?;
    let mut stats = AggressiveStats::default();

    let remap = weld_map(&mesh.vertices, cfg.weld_epsilon);
    let distinct = remap.iter().collect::<HashSet<_>>().len();
    stats.vertices_welded = mesh.vertices.len() - distinct;

    let mut seen: HashSet<[u32; 3]> = HashSet::new();
    let mut faces = Vec::with_capacity(mesh.faces.len());
    for tri in &mesh.faces {
        let t = [
            remap[tri[0] as usize],
            remap[tri[1] as usize],
            remap[tri[2] as usize],
        ];
        if t[0] == t[1] || t[1] == t[2] || t[0] == t[2] {
            continue;
        }
        let mut key = t;
        key.sort_unstable();
        if !seen.insert(key) {
            stats.duplicate_faces_removed += 1;
            continue;
        }
        faces.push(t);
    }
    mesh.faces = faces;
    compact_vertices(mesh);

    if mesh.faces.is_empty() {
        return Err(RepairError::Emptied);
    }
    if !mesh.is_watertight() {
        stats.holes_filled = fill_holes(mesh, usize::MAX)?;
    }
    stats.faces_flipped = fix_normals(mesh)?;
    Ok(stats)
}

/// Map each vertex to the first vertex within `eps` of it. A non-positive
/// `eps` welds nothing.
fn weld_map(vertices: &[Vec3], eps: f64) -> Vec<u32> {
    if !(eps.is_finite() && eps > 0.0) {
        return (0..vertices.len() as u32).collect();
    }
    let cell = eps;
    // `as` saturates, so far-off points share an edge cell; distances still decide.
    let key = |v: Vec3| {
        (
            (v.x / cell).floor() as i64,
            (v.y / cell).floor() as i64,
            (v.z / cell).floor() as i64,
        )
    };

    let mut grid: HashMap<(i64, i64, i64), Vec<u32>> = HashMap::new();
    let mut remap = Vec::with_capacity(vertices.len());

    for (i, &v) in vertices.iter().enumerate() {
        let (kx, ky, kz) = key(v);
        let mut found = None;
        'search: for dx in -1..=1 {
            for dy in -1..=1 {
                for dz in -1..=1 {
                    let neighbour = (
                        kx.saturating_add(dx),
                        ky.saturating_add(dy),
                        kz.saturating_add(dz),
                    );
                    if let Some(bucket) = grid.get(&neighbour) {
                        if let Some(&rep) = bucket
                            .iter()
                            .find(|&&r| vertices[r as usize].distance(v) <= eps)
                        {
                            found = Some(rep);
                            break 'search;
                        }
                    }
                }
            }
        }
        let rep = found.unwrap_or_else(|| {
            grid.entry((kx, ky, kz)).or_default().push(i as u32);
            i as u32
        });
        remap.push(rep);
    }
    remap
}

fn compact_vertices(mesh: &mut TriMesh) {
    let mut new_index: HashMap<u32, u32> = HashMap::new();
    let mut vertices = Vec::new();
    for tri in &mut mesh.faces {
        for idx in tri.iter_mut() {
            let next = vertices.len() as u32;
            let mapped = *new_index.entry(*idx).or_insert_with(|| {
                vertices.push(mesh.vertices[*idx as usize]);
                next
            });
            *idx = mapped;
        }
    }
    mesh.vertices = vertices;
}
