use crate::structs::Shell;
use meshstep_core::geom::Vec3;
use meshstep_core::step::{
    cartesian_point, direction, escape_step_string, f64_step, id_list, product_boilerplate,
    safe_name, LengthUnit, StepHeader, StepWriter,
};
use nalgebra::{Point3, Vector3};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StepWriteError {
    #[error("nothing to transfer: the sewn shape has no faces")]
    NothingToTransfer,
}

/// Serialize a sewn shell as AP214 faceted BRep. Closed shells become a
/// `MANIFOLD_SOLID_BREP`, open ones a `SHELL_BASED_SURFACE_MODEL`.
pub fn write_shell_step(
    shell: &Shell,
    name: &str,
    unit: LengthUnit,
) -> Result<String, StepWriteError> {
    if shell.is_empty() {
        return Err(StepWriteError::NothingToTransfer);
    }
    let timestamp = chrono::Local::now().format("%Y-%m-%dT%H:%M:%S").to_string();
    let mut writer = StepWriter::new();
    let ctx = product_boilerplate(&mut writer, name, unit);

    // Vertices
    let mut point_ids = Vec::with_capacity(shell.points.len());
    let mut vertex_ids = Vec::with_capacity(shell.points.len());
    for p in &shell.points {
        let pid = writer.push(cartesian_point(to_vec3(p)));
        point_ids.push(pid);
        vertex_ids.push(writer.push(format!("VERTEX_POINT('',#{pid})")));
    }

    // Edges
    let mut edge_ids = Vec::with_capacity(shell.edges.len());
    for edge in &shell.edges {
        let a = shell.points[edge.start];
        let b = shell.points[edge.end];
        let delta = b - a;
        let length = delta.norm();
        let dir = delta
            .try_normalize(1e-15)
            .unwrap_or_else(|| Vector3::new(1.0, 0.0, 0.0));

        let dir_id = writer.push(direction(to_vec3_dir(&dir)));
        let vector_id = writer.push(format!("VECTOR('',#{dir_id},{})", f64_step(length)));
        let line_id = writer.push(format!(
            "LINE('',#{},#{vector_id})",
            point_ids[edge.start]
        ));
        edge_ids.push(writer.push(format!(
            "EDGE_CURVE('',#{},#{},#{line_id},.T.)",
            vertex_ids[edge.start], vertex_ids[edge.end]
        )));
    }

    // Faces
    let mut face_ids = Vec::with_capacity(shell.faces.len());
    for face in &shell.faces {
        let oriented = face
            .bound
            .iter()
            .map(|oe| {
                let sense = if oe.same_sense { ".T." } else { ".F." };
                writer.push(format!(
                    "ORIENTED_EDGE('',*,*,#{},{sense})",
                    edge_ids[oe.edge]
                ))
            })
            .collect::<Vec<_>>();
        let loop_id = writer.push(format!("EDGE_LOOP('',{})", id_list(&oriented)));
        let bound_id = writer.push(format!("FACE_OUTER_BOUND('',#{loop_id},.T.)"));

        let origin = shell.points[face.vertices[0]];
        let ref_dir = (shell.points[face.vertices[1]] - origin)
            .try_normalize(1e-15)
            .unwrap_or_else(|| any_perpendicular(&face.normal));
        let origin_id = writer.push(cartesian_point(to_vec3(&origin)));
        let axis_id = writer.push(direction(to_vec3_dir(&face.normal)));
        let ref_id = writer.push(direction(to_vec3_dir(&ref_dir)));
        let placement = writer.push(format!(
            "AXIS2_PLACEMENT_3D('',#{origin_id},#{axis_id},#{ref_id})"
        ));
        let plane = writer.push(format!("PLANE('',#{placement})"));
        face_ids.push(writer.push(format!(
            "ADVANCED_FACE('',(#{bound_id}),#{plane},.T.)"
        )));
    }

    let world_origin = writer.push(cartesian_point(Vec3::zero()));
    let world_z = writer.push(direction(Vec3::new(0.0, 0.0, 1.0)));
    let world_x = writer.push(direction(Vec3::new(1.0, 0.0, 0.0)));
    let world = writer.push(format!(
        "AXIS2_PLACEMENT_3D('',#{world_origin},#{world_z},#{world_x})"
    ));

    let label = escape_step_string(&safe_name(name));
    let representation = if shell.closed {
        let shell_id = writer.push(format!("CLOSED_SHELL('',{})", id_list(&face_ids)));
        let solid = writer.push(format!("MANIFOLD_SOLID_BREP('{label}',#{shell_id})"));
        writer.push(format!(
            "ADVANCED_BREP_SHAPE_REPRESENTATION('',(#{solid},#{world}),#{})",
            ctx.representation_context
        ))
    } else {
        let shell_id = writer.push(format!("OPEN_SHELL('',{})", id_list(&face_ids)));
        let model = writer.push(format!("SHELL_BASED_SURFACE_MODEL('{label}',(#{shell_id}))"));
        writer.push(format!(
            "MANIFOLD_SURFACE_SHAPE_REPRESENTATION('',(#{model},#{world}),#{})",
            ctx.representation_context
        ))
    };
    writer.push(format!(
        "SHAPE_DEFINITION_REPRESENTATION(#{},#{representation})",
        ctx.product_definition_shape
    ));

    Ok(writer.finish(&StepHeader::new(name, timestamp)))
}

fn to_vec3(p: &Point3<f64>) -> Vec3 {
    Vec3::new(p.x, p.y, p.z)
}

fn to_vec3_dir(v: &Vector3<f64>) -> Vec3 {
    Vec3::new(v.x, v.y, v.z)
}

fn any_perpendicular(n: &Vector3<f64>) -> Vector3<f64> {
    let helper = if n.x.abs() < 0.9 {
        Vector3::x()
    } else {
        Vector3::y()
    };
    n.cross(&helper)
        .try_normalize(1e-15)
        .unwrap_or_else(Vector3::x)
}
