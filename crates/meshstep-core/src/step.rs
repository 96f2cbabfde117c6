//! ISO 10303-21 (STEP) text assembly.
//!
//! `StepWriter` hands out entity ids in push order; the AP214 product and
//! representation-context boilerplate lives here so geometry writers only
//! deal with their own entities.

use crate::geom::Vec3;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

pub const STEP_MAGIC: &str = "ISO-10303-21;";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum LengthUnit {
    #[default]
    Millimeters,
    Centimeters,
    Meters,
}

#[derive(Debug, Clone)]
pub struct StepHeader {
    pub description: String,
    pub file_name: String,
    pub timestamp: String,
    pub author: String,
    pub originating_system: String,
}

impl StepHeader {
    pub fn new(name: &str, timestamp: impl Into<String>) -> Self {
        Self {
            description: "meshstep faceted brep".to_string(),
            file_name: format!("{}.step", safe_name(name)),
            timestamp: timestamp.into(),
            author: String::new(),
            originating_system: "meshstep".to_string(),
        }
    }
}

pub struct StepWriter {
    next_id: u32,
    lines: Vec<String>,
}

impl Default for StepWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl StepWriter {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            lines: Vec::new(),
        }
    }

    pub fn push(&mut self, entity: String) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        self.lines.push(format!("#{id}={entity};"));
        id
    }

    pub fn finish(self, header: &StepHeader) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{STEP_MAGIC}");
        let _ = writeln!(out, "HEADER;");
        let _ = writeln!(
            out,
            "FILE_DESCRIPTION(('{}'),'2;1');",
            escape_step_string(&header.description)
        );
        let _ = writeln!(
            out,
            "FILE_NAME('{}','{}',('{}'),(''),'{}','{}','');",
            escape_step_string(&header.file_name),
            escape_step_string(&header.timestamp),
            escape_step_string(&header.author),
            escape_step_string(&header.originating_system),
            escape_step_string(&header.originating_system),
        );
        let _ = writeln!(
            out,
            "FILE_SCHEMA(('AUTOMOTIVE_DESIGN {{ 1 0 10303 214 1 1 1 1 }}'));"
        );
        let _ = writeln!(out, "ENDSEC;");
        let _ = writeln!(out, "DATA;");
        for line in self.lines {
            let _ = writeln!(out, "{line}");
        }
        let _ = writeln!(out, "ENDSEC;");
        let _ = writeln!(out, "END-ISO-10303-21;");
        out
    }
}

/// Ids a shape representation needs to hook into the product structure.
#[derive(Debug, Clone, Copy)]
pub struct ProductIds {
    pub product_definition_shape: u32,
    pub representation_context: u32,
}

pub fn product_boilerplate(writer: &mut StepWriter, name: &str, unit: LengthUnit) -> ProductIds {
    let name = escape_step_string(&safe_name(name));

    let app_ctx = writer.push(
        "APPLICATION_CONTEXT('core data for automotive mechanical design processes')".to_string(),
    );
    writer.push(format!(
        "APPLICATION_PROTOCOL_DEFINITION('international standard','automotive_design',2000,#{app_ctx})"
    ));
    let prod_def_ctx = writer.push(format!(
        "PRODUCT_DEFINITION_CONTEXT('part definition',#{app_ctx},'design')"
    ));
    let prod_ctx = writer.push(format!("PRODUCT_CONTEXT('',#{app_ctx},'mechanical')"));
    let product = writer.push(format!("PRODUCT('{name}','{name}','',(#{prod_ctx}))"));
    writer.push(format!(
        "PRODUCT_RELATED_PRODUCT_CATEGORY('part',$,(#{product}))"
    ));
    let prod_def_form = writer.push(format!(
        "PRODUCT_DEFINITION_FORMATION_WITH_SPECIFIED_SOURCE('','',#{product},.NOT_KNOWN.)"
    ));
    let prod_def = writer.push(format!(
        "PRODUCT_DEFINITION('design','',#{prod_def_form},#{prod_def_ctx})"
    ));
    let product_definition_shape =
        writer.push(format!("PRODUCT_DEFINITION_SHAPE('','',#{prod_def})"));

    let (len_unit, plane_unit, solid_unit) = units(unit);
    let len_unit = writer.push(len_unit);
    let plane_unit = writer.push(plane_unit);
    let solid_unit = writer.push(solid_unit);
    let uncertainty = writer.push(format!(
        "UNCERTAINTY_MEASURE_WITH_UNIT(LENGTH_MEASURE(1.E-07),#{len_unit},'distance_accuracy_value','confusion accuracy')"
    ));
    let representation_context = writer.push(format!(
        "(GEOMETRIC_REPRESENTATION_CONTEXT(3)GLOBAL_UNCERTAINTY_ASSIGNED_CONTEXT((#{uncertainty}))GLOBAL_UNIT_ASSIGNED_CONTEXT((#{len_unit},#{plane_unit},#{solid_unit}))REPRESENTATION_CONTEXT('Context #1','3D Context with UNIT and UNCERTAINTY'))"
    ));

    ProductIds {
        product_definition_shape,
        representation_context,
    }
}

pub fn safe_name(name: &str) -> String {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        "meshstep".to_string()
    } else {
        trimmed.to_string()
    }
}

pub fn escape_step_string(s: &str) -> String {
    s.replace('\'', "''")
}

/// STEP real literal carrying the shortest text that round-trips `v`.
pub fn f64_step(v: f64) -> String {
    if !v.is_finite() || v == 0.0 {
        return "0.".to_string();
    }
    let text = format!("{v:?}");
    let (mantissa, exponent) = match text.split_once('e') {
        Some((m, e)) => (m, Some(e)),
        None => (text.as_str(), None),
    };
    let mut out = mantissa.to_string();
    if !out.contains('.') {
        out.push('.');
    }
    if let Some(exp) = exponent {
        out.push('E');
        out.push_str(exp);
    }
    out
}

pub fn cartesian_point(p: Vec3) -> String {
    format!(
        "CARTESIAN_POINT('',({},{},{}))",
        f64_step(p.x),
        f64_step(p.y),
        f64_step(p.z)
    )
}

pub fn direction(d: Vec3) -> String {
    format!(
        "DIRECTION('',({},{},{}))",
        f64_step(d.x),
        f64_step(d.y),
        f64_step(d.z)
    )
}

pub fn id_list(ids: &[u32]) -> String {
    let mut out = String::new();
    for (i, id) in ids.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        let _ = write!(out, "#{id}");
    }
    format!("({out})")
}

fn units(unit: LengthUnit) -> (String, String, String) {
    let len = match unit {
        LengthUnit::Meters => "(LENGTH_UNIT()NAMED_UNIT(*)SI_UNIT($,.METRE.))",
        LengthUnit::Centimeters => "(LENGTH_UNIT()NAMED_UNIT(*)SI_UNIT(.CENTI.,.METRE.))",
        LengthUnit::Millimeters => "(LENGTH_UNIT()NAMED_UNIT(*)SI_UNIT(.MILLI.,.METRE.))",
    };
    (
        len.to_string(),
        "(NAMED_UNIT(*)PLANE_ANGLE_UNIT()SI_UNIT($,.RADIAN.))".to_string(),
        "(NAMED_UNIT(*)SOLID_ANGLE_UNIT()SI_UNIT($,.STERADIAN.))".to_string(),
    )
}

/// Cheap structural check: magic line, header and data sections, trailer.
pub fn looks_like_step(text: &str) -> bool {
    let trimmed = text.trim_start();
    trimmed.starts_with(STEP_MAGIC)
        && text.contains("HEADER;")
        && text.contains("DATA;")
        && text.trim_end().ends_with("END-ISO-10303-21;")
}
