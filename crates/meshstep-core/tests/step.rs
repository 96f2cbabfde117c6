use meshstep_core::geom::Vec3;
use meshstep_core::step::{
    cartesian_point, escape_step_string, f64_step, id_list, looks_like_step,
    product_boilerplate, LengthUnit, StepHeader, StepWriter,
};

#[test]
fn writes_product_structure_and_wrapper() {
    let mut writer = StepWriter::new();
    let ids = product_boilerplate(&mut writer, "it's a part", LengthUnit::Millimeters);
    let p = writer.push(cartesian_point(Vec3::new(1.0, -0.0, 2.5)));
    assert!(p > ids.representation_context);

    let step = writer.finish(&StepHeader::new("part", "2024-01-01T00:00:00"));
    assert!(step.starts_with("ISO-10303-21;"));
    assert!(step.contains("FILE_SCHEMA(('AUTOMOTIVE_DESIGN { 1 0 10303 214 1 1 1 1 }'));"));
    assert!(step.contains("PRODUCT('it''s a part','it''s a part'"));
    assert!(step.contains("SI_UNIT(.MILLI.,.METRE.)"));
    assert!(step.contains("CARTESIAN_POINT('',(1.0,0.,2.5))"));
    assert!(looks_like_step(&step));
}

#[test]
fn helpers_format_lists_and_quotes() {
    assert_eq!("(#1,#22,#3)", id_list(&[1, 22, 3]));
    assert_eq!("()", id_list(&[]));
    assert_eq!("a''b", escape_step_string("a'b"));
    assert!(!looks_like_step("solid cube\nendsolid"));
}

#[test]
fn reals_keep_full_precision() {
    assert_eq!("0.", f64_step(-0.0));
    assert_eq!("0.", f64_step(f64::NAN));
    assert_eq!("-3.0", f64_step(-3.0));
    assert_eq!("4.E-7", f64_step(4e-7));
    assert_eq!("1.5E-7", f64_step(1.5e-7));
    assert_eq!("1.E20", f64_step(1e20));
    assert_eq!("0.1234567891", f64_step(0.1234567891));
    assert_ne!(f64_step(1e-7), f64_step(2e-7));
}
