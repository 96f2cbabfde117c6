pub mod geom;
pub mod model;
pub mod repair;
pub mod report;
pub mod step;
pub mod stl;
