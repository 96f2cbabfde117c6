pub mod command;
pub mod config;
pub mod error;
pub mod freecad;
pub mod pipeline;
pub mod repair_stage;
pub mod sewing;
pub mod stages;
pub mod step_writer;
pub mod structs;

pub use config::ConvertConfig;
pub use error::ConvertError;
pub use pipeline::{glb_to_step, Conversion, Converter};
