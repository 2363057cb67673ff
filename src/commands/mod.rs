mod generate;
mod serve;
mod templates;

pub use generate::run_generate;
pub use serve::run_serve;
pub use templates::{run_inspect, run_templates};
