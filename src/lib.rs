pub mod codec;
pub mod error;
pub mod expander;
pub mod parser;
pub mod report;
pub mod utils;

// Re-export common items
pub use expander::StepExpander;
pub use parser::parse;
pub use report::{generate_report, project};
