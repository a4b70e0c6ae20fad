pub mod markup;
pub mod types;

pub use markup::{parse, StepParser};
pub use types::{StepKind, StepNode};
