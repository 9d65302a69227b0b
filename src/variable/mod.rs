pub mod capture;
pub mod path;
pub mod resolver;
pub mod store;

pub use capture::{CaptureSource, VariableCapture, extract_variables};
pub use path::{JsonPath, PathSegment};
pub use resolver::VariableResolver;
pub use store::{VariableLayer, VariableMap, VariableStore};
