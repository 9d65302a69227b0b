pub mod ast;
pub mod builtins;
pub mod error;
pub mod interpreter;
pub mod parser;
pub mod sandbox;
pub mod validator;
pub(crate) mod value;

pub use builtins::{Capability, CapabilityTable, METHODS};
pub use error::ScriptError;
pub use sandbox::{ScriptMode, ScriptSandbox, ScriptScope};
pub use validator::{DENYLIST, ScriptValidator};
