pub mod case;
pub mod recorder;
pub mod reporter;
pub mod suite;
pub mod types;

pub use case::{CaseContext, CaseExecutor};
pub use recorder::Recorder;
pub use reporter::TestReporter;
pub use suite::SuiteOrchestrator;
pub use types::{CaseResult, CaseRun, CaseState, ParameterizedResult, SuiteResult};
