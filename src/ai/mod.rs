pub mod client;
pub mod orchestrator;
pub mod schema;
pub mod validate;

pub use client::{ClientError, ModelClient, ModelRequest, OpenAiClient, Strategy};
pub use orchestrator::{attempt_plan, AnalysisError, Attempt, AttemptError, FailedAttempt, Orchestrator};
pub use validate::{validate, Action, AnalysisResult, EntryPlan, ExitPlan, ValidationError};
