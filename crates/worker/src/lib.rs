pub mod jobs;

pub use jobs::publish::{DispatchConfig, Dispatcher, Outcome, PostOutcome, PublishError, SweepReport};
