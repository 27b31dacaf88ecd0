mod controller;
mod error;
mod session;
mod signal;

pub use controller::{LinkController, LinkOutcome, LinkStage, PromptKind};
pub use error::LinkError;
pub use signal::LinkSignal;
