use thiserror::Error;

/// Errors that stop a linking attempt before it reaches a terminal stage.
///
/// Backend failures are not errors here: they end the session in
/// [`LinkStage::Failed`](super::LinkStage::Failed) and are reported through
/// the outcome.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("a linking session for {phone} is already in progress")]
    SessionActive { phone: String },
    #[error("failed to read operator input: {0}")]
    Input(#[from] std::io::Error),
}
