use thiserror::Error;

/// Failure surfaced by an `AgreementRepository` implementation. Opaque to
/// the manager: the concrete cause (network, constraint violation, ...) is
/// the infra crate's concern.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("agreement storage error: {0}")]
    Backend(String),
}

/// Errors the agreement & priority manager (§4.4) can return. Recoverable:
/// every variant carries enough context for a caller to rebuild a
/// corrected request.
#[derive(Debug, Error)]
pub enum AgreementError {
    #[error("agreement not found")]
    AgreementNotFound,
    #[error("agreement is not pending")]
    AgreementNotPending,
    #[error("agreement is not accepted")]
    AgreementNotAccepted,
    #[error("caller is not the proposer of this agreement")]
    NotProposerOfAgreement,
    #[error("caller is the proposer of this agreement, not its counterpart")]
    NotCounterpartOfProposal,
    #[error("caller is neither party to this agreement")]
    NotPartyToAgreement,
    #[error("counterpart account is unavailable")]
    CounterpartUnavailable,
    #[error("invalid agreement proposal: {0}")]
    InvalidProposal(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}
