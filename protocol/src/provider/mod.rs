//! # Provider Side
//!
//! What a bank (and, for finalize, an acquirer) runs: the reserve-or-debit
//! orchestrator, the finalize orchestrator, and the endpoint that routes raw
//! requests to them by qualifier.

pub mod endpoint;
pub mod finalize;
pub mod reserve;

pub use endpoint::{EndpointReply, Operation, ProviderEndpoint, ReplyStatus};
pub use finalize::{DuplicateFinalizePolicy, FinalizeConfig, FinalizeOrchestrator};
pub use reserve::{ProviderConfig, ReserveOrDebitOrchestrator};
