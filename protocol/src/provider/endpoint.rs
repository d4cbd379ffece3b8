//! The single transaction endpoint of a provider or acquirer.
//!
//! Takes raw request bytes, dispatches on the qualifier and always produces
//! a body: the signed response, or an `ErrorResponse` envelope when anything
//! failed. Full error detail goes to the log, the caller only sees the
//! message text.

use std::sync::Arc;

use crate::codec::{self, canonical, Envelope, Qualifier};
use crate::config::{JSON_CONTENT_TYPE, WEBPAY_CONTEXT_URI};
use crate::crypto::RequestHash;
use crate::messages::{error_response, FinalizeRequest, ReserveOrDebitRequest};
use crate::PaymentError;

use super::finalize::FinalizeOrchestrator;
use super::reserve::ReserveOrDebitOrchestrator;

/// Which operation a request was routed to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    ReserveOrDebit,
    Finalize,
    /// The request never got far enough to be routed.
    Unrouted,
}

/// How a request ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReplyStatus {
    Approved,
    Declined,
    Failed,
}

/// Bytes to send back plus what happened, for metrics.
#[derive(Clone, Debug)]
pub struct EndpointReply {
    pub body: Vec<u8>,
    pub qualifier: Qualifier,
    pub operation: Operation,
    pub status: ReplyStatus,
}

enum Role {
    Provider {
        reserve: ReserveOrDebitOrchestrator,
        finalize: FinalizeOrchestrator,
    },
    Acquirer {
        finalize: FinalizeOrchestrator,
    },
}

/// Qualifier dispatch in front of the orchestrators.
#[derive(Clone)]
pub struct ProviderEndpoint {
    role: Arc<Role>,
}

impl ProviderEndpoint {
    /// A bank: reserve-or-debit and finalize.
    pub fn provider(reserve: ReserveOrDebitOrchestrator, finalize: FinalizeOrchestrator) -> Self {
        Self {
            role: Arc::new(Role::Provider { reserve, finalize }),
        }
    }

    /// An acquirer: finalize only.
    pub fn acquirer(finalize: FinalizeOrchestrator) -> Self {
        Self {
            role: Arc::new(Role::Acquirer { finalize }),
        }
    }

    pub async fn handle(&self, content_type: Option<&str>, body: &[u8]) -> EndpointReply {
        let mut operation = Operation::Unrouted;
        match self.dispatch(content_type, body, &mut operation).await {
            Ok((qualifier, body, declined)) => EndpointReply {
                body,
                qualifier,
                operation,
                status: if declined {
                    ReplyStatus::Declined
                } else {
                    ReplyStatus::Approved
                },
            },
            Err(e) => {
                tracing::error!(category = e.category(), ?operation, error = %e, "request failed");
                let body = error_response(e.to_string())
                    .to_canonical_bytes()
                    .unwrap_or_else(|_| {
                        format!(
                            r#"{{"@context":"{WEBPAY_CONTEXT_URI}","@qualifier":"ErrorResponse","description":"internal error"}}"#
                        )
                        .into_bytes()
                    });
                EndpointReply {
                    body,
                    qualifier: Qualifier::ErrorResponse,
                    operation,
                    status: ReplyStatus::Failed,
                }
            }
        }
    }

    async fn dispatch(
        &self,
        content_type: Option<&str>,
        body: &[u8],
        operation: &mut Operation,
    ) -> Result<(Qualifier, Vec<u8>, bool), PaymentError> {
        if content_type != Some(JSON_CONTENT_TYPE) {
            return Err(PaymentError::Transport(format!(
                "Content-Type must be \"{JSON_CONTENT_TYPE}\", found: {}",
                content_type.unwrap_or("<none>")
            )));
        }
        let qualifier = codec::peek_qualifier(body)?;
        tracing::debug!(%qualifier, bytes = body.len(), "received");

        if qualifier == Qualifier::PayeeFinalizeRequest {
            *operation = Operation::Finalize;
            let finalize = match self.role.as_ref() {
                Role::Provider { finalize, .. } | Role::Acquirer { finalize } => finalize,
            };
            let request_hash = RequestHash::of(&canonical::normalize(body)?);
            let request: Envelope<FinalizeRequest> =
                codec::decode(body, &[Qualifier::PayeeFinalizeRequest])?;
            let response = finalize.process(&request, request_hash)?;
            let declined = response.payload.error_return.is_some();
            return Ok((response.qualifier, response.to_canonical_bytes()?, declined));
        }

        let Role::Provider { reserve, .. } = self.role.as_ref() else {
            return Err(PaymentError::Protocol(format!(
                "acquirer does not accept {qualifier}"
            )));
        };
        *operation = Operation::ReserveOrDebit;
        let request: Envelope<ReserveOrDebitRequest> = codec::decode(
            body,
            &[Qualifier::DirectDebitRequest, Qualifier::ReserveFundsRequest],
        )?;
        let response = reserve.process(request).await?;
        let declined = response.payload.error_return.is_some();
        Ok((response.qualifier, response.to_canonical_bytes()?, declined))
    }
}
