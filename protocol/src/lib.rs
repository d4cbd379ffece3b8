// Copyright (c) 2026 WebPay Contributors. MIT License.
// See LICENSE for details.

//! # WebPay Protocol Core Library
//!
//! A payment-authorization protocol between four roles: the payer's wallet,
//! the merchant backend, the payment provider ("bank") and an optional card
//! acquirer. The wallet signs and encrypts an authorization that only the
//! provider can read; the merchant attests it and asks the provider to
//! reserve or debit funds; two-phase payments are then finalized by the
//! provider or by the acquirer.
//!
//! ## Architecture
//!
//! - **codec**: canonical JSON, the message envelope, hybrid encryption.
//! - **crypto**: Ed25519 keys, X25519 + AES-GCM primitives, hashing.
//! - **trust**: certificate paths, trust anchors, signing and verification.
//! - **messages**: typed payloads for every qualifier.
//! - **authority**: published counterparty descriptors and their resolver.
//! - **transport**: the outbound HTTPS seam.
//! - **correlation**: reference ids and per-transaction context.
//! - **provider**: reserve/debit and finalize orchestrators, endpoint dispatch.
//! - **merchant**: the client-side round trip.
//! - **wallet**: the payer's side of the authorization.
//!
//! ## Failure model
//!
//! Business declines (insufficient funds and friends) are data: a signed
//! response carrying an [`messages::ErrorReturn`], surfaced as
//! [`Outcome::Declined`]. Everything else is a [`PaymentError`] and ends the
//! transaction.

pub mod authority;
pub mod codec;
pub mod config;
pub mod correlation;
pub mod crypto;
pub mod merchant;
pub mod messages;
pub mod provider;
pub mod transport;
pub mod trust;
pub mod wallet;

mod error;

pub use error::{Outcome, PaymentError};
