//! Collaborator clients: presentation document store and billing ledger.

mod billing;
mod client;
mod types;

pub use billing::{BillingApiConfig, BillingClient, BillingError, HttpBillingClient};
pub use client::{
    HttpPresentationClient, PresentationApiConfig, PresentationClient, PresentationError,
};
pub use types::{AudioChunkRef, NarrationSpan, PresentationManifest, SlideManifest};
