//! Provider adapters: uniform translation layers over external
//! generation backends.
//!
//! Each adapter maps typed operation parameters to one provider's wire
//! payload, submits jobs, and polls remote status. Adapters are stateless
//! pure translators — they never mutate accounts and never retry whole
//! generations; failure classification happens one layer up in the
//! pipeline.

pub mod adapter;
pub mod registry;
pub mod rest;

pub use adapter::{
    AccountCredentials, AdapterError, ProviderAdapter, RemoteJobState, RemoteStatus,
    ResolvedInputs, SubmitOutcome,
};
pub use registry::ProviderRegistry;
pub use rest::{RestAdapter, RestAdapterConfig};
