//! Provider adapters for external video-generation services.
//!
//! Each adapter knows how to read its provider's status payload and how
//! to finalize (download and persist) a finished artifact. Both talk to
//! the dashboard backend through a shared [`backend::BackendClient`].

pub mod adapter;
pub mod backend;
pub mod error;
pub mod sora;
pub mod veo;

pub use adapter::{AdapterSet, ProviderAdapter};
pub use error::ProviderError;
