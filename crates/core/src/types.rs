use std::fmt;

use serde::{Deserialize, Serialize};

use crate::provider::Provider;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Identifier of a tracked generation job.
///
/// Derived from the provider and the provider-side handle, so tracking
/// the same handle twice always resolves to the same id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Build the id for a provider handle, e.g. `veo:operations/abc123`.
    pub fn for_handle(provider: Provider, handle: &str) -> Self {
        Self(format!("{provider}:{handle}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for JobId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for JobId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_is_stable_for_same_handle() {
        let a = JobId::for_handle(Provider::Veo, "operations/abc");
        let b = JobId::for_handle(Provider::Veo, "operations/abc");
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "veo:operations/abc");
    }

    #[test]
    fn id_differs_across_providers() {
        let veo = JobId::for_handle(Provider::Veo, "h1");
        let sora = JobId::for_handle(Provider::Sora, "h1");
        assert_ne!(veo, sora);
    }

    #[test]
    fn id_serializes_as_plain_string() {
        let id = JobId::from("sora:video_1");
        assert_eq!(serde_json::to_string(&id).unwrap(), r#""sora:video_1""#);
    }
}
