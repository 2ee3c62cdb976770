//! Feature toggles for outgoing chat requests.

/// Retrieval and web-lookup switches carried by a chat request.
///
/// Toggles are read at request-composition time and frozen for that
/// request; flipping one afterwards never affects turns already sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureToggles {
    /// Augment the request with indexed-document retrieval.
    pub use_rag: bool,
    /// Augment the request with encyclopedic web lookup.
    pub use_wiki: bool,
}

impl Default for FeatureToggles {
    fn default() -> Self {
        Self {
            use_rag: true,
            use_wiki: true,
        }
    }
}
