//! Note summaries and the session-scoped notes store.

use serde::{Deserialize, Serialize};

/// Summary of a user-authored note.
///
/// The identifier is assigned by the note service and opaque to the
/// client. `created_at` is RFC 3339 text: server-provided for notes
/// that came from the bulk listing, client-generated for notes created
/// during this session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteSummary {
    /// Service-assigned identifier.
    pub id: i64,
    /// Note title as submitted.
    pub title: String,
    /// Creation timestamp (RFC 3339).
    pub created_at: String,
}

/// Ordered collection of note summaries, most recent first.
///
/// The store is initialized once from a bulk fetch and grows only by
/// prepending after a confirmed successful creation. No summary is
/// ever mutated or removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotesStore {
    notes: Vec<NoteSummary>,
    initialized: bool,
}

impl NotesStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// One-time bulk load from the backend listing.
    ///
    /// A second call is ignored: the listing is fetched once at session
    /// start and later growth happens only through [`prepend`].
    ///
    /// [`prepend`]: NotesStore::prepend
    pub fn initialize(&mut self, notes: Vec<NoteSummary>) {
        if self.initialized {
            return;
        }
        self.notes = notes;
        self.initialized = true;
    }

    /// Adds one summary to the front after a confirmed creation.
    pub fn prepend(&mut self, note: NoteSummary) {
        self.notes.insert(0, note);
    }

    /// Returns the summaries in recency order (most recent first).
    pub fn snapshot(&self) -> Vec<NoteSummary> {
        self.notes.clone()
    }

    /// Returns the number of summaries in the store.
    pub fn len(&self) -> usize {
        self.notes.len()
    }

    /// Whether the store holds no summaries.
    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }
}
