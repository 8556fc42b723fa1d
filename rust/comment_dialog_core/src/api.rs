//! Collaborator boundaries: comment persistence and sibling-comment listing.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::comment::{Comment, CommentKind, SiblingComment};
use crate::error::{FetchError, PersistenceError};

/// Persistence for the comment being edited.
///
/// Every method receives a snapshot of the record, so the caller may keep
/// mutating its handle while a request is in flight.
#[async_trait(?Send)]
pub trait CommentStore {
    /// Create or update `comment`. Returns the stored record.
    async fn save(&self, comment: &Comment) -> Result<Comment, PersistenceError>;

    async fn destroy(&self, comment: &Comment) -> Result<(), PersistenceError>;

    /// Destroy `comment` only if it is empty and was never stored.
    ///
    /// Returns whether it was destroyed.
    async fn destroy_if_empty(&self, comment: &Comment) -> Result<bool, PersistenceError> {
        if !comment.is_discardable() {
            return Ok(false);
        }
        self.destroy(comment).await?;
        Ok(true)
    }

    /// Resolve once `comment` is loaded, returning its loaded form.
    async fn ready(&self, comment: &Comment) -> Result<Comment, PersistenceError> {
        Ok(comment.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewSummary {
    pub id: u64,
    #[serde(default)]
    pub public: bool,
}

/// Read access to the reviews and comments of a review request.
#[async_trait(?Send)]
pub trait ReviewApi {
    async fn list_reviews(&self, review_request_id: u64) -> Result<Vec<ReviewSummary>, FetchError>;

    async fn list_comments(
        &self,
        review_request_id: u64,
        review_id: u64,
        kind: CommentKind,
    ) -> Result<Vec<SiblingComment>, FetchError>;
}
