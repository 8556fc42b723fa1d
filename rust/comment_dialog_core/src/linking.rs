//! Gathers the published comments of a review request and offers the
//! eligible ones as link targets for the comment being edited.

use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, warn};

use crate::api::ReviewApi;
use crate::comment::{CommentId, CommentKind, SiblingComment};
use crate::dialog::DialogId;
use crate::editor::CommentEditor;

/// One selectable row of the link list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinkEntry {
    pub comment: SiblingComment,
    pub checked: bool,
}

/// Every fetched sibling comment plus the candidate rows derived from them.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CandidatePool {
    all: Vec<SiblingComment>,
    entries: Vec<LinkEntry>,
    failures: usize,
}

impl CandidatePool {
    /// Build the pool from fetched siblings. Rows for ids in `parent_ids`
    /// start checked.
    pub fn new(all: Vec<SiblingComment>, parent_ids: &[CommentId], failures: usize) -> Self {
        let entries = all
            .iter()
            .filter(|c| c.is_link_candidate())
            .map(|c| LinkEntry { comment: c.clone(), checked: parent_ids.contains(&c.id) })
            .collect();
        Self { all, entries, failures }
    }

    pub fn all(&self) -> &[SiblingComment] { &self.all }
    pub fn entries(&self) -> &[LinkEntry] { &self.entries }
    /// Number of listing requests that failed while building the pool.
    pub fn failures(&self) -> usize { self.failures }
    pub fn len(&self) -> usize { self.entries.len() }
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    /// Flip the row for `id`. Returns its new state, or `None` for an
    /// unknown id.
    pub fn toggle(&mut self, id: CommentId) -> Option<bool> {
        let entry = self.entries.iter_mut().find(|e| e.comment.id == id)?;
        entry.checked = !entry.checked;
        Some(entry.checked)
    }

    pub fn checked_ids(&self) -> Vec<CommentId> {
        self.entries.iter().filter(|e| e.checked).map(|e| e.comment.id).collect()
    }

    /// The checked comments. Only candidate rows are considered, so a
    /// non-candidate sharing an id is never linked.
    pub fn checked_comments(&self) -> Vec<SiblingComment> {
        self.entries.iter().filter(|e| e.checked).map(|e| e.comment.clone()).collect()
    }

    /// Make the checked rows the editor's linked comments.
    pub fn apply_to(&self, editor: &mut CommentEditor) { editor.set_parent_comments(self.checked_comments()); }
}

/// Fetch every sibling comment of the review request.
///
/// Listings for each review and comment kind run concurrently and are
/// assembled in review order, then kind order. A failed listing is logged
/// and skipped; if the reviews themselves cannot be listed the pool is empty.
pub async fn gather_candidates(
    api: &dyn ReviewApi,
    review_request_id: u64,
    parent_ids: &[CommentId],
) -> CandidatePool {
    let reviews = match api.list_reviews(review_request_id).await {
        Ok(reviews) => reviews,
        Err(err) => {
            warn!(review_request_id, %err, "could not list reviews for link candidates");
            return CandidatePool { failures: 1, ..CandidatePool::default() };
        }
    };

    let requests: Vec<(u64, CommentKind)> = reviews
        .iter()
        .flat_map(|review| CommentKind::ALL.into_iter().map(move |kind| (review.id, kind)))
        .collect();

    let results = join_all(
        requests
            .iter()
            .map(|&(review_id, kind)| api.list_comments(review_request_id, review_id, kind)),
    )
    .await;

    let mut all = Vec::new();
    let mut failures = 0;
    for ((review_id, kind), result) in requests.into_iter().zip(results) {
        match result {
            Ok(comments) => all.extend(comments),
            Err(err) => {
                warn!(review_request_id, review_id, %kind, %err, "skipping comment listing");
                failures += 1;
            }
        }
    }

    let pool = CandidatePool::new(all, parent_ids, failures);
    debug!(review_request_id, candidates = pool.len(), failures, "gathered link candidates");
    pool
}

/// A link fetch started on behalf of one dialog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkRequest {
    pub dialog_id: DialogId,
    pub review_request_id: u64,
    pub parent_ids: Vec<CommentId>,
}

impl LinkRequest {
    pub async fn run(self, api: &dyn ReviewApi) -> LinkResults {
        let pool = gather_candidates(api, self.review_request_id, &self.parent_ids).await;
        LinkResults { dialog_id: self.dialog_id, pool }
    }
}

/// Candidates tagged with the dialog that asked for them.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkResults {
    pub dialog_id: DialogId,
    pub pool: CandidatePool,
}
