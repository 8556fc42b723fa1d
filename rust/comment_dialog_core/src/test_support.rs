//! In-memory collaborators for unit tests.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::task::Poll;

use async_trait::async_trait;
use futures::future::poll_fn;

use crate::api::{CommentStore, ReviewApi, ReviewSummary};
use crate::comment::{Comment, CommentId, CommentKind, ExtraData, SiblingComment};
use crate::error::{FetchError, PersistenceError};

pub fn sibling(id: CommentId, text: &str) -> SiblingComment {
    sibling_of(CommentKind::Diff, 1, id, text)
}

pub fn sibling_of(kind: CommentKind, review_id: u64, id: CommentId, text: &str) -> SiblingComment {
    SiblingComment {
        id,
        kind,
        review_id,
        text: text.into(),
        extra_data: ExtraData::new(),
        issue_opened: false,
        issue_status: None,
        url: format!("/r/1/#comment{id}"),
    }
}

/// Records every call; optionally fails saves and destroys with a server
/// message.
#[derive(Default)]
pub struct FakeStore {
    failure: Option<String>,
    next_id: Cell<CommentId>,
    ready_id: Cell<Option<CommentId>>,
    saved: RefCell<Vec<Comment>>,
    destroyed: RefCell<Vec<Option<CommentId>>>,
    discard_checks: Cell<usize>,
}

impl FakeStore {
    pub fn failing(message: &str) -> Self {
        Self { failure: Some(message.to_string()), ..Self::default() }
    }

    pub fn set_ready_id(&self, id: CommentId) { self.ready_id.set(Some(id)); }
    pub fn saved(&self) -> Vec<Comment> { self.saved.borrow().clone() }
    pub fn destroyed(&self) -> Vec<Option<CommentId>> { self.destroyed.borrow().clone() }
    pub fn discard_checks(&self) -> usize { self.discard_checks.get() }

    fn fail(&self) -> Result<(), PersistenceError> {
        match &self.failure {
            Some(message) => Err(PersistenceError::Server(message.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait(?Send)]
impl CommentStore for FakeStore {
    async fn save(&self, comment: &Comment) -> Result<Comment, PersistenceError> {
        self.fail()?;
        let mut stored = comment.clone();
        if stored.id.is_none() {
            self.next_id.set(self.next_id.get() + 1);
            stored.id = Some(1000 + self.next_id.get());
        }
        stored.loaded = true;
        self.saved.borrow_mut().push(stored.clone());
        Ok(stored)
    }

    async fn destroy(&self, comment: &Comment) -> Result<(), PersistenceError> {
        self.fail()?;
        self.destroyed.borrow_mut().push(comment.id);
        Ok(())
    }

    async fn destroy_if_empty(&self, comment: &Comment) -> Result<bool, PersistenceError> {
        self.discard_checks.set(self.discard_checks.get() + 1);
        if !comment.is_discardable() {
            return Ok(false);
        }
        self.destroy(comment).await?;
        Ok(true)
    }

    async fn ready(&self, comment: &Comment) -> Result<Comment, PersistenceError> {
        let mut loaded = comment.clone();
        if let Some(id) = self.ready_id.get() {
            loaded.id = Some(id);
            loaded.loaded = true;
        }
        Ok(loaded)
    }
}

async fn yield_times(mut left: usize) {
    poll_fn(|cx| {
        if left == 0 {
            return Poll::Ready(());
        }
        left -= 1;
        cx.waker().wake_by_ref();
        Poll::Pending
    })
    .await
}

/// Serves canned reviews and comment listings.
#[derive(Default)]
pub struct FakeApi {
    pub reviews: Vec<ReviewSummary>,
    pub comments: HashMap<(u64, CommentKind), Vec<SiblingComment>>,
    pub failing: HashSet<(u64, CommentKind)>,
    pub fail_reviews: bool,
    /// Times a listing yields to the executor before answering.
    pub delays: HashMap<(u64, CommentKind), usize>,
    pub calls: RefCell<Vec<(u64, CommentKind)>>,
    pub completed: RefCell<Vec<(u64, CommentKind)>>,
}

impl FakeApi {
    pub fn with_reviews(ids: &[u64]) -> Self {
        Self {
            reviews: ids.iter().map(|&id| ReviewSummary { id, public: true }).collect(),
            ..Self::default()
        }
    }

    pub fn add(&mut self, comment: SiblingComment) {
        self.comments.entry((comment.review_id, comment.kind)).or_default().push(comment);
    }
}

#[async_trait(?Send)]
impl ReviewApi for FakeApi {
    async fn list_reviews(&self, _review_request_id: u64) -> Result<Vec<ReviewSummary>, FetchError> {
        if self.fail_reviews {
            return Err(FetchError::Transport("connection reset".into()));
        }
        Ok(self.reviews.clone())
    }

    async fn list_comments(
        &self,
        _review_request_id: u64,
        review_id: u64,
        kind: CommentKind,
    ) -> Result<Vec<SiblingComment>, FetchError> {
        self.calls.borrow_mut().push((review_id, kind));
        yield_times(self.delays.get(&(review_id, kind)).copied().unwrap_or(0)).await;
        self.completed.borrow_mut().push((review_id, kind));
        if self.failing.contains(&(review_id, kind)) {
            return Err(FetchError::Server("You don't have permission".into()));
        }
        Ok(self.comments.get(&(review_id, kind)).cloned().unwrap_or_default())
    }
}
