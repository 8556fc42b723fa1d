//! The comment editing state machine.
//!
//! A [`CommentEditor`] holds the editable fields for one comment, derives the
//! capability flags from the session and the bound comment, and copies its
//! fields onto the comment when saving. Every mutation runs the derivation
//! again and emits a [`EditorEvent::Changed`] for each attribute whose value
//! moved.

use std::rc::Rc;

use futures::channel::mpsc::UnboundedReceiver;
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::api::CommentStore;
use crate::comment::{
    encode_parent_links, Comment, CommentHandle, CommentId, CommentKind, ExtraData, PublishedComment,
    SiblingComment, PARENT_COMMENTS_KEY, REQUIRE_VERIFICATION_KEY,
};
use crate::config::{ReviewRequestContext, Session};
use crate::error::{EditorError, PersistenceError, Precondition, Result};
use crate::events::{Attribute, Emitter, EditorEvent, Operation};

/// Construction-time values. `None` means "derive it".
#[derive(Debug, Clone, Default)]
pub struct EditorOptions {
    pub comment: Option<CommentHandle>,
    pub can_edit: Option<bool>,
    pub open_issue: Option<bool>,
    pub rich_text: Option<bool>,
    pub published_comments: Vec<PublishedComment>,
    pub published_comments_type: Option<CommentKind>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditorState {
    Unbound,
    Idle,
    Editing,
    Closed,
}

/// Explicitly set capability values, which beat the derived ones.
#[derive(Debug, Clone, Copy, Default)]
struct Overrides {
    can_edit: Option<bool>,
    can_save: Option<bool>,
    can_delete: Option<bool>,
}

#[derive(Debug)]
pub struct CommentEditor {
    session: Session,
    review_request: ReviewRequestContext,
    comment: Option<CommentHandle>,

    text: String,
    rich_text: bool,
    open_issue: bool,
    require_verification: bool,
    extra_data: ExtraData,
    parent_comments: Vec<SiblingComment>,
    published_comments: Vec<PublishedComment>,
    published_comments_type: Option<CommentKind>,
    other_comments: Vec<SiblingComment>,

    editing: bool,
    dirty: bool,
    closed: bool,
    can_edit: bool,
    can_save: bool,
    can_delete: bool,

    overrides: Overrides,
    explicit_open_issue: Option<bool>,
    explicit_rich_text: Option<bool>,
    pending_save: Option<CommentHandle>,
    pending_delete: Option<CommentHandle>,
    events: Emitter<EditorEvent>,
}

fn replace<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        false
    } else {
        *slot = value;
        true
    }
}

impl CommentEditor {
    pub fn new(session: Session, review_request: ReviewRequestContext, options: EditorOptions) -> Self {
        let mut editor = Self {
            open_issue: options.open_issue.unwrap_or(session.comments_open_an_issue),
            rich_text: options.rich_text.unwrap_or(session.default_use_rich_text),
            session,
            review_request,
            comment: None,
            text: String::new(),
            require_verification: false,
            extra_data: ExtraData::new(),
            parent_comments: Vec::new(),
            published_comments: options.published_comments,
            published_comments_type: options.published_comments_type,
            other_comments: Vec::new(),
            editing: false,
            dirty: false,
            closed: false,
            can_edit: false,
            can_save: false,
            can_delete: false,
            overrides: Overrides { can_edit: options.can_edit, ..Overrides::default() },
            explicit_open_issue: options.open_issue,
            explicit_rich_text: options.rich_text,
            pending_save: None,
            pending_delete: None,
            events: Emitter::new(),
        };
        if let Some(comment) = options.comment {
            editor.comment = Some(comment);
            editor.load_from_comment();
        }
        editor.recompute();
        editor
    }

    pub fn subscribe(&mut self) -> UnboundedReceiver<EditorEvent> { self.events.subscribe() }

    pub fn state(&self) -> EditorState {
        if self.closed {
            EditorState::Closed
        } else if self.comment.is_none() {
            EditorState::Unbound
        } else if self.editing {
            EditorState::Editing
        } else {
            EditorState::Idle
        }
    }

    pub fn session(&self) -> &Session { &self.session }
    pub fn review_request(&self) -> &ReviewRequestContext { &self.review_request }
    pub fn comment(&self) -> Option<&CommentHandle> { self.comment.as_ref() }
    pub fn text(&self) -> &str { &self.text }
    pub fn rich_text(&self) -> bool { self.rich_text }
    pub fn open_issue(&self) -> bool { self.open_issue }
    pub fn require_verification(&self) -> bool { self.require_verification }
    pub fn extra_data(&self) -> &ExtraData { &self.extra_data }
    pub fn parent_comments(&self) -> &[SiblingComment] { &self.parent_comments }
    pub fn published_comments(&self) -> &[PublishedComment] { &self.published_comments }
    pub fn published_comments_type(&self) -> Option<CommentKind> { self.published_comments_type }
    pub fn other_comments(&self) -> &[SiblingComment] { &self.other_comments }
    pub fn editing(&self) -> bool { self.editing }
    pub fn dirty(&self) -> bool { self.dirty }
    pub fn can_edit(&self) -> bool { self.can_edit }
    pub fn can_save(&self) -> bool { self.can_save }
    pub fn can_delete(&self) -> bool { self.can_delete }

    pub fn get_extra_data(&self, key: &str) -> Option<&Value> { self.extra_data.get(key) }

    /// Bind a different comment (or none). Fields are reseeded from it and
    /// `dirty` is reset.
    ///
    /// The `can_save` and `can_delete` overrides describe the previous comment
    /// and are dropped; a `can_edit` override is kept.
    pub fn set_comment(&mut self, comment: Option<CommentHandle>) {
        let same = match (&self.comment, &comment) {
            (Some(a), Some(b)) => Rc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        };
        self.comment = comment;
        self.overrides.can_save = None;
        self.overrides.can_delete = None;
        if self.comment.is_some() {
            self.closed = false;
        }
        if !same {
            self.emit_changed(Attribute::Comment);
        }
        self.load_from_comment();
        self.set_dirty(false);
        self.recompute();
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        if replace(&mut self.text, text.into()) {
            self.tracked_changed(Attribute::Text);
        }
    }

    pub fn set_rich_text(&mut self, rich_text: bool) {
        if replace(&mut self.rich_text, rich_text) {
            self.tracked_changed(Attribute::RichText);
        }
    }

    pub fn set_open_issue(&mut self, open_issue: bool) {
        if replace(&mut self.open_issue, open_issue) {
            self.tracked_changed(Attribute::OpenIssue);
        }
    }

    pub fn set_require_verification(&mut self, require: bool) {
        if replace(&mut self.require_verification, require) {
            self.tracked_changed(Attribute::RequireVerification);
        }
    }

    /// Replace the whole extra-data mapping.
    pub fn set_extra_data_map(&mut self, extra_data: ExtraData) {
        if replace(&mut self.extra_data, extra_data) {
            self.tracked_changed(Attribute::ExtraData);
        }
    }

    /// Write one extra-data key, leaving the others alone.
    pub fn set_extra_data(&mut self, key: &str, value: Value) {
        if self.extra_data.get(key) == Some(&value) {
            return;
        }
        self.extra_data.insert(key.to_string(), value);
        self.tracked_changed(Attribute::ExtraData);
    }

    pub fn set_parent_comments(&mut self, parents: Vec<SiblingComment>) {
        if replace(&mut self.parent_comments, parents) {
            self.tracked_changed(Attribute::ParentComments);
        }
    }

    pub fn set_published_comments(&mut self, comments: Vec<PublishedComment>, kind: Option<CommentKind>) {
        self.published_comments_type = kind;
        if replace(&mut self.published_comments, comments) {
            self.emit_changed(Attribute::PublishedComments);
        }
    }

    pub fn set_other_comments(&mut self, comments: Vec<SiblingComment>) {
        if replace(&mut self.other_comments, comments) {
            self.emit_changed(Attribute::OtherComments);
        }
    }

    /// Record a new issue status for a published comment shown beside the
    /// dialog.
    pub fn update_issue_status(&mut self, comment_id: CommentId, status: &str) {
        let mut changed = false;
        for c in self.published_comments.iter_mut().filter(|c| c.comment_id == comment_id) {
            changed |= replace(&mut c.issue_status, Some(status.to_string()));
        }
        if changed {
            self.emit_changed(Attribute::PublishedComments);
        }
    }

    pub fn set_can_edit(&mut self, value: bool) {
        self.overrides.can_edit = Some(value);
        self.recompute();
    }

    pub fn set_can_save(&mut self, value: bool) {
        self.overrides.can_save = Some(value);
        self.recompute();
    }

    pub fn set_can_delete(&mut self, value: bool) {
        self.overrides.can_delete = Some(value);
        self.recompute();
    }

    pub fn begin_edit(&mut self) -> Result<()> {
        if self.comment.is_none() {
            return Err(self.violation(Precondition::NoComment));
        }
        if !self.can_edit {
            return Err(self.violation(Precondition::CannotEdit));
        }
        if self.editing {
            return Ok(());
        }

        self.load_from_comment();
        self.editing = true;
        self.emit_changed(Attribute::Editing);
        self.recompute();
        debug!(comment_id = ?self.comment_id(), "began editing comment");
        Ok(())
    }

    /// Check `can_save` and copy the editor's fields onto the bound comment.
    ///
    /// Returns the snapshot to persist. The copy is complete before this
    /// returns, so later edits cannot leak into the request.
    pub fn begin_save(&mut self) -> Result<Comment> {
        if !self.can_save {
            return Err(self.violation(Precondition::CannotSave));
        }
        let Some(handle) = self.comment.clone() else {
            return Err(self.violation(Precondition::NoComment));
        };

        let extra_data = self.merged_extra_data();
        let snapshot = {
            let mut c = handle.borrow_mut();
            c.text = self.text.clone();
            c.raw_text = None;
            c.markdown_text = None;
            c.issue_opened = Some(self.open_issue);
            c.rich_text = self.rich_text;
            c.extra_data = extra_data;
            c.clone()
        };
        self.pending_save = Some(handle);
        debug!(comment_id = ?snapshot.id, "saving comment");
        Ok(snapshot)
    }

    pub fn complete_save(&mut self, result: std::result::Result<Comment, PersistenceError>) -> Result<()> {
        let handle = self.pending_save.take();
        match result {
            Ok(stored) => {
                if let Some(handle) = handle {
                    let mut c = handle.borrow_mut();
                    c.id = stored.id.or(c.id);
                    c.review_id = stored.review_id.or(c.review_id);
                    c.loaded = true;
                }
                self.set_dirty(false);
                self.events.emit(EditorEvent::Saved);
                self.recompute();
                Ok(())
            }
            Err(err) => Err(self.persistence_failed(Operation::Save, err)),
        }
    }

    /// Persist the editor's fields through `store`.
    pub async fn save(&mut self, store: &dyn CommentStore) -> Result<()> {
        let snapshot = self.begin_save()?;
        let result = store.save(&snapshot).await;
        self.complete_save(result)
    }

    /// Check `can_delete` and return the comment to destroy.
    pub fn begin_delete(&mut self) -> Result<Comment> {
        if !self.can_delete {
            return Err(self.violation(Precondition::CannotDelete));
        }
        let Some(handle) = self.comment.clone() else {
            return Err(self.violation(Precondition::NoComment));
        };
        let snapshot = handle.borrow().clone();
        self.pending_delete = Some(handle);
        debug!(comment_id = ?snapshot.id, "deleting comment");
        Ok(snapshot)
    }

    pub fn complete_delete(&mut self, result: std::result::Result<(), PersistenceError>) -> Result<()> {
        let handle = self.pending_delete.take();
        match result {
            Ok(()) => {
                if let Some(handle) = handle {
                    let mut c = handle.borrow_mut();
                    c.id = None;
                    c.loaded = false;
                }
                self.set_dirty(false);
                self.events.emit(EditorEvent::Deleted);
                self.close();
                Ok(())
            }
            Err(err) => Err(self.persistence_failed(Operation::Delete, err)),
        }
    }

    pub async fn delete_comment(&mut self, store: &dyn CommentStore) -> Result<()> {
        let snapshot = self.begin_delete()?;
        let result = store.destroy(&snapshot).await;
        self.complete_delete(result)
    }

    /// Abandon the edit. A bound comment that is still empty and unsaved is
    /// discarded through `store`. The editor is closed either way.
    pub async fn cancel(&mut self, store: &dyn CommentStore) {
        let snapshot = self.comment.as_ref().map(|c| c.borrow().clone());
        if let Some(comment) = snapshot {
            if let Err(err) = store.destroy_if_empty(&comment).await {
                warn!(%err, "failed to discard empty comment");
                self.events.emit(EditorEvent::Failed { operation: Operation::Cancel, message: err.to_string() });
            }
        }
        self.finish_cancel();
    }

    /// The synchronous tail of [`cancel`](Self::cancel), for callers that
    /// discard the comment themselves.
    pub fn finish_cancel(&mut self) {
        if self.comment.is_some() {
            self.events.emit(EditorEvent::Canceled);
        }
        self.close();
    }

    /// Release the comment and every listener. Safe to call repeatedly.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if self.editing {
            self.editing = false;
            self.emit_changed(Attribute::Editing);
        }
        self.set_dirty(false);
        if self.comment.take().is_some() {
            self.emit_changed(Attribute::Comment);
        }
        self.recompute();
        self.events.emit(EditorEvent::Closed);
        self.events.clear();
    }

    /// Wait for the bound comment to finish loading and pick up its identity.
    pub async fn load(&mut self, store: &dyn CommentStore) -> Result<()> {
        let Some(handle) = self.comment.clone() else {
            return Err(self.violation(Precondition::NoComment));
        };
        let snapshot = handle.borrow().clone();
        let loaded = store.ready(&snapshot).await?;
        {
            let mut c = handle.borrow_mut();
            c.id = loaded.id.or(c.id);
            c.review_id = loaded.review_id.or(c.review_id);
            c.loaded = loaded.loaded;
        }
        self.recompute();
        Ok(())
    }

    fn comment_id(&self) -> Option<CommentId> { self.comment.as_ref().and_then(|c| c.borrow().id) }

    /// Seed the editable fields from the bound comment.
    fn load_from_comment(&mut self) {
        let Some(handle) = self.comment.clone() else { return };
        let (text, rich_text, open_issue, require_verification, extra_data) = {
            let c = handle.borrow();
            let default_rich = self.session.default_use_rich_text;
            let rich_text = self.explicit_rich_text.unwrap_or(if c.loaded { c.rich_text } else { default_rich });
            let text = if !c.loaded {
                c.text.clone()
            } else if c.rich_text || !default_rich {
                c.raw().to_string()
            } else {
                c.markdown()
            };
            let open_issue = self
                .explicit_open_issue
                .or(c.issue_opened)
                .unwrap_or(self.session.comments_open_an_issue);
            let require_verification =
                c.extra_data.get(REQUIRE_VERIFICATION_KEY).and_then(Value::as_bool).unwrap_or(false);
            (text, rich_text, open_issue, require_verification, c.extra_data.clone())
        };

        self.set_extra_data_map(extra_data);
        self.set_open_issue(open_issue);
        self.set_require_verification(require_verification);
        self.set_rich_text(rich_text);
        self.set_text(text);
    }

    fn merged_extra_data(&self) -> ExtraData {
        let mut extra = self.extra_data.clone();
        extra.insert(REQUIRE_VERIFICATION_KEY.to_string(), Value::Bool(self.require_verification));
        if !self.parent_comments.is_empty() {
            extra.insert(PARENT_COMMENTS_KEY.to_string(), Value::String(encode_parent_links(&self.parent_comments)));
        }
        extra
    }

    fn recompute(&mut self) {
        let derived_can_edit = self.session.authenticated && !self.review_request.has_draft;
        let can_edit = self.overrides.can_edit.unwrap_or(derived_can_edit);

        let has_content = !self.text.is_empty() || !self.parent_comments.is_empty();
        let can_save = self.overrides.can_save.unwrap_or(self.editing && has_content);

        let persisted = self.comment.as_ref().is_some_and(|c| c.borrow().is_persisted());
        let can_delete = self.overrides.can_delete.unwrap_or(self.editing && persisted);

        if replace(&mut self.can_edit, can_edit) {
            self.emit_changed(Attribute::CanEdit);
        }
        if replace(&mut self.can_save, can_save) {
            self.emit_changed(Attribute::CanSave);
        }
        if replace(&mut self.can_delete, can_delete) {
            self.emit_changed(Attribute::CanDelete);
        }
    }

    fn tracked_changed(&mut self, attribute: Attribute) {
        self.emit_changed(attribute);
        if self.editing {
            self.set_dirty(true);
        }
        self.recompute();
    }

    fn set_dirty(&mut self, dirty: bool) {
        if replace(&mut self.dirty, dirty) {
            self.emit_changed(Attribute::Dirty);
        }
    }

    fn emit_changed(&mut self, attribute: Attribute) { self.events.emit(EditorEvent::Changed { attribute }); }

    fn violation(&self, precondition: Precondition) -> EditorError {
        error!(%precondition, comment_id = ?self.comment_id(), "editor precondition violated");
        precondition.into()
    }

    fn persistence_failed(&mut self, operation: Operation, err: PersistenceError) -> EditorError {
        warn!(?operation, %err, "comment persistence failed");
        self.events.emit(EditorEvent::Failed { operation, message: err.to_string() });
        err.into()
    }
}
