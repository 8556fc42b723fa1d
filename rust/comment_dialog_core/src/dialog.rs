//! The dialog around a [`CommentEditor`]: user commands, keyboard
//! shortcuts, notices, link candidates and the one-dialog-at-a-time manager.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::api::CommentStore;
use crate::comment::CommentId;
use crate::config::{DialogConfig, Features};
use crate::editor::{CommentEditor, EditorOptions};
use crate::error::{EditorError, Result};
use crate::linking::{CandidatePool, LinkRequest, LinkResults};

pub type DialogId = u64;

static NEXT_DIALOG_ID: AtomicU64 = AtomicU64::new(1);

pub const TITLE: &str = "Your comment";
pub const TITLE_UNSAVED: &str = "Your comment (unsaved)";
pub const UNSAVED_CHANGES_PROMPT: &str = "You have unsaved changes. Are you sure you want to exit?";
pub const READ_ONLY_NOTICE: &str = "Review Board is currently in read-only mode.";

/// What the dialog needs from the page hosting it.
pub trait DialogHost {
    /// Ask the user a yes/no question.
    fn confirm(&self, message: &str) -> bool;

    fn alert(&self, message: &str);

    /// Live content of the text widget, if it holds edits not yet pushed to
    /// the editor.
    fn current_text(&self) -> Option<String> { None }
}

/// A key press as reported by the page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyPress {
    pub key: String,
    pub ctrl: bool,
    pub alt: bool,
    pub meta: bool,
    pub shift: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum KeyAction {
    Cancel,
    Save,
    ToggleOpenIssue,
    ToggleRichText,
}

pub fn key_action(press: &KeyPress) -> Option<KeyAction> {
    match press.key.as_str() {
        "Escape" => Some(KeyAction::Cancel),
        "Enter" if press.ctrl || press.meta => Some(KeyAction::Save),
        "i" | "I" if press.alt || press.meta => Some(KeyAction::ToggleOpenIssue),
        "m" | "M" if press.alt || press.meta => Some(KeyAction::ToggleRichText),
        _ => None,
    }
}

/// Why the user cannot comment right now.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Notice {
    Login { url: String },
    ReadOnly,
    Draft { url: String },
}

impl Notice {
    pub fn html(&self) -> String {
        match self {
            Notice::Login { url } => format!(
                r#"You must <a href="{}">log in</a> to post a comment."#,
                html_escape::encode_double_quoted_attribute(url)
            ),
            Notice::ReadOnly => READ_ONLY_NOTICE.to_string(),
            Notice::Draft { url } => format!(
                r#"The review request's current <a href="{}">draft</a> needs to be published before you can comment."#,
                html_escape::encode_double_quoted_attribute(url)
            ),
        }
    }
}

/// Which buttons the dialog shows and enables.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DialogControls {
    pub save_visible: bool,
    pub save_enabled: bool,
    pub cancel_visible: bool,
    pub delete_visible: bool,
    pub delete_enabled: bool,
    pub close_visible: bool,
    pub verify_visible: bool,
    /// Issue-status buttons on the published comments.
    pub issue_actions_visible: bool,
}

#[derive(Debug)]
pub struct CommentDialog {
    id: DialogId,
    editor: CommentEditor,
    features: Features,
    pool: Option<CandidatePool>,
    link_menu_open: bool,
    closed: bool,
}

impl CommentDialog {
    pub fn new(config: &DialogConfig, options: EditorOptions) -> Self {
        let editor = CommentEditor::new(config.session.clone(), config.review_request.clone(), options);
        Self::with_editor(editor, config.features.clone())
    }

    pub fn with_editor(editor: CommentEditor, features: Features) -> Self {
        Self {
            id: NEXT_DIALOG_ID.fetch_add(1, Ordering::Relaxed),
            editor,
            features,
            pool: None,
            link_menu_open: false,
            closed: false,
        }
    }

    pub fn id(&self) -> DialogId { self.id }
    pub fn editor(&self) -> &CommentEditor { &self.editor }
    pub fn editor_mut(&mut self) -> &mut CommentEditor { &mut self.editor }
    pub fn is_closed(&self) -> bool { self.closed }
    pub fn pool(&self) -> Option<&CandidatePool> { self.pool.as_ref() }
    pub fn link_menu_open(&self) -> bool { self.link_menu_open }

    /// Start editing if the user may. A dialog that fails to open is closed.
    pub fn open(&mut self) -> Result<()> {
        if !self.editor.can_edit() {
            return Ok(());
        }
        if let Err(err) = self.editor.begin_edit() {
            self.close();
            return Err(err);
        }
        debug!(dialog_id = self.id, "comment dialog opened");
        Ok(())
    }

    pub fn title(&self) -> &'static str {
        if self.editor.dirty() {
            TITLE_UNSAVED
        } else {
            TITLE
        }
    }

    pub fn notice(&self) -> Option<Notice> {
        let session = self.editor.session();
        let review_request = self.editor.review_request();
        if !session.authenticated {
            Some(Notice::Login { url: session.login_url.clone() })
        } else if session.read_only {
            Some(Notice::ReadOnly)
        } else if review_request.has_draft {
            Some(Notice::Draft { url: review_request.review_url.clone() })
        } else {
            None
        }
    }

    pub fn controls(&self) -> DialogControls {
        let e = &self.editor;
        DialogControls {
            save_visible: e.can_edit(),
            save_enabled: e.can_save(),
            cancel_visible: e.can_edit(),
            delete_visible: e.can_delete(),
            delete_enabled: e.can_delete(),
            close_visible: !e.can_edit(),
            verify_visible: self.features.issue_verification,
            issue_actions_visible: e.review_request().issues_interactive,
        }
    }

    pub fn toggle_link_menu(&mut self) -> bool {
        self.link_menu_open = !self.link_menu_open;
        self.link_menu_open
    }

    /// The fetch that fills this dialog's link list.
    pub fn link_request(&self) -> LinkRequest {
        let parent_ids = self.editor.comment().map(|c| c.borrow().parent_ids()).unwrap_or_default();
        LinkRequest {
            dialog_id: self.id,
            review_request_id: self.editor.review_request().id,
            parent_ids,
        }
    }

    /// Install fetched link candidates. Results for another dialog, or
    /// arriving after this one closed, are dropped.
    pub fn apply_link_results(&mut self, results: LinkResults) -> bool {
        if self.closed || results.dialog_id != self.id {
            debug!(dialog_id = self.id, result_dialog = results.dialog_id, "ignoring stale link results");
            return false;
        }
        self.editor.set_other_comments(results.pool.all().to_vec());
        self.pool = Some(results.pool);
        true
    }

    /// Flip a link checkbox and update the editor's linked comments.
    pub fn toggle_link(&mut self, id: CommentId) -> Option<bool> {
        let pool = self.pool.as_mut()?;
        let checked = pool.toggle(id)?;
        pool.apply_to(&mut self.editor);
        Some(checked)
    }

    pub fn update_issue_status(&mut self, comment_id: CommentId, status: &str) {
        self.editor.update_issue_status(comment_id, status);
    }

    /// Save and close once the save settles. Does nothing unless the comment
    /// can be saved. Persistence failures are also shown to the user.
    pub async fn save(&mut self, host: &dyn DialogHost, store: &dyn CommentStore) -> Result<()> {
        if let Some(text) = host.current_text() {
            self.editor.set_text(text);
        }
        if let Some(pool) = &self.pool {
            pool.apply_to(&mut self.editor);
        }

        if !self.editor.can_save() {
            return Ok(());
        }
        let result = self.editor.save(store).await;
        if let Err(EditorError::Persistence(err)) = &result {
            host.alert(&format!("Error saving comment: {err}"));
        }
        self.close();
        result
    }

    /// Cancel, asking first when there are unsaved changes. Returns whether
    /// the dialog closed.
    pub async fn cancel(&mut self, host: &dyn DialogHost, store: &dyn CommentStore) -> bool {
        if self.editor.dirty() && !host.confirm(UNSAVED_CHANGES_PROMPT) {
            return false;
        }
        self.editor.cancel(store).await;
        self.close();
        true
    }

    /// Delete and close. Does nothing unless the comment can be deleted.
    pub async fn delete(&mut self, store: &dyn CommentStore) -> Result<()> {
        if !self.editor.can_delete() {
            return Ok(());
        }
        let result = self.editor.delete_comment(store).await;
        self.close();
        result
    }

    pub async fn handle_key(
        &mut self,
        press: &KeyPress,
        host: &dyn DialogHost,
        store: &dyn CommentStore,
    ) -> Result<Option<KeyAction>> {
        let Some(action) = key_action(press) else { return Ok(None) };
        match action {
            KeyAction::Cancel => {
                self.cancel(host, store).await;
            }
            KeyAction::Save => self.save(host, store).await?,
            KeyAction::ToggleOpenIssue if self.editor.editing() => {
                let open_issue = !self.editor.open_issue();
                self.editor.set_open_issue(open_issue);
            }
            KeyAction::ToggleRichText if self.editor.editing() => {
                let rich_text = !self.editor.rich_text();
                self.editor.set_rich_text(rich_text);
            }
            _ => return Ok(None),
        }
        Ok(Some(action))
    }

    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.pool = None;
        self.link_menu_open = false;
        self.editor.close();
        debug!(dialog_id = self.id, "comment dialog closed");
    }
}

/// Keeps at most one comment dialog open.
#[derive(Default)]
pub struct DialogManager {
    active: Option<CommentDialog>,
    on_closed: Vec<Box<dyn FnOnce(DialogId)>>,
}

impl DialogManager {
    pub fn new() -> Self { Self::default() }

    pub fn active(&self) -> Option<&CommentDialog> { self.active.as_ref().filter(|d| !d.is_closed()) }

    pub fn active_mut(&mut self) -> Option<&mut CommentDialog> {
        self.reap();
        self.active.as_mut()
    }

    /// Run `callback` the next time the active dialog closes.
    pub fn on_closed(&mut self, callback: impl FnOnce(DialogId) + 'static) { self.on_closed.push(Box::new(callback)); }

    /// Close the active dialog, run the queued close callbacks, then open
    /// `next`.
    pub fn replace(&mut self, mut next: CommentDialog) -> Result<DialogId> {
        self.close_active();
        next.open()?;
        let id = next.id();
        self.active = Some(next);
        Ok(id)
    }

    pub fn close_active(&mut self) {
        if let Some(mut dialog) = self.active.take() {
            dialog.close();
            self.closed(dialog.id());
        }
    }

    fn reap(&mut self) {
        if self.active.as_ref().is_some_and(CommentDialog::is_closed) {
            self.close_active();
        }
    }

    fn closed(&mut self, id: DialogId) {
        for callback in self.on_closed.drain(..) {
            callback(id);
        }
    }
}
