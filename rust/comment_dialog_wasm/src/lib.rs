use wasm_bindgen::prelude::*;
use comment_dialog_core::events::drain;
use futures::channel::mpsc::UnboundedReceiver;
use comment_dialog_core::{
    CandidatePool, Comment, CommentDialog, CommentKind, DialogConfig, EditorEvent, EditorOptions, KeyAction, KeyPress,
    LinkResults, PersistenceError, PublishedComment, SiblingComment,
};
use serde_json::Value;

fn js_err(err: impl std::fmt::Display) -> JsError { JsError::new(&err.to_string()) }

/// A comment dialog driven from JavaScript. Network round-trips happen on the
/// JS side; their outcomes are reported back through the `*_succeeded` and
/// `*_failed` methods.
#[wasm_bindgen]
pub struct Dialog {
    inner: CommentDialog,
    events: UnboundedReceiver<EditorEvent>,
}

#[wasm_bindgen]
impl Dialog {
    #[wasm_bindgen(constructor)]
    pub fn new(config_json: String, comment_json: String) -> Result<Dialog, JsError> {
        let config = DialogConfig::from_json(&config_json).map_err(js_err)?;
        let comment: Comment = serde_json::from_str(&comment_json).map_err(js_err)?;
        let options = EditorOptions { comment: Some(comment.into_handle()), ..Default::default() };
        let mut inner = CommentDialog::new(&config, options);
        let events = inner.editor_mut().subscribe();
        Ok(Dialog { inner, events })
    }

    pub fn id(&self) -> u64 { self.inner.id() }
    pub fn open(&mut self) -> Result<(), JsError> { self.inner.open().map_err(js_err) }
    pub fn close(&mut self) { self.inner.close() }
    pub fn is_closed(&self) -> bool { self.inner.is_closed() }

    pub fn title(&self) -> String { self.inner.title().to_string() }
    pub fn notice_html(&self) -> Option<String> { self.inner.notice().map(|n| n.html()) }
    pub fn controls_json(&self) -> String {
        serde_json::to_string(&self.inner.controls()).unwrap_or_else(|_| "{}".to_string())
    }

    // Fields
    pub fn text(&self) -> String { self.inner.editor().text().to_string() }
    pub fn set_text(&mut self, text: String) { self.inner.editor_mut().set_text(text) }
    pub fn rich_text(&self) -> bool { self.inner.editor().rich_text() }
    pub fn set_rich_text(&mut self, v: bool) { self.inner.editor_mut().set_rich_text(v) }
    pub fn open_issue(&self) -> bool { self.inner.editor().open_issue() }
    pub fn set_open_issue(&mut self, v: bool) { self.inner.editor_mut().set_open_issue(v) }
    pub fn require_verification(&self) -> bool { self.inner.editor().require_verification() }
    pub fn set_require_verification(&mut self, v: bool) { self.inner.editor_mut().set_require_verification(v) }
    pub fn set_extra_data(&mut self, key: String, value_json: String) -> Result<(), JsError> {
        let value: Value = serde_json::from_str(&value_json).map_err(js_err)?;
        self.inner.editor_mut().set_extra_data(&key, value);
        Ok(())
    }

    // Flags
    pub fn editing(&self) -> bool { self.inner.editor().editing() }
    pub fn dirty(&self) -> bool { self.inner.editor().dirty() }
    pub fn can_edit(&self) -> bool { self.inner.editor().can_edit() }
    pub fn can_save(&self) -> bool { self.inner.editor().can_save() }
    pub fn can_delete(&self) -> bool { self.inner.editor().can_delete() }

    pub fn comment_json(&self) -> String {
        match self.inner.editor().comment() {
            Some(c) => serde_json::to_string(&*c.borrow()).unwrap_or_else(|_| "null".to_string()),
            None => "null".to_string(),
        }
    }

    // Save
    pub fn begin_save(&mut self) -> Result<String, JsError> {
        let payload = self.inner.editor_mut().begin_save().map_err(js_err)?;
        serde_json::to_string(&payload).map_err(js_err)
    }
    pub fn save_succeeded(&mut self, stored_json: String) -> Result<(), JsError> {
        let stored: Comment = serde_json::from_str(&stored_json).map_err(js_err)?;
        self.inner.editor_mut().complete_save(Ok(stored)).map_err(js_err)
    }
    pub fn save_failed(&mut self, message: String) -> String {
        let _ = self.inner.editor_mut().complete_save(Err(PersistenceError::Server(message.clone())));
        format!("Error saving comment: {message}")
    }

    // Delete
    pub fn begin_delete(&mut self) -> Result<String, JsError> {
        let payload = self.inner.editor_mut().begin_delete().map_err(js_err)?;
        serde_json::to_string(&payload).map_err(js_err)
    }
    pub fn delete_succeeded(&mut self) -> Result<(), JsError> {
        self.inner.editor_mut().complete_delete(Ok(())).map_err(js_err)?;
        self.inner.close();
        Ok(())
    }
    pub fn delete_failed(&mut self, message: String) {
        let _ = self.inner.editor_mut().complete_delete(Err(PersistenceError::Server(message)));
    }

    // Cancel
    pub fn needs_confirmation(&self) -> bool { self.inner.editor().dirty() }
    /// Whether JS should destroy the comment before finishing the cancel.
    pub fn discardable(&self) -> bool {
        self.inner.editor().comment().is_some_and(|c| c.borrow().is_discardable())
    }
    pub fn finish_cancel(&mut self) {
        self.inner.editor_mut().finish_cancel();
        self.inner.close();
    }

    /// Toggles are applied here; `save` and `cancel` are returned for JS to
    /// run.
    pub fn key(&mut self, press_json: String) -> Result<Option<String>, JsError> {
        let press: KeyPress = serde_json::from_str(&press_json).map_err(js_err)?;
        let Some(action) = comment_dialog_core::dialog::key_action(&press) else { return Ok(None) };
        let editor = self.inner.editor_mut();
        match action {
            KeyAction::ToggleOpenIssue if editor.editing() => {
                let v = !editor.open_issue();
                editor.set_open_issue(v);
            }
            KeyAction::ToggleRichText if editor.editing() => {
                let v = !editor.rich_text();
                editor.set_rich_text(v);
            }
            KeyAction::ToggleOpenIssue | KeyAction::ToggleRichText => return Ok(None),
            KeyAction::Save | KeyAction::Cancel => {}
        }
        Ok(Some(serde_json::to_value(action).map_err(js_err)?.as_str().unwrap_or_default().to_string()))
    }

    // Links
    pub fn link_request_json(&self) -> String {
        let request = self.inner.link_request();
        serde_json::json!({
            "dialog_id": request.dialog_id,
            "review_request_id": request.review_request_id,
            "parent_ids": request.parent_ids,
        })
        .to_string()
    }
    pub fn apply_link_candidates(&mut self, dialog_id: u64, comments_json: String, failures: u32) -> Result<bool, JsError> {
        let comments: Vec<SiblingComment> = serde_json::from_str(&comments_json).map_err(js_err)?;
        let parent_ids = self.inner.link_request().parent_ids;
        let pool = CandidatePool::new(comments, &parent_ids, failures as usize);
        Ok(self.inner.apply_link_results(LinkResults { dialog_id, pool }))
    }
    pub fn link_entries_json(&self) -> String {
        match self.inner.pool() {
            Some(pool) => serde_json::to_string(pool.entries()).unwrap_or_else(|_| "[]".to_string()),
            None => "[]".to_string(),
        }
    }
    pub fn toggle_link(&mut self, id: u64) -> Option<bool> { self.inner.toggle_link(id) }
    pub fn toggle_link_menu(&mut self) -> bool { self.inner.toggle_link_menu() }

    pub fn set_published_comments(&mut self, comments_json: String, kind_json: String) -> Result<(), JsError> {
        let comments: Vec<PublishedComment> = serde_json::from_str(&comments_json).map_err(js_err)?;
        let kind: Option<CommentKind> = serde_json::from_str(&kind_json).map_err(js_err)?;
        self.inner.editor_mut().set_published_comments(comments, kind);
        Ok(())
    }
    pub fn update_issue_status(&mut self, comment_id: u64, status: String) {
        self.inner.update_issue_status(comment_id, &status)
    }

    /// Events emitted since the last call, as a JSON array.
    pub fn drain_events(&mut self) -> String {
        serde_json::to_string(&drain(&mut self.events)).unwrap_or_else(|_| "[]".to_string())
    }
}

#[wasm_bindgen]
pub fn escape_markdown(text: String) -> String { comment_dialog_core::escape_markdown(&text) }

#[cfg(test)]
mod tests {
    use super::*;
    use wasm_bindgen_test::*;

    wasm_bindgen_test::wasm_bindgen_test_configure!(run_in_browser);

    const CONFIG: &str = r#"{"server": {"base_url": "https://rb.example.com"},
        "session": {"authenticated": true},
        "review_request": {"id": 4, "review_url": "/r/4/"}}"#;

    #[wasm_bindgen_test]
    fn save_round_trip() {
        let mut d = Dialog::new(CONFIG.to_string(), r#"{"kind": "diff", "review_id": 2}"#.to_string()).unwrap();
        d.open().unwrap();
        d.set_text("looks good".to_string());
        assert!(d.can_save());
        assert_eq!(d.title(), "Your comment (unsaved)");

        let payload = d.begin_save().unwrap();
        assert!(payload.contains("\"looks good\""));
        d.save_succeeded(r#"{"id": 31, "kind": "diff", "review_id": 2, "loaded": true}"#.to_string()).unwrap();
        assert!(!d.dirty());
        assert!(d.can_delete());
        assert!(d.drain_events().contains("\"saved\""));
    }

    #[wasm_bindgen_test]
    fn published_comments_update_status() {
        let mut d = Dialog::new(CONFIG.to_string(), r#"{"kind": "diff"}"#.to_string()).unwrap();
        d.set_published_comments(
            r#"[{"comment_id": 9, "review_id": 1, "text": "old", "issue_opened": true, "issue_status": "open"}]"#
                .to_string(),
            r#""diff""#.to_string(),
        )
        .unwrap();
        d.update_issue_status(9, "resolved".to_string());
        assert!(d.drain_events().contains("\"publishedComments\""));
    }

    #[wasm_bindgen_test]
    fn stale_links_rejected() {
        let mut d = Dialog::new(CONFIG.to_string(), r#"{"kind": "screenshot"}"#.to_string()).unwrap();
        d.open().unwrap();
        let other = d.id() + 1000;
        assert!(!d.apply_link_candidates(other, "[]".to_string(), 0).unwrap());
        assert!(d.apply_link_candidates(d.id(), "[]".to_string(), 0).unwrap());
    }
}
