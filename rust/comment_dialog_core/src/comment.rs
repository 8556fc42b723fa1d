//! Comment records: the entity being edited, its published siblings, and the
//! JSON linkage stored in `extra_data.parentComments`.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub type CommentId = u64;

/// Free-form extension data stored alongside a comment.
pub type ExtraData = Map<String, Value>;

/// Extra-data key holding the JSON-encoded linkage to other comments.
pub const PARENT_COMMENTS_KEY: &str = "parentComments";
/// Extra-data key mirroring the editor's "require verification" checkbox.
pub const REQUIRE_VERIFICATION_KEY: &str = "require_verification";

/// Marker stored when a comment explicitly links to nothing.
const EMPTY_LINKAGE: &str = "{}";

/// The artifact a comment is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommentKind {
    FileAttachment,
    Diff,
    Screenshot,
}

impl CommentKind {
    /// Fetch order used when gathering sibling comments.
    pub const ALL: [CommentKind; 3] = [CommentKind::FileAttachment, CommentKind::Diff, CommentKind::Screenshot];

    /// Path segment of the comment list resource.
    pub fn resource_path(self) -> &'static str {
        match self {
            CommentKind::FileAttachment => "file-attachment-comments",
            CommentKind::Diff => "diff-comments",
            CommentKind::Screenshot => "screenshot-comments",
        }
    }

    /// Key of the comment list in a listing payload.
    pub fn list_key(self) -> &'static str {
        match self {
            CommentKind::FileAttachment => "file_attachment_comments",
            CommentKind::Diff => "diff_comments",
            CommentKind::Screenshot => "screenshot_comments",
        }
    }

    /// Key of a single comment in an item payload.
    pub fn item_key(self) -> &'static str {
        match self {
            CommentKind::FileAttachment => "file_attachment_comment",
            CommentKind::Diff => "diff_comment",
            CommentKind::Screenshot => "screenshot_comment",
        }
    }

    /// Value of the `reply_type` query parameter for replies.
    pub fn reply_type(self) -> &'static str {
        match self {
            CommentKind::FileAttachment => "file_attachment_comments",
            CommentKind::Diff => "diff_comments",
            CommentKind::Screenshot => "screenshot_comments",
        }
    }
}

impl fmt::Display for CommentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.resource_path())
    }
}

/// The comment entity being edited.
///
/// `raw_text` and `markdown_text` are the two stored representations of the
/// text a server may send alongside the rendered `text`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    #[serde(default)]
    pub id: Option<CommentId>,
    pub kind: CommentKind,
    #[serde(default)]
    pub review_id: Option<u64>,
    #[serde(default)]
    pub loaded: bool,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub raw_text: Option<String>,
    #[serde(default)]
    pub markdown_text: Option<String>,
    #[serde(default)]
    pub rich_text: bool,
    #[serde(default)]
    pub issue_opened: Option<bool>,
    #[serde(default)]
    pub extra_data: ExtraData,
}

/// Shared, caller-owned reference to a comment entity.
pub type CommentHandle = Rc<RefCell<Comment>>;

impl Comment {
    pub fn new(kind: CommentKind) -> Self {
        Self {
            id: None,
            kind,
            review_id: None,
            loaded: false,
            text: String::new(),
            raw_text: None,
            markdown_text: None,
            rich_text: false,
            issue_opened: None,
            extra_data: ExtraData::new(),
        }
    }

    pub fn into_handle(self) -> CommentHandle { Rc::new(RefCell::new(self)) }

    /// True once the server has stored this comment.
    pub fn is_persisted(&self) -> bool { self.loaded && self.id.is_some() }

    /// An unpersisted comment without text can be thrown away on cancel.
    pub fn is_discardable(&self) -> bool { self.id.is_none() && self.text.is_empty() }

    /// The stored text without Markdown escaping.
    pub fn raw(&self) -> &str {
        match &self.raw_text {
            Some(t) if !t.is_empty() => t,
            _ => &self.text,
        }
    }

    /// The stored text with Markdown escaping applied.
    pub fn markdown(&self) -> String {
        match &self.markdown_text {
            Some(t) if !t.is_empty() => t.clone(),
            _ if self.rich_text => self.raw().to_string(),
            _ => crate::markdown::escape_markdown(self.raw()),
        }
    }

    pub fn set_extra_data(&mut self, key: &str, value: Value) {
        self.extra_data.insert(key.to_string(), value);
    }

    /// Identifiers of the comments this one links to.
    pub fn parent_ids(&self) -> Vec<CommentId> { parse_parent_ids(&self.extra_data) }
}

/// A published comment fetched from a review, offered as a link target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiblingComment {
    pub id: CommentId,
    pub kind: CommentKind,
    pub review_id: u64,
    pub text: String,
    #[serde(default)]
    pub extra_data: ExtraData,
    #[serde(default)]
    pub issue_opened: bool,
    #[serde(default)]
    pub issue_status: Option<String>,
    pub url: String,
}

impl SiblingComment {
    /// Whether this comment may be offered as a link target.
    pub fn is_link_candidate(&self) -> bool {
        !self.text.is_empty() && !has_parent_links(&self.extra_data)
    }
}

/// Entry written into the linkage JSON for each linked comment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParentLink {
    pub id: CommentId,
    pub text: String,
}

impl From<&SiblingComment> for ParentLink {
    fn from(c: &SiblingComment) -> Self {
        Self { id: c.id, text: c.text.clone() }
    }
}

/// Encode linked comments as a JSON object keyed by position.
pub fn encode_parent_links(parents: &[SiblingComment]) -> String {
    let links: BTreeMap<String, ParentLink> =
        parents.iter().enumerate().map(|(i, parent)| (i.to_string(), ParentLink::from(parent))).collect();
    serde_json::to_string(&links).unwrap_or_else(|_| EMPTY_LINKAGE.to_string())
}

/// True if `extra` records a non-empty linkage to other comments.
pub fn has_parent_links(extra: &ExtraData) -> bool {
    match extra.get(PARENT_COMMENTS_KEY) {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => {
            let s = s.trim();
            !s.is_empty() && s != EMPTY_LINKAGE
        }
        Some(Value::Object(o)) => !o.is_empty(),
        Some(Value::Array(a)) => !a.is_empty(),
        Some(_) => true,
    }
}

/// Parse the linkage in `extra` into comment identifiers, in stored order.
///
/// Malformed linkage yields no identifiers.
pub fn parse_parent_ids(extra: &ExtraData) -> Vec<CommentId> {
    let parsed = match extra.get(PARENT_COMMENTS_KEY) {
        Some(Value::String(s)) => match serde_json::from_str::<Value>(s) {
            Ok(v) => v,
            Err(err) => {
                tracing::debug!(%err, "ignoring malformed parentComments linkage");
                return Vec::new();
            }
        },
        Some(v @ (Value::Object(_) | Value::Array(_))) => v.clone(),
        _ => return Vec::new(),
    };

    let entries: Vec<&Value> = match &parsed {
        Value::Object(o) => {
            let mut keyed: Vec<(&String, &Value)> = o.iter().collect();
            keyed.sort_by_key(|(k, _)| k.parse::<usize>().unwrap_or(usize::MAX));
            keyed.into_iter().map(|(_, v)| v).collect()
        }
        Value::Array(a) => a.iter().collect(),
        _ => Vec::new(),
    };

    entries.into_iter().filter_map(|e| id_of(e.get("id")?)).collect()
}

fn id_of(v: &Value) -> Option<CommentId> {
    match v {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// A published comment displayed beside the dialog for reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishedComment {
    pub comment_id: CommentId,
    #[serde(default)]
    pub reply_to_id: Option<CommentId>,
    pub review_id: u64,
    pub text: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub issue_opened: bool,
    #[serde(default)]
    pub issue_status: Option<String>,
}

impl PublishedComment {
    /// Link that opens a reply to this comment on the review request page.
    pub fn reply_url(&self, review_request_url: &str, kind: CommentKind) -> String {
        format!(
            "{}?reply_id={}&reply_type={}",
            review_request_url,
            self.reply_to_id.unwrap_or(self.comment_id),
            kind.reply_type()
        )
    }
}
