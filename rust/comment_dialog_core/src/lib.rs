pub mod api;
pub mod comment;
pub mod config;
pub mod dialog;
pub mod editor;
pub mod error;
pub mod events;
pub mod http;
pub mod linking;
pub mod markdown;

#[cfg(test)]
pub(crate) mod test_support;

pub use api::{CommentStore, ReviewApi, ReviewSummary};
pub use comment::{Comment, CommentHandle, CommentId, CommentKind, ExtraData, PublishedComment, SiblingComment};
pub use config::{DialogConfig, Features, ReviewRequestContext, ServerConfig, Session};
pub use dialog::{CommentDialog, DialogControls, DialogHost, DialogId, DialogManager, KeyAction, KeyPress, Notice};
pub use editor::{CommentEditor, EditorOptions, EditorState};
pub use error::{ConfigError, EditorError, FetchError, PersistenceError, Precondition};
pub use events::{Attribute, EditorEvent, Operation};
pub use http::RestClient;
pub use linking::{gather_candidates, CandidatePool, LinkEntry, LinkRequest, LinkResults};
pub use markdown::escape_markdown;
