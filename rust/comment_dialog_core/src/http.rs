//! REST client for the review server's comment and review resources.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use serde_json::Value;
use tracing::debug;

use crate::api::{CommentStore, ReviewApi, ReviewSummary};
use crate::comment::{Comment, CommentId, CommentKind, ExtraData, SiblingComment};
use crate::config::DialogConfig;
use crate::error::{FetchError, PersistenceError};

#[derive(Debug, Clone)]
pub struct RestClient {
    http: reqwest::Client,
    origin: String,
    review_request_id: u64,
    review_url: String,
}

/// Where link candidates point.
#[derive(Debug, Clone, PartialEq, Eq)]
struct LinkTargets<'a> {
    origin: &'a str,
    review_request_id: u64,
    review_url: &'a str,
}

impl RestClient {
    pub fn new(config: &DialogConfig) -> Result<Self, PersistenceError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        if let Some(token) = config.server.api_token.as_deref() {
            let value = HeaderValue::from_str(&format!("token {}", token.trim()))
                .map_err(|err| PersistenceError::Transport(format!("invalid api token: {err}")))?;
            headers.insert(AUTHORIZATION, value);
        }
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|err| PersistenceError::Transport(err.to_string()))?;
        Ok(Self {
            http,
            origin: config.server.origin().to_string(),
            review_request_id: config.review_request.id,
            review_url: config.review_request.review_url.clone(),
        })
    }

    fn reviews_url(&self, review_request_id: u64) -> String {
        format!("{}/api/review-requests/{}/reviews/", self.origin, review_request_id)
    }

    fn comments_url(&self, review_request_id: u64, review_id: u64, kind: CommentKind) -> String {
        format!("{}{}/{}/", self.reviews_url(review_request_id), review_id, kind.resource_path())
    }

    fn comment_url(&self, comment: &Comment) -> Result<String, PersistenceError> {
        let review_id = comment.review_id.ok_or(PersistenceError::Unattached)?;
        let base = self.comments_url(self.review_request_id, review_id, comment.kind);
        Ok(match comment.id {
            Some(id) => format!("{base}{id}/"),
            None => base,
        })
    }

    fn targets(&self) -> LinkTargets<'_> {
        LinkTargets { origin: &self.origin, review_request_id: self.review_request_id, review_url: &self.review_url }
    }

    async fn fetch_json(&self, url: &str) -> Result<Value, FetchError> {
        let response = self.http.get(url).send().await.map_err(|err| FetchError::Transport(err.to_string()))?;
        let status = response.status();
        let body = response.text().await.map_err(|err| FetchError::Transport(err.to_string()))?;
        if !status.is_success() {
            return Err(FetchError::Server(server_message(&body).unwrap_or_else(|| status.to_string())));
        }
        serde_json::from_str(&body).map_err(|err| FetchError::Decode(err.to_string()))
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<String, PersistenceError> {
        let response = request.send().await.map_err(|err| PersistenceError::Transport(err.to_string()))?;
        let status = response.status();
        let body = response.text().await.map_err(|err| PersistenceError::Transport(err.to_string()))?;
        if !status.is_success() {
            return Err(PersistenceError::Server(server_message(&body).unwrap_or_else(|| status.to_string())));
        }
        Ok(body)
    }
}

#[async_trait(?Send)]
impl ReviewApi for RestClient {
    async fn list_reviews(&self, review_request_id: u64) -> Result<Vec<ReviewSummary>, FetchError> {
        let body = self.fetch_json(&self.reviews_url(review_request_id)).await?;
        let reviews = body.get("reviews").cloned().unwrap_or(Value::Array(Vec::new()));
        serde_json::from_value(reviews).map_err(|err| FetchError::Decode(err.to_string()))
    }

    async fn list_comments(
        &self,
        review_request_id: u64,
        review_id: u64,
        kind: CommentKind,
    ) -> Result<Vec<SiblingComment>, FetchError> {
        let url = self.comments_url(review_request_id, review_id, kind);
        debug!(%url, "listing comments");
        let body = self.fetch_json(&url).await?;
        let targets = LinkTargets { review_request_id, ..self.targets() };
        parse_comment_list(kind, review_id, &body, &targets)
    }
}

#[async_trait(?Send)]
impl CommentStore for RestClient {
    async fn save(&self, comment: &Comment) -> Result<Comment, PersistenceError> {
        let url = self.comment_url(comment)?;
        let form = comment_form(comment);
        let request = if comment.id.is_some() { self.http.put(&url) } else { self.http.post(&url) };
        let body = self.send(request.form(&form)).await?;
        parse_stored_comment(comment, &body)
    }

    async fn destroy(&self, comment: &Comment) -> Result<(), PersistenceError> {
        if comment.id.is_none() {
            return Ok(());
        }
        let url = self.comment_url(comment)?;
        self.send(self.http.delete(&url)).await.map(|_| ())
    }

    async fn ready(&self, comment: &Comment) -> Result<Comment, PersistenceError> {
        if comment.loaded || comment.id.is_none() {
            return Ok(comment.clone());
        }
        let url = self.comment_url(comment)?;
        let body = self.send(self.http.get(&url)).await?;
        parse_stored_comment(comment, &body)
    }
}

/// The `err.msg` of an error payload.
fn server_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    value.pointer("/err/msg")?.as_str().map(str::to_string)
}

fn comment_form(comment: &Comment) -> Vec<(String, String)> {
    let mut form = vec![
        ("text".to_string(), comment.text.clone()),
        ("text_type".to_string(), if comment.rich_text { "markdown" } else { "plain" }.to_string()),
    ];
    if let Some(open) = comment.issue_opened {
        form.push(("issue_opened".to_string(), open.to_string()));
    }
    for (key, value) in &comment.extra_data {
        let value = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        form.push((format!("extra_data.{key}"), value));
    }
    form
}

/// Merge the server's copy of `sent` from an item payload.
fn parse_stored_comment(sent: &Comment, body: &str) -> Result<Comment, PersistenceError> {
    let value: Value = serde_json::from_str(body).map_err(|err| PersistenceError::Decode(err.to_string()))?;
    let item = value
        .get(sent.kind.item_key())
        .ok_or_else(|| PersistenceError::Decode(format!("missing {}", sent.kind.item_key())))?;

    let mut stored = sent.clone();
    stored.id = item.get("id").and_then(Value::as_u64).or(sent.id);
    stored.loaded = true;
    if let Some(text) = item.get("text").and_then(Value::as_str) {
        stored.text = text.to_string();
    }
    if let Some(text_type) = item.get("text_type").and_then(Value::as_str) {
        stored.rich_text = text_type == "markdown";
    }
    if let Some(open) = item.get("issue_opened").and_then(Value::as_bool) {
        stored.issue_opened = Some(open);
    }
    if let Some(Value::Object(extra)) = item.get("extra_data") {
        stored.extra_data = extra.clone();
    }
    Ok(stored)
}

fn parse_comment_list(
    kind: CommentKind,
    review_id: u64,
    body: &Value,
    targets: &LinkTargets<'_>,
) -> Result<Vec<SiblingComment>, FetchError> {
    let Some(items) = body.get(kind.list_key()).and_then(Value::as_array) else {
        return Err(FetchError::Decode(format!("missing {}", kind.list_key())));
    };
    Ok(items.iter().filter_map(|item| parse_sibling(kind, review_id, item, targets)).collect())
}

fn parse_sibling(kind: CommentKind, review_id: u64, item: &Value, targets: &LinkTargets<'_>) -> Option<SiblingComment> {
    let id: CommentId = item.get("id")?.as_u64()?;
    let url = match kind {
        CommentKind::Diff => {
            let href = item.pointer("/links/filediff/href").and_then(Value::as_str).unwrap_or_default();
            let revision = diff_revision(href).unwrap_or("1");
            format!("{}/r/{}/diff/{}/#index_header", targets.origin, targets.review_request_id, revision)
        }
        CommentKind::FileAttachment | CommentKind::Screenshot => targets.review_url.to_string(),
    };
    let extra_data = match item.get("extra_data") {
        Some(Value::Object(extra)) => extra.clone(),
        _ => ExtraData::new(),
    };
    Some(SiblingComment {
        id,
        kind,
        review_id,
        text: item.get("text").and_then(Value::as_str).unwrap_or_default().to_string(),
        extra_data,
        issue_opened: item.get("issue_opened").and_then(Value::as_bool).unwrap_or(false),
        issue_status: item.get("issue_status").and_then(Value::as_str).map(str::to_string),
        url,
    })
}

/// Diff revision from a filediff resource link: the path segment after
/// `diffs/`.
fn diff_revision(href: &str) -> Option<&str> {
    let (_, rest) = href.split_once("diffs/")?;
    rest.split('/').next().filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const TARGETS: LinkTargets<'static> =
        LinkTargets { origin: "https://rb.example.com", review_request_id: 42, review_url: "/r/42/" };

    #[test]
    fn revision_follows_diffs_segment() {
        assert_eq!(diff_revision("https://rb.example.com/api/review-requests/42/diffs/3/files/9/"), Some("3"));
        assert_eq!(diff_revision("/api/files/9/"), None);
        assert_eq!(diff_revision("/diffs//"), None);
    }

    #[test]
    fn parses_diff_comment_listing() {
        let body = json!({
            "diff_comments": [
                {
                    "id": 7,
                    "text": "nit",
                    "issue_opened": true,
                    "issue_status": "open",
                    "extra_data": {"parentComments": "{}"},
                    "links": {"filediff": {"href": "/api/review-requests/42/diffs/2/files/5/"}}
                },
                {"text": "no id"}
            ]
        });
        let comments = parse_comment_list(CommentKind::Diff, 3, &body, &TARGETS).unwrap();
        assert_eq!(comments.len(), 1);
        let c = &comments[0];
        assert_eq!((c.id, c.review_id), (7, 3));
        assert_eq!(c.url, "https://rb.example.com/r/42/diff/2/#index_header");
        assert_eq!(c.issue_status.as_deref(), Some("open"));
        assert!(c.is_link_candidate());
    }

    #[test]
    fn attachment_comments_link_to_review() {
        let body = json!({"screenshot_comments": [{"id": 1, "text": "blurry"}]});
        let comments = parse_comment_list(CommentKind::Screenshot, 3, &body, &TARGETS).unwrap();
        assert_eq!(comments[0].url, "/r/42/");

        let err = parse_comment_list(CommentKind::FileAttachment, 3, &body, &TARGETS).unwrap_err();
        assert_eq!(err, FetchError::Decode("missing file_attachment_comments".into()));
    }

    #[test]
    fn form_encodes_fields_and_extra_data() {
        let mut c = Comment::new(CommentKind::Diff);
        c.text = "hello".into();
        c.rich_text = true;
        c.issue_opened = Some(false);
        c.set_extra_data("mykey", json!("myvalue"));
        c.set_extra_data("require_verification", json!(true));

        let form = comment_form(&c);
        let get = |k: &str| form.iter().find(|(key, _)| key == k).map(|(_, v)| v.as_str());
        assert_eq!(get("text"), Some("hello"));
        assert_eq!(get("text_type"), Some("markdown"));
        assert_eq!(get("issue_opened"), Some("false"));
        assert_eq!(get("extra_data.mykey"), Some("myvalue"));
        assert_eq!(get("extra_data.require_verification"), Some("true"));
    }

    #[test]
    fn stored_comment_takes_server_identity() {
        let mut sent = Comment::new(CommentKind::FileAttachment);
        sent.review_id = Some(3);
        sent.text = "x".into();
        let body = r#"{"stat":"ok","file_attachment_comment":{"id":55,"text":"x","text_type":"plain","issue_opened":false}}"#;

        let stored = parse_stored_comment(&sent, body).unwrap();
        assert_eq!(stored.id, Some(55));
        assert!(stored.is_persisted());
        assert_eq!(stored.issue_opened, Some(false));

        assert!(matches!(parse_stored_comment(&sent, "{}"), Err(PersistenceError::Decode(_))));
    }

    #[test]
    fn error_payload_message() {
        assert_eq!(
            server_message(r#"{"stat":"fail","err":{"code":101,"msg":"You don't have permission for this"}}"#),
            Some("You don't have permission for this".to_string())
        );
        assert_eq!(server_message("<html>"), None);
    }

    #[test]
    fn unattached_comment_has_no_url() {
        let config = DialogConfig::from_json(r#"{"server": {"base_url": "https://rb.example.com"}}"#).unwrap();
        let client = RestClient::new(&config).unwrap();
        let comment = Comment::new(CommentKind::Diff);
        assert_eq!(client.comment_url(&comment), Err(PersistenceError::Unattached));

        let mut attached = comment;
        attached.review_id = Some(3);
        attached.id = Some(9);
        assert_eq!(
            client.comment_url(&attached).unwrap(),
            "https://rb.example.com/api/review-requests/0/reviews/3/diff-comments/9/"
        );
    }
}
