// YouTube Data API v3 client for comment threads and replies

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::collector::config::ApiOptions;
use crate::collector::diagnostics::classify_http_failure;
use crate::collector::errors::CollectError;
use crate::collector::models::CommentRecord;
use crate::collector::traits::CommentThreadSource;

/// One page request against either list endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    /// Video id for threads, parent comment id for replies
    pub id: String,
    pub page_token: Option<String>,
    pub page_size: u32,
    /// Ask for embedded replies (threads only)
    pub include_replies: bool,
}

impl PageRequest {
    pub fn threads(video_id: &str, page_token: Option<String>, page_size: u32, include_replies: bool) -> Self {
        Self {
            id: video_id.to_string(),
            page_token,
            page_size,
            include_replies,
        }
    }

    pub fn replies(parent_id: &str, page_token: Option<String>, page_size: u32) -> Self {
        Self {
            id: parent_id.to_string(),
            page_token,
            page_size,
            include_replies: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentThreadListResponse {
    #[serde(default)]
    pub items: Vec<CommentThread>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentThread {
    #[serde(default)]
    pub id: String,
    pub snippet: ThreadSnippet,
    #[serde(default)]
    pub replies: Option<ThreadReplies>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadSnippet {
    pub top_level_comment: Comment,
    #[serde(default)]
    pub total_reply_count: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadReplies {
    #[serde(default)]
    pub comments: Vec<Comment>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentListResponse {
    #[serde(default)]
    pub items: Vec<Comment>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub snippet: CommentSnippet,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentSnippet {
    pub author_display_name: Option<String>,
    pub text_display: Option<String>,
    pub text_original: Option<String>,
    pub published_at: Option<String>,
    pub like_count: Option<u64>,
    pub parent_id: Option<String>,
}

impl Comment {
    pub fn new(id: &str, author: &str, text: &str) -> Self {
        Self {
            id: id.to_string(),
            snippet: CommentSnippet {
                author_display_name: Some(author.to_string()),
                text_display: Some(text.to_string()),
                ..CommentSnippet::default()
            },
        }
    }

    fn record_id(&self) -> Option<String> {
        Some(self.id.clone()).filter(|id| !id.is_empty())
    }

    fn text(&self) -> String {
        self.snippet
            .text_display
            .clone()
            .or_else(|| self.snippet.text_original.clone())
            .unwrap_or_default()
    }

    /// Record for a top-level comment; `fallback_id` is the thread id
    pub fn to_top_level(&self, fallback_id: &str) -> CommentRecord {
        let id = self
            .record_id()
            .or_else(|| Some(fallback_id.to_string()).filter(|id| !id.is_empty()));
        CommentRecord::top_level(id, self.snippet.author_display_name.clone().unwrap_or_default(), self.text())
            .with_published_at(self.snippet.published_at.clone())
            .with_like_count(self.snippet.like_count)
    }

    pub fn to_reply(&self, parent_id: &str) -> CommentRecord {
        CommentRecord::reply(
            self.record_id(),
            self.snippet.author_display_name.clone().unwrap_or_default(),
            self.text(),
            parent_id,
        )
        .with_published_at(self.snippet.published_at.clone())
        .with_like_count(self.snippet.like_count)
    }
}

impl CommentThread {
    pub fn new(top_level_comment: Comment, replies: Vec<Comment>, total_reply_count: u32) -> Self {
        Self {
            id: top_level_comment.id.clone(),
            snippet: ThreadSnippet {
                top_level_comment,
                total_reply_count,
            },
            replies: Some(ThreadReplies { comments: replies }),
        }
    }

    pub fn embedded_replies(&self) -> &[Comment] {
        self.replies
            .as_ref()
            .map(|r| r.comments.as_slice())
            .unwrap_or(&[])
    }

    /// The thread payload carries fewer replies than the thread has
    pub fn replies_truncated(&self) -> bool {
        (self.embedded_replies().len() as u32) < self.snippet.total_reply_count
    }
}

/// HTTPS client for `commentThreads.list` / `comments.list`
pub struct YouTubeDataClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl YouTubeDataClient {
    pub fn new(api_key: &str, options: &ApiOptions) -> Result<Self, CollectError> {
        let mut builder =
            reqwest::Client::builder().timeout(Duration::from_secs(options.timeout_seconds as u64));

        if let Some(proxy_url) = options.proxy.as_deref() {
            let proxy = reqwest::Proxy::all(proxy_url).map_err(|e| {
                CollectError::EnvironmentUnavailable(format!("Invalid proxy URL {}: {}", proxy_url, e))
            })?;
            builder = builder.proxy(proxy);
        }

        let client = builder.build().map_err(|e| {
            CollectError::EnvironmentUnavailable(format!("Failed to build HTTPS client: {}", e))
        })?;

        Ok(Self {
            client,
            endpoint: options.endpoint.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        resource: &str,
        params: Vec<(&'static str, String)>,
    ) -> Result<T, CollectError> {
        let url = format!("{}/{}", self.endpoint, resource);
        debug!(url = %url, ?params, "API request");

        let response = self
            .client
            .get(&url)
            .query(&params)
            .query(&[("key", self.api_key.as_str())])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(classify_http_failure(status.as_u16(), &body));
        }

        serde_json::from_str(&body)
            .map_err(|e| CollectError::Parse(format!("Invalid {} response: {}", resource, e)))
    }
}

fn common_params(request: &PageRequest) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("maxResults", request.page_size.to_string()),
        ("textFormat", "plainText".to_string()),
    ];
    if let Some(token) = &request.page_token {
        params.push(("pageToken", token.clone()));
    }
    params
}

#[async_trait]
impl CommentThreadSource for YouTubeDataClient {
    async fn fetch_threads(&self, request: &PageRequest) -> Result<CommentThreadListResponse, CollectError> {
        let part = if request.include_replies { "snippet,replies" } else { "snippet" };
        let mut params = common_params(request);
        params.push(("part", part.to_string()));
        params.push(("videoId", request.id.clone()));
        self.get_json("commentThreads", params).await
    }

    async fn fetch_replies(&self, request: &PageRequest) -> Result<CommentListResponse, CollectError> {
        let mut params = common_params(request);
        params.push(("part", "snippet".to_string()));
        params.push(("parentId", request.id.clone()));
        self.get_json("comments", params).await
    }
}
