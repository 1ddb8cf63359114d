// Comment extraction from rendered thread HTML
//
// YouTube has shipped several comment renderers over the years. Every field is
// looked up through an ordered list of selectors; the first one that yields a
// non-empty value wins.

use lazy_static::lazy_static;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use crate::collector::errors::CollectError;
use crate::collector::models::CommentRecord;
use crate::collector::utils::{normalize_whitespace, parse_like_count};

/// Thread containers, as queried in the live page
pub const THREAD_SELECTORS: &[&str] = &[
    "ytd-comment-thread-renderer",
    "ytd-comment-view-model",
    "ytd-comment-renderer",
];

/// Buttons that reveal replies inside a thread
pub const REPLY_EXPANDER_SELECTORS: &[&str] = &[
    "#more-replies button",
    "ytd-button-renderer#more-replies",
    "#more-replies",
    "ytd-continuation-item-renderer button",
];

/// "Read more" toggles on long comments
pub const READ_MORE_SELECTORS: &[&str] = &["tp-yt-paper-button#more", "#more.ytd-expander", "#read-more-button"];

const TOP_COMMENT_SELECTORS: &[&str] = &["#comment", "ytd-comment-renderer", "ytd-comment-view-model"];
const TEXT_SELECTORS: &[&str] = &[
    "#content-text",
    "yt-attributed-string#content-text",
    "#content .yt-core-attributed-string",
];
const AUTHOR_SELECTORS: &[&str] = &[
    "#author-text",
    "a.yt-simple-endpoint.style-scope.yt-formatted-string",
    "#header-author a",
];
const TIME_SELECTORS: &[&str] = &[
    "#published-time-text",
    "span.published-time-text",
    "#header-author yt-formatted-string.published-time-text a",
];
const LIKE_SELECTORS: &[&str] = &["#vote-count-middle"];
const REPLY_SELECTORS: &[&str] = &[
    "ytd-comment-replies-renderer ytd-comment-renderer",
    "ytd-comment-replies-renderer ytd-comment-view-model",
    "ytd-comment-renderer.reply",
];

fn compile(selectors: &[&str]) -> Vec<Selector> {
    selectors.iter().map(|s| Selector::parse(s).unwrap()).collect()
}

lazy_static! {
    static ref TOP_COMMENT: Vec<Selector> = compile(TOP_COMMENT_SELECTORS);
    static ref TEXT: Vec<Selector> = compile(TEXT_SELECTORS);
    static ref AUTHOR: Vec<Selector> = compile(AUTHOR_SELECTORS);
    static ref TIME: Vec<Selector> = compile(TIME_SELECTORS);
    static ref LIKES: Vec<Selector> = compile(LIKE_SELECTORS);
    static ref REPLIES: Vec<Selector> = compile(REPLY_SELECTORS);
}

/// Fields read from one rendered comment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedComment {
    pub author: String,
    pub text: String,
    pub published: Option<String>,
    pub likes: Option<u64>,
}

fn first_text(scope: ElementRef<'_>, selectors: &[Selector]) -> Option<String> {
    selectors.iter().find_map(|selector| {
        scope
            .select(selector)
            .map(|el| el.text().collect::<String>().trim().to_string())
            .find(|text| !text.is_empty())
    })
}

fn read_comment(scope: ElementRef<'_>) -> Result<RenderedComment, CollectError> {
    let text = first_text(scope, &TEXT).unwrap_or_default();
    let author = first_text(scope, &AUTHOR)
        .map(|a| normalize_whitespace(&a))
        .unwrap_or_default();

    if text.is_empty() && author.is_empty() {
        return Err(CollectError::ExtractionSkipped(
            "no author or text in rendered comment".to_string(),
        ));
    }

    Ok(RenderedComment {
        author,
        text,
        published: first_text(scope, &TIME).map(|t| normalize_whitespace(&t)),
        likes: first_text(scope, &LIKES).and_then(|l| parse_like_count(&l)),
    })
}

fn top_comment<'a>(root: ElementRef<'a>) -> ElementRef<'a> {
    TOP_COMMENT
        .iter()
        .find_map(|selector| root.select(selector).next())
        .unwrap_or(root)
}

/// Top-level comment of a thread fragment
pub fn parse_thread(fragment: &str) -> Result<RenderedComment, CollectError> {
    let html = Html::parse_fragment(fragment);
    read_comment(top_comment(html.root_element()))
}

/// Replies rendered inside a thread fragment, in page order. Unreadable
/// replies are skipped.
pub fn parse_replies(fragment: &str) -> Vec<RenderedComment> {
    let html = Html::parse_fragment(fragment);
    let root = html.root_element();

    let Some(elements) = REPLIES
        .iter()
        .map(|selector| root.select(selector).collect::<Vec<_>>())
        .find(|found| !found.is_empty())
    else {
        return Vec::new();
    };

    elements
        .into_iter()
        .filter_map(|el| match read_comment(el) {
            Ok(comment) => Some(comment),
            Err(e) => {
                debug!(error = %e, "reply skipped");
                None
            }
        })
        .collect()
}

impl RenderedComment {
    pub fn into_top_level(self) -> CommentRecord {
        CommentRecord::top_level(None, self.author, self.text)
            .with_published_at(self.published)
            .with_like_count(self.likes)
    }

    /// Rendered replies carry no ids; the parent is identified by its text
    pub fn into_reply(self, parent_text: &str) -> CommentRecord {
        CommentRecord::reply(None, self.author, self.text, parent_text)
            .with_published_at(self.published)
            .with_like_count(self.likes)
    }
}
