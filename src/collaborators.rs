/// Contracts with the systems a detection run depends on but does not own
use crate::transcription::{TimingTable, TranscriptSegment};
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Basic video information from the host site
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoInfo {
    pub title: String,
    /// Uploader identifier
    pub owner_id: String,
}

/// Link attached to the pinned comment
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JumpLink {
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub app_name: String,
    #[serde(default)]
    pub pc_url: Option<String>,
    #[serde(default)]
    pub goods_item_id: Option<String>,
    /// Keyword-search link rather than a real destination
    #[serde(default)]
    pub is_word_search: bool,
}

impl JumpLink {
    /// Whether the link points at the site's own storefront.
    ///
    /// Only an explicitly empty `pc_url` without a goods id marks a plain link.
    pub fn is_official_product(&self) -> bool {
        self.goods_item_id.is_some() || self.pc_url.as_deref() != Some("")
    }
}

/// Pinned comment and its links
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TopComment {
    pub message: String,
    #[serde(default)]
    pub jump_links: Vec<JumpLink>,
}

/// What the model is told about one pinned-comment link
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LinkSummary {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_link: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_product_link: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_official_product_link: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// Payload for an ad detection request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetectionRequest {
    pub title: String,
    pub top_comment: Option<String>,
    pub link_messages: BTreeMap<String, LinkSummary>,
    pub captions: BTreeMap<usize, String>,
    /// Product names extracted up front in restricted mode
    #[serde(skip_serializing_if = "Option::is_none")]
    pub good_names: Option<Vec<String>>,
}

/// Host-site metadata
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    async fn get_video_info(&self, video_id: &str) -> Result<VideoInfo>;

    /// Pinned comment, if the video has one
    async fn get_top_comment(&self, video_id: &str) -> Result<Option<TopComment>>;

    /// Official captions, if the video has any
    async fn get_captions(&self, video_id: &str) -> Result<Option<TimingTable>>;
}

/// Speech-to-text fallback when no captions exist
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, video_id: &str) -> Result<Vec<TranscriptSegment>>;
}

/// The language model; replies are untrusted text
#[async_trait]
pub trait AiProvider: Send + Sync {
    async fn detect(&self, request: &DetectionRequest) -> Result<String>;

    async fn extract_product_name(&self, ad_text: &str) -> Result<String>;
}

/// Uploaders whose videos are never analyzed
#[async_trait]
pub trait WhitelistProvider: Send + Sync {
    async fn is_whitelisted(&self, owner_id: &str) -> bool;
}

/// Whitelist held in configuration
#[derive(Debug, Clone, Default)]
pub struct StaticWhitelist {
    owners: HashSet<String>,
}

impl StaticWhitelist {
    pub fn new<I, S>(owners: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            owners: owners.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl WhitelistProvider for StaticWhitelist {
    async fn is_whitelisted(&self, owner_id: &str) -> bool {
        self.owners.contains(owner_id)
    }
}

/// Key under which pinned-comment facts without a link are reported
pub const PINNED_COMMENT_KEY: &str = "pinned_comment";

/// Summarize the pinned comment's links for the model
pub fn summarize_links(comment: Option<&TopComment>) -> BTreeMap<String, LinkSummary> {
    let mut messages = BTreeMap::new();
    let Some(comment) = comment else {
        return messages;
    };

    if comment.jump_links.is_empty() {
        if !comment.message.is_empty() {
            messages.insert(
                PINNED_COMMENT_KEY.to_string(),
                LinkSummary {
                    has_link: Some(false),
                    ..LinkSummary::default()
                },
            );
        }
        return messages;
    }

    for link in &comment.jump_links {
        if link.is_word_search {
            messages.insert(
                PINNED_COMMENT_KEY.to_string(),
                LinkSummary {
                    is_product_link: Some(false),
                    ..LinkSummary::default()
                },
            );
            continue;
        }

        let summary = LinkSummary {
            is_official_product_link: Some(link.is_official_product()),
            platform: (!link.app_name.is_empty()).then(|| link.app_name.clone()),
            title: (!link.title.is_empty()).then(|| link.title.clone()),
            ..LinkSummary::default()
        };
        messages.insert(link.url.clone(), summary);
    }

    messages
}
