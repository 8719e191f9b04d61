use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;
use thiserror::Error;

use crate::record::Post;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("payload is not valid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("payload is missing `{0}`")]
    MissingField(&'static str),
}

/// Turns the raw text of one feed page into post records.
pub trait FeedParser: Send + Sync {
    fn parse_feed(&self, raw: &str) -> Result<Vec<Post>, ParseError>;
}

/// Parser for the sectional explore-grid JSON payload.
#[derive(Debug, Clone)]
pub struct ExploreGridParser {
    base_url: String,
}

impl ExploreGridParser {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn post_from_media(&self, media: &Value) -> Option<Post> {
        let code = media.get("code").and_then(Value::as_str)?;
        let caption = media
            .get("caption")
            .and_then(|caption| caption.get("text"))
            .and_then(Value::as_str)
            .unwrap_or_default();
        Some(Post::new(
            code,
            format!("{}/p/{}/", self.base_url, code),
            extract_hashtags(caption),
        ))
    }
}

impl FeedParser for ExploreGridParser {
    fn parse_feed(&self, raw: &str) -> Result<Vec<Post>, ParseError> {
        let payload: Value = serde_json::from_str(raw)?;
        let sections = payload
            .get("sectional_items")
            .and_then(Value::as_array)
            .ok_or(ParseError::MissingField("sectional_items"))?;

        let mut seen = HashSet::new();
        let mut posts = Vec::new();
        for section in sections {
            let Some(content) = section.get("layout_content") else {
                continue;
            };
            for key in ["medias", "fill_items"] {
                let Some(items) = content.get(key).and_then(Value::as_array) else {
                    continue;
                };
                for item in items {
                    let Some(post) = item.get("media").and_then(|m| self.post_from_media(m))
                    else {
                        continue;
                    };
                    if seen.insert(post.id.clone()) {
                        posts.push(post);
                    }
                }
            }
        }
        Ok(posts)
    }
}

fn hashtag_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"#(\w+)").expect("valid regex"))
}

/// Hashtags in caption order, without duplicates. Case is preserved.
pub fn extract_hashtags(caption: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    hashtag_pattern()
        .captures_iter(caption)
        .filter_map(|captures| captures.get(1))
        .map(|tag| tag.as_str().to_string())
        .filter(|tag| seen.insert(tag.clone()))
        .collect()
}
