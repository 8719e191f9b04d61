use std::fmt;

use serde::Serialize;
use url::Url;

/// A discovered post. Produced by the feed parser, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Post {
    pub id: String,
    pub link: String,
    pub tags: Vec<String>,
}

impl Post {
    pub fn new(id: impl Into<String>, link: impl Into<String>, tags: Vec<String>) -> Self {
        Self {
            id: id.into(),
            link: link.into(),
            tags,
        }
    }

    /// Builds an untagged record from a post link such as `https://host/p/<code>/`.
    ///
    /// The identifier is the segment after `/p/` when present, otherwise the
    /// link itself.
    pub fn from_link(link: &str) -> Self {
        let id = shortcode_from_link(link).unwrap_or_else(|| link.to_string());
        Self {
            id,
            link: link.to_string(),
            tags: Vec::new(),
        }
    }
}

impl fmt::Display for Post {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.tags.is_empty() {
            write!(f, "{} ({})", self.id, self.link)
        } else {
            write!(f, "{} ({}) #{}", self.id, self.link, self.tags.join(" #"))
        }
    }
}

fn shortcode_from_link(link: &str) -> Option<String> {
    let path = match Url::parse(link) {
        Ok(url) => url.path().to_string(),
        Err(_) => link.to_string(),
    };
    let mut segments = path.split('/').filter(|segment| !segment.is_empty());
    while let Some(segment) = segments.next() {
        if segment == "p" || segment == "reel" {
            return segments.next().map(str::to_string);
        }
    }
    None
}

/// An account the owner follows.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Account {
    pub username: String,
    pub profile_link: String,
}

impl Account {
    pub fn new(username: impl Into<String>, profile_link: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            profile_link: profile_link.into(),
        }
    }
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.username)
    }
}
