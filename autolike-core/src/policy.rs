use std::collections::HashSet;

use crate::config::FilterSection;
use crate::record::Post;

/// Decides whether a post qualifies for a like.
///
/// Implementations must be pure: the same post and configuration always
/// yield the same answer.
pub trait DecisionPolicy: Send + Sync {
    fn should_act(&self, post: &Post) -> bool;
}

impl<F> DecisionPolicy for F
where
    F: Fn(&Post) -> bool + Send + Sync,
{
    fn should_act(&self, post: &Post) -> bool {
        self(post)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl DecisionPolicy for AcceptAll {
    fn should_act(&self, _post: &Post) -> bool {
        true
    }
}

/// Rejects posts carrying any ignored tag. Matching is exact and case-sensitive.
#[derive(Debug, Clone, Default)]
pub struct IgnoreTags {
    ignored: HashSet<String>,
}

impl IgnoreTags {
    pub fn new<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ignored: tags.into_iter().map(Into::into).collect(),
        }
    }
}

impl DecisionPolicy for IgnoreTags {
    fn should_act(&self, post: &Post) -> bool {
        !post.tags.iter().any(|tag| self.ignored.contains(tag))
    }
}

pub fn policy_from_config(filter: &FilterSection) -> Box<dyn DecisionPolicy> {
    if filter.ignore_tags.is_empty() {
        Box::new(AcceptAll)
    } else {
        Box::new(IgnoreTags::new(filter.ignore_tags.iter().cloned()))
    }
}
