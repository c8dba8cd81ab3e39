//! Subscribed topic filters of a client session.

use heapless::{String, Vec};

use crate::util::topic_matches;

/// Maximum length for a single topic filter.
pub const MAX_TOPIC_LEN: usize = 128;

/// The filters a session has subscribed to.
///
/// The registry owns copies of the filter strings so a subscription outlives
/// the caller's topic buffer. Inbound PUBLISH packets are only routed to the
/// message handler when one of the filters matches their topic.
#[derive(Default)]
pub struct TopicRegistry<const MAX_TOPICS: usize> {
    topics: Vec<String<MAX_TOPIC_LEN>, MAX_TOPICS>,
}

impl<const MAX_TOPICS: usize> TopicRegistry<MAX_TOPICS> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `filter`, copying the string.
    ///
    /// Returns `false` if the registry is full or the filter is too long.
    /// Recording a filter that is already present is a no-op.
    pub fn add_topic(&mut self, filter: &str) -> bool {
        if self.contains(filter) {
            return true;
        }

        let mut owned = String::new();
        if owned.push_str(filter).is_err() {
            return false;
        }

        self.topics.push(owned).is_ok()
    }

    pub fn contains(&self, filter: &str) -> bool {
        self.iter().any(|t| t == filter)
    }

    /// Whether any recorded filter matches the concrete `topic`.
    pub fn matches(&self, topic: &str) -> bool {
        self.iter().any(|filter| topic_matches(filter, topic))
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.topics.iter().map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    pub fn clear(&mut self) {
        self.topics.clear();
    }
}
