//! Interest topics and topic-selection parsing.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A normalised interest tag (trimmed, lower-case, non-empty).
///
/// Two clients can only be paired if they share at least one topic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Topic(String);

impl Topic {
    /// Normalises `raw` into a topic, returning `None` when it is blank.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let normalised = raw.trim().to_lowercase();
        if normalised.is_empty() {
            None
        } else {
            Some(Self(normalised))
        }
    }

    /// Returns the topic name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Topic {
    /// The catch-all `random` topic.
    fn default() -> Self {
        Self(String::from("random"))
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The ordered, de-duplicated set of topics a connection joined with.
///
/// Order is the client's selection order; the first topic is used as the
/// nickname theme hint.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(transparent)]
pub struct TopicSet(Vec<Topic>);

impl TopicSet {
    /// Builds a topic set from raw names.
    ///
    /// Blank names are dropped, duplicates collapse onto their first
    /// occurrence and at most `max` topics are kept. An empty result falls
    /// back to `default`.
    #[must_use]
    pub fn from_names<I, S>(names: I, default: &Topic, max: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = BTreeSet::new();
        let topics: Vec<Topic> = names
            .into_iter()
            .filter_map(|name| Topic::parse(name.as_ref()))
            .filter(|topic| seen.insert(topic.clone()))
            .take(max.max(1))
            .collect();

        if topics.is_empty() {
            Self(vec![default.clone()])
        } else {
            Self(topics)
        }
    }

    /// Returns the first selected topic.
    #[must_use]
    pub fn primary(&self) -> Option<&Topic> {
        self.0.first()
    }

    /// Returns `true` if `topic` is part of the set.
    #[must_use]
    pub fn contains(&self, topic: &Topic) -> bool {
        self.0.contains(topic)
    }

    /// Iterates over the topics in selection order.
    pub fn iter(&self) -> impl Iterator<Item = &Topic> {
        self.0.iter()
    }

    /// Number of topics in the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the set holds no topic.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
