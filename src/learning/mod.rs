//! Learning engine: the topic catalog, the topic scheduler, and the daily plan.
//!
//! Everything here is pure. The [`TopicCatalog`] is built once at startup and
//! shared read-only behind an `Arc`; selecting the next topic only looks at the
//! learner's history.

pub mod plan;

use std::collections::HashSet;

pub use self::plan::{generate_plan, greeting_reply, GREETING_PREFIX};

/// Topics offered in rotation, in the order they are handed out.
pub const DEFAULT_TOPICS: [&str; 10] = [
    "Git & GitHub",
    "APIs with Postman",
    "Linux Basics",
    "SQL in 24 hrs",
    "Python Crash Course",
    "Financial Statements",
    "Prompt Engineering",
    "Figma UI Design",
    "Startup Idea Validation",
    "Intro to Blockchain",
];

/// Topic returned once every catalog entry has been presented.
pub const FALLBACK_TOPIC: &str = "Review & Reflect Day";

/// Fixed, ordered list of learning topics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicCatalog {
    topics: Vec<String>,
}

impl TopicCatalog {
    /// Build a catalog from an ordered list of topic names.
    ///
    /// Duplicate names are dropped; the first occurrence keeps its position.
    pub fn new<I, S>(topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let topics = topics
            .into_iter()
            .map(Into::into)
            .filter(|t: &String| seen.insert(t.clone()))
            .collect();
        Self { topics }
    }

    /// Topics in hand-out order.
    pub fn topics(&self) -> &[String] {
        &self.topics
    }

    /// Number of topics in the catalog.
    pub fn len(&self) -> usize {
        self.topics.len()
    }

    /// Whether the catalog has no topics at all.
    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    /// Pick the next topic for a learner.
    ///
    /// Returns the first catalog entry that does not appear anywhere in
    /// `history`, or [`FALLBACK_TOPIC`] when the catalog is exhausted.
    pub fn select_topic<S: AsRef<str>>(&self, history: &[S]) -> String {
        let seen: HashSet<&str> = history.iter().map(AsRef::as_ref).collect();
        self.topics
            .iter()
            .find(|t| !seen.contains(t.as_str()))
            .cloned()
            .unwrap_or_else(|| FALLBACK_TOPIC.to_owned())
    }

    /// Whether `topic` is the exhausted-catalog fallback rather than a real entry.
    pub fn is_fallback(&self, topic: &str) -> bool {
        topic == FALLBACK_TOPIC && !self.topics.iter().any(|t| t == FALLBACK_TOPIC)
    }
}

impl Default for TopicCatalog {
    fn default() -> Self {
        Self::new(DEFAULT_TOPICS)
    }
}

/// Pick the next topic from the default catalog.
pub fn select_topic<S: AsRef<str>>(history: &[S]) -> String {
    TopicCatalog::default().select_topic(history)
}
