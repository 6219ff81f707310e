use std::fmt::{Display, Formatter};

/// Identifies one incarnation of a topic.
///
/// Deleting a topic and creating it again under the same name produces a new
/// resource name, so comparing resource names detects that the topic changed
/// underneath a running consumer.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TopicResourceName(String);

impl TopicResourceName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for TopicResourceName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TopicResourceName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for TopicResourceName {
    fn from(name: String) -> Self {
        Self(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topic {
    /// The name of this topic.
    pub name: String,

    /// The incarnation the consumer was started against.
    pub resource_name: TopicResourceName,
}
