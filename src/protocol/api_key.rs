//! ApiKey to tag coordination requests.

use std::fmt::{Display, Formatter};

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy)]
pub enum ApiKey {
    /// Resolve a topic name to its resource name and partition count.
    DescribeTopic,

    /// Announce a worker to its consumer group.
    LockWorker,

    /// Snapshot the alive workers and the partitions each one holds.
    QueryWorker,

    /// Extend the worker lease and the locks of its partitions.
    Renew,
}

impl ApiKey {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::DescribeTopic => "describe_topic",
            Self::LockWorker => "lock_worker",
            Self::QueryWorker => "query_worker",
            Self::Renew => "renew",
        }
    }
}

impl Display for ApiKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_uses_snake_case_names() {
        for (key, want) in [
            (ApiKey::DescribeTopic, "describe_topic"),
            (ApiKey::LockWorker, "lock_worker"),
            (ApiKey::QueryWorker, "query_worker"),
            (ApiKey::Renew, "renew"),
        ] {
            assert_eq!(key.to_string(), want);
        }
    }
}
