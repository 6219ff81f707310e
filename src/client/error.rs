use std::fmt::{Display, Formatter};

use thiserror::Error;

use crate::protocol::api_key::ApiKey;
use crate::topic::TopicResourceName;
use crate::worker::WorkerId;

/// What a failed request was about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestContext {
    /// Request for a topic.
    Topic(String),

    /// Request for a consumer group on one topic incarnation.
    Group {
        consumer_group: String,
        topic: TopicResourceName,
    },

    /// Request issued on behalf of one worker.
    Worker(WorkerId),
}

impl Display for RequestContext {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Topic(topic) => write!(f, "topic {topic}"),
            Self::Group {
                consumer_group,
                topic,
            } => write!(f, "group {consumer_group} on {topic}"),
            Self::Worker(worker_id) => write!(f, "worker {worker_id}"),
        }
    }
}

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("Topic '{topic}' does not exist")]
    TopicNotFound { topic: String },

    #[error("Topic resource name mismatch, expected {expected} but the service reports {actual}")]
    InvalidTopic {
        expected: TopicResourceName,
        actual: TopicResourceName,
    },

    #[error("Worker {worker_id} failed to register itself after {attempts} attempts")]
    RegisterFailed { worker_id: WorkerId, attempts: usize },

    #[error("Request {api_key} for {request} failed: {message}")]
    Request {
        api_key: ApiKey,
        request: RequestContext,
        message: String,
    },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl Error {
    /// Transient failure of one coordination RPC, e.g. a broken connection.
    pub fn request(api_key: ApiKey, request: RequestContext, message: impl Into<String>) -> Self {
        Self::Request {
            api_key,
            request,
            message: message.into(),
        }
    }

    /// The topic is gone, as opposed to the service being unreachable.
    pub fn is_topic_not_found(&self) -> bool {
        matches!(self, Self::TopicNotFound { .. })
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
