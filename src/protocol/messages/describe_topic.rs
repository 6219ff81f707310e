use crate::topic::TopicResourceName;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescribeTopicRequest {
    /// The topic name.
    pub topic_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescribeTopicResponse {
    /// The current incarnation of the topic.
    pub topic_resource_name: TopicResourceName,

    /// Number of partitions, indexed `0..partition_count`.
    pub partition_count: i32,
}
