//! Cooperative partition ownership for stream consumers.
//!
//! Many independent worker processes share the partitions of one topic by
//! taking leases from a central coordination service. Workers never talk to
//! each other: every worker registers itself, periodically reads the partition
//! count and the group membership, computes how many partitions it should
//! serve and then steals idle partitions or releases surplus ones. A renew
//! loop keeps the worker lease and every held partition lock alive.
//!
//! The entry point is [`CoordinatorBuilder`](client::CoordinatorBuilder), which
//! produces a running [`WorkerCoordinator`](client::coordinator::WorkerCoordinator).
#![deny(
    rustdoc::broken_intra_doc_links,
    rust_2018_idioms,
    missing_debug_implementations
)]
#![warn(
    clippy::clone_on_ref_ptr,
    clippy::dbg_macro,
    clippy::explicit_iter_loop,
    clippy::future_not_send,
    clippy::todo,
    clippy::use_self
)]

mod backoff;

pub mod client;

pub mod protocol;

pub mod topic;

pub mod worker;

pub use backoff::BackoffConfig;
