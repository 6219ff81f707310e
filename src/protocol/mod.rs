//! Request and response types of the coordination service.
//!
//! The transport is left to implementations of
//! [`CoordinationService`](crate::client::service::CoordinationService); these
//! types only carry the fields every implementation has to exchange.

pub mod api_key;
pub mod messages;
