//! Cloud Pub/Sub channel for flow nodes.
//!
//! Provides a typed Pub/Sub abstraction for the connector nodes:
//! - `PubSubClient` trait for topic/subscription access (mockable in tests)
//! - `RestPubSubClient` speaking the v1 REST API for production
//! - `MockPubSub` for testing without the service
//! - `subscribe` pull loop delivering messages and errors to a listener

pub mod client;
pub mod config;
pub mod error;
pub mod mock;
pub mod rest;
pub mod subscriber;

// Re-exports for convenience.
pub use client::{PubSubClient, SubscriptionHandle, SubscriptionOptions, TopicHandle};
pub use config::PubSubConfig;
pub use error::{PubSubError, PubSubResult};
pub use mock::MockPubSub;
pub use rest::RestPubSubClient;
pub use subscriber::{PullSettings, Subscriber, SubscriberEvent, subscribe};
