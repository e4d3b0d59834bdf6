//! # Resources
//!
//! Subscriptions and registrations as returned by the router's
//! `wamp.router.subscribe` / `wamp.router.register` meta-procedures.

use serde::Deserialize;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResourceOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route: Option<Vec<String>>,
}

pub type SubscribeOptions = ResourceOptions;
pub type RegisterOptions = ResourceOptions;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "URI")]
    pub uri: String,
    #[serde(rename = "authorID", default)]
    pub author_id: String,
    #[serde(default)]
    pub options: ResourceOptions,
}

pub type Subscription = Resource;
pub type Registration = Resource;

/// Payload of a subscribe/register meta-call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewResourcePayload {
    #[serde(rename = "URI")]
    pub uri: String,
    pub options: ResourceOptions,
}
