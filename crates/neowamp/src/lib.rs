//! # NeoWAMP
//!
//! The data side of a WAMP-style RPC and pub/sub protocol: the closed set of
//! message kinds, the per-kind event shapes, router resources, URI syntax and
//! the wire codec. No runtime, no I/O.

pub mod codec;
pub mod error;
pub mod event;
pub mod id;
pub mod kind;
pub mod resource;
pub mod uri;

pub use codec::JsonSerializer;
pub use codec::Serializer;
pub use error::Error;
pub use error::Result;
pub use event::*;
pub use id::new_id;
pub use kind::MessageKind;
pub use resource::*;
