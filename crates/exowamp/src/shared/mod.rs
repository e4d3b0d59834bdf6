//! Concurrency primitives shared by the peer, endpoints and transports.

pub mod observable;
pub mod pending;
pub mod pending_map;
pub mod queue;
pub mod race;

pub use observable::Observable;
pub use pending::Cancelled;
pub use pending::Pending;
pub use pending_map::PendingMap;
pub use queue::Queue;
pub use race::Either;
pub use race::race;
