//! Event id generation.

/// Returns a fresh, collision-resistant id (UUID v4, 122 random bits).
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
