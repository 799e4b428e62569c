use ulid::Ulid;

/// Generates a new ULID-based ID with the given prefix.
///
/// # Examples
/// ```
/// let id = carrel_common::id::prefixed_ulid("conn");
/// assert!(id.starts_with("conn_"));
/// ```
pub fn prefixed_ulid(prefix: &str) -> String {
    format!("{}_{}", prefix, Ulid::new())
}

/// Marker trait for types that represent a prefixed ID.
pub trait PrefixedId {
    const PREFIX: &'static str;

    fn generate() -> String {
        prefixed_ulid(Self::PREFIX)
    }
}

/// Well-known ID prefixes.
pub mod prefix {
    /// A live gateway connection (one WebSocket session).
    pub const CONNECTION: &str = "conn";
}

/// Identifier of a single real-time client connection.
pub struct ConnectionId;

impl PrefixedId for ConnectionId {
    const PREFIX: &'static str = prefix::CONNECTION;
}
