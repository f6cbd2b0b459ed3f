pub mod http;

/// Current UTC timestamp as an RFC 3339 string.
pub fn timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}
