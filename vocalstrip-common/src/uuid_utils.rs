//! UUID utilities

use uuid::Uuid;

/// Length of the short token appended to published file names
pub const SHORT_TOKEN_LEN: usize = 8;

/// Generate a new UUIDv4
pub fn generate() -> Uuid {
    Uuid::new_v4()
}

/// Short lowercase hex token taken from a fresh UUIDv4
pub fn short_token() -> String {
    let mut token = generate().simple().to_string();
    token.truncate(SHORT_TOKEN_LEN);
    token
}
