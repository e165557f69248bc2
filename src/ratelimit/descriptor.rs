//! Counter key generation and handling.

/// Default namespace prepended to every counter key.
pub const DEFAULT_KEY_PREFIX: &str = "ratelimit:";

/// Identifier used when a request carries no usable address signal.
pub const ANONYMOUS: &str = "anonymous";

/// A key that uniquely identifies one caller's counter under one policy.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CounterKey {
    /// Namespace shared by every key this limiter writes
    pub prefix: String,
    /// The policy the counter belongs to
    pub policy: String,
    /// The caller identifier
    pub identifier: String,
}

impl CounterKey {
    /// Create a new counter key.
    pub fn new(prefix: &str, policy: &str, identifier: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            policy: policy.to_string(),
            identifier: identifier.to_string(),
        }
    }

    /// The storage key, `<prefix><policy>:<identifier>`.
    pub fn to_string_key(&self) -> String {
        format!("{}{}:{}", self.prefix, self.policy, self.identifier)
    }
}

impl std::fmt::Display for CounterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_string_key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_key_to_string() {
        let key = CounterKey::new(DEFAULT_KEY_PREFIX, "auth", "1.2.3.4");
        assert_eq!(key.to_string_key(), "ratelimit:auth:1.2.3.4");
        assert_eq!(key.to_string(), "ratelimit:auth:1.2.3.4");
    }

    #[test]
    fn test_policies_partition_keys() {
        let auth = CounterKey::new(DEFAULT_KEY_PREFIX, "auth", "1.2.3.4");
        let public = CounterKey::new(DEFAULT_KEY_PREFIX, "public", "1.2.3.4");
        assert_ne!(auth.to_string_key(), public.to_string_key());
    }

    #[test]
    fn test_counter_key_equality() {
        let key1 = CounterKey::new("ns:", "public", "A");
        let key2 = CounterKey::new("ns:", "public", "A");
        assert_eq!(key1, key2);
    }
}
