use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SpanscopeError};

/// A Jaeger trace id: up to 32 hex digits. Jaeger drops leading zeros, so short ids are legal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TraceId(String);

impl TraceId {
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty()
            || trimmed.len() > 32
            || !trimmed.chars().all(|c| c.is_ascii_hexdigit())
        {
            return Err(SpanscopeError::Validation(format!(
                "invalid trace id: {input}"
            )));
        }
        Ok(Self(trimmed.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ids() {
        let full = TraceId::parse("4BF92F3577B34DA6A3CE929D0E0E4736").unwrap();
        let short = TraceId::parse("a3ce929d0e0e4736").unwrap();
        assert_eq!(full.as_str(), "4bf92f3577b34da6a3ce929d0e0e4736");
        assert_eq!(short.to_string(), "a3ce929d0e0e4736");
    }

    #[test]
    fn rejects_bad_ids() {
        assert!(TraceId::parse("").is_err());
        assert!(TraceId::parse("zzzz").is_err());
        assert!(TraceId::parse(&"a".repeat(33)).is_err());
    }
}
