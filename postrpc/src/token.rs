use std::sync::{Mutex, PoisonError};

use rand::{RngCore, SeedableRng, TryRngCore, rngs::OsRng, rngs::SmallRng};
use uuid::{Builder, Uuid};

/// Correlation token matching a reply to the call that produced it.
///
/// 128 bits in the RFC 4122 v4 layout, 122 of them random.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Token(Uuid);

impl Token {
    #[must_use]
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Builder::from_random_bytes(bytes).into_uuid())
    }

    /// Parses the hyphenated form produced by `Display`.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }

    #[must_use]
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.hyphenated().fmt(f)
    }
}

/// Source of fresh correlation tokens.
///
/// Draws from the operating system CSPRNG. Whenever that source fails, a
/// `SmallRng` seeded on first use fills in.
#[derive(Debug, Default)]
pub struct TokenGenerator {
    fallback: Mutex<Option<SmallRng>>,
}

impl TokenGenerator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[allow(clippy::should_implement_trait)]
    pub fn next(&self) -> Token {
        let mut bytes = [0u8; 16];
        if let Err(e) = OsRng.try_fill_bytes(&mut bytes) {
            let mut fallback = self.fallback.lock().unwrap_or_else(PoisonError::into_inner);
            let rng = fallback.get_or_insert_with(|| {
                tracing::warn!("os rng unavailable ({e}), falling back to pseudo-random tokens");
                SmallRng::seed_from_u64(fallback_seed())
            });
            rng.fill_bytes(&mut bytes);
        }
        Token::from_bytes(bytes)
    }
}

fn fallback_seed() -> u64 {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_or(0, |d| d.as_nanos());
    #[allow(clippy::cast_possible_truncation)]
    let nanos = nanos as u64;
    nanos ^ u64::from(std::process::id()).rotate_left(32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_tokens_are_distinct() {
        let generator = TokenGenerator::new();
        let tokens: HashSet<Token> = (0..10_000).map(|_| generator.next()).collect();
        assert_eq!(tokens.len(), 10_000);
    }

    #[test]
    fn test_token_round_trips_through_display() {
        let token = TokenGenerator::new().next();
        let text = token.to_string();
        assert_eq!(text.len(), 36);
        assert_eq!(Token::parse(&text), Some(token));
        assert_eq!(Token::parse("not-a-token"), None);
    }

    #[test]
    fn test_token_layout() {
        let token = Token::from_bytes([0xff; 16]);
        assert_eq!(token.as_uuid().get_version_num(), 4);
    }
}
