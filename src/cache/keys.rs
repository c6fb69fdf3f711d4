//! Cache key definitions.
//!
//! `CacheKey` names one entry in the key-value store; `LoadToken` names one
//! coalesced origin load. Both are typed so unrelated operations can never
//! collide on an accidentally identical formatted string.

use std::fmt;

/// The kind of record stored under a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    /// Canonical user record.
    UserBase,
    /// Follow / follower counters of a user.
    UserStat,
    /// Whether the scoped viewer follows the keyed user.
    Following,
    /// Whether the keyed user follows the scoped viewer.
    Follower,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::UserBase => "user:base",
            EntityKind::UserStat => "user:stat",
            EntityKind::Following => "user:following",
            EntityKind::Follower => "user:follower",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies one cache entry.
///
/// `scope` is set for per-viewer datasets (relationship flags), where the same
/// target id yields different values for different viewers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub entity: EntityKind,
    pub scope: Option<u64>,
    pub id: u64,
}

impl CacheKey {
    pub fn new(entity: EntityKind, id: u64) -> Self {
        Self {
            entity,
            scope: None,
            id,
        }
    }

    pub fn scoped(entity: EntityKind, scope: u64, id: u64) -> Self {
        Self {
            entity,
            scope: Some(scope),
            id,
        }
    }

    /// Render the store-level key: `{namespace}:{entity}[:{scope}]:{id}`.
    pub fn render(&self, namespace: &str) -> String {
        match self.scope {
            Some(scope) => format!("{namespace}:{}:{scope}:{}", self.entity, self.id),
            None => format!("{namespace}:{}:{}", self.entity, self.id),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.scope {
            Some(scope) => write!(f, "{}:{scope}:{}", self.entity, self.id),
            None => write!(f, "{}:{}", self.entity, self.id),
        }
    }
}

/// Identifies one in-flight coalesced origin load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LoadToken {
    pub operation: &'static str,
    pub key: CacheKey,
}

impl LoadToken {
    pub fn new(operation: &'static str, key: CacheKey) -> Self {
        Self { operation, key }
    }
}

impl fmt::Display for LoadToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.operation, self.key)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn same_id_renders_same_key() {
        let a = CacheKey::new(EntityKind::UserBase, 42);
        let b = CacheKey::new(EntityKind::UserBase, 42);
        assert_eq!(a.render("userline"), b.render("userline"));
        assert_eq!(a.render("userline"), "userline:user:base:42");
    }

    #[test]
    fn scoped_keys_include_viewer() {
        let key = CacheKey::scoped(EntityKind::Following, 7, 9);
        assert_eq!(key.render("ns"), "ns:user:following:7:9");
        assert_ne!(
            key,
            CacheKey::scoped(EntityKind::Follower, 7, 9),
            "following and follower flags must not share a key"
        );
    }

    #[test]
    fn tokens_differ_by_operation() {
        let key = CacheKey::new(EntityKind::UserBase, 1);
        let tokens: HashSet<LoadToken> = [
            LoadToken::new("get_user", key),
            LoadToken::new("get_user", key),
            LoadToken::new("refresh_user", key),
        ]
        .into_iter()
        .collect();
        assert_eq!(tokens.len(), 2);
    }

    #[test]
    fn token_display_is_readable() {
        let token = LoadToken::new("get_user", CacheKey::new(EntityKind::UserBase, 5));
        assert_eq!(token.to_string(), "get_user/user:base:5");
    }
}
