//! Credential provider abstraction
//!
//! The engines never touch browser-style global storage; they receive
//! an injected store with explicit load/save/clear. Set at login,
//! cleared at logout.

use std::sync::RwLock;

/// Bearer credential storage.
pub trait CredentialStore: Send + Sync {
    /// The current bearer token, if any.
    fn load(&self) -> Option<String>;

    /// Replace the stored token (called after a successful login).
    fn save(&self, token: String);

    /// Drop the stored token (logout).
    fn clear(&self);
}

/// In-memory credential store.
#[derive(Default)]
pub struct MemoryCredentialStore {
    token: RwLock<Option<String>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: RwLock::new(Some(token.into())),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> Option<String> {
        self.token.read().expect("credential lock poisoned").clone()
    }

    fn save(&self, token: String) {
        *self.token.write().expect("credential lock poisoned") = Some(token);
    }

    fn clear(&self) {
        *self.token.write().expect("credential lock poisoned") = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_set_then_clear() {
        let store = MemoryCredentialStore::new();
        assert!(store.load().is_none());

        store.save("tok-123".to_string());
        assert_eq!(store.load().as_deref(), Some("tok-123"));

        store.clear();
        assert!(store.load().is_none());
    }

    #[test]
    fn with_token_preloads() {
        let store = MemoryCredentialStore::with_token("abc");
        assert_eq!(store.load().as_deref(), Some("abc"));
    }
}
