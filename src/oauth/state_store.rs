use std::collections::HashMap;
use std::time::{Duration, Instant};

use rand::Rng;

use crate::db::models::Provider;

const STATE_TTL: Duration = Duration::from_secs(300);
const MAX_PENDING: usize = 10_000;

/// Pending CSRF `state` values handed out with an authorization URL.
/// Each value is bound to one provider and can be redeemed once.
/// At most `limit` values are outstanding; the oldest goes first.
pub struct OAuthStateStore {
    pending: HashMap<String, (Instant, Provider)>,
    limit: usize,
}

impl OAuthStateStore {
    pub fn new() -> Self {
        Self::with_limit(MAX_PENDING)
    }

    pub fn with_limit(limit: usize) -> Self {
        Self {
            pending: HashMap::new(),
            limit: limit.max(1),
        }
    }

    /// Issue a fresh state value for `provider`. Clears stale entries first.
    pub fn issue(&mut self, provider: Provider) -> String {
        self.clear_stale();
        while self.pending.len() >= self.limit {
            self.evict_oldest();
        }
        let state = generate_token();
        self.pending
            .insert(state.clone(), (Instant::now(), provider));
        state
    }

    /// Redeem a state value. False when unknown, expired, already used,
    /// or issued for another provider.
    pub fn redeem(&mut self, state: &str, provider: Provider) -> bool {
        match self.pending.remove(state) {
            Some((issued, bound)) => bound == provider && issued.elapsed() < STATE_TTL,
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    fn evict_oldest(&mut self) {
        let oldest = self
            .pending
            .iter()
            .min_by_key(|(_, (issued, _))| *issued)
            .map(|(state, _)| state.clone());
        if let Some(state) = oldest {
            self.pending.remove(&state);
        }
    }

    fn clear_stale(&mut self) {
        self.pending.retain(|_, (t, _)| t.elapsed() < STATE_TTL);
    }
}

impl Default for OAuthStateStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Generate a cryptographically random 32-byte hex token.
fn generate_token() -> String {
    let mut rng = rand::thread_rng();
    let bytes: [u8; 32] = rng.gen();
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_token_is_64_hex_chars() {
        let token = generate_token();
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(token, generate_token());
    }

    #[test]
    fn state_redeems_once() {
        let mut store = OAuthStateStore::new();
        let state = store.issue(Provider::Google);
        assert!(store.redeem(&state, Provider::Google));
        assert!(!store.redeem(&state, Provider::Google));
    }

    #[test]
    fn state_is_bound_to_provider() {
        let mut store = OAuthStateStore::new();
        let state = store.issue(Provider::Naver);
        assert!(!store.redeem(&state, Provider::Google));
        // A failed redemption still consumes the value
        assert!(!store.redeem(&state, Provider::Naver));
    }

    #[test]
    fn outstanding_states_are_capped() {
        let mut store = OAuthStateStore::with_limit(3);
        let first = store.issue(Provider::Google);
        std::thread::sleep(Duration::from_millis(2));
        let rest: Vec<String> = (0..5)
            .map(|_| store.issue(Provider::Google))
            .collect();

        assert_eq!(store.len(), 3);
        assert!(!store.redeem(&first, Provider::Google));
        let live = rest
            .iter()
            .filter(|state| store.redeem(state, Provider::Google))
            .count();
        assert_eq!(live, 3);
    }

    #[test]
    fn unknown_state_is_rejected() {
        let mut store = OAuthStateStore::new();
        assert!(!store.redeem("nonexistent", Provider::Kakao));
    }

    #[test]
    fn expired_state_is_rejected() {
        let mut store = OAuthStateStore::new();
        let state = store.issue(Provider::Google);
        if let Some(entry) = store.pending.get_mut(&state) {
            if let Some(past) = Instant::now().checked_sub(STATE_TTL + Duration::from_secs(1)) {
                entry.0 = past;
            } else {
                return;
            }
        }
        assert!(!store.redeem(&state, Provider::Google));
    }
}
