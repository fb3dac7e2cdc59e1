pub mod client;
pub mod state_store;

pub use crate::db::models::Provider;
pub use client::OAuthClient;
pub use state_store::OAuthStateStore;

/// Identity normalized across providers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthProfile {
    pub provider_user_id: String,
    pub nickname: Option<String>,
    pub email: Option<String>,
}

impl OAuthProfile {
    /// Nickname to use for a brand new account.
    pub fn display_nickname(&self, provider: Provider) -> String {
        match self.nickname.as_deref().map(str::trim) {
            Some(nick) if !nick.is_empty() => nick.to_string(),
            _ => {
                let short: String = self.provider_user_id.chars().take(8).collect();
                format!("{}_user_{}", provider, short)
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct TokenSet {
    pub access_token: String,
    pub refresh_token: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum OAuthError {
    #[error("{0} login is not configured")]
    NotConfigured(Provider),

    #[error("invalid or expired OAuth state")]
    InvalidState,

    #[error("authorization was not granted: {0}")]
    Denied(String),

    #[error("provider request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("provider returned HTTP {0}")]
    Status(u16),

    #[error("unexpected provider response: {0}")]
    Malformed(String),

    #[error("invalid provider URL: {0}")]
    Url(#[from] url::ParseError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_nickname_prefers_profile_nickname() {
        let profile = OAuthProfile {
            provider_user_id: "1234567890".into(),
            nickname: Some("민수".into()),
            email: None,
        };
        assert_eq!(profile.display_nickname(Provider::Kakao), "민수");
    }

    #[test]
    fn display_nickname_falls_back_to_provider_prefix() {
        let profile = OAuthProfile {
            provider_user_id: "1234567890".into(),
            nickname: Some("   ".into()),
            email: None,
        };
        assert_eq!(
            profile.display_nickname(Provider::Kakao),
            "kakao_user_12345678"
        );

        let short = OAuthProfile {
            provider_user_id: "abc".into(),
            nickname: None,
            email: None,
        };
        assert_eq!(short.display_nickname(Provider::Naver), "naver_user_abc");
    }
}
