use std::time::Duration;

use serde::Deserialize;
use url::Url;

use super::{OAuthError, OAuthProfile, Provider, TokenSet};
use crate::config::{OAuthConfig, ProviderConfig};

/// Talks to the Kakao, Naver and Google authorization servers.
#[derive(Clone)]
pub struct OAuthClient {
    http: reqwest::Client,
    config: OAuthConfig,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

// --- Provider profile payloads ---

#[derive(Deserialize)]
struct KakaoUser {
    id: i64,
    kakao_account: Option<KakaoAccount>,
}

#[derive(Deserialize)]
struct KakaoAccount {
    email: Option<String>,
    profile: Option<KakaoProfile>,
}

#[derive(Deserialize)]
struct KakaoProfile {
    nickname: Option<String>,
}

#[derive(Deserialize)]
struct NaverEnvelope {
    response: NaverUser,
}

#[derive(Deserialize)]
struct NaverUser {
    id: String,
    nickname: Option<String>,
    email: Option<String>,
}

#[derive(Deserialize)]
struct GoogleUser {
    id: String,
    name: Option<String>,
    email: Option<String>,
}

impl OAuthClient {
    pub fn new(config: OAuthConfig) -> Result<Self, OAuthError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .build()?;
        Ok(Self { http, config })
    }

    /// Kakao is the only provider that is driven without a CSRF `state`.
    pub fn uses_state(provider: Provider) -> bool {
        !matches!(provider, Provider::Kakao)
    }

    pub fn frontend_url(&self) -> &str {
        &self.config.frontend_url
    }

    fn provider_config(&self, provider: Provider) -> Result<&ProviderConfig, OAuthError> {
        let cfg = self.config.provider(provider);
        if cfg.is_configured() {
            Ok(cfg)
        } else {
            Err(OAuthError::NotConfigured(provider))
        }
    }

    pub fn authorization_url(
        &self,
        provider: Provider,
        state: Option<&str>,
    ) -> Result<String, OAuthError> {
        let cfg = self.provider_config(provider)?;

        let mut params = vec![
            ("client_id", cfg.client_id.as_str()),
            ("redirect_uri", cfg.redirect_uri.as_str()),
            ("response_type", "code"),
        ];
        if provider == Provider::Google {
            params.push(("scope", "openid email profile"));
        }
        if let Some(state) = state {
            params.push(("state", state));
        }

        Ok(Url::parse_with_params(&cfg.authorize_url, &params)?.into())
    }

    pub async fn exchange_code(
        &self,
        provider: Provider,
        code: &str,
        state: Option<&str>,
    ) -> Result<TokenSet, OAuthError> {
        let cfg = self.provider_config(provider)?;

        let mut params = vec![
            ("grant_type", "authorization_code"),
            ("client_id", cfg.client_id.as_str()),
            ("client_secret", cfg.client_secret.as_str()),
            ("redirect_uri", cfg.redirect_uri.as_str()),
            ("code", code),
        ];
        if let Some(state) = state {
            params.push(("state", state));
        }

        // Naver takes the grant as query parameters on a GET
        let request = match provider {
            Provider::Naver => self.http.get(&cfg.token_url).query(&params),
            Provider::Kakao | Provider::Google => self.http.post(&cfg.token_url).form(&params),
        };

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(OAuthError::Status(response.status().as_u16()));
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| OAuthError::Malformed(e.to_string()))?;

        match body.access_token {
            Some(access_token) => Ok(TokenSet {
                access_token,
                refresh_token: body.refresh_token,
            }),
            None => Err(OAuthError::Denied(
                body.error_description
                    .or(body.error)
                    .unwrap_or_else(|| "no access token in response".to_string()),
            )),
        }
    }

    pub async fn fetch_profile(
        &self,
        provider: Provider,
        access_token: &str,
    ) -> Result<OAuthProfile, OAuthError> {
        let cfg = self.provider_config(provider)?;

        let response = self
            .http
            .get(&cfg.userinfo_url)
            .bearer_auth(access_token)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(OAuthError::Status(response.status().as_u16()));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| OAuthError::Malformed(e.to_string()))?;
        parse_profile(provider, body)
    }
}

/// Normalize a provider's userinfo payload.
pub fn parse_profile(
    provider: Provider,
    body: serde_json::Value,
) -> Result<OAuthProfile, OAuthError> {
    let malformed = |e: serde_json::Error| OAuthError::Malformed(e.to_string());

    let profile = match provider {
        Provider::Kakao => {
            let user: KakaoUser = serde_json::from_value(body).map_err(malformed)?;
            let (email, nickname) = match user.kakao_account {
                Some(account) => (account.email, account.profile.and_then(|p| p.nickname)),
                None => (None, None),
            };
            OAuthProfile {
                provider_user_id: user.id.to_string(),
                nickname,
                email,
            }
        }
        Provider::Naver => {
            let envelope: NaverEnvelope = serde_json::from_value(body).map_err(malformed)?;
            OAuthProfile {
                provider_user_id: envelope.response.id,
                nickname: envelope.response.nickname,
                email: envelope.response.email,
            }
        }
        Provider::Google => {
            let user: GoogleUser = serde_json::from_value(body).map_err(malformed)?;
            OAuthProfile {
                provider_user_id: user.id,
                nickname: user.name,
                email: user.email,
            }
        }
    };

    Ok(profile)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn configured() -> OAuthConfig {
        let mut config = OAuthConfig::default();
        for cfg in [&mut config.kakao, &mut config.naver, &mut config.google] {
            cfg.client_id = "client-id".into();
            cfg.client_secret = "client-secret".into();
            cfg.redirect_uri = "http://localhost:5000/api/auth/callback".into();
        }
        config
    }

    fn query_of(url: &str) -> Vec<(String, String)> {
        Url::parse(url)
            .unwrap()
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    #[test]
    fn kakao_authorization_url_has_no_state() {
        let client = OAuthClient::new(configured()).unwrap();
        let url = client.authorization_url(Provider::Kakao, None).unwrap();
        assert!(url.starts_with("https://kauth.kakao.com/oauth/authorize?"));
        let query = query_of(&url);
        assert!(query.contains(&("response_type".into(), "code".into())));
        assert!(query.contains(&("client_id".into(), "client-id".into())));
        assert!(!query.iter().any(|(k, _)| k == "state"));
    }

    #[test]
    fn google_authorization_url_carries_scope_and_state() {
        let client = OAuthClient::new(configured()).unwrap();
        let url = client
            .authorization_url(Provider::Google, Some("xyz"))
            .unwrap();
        let query = query_of(&url);
        assert!(query.contains(&("scope".into(), "openid email profile".into())));
        assert!(query.contains(&("state".into(), "xyz".into())));
        assert!(query.contains(&(
            "redirect_uri".into(),
            "http://localhost:5000/api/auth/callback".into()
        )));
    }

    #[test]
    fn unconfigured_provider_is_refused() {
        let client = OAuthClient::new(OAuthConfig::default()).unwrap();
        assert!(matches!(
            client.authorization_url(Provider::Naver, Some("s")),
            Err(OAuthError::NotConfigured(Provider::Naver))
        ));
    }

    #[test]
    fn only_kakao_skips_state() {
        assert!(!OAuthClient::uses_state(Provider::Kakao));
        assert!(OAuthClient::uses_state(Provider::Naver));
        assert!(OAuthClient::uses_state(Provider::Google));
    }

    #[test]
    fn parses_kakao_profile() {
        let body = json!({
            "id": 123456789,
            "kakao_account": {
                "email": "kakao@example.com",
                "profile": { "nickname": "카카오" }
            }
        });
        let profile = parse_profile(Provider::Kakao, body).unwrap();
        assert_eq!(profile.provider_user_id, "123456789");
        assert_eq!(profile.nickname.as_deref(), Some("카카오"));
        assert_eq!(profile.email.as_deref(), Some("kakao@example.com"));
    }

    #[test]
    fn parses_kakao_profile_without_account() {
        let profile = parse_profile(Provider::Kakao, json!({ "id": 5 })).unwrap();
        assert_eq!(profile.provider_user_id, "5");
        assert!(profile.nickname.is_none());
        assert!(profile.email.is_none());
    }

    #[test]
    fn parses_naver_profile() {
        let body = json!({
            "resultcode": "00",
            "message": "success",
            "response": { "id": "naver-abc", "nickname": "네이버", "email": "n@example.com" }
        });
        let profile = parse_profile(Provider::Naver, body).unwrap();
        assert_eq!(profile.provider_user_id, "naver-abc");
        assert_eq!(profile.nickname.as_deref(), Some("네이버"));
    }

    #[test]
    fn parses_google_profile() {
        let body = json!({ "id": "1098", "name": "Grace", "email": "g@example.com" });
        let profile = parse_profile(Provider::Google, body).unwrap();
        assert_eq!(profile.provider_user_id, "1098");
        assert_eq!(profile.nickname.as_deref(), Some("Grace"));
    }

    #[test]
    fn profile_without_id_is_malformed() {
        let result = parse_profile(Provider::Google, json!({ "name": "no id" }));
        assert!(matches!(result, Err(OAuthError::Malformed(_))));
    }
}
