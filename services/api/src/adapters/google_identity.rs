//! services/api/src/adapters/google_identity.rs
//!
//! Federated sign-in adapter. Verification of the ID token is delegated
//! entirely to the external provider's public tokeninfo endpoint; this
//! module never parses or validates the token itself.

use async_trait::async_trait;
use image_studio_core::domain::FederatedIdentity;
use image_studio_core::ports::{IdentityVerifier, PortError, PortResult};
use serde::Deserialize;

/// An adapter that implements the `IdentityVerifier` port against Google's
/// tokeninfo endpoint.
#[derive(Clone)]
pub struct GoogleIdentityVerifier {
    client: reqwest::Client,
    tokeninfo_url: String,
}

impl GoogleIdentityVerifier {
    /// Creates a new `GoogleIdentityVerifier`.
    pub fn new(client: reqwest::Client, tokeninfo_url: impl Into<String>) -> Self {
        Self {
            client,
            tokeninfo_url: tokeninfo_url.into(),
        }
    }
}

#[derive(Deserialize)]
struct TokenInfo {
    sub: String,
    email: Option<String>,
    name: Option<String>,
    picture: Option<String>,
}

#[async_trait]
impl IdentityVerifier for GoogleIdentityVerifier {
    async fn verify(&self, id_token: &str) -> PortResult<FederatedIdentity> {
        let response = self
            .client
            .get(&self.tokeninfo_url)
            .query(&[("id_token", id_token)])
            .send()
            .await
            .map_err(|e| PortError::Upstream(e.to_string()))?;

        // The provider answers non-2xx for any token it does not vouch for.
        if !response.status().is_success() {
            return Err(PortError::Unauthorized);
        }

        let info: TokenInfo = response
            .json()
            .await
            .map_err(|e| PortError::Upstream(e.to_string()))?;

        let email = info.email.ok_or(PortError::Unauthorized)?;
        Ok(FederatedIdentity {
            subject: info.sub,
            email,
            display_name: info.name,
            photo_url: info.picture,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn verify_returns_identity_for_valid_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tokeninfo"))
            .and(query_param("id_token", "good-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "sub": "google-uid-1",
                "email": "a@example.com",
                "name": "Ada",
                "picture": "https://photos/ada.png"
            })))
            .mount(&server)
            .await;

        let verifier = GoogleIdentityVerifier::new(
            reqwest::Client::new(),
            format!("{}/tokeninfo", server.uri()),
        );
        let identity = verifier.verify("good-token").await.unwrap();
        assert_eq!(identity.subject, "google-uid-1");
        assert_eq!(identity.email, "a@example.com");
        assert_eq!(identity.display_name.as_deref(), Some("Ada"));
    }

    #[tokio::test]
    async fn verify_rejects_unknown_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tokeninfo"))
            .respond_with(ResponseTemplate::new(400))
            .mount(&server)
            .await;

        let verifier = GoogleIdentityVerifier::new(
            reqwest::Client::new(),
            format!("{}/tokeninfo", server.uri()),
        );
        let err = verifier.verify("bad-token").await.unwrap_err();
        assert!(matches!(err, PortError::Unauthorized));
    }
}
