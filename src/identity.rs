use anyhow::Context;
use axum::async_trait;
use serde::Deserialize;

const TOKENINFO_URL: &str = "https://oauth2.googleapis.com/tokeninfo";

/// Claims extracted from an externally issued identity token.
#[derive(Debug, Clone)]
pub struct IdentityClaims {
    pub email: Option<String>,
    pub name: Option<String>,
    pub picture: Option<String>,
}

/// External identity provider seam; real impl talks to Google's tokeninfo
/// endpoint, tests swap in a canned verifier.
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, id_token: &str) -> anyhow::Result<IdentityClaims>;
}

pub struct GoogleVerifier {
    http: reqwest::Client,
    client_id: String,
}

#[derive(Debug, Deserialize)]
struct TokenInfo {
    aud: String,
    email: Option<String>,
    name: Option<String>,
    picture: Option<String>,
}

impl GoogleVerifier {
    pub fn new(client_id: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            client_id: client_id.to_string(),
        }
    }
}

#[async_trait]
impl IdentityVerifier for GoogleVerifier {
    async fn verify(&self, id_token: &str) -> anyhow::Result<IdentityClaims> {
        let resp = self
            .http
            .get(TOKENINFO_URL)
            .query(&[("id_token", id_token)])
            .send()
            .await
            .context("tokeninfo request")?;

        if !resp.status().is_success() {
            anyhow::bail!("identity token rejected: {}", resp.status());
        }

        let info: TokenInfo = resp.json().await.context("tokeninfo body")?;
        if info.aud != self.client_id {
            anyhow::bail!("identity token audience mismatch");
        }

        Ok(IdentityClaims {
            email: info.email,
            name: info.name,
            picture: info.picture,
        })
    }
}
