//! X (Twitter) client for cross-posts.
//!
//! Requests are signed with OAuth 1.0a (HMAC-SHA1) using user-context
//! credentials. Posts go to `POST /2/tweets` with a JSON body, so only the
//! `oauth_*` parameters take part in the signature.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use hmac::{Hmac, Mac};
use serde_json::json;
use sha1::Sha1;
use tracing::{info, instrument};

use super::error::GatewayError;
use super::retry::{RetryConfig, RetryPolicy, retry_with_backoff};
use super::{Result, SocialGateway};

type HmacSha1 = Hmac<Sha1>;

pub const DEFAULT_API_BASE: &str = "https://api.twitter.com";

/// OAuth 1.0a user-context credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct XCredentials {
    pub consumer_key: String,
    pub consumer_secret: String,
    pub access_token: String,
    pub access_token_secret: String,
}

impl std::fmt::Debug for XCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XCredentials")
            .field("consumer_key", &self.consumer_key)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct XConfig {
    pub credentials: XCredentials,
    pub api_base: String,
    pub timeout: Duration,
}

/// RFC 3986 percent-encoding, as OAuth 1.0a requires.
fn percent_encode(s: &str) -> String {
    urlencoding::encode(s).into_owned()
}

/// Builds the OAuth 1.0a signature base string.
///
/// `params` holds every parameter that takes part in the signature: the
/// `oauth_*` set plus any query or form parameters.
pub fn signature_base_string(method: &str, url: &str, params: &[(&str, &str)]) -> String {
    let mut encoded: Vec<(String, String)> = params
        .iter()
        .map(|(k, v)| (percent_encode(k), percent_encode(v)))
        .collect();
    encoded.sort();

    let param_string = encoded
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");

    format!(
        "{}&{}&{}",
        method.to_ascii_uppercase(),
        percent_encode(url),
        percent_encode(&param_string)
    )
}

/// Signs a base string: base64(HMAC-SHA1(consumer_secret&token_secret, base)).
pub fn sign(base_string: &str, consumer_secret: &str, token_secret: &str) -> String {
    let key = format!(
        "{}&{}",
        percent_encode(consumer_secret),
        percent_encode(token_secret)
    );
    let mut mac = HmacSha1::new_from_slice(key.as_bytes()).expect("HMAC can take key of any size");
    mac.update(base_string.as_bytes());
    BASE64.encode(mac.finalize().into_bytes())
}

/// Builds the `Authorization: OAuth ...` header value for a request.
pub fn authorization_header(
    method: &str,
    url: &str,
    extra_params: &[(&str, &str)],
    credentials: &XCredentials,
    nonce: &str,
    timestamp: &str,
) -> String {
    let oauth_params = [
        ("oauth_consumer_key", credentials.consumer_key.as_str()),
        ("oauth_nonce", nonce),
        ("oauth_signature_method", "HMAC-SHA1"),
        ("oauth_timestamp", timestamp),
        ("oauth_token", credentials.access_token.as_str()),
        ("oauth_version", "1.0"),
    ];

    let mut all_params: Vec<(&str, &str)> = oauth_params.to_vec();
    all_params.extend_from_slice(extra_params);

    let base = signature_base_string(method, url, &all_params);
    let signature = sign(
        &base,
        &credentials.consumer_secret,
        &credentials.access_token_secret,
    );

    let mut header_params: Vec<(&str, &str)> = oauth_params.to_vec();
    header_params.push(("oauth_signature", &signature));
    header_params.sort();

    let fields = header_params
        .iter()
        .map(|(k, v)| format!("{}=\"{}\"", percent_encode(k), percent_encode(v)))
        .collect::<Vec<_>>()
        .join(", ");
    format!("OAuth {fields}")
}

fn generate_nonce() -> String {
    hex::encode(rand::random::<[u8; 16]>())
}

#[derive(Debug, Clone)]
pub struct XClient {
    http: reqwest::Client,
    credentials: XCredentials,
    api_base: String,
    retry: RetryConfig,
    policy: RetryPolicy,
}

impl XClient {
    pub fn new(config: XConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(GatewayError::from_reqwest)?;

        Ok(XClient {
            http,
            credentials: config.credentials,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            retry: RetryConfig::DEFAULT,
            policy: RetryPolicy::default(),
        })
    }

    pub fn with_retry(mut self, retry: RetryConfig, policy: RetryPolicy) -> Self {
        self.retry = retry;
        self.policy = policy;
        self
    }
}

impl SocialGateway for XClient {
    #[instrument(skip(self, text))]
    async fn post(&self, text: &str) -> Result<()> {
        let url = format!("{}/2/tweets", self.api_base);
        let body = json!({ "text": text });

        retry_with_backoff(self.retry, self.policy, || async {
            // Fresh nonce and timestamp per attempt; X rejects replays.
            let header = authorization_header(
                "POST",
                &url,
                &[],
                &self.credentials,
                &generate_nonce(),
                &chrono::Utc::now().timestamp().to_string(),
            );

            let response = self
                .http
                .post(&url)
                .header(reqwest::header::AUTHORIZATION, header)
                .json(&body)
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                let text = response.text().await.unwrap_or_default();
                return Err(GatewayError::from_status(status.as_u16(), &text));
            }
            info!("Cross-posted to X");
            Ok(())
        })
        .await
        .into_result()
    }
}
