use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use anyhow::{anyhow, bail, Context, Result};
use aws_config::{BehaviorVersion, Region};
use aws_credential_types::provider::ProvideCredentials;
use aws_credential_types::Credentials;
use aws_sigv4::http_request::{sign, SignableBody, SignableRequest, SigningParams, SigningSettings};
use aws_sigv4::sign::v4;
use reqwest::blocking::{Client as HttpClient, RequestBuilder};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde_json::Value;

use crate::transport::{non_empty_env, normalize_api_base, response_json_or_error};

pub const API_KEY_ENV: &str = "AWS_BEARER_TOKEN_BEDROCK";
pub const ENDPOINT_ENV: &str = "BEDROCK_RUNTIME_ENDPOINT";
pub const SIGNING_NAME: &str = "bedrock";

const CREDENTIAL_REFRESH_MARGIN: Duration = Duration::from_secs(60);
const JSON: &str = "application/json";

/// Minimal Bedrock runtime client: `InvokeModel` with a JSON body.
///
/// A Bedrock API key is used when one is configured; otherwise requests are
/// SigV4-signed with credentials from the standard AWS chain (environment
/// keys, profiles and SSO, container and instance roles).
#[derive(Debug, Clone)]
pub struct BedrockRuntime {
    endpoint: String,
    auth: BedrockAuth,
    http: HttpClient,
}

#[derive(Debug, Clone)]
enum BedrockAuth {
    ApiKey(String),
    SigV4(Arc<SigV4Signer>),
    Missing,
}

impl BedrockRuntime {
    pub fn from_env(region: &str, http: HttpClient) -> Self {
        let endpoint = non_empty_env(ENDPOINT_ENV)
            .and_then(|value| normalize_api_base(&value))
            .unwrap_or_else(|| format!("https://bedrock-runtime.{region}.amazonaws.com"));
        Self::from_parts(endpoint, non_empty_env(API_KEY_ENV), region, http)
    }

    /// API key when given, else the default AWS credential chain for `region`.
    pub fn from_parts(
        endpoint: impl Into<String>,
        api_key: Option<String>,
        region: &str,
        http: HttpClient,
    ) -> Self {
        let auth = match api_key {
            Some(key) => BedrockAuth::ApiKey(key),
            None => BedrockAuth::SigV4(Arc::new(SigV4Signer::default_chain(region))),
        };
        Self {
            endpoint: endpoint.into(),
            auth,
            http,
        }
    }

    pub fn new(endpoint: impl Into<String>, api_key: Option<String>, http: HttpClient) -> Self {
        Self {
            endpoint: endpoint.into(),
            auth: api_key.map_or(BedrockAuth::Missing, BedrockAuth::ApiKey),
            http,
        }
    }

    /// Signs every request with fixed credentials instead of resolving them.
    pub fn with_credentials(
        endpoint: impl Into<String>,
        region: &str,
        credentials: Credentials,
        http: HttpClient,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            auth: BedrockAuth::SigV4(Arc::new(SigV4Signer::fixed(region, credentials))),
            http,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn auth_kind(&self) -> &'static str {
        match self.auth {
            BedrockAuth::ApiKey(_) => "api-key",
            BedrockAuth::SigV4(_) => "sigv4",
            BedrockAuth::Missing => "none",
        }
    }

    pub fn invoke_url(&self, model: &str) -> String {
        format!(
            "{}/model/{}/invoke",
            self.endpoint,
            urlencoding::encode(model.trim())
        )
    }

    pub fn invoke(&self, model: &str, body: &Value) -> Result<Value> {
        let url = self.invoke_url(model);
        let payload = serde_json::to_vec(body)?;
        let request = self
            .http
            .post(&url)
            .header(ACCEPT, JSON)
            .header(CONTENT_TYPE, JSON);
        let request = match &self.auth {
            BedrockAuth::ApiKey(key) => request.bearer_auth(key),
            BedrockAuth::SigV4(signer) => signer.sign(request, &url, &payload)?,
            BedrockAuth::Missing => {
                bail!("no Bedrock credentials: set {API_KEY_ENV} or configure AWS credentials")
            }
        };
        let response = request
            .body(payload)
            .send()
            .with_context(|| format!("Bedrock request failed ({url})"))?;
        response_json_or_error("Bedrock", response)
    }
}

#[derive(Debug)]
struct SigV4Signer {
    region: String,
    from_chain: bool,
    cached: Mutex<Option<Credentials>>,
}

impl SigV4Signer {
    fn default_chain(region: &str) -> Self {
        Self {
            region: region.to_string(),
            from_chain: true,
            cached: Mutex::new(None),
        }
    }

    fn fixed(region: &str, credentials: Credentials) -> Self {
        Self {
            region: region.to_string(),
            from_chain: false,
            cached: Mutex::new(Some(credentials)),
        }
    }

    fn credentials(&self) -> Result<Credentials> {
        let mut cached = self
            .cached
            .lock()
            .map_err(|_| anyhow!("credential cache lock poisoned"))?;
        match cached.as_ref() {
            Some(current) if !self.from_chain || !expiring(current) => return Ok(current.clone()),
            None if !self.from_chain => bail!("no AWS credentials configured"),
            _ => {}
        }
        let fresh = load_default_credentials(&self.region)?;
        *cached = Some(fresh.clone());
        Ok(fresh)
    }

    fn sign(&self, request: RequestBuilder, url: &str, body: &[u8]) -> Result<RequestBuilder> {
        let identity = self.credentials()?.into();
        let params: SigningParams<'_> = v4::SigningParams::builder()
            .identity(&identity)
            .region(&self.region)
            .name(SIGNING_NAME)
            .time(SystemTime::now())
            .settings(SigningSettings::default())
            .build()
            .context("invalid SigV4 signing parameters")?
            .into();
        let headers = [("accept", JSON), ("content-type", JSON)];
        let signable = SignableRequest::new(
            "POST",
            url,
            headers.into_iter(),
            SignableBody::Bytes(body),
        )
        .context("request cannot be signed")?;
        let (instructions, _signature) = sign(signable, &params)
            .context("failed to sign Bedrock request")?
            .into_parts();
        Ok(instructions
            .headers()
            .fold(request, |request, (name, value)| request.header(name, value)))
    }
}

fn expiring(credentials: &Credentials) -> bool {
    credentials
        .expiry()
        .is_some_and(|expiry| expiry <= SystemTime::now() + CREDENTIAL_REFRESH_MARGIN)
}

fn load_default_credentials(region: &str) -> Result<Credentials> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start AWS credential resolver")?;
    runtime.block_on(resolve_default_credentials(region))
}

async fn resolve_default_credentials(region: &str) -> Result<Credentials> {
    let config = aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(region.to_string()))
        .load()
        .await;
    let provider = config
        .credentials_provider()
        .context("no AWS credential provider available")?;
    provider.provide_credentials().await.with_context(|| {
        format!("failed to resolve AWS credentials (or set {API_KEY_ENV})")
    })
}
