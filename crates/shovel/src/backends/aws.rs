//! ☁️ The managed-cluster backend: HTTPS, certificate-verified, SigV4-signed.
//!
//! 🧠 Knowledge graph:
//! - Credentials come from the ambient AWS chain via `aws-config` (env vars, profile, SSO,
//!   container/instance roles). We never see a password. We never want to.
//! - The provider is kept, not the credentials. Each request asks the provider, which caches
//!   and refreshes on its own. A run that outlives an STS session keeps working.
//! - Every `_bulk` POST is signed for `{region}/{service}` with `aws-sigv4` and the signature
//!   headers are copied onto the `reqwest` request.
//! - Loading the AWS config touches local files and env vars only. No cluster I/O here.
//! - The region comes from `backend.region`, then AWS_REGION / AWS_DEFAULT_REGION, then the
//!   profile file. The SDK's default chain would also ask the instance metadata service, which
//!   off EC2 means a silent timeout before the "no region" error. We skip that stop.

use std::time::SystemTime;

use async_trait::async_trait;
use aws_config::environment::EnvironmentVariableRegionProvider;
use aws_config::meta::region::RegionProviderChain;
use aws_config::profile::ProfileFileRegionProvider;
use aws_config::{BehaviorVersion, Region};
use aws_credential_types::Credentials;
use aws_credential_types::provider::{ProvideCredentials, SharedCredentialsProvider};
use aws_sigv4::http_request::{SignableBody, SignableRequest, SigningParams, SigningSettings, sign};
use aws_sigv4::sign::v4;
use tracing::debug;

use super::opensearch::{BulkTransport, NDJSON};
use super::{BackendConfig, BackendError, BulkBackend, BulkReply};
use crate::error::ShovelError;

/// ☁️ An AWS-managed OpenSearch domain reached over signed HTTPS.
pub struct AwsOpenSearch {
    transport: BulkTransport,
    region: String,
    service: String,
    credentials: SharedCredentialsProvider,
}

// 🐛 credentials provider excluded. nobody debugging a backend wants to see secrets, least of all auditors.
impl std::fmt::Debug for AwsOpenSearch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsOpenSearch")
            .field("endpoint", &self.transport.base_url())
            .field("region", &self.region)
            .field("service", &self.service)
            .finish()
    }
}

impl AwsOpenSearch {
    /// 🔧 Resolve region and credential provider from config + the AWS environment.
    ///
    /// 💀 No region anywhere is a `Config` error: we refuse to guess which continent your data lives on.
    pub async fn from_environment(config: &BackendConfig) -> Result<Self, ShovelError> {
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(region_provider(config))
            .load()
            .await;

        let region = sdk_config
            .region()
            .map(|region| region.as_ref().to_string())
            .ok_or_else(|| {
                ShovelError::config(
                    "no AWS region for the signed backend: set `backend.region`, AWS_REGION or AWS_DEFAULT_REGION",
                )
            })?;
        let credentials = sdk_config.credentials_provider().ok_or_else(|| {
            ShovelError::config("the AWS environment did not provide a credentials provider")
        })?;

        // -- 🔒 no explicit :443 in the URL. the Host header and the signature must agree,
        // -- and the default port never shows up in either.
        let base_url = format!("https://{}", config.host);
        Self::new(base_url, region, config.service.clone(), credentials, config)
    }

    /// 🏗️ Assemble from parts. `from_environment` is the normal way in; tests come through here.
    pub fn new(
        base_url: String,
        region: String,
        service: String,
        credentials: SharedCredentialsProvider,
        config: &BackendConfig,
    ) -> Result<Self, ShovelError> {
        Ok(Self {
            transport: BulkTransport::new(base_url, config)?,
            region,
            service,
            credentials,
        })
    }

    /// ✍️ Produce the SigV4 headers (`authorization`, `x-amz-date`, maybe `x-amz-security-token`)
    /// for one `_bulk` POST carrying `payload`.
    fn signature_headers(
        &self,
        credentials: Credentials,
        payload: &str,
    ) -> Result<Vec<(String, String)>, BackendError> {
        let identity = credentials.into();
        let signing_params: SigningParams<'_> = v4::SigningParams::builder()
            .identity(&identity)
            .region(&self.region)
            .name(&self.service)
            .time(SystemTime::now())
            .settings(SigningSettings::default())
            .build()
            .map_err(|err| BackendError::Signing(err.to_string()))?
            .into();

        let signable = SignableRequest::new(
            "POST",
            self.transport.bulk_url(),
            [("content-type", NDJSON)].into_iter(),
            SignableBody::Bytes(payload.as_bytes()),
        )
        .map_err(|err| BackendError::Signing(err.to_string()))?;

        let (instructions, _signature) = sign(signable, &signing_params)
            .map_err(|err| BackendError::Signing(err.to_string()))?
            .into_parts();

        Ok(instructions
            .headers()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect())
    }
}

#[async_trait]
impl BulkBackend for AwsOpenSearch {
    async fn submit_bulk(&self, payload: String) -> Result<BulkReply, BackendError> {
        let credentials = self
            .credentials
            .provide_credentials()
            .await
            .map_err(|err| BackendError::Signing(format!("no AWS credentials: {err}")))?;

        let headers = self.signature_headers(credentials, &payload)?;
        debug!("✍️ signed bulk request for {}/{}", self.region, self.service);

        let mut request = self.transport.bulk_request();
        for (name, value) in headers {
            request = request.header(name, value);
        }
        self.transport.send(request.body(payload)).await
    }

    fn endpoint(&self) -> &str {
        self.transport.base_url()
    }
}

/// 🌎 Config first, then env vars, then the profile file. No metadata service.
fn region_provider(config: &BackendConfig) -> RegionProviderChain {
    RegionProviderChain::first_try(config.region.clone().map(Region::new))
        .or_else(EnvironmentVariableRegionProvider::new())
        .or_else(ProfileFileRegionProvider::new())
}
