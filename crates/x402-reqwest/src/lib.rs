//! Component I's `FacilitatorClient`: an HTTP implementation of
//! `x402_facilitator_core::Facilitator` that calls a remote facilitator's `/verify`,
//! `/settle`, `/supported` endpoints (`spec.md` §4.H), for a resource server running
//! out-of-process from its facilitator.
//!
//! Same three-endpoint shape and builder style as other x402 facilitator clients,
//! collapsed onto this repo's single protocol version (no v1/v2 split).

use async_trait::async_trait;
use reqwest::{Client, Url};
use std::time::Duration;
use x402_facilitator_core::Facilitator;
use x402_types::{SettleRequest, SettleResponse, SupportedResponse, VerifyRequest, VerifyResponse};

#[derive(Debug, thiserror::Error)]
pub enum FacilitatorClientError {
    #[error("invalid base url: {0}")]
    InvalidUrl(String),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("facilitator returned {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },
}

#[derive(Clone)]
pub struct FacilitatorClient {
    base_url: Url,
    client: Client,
    timeout: Option<Duration>,
}

impl FacilitatorClient {
    pub fn try_new(base_url: Url) -> Result<Self, FacilitatorClientError> {
        Ok(Self { base_url, client: Client::new(), timeout: None })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn verify_url(&self) -> Url {
        self.base_url.join("verify").expect("base_url is a valid base")
    }

    fn settle_url(&self) -> Url {
        self.base_url.join("settle").expect("base_url is a valid base")
    }

    fn supported_url(&self) -> Url {
        self.base_url.join("supported").expect("base_url is a valid base")
    }

    async fn post_json<Req: serde::Serialize, Res: serde::de::DeserializeOwned>(
        &self,
        url: Url,
        body: &Req,
    ) -> Result<Res, FacilitatorClientError> {
        let mut request = self.client.post(url).json(body);
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FacilitatorClientError::UnexpectedStatus { status: status.as_u16(), body });
        }
        Ok(response.json::<Res>().await?)
    }
}

impl TryFrom<&str> for FacilitatorClient {
    type Error = FacilitatorClientError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let url = Url::parse(value).map_err(|err| FacilitatorClientError::InvalidUrl(err.to_string()))?;
        Self::try_new(url)
    }
}

#[async_trait]
impl Facilitator for FacilitatorClient {
    type Error = FacilitatorClientError;

    async fn verify(&self, request: &VerifyRequest) -> Result<VerifyResponse, Self::Error> {
        self.post_json(self.verify_url(), request).await
    }

    async fn settle(&self, request: &SettleRequest) -> Result<SettleResponse, Self::Error> {
        self.post_json(self.settle_url(), request).await
    }

    async fn supported(&self) -> Result<SupportedResponse, Self::Error> {
        let mut request = self.client.get(self.supported_url());
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FacilitatorClientError::UnexpectedStatus { status: status.as_u16(), body });
        }
        Ok(response.json::<SupportedResponse>().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};
    use x402_types::SupportedResponse;

    #[tokio::test]
    async fn supported_deserializes_remote_response() {
        let server = MockServer::start().await;
        let body = SupportedResponse::default();
        Mock::given(method("GET"))
            .and(path("/supported"))
            .respond_with(ResponseTemplate::new(200).set_body_json(&body))
            .mount(&server)
            .await;

        let client = FacilitatorClient::try_from(server.uri().as_str()).unwrap();
        let response = client.supported().await.unwrap();
        assert!(response.kinds.is_empty());
    }

    #[tokio::test]
    async fn non_success_status_is_surfaced_as_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/supported"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = FacilitatorClient::try_from(server.uri().as_str()).unwrap();
        let err = client.supported().await.unwrap_err();
        assert!(matches!(err, FacilitatorClientError::UnexpectedStatus { status: 500, .. }));
    }

    #[test]
    fn try_from_rejects_malformed_url() {
        assert!(FacilitatorClient::try_from("not a url").is_err());
    }
}
