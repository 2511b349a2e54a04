use super::messages::{
    IceCandidate, IceCandidateRequest, OfferRequest, RelayConfig, SessionDescription,
};
use crate::error::{Result, VoiceError};
use tracing::{debug, error, info};

/// Signaling operations needed to bootstrap a session
#[async_trait::async_trait]
pub trait Signaling: Send + Sync {
    /// Fetch ICE relay configuration, falling back to the public STUN default
    async fn fetch_relay_config(&self) -> RelayConfig;

    /// Send the local offer and return the remote answer
    async fn exchange_offer(
        &self,
        offer: &SessionDescription,
        session_id: &str,
    ) -> Result<SessionDescription>;

    /// Forward one local ICE candidate; the response is not consumed
    async fn send_ice_candidate(&self, candidate: &IceCandidate, session_id: &str) -> Result<()>;
}

/// Signaling over plain HTTP against `{api_url}/webrtc/*`
#[derive(Debug, Clone)]
pub struct HttpSignalingClient {
    http: reqwest::Client,
    api_url: String,
}

impl HttpSignalingClient {
    pub fn new(api_url: &str) -> Self {
        Self::with_client(reqwest::Client::new(), api_url)
    }

    pub fn with_client(http: reqwest::Client, api_url: &str) -> Self {
        Self {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.api_url, path)
    }

    /// Fetch relay credentials without the fallback
    pub async fn try_fetch_relay_config(&self) -> Result<RelayConfig> {
        let response = self
            .http
            .get(self.endpoint("/webrtc/turn-credentials"))
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .send()
            .await
            .map_err(|e| VoiceError::Configuration(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(VoiceError::Configuration(format!(
                "Failed to get TURN credentials: {}",
                status.as_u16()
            )));
        }

        response
            .json::<RelayConfig>()
            .await
            .map_err(|e| VoiceError::Configuration(e.to_string()))
    }
}

#[async_trait::async_trait]
impl Signaling for HttpSignalingClient {
    async fn fetch_relay_config(&self) -> RelayConfig {
        match self.try_fetch_relay_config().await {
            Ok(config) => {
                info!("Using {} relay servers from {}", config.ice_servers.len(), self.api_url);
                config
            }
            Err(e) => {
                error!("Error fetching TURN credentials: {}", e);
                RelayConfig::default()
            }
        }
    }

    async fn exchange_offer(
        &self,
        offer: &SessionDescription,
        session_id: &str,
    ) -> Result<SessionDescription> {
        info!("Sending offer to server (webrtc_id={})", session_id);

        let body = OfferRequest {
            sdp: &offer.sdp,
            sdp_type: offer.sdp_type,
            webrtc_id: session_id,
        };

        let answer = self
            .http
            .post(self.endpoint("/webrtc/offer"))
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json::<SessionDescription>()
            .await?;

        debug!("Received answer data: {:?}", answer.sdp_type);

        Ok(answer)
    }

    async fn send_ice_candidate(&self, candidate: &IceCandidate, session_id: &str) -> Result<()> {
        debug!("Sending ICE candidate {}", candidate.candidate);

        self.http
            .post(self.endpoint("/webrtc/offer"))
            .json(&IceCandidateRequest::new(candidate, session_id))
            .send()
            .await?;

        Ok(())
    }
}
