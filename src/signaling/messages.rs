use serde::{Deserialize, Serialize};

/// Public STUN server used when relay credentials are unavailable
pub const DEFAULT_STUN_URL: &str = "stun:stun.l.google.com:19302";

/// `urls` field of an ICE server entry, which may be a single URL or a list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IceUrls {
    One(String),
    Many(Vec<String>),
}

impl IceUrls {
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            IceUrls::One(url) => vec![url.clone()],
            IceUrls::Many(urls) => urls.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServer {
    pub urls: IceUrls,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

/// Relay configuration returned by `GET /webrtc/turn-credentials`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(rename = "iceServers")]
    pub ice_servers: Vec<IceServer>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            ice_servers: vec![IceServer {
                urls: IceUrls::One(DEFAULT_STUN_URL.to_string()),
                username: None,
                credential: None,
            }],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
    Pranswer,
    Rollback,
}

/// Session description exchanged during negotiation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    pub sdp: String,
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
}

/// ICE candidate in its JSON wire form
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(rename = "sdpMid", default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(rename = "sdpMLineIndex", default, skip_serializing_if = "Option::is_none")]
    pub sdp_mline_index: Option<u16>,
    #[serde(rename = "usernameFragment", default, skip_serializing_if = "Option::is_none")]
    pub username_fragment: Option<String>,
}

/// Body of the offer POST
#[derive(Debug, Serialize)]
pub struct OfferRequest<'a> {
    pub sdp: &'a str,
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
    pub webrtc_id: &'a str,
}

/// Body of an ICE candidate POST
#[derive(Debug, Serialize)]
pub struct IceCandidateRequest<'a> {
    pub candidate: &'a IceCandidate,
    pub webrtc_id: &'a str,
    #[serde(rename = "type")]
    pub message_type: &'static str,
}

impl<'a> IceCandidateRequest<'a> {
    pub fn new(candidate: &'a IceCandidate, webrtc_id: &'a str) -> Self {
        Self {
            candidate,
            webrtc_id,
            message_type: "ice-candidate",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_relay_config_accepts_string_and_list_urls() {
        let config: RelayConfig = serde_json::from_value(json!({
            "iceServers": [
                { "urls": "stun:stun.example.test:3478" },
                {
                    "urls": ["turn:turn.example.test:3478?transport=udp", "turns:turn.example.test:443"],
                    "username": "user",
                    "credential": "secret"
                }
            ]
        }))
        .unwrap();

        assert_eq!(config.ice_servers.len(), 2);
        assert_eq!(config.ice_servers[0].urls.to_vec(), vec!["stun:stun.example.test:3478"]);
        assert_eq!(config.ice_servers[1].urls.to_vec().len(), 2);
        assert_eq!(config.ice_servers[1].username.as_deref(), Some("user"));
    }

    #[test]
    fn test_default_relay_is_stun_only() {
        let value = serde_json::to_value(RelayConfig::default()).unwrap();
        assert_eq!(
            value,
            json!({ "iceServers": [{ "urls": "stun:stun.l.google.com:19302" }] })
        );
    }

    #[test]
    fn test_ice_candidate_request_shape() {
        let candidate = IceCandidate {
            candidate: "candidate:1 1 UDP 2122252543 192.0.2.1 54321 typ host".to_string(),
            sdp_mid: Some("0".to_string()),
            sdp_mline_index: Some(0),
            username_fragment: None,
        };

        let value = serde_json::to_value(IceCandidateRequest::new(&candidate, "abc123")).unwrap();
        assert_eq!(value["type"], "ice-candidate");
        assert_eq!(value["webrtc_id"], "abc123");
        assert_eq!(value["candidate"]["sdpMid"], "0");
        assert_eq!(value["candidate"]["sdpMLineIndex"], 0);
        assert!(value["candidate"].get("usernameFragment").is_none());
    }
}
