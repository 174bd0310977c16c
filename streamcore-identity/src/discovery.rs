//! Request/response DTOs for the four local-discovery HTTP endpoints
//! (§6): `GET/POST /spotify_info`, `GET /streamcore/get-display-info`,
//! `GET /streamcore/get-connect-info`, `POST
//! /streamcore/connect-to-qconnect`. The HTTP server that routes to
//! these handlers is out of scope (§1); this crate specifies the
//! handler *contract* as a trait, matching how `pmoupnp` separates
//! action handlers (in-scope, testable) from the axum router (thin
//! glue, out of scope here).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpotifyInfoResponse {
    pub device_id: String,
    pub remote_name: String,
    pub public_key: String,
    pub device_type: String,
    pub active_user: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpotifyInfoPost {
    pub client_key: String,
    pub blob: String,
    #[serde(rename = "deviceId")]
    pub device_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DisplayInfoResponse {
    pub device_id: String,
    pub device_name: String,
    pub firmware_version: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectInfoResponse {
    pub device_id: String,
    pub capabilities: Vec<String>,
}

/// `endpoint`/`jwt`/`exp` triple for the provider-B WS connect handshake.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtQconnect {
    pub endpoint: String,
    pub jwt: String,
    pub exp: i64,
}

/// `jwt`/`exp` pair for the provider-B HTTPS API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtApi {
    pub jwt: String,
    pub exp: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConnectToQconnectRequest {
    pub session_id: String,
    pub jwt_qconnect: JwtQconnect,
    pub jwt_api: JwtApi,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectToQconnectResponse {
    pub accepted: bool,
}

/// The in-scope surface of the local discovery HTTP server: request
/// handling only, not the HTTP transport itself.
pub trait DiscoveryHandlers: Send + Sync {
    fn get_spotify_info(&self) -> SpotifyInfoResponse;
    fn post_spotify_info(&self, body: SpotifyInfoPost) -> Result<(), String>;
    fn get_display_info(&self) -> DisplayInfoResponse;
    fn get_connect_info(&self) -> ConnectInfoResponse;
    fn connect_to_qconnect(
        &self,
        body: ConnectToQconnectRequest,
    ) -> ConnectToQconnectResponse;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeHandlers;

    impl DiscoveryHandlers for FakeHandlers {
        fn get_spotify_info(&self) -> SpotifyInfoResponse {
            SpotifyInfoResponse {
                device_id: "abc".into(),
                remote_name: "StreamCore32".into(),
                public_key: "".into(),
                device_type: "SPEAKER".into(),
                active_user: "".into(),
            }
        }
        fn post_spotify_info(&self, body: SpotifyInfoPost) -> Result<(), String> {
            if body.blob.is_empty() {
                Err("empty blob".into())
            } else {
                Ok(())
            }
        }
        fn get_display_info(&self) -> DisplayInfoResponse {
            DisplayInfoResponse {
                device_id: "abc".into(),
                device_name: "StreamCore32".into(),
                firmware_version: "1.0.0".into(),
            }
        }
        fn get_connect_info(&self) -> ConnectInfoResponse {
            ConnectInfoResponse { device_id: "abc".into(), capabilities: vec!["audio".into()] }
        }
        fn connect_to_qconnect(&self, body: ConnectToQconnectRequest) -> ConnectToQconnectResponse {
            ConnectToQconnectResponse { accepted: !body.session_id.is_empty() }
        }
    }

    #[test]
    fn handlers_trait_is_object_safe_and_callable() {
        let handlers: Box<dyn DiscoveryHandlers> = Box::new(FakeHandlers);
        assert_eq!(handlers.get_spotify_info().device_type, "SPEAKER");
        assert!(handlers
            .post_spotify_info(SpotifyInfoPost {
                client_key: "k".into(),
                blob: "b".into(),
                device_id: "d".into(),
            })
            .is_ok());
        assert!(handlers
            .post_spotify_info(SpotifyInfoPost {
                client_key: "k".into(),
                blob: "".into(),
                device_id: "d".into(),
            })
            .is_err());

        let resp = handlers.connect_to_qconnect(ConnectToQconnectRequest {
            session_id: "36-char-uuid-goes-here".into(),
            jwt_qconnect: JwtQconnect { endpoint: "wss://x".into(), jwt: "j".into(), exp: 0 },
            jwt_api: JwtApi { jwt: "j".into(), exp: 0 },
        });
        assert!(resp.accepted);
    }
}
