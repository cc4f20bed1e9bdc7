use crate::error::PeerError;
use crate::peer::types::{IceServerConfig, IceServerKind};
use crate::utils::add_ice_url_scheme;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use webrtc::peer_connection::policy::bundle_policy::RTCBundlePolicy;
use webrtc::peer_connection::policy::rtcp_mux_policy::RTCRtcpMuxPolicy;
use webrtc::{
    api::APIBuilder,
    ice_transport::{
        ice_candidate::RTCIceCandidate, ice_gatherer_state::RTCIceGathererState,
        ice_server::RTCIceServer,
    },
    peer_connection::{configuration::RTCConfiguration, RTCPeerConnection},
};

/// Сколько ждать кандидата нужного типа при проверке сервера
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Публичные STUN серверы Google
pub fn default_ice_servers() -> Vec<IceServerConfig> {
    vec![
        IceServerConfig {
            id: "default-stun".into(),
            r#type: IceServerKind::Stun,
            url: "stun:stun.l.google.com:19302".into(),
            username: None,
            credential: None,
        },
        IceServerConfig {
            id: "default-stun-1".into(),
            r#type: IceServerKind::Stun,
            url: "stun:stun1.l.google.com:19302".into(),
            username: None,
            credential: None,
        },
    ]
}

/// Переводит пользовательские настройки в формат webrtc
pub fn ice_servers(servers: &[IceServerConfig]) -> Vec<RTCIceServer> {
    servers
        .iter()
        .map(|config| RTCIceServer {
            urls: vec![add_ice_url_scheme(config)],
            username: config.username.clone().unwrap_or_default(),
            credential: config.credential.clone().unwrap_or_default(),
        })
        .collect()
}

/// Создает конфигурацию для peer connection
pub fn rtc_config(servers: &[IceServerConfig]) -> RTCConfiguration {
    RTCConfiguration {
        ice_servers: ice_servers(servers),
        ice_candidate_pool_size: 10,
        bundle_policy: RTCBundlePolicy::MaxBundle,
        rtcp_mux_policy: RTCRtcpMuxPolicy::Require,
        ..Default::default()
    }
}

/// Проверяет доступность STUN/TURN сервера.
///
/// Для STUN ждём srflx кандидата, для TURN - relay. Сбор завершился
/// без нужного кандидата или истёк таймаут - сервер недоступен.
pub async fn probe_ice_server(config: &IceServerConfig) -> Result<bool, PeerError> {
    let url = add_ice_url_scheme(config);
    debug!("Probing ICE server {}: '{}' -> '{}'", config.id, config.url, url);

    let rtc_config = RTCConfiguration {
        ice_servers: ice_servers(std::slice::from_ref(config)),
        ..Default::default()
    };
    let api = APIBuilder::new().build();
    let pc = Arc::new(api.new_peer_connection(rtc_config).await?);

    let result = probe_via_gathering(&pc, config.r#type).await;
    if let Err(e) = pc.close().await {
        warn!("Failed to close probe connection: {e}");
    }
    result
}

async fn probe_via_gathering(
    pc: &Arc<RTCPeerConnection>,
    kind: IceServerKind,
) -> Result<bool, PeerError> {
    let (state_tx, mut state_rx) = mpsc::unbounded_channel();
    pc.on_ice_gathering_state_change(Box::new(move |state: RTCIceGathererState| {
        debug!("ICE gathering state changed to: {:?}", state);
        let _ = state_tx.send(state);
        Box::pin(async {})
    }));

    let (found_tx, mut found_rx) = mpsc::unbounded_channel();
    pc.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
        if let Some(c) = candidate {
            match c.to_json() {
                Ok(json) if matches_kind(kind, &json.candidate) => {
                    debug!("Found matching candidate: {}", json.candidate);
                    let _ = found_tx.send(());
                }
                Ok(json) => debug!("Candidate type mismatch: {}", json.candidate),
                Err(e) => warn!("Failed to get candidate JSON: {e}"),
            }
        }
        Box::pin(async {})
    }));

    // Data channel нужен только чтобы в offer была m-секция и запустился сбор
    pc.create_data_channel("probe", None).await?;
    let offer = pc.create_offer(None).await?;
    pc.set_local_description(offer).await?;

    let gathering_complete = async {
        while let Some(state) = state_rx.recv().await {
            if state == RTCIceGathererState::Complete {
                break;
            }
        }
    };

    let reachable = tokio::select! {
        found = timeout(PROBE_TIMEOUT, found_rx.recv()) => matches!(found, Ok(Some(()))),
        _ = gathering_complete => {
            // Кандидат мог прийти одновременно с завершением сбора
            found_rx.try_recv().is_ok()
        }
    };
    info!(
        "ICE server probe ({:?}): {}",
        kind,
        if reachable { "reachable" } else { "unreachable" }
    );
    Ok(reachable)
}

fn matches_kind(kind: IceServerKind, candidate: &str) -> bool {
    match kind {
        IceServerKind::Stun => candidate.contains("typ srflx"),
        IceServerKind::Turn => candidate.contains("typ relay"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_carries_credentials_and_schemes() {
        let servers = vec![IceServerConfig {
            id: "t".into(),
            r#type: IceServerKind::Turn,
            url: "turn.example.org:3478".into(),
            username: Some("user".into()),
            credential: Some("secret".into()),
        }];
        let config = rtc_config(&servers);
        assert_eq!(config.ice_servers.len(), 1);
        assert_eq!(config.ice_servers[0].urls, vec!["turn:turn.example.org:3478"]);
        assert_eq!(config.ice_servers[0].username, "user");
        assert_eq!(config.bundle_policy, RTCBundlePolicy::MaxBundle);
    }

    #[test]
    fn candidate_kind_matching() {
        assert!(matches_kind(
            IceServerKind::Stun,
            "candidate:1 1 udp 1 1.2.3.4 5 typ srflx raddr 0.0.0.0 rport 0"
        ));
        assert!(!matches_kind(IceServerKind::Turn, "candidate:1 1 udp 1 10.0.0.1 5 typ host"));
    }
}
