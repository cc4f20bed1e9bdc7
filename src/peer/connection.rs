use crate::error::PeerError;
use crate::logger::{dump_candidate, dump_selected_pair};
use crate::media::{LocalTrack, TrackKind};
use crate::peer::capability::{PeerConnection, PeerEvent, PeerEventSender, PeerFactory};
use crate::peer::ice::rtc_config;
use crate::peer::types::{
    ConnectionState, IceCandidate, IceServerConfig, RemoteTrack, SdpKind, SessionDescription,
};
use async_trait::async_trait;
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MediaEngine, MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::RTCIceCandidate;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RTPCodecType};
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::RTCRtpTransceiver;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

/// Фабрика peer connection на базе webrtc-rs
pub struct RtcPeerFactory {
    ice_servers: Vec<IceServerConfig>,
}

impl RtcPeerFactory {
    pub fn new(ice_servers: Vec<IceServerConfig>) -> Self {
        Self { ice_servers }
    }
}

#[async_trait]
impl PeerFactory for RtcPeerFactory {
    async fn create(&self, events: PeerEventSender) -> Result<Arc<dyn PeerConnection>, PeerError> {
        let peer = RtcPeer::new(&self.ice_servers, events).await?;
        Ok(Arc::new(peer))
    }
}

/// Peer connection с аудио/видео треками
pub struct RtcPeer {
    pc: Arc<RTCPeerConnection>,
}

impl RtcPeer {
    /// Создаём peer и подписываемся на его события
    pub async fn new(
        ice_servers: &[IceServerConfig],
        events: PeerEventSender,
    ) -> Result<Self, PeerError> {
        let mut media = MediaEngine::default();
        media.register_default_codecs()?;
        let registry = register_default_interceptors(Registry::new(), &mut media)?;

        let api = APIBuilder::new()
            .with_media_engine(media)
            .with_interceptor_registry(registry)
            .build();
        let pc = Arc::new(api.new_peer_connection(rtc_config(ice_servers)).await?);

        let candidate_tx = events.clone();
        pc.on_ice_candidate(Box::new(move |cand: Option<RTCIceCandidate>| {
            let event = match cand {
                Some(c) => match c.to_json() {
                    Ok(init) => {
                        let candidate = IceCandidate::from(init);
                        dump_candidate("LOCAL", &candidate);
                        Some(PeerEvent::IceCandidate(Some(candidate)))
                    }
                    Err(e) => {
                        warn!("Failed to serialize local candidate: {e}");
                        None
                    }
                },
                None => {
                    debug!("ICE candidate gathering completed (null candidate received)");
                    Some(PeerEvent::IceCandidate(None))
                }
            };
            if let Some(event) = event {
                let _ = candidate_tx.send(event);
            }
            Box::pin(async {})
        }));

        pc.on_ice_gathering_state_change(Box::new(move |state| {
            debug!("ICE gathering state changed to: {:?}", state);
            Box::pin(async {})
        }));

        // Weak, чтобы обработчик не держал peer connection живым
        let pc_stats: Weak<RTCPeerConnection> = Arc::downgrade(&pc);
        let state_tx = events.clone();
        pc.on_peer_connection_state_change(Box::new(move |st: RTCPeerConnectionState| {
            info!("Peer connection state changed to: {:?}", st);
            if matches!(
                st,
                RTCPeerConnectionState::Disconnected | RTCPeerConnectionState::Failed
            ) {
                if let Some(pc) = pc_stats.upgrade() {
                    tokio::spawn(async move {
                        dump_selected_pair(&pc, "BEFORE-FAIL").await;
                    });
                }
            }
            let _ = state_tx.send(PeerEvent::ConnectionState(st.into()));
            Box::pin(async {})
        }));

        let track_tx = events;
        pc.on_track(Box::new(
            move |track: Arc<TrackRemote>, _: Arc<RTCRtpReceiver>, _: Arc<RTCRtpTransceiver>| {
                let kind = match track.kind() {
                    RTPCodecType::Video => TrackKind::Video,
                    _ => TrackKind::Audio,
                };
                let remote = RemoteTrack {
                    id: track.id(),
                    stream_id: track.stream_id(),
                    kind,
                };
                info!("Remote track arrived: {:?}", remote);
                let _ = track_tx.send(PeerEvent::RemoteTrack(remote));
                Box::pin(async {})
            },
        ));

        Ok(Self { pc })
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.pc.connection_state().into()
    }
}

fn to_rtc(desc: SessionDescription) -> Result<RTCSessionDescription, PeerError> {
    let desc = match desc.kind {
        SdpKind::Offer => RTCSessionDescription::offer(desc.sdp)?,
        SdpKind::Answer => RTCSessionDescription::answer(desc.sdp)?,
    };
    Ok(desc)
}

fn codec_for(kind: TrackKind) -> RTCRtpCodecCapability {
    match kind {
        TrackKind::Audio => RTCRtpCodecCapability {
            mime_type: MIME_TYPE_OPUS.to_owned(),
            clock_rate: 48000,
            channels: 2,
            ..Default::default()
        },
        TrackKind::Video => RTCRtpCodecCapability {
            mime_type: MIME_TYPE_VP8.to_owned(),
            clock_rate: 90000,
            ..Default::default()
        },
    }
}

#[async_trait]
impl PeerConnection for RtcPeer {
    async fn create_offer(&self) -> Result<SessionDescription, PeerError> {
        let offer = self.pc.create_offer(None).await?;
        Ok(SessionDescription::offer(offer.sdp))
    }

    async fn create_answer(&self) -> Result<SessionDescription, PeerError> {
        let answer = self.pc.create_answer(None).await?;
        Ok(SessionDescription::answer(answer.sdp))
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<(), PeerError> {
        self.pc.set_local_description(to_rtc(desc)?).await?;
        Ok(())
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<(), PeerError> {
        self.pc.set_remote_description(to_rtc(desc)?).await?;
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), PeerError> {
        self.pc.add_ice_candidate(candidate.into()).await?;
        Ok(())
    }

    async fn add_track(&self, track: &LocalTrack) -> Result<(), PeerError> {
        let local = Arc::new(TrackLocalStaticSample::new(
            codec_for(track.kind),
            track.id.clone(),
            track.stream_id.clone(),
        ));
        let sender = self
            .pc
            .add_track(Arc::clone(&local) as Arc<dyn TrackLocal + Send + Sync>)
            .await?;

        // RTCP нужно вычитывать, иначе интерсепторы не работают
        tokio::spawn(async move {
            let mut rtcp_buf = vec![0u8; 1500];
            while sender.read(&mut rtcp_buf).await.is_ok() {}
        });

        debug!("Attached local {:?} track {}", track.kind, track.id);
        Ok(())
    }

    async fn close(&self) -> Result<(), PeerError> {
        debug!("Closing peer connection in state {:?}", self.connection_state());
        self.pc.close().await?;
        Ok(())
    }
}
