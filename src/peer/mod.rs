pub mod buffer;
pub mod capability;
pub mod connection;
pub mod election;
pub mod ice;
pub mod types;

pub use buffer::{CandidateBuffer, Offered};
pub use capability::{PeerConnection, PeerEvent, PeerEventSender, PeerFactory};
pub use connection::{RtcPeer, RtcPeerFactory};
pub use election::elect_role;
pub use types::{
    ConnectionState, IceCandidate, IceServerConfig, IceServerKind, RemoteTrack, SdpKind,
    SessionDescription,
};
