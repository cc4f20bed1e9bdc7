pub mod config;
pub mod error;
pub mod logger;
pub mod media;
pub mod negotiator;
pub mod peer;
pub mod session;
pub mod signaling;
pub mod utils;

pub use config::NegotiatorConfig;
pub use error::{CommandError, ConfigError, FailureReason, MediaError, PeerError, TransportError};
pub use media::{LocalMedia, LocalTrack, MediaSource, StaticMedia, TrackKind};
pub use negotiator::{Negotiator, NegotiatorHandle, SessionEvent, Status};
pub use session::{EndReason, NegotiationState, Role};
pub use signaling::{PeerId, RoomId, SignalingMessage, SignalingTransport, TransportEvent};
