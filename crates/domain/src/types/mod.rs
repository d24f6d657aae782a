//! Domain types and models

pub mod auth;
pub mod health;
pub mod notice;
pub mod realtime;
pub mod request;
pub mod response;

pub use auth::TokenPair;
pub use health::HealthState;
pub use notice::Notice;
pub use realtime::{
    ChannelEndpoint, ChatMessage, ConnectionState, EntityUpdate, Envelope, FrameError,
    InboundMessage, MessageKind, NotificationPayload, OutboundMessage, PresenceUpdate,
};
pub use request::{FormPart, Method, RequestBody, RequestDescriptor, ResponseType};
pub use response::{ApiResponse, ResponseBody};
