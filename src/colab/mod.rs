//! Real-time collaboration core: sessions, presence, the write pipeline
//! and the gate that keeps conventional writes out of live sessions.

pub mod gate;
pub mod pipeline;
pub mod presence;
pub mod registry;
pub mod session;
pub mod sweeper;
pub mod view;

pub use gate::{ensure_no_active_session, DirectMutation, GateGuard};
pub use pipeline::{DiagramTransform, TransformOutput, UpdateEvent, UpdateOutcome, UpdatePipeline, UpdateSource};
pub use presence::{ConnectionId, FanOut, Participant, PresenceTracker};
pub use registry::{LeaveOutcome, SessionEntry, SessionRegistry};
pub use session::{CollaborationSession, SessionSnapshot};
pub use sweeper::spawn_idle_sweeper;
pub use view::{build_session_view, websocket_url};
