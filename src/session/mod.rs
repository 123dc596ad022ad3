pub mod engine;
pub mod mailbox;
pub mod state;

pub use engine::{InquiryRequest, SessionEngine, SessionHandle, VoiceIntent};
pub use mailbox::{FrameMailbox, FramePayload};
pub use state::{Mode, SessionState};
