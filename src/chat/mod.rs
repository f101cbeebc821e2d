//! Real-time chat client.
//!
//! [`ChatController`] owns the session and the transcript; a [`Connector`]
//! supplies the push channel and a [`ChatView`] renders what happens. The
//! binary wires [`WsConnector`] and [`TerminalChatView`] together; tests swap
//! in recording fakes.

pub mod controller;
pub mod protocol;
pub mod session;
pub mod transport;
pub mod view;

pub use controller::ChatController;
pub use protocol::{ChatMessage, InboundEvent, OutboundEvent};
pub use session::{validate_username, Session, SessionState, Transcript, TranscriptEntry};
pub use transport::{
    ChannelEvent, ChannelId, ChatChannel, Connector, TaggedEvent, WsChannel, WsConnector,
};
pub use view::{render_entry, user_count_label, ChatView, HtmlChatView, TerminalChatView};
