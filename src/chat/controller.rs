//! The chat session controller.
//!
//! ## Lifecycle
//! `Disconnected → Connecting → Joined → Disconnected`
//!
//! 1. `join(name)` validates the nickname, opens (or reuses) the channel and
//!    announces the user.
//! 2. `send(text)` transmits while joined; otherwise the user gets a blocking
//!    alert.
//! 3. Inbound [`TaggedEvent`]s are fed to `handle_tagged` by the driver loop.
//!    Events from any connection other than the current one are dropped.
//! 4. `leave()` asks for confirmation, announces the departure and resets
//!    everything. `unload()` does the same without asking, at most once.

use tracing::{debug, info, warn};

use super::protocol::{ChatMessage, InboundEvent, OutboundEvent};
use super::session::{validate_username, Session, SessionState, Transcript, TranscriptEntry};
use super::transport::{ChannelEvent, ChatChannel, Connector, TaggedEvent};
use super::view::ChatView;
use crate::error::DevroomError;

const NOT_CONNECTED_ALERT: &str = "The connection to the server was lost. Rejoin to keep chatting.";
const CHANNEL_WARNING: &str = "There is a problem with the chat server connection.";
const DISCONNECTED_WARNING: &str = "Disconnected from the chat server.";
const LEAVE_QUESTION: &str = "Leave the chat room?";
const UNLOAD_QUESTION: &str = "You are still in the chat room. Leave and quit?";

pub struct ChatController<C: Connector, V: ChatView> {
    connector: C,
    channel: Option<C::Channel>,
    view: V,
    state: SessionState,
    session: Option<Session>,
    transcript: Transcript,
    user_count: u32,
}

impl<C: Connector, V: ChatView> ChatController<C, V> {
    pub fn new(connector: C, mut view: V) -> Self {
        view.show_placeholder();
        Self {
            connector,
            channel: None,
            view,
            state: SessionState::Disconnected,
            session: None,
            transcript: Transcript::new(),
            user_count: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn is_connected(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.connected)
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn user_count(&self) -> u32 {
        self.user_count
    }

    pub fn view(&self) -> &V {
        &self.view
    }

    pub fn view_mut(&mut self) -> &mut V {
        &mut self.view
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Join the room as `name`.
    ///
    /// # Errors
    /// - [`DevroomError::Validation`] for blank names or names under 2
    ///   characters; nothing is sent and the state stays `Disconnected`.
    /// - [`DevroomError::Channel`] when the connection cannot be opened.
    pub async fn join(&mut self, name: &str) -> Result<(), DevroomError> {
        let username = match validate_username(name) {
            Ok(n) => n.to_string(),
            Err(reason) => {
                self.view.alert(reason);
                return Err(DevroomError::Validation(reason.to_string()));
            }
        };

        self.state = SessionState::Connecting;

        let reusable = self.channel.as_ref().is_some_and(|c| c.is_open());
        if !reusable {
            match self.connector.connect().await {
                Ok(channel) => self.channel = Some(channel),
                Err(e) => {
                    warn!(error = %e, "chat connect failed");
                    self.state = SessionState::Disconnected;
                    self.view.warn(CHANNEL_WARNING);
                    return Err(e);
                }
            }
        } else {
            debug!("reusing open chat channel");
        }

        let announce = OutboundEvent::Join {
            username: username.clone(),
        };
        if let Some(channel) = self.channel.as_mut() {
            if let Err(e) = channel.emit(&announce) {
                warn!(error = %e, "join announcement failed");
                self.channel = None;
                self.state = SessionState::Disconnected;
                self.view.warn(CHANNEL_WARNING);
                return Err(e);
            }
        }

        info!(username = %username, "joined chat room");
        self.session = Some(Session {
            username: username.clone(),
            connected: true,
        });
        self.state = SessionState::Joined;
        self.view.show_joined(&username);
        self.view.clear_placeholder();
        self.push_entry(
            TranscriptEntry::system("You joined the chat room. Enjoy the conversation!"),
            false,
        );
        Ok(())
    }

    /// Send `text` to the room.
    ///
    /// Returns `Ok(false)` without sending anything when `text` is blank.
    ///
    /// # Errors
    /// [`DevroomError::NotConnected`] when not joined; the user is alerted.
    pub fn send(&mut self, text: &str) -> Result<bool, DevroomError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(false);
        }

        let username = match (&self.session, self.state) {
            (Some(s), SessionState::Joined) if s.connected => s.username.clone(),
            _ => {
                self.view.alert(NOT_CONNECTED_ALERT);
                return Err(DevroomError::NotConnected);
            }
        };
        let Some(channel) = self.channel.as_mut() else {
            self.view.alert(NOT_CONNECTED_ALERT);
            return Err(DevroomError::NotConnected);
        };

        if let Err(e) = channel.emit(&OutboundEvent::Message(ChatMessage::new(username, text))) {
            warn!(error = %e, "chat message could not be queued");
            self.mark_disconnected();
            self.view.alert(NOT_CONNECTED_ALERT);
            return Err(DevroomError::NotConnected);
        }

        self.view.clear_input();
        Ok(true)
    }

    /// Leave the room after the user confirms.
    ///
    /// Returns `false` when the user cancelled; nothing changes in that case.
    pub fn leave(&mut self) -> bool {
        if !self.view.confirm(LEAVE_QUESTION) {
            return false;
        }
        self.announce_leave_and_close();
        self.session = None;
        self.state = SessionState::Disconnected;
        self.transcript.clear();
        self.view.show_placeholder();
        info!("left chat room");
        true
    }

    /// Whether the user should be warned before the process goes away.
    pub fn before_unload(&self) -> bool {
        self.state == SessionState::Joined
            && self
                .session
                .as_ref()
                .is_some_and(|s| s.connected && !s.username.is_empty())
    }

    /// Warn before teardown while joined. Returns `true` when the process may
    /// go ahead; a cancelled answer leaves the session untouched.
    pub fn confirm_unload(&mut self) -> bool {
        !self.before_unload() || self.view.confirm(UNLOAD_QUESTION)
    }

    /// Process teardown: best-effort leave announcement and close, no
    /// confirmation, at most once. Delivery is not confirmed.
    pub fn unload(&mut self) {
        if self.channel.is_none() {
            return;
        }
        self.announce_leave_and_close();
        self.mark_disconnected();
    }

    /// Apply an event from the transport if it belongs to the current channel.
    pub fn handle_tagged(&mut self, tagged: TaggedEvent) {
        let current = self.channel.as_ref().map(|c| c.id());
        if current != Some(tagged.channel) {
            debug!(channel = tagged.channel.0, event = ?tagged.event, "dropping event from retired channel");
            return;
        }
        self.handle_event(tagged.event);
    }

    /// Apply one event from the current channel. Transcript events are
    /// dropped while no session exists.
    pub fn handle_event(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::Inbound(InboundEvent::Message(_)) if self.session.is_none() => {
                debug!("dropping message received outside a session");
            }
            ChannelEvent::Inbound(InboundEvent::Message(msg)) => {
                let own = self
                    .session
                    .as_ref()
                    .is_some_and(|s| s.username == msg.username);
                self.push_entry(TranscriptEntry::Chat(msg), own);
            }
            ChannelEvent::Inbound(InboundEvent::UserJoined { username, count }) => {
                if self.session.is_some() {
                    self.push_entry(TranscriptEntry::system(format!("{username} joined the room.")), false);
                }
                if let Some(count) = count {
                    self.set_user_count(count);
                }
            }
            ChannelEvent::Inbound(InboundEvent::UserLeft { username, count }) => {
                if self.session.is_some() {
                    self.push_entry(TranscriptEntry::system(format!("{username} left the room.")), false);
                }
                if let Some(count) = count {
                    self.set_user_count(count);
                }
            }
            ChannelEvent::Inbound(InboundEvent::UserCount { count }) => {
                self.set_user_count(count);
            }
            ChannelEvent::Inbound(InboundEvent::Error { detail }) | ChannelEvent::Error(detail) => {
                warn!(detail = %detail, "chat channel error");
                self.view.warn(CHANNEL_WARNING);
            }
            ChannelEvent::Closed if self.channel.is_none() => {
                debug!("close reported with no open channel");
            }
            ChannelEvent::Closed => {
                info!("chat channel closed by server");
                self.channel = None;
                self.mark_disconnected();
                self.view.warn(DISCONNECTED_WARNING);
            }
        }
    }

    fn push_entry(&mut self, entry: TranscriptEntry, own: bool) {
        let entry = self.transcript.push(entry);
        self.view.append(entry, own);
        self.view.scroll_to_newest();
    }

    fn set_user_count(&mut self, count: u32) {
        self.user_count = count;
        self.view.set_user_count(count);
    }

    fn mark_disconnected(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.connected = false;
        }
        self.state = SessionState::Disconnected;
    }

    fn announce_leave_and_close(&mut self) {
        let Some(mut channel) = self.channel.take() else {
            return;
        };
        if let Some(session) = &self.session {
            let leave = OutboundEvent::Leave {
                username: session.username.clone(),
            };
            if let Err(e) = channel.emit(&leave) {
                debug!(error = %e, "leave announcement not delivered");
            }
        }
        channel.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::transport::ChannelId;
    use crate::chat::view::HtmlChatView;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Wire {
        sent: Arc<Mutex<Vec<OutboundEvent>>>,
        connects: Arc<Mutex<u32>>,
        closes: Arc<Mutex<u32>>,
    }

    struct FakeChannel {
        id: ChannelId,
        wire: Wire,
        open: bool,
    }

    impl ChatChannel for FakeChannel {
        fn id(&self) -> ChannelId {
            self.id
        }
        fn emit(&mut self, event: &OutboundEvent) -> Result<(), DevroomError> {
            if !self.open {
                return Err(DevroomError::NotConnected);
            }
            self.wire.sent.lock().unwrap().push(event.clone());
            Ok(())
        }
        fn close(&mut self) {
            self.open = false;
            *self.wire.closes.lock().unwrap() += 1;
        }
        fn is_open(&self) -> bool {
            self.open
        }
    }

    struct FakeConnector {
        wire: Wire,
        fail: bool,
    }

    #[async_trait]
    impl Connector for FakeConnector {
        type Channel = FakeChannel;
        async fn connect(&mut self) -> Result<FakeChannel, DevroomError> {
            if self.fail {
                return Err(DevroomError::Channel("refused".to_string()));
            }
            let id = {
                let mut connects = self.wire.connects.lock().unwrap();
                *connects += 1;
                ChannelId(u64::from(*connects))
            };
            Ok(FakeChannel {
                id,
                wire: self.wire.clone(),
                open: true,
            })
        }
    }

    fn controller(fail: bool) -> (ChatController<FakeConnector, HtmlChatView>, Wire) {
        let wire = Wire::default();
        let connector = FakeConnector {
            wire: wire.clone(),
            fail,
        };
        (ChatController::new(connector, HtmlChatView::new(true)), wire)
    }

    #[tokio::test]
    async fn join_sends_announcement_and_system_message() {
        let (mut chat, wire) = controller(false);
        chat.join("  ab ").await.unwrap();
        assert_eq!(chat.state(), SessionState::Joined);
        assert_eq!(chat.session().unwrap().username, "ab");
        assert!(chat.is_connected());
        assert_eq!(chat.transcript().len(), 1);
        assert!(chat.transcript().entries()[0].is_system());
        assert_eq!(
            wire.sent.lock().unwrap().as_slice(),
            &[OutboundEvent::Join {
                username: "ab".to_string()
            }]
        );
        assert!(!chat.view().placeholder);
        assert_eq!(chat.view().status_label, "Connected as ab");
    }

    #[tokio::test]
    async fn join_short_name_stays_disconnected() {
        let (mut chat, wire) = controller(false);
        let err = chat.join(" a ").await.unwrap_err();
        assert!(matches!(err, DevroomError::Validation(_)));
        assert_eq!(chat.state(), SessionState::Disconnected);
        assert!(chat.session().is_none());
        assert_eq!(*wire.connects.lock().unwrap(), 0);
        assert_eq!(chat.view().alerts.len(), 1);
    }

    #[tokio::test]
    async fn join_reuses_open_channel() {
        let (mut chat, wire) = controller(false);
        chat.join("ab").await.unwrap();
        chat.join("abc").await.unwrap();
        assert_eq!(*wire.connects.lock().unwrap(), 1);
        assert_eq!(wire.sent.lock().unwrap().len(), 2);
        assert_eq!(chat.session().unwrap().username, "abc");
    }

    #[tokio::test]
    async fn join_connect_failure_warns_and_stays_disconnected() {
        let (mut chat, _wire) = controller(true);
        let err = chat.join("ab").await.unwrap_err();
        assert!(matches!(err, DevroomError::Channel(_)));
        assert_eq!(chat.state(), SessionState::Disconnected);
        assert_eq!(chat.view().warnings.len(), 1);
    }

    #[tokio::test]
    async fn send_transmits_trimmed_text() {
        let (mut chat, wire) = controller(false);
        chat.join("ab").await.unwrap();
        assert!(chat.send("  hello  ").unwrap());
        let sent = wire.sent.lock().unwrap();
        match &sent[1] {
            OutboundEvent::Message(m) => {
                assert_eq!(m.username, "ab");
                assert_eq!(m.text, "hello");
                assert!(!m.timestamp.is_empty());
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn send_blank_is_noop_even_when_disconnected() {
        let (mut chat, wire) = controller(false);
        assert!(!chat.send("   ").unwrap());
        assert!(wire.sent.lock().unwrap().is_empty());
        assert!(chat.view().alerts.is_empty());
    }

    #[test]
    fn send_before_join_is_not_connected() {
        let (mut chat, wire) = controller(false);
        let err = chat.send("hi").unwrap_err();
        assert!(matches!(err, DevroomError::NotConnected));
        assert!(wire.sent.lock().unwrap().is_empty());
        assert_eq!(chat.view().alerts.len(), 1);
    }

    #[tokio::test]
    async fn send_after_server_close_is_not_connected() {
        let (mut chat, wire) = controller(false);
        chat.join("ab").await.unwrap();
        chat.handle_event(ChannelEvent::Closed);
        assert!(!chat.is_connected());
        assert_eq!(chat.session().unwrap().username, "ab");
        assert!(matches!(chat.send("hi"), Err(DevroomError::NotConnected)));
        assert_eq!(wire.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn rejoin_after_close_reconnects() {
        let (mut chat, wire) = controller(false);
        chat.join("ab").await.unwrap();
        chat.handle_event(ChannelEvent::Closed);
        chat.join("ab").await.unwrap();
        assert_eq!(*wire.connects.lock().unwrap(), 2);
        assert!(chat.is_connected());
    }

    #[tokio::test]
    async fn leave_confirmed_resets_everything() {
        let (mut chat, wire) = controller(false);
        chat.join("ab").await.unwrap();
        assert!(chat.leave());
        assert_eq!(chat.state(), SessionState::Disconnected);
        assert!(!chat.is_connected());
        assert!(chat.transcript().is_empty());
        assert!(chat.view().placeholder);
        let sent = wire.sent.lock().unwrap();
        assert_eq!(
            sent.last().unwrap(),
            &OutboundEvent::Leave {
                username: "ab".to_string()
            }
        );
        assert_eq!(*wire.closes.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn leave_cancelled_changes_nothing() {
        let (mut chat, wire) = controller(false);
        chat.join("ab").await.unwrap();
        chat.view_mut().auto_confirm = false;
        assert!(!chat.leave());
        assert!(chat.is_connected());
        assert_eq!(chat.transcript().len(), 1);
        assert_eq!(wire.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unload_is_at_most_once() {
        let (mut chat, wire) = controller(false);
        chat.join("ab").await.unwrap();
        assert!(chat.before_unload());
        chat.unload();
        chat.unload();
        assert!(!chat.before_unload());
        let leaves = wire
            .sent
            .lock()
            .unwrap()
            .iter()
            .filter(|e| matches!(e, OutboundEvent::Leave { .. }))
            .count();
        assert_eq!(leaves, 1);
        assert_eq!(*wire.closes.lock().unwrap(), 1);
    }

    #[test]
    fn unload_without_channel_sends_nothing() {
        let (mut chat, wire) = controller(false);
        assert!(!chat.before_unload());
        chat.unload();
        assert!(wire.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn own_messages_are_flagged() {
        let (mut chat, _wire) = controller(false);
        chat.join("ab").await.unwrap();
        chat.handle_event(ChannelEvent::Inbound(InboundEvent::Message(ChatMessage::new(
            "ab", "mine",
        ))));
        chat.handle_event(ChannelEvent::Inbound(InboundEvent::Message(ChatMessage::new(
            "zoe", "theirs",
        ))));
        let entries = &chat.view().entries;
        assert!(entries[1].contains("message own"), "entry: {}", entries[1]);
        assert!(!entries[2].contains("message own"), "entry: {}", entries[2]);
    }

    #[tokio::test]
    async fn presence_events_update_count_and_transcript() {
        let (mut chat, _wire) = controller(false);
        chat.join("ab").await.unwrap();
        chat.handle_event(ChannelEvent::Inbound(InboundEvent::UserJoined {
            username: "zoe".to_string(),
            count: Some(2),
        }));
        chat.handle_event(ChannelEvent::Inbound(InboundEvent::UserLeft {
            username: "zoe".to_string(),
            count: Some(1),
        }));
        chat.handle_event(ChannelEvent::Inbound(InboundEvent::UserCount { count: 5 }));
        assert_eq!(chat.user_count(), 5);
        assert_eq!(chat.view().user_count_label, "5 online");
        let texts: Vec<String> = chat
            .transcript()
            .entries()
            .iter()
            .skip(1)
            .map(|e| match e {
                TranscriptEntry::System { text } => text.clone(),
                TranscriptEntry::Chat(m) => m.text.clone(),
            })
            .collect();
        assert_eq!(texts, vec!["zoe joined the room.", "zoe left the room."]);
    }

    #[tokio::test]
    async fn channel_error_warns_but_keeps_session() {
        let (mut chat, _wire) = controller(false);
        chat.join("ab").await.unwrap();
        chat.handle_event(ChannelEvent::Error("reset by peer".to_string()));
        chat.handle_event(ChannelEvent::Inbound(InboundEvent::Error {
            detail: "room full".to_string(),
        }));
        assert_eq!(chat.view().warnings.len(), 2);
        assert!(chat.is_connected());
        assert_eq!(chat.state(), SessionState::Joined);
        assert_eq!(chat.transcript().len(), 1);
    }

    #[tokio::test]
    async fn events_from_retired_channel_are_dropped() {
        let (mut chat, _wire) = controller(false);
        chat.join("ab").await.unwrap();
        chat.handle_event(ChannelEvent::Closed);
        chat.join("ab").await.unwrap();

        chat.handle_tagged(TaggedEvent {
            channel: ChannelId(1),
            event: ChannelEvent::Closed,
        });
        assert!(chat.is_connected());
        assert_eq!(chat.state(), SessionState::Joined);

        chat.handle_tagged(TaggedEvent {
            channel: ChannelId(2),
            event: ChannelEvent::Inbound(InboundEvent::Message(ChatMessage::new("zoe", "hi"))),
        });
        assert_eq!(chat.transcript().messages().count(), 1);
    }

    #[test]
    fn transcript_events_without_session_are_dropped() {
        let (mut chat, _wire) = controller(false);
        chat.handle_event(ChannelEvent::Inbound(InboundEvent::Message(ChatMessage::new(
            "zoe", "hi",
        ))));
        chat.handle_event(ChannelEvent::Inbound(InboundEvent::UserJoined {
            username: "zoe".to_string(),
            count: Some(2),
        }));
        assert!(chat.transcript().is_empty());
        assert_eq!(chat.user_count(), 2);
        chat.handle_event(ChannelEvent::Closed);
        assert!(chat.view().warnings.is_empty());
    }

    #[tokio::test]
    async fn cancelled_unload_keeps_session() {
        let (mut chat, wire) = controller(false);
        chat.join("ab").await.unwrap();
        chat.view_mut().auto_confirm = false;
        assert!(!chat.confirm_unload());
        assert!(chat.is_connected());
        assert_eq!(wire.sent.lock().unwrap().len(), 1);

        chat.view_mut().auto_confirm = true;
        assert!(chat.confirm_unload());
    }
}
