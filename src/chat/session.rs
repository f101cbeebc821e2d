//! Session state and the append-only transcript.

use serde::Serialize;

use super::protocol::ChatMessage;

/// Minimum nickname length, in characters, after trimming.
pub const MIN_USERNAME_CHARS: usize = 2;

/// Connection lifecycle of the chat controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Joined,
}

/// The local participant. Exists from a successful join until leave.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    pub username: String,
    pub connected: bool,
}

/// Trim and check a nickname. Returns the trimmed name or a user-facing reason.
pub fn validate_username(raw: &str) -> Result<&str, &'static str> {
    let name = raw.trim();
    if name.is_empty() {
        return Err("Please enter a nickname.");
    }
    if name.chars().count() < MIN_USERNAME_CHARS {
        return Err("Nickname must be at least 2 characters.");
    }
    Ok(name)
}

/// One line of the transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TranscriptEntry {
    Chat(ChatMessage),
    System { text: String },
}

impl TranscriptEntry {
    pub fn system(text: impl Into<String>) -> Self {
        TranscriptEntry::System { text: text.into() }
    }

    pub fn is_system(&self) -> bool {
        matches!(self, TranscriptEntry::System { .. })
    }
}

/// Insertion-ordered list of entries. Entries are only appended or cleared
/// all at once, never reordered or removed individually.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Transcript {
    entries: Vec<TranscriptEntry>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: TranscriptEntry) -> &TranscriptEntry {
        self.entries.push(entry);
        &self.entries[self.entries.len() - 1]
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    pub fn last(&self) -> Option<&TranscriptEntry> {
        self.entries.last()
    }

    /// Only the chat messages, in arrival order.
    pub fn messages(&self) -> impl Iterator<Item = &ChatMessage> {
        self.entries.iter().filter_map(|e| match e {
            TranscriptEntry::Chat(m) => Some(m),
            TranscriptEntry::System { .. } => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("", "Please enter a nickname.")]
    #[case("   ", "Please enter a nickname.")]
    #[case("a", "Nickname must be at least 2 characters.")]
    #[case("  a  ", "Nickname must be at least 2 characters.")]
    #[case("\té\n", "Nickname must be at least 2 characters.")]
    fn rejects_short_names(#[case] raw: &str, #[case] reason: &str) {
        assert_eq!(validate_username(raw), Err(reason));
    }

    #[rstest]
    #[case("ab", "ab")]
    #[case("  zoe ", "zoe")]
    #[case("민수", "민수")]
    fn accepts_and_trims(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(validate_username(raw), Ok(expected));
    }

    #[test]
    fn transcript_keeps_insertion_order() {
        let mut t = Transcript::new();
        t.push(TranscriptEntry::system("welcome"));
        t.push(TranscriptEntry::Chat(ChatMessage::new("a1", "first")));
        t.push(TranscriptEntry::Chat(ChatMessage::new("b2", "second")));
        assert_eq!(t.len(), 3);
        let texts: Vec<&str> = t.messages().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "second"]);
        assert!(t.entries()[0].is_system());
    }

    #[test]
    fn transcript_clear_empties_everything() {
        let mut t = Transcript::new();
        t.push(TranscriptEntry::system("x"));
        t.clear();
        assert!(t.is_empty());
        assert!(t.last().is_none());
    }

    #[test]
    fn push_returns_the_new_entry() {
        let mut t = Transcript::new();
        let e = t.push(TranscriptEntry::system("hi")).clone();
        assert_eq!(e, TranscriptEntry::system("hi"));
    }
}
