/// The prefix of every round trigger pushed by the coordinator.
pub const TRIGGER_PREFIX: &str = "trigger_learning_round_";

/// The application layer message pushed by the coordinator over the signal socket.
///
/// The socket only carries plain text, the variants borrow from the received frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Msg<'a> {
    /// Start local training for the given round id.
    TriggerRound(&'a str),
    /// Anything the client doesn't understand.
    Unknown(&'a str),
}

impl<'a> Msg<'a> {
    /// Parses a text frame received from the coordinator.
    ///
    /// # Arguments
    /// * `text` - The raw text frame.
    ///
    /// # Returns
    /// `Msg::TriggerRound` if `text` is a trigger with a non empty round id,
    /// `Msg::Unknown` otherwise.
    pub fn parse(text: &'a str) -> Self {
        match text.trim().strip_prefix(TRIGGER_PREFIX) {
            Some(round_id) if !round_id.is_empty() => Msg::TriggerRound(round_id),
            _ => Msg::Unknown(text),
        }
    }

    /// A short name of the message kind, used for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Msg::TriggerRound(_) => "trigger_round",
            Msg::Unknown(_) => "unknown",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trigger_carries_the_round_id_suffix() {
        assert_eq!(
            Msg::parse("trigger_learning_round_42"),
            Msg::TriggerRound("42")
        );
        assert_eq!(
            Msg::parse("trigger_learning_round_round-7\n"),
            Msg::TriggerRound("round-7")
        );
    }

    #[test]
    fn trigger_without_id_is_unknown() {
        assert_eq!(
            Msg::parse("trigger_learning_round_"),
            Msg::Unknown("trigger_learning_round_")
        );
    }

    #[test]
    fn other_text_is_unknown() {
        let msg = Msg::parse("hello");
        assert_eq!(msg, Msg::Unknown("hello"));
        assert_eq!(msg.kind(), "unknown");
    }
}
