//! Prompt assembly and reply extraction.
//!
//! The model sees a flat transcript:
//!
//! ```text
//! {instruction}
//!
//! User: {earlier message}
//! Assistant: {earlier reply}
//!
//! User: {message}
//! Assistant:
//! ```
//!
//! and its continuation is cut back down to the assistant's next turn.

use crate::session::Exchange;
use std::fmt::Write;

/// Speaker label for user turns.
pub const USER_MARKER: &str = "User:";

/// Speaker label for assistant turns.
pub const ASSISTANT_MARKER: &str = "Assistant:";

/// Reply sent in place of a failed generation.
pub const APOLOGY: &str =
    "I apologize, but I'm having trouble generating a response right now.";

/// Build the prompt for `message` given the instruction and prior exchanges.
///
/// The result always ends with `"User: {message}\nAssistant:"`.
pub fn build_prompt(instruction: &str, history: &[Exchange], message: &str) -> String {
    let mut prompt = format!("{instruction}\n\n");

    for exchange in history {
        let _ = write!(
            prompt,
            "{USER_MARKER} {}\n{ASSISTANT_MARKER} {}\n\n",
            exchange.user, exchange.assistant
        );
    }

    let _ = write!(prompt, "{USER_MARKER} {message}\n{ASSISTANT_MARKER}");
    prompt
}

/// Cut the assistant's turn out of a raw model continuation.
///
/// Keeps the text after the last `Assistant:` marker and drops anything from
/// the first `User:` marker on. Input without markers comes back trimmed.
pub fn extract_reply(raw: &str) -> String {
    let tail = raw
        .rsplit_once(ASSISTANT_MARKER)
        .map_or(raw, |(_, tail)| tail)
        .trim();

    tail.split_once(USER_MARKER)
        .map_or(tail, |(head, _)| head)
        .trim()
        .to_string()
}

/// Split a reply into word chunks for the streamed response body.
///
/// Every word but the last keeps one trailing space, so the chunks concatenate
/// to the reply with its whitespace runs collapsed.
pub fn stream_words(reply: &str) -> Vec<String> {
    let words: Vec<&str> = reply.split_whitespace().collect();
    let last = words.len().saturating_sub(1);

    words
        .iter()
        .enumerate()
        .map(|(i, word)| {
            if i < last {
                format!("{word} ")
            } else {
                (*word).to_string()
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_prompt_without_history() {
        let prompt = build_prompt("Be kind.", &[], "Hello");
        assert_eq!(prompt, "Be kind.\n\nUser: Hello\nAssistant:");
    }

    #[test]
    fn test_build_prompt_with_history() {
        let history = vec![
            Exchange::new("I can't sleep", "That sounds hard."),
            Exchange::new("Any tips?", "Try a short wind-down routine."),
        ];
        let prompt = build_prompt("Be kind.", &history, "Thanks");

        assert_eq!(
            prompt,
            "Be kind.\n\n\
             User: I can't sleep\nAssistant: That sounds hard.\n\n\
             User: Any tips?\nAssistant: Try a short wind-down routine.\n\n\
             User: Thanks\nAssistant:"
        );
    }

    #[test]
    fn test_build_prompt_suffix() {
        let history = vec![Exchange::new("a", "b")];
        for message in ["hi", "", "multi\nline"] {
            let prompt = build_prompt("instruction", &history, message);
            assert!(prompt.ends_with(&format!("User: {message}\nAssistant:")));
        }
    }

    #[test]
    fn test_extract_reply_stops_at_next_user_turn() {
        let raw = "...Assistant: Hello there\nUser: next";
        assert_eq!(extract_reply(raw), "Hello there");
    }

    #[test]
    fn test_extract_reply_uses_last_assistant_marker() {
        let raw = "User: hi\nAssistant: old reply\n\nUser: again\nAssistant:   new reply  ";
        assert_eq!(extract_reply(raw), "new reply");
    }

    #[test]
    fn test_extract_reply_without_markers() {
        assert_eq!(extract_reply("  just text \n"), "just text");
    }

    #[test]
    fn test_extract_reply_user_marker_only() {
        assert_eq!(extract_reply("Sure thing. User: more"), "Sure thing.");
    }

    #[test]
    fn test_extract_reply_empty_turn() {
        assert_eq!(extract_reply("prompt\nAssistant:"), "");
    }

    #[test]
    fn test_stream_words_trailing_spaces() {
        assert_eq!(
            stream_words("Take a  deep\nbreath"),
            vec!["Take ", "a ", "deep ", "breath"]
        );
    }

    #[test]
    fn test_stream_words_single_word() {
        assert_eq!(stream_words("  Okay "), vec!["Okay"]);
    }

    #[test]
    fn test_stream_words_empty() {
        assert!(stream_words("").is_empty());
        assert!(stream_words(" \n\t").is_empty());
    }

    #[test]
    fn test_stream_words_concat_matches_reply() {
        let reply = "You are not alone in this.";
        assert_eq!(stream_words(reply).concat(), reply);
    }
}
