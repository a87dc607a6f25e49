//! Context window construction
//!
//! Turns recent history into the framed prompt sent to the runner.

use crate::models::{ConversationTurn, HistoryEntry};
use serde::{Deserialize, Serialize};

/// Entries considered from the client history (the last one is dropped)
pub const HISTORY_WINDOW: usize = 6;

/// Turns rendered from the session log, each one a question/answer pair
pub const SESSION_TURN_WINDOW: usize = HISTORY_WINDOW / 2;

pub const CONTEXT_HEADER: &str = "Contesto della conversazione precedente:";
pub const CURRENT_MESSAGE_LABEL: &str = "Messaggio attuale:";
pub const USER_LABEL: &str = "Utente";
pub const ASSISTANT_LABEL: &str = "Assistente";

/// Where the prompt context is taken from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextSource {
    /// The `history` array sent by the caller
    #[default]
    ClientHistory,
    /// The session's own turn log; the client array is ignored
    SessionLog,
}

impl ContextSource {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "client" | "client_history" => Some(ContextSource::ClientHistory),
            "session" | "session_log" | "server" => Some(ContextSource::SessionLog),
            _ => None,
        }
    }
}

fn label(is_user: bool) -> &'static str {
    if is_user {
        USER_LABEL
    } else {
        ASSISTANT_LABEL
    }
}

/// Render the client history window.
///
/// Only histories with more than one entry produce lines: the last
/// [`HISTORY_WINDOW`] entries are taken and the final one (the current
/// message echoed back by the client) is dropped.
pub fn render_client_history(history: &[HistoryEntry]) -> Vec<String> {
    if history.len() <= 1 {
        return Vec::new();
    }

    let start = history.len().saturating_sub(HISTORY_WINDOW);
    let window = &history[start..history.len() - 1];

    window
        .iter()
        .map(|entry| format!("{}: {}", label(entry.is_user()), entry.content))
        .collect()
}

/// Render the last whole turns of the session's own log.
pub fn render_session_log(turns: &[ConversationTurn]) -> Vec<String> {
    let start = turns.len().saturating_sub(SESSION_TURN_WINDOW);

    turns[start..]
        .iter()
        .flat_map(|turn| {
            [
                format!("{}: {}", USER_LABEL, turn.user_message),
                format!("{}: {}", ASSISTANT_LABEL, turn.agent_response),
            ]
        })
        .collect()
}

/// Frame `message` with the rendered context lines, or return it verbatim.
pub fn build_prompt(message: &str, context_lines: &[String]) -> String {
    if context_lines.is_empty() {
        return message.to_string();
    }

    let mut prompt = String::new();
    prompt.push_str(CONTEXT_HEADER);
    prompt.push('\n');
    for line in context_lines {
        prompt.push_str(line);
        prompt.push('\n');
    }
    prompt.push('\n');
    prompt.push_str(CURRENT_MESSAGE_LABEL);
    prompt.push(' ');
    prompt.push_str(message);
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history(n: usize) -> Vec<HistoryEntry> {
        (0..n)
            .map(|i| {
                let role = if i % 2 == 0 { "user" } else { "assistant" };
                HistoryEntry::new(role, format!("m{}", i))
            })
            .collect()
    }

    #[test]
    fn test_eight_entries_render_last_five() {
        let lines = render_client_history(&history(8));
        assert_eq!(
            lines,
            vec!["Utente: m2", "Assistente: m3", "Utente: m4", "Assistente: m5", "Utente: m6"]
        );
    }

    #[test]
    fn test_short_history_adds_no_context() {
        assert!(render_client_history(&history(1)).is_empty());
        assert!(render_client_history(&[]).is_empty());
        assert_eq!(build_prompt("ciao", &[]), "ciao");
    }

    #[test]
    fn test_two_entries_render_first_only() {
        let lines = render_client_history(&history(2));
        assert_eq!(lines, vec!["Utente: m0".to_string()]);
    }

    #[test]
    fn test_prompt_framing() {
        let prompt = build_prompt("e MSFT?", &["Utente: prezzo AAPL".to_string()]);
        assert_eq!(
            prompt,
            "Contesto della conversazione precedente:\nUtente: prezzo AAPL\n\nMessaggio attuale: e MSFT?"
        );
    }

    #[test]
    fn test_session_log_window_keeps_whole_turns() {
        let turns: Vec<ConversationTurn> = (0..4)
            .map(|i| ConversationTurn::new(format!("q{}", i), format!("a{}", i)))
            .collect();

        let lines = render_session_log(&turns);
        assert_eq!(
            lines,
            vec![
                "Utente: q1",
                "Assistente: a1",
                "Utente: q2",
                "Assistente: a2",
                "Utente: q3",
                "Assistente: a3"
            ]
        );
        assert!(lines[0].starts_with(USER_LABEL));
    }

    #[test]
    fn test_session_log_short() {
        assert!(render_session_log(&[]).is_empty());
        assert_eq!(
            render_session_log(&[ConversationTurn::new("q", "a")]),
            vec!["Utente: q", "Assistente: a"]
        );
    }

    #[test]
    fn test_context_source_parse() {
        assert_eq!(ContextSource::parse("session"), Some(ContextSource::SessionLog));
        assert_eq!(ContextSource::parse("CLIENT"), Some(ContextSource::ClientHistory));
        assert_eq!(ContextSource::parse("other"), None);
    }
}
