//! Input parsing and output formatting for the chat loop.

use clarity_client::SocketEvent;
use clarity_types::{ChatResponse, SessionHistory, TopicInfo};

#[derive(Debug, PartialEq, Eq)]
pub enum Input<'a> {
    Empty,
    Quit,
    History,
    Topics,
    Help,
    Unknown(&'a str),
    Message(&'a str),
}

pub fn parse(line: &str) -> Input<'_> {
    let line = line.trim();
    match line {
        "" => Input::Empty,
        "/quit" | "/exit" | "/q" => Input::Quit,
        "/history" => Input::History,
        "/topics" => Input::Topics,
        "/help" => Input::Help,
        cmd if cmd.starts_with('/') => Input::Unknown(cmd),
        text => Input::Message(text),
    }
}

pub const HELP: &str = "Commands: /history, /topics, /help, /quit. Anything else is sent as a message.";

pub fn reply(resp: &ChatResponse) -> String {
    let mut out = format!("clarity> {}", resp.content);
    let mut tags = Vec::new();
    if let Some(emotion) = &resp.emotional_state {
        tags.push(format!("mood: {emotion}"));
    }
    if let Some(topic) = &resp.topic_classification {
        tags.push(format!("topic: {topic}"));
    }
    if let Some(insight) = &resp.psychological_insight {
        tags.push(format!("pattern: {}", insight.pattern_detected));
    }
    if !tags.is_empty() {
        out.push_str(&format!("\n          [{}]", tags.join(", ")));
    }
    for suggestion in &resp.suggestions {
        out.push_str(&format!("\n          - {suggestion}"));
    }
    out
}

pub fn history(history: &SessionHistory) -> String {
    if history.history.is_empty() {
        return "(no messages yet)".to_string();
    }
    history
        .history
        .iter()
        .map(|m| format!("{:>5}: {}", m.sender.as_ref(), m.content))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn topics(topics: &[TopicInfo]) -> String {
    if topics.is_empty() {
        return "(no topics)".to_string();
    }
    topics
        .iter()
        .map(|t| format!("#{} {}: {}", t.topic_id, t.topic_name, t.keywords.join(", ")))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Status line for a socket event, if it is worth showing.
pub fn event(ev: &SocketEvent) -> Option<String> {
    match ev {
        SocketEvent::Typing(true) => Some("clarity is typing...".to_string()),
        SocketEvent::Reconnecting { attempt, delay } => {
            Some(format!("(reconnecting, attempt {attempt} in {}s)", delay.as_secs()))
        }
        SocketEvent::GaveUp { attempts } => {
            Some(format!("(live connection lost after {attempts} attempts; using http)"))
        }
        SocketEvent::ServerError(detail) => Some(format!("(server: {detail})")),
        _ => None,
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use clarity_types::PsychologicalInsight;

    use super::*;

    #[test]
    fn commands_and_messages() {
        assert_eq!(parse("  "), Input::Empty);
        assert_eq!(parse("/quit\n"), Input::Quit);
        assert_eq!(parse("/history"), Input::History);
        assert_eq!(parse("/topics"), Input::Topics);
        assert_eq!(parse("/nope"), Input::Unknown("/nope"));
        assert_eq!(parse(" I feel stuck \n"), Input::Message("I feel stuck"));
    }

    #[test]
    fn reply_lists_labels() {
        let resp = ChatResponse {
            content: "That sounds hard.".into(),
            session_id: "s-1".into(),
            timestamp: "2024-01-01T00:00:00Z".into(),
            confidence_score: 0.7,
            psychological_insight: Some(PsychologicalInsight {
                pattern_detected: "catastrophizing".into(),
                confidence: 0.8,
                therapeutic_approach: "CBT".into(),
                suggested_response: "Look at the evidence.".into(),
            }),
            emotional_state: Some("anxious".into()),
            topic_classification: None,
            suggestions: vec!["Try writing the worry down.".into()],
        };
        let text = reply(&resp);
        assert!(text.starts_with("clarity> That sounds hard."));
        assert!(text.contains("mood: anxious, pattern: catastrophizing"));
        assert!(text.ends_with("- Try writing the worry down."));
    }

    #[test]
    fn events_worth_showing() {
        assert!(event(&SocketEvent::Typing(true)).is_some());
        assert!(event(&SocketEvent::Typing(false)).is_none());
        let line = event(&SocketEvent::Reconnecting {
            attempt: 2,
            delay: Duration::from_secs(4),
        })
        .unwrap();
        assert_eq!(line, "(reconnecting, attempt 2 in 4s)");
    }

    #[test]
    fn empty_lists() {
        assert_eq!(history(&SessionHistory::empty()), "(no messages yet)");
        assert_eq!(topics(&[]), "(no topics)");
    }
}
