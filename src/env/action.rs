//! Turning free-form model output into a canonical environment action.
//!
//! Four formats are in use across the environment servers:
//!
//! - **Single marker** ([`MarkedActionParser`]): exactly one `Action:` line,
//!   sanitized to an allow-list of characters. Zero or several markers are
//!   answered in-band without contacting the server.
//! - **ReAct** ([`parse_react`]): `Thought: ... Action: ...`, taking whatever
//!   follows the *last* `Action:`.
//! - **First marker** ([`first_action`]): the text after the first
//!   `Action:`, passed through unsanitized.
//! - **Fenced SQL** ([`extract_sql`]): the body of a ```` ```sql ```` block.

use regex::Regex;

use crate::conversation::ActionWithThought;
use crate::error::{HarnessError, Result};

/// The marker models are instructed to put before their action.
pub const ACTION_MARKER: &str = "Action:";

/// In-band state returned when a response carries more than one action.
pub const MULTIPLE_ACTIONS_MESSAGE: &str =
    "Error: Only one 'Action' is allowed per response. Please adjust your response.";

/// In-band state returned when a response carries no action at all.
pub const MISSING_ACTION_MESSAGE: &str =
    "Error: No 'Action' found in your response. Please answer with a line of the form 'Action: <your action>'.";

/// Prefix of the in-band state returned for unparseable ReAct responses.
pub const INVALID_ACTION_PREFIX: &str = "Invalid Action.\n\n";

const END_OF_SEQUENCE: &str = "</s>";

/// Outcome of single-marker extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedAction {
    /// The sanitized action to send to the server.
    Action(String),
    /// No marker present.
    Missing,
    /// More than one marker present.
    Multiple,
}

/// Default allow-list: ASCII alphanumerics, comma and space.
pub fn default_allowed(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == ',' || c == ' '
}

/// Drop characters outside the allow-list and collapse whitespace runs.
pub fn sanitize(action: &str, allowed: fn(char) -> bool) -> String {
    let kept: String = action.chars().filter(|c| allowed(*c)).collect();
    kept.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ---------------------------------------------------------------------------
// Single-marker parsing
// ---------------------------------------------------------------------------

/// Extracts the text after a marker up to the next line break.
#[derive(Debug, Clone)]
pub struct MarkedActionParser {
    pattern: Regex,
    allowed: fn(char) -> bool,
}

impl MarkedActionParser {
    pub fn new(marker: &str, allowed: fn(char) -> bool) -> Result<Self> {
        let pattern = Regex::new(&format!(r"{}\s*([^\n]*)", regex::escape(marker)))
            .map_err(|e| HarnessError::Config(format!("invalid action marker '{marker}': {e}")))?;
        Ok(Self { pattern, allowed })
    }

    /// `Action:` with the default allow-list.
    pub fn standard() -> Result<Self> {
        Self::new(ACTION_MARKER, default_allowed)
    }

    pub fn parse(&self, text: &str) -> ParsedAction {
        let captures: Vec<&str> = self
            .pattern
            .captures_iter(text)
            .filter_map(|c| c.get(1).map(|m| m.as_str()))
            .collect();

        match captures.as_slice() {
            [] => ParsedAction::Missing,
            [only] => ParsedAction::Action(sanitize(only, self.allowed)),
            _ => ParsedAction::Multiple,
        }
    }
}

// ---------------------------------------------------------------------------
// ReAct parsing
// ---------------------------------------------------------------------------

/// Remove a trailing end-of-sequence token some servers leave in completions.
pub fn strip_eos(text: &str) -> &str {
    text.strip_suffix(END_OF_SEQUENCE).unwrap_or(text)
}

/// Split a ReAct response into thought and action.
///
/// The action is whatever follows the last `Action:`. Without a marker, a
/// bare `search[...]`/`click[...]` response is taken as the action; anything
/// else yields an empty action.
pub fn parse_react(text: &str) -> ActionWithThought {
    let (thought_part, action_part) = match text.rsplit_once(ACTION_MARKER) {
        Some((before, after)) => (before, after),
        None if text.contains("search[") || text.contains("click[") => ("", text),
        None => (text, ""),
    };

    let thought = match thought_part.split_once("Thought:") {
        Some((_, rest)) => rest.split("Thought:").next().unwrap_or(rest).trim(),
        None => thought_part,
    };

    ActionWithThought {
        thought: thought.to_string(),
        action: action_part.trim().to_string(),
    }
}

/// Whatever follows the *first* `Action:` up to the next one, or the whole
/// text when there is no marker. Used by the LMRL-Gym games, whose servers
/// validate the move themselves.
pub fn first_action(text: &str) -> String {
    let mut parts = text.split(ACTION_MARKER);
    let head = parts.next().unwrap_or(text);
    parts.next().unwrap_or(head).trim().to_string()
}

// ---------------------------------------------------------------------------
// Fenced SQL
// ---------------------------------------------------------------------------

/// Body of the last ```` ```sql ```` block, or the trimmed text when no fence
/// is present.
pub fn extract_sql(text: &str) -> String {
    let after = text.rsplit("```sql").next().unwrap_or(text);
    after.split("```").next().unwrap_or(after).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> ParsedAction {
        MarkedActionParser::standard().unwrap().parse(text)
    }

    #[test]
    fn single_marker_is_sanitized() {
        let text = "Thought:\nThe key is ahead.\n\nAction:\npick up   the yellow-key 1!\n";
        assert_eq!(
            parse(text),
            ParsedAction::Action("pick up the yellowkey 1".into())
        );
    }

    #[test]
    fn action_ends_at_line_break() {
        assert_eq!(
            parse("Action: turn left\nand then something else"),
            ParsedAction::Action("turn left".into())
        );
    }

    #[test]
    fn commas_survive_sanitizing() {
        assert_eq!(
            parse("Action: craft 1 blue dye using 1 lapis lazuli, 2 sticks."),
            ParsedAction::Action("craft 1 blue dye using 1 lapis lazuli, 2 sticks".into())
        );
    }

    #[test]
    fn several_markers_are_rejected() {
        let text = "Action: turn left\nThought: no wait\nAction: turn right";
        assert_eq!(parse(text), ParsedAction::Multiple);
    }

    #[test]
    fn missing_marker_is_reported() {
        assert_eq!(parse("I will move forward."), ParsedAction::Missing);
    }

    #[test]
    fn custom_marker_and_allow_list() {
        let parser = MarkedActionParser::new("Move:", |c| c.is_ascii_lowercase() || c == ' ')
            .unwrap();
        assert_eq!(
            parser.parse("Move: Go North 2"),
            ParsedAction::Action("o orth".into())
        );
    }

    #[test]
    fn first_action_ignores_later_markers() {
        assert_eq!(first_action("Thought:\nleft is open\n\nAction:\nmove left"), "move left");
        assert_eq!(first_action("Action: s h i r e\nAction: f r o w n"), "s h i r e");
        assert_eq!(first_action("  move up  "), "move up");
    }

    #[test]
    fn react_takes_last_action() {
        let parsed = parse_react("Thought:\nfind the mug\n\nAction:\ngo to countertop 1");
        assert_eq!(parsed.thought, "find the mug");
        assert_eq!(parsed.action, "go to countertop 1");

        let parsed = parse_react("Action: look\nThought: hmm\nAction: open fridge 1");
        assert_eq!(parsed.action, "open fridge 1");
    }

    #[test]
    fn react_without_marker() {
        assert_eq!(parse_react("search[red shoes]").action, "search[red shoes]");
        let parsed = parse_react("I am not sure.");
        assert!(parsed.action.is_empty());
        assert_eq!(parsed.thought, "I am not sure.");
    }

    #[test]
    fn eos_token_is_stripped() {
        assert_eq!(strip_eos("Action: look</s>"), "Action: look");
        assert_eq!(strip_eos("Action: look"), "Action: look");
    }

    #[test]
    fn sql_block_is_extracted() {
        let text = "Thought: count rows.\n\nAction: ```sql\nSELECT COUNT(*) FROM t;\n```";
        assert_eq!(extract_sql(text), "SELECT COUNT(*) FROM t;");
        assert_eq!(extract_sql("  SELECT 1; "), "SELECT 1;");
    }
}
