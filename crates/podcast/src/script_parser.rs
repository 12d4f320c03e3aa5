//! Dialogue script grammar (spec §4.11, §6): one turn per block, a block
//! starting with `HOST:`/`Host:`/`H:`/`[HOST]:`/`[Host]:` (and the EXPERT
//! analogs), case-insensitive, running until the next tag or EOF.

use once_cell::sync::Lazy;
use regex::Regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speaker {
    Host,
    Expert,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub speaker: Speaker,
    pub text: String,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ScriptParseError {
    #[error("script has no recognizable HOST:/EXPERT: turns")]
    NoTurns,
    #[error("script is missing a HOST turn")]
    MissingHost,
    #[error("script is missing an EXPERT turn")]
    MissingExpert,
}

// Matches a tag at the start of a line: optional `[`, speaker word, optional
// `]`, then `:`. Captures the speaker word for case-insensitive comparison.
static TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?im)^\s*\[?(HOST|H|EXPERT|E)\]?\s*:\s?(.*)$").unwrap());

fn speaker_from_tag(tag: &str) -> Speaker {
    match tag.to_ascii_uppercase().as_str() {
        "HOST" | "H" => Speaker::Host,
        _ => Speaker::Expert,
    }
}

/// Parses a raw LLM-generated script into turns. Empty bodies are dropped;
/// at least one HOST and one EXPERT turn is required or this fails.
pub fn parse(script: &str) -> Result<Vec<Turn>, ScriptParseError> {
    let mut turns: Vec<Turn> = Vec::new();

    for line in script.lines() {
        if let Some(caps) = TAG.captures(line) {
            let speaker = speaker_from_tag(&caps[1]);
            let rest = caps[2].trim().to_string();
            turns.push(Turn { speaker, text: rest });
        } else if let Some(last) = turns.last_mut() {
            let trimmed = line.trim();
            if !trimmed.is_empty() {
                if !last.text.is_empty() {
                    last.text.push(' ');
                }
                last.text.push_str(trimmed);
            }
        }
    }

    turns.retain(|t| !t.text.trim().is_empty());

    if turns.is_empty() {
        return Err(ScriptParseError::NoTurns);
    }
    if !turns.iter().any(|t| t.speaker == Speaker::Host) {
        return Err(ScriptParseError::MissingHost);
    }
    if !turns.iter().any(|t| t.speaker == Speaker::Expert) {
        return Err(ScriptParseError::MissingExpert);
    }
    Ok(turns)
}

/// Canonical re-serialization: one line per turn, `HOST:`/`EXPERT:` tags,
/// normalized whitespace. `parse(serialize(parse(s)))` is idempotent, the
/// round-trip property in spec §8.
pub fn serialize(turns: &[Turn]) -> String {
    turns
        .iter()
        .map(|t| {
            let tag = match t.speaker {
                Speaker::Host => "HOST",
                Speaker::Expert => "EXPERT",
            };
            format!("{tag}: {}", t.text.trim())
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_canonical_tags() {
        let script = "HOST: Welcome to the show.\nEXPERT: Thanks for having me.";
        let turns = parse(script).unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].speaker, Speaker::Host);
        assert_eq!(turns[1].speaker, Speaker::Expert);
    }

    #[test]
    fn accepts_all_tag_variants_case_insensitively() {
        for tag in ["host:", "Host:", "h:", "[host]:", "[Host]:"] {
            let script = format!("{tag} hi\nEXPERT: hi back");
            assert!(parse(&script).is_ok(), "tag {tag} should parse");
        }
    }

    #[test]
    fn multi_line_body_accumulates_until_next_tag() {
        let script = "HOST: first line\nsecond line\nEXPERT: reply";
        let turns = parse(script).unwrap();
        assert_eq!(turns[0].text, "first line second line");
    }

    #[test]
    fn empty_bodies_are_skipped() {
        let script = "HOST:\nEXPERT: only turn";
        let turns = parse(script).unwrap();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].speaker, Speaker::Expert);
    }

    #[test]
    fn missing_expert_turn_fails() {
        let script = "HOST: solo monologue";
        assert!(matches!(parse(script), Err(ScriptParseError::MissingExpert)));
    }

    #[test]
    fn no_tags_at_all_fails() {
        assert!(matches!(parse("just some prose"), Err(ScriptParseError::NoTurns)));
    }

    #[test]
    fn round_trip_is_stable_after_one_normalization() {
        let script = "[Host]: hello there\nE: and hello to you too";
        let turns = parse(script).unwrap();
        let normalized = serialize(&turns);
        let reparsed = parse(&normalized).unwrap();
        assert_eq!(turns, reparsed);
        assert_eq!(serialize(&reparsed), normalized);
    }
}
