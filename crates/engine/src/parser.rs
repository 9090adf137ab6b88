//! Advisor command parser
//!
//! Grammar, two equivalent productions over whitespace-separated tokens:
//!
//! ```text
//! command := KEYWORD ID [value] | ID KEYWORD [value]
//! ```
//!
//! The keyword is matched case-insensitively against the closed vocabulary in
//! [`CommandType`]. `value` is the rest of the message, trimmed but otherwise
//! verbatim, so it may contain inner whitespace and line breaks.

use leadflow_core::{Command, CommandType, LeadId, UserInputError};

/// Parse one advisor message.
///
/// Pure: never touches state, so a failure has no side effects.
pub fn parse_command(text: &str) -> Result<Command, UserInputError> {
    let mut tokens = Tokens::new(text);

    let first = tokens.next().ok_or(UserInputError::InvalidFormat)?;
    let second = tokens.next().ok_or(UserInputError::InvalidFormat)?;

    let (kind, id_token) = match (
        CommandType::from_keyword(first.text),
        CommandType::from_keyword(second.text),
    ) {
        (Some(kind), _) => (kind, second.text),
        (None, Some(kind)) => (kind, first.text),
        (None, None) => return Err(UserInputError::InvalidFormat),
    };

    let lead_id = parse_lead_id(id_token)?;

    let rest = text[second.end..].trim();
    let mut command = Command::new(kind, lead_id);
    if !rest.is_empty() {
        command = command.with_value(rest);
    }
    Ok(command)
}

fn parse_lead_id(token: &str) -> Result<LeadId, UserInputError> {
    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
        return Err(UserInputError::InvalidLeadId(token.to_string()));
    }
    token
        .parse::<LeadId>()
        .map_err(|_| UserInputError::InvalidLeadId(token.to_string()))
}

struct Token<'a> {
    text: &'a str,
    end: usize,
}

/// Whitespace tokenizer that remembers byte offsets
struct Tokens<'a> {
    source: &'a str,
    pos: usize,
}

impl<'a> Tokens<'a> {
    fn new(source: &'a str) -> Self {
        Self { source, pos: 0 }
    }
}

impl<'a> Iterator for Tokens<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let remaining = &self.source[self.pos..];
        let skipped = remaining.len() - remaining.trim_start().len();
        let start = self.pos + skipped;
        if start >= self.source.len() {
            self.pos = self.source.len();
            return None;
        }

        let tail = &self.source[start..];
        let len = tail.find(char::is_whitespace).unwrap_or(tail.len());
        let end = start + len;
        self.pos = end;

        Some(Token {
            text: &self.source[start..end],
            end,
        })
    }
}
