//! Universal Chess Interface (UCI) protocol, engine-to-GUI direction.
//!
//! Classifies engine output lines by their leading keyword and extracts their
//! fields. Lines with an unknown keyword are forwarded verbatim instead of
//! being rejected; engines print vendor-specific diagnostics all the time.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub mod command;
pub mod extract;
pub mod info;
pub mod options;

pub use command::{GoParams, GuiCommand, Registration};
pub use extract::{extract, Fields, Grammar};
pub use info::{CurrentMove, Info, Score, ScoreBound, ScoreValue};
pub use options::{OptionDescriptor, OptionKind, OptionRegistry, OptionValue};

const ID_GRAMMAR: Grammar = Grammar::new(&["author", "name"]);
const BESTMOVE_GRAMMAR: Grammar = Grammar::new(&["ponder"]);

/// Payload of an `id` line. Engines usually send name and author on separate lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct IdInfo {
    pub name: Option<String>,
    pub author: Option<String>,
}

impl IdInfo {
    #[must_use]
    pub fn parse(input: &str) -> Self {
        let fields = extract(input, &ID_GRAMMAR);
        IdInfo {
            name: fields.get("name").map(str::to_string),
            author: fields.get("author").map(str::to_string),
        }
    }
}

/// Payload of a `bestmove` line.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BestMove {
    /// The chosen move; `(none)` or `0000` when the engine had no move.
    pub mv: String,
    /// The reply the engine expects, to ponder on.
    pub ponder: Option<String>,
}

impl BestMove {
    #[must_use]
    pub fn parse(input: &str) -> Self {
        let fields = extract(input, &BESTMOVE_GRAMMAR);
        BestMove {
            mv: fields.head().to_string(),
            ponder: fields
                .get("ponder")
                .filter(|p| !p.is_empty())
                .map(str::to_string),
        }
    }

    /// Whether the engine reported that no move is available.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self.mv.as_str(), "" | "(none)" | "0000")
    }
}

/// One classified line of engine output.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineMessage {
    Id(IdInfo),
    UciOk,
    ReadyOk,
    BestMove(BestMove),
    CopyProtection(String),
    Registration(String),
    Option(OptionDescriptor),
    Info(Info),
    /// Unrecognized keyword; the whole line, unchanged.
    Output(String),
}

/// Split off the first whitespace-delimited token.
fn split_keyword(line: &str) -> (&str, &str) {
    let line = line.trim_start();
    match line.find(char::is_whitespace) {
        Some(end) => (&line[..end], line[end..].trim()),
        None => (line, ""),
    }
}

/// Classify one line of engine output.
///
/// Fails only for a recognized keyword whose payload cannot be used, which
/// today means a malformed `option` declaration.
pub fn parse_line(line: &str) -> Result<EngineMessage> {
    let (keyword, rest) = split_keyword(line);

    let message = match keyword {
        "id" => EngineMessage::Id(IdInfo::parse(rest)),
        "uciok" => EngineMessage::UciOk,
        "readyok" => EngineMessage::ReadyOk,
        "bestmove" => EngineMessage::BestMove(BestMove::parse(rest)),
        "copyprotection" => EngineMessage::CopyProtection(rest.to_string()),
        "registration" => EngineMessage::Registration(rest.to_string()),
        "option" => EngineMessage::Option(OptionDescriptor::parse(rest)?),
        "info" => EngineMessage::Info(Info::parse(rest)),
        _ => EngineMessage::Output(line.to_string()),
    };

    Ok(message)
}
