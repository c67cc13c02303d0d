use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use super::options::{setoption_command, OptionValue};
use crate::position::Position;

/// Search limits for a `go` command.
///
/// Empty fields are left out of the command. An all-default value sends a
/// bare `go`, which most engines treat as infinite.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GoParams {
    /// Restrict the search to these moves
    pub searchmoves: Vec<String>,
    /// Search in ponder mode; confirmed later with `ponderhit`
    pub ponder: bool,
    pub wtime: Option<u64>,
    pub btime: Option<u64>,
    pub winc: Option<u64>,
    pub binc: Option<u64>,
    pub movestogo: Option<u64>,
    pub depth: Option<u32>,
    pub nodes: Option<u64>,
    pub mate: Option<u32>,
    /// Fixed time per move in milliseconds
    pub movetime: Option<u64>,
    /// Search until `stop`
    pub infinite: bool,
}

impl GoParams {
    #[must_use]
    pub fn infinite() -> Self {
        GoParams {
            infinite: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn depth(depth: u32) -> Self {
        GoParams {
            depth: Some(depth),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn movetime(time_ms: u64) -> Self {
        GoParams {
            movetime: Some(time_ms),
            ..Self::default()
        }
    }

    /// Clock-based limits: remaining time and increment per side, in milliseconds.
    #[must_use]
    pub fn clock(wtime: u64, btime: u64, winc: u64, binc: u64) -> Self {
        GoParams {
            wtime: Some(wtime),
            btime: Some(btime),
            winc: Some(winc),
            binc: Some(binc),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_ponder(mut self) -> Self {
        self.ponder = true;
        self
    }

    #[must_use]
    pub fn with_nodes(mut self, nodes: u64) -> Self {
        self.nodes = Some(nodes);
        self
    }

    #[must_use]
    pub fn with_mate(mut self, moves: u32) -> Self {
        self.mate = Some(moves);
        self
    }

    #[must_use]
    pub fn with_movestogo(mut self, moves: u64) -> Self {
        self.movestogo = Some(moves);
        self
    }

    #[must_use]
    pub fn with_searchmoves<I, S>(mut self, moves: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.searchmoves = moves.into_iter().map(Into::into).collect();
        self
    }
}

impl fmt::Display for GoParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("go")?;
        if !self.searchmoves.is_empty() {
            write!(f, " searchmoves {}", self.searchmoves.join(" "))?;
        }
        if self.ponder {
            f.write_str(" ponder")?;
        }
        let limits = [
            ("wtime", self.wtime),
            ("btime", self.btime),
            ("winc", self.winc),
            ("binc", self.binc),
            ("movestogo", self.movestogo),
            ("depth", self.depth.map(u64::from)),
            ("nodes", self.nodes),
            ("mate", self.mate.map(u64::from)),
            ("movetime", self.movetime),
        ];
        for (key, value) in limits {
            if let Some(value) = value {
                write!(f, " {key} {value}")?;
            }
        }
        if self.infinite {
            f.write_str(" infinite")?;
        }
        Ok(())
    }
}

/// Credentials for `register name <n> code <c>`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Registration {
    pub name: String,
    pub code: String,
}

/// Commands the client sends to the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum GuiCommand {
    Uci,
    Debug(bool),
    IsReady,
    SetOption { name: String, value: OptionValue },
    /// `None` defers with `register later`.
    Register(Option<Registration>),
    UciNewGame,
    Position(Position),
    Go(GoParams),
    Stop,
    PonderHit,
    Quit,
}

impl fmt::Display for GuiCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GuiCommand::Uci => f.write_str("uci"),
            GuiCommand::Debug(on) => write!(f, "debug {}", if *on { "on" } else { "off" }),
            GuiCommand::IsReady => f.write_str("isready"),
            GuiCommand::SetOption { name, value } => {
                f.write_str(&setoption_command(name, value))
            }
            GuiCommand::Register(None) => f.write_str("register later"),
            GuiCommand::Register(Some(Registration { name, code })) => {
                write!(f, "register name {name} code {code}")
            }
            GuiCommand::UciNewGame => f.write_str("ucinewgame"),
            GuiCommand::Position(position) => write!(f, "{position}"),
            GuiCommand::Go(params) => write!(f, "{params}"),
            GuiCommand::Stop => f.write_str("stop"),
            GuiCommand::PonderHit => f.write_str("ponderhit"),
            GuiCommand::Quit => f.write_str("quit"),
        }
    }
}
