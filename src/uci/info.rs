//! Search information reported by the engine via `info`.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use super::extract::{extract, Fields, Grammar};

pub(crate) const INFO_GRAMMAR: Grammar = Grammar::new(&[
    "depth",
    "seldepth",
    "multipv",
    "score",
    "lowerbound",
    "upperbound",
    "nodes",
    "nps",
    "tbhits",
    "cpuload",
    "currline",
    "currmove",
    "currmovenumber",
    "pv",
    "refutation",
    "hashfull",
    "string",
    "time",
])
.with_rest_of_line("string");

/// Evaluation unit of a score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ScoreValue {
    /// Centipawns from the engine's point of view.
    Centipawns(i32),
    /// Mate in this many moves; negative when the engine is getting mated.
    Mate(i32),
}

/// Whether a score is exact or only a bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ScoreBound {
    Exact,
    Lower,
    Upper,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Score {
    pub value: ScoreValue,
    pub bound: ScoreBound,
}

impl Score {
    /// Evaluation in pawns (centipawns / 100). `None` for mate scores.
    #[must_use]
    pub fn pawns(&self) -> Option<f64> {
        match self.value {
            ScoreValue::Centipawns(cp) => Some(f64::from(cp) / 100.0),
            ScoreValue::Mate(_) => None,
        }
    }

    /// Moves to mate, if this is a mate score.
    #[must_use]
    pub fn mate(&self) -> Option<i32> {
        match self.value {
            ScoreValue::Mate(n) => Some(n),
            ScoreValue::Centipawns(_) => None,
        }
    }

    fn from_fields(fields: &Fields) -> Option<Self> {
        let raw = fields.get("score")?;
        let mut parts = raw.split_whitespace();
        let mode = parts.next()?;
        let amount: i32 = parts.next()?.parse().ok()?;
        let value = match mode {
            "cp" => ScoreValue::Centipawns(amount),
            "mate" => ScoreValue::Mate(amount),
            other => {
                log::debug!("unknown score mode '{other}'");
                return None;
            }
        };
        let bound = if fields.contains("lowerbound") {
            ScoreBound::Lower
        } else if fields.contains("upperbound") {
            ScoreBound::Upper
        } else {
            ScoreBound::Exact
        };
        Some(Score { value, bound })
    }
}

/// The move the engine is currently looking at.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CurrentMove {
    pub mv: Option<String>,
    pub number: Option<u32>,
    /// `currline`: CPU number followed by the line being searched.
    pub line: Vec<String>,
}

/// One parsed `info` line. Fields the engine did not send are `None`/empty.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Info {
    pub depth: Option<u32>,
    pub seldepth: Option<u32>,
    /// `multipv` index of the line being reported.
    pub line: Option<u32>,
    pub score: Option<Score>,
    pub nodes: Option<u64>,
    pub nps: Option<u64>,
    pub tbhits: Option<u64>,
    pub cpuload: Option<u32>,
    pub hashfull: Option<u32>,
    /// Search time in milliseconds.
    pub time: Option<u64>,
    /// Principal variation.
    pub moves: Vec<String>,
    pub refutation: Vec<String>,
    pub current: Option<CurrentMove>,
    /// Free text from `info string`, verbatim.
    pub comment: Option<String>,
}

fn move_list(fields: &Fields, key: &str) -> Vec<String> {
    fields
        .get(key)
        .map(|v| v.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default()
}

impl Info {
    /// Parse the text following the `info` keyword.
    #[must_use]
    pub fn parse(input: &str) -> Self {
        Self::from_fields(&extract(input, &INFO_GRAMMAR))
    }

    #[must_use]
    pub fn from_fields(fields: &Fields) -> Self {
        let current = if fields.contains("currmove")
            || fields.contains("currmovenumber")
            || fields.contains("currline")
        {
            Some(CurrentMove {
                mv: fields.get("currmove").map(str::to_string),
                number: fields.number("currmovenumber"),
                line: move_list(fields, "currline"),
            })
        } else {
            None
        };

        Info {
            depth: fields.number("depth"),
            seldepth: fields.number("seldepth"),
            line: fields.number("multipv"),
            score: Score::from_fields(fields),
            nodes: fields.number("nodes"),
            nps: fields.number("nps"),
            tbhits: fields.number("tbhits"),
            cpuload: fields.number("cpuload"),
            hashfull: fields.number("hashfull"),
            time: fields.number("time"),
            moves: move_list(fields, "pv"),
            refutation: move_list(fields, "refutation"),
            current,
            comment: fields.get("string").map(str::to_string),
        }
    }
}
