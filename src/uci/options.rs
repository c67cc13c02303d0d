//! Registry of the options an engine announced, with validated updates.

use std::collections::HashMap;
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use super::extract::{extract, Fields, Grammar};
use crate::error::{Result, UciError};

pub(crate) const OPTION_GRAMMAR: Grammar =
    Grammar::new(&["name", "type", "default", "min", "max", "var"]);

/// Value an option can hold, or the trigger sent to a button.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum OptionValue {
    Bool(bool),
    Int(i64),
    Str(String),
    /// Pressing a button option. Carries no value.
    Trigger,
}

impl OptionValue {
    fn kind_name(&self) -> &'static str {
        match self {
            OptionValue::Bool(_) => "boolean",
            OptionValue::Int(_) => "integer",
            OptionValue::Str(_) => "string",
            OptionValue::Trigger => "trigger",
        }
    }
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionValue::Bool(b) => write!(f, "{b}"),
            OptionValue::Int(n) => write!(f, "{n}"),
            OptionValue::Str(s) => f.write_str(s),
            OptionValue::Trigger => Ok(()),
        }
    }
}

impl From<bool> for OptionValue {
    fn from(v: bool) -> Self {
        OptionValue::Bool(v)
    }
}

impl From<i64> for OptionValue {
    fn from(v: i64) -> Self {
        OptionValue::Int(v)
    }
}

impl From<i32> for OptionValue {
    fn from(v: i32) -> Self {
        OptionValue::Int(i64::from(v))
    }
}

impl From<u32> for OptionValue {
    fn from(v: u32) -> Self {
        OptionValue::Int(i64::from(v))
    }
}

impl From<&str> for OptionValue {
    fn from(v: &str) -> Self {
        OptionValue::Str(v.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(v: String) -> Self {
        OptionValue::Str(v)
    }
}

/// Declared kind of an option, with its default and constraints.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum OptionKind {
    /// `check`
    Check { default: bool },
    /// `spin`, bounds inclusive
    Spin {
        default: i64,
        min: Option<i64>,
        max: Option<i64>,
    },
    /// `combo`, a closed set of allowed strings
    Combo { default: String, vars: Vec<String> },
    /// `string`
    String { default: String },
    /// `button`, no stored value
    Button,
}

impl OptionKind {
    fn expected(&self) -> &'static str {
        match self {
            OptionKind::Check { .. } => "boolean",
            OptionKind::Spin { .. } => "integer",
            OptionKind::Combo { .. } | OptionKind::String { .. } => "string",
            OptionKind::Button => "trigger",
        }
    }

    fn default_value(&self) -> OptionValue {
        match self {
            OptionKind::Check { default } => OptionValue::Bool(*default),
            OptionKind::Spin { default, .. } => OptionValue::Int(*default),
            OptionKind::Combo { default, .. } | OptionKind::String { default } => {
                OptionValue::Str(default.clone())
            }
            OptionKind::Button => OptionValue::Trigger,
        }
    }
}

/// One option as announced by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct OptionDescriptor {
    pub name: String,
    pub kind: OptionKind,
}

impl OptionDescriptor {
    #[must_use]
    pub fn new(name: impl Into<String>, kind: OptionKind) -> Self {
        OptionDescriptor {
            name: name.into(),
            kind,
        }
    }

    /// Parse the text following the `option` keyword.
    pub fn parse(input: &str) -> Result<Self> {
        Self::from_fields(&extract(input, &OPTION_GRAMMAR), input)
    }

    /// Build a descriptor from extracted fields. `line` is only used for errors.
    pub fn from_fields(fields: &Fields, line: &str) -> Result<Self> {
        let malformed = |reason: String| UciError::MalformedOption {
            line: line.to_string(),
            reason,
        };

        let name = fields
            .get("name")
            .filter(|n| !n.is_empty())
            .ok_or_else(|| malformed("missing name".to_string()))?;
        let kind_name = fields
            .get("type")
            .ok_or_else(|| malformed("missing type".to_string()))?;
        let default = fields.get("default").map(|d| {
            if d == "<empty>" {
                ""
            } else {
                d
            }
        });

        let kind = match kind_name {
            "check" => OptionKind::Check {
                default: match default {
                    Some("true") => true,
                    Some("false") | None => false,
                    Some(other) => {
                        return Err(malformed(format!("check default '{other}' is not a boolean")))
                    }
                },
            },
            "spin" => {
                let number = |key: &str| -> Result<Option<i64>> {
                    match fields.get(key) {
                        None => Ok(None),
                        Some(raw) => raw
                            .parse()
                            .map(Some)
                            .map_err(|_| malformed(format!("spin {key} '{raw}' is not an integer"))),
                    }
                };
                let min = number("min")?;
                let max = number("max")?;
                OptionKind::Spin {
                    default: number("default")?.or(min).unwrap_or(0),
                    min,
                    max,
                }
            }
            "combo" => {
                let vars: Vec<String> = fields.all("var").map(str::to_string).collect();
                if vars.is_empty() {
                    return Err(malformed("combo without var entries".to_string()));
                }
                OptionKind::Combo {
                    default: default.map_or_else(|| vars[0].clone(), str::to_string),
                    vars,
                }
            }
            "string" => OptionKind::String {
                default: default.unwrap_or_default().to_string(),
            },
            "button" => OptionKind::Button,
            other => return Err(malformed(format!("unknown option type '{other}'"))),
        };

        Ok(OptionDescriptor::new(name, kind))
    }

    /// Check `value` against the declared kind and constraints.
    pub fn validate(&self, value: &OptionValue) -> Result<()> {
        let type_error = || UciError::OptionType {
            name: self.name.clone(),
            expected: self.kind.expected(),
            found: value.kind_name(),
        };

        match (&self.kind, value) {
            (OptionKind::String { .. }, OptionValue::Str(s)) if s.contains(['\r', '\n']) => {
                Err(UciError::LineBreak {
                    command: setoption_command(&self.name, value),
                })
            }
            (OptionKind::Check { .. }, OptionValue::Bool(_))
            | (OptionKind::String { .. }, OptionValue::Str(_))
            | (OptionKind::Button, OptionValue::Trigger) => Ok(()),
            (OptionKind::Spin { min, max, .. }, OptionValue::Int(v)) => {
                let below = min.is_some_and(|m| *v < m);
                let above = max.is_some_and(|m| *v > m);
                if below || above {
                    return Err(UciError::OptionRange {
                        name: self.name.clone(),
                        value: *v,
                        min: *min,
                        max: *max,
                    });
                }
                Ok(())
            }
            (OptionKind::Combo { vars, .. }, OptionValue::Str(s)) => {
                if vars.iter().any(|v| v == s) {
                    Ok(())
                } else {
                    Err(UciError::OptionEnum {
                        name: self.name.clone(),
                        value: s.clone(),
                        allowed: vars.clone(),
                    })
                }
            }
            _ => Err(type_error()),
        }
    }
}

/// Build the `setoption` command for `name`/`value`.
///
/// An empty string is written as `<empty>`, the same token the parser reads.
#[must_use]
pub fn setoption_command(name: &str, value: &OptionValue) -> String {
    match value {
        OptionValue::Trigger => format!("setoption name {name}"),
        OptionValue::Str(s) if s.is_empty() => format!("setoption name {name} value <empty>"),
        value => format!("setoption name {name} value {value}"),
    }
}

struct Entry {
    descriptor: OptionDescriptor,
    value: Option<OptionValue>,
}

/// All options announced during a session, in announcement order.
#[derive(Default)]
pub struct OptionRegistry {
    entries: Vec<Entry>,
    index: HashMap<String, usize>,
}

impl OptionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a descriptor. Each name can be defined once.
    pub fn define(&mut self, descriptor: OptionDescriptor) -> Result<()> {
        if self.index.contains_key(&descriptor.name) {
            return Err(UciError::OptionAlreadyDefined {
                name: descriptor.name,
            });
        }
        self.index
            .insert(descriptor.name.clone(), self.entries.len());
        self.entries.push(Entry {
            descriptor,
            value: None,
        });
        Ok(())
    }

    fn entry(&self, name: &str) -> Result<&Entry> {
        self.index
            .get(name)
            .map(|&i| &self.entries[i])
            .ok_or_else(|| UciError::UndefinedOption {
                name: name.to_string(),
            })
    }

    /// Validate and store `value`, returning the `setoption` command to send.
    ///
    /// Nothing is stored when validation fails.
    pub fn set(&mut self, name: &str, value: OptionValue) -> Result<String> {
        let command = self.prepare(name, &value)?;
        self.commit(name, value);
        Ok(command)
    }

    /// Validate without storing. Returns the command `set` would produce.
    pub fn prepare(&self, name: &str, value: &OptionValue) -> Result<String> {
        let entry = self.entry(name)?;
        entry.descriptor.validate(value)?;
        Ok(setoption_command(&entry.descriptor.name, value))
    }

    /// Store an already validated value.
    pub(crate) fn commit(&mut self, name: &str, value: OptionValue) {
        if let Some(&i) = self.index.get(name) {
            if !matches!(value, OptionValue::Trigger) {
                self.entries[i].value = Some(value);
            }
        }
    }

    /// Last value set, or the declared default.
    pub fn get(&self, name: &str) -> Result<OptionValue> {
        let entry = self.entry(name)?;
        Ok(entry
            .value
            .clone()
            .unwrap_or_else(|| entry.descriptor.kind.default_value()))
    }

    pub fn descriptor(&self, name: &str) -> Result<&OptionDescriptor> {
        self.entry(name).map(|e| &e.descriptor)
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &OptionDescriptor> {
        self.entries.iter().map(|e| &e.descriptor)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stockfish_like() -> OptionRegistry {
        let mut registry = OptionRegistry::new();
        for line in [
            "name Hash type spin default 16 min 1 max 33554432",
            "name Ponder type check default false",
            "name Analysis Contempt type combo default Both var Off var White var Black var Both",
            "name Debug Log File type string default <empty>",
            "name Clear Hash type button",
        ] {
            registry.define(OptionDescriptor::parse(line).unwrap()).unwrap();
        }
        registry
    }

    #[test]
    fn parses_every_kind() {
        let registry = stockfish_like();
        assert_eq!(registry.len(), 5);
        assert_eq!(
            registry.descriptor("Hash").unwrap().kind,
            OptionKind::Spin {
                default: 16,
                min: Some(1),
                max: Some(33_554_432)
            }
        );
        assert_eq!(
            registry.descriptor("Analysis Contempt").unwrap().kind,
            OptionKind::Combo {
                default: "Both".to_string(),
                vars: vec![
                    "Off".to_string(),
                    "White".to_string(),
                    "Black".to_string(),
                    "Both".to_string()
                ],
            }
        );
        assert_eq!(
            registry.get("Debug Log File").unwrap(),
            OptionValue::Str(String::new())
        );
        assert_eq!(registry.get("Clear Hash").unwrap(), OptionValue::Trigger);
    }

    #[test]
    fn spin_range_is_enforced() {
        let mut registry = stockfish_like();
        assert!(matches!(
            registry.set("Hash", 40_000_000.into()),
            Err(UciError::OptionRange { value: 40_000_000, .. })
        ));
        assert!(matches!(
            registry.set("Hash", 0.into()),
            Err(UciError::OptionRange { .. })
        ));
        assert_eq!(registry.get("Hash").unwrap(), OptionValue::Int(16));

        assert_eq!(
            registry.set("Hash", 512.into()).unwrap(),
            "setoption name Hash value 512"
        );
        assert_eq!(registry.get("Hash").unwrap(), OptionValue::Int(512));
    }

    #[test]
    fn kind_mismatch_is_a_type_error() {
        let mut registry = stockfish_like();
        let err = registry.set("Ponder", "yes".into()).unwrap_err();
        assert_eq!(
            err,
            UciError::OptionType {
                name: "Ponder".to_string(),
                expected: "boolean",
                found: "string",
            }
        );
        assert!(matches!(
            registry.set("Clear Hash", true.into()),
            Err(UciError::OptionType { .. })
        ));
    }

    #[test]
    fn combo_accepts_only_declared_values() {
        let mut registry = stockfish_like();
        let err = registry.set("Analysis Contempt", "Everyone".into()).unwrap_err();
        match err {
            UciError::OptionEnum { allowed, .. } => assert_eq!(allowed.len(), 4),
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(
            registry.set("Analysis Contempt", "White".into()).unwrap(),
            "setoption name Analysis Contempt value White"
        );
    }

    #[test]
    fn unknown_option_is_rejected() {
        let mut registry = stockfish_like();
        assert_eq!(
            registry.set("Threads", 4.into()),
            Err(UciError::UndefinedOption {
                name: "Threads".to_string()
            })
        );
        assert!(registry.get("Threads").is_err());
    }

    #[test]
    fn redefinition_is_rejected() {
        let mut registry = stockfish_like();
        let again = OptionDescriptor::parse("name Hash type spin default 1 min 1 max 2").unwrap();
        assert_eq!(
            registry.define(again),
            Err(UciError::OptionAlreadyDefined {
                name: "Hash".to_string()
            })
        );
        assert_eq!(registry.get("Hash").unwrap(), OptionValue::Int(16));
    }

    #[test]
    fn button_has_no_value_on_the_wire() {
        let mut registry = stockfish_like();
        assert_eq!(
            registry.set("Clear Hash", OptionValue::Trigger).unwrap(),
            "setoption name Clear Hash"
        );
    }

    #[test]
    fn multi_line_string_value_is_rejected() {
        let mut registry = stockfish_like();
        let err = registry
            .set("Debug Log File", OptionValue::from("x\ngo infinite"))
            .unwrap_err();
        assert!(matches!(err, UciError::LineBreak { .. }));
        assert!(matches!(
            registry.set("Debug Log File", OptionValue::from("x\r")),
            Err(UciError::LineBreak { .. })
        ));
        assert_eq!(
            registry.get("Debug Log File").unwrap(),
            OptionValue::Str(String::new())
        );
    }

    #[test]
    fn empty_string_is_written_as_the_empty_token() {
        let mut registry = stockfish_like();
        registry.set("Debug Log File", OptionValue::from("log.txt")).unwrap();
        let command = registry
            .set("Debug Log File", OptionValue::from(""))
            .unwrap();
        assert_eq!(command, "setoption name Debug Log File value <empty>");
        assert_eq!(
            registry.get("Debug Log File").unwrap(),
            OptionValue::Str(String::new())
        );

        let declared = OptionDescriptor::parse("name Debug Log File type string default <empty>")
            .unwrap();
        assert_eq!(
            declared.kind,
            OptionKind::String {
                default: String::new()
            }
        );
    }

    #[test]
    fn accepted_values_read_back_unchanged() {
        let mut registry = stockfish_like();
        let cases: Vec<(&str, OptionValue)> = vec![
            ("Hash", OptionValue::Int(1)),
            ("Hash", OptionValue::Int(33_554_432)),
            ("Ponder", OptionValue::Bool(true)),
            ("Analysis Contempt", OptionValue::Str("Off".to_string())),
            ("Debug Log File", OptionValue::Str("/tmp/sf log.txt".to_string())),
            ("Clear Hash", OptionValue::Trigger),
        ];
        for (name, value) in cases {
            registry.set(name, value.clone()).unwrap();
            assert_eq!(registry.get(name).unwrap(), value, "option {name}");
        }
    }

    #[test]
    fn malformed_declarations_are_reported() {
        assert!(matches!(
            OptionDescriptor::parse("type spin default 1"),
            Err(UciError::MalformedOption { .. })
        ));
        assert!(matches!(
            OptionDescriptor::parse("name X type slider default 1"),
            Err(UciError::MalformedOption { .. })
        ));
        assert!(matches!(
            OptionDescriptor::parse("name X type spin default big"),
            Err(UciError::MalformedOption { .. })
        ));
        assert!(matches!(
            OptionDescriptor::parse("name X type combo default A"),
            Err(UciError::MalformedOption { .. })
        ));
    }

    #[test]
    fn unbounded_spin_accepts_any_integer() {
        let mut registry = OptionRegistry::new();
        registry
            .define(OptionDescriptor::new(
                "Contempt",
                OptionKind::Spin {
                    default: 0,
                    min: None,
                    max: None,
                },
            ))
            .unwrap();
        assert!(registry.set("Contempt", (-1000).into()).is_ok());
    }
}
