//! Keyword-driven grouping of the tokens that follow a command keyword.
//!
//! This stays a pure string operation: numbers are converted by whoever
//! consumes the fields.

/// Sub-field names a command understands.
#[derive(Debug, Clone, Copy)]
pub struct Grammar {
    /// Tokens that start a new sub-field.
    pub keys: &'static [&'static str],
    /// A sub-field that swallows the rest of the line untokenized.
    pub rest_of_line: Option<&'static str>,
}

impl Grammar {
    #[must_use]
    pub const fn new(keys: &'static [&'static str]) -> Self {
        Grammar {
            keys,
            rest_of_line: None,
        }
    }

    #[must_use]
    pub const fn with_rest_of_line(mut self, key: &'static str) -> Self {
        self.rest_of_line = Some(key);
        self
    }
}

/// Sub-fields extracted from one line, in the order they appeared.
///
/// A key seen twice yields two entries, which is how repeated `var` entries
/// of a combo option survive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fields {
    head: String,
    entries: Vec<(&'static str, String)>,
}

impl Fields {
    /// Tokens seen before the first recognized key.
    #[must_use]
    pub fn head(&self) -> &str {
        &self.head
    }

    /// Value of the last occurrence of `key`. Present but empty when the key
    /// appeared with nothing after it.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .rev()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Values of every occurrence of `key`, in order.
    pub fn all<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries
            .iter()
            .filter(move |(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| *k == key)
    }

    /// Parse the value of `key` as a number, ignoring it if malformed.
    pub fn number<T: std::str::FromStr>(&self, key: &str) -> Option<T> {
        let raw = self.get(key)?;
        match raw.parse() {
            Ok(v) => Some(v),
            Err(_) => {
                log::debug!("ignoring non-numeric '{key}' value '{raw}'");
                None
            }
        }
    }
}

/// Group `input` by the keys of `grammar`.
#[must_use]
pub fn extract(input: &str, grammar: &Grammar) -> Fields {
    let mut fields = Fields::default();
    let mut current: Option<usize> = None;
    let mut rest = input.trim_start();

    while !rest.is_empty() {
        let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        let token = &rest[..end];
        rest = rest[end..].trim_start();

        if let Some(&key) = grammar.keys.iter().find(|k| **k == token) {
            if grammar.rest_of_line == Some(key) {
                fields.entries.push((key, rest.trim_end().to_string()));
                return fields;
            }
            fields.entries.push((key, String::new()));
            current = Some(fields.entries.len() - 1);
            continue;
        }

        let slot = match current {
            Some(idx) => &mut fields.entries[idx].1,
            None => &mut fields.head,
        };
        if !slot.is_empty() {
            slot.push(' ');
        }
        slot.push_str(token);
    }

    fields
}
