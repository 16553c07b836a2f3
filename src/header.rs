//! OSGi header clause lists: `name;attr=value;dir:=value, name2, ...`.

use std::fmt;

use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::descriptors::DUPLICATE_MARKER;
use crate::error::HeaderError;

/// Ordered attribute map of one clause. Directive keys end in `:`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Attrs {
    entries: Vec<(String, String)>,
}

impl Attrs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Sets a value, keeping the original position of an existing key.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => Some(std::mem::replace(existing, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        let position = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(position).1)
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&str, &str) -> bool) {
        self.entries.retain(|(k, v)| keep(k, v));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn version(&self) -> Option<&str> {
        self.get("version")
    }

    /// Copies entries of `other`; existing keys win unless `overwrite` is set.
    pub fn merge_with(&mut self, other: &Attrs, overwrite: bool) {
        for (key, value) in other.iter() {
            if overwrite || !self.contains_key(key) {
                self.insert(key, value);
            }
        }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Attrs {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut attrs = Attrs::new();
        for (key, value) in iter {
            attrs.insert(key, value);
        }
        attrs
    }
}

impl fmt::Display for Attrs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, (key, value)) in self.entries.iter().enumerate() {
            if index > 0 {
                f.write_str(";")?;
            }
            write!(f, "{key}=")?;
            write_quoted(f, value)?;
        }
        Ok(())
    }
}

impl Serialize for Attrs {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

fn write_quoted(f: &mut fmt::Formatter<'_>, value: &str) -> fmt::Result {
    let needs_quotes = value.is_empty()
        || value
            .chars()
            .any(|c| matches!(c, ',' | ';' | '=' | ':' | '"' | ' ' | '\t'));
    if !needs_quotes {
        return f.write_str(value);
    }
    f.write_str("\"")?;
    for c in value.chars() {
        if c == '"' || c == '\\' {
            f.write_str("\\")?;
        }
        write!(f, "{c}")?;
    }
    f.write_str("\"")
}

/// Ordered clauses of one header. A name repeated in the same header is
/// stored with [`DUPLICATE_MARKER`] appended so every clause survives.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Parameters {
    clauses: Vec<(String, Attrs)>,
}

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Attrs> {
        self.clauses.iter().find(|(k, _)| k == key).map(|(_, a)| a)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Adds a clause, marking it as a duplicate when the key is taken.
    pub fn add(&mut self, key: &str, attrs: Attrs) {
        let mut key = key.to_string();
        while self.contains_key(&key) {
            key.push(DUPLICATE_MARKER);
        }
        self.clauses.push((key, attrs));
    }

    /// Adds a clause only when no clause with this key exists.
    pub fn append_if_absent(&mut self, key: &str, attrs: Attrs) {
        if !self.contains_key(key) {
            self.clauses.push((key.to_string(), attrs));
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Attrs)> {
        self.clauses.iter().map(|(k, a)| (k.as_str(), a))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.clauses.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.clauses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }
}

impl fmt::Display for Parameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, (key, attrs)) in self.clauses.iter().enumerate() {
            if index > 0 {
                f.write_str(",")?;
            }
            f.write_str(key.trim_end_matches(DUPLICATE_MARKER))?;
            if !attrs.is_empty() {
                write!(f, ";{attrs}")?;
            }
        }
        Ok(())
    }
}

/// Parses a clause list such as `com.acme.*;version=1.0, !com.acme.impl`.
pub fn parse_parameters(header: &str) -> Result<Parameters, HeaderError> {
    let mut parser = HeaderParser {
        header,
        chars: header.char_indices().collect(),
        pos: 0,
    };
    let mut parameters = Parameters::new();
    loop {
        parser.skip_whitespace();
        if parser.at_end() {
            break;
        }
        let (names, attrs) = parser.clause()?;
        for name in names {
            parameters.add(&name, attrs.clone());
        }
        match parser.peek() {
            Some(',') => parser.pos += 1,
            None => break,
            Some(other) => return Err(parser.error(&format!("unexpected '{other}'"))),
        }
    }
    Ok(parameters)
}

/// Parses bare `key=value` pairs separated by `,` or `;`, such as the
/// attribute strings carried by annotations.
pub fn parse_attrs(text: &str) -> Result<Attrs, HeaderError> {
    let mut parser = HeaderParser {
        header: text,
        chars: text.char_indices().collect(),
        pos: 0,
    };
    let mut attrs = Attrs::new();
    loop {
        parser.skip_whitespace();
        if parser.at_end() {
            break;
        }
        let token = parser.token();
        let directive = match (parser.peek(), parser.peek_at(1)) {
            (Some(':'), Some('=')) => {
                parser.pos += 2;
                true
            }
            (Some('='), _) => {
                parser.pos += 1;
                false
            }
            _ => return Err(parser.error("expected '='")),
        };
        let value = parser.value()?;
        let key = parser.key(token)?;
        attrs.insert(if directive { format!("{key}:") } else { key }, value);
        match parser.peek() {
            Some(',' | ';') => parser.pos += 1,
            None => break,
            Some(other) => return Err(parser.error(&format!("unexpected '{other}'"))),
        }
    }
    Ok(attrs)
}

struct HeaderParser<'a> {
    header: &'a str,
    chars: Vec<(usize, char)>,
    pos: usize,
}

impl HeaderParser<'_> {
    fn error(&self, reason: &str) -> HeaderError {
        let offset = self
            .chars
            .get(self.pos)
            .map(|(offset, _)| *offset)
            .unwrap_or(self.header.len());
        HeaderError {
            header: self.header.to_string(),
            offset,
            reason: reason.to_string(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).map(|(_, c)| *c)
    }

    fn peek_at(&self, ahead: usize) -> Option<char> {
        self.chars.get(self.pos + ahead).map(|(_, c)| *c)
    }

    fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn token(&mut self) -> String {
        self.skip_whitespace();
        let mut token = String::new();
        while let Some(c) = self.peek() {
            // A leading `=` (after an optional `!`) marks a literal name.
            let literal_prefix = c == '=' && (token.is_empty() || token == "!");
            if matches!(c, ';' | ',' | '=' | ':') && !literal_prefix {
                break;
            }
            token.push(c);
            self.pos += 1;
        }
        token.trim_end().to_string()
    }

    fn clause(&mut self) -> Result<(Vec<String>, Attrs), HeaderError> {
        let mut names = Vec::new();
        let mut attrs = Attrs::new();
        loop {
            let token = self.token();
            match self.peek() {
                Some('=') => {
                    self.pos += 1;
                    let value = self.value()?;
                    attrs.insert(self.key(token)?, value);
                }
                Some(':') if self.peek_at(1) == Some('=') => {
                    self.pos += 2;
                    let value = self.value()?;
                    attrs.insert(format!("{}:", self.key(token)?), value);
                }
                Some(':') => {
                    // Typed attribute, `key:Type=value`; the type is not kept.
                    self.pos += 1;
                    self.token();
                    if self.peek() != Some('=') {
                        return Err(self.error("expected '=' after attribute type"));
                    }
                    self.pos += 1;
                    let value = self.value()?;
                    attrs.insert(self.key(token)?, value);
                }
                _ => {
                    if !attrs.is_empty() {
                        return Err(self.error("clause name after attributes"));
                    }
                    if token.is_empty() {
                        return Err(self.error("empty clause name"));
                    }
                    names.push(token);
                }
            }
            self.skip_whitespace();
            match self.peek() {
                Some(';') => self.pos += 1,
                _ => break,
            }
        }
        Ok((names, attrs))
    }

    fn key(&self, token: String) -> Result<String, HeaderError> {
        if token.is_empty() {
            Err(self.error("empty attribute key"))
        } else {
            Ok(token)
        }
    }

    fn value(&mut self) -> Result<String, HeaderError> {
        self.skip_whitespace();
        match self.peek() {
            Some(quote @ ('"' | '\'')) => {
                self.pos += 1;
                let mut value = String::new();
                loop {
                    match self.peek() {
                        None => return Err(self.error("unterminated quoted value")),
                        Some('\\') => {
                            self.pos += 1;
                            if let Some(escaped) = self.peek() {
                                value.push(escaped);
                                self.pos += 1;
                            }
                        }
                        Some(c) if c == quote => {
                            self.pos += 1;
                            break;
                        }
                        Some(c) => {
                            value.push(c);
                            self.pos += 1;
                        }
                    }
                }
                self.skip_whitespace();
                Ok(value)
            }
            _ => {
                let mut value = String::new();
                while let Some(c) = self.peek() {
                    if c == ';' || c == ',' {
                        break;
                    }
                    value.push(c);
                    self.pos += 1;
                }
                Ok(value.trim().to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_attributes_and_directives() {
        let parameters =
            parse_parameters("com.acme;version=1.0;uses:=\"a,b\", org.other ; resolution:=optional")
                .expect("parse");
        assert_eq!(parameters.len(), 2);
        let acme = parameters.get("com.acme").expect("com.acme");
        assert_eq!(acme.get("version"), Some("1.0"));
        assert_eq!(acme.get("uses:"), Some("a,b"));
        let other = parameters.get("org.other").expect("org.other");
        assert_eq!(other.get("resolution:"), Some("optional"));
    }

    #[test]
    fn shared_attributes_for_multiple_names() {
        let parameters = parse_parameters("a;b;version='[1,2)'").expect("parse");
        assert_eq!(parameters.get("a").and_then(|a| a.version()), Some("[1,2)"));
        assert_eq!(parameters.get("b").and_then(|a| a.version()), Some("[1,2)"));
    }

    #[test]
    fn duplicates_get_markers() {
        let parameters = parse_parameters("com.acme;version=1, com.acme;version=2").expect("parse");
        let keys: Vec<_> = parameters.keys().collect();
        assert_eq!(keys, vec!["com.acme", "com.acme~"]);
        assert_eq!(parameters.to_string(), "com.acme;version=1,com.acme;version=2");
    }

    #[test]
    fn typed_attributes_drop_the_type() {
        let parameters = parse_parameters("p;version:Version=1.2").expect("parse");
        assert_eq!(parameters.get("p").and_then(|a| a.version()), Some("1.2"));
    }

    #[test]
    fn literal_names_keep_their_prefix() {
        let parameters = parse_parameters("=com.acme.*;version=1, !=com.acme.impl").expect("parse");
        let keys: Vec<_> = parameters.keys().collect();
        assert_eq!(keys, vec!["=com.acme.*", "!=com.acme.impl"]);
    }

    #[test]
    fn empty_header_has_no_clauses() {
        assert!(parse_parameters("").expect("parse").is_empty());
        assert!(parse_parameters("   ").expect("parse").is_empty());
    }

    #[test]
    fn syntax_errors() {
        assert!(parse_parameters("a;version=\"1.0").is_err());
        assert!(parse_parameters("a;version=1;b").is_err());
        assert!(parse_parameters(";version=1").is_err());
    }

    #[test]
    fn bare_attribute_lists() {
        let attrs = parse_attrs("vendor=acme, x:=y;note=\"a,b\"").expect("attrs");
        assert_eq!(attrs.get("vendor"), Some("acme"));
        assert_eq!(attrs.get("x:"), Some("y"));
        assert_eq!(attrs.get("note"), Some("a,b"));
        assert!(parse_attrs("novalue").is_err());
    }

    #[test]
    fn attrs_merge_keeps_existing_values() {
        let mut attrs: Attrs = [("version", "1.0")].into_iter().collect();
        let other: Attrs = [("version", "2.0"), ("vendor", "acme")].into_iter().collect();
        attrs.merge_with(&other, false);
        assert_eq!(attrs.get("version"), Some("1.0"));
        assert_eq!(attrs.get("vendor"), Some("acme"));
        attrs.merge_with(&other, true);
        assert_eq!(attrs.get("version"), Some("2.0"));
        assert_eq!(attrs.to_string(), "version=2.0;vendor=acme");
    }

    #[test]
    fn display_quotes_when_needed() {
        let attrs: Attrs = [("uses:", "a,b"), ("version", "[1.2,2)")].into_iter().collect();
        assert_eq!(attrs.to_string(), "uses:=\"a,b\";version=\"[1.2,2)\"");
    }
}
