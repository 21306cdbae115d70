//! Configuration items and the `key[idx] = value` directive format.
//!
//! Items are the common currency of the provisioning dialog: the same type
//! is parsed from config files, carried inside XML messages, and written
//! back out as a config dump.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ItemError {
    #[error("line {line}: '{content}' is not a valid directive")]
    MalformedLine { line: usize, content: String },

    #[error("no item named '{0}'")]
    NotFound(String),

    #[error("unable to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// One provisioning knob, identified by `(name, index)`.
///
/// `index == 0` means "no index". `status` is only ever populated on items
/// echoed back by a phone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    #[serde(rename = "@name")]
    pub name: String,
    #[serde(rename = "@index", default, skip_serializing_if = "index_is_zero")]
    pub index: u32,
    #[serde(rename = "@status", default, skip_serializing_if = "String::is_empty")]
    pub status: String,
    #[serde(rename = "$text", default)]
    pub value: String,
}

fn index_is_zero(index: &u32) -> bool {
    *index == 0
}

impl Item {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            ..Self::default()
        }
    }

    pub fn indexed(name: impl Into<String>, index: u32, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            index,
            value: value.into(),
            status: String::new(),
        }
    }
}

/// Parse directive text, one `key[idx] = value` per line.
///
/// Lines that are empty or start with `#` after trimming blanks are
/// skipped. Anything else must parse from its first token or the whole
/// file is rejected with the offending line.
pub fn parse_items(text: &str) -> Result<Vec<Item>, ItemError> {
    let mut items = Vec::new();

    for (idx, raw) in text.lines().enumerate() {
        let line = raw.trim_matches([' ', '\t']);
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        items.push(parse_directive(line, idx + 1)?);
    }

    Ok(items)
}

/// Read and parse a directive file.
pub fn items_from_file(path: &Path) -> Result<Vec<Item>, ItemError> {
    let text = std::fs::read_to_string(path).map_err(|source| ItemError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_items(&text)
}

fn parse_directive(line: &str, line_no: usize) -> Result<Item, ItemError> {
    let malformed = || ItemError::MalformedLine {
        line: line_no,
        content: line.to_string(),
    };

    // Key runs until the first character it may not contain.
    let key_end = line
        .find(['[', ']', '=', ' ', '\t'])
        .ok_or_else(malformed)?;
    if key_end == 0 {
        return Err(malformed());
    }
    let name = &line[..key_end];

    let mut rest = &line[key_end..];
    let mut index = 0u32;
    if let Some(bracketed) = rest.strip_prefix('[') {
        let close = bracketed.find(']').ok_or_else(malformed)?;
        let digits = &bracketed[..close];
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(malformed());
        }
        index = digits.parse().map_err(|_| malformed())?;
        rest = &bracketed[close + 1..];
    }

    let rest = rest.trim_start_matches([' ', '\t']);
    let value = rest.strip_prefix('=').ok_or_else(malformed)?;
    let value = value.trim_start_matches([' ', '\t']);

    Ok(Item::indexed(name, index, value))
}

/// Overlay `specifics` on top of `defaults`.
///
/// Entries sharing `(name, index)` are replaced in place, everything else
/// is appended in `specifics` order. Neither input is modified.
pub fn merge(defaults: &[Item], specifics: &[Item]) -> Vec<Item> {
    let mut merged = defaults.to_vec();

    for specific in specifics {
        match merged
            .iter_mut()
            .find(|i| i.name == specific.name && i.index == specific.index)
        {
            Some(slot) => *slot = specific.clone(),
            None => merged.push(specific.clone()),
        }
    }

    merged
}

/// Keep (`include`) or drop (`!include`) the items whose name starts with
/// `prefix`, preserving order.
pub fn filter(items: &[Item], prefix: &str, include: bool) -> Vec<Item> {
    items
        .iter()
        .filter(|i| i.name.starts_with(prefix) == include)
        .cloned()
        .collect()
}

/// First item with the given name, ignoring the index.
pub fn get<'a>(items: &'a [Item], name: &str) -> Result<&'a Item, ItemError> {
    items
        .iter()
        .find(|i| i.name == name)
        .ok_or_else(|| ItemError::NotFound(name.to_string()))
}

/// First item matching name and index exactly.
pub fn find<'a>(items: &'a [Item], name: &str, index: u32) -> Option<&'a Item> {
    items.iter().find(|i| i.name == name && i.index == index)
}

/// Render items in the dump format: `Name[Index] = Value [Status]`, with
/// the index omitted when 0 and the status omitted when empty.
pub fn format_items(items: &[Item]) -> String {
    let mut out = String::new();

    for item in items {
        out.push_str(&item.name);
        if item.index != 0 {
            out.push('[');
            out.push_str(&item.index.to_string());
            out.push(']');
        }
        out.push_str(" = ");
        out.push_str(&item.value);
        if !item.status.is_empty() {
            out.push_str(" [");
            out.push_str(&item.status);
            out.push(']');
        }
        out.push('\n');
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_directives_with_comments_and_blanks() {
        let text = "\
# site defaults
listen-ip = 0.0.0.0

\tmanaged-phones[1] = 10.0.0.5
e164 =
";
        let items = parse_items(text).unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(items[0], Item::new("listen-ip", "0.0.0.0"));
        assert_eq!(items[1], Item::indexed("managed-phones", 1, "10.0.0.5"));
        assert_eq!(items[2], Item::new("e164", ""));
    }

    #[test]
    fn value_may_contain_blanks_and_equals() {
        let items = parse_items("greeting = hello world = ok").unwrap();
        assert_eq!(items[0].value, "hello world = ok");
    }

    #[test]
    fn malformed_line_reports_position() {
        let err = parse_items("ok = 1\nnot a directive\n").unwrap_err();
        match err {
            ItemError::MalformedLine { line, content } => {
                assert_eq!(line, 2);
                assert_eq!(content, "not a directive");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn malformed_index_is_rejected() {
        assert!(parse_items("key[12x] = v").is_err());
        assert!(parse_items("key[] = v").is_err());
        assert!(parse_items("= v").is_err());
    }

    #[test]
    fn format_round_trips_through_parse() {
        let items = vec![
            Item::new("display-name", "Lobby"),
            Item::indexed("managed-phones", 2, "10.0.0.7"),
            Item::new("empty", ""),
        ];
        let reparsed = parse_items(&format_items(&items)).unwrap();
        assert_eq!(reparsed, items);
    }

    #[test]
    fn format_appends_status() {
        let mut item = Item::indexed("file-deployment-name", 1, "logo.png");
        item.status = "accepted".into();
        assert_eq!(format_items(&[item]), "file-deployment-name[1] = logo.png [accepted]\n");
    }

    #[test]
    fn merge_identities() {
        let defaults = vec![Item::new("a", "1"), Item::indexed("b", 2, "2")];
        let specifics = vec![Item::new("c", "3")];
        assert_eq!(merge(&defaults, &[]), defaults);
        assert_eq!(merge(&[], &specifics), specifics);
    }

    #[test]
    fn merge_replaces_in_place_and_appends() {
        let defaults = vec![
            Item::new("a", "1"),
            Item::new("b", "2"),
            Item::indexed("b", 1, "3"),
        ];
        let specifics = vec![Item::new("b", "override"), Item::new("z", "new")];

        let merged = merge(&defaults, &specifics);
        assert_eq!(
            merged,
            vec![
                Item::new("a", "1"),
                Item::new("b", "override"),
                Item::indexed("b", 1, "3"),
                Item::new("z", "new"),
            ]
        );
    }

    #[test]
    fn filter_partitions_and_preserves_order() {
        let items = vec![
            Item::new("file-name", "logo.png"),
            Item::new("display-name", "Lobby"),
            Item::new("file-priority", "low"),
        ];
        let kept = filter(&items, "file-", true);
        let dropped = filter(&items, "file-", false);

        assert_eq!(kept.len() + dropped.len(), items.len());
        assert_eq!(kept[0].name, "file-name");
        assert_eq!(kept[1].name, "file-priority");
        assert_eq!(dropped[0].name, "display-name");
    }

    #[test]
    fn get_ignores_index_find_does_not() {
        let items = vec![Item::indexed("k", 3, "v3"), Item::indexed("k", 5, "v5")];
        assert_eq!(get(&items, "k").unwrap().value, "v3");
        assert!(get(&items, "missing").is_err());
        assert_eq!(find(&items, "k", 5).unwrap().value, "v5");
        assert!(find(&items, "k", 4).is_none());
    }
}
