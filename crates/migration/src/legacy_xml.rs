//! Reader and writer for the legacy flat preferences file.
//!
//! The legacy format is the XML map written by Android `SharedPreferences`:
//!
//! ```xml
//! <?xml version='1.0' encoding='utf-8' standalone='yes' ?>
//! <map>
//!     <boolean name="show_completed" value="true" />
//!     <string name="sort_order">BY_DEADLINE</string>
//!     <set name="tags"><string>a</string></set>
//! </map>
//! ```

use std::collections::{BTreeMap, BTreeSet};

use models::PreferenceValue;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::errors::MigrationError;

pub type LegacyEntries = BTreeMap<String, PreferenceValue>;

enum Open {
    String { name: String },
    Set { name: String, values: BTreeSet<String>, in_item: bool },
}

/// Parse a legacy preferences document. Blank input is an empty map.
pub fn parse(xml: &str) -> Result<LegacyEntries, MigrationError> {
    let mut entries = LegacyEntries::new();
    if xml.trim().is_empty() {
        return Ok(entries);
    }

    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false); // whitespace inside <string> is data
    let mut buf = Vec::new();

    let mut saw_map = false;
    let mut open: Option<Open> = None;
    let mut text = String::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.name().as_ref() {
                b"map" => saw_map = true,
                b"string" => {
                    text.clear();
                    match open {
                        Some(Open::Set { ref mut in_item, .. }) => *in_item = true,
                        _ => open = Some(Open::String { name: required_attr(e, b"name")? }),
                    }
                }
                b"set" => {
                    open = Some(Open::Set {
                        name: required_attr(e, b"name")?,
                        values: BTreeSet::new(),
                        in_item: false,
                    });
                }
                other => return Err(unexpected_element(other)),
            },
            Ok(Event::Empty(ref e)) => match e.name().as_ref() {
                b"map" => saw_map = true,
                b"null" => {}
                b"string" => match open {
                    Some(Open::Set { ref mut values, .. }) => {
                        values.insert(String::new());
                    }
                    _ => {
                        entries.insert(required_attr(e, b"name")?, PreferenceValue::String(String::new()));
                    }
                },
                b"set" => {
                    entries.insert(required_attr(e, b"name")?, PreferenceValue::StringSet(BTreeSet::new()));
                }
                b"boolean" | b"int" | b"long" | b"float" => {
                    let (name, value) = scalar(e)?;
                    entries.insert(name, value);
                }
                other => return Err(unexpected_element(other)),
            },
            Ok(Event::Text(ref e)) if collecting(&open) => {
                text.push_str(&unescape_xml(&String::from_utf8_lossy(e.as_ref())));
            }
            Ok(Event::GeneralRef(ref e)) if collecting(&open) => {
                text.push(resolve_reference(e.as_ref())?);
            }
            Ok(Event::End(ref e)) => match e.name().as_ref() {
                b"string" => match open {
                    Some(Open::Set { ref mut values, ref mut in_item, .. }) if *in_item => {
                        values.insert(std::mem::take(&mut text));
                        *in_item = false;
                    }
                    Some(Open::String { .. }) => {
                        if let Some(Open::String { name }) = open.take() {
                            entries.insert(name, PreferenceValue::String(std::mem::take(&mut text)));
                        }
                    }
                    _ => {}
                },
                b"set" => {
                    if let Some(Open::Set { name, values, .. }) = open.take() {
                        entries.insert(name, PreferenceValue::StringSet(values));
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(MigrationError::Parse(format!(
                    "at byte {}: {e}",
                    reader.buffer_position()
                )))
            }
            _ => {}
        }
        buf.clear();
    }

    if !saw_map {
        return Err(MigrationError::Parse("missing <map> root element".into()));
    }
    Ok(entries)
}

/// Render entries back into the legacy document format.
pub fn render(entries: &LegacyEntries) -> String {
    let mut out = String::from("<?xml version='1.0' encoding='utf-8' standalone='yes' ?>\n<map>\n");
    for (name, value) in entries {
        let name = escape_xml(name);
        let line = match value {
            PreferenceValue::Bool(v) => format!("    <boolean name=\"{name}\" value=\"{v}\" />\n"),
            PreferenceValue::Int(v) => format!("    <int name=\"{name}\" value=\"{v}\" />\n"),
            PreferenceValue::Long(v) => format!("    <long name=\"{name}\" value=\"{v}\" />\n"),
            PreferenceValue::Float(v) => format!("    <float name=\"{name}\" value=\"{v}\" />\n"),
            // no double in the legacy format
            PreferenceValue::Double(v) => format!("    <float name=\"{name}\" value=\"{}\" />\n", *v as f32),
            PreferenceValue::String(v) => format!("    <string name=\"{name}\">{}</string>\n", escape_xml(v)),
            PreferenceValue::StringSet(values) => {
                let mut set = format!("    <set name=\"{name}\">\n");
                for v in values {
                    set.push_str(&format!("        <string>{}</string>\n", escape_xml(v)));
                }
                set.push_str("    </set>\n");
                set
            }
        };
        out.push_str(&line);
    }
    out.push_str("</map>\n");
    out
}

fn collecting(open: &Option<Open>) -> bool {
    match open {
        Some(Open::String { .. }) => true,
        Some(Open::Set { in_item, .. }) => *in_item,
        None => false,
    }
}

fn scalar(e: &BytesStart) -> Result<(String, PreferenceValue), MigrationError> {
    let name = required_attr(e, b"name")?;
    let raw = required_attr(e, b"value")?;
    let invalid = |kind: &str| MigrationError::Parse(format!("invalid {kind} value `{raw}` for `{name}`"));
    let value = match e.name().as_ref() {
        b"boolean" => PreferenceValue::Bool(raw.parse().map_err(|_| invalid("boolean"))?),
        b"int" => PreferenceValue::Int(raw.parse().map_err(|_| invalid("int"))?),
        b"long" => PreferenceValue::Long(raw.parse().map_err(|_| invalid("long"))?),
        b"float" => PreferenceValue::Float(raw.parse().map_err(|_| invalid("float"))?),
        other => return Err(unexpected_element(other)),
    };
    Ok((name, value))
}

fn required_attr(e: &BytesStart, key: &[u8]) -> Result<String, MigrationError> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == key)
        .map(|a| unescape_xml(&String::from_utf8_lossy(&a.value)))
        .ok_or_else(|| {
            MigrationError::Parse(format!(
                "<{}> is missing attribute `{}`",
                String::from_utf8_lossy(e.name().as_ref()),
                String::from_utf8_lossy(key)
            ))
        })
}

fn unexpected_element(name: &[u8]) -> MigrationError {
    MigrationError::Parse(format!("unexpected element <{}>", String::from_utf8_lossy(name)))
}

fn resolve_reference(name: &[u8]) -> Result<char, MigrationError> {
    let name = std::str::from_utf8(name).map_err(|e| MigrationError::Parse(e.to_string()))?;
    let resolved = match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ => name.strip_prefix('#').and_then(|num| {
            let code = match num.strip_prefix('x').or_else(|| num.strip_prefix('X')) {
                Some(hex) => u32::from_str_radix(hex, 16).ok(),
                None => num.parse().ok(),
            };
            code.and_then(char::from_u32)
        }),
    };
    resolved.ok_or_else(|| MigrationError::Parse(format!("unknown entity `&{name};`")))
}

fn unescape_xml(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    s.replace("&quot;", "\"")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
