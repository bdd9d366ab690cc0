//! Parses `hg log --style xml` output into structured entries.

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::{Error, Result};

/// One `<logentry>` from `hg log --style xml`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LogEntry {
    /// The `revision` attribute (local revision number, as a string).
    pub revision: String,
    /// The `node` attribute (full changeset hash).
    pub node: String,
    /// The committer, as given to `hg commit -u`.
    pub author: String,
    /// The author's email, when `hg log` could extract one from `author`.
    pub email: Option<String>,
    /// The raw `<date>` text.
    pub date: String,
    /// The commit message.
    pub message: String,
}

/// Parses the full `<log>...</log>` document produced by `--style xml`.
pub(crate) fn parse(xml: &str) -> Result<Vec<LogEntry>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text = true;

    let mut entries = Vec::new();
    let mut current: Option<LogEntry> = None;
    let mut in_element: Option<String> = None;
    let mut buf = Vec::new();

    loop {
        match reader
            .read_event_into(&mut buf)
            .map_err(|err| Error::Parse(format!("log xml: {err}")))?
        {
            Event::Start(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                if name == "logentry" {
                    let mut entry = LogEntry::default();
                    for attr in e.attributes().flatten() {
                        let value = attr
                            .decode_and_unescape_value(reader.decoder())
                            .unwrap_or_default()
                            .into_owned();
                        match attr.key.as_ref() {
                            b"revision" => entry.revision = value,
                            b"node" => entry.node = value,
                            _ => {}
                        }
                    }
                    current = Some(entry);
                } else if name == "author" {
                    if let Some(entry) = current.as_mut() {
                        for attr in e.attributes().flatten() {
                            if attr.key.as_ref() == b"email" {
                                entry.email = Some(
                                    attr.decode_and_unescape_value(reader.decoder())
                                        .unwrap_or_default()
                                        .into_owned(),
                                );
                            }
                        }
                    }
                    in_element = Some(name);
                } else {
                    in_element = Some(name);
                }
            }
            Event::Text(e) | Event::CData(e) => {
                let text = e
                    .decode()
                    .map_err(|err| Error::Parse(format!("log xml: {err}")))?
                    .into_owned();
                if let (Some(entry), Some(element)) = (current.as_mut(), in_element.as_deref()) {
                    match element {
                        "author" => entry.author.push_str(&text),
                        "date" => entry.date.push_str(&text),
                        "msg" => entry.message.push_str(&text),
                        _ => {}
                    }
                }
            }
            Event::End(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                if name == "logentry" {
                    if let Some(entry) = current.take() {
                        entries.push(entry);
                    }
                }
                in_element = None;
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_a_single_entry() {
        let xml = r#"<?xml version="1.0"?>
<log>
<logentry revision="0" node="abc123">
<author email="user@example.com">user</author>
<date>2024-03-04T09:05:00+00:00</date>
<msg xml:space="preserve">msg</msg>
</logentry>
</log>
"#;
        let entries = parse(xml).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].revision, "0");
        assert_eq!(entries[0].node, "abc123");
        assert_eq!(entries[0].author, "user");
        assert_eq!(entries[0].email.as_deref(), Some("user@example.com"));
        assert_eq!(entries[0].message, "msg");
    }

    #[test]
    fn parses_multiple_entries_in_order() {
        let xml = r#"<log>
<logentry revision="1" node="b">
<author email="b@example.com">b</author>
<date>d1</date>
<msg xml:space="preserve">second</msg>
</logentry>
<logentry revision="0" node="a">
<author email="a@example.com">a</author>
<date>d0</date>
<msg xml:space="preserve">first</msg>
</logentry>
</log>"#;
        let entries = parse(xml).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].message, "second");
        assert_eq!(entries[1].message, "first");
    }

    #[test]
    fn empty_log_is_an_empty_vec() {
        let xml = "<log>\n</log>";
        assert_eq!(parse(xml).unwrap(), Vec::new());
    }
}
