//! XML encoding of a single record.
//!
//! ```xml
//! <?xml version="1.0" encoding="utf-8"?>
//! <configuration xmlns="http://confstore.dev/ns/config" key="..." name="...">
//!   <description>...</description>
//!   <entries>
//!     <entry key="..." value="..."/>
//!   </entries>
//! </configuration>
//! ```
//!
//! The reader is strict: unknown elements and stray character data are errors,
//! never skipped.

use super::{Configuration, ConfigurationDetails, Properties};
use crate::config::CatalogConfig;
use crate::error::{CatalogError, Result};
use crate::store::atomic::write_file;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use serde_json::Value;
use std::fs;
use std::io::Write;
use std::path::Path;
use tracing::debug;

const ROOT: &[u8] = b"configuration";
const DESCRIPTION: &[u8] = b"description";
const ENTRIES: &[u8] = b"entries";
const ENTRY: &[u8] = b"entry";
const ATTR_KEY: &[u8] = b"key";
const ATTR_VALUE: &[u8] = b"value";
const ATTR_NAME: &[u8] = b"name";

/// Source name used in errors for in-memory documents.
pub(super) const INLINE_SOURCE: &str = "<inline>";

type ParseResult<T> = std::result::Result<T, String>;

pub(super) fn write(config: &Configuration, path: &Path) -> Result<()> {
    let text = to_string(config).map_err(|m| CatalogError::xml(path, m))?;
    write_file(path, |w| {
        w.write_all(text.as_bytes())
            .map_err(|e| CatalogError::io_with_path(e, path))
    })?;
    debug!("Wrote configuration {} to {}", config.key(), path.display());
    Ok(())
}

pub(super) fn read(path: &Path) -> Result<Configuration> {
    let bytes = fs::read(path).map_err(|e| CatalogError::Io {
        message: format!("Failed to read {}", path.display()),
        path: Some(path.to_path_buf()),
        source: Some(e),
    })?;
    let text = String::from_utf8(bytes).map_err(|e| CatalogError::xml(path, e.to_string()))?;
    from_str(&text).map_err(|m| CatalogError::xml(path, m))
}

pub(super) fn to_string(config: &Configuration) -> ParseResult<String> {
    let mut strings = Vec::with_capacity(config.properties.len());
    for (key, value) in &config.properties {
        match value {
            Value::String(s) => strings.push((key.as_str(), s.as_str())),
            other => {
                return Err(format!(
                    "property '{}' is not a string ({}) and cannot be written as XML",
                    key, other
                ))
            }
        }
    }

    let details = &config.details;
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);

    emit(&mut writer, Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;

    let mut root = BytesStart::new("configuration");
    root.push_attribute(("xmlns", CatalogConfig::XML_NAMESPACE));
    root.push_attribute(("key", details.key()));
    root.push_attribute(("name", details.nice_name()));
    emit(&mut writer, Event::Start(root))?;

    emit(&mut writer, Event::Start(BytesStart::new("description")))?;
    emit(&mut writer, Event::Text(BytesText::new(details.description())))?;
    emit(&mut writer, Event::End(BytesEnd::new("description")))?;

    emit(&mut writer, Event::Start(BytesStart::new("entries")))?;
    for (key, value) in strings {
        let mut entry = BytesStart::new("entry");
        entry.push_attribute(("key", key));
        entry.push_attribute(("value", value));
        emit(&mut writer, Event::Empty(entry))?;
    }
    emit(&mut writer, Event::End(BytesEnd::new("entries")))?;
    emit(&mut writer, Event::End(BytesEnd::new("configuration")))?;

    let mut bytes = writer.into_inner();
    bytes.push(b'\n');
    String::from_utf8(bytes).map_err(|e| e.to_string())
}

fn emit(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> ParseResult<()> {
    writer.write_event(event).map_err(|e| e.to_string())
}

pub(super) fn from_str(text: &str) -> ParseResult<Configuration> {
    let mut reader = Reader::from_str(text);

    // Prolog: declaration, comments and whitespace until the root element.
    let (root, has_children) = loop {
        match next_event(&mut reader)? {
            Event::Start(e) if e.local_name().as_ref() == ROOT => break (e, true),
            Event::Empty(e) if e.local_name().as_ref() == ROOT => break (e, false),
            Event::Eof => return Err("missing <configuration> element".to_string()),
            other => reject_unexpected(&other)?,
        }
    };

    let mut key = None;
    let mut nice_name = String::new();
    for attr in root.attributes() {
        let attr = attr.map_err(|e| e.to_string())?;
        let value = attr.unescape_value().map_err(|e| e.to_string())?;
        match attr.key.as_ref() {
            ATTR_KEY => key = Some(value.into_owned()),
            ATTR_NAME => nice_name = value.into_owned(),
            _ => {}
        }
    }
    let key = key.ok_or_else(|| "<configuration> has no 'key' attribute".to_string())?;

    let mut description = String::new();
    let mut properties = Properties::new();

    if has_children {
        loop {
            match next_event(&mut reader)? {
                Event::Start(e) if e.local_name().as_ref() == DESCRIPTION => {
                    description = read_description(&mut reader)?;
                }
                Event::Empty(e) if e.local_name().as_ref() == DESCRIPTION => {
                    description.clear();
                }
                Event::Start(e) if e.local_name().as_ref() == ENTRIES => {
                    read_entries(&mut reader, &mut properties)?;
                }
                Event::Empty(e) if e.local_name().as_ref() == ENTRIES => {}
                Event::End(e) if e.local_name().as_ref() == ROOT => break,
                Event::Eof => return Err("unexpected end of document".to_string()),
                other => reject_unexpected(&other)?,
            }
        }
    }

    // Epilog: only comments, processing instructions and whitespace.
    loop {
        match next_event(&mut reader)? {
            Event::Eof => break,
            Event::Decl(_) => return Err("XML declaration after the root element".to_string()),
            Event::DocType(_) => return Err("DOCTYPE after the root element".to_string()),
            other => reject_unexpected(&other)?,
        }
    }

    let details = ConfigurationDetails::builder(key)
        .nice_name(nice_name)
        .description(description)
        .build();
    Ok(Configuration::new(details, properties))
}

fn next_event<'a>(reader: &mut Reader<&'a [u8]>) -> ParseResult<Event<'a>> {
    reader.read_event().map_err(|e| {
        format!(
            "malformed XML at position {}: {}",
            reader.buffer_position(),
            e
        )
    })
}

/// Accept events that carry no content, reject everything else.
fn reject_unexpected(event: &Event<'_>) -> ParseResult<()> {
    match event {
        Event::Decl(_) | Event::Comment(_) | Event::PI(_) | Event::DocType(_) => Ok(()),
        Event::Text(t) => {
            let text = t.unescape().map_err(|e| e.to_string())?;
            if text.trim().is_empty() {
                Ok(())
            } else {
                Err(format!("unexpected character data '{}'", text.trim()))
            }
        }
        Event::CData(_) => Err("unexpected CDATA section".to_string()),
        Event::Start(e) | Event::Empty(e) => Err(format!(
            "unexpected element <{}>",
            String::from_utf8_lossy(e.name().as_ref())
        )),
        Event::End(e) => Err(format!(
            "unexpected end of element </{}>",
            String::from_utf8_lossy(e.name().as_ref())
        )),
        Event::Eof => Err("unexpected end of document".to_string()),
    }
}

fn read_description(reader: &mut Reader<&[u8]>) -> ParseResult<String> {
    let mut text = String::new();
    loop {
        match next_event(reader)? {
            Event::Text(t) => text.push_str(&t.unescape().map_err(|e| e.to_string())?),
            Event::CData(c) => text.push_str(&String::from_utf8_lossy(&c)),
            Event::Comment(_) => {}
            Event::End(e) if e.local_name().as_ref() == DESCRIPTION => break,
            other => reject_unexpected(&other)?,
        }
    }
    Ok(text.trim().to_string())
}

fn read_entries(reader: &mut Reader<&[u8]>, properties: &mut Properties) -> ParseResult<()> {
    loop {
        match next_event(reader)? {
            Event::Empty(e) if e.local_name().as_ref() == ENTRY => {
                insert_entry(&e, properties)?;
            }
            Event::Start(e) if e.local_name().as_ref() == ENTRY => {
                insert_entry(&e, properties)?;
                // An entry written as <entry ...></entry> must still be empty.
                loop {
                    match next_event(reader)? {
                        Event::End(end) if end.local_name().as_ref() == ENTRY => break,
                        other => reject_unexpected(&other)?,
                    }
                }
            }
            Event::End(e) if e.local_name().as_ref() == ENTRIES => return Ok(()),
            other => reject_unexpected(&other)?,
        }
    }
}

fn insert_entry(element: &BytesStart<'_>, properties: &mut Properties) -> ParseResult<()> {
    let mut key = None;
    let mut value = String::new();
    for attr in element.attributes() {
        let attr = attr.map_err(|e| e.to_string())?;
        match attr.key.as_ref() {
            ATTR_KEY => key = Some(attr.unescape_value().map_err(|e| e.to_string())?.into_owned()),
            ATTR_VALUE => value = attr.unescape_value().map_err(|e| e.to_string())?.into_owned(),
            _ => {}
        }
    }

    match key {
        Some(key) => {
            properties.insert(key, Value::String(value));
        }
        None => debug!("Skipping <entry> without a key"),
    }
    Ok(())
}
