//! Outbound-message notification parsing.
//!
//! A notification document is a SOAP envelope with one `Notification`
//! element per changed record; each carries the record as an `sObject`
//! whose children are the record's fields.

use chrono::{DateTime, Utc};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde_json::Value;
use sync_core::{Error, Fields, Result, SourceRecord};
use tracing::debug;

use crate::PushConfig;

/// Id of the account carried by [`sample_notification`]
pub const SAMPLE_ACCOUNT_ID: &str = "001d000001XD5XKAA1";

const SAMPLE_TEMPLATE: &str = include_str!("../fixtures/account_notification.xml");
const NAME_PLACEHOLDER: &str = "accountName";

/// Single-account notification (Biotechnology, 18000 employees) for the
/// given account name
pub fn sample_notification(account_name: &str) -> String {
    SAMPLE_TEMPLATE.replace(NAME_PLACEHOLDER, account_name)
}

struct FieldState {
    name: String,
    text: String,
    nil: bool,
}

#[derive(Default)]
struct ObjectState {
    fields: Fields,
    field: Option<FieldState>,
    /// Depth of elements nested inside the current field (ignored)
    nested: usize,
}

/// Every `sObject` inside a `Notification`, in document order
pub fn parse_notifications(xml: &str, config: &PushConfig) -> Result<Vec<SourceRecord>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut records = Vec::new();
    let mut notification_depth = 0usize;
    let mut current: Option<ObjectState> = None;

    loop {
        let event = reader.read_event().map_err(|e| {
            Error::Parse(format!(
                "invalid notification at byte {}: {}",
                reader.buffer_position(),
                e
            ))
        })?;

        match event {
            Event::Eof => break,
            Event::Start(e) => {
                let name = local_name(&e);
                if let Some(object) = current.as_mut() {
                    if object.field.is_some() || object.nested > 0 {
                        object.nested += 1;
                    } else {
                        object.field = Some(FieldState {
                            name,
                            text: String::new(),
                            nil: is_nil(&e)?,
                        });
                    }
                } else if name == "Notification" {
                    notification_depth += 1;
                } else if name == "sObject" && notification_depth > 0 {
                    check_object_type(&e, config)?;
                    current = Some(ObjectState::default());
                }
            }
            Event::Empty(e) => {
                let name = local_name(&e);
                if let Some(object) = current.as_mut() {
                    if object.field.is_none() && object.nested == 0 {
                        object.fields.insert(name, Value::Null);
                    }
                } else if name == "sObject" && notification_depth > 0 {
                    check_object_type(&e, config)?;
                    records.push(finish_record(Fields::new(), config)?);
                }
            }
            Event::Text(t) => {
                if let Some(FieldState { text, .. }) =
                    current.as_mut().and_then(|o| o.field.as_mut())
                {
                    let value = t
                        .unescape()
                        .map_err(|e| Error::Parse(format!("invalid field text: {}", e)))?;
                    text.push_str(&value);
                }
            }
            Event::CData(c) => {
                if let Some(FieldState { text, .. }) =
                    current.as_mut().and_then(|o| o.field.as_mut())
                {
                    text.push_str(&String::from_utf8_lossy(&c.into_inner()));
                }
            }
            Event::End(e) => {
                if let Some(mut object) = current.take() {
                    if object.nested > 0 {
                        object.nested -= 1;
                        current = Some(object);
                    } else if let Some(field) = object.field.take() {
                        let value = if field.nil {
                            Value::Null
                        } else {
                            Value::String(field.text)
                        };
                        object.fields.insert(field.name, value);
                        current = Some(object);
                    } else {
                        records.push(finish_record(object.fields, config)?);
                    }
                } else if e.local_name().as_ref() == b"Notification" {
                    notification_depth = notification_depth.saturating_sub(1);
                }
            }
            _ => {}
        }
    }

    if current.is_some() {
        return Err(Error::Parse("notification ends inside an sObject".to_string()));
    }
    if records.is_empty() {
        return Err(Error::Parse(
            "notification does not contain any sObject".to_string(),
        ));
    }
    debug!("Parsed {} record(s) from notification", records.len());
    Ok(records)
}

fn local_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

fn attribute(e: &BytesStart<'_>, local: &[u8]) -> Result<Option<String>> {
    for attr in e.attributes() {
        let attr = attr.map_err(|e| Error::Parse(format!("invalid attribute: {}", e)))?;
        if attr.key.local_name().as_ref() == local {
            let value = attr
                .unescape_value()
                .map_err(|e| Error::Parse(format!("invalid attribute value: {}", e)))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

fn is_nil(e: &BytesStart<'_>) -> Result<bool> {
    Ok(attribute(e, b"nil")?.as_deref() == Some("true"))
}

fn check_object_type(e: &BytesStart<'_>, config: &PushConfig) -> Result<()> {
    let (Some(expected), Some(declared)) = (&config.object_type, attribute(e, b"type")?) else {
        return Ok(());
    };
    let declared = declared.rsplit(':').next().unwrap_or(&declared);
    if !declared.eq_ignore_ascii_case(expected) {
        return Err(Error::Validation(format!(
            "notification carries {} objects, expected {}",
            declared, expected
        )));
    }
    Ok(())
}

fn finish_record(mut fields: Fields, config: &PushConfig) -> Result<SourceRecord> {
    let id = match fields.remove("Id") {
        Some(Value::String(id)) if !id.is_empty() => Some(id),
        _ => None,
    };

    for name in &config.numeric_fields {
        if let Some(Value::String(raw)) = fields.get(name) {
            let number = raw.trim().parse::<i64>().map_err(|_| {
                Error::Parse(format!("field {} is not a number: '{}'", name, raw))
            })?;
            fields.insert(name.clone(), Value::from(number));
        }
    }

    let last_modified = fields
        .get("LastModifiedDate")
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);

    Ok(SourceRecord {
        id,
        fields,
        last_modified,
    })
}
