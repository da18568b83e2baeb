// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! JSON encoding of records into the collector's event envelope.
//!
//! ```json
//! {"time":"1700000000.123","source":"app","sourcetype":"_json","host":"h1",
//!  "event":{"Level":"Info","RenderedMessage":"hello","Properties":{"k":"v"}}}
//! ```

use crate::record::{format_epoch_seconds, ExceptionInfo, Metadata, Properties, Record, Value};
use serde::Serialize;
use std::sync::Arc;

/// Replaces the default event body with a caller-built value.
pub type EventFormatter = Arc<dyn Fn(&Record) -> Value + Send + Sync>;

#[derive(Serialize)]
struct Envelope<'a> {
    time: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    index: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    source: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sourcetype: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    host: Option<&'a str>,
    event: EventBody<'a>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum EventBody<'a> {
    Default(LoggerEvent<'a>),
    Formatted(&'a Value),
}

#[derive(Serialize)]
struct LoggerEvent<'a> {
    #[serde(rename = "Id", skip_serializing_if = "Option::is_none")]
    id: Option<&'a str>,
    #[serde(rename = "Level", skip_serializing_if = "Option::is_none")]
    level: Option<&'a str>,
    #[serde(rename = "MessageTemplate", skip_serializing_if = "Option::is_none")]
    message_template: Option<&'a str>,
    #[serde(rename = "RenderedMessage", skip_serializing_if = "Option::is_none")]
    rendered_message: Option<&'a str>,
    #[serde(rename = "Exception", skip_serializing_if = "Option::is_none")]
    exception: Option<&'a ExceptionInfo>,
    #[serde(rename = "Properties", skip_serializing_if = "no_properties")]
    properties: &'a Properties,
}

fn no_properties(properties: &&Properties) -> bool {
    properties.is_empty()
}

/// A record ready to be written: formatter output is computed up front so
/// user code never runs under the buffer lock.
pub struct PreparedRecord {
    record: Record,
    formatted: Option<Value>,
}

impl PreparedRecord {
    #[must_use]
    pub fn record(&self) -> &Record {
        &self.record
    }
}

pub struct EventSerializer {
    default_metadata: Arc<Metadata>,
    formatter: Option<EventFormatter>,
}

impl EventSerializer {
    #[must_use]
    pub fn new(default_metadata: Metadata, formatter: Option<EventFormatter>) -> Self {
        Self {
            default_metadata: Arc::new(default_metadata),
            formatter,
        }
    }

    /// Validates `record` and runs the custom formatter, if any.
    pub fn prepare(&self, record: Record) -> Result<PreparedRecord, String> {
        if record.properties().keys().any(str::is_empty) {
            return Err("property keys must not be empty".to_string());
        }
        let formatted = self.formatter.as_ref().map(|format| format(&record));
        Ok(PreparedRecord { record, formatted })
    }

    /// Appends one JSON object to `out`.
    ///
    /// A fresh `serde_json` serializer is used per record, so a failure leaves
    /// no writer state behind; `out` may hold a partial object and must be
    /// truncated by the caller.
    pub fn write(&self, out: &mut Vec<u8>, prepared: &PreparedRecord) -> serde_json::Result<()> {
        let record = &prepared.record;
        let metadata = record.metadata().unwrap_or(&self.default_metadata);

        let event = match &prepared.formatted {
            Some(value) => EventBody::Formatted(value),
            None => EventBody::Default(LoggerEvent {
                id: record.id(),
                level: record.level(),
                message_template: record.message_template(),
                rendered_message: record.rendered_message(),
                exception: record.exception(),
                properties: record.properties(),
            }),
        };

        let envelope = Envelope {
            time: format_epoch_seconds(record.timestamp()),
            index: metadata.index.as_deref(),
            source: metadata.source.as_deref(),
            sourcetype: metadata.source_type.as_deref(),
            host: metadata.host.as_deref(),
            event,
        };

        serde_json::to_writer(out, &envelope)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::time::{Duration, UNIX_EPOCH};

    fn at(millis: u64) -> Record {
        Record::at(UNIX_EPOCH + Duration::from_millis(millis))
    }

    fn render(serializer: &EventSerializer, record: Record) -> serde_json::Value {
        let prepared = serializer.prepare(record).unwrap();
        let mut out = Vec::new();
        serializer.write(&mut out, &prepared).unwrap();
        serde_json::from_slice(&out).unwrap()
    }

    #[test]
    fn test_minimal_record_omits_absent_fields() {
        let serializer = EventSerializer::new(Metadata::default(), None);
        let json = render(&serializer, at(1_700_000_000_123));

        assert_eq!(
            json,
            serde_json::json!({"time": "1700000000.123", "event": {}})
        );
    }

    #[test]
    fn test_full_record_shape() {
        let serializer = EventSerializer::new(
            Metadata::new(
                Some("main".to_string()),
                Some("app".to_string()),
                Some("_json".to_string()),
                Some("h1".to_string()),
            ),
            None,
        );
        let record = at(1_700_000_000_500)
            .with_id("42")
            .with_level("Error")
            .with_message_template("Order {OrderId} failed")
            .with_rendered_message("Order 7 failed")
            .with_exception(ExceptionInfo::new("IoError", "disk gone"))
            .with_property("OrderId", 7_i64);

        let json = render(&serializer, record);

        assert_eq!(
            json,
            serde_json::json!({
                "time": "1700000000.500",
                "index": "main",
                "source": "app",
                "sourcetype": "_json",
                "host": "h1",
                "event": {
                    "Id": "42",
                    "Level": "Error",
                    "MessageTemplate": "Order {OrderId} failed",
                    "RenderedMessage": "Order 7 failed",
                    "Exception": {"Type": "IoError", "Message": "disk gone"},
                    "Properties": {"OrderId": 7}
                }
            })
        );
    }

    #[test]
    fn test_record_metadata_overrides_default() {
        let serializer = EventSerializer::new(
            Metadata::new(None, Some("default".to_string()), None, None),
            None,
        );
        let record = at(0).with_metadata(Arc::new(Metadata::new(
            None,
            Some("override".to_string()),
            None,
            None,
        )));

        let json = render(&serializer, record);
        assert_eq!(json["source"], "override");
    }

    #[test]
    fn test_formatter_replaces_event_body() {
        let formatter: EventFormatter = Arc::new(|record: &Record| {
            let mut body = Properties::new();
            body.insert("msg", record.rendered_message().unwrap_or_default());
            Value::Map(body)
        });
        let serializer = EventSerializer::new(Metadata::default(), Some(formatter));

        let json = render(&serializer, at(0).with_rendered_message("hi").with_level("Info"));
        assert_eq!(json["event"], serde_json::json!({"msg": "hi"}));
    }

    #[test]
    fn test_empty_property_key_is_rejected() {
        let serializer = EventSerializer::new(Metadata::default(), None);
        assert!(serializer.prepare(at(0).with_property("", 1_i64)).is_err());
    }

    #[test]
    fn test_write_fails_on_invalid_value() {
        let serializer = EventSerializer::new(Metadata::default(), None);
        let prepared = serializer
            .prepare(at(0).with_property("bad", f64::NAN))
            .unwrap();
        let mut out = Vec::new();
        assert!(serializer.write(&mut out, &prepared).is_err());
    }
}
