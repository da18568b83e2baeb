// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Turns stdin lines into records.
//!
//! A line is either plain text, sent at `Info` level, or a JSON object:
//!
//! ```json
//! {"logger":"orders","level":"Warn","message":"Order {0} took {Elapsed} ms",
//!  "args":[7],"Elapsed":1200,"exception":{"type":"Timeout","message":"slow"}}
//! ```
//!
//! Keys other than the reserved ones become event properties.

use hec_sender::{ExceptionInfo, Metadata, Properties, Record, Value};
use serde_json::{Map, Value as Json};
use std::sync::Arc;

const DEFAULT_LEVEL: &str = "Info";
const RESERVED_KEYS: [&str; 5] = ["logger", "level", "message", "args", "exception"];

/// One parsed input line.
#[derive(Debug, Default, PartialEq)]
pub struct LogLine {
    pub logger: String,
    pub level: String,
    pub template: Option<String>,
    pub args: Vec<Json>,
    pub properties: Map<String, Json>,
    pub exception: Option<ExceptionInfo>,
}

/// Parses `line`. Blank lines yield `None`.
pub fn parse_line(line: &str) -> Option<LogLine> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return None;
    }

    let Ok(Json::Object(mut fields)) = serde_json::from_str::<Json>(line) else {
        return Some(LogLine {
            level: DEFAULT_LEVEL.to_string(),
            template: Some(line.to_string()),
            ..Default::default()
        });
    };

    let logger = take_string(&mut fields, "logger").unwrap_or_default();
    let level = take_string(&mut fields, "level").unwrap_or_else(|| DEFAULT_LEVEL.to_string());
    let template = take_string(&mut fields, "message");
    let args = match fields.remove("args") {
        Some(Json::Array(args)) => args,
        Some(Json::Null) | None => Vec::new(),
        Some(single) => vec![single],
    };
    let exception = fields.remove("exception").and_then(exception_from_json);
    fields.retain(|key, _| !RESERVED_KEYS.contains(&key.as_str()));

    Some(LogLine {
        logger,
        level,
        template,
        args,
        properties: fields,
        exception,
    })
}

fn take_string(fields: &mut Map<String, Json>, key: &str) -> Option<String> {
    match fields.remove(key)? {
        Json::String(s) => Some(s),
        Json::Null => None,
        other => Some(other.to_string()),
    }
}

fn exception_from_json(value: Json) -> Option<ExceptionInfo> {
    match value {
        Json::String(message) => Some(ExceptionInfo::new("Error", message)),
        Json::Object(mut fields) => {
            let type_name = take_string(&mut fields, "type").unwrap_or_else(|| "Error".to_string());
            let message = take_string(&mut fields, "message").unwrap_or_default();
            let mut exception = ExceptionInfo::new(type_name, message);
            if let Some(stack_trace) = take_string(&mut fields, "stack_trace") {
                exception = exception.with_stack_trace(stack_trace);
            }
            if let Some(inner) = fields.remove("inner").and_then(exception_from_json) {
                exception.inner = Some(Box::new(inner));
            }
            Some(exception)
        }
        _ => None,
    }
}

/// Builds the record for `line`.
///
/// With `include_positional`, each argument is also added as a `{N}`
/// property.
pub fn to_record(line: LogLine, metadata: Arc<Metadata>, include_positional: bool) -> Record {
    let rendered = line
        .template
        .as_deref()
        .map(|template| render(template, &line.args, &line.properties));

    let mut properties: Properties = line
        .properties
        .into_iter()
        .map(|(key, value)| (key, Value::from(value)))
        .collect();
    if include_positional {
        for (i, arg) in line.args.iter().enumerate() {
            properties.insert(format!("{{{i}}}"), Value::from(arg.clone()));
        }
    }

    let mut record = Record::now()
        .with_level(line.level)
        .with_properties(properties)
        .with_metadata(metadata);
    if let Some(template) = line.template {
        record = record.with_message_template(template);
    }
    if let Some(rendered) = rendered {
        record = record.with_rendered_message(rendered);
    }
    if let Some(exception) = line.exception {
        record = record.with_exception(exception);
    }
    record
}

/// Substitutes `{N}` with the N-th argument and `{Name}` with the property
/// of that name. Unknown holes are kept verbatim.
pub fn render(template: &str, args: &[Json], properties: &Map<String, Json>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else {
            out.push_str(&rest[open..]);
            return out;
        };
        let hole = &after[..close];
        let value = match hole.parse::<usize>() {
            Ok(i) => args.get(i),
            Err(_) => properties.get(hole),
        };
        match value {
            Some(Json::String(s)) => out.push_str(s),
            Some(other) => out.push_str(&other.to_string()),
            None => {
                out.push('{');
                out.push_str(hole);
                out.push('}');
            }
        }
        rest = &after[close + 1..];
    }
    out.push_str(rest);
    out
}
