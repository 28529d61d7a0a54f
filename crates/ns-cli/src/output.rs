//! Command output.
//!
//! JSON mode prints one `{ data, meta?, warnings? }` envelope. Human mode
//! prints flat reports as `key: value` lines, record lists one JSON object per
//! line, and warnings as `notice:` lines on stderr.

use std::io::Write;

use anyhow::Result;
use serde::Serialize;
use serde_json::Value;

use crate::opts::GlobalOpts;

#[derive(Debug, Serialize)]
struct Envelope {
    data: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    meta: Option<Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    warnings: Vec<String>,
}

pub fn print_success(
    opts: &GlobalOpts,
    data: Value,
    meta: Option<Value>,
    mut warnings: Vec<String>,
) -> Result<()> {
    if opts.quiet {
        warnings.clear();
    }
    if opts.json || opts.pretty {
        let envelope = Envelope {
            data,
            meta,
            warnings,
        };
        let text = if opts.pretty {
            serde_json::to_string_pretty(&envelope)?
        } else {
            serde_json::to_string(&envelope)?
        };
        println!("{text}");
        return Ok(());
    }

    let mut stderr = std::io::stderr().lock();
    for warning in &warnings {
        writeln!(stderr, "notice: {warning}")?;
    }
    let mut stdout = std::io::stdout().lock();
    for line in human_lines(&data)? {
        writeln!(stdout, "{line}")?;
    }
    Ok(())
}

fn human_lines(data: &Value) -> Result<Vec<String>> {
    let lines = match data {
        Value::String(text) => vec![text.clone()],
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::String(text) => Ok(text.clone()),
                other => serde_json::to_string(other),
            })
            .collect::<Result<_, _>>()?,
        Value::Object(fields) if fields.values().all(is_scalar) => fields
            .iter()
            .map(|(key, value)| format!("{key}: {}", scalar_text(value)))
            .collect(),
        other => vec![serde_json::to_string_pretty(other)?],
    };
    Ok(lines)
}

fn is_scalar(value: &Value) -> bool {
    !matches!(value, Value::Array(_) | Value::Object(_))
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
