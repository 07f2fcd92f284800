use std::io::{IsTerminal, Write};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use serde_json::Value;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct RegisteredOutput<'a> {
    url: &'a str,
    client_key: &'a str,
}

#[derive(Serialize)]
struct ResponseOutput<'a> {
    url: &'a str,
    uri: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    issued_client_key: Option<&'a str>,
    payload: &'a Value,
}

pub fn print_client_key(url: &str, client_key: &str, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&RegisteredOutput { url, client_key }),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["DEVICE", "CLIENT KEY"])
                .add_row(vec![url, client_key]);
            println!("{table}");
        }
        OutputFormat::Pretty => println!("device={url} client_key={client_key}"),
        OutputFormat::Raw => print_raw(client_key.as_bytes()),
    }
}

/// Print a response payload. `issued_client_key` is set when pairing handed
/// out a key different from the one supplied.
pub fn print_response(
    url: &str,
    uri: &str,
    issued_client_key: Option<&str>,
    payload: &Value,
    format: OutputFormat,
) {
    match format {
        OutputFormat::Json => print_json(&ResponseOutput {
            url,
            uri,
            issued_client_key,
            payload,
        }),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["FIELD", "VALUE"]);
            for (field, value) in payload_rows(payload) {
                table.add_row(vec![field, value]);
            }
            println!("{table}");
            if let Some(key) = issued_client_key {
                println!("client key issued: {key}");
            }
        }
        OutputFormat::Pretty => {
            let body = serde_json::to_string_pretty(payload).unwrap_or_else(|_| "{}".to_string());
            println!("{uri}\n{body}");
            if let Some(key) = issued_client_key {
                println!("client_key={key}");
            }
        }
        OutputFormat::Raw => print_raw(payload.to_string().as_bytes()),
    }
}

fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.write_all(b"\n");
    let _ = out.flush();
}

/// One row per top-level field; nested values are rendered as compact JSON.
fn payload_rows(payload: &Value) -> Vec<(String, String)> {
    match payload {
        Value::Object(fields) => fields
            .iter()
            .map(|(field, value)| {
                let text = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (field.clone(), text)
            })
            .collect(),
        other => vec![("payload".to_string(), other.to_string())],
    }
}
