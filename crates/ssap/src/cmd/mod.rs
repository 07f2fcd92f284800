use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand};
use ssap_peer::ConnectionConfig;
use ssap_transport::{device_url, DEFAULT_PORT};

use crate::exit::{io_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod register;
pub mod request;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Pair with a device and print the client key it accepted.
    Register(RegisterArgs),
    /// Pair, send one request and print the response payload.
    Request(RequestArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Register(args) => register::run(args, format),
        Command::Request(args) => request::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

/// Where to reach the device and how to pair with it.
#[derive(Args, Debug)]
pub struct DeviceArgs {
    /// Device IP address, or a full ws:// URL.
    pub host: String,
    /// Device WebSocket port (ignored when HOST is a URL).
    #[arg(long, default_value_t = DEFAULT_PORT)]
    pub port: u16,
    /// Client key from an earlier pairing. Empty or absent prompts on the device.
    #[arg(long, env = "SSAP_CLIENT_KEY", hide_env_values = true)]
    pub client_key: Option<String>,
    /// Connection timeout (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub connect_timeout: String,
    /// Time allowed for pairing, including accepting the prompt on the device.
    #[arg(long, default_value = "60s")]
    pub timeout: String,
}

impl DeviceArgs {
    pub fn url(&self) -> CliResult<String> {
        if self.host.starts_with("ws://") {
            return Ok(self.host.clone());
        }
        let ip: IpAddr = self.host.parse().map_err(|_| {
            CliError::new(
                USAGE,
                format!("invalid host '{}': expected an IP address or ws:// URL", self.host),
            )
        })?;
        Ok(device_url(ip, self.port))
    }

    pub fn config(&self) -> CliResult<ConnectionConfig> {
        Ok(ConnectionConfig {
            port: self.port,
            connect_timeout: parse_duration(&self.connect_timeout)?,
            register_timeout: parse_duration(&self.timeout)?,
            ..ConnectionConfig::default()
        })
    }

    pub fn client_key(&self) -> &str {
        self.client_key.as_deref().unwrap_or("")
    }
}

#[derive(Args, Debug)]
pub struct RegisterArgs {
    #[command(flatten)]
    pub device: DeviceArgs,
}

#[derive(Args, Debug)]
pub struct RequestArgs {
    #[command(flatten)]
    pub device: DeviceArgs,
    /// Request URI (e.g. ssap://audio/getVolume).
    pub uri: String,
    /// JSON object payload.
    #[arg(long, conflicts_with = "file")]
    pub json: Option<String>,
    /// Read the JSON object payload from a file.
    #[arg(long, conflicts_with = "json")]
    pub file: Option<PathBuf>,
    /// Time to wait for the response (e.g. 10s, 500ms).
    #[arg(long, default_value = "10s")]
    pub request_timeout: String,
}

impl RequestArgs {
    /// The request payload, if one was given. Must be a JSON object.
    pub fn payload(&self) -> CliResult<Option<serde_json::Value>> {
        let (source, text) = if let Some(json) = &self.json {
            ("--json", json.clone())
        } else if let Some(path) = &self.file {
            let text = std::fs::read_to_string(path).map_err(|err| {
                io_error(&format!("failed reading {}", path.display()), err)
            })?;
            ("--file", text)
        } else {
            return Ok(None);
        };

        let value: serde_json::Value = serde_json::from_str(&text)
            .map_err(|err| CliError::new(USAGE, format!("{source} is not valid JSON: {err}")))?;
        if !value.is_object() {
            return Err(CliError::new(
                USAGE,
                format!("{source} must be a JSON object"),
            ));
        }
        Ok(Some(value))
    }
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Runtime for one command. The receive loop runs as a task on it.
pub fn runtime() -> CliResult<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|err| io_error("failed to start runtime", err))
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(host: &str) -> DeviceArgs {
        DeviceArgs {
            host: host.to_string(),
            port: DEFAULT_PORT,
            client_key: None,
            connect_timeout: "5s".to_string(),
            timeout: "60s".to_string(),
        }
    }

    fn request(json: Option<&str>) -> RequestArgs {
        RequestArgs {
            device: device("10.0.0.5"),
            uri: "ssap://audio/setVolume".to_string(),
            json: json.map(str::to_string),
            file: None,
            request_timeout: "10s".to_string(),
        }
    }

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("bad").is_err());
        assert_eq!(parse_duration("").unwrap_err().code, USAGE);
    }

    #[test]
    fn host_resolves_to_device_url() {
        assert_eq!(device("10.0.0.5").url().unwrap(), "ws://10.0.0.5:3000");
        assert_eq!(device("::1").url().unwrap(), "ws://[::1]:3000");
        assert_eq!(
            device("ws://tv.local:3001").url().unwrap(),
            "ws://tv.local:3001"
        );
        assert_eq!(device("tv.local").url().unwrap_err().code, USAGE);
    }

    #[test]
    fn config_carries_timeouts() {
        let mut args = device("10.0.0.5");
        args.timeout = "90s".to_string();
        let config = args.config().unwrap();
        assert_eq!(config.register_timeout, Duration::from_secs(90));
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert_eq!(config.request_timeout, Duration::from_secs(10));
        assert_eq!(args.client_key(), "");
    }

    #[test]
    fn payload_must_be_json_object() {
        assert!(request(None).payload().unwrap().is_none());
        let payload = request(Some(r#"{"volume":5}"#)).payload().unwrap().unwrap();
        assert_eq!(payload["volume"], 5);
        assert_eq!(request(Some("[1]")).payload().unwrap_err().code, USAGE);
        assert_eq!(request(Some("{oops")).payload().unwrap_err().code, USAGE);
    }
}
