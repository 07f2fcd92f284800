use serde_json::Value;
use ssap_peer::{connect_with_config, PeerError};
use tracing::debug;

use crate::cmd::{parse_duration, runtime, RequestArgs};
use crate::exit::{peer_error, CliResult, SUCCESS};
use crate::output::{print_response, OutputFormat};

pub fn run(args: RequestArgs, format: OutputFormat) -> CliResult<i32> {
    let url = args.device.url()?;
    let mut config = args.device.config()?;
    config.request_timeout = parse_duration(&args.request_timeout)?;
    let payload = args.payload()?;
    let supplied_key = args.device.client_key();

    let (key, response) = runtime()?
        .block_on(async {
            let (connection, key) = connect_with_config(&url, config, supplied_key).await?;
            debug!(uri = %args.uri, "sending request");
            let response = connection
                .request::<Value, Value>(&args.uri, payload.as_ref())
                .await;
            let _ = connection.close().await;
            Ok::<_, PeerError>((key, response?))
        })
        .map_err(|err| peer_error("request failed", err))?;

    let issued = (key != supplied_key).then_some(key.as_str());
    print_response(&url, &args.uri, issued, &response, format);
    Ok(SUCCESS)
}
