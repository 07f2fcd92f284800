use ssap_peer::{connect_with_config, PeerError};
use tracing::info;

use crate::cmd::{runtime, RegisterArgs};
use crate::exit::{peer_error, CliResult, SUCCESS};
use crate::output::{print_client_key, OutputFormat};

pub fn run(args: RegisterArgs, format: OutputFormat) -> CliResult<i32> {
    let url = args.device.url()?;
    let config = args.device.config()?;

    if args.device.client_key().is_empty() {
        info!(%url, "no client key supplied; accept the pairing prompt on the device");
    }

    let key = runtime()?
        .block_on(async {
            let (connection, key) =
                connect_with_config(&url, config, args.device.client_key()).await?;
            connection.close().await?;
            Ok::<_, PeerError>(key)
        })
        .map_err(|err| peer_error("register failed", err))?;

    print_client_key(&url, &key, format);
    Ok(SUCCESS)
}
