use std::net::IpAddr;

use ssap_transport::device_url;

use crate::config::ConnectionConfig;
use crate::connection::Connection;
use crate::error::Result;

/// Open a connection to the device at `ip` and pair with it.
///
/// Returns the open connection and the client key the device accepted.
pub async fn connect(ip: IpAddr, client_key: &str) -> Result<(Connection, String)> {
    let config = ConnectionConfig::default();
    connect_with_config(&device_url(ip, config.port), config, client_key).await
}

/// Open a connection to an explicit URL with explicit configuration, then
/// pair.
///
/// The connection is closed again if pairing fails.
pub async fn connect_with_config(
    url: &str,
    config: ConnectionConfig,
    client_key: &str,
) -> Result<(Connection, String)> {
    let timeout = config.connect_timeout;
    let connection = Connection::with_url(url, config);
    connection.open(timeout).await?;

    match connection.register(client_key).await {
        Ok(key) => Ok((connection, key)),
        Err(err) => {
            let _ = connection.close().await;
            Err(err)
        }
    }
}
