use crate::DATA_ENDPOINT;
use crate::proxies::{control_proxy, status_proxy};
use zbus::Connection;

/// NEW_DATA_AVAILABLE on the data endpoint: `1` while an unread snapshot is waiting.
const NEW_DATA_AVAILABLE: u32 = 2;

async fn call_get_platform_variant() -> Result<String, zbus::Error> {
    let connection = Connection::system().await?;
    let proxy = status_proxy::StatusProxy::new(&connection).await?;
    proxy.get_platform_variant().await
}

async fn call_get_bitstream_state() -> Result<String, zbus::Error> {
    let connection = Connection::system().await?;
    let proxy = status_proxy::StatusProxy::new(&connection).await?;
    proxy.get_bitstream_state().await
}

async fn call_new_data_available() -> Result<u64, zbus::Error> {
    let connection = Connection::system().await?;
    let proxy = control_proxy::ControlProxy::new(&connection).await?;
    proxy.ioctl(DATA_ENDPOINT, NEW_DATA_AVAILABLE).await
}

pub async fn call_get_config(key: &str) -> Result<String, zbus::Error> {
    let connection = Connection::system().await?;
    let proxy = status_proxy::StatusProxy::new(&connection).await?;
    proxy.get_config(key).await
}

fn readiness(new_data: u64) -> &'static str {
    if new_data != 0 { "ready" } else { "empty" }
}

fn status_message(variant: &str, buffer_size: &str, new_data: u64, bitstream: &str) -> String {
    format!(
        "---- GATEWAY ----\n\
        | variant | dma_buffer_size | data | bitstream |\n\
        {variant} | {} | {} | {bitstream}",
        buffer_size.trim(),
        readiness(new_data)
    )
}

pub async fn status_handler() -> Result<String, zbus::Error> {
    let variant = call_get_platform_variant().await?;
    let buffer_size = call_get_config("dma_buffer_size").await?;
    let new_data = call_new_data_available().await?;
    let bitstream = call_get_bitstream_state().await?;
    Ok(status_message(&variant, &buffer_size, new_data, &bitstream))
}
