use crate::proxies::{control_proxy, status_proxy};
use zbus::Connection;

/// Bus window 0 and 1 live at endpoints 1 and 2.
fn window_endpoint(bus: u32) -> u32 {
    bus + 1
}

async fn call_map_window(
    endpoint: u32,
    offset: u64,
    length: u64,
) -> Result<(u64, u64), zbus::Error> {
    let connection = Connection::system().await?;
    let proxy = control_proxy::ControlProxy::new(&connection).await?;
    proxy.map_window(endpoint, offset, length).await
}

async fn call_read_window_word(endpoint: u32, address: u64) -> Result<u32, zbus::Error> {
    let connection = Connection::system().await?;
    let proxy = status_proxy::StatusProxy::new(&connection).await?;
    proxy.read_window_word(endpoint, address).await
}

async fn call_write_window_word(
    endpoint: u32,
    address: u64,
    value: u32,
) -> Result<String, zbus::Error> {
    let connection = Connection::system().await?;
    let proxy = control_proxy::ControlProxy::new(&connection).await?;
    proxy.write_window_word(endpoint, address, value).await
}

pub async fn map_handler(bus: u32, offset: u64, length: u64) -> Result<String, zbus::Error> {
    let (page, page_offset) = call_map_window(window_endpoint(bus), offset, length).await?;
    Ok(format!(
        "bus {bus}: {length:#x} bytes at {offset:#x} map from page {page:#x} + {page_offset:#x}"
    ))
}

pub async fn peek_handler(bus: u32, address: u64) -> Result<String, zbus::Error> {
    let value = call_read_window_word(window_endpoint(bus), address).await?;
    Ok(format!("{address:#x}: {value:#010x}"))
}

pub async fn poke_handler(bus: u32, address: u64, value: u32) -> Result<String, zbus::Error> {
    call_write_window_word(window_endpoint(bus), address, value).await
}
