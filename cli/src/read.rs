use crate::DATA_ENDPOINT;
use crate::proxies::status_proxy;
use crate::status::call_get_config;
use std::fmt::Write;
use zbus::Connection;

async fn call_read(endpoint: u32, count: u32) -> Result<Vec<u8>, zbus::Error> {
    let connection = Connection::system().await?;
    let proxy = status_proxy::StatusProxy::new(&connection).await?;
    proxy.read(endpoint, count).await
}

/// Sixteen bytes per line, prefixed with the offset of the first one.
fn hex_dump(bytes: &[u8]) -> String {
    let mut dump = String::new();
    for (line, chunk) in bytes.chunks(16).enumerate() {
        let _ = write!(dump, "{:08x}:", line * 16);
        for byte in chunk {
            let _ = write!(dump, " {byte:02x}");
        }
        dump.push('\n');
    }
    dump
}

async fn default_count() -> Result<u32, zbus::Error> {
    let size = call_get_config("dma_buffer_size").await?;
    size.trim()
        .parse::<u32>()
        .map_err(|e| zbus::Error::Failure(format!("daemon reported buffer size {size:?}: {e}")))
}

pub async fn read_handler(
    count: Option<u32>,
    output: &Option<String>,
) -> Result<String, zbus::Error> {
    let count = match count {
        Some(c) => c,
        None => default_count().await?,
    };
    let bytes = call_read(DATA_ENDPOINT, count).await?;
    match output {
        Some(path) => {
            tokio::fs::write(path, &bytes)
                .await
                .map_err(|e| zbus::Error::Failure(format!("cannot write {path}: {e}")))?;
            Ok(format!("{} bytes written to {path}", bytes.len()))
        }
        None if bytes.is_empty() => Ok("no new data".to_string()),
        None => Ok(hex_dump(&bytes).trim_end().to_string()),
    }
}
