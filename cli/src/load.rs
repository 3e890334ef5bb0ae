use crate::BITSTREAM_ENDPOINT;
use crate::proxies::control_proxy;
use log::{debug, info};
use zbus::Connection;

/// PROGRAM_FPGA on the bitstream endpoint.
const PROGRAM_FPGA: u32 = 3;

async fn call_reset_bitstream() -> Result<String, zbus::Error> {
    let connection = Connection::system().await?;
    let proxy = control_proxy::ControlProxy::new(&connection).await?;
    proxy.reset_bitstream().await
}

/// Upload `image` from offset zero in `chunk_size` pieces, then program it.
async fn upload_and_program(image: &[u8], chunk_size: usize) -> Result<u64, zbus::Error> {
    let connection = Connection::system().await?;
    let proxy = control_proxy::ControlProxy::new(&connection).await?;
    proxy.reset_bitstream().await?;
    let mut offset = 0u64;
    for chunk in image.chunks(chunk_size) {
        let accepted = proxy.write(BITSTREAM_ENDPOINT, offset, chunk).await?;
        debug!("uploaded {accepted} bytes at {offset}");
        offset += accepted;
    }
    proxy.ioctl(BITSTREAM_ENDPOINT, PROGRAM_FPGA).await
}

pub async fn load_handler(file: &str, chunk_size: usize) -> Result<String, zbus::Error> {
    if chunk_size == 0 {
        return Err(zbus::Error::Failure("chunk size must be non-zero".into()));
    }
    let image = tokio::fs::read(file)
        .await
        .map_err(|e| zbus::Error::Failure(format!("cannot read {file}: {e}")))?;
    if image.is_empty() {
        return Err(zbus::Error::Failure(format!("{file} is empty")));
    }
    info!("loading {} byte bitstream from {file}", image.len());
    let programmed = upload_and_program(&image, chunk_size).await?;
    Ok(format!("{file} loaded: {programmed} bytes programmed"))
}

pub async fn reset_handler() -> Result<String, zbus::Error> {
    call_reset_bitstream().await
}
