use zbus::{Result, proxy};

#[proxy(
    default_service = "io.ucube.gateway",
    interface = "io.ucube.gateway.control",
    default_path = "/io/ucube/gateway/control"
)]
pub trait Control {
    async fn write(&self, endpoint: u32, offset: u64, data: &[u8]) -> Result<u64>;
    async fn ioctl(&self, endpoint: u32, code: u32) -> Result<u64>;
    async fn map_window(&self, endpoint: u32, offset: u64, length: u64) -> Result<(u64, u64)>;
    async fn set_config(&self, key: &str, value: &str) -> Result<String>;
    async fn reset_bitstream(&self) -> Result<String>;
    async fn write_window_word(&self, endpoint: u32, address: u64, value: u32) -> Result<String>;
}
