use zbus::{Result, proxy};

#[proxy(
    default_service = "io.ucube.gateway",
    interface = "io.ucube.gateway.status",
    default_path = "/io/ucube/gateway/status"
)]
pub trait Status {
    async fn read(&self, endpoint: u32, count: u32) -> Result<Vec<u8>>;
    async fn poll(&self, endpoint: u32) -> Result<u32>;
    async fn get_config(&self, key: &str) -> Result<String>;
    async fn get_platform_variant(&self) -> Result<String>;
    async fn get_bitstream_state(&self) -> Result<String>;
    async fn read_window_word(&self, endpoint: u32, address: u64) -> Result<u32>;
}
