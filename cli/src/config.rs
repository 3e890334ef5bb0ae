use crate::proxies::control_proxy;
use crate::status::call_get_config;
use zbus::Connection;

async fn call_set_config(key: &str, value: &str) -> Result<String, zbus::Error> {
    let connection = Connection::system().await?;
    let proxy = control_proxy::ControlProxy::new(&connection).await?;
    proxy.set_config(key, value).await
}

pub async fn get_handler(key: &str) -> Result<String, zbus::Error> {
    Ok(call_get_config(key).await?.trim_end().to_string())
}

pub async fn set_handler(key: &str, value: &str) -> Result<String, zbus::Error> {
    call_set_config(key, value).await
}
