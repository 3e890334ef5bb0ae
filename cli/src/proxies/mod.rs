pub mod control_proxy;
pub mod status_proxy;
