pub mod bridge_delegate;
pub mod capture_source;
pub mod client_sink;
pub mod encoder;
