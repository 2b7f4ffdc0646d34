pub mod bridge;
pub mod stop_signal;
