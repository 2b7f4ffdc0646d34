pub mod distributor;
pub mod tee;
