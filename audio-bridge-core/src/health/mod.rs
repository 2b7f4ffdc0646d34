pub mod component;
pub mod supervisor;
