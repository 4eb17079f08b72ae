//! dog-core: tenant identity and layered configuration shared by DogRS crates.

pub mod config;
pub mod tenant;

pub use config::{DogConfig, DogConfigSnapshot};
pub use tenant::{TenantContext, TenantId, TenantSource};
