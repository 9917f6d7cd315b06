pub mod cloud_controller;
pub mod credentials;
pub mod service;

pub use credentials::{Credentials, CredentialsError};
pub use service::{CredentialGrant, ServiceInstance};
