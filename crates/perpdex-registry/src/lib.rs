//! Deployment configuration for the perpdex client.
//!
//! Maps contract roles to deployed contract addresses per network, loaded
//! once at startup from `deployments/{network}.json`.

pub mod address;
pub mod deployment;
pub mod error;
pub mod types;

pub use address::{ContractAddress, CONTRACT_ADDRESS_LEN};
pub use deployment::{DeploymentRegistry, LoadedDeployment};
pub use error::{ConfigurationError, RegistryResult};
pub use types::{ContractRole, Network};
