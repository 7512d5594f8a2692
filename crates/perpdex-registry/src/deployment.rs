//! Deployment address registry.
//!
//! One JSON document per network under a deployments directory:
//!
//! ```json
//! {
//!   "network": "testnet",
//!   "contracts": {
//!     "position_manager": "C...",
//!     "token": "C..."
//!   }
//! }
//! ```
//!
//! Loading degrades instead of aborting. A missing or malformed file yields an
//! empty registry; bad entries are skipped and the rest are kept. Every problem
//! is logged and returned as an issue.

use crate::address::ContractAddress;
use crate::error::{ConfigurationError, RegistryResult};
use crate::types::{ContractRole, Network};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
struct DeploymentDocument {
    #[serde(default)]
    network: Option<String>,
    contracts: BTreeMap<String, serde_json::Value>,
}

/// Contract addresses for one network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentRegistry {
    network: Network,
    addresses: BTreeMap<ContractRole, ContractAddress>,
}

/// Result of [`DeploymentRegistry::load`].
#[derive(Debug, Clone)]
pub struct LoadedDeployment {
    pub registry: DeploymentRegistry,
    pub issues: Vec<ConfigurationError>,
}

impl LoadedDeployment {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

impl DeploymentRegistry {
    /// Registry with no addresses.
    pub fn empty(network: Network) -> Self {
        Self {
            network,
            addresses: BTreeMap::new(),
        }
    }

    pub fn from_addresses(
        network: Network,
        addresses: impl IntoIterator<Item = (ContractRole, ContractAddress)>,
    ) -> Self {
        Self {
            network,
            addresses: addresses.into_iter().collect(),
        }
    }

    /// Path of the deployment document for `network` under `dir`.
    pub fn document_path(dir: impl AsRef<Path>, network: Network) -> PathBuf {
        dir.as_ref().join(network.file_name())
    }

    /// Load `{dir}/{network}.json`. Never fails; see module docs.
    pub fn load(dir: impl AsRef<Path>, network: Network) -> LoadedDeployment {
        let path = Self::document_path(dir, network);
        let mut issues = Vec::new();

        let registry = match Self::read_document(&path) {
            Ok(document) => {
                if let Some(declared) = document.network.as_deref() {
                    if declared != network.as_str() {
                        warn!(
                            path = %path.display(),
                            declared,
                            expected = %network,
                            "Deployment document declares a different network"
                        );
                    }
                }
                Self::from_document(network, document, &mut issues)
            }
            Err(issue) => {
                issues.push(issue);
                Self::empty(network)
            }
        };

        for issue in &issues {
            warn!(network = %network, issue = %issue, "Deployment configuration issue");
        }
        info!(
            network = %network,
            path = %path.display(),
            contracts = registry.len(),
            issues = issues.len(),
            "Loaded deployment addresses"
        );

        LoadedDeployment { registry, issues }
    }

    fn read_document(path: &Path) -> RegistryResult<DeploymentDocument> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ConfigurationError::MissingFile {
                    path: path.to_path_buf(),
                })
            }
            Err(e) => {
                return Err(ConfigurationError::Malformed {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                })
            }
        };

        serde_json::from_str(&text).map_err(|e| ConfigurationError::Malformed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    fn from_document(
        network: Network,
        document: DeploymentDocument,
        issues: &mut Vec<ConfigurationError>,
    ) -> Self {
        let mut addresses = BTreeMap::new();

        for (key, raw) in document.contracts {
            let role = match key.parse::<ContractRole>() {
                Ok(role) => role,
                Err(issue) => {
                    issues.push(issue);
                    continue;
                }
            };
            let Some(raw) = raw.as_str() else {
                issues.push(ConfigurationError::InvalidAddress {
                    role: key,
                    reason: format!("expected a string, found {raw}"),
                });
                continue;
            };
            match ContractAddress::parse(raw) {
                Ok(address) => {
                    addresses.insert(role, address);
                }
                Err(reason) => issues.push(ConfigurationError::InvalidAddress {
                    role: key,
                    reason,
                }),
            }
        }

        Self { network, addresses }
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn address(&self, role: ContractRole) -> Option<&ContractAddress> {
        self.addresses.get(&role)
    }

    /// Address for `role`, or [`ConfigurationError::MissingRole`].
    pub fn require(&self, role: ContractRole) -> RegistryResult<&ContractAddress> {
        self.address(role)
            .ok_or_else(|| ConfigurationError::MissingRole {
                role: role.to_string(),
                network: self.network.to_string(),
            })
    }

    /// Configured roles with their addresses, in role order.
    pub fn iter(&self) -> impl Iterator<Item = (ContractRole, &ContractAddress)> {
        self.addresses.iter().map(|(role, address)| (*role, address))
    }

    /// Roles without an address.
    pub fn missing_roles(&self) -> Vec<ContractRole> {
        ContractRole::ALL
            .into_iter()
            .filter(|role| !self.addresses.contains_key(role))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const PM: &str = "CDLZFC3SYJYDZT7K67VZ75HPJVIEUVNIXF47ZG2FB2RMQQVU2HHGCYSC";
    const TOKEN: &str = "CAS3J7GYLGXMF6TDJBBYYSE3HQ6BBSMLNUQ34T6TZMYMW2EVH34XOWMA";

    fn write(dir: &TempDir, name: &str, body: &str) {
        fs::write(dir.path().join(name), body).unwrap();
    }

    #[test]
    fn test_load_complete_document() {
        let dir = TempDir::new().unwrap();
        write(
            &dir,
            "testnet.json",
            &format!(
                r#"{{"network":"testnet","contracts":{{"position_manager":"{PM}","token":"{TOKEN}"}}}}"#
            ),
        );

        let loaded = DeploymentRegistry::load(dir.path(), Network::Testnet);
        assert!(loaded.is_clean());
        let registry = loaded.registry;
        assert_eq!(registry.len(), 2);
        assert_eq!(
            registry.require(ContractRole::PositionManager).unwrap().as_str(),
            PM
        );
        assert_eq!(registry.address(ContractRole::Token).unwrap().as_str(), TOKEN);
        assert_eq!(registry.missing_roles().len(), 4);
    }

    #[test]
    fn test_missing_file_gives_empty_registry() {
        let dir = TempDir::new().unwrap();
        let loaded = DeploymentRegistry::load(dir.path(), Network::Mainnet);

        assert!(loaded.registry.is_empty());
        assert_eq!(loaded.issues.len(), 1);
        assert!(matches!(
            &loaded.issues[0],
            ConfigurationError::MissingFile { path } if path.ends_with("mainnet.json")
        ));
        assert_eq!(
            loaded.registry.require(ContractRole::PositionManager),
            Err(ConfigurationError::MissingRole {
                role: "position_manager".to_string(),
                network: "mainnet".to_string(),
            })
        );
    }

    #[test]
    fn test_malformed_json_gives_empty_registry() {
        let dir = TempDir::new().unwrap();
        write(&dir, "testnet.json", "{ not json");

        let loaded = DeploymentRegistry::load(dir.path(), Network::Testnet);
        assert!(loaded.registry.is_empty());
        assert_eq!(loaded.issues.len(), 1);
        assert!(matches!(loaded.issues[0], ConfigurationError::Malformed { .. }));
    }

    #[test]
    fn test_partial_document_keeps_valid_roles() {
        let dir = TempDir::new().unwrap();
        write(
            &dir,
            "testnet.json",
            &format!(
                r#"{{"contracts":{{"position_manager":"{PM}","vault":"{TOKEN}","token":"GBAD"}}}}"#
            ),
        );

        let loaded = DeploymentRegistry::load(dir.path(), Network::Testnet);
        assert_eq!(loaded.registry.len(), 1);
        assert!(loaded.registry.address(ContractRole::PositionManager).is_some());
        assert!(loaded.registry.address(ContractRole::Token).is_none());

        assert_eq!(loaded.issues.len(), 2);
        assert!(loaded
            .issues
            .contains(&ConfigurationError::UnknownRole("vault".to_string())));
        assert!(loaded.issues.iter().any(|issue| matches!(
            issue,
            ConfigurationError::InvalidAddress { role, .. } if role == "token"
        )));
    }

    #[test]
    fn test_non_string_address_skipped() {
        let dir = TempDir::new().unwrap();
        write(
            &dir,
            "testnet.json",
            &format!(r#"{{"contracts":{{"position_manager":"{PM}","token":null,"liquidity_pool":42}}}}"#),
        );

        let loaded = DeploymentRegistry::load(dir.path(), Network::Testnet);
        assert_eq!(loaded.registry.len(), 1);
        assert_eq!(
            loaded.registry.require(ContractRole::PositionManager).unwrap().as_str(),
            PM
        );
        assert_eq!(loaded.issues.len(), 2);
        assert!(loaded.issues.iter().all(|issue| matches!(
            issue,
            ConfigurationError::InvalidAddress { reason, .. } if reason.starts_with("expected a string")
        )));
        assert!(!loaded
            .issues
            .iter()
            .any(|issue| matches!(issue, ConfigurationError::Malformed { .. })));
    }

    #[test]
    fn test_issue_messages() {
        let missing = ConfigurationError::MissingRole {
            role: "token".to_string(),
            network: "testnet".to_string(),
        };
        assert_eq!(missing.to_string(), "No token contract configured for testnet");
    }
}
