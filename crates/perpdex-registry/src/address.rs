//! Contract addresses.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Length of a contract ID in strkey form.
pub const CONTRACT_ADDRESS_LEN: usize = 56;

/// A Soroban contract ID (`C...`, 56 base32 characters).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContractAddress(String);

impl ContractAddress {
    /// Validate shape only; the strkey checksum is not verified.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let raw = raw.trim();
        if raw.len() != CONTRACT_ADDRESS_LEN {
            return Err(format!(
                "expected {CONTRACT_ADDRESS_LEN} characters, got {}",
                raw.len()
            ));
        }
        if !raw.starts_with('C') {
            return Err("contract IDs start with 'C'".to_string());
        }
        if let Some(bad) = raw.chars().find(|c| !matches!(c, 'A'..='Z' | '2'..='7')) {
            return Err(format!("'{bad}' is not in the base32 alphabet"));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Shortened form for logs (`CABC…WXYZ`).
    pub fn short(&self) -> String {
        format!("{}…{}", &self.0[..4], &self.0[CONTRACT_ADDRESS_LEN - 4..])
    }
}

impl fmt::Display for ContractAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ContractAddress {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ContractAddress {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ContractAddress> for String {
    fn from(address: ContractAddress) -> Self {
        address.0
    }
}
