use std::{
    fmt::{Display, Formatter},
    str::FromStr,
};

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};

use super::*;

impl KeyCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Blockchain => "blockchain",
            Self::Explorer => "explorer",
            Self::CryptoData => "crypto_data",
            Self::Defi => "defi",
            Self::Wallet => "wallet",
            Self::Other => "other",
        }
    }
}
impl Display for KeyCategory {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
// The category set is open: anything unknown is filed under "other".
impl FromStr for KeyCategory {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s {
            "blockchain" => Self::Blockchain,
            "explorer" => Self::Explorer,
            "crypto_data" => Self::CryptoData,
            "defi" => Self::Defi,
            "wallet" => Self::Wallet,
            _ => Self::Other,
        })
    }
}
impl Display for KeyStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let output = match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
        };
        write!(f, "{}", output)
    }
}
impl FromStr for KeyStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "inactive" => Ok(Self::Inactive),
            e => bail!("Couldn't deserialize to KeyStatus: {}", e),
        }
    }
}
impl Display for AuditAction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let output = match self {
            Self::Create => "CREATE",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        };
        write!(f, "{}", output)
    }
}
impl FromStr for AuditAction {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "CREATE" => Ok(Self::Create),
            "UPDATE" => Ok(Self::Update),
            "DELETE" => Ok(Self::Delete),
            e => bail!("Couldn't deserialize to AuditAction: {}", e),
        }
    }
}
impl Display for ChangeStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let output = match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        };
        write!(f, "{}", output)
    }
}
impl FromStr for ChangeStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            e => bail!("Couldn't deserialize to ChangeStatus: {}", e),
        }
    }
}
impl Display for Network {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let output = match self {
            Self::MainnetBeta => "mainnet-beta",
            Self::Testnet => "testnet",
            Self::Devnet => "devnet",
        };
        write!(f, "{}", output)
    }
}
impl FromStr for Network {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "mainnet-beta" => Ok(Self::MainnetBeta),
            "testnet" => Ok(Self::Testnet),
            "devnet" => Ok(Self::Devnet),
            e => bail!("Unknown network: {}", e),
        }
    }
}
impl Display for UserRole {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let output = match self {
            Self::User => "User",
            Self::Admin => "Admin",
            Self::Root => "Root",
        };
        write!(f, "{}", output)
    }
}
impl FromStr for UserRole {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "User" => Ok(Self::User),
            "Admin" => Ok(Self::Admin),
            "Root" => Ok(Self::Root),
            e => bail!("Couldn't deserialize to UserRole: {}", e),
        }
    }
}
impl Default for UserRole {
    fn default() -> Self {
        UserRole::User
    }
}

impl ApiKeyRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(expiry) if expiry < now)
    }
}
impl ApiKeyUpdate {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}
impl NewApiKey {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(DashboardError::Validation("API key name must not be empty".into()).into());
        }
        if self.key_value.is_empty() {
            return Err(DashboardError::Validation("API key value must not be empty".into()).into());
        }
        Ok(())
    }
}
impl NewPredictionRequest {
    pub fn validate(&self) -> Result<()> {
        if self.confidence > 100 {
            return Err(DashboardError::Validation(format!(
                "Confidence {} is not a percentage",
                self.confidence
            ))
            .into());
        }
        if self.team_a.trim().is_empty() || self.team_b.trim().is_empty() {
            return Err(DashboardError::Validation("Both teams need a name".into()).into());
        }
        if self.sport.trim().is_empty() {
            return Err(DashboardError::Validation("Sport must not be empty".into()).into());
        }
        Ok(())
    }
}
impl PurchaseRequest {
    /// Rejects a purchase before anything is sent or stored.
    pub fn validate(&self) -> Result<u32> {
        let Some(package) = self.package else {
            return Err(DashboardError::Validation("Please select an amount of tokens".into()).into());
        };
        if self.signature.trim().is_empty() {
            return Err(DashboardError::Validation("Missing transaction signature".into()).into());
        }
        if self.wallet.trim().is_empty() {
            return Err(DashboardError::Validation("Missing paying wallet".into()).into());
        }
        Ok(package)
    }
}
impl NewChange {
    pub fn validate(&self) -> Result<()> {
        if self.table_name.trim().is_empty() || self.record_id.trim().is_empty() {
            return Err(DashboardError::Validation("A change needs a target table and record".into()).into());
        }
        if self.changes.is_empty() {
            return Err(DashboardError::Validation("A change needs at least one field".into()).into());
        }
        Ok(())
    }
}
