use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub type UserPubKey = secp256k1::PublicKey;
pub type RowId = i64;
pub type Tokens = u64;
pub type TxSignature = String;

/// Predictions below this confidence are never surfaced to callers.
pub const MIN_CONFIDENCE: u8 = 85;
pub const PAGE_SIZE: usize = 6;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Prediction {
    pub id: RowId,
    pub sport: String,
    pub competition: String,
    pub match_date: DateTime<Utc>,
    pub team_a: String,
    pub team_b: String,
    pub predicted_outcome: String,
    pub confidence: u8,
    pub explanation: String,
    pub price: Decimal,
    pub is_free: bool,
    pub match_id: Option<String>,
    pub league_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum KeyCategory {
    Blockchain,
    Explorer,
    CryptoData,
    Defi,
    Wallet,
    Other,
}
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum KeyStatus {
    Active,
    Inactive,
}
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiKeyRecord {
    pub id: RowId,
    pub name: String,
    pub key_value: String,
    pub category: KeyCategory,
    pub status: KeyStatus,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_required: bool,
    pub provider_type: Option<String>,
}
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewApiKey {
    pub name: String,
    pub key_value: String,
    pub category: KeyCategory,
    pub status: KeyStatus,
    pub description: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_required: bool,
    pub provider_type: Option<String>,
}
/// Partial update of a key. Only the fields that are set get written.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ApiKeyUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<KeyCategory>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<KeyStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_required: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_type: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
}
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewAuditEntry {
    pub key_id: RowId,
    pub action: AuditAction,
    pub changes: Value,
}
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditEntry {
    pub id: RowId,
    pub key_id: RowId,
    pub action: AuditAction,
    pub changes: Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChangeStatus {
    Pending,
    Approved,
    Rejected,
}
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewChange {
    pub table_name: String,
    pub record_id: String,
    pub changes: Map<String, Value>,
}
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PendingChange {
    pub id: RowId,
    pub submitter: UserPubKey,
    pub table_name: String,
    pub record_id: String,
    pub changes: Map<String, Value>,
    pub status: ChangeStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub reviewer: Option<UserPubKey>,
    pub comments: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LeaderboardUser {
    pub user: UserPubKey,
    pub username: Option<String>,
    pub correct_predictions: u32,
    pub total_predictions: u32,
    pub token_balance: Decimal,
    pub locked_tokens: Decimal,
    pub rank: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum Network {
    MainnetBeta,
    Testnet,
    Devnet,
}
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TokenPackage {
    pub id: u32,
    pub tokens: Tokens,
    pub price_sol: Decimal,
    pub label: String,
}
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TokenPurchase {
    pub id: RowId,
    pub user: UserPubKey,
    pub package: u32,
    pub tokens: Tokens,
    pub price_sol: Decimal,
    pub network: Network,
    pub signature: TxSignature,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum UserRole {
    User,
    Admin,
    Root,
}
