use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use secp256k1::ecdsa;
use serde::{Deserialize, Serialize};

use super::*;

// Requests
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct AccessRequest {
    pub user: UserPubKey,
    pub challenge: String,
    pub sig: ecdsa::Signature,
}
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PostRequest<T> {
    pub access: AccessRequest,
    pub data: T,
}
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoginRequest {
    pub user: UserPubKey,
    pub challenge: String,
    pub sig: ecdsa::Signature,
}
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct UpdateUserRequest {
    pub user: UserPubKey,
    pub username: Option<String>,
}
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct NewPredictionRequest {
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
}
/// What the prediction table can answer on its own: equality on sport and
/// competition, a confidence floor and a match date range.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq, Hash, Default)]
pub struct PredictionQuery {
    pub sport: Option<String>,
    pub league: Option<String>,
    pub min_confidence: u8,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct UpdateApiKeyRequest {
    pub id: RowId,
    pub update: ApiKeyUpdate,
}
/// Change submissions carry their access optionally so that a missing
/// session is answered with 401 instead of a body parse error.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SubmitChangeRequest {
    pub access: Option<AccessRequest>,
    pub data: NewChange,
}
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ReviewChangeRequest {
    pub change: RowId,
    pub approve: bool,
    pub comments: Option<String>,
}
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct LeaderboardRequest {
    pub page: u32,
    pub limit: u32,
}
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PredictionResultRequest {
    pub user: UserPubKey,
    pub correct: bool,
}
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PurchaseRequest {
    pub package: Option<u32>,
    pub network: Network,
    pub signature: TxSignature,
    /// Solana address the payment was sent from
    pub wallet: String,
}
