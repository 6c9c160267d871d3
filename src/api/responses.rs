use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::*;

#[derive(PartialEq, Debug, Serialize, Deserialize, Clone)]
pub struct UserResponse {
    pub user: UserPubKey,
    pub username: Option<String>,
    pub role: UserRole,
}
#[derive(PartialEq, Debug, Serialize, Deserialize, Clone)]
pub struct PurchaseResponse {
    pub purchase: RowId,
    pub tokens: Tokens,
    pub balance: Decimal,
    pub explorer_url: String,
}
#[derive(PartialEq, Debug, Serialize, Deserialize, Clone)]
pub struct PredictionPage {
    pub predictions: Vec<Prediction>,
    pub page: usize,
    pub total_pages: usize,
    pub total: usize,
}
