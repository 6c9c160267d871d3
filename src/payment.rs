use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use log::trace;
use reqwest::Client;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::api::{DashboardError, Network, PurchaseRequest, TokenPackage, TxSignature};
use crate::wallet::network_config;

pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

/// The transfer a purchase claims to have made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedPayment {
    pub network: Network,
    pub signature: TxSignature,
    /// Solana address that signed and paid.
    pub payer: String,
    pub lamports: u64,
}
impl ExpectedPayment {
    pub fn for_package(request: &PurchaseRequest, package: &TokenPackage) -> Result<Self> {
        let lamports = (package.price_sol * Decimal::from(LAMPORTS_PER_SOL))
            .to_u64()
            .ok_or_else(|| anyhow!("Package {} has no lamport price", package.id))?;
        Ok(Self {
            network: request.network,
            signature: request.signature.clone(),
            payer: request.wallet.trim().to_string(),
            lamports,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentCheck {
    Confirmed,
    Unconfirmed,
    Failed,
    WrongPayer(String),
    WrongRecipient,
    WrongAmount { paid: u64, expected: u64 },
}
impl fmt::Display for PaymentCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Confirmed => write!(f, "confirmed"),
            Self::Unconfirmed => write!(f, "not confirmed"),
            Self::Failed => write!(f, "failed on chain"),
            Self::WrongPayer(payer) => write!(f, "was paid by {}", payer),
            Self::WrongRecipient => write!(f, "did not pay the treasury"),
            Self::WrongAmount { paid, expected } => {
                write!(f, "paid {} lamports instead of {}", paid, expected)
            }
        }
    }
}

#[async_trait]
pub trait PaymentVerifier {
    async fn verify(&self, payment: &ExpectedPayment) -> Result<PaymentCheck>;
}

/// Accepts every signature except the ones explicitly rejected.
#[derive(Debug, Default, Clone)]
pub struct TestPaymentVerifier {
    rejected: Arc<Mutex<HashSet<TxSignature>>>,
}
impl TestPaymentVerifier {
    pub fn reject(&self, signature: &str) {
        if let Ok(mut rejected) = self.rejected.lock() {
            rejected.insert(signature.to_string());
        }
    }
}
#[async_trait]
impl PaymentVerifier for TestPaymentVerifier {
    async fn verify(&self, payment: &ExpectedPayment) -> Result<PaymentCheck> {
        let rejected = self
            .rejected
            .lock()
            .map_err(|_| anyhow!("Payment verifier state is poisoned"))?;
        Ok(if rejected.contains(&payment.signature) {
            PaymentCheck::Unconfirmed
        } else {
            PaymentCheck::Confirmed
        })
    }
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcError>,
}
#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}
#[derive(Debug, Deserialize)]
struct ConfirmedTransaction {
    meta: Option<TransactionMeta>,
    transaction: TransactionBody,
}
#[derive(Debug, Deserialize)]
struct TransactionMeta {
    err: Option<Value>,
}
#[derive(Debug, Deserialize)]
struct TransactionBody {
    message: TransactionMessage,
}
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransactionMessage {
    account_keys: Vec<AccountKey>,
    instructions: Vec<Instruction>,
}
#[derive(Debug, Deserialize)]
struct AccountKey {
    pubkey: String,
    signer: bool,
}
#[derive(Debug, Deserialize)]
struct Instruction {
    program: Option<String>,
    parsed: Option<Value>,
}
#[derive(Debug, Deserialize)]
struct Transfer {
    source: String,
    destination: String,
    lamports: u64,
}

impl ConfirmedTransaction {
    /// Top level system transfers, as `jsonParsed` encodes them.
    fn transfers(&self) -> Vec<Transfer> {
        self.transaction
            .message
            .instructions
            .iter()
            .filter(|instruction| instruction.program.as_deref() == Some("system"))
            .filter_map(|instruction| instruction.parsed.as_ref())
            .filter(|parsed| parsed.get("type").and_then(Value::as_str) == Some("transfer"))
            .filter_map(|parsed| serde_json::from_value(parsed.get("info")?.clone()).ok())
            .collect()
    }
}

fn check_transaction(
    transaction: &ConfirmedTransaction,
    payment: &ExpectedPayment,
    treasury: &str,
) -> PaymentCheck {
    let Some(meta) = &transaction.meta else {
        return PaymentCheck::Unconfirmed;
    };
    if meta.err.is_some() {
        return PaymentCheck::Failed;
    }
    match transaction.transaction.message.account_keys.first() {
        Some(fee_payer) if fee_payer.signer && fee_payer.pubkey == payment.payer => {}
        Some(fee_payer) => return PaymentCheck::WrongPayer(fee_payer.pubkey.clone()),
        None => return PaymentCheck::WrongPayer(String::new()),
    }
    let to_treasury: Vec<_> = transaction
        .transfers()
        .into_iter()
        .filter(|transfer| transfer.source == payment.payer && transfer.destination == treasury)
        .collect();
    if to_treasury.is_empty() {
        return PaymentCheck::WrongRecipient;
    }
    let paid: u64 = to_treasury.iter().map(|transfer| transfer.lamports).sum();
    if paid < payment.lamports {
        return PaymentCheck::WrongAmount {
            paid,
            expected: payment.lamports,
        };
    }
    PaymentCheck::Confirmed
}

/// Resolves the transaction on the cluster's RPC endpoint and checks that it
/// moved the package price from the payer to the treasury.
#[derive(Debug, Clone)]
pub struct SolanaRpcVerifier {
    client: Client,
    treasury: Option<String>,
}
impl SolanaRpcVerifier {
    pub fn new(timeout: Duration, treasury: Option<String>) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, treasury })
    }
}
#[async_trait]
impl PaymentVerifier for SolanaRpcVerifier {
    async fn verify(&self, payment: &ExpectedPayment) -> Result<PaymentCheck> {
        let Some(treasury) = self.treasury.as_deref() else {
            return Err(DashboardError::Validation(
                "Token purchases are disabled, no treasury is configured".into(),
            )
            .into());
        };
        let request = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "getTransaction",
            "params": [
                payment.signature,
                {
                    "encoding": "jsonParsed",
                    "commitment": "confirmed",
                    "maxSupportedTransactionVersion": 0
                }
            ],
        });
        let response = self
            .client
            .post(network_config(payment.network).rpc_url)
            .json(&request)
            .send()
            .await?
            .json::<RpcResponse<ConfirmedTransaction>>()
            .await?;
        if let Some(error) = response.error {
            bail!("RPC error {}: {}", error.code, error.message)
        }
        let check = match response.result {
            Some(transaction) => check_transaction(&transaction, payment, treasury),
            None => PaymentCheck::Unconfirmed,
        };
        trace!(
            "Payment {} on {}: {}",
            payment.signature,
            payment.network,
            check
        );
        Ok(check)
    }
}
