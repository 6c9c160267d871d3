use crate::api::*;
use crate::api_keys::KeyStore;
use crate::db::DB;
use crate::leaderboard::leaderboard_page;
use crate::payment::{ExpectedPayment, PaymentCheck, PaymentVerifier};
use crate::predictions::{
    effective_min_confidence, fetch_predictions, PredictionFilters, PredictionSource,
};
use crate::wallet::{explorer_url, token_package, token_packages, ExplorerKind};
use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use log::{debug, trace, warn};
use secp256k1::ecdsa::Signature;
use secp256k1::hashes::sha256::Hash;
use secp256k1::rand::distributions::Alphanumeric;
use secp256k1::rand::Rng;
use secp256k1::{rand, Message};
use serde_json::json;
use std::str::FromStr;
use std::sync::Arc;

pub const SESSION_DAYS: i64 = 7;

pub struct Dashboard {
    db: Arc<Box<dyn DB + Send + Sync>>,
    verifier: Arc<Box<dyn PaymentVerifier + Send + Sync>>,
    test: bool,
}

impl Dashboard {
    pub async fn new(
        db: Box<dyn DB + Send + Sync>,
        verifier: Box<dyn PaymentVerifier + Send + Sync>,
        admins: Vec<String>,
        test: bool,
    ) -> Result<Self> {
        let me = Self {
            db: Arc::new(db),
            verifier: Arc::new(verifier),
            test,
        };
        for admin in admins {
            me.db
                .update_user_role(UserPubKey::from_str(admin.as_str())?, UserRole::Root)
                .await?;
        }
        Ok(me)
    }

    pub async fn new_prediction(
        &self,
        prediction: NewPredictionRequest,
        access: AccessRequest,
    ) -> Result<RowId> {
        self.check_admin(access).await?;
        prediction.validate()?;
        let id = self.db.add_prediction(prediction).await?;
        debug!("Created prediction {}", id);
        Ok(id)
    }
    pub async fn get_predictions(&self, filters: PredictionFilters) -> Result<Vec<Prediction>> {
        fetch_predictions(&**self.db, &filters, Utc::now()).await
    }
    /// Raw table query with the confidence floor enforced.
    pub async fn query_predictions(&self, mut query: PredictionQuery) -> Result<Vec<Prediction>> {
        query.min_confidence = effective_min_confidence(Some(query.min_confidence));
        self.db.query_predictions(&query).await
    }

    pub async fn get_api_keys(&self, access: AccessRequest) -> Result<Vec<ApiKeyRecord>> {
        self.check_admin(access).await?;
        self.db.get_api_keys().await
    }
    pub async fn get_api_keys_by_category(
        &self,
        category: KeyCategory,
        access: AccessRequest,
    ) -> Result<Vec<ApiKeyRecord>> {
        self.check_admin(access).await?;
        self.db.get_api_keys_by_category(category).await
    }
    pub async fn get_api_keys_by_provider(
        &self,
        provider: String,
        access: AccessRequest,
    ) -> Result<Vec<ApiKeyRecord>> {
        self.check_admin(access).await?;
        self.db.get_api_keys_by_provider(provider.as_str()).await
    }
    pub async fn log_api_key_action(
        &self,
        entry: NewAuditEntry,
        access: AccessRequest,
    ) -> Result<()> {
        self.check_admin(access).await?;
        self.db.log_api_key_action(entry).await
    }
    pub async fn create_api_key(&self, key: NewApiKey, access: AccessRequest) -> Result<RowId> {
        self.check_admin(access).await?;
        key.validate()?;
        let changes = json!({
            "name": key.name,
            "category": key.category,
            "provider_type": key.provider_type,
        });
        let id = self.db.insert_api_key(key).await?;
        let entry = NewAuditEntry {
            key_id: id,
            action: AuditAction::Create,
            changes,
        };
        if let Err(e) = self.db.log_api_key_action(entry).await {
            warn!("Couldn't log creation of API key {}: {:#}", id, e);
        }
        debug!("Created API key {}", id);
        Ok(id)
    }
    pub async fn update_api_key(
        &self,
        request: UpdateApiKeyRequest,
        access: AccessRequest,
    ) -> Result<()> {
        self.check_admin(access).await?;
        if request.update.is_empty() {
            return Err(DashboardError::Validation("Nothing to update".into()).into());
        }
        self.db.update_api_key(request.id, request.update).await?;
        debug!("Updated API key {}", request.id);
        Ok(())
    }
    pub async fn delete_api_key(&self, id: RowId, access: AccessRequest) -> Result<()> {
        self.check_admin(access).await?;
        self.db.delete_api_key(id).await?;
        debug!("Deleted API key {}", id);
        Ok(())
    }
    pub async fn get_api_key_audit_log(
        &self,
        key: RowId,
        access: AccessRequest,
    ) -> Result<Vec<AuditEntry>> {
        self.check_admin(access).await?;
        self.db.get_api_key_audit_log(key).await
    }

    /// Admins skip the review queue: their changes are stored as approved
    /// with themselves as reviewer.
    pub async fn submit_change(
        &self,
        change: NewChange,
        access: Option<AccessRequest>,
    ) -> Result<RowId> {
        let access = access.ok_or(DashboardError::Unauthenticated)?;
        change.validate()?;
        let user = access.user;
        let role = self.check_access(access).await?;
        let id = match role {
            UserRole::User => {
                self.db
                    .add_change(user, change, ChangeStatus::Pending, None)
                    .await?
            }
            UserRole::Admin | UserRole::Root => {
                self.db
                    .add_change(user, change, ChangeStatus::Approved, Some(user))
                    .await?
            }
        };
        debug!("User {} submitted change {} as {}", user, id, role);
        Ok(id)
    }
    pub async fn review_change(
        &self,
        review: ReviewChangeRequest,
        access: AccessRequest,
    ) -> Result<()> {
        let reviewer = access.user;
        self.check_admin(access).await?;
        let change = self.db.get_change(review.change).await?;
        if change.status != ChangeStatus::Pending {
            return Err(DashboardError::Validation(format!(
                "Change {} was already {}",
                change.id, change.status
            ))
            .into());
        }
        let status = if review.approve {
            ChangeStatus::Approved
        } else {
            ChangeStatus::Rejected
        };
        self.db
            .set_change_status(review.change, status, reviewer, review.comments)
            .await?;
        debug!("Change {} {} by {}", review.change, status, reviewer);
        Ok(())
    }
    pub async fn get_changes(
        &self,
        status: Option<ChangeStatus>,
        access: AccessRequest,
    ) -> Result<Vec<PendingChange>> {
        self.check_admin(access).await?;
        self.db.get_changes(status).await
    }

    pub async fn get_leaderboard(&self, request: LeaderboardRequest) -> Result<Vec<LeaderboardUser>> {
        let users = self.db.get_leaderboard_users().await?;
        trace!("Ranking {} users", users.len());
        Ok(leaderboard_page(users, request.page, request.limit))
    }
    pub async fn record_prediction_result(
        &self,
        result: PredictionResultRequest,
        access: AccessRequest,
    ) -> Result<()> {
        self.check_admin(access).await?;
        self.db
            .record_prediction_result(result.user, result.correct)
            .await
    }

    pub fn get_token_packages(&self) -> Vec<TokenPackage> {
        token_packages()
    }
    pub async fn purchase_tokens(
        &self,
        request: PurchaseRequest,
        access: AccessRequest,
    ) -> Result<PurchaseResponse> {
        let package_id = request.validate()?;
        let package = token_package(package_id).ok_or_else(|| {
            DashboardError::Validation(format!("Unknown token package {}", package_id))
        })?;
        let user = access.user;
        self.check_access(access).await?;
        if self.db.has_purchase(&request.signature).await? {
            return Err(DashboardError::Validation(format!(
                "Transaction {} was already redeemed",
                request.signature
            ))
            .into());
        }
        let payment = ExpectedPayment::for_package(&request, &package)?;
        let check = self
            .verifier
            .verify(&payment)
            .await
            .context("couldn't confirm payment")?;
        if check != PaymentCheck::Confirmed {
            return Err(DashboardError::Validation(format!(
                "Transaction {} on {} {}",
                request.signature, request.network, check
            ))
            .into());
        }
        let (purchase, balance) = self
            .db
            .record_purchase(user, &package, request.network, request.signature.clone())
            .await?;
        debug!(
            "User {} bought {} tokens with {}",
            user, package.tokens, request.signature
        );
        Ok(PurchaseResponse {
            purchase,
            tokens: package.tokens,
            balance,
            explorer_url: explorer_url(request.network, ExplorerKind::Tx, &request.signature),
        })
    }
    pub async fn get_purchases(&self, access: AccessRequest) -> Result<Vec<TokenPurchase>> {
        let user = access.user;
        self.check_access(access).await?;
        self.db.get_purchases(user).await
    }

    pub async fn check_access(&self, access: AccessRequest) -> Result<UserRole> {
        if self.test {
            return Ok(UserRole::Root);
        }
        let (db_sig, challenge, last_access) = self
            .db
            .get_last_access(access.user)
            .await
            .context("Error getting session from db")?;
        if access.sig != db_sig || access.challenge != challenge {
            debug!(
                "User {} tried to access with invalid access token",
                access.user
            );
            return Err(DashboardError::Unauthenticated.into());
        }
        if last_access < Utc::now() - Duration::days(SESSION_DAYS) {
            debug!(
                "User {} tried to access after more than {} days",
                access.user, SESSION_DAYS
            );
            return Err(DashboardError::Unauthenticated.into());
        }
        let role = self.db.get_user_role(access.user).await?;
        Ok(role)
    }
    pub async fn check_admin(&self, access: AccessRequest) -> Result<UserRole> {
        match self.check_access(access).await? {
            UserRole::User => {
                Err(DashboardError::AccessDenied("Only admins can do this".into()).into())
            }
            role => Ok(role),
        }
    }
    pub async fn check_access_for_user(
        &self,
        user: UserPubKey,
        access: AccessRequest,
    ) -> Result<()> {
        if let UserRole::User = self.check_access(access.clone()).await? {
            if user != access.user {
                return Err(DashboardError::AccessDenied(
                    "Cannot issue request on behalf of other users".into(),
                )
                .into());
            }
        }
        Ok(())
    }
    pub async fn create_login_challenge(&mut self, user: UserPubKey) -> Result<String> {
        let challenge: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(30)
            .map(char::from)
            .collect();
        trace!("Generated login challenge {}", challenge);
        self.db.update_login_challenge(user, challenge.clone()).await?;
        Ok(challenge)
    }
    pub async fn try_login(
        &mut self,
        user: UserPubKey,
        sig: Signature,
        challenge: String,
    ) -> Result<()> {
        let issued = self
            .db
            .get_login_challenge(user)
            .await
            .map_err(|_| DashboardError::Unauthenticated)?;
        if issued != challenge {
            return Err(DashboardError::Unauthenticated.into());
        }
        sig.verify(
            &Message::from_hashed_data::<Hash>(challenge.as_bytes()),
            &user,
        )
        .map_err(|_| DashboardError::Unauthenticated)?;
        self.db.update_access_token(user, sig).await?;
        debug!("User {} logged in", user);
        Ok(())
    }
    pub async fn update_user(
        &self,
        user: UserPubKey,
        name: Option<String>,
        access: AccessRequest,
    ) -> Result<()> {
        self.check_access_for_user(user, access).await?;
        if let Some(name) = name {
            self.db.update_username(user, name).await?;
        }
        Ok(())
    }
    pub async fn get_user(&self, user: UserPubKey, access: AccessRequest) -> Result<UserResponse> {
        self.check_access_for_user(user, access).await?;
        self.db.get_user(user).await
    }
}
