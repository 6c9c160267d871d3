use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::{Response, StatusCode};
use serde::Serialize;

use crate::api::*;
use crate::api_keys::KeyStore;
use crate::predictions::{PredictionFilters, PredictionSource};

#[derive(Debug, Clone)]
pub struct Client {
    url: String,
    client: reqwest::Client,
}
impl Client {
    pub fn new(url: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { url, client })
    }
    async fn post(
        &self,
        path: &'static str,
        request: impl Serialize,
        expected_code: StatusCode,
    ) -> Result<Response> {
        let response = self
            .client
            .post(self.url.clone() + path)
            .json(&request)
            .send()
            .await?;
        bail_if_err(response, expected_code).await
    }
    async fn get(&self, path: &'static str, expected_code: StatusCode) -> Result<Response> {
        let response = self.client.get(self.url.clone() + path).send().await?;
        bail_if_err(response, expected_code).await
    }
    pub async fn new_prediction(
        &self,
        request: NewPredictionRequest,
        access: AccessRequest,
    ) -> Result<RowId> {
        let response = self
            .post(
                "/new_prediction",
                PostRequest {
                    data: request,
                    access,
                },
                StatusCode::CREATED,
            )
            .await?;
        Ok(response.json().await?)
    }
    pub async fn get_predictions(&self, filters: &PredictionFilters) -> Result<Vec<Prediction>> {
        let response = self
            .post("/get_predictions", filters, StatusCode::OK)
            .await?;
        Ok(response.json().await?)
    }
    pub async fn get_api_keys(&self, access: AccessRequest) -> Result<Vec<ApiKeyRecord>> {
        let response = self
            .post(
                "/get_api_keys",
                PostRequest { data: (), access },
                StatusCode::OK,
            )
            .await?;
        Ok(response.json().await?)
    }
    pub async fn get_api_keys_by_category(
        &self,
        category: KeyCategory,
        access: AccessRequest,
    ) -> Result<Vec<ApiKeyRecord>> {
        let response = self
            .post(
                "/get_api_keys_by_category",
                PostRequest {
                    data: category,
                    access,
                },
                StatusCode::OK,
            )
            .await?;
        Ok(response.json().await?)
    }
    pub async fn get_api_keys_by_provider(
        &self,
        provider: String,
        access: AccessRequest,
    ) -> Result<Vec<ApiKeyRecord>> {
        let response = self
            .post(
                "/get_api_keys_by_provider",
                PostRequest {
                    data: provider,
                    access,
                },
                StatusCode::OK,
            )
            .await?;
        Ok(response.json().await?)
    }
    pub async fn log_api_key_action(
        &self,
        entry: NewAuditEntry,
        access: AccessRequest,
    ) -> Result<()> {
        self.post(
            "/log_api_key_action",
            PostRequest {
                data: entry,
                access,
            },
            StatusCode::CREATED,
        )
        .await?;
        Ok(())
    }
    pub async fn create_api_key(&self, key: NewApiKey, access: AccessRequest) -> Result<RowId> {
        let response = self
            .post(
                "/create_api_key",
                PostRequest { data: key, access },
                StatusCode::CREATED,
            )
            .await?;
        Ok(response.json().await?)
    }
    pub async fn update_api_key(
        &self,
        request: UpdateApiKeyRequest,
        access: AccessRequest,
    ) -> Result<()> {
        self.post(
            "/update_api_key",
            PostRequest {
                data: request,
                access,
            },
            StatusCode::OK,
        )
        .await?;
        Ok(())
    }
    pub async fn delete_api_key(&self, id: RowId, access: AccessRequest) -> Result<()> {
        self.post(
            "/delete_api_key",
            PostRequest { data: id, access },
            StatusCode::OK,
        )
        .await?;
        Ok(())
    }
    pub async fn get_api_key_audit_log(
        &self,
        key: RowId,
        access: AccessRequest,
    ) -> Result<Vec<AuditEntry>> {
        let response = self
            .post(
                "/get_api_key_audit_log",
                PostRequest { data: key, access },
                StatusCode::OK,
            )
            .await?;
        Ok(response.json().await?)
    }
    /// Without a session nothing is sent.
    pub async fn submit_change(
        &self,
        change: NewChange,
        access: Option<AccessRequest>,
    ) -> Result<RowId> {
        if access.is_none() {
            return Err(DashboardError::Unauthenticated.into());
        }
        let response = self
            .post(
                "/submit_change",
                SubmitChangeRequest {
                    access,
                    data: change,
                },
                StatusCode::CREATED,
            )
            .await?;
        Ok(response.json().await?)
    }
    pub async fn review_change(
        &self,
        review: ReviewChangeRequest,
        access: AccessRequest,
    ) -> Result<()> {
        self.post(
            "/review_change",
            PostRequest {
                data: review,
                access,
            },
            StatusCode::OK,
        )
        .await?;
        Ok(())
    }
    pub async fn get_changes(
        &self,
        status: Option<ChangeStatus>,
        access: AccessRequest,
    ) -> Result<Vec<PendingChange>> {
        let response = self
            .post(
                "/get_changes",
                PostRequest {
                    data: status,
                    access,
                },
                StatusCode::OK,
            )
            .await?;
        Ok(response.json().await?)
    }
    pub async fn get_leaderboard(&self, request: LeaderboardRequest) -> Result<Vec<LeaderboardUser>> {
        let response = self
            .post("/get_leaderboard", request, StatusCode::OK)
            .await?;
        Ok(response.json().await?)
    }
    pub async fn record_prediction_result(
        &self,
        request: PredictionResultRequest,
        access: AccessRequest,
    ) -> Result<()> {
        self.post(
            "/record_prediction_result",
            PostRequest {
                data: request,
                access,
            },
            StatusCode::OK,
        )
        .await?;
        Ok(())
    }
    pub async fn get_token_packages(&self) -> Result<Vec<TokenPackage>> {
        let response = self.get("/get_token_packages", StatusCode::OK).await?;
        Ok(response.json().await?)
    }
    pub async fn purchase_tokens(
        &self,
        request: PurchaseRequest,
        access: AccessRequest,
    ) -> Result<PurchaseResponse> {
        request.validate()?;
        let response = self
            .post(
                "/purchase_tokens",
                PostRequest {
                    data: request,
                    access,
                },
                StatusCode::OK,
            )
            .await?;
        Ok(response.json().await?)
    }
    pub async fn get_purchases(&self, access: AccessRequest) -> Result<Vec<TokenPurchase>> {
        let response = self
            .post(
                "/get_purchases",
                PostRequest { data: (), access },
                StatusCode::OK,
            )
            .await?;
        Ok(response.json().await?)
    }
    pub async fn create_login_challenge(&self, user: UserPubKey) -> Result<String> {
        let response = self
            .post("/get_login_challenge", user, StatusCode::OK)
            .await?;
        Ok(response.text().await?)
    }
    pub async fn try_login(&self, request: LoginRequest) -> Result<()> {
        self.post("/try_login", request, StatusCode::OK).await?;
        Ok(())
    }
    pub async fn check_login(&self, access: AccessRequest) -> Result<()> {
        self.post("/check_login", access, StatusCode::OK).await?;
        Ok(())
    }
    pub async fn update_user(
        &self,
        request: UpdateUserRequest,
        access: AccessRequest,
    ) -> Result<()> {
        self.post(
            "/update_user",
            PostRequest {
                data: request,
                access,
            },
            StatusCode::OK,
        )
        .await?;
        Ok(())
    }
    pub async fn get_user(&self, user: UserPubKey, access: AccessRequest) -> Result<UserResponse> {
        let response = self
            .post(
                "/get_user",
                PostRequest { data: user, access },
                StatusCode::OK,
            )
            .await?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl PredictionSource for Client {
    async fn query_predictions(&self, query: &PredictionQuery) -> Result<Vec<Prediction>> {
        let response = self
            .post("/query_predictions", query, StatusCode::OK)
            .await?;
        Ok(response.json().await?)
    }
}

/// The key vault endpoints bound to one admin session.
#[derive(Debug, Clone)]
pub struct VaultClient {
    client: Client,
    access: AccessRequest,
}
impl VaultClient {
    pub fn new(client: Client, access: AccessRequest) -> Self {
        Self { client, access }
    }
    pub async fn get_api_key_audit_log(&self, key: RowId) -> Result<Vec<AuditEntry>> {
        self.client
            .get_api_key_audit_log(key, self.access.clone())
            .await
    }
}
#[async_trait]
impl KeyStore for VaultClient {
    async fn get_api_keys(&self) -> Result<Vec<ApiKeyRecord>> {
        self.client.get_api_keys(self.access.clone()).await
    }
    async fn get_api_keys_by_category(&self, category: KeyCategory) -> Result<Vec<ApiKeyRecord>> {
        self.client
            .get_api_keys_by_category(category, self.access.clone())
            .await
    }
    async fn get_api_keys_by_provider(&self, provider: &str) -> Result<Vec<ApiKeyRecord>> {
        self.client
            .get_api_keys_by_provider(provider.to_string(), self.access.clone())
            .await
    }
    async fn log_api_key_action(&self, entry: NewAuditEntry) -> Result<()> {
        self.client
            .log_api_key_action(entry, self.access.clone())
            .await
    }
    async fn insert_api_key(&self, key: NewApiKey) -> Result<RowId> {
        self.client.create_api_key(key, self.access.clone()).await
    }
    async fn update_api_key(&self, id: RowId, update: ApiKeyUpdate) -> Result<()> {
        self.client
            .update_api_key(UpdateApiKeyRequest { id, update }, self.access.clone())
            .await
    }
    async fn delete_api_key(&self, id: RowId) -> Result<()> {
        self.client.delete_api_key(id, self.access.clone()).await
    }
}

/// Turns the server's status codes back into [`DashboardError`]s.
async fn bail_if_err(response: Response, expected_code: StatusCode) -> Result<Response> {
    let status = response.status();
    if status == expected_code {
        return Ok(response);
    }
    let text = response.text().await?;
    Err(match status {
        StatusCode::UNAUTHORIZED => DashboardError::Unauthenticated.into(),
        StatusCode::FORBIDDEN => DashboardError::AccessDenied(text).into(),
        StatusCode::BAD_REQUEST => DashboardError::Validation(text).into(),
        StatusCode::NOT_FOUND => DashboardError::NotFound(text).into(),
        _ => anyhow!("{}: {}", status, text),
    })
}
