use crate::api::*;
use crate::api_keys::KeyStore;
use crate::predictions::PredictionSource;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use log::trace;
use rust_decimal::Decimal;
use secp256k1::ecdsa::Signature;
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{query, Executor, QueryBuilder, Row, Sqlite, SqlitePool};
use std::str::FromStr;
use std::time::Duration;

#[async_trait]
pub trait DB: PredictionSource + KeyStore {
    async fn add_prediction(&self, prediction: NewPredictionRequest) -> Result<RowId>;

    async fn get_api_key_audit_log(&self, key: RowId) -> Result<Vec<AuditEntry>>;

    async fn add_change(
        &self,
        submitter: UserPubKey,
        change: NewChange,
        status: ChangeStatus,
        reviewer: Option<UserPubKey>,
    ) -> Result<RowId>;
    async fn get_change(&self, change: RowId) -> Result<PendingChange>;
    async fn set_change_status(
        &self,
        change: RowId,
        status: ChangeStatus,
        reviewer: UserPubKey,
        comments: Option<String>,
    ) -> Result<()>;
    async fn get_changes(&self, status: Option<ChangeStatus>) -> Result<Vec<PendingChange>>;

    async fn get_leaderboard_users(&self) -> Result<Vec<LeaderboardUser>>;
    async fn record_prediction_result(&self, user: UserPubKey, correct: bool) -> Result<()>;
    async fn has_purchase(&self, signature: &TxSignature) -> Result<bool>;
    /// Stores the purchase and credits its tokens, both or neither.
    /// Returns the purchase id and the new balance.
    async fn record_purchase(
        &self,
        user: UserPubKey,
        package: &TokenPackage,
        network: Network,
        signature: TxSignature,
    ) -> Result<(RowId, Decimal)>;
    async fn get_purchases(&self, user: UserPubKey) -> Result<Vec<TokenPurchase>>;

    async fn create_user(&self, user: UserPubKey) -> Result<()>;
    async fn update_user_role(&self, user: UserPubKey, role: UserRole) -> Result<()>;
    async fn get_user_role(&self, user: UserPubKey) -> Result<UserRole>;
    async fn update_login_challenge(&self, user: UserPubKey, challenge: String) -> Result<()>;
    async fn get_login_challenge(&self, user: UserPubKey) -> Result<String>;
    async fn update_access_token(&self, user: UserPubKey, sig: Signature) -> Result<()>;
    async fn get_last_access(&self, user: UserPubKey)
        -> Result<(Signature, String, DateTime<Utc>)>;
    async fn update_username(&self, user: UserPubKey, username: String) -> Result<()>;
    async fn get_user(&self, user: UserPubKey) -> Result<UserResponse>;
}

pub struct SQLite {
    connection: SqlitePool,
}
impl SQLite {
    pub async fn new(db_conn: Option<String>) -> Result<Self> {
        let connection = match db_conn {
            Some(url) => SqlitePoolOptions::new().connect(url.as_str()).await?,
            // every connection would get its own in-memory database
            None => {
                SqlitePoolOptions::new()
                    .max_connections(1)
                    .idle_timeout(None::<Duration>)
                    .max_lifetime(None::<Duration>)
                    .connect("sqlite::memory:")
                    .await?
            }
        };
        connection
            .execute(
                "CREATE TABLE IF NOT EXISTS predictions (\
                id INTEGER PRIMARY KEY,\
                sport TEXT NOT NULL,\
                competition TEXT NOT NULL,\
                match_date INTEGER NOT NULL,\
                team_a TEXT NOT NULL,\
                team_b TEXT NOT NULL,\
                predicted_outcome TEXT NOT NULL,\
                confidence INTEGER NOT NULL,\
                explanation TEXT NOT NULL,\
                price TEXT NOT NULL,\
                is_free BOOLEAN NOT NULL,\
                match_id TEXT,\
                league_id TEXT,\
                created_at INTEGER NOT NULL\
                )",
            )
            .await?;
        connection
            .execute(
                "CREATE TABLE IF NOT EXISTS api_keys (\
                id INTEGER PRIMARY KEY,\
                name TEXT NOT NULL,\
                key_value TEXT NOT NULL,\
                category TEXT NOT NULL,\
                status TEXT NOT NULL,\
                description TEXT,\
                created_at INTEGER NOT NULL,\
                updated_at INTEGER NOT NULL,\
                expires_at INTEGER,\
                is_required BOOLEAN NOT NULL,\
                provider_type TEXT\
                )",
            )
            .await?;
        connection
            .execute(
                "CREATE TABLE IF NOT EXISTS api_key_audit_log (\
                id INTEGER PRIMARY KEY,\
                key_id INTEGER NOT NULL,\
                action TEXT NOT NULL,\
                changes TEXT NOT NULL,\
                created_at INTEGER NOT NULL\
                )",
            )
            .await?;
        connection
            .execute(
                "CREATE TABLE IF NOT EXISTS pending_changes (\
                id INTEGER PRIMARY KEY,\
                submitter TEXT NOT NULL,\
                table_name TEXT NOT NULL,\
                record_id TEXT NOT NULL,\
                changes TEXT NOT NULL,\
                status TEXT NOT NULL,\
                created_at INTEGER NOT NULL,\
                updated_at INTEGER NOT NULL,\
                reviewer TEXT,\
                comments TEXT\
                )",
            )
            .await?;
        connection
            .execute(
                "CREATE TABLE IF NOT EXISTS users (\
                pubkey TEXT,\
                last_access INTEGER,\
                login_challenge TEXT,\
                access_token TEXT,\
                session_challenge TEXT,\
                role TEXT DEFAULT 'User',\
                username TEXT UNIQUE,\
                correct_predictions INTEGER NOT NULL DEFAULT 0,\
                total_predictions INTEGER NOT NULL DEFAULT 0,\
                token_balance TEXT NOT NULL DEFAULT '0',\
                locked_tokens TEXT NOT NULL DEFAULT '0',\
                PRIMARY KEY (pubkey)\
                )",
            )
            .await?;
        connection
            .execute(
                "CREATE TABLE IF NOT EXISTS token_purchases (\
                id INTEGER PRIMARY KEY,\
                user TEXT NOT NULL,\
                package INTEGER NOT NULL,\
                tokens INTEGER NOT NULL,\
                price_sol TEXT NOT NULL,\
                network TEXT NOT NULL,\
                signature TEXT NOT NULL UNIQUE,\
                created_at INTEGER NOT NULL\
                )",
            )
            .await?;
        Ok(Self { connection })
    }
}

fn timestamp(millis: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .ok_or_else(|| anyhow!("Invalid timestamp {} in db", millis))
}
fn optional_timestamp(millis: Option<i64>) -> Result<Option<DateTime<Utc>>> {
    millis.map(timestamp).transpose()
}
fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

fn prediction_from_row(row: &SqliteRow) -> Result<Prediction> {
    Ok(Prediction {
        id: row.try_get("id")?,
        sport: row.try_get("sport")?,
        competition: row.try_get("competition")?,
        match_date: timestamp(row.try_get("match_date")?)?,
        team_a: row.try_get("team_a")?,
        team_b: row.try_get("team_b")?,
        predicted_outcome: row.try_get("predicted_outcome")?,
        confidence: row.try_get::<i64, _>("confidence")?.try_into()?,
        explanation: row.try_get("explanation")?,
        price: Decimal::from_str(row.try_get("price")?)?,
        is_free: row.try_get("is_free")?,
        match_id: row.try_get("match_id")?,
        league_id: row.try_get("league_id")?,
        created_at: timestamp(row.try_get("created_at")?)?,
    })
}
fn api_key_from_row(row: &SqliteRow) -> Result<ApiKeyRecord> {
    Ok(ApiKeyRecord {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        key_value: row.try_get("key_value")?,
        category: KeyCategory::from_str(row.try_get("category")?)?,
        status: KeyStatus::from_str(row.try_get("status")?)?,
        description: row.try_get("description")?,
        created_at: timestamp(row.try_get("created_at")?)?,
        updated_at: timestamp(row.try_get("updated_at")?)?,
        expires_at: optional_timestamp(row.try_get("expires_at")?)?,
        is_required: row.try_get("is_required")?,
        provider_type: row.try_get("provider_type")?,
    })
}
fn change_from_row(row: &SqliteRow) -> Result<PendingChange> {
    let reviewer: Option<String> = row.try_get("reviewer")?;
    Ok(PendingChange {
        id: row.try_get("id")?,
        submitter: UserPubKey::from_str(row.try_get("submitter")?)?,
        table_name: row.try_get("table_name")?,
        record_id: row.try_get("record_id")?,
        changes: serde_json::from_str(row.try_get("changes")?)?,
        status: ChangeStatus::from_str(row.try_get("status")?)?,
        created_at: timestamp(row.try_get("created_at")?)?,
        updated_at: timestamp(row.try_get("updated_at")?)?,
        reviewer: reviewer
            .map(|reviewer| UserPubKey::from_str(reviewer.as_str()))
            .transpose()?,
        comments: row.try_get("comments")?,
    })
}

const API_KEY_COLUMNS: &str = "id, name, key_value, category, status, description, \
    created_at, updated_at, expires_at, is_required, provider_type";
const CHANGE_COLUMNS: &str = "id, submitter, table_name, record_id, changes, status, \
    created_at, updated_at, reviewer, comments";

#[async_trait]
impl PredictionSource for SQLite {
    async fn query_predictions(&self, prediction_query: &PredictionQuery) -> Result<Vec<Prediction>> {
        let stmt = query(
            "SELECT id, sport, competition, match_date, team_a, team_b, predicted_outcome, \
            confidence, explanation, price, is_free, match_id, league_id, created_at \
            FROM predictions \
            WHERE confidence >= ?1 \
            AND (?2 IS NULL OR sport = ?2) \
            AND (?3 IS NULL OR competition = ?3) \
            AND (?4 IS NULL OR match_date >= ?4) \
            AND (?5 IS NULL OR match_date <= ?5) \
            ORDER BY match_date ASC, id ASC",
        )
        .bind(prediction_query.min_confidence as i64)
        .bind(prediction_query.sport.clone())
        .bind(prediction_query.league.clone())
        .bind(prediction_query.from.map(|from| from.timestamp_millis()))
        .bind(prediction_query.to.map(|to| to.timestamp_millis()));
        let rows = self
            .connection
            .fetch_all(stmt)
            .await
            .context("couldn't query predictions")?;
        trace!("{} predictions matched {:?}", rows.len(), prediction_query);
        rows.iter().map(prediction_from_row).collect()
    }
}

#[async_trait]
impl KeyStore for SQLite {
    async fn get_api_keys(&self) -> Result<Vec<ApiKeyRecord>> {
        let stmt = format!("SELECT {} FROM api_keys ORDER BY name, id", API_KEY_COLUMNS);
        let rows = self.connection.fetch_all(query(stmt.as_str())).await?;
        rows.iter().map(api_key_from_row).collect()
    }
    async fn get_api_keys_by_category(&self, category: KeyCategory) -> Result<Vec<ApiKeyRecord>> {
        let stmt = format!(
            "SELECT {} FROM api_keys WHERE category = ? ORDER BY name, id",
            API_KEY_COLUMNS
        );
        let rows = self
            .connection
            .fetch_all(query(stmt.as_str()).bind(category.as_str()))
            .await?;
        rows.iter().map(api_key_from_row).collect()
    }
    async fn get_api_keys_by_provider(&self, provider: &str) -> Result<Vec<ApiKeyRecord>> {
        let stmt = format!(
            "SELECT {} FROM api_keys WHERE provider_type = ? ORDER BY name, id",
            API_KEY_COLUMNS
        );
        let rows = self
            .connection
            .fetch_all(query(stmt.as_str()).bind(provider))
            .await?;
        rows.iter().map(api_key_from_row).collect()
    }
    async fn log_api_key_action(&self, entry: NewAuditEntry) -> Result<()> {
        let stmt = query(
            "INSERT INTO api_key_audit_log (key_id, action, changes, created_at) \
            VALUES (?,?,?,?)",
        );
        self.connection
            .execute(
                stmt.bind(entry.key_id)
                    .bind(entry.action.to_string())
                    .bind(entry.changes.to_string())
                    .bind(now_millis()),
            )
            .await
            .with_context(|| format!("couldn't log action for API key {}", entry.key_id))?;
        Ok(())
    }
    async fn insert_api_key(&self, key: NewApiKey) -> Result<RowId> {
        let now = now_millis();
        let stmt = query(
            "INSERT INTO api_keys (name, key_value, category, status, description, \
            created_at, updated_at, expires_at, is_required, provider_type) \
            VALUES (?,?,?,?,?,?,?,?,?,?)",
        );
        let id = self
            .connection
            .execute(
                stmt.bind(key.name)
                    .bind(key.key_value)
                    .bind(key.category.as_str())
                    .bind(key.status.to_string())
                    .bind(key.description)
                    .bind(now)
                    .bind(now)
                    .bind(key.expires_at.map(|expiry| expiry.timestamp_millis()))
                    .bind(key.is_required)
                    .bind(key.provider_type),
            )
            .await?
            .last_insert_rowid();
        Ok(id)
    }
    async fn update_api_key(&self, id: RowId, update: ApiKeyUpdate) -> Result<()> {
        let mut builder = QueryBuilder::<Sqlite>::new("UPDATE api_keys SET updated_at = ");
        builder.push_bind(now_millis());
        if let Some(name) = update.name {
            builder.push(", name = ").push_bind(name);
        }
        if let Some(key_value) = update.key_value {
            builder.push(", key_value = ").push_bind(key_value);
        }
        if let Some(category) = update.category {
            builder.push(", category = ").push_bind(category.as_str());
        }
        if let Some(status) = update.status {
            builder.push(", status = ").push_bind(status.to_string());
        }
        if let Some(description) = update.description {
            builder.push(", description = ").push_bind(description);
        }
        if let Some(expires_at) = update.expires_at {
            builder
                .push(", expires_at = ")
                .push_bind(expires_at.timestamp_millis());
        }
        if let Some(is_required) = update.is_required {
            builder.push(", is_required = ").push_bind(is_required);
        }
        if let Some(provider_type) = update.provider_type {
            builder.push(", provider_type = ").push_bind(provider_type);
        }
        builder.push(" WHERE id = ").push_bind(id);
        let result = builder.build().execute(&self.connection).await?;
        if result.rows_affected() == 0 {
            return Err(DashboardError::NotFound(format!("API key {}", id)).into());
        }
        Ok(())
    }
    async fn delete_api_key(&self, id: RowId) -> Result<()> {
        let result = self
            .connection
            .execute(query("DELETE FROM api_keys WHERE id = ?").bind(id))
            .await?;
        if result.rows_affected() == 0 {
            return Err(DashboardError::NotFound(format!("API key {}", id)).into());
        }
        Ok(())
    }
}

#[async_trait]
impl DB for SQLite {
    async fn add_prediction(&self, prediction: NewPredictionRequest) -> Result<RowId> {
        let stmt = query(
            "INSERT INTO predictions (sport, competition, match_date, team_a, team_b, \
            predicted_outcome, confidence, explanation, price, is_free, match_id, league_id, \
            created_at) \
            VALUES (?,?,?,?,?,?,?,?,?,?,?,?,?)",
        );
        let id = self
            .connection
            .execute(
                stmt.bind(prediction.sport)
                    .bind(prediction.competition)
                    .bind(prediction.match_date.timestamp_millis())
                    .bind(prediction.team_a)
                    .bind(prediction.team_b)
                    .bind(prediction.predicted_outcome)
                    .bind(prediction.confidence as i64)
                    .bind(prediction.explanation)
                    .bind(prediction.price.to_string())
                    .bind(prediction.is_free)
                    .bind(prediction.match_id)
                    .bind(prediction.league_id)
                    .bind(now_millis()),
            )
            .await?
            .last_insert_rowid();
        Ok(id)
    }
    async fn get_api_key_audit_log(&self, key: RowId) -> Result<Vec<AuditEntry>> {
        let stmt = query(
            "SELECT id, key_id, action, changes, created_at \
            FROM api_key_audit_log \
            WHERE key_id = ? \
            ORDER BY id ASC",
        );
        let rows = self.connection.fetch_all(stmt.bind(key)).await?;
        let mut entries = vec![];
        for row in rows {
            entries.push(AuditEntry {
                id: row.try_get("id")?,
                key_id: row.try_get("key_id")?,
                action: AuditAction::from_str(row.try_get("action")?)?,
                changes: serde_json::from_str(row.try_get("changes")?)?,
                created_at: timestamp(row.try_get("created_at")?)?,
            });
        }
        Ok(entries)
    }
    async fn add_change(
        &self,
        submitter: UserPubKey,
        change: NewChange,
        status: ChangeStatus,
        reviewer: Option<UserPubKey>,
    ) -> Result<RowId> {
        let now = now_millis();
        let stmt = query(
            "INSERT INTO pending_changes (submitter, table_name, record_id, changes, status, \
            created_at, updated_at, reviewer) \
            VALUES (?,?,?,?,?,?,?,?)",
        );
        let id = self
            .connection
            .execute(
                stmt.bind(submitter.to_string())
                    .bind(change.table_name)
                    .bind(change.record_id)
                    .bind(serde_json::to_string(&change.changes)?)
                    .bind(status.to_string())
                    .bind(now)
                    .bind(now)
                    .bind(reviewer.map(|reviewer| reviewer.to_string())),
            )
            .await?
            .last_insert_rowid();
        Ok(id)
    }
    async fn get_change(&self, change: RowId) -> Result<PendingChange> {
        let stmt = format!("SELECT {} FROM pending_changes WHERE id = ?", CHANGE_COLUMNS);
        let row = self
            .connection
            .fetch_optional(query(stmt.as_str()).bind(change))
            .await?
            .ok_or_else(|| DashboardError::NotFound(format!("Change {}", change)))?;
        change_from_row(&row)
    }
    async fn set_change_status(
        &self,
        change: RowId,
        status: ChangeStatus,
        reviewer: UserPubKey,
        comments: Option<String>,
    ) -> Result<()> {
        let stmt = query(
            "UPDATE pending_changes SET \
            status = ?, reviewer = ?, comments = ?, updated_at = ? \
            WHERE id = ?",
        );
        self.connection
            .execute(
                stmt.bind(status.to_string())
                    .bind(reviewer.to_string())
                    .bind(comments)
                    .bind(now_millis())
                    .bind(change),
            )
            .await
            .with_context(|| format!("couldn't set status of change {}", change))?;
        Ok(())
    }
    async fn get_changes(&self, status: Option<ChangeStatus>) -> Result<Vec<PendingChange>> {
        let stmt = format!(
            "SELECT {} FROM pending_changes \
            WHERE (?1 IS NULL OR status = ?1) \
            ORDER BY created_at DESC, id DESC",
            CHANGE_COLUMNS
        );
        let rows = self
            .connection
            .fetch_all(query(stmt.as_str()).bind(status.map(|status| status.to_string())))
            .await?;
        rows.iter().map(change_from_row).collect()
    }
    async fn get_leaderboard_users(&self) -> Result<Vec<LeaderboardUser>> {
        let stmt = query(
            "SELECT pubkey, username, correct_predictions, total_predictions, \
            token_balance, locked_tokens \
            FROM users",
        );
        let rows = self.connection.fetch_all(stmt).await?;
        let mut users = vec![];
        for row in rows {
            users.push(LeaderboardUser {
                user: UserPubKey::from_str(row.try_get("pubkey")?)?,
                username: row.try_get("username")?,
                correct_predictions: row.try_get::<i64, _>("correct_predictions")?.try_into()?,
                total_predictions: row.try_get::<i64, _>("total_predictions")?.try_into()?,
                token_balance: Decimal::from_str(row.try_get("token_balance")?)?,
                locked_tokens: Decimal::from_str(row.try_get("locked_tokens")?)?,
                rank: 0,
            });
        }
        Ok(users)
    }
    async fn record_prediction_result(&self, user: UserPubKey, correct: bool) -> Result<()> {
        self.create_user(user).await?;
        let stmt = query(
            "UPDATE users SET \
            total_predictions = total_predictions + 1, \
            correct_predictions = correct_predictions + ? \
            WHERE pubkey = ?",
        );
        self.connection
            .execute(stmt.bind(correct as i64).bind(user.to_string()))
            .await?;
        Ok(())
    }
    async fn has_purchase(&self, signature: &TxSignature) -> Result<bool> {
        let stmt = query("SELECT id FROM token_purchases WHERE signature = ?");
        let row = self
            .connection
            .fetch_optional(stmt.bind(signature.as_str()))
            .await?;
        Ok(row.is_some())
    }
    async fn record_purchase(
        &self,
        user: UserPubKey,
        package: &TokenPackage,
        network: Network,
        signature: TxSignature,
    ) -> Result<(RowId, Decimal)> {
        let mut tx = self.connection.begin().await?;
        query("INSERT OR IGNORE INTO users (pubkey) VALUES (?)")
            .bind(user.to_string())
            .execute(&mut *tx)
            .await?;
        let id = query(
            "INSERT INTO token_purchases (user, package, tokens, price_sol, network, signature, \
            created_at) \
            VALUES (?,?,?,?,?,?,?)",
        )
        .bind(user.to_string())
        .bind(package.id as i64)
        .bind(i64::try_from(package.tokens)?)
        .bind(package.price_sol.to_string())
        .bind(network.to_string())
        .bind(signature)
        .bind(now_millis())
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();
        let row = query("SELECT token_balance FROM users WHERE pubkey = ?")
            .bind(user.to_string())
            .fetch_one(&mut *tx)
            .await?;
        let balance =
            Decimal::from_str(row.try_get("token_balance")?)? + Decimal::from(package.tokens);
        query("UPDATE users SET token_balance = ? WHERE pubkey = ?")
            .bind(balance.to_string())
            .bind(user.to_string())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok((id, balance))
    }
    async fn get_purchases(&self, user: UserPubKey) -> Result<Vec<TokenPurchase>> {
        let stmt = query(
            "SELECT id, user, package, tokens, price_sol, network, signature, created_at \
            FROM token_purchases \
            WHERE user = ? \
            ORDER BY id DESC",
        );
        let rows = self
            .connection
            .fetch_all(stmt.bind(user.to_string()))
            .await?;
        let mut purchases = vec![];
        for row in rows {
            purchases.push(TokenPurchase {
                id: row.try_get("id")?,
                user: UserPubKey::from_str(row.try_get("user")?)?,
                package: row.try_get::<i64, _>("package")?.try_into()?,
                tokens: row.try_get::<i64, _>("tokens")?.try_into()?,
                price_sol: Decimal::from_str(row.try_get("price_sol")?)?,
                network: Network::from_str(row.try_get("network")?)?,
                signature: row.try_get("signature")?,
                created_at: timestamp(row.try_get("created_at")?)?,
            });
        }
        Ok(purchases)
    }
    async fn create_user(&self, user: UserPubKey) -> Result<()> {
        let stmt = query("INSERT OR IGNORE INTO users (pubkey) VALUES (?)");
        self.connection.execute(stmt.bind(user.to_string())).await?;
        Ok(())
    }
    async fn update_user_role(&self, user: UserPubKey, role: UserRole) -> Result<()> {
        self.create_user(user).await?;
        let stmt = query(
            "UPDATE users SET \
            role = ? \
            WHERE pubkey = ?",
        );
        self.connection
            .execute(stmt.bind(role.to_string()).bind(user.to_string()))
            .await?;
        Ok(())
    }
    async fn get_user_role(&self, user: UserPubKey) -> Result<UserRole> {
        let row = self
            .connection
            .fetch_one(query("SELECT role FROM users WHERE pubkey = ?").bind(user.to_string()))
            .await
            .with_context(|| format!("couldn't get role for user {}", user))?;
        UserRole::from_str(row.try_get("role")?)
    }
    async fn update_login_challenge(&self, user: UserPubKey, challenge: String) -> Result<()> {
        self.create_user(user).await?;
        let stmt = query("UPDATE users SET login_challenge = ? WHERE pubkey = ?");
        self.connection
            .execute(stmt.bind(challenge).bind(user.to_string()))
            .await?;
        Ok(())
    }
    async fn get_login_challenge(&self, user: UserPubKey) -> Result<String> {
        let row = self
            .connection
            .fetch_one(
                query("SELECT login_challenge FROM users WHERE pubkey = ?").bind(user.to_string()),
            )
            .await?;
        let challenge: Option<String> = row.try_get("login_challenge")?;
        challenge.ok_or_else(|| anyhow!("No login challenge for user {}", user))
    }
    async fn update_access_token(&self, user: UserPubKey, sig: Signature) -> Result<()> {
        let stmt = query(
            "UPDATE users SET \
            access_token = ?, \
            session_challenge = login_challenge, \
            login_challenge = NULL, \
            last_access = ? \
            WHERE pubkey = ?",
        );
        self.connection
            .execute(
                stmt.bind(sig.to_string())
                    .bind(now_millis())
                    .bind(user.to_string()),
            )
            .await?;
        Ok(())
    }
    async fn get_last_access(
        &self,
        user: UserPubKey,
    ) -> Result<(Signature, String, DateTime<Utc>)> {
        let stmt = query(
            "SELECT access_token, session_challenge, last_access \
            FROM users \
            WHERE pubkey = ?",
        );
        let row = self
            .connection
            .fetch_optional(stmt.bind(user.to_string()))
            .await?
            .ok_or(DashboardError::Unauthenticated)?;
        let token: Option<String> = row.try_get("access_token")?;
        let challenge: Option<String> = row.try_get("session_challenge")?;
        let last_access: Option<i64> = row.try_get("last_access")?;
        match (token, challenge, last_access) {
            (Some(token), Some(challenge), Some(last_access)) => Ok((
                Signature::from_str(token.as_str())?,
                challenge,
                timestamp(last_access)?,
            )),
            _ => Err(DashboardError::Unauthenticated.into()),
        }
    }
    async fn update_username(&self, user: UserPubKey, username: String) -> Result<()> {
        self.create_user(user).await?;
        let stmt = query("UPDATE users SET username = ? WHERE pubkey = ?");
        self.connection
            .execute(stmt.bind(username).bind(user.to_string()))
            .await
            .context("couldn't update username")?;
        Ok(())
    }
    async fn get_user(&self, user: UserPubKey) -> Result<UserResponse> {
        let row = self
            .connection
            .fetch_optional(
                query("SELECT username, role FROM users WHERE pubkey = ?").bind(user.to_string()),
            )
            .await?
            .ok_or_else(|| DashboardError::NotFound(format!("User {}", user)))?;
        Ok(UserResponse {
            user,
            username: row.try_get("username")?,
            role: UserRole::from_str(row.try_get("role")?)?,
        })
    }
}
