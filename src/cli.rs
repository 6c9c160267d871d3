#![allow(dead_code)]
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Result};
use api::*;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use env_logger::Builder;
use log::LevelFilter;
use rust_decimal::Decimal;
use secp256k1::{
    ecdsa::Signature, generate_keypair, hashes::sha256::Hash, rand, Message, SecretKey,
};
use serde_json::{Map, Value};
use tokio::{
    fs::File,
    io::{AsyncReadExt, AsyncWriteExt},
};

use crate::api_keys::ApiKeyRegistry;
use crate::client::{Client, VaultClient};
use crate::config::Settings;
use crate::predictions::{DateBucket, PredictionFeed, PredictionFilters};
use crate::wallet::{explorer_url, network_config, ExplorerKind};

mod api;
mod api_keys;
mod client;
mod config;
mod predictions;
mod wallet;

#[derive(Parser)]
struct Args {
    #[command(subcommand)]
    command: Commands,
    #[arg(short, long)]
    url: String,
    /// Settings file, `tipster.toml` by default
    #[arg(long)]
    config: Option<String>,
}
#[derive(Subcommand)]
enum Commands {
    Predictions {
        #[arg(long)]
        sport: Option<String>,
        #[arg(long)]
        league: Option<String>,
        /// today, tomorrow, week or month
        #[arg(long)]
        date: Option<String>,
        #[arg(long)]
        min_confidence: Option<u8>,
        #[arg(long)]
        search: Option<String>,
        #[arg(short, long, default_value_t = 1)]
        page: usize,
    },
    NewPrediction {
        #[arg(long)]
        sport: String,
        #[arg(long)]
        competition: String,
        #[arg(long)]
        match_date: DateTime<Utc>,
        #[arg(long)]
        team_a: String,
        #[arg(long)]
        team_b: String,
        #[arg(long)]
        outcome: String,
        #[arg(long)]
        confidence: u8,
        #[arg(long, default_value = "")]
        explanation: String,
        #[arg(long, default_value = "0")]
        price: Decimal,
        #[arg(long)]
        free: bool,
        #[arg(long)]
        match_id: Option<String>,
        #[arg(long)]
        league_id: Option<String>,
    },
    Keys {
        #[arg(short, long)]
        search: Option<String>,
        #[arg(short, long)]
        category: Option<String>,
        #[arg(short, long)]
        provider: Option<String>,
    },
    CreateKey {
        #[arg(short, long)]
        name: String,
        #[arg(short, long)]
        value: String,
        #[arg(short, long)]
        category: String,
        #[arg(short, long)]
        description: Option<String>,
        #[arg(short, long)]
        expires_at: Option<DateTime<Utc>>,
        #[arg(short, long)]
        required: bool,
        #[arg(short, long)]
        provider: Option<String>,
    },
    UpdateKey {
        #[arg(short, long)]
        id: RowId,
        #[arg(short, long)]
        name: Option<String>,
        #[arg(short, long)]
        value: Option<String>,
        #[arg(short, long)]
        category: Option<String>,
        #[arg(short, long)]
        status: Option<String>,
        #[arg(short, long)]
        description: Option<String>,
    },
    DeleteKey {
        #[arg(short, long)]
        id: RowId,
    },
    KeyLog {
        #[arg(short, long)]
        id: RowId,
    },
    SubmitChange {
        #[arg(short, long)]
        table: String,
        #[arg(short, long)]
        record: String,
        /// JSON object of the proposed field values
        #[arg(short, long)]
        changes: String,
    },
    ReviewChange {
        #[arg(short, long)]
        id: RowId,
        #[arg(short, long)]
        approve: bool,
        #[arg(short, long)]
        comments: Option<String>,
    },
    Changes {
        #[arg(short, long)]
        status: Option<String>,
    },
    Leaderboard {
        #[arg(short, long, default_value_t = 1)]
        page: u32,
        #[arg(short, long, default_value_t = 10)]
        limit: u32,
    },
    Packages,
    BuyTokens {
        #[arg(short, long)]
        package: Option<u32>,
        #[arg(short, long)]
        network: Option<String>,
        #[arg(short, long)]
        signature: String,
        /// Solana address that sent the payment
        #[arg(short, long)]
        wallet: String,
    },
    GenerateKeys,
    Login,
    ExplorerUrl {
        #[arg(short, long)]
        network: Option<String>,
        #[arg(short, long)]
        address: bool,
        signature: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    Builder::default().filter_level(LevelFilter::Warn).init();
    let cli = Args::parse();
    let settings = Settings::load(cli.config.as_deref())?;
    let client = Client::new(cli.url, Duration::from_secs(settings.request_timeout_secs))?;

    match cli.command {
        Commands::Predictions {
            sport,
            league,
            date,
            min_confidence,
            search,
            page,
        } => {
            let mut feed =
                PredictionFeed::new(client, Duration::from_secs(settings.cache_ttl_secs));
            feed.set_filters(PredictionFilters {
                sport,
                league,
                date_bucket: date.as_deref().and_then(DateBucket::parse),
                min_confidence,
                search,
            });
            feed.set_page(page);
            let page = feed.page().await?;
            for prediction in &page.predictions {
                println!(
                    "#{} {} {} vs {} ({}) -> {} [{}%] {}",
                    prediction.id,
                    prediction.match_date.format("%Y-%m-%d %H:%M"),
                    prediction.team_a,
                    prediction.team_b,
                    prediction.competition,
                    prediction.predicted_outcome,
                    prediction.confidence,
                    if prediction.is_free {
                        "free".to_string()
                    } else {
                        format!("{} tokens", prediction.price)
                    }
                );
            }
            println!(
                "Page {} of {} ({} predictions)",
                page.page, page.total_pages, page.total
            );
        }
        Commands::NewPrediction {
            sport,
            competition,
            match_date,
            team_a,
            team_b,
            outcome,
            confidence,
            explanation,
            price,
            free,
            match_id,
            league_id,
        } => {
            let request = NewPredictionRequest {
                sport,
                competition,
                match_date,
                team_a,
                team_b,
                predicted_outcome: outcome,
                confidence,
                explanation,
                price,
                is_free: free,
                match_id,
                league_id,
            };
            let id = client.new_prediction(request, get_access().await?).await?;
            println!("Created new prediction: {}", id);
        }
        Commands::Keys {
            search,
            category,
            provider,
        } => {
            let mut registry = ApiKeyRegistry::new(vault(client).await?);
            match provider {
                Some(provider) => registry.refresh_by_provider(provider.as_str()).await?,
                None => registry.refresh().await?,
            }
            if let Some(search) = search {
                registry.set_search_term(search);
            }
            registry.select_category(category.map(|c| KeyCategory::from_str(&c)).transpose()?);
            let now = Utc::now();
            for key in registry.filtered_keys() {
                println!(
                    "#{} {} [{}] {}{}{}",
                    key.id,
                    key.name,
                    key.category,
                    key.status,
                    if key.is_required { " required" } else { "" },
                    if key.is_expired(now) { " EXPIRED" } else { "" }
                );
            }
            let categories: Vec<String> =
                registry.categories().iter().map(|c| c.to_string()).collect();
            println!("Categories: {}", categories.join(", "));
        }
        Commands::CreateKey {
            name,
            value,
            category,
            description,
            expires_at,
            required,
            provider,
        } => {
            let registry = ApiKeyRegistry::new(vault(client).await?);
            let key = NewApiKey {
                name,
                key_value: value,
                category: KeyCategory::from_str(&category)?,
                status: KeyStatus::Active,
                description,
                expires_at,
                is_required: required,
                provider_type: provider,
            };
            report(registry.create(key).await, "Created API key")?;
        }
        Commands::UpdateKey {
            id,
            name,
            value,
            category,
            status,
            description,
        } => {
            let registry = ApiKeyRegistry::new(vault(client).await?);
            let update = ApiKeyUpdate {
                name,
                key_value: value,
                category: category.map(|c| KeyCategory::from_str(&c)).transpose()?,
                status: status.map(|s| KeyStatus::from_str(&s)).transpose()?,
                description,
                ..Default::default()
            };
            report(registry.update(id, update).await, "Updated API key")?;
        }
        Commands::DeleteKey { id } => {
            let mut registry = ApiKeyRegistry::new(vault(client).await?);
            // the audit entry records what was deleted
            registry.refresh().await?;
            report(registry.delete(id).await, "Deleted API key")?;
        }
        Commands::KeyLog { id } => {
            let log = vault(client).await?.get_api_key_audit_log(id).await?;
            for entry in log {
                println!(
                    "{} {} {}",
                    entry.created_at.to_rfc3339(),
                    entry.action,
                    entry.changes
                );
            }
        }
        Commands::SubmitChange {
            table,
            record,
            changes,
        } => {
            let changes: Map<String, Value> = serde_json::from_str(&changes)?;
            let change = NewChange {
                table_name: table,
                record_id: record,
                changes,
            };
            let id = client.submit_change(change, get_access().await.ok()).await?;
            println!("Submitted change {}", id);
        }
        Commands::ReviewChange {
            id,
            approve,
            comments,
        } => {
            let review = ReviewChangeRequest {
                change: id,
                approve,
                comments,
            };
            client.review_change(review, get_access().await?).await?;
        }
        Commands::Changes { status } => {
            let status = status.map(|s| ChangeStatus::from_str(&s)).transpose()?;
            let changes = client.get_changes(status, get_access().await?).await?;
            println!("{:#?}", changes);
        }
        Commands::Leaderboard { page, limit } => {
            let users = client
                .get_leaderboard(LeaderboardRequest { page, limit })
                .await?;
            for user in users {
                println!(
                    "{:>3}. {} {}/{} correct, {} tokens",
                    user.rank,
                    user.username.unwrap_or_else(|| user.user.to_string()),
                    user.correct_predictions,
                    user.total_predictions,
                    user.token_balance
                );
            }
        }
        Commands::Packages => {
            for package in client.get_token_packages().await? {
                println!(
                    "{}: {} tokens for {} SOL ({})",
                    package.id, package.tokens, package.price_sol, package.label
                );
            }
        }
        Commands::BuyTokens {
            package,
            network,
            signature,
            wallet,
        } => {
            let request = PurchaseRequest {
                package,
                network: pick_network(network, &settings)?,
                signature,
                wallet,
            };
            let response = client.purchase_tokens(request, get_access().await?).await?;
            println!(
                "Bought {} tokens, balance is now {}",
                response.tokens, response.balance
            );
            println!("{}", response.explorer_url);
        }
        Commands::GenerateKeys => {
            let keys = generate_keypair(&mut rand::thread_rng());
            println!("Pubkey: {}", keys.1);
            let mut private = File::create("ecdsa.key").await?;
            let mut public = File::create("ecdsa.pub").await?;
            private
                .write_all(format!("{}", keys.0.display_secret()).as_bytes())
                .await?;
            public.write_all(keys.1.to_string().as_bytes()).await?;
        }
        Commands::Login => {
            let secret_key = read_secret().await?;
            let user = UserPubKey::from_secret_key_global(&secret_key);
            let challenge = client.create_login_challenge(user).await?;
            let message = Message::from_hashed_data::<Hash>(challenge.as_bytes());
            let signature = secret_key.sign_ecdsa(message);
            let mut file = File::create("access_token").await?;
            file.write_all(signature.to_string().as_bytes()).await?;
            let mut file = File::create("challenge").await?;
            file.write_all(challenge.as_bytes()).await?;
            println!("Signed Challenge \"{}\"", challenge);
            let request = LoginRequest {
                user,
                challenge,
                sig: signature,
            };
            client.try_login(request).await?;
            println!("Logged in as {}", user);
        }
        Commands::ExplorerUrl {
            network,
            address,
            signature,
        } => {
            let network = pick_network(network, &settings)?;
            let kind = if address {
                ExplorerKind::Address
            } else {
                ExplorerKind::Tx
            };
            println!("{}: {}", network_config(network).name, explorer_url(network, kind, &signature));
        }
    }
    Ok(())
}
fn pick_network(network: Option<String>, settings: &Settings) -> Result<Network> {
    match network {
        Some(network) => Network::from_str(&network),
        None => Ok(settings.network),
    }
}
fn report(ok: bool, what: &str) -> Result<()> {
    if ok {
        println!("{}", what);
        Ok(())
    } else {
        Err(anyhow!("{} failed, see log", what))
    }
}
async fn vault(client: Client) -> Result<VaultClient> {
    Ok(VaultClient::new(client, get_access().await?))
}
async fn get_access() -> Result<AccessRequest> {
    let user = read_public().await?;
    let sig = read_token().await?;
    let challenge = read_challenge().await?;
    Ok(AccessRequest {
        user,
        sig,
        challenge,
    })
}
async fn read_file(path: &str) -> Result<String> {
    let mut file = File::open(path).await?;
    let mut contents = vec![];
    file.read_to_end(&mut contents).await?;
    Ok(String::from_utf8(contents)?)
}
async fn read_secret() -> Result<SecretKey> {
    Ok(SecretKey::from_str(read_file("ecdsa.key").await?.as_str())?)
}
async fn read_public() -> Result<UserPubKey> {
    Ok(UserPubKey::from_str(read_file("ecdsa.pub").await?.as_str())?)
}
async fn read_token() -> Result<Signature> {
    Ok(Signature::from_str(read_file("access_token").await?.as_str())?)
}
async fn read_challenge() -> Result<String> {
    read_file("challenge").await
}
