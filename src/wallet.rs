use rust_decimal_macros::dec;

use crate::api::{Network, TokenPackage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkConfig {
    pub name: &'static str,
    pub rpc_url: &'static str,
    pub explorer_url: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExplorerKind {
    Tx,
    Address,
}
impl ExplorerKind {
    fn path(&self) -> &'static str {
        match self {
            Self::Tx => "tx",
            Self::Address => "address",
        }
    }
}

pub fn network_config(network: Network) -> NetworkConfig {
    match network {
        Network::MainnetBeta => NetworkConfig {
            name: "Mainnet Beta",
            rpc_url: "https://api.mainnet-beta.solana.com",
            explorer_url: "https://explorer.solana.com",
        },
        Network::Testnet => NetworkConfig {
            name: "Testnet",
            rpc_url: "https://api.testnet.solana.com",
            explorer_url: "https://explorer.solana.com",
        },
        Network::Devnet => NetworkConfig {
            name: "Devnet",
            rpc_url: "https://api.devnet.solana.com",
            explorer_url: "https://explorer.solana.com",
        },
    }
}

/// `{explorer}/{tx|address}/{signature}`, pinned to the cluster when not on
/// mainnet.
pub fn explorer_url(network: Network, kind: ExplorerKind, signature: &str) -> String {
    let config = network_config(network);
    let url = format!("{}/{}/{}", config.explorer_url, kind.path(), signature);
    match network {
        Network::MainnetBeta => url,
        cluster => format!("{}?cluster={}", url, cluster),
    }
}

pub fn token_packages() -> Vec<TokenPackage> {
    vec![
        TokenPackage {
            id: 1,
            tokens: 100,
            price_sol: dec!(0.1),
            label: "Starter".into(),
        },
        TokenPackage {
            id: 2,
            tokens: 500,
            price_sol: dec!(0.45),
            label: "Regular".into(),
        },
        TokenPackage {
            id: 3,
            tokens: 1000,
            price_sol: dec!(0.8),
            label: "Pro".into(),
        },
        TokenPackage {
            id: 4,
            tokens: 5000,
            price_sol: dec!(3.5),
            label: "Whale".into(),
        },
    ]
}
pub fn token_package(id: u32) -> Option<TokenPackage> {
    token_packages().into_iter().find(|package| package.id == id)
}
