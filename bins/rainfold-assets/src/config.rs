//! Configuration for the asset indexer

use clap::Parser;
use rainfold_assets::ContractFamily;
use rainfold_common::parse_address;
use primitive_types::H160;

/// Rain game-asset indexer
///
/// Replays decoded registry and factory events from a JSON file and folds
/// them into an asset, holder and balance graph.
#[derive(Parser, Debug)]
#[command(name = "rainfold-assets")]
#[command(about = "Index Rain game-asset registries", long_about = None)]
pub struct Config {
    /// JSON file of decoded events, in chain order
    #[arg(long, env = "RAINFOLD_EVENTS")]
    pub events: String,

    /// JSON-RPC URL used to classify currency tokens
    ///
    /// Without it every currency token is classified as UNKNOWN.
    #[arg(long, env = "RAINFOLD_RPC_URL")]
    pub rpc_url: Option<String>,

    /// Database path for the projected entities
    #[arg(long, env = "RAINFOLD_DB_PATH", default_value = "./rainfold-data/assets.db")]
    pub db_path: String,

    /// Engine database path (defaults to engine.db next to --db-path)
    #[arg(long, env = "RAINFOLD_ENGINE_DB")]
    pub engine_db: Option<String>,

    /// Rain1155 registries (comma-separated hex addresses)
    #[arg(long, env = "RAINFOLD_RAIN1155", value_delimiter = ',')]
    pub rain1155: Vec<String>,

    /// GameAssets factories
    #[arg(long, env = "RAINFOLD_GAME_ASSETS_FACTORY", value_delimiter = ',')]
    pub game_assets_factory: Vec<String>,

    /// Accessories factories
    #[arg(long, env = "RAINFOLD_ACCESSORIES_FACTORY", value_delimiter = ',')]
    pub accessories_factory: Vec<String>,

    /// GameAssets registries deployed without a factory
    #[arg(long, env = "RAINFOLD_GAME_ASSETS", value_delimiter = ',')]
    pub game_assets: Vec<String>,

    /// Accessories registries deployed without a factory
    #[arg(long, env = "RAINFOLD_ACCESSORIES", value_delimiter = ',')]
    pub accessories: Vec<String>,

    /// Events handed to the pipeline per cycle
    #[arg(long, default_value = "100")]
    pub batch_size: usize,

    /// Probe the ERC721 interface when classifying currencies
    #[arg(long)]
    pub probe_erc721: bool,

    /// Halt on events whose parent record is missing instead of dropping them
    #[arg(long, env = "RAINFOLD_STRICT")]
    pub strict: bool,
}

impl Config {
    /// Statically watched contracts with the family each one is decoded as.
    pub fn static_contracts(&self) -> Result<Vec<(H160, ContractFamily)>, String> {
        let groups = [
            (&self.rain1155, ContractFamily::Rain1155),
            (&self.game_assets_factory, ContractFamily::GameAssetsFactory),
            (&self.accessories_factory, ContractFamily::AccessoriesFactory),
            (&self.game_assets, ContractFamily::GameAssets),
            (&self.accessories, ContractFamily::Accessories),
        ];

        let mut contracts = Vec::new();
        for (addresses, family) in groups {
            for s in addresses.iter().filter(|s| !s.trim().is_empty()) {
                let address = parse_address(s)
                    .map_err(|e| format!("Invalid {family} address '{s}': {e}"))?;
                contracts.push((address, family));
            }
        }
        Ok(contracts)
    }
}
