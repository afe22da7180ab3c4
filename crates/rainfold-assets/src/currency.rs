//! Currency classification.
//!
//! A token contract is probed once: `supportsInterface` for the multi-token
//! interface (and optionally the NFT interface), then `name`, `symbol` and
//! `decimals` for fungible tokens. The outcome is cached as a
//! [`TokenStandardRecord`] and never re-probed. A probe that fails only means
//! "not this standard".

use primitive_types::{H160, U256};
use rainfold_common::abi::{ERC1155_INTERFACE_ID, ERC721_INTERFACE_ID};
use rainfold_common::{address_hex, TokenIntrospector};
use std::sync::Arc;

use crate::entities::{Asset, Currency, TokenStandard, TokenStandardRecord};
use crate::error::StoreError;
use crate::ids;
use crate::store::EventTx;

/// Suffix of the URI recorded for a multi-token id that has no URI yet.
pub const UNMINTED_TOKEN_URI: &str = "not Minted yet";

/// URI recorded for `token_id` when neither the registry nor the token knows it.
pub fn unminted_token_uri(token_id: U256) -> String {
    format!("Token {token_id} {UNMINTED_TOKEN_URI}")
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ClassifierConfig {
    /// Probe the ERC721 interface after ERC1155 and before the fungible probes
    pub probe_erc721: bool,
}

pub struct CurrencyClassifier {
    introspector: Arc<dyn TokenIntrospector>,
    config: ClassifierConfig,
}

impl CurrencyClassifier {
    pub fn new(introspector: Arc<dyn TokenIntrospector>) -> Self {
        Self {
            introspector,
            config: ClassifierConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ClassifierConfig) -> Self {
        self.config = config;
        self
    }

    /// Standard of a token contract, probing only on first sight.
    pub async fn classify(
        &self,
        tx: &mut EventTx<'_>,
        token: H160,
    ) -> Result<TokenStandardRecord, StoreError> {
        let key = ids::token_standard_id(token);
        if let Some(record) = tx.fetch::<TokenStandardRecord>(&key)? {
            return Ok(record);
        }

        let record = self.probe(token).await;
        tracing::debug!(
            target: "rainfold_assets::currency",
            token = %key,
            standard = %record.standard,
            "Classified token"
        );
        tx.put(&record)?;
        Ok(record)
    }

    /// Currency record of `token` within `registry`, created on first use.
    ///
    /// `token_id` is ignored for standards without token ids.
    pub async fn currency(
        &self,
        tx: &mut EventTx<'_>,
        registry: H160,
        standard: &TokenStandardRecord,
        token_id: U256,
    ) -> Result<Currency, StoreError> {
        let token_id = if standard.standard.has_token_id() {
            token_id
        } else {
            U256::zero()
        };
        let key = ids::currency_id(registry, standard.address, standard.standard, token_id);
        if let Some(currency) = tx.fetch::<Currency>(&key)? {
            return Ok(currency);
        }

        let mut currency = Currency {
            id: key,
            registry: ids::registry_id(registry),
            address: standard.address,
            standard: standard.standard,
            name: None,
            symbol: None,
            decimals: None,
            token_id: None,
            token_uri: None,
        };

        match standard.standard {
            TokenStandard::Fungible => {
                currency.name.clone_from(&standard.name);
                currency.symbol.clone_from(&standard.symbol);
                currency.decimals = standard.decimals;
            }
            TokenStandard::MultiToken => {
                currency.token_id = Some(token_id);
                currency.token_uri = Some(self.token_uri(tx, registry, standard.address, token_id).await?);
            }
            TokenStandard::NonFungible => {
                currency.token_id = Some(token_id);
            }
            TokenStandard::Unknown => {}
        }

        tx.put(&currency)?;
        Ok(currency)
    }

    async fn token_uri(
        &self,
        tx: &EventTx<'_>,
        registry: H160,
        token: H160,
        token_id: U256,
    ) -> Result<String, StoreError> {
        let uri = if token == registry {
            tx.fetch::<Asset>(&ids::asset_id(registry, token_id))?
                .map(|asset| asset.token_uri)
        } else {
            self.introspector.uri(token, token_id).await.ok()
        };
        Ok(uri.unwrap_or_else(|| unminted_token_uri(token_id)))
    }

    async fn probe(&self, token: H160) -> TokenStandardRecord {
        let mut record = TokenStandardRecord {
            id: ids::token_standard_id(token),
            address: token,
            standard: TokenStandard::Unknown,
            name: None,
            symbol: None,
            decimals: None,
        };

        if self.supports(token, ERC1155_INTERFACE_ID).await {
            record.standard = TokenStandard::MultiToken;
            return record;
        }

        if self.config.probe_erc721 && self.supports(token, ERC721_INTERFACE_ID).await {
            record.standard = TokenStandard::NonFungible;
            return record;
        }

        let (name, symbol, decimals) = (
            self.introspector.name(token).await,
            self.introspector.symbol(token).await,
            self.introspector.decimals(token).await,
        );
        if let (Ok(name), Ok(symbol), Ok(decimals)) = (name, symbol, decimals) {
            record.standard = TokenStandard::Fungible;
            record.name = Some(name);
            record.symbol = Some(symbol);
            record.decimals = Some(decimals);
        }

        record
    }

    async fn supports(&self, token: H160, interface_id: [u8; 4]) -> bool {
        match self.introspector.supports_interface(token, interface_id).await {
            Ok(supported) => supported,
            Err(e) => {
                tracing::trace!(
                    target: "rainfold_assets::currency",
                    token = %address_hex(token),
                    interface = ?interface_id,
                    error = %e,
                    "supportsInterface probe failed"
                );
                false
            }
        }
    }
}
