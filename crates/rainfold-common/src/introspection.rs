//! Token introspection over JSON-RPC.
//!
//! Every probe is a single read-only `eth_call`. A reverted call, an empty
//! return or a transport failure all surface as `Err`, which callers treat as
//! "the token does not implement this".

use alloy::eips::BlockId;
use alloy::primitives::{Address, Bytes, FixedBytes, U256 as AlloyU256};
use alloy::providers::{Provider, RootProvider};
use alloy::rpc::types::TransactionRequest;
use alloy::sol_types::SolCall;
use alloy::transports::http::reqwest::Url;
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use primitive_types::{H160, U256};

use crate::abi::{IERC1155MetadataURI, IERC165, IERC20Bytes32Metadata, IERC20Metadata};
use crate::address_hex;

/// Read-only probes against an arbitrary token contract.
#[async_trait]
pub trait TokenIntrospector: Send + Sync {
    /// ERC-165 `supportsInterface(interface_id)`.
    async fn supports_interface(&self, token: H160, interface_id: [u8; 4]) -> Result<bool>;

    async fn name(&self, token: H160) -> Result<String>;

    async fn symbol(&self, token: H160) -> Result<String>;

    async fn decimals(&self, token: H160) -> Result<u8>;

    /// Multi-token `uri(id)`.
    async fn uri(&self, token: H160, id: U256) -> Result<String>;
}

/// Introspector that reverts every probe.
///
/// Used when no RPC endpoint is configured: every token classifies as unknown.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopIntrospector;

#[async_trait]
impl TokenIntrospector for NoopIntrospector {
    async fn supports_interface(&self, token: H160, _interface_id: [u8; 4]) -> Result<bool> {
        Err(anyhow!("introspection disabled for {}", address_hex(token)))
    }

    async fn name(&self, token: H160) -> Result<String> {
        Err(anyhow!("introspection disabled for {}", address_hex(token)))
    }

    async fn symbol(&self, token: H160) -> Result<String> {
        Err(anyhow!("introspection disabled for {}", address_hex(token)))
    }

    async fn decimals(&self, token: H160) -> Result<u8> {
        Err(anyhow!("introspection disabled for {}", address_hex(token)))
    }

    async fn uri(&self, token: H160, _id: U256) -> Result<String> {
        Err(anyhow!("introspection disabled for {}", address_hex(token)))
    }
}

/// Introspector backed by an Ethereum JSON-RPC endpoint.
pub struct RpcIntrospector {
    provider: RootProvider,
    block: BlockId,
}

impl RpcIntrospector {
    pub fn new(url: Url) -> Self {
        Self {
            provider: RootProvider::new_http(url),
            block: BlockId::latest(),
        }
    }

    /// Parses `url` and connects over HTTP.
    pub fn from_url(url: &str) -> Result<Self> {
        let url = url
            .parse::<Url>()
            .with_context(|| format!("Invalid RPC URL '{url}'"))?;
        Ok(Self::new(url))
    }

    /// Overrides the block calls are made against (default `latest`).
    pub fn with_block(mut self, block: BlockId) -> Self {
        self.block = block;
        self
    }

    async fn call<C: SolCall>(&self, token: H160, call: &C) -> Result<C::Return> {
        let tx = TransactionRequest::default()
            .to(Address::from(token.0))
            .input(Bytes::from(call.abi_encode()).into());

        let output = match self.provider.call(tx).block(self.block).await {
            Ok(output) => output,
            Err(e) => {
                tracing::trace!(
                    target: "rainfold_common::introspection",
                    token = %address_hex(token),
                    call = C::SIGNATURE,
                    error = %e,
                    "eth_call reverted"
                );
                return Err(e).context(format!("{} reverted", C::SIGNATURE));
            }
        };

        if output.is_empty() {
            bail!("{} returned empty data", C::SIGNATURE);
        }
        C::abi_decode_returns(&output).with_context(|| format!("Invalid {} return", C::SIGNATURE))
    }

    /// `name()`/`symbol()` as a string, falling back to the `bytes32` variant.
    async fn metadata_string<C, L>(&self, token: H160, call: &C, legacy: &L) -> Result<String>
    where
        C: SolCall<Return = String>,
        L: SolCall<Return = FixedBytes<32>>,
    {
        match self.call(token, call).await {
            Ok(value) => Ok(value),
            Err(e) => {
                let word = self.call(token, legacy).await.map_err(|_| e)?;
                let end = word.iter().rposition(|b| *b != 0).map_or(0, |i| i + 1);
                Ok(String::from_utf8(word[..end].to_vec())?)
            }
        }
    }
}

#[async_trait]
impl TokenIntrospector for RpcIntrospector {
    async fn supports_interface(&self, token: H160, interface_id: [u8; 4]) -> Result<bool> {
        let call = IERC165::supportsInterfaceCall {
            interfaceId: FixedBytes(interface_id),
        };
        self.call(token, &call).await
    }

    async fn name(&self, token: H160) -> Result<String> {
        self.metadata_string(
            token,
            &IERC20Metadata::nameCall,
            &IERC20Bytes32Metadata::nameCall,
        )
        .await
    }

    async fn symbol(&self, token: H160) -> Result<String> {
        self.metadata_string(
            token,
            &IERC20Metadata::symbolCall,
            &IERC20Bytes32Metadata::symbolCall,
        )
        .await
    }

    async fn decimals(&self, token: H160) -> Result<u8> {
        self.call(token, &IERC20Metadata::decimalsCall).await
    }

    async fn uri(&self, token: H160, id: U256) -> Result<String> {
        let call = IERC1155MetadataURI::uriCall {
            id: AlloyU256::from_be_bytes(id.to_big_endian()),
        };
        self.call(token, &call).await
    }
}
