//! Lazy escrow-contract client built from the environment. Routes that need
//! the chain degrade to 503 when no contract is configured.

use opengig_chain::{ChainConfig, EscrowClient};
use tracing::warn;

static CHAIN: once_cell::sync::OnceCell<Option<EscrowClient>> = once_cell::sync::OnceCell::new();

pub fn get_chain() -> Option<&'static EscrowClient> {
    CHAIN
        .get_or_init(|| {
            let rpc_url = std::env::var("OPENGIG_RPC_URL").ok()?;
            let contract_address = std::env::var("OPENGIG_CONTRACT_ADDRESS").ok()?;
            let chain_id = std::env::var("OPENGIG_CHAIN_ID")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(1);
            let resolver_key = std::env::var("OPENGIG_RESOLVER_KEY").ok();
            let cfg = ChainConfig { rpc_url, contract_address, chain_id, resolver_key };
            match EscrowClient::connect(&cfg) {
                Ok(client) => Some(client),
                Err(e) => {
                    warn!(error=%e, "escrow client unavailable");
                    None
                }
            }
        })
        .as_ref()
}
