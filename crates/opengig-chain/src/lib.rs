//! Client for the externally-deployed opengig escrow contract.
//!
//! The contract owns escrow, milestone payout and dispute arbitration; this
//! crate only mirrors its state and, when a resolver key is configured,
//! submits dispute resolutions. Everything else on chain is driven by the
//! frontend wallets directly.

pub mod error;

pub use error::ChainError;

use ethers::abi::parse_abi;
use ethers::contract::Contract;
use ethers::middleware::SignerMiddleware;
use ethers::providers::{Http, Provider};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, U256};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

/// The contract surface shared with the frontend. Method names and argument
/// order are load-bearing: both sides call these by name.
pub const ESCROW_ABI: &[&str] = &[
    "function createJob(address freelancer, uint256[] milestoneAmounts) payable returns (uint256)",
    "function fundJob(uint256 jobId) payable",
    "function completeMilestone(uint256 jobId, uint256 index)",
    "function payMilestone(uint256 jobId, uint256 index)",
    "function raiseDispute(uint256 jobId, string reason)",
    "function resolveDispute(uint256 jobId, uint8 outcome)",
    "function cancelJob(uint256 jobId)",
    "function getJob(uint256 jobId) view returns (address, address, uint256, uint256, uint8)",
    "function getMilestone(uint256 jobId, uint256 index) view returns (uint256, bool, bool)",
    "function getDispute(uint256 jobId) view returns (address, uint8, bool)",
];

#[derive(Debug, Clone)]
pub struct ChainConfig {
    pub rpc_url: String,
    pub contract_address: String,
    pub chain_id: u64,
    /// Hex private key of a dispute-resolver wallet. Optional: without it the
    /// client is read-only and resolutions stay record-keeping only.
    pub resolver_key: Option<String>,
}

/// Job lifecycle as encoded by the contract's uint8 status field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobPhase {
    Created,
    Funded,
    InProgress,
    Completed,
    Disputed,
    Cancelled,
}

impl TryFrom<u8> for JobPhase {
    type Error = ChainError;
    fn try_from(v: u8) -> Result<Self, ChainError> {
        match v {
            0 => Ok(Self::Created),
            1 => Ok(Self::Funded),
            2 => Ok(Self::InProgress),
            3 => Ok(Self::Completed),
            4 => Ok(Self::Disputed),
            5 => Ok(Self::Cancelled),
            other => Err(ChainError::Decode(format!("unknown job status {other}"))),
        }
    }
}

/// Dispute outcome argument of `resolveDispute(uint256,uint8)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisputeOutcome {
    RefundClient,
    PayFreelancer,
    Split,
}

impl DisputeOutcome {
    pub fn as_u8(self) -> u8 {
        match self {
            Self::RefundClient => 0,
            Self::PayFreelancer => 1,
            Self::Split => 2,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OnChainJob {
    pub client: String,
    pub freelancer: Option<String>,
    pub total_amount: String,
    pub released_amount: String,
    pub status: JobPhase,
}

#[derive(Debug, Clone, Serialize)]
pub struct OnChainMilestone {
    pub amount: String,
    pub completed: bool,
    pub paid: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct OnChainDispute {
    pub raised_by: String,
    pub status: u8,
}

type ResolverClient = SignerMiddleware<Provider<Http>, LocalWallet>;

pub struct EscrowClient {
    reader: Contract<Provider<Http>>,
    resolver: Option<Contract<ResolverClient>>,
    address: Address,
    chain_id: u64,
}

impl EscrowClient {
    pub fn connect(cfg: &ChainConfig) -> Result<Self, ChainError> {
        let address: Address = cfg
            .contract_address
            .parse()
            .map_err(|e| ChainError::Config(format!("contract address: {e}")))?;
        let provider = Provider::<Http>::try_from(cfg.rpc_url.as_str())
            .map_err(|e| ChainError::Config(format!("rpc url: {e}")))?;
        let abi = parse_abi(ESCROW_ABI).map_err(|e| ChainError::Abi(e.to_string()))?;
        let reader = Contract::new(address, abi.clone(), Arc::new(provider.clone()));
        let resolver = match &cfg.resolver_key {
            Some(key) => {
                let wallet: LocalWallet = key
                    .trim_start_matches("0x")
                    .parse()
                    .map_err(|e| ChainError::Config(format!("resolver key: {e}")))?;
                let wallet = wallet.with_chain_id(cfg.chain_id);
                let client = SignerMiddleware::new(provider, wallet);
                Some(Contract::new(address, abi, Arc::new(client)))
            }
            None => None,
        };
        info!(contract=%cfg.contract_address, chain_id=cfg.chain_id, resolver=resolver.is_some(), "escrow client connected");
        Ok(Self { reader, resolver, address, chain_id: cfg.chain_id })
    }

    pub fn contract_address(&self) -> String {
        format!("{:#x}", self.address)
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn has_resolver(&self) -> bool {
        self.resolver.is_some()
    }

    /// Mirror a job record from the contract.
    pub async fn get_job(&self, contract_job_id: u64) -> Result<OnChainJob, ChainError> {
        let (client, freelancer, total, released, status): (Address, Address, U256, U256, u8) =
            self.reader
                .method("getJob", U256::from(contract_job_id))
                .map_err(|e| ChainError::Abi(e.to_string()))?
                .call()
                .await
                .map_err(|e| ChainError::Rpc(e.to_string()))?;
        Ok(OnChainJob {
            client: fmt_address(client),
            freelancer: if freelancer.is_zero() { None } else { Some(fmt_address(freelancer)) },
            total_amount: total.to_string(),
            released_amount: released.to_string(),
            status: JobPhase::try_from(status)?,
        })
    }

    pub async fn get_milestone(
        &self,
        contract_job_id: u64,
        index: u64,
    ) -> Result<OnChainMilestone, ChainError> {
        let (amount, completed, paid): (U256, bool, bool) = self
            .reader
            .method("getMilestone", (U256::from(contract_job_id), U256::from(index)))
            .map_err(|e| ChainError::Abi(e.to_string()))?
            .call()
            .await
            .map_err(|e| ChainError::Rpc(e.to_string()))?;
        Ok(OnChainMilestone { amount: amount.to_string(), completed, paid })
    }

    /// Returns None when the contract has no dispute recorded for the job.
    pub async fn get_dispute(
        &self,
        contract_job_id: u64,
    ) -> Result<Option<OnChainDispute>, ChainError> {
        let (raised_by, status, exists): (Address, u8, bool) = self
            .reader
            .method("getDispute", U256::from(contract_job_id))
            .map_err(|e| ChainError::Abi(e.to_string()))?
            .call()
            .await
            .map_err(|e| ChainError::Rpc(e.to_string()))?;
        if !exists {
            return Ok(None);
        }
        Ok(Some(OnChainDispute { raised_by: fmt_address(raised_by), status }))
    }

    /// Submit `resolveDispute` from the resolver wallet. Returns the tx hash.
    pub async fn resolve_dispute(
        &self,
        contract_job_id: u64,
        outcome: DisputeOutcome,
    ) -> Result<String, ChainError> {
        let contract = self.resolver.as_ref().ok_or(ChainError::NoSigner)?;
        let call = contract
            .method::<_, ()>("resolveDispute", (U256::from(contract_job_id), outcome.as_u8()))
            .map_err(|e| ChainError::Abi(e.to_string()))?;
        let pending = call.send().await.map_err(|e| ChainError::Rpc(e.to_string()))?;
        let tx_hash = format!("{:?}", pending.tx_hash());
        info!(contract_job_id, outcome = outcome.as_u8(), %tx_hash, "resolveDispute submitted");
        Ok(tx_hash)
    }
}

fn fmt_address(a: Address) -> String {
    format!("{a:#x}")
}
