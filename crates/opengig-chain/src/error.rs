use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChainError {
    #[error("chain config error: {0}")]
    Config(String),
    #[error("rpc error: {0}")]
    Rpc(String),
    #[error("abi error: {0}")]
    Abi(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("no resolver signer configured")]
    NoSigner,
}
