//! Ethereum wallet-signature login: nonce message construction and
//! personal-message signature recovery.

use secp256k1::ecdsa::{RecoverableSignature, RecoveryId};
use secp256k1::{Message, Secp256k1};
use sha3::{Digest, Keccak256};

use crate::error::{ApiError, ApiResult};

/// The exact text the wallet signs. The frontend builds the same string from
/// the /auth/nonce response, so changes here are a breaking API change.
pub fn login_message(wallet: &str, nonce: &str) -> String {
    format!("Sign this message to authenticate with opengig.\n\nWallet: {wallet}\nNonce: {nonce}")
}

/// Lowercase and validate a 0x-prefixed 20-byte hex address.
pub fn normalize_wallet(addr: &str) -> Option<String> {
    let addr = addr.trim();
    let hex_part = addr.strip_prefix("0x").or_else(|| addr.strip_prefix("0X"))?;
    if hex_part.len() != 40 || !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    Some(format!("0x{}", hex_part.to_ascii_lowercase()))
}

/// keccak256 of the EIP-191 personal-message envelope.
pub fn personal_hash(message: &str) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(format!("\x19Ethereum Signed Message:\n{}", message.len()).as_bytes());
    hasher.update(message.as_bytes());
    hasher.finalize().into()
}

/// Recover the signing wallet from a 65-byte r||s||v personal signature.
pub fn recover_wallet(message: &str, signature_hex: &str) -> ApiResult<String> {
    let raw = hex::decode(signature_hex.trim_start_matches("0x"))
        .map_err(|_| ApiError::bad_request("signature must be hex"))?;
    if raw.len() != 65 {
        return Err(ApiError::bad_request("signature must be 65 bytes"));
    }
    // Wallets emit v as 27/28; raw recovery ids are 0/1.
    let v = match raw[64] {
        v @ 0..=3 => v,
        v @ 27..=30 => v - 27,
        _ => return Err(ApiError::bad_request("invalid recovery id")),
    };
    let rec_id = RecoveryId::from_i32(v as i32)
        .map_err(|_| ApiError::bad_request("invalid recovery id"))?;
    let sig = RecoverableSignature::from_compact(&raw[..64], rec_id)
        .map_err(|_| ApiError::bad_request("malformed signature"))?;
    let digest = Message::from_digest(personal_hash(message));
    let secp = Secp256k1::new();
    let pubkey = secp
        .recover_ecdsa(&digest, &sig)
        .map_err(|_| ApiError::unauthorized("signature does not verify"))?;
    let uncompressed = pubkey.serialize_uncompressed();
    let mut hasher = Keccak256::new();
    hasher.update(&uncompressed[1..]);
    let hash = hasher.finalize();
    Ok(format!("0x{}", hex::encode(&hash[12..])))
}

/// Random 32-byte hex nonce.
pub fn fresh_nonce() -> String {
    use rand::RngCore;
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
