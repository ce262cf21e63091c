//! Order identity and signatures.
//!
//! The fill hash identifies a logical order across amendments: it covers the
//! immutable fields only, so price, expiry and timestamp can change while
//! fills keep accruing to the same hash. The signature binds the fill hash
//! to the current price and timing for one contract and chain.

use crate::error::SignError;
use crate::shared::{Direction, MarketId};
use alloy::primitives::{Address, Signature, B256, U256};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync;
use serde::Serialize;
use sha3::{Digest, Keccak256};
use std::str::FromStr;

pub const ORDER_GROUP_BYTES: usize = 12;

/// Unsigned order fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub maker: String,
    /// Zero address: anyone may fill.
    pub taker: String,
    pub token: String,
    pub market_id: MarketId,
    /// Wei.
    pub amount: u128,
    pub price: u64,
    pub direction: Direction,
    pub expiry: i64,
    pub timestamp: i64,
    /// 12 random bytes, hex with `0x`.
    pub order_group: String,
}

/// Order as submitted in a `put` frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedOrder {
    pub maker: String,
    pub taker: String,
    pub token: String,
    pub match_id: MarketId,
    pub amount: String,
    pub price: u64,
    pub direction: Direction,
    pub expiry: i64,
    pub timestamp: i64,
    pub order_group: String,
    pub fill_hash: String,
    pub sig: String,
}

pub const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

fn parse_address(s: &str) -> Result<Address, SignError> {
    Address::from_str(s).map_err(|e| SignError::InvalidAddress(format!("{}: {}", s, e)))
}

fn u256_bytes(value: U256) -> [u8; 32] {
    value.to_be_bytes::<32>()
}

fn seconds(value: i64, field: &str) -> Result<U256, SignError> {
    u64::try_from(value)
        .map(U256::from)
        .map_err(|_| SignError::Signing(format!("negative {}: {}", field, value)))
}

/// Random order group, hex-encoded.
pub fn random_order_group() -> String {
    let bytes: [u8; ORDER_GROUP_BYTES] = rand::random();
    format!("0x{}", hex::encode(bytes))
}

impl Order {
    /// Keccak256 over the packed immutable fields:
    /// maker (20) ‖ taker (20) ‖ token (20) ‖ market id (32) ‖ amount (32) ‖
    /// direction (1) ‖ order group (12).
    pub fn fill_hash_bytes(&self) -> Result<[u8; 32], SignError> {
        let market = U256::from_str_radix(self.market_id.as_str(), 10)
            .map_err(|e| SignError::Signing(format!("market id {}: {}", self.market_id, e)))?;
        let group = hex::decode(self.order_group.trim_start_matches("0x"))
            .ok()
            .filter(|b| b.len() == ORDER_GROUP_BYTES)
            .ok_or_else(|| SignError::Signing(format!("bad order group {}", self.order_group)))?;

        let mut hasher = Keccak256::new();
        hasher.update(parse_address(&self.maker)?.as_slice());
        hasher.update(parse_address(&self.taker)?.as_slice());
        hasher.update(parse_address(&self.token)?.as_slice());
        hasher.update(u256_bytes(market));
        hasher.update(u256_bytes(U256::from(self.amount)));
        hasher.update([self.direction.as_u8()]);
        hasher.update(&group);

        Ok(hasher.finalize().into())
    }

    pub fn fill_hash(&self) -> Result<String, SignError> {
        Ok(format!("0x{}", hex::encode(self.fill_hash_bytes()?)))
    }

    /// Digest that gets signed:
    /// contract (20) ‖ chain id (32) ‖ fill hash (32) ‖ price (32) ‖
    /// expiry (32) ‖ timestamp (32).
    pub fn signing_digest(&self, contract: &str, chain_id: u64) -> Result<[u8; 32], SignError> {
        let mut hasher = Keccak256::new();
        hasher.update(parse_address(contract)?.as_slice());
        hasher.update(u256_bytes(U256::from(chain_id)));
        hasher.update(self.fill_hash_bytes()?);
        hasher.update(u256_bytes(U256::from(self.price)));
        hasher.update(u256_bytes(seconds(self.expiry, "expiry")?));
        hasher.update(u256_bytes(seconds(self.timestamp, "timestamp")?));
        Ok(hasher.finalize().into())
    }

    pub fn into_signed(self, sig: String) -> Result<SignedOrder, SignError> {
        let fill_hash = self.fill_hash()?;
        Ok(SignedOrder {
            maker: self.maker,
            taker: self.taker,
            token: self.token,
            match_id: self.market_id,
            amount: self.amount.to_string(),
            price: self.price,
            direction: self.direction,
            expiry: self.expiry,
            timestamp: self.timestamp,
            order_group: self.order_group,
            fill_hash,
            sig,
        })
    }
}

/// Produces order signatures.
pub trait OrderSigner: Send + Sync {
    /// Lowercased maker address.
    fn address(&self) -> String;

    /// Hex signature (`0x` + 65 bytes) over [`Order::signing_digest`].
    fn sign(&self, order: &Order, contract: &str, chain_id: u64) -> Result<String, SignError>;
}

/// [`OrderSigner`] backed by an in-process secp256k1 key.
#[derive(Clone)]
pub struct LocalOrderSigner {
    signer: PrivateKeySigner,
}

impl std::fmt::Debug for LocalOrderSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalOrderSigner")
            .field("address", &self.address())
            .finish()
    }
}

impl LocalOrderSigner {
    pub fn from_private_key(private_key: &str) -> Result<Self, SignError> {
        let key = private_key.strip_prefix("0x").unwrap_or(private_key);
        let bytes = B256::from_str(key).map_err(|e| SignError::InvalidKey(e.to_string()))?;
        let signer =
            PrivateKeySigner::from_bytes(&bytes).map_err(|e| SignError::InvalidKey(e.to_string()))?;
        Ok(Self { signer })
    }

    fn signature(&self, digest: &[u8; 32]) -> Result<Signature, SignError> {
        self.signer
            .sign_message_sync(digest)
            .map_err(|e| SignError::Signing(e.to_string()))
    }
}

impl OrderSigner for LocalOrderSigner {
    fn address(&self) -> String {
        format!("0x{}", hex::encode(self.signer.address().as_slice()))
    }

    fn sign(&self, order: &Order, contract: &str, chain_id: u64) -> Result<String, SignError> {
        let digest = order.signing_digest(contract, chain_id)?;
        let signature = self.signature(&digest)?;
        Ok(format!("0x{}", hex::encode(signature.as_bytes())))
    }
}

/// Lowercased address controlled by a private key.
pub fn address_from_key(private_key: &str) -> Result<String, SignError> {
    LocalOrderSigner::from_private_key(private_key).map(|s| s.address())
}
