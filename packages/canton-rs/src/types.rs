//! Common types for bridge operations
//!
//! Shared between the relayer pipelines and the RPC facade: user fingerprints,
//! transfer lifecycle states, audit event kinds, and amount conversion between
//! EVM wei (integer, 10^decimals) and Canton numeric (decimal) amounts.

use alloy::primitives::U256;
use bigdecimal::num_bigint::{BigInt, Sign};
use bigdecimal::{BigDecimal, RoundingMode};
use eyre::{eyre, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Canton numerics carry at most 18 fractional digits; amounts with more are
/// truncated toward zero on both sides of the bridge.
pub const CANTON_NUMERIC_SCALE: i64 = 18;

/// Multihash prefix (sha2-256, 32 bytes) that party-id key fingerprints carry.
const MULTIHASH_SHA256_PREFIX: &str = "1220";

// ============================================================================
// Fingerprint
// ============================================================================

/// A user's Canton identity digest.
///
/// The 32-byte tail of a Canton party id (multihash prefix stripped), which
/// doubles as the `bytes32 cantonRecipient` field on the EVM bridge contract.
/// Stored and displayed as lowercase hex without a `0x` prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(pub [u8; 32]);

impl Fingerprint {
    /// Parse from hex (with or without 0x prefix, any case)
    pub fn from_hex(s: &str) -> Result<Self> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(s).map_err(|e| eyre!("invalid fingerprint hex: {}", e))?;
        if bytes.len() != 32 {
            return Err(eyre!("fingerprint must be 32 bytes, got {}", bytes.len()));
        }
        let mut out = [0u8; 32];
        out.copy_from_slice(&bytes);
        Ok(Fingerprint(out))
    }

    /// Derive from a Canton party id such as
    /// `wayfinder::1220a1b2...` — the fingerprint is the hex tail after the
    /// last `::` with the `1220` multihash prefix stripped.
    pub fn from_party_id(party: &str) -> Result<Self> {
        let tail = party
            .rsplit("::")
            .next()
            .ok_or_else(|| eyre!("party id has no fingerprint tail: {}", party))?;
        let hex_tail = tail.strip_prefix(MULTIHASH_SHA256_PREFIX).unwrap_or(tail);
        Self::from_hex(hex_tail)
            .map_err(|e| eyre!("party id {} has invalid fingerprint tail: {}", party, e))
    }

    /// The EVM-side representation: the raw 32 bytes as `bytes32`.
    pub fn to_bytes32(&self) -> [u8; 32] {
        self.0
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex without 0x, the canonical storage form
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for Fingerprint {
    type Err = eyre::Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_hex(s)
    }
}

// ============================================================================
// Transfer lifecycle
// ============================================================================

/// Direction of a cross-ledger transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    /// EVM lock -> Canton mint
    Deposit,
    /// Canton burn -> EVM unlock
    Withdrawal,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Deposit => "deposit",
            Direction::Withdrawal => "withdrawal",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "deposit" => Ok(Direction::Deposit),
            "withdrawal" => Ok(Direction::Withdrawal),
            other => Err(eyre!("unknown transfer direction: {}", other)),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Processing status for journalled transfers.
///
/// Transitions are monotone within a direction's state machine; `Failed` and
/// `Closed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferStatus {
    /// Event observed and journalled
    Detected,
    /// Deposit only: fingerprint mapping resolved on Canton
    Mapped,
    /// Withdrawal only: user resolved, unlock ready to submit
    Ready,
    /// Command/transaction submitted to the counterparty ledger
    Submitted,
    /// Counterparty ledger accepted; completion step outstanding
    Confirmed,
    /// Permanent failure, operator intervention required
    Failed,
    /// Both ledgers agree
    Closed,
}

impl TransferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::Detected => "detected",
            TransferStatus::Mapped => "mapped",
            TransferStatus::Ready => "ready",
            TransferStatus::Submitted => "submitted",
            TransferStatus::Confirmed => "confirmed",
            TransferStatus::Failed => "failed",
            TransferStatus::Closed => "closed",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "detected" => Ok(TransferStatus::Detected),
            "mapped" => Ok(TransferStatus::Mapped),
            "ready" => Ok(TransferStatus::Ready),
            "submitted" => Ok(TransferStatus::Submitted),
            "confirmed" => Ok(TransferStatus::Confirmed),
            "failed" => Ok(TransferStatus::Failed),
            "closed" => Ok(TransferStatus::Closed),
            other => Err(eyre!("unknown transfer status: {}", other)),
        }
    }

    /// Position in the forward progression; used to enforce monotone updates.
    fn rank(&self) -> u8 {
        match self {
            TransferStatus::Detected => 0,
            TransferStatus::Mapped => 1,
            TransferStatus::Ready => 1,
            TransferStatus::Submitted => 2,
            TransferStatus::Confirmed => 3,
            TransferStatus::Closed => 4,
            TransferStatus::Failed => 5,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TransferStatus::Failed | TransferStatus::Closed)
    }

    /// Whether a CAS transition `self -> to` is legal. Any non-terminal state
    /// may fail; otherwise status only moves forward. A transient error winds
    /// a deposit back from `Mapped` to `Detected`, which is the one sanctioned
    /// backward edge.
    pub fn can_transition_to(&self, to: TransferStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        if to == TransferStatus::Failed {
            return true;
        }
        if *self == TransferStatus::Mapped && to == TransferStatus::Detected {
            return true;
        }
        to.rank() > self.rank()
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Audit events
// ============================================================================

/// Kind of a Canton audit event folded into cached balances
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditEventKind {
    Mint,
    Burn,
    Transfer,
    BridgeMint,
    BridgeBurn,
}

impl AuditEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEventKind::Mint => "mint",
            AuditEventKind::Burn => "burn",
            AuditEventKind::Transfer => "transfer",
            AuditEventKind::BridgeMint => "bridge_mint",
            AuditEventKind::BridgeBurn => "bridge_burn",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "mint" => Ok(AuditEventKind::Mint),
            "burn" => Ok(AuditEventKind::Burn),
            "transfer" => Ok(AuditEventKind::Transfer),
            "bridge_mint" => Ok(AuditEventKind::BridgeMint),
            "bridge_burn" => Ok(AuditEventKind::BridgeBurn),
            other => Err(eyre!("unknown audit event kind: {}", other)),
        }
    }
}

impl fmt::Display for AuditEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Amount conversion
// ============================================================================

/// Convert an EVM integer amount (e.g. wei, 10^decimals units) into a Canton
/// decimal amount.
pub fn wei_to_decimal(amount: U256, decimals: u8) -> BigDecimal {
    // U256 has no direct BigInt conversion; go through the decimal string
    let digits = BigInt::parse_bytes(amount.to_string().as_bytes(), 10).unwrap_or_default();
    BigDecimal::new(digits, decimals as i64)
}

/// Convert a Canton decimal amount into an EVM integer amount, truncating any
/// fractional digits beyond `decimals` toward zero.
pub fn decimal_to_wei(amount: &BigDecimal, decimals: u8) -> Result<U256> {
    if amount.sign() == Sign::Minus {
        return Err(eyre!("amount must not be negative: {}", amount));
    }
    let scaled = amount.with_scale_round(decimals as i64, RoundingMode::Down);
    let (digits, scale) = scaled.into_bigint_and_exponent();
    // scale == decimals after with_scale_round; the bigint is the wei value
    debug_assert_eq!(scale, decimals as i64);
    U256::from_str(&digits.to_string()).map_err(|_| eyre!("amount does not fit in uint256"))
}

/// Truncate a decimal amount to the Canton numeric scale (18 fractional
/// digits), toward zero. Applied to every amount crossing the bridge so both
/// ledgers agree on the exact value.
pub fn truncate_to_canton_scale(amount: &BigDecimal) -> BigDecimal {
    amount.with_scale_round(CANTON_NUMERIC_SCALE, RoundingMode::Down)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_from_hex() {
        let hex = "aa".repeat(32);
        let fp = Fingerprint::from_hex(&hex).unwrap();
        assert_eq!(fp.to_hex(), hex);

        let fp2 = Fingerprint::from_hex(&format!("0x{}", hex.to_uppercase())).unwrap();
        assert_eq!(fp, fp2);

        assert!(Fingerprint::from_hex("abcd").is_err());
        assert!(Fingerprint::from_hex("zz").is_err());
    }

    #[test]
    fn test_fingerprint_from_party_id() {
        let tail = "70990000000000000000000000000000000000000000000000000000000000c8";
        let party = format!("wayfinder::1220{}", tail);
        let fp = Fingerprint::from_party_id(&party).unwrap();
        assert_eq!(fp.to_hex(), tail);

        // Missing multihash prefix is tolerated
        let bare = format!("wayfinder::{}", tail);
        assert_eq!(Fingerprint::from_party_id(&bare).unwrap(), fp);

        assert!(Fingerprint::from_party_id("wayfinder::1220abcd").is_err());
    }

    #[test]
    fn test_status_transitions_monotone() {
        use TransferStatus::*;

        assert!(Detected.can_transition_to(Mapped));
        assert!(Detected.can_transition_to(Ready));
        assert!(Mapped.can_transition_to(Submitted));
        assert!(Ready.can_transition_to(Submitted));
        assert!(Submitted.can_transition_to(Confirmed));
        assert!(Confirmed.can_transition_to(Closed));

        // Transient-error rewind for deposits
        assert!(Mapped.can_transition_to(Detected));

        // Everything non-terminal may fail
        assert!(Detected.can_transition_to(Failed));
        assert!(Confirmed.can_transition_to(Failed));

        // No regression, no leaving terminal states
        assert!(!Submitted.can_transition_to(Detected));
        assert!(!Confirmed.can_transition_to(Submitted));
        assert!(!Closed.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Detected));
        assert!(!Closed.can_transition_to(Submitted));
    }

    #[test]
    fn test_status_round_trip() {
        for s in [
            TransferStatus::Detected,
            TransferStatus::Mapped,
            TransferStatus::Ready,
            TransferStatus::Submitted,
            TransferStatus::Confirmed,
            TransferStatus::Failed,
            TransferStatus::Closed,
        ] {
            assert_eq!(TransferStatus::parse(s.as_str()).unwrap(), s);
        }
        assert!(TransferStatus::parse("bogus").is_err());
    }

    #[test]
    fn test_wei_to_decimal() {
        let amount = U256::from(100u64) * U256::from(10u64).pow(U256::from(18u64));
        let dec = wei_to_decimal(amount, 18);
        assert_eq!(dec, BigDecimal::from(100));

        let half = U256::from(5u64) * U256::from(10u64).pow(U256::from(17u64));
        assert_eq!(wei_to_decimal(half, 18).to_string(), "0.500000000000000000");
    }

    #[test]
    fn test_decimal_to_wei_truncates() {
        let dec: BigDecimal = "1.5".parse().unwrap();
        let wei = decimal_to_wei(&dec, 18).unwrap();
        assert_eq!(wei.to_string(), "1500000000000000000");

        // More than 18 fractional digits truncates toward zero
        let tiny: BigDecimal = "0.1234567890123456789999".parse().unwrap();
        let wei = decimal_to_wei(&tiny, 18).unwrap();
        assert_eq!(wei.to_string(), "123456789012345678");

        let neg: BigDecimal = "-1".parse().unwrap();
        assert!(decimal_to_wei(&neg, 18).is_err());
    }

    #[test]
    fn test_round_trip_wei_decimal() {
        let amount = U256::from(123_456_789u64);
        let dec = wei_to_decimal(amount, 18);
        assert_eq!(decimal_to_wei(&dec, 18).unwrap(), amount);
    }

    #[test]
    fn test_truncate_to_canton_scale() {
        let x: BigDecimal = "1.9999999999999999999".parse().unwrap();
        assert_eq!(
            truncate_to_canton_scale(&x).to_string(),
            "1.999999999999999999"
        );
    }
}
