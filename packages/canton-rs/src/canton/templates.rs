//! Template identifiers and choice argument builders
//!
//! The bridge depends on a fixed set of Canton templates spread over three
//! packages (bridge, core token, CIP-56 holding standard). Package IDs are
//! configured per deployment; when multiple package versions of a module
//! coexist during an upgrade, the configured ID is authoritative.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use eyre::{eyre, Result};
use std::fmt;

use super::value::LfValue;

/// Fully qualified Canton template identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TemplateId {
    pub package_id: String,
    pub module: String,
    pub entity: String,
}

impl TemplateId {
    pub fn new(
        package_id: impl Into<String>,
        module: impl Into<String>,
        entity: impl Into<String>,
    ) -> Self {
        Self {
            package_id: package_id.into(),
            module: module.into(),
            entity: entity.into(),
        }
    }

    /// Parse `package:Module:Entity`
    pub fn parse(s: &str) -> Result<Self> {
        let mut parts = s.splitn(3, ':');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(pkg), Some(module), Some(entity))
                if !pkg.is_empty() && !module.is_empty() && !entity.is_empty() =>
            {
                Ok(Self::new(pkg, module, entity))
            }
            _ => Err(eyre!("invalid template id: {}", s)),
        }
    }

    /// Whether a wire template id string refers to this template.
    ///
    /// The package id must match exactly — module+entity alone is not enough
    /// while old package versions are still live on the ledger.
    pub fn matches(&self, wire: &str) -> bool {
        match Self::parse(wire) {
            Ok(parsed) => parsed == *self,
            Err(_) => false,
        }
    }
}

impl fmt::Display for TemplateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.package_id, self.module, self.entity)
    }
}

/// The template set of one bridge deployment
#[derive(Debug, Clone)]
pub struct BridgeTemplates {
    bridge_package_id: String,
    core_package_id: String,
    cip56_package_id: String,
}

impl BridgeTemplates {
    pub fn new(
        bridge_package_id: impl Into<String>,
        core_package_id: impl Into<String>,
        cip56_package_id: impl Into<String>,
    ) -> Self {
        Self {
            bridge_package_id: bridge_package_id.into(),
            core_package_id: core_package_id.into(),
            cip56_package_id: cip56_package_id.into(),
        }
    }

    // Bridge package ----------------------------------------------------

    pub fn bridge_config(&self) -> TemplateId {
        TemplateId::new(&self.bridge_package_id, "Wayfinder.Bridge", "WayfinderBridgeConfig")
    }

    pub fn fingerprint_mapping(&self) -> TemplateId {
        TemplateId::new(&self.bridge_package_id, "Wayfinder.Bridge", "FingerprintMapping")
    }

    pub fn withdrawal_request(&self) -> TemplateId {
        TemplateId::new(&self.bridge_package_id, "Wayfinder.Bridge", "WithdrawalRequest")
    }

    pub fn withdrawal_event(&self) -> TemplateId {
        TemplateId::new(&self.bridge_package_id, "Wayfinder.Bridge", "WithdrawalEvent")
    }

    // Core token package -------------------------------------------------

    pub fn token_config(&self) -> TemplateId {
        TemplateId::new(&self.core_package_id, "Wayfinder.Token", "TokenConfig")
    }

    // CIP-56 package -----------------------------------------------------

    pub fn cip56_holding(&self) -> TemplateId {
        TemplateId::new(&self.cip56_package_id, "CIP56.Token", "CIP56Holding")
    }

    pub fn mint_event(&self) -> TemplateId {
        TemplateId::new(&self.cip56_package_id, "CIP56.Token", "MintEvent")
    }

    pub fn burn_event(&self) -> TemplateId {
        TemplateId::new(&self.cip56_package_id, "CIP56.Token", "BurnEvent")
    }

    pub fn transfer_event(&self) -> TemplateId {
        TemplateId::new(&self.cip56_package_id, "CIP56.Token", "TransferEvent")
    }

    pub fn bridge_mint_event(&self) -> TemplateId {
        TemplateId::new(&self.cip56_package_id, "CIP56.Token", "BridgeMintEvent")
    }

    pub fn bridge_burn_event(&self) -> TemplateId {
        TemplateId::new(&self.cip56_package_id, "CIP56.Token", "BridgeBurnEvent")
    }

    /// All audit-event templates the reconciler folds
    pub fn audit_event_templates(&self) -> Vec<TemplateId> {
        vec![
            self.mint_event(),
            self.burn_event(),
            self.transfer_event(),
            self.bridge_mint_event(),
            self.bridge_burn_event(),
        ]
    }
}

// ============================================================================
// Choice arguments
// ============================================================================

/// `WayfinderBridgeConfig.RegisterUser`
pub fn register_user_args(
    user_party: &str,
    fingerprint_hex: &str,
    evm_address: Option<&str>,
) -> LfValue {
    LfValue::record([
        ("userParty", LfValue::party(user_party)),
        ("fingerprint", LfValue::text(fingerprint_hex)),
        (
            "evmAddress",
            LfValue::optional(evm_address.map(LfValue::text)),
        ),
    ])
}

/// `WayfinderBridgeConfig.InitiateWithdrawal`
pub fn initiate_withdrawal_args(
    mapping_cid: &str,
    holding_cid: &str,
    amount: &BigDecimal,
    evm_destination: &str,
) -> LfValue {
    LfValue::record([
        ("mappingCid", LfValue::contract_id(mapping_cid)),
        ("holdingCid", LfValue::contract_id(holding_cid)),
        ("amount", LfValue::numeric(amount)),
        ("evmDestination", LfValue::text(evm_destination)),
    ])
}

/// `WithdrawalRequest.ProcessWithdrawal` takes no arguments
pub fn process_withdrawal_args() -> LfValue {
    LfValue::record::<[(&str, LfValue); 0], &str>([])
}

/// `WithdrawalEvent.CompleteWithdrawal`
pub fn complete_withdrawal_args(evm_tx_hash: &str) -> LfValue {
    LfValue::record([("evmTxHash", LfValue::text(evm_tx_hash))])
}

/// `TokenConfig.IssuerMint`
pub fn issuer_mint_args(
    recipient_party: &str,
    amount: &BigDecimal,
    event_time: DateTime<Utc>,
    user_fingerprint: &str,
    evm_tx_hash: Option<&str>,
) -> LfValue {
    LfValue::record([
        ("recipient", LfValue::party(recipient_party)),
        ("amount", LfValue::numeric(amount)),
        ("eventTime", LfValue::timestamp(event_time)),
        ("userFingerprint", LfValue::text(user_fingerprint)),
        (
            "evmTxHash",
            LfValue::optional(evm_tx_hash.map(LfValue::text)),
        ),
    ])
}

/// `CIP56Holding.Transfer`
pub fn holding_transfer_args(recipient_party: &str, amount: &BigDecimal) -> LfValue {
    LfValue::record([
        ("recipient", LfValue::party(recipient_party)),
        ("amount", LfValue::numeric(amount)),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_id_parse_display() {
        let tid = TemplateId::parse("abc123:Wayfinder.Bridge:WithdrawalEvent").unwrap();
        assert_eq!(tid.package_id, "abc123");
        assert_eq!(tid.module, "Wayfinder.Bridge");
        assert_eq!(tid.entity, "WithdrawalEvent");
        assert_eq!(tid.to_string(), "abc123:Wayfinder.Bridge:WithdrawalEvent");

        assert!(TemplateId::parse("no-colons").is_err());
        assert!(TemplateId::parse("a:b").is_err());
        assert!(TemplateId::parse("::x").is_err());
    }

    #[test]
    fn test_template_matching_requires_package_id() {
        let templates = BridgeTemplates::new("pkgA", "pkgB", "pkgC");
        let holding = templates.cip56_holding();

        assert!(holding.matches("pkgC:CIP56.Token:CIP56Holding"));
        // Same module+entity from an older package version does not match
        assert!(!holding.matches("pkgOld:CIP56.Token:CIP56Holding"));
        assert!(!holding.matches("pkgC:CIP56.Token:MintEvent"));
        assert!(!holding.matches("garbage"));
    }

    #[test]
    fn test_issuer_mint_args_shape() {
        let args = issuer_mint_args(
            "user::1220aa",
            &"100.0".parse().unwrap(),
            DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
            "aabb",
            Some("0xdeadbeef"),
        );
        assert_eq!(args.get_party("recipient").unwrap(), "user::1220aa");
        assert_eq!(args.get_numeric("amount").unwrap().to_string(), "100.0");
        assert_eq!(args.get_optional_text("evmTxHash").unwrap(), Some("0xdeadbeef"));
        assert!(args.get_timestamp("eventTime").is_ok());
    }

    #[test]
    fn test_register_user_args_without_address() {
        let args = register_user_args("user::1220aa", "aabb", None);
        assert_eq!(args.get_optional("evmAddress").unwrap(), None);
        assert_eq!(args.get_text("fingerprint").unwrap(), "aabb");
    }
}
