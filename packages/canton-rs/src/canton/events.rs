//! Typed decoders for the contract payloads the bridge consumes
//!
//! Each decoder knows the field layout of exactly one template and keeps that
//! knowledge out of the pipelines. Decode failures are permanent errors — a
//! payload that does not match its template means a package mismatch, not a
//! transient fault.

use bigdecimal::BigDecimal;
use eyre::{eyre, Result};

use super::client::CreatedEvent;
use super::templates::BridgeTemplates;
use crate::types::{AuditEventKind, Fingerprint};

/// A `FingerprintMapping` contract binding a user party to its digest
#[derive(Debug, Clone)]
pub struct FingerprintMapping {
    pub contract_id: String,
    pub user_party: String,
    pub fingerprint: Fingerprint,
    pub evm_address: Option<String>,
}

impl FingerprintMapping {
    pub fn from_event(event: &CreatedEvent) -> Result<Self> {
        let arg = &event.create_argument;
        Ok(Self {
            contract_id: event.contract_id.clone(),
            user_party: arg.get_party("userParty")?.to_string(),
            fingerprint: Fingerprint::from_hex(arg.get_text("fingerprint")?)?,
            evm_address: arg
                .get_optional_text("evmAddress")?
                .map(|s| s.to_lowercase()),
        })
    }
}

/// Status of a `WithdrawalEvent` contract
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WithdrawalEventStatus {
    Pending,
    Completed,
}

/// A `WithdrawalEvent` created by `WithdrawalRequest.ProcessWithdrawal` —
/// the burn record the relayer pays out on the EVM side
#[derive(Debug, Clone)]
pub struct WithdrawalEvent {
    pub contract_id: String,
    pub owner_party: String,
    pub fingerprint: Fingerprint,
    pub token_symbol: String,
    pub amount: BigDecimal,
    /// Destination address on the EVM chain, lowercased hex
    pub evm_destination: String,
    pub status: WithdrawalEventStatus,
}

impl WithdrawalEvent {
    pub fn from_event(event: &CreatedEvent) -> Result<Self> {
        let arg = &event.create_argument;
        let (tag, _) = arg.get_variant("status")?;
        let status = match tag {
            "Pending" => WithdrawalEventStatus::Pending,
            "Completed" => WithdrawalEventStatus::Completed,
            other => return Err(eyre!("unknown WithdrawalEvent status: {}", other)),
        };

        Ok(Self {
            contract_id: event.contract_id.clone(),
            owner_party: arg.get_party("owner")?.to_string(),
            fingerprint: Fingerprint::from_hex(arg.get_text("fingerprint")?)?,
            token_symbol: arg.get_text("symbol")?.to_string(),
            amount: arg.get_numeric("amount")?,
            evm_destination: arg.get_text("evmDestination")?.to_lowercase(),
            status,
        })
    }
}

/// A `CIP56Holding` contract — one owner's balance slice of a token
#[derive(Debug, Clone)]
pub struct Cip56Holding {
    pub contract_id: String,
    pub owner_party: String,
    pub token_symbol: String,
    pub amount: BigDecimal,
}

impl Cip56Holding {
    pub fn from_event(event: &CreatedEvent) -> Result<Self> {
        let arg = &event.create_argument;
        Ok(Self {
            contract_id: event.contract_id.clone(),
            owner_party: arg.get_party("owner")?.to_string(),
            token_symbol: arg.get_text("symbol")?.to_string(),
            amount: arg.get_numeric("amount")?,
        })
    }
}

/// A decoded audit event, the reconciler's unit of work
#[derive(Debug, Clone)]
pub struct AuditEvent {
    pub contract_id: String,
    pub kind: AuditEventKind,
    pub token_symbol: String,
    pub amount: BigDecimal,
    /// Set for mint/burn kinds
    pub fingerprint: Option<Fingerprint>,
    /// Set for transfers
    pub sender_fingerprint: Option<Fingerprint>,
    pub recipient_fingerprint: Option<Fingerprint>,
}

impl AuditEvent {
    /// Decode a created event if it is one of the audit templates; returns
    /// `Ok(None)` for unrelated templates so stream consumers can skip them.
    pub fn from_created(
        templates: &BridgeTemplates,
        event: &CreatedEvent,
    ) -> Result<Option<Self>> {
        let kind = if event.is_template(&templates.mint_event()) {
            AuditEventKind::Mint
        } else if event.is_template(&templates.burn_event()) {
            AuditEventKind::Burn
        } else if event.is_template(&templates.transfer_event()) {
            AuditEventKind::Transfer
        } else if event.is_template(&templates.bridge_mint_event()) {
            AuditEventKind::BridgeMint
        } else if event.is_template(&templates.bridge_burn_event()) {
            AuditEventKind::BridgeBurn
        } else {
            return Ok(None);
        };

        let arg = &event.create_argument;
        let amount = arg.get_numeric("amount")?;
        let token_symbol = arg.get_text("symbol")?.to_string();

        let (fingerprint, sender, recipient) = match kind {
            AuditEventKind::Transfer => (
                None,
                Some(Fingerprint::from_hex(arg.get_text("senderFingerprint")?)?),
                Some(Fingerprint::from_hex(arg.get_text("recipientFingerprint")?)?),
            ),
            _ => (
                Some(Fingerprint::from_hex(arg.get_text("fingerprint")?)?),
                None,
                None,
            ),
        };

        Ok(Some(Self {
            contract_id: event.contract_id.clone(),
            kind,
            token_symbol,
            amount,
            fingerprint,
            sender_fingerprint: sender,
            recipient_fingerprint: recipient,
        }))
    }

    /// Balance delta this event applies to a given fingerprint, zero when the
    /// fingerprint is not involved.
    pub fn delta_for(&self, fingerprint: &Fingerprint) -> BigDecimal {
        use AuditEventKind::*;
        match self.kind {
            Mint | BridgeMint => {
                if self.fingerprint.as_ref() == Some(fingerprint) {
                    self.amount.clone()
                } else {
                    BigDecimal::from(0)
                }
            }
            Burn | BridgeBurn => {
                if self.fingerprint.as_ref() == Some(fingerprint) {
                    -self.amount.clone()
                } else {
                    BigDecimal::from(0)
                }
            }
            Transfer => {
                let mut delta = BigDecimal::from(0);
                if self.recipient_fingerprint.as_ref() == Some(fingerprint) {
                    delta += self.amount.clone();
                }
                if self.sender_fingerprint.as_ref() == Some(fingerprint) {
                    delta -= self.amount.clone();
                }
                delta
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canton::value::LfValue;

    fn templates() -> BridgeTemplates {
        BridgeTemplates::new("bridge", "core", "cip56")
    }

    fn fp(byte: u8) -> Fingerprint {
        Fingerprint([byte; 32])
    }

    fn created(template_id: &str, arg: LfValue) -> CreatedEvent {
        CreatedEvent {
            contract_id: "00aa".to_string(),
            template_id: template_id.to_string(),
            create_argument: arg,
        }
    }

    #[test]
    fn test_decode_withdrawal_event() {
        let arg = LfValue::record([
            ("owner", LfValue::party("user::1220aa")),
            ("fingerprint", LfValue::text(fp(0xaa).to_hex())),
            ("symbol", LfValue::text("PROMPT")),
            ("amount", LfValue::text("50.0")),
            ("evmDestination", LfValue::text("0x7099AABB0000000000000000000000000000AAc8")),
            ("status", LfValue::variant("Pending", LfValue::Unit)),
        ]);
        let event = created("bridge:Wayfinder.Bridge:WithdrawalEvent", arg);

        let withdrawal = WithdrawalEvent::from_event(&event).unwrap();
        assert_eq!(withdrawal.status, WithdrawalEventStatus::Pending);
        assert_eq!(withdrawal.amount, BigDecimal::from(50));
        // Destination is normalised to lowercase
        assert_eq!(
            withdrawal.evm_destination,
            "0x7099aabb0000000000000000000000000000aac8"
        );
    }

    #[test]
    fn test_decode_audit_mint_and_transfer() {
        let t = templates();

        let mint_arg = LfValue::record([
            ("fingerprint", LfValue::text(fp(0x11).to_hex())),
            ("symbol", LfValue::text("PROMPT")),
            ("amount", LfValue::text("100.0")),
        ]);
        let mint = AuditEvent::from_created(
            &t,
            &created("cip56:CIP56.Token:BridgeMintEvent", mint_arg),
        )
        .unwrap()
        .unwrap();
        assert_eq!(mint.kind, AuditEventKind::BridgeMint);
        assert_eq!(mint.delta_for(&fp(0x11)), BigDecimal::from(100));
        assert_eq!(mint.delta_for(&fp(0x22)), BigDecimal::from(0));

        let transfer_arg = LfValue::record([
            ("senderFingerprint", LfValue::text(fp(0x11).to_hex())),
            ("recipientFingerprint", LfValue::text(fp(0x22).to_hex())),
            ("symbol", LfValue::text("PROMPT")),
            ("amount", LfValue::text("30.0")),
        ]);
        let transfer = AuditEvent::from_created(
            &t,
            &created("cip56:CIP56.Token:TransferEvent", transfer_arg),
        )
        .unwrap()
        .unwrap();
        assert_eq!(transfer.delta_for(&fp(0x11)), BigDecimal::from(-30));
        assert_eq!(transfer.delta_for(&fp(0x22)), BigDecimal::from(30));

        // Self-transfer nets to zero
        let self_arg = LfValue::record([
            ("senderFingerprint", LfValue::text(fp(0x33).to_hex())),
            ("recipientFingerprint", LfValue::text(fp(0x33).to_hex())),
            ("symbol", LfValue::text("PROMPT")),
            ("amount", LfValue::text("5.0")),
        ]);
        let self_transfer = AuditEvent::from_created(
            &t,
            &created("cip56:CIP56.Token:TransferEvent", self_arg),
        )
        .unwrap()
        .unwrap();
        assert_eq!(self_transfer.delta_for(&fp(0x33)), BigDecimal::from(0));
    }

    #[test]
    fn test_unrelated_template_skipped() {
        let t = templates();
        let event = created(
            "cip56:CIP56.Token:CIP56Holding",
            LfValue::record([("owner", LfValue::party("p::1"))]),
        );
        assert!(AuditEvent::from_created(&t, &event).unwrap().is_none());
    }
}
