//! User registration
//!
//! Custodial path: the caller proves control of an EVM address with an
//! EIP-191 signature; the facade allocates a Canton party, generates and
//! encrypts a signing key, and registers the fingerprint mapping on the
//! ledger. The plaintext key is returned exactly once in the response.
//!
//! Native path: the caller brings their own Canton party id (and optionally a
//! key to custody); the fingerprint is derived from the party id tail.
//!
//! Registration is whitelisted, and the ledger-side RegisterUser choice uses
//! a per-fingerprint command id so a concurrent duplicate collapses into one
//! mapping contract.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use canton_rs::canton::{templates, Command, FingerprintMapping};
use canton_rs::Fingerprint;

use crate::auth::verify_signed_request;
use crate::db;
use crate::erc20::Facade;
use crate::rpc::RpcError;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    /// `"register:<unix-ts>"`, signed by the EVM key being bound
    pub message: String,
    /// EIP-191 signature (custodial path)
    #[serde(default)]
    pub signature: Option<String>,
    /// Native path: bring-your-own party
    #[serde(default)]
    pub canton_party_id: Option<String>,
    /// Native path: optionally hand the facade a key to custody, hex
    #[serde(default)]
    pub canton_private_key: Option<String>,
    /// Native path: EIP-191 signature binding the EVM address
    #[serde(default)]
    pub canton_signature: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub party: String,
    pub fingerprint: String,
    #[serde(rename = "mappingCid")]
    pub mapping_cid: String,
    pub evm_address: String,
    /// Present only for custodial registrations, returned exactly once
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,
}

pub async fn register(
    facade: &Facade,
    request: RegisterRequest,
) -> Result<RegisterResponse, RpcError> {
    let signature = request
        .signature
        .as_deref()
        .or(request.canton_signature.as_deref())
        .ok_or_else(|| RpcError::invalid_params("registration requires a signature"))?;

    let evm_address = verify_signed_request(signature, &request.message, "register")?;
    let evm_address_hex = format!("{:?}", evm_address).to_lowercase();

    if !db::is_whitelisted(&facade.db, &evm_address_hex)
        .await
        .map_err(|e| RpcError::upstream(e.to_string()))?
    {
        return Err(RpcError::new(
            crate::rpc::ERR_UNREGISTERED_CALLER,
            "address is not whitelisted for registration",
        ));
    }

    if db::get_user_by_evm_address(&facade.db, &evm_address_hex)
        .await
        .map_err(|e| RpcError::upstream(e.to_string()))?
        .is_some()
    {
        return Err(RpcError::already_registered());
    }

    let (party, encrypted_key, plaintext_key) = match &request.canton_party_id {
        // Native party: optionally custody the supplied key
        Some(party) => {
            let encrypted = match &request.canton_private_key {
                Some(key_hex) => {
                    let raw = hex::decode(key_hex.trim_start_matches("0x"))
                        .map_err(|_| RpcError::invalid_params("canton_private_key must be hex"))?;
                    Some(
                        facade
                            .keystore
                            .encrypt(&raw)
                            .map_err(|e| RpcError::upstream(e.to_string()))?,
                    )
                }
                None => None,
            };
            (party.clone(), encrypted, None)
        }
        // Custodial: allocate a party and generate a key
        None => {
            let hint = format!("user-{}", &evm_address_hex[2..10]);
            let party = facade
                .canton
                .allocate_party(&hint)
                .await
                .map_err(|e| RpcError::upstream(e.to_string()))?;
            let (encrypted, _public, plaintext) = facade
                .keystore
                .generate_key()
                .map_err(|e| RpcError::upstream(e.to_string()))?;
            (party, Some(encrypted), Some(plaintext.to_string()))
        }
    };

    let fingerprint = Fingerprint::from_party_id(&party)
        .map_err(|e| RpcError::invalid_params(format!("party id has no fingerprint: {}", e)))?;

    let mapping_cid =
        register_on_ledger(facade, &party, &fingerprint, &evm_address_hex).await?;

    db::insert_user(
        &facade.db,
        &evm_address_hex,
        &fingerprint.to_hex(),
        &party,
        encrypted_key.as_deref(),
        &mapping_cid,
    )
    .await
    .map_err(|e| RpcError::upstream(e.to_string()))?;

    info!(
        evm_address = %evm_address_hex,
        party = %party,
        fingerprint = %fingerprint,
        custodial = plaintext_key.is_some(),
        "User registered"
    );

    Ok(RegisterResponse {
        party,
        fingerprint: fingerprint.to_hex(),
        mapping_cid,
        evm_address: evm_address_hex,
        private_key: plaintext_key,
    })
}

/// Exercise RegisterUser and return the FingerprintMapping CID, riding the
/// ledger's deduplication for concurrent duplicates.
async fn register_on_ledger(
    facade: &Facade,
    party: &str,
    fingerprint: &Fingerprint,
    evm_address: &str,
) -> Result<String, RpcError> {
    let bridge_configs = facade
        .canton
        .active_contracts(&facade.templates.bridge_config(), None)
        .await
        .map_err(|e| RpcError::upstream(e.to_string()))?;
    let config_cid = bridge_configs
        .first()
        .map(|ev| ev.contract_id.clone())
        .ok_or_else(|| RpcError::upstream("no bridge config contract on ledger"))?;

    let command = Command::exercise(
        &facade.templates.bridge_config(),
        config_cid,
        "RegisterUser",
        templates::register_user_args(party, &fingerprint.to_hex(), Some(evm_address)),
    );
    let command_id = format!("register-user-{}", fingerprint.to_hex());

    match facade
        .canton
        .submit_and_wait(&[command], &command_id, &[], None)
        .await
    {
        Ok(tree) => tree
            .find_created(&facade.templates.fingerprint_mapping())
            .map(|ev| ev.contract_id.clone())
            .ok_or_else(|| RpcError::upstream("RegisterUser returned no FingerprintMapping")),
        Err(e) if e.is_duplicate_command() => {
            debug!(fingerprint = %fingerprint, "RegisterUser deduplicated, re-querying");
            let mappings = facade
                .canton
                .active_contracts(&facade.templates.fingerprint_mapping(), None)
                .await
                .map_err(|e| RpcError::upstream(e.to_string()))?;
            mappings
                .iter()
                .filter_map(|ev| FingerprintMapping::from_event(ev).ok())
                .find(|m| m.fingerprint == *fingerprint)
                .map(|m| m.contract_id)
                .ok_or_else(|| RpcError::upstream("mapping not found after duplicate register"))
        }
        Err(e) => Err(RpcError::upstream(e.to_string())),
    }
}
