//! Canton JSON Ledger API client
//!
//! Wraps the ledger's HTTP API: ledger-end reads, active-contract queries by
//! template, update streams for the reconciler, party allocation, and command
//! submission that waits for the resulting transaction tree so callers can
//! capture created contract IDs.
//!
//! Contract IDs cross this boundary as opaque strings only; the client never
//! hands out references into an in-memory contract graph.

use eyre::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use super::auth::TokenProvider;
use super::templates::TemplateId;
use super::value::LfValue;

/// Default per-call deadline
const CALL_TIMEOUT: Duration = Duration::from_secs(30);
/// Active-contract scans page through the whole ACS and get a longer deadline
const SCAN_TIMEOUT: Duration = Duration::from_secs(120);

/// Errors from the ledger, classified for retry decisions
#[derive(Debug, Error)]
pub enum CantonError {
    #[error("ledger transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("ledger rejected request ({code}): {message}")]
    Status {
        http: u16,
        code: String,
        message: String,
    },
    #[error("failed to decode ledger response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("ledger authentication failed: {0}")]
    Auth(String),
}

impl CantonError {
    /// Transient errors are retried with backoff; everything else is terminal
    /// for the attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            CantonError::Transport(_) => true,
            CantonError::Status { http, code, .. } => {
                *http >= 500
                    || code == "UNAVAILABLE"
                    || code == "DEADLINE_EXCEEDED"
                    || code == "ABORTED"
                    || code == "RESOURCE_EXHAUSTED"
            }
            _ => false,
        }
    }

    /// Command deduplication hit: the ledger already executed this commandId.
    /// Treated as success; the caller re-queries for the created contract.
    pub fn is_duplicate_command(&self) -> bool {
        match self {
            CantonError::Status { code, message, .. } => {
                code == "ALREADY_EXISTS"
                    && (message.contains("DUPLICATE_COMMAND") || message.contains("duplicate"))
            }
            _ => false,
        }
    }

    pub fn is_invalid_argument(&self) -> bool {
        matches!(
            self,
            CantonError::Status { code, .. }
                if code == "INVALID_ARGUMENT" || code == "FAILED_PRECONDITION"
        )
    }

    pub fn is_auth(&self) -> bool {
        match self {
            CantonError::Auth(_) => true,
            CantonError::Status { http, code, .. } => {
                *http == 401 || *http == 403 || code == "UNAUTHENTICATED"
            }
            _ => false,
        }
    }
}

/// Shape of the ledger's error body
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: String,
    #[serde(default, alias = "cause")]
    message: String,
}

/// A contract creation observed in a transaction tree or the ACS
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedEvent {
    pub contract_id: String,
    /// Fully qualified `package:Module:Entity`
    pub template_id: String,
    pub create_argument: LfValue,
}

impl CreatedEvent {
    pub fn is_template(&self, template: &TemplateId) -> bool {
        template.matches(&self.template_id)
    }
}

/// A contract archival observed in a transaction tree
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchivedEvent {
    pub contract_id: String,
    pub template_id: String,
}

/// One event in a transaction tree
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TreeEvent {
    Created(CreatedEvent),
    Archived(ArchivedEvent),
}

impl TreeEvent {
    pub fn as_created(&self) -> Option<&CreatedEvent> {
        match self {
            TreeEvent::Created(ev) => Some(ev),
            TreeEvent::Archived(_) => None,
        }
    }
}

/// A command to submit
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Command {
    #[serde(rename_all = "camelCase")]
    Create {
        template_id: String,
        create_arguments: LfValue,
    },
    #[serde(rename_all = "camelCase")]
    Exercise {
        template_id: String,
        contract_id: String,
        choice: String,
        choice_argument: LfValue,
    },
}

impl Command {
    pub fn exercise(
        template: &TemplateId,
        contract_id: impl Into<String>,
        choice: impl Into<String>,
        argument: LfValue,
    ) -> Self {
        Command::Exercise {
            template_id: template.to_string(),
            contract_id: contract_id.into(),
            choice: choice.into(),
            choice_argument: argument,
        }
    }

    pub fn create(template: &TemplateId, arguments: LfValue) -> Self {
        Command::Create {
            template_id: template.to_string(),
            create_arguments: arguments,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SubmitBody<'a> {
    commands: &'a [Command],
    command_id: &'a str,
    act_as: &'a [String],
    user_id: &'a str,
    /// Detached party signature for interactive (custodial) submissions
    #[serde(skip_serializing_if = "Option::is_none")]
    party_signature: Option<&'a str>,
}

/// The transaction resulting from a successful submission
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionTree {
    pub update_id: String,
    pub offset: i64,
    #[serde(default)]
    pub events: Vec<TreeEvent>,
}

impl TransactionTree {
    /// First creation of the given template in this transaction
    pub fn find_created(&self, template: &TemplateId) -> Option<&CreatedEvent> {
        self.events
            .iter()
            .filter_map(TreeEvent::as_created)
            .find(|ev| ev.is_template(template))
    }
}

/// One element of the update stream
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerUpdate {
    pub offset: i64,
    pub update_id: String,
    #[serde(default)]
    pub events: Vec<TreeEvent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LedgerEndResponse {
    offset: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ActiveContractsResponse {
    #[serde(default)]
    active_contracts: Vec<ActiveContractEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ActiveContractEntry {
    created_event: CreatedEvent,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdatesResponse {
    #[serde(default)]
    updates: Vec<LedgerUpdate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AllocatePartyResponse {
    party: String,
}

/// Configuration for the ledger client
#[derive(Debug, Clone)]
pub struct CantonClientConfig {
    pub rpc_url: String,
    /// The relayer party every command acts as by default
    pub relayer_party: String,
}

/// Canton JSON Ledger API client
pub struct CantonClient {
    http: reqwest::Client,
    base_url: String,
    relayer_party: String,
    auth: Option<TokenProvider>,
}

impl CantonClient {
    pub fn new(config: CantonClientConfig, auth: Option<TokenProvider>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(CALL_TIMEOUT)
            .build()?;

        Ok(Self {
            http,
            base_url: config.rpc_url.trim_end_matches('/').to_string(),
            relayer_party: config.relayer_party,
            auth,
        })
    }

    pub fn relayer_party(&self) -> &str {
        &self.relayer_party
    }

    async fn bearer(&self) -> Result<Option<(String, String)>, CantonError> {
        match &self.auth {
            None => Ok(None),
            Some(provider) => {
                let bearer = provider
                    .bearer()
                    .await
                    .map_err(|e| CantonError::Auth(e.to_string()))?;
                Ok(Some((bearer.token, bearer.user_id)))
            }
        }
    }

    async fn decode_error(response: reqwest::Response) -> CantonError {
        let http = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        let parsed: ErrorBody = serde_json::from_str(&body).unwrap_or(ErrorBody {
            code: String::new(),
            message: body.clone(),
        });
        CantonError::Status {
            http,
            code: parsed.code,
            message: parsed.message,
        }
    }

    /// Current ledger end offset
    pub async fn ledger_end(&self) -> Result<i64, CantonError> {
        let url = format!("{}/v2/state/ledger-end", self.base_url);
        let mut req = self.http.get(&url);
        if let Some((token, _)) = self.bearer().await? {
            req = req.bearer_auth(token);
        }
        let response = req.send().await?;
        if !response.status().is_success() {
            return Err(Self::decode_error(response).await);
        }
        let end: LedgerEndResponse = response.json().await?;
        Ok(end.offset)
    }

    /// Active contracts of one template visible to the relayer party.
    ///
    /// `active_at` defaults to the current ledger end.
    pub async fn active_contracts(
        &self,
        template: &TemplateId,
        active_at: Option<i64>,
    ) -> Result<Vec<CreatedEvent>, CantonError> {
        let offset = match active_at {
            Some(offset) => offset,
            None => self.ledger_end().await?,
        };

        let url = format!("{}/v2/state/active-contracts", self.base_url);
        let body = serde_json::json!({
            "activeAtOffset": offset,
            "party": self.relayer_party,
            "templateIds": [template.to_string()],
        });

        let mut req = self.http.post(&url).timeout(SCAN_TIMEOUT).json(&body);
        if let Some((token, _)) = self.bearer().await? {
            req = req.bearer_auth(token);
        }
        let response = req.send().await?;
        if !response.status().is_success() {
            return Err(Self::decode_error(response).await);
        }

        let acs: ActiveContractsResponse = response.json().await?;
        debug!(
            template = %template,
            offset,
            contracts = acs.active_contracts.len(),
            "Active contract query"
        );
        Ok(acs
            .active_contracts
            .into_iter()
            .map(|entry| entry.created_event)
            .collect())
    }

    /// Flat updates in `(begin_exclusive, end_inclusive]` touching the given
    /// templates, in offset order. Used by the reconciler and the burn poller.
    pub async fn updates(
        &self,
        begin_exclusive: i64,
        end_inclusive: i64,
        templates: &[TemplateId],
    ) -> Result<Vec<LedgerUpdate>, CantonError> {
        let url = format!("{}/v2/updates/flats", self.base_url);
        let body = serde_json::json!({
            "beginExclusive": begin_exclusive,
            "endInclusive": end_inclusive,
            "party": self.relayer_party,
            "templateIds": templates.iter().map(|t| t.to_string()).collect::<Vec<_>>(),
        });

        let mut req = self.http.post(&url).timeout(SCAN_TIMEOUT).json(&body);
        if let Some((token, _)) = self.bearer().await? {
            req = req.bearer_auth(token);
        }
        let response = req.send().await?;
        if !response.status().is_success() {
            return Err(Self::decode_error(response).await);
        }

        let updates: UpdatesResponse = response.json().await?;
        Ok(updates.updates)
    }

    /// Allocate a fresh party on the ledger (custodial registrations)
    pub async fn allocate_party(&self, hint: &str) -> Result<String, CantonError> {
        let url = format!("{}/v2/parties", self.base_url);
        let body = serde_json::json!({ "partyIdHint": hint });

        let mut req = self.http.post(&url).json(&body);
        if let Some((token, _)) = self.bearer().await? {
            req = req.bearer_auth(token);
        }
        let response = req.send().await?;
        if !response.status().is_success() {
            return Err(Self::decode_error(response).await);
        }
        let allocated: AllocatePartyResponse = response.json().await?;
        Ok(allocated.party)
    }

    /// Submit commands and wait for the resulting transaction tree.
    ///
    /// Acts as the relayer party; `extra_act_as` adds user parties for
    /// custodial submissions. On an UNAUTHENTICATED response the token is
    /// force-refreshed and the submission retried exactly once — safe because
    /// the ledger deduplicates on `command_id`.
    pub async fn submit_and_wait(
        &self,
        commands: &[Command],
        command_id: &str,
        extra_act_as: &[String],
        party_signature: Option<&str>,
    ) -> Result<TransactionTree, CantonError> {
        let mut act_as = vec![self.relayer_party.clone()];
        act_as.extend(extra_act_as.iter().cloned());

        match self
            .submit_once(commands, command_id, &act_as, party_signature)
            .await
        {
            Err(err) if err.is_auth() && self.auth.is_some() => {
                warn!(command_id, "Ledger rejected token, refreshing and retrying once");
                if let Some(provider) = &self.auth {
                    provider
                        .force_refresh()
                        .await
                        .map_err(|e| CantonError::Auth(e.to_string()))?;
                }
                self.submit_once(commands, command_id, &act_as, party_signature)
                    .await
            }
            other => other,
        }
    }

    async fn submit_once(
        &self,
        commands: &[Command],
        command_id: &str,
        act_as: &[String],
        party_signature: Option<&str>,
    ) -> Result<TransactionTree, CantonError> {
        let url = format!(
            "{}/v2/commands/submit-and-wait-for-transaction-tree",
            self.base_url
        );

        let bearer = self.bearer().await?;
        let user_id = bearer
            .as_ref()
            .map(|(_, user)| user.as_str())
            .unwrap_or(self.relayer_party.as_str());

        let body = SubmitBody {
            commands,
            command_id,
            act_as,
            user_id,
            party_signature,
        };

        let mut req = self.http.post(&url).json(&body);
        if let Some((token, _)) = &bearer {
            req = req.bearer_auth(token);
        }
        let response = req.send().await?;
        if !response.status().is_success() {
            return Err(Self::decode_error(response).await);
        }
        let tree: TransactionTree = response.json().await?;
        Ok(tree)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(http: u16, code: &str, message: &str) -> CantonError {
        CantonError::Status {
            http,
            code: code.to_string(),
            message: message.to_string(),
        }
    }

    #[test]
    fn test_error_classification() {
        assert!(status(503, "UNAVAILABLE", "node down").is_transient());
        assert!(status(500, "", "internal").is_transient());
        assert!(status(409, "ABORTED", "contention").is_transient());
        assert!(!status(400, "INVALID_ARGUMENT", "bad arg").is_transient());

        assert!(status(400, "INVALID_ARGUMENT", "bad arg").is_invalid_argument());
        assert!(status(409, "ALREADY_EXISTS", "DUPLICATE_COMMAND").is_duplicate_command());
        assert!(!status(409, "ALREADY_EXISTS", "contract key").is_duplicate_command());

        assert!(status(401, "", "").is_auth());
        assert!(status(403, "PERMISSION_DENIED", "").is_auth());
        assert!(CantonError::Auth("no token".to_string()).is_auth());
    }

    #[test]
    fn test_tree_event_decode() {
        let json = r#"{
            "updateId": "u-1",
            "offset": 42,
            "events": [
                {"created": {
                    "contractId": "00aa",
                    "templateId": "pkg:CIP56.Token:CIP56Holding",
                    "createArgument": {"owner": "p::1", "symbol": "PROMPT", "amount": "1.0"}
                }},
                {"archived": {"contractId": "00bb", "templateId": "pkg:Wayfinder.Bridge:WithdrawalEvent"}}
            ]
        }"#;
        let tree: TransactionTree = serde_json::from_str(json).unwrap();
        assert_eq!(tree.update_id, "u-1");
        assert_eq!(tree.events.len(), 2);

        let template = TemplateId::new("pkg", "CIP56.Token", "CIP56Holding");
        let created = tree.find_created(&template).unwrap();
        assert_eq!(created.contract_id, "00aa");
        assert_eq!(created.create_argument.get_text("symbol").unwrap(), "PROMPT");
        assert!(tree
            .find_created(&TemplateId::new("pkg", "Wayfinder.Bridge", "FingerprintMapping"))
            .is_none());
    }

    #[test]
    fn test_command_serialization() {
        let template = TemplateId::new("pkg", "Wayfinder.Token", "TokenConfig");
        let cmd = Command::exercise(
            &template,
            "00cc",
            "IssuerMint",
            LfValue::record([("amount", LfValue::text("5.0"))]),
        );
        let json = serde_json::to_value(&cmd).unwrap();
        assert_eq!(json["exercise"]["contractId"], "00cc");
        assert_eq!(json["exercise"]["choice"], "IssuerMint");
        assert_eq!(
            json["exercise"]["templateId"],
            "pkg:Wayfinder.Token:TokenConfig"
        );
    }
}
