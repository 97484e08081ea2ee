//! Requests, jobs and notifications flowing through the pipeline.

use alloy::primitives::{keccak256, Bytes};
use serde::{Deserialize, Serialize};

use crate::chain::types::{BlockHash, TxHash};

/// The kind of account change being relayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestKind {
    CreateHandle,
    ChangeHandle,
    AddKey,
    SiwfSignup,
}

impl RequestKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestKind::CreateHandle => "CREATE_HANDLE",
            RequestKind::ChangeHandle => "CHANGE_HANDLE",
            RequestKind::AddKey => "ADD_KEY",
            RequestKind::SiwfSignup => "SIWF_SIGNUP",
        }
    }
}

impl std::fmt::Display for RequestKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind-specific request data. The `kind` tag selects the variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum RequestPayload {
    #[serde(rename_all = "camelCase")]
    CreateHandle { base_handle: String, expiration: u64 },
    #[serde(rename_all = "camelCase")]
    ChangeHandle { base_handle: String, expiration: u64 },
    #[serde(rename_all = "camelCase")]
    AddKey {
        msa_id: u64,
        new_public_key: String,
        new_key_owner_proof: Bytes,
        expiration: u64,
    },
    /// Pre-encoded calls produced by the sign-in flow, submitted as one batch.
    #[serde(rename_all = "camelCase")]
    SiwfSignup { calls: Vec<Bytes> },
}

impl RequestPayload {
    pub fn kind(&self) -> RequestKind {
        match self {
            RequestPayload::CreateHandle { .. } => RequestKind::CreateHandle,
            RequestPayload::ChangeHandle { .. } => RequestKind::ChangeHandle,
            RequestPayload::AddKey { .. } => RequestKind::AddKey,
            RequestPayload::SiwfSignup { .. } => RequestKind::SiwfSignup,
        }
    }
}

/// A user's account change intent, already proof-checked upstream.
/// Never mutated once accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountChangeRequest {
    pub provider_id: u64,
    /// The user's account (MSA owner) public key.
    pub account_id: String,
    pub payload: RequestPayload,
    /// Opaque signature over the payload.
    pub proof: Bytes,
}

impl AccountChangeRequest {
    pub fn kind(&self) -> RequestKind {
        self.payload.kind()
    }

    /// Content hash of the canonical JSON encoding. Identical requests share
    /// a reference id.
    pub fn reference_id(&self) -> Result<String, serde_json::Error> {
        let canonical = serde_json::to_vec(self)?;
        Ok(hex::encode(keccak256(canonical)))
    }
}

/// Work item for the publish queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishJob {
    pub reference_id: String,
    pub provider_id: u64,
    pub request: AccountChangeRequest,
}

/// Work item for the confirmation queue, created after a successful submit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmationJob {
    pub reference_id: String,
    pub tx_hash: TxHash,
    /// Capacity epoch when the extrinsic was submitted.
    pub epoch: u64,
    /// Finalized head observed just before submission; the scan starts here.
    pub last_finalized_block_hash: BlockHash,
    pub request: AccountChangeRequest,
}

/// Kind-specific fields of a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum OutcomeDetails {
    #[serde(rename_all = "camelCase")]
    Handle { handle: String },
    #[serde(rename_all = "camelCase")]
    Signup {
        account_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        handle: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    PublicKey { new_public_key: String },
}

/// What the provider's webhook receives for a confirmed request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeNotification {
    pub transaction_type: RequestKind,
    /// Ids are sent as decimal strings.
    #[serde(with = "as_string")]
    pub provider_id: u64,
    pub reference_id: String,
    #[serde(with = "as_string")]
    pub msa_id: u64,
    #[serde(flatten)]
    pub details: OutcomeDetails,
}

mod as_string {
    use serde::Serializer;

    pub fn serialize<S: Serializer>(value: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }
}
