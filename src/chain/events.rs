//! Classification of raw chain events.
//!
//! Raw events are decoded exactly once into [`EventKind`]; nothing downstream
//! matches on pallet or method strings.

use serde::Serialize;
use serde_json::Value;

use crate::chain::types::{ChainError, ChainResult, RawEvent};

/// Why a dispatched extrinsic failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DispatchError {
    /// A pallet-defined error, identified by pallet and variant name.
    Module { pallet: String, error: String },
    /// A non-module dispatch error (`BadOrigin`, `Exhausted`, ...).
    Other(String),
}

impl DispatchError {
    /// The module error variant, when this is a pallet error.
    pub fn module_error(&self) -> Option<ModuleErrorKind> {
        match self {
            DispatchError::Module { error, .. } => Some(ModuleErrorKind::from_name(error)),
            DispatchError::Other(_) => None,
        }
    }
}

impl std::fmt::Display for DispatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DispatchError::Module { pallet, error } => write!(f, "{}.{}", pallet, error),
            DispatchError::Other(reason) => write!(f, "{}", reason),
        }
    }
}

/// Module errors the msa and handles pallets raise for sponsored account changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleErrorKind {
    AddProviderSignatureVerificationFailed,
    DuplicateProvider,
    UnauthorizedProvider,
    InvalidSelfProvider,
    InvalidSignature,
    NoKeyExists,
    KeyAlreadyRegistered,
    ProviderNotRegistered,
    ProofNotYetValid,
    ProofHasExpired,
    SignatureAlreadySubmitted,
    UnauthorizedDelegator,
    Unrecognized(String),
}

impl ModuleErrorKind {
    pub fn from_name(name: &str) -> Self {
        match name {
            "AddProviderSignatureVerificationFailed" => Self::AddProviderSignatureVerificationFailed,
            "DuplicateProvider" => Self::DuplicateProvider,
            "UnauthorizedProvider" => Self::UnauthorizedProvider,
            "InvalidSelfProvider" => Self::InvalidSelfProvider,
            "InvalidSignature" => Self::InvalidSignature,
            "NoKeyExists" => Self::NoKeyExists,
            "KeyAlreadyRegistered" => Self::KeyAlreadyRegistered,
            "ProviderNotRegistered" => Self::ProviderNotRegistered,
            "ProofNotYetValid" => Self::ProofNotYetValid,
            "ProofHasExpired" => Self::ProofHasExpired,
            "SignatureAlreadySubmitted" => Self::SignatureAlreadySubmitted,
            "UnauthorizedDelegator" => Self::UnauthorizedDelegator,
            other => Self::Unrecognized(other.to_string()),
        }
    }

    /// True for the allowlisted errors known to be permanent.
    pub fn is_known_terminal(&self) -> bool {
        !matches!(self, Self::Unrecognized(_))
    }
}

/// The events the pipeline cares about, decoded from [`RawEvent`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    ExtrinsicSuccess,
    ExtrinsicFailed(DispatchError),
    CapacityWithdrawn { msa_id: u64, amount: u128 },
    /// Handle already decoded from its hex encoding.
    HandleClaimed { msa_id: u64, handle: String },
    PublicKeyAdded { msa_id: u64, key: String },
    MsaCreated { msa_id: u64, key: String },
    DelegationGranted { provider_id: u64, delegator_id: u64 },
    Other { pallet: String, method: String },
}

impl EventKind {
    /// Decode a raw event. Unknown events map to [`EventKind::Other`]; known
    /// events with malformed data are an error.
    pub fn decode(raw: &RawEvent) -> ChainResult<Self> {
        let data = &raw.data;
        let kind = match (raw.pallet.as_str(), raw.method.as_str()) {
            ("system", "ExtrinsicSuccess") => EventKind::ExtrinsicSuccess,
            ("system", "ExtrinsicFailed") => {
                EventKind::ExtrinsicFailed(decode_dispatch_error(data.get("dispatchError"))?)
            }
            ("capacity", "CapacityWithdrawn") => EventKind::CapacityWithdrawn {
                msa_id: field_u64(data, "msaId")?,
                amount: field_u128(data, "amount")?,
            },
            ("handles", "HandleClaimed") => EventKind::HandleClaimed {
                msa_id: field_u64(data, "msaId")?,
                handle: decode_handle(field_str(data, "handle")?)?,
            },
            ("msa", "PublicKeyAdded") => EventKind::PublicKeyAdded {
                msa_id: field_u64(data, "msaId")?,
                key: field_str(data, "key")?.to_string(),
            },
            ("msa", "MsaCreated") => EventKind::MsaCreated {
                msa_id: field_u64(data, "msaId")?,
                key: field_str(data, "key")?.to_string(),
            },
            ("msa", "DelegationGranted") => EventKind::DelegationGranted {
                provider_id: field_u64(data, "providerId")?,
                delegator_id: field_u64(data, "delegatorId")?,
            },
            (pallet, method) => EventKind::Other {
                pallet: pallet.to_string(),
                method: method.to_string(),
            },
        };
        Ok(kind)
    }
}

/// Decode a `0x`-prefixed hex handle into its UTF-8 string.
pub fn decode_handle(hex_handle: &str) -> ChainResult<String> {
    let stripped = hex_handle.strip_prefix("0x").unwrap_or(hex_handle);
    let bytes = hex::decode(stripped)
        .map_err(|e| ChainError::Decode(format!("Invalid handle hex '{}': {}", hex_handle, e)))?;
    String::from_utf8(bytes)
        .map_err(|e| ChainError::Decode(format!("Handle is not UTF-8: {}", e)))
}

/// Encode a handle the way the chain emits it.
pub fn encode_handle(handle: &str) -> String {
    format!("0x{}", hex::encode(handle.as_bytes()))
}

fn decode_dispatch_error(value: Option<&Value>) -> ChainResult<DispatchError> {
    match value {
        Some(Value::String(reason)) => Ok(DispatchError::Other(reason.clone())),
        Some(Value::Object(map)) => {
            let module = map
                .get("module")
                .ok_or_else(|| ChainError::Decode("dispatchError without module".into()))?;
            Ok(DispatchError::Module {
                pallet: field_str(module, "pallet")?.to_string(),
                error: field_str(module, "error")?.to_string(),
            })
        }
        _ => Err(ChainError::Decode("ExtrinsicFailed without dispatchError".into())),
    }
}

fn field<'a>(data: &'a Value, name: &str) -> ChainResult<&'a Value> {
    data.get(name)
        .ok_or_else(|| ChainError::Decode(format!("Missing event field '{}'", name)))
}

fn field_str<'a>(data: &'a Value, name: &str) -> ChainResult<&'a str> {
    field(data, name)?
        .as_str()
        .ok_or_else(|| ChainError::Decode(format!("Event field '{}' is not a string", name)))
}

fn field_u64(data: &Value, name: &str) -> ChainResult<u64> {
    let value = field_u128(data, name)?;
    u64::try_from(value)
        .map_err(|_| ChainError::Decode(format!("Event field '{}' overflows u64", name)))
}

// Balances exceed JSON's safe integer range, so accept decimal strings too.
fn field_u128(data: &Value, name: &str) -> ChainResult<u128> {
    match field(data, name)? {
        Value::Number(n) => n
            .as_u64()
            .map(u128::from)
            .ok_or_else(|| ChainError::Decode(format!("Event field '{}' is not unsigned", name))),
        Value::String(s) => s
            .parse::<u128>()
            .map_err(|e| ChainError::Decode(format!("Event field '{}': {}", name, e))),
        _ => Err(ChainError::Decode(format!("Event field '{}' is not numeric", name))),
    }
}
