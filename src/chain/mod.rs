//! Chain collaborator.
//!
//! # Data Flow
//! ```text
//! pipeline
//!     → client.rs (ChainClient trait)
//!         → rpc.rs (JSON-RPC over HTTP, endpoint failover)
//!     ← types.rs (blocks, ledger, raw events)
//!     ← events.rs (raw events → EventKind)
//!
//! signer.rs: provider key → SignedExtrinsic
//! scanner.rs: finalized blocks → BlockVisitor, cursor in the state store
//! ```

pub mod client;
pub mod events;
pub mod rpc;
pub mod scanner;
pub mod signer;
pub mod types;

pub use client::ChainClient;
pub use events::{DispatchError, EventKind, ModuleErrorKind};
pub use rpc::RpcChainClient;
pub use scanner::{BlockScanner, BlockVisitor, FinalityTracker, ScanReport};
pub use signer::ProviderSigner;
pub use types::{
    Block, BlockHash, CallRequest, CapacityCall, CapacityLedger, ChainError, ChainResult,
    Extrinsic, Phase, RawEvent, Rejection, SignedExtrinsic, TxHash,
};
