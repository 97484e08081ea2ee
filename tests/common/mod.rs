//! Shared doubles for integration tests: an in-memory chain, a recording
//! outcome sink and scheduler, and a raw-TCP programmable HTTP backend.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use account_relay::chain::{
    Block, BlockHash, CallRequest, CapacityCall, CapacityLedger, ChainClient, ChainError,
    ChainResult, Extrinsic, Phase, ProviderSigner, RawEvent, SignedExtrinsic, TxHash,
};
use account_relay::pipeline::{
    NotifyError, OutcomeNotification, OutcomeSink, Scheduler, TimerCallback, TimerHandle,
    TokioScheduler,
};
use alloy::primitives::{keccak256, Address, Bytes};
use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Well-known development key; never holds funds.
pub const TEST_PRIVATE_KEY: &str =
    "0x59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";

pub fn test_signer() -> ProviderSigner {
    ProviderSigner::from_private_key(TEST_PRIVATE_KEY).unwrap()
}

/// Event emitted by the extrinsic under test; the mock assigns the phase.
#[derive(Debug, Clone)]
pub struct EventSpec {
    pub pallet: &'static str,
    pub method: &'static str,
    pub data: Value,
}

pub fn event(pallet: &'static str, method: &'static str, data: Value) -> EventSpec {
    EventSpec {
        pallet,
        method,
        data,
    }
}

pub fn success() -> EventSpec {
    event("system", "ExtrinsicSuccess", json!({}))
}

pub fn withdrawn(msa_id: u64, amount: u128) -> EventSpec {
    event(
        "capacity",
        "CapacityWithdrawn",
        json!({ "msaId": msa_id, "amount": amount.to_string() }),
    )
}

pub fn handle_claimed(msa_id: u64, hex_handle: &str) -> EventSpec {
    event(
        "handles",
        "HandleClaimed",
        json!({ "msaId": msa_id, "handle": hex_handle }),
    )
}

pub fn module_failure(pallet: &str, error: &str) -> EventSpec {
    event(
        "system",
        "ExtrinsicFailed",
        json!({ "dispatchError": { "module": { "pallet": pallet, "error": error } } }),
    )
}

/// What the mock does with the next submission.
#[derive(Debug, Clone)]
pub enum SubmitScript {
    /// Accept and include in a new finalized block, alone.
    Include(Vec<EventSpec>),
    /// Accept and include after an unrelated extrinsic with its own events.
    IncludeWithNeighbour {
        target: Vec<EventSpec>,
        neighbour: Vec<EventSpec>,
    },
    /// Refuse with a pool error.
    Reject { code: i64, message: String },
    /// Accept but never include.
    Drop,
}

struct ChainState {
    blocks: Vec<Block>,
    events: HashMap<BlockHash, Vec<RawEvent>>,
    finalized: u64,
    auto_finalize: bool,
    /// Nonces below this were used outside the relay.
    nonce_floor: u64,
    used_nonces: HashSet<u64>,
    nonce_reads: usize,
    fail_nonce_reads: bool,
    ledger: CapacityLedger,
    ledger_reads: usize,
    fail_ledger_reads: bool,
    scripts: VecDeque<SubmitScript>,
    submissions: Vec<SignedExtrinsic>,
    wrapped: Vec<CapacityCall>,
}

/// In-memory chain. Block 0 exists and is finalized at construction.
pub struct MockChain {
    state: Mutex<ChainState>,
}

fn block_hash_for(number: u64) -> BlockHash {
    keccak256(format!("block-{}", number).as_bytes())
}

pub fn default_ledger() -> CapacityLedger {
    CapacityLedger {
        remaining: 1_000_000,
        total_issued: 1_000_000,
        epoch_start: 100,
        epoch_length: 100,
        current_epoch: 7,
        current_block: 150,
    }
}

impl MockChain {
    pub fn new() -> Arc<Self> {
        let genesis = Block {
            number: 0,
            hash: block_hash_for(0),
            extrinsics: Vec::new(),
        };
        Arc::new(Self {
            state: Mutex::new(ChainState {
                blocks: vec![genesis],
                events: HashMap::new(),
                finalized: 0,
                auto_finalize: true,
                nonce_floor: 0,
                used_nonces: HashSet::new(),
                nonce_reads: 0,
                fail_nonce_reads: false,
                ledger: default_ledger(),
                ledger_reads: 0,
                fail_ledger_reads: false,
                scripts: VecDeque::new(),
                submissions: Vec::new(),
                wrapped: Vec::new(),
            }),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ChainState> {
        self.state.lock().unwrap()
    }

    pub fn script(&self, script: SubmitScript) {
        self.lock().scripts.push_back(script);
    }

    /// Simulate another signer having used every nonce below `nonce`.
    pub fn set_nonce(&self, nonce: u64) {
        self.lock().nonce_floor = nonce;
    }

    pub fn next_index(&self) -> u64 {
        Self::next_index_of(&self.lock())
    }

    fn next_index_of(state: &ChainState) -> u64 {
        state
            .used_nonces
            .iter()
            .max()
            .map_or(state.nonce_floor, |n| (n + 1).max(state.nonce_floor))
    }

    pub fn nonce_reads(&self) -> usize {
        self.lock().nonce_reads
    }

    pub fn fail_nonce_reads(&self, fail: bool) {
        self.lock().fail_nonce_reads = fail;
    }

    pub fn set_ledger(&self, ledger: CapacityLedger) {
        self.lock().ledger = ledger;
    }

    pub fn ledger_reads(&self) -> usize {
        self.lock().ledger_reads
    }

    pub fn fail_ledger_reads(&self, fail: bool) {
        self.lock().fail_ledger_reads = fail;
    }

    /// Stop finalizing new blocks as they are produced.
    pub fn hold_finality(&self) {
        self.lock().auto_finalize = false;
    }

    pub fn finalize_to(&self, number: u64) {
        let mut state = self.lock();
        state.finalized = number.min(state.blocks.len() as u64 - 1);
    }

    pub fn finalized_number(&self) -> u64 {
        self.lock().finalized
    }

    pub fn hash_of(&self, number: u64) -> BlockHash {
        block_hash_for(number)
    }

    /// Produce `n` blocks without relay extrinsics.
    pub fn produce_empty_blocks(&self, n: u64) {
        let mut state = self.lock();
        for _ in 0..n {
            Self::push_block(&mut state, Vec::new(), Vec::new());
        }
    }

    pub fn submissions(&self) -> Vec<SignedExtrinsic> {
        self.lock().submissions.clone()
    }

    pub fn wrapped(&self) -> Vec<CapacityCall> {
        self.lock().wrapped.clone()
    }

    fn push_block(state: &mut ChainState, extrinsics: Vec<TxHash>, events: Vec<RawEvent>) -> u64 {
        let number = state.blocks.len() as u64;
        let hash = block_hash_for(number);
        state.blocks.push(Block {
            number,
            hash,
            extrinsics,
        });
        state.events.insert(hash, events);
        if state.auto_finalize {
            state.finalized = number;
        }
        number
    }

    fn raw(index: u32, specs: &[EventSpec]) -> Vec<RawEvent> {
        specs
            .iter()
            .map(|s| RawEvent {
                phase: Phase::ApplyExtrinsic(index),
                pallet: s.pallet.to_string(),
                method: s.method.to_string(),
                data: s.data.clone(),
            })
            .collect()
    }
}

#[async_trait]
impl ChainClient for MockChain {
    async fn finalized_block_hash(&self) -> ChainResult<BlockHash> {
        Ok(block_hash_for(self.lock().finalized))
    }

    async fn block(&self, hash: BlockHash) -> ChainResult<Block> {
        self.lock()
            .blocks
            .iter()
            .find(|b| b.hash == hash)
            .cloned()
            .ok_or_else(|| ChainError::BlockNotFound(hash.to_string()))
    }

    async fn block_hash(&self, number: u64) -> ChainResult<Option<BlockHash>> {
        let state = self.lock();
        Ok((number < state.blocks.len() as u64).then(|| block_hash_for(number)))
    }

    async fn events(&self, hash: BlockHash) -> ChainResult<Vec<RawEvent>> {
        Ok(self.lock().events.get(&hash).cloned().unwrap_or_default())
    }

    async fn account_nonce(&self, _account: Address) -> ChainResult<u64> {
        tokio::task::yield_now().await;
        let mut state = self.lock();
        state.nonce_reads += 1;
        if state.fail_nonce_reads {
            return Err(ChainError::Rpc("connection reset".into()));
        }
        Ok(Self::next_index_of(&state))
    }

    async fn capacity_ledger(&self, _provider_id: u64) -> ChainResult<CapacityLedger> {
        let mut state = self.lock();
        state.ledger_reads += 1;
        if state.fail_ledger_reads {
            return Err(ChainError::Rpc("connection reset".into()));
        }
        Ok(state.ledger)
    }

    async fn build_extrinsic(&self, request: &CallRequest) -> ChainResult<Extrinsic> {
        let encoded = serde_json::to_vec(request).map_err(|e| ChainError::Decode(e.to_string()))?;
        Ok(Extrinsic(Bytes::from(encoded)))
    }

    async fn wrap_with_capacity_payment(&self, call: CapacityCall) -> ChainResult<Extrinsic> {
        let encoded = serde_json::to_vec(&call).map_err(|e| ChainError::Decode(e.to_string()))?;
        self.lock().wrapped.push(call);
        Ok(Extrinsic(Bytes::from(encoded)))
    }

    async fn submit(&self, extrinsic: &SignedExtrinsic) -> ChainResult<TxHash> {
        let mut state = self.lock();
        // Stale nonces are refused before any script is consumed.
        if extrinsic.nonce < state.nonce_floor || state.used_nonces.contains(&extrinsic.nonce) {
            return Err(ChainError::Rejected {
                code: 1010,
                message: "Invalid Transaction: Transaction is outdated".into(),
            });
        }
        let script = state
            .scripts
            .pop_front()
            .unwrap_or_else(|| SubmitScript::Include(vec![success()]));

        if let SubmitScript::Reject { code, message } = script {
            return Err(ChainError::Rejected { code, message });
        }

        let encoded = serde_json::to_vec(extrinsic).map_err(|e| ChainError::Decode(e.to_string()))?;
        let tx_hash = keccak256(&encoded);
        state.used_nonces.insert(extrinsic.nonce);
        state.submissions.push(extrinsic.clone());

        match script {
            SubmitScript::Include(specs) => {
                Self::push_block(&mut state, vec![tx_hash], Self::raw(0, &specs));
            }
            SubmitScript::IncludeWithNeighbour { target, neighbour } => {
                let neighbour_hash = keccak256(b"neighbour");
                let mut events = Self::raw(0, &neighbour);
                events.extend(Self::raw(1, &target));
                Self::push_block(&mut state, vec![neighbour_hash, tx_hash], events);
            }
            SubmitScript::Drop | SubmitScript::Reject { .. } => {}
        }
        Ok(tx_hash)
    }
}

/// Sink that records notifications, optionally failing every delivery.
#[derive(Default)]
pub struct RecordingSink {
    delivered: Mutex<Vec<OutcomeNotification>>,
    fail: bool,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            delivered: Mutex::new(Vec::new()),
            fail: true,
        })
    }

    pub fn delivered(&self) -> Vec<OutcomeNotification> {
        self.delivered.lock().unwrap().clone()
    }
}

#[async_trait]
impl OutcomeSink for RecordingSink {
    async fn deliver(&self, notification: &OutcomeNotification) -> Result<(), NotifyError> {
        self.delivered.lock().unwrap().push(notification.clone());
        if self.fail {
            return Err(NotifyError::Exhausted {
                attempts: 1,
                last_error: "HTTP 500".into(),
            });
        }
        Ok(())
    }
}

/// Scheduler that records armed delays and delegates to a real one.
pub struct RecordingScheduler {
    inner: TokioScheduler,
    armed: Mutex<Vec<(TimerHandle, Duration)>>,
    cancelled: Mutex<Vec<TimerHandle>>,
}

impl RecordingScheduler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: TokioScheduler::new(),
            armed: Mutex::new(Vec::new()),
            cancelled: Mutex::new(Vec::new()),
        })
    }

    pub fn armed(&self) -> Vec<(TimerHandle, Duration)> {
        self.armed.lock().unwrap().clone()
    }

    pub fn cancelled(&self) -> Vec<TimerHandle> {
        self.cancelled.lock().unwrap().clone()
    }
}

impl Scheduler for RecordingScheduler {
    fn schedule_once(&self, delay: Duration, callback: TimerCallback) -> TimerHandle {
        let handle = self.inner.schedule_once(delay, callback);
        self.armed.lock().unwrap().push((handle, delay));
        handle
    }

    fn cancel(&self, handle: TimerHandle) -> bool {
        self.cancelled.lock().unwrap().push(handle);
        self.inner.cancel(handle)
    }

    fn cancel_all(&self) {
        self.inner.cancel_all()
    }

    fn pending(&self) -> usize {
        self.inner.pending()
    }
}

/// A request as it arrived at a programmable backend.
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub head: String,
    pub body: String,
}

impl CapturedRequest {
    pub fn header(&self, name: &str) -> Option<String> {
        self.head.lines().find_map(|line| {
            let (key, value) = line.split_once(':')?;
            key.trim()
                .eq_ignore_ascii_case(name)
                .then(|| value.trim().to_string())
        })
    }

    pub fn json(&self) -> Value {
        serde_json::from_str(&self.body).unwrap()
    }
}

pub type Captured = Arc<Mutex<Vec<CapturedRequest>>>;

/// Start a backend on an ephemeral port. `respond` sees each request and
/// its zero-based arrival index and returns status and body.
pub async fn start_programmable_backend<F>(respond: F) -> (SocketAddr, Captured)
where
    F: Fn(&CapturedRequest, usize) -> (u16, String) + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let captured: Captured = Arc::new(Mutex::new(Vec::new()));
    let respond = Arc::new(respond);

    let log = captured.clone();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let respond = respond.clone();
            let log = log.clone();
            tokio::spawn(async move {
                let Some(request) = read_request(&mut socket).await else {
                    return;
                };
                let index = {
                    let mut log = log.lock().unwrap();
                    log.push(request.clone());
                    log.len() - 1
                };
                let (status, body) = respond(&request, index);
                let status_text = match status {
                    200 => "200 OK",
                    202 => "202 Accepted",
                    401 => "401 Unauthorized",
                    404 => "404 Not Found",
                    500 => "500 Internal Server Error",
                    502 => "502 Bad Gateway",
                    503 => "503 Service Unavailable",
                    _ => "200 OK",
                };
                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status_text,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    (addr, captured)
}

async fn read_request(socket: &mut tokio::net::TcpStream) -> Option<CapturedRequest> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let content_length = head
        .lines()
        .find_map(|line| {
            let (key, value) = line.split_once(':')?;
            key.trim()
                .eq_ignore_ascii_case("content-length")
                .then(|| value.trim().parse::<usize>().ok())
                .flatten()
        })
        .unwrap_or(0);

    while buf.len() < header_end + content_length {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    let body = String::from_utf8_lossy(&buf[header_end..]).to_string();
    Some(CapturedRequest { head, body })
}

/// JSON-RPC success envelope.
pub fn rpc_result(result: Value) -> String {
    json!({ "jsonrpc": "2.0", "id": 1, "result": result }).to_string()
}

/// JSON-RPC error envelope.
pub fn rpc_error(code: i64, message: &str, data: &str) -> String {
    json!({
        "jsonrpc": "2.0",
        "id": 1,
        "error": { "code": code, "message": message, "data": data }
    })
    .to_string()
}
