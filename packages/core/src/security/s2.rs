use super::CtrDrbg;
use super::crypto::{compute_cmac, encrypt_aes_ecb};
use crate::prelude::*;
use getrandom::getrandom;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

pub const S2_ENTROPY_SIZE: usize = 16;
pub const S2_NONCE_SIZE: usize = 13;

/// After this many consecutive authentication failures against one node the
/// transaction is aborted instead of resynchronized
pub const S2_MAX_MAC_FAILURES: u8 = 3;

const CONSTANT_PRK: [u8; 16] = [0x33; 16];
const CONSTANT_TE: [u8; 15] = [0x88; 15];
const CONSTANT_CCM: [u8; 16] = [0x55; 16];
const CONSTANT_MPAN: [u8; 16] = [0x66; 16];
const CONSTANT_PERS: [u8; 16] = [0x77; 16];

/// The keys in use for one S2 security class, derived from its network key
/// with the CMAC-based KDF
#[derive(Clone)]
pub struct S2NetworkKeys {
    pub key_ccm: Vec<u8>,
    pub key_mpan: Vec<u8>,
    pub personalization: Vec<u8>,
}

pub fn derive_network_keys(network_key: &[u8]) -> S2NetworkKeys {
    let key_ccm = compute_cmac(&CONSTANT_CCM, network_key);
    let key_mpan = compute_cmac(&CONSTANT_MPAN, network_key);
    let mut personalization = compute_cmac(&CONSTANT_PERS, network_key);
    personalization.extend(compute_cmac(&personalization.clone(), network_key));

    S2NetworkKeys {
        key_ccm,
        key_mpan,
        personalization,
    }
}

/// Mixes the sender and receiver entropy inputs into the 32 bytes that seed
/// a SPAN (CKDF-MEI extract and expand)
pub fn mix_entropy(sender_ei: &[u8], receiver_ei: &[u8]) -> [u8; 32] {
    let mut input = Vec::with_capacity(2 * S2_ENTROPY_SIZE);
    input.extend_from_slice(sender_ei);
    input.extend_from_slice(receiver_ei);
    let nonce_prk = compute_cmac(&input, &CONSTANT_PRK);

    let mut t1_input = CONSTANT_TE.to_vec();
    t1_input.push(0x01);
    let t1 = compute_cmac(&t1_input, &nonce_prk);

    let mut t2_input = t1.clone();
    t2_input.extend_from_slice(&CONSTANT_TE);
    t2_input.push(0x02);
    let t2 = compute_cmac(&t2_input, &nonce_prk);

    let mut mei = [0u8; 32];
    mei[..16].copy_from_slice(&t1);
    mei[16..].copy_from_slice(&t2);
    mei
}

pub fn random_entropy() -> [u8; S2_ENTROPY_SIZE] {
    let mut buf = [0u8; S2_ENTROPY_SIZE];
    getrandom(&mut buf).expect("random number generation should not fail");
    buf
}

/// The singlecast pre-agreed nonce state for one peer node
pub enum SpanState {
    /// No entropy has been exchanged yet
    None,
    /// We received the peer's entropy but haven't sent ours
    RemoteEntropy([u8; S2_ENTROPY_SIZE]),
    /// We sent our entropy and are waiting for the peer's
    LocalEntropy([u8; S2_ENTROPY_SIZE]),
    /// Both entropy halves are mixed; nonces can be generated
    Established(CtrDrbg),
}

impl SpanState {
    pub fn is_established(&self) -> bool {
        matches!(self, Self::Established(_))
    }
}

/// The multicast pre-agreed nonce state for one group
pub struct MpanState {
    inner: [u8; 16],
}

impl MpanState {
    pub fn new() -> Self {
        let mut inner = [0u8; 16];
        getrandom(&mut inner).expect("random number generation should not fail");
        Self { inner }
    }

    /// Returns the current MPAN as a nonce and advances the state
    pub fn next(&mut self, key_mpan: &[u8]) -> [u8; S2_NONCE_SIZE] {
        let mut nonce = [0u8; S2_NONCE_SIZE];
        nonce.copy_from_slice(&self.inner[..S2_NONCE_SIZE]);
        let advanced = encrypt_aes_ecb(&self.inner, key_mpan);
        self.inner.copy_from_slice(&advanced);
        nonce
    }
}

impl Default for MpanState {
    fn default() -> Self {
        Self::new()
    }
}

struct PeerState {
    span: SpanState,
    /// The last sequence number received from this peer, for deduplication
    last_sequence_number: Option<u8>,
    /// Consecutive CCM authentication failures
    mac_failures: u8,
}

impl Default for PeerState {
    fn default() -> Self {
        Self {
            span: SpanState::None,
            last_sequence_number: None,
            mac_failures: 0,
        }
    }
}

struct SecurityManagerS2State {
    own_node_id: NodeId,
    keys: BTreeMap<SecurityClass, S2NetworkKeys>,
    peers: BTreeMap<NodeId, PeerState>,
    mpans: BTreeMap<u8, MpanState>,
    own_sequence_number: u8,
}

/// Owns the S2 keys, SPAN/MPAN states and sequence numbers. Like the S0
/// manager this is a cheap handle onto shared state.
#[derive(Clone)]
pub struct SecurityManagerS2 {
    state: Arc<Mutex<SecurityManagerS2State>>,
}

impl SecurityManagerS2 {
    pub fn new(own_node_id: NodeId) -> Self {
        let mut seq = [0u8; 1];
        getrandom(&mut seq).expect("random number generation should not fail");

        Self {
            state: Arc::new(Mutex::new(SecurityManagerS2State {
                own_node_id,
                keys: BTreeMap::new(),
                peers: BTreeMap::new(),
                mpans: BTreeMap::new(),
                own_sequence_number: seq[0],
            })),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SecurityManagerS2State> {
        self.state.lock().expect("S2 security manager lock poisoned")
    }

    pub fn own_node_id(&self) -> NodeId {
        self.lock().own_node_id
    }

    pub fn set_network_key(&self, class: SecurityClass, network_key: &[u8]) {
        assert!(class.is_s2(), "network keys can only be set for S2 classes");
        self.lock().keys.insert(class, derive_network_keys(network_key));
    }

    pub fn keys(&self, class: SecurityClass) -> Option<S2NetworkKeys> {
        self.lock().keys.get(&class).cloned()
    }

    pub fn next_sequence_number(&self) -> u8 {
        let mut state = self.lock();
        state.own_sequence_number = state.own_sequence_number.wrapping_add(1);
        state.own_sequence_number
    }

    /// Whether the given inbound sequence number is a duplicate. Records it
    /// if not.
    pub fn observe_sequence_number(&self, peer: NodeId, sequence_number: u8) -> bool {
        let mut state = self.lock();
        let peer = state.peers.entry(peer).or_default();
        if peer.last_sequence_number == Some(sequence_number) {
            return true;
        }
        peer.last_sequence_number = Some(sequence_number);
        false
    }

    /// Stores the entropy we received from a peer, resetting the SPAN
    pub fn set_remote_entropy(&self, peer: NodeId, entropy: [u8; S2_ENTROPY_SIZE]) {
        let mut state = self.lock();
        let peer = state.peers.entry(peer).or_default();
        peer.span = SpanState::RemoteEntropy(entropy);
    }

    /// Stores the entropy we sent to a peer while waiting for theirs
    pub fn set_local_entropy(&self, peer: NodeId, entropy: [u8; S2_ENTROPY_SIZE]) {
        let mut state = self.lock();
        let peer = state.peers.entry(peer).or_default();
        peer.span = SpanState::LocalEntropy(entropy);
    }

    /// The entropy we sent to the peer, if the SPAN is still half-open
    pub fn local_entropy(&self, peer: NodeId) -> Option<[u8; S2_ENTROPY_SIZE]> {
        match self.lock().peers.get(&peer)?.span {
            SpanState::LocalEntropy(entropy) => Some(entropy),
            _ => None,
        }
    }

    /// Establishes the SPAN once both entropy halves are known. The sender
    /// of the entropy-carrying frame contributes the first half.
    pub fn establish_span(
        &self,
        peer: NodeId,
        class: SecurityClass,
        sender_ei: &[u8],
        receiver_ei: &[u8],
    ) {
        let mut state = self.lock();
        let personalization = state
            .keys
            .get(&class)
            .map(|k| k.personalization.clone())
            .unwrap_or_default();
        let peer = state.peers.entry(peer).or_default();
        let mei = mix_entropy(sender_ei, receiver_ei);
        peer.span = SpanState::Established(CtrDrbg::new(mei, &personalization));
    }

    pub fn has_span(&self, peer: NodeId) -> bool {
        self.lock()
            .peers
            .get(&peer)
            .map(|p| p.span.is_established())
            .unwrap_or(false)
    }

    /// Generates the next 13-byte SPAN nonce for the peer. Returns `None`
    /// when no SPAN is established - the caller must run a nonce exchange.
    pub fn next_span_nonce(&self, peer: NodeId) -> Option<[u8; S2_NONCE_SIZE]> {
        let mut state = self.lock();
        let peer = state.peers.get_mut(&peer)?;
        match &mut peer.span {
            SpanState::Established(drbg) => {
                let bytes = drbg.generate(16);
                let mut nonce = [0u8; S2_NONCE_SIZE];
                nonce.copy_from_slice(&bytes[..S2_NONCE_SIZE]);
                Some(nonce)
            }
            _ => None,
        }
    }

    /// Records an authentication failure. Returns `true` when the failure
    /// budget is exhausted and the transaction must be aborted.
    pub fn record_mac_failure(&self, peer: NodeId) -> bool {
        let mut state = self.lock();
        let peer = state.peers.entry(peer).or_default();
        peer.mac_failures = peer.mac_failures.saturating_add(1);
        if peer.mac_failures >= S2_MAX_MAC_FAILURES {
            peer.span = SpanState::None;
            peer.mac_failures = 0;
            return true;
        }
        false
    }

    pub fn reset_mac_failures(&self, peer: NodeId) {
        let mut state = self.lock();
        if let Some(peer) = state.peers.get_mut(&peer) {
            peer.mac_failures = 0;
        }
    }

    /// Resets the SPAN with a peer, e.g. after it reported losing sync
    pub fn reset_span(&self, peer: NodeId) {
        let mut state = self.lock();
        if let Some(peer) = state.peers.get_mut(&peer) {
            peer.span = SpanState::None;
        }
    }

    pub fn mpan_nonce(&self, group: u8, class: SecurityClass) -> Option<[u8; S2_NONCE_SIZE]> {
        let mut state = self.lock();
        let key_mpan = state.keys.get(&class)?.key_mpan.clone();
        let mpan = state.mpans.entry(group).or_default();
        Some(mpan.next(&key_mpan))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_span_nonce_stream_is_shared() {
        // Both sides mix the same entropy, so their nonce streams match
        let a = SecurityManagerS2::new(NodeId::new(1));
        let b = SecurityManagerS2::new(NodeId::new(5));
        let key = [0x42u8; 16];
        a.set_network_key(SecurityClass::S2Authenticated, &key);
        b.set_network_key(SecurityClass::S2Authenticated, &key);

        let sender_ei = [0x11u8; S2_ENTROPY_SIZE];
        let receiver_ei = [0x22u8; S2_ENTROPY_SIZE];
        a.establish_span(NodeId::new(5), SecurityClass::S2Authenticated, &sender_ei, &receiver_ei);
        b.establish_span(NodeId::new(1), SecurityClass::S2Authenticated, &sender_ei, &receiver_ei);

        for _ in 0..3 {
            assert_eq!(
                a.next_span_nonce(NodeId::new(5)),
                b.next_span_nonce(NodeId::new(1))
            );
        }
    }

    #[test]
    fn test_mac_failure_budget() {
        let mgr = SecurityManagerS2::new(NodeId::new(1));
        let peer = NodeId::new(9);
        assert!(!mgr.record_mac_failure(peer));
        assert!(!mgr.record_mac_failure(peer));
        // The third consecutive failure aborts
        assert!(mgr.record_mac_failure(peer));
        // ...and resets the budget
        assert!(!mgr.record_mac_failure(peer));
    }

    #[test]
    fn test_sequence_number_dedup() {
        let mgr = SecurityManagerS2::new(NodeId::new(1));
        let peer = NodeId::new(4);
        assert!(!mgr.observe_sequence_number(peer, 10));
        assert!(mgr.observe_sequence_number(peer, 10));
        assert!(!mgr.observe_sequence_number(peer, 11));
    }
}
