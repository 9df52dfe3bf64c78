use super::crypto::encrypt_aes_ecb;
use crate::prelude::*;
use ::bytes::Bytes;
use getrandom::getrandom;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

pub const NETWORK_KEY_SIZE: usize = 16;
pub type NetworkKey = Vec<u8>;
pub const S0_HALF_NONCE_SIZE: usize = 8;

/// Nonces expire when they have not been used for this long
pub const S0_NONCE_TIMEOUT: Duration = Duration::from_secs(10);

const AUTH_KEY_BASE: &[u8; NETWORK_KEY_SIZE] = &[0x55; NETWORK_KEY_SIZE];
const ENC_KEY_BASE: &[u8; NETWORK_KEY_SIZE] = &[0xaa; NETWORK_KEY_SIZE];

/// An 8-byte S0 nonce. Its first byte doubles as the nonce id.
#[derive(Debug, Clone, PartialEq)]
pub struct S0Nonce {
    nonce: Bytes,
}

impl S0Nonce {
    pub fn new(nonce: Bytes) -> Self {
        assert!(
            nonce.len() == S0_HALF_NONCE_SIZE,
            "S0 nonce must be {} bytes long, got {}",
            S0_HALF_NONCE_SIZE,
            nonce.len()
        );
        Self { nonce }
    }

    pub fn random() -> Self {
        let mut buf = vec![0u8; S0_HALF_NONCE_SIZE];
        getrandom(&mut buf).expect("random number generation should not fail");
        Self {
            nonce: Bytes::from(buf),
        }
    }

    pub fn get(&self) -> &Bytes {
        &self.nonce
    }

    pub fn id(&self) -> u8 {
        self.nonce[0]
    }
}

impl std::fmt::Display for S0Nonce {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{}", hex::encode(&self.nonce))
    }
}

#[derive(Copy, Clone, PartialEq, PartialOrd, Eq, Ord)]
struct NonceKey {
    issuer: NodeId,
    nonce_id: u8,
}

struct NonceEntry {
    nonce: S0Nonce,
    receiver: NodeId,
    issued_at: Instant,
}

impl NonceEntry {
    fn is_expired(&self) -> bool {
        self.issued_at.elapsed() >= S0_NONCE_TIMEOUT
    }
}

pub struct SecurityManagerOptions {
    pub own_node_id: NodeId,
    pub network_key: NetworkKey,
}

struct SecurityManagerState {
    own_node_id: NodeId,
    auth_key: NetworkKey,
    enc_key: NetworkKey,
    /// Nonces we issued or received, keyed by issuer and nonce id
    nonce_store: BTreeMap<NonceKey, NonceEntry>,
    /// The latest nonce issued for each receiver
    receiver_nonces: BTreeMap<NodeId, NonceKey>,
}

/// Owns the S0 keys and the nonce store. Cloning yields a handle to the same
/// underlying state, so parsing contexts can consume nonces while the driver
/// keeps issuing them.
#[derive(Clone)]
pub struct SecurityManager {
    state: Arc<Mutex<SecurityManagerState>>,
}

impl SecurityManager {
    pub fn new(options: SecurityManagerOptions) -> Self {
        assert!(
            options.network_key.len() == NETWORK_KEY_SIZE,
            "The network key must be {} bytes long",
            NETWORK_KEY_SIZE
        );

        let auth_key = encrypt_aes_ecb(AUTH_KEY_BASE, &options.network_key);
        let enc_key = encrypt_aes_ecb(ENC_KEY_BASE, &options.network_key);

        Self {
            state: Arc::new(Mutex::new(SecurityManagerState {
                own_node_id: options.own_node_id,
                auth_key,
                enc_key,
                nonce_store: BTreeMap::new(),
                receiver_nonces: BTreeMap::new(),
            })),
        }
    }

    pub fn own_node_id(&self) -> NodeId {
        self.lock().own_node_id
    }

    pub fn auth_key(&self) -> NetworkKey {
        self.lock().auth_key.clone()
    }

    pub fn enc_key(&self) -> NetworkKey {
        self.lock().enc_key.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SecurityManagerState> {
        self.state.lock().expect("S0 security manager lock poisoned")
    }

    /// Generates a fresh nonce to hand out to the given receiver. Any
    /// previous nonce for the same receiver is invalidated.
    pub fn generate_nonce(&self, receiver: NodeId) -> S0Nonce {
        let mut state = self.lock();
        let own_node_id = state.own_node_id;

        // Generate until the id is not already in use
        let nonce = loop {
            let nonce = S0Nonce::random();
            let key = NonceKey {
                issuer: own_node_id,
                nonce_id: nonce.id(),
            };
            if !state.nonce_store.contains_key(&key) {
                break nonce;
            }
        };

        state.store_nonce(own_node_id, receiver, nonce.clone());
        nonce
    }

    /// Remembers a nonce another node issued to us
    pub fn set_nonce(&self, issuer: NodeId, receiver: NodeId, nonce: S0Nonce) {
        self.lock().store_nonce(issuer, receiver, nonce);
    }

    /// Takes the nonce with the given id out of the store. Nonces are single
    /// use; expired ones are treated as missing.
    pub fn take_nonce(&self, issuer: NodeId, nonce_id: u8) -> Option<S0Nonce> {
        let mut state = self.lock();
        let key = NonceKey { issuer, nonce_id };
        let entry = state.nonce_store.remove(&key)?;
        state.receiver_nonces.retain(|_, k| *k != key);
        if entry.is_expired() {
            return None;
        }
        Some(entry.nonce)
    }

    /// Takes the latest nonce issued by the given node, regardless of its id
    pub fn take_nonce_for_issuer(&self, issuer: NodeId) -> Option<S0Nonce> {
        let mut state = self.lock();
        let key = *state
            .nonce_store
            .range(
                NonceKey {
                    issuer,
                    nonce_id: 0,
                }..=NonceKey {
                    issuer,
                    nonce_id: 0xff,
                },
            )
            .map(|(k, _)| k)
            .next_back()?;
        let entry = state.nonce_store.remove(&key)?;
        state.receiver_nonces.retain(|_, k| *k != key);
        if entry.is_expired() {
            return None;
        }
        Some(entry.nonce)
    }

    /// Drops all expired nonces. Called periodically by the driver.
    pub fn expire_nonces(&self) {
        let mut state = self.lock();
        state.nonce_store.retain(|_, entry| !entry.is_expired());
        let live: Vec<NonceKey> = state.nonce_store.keys().copied().collect();
        state.receiver_nonces.retain(|_, k| live.contains(k));
    }
}

impl SecurityManagerState {
    fn store_nonce(&mut self, issuer: NodeId, receiver: NodeId, nonce: S0Nonce) {
        let key = NonceKey {
            issuer,
            nonce_id: nonce.id(),
        };

        // If there is an existing nonce for the same receiver, remove it
        if let Some(existing_key) = self.receiver_nonces.remove(&receiver) {
            self.nonce_store.remove(&existing_key);
        }

        self.nonce_store.insert(
            key,
            NonceEntry {
                receiver,
                nonce,
                issued_at: Instant::now(),
            },
        );
        self.receiver_nonces.insert(receiver, key);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn manager() -> SecurityManager {
        SecurityManager::new(SecurityManagerOptions {
            own_node_id: NodeId::new(1),
            network_key: vec![0x01; NETWORK_KEY_SIZE],
        })
    }

    #[test]
    fn test_nonce_is_single_use() {
        let mgr = manager();
        let nonce = S0Nonce::new(Bytes::from_static(&[1, 2, 3, 4, 5, 6, 7, 8]));
        mgr.set_nonce(NodeId::new(5), NodeId::new(1), nonce.clone());

        assert_eq!(mgr.take_nonce(NodeId::new(5), 1), Some(nonce));
        assert_eq!(mgr.take_nonce(NodeId::new(5), 1), None);
    }

    #[test]
    fn test_new_nonce_replaces_old_for_receiver() {
        let mgr = manager();
        let first = mgr.generate_nonce(NodeId::new(5));
        let _second = mgr.generate_nonce(NodeId::new(5));

        // The first nonce is no longer valid
        assert_eq!(mgr.take_nonce(NodeId::new(1), first.id()), None);
    }

    #[test]
    fn test_keys_derived_from_network_key() {
        let mgr = manager();
        assert_ne!(mgr.auth_key(), mgr.enc_key());
        assert_eq!(mgr.auth_key().len(), NETWORK_KEY_SIZE);
    }
}
