use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;

use super::callback::PendingProof;

/// How recent an unmatched proof must be to be handed out by provider alone
pub const FALLBACK_WINDOW: Duration = Duration::from_secs(120);

const LATEST_SLOT: &str = "latest";

#[derive(Debug, Clone)]
struct CachedProof {
    proof: PendingProof,
    inserted_at: Instant,
    seq: u64,
}

/// Bounded TTL cache of proofs received by callback but not yet claimed
///
/// Keyed `pending:<wallet|latest>:<provider>`, with a secondary index from
/// proof id to key. When full, the oldest entry is evicted first.
pub struct PendingProofCache {
    entries: DashMap<String, CachedProof>,
    by_proof: DashMap<String, String>,
    ttl: Duration,
    capacity: usize,
    seq: AtomicU64,
}

impl PendingProofCache {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            entries: DashMap::new(),
            by_proof: DashMap::new(),
            ttl,
            capacity: capacity.max(1),
            seq: AtomicU64::new(0),
        }
    }

    pub fn key_for(wallet: Option<&str>, provider: &str) -> String {
        let wallet = wallet
            .map(|w| w.trim().to_lowercase())
            .filter(|w| !w.is_empty())
            .unwrap_or_else(|| LATEST_SLOT.to_string());
        format!("pending:{}:{}", wallet, provider.trim().to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn is_expired(&self, cached: &CachedProof) -> bool {
        cached.inserted_at.elapsed() >= self.ttl
    }

    fn remove_key(&self, key: &str) -> Option<CachedProof> {
        let (_, cached) = self.entries.remove(key)?;
        self.by_proof
            .remove_if(&cached.proof.proof_id, |_, indexed_key| indexed_key == key);
        Some(cached)
    }

    /// Store a proof, replacing any unclaimed one in the same slot. Returns its key.
    pub fn insert(&self, proof: PendingProof) -> String {
        let key = Self::key_for(proof.wallet_address.as_deref(), &proof.provider);

        self.purge_expired();
        while self.entries.len() >= self.capacity && !self.entries.contains_key(&key) {
            if !self.evict_oldest() {
                break;
            }
        }

        if let Some(previous) = self.remove_key(&key) {
            debug!(key = %key, proof_id = %previous.proof.proof_id, "Replacing unclaimed proof");
        }

        let proof_id = proof.proof_id.clone();
        let cached = CachedProof {
            proof,
            inserted_at: Instant::now(),
            seq: self.seq.fetch_add(1, Ordering::Relaxed),
        };
        self.entries.insert(key.clone(), cached);
        self.by_proof.insert(proof_id, key.clone());

        key
    }

    fn evict_oldest(&self) -> bool {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|entry| entry.value().seq)
            .map(|entry| entry.key().clone());

        match oldest {
            Some(key) => {
                debug!(key = %key, "Evicting oldest pending proof");
                self.remove_key(&key).is_some()
            }
            None => false,
        }
    }

    /// Remove and return the proof waiting for `wallet` and `provider`. Falls
    /// back to the newest unbound proof for the provider received within
    /// [`FALLBACK_WINDOW`].
    pub fn take(&self, wallet: &str, provider: &str) -> Option<PendingProof> {
        let key = Self::key_for(Some(wallet), provider);

        if let Some(cached) = self.remove_key(&key) {
            if !self.is_expired(&cached) {
                return Some(cached.proof);
            }
        }

        let provider = provider.trim().to_lowercase();
        let wallet = wallet.trim().to_lowercase();

        let mut candidates: Vec<(u64, String)> = self
            .entries
            .iter()
            .filter(|entry| {
                let cached = entry.value();
                cached.proof.provider == provider
                    && cached
                        .proof
                        .wallet_address
                        .as_deref()
                        .map_or(true, |bound| bound == wallet)
                    && cached.inserted_at.elapsed() <= FALLBACK_WINDOW
                    && !self.is_expired(cached)
            })
            .map(|entry| (entry.value().seq, entry.key().clone()))
            .collect();
        candidates.sort_by(|a, b| b.0.cmp(&a.0));

        // Concurrent takers race on remove; the loser moves to the next candidate
        candidates
            .into_iter()
            .find_map(|(_, key)| self.remove_key(&key))
            .map(|cached| cached.proof)
    }

    /// Look up a proof by id without claiming it
    pub fn get_by_proof(&self, proof_id: &str) -> Option<PendingProof> {
        let key = self.by_proof.get(proof_id)?.value().clone();
        let cached = self.entries.get(&key)?.value().clone();

        if self.is_expired(&cached) {
            self.remove_key(&key);
            return None;
        }

        Some(cached.proof)
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| self.is_expired(entry.value()))
            .map(|entry| entry.key().clone())
            .collect();

        expired
            .iter()
            .filter(|key| self.remove_key(key).is_some())
            .count()
    }
}
