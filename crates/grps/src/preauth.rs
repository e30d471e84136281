use grp_common::{ByteReader, RejectionReason};
use lru::LruCache;
use rand::Rng;
use std::net::SocketAddr;
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Attempts at generating a non-colliding challenge id before giving up.
const CHALLENGE_ISSUE_ATTEMPTS: usize = 3;

/// Upper bound on outstanding challenge entries.
const CHALLENGE_CAPACITY: usize = 4096;

/// How long an issued challenge id stays valid.
const CHALLENGE_TTL: Duration = Duration::from_secs(120);

/// Outcome of one preauthentication pass. Created fresh per handshake
/// attempt, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreauthOutcome {
    /// Forward the original connection request to the backend.
    Accept,
    /// Answer the peer with a Disconnect carrying this reason.
    Reject(RejectionReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct ChallengeKey {
    peer: SocketAddr,
    id: i32,
}

/// An issued challenge id awaiting the peer's follow-up handshake.
#[derive(Debug, Clone, Copy)]
struct ChallengeEntry {
    issued_at: Instant,
}

/// Outstanding handshake challenges, keyed by peer address plus issued id.
///
/// Owned by the server state rather than hiding behind a global so its
/// lifetime matches the listener's. The clock is injected per call, which
/// keeps eviction deterministic under test. Bounded two ways: LRU capacity
/// and a TTL applied by [`ChallengeRegistry::evict_expired`].
#[derive(Debug)]
pub struct ChallengeRegistry {
    entries: Mutex<LruCache<ChallengeKey, ChallengeEntry>>,
    ttl: Duration,
}

impl ChallengeRegistry {
    /// Creates a registry retaining at most `capacity` entries for `ttl`.
    #[must_use]
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    /// Whether an id is already outstanding for this peer.
    #[must_use]
    pub fn contains(&self, peer: SocketAddr, id: i32) -> bool {
        match self.entries.lock() {
            Ok(entries) => entries.contains(&ChallengeKey { peer, id }),
            Err(_) => false,
        }
    }

    /// Generates and registers a fresh nonzero challenge id for `peer`.
    ///
    /// Retries up to three times on collision with an outstanding id; returns
    /// `None` when every attempt collides. The entry is registered before the
    /// caller gets to respond, so a follow-up handshake can always find it.
    pub fn issue(
        &self,
        peer: SocketAddr,
        now: Instant,
        mut gen: impl FnMut() -> i32,
    ) -> Option<i32> {
        let Ok(mut entries) = self.entries.lock() else {
            return None;
        };
        for _ in 0..CHALLENGE_ISSUE_ATTEMPTS {
            let mut id = gen();
            if id == 0 {
                id = 1;
            }
            let key = ChallengeKey { peer, id };
            if entries.contains(&key) {
                continue;
            }
            entries.put(key, ChallengeEntry { issued_at: now });
            return Some(id);
        }
        None
    }

    /// Removes every entry issued longer than the TTL ago.
    pub fn evict_expired(&self, now: Instant) {
        let Ok(mut entries) = self.entries.lock() else {
            return;
        };
        let expired: Vec<ChallengeKey> = entries
            .iter()
            .filter(|(_, entry)| now.saturating_duration_since(entry.issued_at) >= self.ttl)
            .map(|(key, _)| *key)
            .collect();
        for key in expired {
            entries.pop(&key);
        }
    }

    /// Number of outstanding challenge entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    /// Returns `true` when no challenges are outstanding.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ChallengeRegistry {
    fn default() -> Self {
        Self::new(CHALLENGE_CAPACITY, CHALLENGE_TTL)
    }
}

/// Runs one synchronous preauthentication pass over a handshake payload.
///
/// Walks the payload field by field and maps every malformed region to a
/// typed rejection; no input can make it panic. No state is retained across
/// calls except the challenge registry.
pub fn preauthenticate(
    reader: &mut ByteReader,
    peer: SocketAddr,
    challenges: &ChallengeRegistry,
    enforce_challenge: bool,
) -> PreauthOutcome {
    // Reserved marker byte: 1 short-circuits to accept for legacy clients,
    // 0 selects the full field walk, anything else is garbage.
    let marker = match reader.try_get_byte() {
        Some(marker) if marker < 2 => marker,
        _ => return PreauthOutcome::Reject(RejectionReason::InvalidToken),
    };
    if marker == 1 {
        return PreauthOutcome::Accept;
    }

    if !read_version(reader) {
        return PreauthOutcome::Reject(RejectionReason::VersionMismatch);
    }

    let Some((challenge_id, challenge_blob)) = read_challenge(reader) else {
        return PreauthOutcome::Reject(RejectionReason::InvalidChallenge);
    };

    if enforce_challenge && (challenge_id == 0 || challenge_blob.is_empty()) {
        let mut rng = rand::thread_rng();
        match challenges.issue(peer, Instant::now(), || rng.gen()) {
            Some(id) => {
                tracing::debug!(%peer, id, "issued handshake challenge id");
            }
            None => {
                tracing::warn!(%peer, "could not generate a unique challenge id");
                return PreauthOutcome::Reject(RejectionReason::Error);
            }
        }
    }

    match reader.try_get_string() {
        Some(user_id) if !user_id.is_empty() => {
            tracing::debug!(%peer, %user_id, "handshake user identified");
        }
        _ => return PreauthOutcome::Reject(RejectionReason::AuthenticationRequired),
    }

    // Expiration block plus reserved country/signature regions: consumed so
    // the cursor stays aligned, not semantically validated by the relay.
    let expiration = reader.try_get_i64();
    let flags = reader.try_get_byte();
    let country = reader.try_get_string();
    let signature = reader.try_get_bytes_with_length();
    if expiration.is_none() || flags.is_none() || country.is_none() || signature.is_none() {
        return PreauthOutcome::Reject(RejectionReason::Error);
    }

    PreauthOutcome::Accept
}

/// Version block: major/minor/revision bytes, a has-backward-revision flag,
/// and one more byte only when the flag is set. Well-formed means every
/// required field is present.
fn read_version(reader: &mut ByteReader) -> bool {
    let major = reader.try_get_byte();
    let minor = reader.try_get_byte();
    let revision = reader.try_get_byte();
    let has_backward_revision = reader.try_get_bool();
    let backward_revision = match has_backward_revision {
        Some(true) => reader.try_get_byte(),
        _ => Some(0),
    };
    major.is_some()
        && minor.is_some()
        && revision.is_some()
        && has_backward_revision.is_some()
        && backward_revision.is_some()
}

/// Challenge block: a 32-bit id plus a length-prefixed blob.
fn read_challenge(reader: &mut ByteReader) -> Option<(i32, Vec<u8>)> {
    let id = reader.try_get_i32()?;
    let blob = reader.try_get_bytes_with_length()?;
    Some((id, blob))
}
