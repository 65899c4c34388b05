//! Databases and the Keyspace
//!
//! A [`Database`] is one of the server's numbered keyspaces. Keys are spread
//! over a fixed number of shards, each behind its own `RwLock`, so
//! connections touching different keys rarely contend.
//!
//! ## Expiry lives with the entry
//!
//! Every key maps to one [`Entry`] holding both the value and the optional
//! absolute expiry (milliseconds since the Unix epoch). Deleting the entry
//! deletes its expiry; there is no second map to keep in sync.
//!
//! Each shard also keeps an ordered `(deadline, key)` index. It is updated
//! by the same shard methods, under the same lock, as the entry map, and it
//! exists only so the active sweep can look at the oldest deadlines first
//! without scanning the whole shard.
//!
//! ```text
//! ┌──────────────────────── Database #n ────────────────────────┐
//! │  ┌──────────────┐ ┌──────────────┐        ┌──────────────┐  │
//! │  │   Shard 0    │ │   Shard 1    │  ...   │   Shard 15   │  │
//! │  │ entries      │ │ entries      │        │ entries      │  │
//! │  │ deadlines    │ │ deadlines    │        │ deadlines    │  │
//! │  └──────────────┘ └──────────────┘        └──────────────┘  │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use crate::storage::value::Value;
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tracing::trace;

/// Number of shards per database.
const NUM_SHARDS: usize = 16;

/// A stored value together with its optional expiry time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub value: Value,
    /// Absolute expiry in Unix milliseconds (None = persistent)
    pub expires_at: Option<u64>,
}

impl Entry {
    pub fn new(value: Value) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    pub fn with_expiry(value: Value, expires_at: u64) -> Self {
        Self {
            value,
            expires_at: Some(expires_at),
        }
    }

    /// A key whose expiry is `<= now` is logically gone.
    #[inline]
    pub fn is_expired(&self, now: u64) -> bool {
        matches!(self.expires_at, Some(at) if at <= now)
    }
}

/// Outcome of one bounded sweep over a database.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepResult {
    /// Deadline index entries looked at
    pub examined: usize,
    /// Keys deleted because they had expired
    pub expired: usize,
}

#[derive(Debug, Default)]
struct Shard {
    entries: HashMap<Bytes, Entry>,
    deadlines: BTreeSet<(u64, Bytes)>,
}

impl Shard {
    fn insert(&mut self, key: Bytes, entry: Entry) {
        let deadline = entry.expires_at;
        if let Some(old) = self.entries.insert(key.clone(), entry) {
            self.forget_deadline(&key, old.expires_at);
        }
        if let Some(at) = deadline {
            self.deadlines.insert((at, key));
        }
    }

    fn remove(&mut self, key: &Bytes) -> Option<Entry> {
        let old = self.entries.remove(key)?;
        self.forget_deadline(key, old.expires_at);
        Some(old)
    }

    fn forget_deadline(&mut self, key: &Bytes, at: Option<u64>) {
        if let Some(at) = at {
            self.deadlines.remove(&(at, key.clone()));
        }
    }

    /// Replaces the expiry of an existing key. Returns false if absent.
    fn set_deadline(&mut self, key: &Bytes, at: Option<u64>) -> bool {
        let old = match self.entries.get_mut(key) {
            Some(entry) => std::mem::replace(&mut entry.expires_at, at),
            None => return false,
        };
        self.forget_deadline(key, old);
        if let Some(at) = at {
            self.deadlines.insert((at, key.clone()));
        }
        true
    }

    fn expire_if_due(&mut self, key: &Bytes, now: u64) -> bool {
        let due = self.entries.get(key).is_some_and(|e| e.is_expired(now));
        if due {
            self.remove(key);
        }
        due
    }

    /// Looks at up to `budget` deadlines, oldest first.
    fn sweep(&mut self, now: u64, budget: usize) -> SweepResult {
        let mut result = SweepResult::default();

        while result.examined < budget {
            let at = match self.deadlines.first() {
                Some((at, _)) => *at,
                None => break,
            };
            result.examined += 1;
            if at > now {
                // Everything behind the head expires even later.
                break;
            }
            if let Some((at, key)) = self.deadlines.pop_first() {
                if self
                    .entries
                    .get(&key)
                    .is_some_and(|e| e.expires_at == Some(at))
                {
                    self.entries.remove(&key);
                    result.expired += 1;
                }
            }
        }

        result
    }
}

/// One numbered keyspace.
///
/// All access goes through methods that apply the lazy expiry rule first,
/// so handlers never observe a key whose deadline has passed.
pub struct Database {
    index: usize,
    shards: Vec<RwLock<Shard>>,
    /// Keys deleted because they expired (lazy or active)
    expired: AtomicU64,
    /// Shard the next active sweep starts from
    sweep_cursor: AtomicUsize,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("index", &self.index)
            .field("keys", &self.len())
            .field("expired", &self.expired_count())
            .finish()
    }
}

impl Database {
    pub fn new(index: usize) -> Self {
        Self {
            index,
            shards: (0..NUM_SHARDS).map(|_| RwLock::new(Shard::default())).collect(),
            expired: AtomicU64::new(0),
            sweep_cursor: AtomicUsize::new(0),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    #[inline]
    fn shard(&self, key: &[u8]) -> &RwLock<Shard> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % NUM_SHARDS]
    }

    /// Applies the lazy expiry rule with the shard already write-locked.
    fn expire_locked(&self, shard: &mut Shard, key: &Bytes, now: u64) -> bool {
        let removed = shard.expire_if_due(key, now);
        if removed {
            self.expired.fetch_add(1, Ordering::Relaxed);
            trace!(db = self.index, key = ?key, "Lazily expired key");
        }
        removed
    }

    /// Lazy expiry check.
    ///
    /// Deletes the key and returns true if its deadline is `<= now`.
    /// Returns false for persistent, live or absent keys, including a key
    /// another caller already expired, so the counter moves once per key.
    pub fn is_expired(&self, key: &Bytes, now: u64) -> bool {
        {
            let shard = self.shard(key).read();
            match shard.entries.get(key) {
                Some(entry) if entry.is_expired(now) => {}
                _ => return false,
            }
        }

        let mut shard = self.shard(key).write();
        self.expire_locked(&mut shard, key, now)
    }

    /// Runs `f` against the live entry for `key`, if any.
    pub fn read<R>(&self, key: &Bytes, now: u64, f: impl FnOnce(Option<&Entry>) -> R) -> R {
        // Fast path: read lock, key absent or still alive.
        {
            let shard = self.shard(key).read();
            match shard.entries.get(key) {
                Some(entry) if entry.is_expired(now) => {}
                entry => return f(entry),
            }
        }

        let mut shard = self.shard(key).write();
        self.expire_locked(&mut shard, key, now);
        f(shard.entries.get(key))
    }

    /// Returns a copy of the value stored at `key`.
    pub fn get(&self, key: &Bytes, now: u64) -> Option<Value> {
        self.read(key, now, |entry| entry.map(|e| e.value.clone()))
    }

    pub fn contains(&self, key: &Bytes, now: u64) -> bool {
        self.read(key, now, |entry| entry.is_some())
    }

    /// Read-modify-write on the value at `key`.
    ///
    /// `f` sees `None` for an absent key and may fill the slot to create it.
    /// An existing key keeps its expiry. Leaving the slot empty, or holding
    /// an aggregate with no elements, deletes the key.
    pub fn update<R>(&self, key: &Bytes, now: u64, f: impl FnOnce(&mut Option<Value>) -> R) -> R {
        let mut shard = self.shard(key).write();
        self.expire_locked(&mut shard, key, now);

        let (mut slot, expires_at) = match shard.entries.remove(key) {
            Some(entry) => (Some(entry.value), entry.expires_at),
            None => (None, None),
        };

        let out = f(&mut slot);

        match slot {
            Some(value) if !value.is_empty_aggregate() => {
                // The deadline index still holds (expires_at, key).
                shard.entries.insert(key.clone(), Entry { value, expires_at });
            }
            _ => shard.forget_deadline(key, expires_at),
        }

        out
    }

    /// Stores `value` at `key`, discarding any previous value and expiry.
    pub fn set(&self, key: Bytes, value: Value, now: u64) {
        let mut shard = self.shard(&key).write();
        self.expire_locked(&mut shard, &key, now);
        shard.insert(key, Entry::new(value));
    }

    /// Inserts a fully formed entry, as the snapshot loader does.
    pub fn restore(&self, key: Bytes, entry: Entry) {
        self.shard(&key).write().insert(key, entry);
    }

    /// Deletes `key`. Returns true if a live key was removed.
    pub fn remove(&self, key: &Bytes, now: u64) -> bool {
        let mut shard = self.shard(key).write();
        if self.expire_locked(&mut shard, key, now) {
            return false;
        }
        shard.remove(key).is_some()
    }

    /// Sets an absolute expiry on a live key. Returns false if absent.
    pub fn set_expiry(&self, key: &Bytes, at: u64, now: u64) -> bool {
        let mut shard = self.shard(key).write();
        self.expire_locked(&mut shard, key, now);
        shard.set_deadline(key, Some(at))
    }

    /// Removes the expiry of a key. Returns false if absent or persistent.
    pub fn persist(&self, key: &Bytes, now: u64) -> bool {
        let mut shard = self.shard(key).write();
        self.expire_locked(&mut shard, key, now);
        match shard.entries.get(key) {
            Some(entry) if entry.expires_at.is_some() => shard.set_deadline(key, None),
            _ => false,
        }
    }

    /// `None` if the key is absent, `Some(None)` if it is persistent.
    pub fn expiry_of(&self, key: &Bytes, now: u64) -> Option<Option<u64>> {
        self.read(key, now, |entry| entry.map(|e| e.expires_at))
    }

    /// All live keys matching a glob pattern.
    ///
    /// Scans every shard under read locks; logically expired keys are
    /// skipped but left for the expiry manager to reclaim.
    pub fn keys(&self, pattern: &[u8], now: u64) -> Vec<Bytes> {
        let pattern = GlobPattern::new(pattern);
        let mut result = Vec::new();

        for shard in &self.shards {
            let shard = shard.read();
            for (key, entry) in &shard.entries {
                if !entry.is_expired(now) && pattern.matches(key) {
                    result.push(key.clone());
                }
            }
        }

        result
    }

    /// Number of stored keys, including expired ones not yet reclaimed.
    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.read().entries.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of keys carrying an expiry.
    pub fn volatile_len(&self) -> usize {
        self.shards.iter().map(|s| s.read().deadlines.len()).sum()
    }

    /// Deletes every key. Returns how many were removed.
    pub fn clear(&self) -> usize {
        let mut removed = 0;
        for shard in &self.shards {
            let mut shard = shard.write();
            removed += shard.entries.len();
            shard.entries.clear();
            shard.deadlines.clear();
        }
        removed
    }

    /// Active expiry: examines at most `budget` deadlines across shards.
    ///
    /// Each call starts one shard further along, so repeated sweeps reach
    /// every shard even when the budget runs out early.
    pub fn sweep(&self, now: u64, budget: usize) -> SweepResult {
        let start = self.sweep_cursor.fetch_add(1, Ordering::Relaxed);
        let mut total = SweepResult::default();

        for i in 0..NUM_SHARDS {
            let remaining = budget.saturating_sub(total.examined);
            if remaining == 0 {
                break;
            }
            let mut shard = self.shards[(start + i) % NUM_SHARDS].write();
            let result = shard.sweep(now, remaining);
            total.examined += result.examined;
            total.expired += result.expired;
        }

        if total.expired > 0 {
            self.expired
                .fetch_add(total.expired as u64, Ordering::Relaxed);
        }
        total
    }

    /// Keys deleted by expiry since startup.
    pub fn expired_count(&self) -> u64 {
        self.expired.load(Ordering::Relaxed)
    }

    /// Copies out every entry, ordered by key.
    pub fn export(&self) -> BTreeMap<Bytes, Entry> {
        let mut out = BTreeMap::new();
        for shard in &self.shards {
            let shard = shard.read();
            out.extend(shard.entries.iter().map(|(k, e)| (k.clone(), e.clone())));
        }
        out
    }
}

/// The server's numbered databases.
#[derive(Debug)]
pub struct Keyspace {
    databases: Vec<Database>,
}

impl Keyspace {
    pub fn new(count: usize) -> Self {
        Self {
            databases: (0..count).map(Database::new).collect(),
        }
    }

    pub fn db(&self, index: usize) -> Option<&Database> {
        self.databases.get(index)
    }

    /// Number of databases.
    pub fn len(&self) -> usize {
        self.databases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.databases.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Database> {
        self.databases.iter()
    }

    /// Keys deleted by expiry across all databases.
    pub fn expired_keys(&self) -> u64 {
        self.databases.iter().map(Database::expired_count).sum()
    }

    pub fn total_keys(&self) -> usize {
        self.databases.iter().map(Database::len).sum()
    }

    pub fn flush_all(&self) -> usize {
        self.databases.iter().map(Database::clear).sum()
    }

    /// Copies out every database, used to compare reconstructed state.
    pub fn export(&self) -> Vec<BTreeMap<Bytes, Entry>> {
        self.databases.iter().map(Database::export).collect()
    }
}

/// Glob matcher for the KEYS command (`*`, `?`, `[a-z]`, `[^x]`, `\x`).
struct GlobPattern<'a> {
    pattern: &'a [u8],
}

impl<'a> GlobPattern<'a> {
    fn new(pattern: &'a [u8]) -> Self {
        Self { pattern }
    }

    fn matches(&self, text: &[u8]) -> bool {
        glob_match(self.pattern, text)
    }
}

/// Iterative matcher. Only the most recent `*` is ever backtracked to, so
/// the cost stays `O(pattern * text)` however many stars the pattern has.
fn glob_match(pattern: &[u8], text: &[u8]) -> bool {
    let (mut p, mut t) = (0, 0);
    // Pattern index after the last `*`, and the text index it resumes from.
    let mut star: Option<(usize, usize)> = None;

    while t < text.len() {
        if pattern.get(p) == Some(&b'*') {
            p += 1;
            star = Some((p, t));
            continue;
        }
        if let Some(next) = match_token(pattern, p, text[t]) {
            p = next;
            t += 1;
            continue;
        }
        match star {
            Some((resume, from)) => {
                p = resume;
                t = from + 1;
                star = Some((resume, from + 1));
            }
            None => return false,
        }
    }

    pattern[p..].iter().all(|&c| c == b'*')
}

/// Matches the single-byte token at `pattern[p]` against `c`, returning the
/// index of the following token.
fn match_token(pattern: &[u8], p: usize, c: u8) -> Option<usize> {
    match *pattern.get(p)? {
        b'?' => Some(p + 1),
        b'[' => {
            let mut i = p + 1;
            let negate = pattern.get(i) == Some(&b'^');
            if negate {
                i += 1;
            }
            let mut matched = false;
            while i < pattern.len() && pattern[i] != b']' {
                if i + 2 < pattern.len() && pattern[i + 1] == b'-' && pattern[i + 2] != b']' {
                    matched |= (pattern[i]..=pattern[i + 2]).contains(&c);
                    i += 3;
                } else {
                    matched |= pattern[i] == c;
                    i += 1;
                }
            }
            // Unterminated class never matches.
            (i < pattern.len() && matched != negate).then_some(i + 1)
        }
        b'\\' if p + 1 < pattern.len() => (pattern[p + 1] == c).then_some(p + 2),
        lit => (lit == c).then_some(p + 1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Arc;

    fn key(s: &str) -> Bytes {
        Bytes::from(s.to_string())
    }

    #[test]
    fn test_set_and_get() {
        let db = Database::new(0);
        db.set(key("name"), Value::from("tide"), 0);
        assert_eq!(db.get(&key("name"), 0), Some(Value::from("tide")));
        assert_eq!(db.get(&key("missing"), 0), None);
    }

    #[test]
    fn test_lazy_expiry_on_get() {
        let db = Database::new(0);
        db.set(key("k"), Value::from("v"), 1_000);
        assert!(db.set_expiry(&key("k"), 1_100, 1_000));

        assert_eq!(db.get(&key("k"), 1_099), Some(Value::from("v")));
        // At exactly the deadline the key is gone.
        assert_eq!(db.get(&key("k"), 1_100), None);
        assert_eq!(db.expired_count(), 1);
        assert_eq!(db.len(), 0);
        assert_eq!(db.volatile_len(), 0);
    }

    #[test]
    fn test_is_expired_counts_once() {
        let db = Database::new(0);
        db.restore(key("k"), Entry::with_expiry(Value::from("v"), 10));

        assert!(db.is_expired(&key("k"), 20));
        assert!(!db.is_expired(&key("k"), 20));
        assert_eq!(db.expired_count(), 1);
    }

    #[test]
    fn test_is_expired_false_for_live_and_persistent_keys() {
        let db = Database::new(0);
        db.set(key("persistent"), Value::from("v"), 0);
        db.restore(key("volatile"), Entry::with_expiry(Value::from("v"), 100));

        assert!(!db.is_expired(&key("persistent"), 1_000));
        assert!(!db.is_expired(&key("volatile"), 50));
        assert!(!db.is_expired(&key("absent"), 50));
        assert_eq!(db.len(), 2);
    }

    #[test]
    fn test_set_clears_expiry() {
        let db = Database::new(0);
        db.restore(key("k"), Entry::with_expiry(Value::from("v"), 100));
        db.set(key("k"), Value::from("w"), 50);

        assert_eq!(db.expiry_of(&key("k"), 50), Some(None));
        assert_eq!(db.volatile_len(), 0);
        assert_eq!(db.get(&key("k"), 10_000), Some(Value::from("w")));
    }

    #[test]
    fn test_update_keeps_expiry_and_deletes_empty_aggregates() {
        let db = Database::new(0);
        db.update(&key("list"), 0, |slot| {
            *slot = Some(Value::List(VecDeque::from(vec![key("a")])));
        });
        db.set_expiry(&key("list"), 500, 0);

        db.update(&key("list"), 10, |slot| {
            if let Some(Value::List(items)) = slot {
                items.push_back(key("b"));
            }
        });
        assert_eq!(db.expiry_of(&key("list"), 10), Some(Some(500)));

        db.update(&key("list"), 20, |slot| {
            if let Some(Value::List(items)) = slot {
                items.clear();
            }
        });
        assert!(!db.contains(&key("list"), 20));
        assert_eq!(db.volatile_len(), 0);
    }

    #[test]
    fn test_persist() {
        let db = Database::new(0);
        db.set(key("k"), Value::from("v"), 0);
        assert!(!db.persist(&key("k"), 0));

        db.set_expiry(&key("k"), 100, 0);
        assert!(db.persist(&key("k"), 0));
        assert_eq!(db.expiry_of(&key("k"), 0), Some(None));
        assert_eq!(db.volatile_len(), 0);
        assert_eq!(db.get(&key("k"), 1_000), Some(Value::from("v")));
    }

    #[test]
    fn test_remove_expired_key_reports_absent() {
        let db = Database::new(0);
        db.restore(key("k"), Entry::with_expiry(Value::from("v"), 10));
        assert!(!db.remove(&key("k"), 10));
        assert_eq!(db.expired_count(), 1);
    }

    #[test]
    fn test_sweep_is_bounded() {
        let db = Database::new(0);
        for i in 0..100 {
            db.restore(
                key(&format!("k{i}")),
                Entry::with_expiry(Value::from("v"), 10),
            );
        }

        let result = db.sweep(20, 30);
        assert!(result.examined <= 30);
        assert_eq!(result.expired, result.examined);
        assert_eq!(db.len(), 100 - result.expired);

        // Repeated sweeps make forward progress until nothing is left.
        let mut rounds = 0;
        while !db.is_empty() {
            db.sweep(20, 30);
            rounds += 1;
            assert!(rounds < 100, "sweep made no progress");
        }
        assert_eq!(db.expired_count(), 100);
    }

    #[test]
    fn test_sweep_leaves_live_keys() {
        let db = Database::new(0);
        db.restore(key("old"), Entry::with_expiry(Value::from("v"), 10));
        db.restore(key("new"), Entry::with_expiry(Value::from("v"), 10_000));
        db.set(key("plain"), Value::from("v"), 0);

        let mut expired = 0;
        for _ in 0..NUM_SHARDS {
            expired += db.sweep(100, 20).expired;
        }
        assert_eq!(expired, 1);
        assert!(db.contains(&key("new"), 100));
        assert!(db.contains(&key("plain"), 100));
    }

    #[test]
    fn test_concurrent_lazy_and_active_expiry_count_once() {
        for _ in 0..50 {
            let db = Arc::new(Database::new(0));
            db.restore(key("k"), Entry::with_expiry(Value::from("v"), 10));

            let lazy = {
                let db = Arc::clone(&db);
                std::thread::spawn(move || db.is_expired(&key("k"), 20))
            };
            let active = {
                let db = Arc::clone(&db);
                std::thread::spawn(move || {
                    (0..NUM_SHARDS).map(|_| db.sweep(20, 4).expired).sum::<usize>()
                })
            };

            let by_lazy = lazy.join().unwrap();
            let by_sweep = active.join().unwrap();
            assert_eq!(usize::from(by_lazy) + by_sweep, 1);
            assert_eq!(db.expired_count(), 1);
        }
    }

    #[test]
    fn test_keys_pattern() {
        let db = Database::new(0);
        db.set(key("user:1"), Value::from("a"), 0);
        db.set(key("user:2"), Value::from("b"), 0);
        db.set(key("session:1"), Value::from("c"), 0);
        db.restore(key("user:3"), Entry::with_expiry(Value::from("d"), 5));

        let mut keys = db.keys(b"user:*", 10);
        keys.sort();
        assert_eq!(keys, vec![key("user:1"), key("user:2")]);
        assert_eq!(db.keys(b"*", 10).len(), 3);
    }

    #[test]
    fn test_glob_pattern() {
        assert!(glob_match(b"h?llo", b"hello"));
        assert!(!glob_match(b"h?llo", b"hllo"));
        assert!(glob_match(b"h[ae]llo", b"hallo"));
        assert!(!glob_match(b"h[ae]llo", b"hillo"));
        assert!(glob_match(b"h[a-c]llo", b"hbllo"));
        assert!(glob_match(b"h[^e]llo", b"hallo"));
        assert!(!glob_match(b"h[^e]llo", b"hello"));
        assert!(glob_match(b"a\\*b", b"a*b"));
        assert!(!glob_match(b"a\\*b", b"axb"));
        assert!(glob_match(b"*", b""));
        assert!(glob_match(b"user:*:name", b"user:42:name"));
        assert!(!glob_match(b"user:*:name", b"user:42:age"));
        assert!(glob_match(b"a*b*c", b"aXbYbZc"));
        assert!(glob_match(b"a\\", b"a\\"));
        assert!(!glob_match(b"h[ae", b"ha"));
    }

    #[test]
    fn test_glob_many_stars_is_fast() {
        let text = vec![b'a'; 4096];
        let pattern = format!("{}b", "*a".repeat(32));

        let start = std::time::Instant::now();
        assert!(!glob_match(pattern.as_bytes(), &text));
        assert!(!glob_match(b"*a*a*a*a*a*a*a*a*b", &text[..40]));
        assert!(glob_match(pattern.trim_end_matches('b').as_bytes(), &text));
        assert!(start.elapsed() < std::time::Duration::from_secs(1));

        let db = Database::new(0);
        for i in 0..64 {
            db.set(key(&format!("{}{i}", "a".repeat(40))), Value::from("v"), 0);
        }
        let start = std::time::Instant::now();
        assert!(db.keys(b"*a*a*a*a*a*a*a*a*b", 0).is_empty());
        assert!(start.elapsed() < std::time::Duration::from_secs(1));
    }

    #[test]
    fn test_keyspace_aggregates() {
        let keyspace = Keyspace::new(4);
        assert_eq!(keyspace.len(), 4);
        assert!(keyspace.db(4).is_none());

        let db1 = keyspace.db(1).unwrap();
        db1.restore(key("k"), Entry::with_expiry(Value::from("v"), 1));
        keyspace.db(2).unwrap().set(key("k"), Value::from("v"), 0);
        assert!(db1.is_expired(&key("k"), 5));

        assert_eq!(keyspace.expired_keys(), 1);
        assert_eq!(keyspace.total_keys(), 1);
        assert_eq!(keyspace.flush_all(), 1);
    }
}
