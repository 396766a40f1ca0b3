//! Sampling strategies (C6, step 4).
//!
//! A rejected sample is a distinct outcome from a dropped (queue-full) or
//! filtered (level/predicate) record: it increments `messages-sampled-out`,
//! per the spec's own open-question resolution (see DESIGN.md).

use std::collections::{HashMap, VecDeque};
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use enum_dispatch::enum_dispatch;

/// Derives a sampling key from a record's fields; used by the per-key and
/// consistent-hash strategies. `None` means "no key", which those strategies
/// treat as a single shared bucket.
pub type KeyFn = Box<dyn Fn(&crate::record::FieldMap) -> Option<String> + Send + Sync>;

#[enum_dispatch]
pub trait SamplerTrait {
    /// Returns `true` if the record should proceed to the queue.
    fn sample(&self, fields: &crate::record::FieldMap) -> bool;
}

#[enum_dispatch(SamplerTrait)]
pub enum Sampler {
    None(NoneSampler),
    Uniform(UniformSampler),
    Adaptive(AdaptiveSampler),
    TokenBucket(TokenBucketSampler),
    FirstN(FirstNSampler),
    ConsistentHash(ConsistentHashSampler),
}

impl Default for Sampler {
    fn default() -> Self {
        Sampler::None(NoneSampler)
    }
}

/// No sampling: every record proceeds. The default.
#[derive(Default)]
pub struct NoneSampler;

impl SamplerTrait for NoneSampler {
    fn sample(&self, _fields: &crate::record::FieldMap) -> bool {
        true
    }
}

/// Accepts a uniformly-random fraction `rate` of records, `rate` in `[0, 1]`.
pub struct UniformSampler {
    rate: f64,
    counter: AtomicU64,
}

impl UniformSampler {
    pub fn new(rate: f64) -> Self {
        Self { rate: rate.clamp(0.0, 1.0), counter: AtomicU64::new(0) }
    }
}

impl SamplerTrait for UniformSampler {
    fn sample(&self, _fields: &crate::record::FieldMap) -> bool {
        if self.rate >= 1.0 {
            return true;
        }
        if self.rate <= 0.0 {
            return false;
        }
        // Deterministic, allocation-free PRNG derived from a counter so the
        // accepted fraction is reproducible under a fixed call sequence
        // (spec §8 property 6 requires convergence with a fixed seed).
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        let hashed = splitmix64(n);
        let unit = (hashed >> 11) as f64 / (1u64 << 53) as f64;
        unit < self.rate
    }
}

/// Adapts the accept rate to converge on a target rate of accepted records
/// per window, halving or growing the internal probability based on recent
/// observed throughput.
pub struct AdaptiveSampler {
    target_rate: f64,
    accepted: AtomicU64,
    seen: AtomicU64,
}

impl AdaptiveSampler {
    pub fn new(target_rate: f64) -> Self {
        Self { target_rate: target_rate.clamp(0.0, 1.0), accepted: AtomicU64::new(0), seen: AtomicU64::new(0) }
    }
}

impl SamplerTrait for AdaptiveSampler {
    fn sample(&self, _fields: &crate::record::FieldMap) -> bool {
        let seen = self.seen.fetch_add(1, Ordering::Relaxed) + 1;
        let accepted = self.accepted.load(Ordering::Relaxed);
        let current_rate = accepted as f64 / seen as f64;
        let accept = current_rate <= self.target_rate;
        if accept {
            self.accepted.fetch_add(1, Ordering::Relaxed);
        }
        accept
    }
}

/// Token-bucket: `rate` tokens refilled per second, up to `burst` capacity.
pub struct TokenBucketSampler {
    rate_per_sec: f64,
    burst: f64,
    state: Mutex<TokenBucketState>,
}

struct TokenBucketState {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucketSampler {
    pub fn new(rate_per_sec: f64, burst: f64) -> Self {
        Self {
            rate_per_sec,
            burst,
            state: Mutex::new(TokenBucketState { tokens: burst, last_refill: Instant::now() }),
        }
    }
}

impl SamplerTrait for TokenBucketSampler {
    fn sample(&self, _fields: &crate::record::FieldMap) -> bool {
        let mut state = self.state.lock().unwrap();
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.last_refill = now;
        state.tokens = (state.tokens + elapsed * self.rate_per_sec).min(self.burst);
        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Accepts only the first `n` records observed per key (or overall, if
/// `key_fn` is `None`), resetting the count when `window` elapses since the
/// window's first record. `tail` instead retains the last `n` accepted
/// entries per key in a bounded deque, evicting the oldest once it has aged
/// past `window` to make room for a new one — a rolling trailing set rather
/// than head's accept-n-then-block-until-reset burst.
pub struct FirstNSampler {
    n: u64,
    tail: bool,
    key_fn: Option<KeyFn>,
    window: Option<Duration>,
    head_state: Mutex<HashMap<Option<String>, (u64, Instant)>>,
    tail_state: Mutex<HashMap<Option<String>, VecDeque<(u64, Instant)>>>,
    tail_seq: AtomicU64,
}

impl FirstNSampler {
    pub fn head(n: u64, key_fn: Option<KeyFn>) -> Self {
        Self {
            n,
            tail: false,
            key_fn,
            window: None,
            head_state: Mutex::new(HashMap::new()),
            tail_state: Mutex::new(HashMap::new()),
            tail_seq: AtomicU64::new(0),
        }
    }

    pub fn tail(n: u64, key_fn: Option<KeyFn>, window: Duration) -> Self {
        Self {
            n,
            tail: true,
            key_fn,
            window: Some(window),
            head_state: Mutex::new(HashMap::new()),
            tail_state: Mutex::new(HashMap::new()),
            tail_seq: AtomicU64::new(0),
        }
    }

    fn sample_head(&self, key: Option<String>) -> bool {
        let mut state = self.head_state.lock().unwrap();
        let now = Instant::now();
        let entry = state.entry(key).or_insert((0, now));
        if let Some(window) = self.window {
            if now.duration_since(entry.1) >= window {
                *entry = (0, now);
            }
        }
        entry.0 += 1;
        entry.0 <= self.n
    }

    fn sample_tail(&self, key: Option<String>) -> bool {
        let window = self.window.unwrap_or(Duration::ZERO);
        let now = Instant::now();
        let mut state = self.tail_state.lock().unwrap();
        let deque = state.entry(key).or_insert_with(VecDeque::new);
        if (deque.len() as u64) >= self.n {
            match deque.front() {
                Some(&(_, front_time)) if now.duration_since(front_time) >= window => {
                    deque.pop_front();
                }
                _ => return false,
            }
        }
        let id = self.tail_seq.fetch_add(1, Ordering::Relaxed);
        deque.push_back((id, now));
        true
    }
}

impl SamplerTrait for FirstNSampler {
    fn sample(&self, fields: &crate::record::FieldMap) -> bool {
        let key = self.key_fn.as_ref().and_then(|f| f(fields));
        if self.tail {
            self.sample_tail(key)
        } else {
            self.sample_head(key)
        }
    }
}

/// Deterministically accepts a `rate` fraction of keys by hashing the key
/// into `[0, 1)`, so the same key always sees the same accept/reject outcome.
pub struct ConsistentHashSampler {
    rate: f64,
    key_fn: KeyFn,
}

impl ConsistentHashSampler {
    pub fn new(rate: f64, key_fn: KeyFn) -> Self {
        Self { rate: rate.clamp(0.0, 1.0), key_fn }
    }
}

impl SamplerTrait for ConsistentHashSampler {
    fn sample(&self, fields: &crate::record::FieldMap) -> bool {
        let key = (self.key_fn)(fields).unwrap_or_default();
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        key.hash(&mut hasher);
        let hashed = hasher.finish();
        let unit = (hashed >> 11) as f64 / (1u64 << 53) as f64;
        unit < self.rate
    }
}

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::FieldMap;

    #[test]
    fn uniform_sampler_converges_to_rate() {
        let sampler = UniformSampler::new(0.25);
        let trials = 20_000;
        let accepted = (0..trials).filter(|_| sampler.sample(&FieldMap::new())).count();
        let observed = accepted as f64 / trials as f64;
        assert!((observed - 0.25).abs() < 0.02, "observed={observed}");
    }

    #[test]
    fn none_sampler_always_accepts() {
        let sampler = NoneSampler;
        for _ in 0..100 {
            assert!(sampler.sample(&FieldMap::new()));
        }
    }

    #[test]
    fn first_n_head_caps_per_key() {
        let sampler = FirstNSampler::head(2, None);
        assert!(sampler.sample(&FieldMap::new()));
        assert!(sampler.sample(&FieldMap::new()));
        assert!(!sampler.sample(&FieldMap::new()));
    }

    #[test]
    fn first_n_tail_evicts_oldest_once_capacity_exceeded() {
        let sampler = FirstNSampler::tail(2, None, Duration::ZERO);
        assert!(sampler.sample(&FieldMap::new()));
        assert!(sampler.sample(&FieldMap::new()));
        // Capacity is full; a zero window means the oldest entry is always
        // considered expired, so the third call evicts it to make room.
        assert!(sampler.sample(&FieldMap::new()));

        let state = sampler.tail_state.lock().unwrap();
        let retained: Vec<u64> = state[&None].iter().map(|&(id, _)| id).collect();
        assert_eq!(retained, vec![1, 2], "the first accepted entry should have been evicted");
    }

    #[test]
    fn first_n_tail_rejects_when_capacity_full_and_not_expired() {
        let sampler = FirstNSampler::tail(1, None, Duration::from_secs(60));
        assert!(sampler.sample(&FieldMap::new()));
        assert!(!sampler.sample(&FieldMap::new()), "capacity full and window not yet elapsed");
    }

    #[test]
    fn consistent_hash_is_stable_for_same_key() {
        let sampler = ConsistentHashSampler::new(0.5, Box::new(|_| Some("user-42".to_string())));
        let first = sampler.sample(&FieldMap::new());
        for _ in 0..10 {
            assert_eq!(sampler.sample(&FieldMap::new()), first);
        }
    }
}
