//! Minute bucket arithmetic and counter keys.
//!
//! Buckets align to wall-clock minute boundaries (`floor(unix / 60)`), so a
//! client can spend its full limit at the end of one minute and again at the
//! start of the next. That burst at the boundary is existing behavior.

use std::time::Duration;

/// Length of a bucket in seconds.
pub const BUCKET_SECONDS: i64 = 60;

/// How long a counter lives in the store after its last increment.
pub const BUCKET_TTL: Duration = Duration::from_secs(BUCKET_SECONDS as u64);

/// Label used when describing the accounting interval to clients.
pub const INTERVAL_LABEL: &str = "minute";

/// A 60-second wall-clock-aligned accounting window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MinuteBucket(i64);

impl MinuteBucket {
    /// The bucket containing the given unix time.
    pub fn containing(unix_seconds: i64) -> Self {
        MinuteBucket(unix_seconds.div_euclid(BUCKET_SECONDS))
    }

    pub fn index(&self) -> i64 {
        self.0
    }

    /// Seconds from `unix_seconds` until the next bucket begins, in `1..=60`.
    pub fn reset_seconds(unix_seconds: i64) -> i64 {
        BUCKET_SECONDS - unix_seconds.rem_euclid(BUCKET_SECONDS)
    }
}

/// Key identifying a rate limit counter in the counter store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CounterKey {
    /// Client address the counter belongs to.
    pub client: String,
    /// HTTP method being counted.
    pub method: String,
    /// Accounting bucket.
    pub bucket: MinuteBucket,
}

impl CounterKey {
    pub fn new(client: &str, method: &str, bucket: MinuteBucket) -> Self {
        Self {
            client: client.to_string(),
            method: method.to_string(),
            bucket,
        }
    }

    /// Convert to a store key string.
    /// Format: "{prefix}{client}|{method}|{bucket}"
    pub fn to_store_key(&self, prefix: &str) -> String {
        format!("{}{}|{}|{}", prefix, self.client, self.method, self.bucket.index())
    }

    /// Parse a store key produced by [`CounterKey::to_store_key`].
    pub fn from_store_key(prefix: &str, key: &str) -> Option<Self> {
        let rest = key.strip_prefix(prefix)?;

        // Methods never contain '|', clients (IPv6 included) never do either,
        // so splitting from the right is unambiguous.
        let mut parts = rest.rsplitn(3, '|');
        let bucket: i64 = parts.next()?.parse().ok()?;
        let method = parts.next()?;
        let client = parts.next()?;

        if client.is_empty() || method.is_empty() {
            return None;
        }

        Some(Self::new(client, method, MinuteBucket(bucket)))
    }
}

impl std::fmt::Display for CounterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}|{}|{}", self.client, self.method, self.bucket.index())
    }
}
