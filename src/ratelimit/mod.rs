//! Rate limiting logic and counter storage.

mod bucket;
mod limiter;
mod redis_store;
mod store;

pub use bucket::{CounterKey, MinuteBucket, BUCKET_SECONDS, BUCKET_TTL, INTERVAL_LABEL};
pub use limiter::{RateLimitDecision, RateLimitError, RateLimiter, DENY_ALL_LIMIT};
pub use redis_store::RedisCounterStore;
pub use store::{CounterStore, MemoryCounterStore, StoreError};
