//! Token-bucket rate limiting.
//!
//! Every request takes one token from a shared [`TokenBucket`]. When the
//! bucket is empty the request waits for the next token, but only as long as
//! its budget allows: the smaller of the configured `max_wait` and the time
//! left before the request's deadline. A request that cannot get a token in
//! time, or is cancelled while waiting, fails with `TooManyRequests`.
//!
//! [`Limiter`] shares one bucket across all callers. [`KeyedLimiter`] keeps
//! one bucket per client key.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use gatehouse_middleware::stages::Limiter;
//!
//! // Five requests at once, then one every two seconds.
//! let limiter = Limiter::every(Duration::from_secs(2), 5);
//! ```

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use gatehouse_core::{AppError, Reply, RequestContext};
use gatehouse_telemetry::metrics;
use http::header::HeaderName;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::middleware::{BoxFuture, Middleware, Next};
use crate::types::{Request, RequestExt};

/// Message for a rejected request.
pub const RATE_LIMIT_EXCEEDED: &str = "Rate limit exceeded";

/// Default bucket capacity.
pub const DEFAULT_BURST: u32 = 5;

/// Default refill period (one token per period).
pub const DEFAULT_PERIOD: Duration = Duration::from_secs(10);

/// Default upper bound on how long a request may wait for a token.
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(1);

/// Why a token could not be acquired.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum LimitError {
    /// The next token arrives after the wait budget.
    #[error("no token available within {0:?}")]
    Exhausted(Duration),

    /// The request was cancelled while waiting.
    #[error("cancelled while waiting for a token")]
    Cancelled,
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    updated: Instant,
}

enum Reservation {
    Ready,
    After(Duration),
}

/// A token bucket with capacity `burst`, refilled at a fixed rate.
///
/// Check and decrement happen under one lock, so concurrent callers never
/// take the same token.
#[derive(Debug)]
pub struct TokenBucket {
    burst: u32,
    rate: f64,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    /// Creates a full bucket refilled at `rate` tokens per second.
    ///
    /// A rate that is zero, negative or NaN never refills.
    #[must_use]
    pub fn new(burst: u32, rate: f64) -> Self {
        let rate = if rate > 0.0 { rate } else { 0.0 };
        Self {
            burst,
            rate,
            state: Mutex::new(BucketState {
                tokens: f64::from(burst),
                updated: Instant::now(),
            }),
        }
    }

    /// Creates a full bucket that gains one token every `period`.
    ///
    /// A zero period never limits.
    #[must_use]
    pub fn every(period: Duration, burst: u32) -> Self {
        let rate = if period.is_zero() {
            f64::INFINITY
        } else {
            1.0 / period.as_secs_f64()
        };
        Self::new(burst, rate)
    }

    /// Returns the capacity.
    #[must_use]
    pub const fn burst(&self) -> u32 {
        self.burst
    }

    /// Returns the refill rate in tokens per second.
    #[must_use]
    pub const fn rate(&self) -> f64 {
        self.rate
    }

    /// Returns the current token balance. Negative while waiters hold
    /// reservations.
    #[must_use]
    pub fn available(&self) -> f64 {
        let mut state = self.state.lock();
        self.refill(&mut state, Instant::now());
        state.tokens
    }

    /// Takes a token, waiting at most `budget` for one.
    ///
    /// A waiting caller holds a reservation; cancelling through `cancel`
    /// gives it back.
    pub async fn acquire(&self, budget: Duration, cancel: &CancellationToken) -> Result<(), LimitError> {
        let wait = match self.reserve(budget)? {
            Reservation::Ready => return Ok(()),
            Reservation::After(wait) => wait,
        };

        tokio::select! {
            () = tokio::time::sleep(wait) => Ok(()),
            () = cancel.cancelled() => {
                self.release();
                Err(LimitError::Cancelled)
            }
        }
    }

    fn refill(&self, state: &mut BucketState, now: Instant) {
        let elapsed = now.saturating_duration_since(state.updated).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.rate).min(f64::from(self.burst));
        state.updated = now;
    }

    fn reserve(&self, budget: Duration) -> Result<Reservation, LimitError> {
        let mut state = self.state.lock();
        self.refill(&mut state, Instant::now());

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            return Ok(Reservation::Ready);
        }

        let wait = match Duration::try_from_secs_f64((1.0 - state.tokens) / self.rate) {
            Ok(wait) if wait <= budget => wait,
            _ => return Err(LimitError::Exhausted(budget)),
        };
        state.tokens -= 1.0;
        Ok(Reservation::After(wait))
    }

    fn release(&self) {
        let mut state = self.state.lock();
        state.tokens = (state.tokens + 1.0).min(f64::from(self.burst));
    }
}

impl Default for TokenBucket {
    fn default() -> Self {
        Self::every(DEFAULT_PERIOD, DEFAULT_BURST)
    }
}

fn wait_budget(ctx: &RequestContext, max_wait: Duration) -> Duration {
    ctx.remaining().map_or(max_wait, |left| left.min(max_wait))
}

async fn take_token(bucket: &TokenBucket, ctx: &RequestContext, max_wait: Duration) -> Result<(), AppError> {
    let budget = wait_budget(ctx, max_wait);
    bucket.acquire(budget, ctx.cancellation()).await.map_err(|err| {
        tracing::debug!(request_id = %ctx.request_id(), reason = %err, "rate limited");
        metrics::record_rate_limited();
        AppError::too_many_requests(RATE_LIMIT_EXCEEDED)
    })
}

/// Limits all requests through one shared bucket.
#[derive(Debug, Clone)]
pub struct Limiter {
    bucket: Arc<TokenBucket>,
    max_wait: Duration,
}

impl Limiter {
    /// Creates a limiter over an existing bucket.
    #[must_use]
    pub fn new(bucket: Arc<TokenBucket>) -> Self {
        Self {
            bucket,
            max_wait: DEFAULT_MAX_WAIT,
        }
    }

    /// Creates a limiter with its own bucket of `burst` tokens, refilled once
    /// per `period`.
    #[must_use]
    pub fn every(period: Duration, burst: u32) -> Self {
        Self::new(Arc::new(TokenBucket::every(period, burst)))
    }

    /// Sets the longest a request may wait for a token.
    #[must_use]
    pub const fn max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    /// Returns the shared bucket.
    #[must_use]
    pub fn bucket(&self) -> &Arc<TokenBucket> {
        &self.bucket
    }
}

impl Default for Limiter {
    fn default() -> Self {
        Self::every(DEFAULT_PERIOD, DEFAULT_BURST)
    }
}

impl Middleware for Limiter {
    fn name(&self) -> &'static str {
        "limiter"
    }

    fn process<'a>(
        &'a self,
        ctx: RequestContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Reply> {
        Box::pin(async move {
            match take_token(&self.bucket, &ctx, self.max_wait).await {
                Ok(()) => next.run(ctx, request).await,
                Err(err) => err.into(),
            }
        })
    }
}

/// How [`KeyedLimiter`] identifies a client.
#[derive(Debug, Clone, Default)]
pub enum KeyExtractor {
    /// One key for everyone.
    #[default]
    Global,
    /// The value of a request header.
    Header(HeaderName),
    /// The peer IP address.
    RemoteAddr,
}

impl KeyExtractor {
    /// Key used when the extractor finds nothing.
    pub const FALLBACK: &'static str = "anonymous";

    fn extract(&self, ctx: &RequestContext, request: &Request) -> String {
        let key = match self {
            Self::Global => Some("global".to_string()),
            Self::Header(name) => request.header_str(name).map(str::to_string),
            Self::RemoteAddr => ctx.remote_addr().map(|addr| addr.ip().to_string()),
        };
        key.unwrap_or_else(|| Self::FALLBACK.to_string())
    }
}

/// Limits each client through its own bucket.
#[derive(Debug)]
pub struct KeyedLimiter {
    buckets: DashMap<String, Arc<TokenBucket>>,
    period: Duration,
    burst: u32,
    key: KeyExtractor,
    max_wait: Duration,
}

impl KeyedLimiter {
    /// Creates a limiter that gives each key `burst` tokens, refilled once
    /// per `period`.
    #[must_use]
    pub fn every(period: Duration, burst: u32, key: KeyExtractor) -> Self {
        Self {
            buckets: DashMap::new(),
            period,
            burst,
            key,
            max_wait: DEFAULT_MAX_WAIT,
        }
    }

    /// Sets the longest a request may wait for a token.
    #[must_use]
    pub const fn max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    /// Returns the number of tracked keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    /// Returns `true` if no key has been seen.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Drops buckets that have refilled completely.
    pub fn purge_idle(&self) -> usize {
        let before = self.buckets.len();
        let full = f64::from(self.burst);
        self.buckets.retain(|_, bucket| bucket.available() < full);
        before.saturating_sub(self.buckets.len())
    }

    fn bucket_for(&self, key: String) -> Arc<TokenBucket> {
        Arc::clone(
            self.buckets
                .entry(key)
                .or_insert_with(|| Arc::new(TokenBucket::every(self.period, self.burst)))
                .value(),
        )
    }
}

impl Middleware for KeyedLimiter {
    fn name(&self) -> &'static str {
        "keyed-limiter"
    }

    fn process<'a>(
        &'a self,
        ctx: RequestContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Reply> {
        Box::pin(async move {
            let bucket = self.bucket_for(self.key.extract(&ctx, &request));
            match take_token(&bucket, &ctx, self.max_wait).await {
                Ok(()) => next.run(ctx, request).await,
                Err(err) => err.into(),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::compose;
    use crate::middleware::{handler_fn, Handler};
    use bytes::Bytes;
    use http::StatusCode;

    fn request() -> Request {
        http::Request::builder()
            .uri("/api/test")
            .body(Bytes::new())
            .unwrap()
    }

    fn request_from(client: &str) -> Request {
        http::Request::builder()
            .uri("/api/test")
            .header("x-client-id", client)
            .body(Bytes::new())
            .unwrap()
    }

    fn limited(mw: Arc<dyn Middleware>) -> Arc<dyn Handler> {
        compose(
            vec![mw],
            handler_fn(|_ctx, _req| async { Reply::json_status(StatusCode::OK) }),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_then_reject_then_refill() {
        let handler = limited(Arc::new(Limiter::every(Duration::from_secs(2), 5)));

        let mut statuses = Vec::new();
        for _ in 0..6 {
            let reply = handler.call(RequestContext::new(), request()).await;
            statuses.push(reply.status());
        }
        assert_eq!(statuses[..5], [Some(StatusCode::OK); 5]);
        assert_eq!(statuses[5], Some(StatusCode::TOO_MANY_REQUESTS));

        tokio::time::advance(Duration::from_secs(2)).await;
        let reply = handler.call(RequestContext::new(), request()).await;
        assert_eq!(reply.status(), Some(StatusCode::OK));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejection_message() {
        let handler = limited(Arc::new(Limiter::every(Duration::from_secs(60), 1)));
        handler.call(RequestContext::new(), request()).await;

        let Reply::Error(err) = handler.call(RequestContext::new(), request()).await else {
            panic!("expected an error reply");
        };
        assert_eq!(err.message(), RATE_LIMIT_EXCEEDED);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_refilling_bucket_rejects_once_drained() {
        let never = CancellationToken::new();
        for rate in [0.0, -1.0, f64::NAN] {
            let bucket = TokenBucket::new(1, rate);
            assert_eq!(bucket.rate(), 0.0);
            assert!(bucket.acquire(Duration::from_secs(1), &never).await.is_ok());
            assert!(matches!(
                bucket.acquire(Duration::from_secs(1), &never).await,
                Err(LimitError::Exhausted(_))
            ));
        }

        let glacial = TokenBucket::every(Duration::from_secs(u64::MAX), 1);
        assert!(glacial.acquire(Duration::ZERO, &never).await.is_ok());
        assert!(matches!(
            glacial.acquire(Duration::from_secs(3600), &never).await,
            Err(LimitError::Exhausted(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_for_token_within_budget() {
        let bucket = TokenBucket::every(Duration::from_millis(500), 1);
        let cancel = CancellationToken::new();
        bucket.acquire(Duration::from_secs(1), &cancel).await.unwrap();

        let started = Instant::now();
        bucket.acquire(Duration::from_secs(1), &cancel).await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_narrows_budget() {
        let handler = limited(Arc::new(Limiter::every(Duration::from_millis(500), 1)));
        handler.call(RequestContext::new(), request()).await;

        // 500ms until the next token, but only 100ms left on the request.
        let ctx = RequestContext::new().with_timeout(Duration::from_millis(100));
        let reply = handler.call(ctx, request()).await;
        assert_eq!(reply.status(), Some(StatusCode::TOO_MANY_REQUESTS));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_returns_reservation() {
        let bucket = TokenBucket::every(Duration::from_millis(500), 1);
        let cancel = CancellationToken::new();
        bucket.acquire(Duration::from_secs(1), &cancel).await.unwrap();

        cancel.cancel();
        let err = bucket.acquire(Duration::from_secs(1), &cancel).await.unwrap_err();
        assert_eq!(err, LimitError::Cancelled);
        assert!(bucket.available().abs() < f64::EPSILON);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_acquire_never_oversells() {
        let bucket = Arc::new(TokenBucket::every(Duration::from_secs(60), 5));
        let mut tasks = Vec::new();
        for _ in 0..20 {
            let bucket = Arc::clone(&bucket);
            tasks.push(tokio::spawn(async move {
                bucket
                    .acquire(Duration::ZERO, &CancellationToken::new())
                    .await
                    .is_ok()
            }));
        }

        let mut granted = 0;
        for task in tasks {
            if task.await.unwrap() {
                granted += 1;
            }
        }
        assert_eq!(granted, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keyed_limiter_isolates_clients() {
        let limiter = Arc::new(KeyedLimiter::every(
            Duration::from_secs(60),
            1,
            KeyExtractor::Header(HeaderName::from_static("x-client-id")),
        ));
        let handler = limited(Arc::clone(&limiter) as Arc<dyn Middleware>);

        let first = handler.call(RequestContext::new(), request_from("a")).await;
        let second = handler.call(RequestContext::new(), request_from("a")).await;
        let other = handler.call(RequestContext::new(), request_from("b")).await;

        assert_eq!(first.status(), Some(StatusCode::OK));
        assert_eq!(second.status(), Some(StatusCode::TOO_MANY_REQUESTS));
        assert_eq!(other.status(), Some(StatusCode::OK));
        assert_eq!(limiter.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keyed_limiter_purges_refilled_buckets() {
        let limiter = KeyedLimiter::every(Duration::from_secs(1), 1, KeyExtractor::RemoteAddr);
        let ctx = RequestContext::new().with_remote_addr("10.0.0.1:4000".parse().unwrap());
        let bucket = limiter.bucket_for(KeyExtractor::RemoteAddr.extract(&ctx, &request()));
        bucket.acquire(Duration::ZERO, ctx.cancellation()).await.unwrap();

        assert_eq!(limiter.purge_idle(), 0);
        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(limiter.purge_idle(), 1);
        assert!(limiter.is_empty());
    }

    #[test]
    fn test_key_extraction_fallback() {
        let ctx = RequestContext::new();
        assert_eq!(KeyExtractor::Global.extract(&ctx, &request()), "global");
        assert_eq!(KeyExtractor::RemoteAddr.extract(&ctx, &request()), KeyExtractor::FALLBACK);
        assert_eq!(
            KeyExtractor::Header(HeaderName::from_static("x-client-id")).extract(&ctx, &request()),
            KeyExtractor::FALLBACK
        );
    }

    #[test]
    fn test_defaults() {
        let bucket = TokenBucket::default();
        assert_eq!(bucket.burst(), DEFAULT_BURST);
        assert!((bucket.rate() - 0.1).abs() < 1e-9);
    }
}
