//! Fixed-window request limiting keyed by an arbitrary token (usually the
//! client IP).
//!
//! The limiter is an explicit service object: build one at startup, keep it
//! in router state, and call [`RateLimiter::reset`] between tests.

use crate::error::AppError;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use dashmap::DashMap;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Window length; a token's counter is forgotten this long after its first hit.
    pub interval: Duration,
    /// Maximum number of distinct tokens tracked at once.
    pub capacity: usize,
    /// Requests per window used by the middleware.
    pub limit: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            capacity: 500,
            limit: 10,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct TokenWindow {
    count: u32,
    started: Instant,
}

/// Rejection carrying how long until the caller's window expires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimited {
    pub retry_after: Duration,
}

#[derive(Clone)]
pub struct RateLimiter {
    config: RateLimitConfig,
    tokens: Arc<DashMap<String, TokenWindow>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            tokens: Arc::new(DashMap::new()),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Record a hit for `token`. The hit that brings the window's count to
    /// `limit` is rejected, as is every later hit in the same window.
    pub fn check(&self, limit: u32, token: &str) -> Result<(), RateLimited> {
        let now = Instant::now();
        let interval = self.config.interval;

        if !self.tokens.contains_key(token) && self.tokens.len() >= self.config.capacity {
            self.purge_expired(now);
            if self.tokens.len() >= self.config.capacity {
                tracing::warn!(
                    capacity = self.config.capacity,
                    "Rate limiter token table full"
                );
                return Err(RateLimited {
                    retry_after: interval,
                });
            }
        }

        let mut window = self
            .tokens
            .entry(token.to_string())
            .or_insert(TokenWindow {
                count: 0,
                started: now,
            });

        if now.duration_since(window.started) >= interval {
            window.count = 0;
            window.started = now;
        }
        window.count += 1;

        if window.count >= limit {
            let elapsed = now.duration_since(window.started);
            Err(RateLimited {
                retry_after: interval.saturating_sub(elapsed),
            })
        } else {
            Ok(())
        }
    }

    /// Forget every tracked token.
    pub fn reset(&self) {
        self.tokens.clear();
    }

    pub fn tracked_tokens(&self) -> usize {
        self.tokens.len()
    }

    fn purge_expired(&self, now: Instant) {
        let interval = self.config.interval;
        self.tokens
            .retain(|_, window| now.duration_since(window.started) < interval);
    }
}

fn client_ip(request: &Request) -> Option<std::net::IpAddr> {
    let forwarded_ip = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .and_then(|s| s.trim().parse::<std::net::IpAddr>().ok());

    forwarded_ip.or_else(|| {
        request
            .extensions()
            .get::<axum::extract::ConnectInfo<SocketAddr>>()
            .map(|axum::extract::ConnectInfo(addr)| addr.ip())
    })
}

/// Middleware limiting requests per client IP using the limiter's configured limit.
pub async fn rate_limit_middleware(
    State(limiter): State<RateLimiter>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let Some(ip) = client_ip(&request) else {
        tracing::warn!("Could not determine IP for rate limiting");
        return Ok(next.run(request).await);
    };

    match limiter.check(limiter.config().limit, &ip.to_string()) {
        Ok(()) => Ok(next.run(request).await),
        Err(limited) => {
            tracing::warn!(client_ip = %ip, "Request rate limited");
            Err(AppError::TooManyRequests(
                "Too many requests. Please try again later.".to_string(),
                Some(limited.retry_after.as_secs().max(1)),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(interval_secs: u64, capacity: usize) -> RateLimiter {
        RateLimiter::new(RateLimitConfig {
            interval: Duration::from_secs(interval_secs),
            capacity,
            limit: 3,
        })
    }

    #[tokio::test]
    async fn rejects_once_count_reaches_limit() {
        let limiter = limiter(60, 10);
        assert!(limiter.check(3, "1.2.3.4").is_ok());
        assert!(limiter.check(3, "1.2.3.4").is_ok());
        assert!(limiter.check(3, "1.2.3.4").is_err());
        assert!(limiter.check(3, "5.6.7.8").is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn window_expires_after_interval() {
        let limiter = limiter(60, 10);
        limiter.check(2, "token").unwrap();
        assert!(limiter.check(2, "token").is_err());

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(limiter.check(2, "token").is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn full_table_purges_expired_tokens() {
        let limiter = limiter(60, 2);
        limiter.check(5, "a").unwrap();
        limiter.check(5, "b").unwrap();
        assert!(limiter.check(5, "c").is_err());

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(limiter.check(5, "c").is_ok());
        assert_eq!(limiter.tracked_tokens(), 1);
    }

    #[tokio::test]
    async fn reset_clears_all_tokens() {
        let limiter = limiter(60, 10);
        limiter.check(2, "token").unwrap();
        assert!(limiter.check(2, "token").is_err());

        limiter.reset();
        assert_eq!(limiter.tracked_tokens(), 0);
        assert!(limiter.check(2, "token").is_ok());
    }
}
