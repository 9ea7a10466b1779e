use std::net::{IpAddr, SocketAddr};
use std::num::NonZeroU32;

use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};

use crate::AppState;
use crate::error::AppError;
use crate::utils;

/// Per-client-IP limiters: a general bucket for the whole API plus
/// tighter buckets for the account endpoints.
pub struct RateLimiters {
    general: DefaultKeyedRateLimiter<IpAddr>,
    register: DefaultKeyedRateLimiter<IpAddr>,
    login: DefaultKeyedRateLimiter<IpAddr>,
}

impl RateLimiters {
    pub fn new(dev_mode: bool) -> RateLimiters {
        let per_second = if dev_mode { 20 } else { 10 };
        RateLimiters {
            general: RateLimiter::keyed(Quota::per_second(
                NonZeroU32::new(per_second).expect("nonzero quota"),
            )),
            register: RateLimiter::keyed(Quota::per_minute(
                NonZeroU32::new(5).expect("nonzero quota"),
            )),
            login: RateLimiter::keyed(Quota::per_minute(
                NonZeroU32::new(10).expect("nonzero quota"),
            )),
        }
    }

    pub fn check(&self, path: &str, ip: IpAddr) -> Result<(), AppError> {
        let limiter = if path.ends_with("/auth/register") {
            &self.register
        } else if path.ends_with("/auth/login") {
            &self.login
        } else {
            &self.general
        };
        limiter.check_key(&ip).map_err(|_| AppError::RateLimited)
    }
}

pub async fn limit(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Response {
    let ip = utils::client_ip(request.headers(), peer);
    match state.limiters.check(request.uri().path(), ip) {
        Ok(()) => next.run(request).await,
        Err(e) => e.into_response(),
    }
}
