//! Rate-limited HTTP session shared by every network consumer.
//!
//! One [`Client`] serves the gateway, the media server and the CDN, so
//! they all present the same cookies and user agent. API-shaped calls go
//! through [`execute`](Client::execute), which throttles them to Deezer's
//! published quota of 50 calls per 5 seconds; the one long CDN transfer
//! per track bypasses the limiter through [`unlimited`](Client::unlimited).

use std::{future::Future, num::NonZeroU32, sync::Arc, time::Duration};

use futures_util::{FutureExt, TryFutureExt};
use governor::{DefaultDirectRateLimiter, Quota};
use reqwest::{
    self,
    cookie::Jar,
    header::{HeaderValue, ACCEPT_LANGUAGE},
    Body, Method, Url,
};

use crate::{config::Config, error::Result};

/// HTTP session with API rate limiting.
pub struct Client {
    /// The underlying client, without rate limiting.
    ///
    /// For the audio stream itself: one request that runs for the whole
    /// download and must not count against the API quota.
    pub unlimited: reqwest::Client,

    /// Throttle for API-shaped calls.
    rate_limiter: DefaultDirectRateLimiter,
}

impl Client {
    /// Rolling window over which Deezer counts API calls.
    const RATE_LIMIT_INTERVAL: Duration = Duration::from_secs(5);

    /// Calls allowed within one window.
    const RATE_LIMIT_CALLS_PER_INTERVAL: u8 = 50;

    /// How long idle connections are kept open between requests.
    const KEEPALIVE_TIMEOUT: Duration = Duration::from_secs(60);

    /// Bound on establishing a connection.
    ///
    /// An unreachable host surfaces as a transport failure for the
    /// current track instead of hanging the run.
    const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

    /// Bound on individual network reads, so a stalled transfer fails
    /// the track rather than blocking forever.
    const READ_TIMEOUT: Duration = Duration::from_secs(5);

    /// Creates the session client with the given cookie jar.
    ///
    /// The jar carries the `arl` session cookie; every request through
    /// this client, rate limited or not, presents it.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    ///
    /// # Panics
    ///
    /// Panics if the rate limit constants are zero.
    pub fn new(config: &Config, cookie_jar: Jar) -> Result<Self> {
        // Not having `Accept-Language` set is non-fatal.
        let mut headers = reqwest::header::HeaderMap::new();
        if let Ok(lang) = HeaderValue::from_str(&config.app_lang) {
            headers.insert(ACCEPT_LANGUAGE, lang);
        }

        let inner = reqwest::Client::builder()
            .tcp_keepalive(Self::KEEPALIVE_TIMEOUT)
            .connect_timeout(Self::CONNECT_TIMEOUT)
            .read_timeout(Self::READ_TIMEOUT)
            .default_headers(headers)
            .user_agent(&config.user_agent)
            .cookie_provider(Arc::new(cookie_jar))
            .build()?;

        // Keep within Deezer's quota: replenish one call's worth of
        // capacity at a time, with bursts up to the full window.
        let replenish_interval =
            Self::RATE_LIMIT_INTERVAL / u32::from(Self::RATE_LIMIT_CALLS_PER_INTERVAL);
        let quota = Quota::with_period(replenish_interval)
            .expect("quota time interval is zero")
            .allow_burst(
                NonZeroU32::new(Self::RATE_LIMIT_CALLS_PER_INTERVAL.into())
                    .expect("calls per interval is zero"),
            );

        Ok(Self {
            unlimited: inner,
            rate_limiter: governor::RateLimiter::direct(quota),
        })
    }

    /// Builds a request with the given method, URL and body.
    pub fn request<U, T>(&self, method: Method, url: U, body: T) -> reqwest::Request
    where
        U: Into<Url>,
        T: Into<Body>,
    {
        let mut request = reqwest::Request::new(method, url.into());
        *request.body_mut() = Some(body.into());
        request
    }

    /// Builds a POST request.
    pub fn post<U, T>(&self, url: U, body: T) -> reqwest::Request
    where
        U: Into<Url>,
        T: Into<Body>,
    {
        self.request(Method::POST, url, body)
    }

    /// Builds a GET request.
    pub fn get<U, T>(&self, url: U, body: T) -> reqwest::Request
    where
        U: Into<Url>,
        T: Into<Body>,
    {
        self.request(Method::GET, url, body)
    }

    /// Executes a request once the rate limiter permits it.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails to send.
    pub fn execute(
        &self,
        request: reqwest::Request,
    ) -> impl Future<Output = Result<reqwest::Response>> + '_ {
        // No jitter needed at this level of concurrency.
        let throttle = self.rate_limiter.until_ready();
        throttle.then(|()| self.unlimited.execute(request).map_err(Into::into))
    }
}
