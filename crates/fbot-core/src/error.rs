//! Typed error definitions for the execution engine.
//!
//! The taxonomy follows how a failure should be handled rather than where it
//! came from:
//!
//! - [`ValidationError`]: bad user input, caught before any network call.
//! - [`PrecisionError`]: input that cannot satisfy a symbol's trading rules.
//! - [`ExchangeError`]: a transport or exchange failure, carrying enough
//!   detail for [`ExchangeError::class`] to pick a retry policy.
//! - [`BotError`]: what the engine facade returns to its callers.
//!
//! All variants implement `std::error::Error` via `thiserror`, so they
//! integrate with `anyhow::Result` at the binary edge.

use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

/// Binance code for "too many requests".
pub const CODE_TOO_MANY_REQUESTS: i64 = -1003;
/// Binance code for "too many new orders".
pub const CODE_TOO_MANY_ORDERS: i64 = -1015;
/// Binance code for "timestamp outside of recvWindow".
pub const CODE_INVALID_TIMESTAMP: i64 = -1021;
/// Binance code for "ClientOrderId is duplicated".
pub const CODE_DUPLICATE_CLIENT_ID: i64 = -4116;

// ---------------------------------------------------------------------------
// Exchange errors
// ---------------------------------------------------------------------------

/// How the gateway should react to a failed exchange call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Network failure or HTTP 5xx: retry a bounded number of times.
    Retryable,
    /// Rate limited: retry with exponential backoff.
    RetryableWithBackoff,
    /// Request timestamp rejected: re-sync the clock, then retry once.
    TimestampSkew,
    /// Business rejection: surface immediately.
    Fatal,
}

/// A failed call to the exchange transport.
#[derive(Debug, Clone, Error)]
pub enum ExchangeError {
    /// Connection, TLS, or timeout failure before a response was received.
    #[error("transport error: {0}")]
    Transport(String),

    /// Non-success HTTP response, with Binance's `{code,msg}` body when present.
    #[error("http {status}{}: {message}", .code.map(|c| format!(" (code {c})")).unwrap_or_default())]
    Http {
        status: u16,
        code: Option<i64>,
        message: String,
    },

    /// A success response whose body could not be understood.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl ExchangeError {
    /// Classify this error for the retry policy.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Transport(_) => ErrorClass::Retryable,
            Self::InvalidResponse(_) => ErrorClass::Fatal,
            Self::Http { status, code, .. } => match (status, code) {
                (_, Some(CODE_INVALID_TIMESTAMP)) => ErrorClass::TimestampSkew,
                (_, Some(CODE_TOO_MANY_REQUESTS | CODE_TOO_MANY_ORDERS)) => ErrorClass::RetryableWithBackoff,
                (429 | 418, _) => ErrorClass::RetryableWithBackoff,
                (500..=599, _) => ErrorClass::Retryable,
                _ => ErrorClass::Fatal,
            },
        }
    }

    /// Exchange error code, if the exchange returned one.
    pub fn code(&self) -> Option<i64> {
        match self {
            Self::Http { code, .. } => *code,
            _ => None,
        }
    }
}

/// An exchange call that the gateway gave up on.
#[derive(Debug, Clone, Error)]
#[error("{op} failed after {attempts} attempt(s): {source}")]
pub struct GatewayError {
    /// Gateway operation name (e.g. `"submit"`).
    pub op: &'static str,
    /// Number of calls made to the transport.
    pub attempts: u32,
    /// The last error was retryable but the retry budget ran out.
    pub exhausted: bool,
    /// Last error reported by the transport.
    pub source: ExchangeError,
}

// ---------------------------------------------------------------------------
// Precision / validation errors
// ---------------------------------------------------------------------------

/// Input that cannot be made to satisfy a symbol's trading rules.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PrecisionError {
    #[error("invalid symbol {symbol}: {reason}")]
    InvalidSymbol { symbol: String, reason: String },

    #[error("notional {notional} below minimum {min_notional}")]
    BelowMinNotional { notional: Decimal, min_notional: Decimal },

    #[error("quantity {quantity} outside [{min_qty}, {max_qty}]")]
    QuantityOutOfRange {
        quantity: Decimal,
        min_qty: Decimal,
        max_qty: Decimal,
    },

    #[error("price {0} is not positive after rounding")]
    InvalidPrice(Decimal),
}

/// Bad user input, detected before any network call.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("invalid price range: lower {lower} must be below upper {upper}")]
    InvalidRange { lower: Decimal, upper: Decimal },

    #[error("grid needs at least 2 levels, got {0}")]
    TooFewGridLevels(u32),

    #[error("grid levels collapse onto the same tick between {lower} and {upper}")]
    GridTooDense { lower: Decimal, upper: Decimal },

    #[error("twap needs at least 1 slice")]
    NoSlices,

    #[error("{field} must be positive, got {value}")]
    NonPositive { field: &'static str, value: Decimal },

    #[error("{0} order requires a limit price")]
    MissingPrice(&'static str),

    #[error("stop-limit order requires a stop price")]
    MissingStopPrice,

    #[error("{requested} child orders requested, at most {max} allowed")]
    TooManyOrders { requested: u32, max: u32 },
}

// ---------------------------------------------------------------------------
// Facade error
// ---------------------------------------------------------------------------

/// Errors returned by the engine facade.
#[derive(Debug, Clone, Error)]
pub enum BotError {
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("precision error: {0}")]
    Precision(#[from] PrecisionError),

    /// Retryable failure whose retry budget ran out.
    #[error("transient exchange error: {0}")]
    TransientExchange(GatewayError),

    /// Business rejection from the exchange.
    #[error("fatal exchange error: {0}")]
    FatalExchange(GatewayError),

    #[error("unknown run {0}")]
    UnknownRun(Uuid),

    #[error("run {0} has already been executed")]
    RunAlreadyStarted(Uuid),
}

impl From<GatewayError> for BotError {
    fn from(err: GatewayError) -> Self {
        if err.exhausted {
            Self::TransientExchange(err)
        } else {
            Self::FatalExchange(err)
        }
    }
}

/// Configuration parsing or validation error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config error: {0}")]
    Invalid(String),

    #[error("missing credential: {0}")]
    MissingCredential(&'static str),
}
