//! Pure domain logic for the AIME model API client.
//!
//! Nothing in this crate performs network I/O. It builds wire requests,
//! interprets wire responses, transcodes payloads, and tracks the job
//! lifecycle. The drivers in `aime-client` feed it responses and perform
//! the actual transport calls, sleeps, and callback invocations.

pub mod callback;
pub mod classifier;
pub mod codec;
pub mod error;
pub mod lifecycle;
pub mod payload;
pub mod progress;
pub mod protocol;
pub mod submission;
