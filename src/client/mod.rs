//! Sort API Client
//!
//! Typed wrapper over the HTTP API, used by the CLI subcommands and by end-to-end tests.
//! Idempotent requests are retried with jittered exponential backoff on transport errors;
//! POSTs are sent once. HTTP error statuses are returned as errors carrying the server's
//! message.

pub mod client;
