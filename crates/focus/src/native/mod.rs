//! Browser native messaging adapter
//!
//! The browser launches `focusguard run` as a native messaging host and the
//! extension relays rule engine and tab calls over stdio.

pub mod codec;
mod host;

pub use host::NativeHost;
