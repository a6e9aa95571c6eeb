//! focusguard - keep the browser's blocking rules in step with a focus session
//!
//! "Protect the sacred space of deep work."
//!
//! An external focus app reports `{focusing, blocked_sites}` over HTTP. This
//! crate polls that report and converges the browser to it:
//! - Normalizes site entries into canonical hostnames
//! - Installs one redirect rule per blocked domain while focusing
//! - Sweeps already-open tabs when a session starts
//! - Intercepts navigations to blocked domains and their subdomains
//! - Falls back to an unblocked state when the focus app stays unreachable
//!
//! The browser is reached through the [`RuleEngine`] and [`TabHost`] traits;
//! [`native::NativeHost`] speaks the browser native messaging protocol and
//! [`MemoryBrowser`] keeps everything in process.

pub mod daemon;
pub mod error;
pub mod host;
pub mod intercept;
pub mod memory;
pub mod native;
pub mod normalize;
pub mod rules;
pub mod state;
pub mod status;
pub mod sync;

pub use daemon::SyncLoop;
pub use error::SyncError;
pub use host::{BrowserHost, NavigationEvent, NavigationKind, Tab, TabHost, TabId};
pub use intercept::{host_matches, Interceptor};
pub use memory::MemoryBrowser;
pub use normalize::{normalize, normalize_all};
pub use rules::{BlockRule, RuleEngine, RuleInstaller};
pub use state::{SessionState, Snapshot};
pub use status::{HttpStatusSource, StatusError, StatusReport, StatusSource};
pub use sync::{Outcome, RuleChange, Synchronizer};
