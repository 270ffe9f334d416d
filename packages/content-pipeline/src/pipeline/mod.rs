//! Pipeline coordination - the core of the library.
//!
//! The coordinator drives each target through
//! `Queued → Extracting → Extracted → Generating → Generated → Exported`
//! with a bounded worker pool, per-stage retry budgets, cancellation with
//! a grace period, and a progress feed for the caller's UI layer.

pub mod coordinator;
pub mod progress;

pub use coordinator::Coordinator;
pub use progress::{ProgressEvent, ProgressReceiver};
