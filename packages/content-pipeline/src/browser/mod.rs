//! Browser session management.
//!
//! A bounded pool of driver-controlled browser sessions. The pool owns
//! every session; workers borrow one at a time through [`SessionPool::acquire`]
//! and the pool transparently replaces crashed sessions.

pub mod cdp;
pub mod pool;
pub mod session;

pub use cdp::{CdpDriver, CdpSession};
pub use pool::{PooledSession, SessionPool};
pub use session::{Driver, Session, WaitCondition};
