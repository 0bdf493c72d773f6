//! Tether core: key-value stores, the session record, the event bus and the
//! runtime shims shared by the HTTP and session crates.

pub mod clock;
pub mod error;
pub mod events;
#[cfg(feature = "logging")]
pub mod logging;
pub mod rt;
pub mod session;
pub mod store;
pub mod types;

pub use clock::{Clock, SystemClock};
pub use error::{CoreError, CoreResult};
pub use events::{
    CountdownTick, EventBus, EventName, Notice, NoticeLevel, SessionEvent, SubscriptionId,
    Urgency,
};
pub use session::{SessionRecord, SessionStore};
pub use store::{KeyValueStore, KeyValueStoreExt, MemoryStore, StoreOp};
pub use types::{
    AuditLogEntry, BrowserInfo, DeviceSession, LifecycleState, LogoutReason, Role, SessionStatus,
};
