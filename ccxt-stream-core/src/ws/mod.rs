//! WebSocket transport: connections, the pool, and the adapter contract.
//!
//! ```text
//! adapter ──watch──▶ ConnectionPool::get(url) ──▶ Connection::subscribe
//!                                                   │ records request
//!                                                   │ registers waiter
//!                                                   ▼ sends frame
//! socket ──frame──▶ receive loop ──▶ adapter handler (updates StreamStore)
//!                                        │
//!                                        ▼
//!                        FutureRegistry::resolve / reject ──▶ waiter wakes
//! ```

mod adapter;
mod connection;
mod dispatch;
mod event;
mod heartbeat;
mod pool;
mod state;
mod store;
mod subscription;

pub use adapter::{ErrorScope, ExchangeAdapter, FrameError, FrameHandler, HandlerMap, StreamKind};
pub use connection::{Connection, Subscribe};
pub use dispatch::{DispatchContext, StreamUpdate};
pub use event::{ConnectionEvent, ConnectionEventCallback};
pub use pool::ConnectionPool;
pub use state::{ConnectionState, WsStats, WsStatsSnapshot};
pub use store::StreamStore;
pub use subscription::{SubscriptionManager, SubscriptionRecord};

use std::sync::{Mutex, MutexGuard, PoisonError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
