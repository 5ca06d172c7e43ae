//! Resource store: cached state per resource key.
//!
//! Each key holds its last known value, a loading flag and the last error.
//! Values survive refresh starts and failures (stale-while-revalidate), and
//! every fetch carries a per-key sequence number so a slow, older response
//! can never overwrite a newer one.
//!
//! Keys whose last listener left are kept in a bounded idle set; when that
//! set overflows, the least recently idled key's state is dropped.

mod retention;
mod slots;

pub use slots::{ResourceStore, StoreStats};
