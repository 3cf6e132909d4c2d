//! ShadowState: the authoritative in-memory position book (§4.4),
//! journaled to a write-ahead log so a crash loses nothing already
//! durably committed.
//!
//! - Fill-driven, weighted-average accounting is the source of truth.
//! - Realized vs unrealized PnL, computed uniformly for long and short.
//! - Every mutation is journaled through [`wal`] before it is considered
//!   committed; recovery replays the log back into a fresh `ShadowState`.
//! - Pure deterministic logic in [`position`]; IO lives only in [`wal`].

mod position;
mod state;
mod wal;

pub use position::{apply_delta, apply_fill, mark_to_market};
pub use state::ShadowState;
pub use wal::{replay_dir, WalWriter, SEGMENT_SIZE_LIMIT_BYTES};
