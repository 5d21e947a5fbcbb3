//! Epoch-batched software transactional memory over a shared memory
//! region.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────┐
//! │                       Region                        │
//! │     (facade: create, begin, start/size/align)        │
//! └───────────────────────┬──────────────────────────────┘
//!                         │
//! ┌───────────────────────▼──────────────────────────────┐
//! │                      Batcher                          │
//! │   (ticket-ordered entry/exit, single-committer epoch)  │
//! └───────────────────────┬──────────────────────────────┘
//!                         │
//! ┌───────────────────────▼──────────────────────────────┐
//! │                    Transaction                        │
//! │   (begin/end/read/write/alloc/free)                   │
//! └───────────┬────────────────────────────┬──────────────┘
//!             │                            │
//! ┌───────────▼───────────┐     ┌──────────▼──────────────┐
//! │        Segment         │     │       ControlWord        │
//! │ (data/shadow/control)  │     │   (per-word lock tag)    │
//! └─────────────────────────┘     └───────────────────────────┘
//! ```
//!
//! ## Key invariants
//!
//! - Every transaction admitted into the same epoch observes the same
//!   `data` snapshot; writes become visible only when the epoch
//!   commits.
//! - Reads and writes never block on a mutex beyond a brief arena
//!   lookup — word-level conflict resolution is lock-free, CAS-based.
//! - A conflicting read, write, or free immediately self-aborts the
//!   transaction, undoing every lock and read mark it had acquired.
//!
//! ## Example
//!
//! ```
//! use stm_core::{Region, StmConfig};
//!
//! let region = Region::create(16, 8, StmConfig::default()).unwrap();
//! let start = region.start_address();
//!
//! let writer = region.begin(false);
//! assert!(writer.write(&[0xAA; 8], start));
//! assert!(writer.end());
//!
//! let reader = region.begin(true);
//! let mut buf = [0u8; 8];
//! assert!(reader.read(start, &mut buf));
//! assert_eq!(buf, [0xAA; 8]);
//! assert!(reader.end());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod batcher;
mod config;
mod control;
mod error;
mod region;
mod segment;
mod transaction;
mod types;

pub use config::StmConfig;
pub use error::{StmError, StmResult};
pub use region::Region;
pub use transaction::{AllocOutcome, Transaction};
pub use types::{Address, SegmentId, TransactionId};
