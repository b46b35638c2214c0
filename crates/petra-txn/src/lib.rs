//! Transaction context and concurrency-control bookkeeping for Petra.
//!
//! This crate is the kernel every commit protocol consults: the
//! per-transaction record of slots read and written, the identifier
//! algebra tying snapshots to epochs, and the garbage and trigger
//! payloads a finished transaction leaves behind.

pub mod context;
pub mod gc;
pub mod lifecycle;
pub mod rw_set;
pub mod trigger;

pub use context::TransactionContext;
pub use gc::{GarbageQueue, GcObjectSet, GcSet, GcVersionKind, RetiredGarbage, SchemaObjectRef};
pub use lifecycle::{CommitOutcome, TransactionManager, TransactionManagerConfig, TxnError};
pub use rw_set::{AccessMode, ReadWriteSet, RecordOp};
pub use trigger::{TriggerData, TriggerError, TriggerEvent, TriggerSet};
