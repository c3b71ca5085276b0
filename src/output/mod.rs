//! Output tree storage
//!
//! Collected artifacts end up as files in a directory tree addressed by
//! their logical paths.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │              Worker Threads (N)                     │
//! │  - Send artifacts via WriterHandle                  │
//! └─────────────────────┬───────────────────────────────┘
//!                       │ WriterMessage
//!                       ▼
//! ┌─────────────────────────────────────────────────────┐
//! │            ResultWriter Thread (1)                  │
//! │  - Normalizes logical paths                         │
//! │  - Creates parent directories                       │
//! │  - Writes each file once, never overwrites          │
//! └─────────────────────┬───────────────────────────────┘
//!                       │
//!                       ▼
//! ┌─────────────────────────────────────────────────────┐
//! │   <root>/<scope>/<node>/<artifact>.<ext>            │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod writer;

pub use writer::{
    destination, write_artifact, ResultWriter, WriterHandle, WriterMessage, WriterOptions,
    WriterStats, WriterSummary,
};
