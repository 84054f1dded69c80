//! VS1053 audio decoder driver
//!
//! Register access, clocking, reset and device detection for the VLSI
//! VS1053 plus the streaming feed engine that moves encoded audio from an
//! application-facing queue into the decoder's FIFO.
//!
//! # Architecture
//!
//! ```text
//!   producer task                 DREQ edge (interrupt)
//!        │ enqueue                      │ on_ready_edge
//!        ▼                              ▼
//!   ┌─────────────┐  Enqueue   ┌────────────────┐
//!   │ BufferQueue │──────────▶ │  worker inbox  │◀── Stop/Pause/Resume
//!   └─────┬───────┘            └───────┬────────┘        (FeedControl)
//!         │ dequeue                    │ receive
//!         ▼                            ▼
//!   ┌──────────────────────────────────────────┐
//!   │ FeedEngine::run  (owns FeedState)        │
//!   │   pump(): 32-byte blocks while DREQ high │
//!   │   drain: fill bytes → SM_CANCEL → reset  │
//!   └───────────────────┬──────────────────────┘
//!                       │ locked shared SPI bus
//!                       ▼
//!                    VS1053
//! ```
//!
//! The interrupt relay only posts messages; the worker is the single owner
//! of the bus while it pumps and the only writer of [`stream::FeedState`].
//!
//! # Features
//!
//! - `std`: `std::error::Error` impls
//! - `defmt`: defmt logging and `Format` derives (hardware builds)
//! - `tracing`: tracing logging (host builds)

// ── Lint policy ─────────────────────────────────────────────────────────────
#![deny(clippy::unwrap_used)] // no .unwrap() in production code
#![deny(clippy::expect_used)] // no .expect() in production code
#![deny(clippy::panic)] // no panic!() in production code
#![deny(clippy::unreachable)] // no unreachable!() that isn't documented
#![deny(unused_must_use)]
// all Results must be handled
// ────────────────────────────────────────────────────────────────────────────
#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::doc_markdown)] // register names in doc comments
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::similar_names)] // hdat0/hdat1, left/right shadows
#![allow(async_fn_in_trait)] // Embassy no_std: single-threaded, Send bounds not needed

extern crate alloc;

#[cfg(all(feature = "std", not(test)))]
extern crate std;

// Must come first: the logging macros are textually scoped.
#[macro_use]
mod fmt;

pub mod config;
pub mod error;
pub mod mock;
pub mod stream;
pub mod vs1053;

pub use config::CodecConfig;
pub use error::CodecError;
pub use stream::{AudioBuffer, AudioCallback, BufferId, FeedControl, FeedShared, FeedState};
pub use vs1053::{FeatureRequest, IoctlRequest, IoctlResponse, Vs1053};
