//! Hardware Abstraction Layer (HAL) for the codec board
//!
//! This crate provides the trait seams the audio decoder driver is written
//! against, so the driver can be developed and tested without the board.
//!
//! # Architecture Layers
//!
//! ```text
//! Audio framework (upper half)
//!         ↓
//! codec crate (VS1053 driver + feed engine)
//!         ↓
//! Platform HAL (this crate - trait abstractions)
//!         ↓
//! Board support (MMIO, pin mux, clock tree)
//! ```
//!
//! # Seams
//!
//! - [`peripheral::SharedSpiBus`] - lockable SPI bus with explicit chip selects
//! - [`gpio::ReadySignal`] - decoder data-request line and its edge interrupt
//! - [`board::RegisterInterface`] / [`board::BoardBringUp`] - board support
//! - [`retry::RetryPolicy`] - bounded waits on hardware
//!
//! # Features
//!
//! - `std`: Enable standard library support and host mocks
//! - `defmt`: Enable `defmt::Format` derives
//!
//! # Example
//!
//! ```no_run
//! use platform::{ReadySignal, RetryPolicy};
//! use embedded_hal_async::delay::DelayNs;
//!
//! async fn wait_ready<R: ReadySignal, D: DelayNs>(line: &mut R, delay: &mut D) -> bool {
//!     RetryPolicy::new(200, 1_000)
//!         .poll_until(delay, || line.is_ready())
//!         .await
//!         .is_ok()
//! }
//! ```

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
#![deny(unsafe_op_in_unsafe_fn)] // unsafe fn body is not implicitly unsafe block
#![warn(clippy::print_stdout)] // prefer tracing/defmt over println! in lib code
// Pedantic lints suppressed for this hardware HAL crate:
#![allow(clippy::doc_markdown)] // hex addresses and register names in doc comments
#![allow(clippy::must_use_candidate)] // hardware accessors, callers decide
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(async_fn_in_trait)] // Embassy no_std: single-threaded, Send bounds not needed

#[cfg(all(feature = "std", not(test)))]
extern crate std;

pub mod board;
pub mod gpio;
pub mod peripheral;
pub mod retry;

// Mocks for testing
pub mod mocks;

// Re-export commonly used types
pub use board::{BoardBringUp, ChipProfile, RegisterInterface};
pub use gpio::{InterruptMode, ReadySignal};
pub use peripheral::{ChipSelect, SharedSpiBus, SpiConfig};
pub use retry::{RetryBudget, RetryExhausted, RetryPolicy};
