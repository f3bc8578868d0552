//! Trading core - decision logic from bars to bracket orders
//!
//! This module contains the strategy components:
//! - Indicator computation (ATR, average volume, doji detection)
//! - Entry filters and weighted signal scoring
//! - Daily-limit and exposure risk checks
//! - Position sizing under the layered caps
//! - Exit target computation
//! - Order execution state machine
//! - Per-cycle coordination for the trader thread

pub mod coordinator;
pub mod executor;
pub mod exits;
pub mod indicators;
pub mod risk;
pub mod signals;
pub mod sizing;
