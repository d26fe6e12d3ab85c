//! Tolerance-based alignment of LC-MS features across samples, with derived
//! per-row statistics and filtered, deterministic export of the aligned table.

pub mod config;
pub mod data;
pub mod error;
pub mod export;
pub mod state;
