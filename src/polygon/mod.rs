//! Polygon provider: crypto aggregate bars.

pub mod client;
pub mod models;

pub use client::PolygonClient;
