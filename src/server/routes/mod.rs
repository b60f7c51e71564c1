//! API Routes

pub mod health;
pub mod stats;
pub mod synthesis;
