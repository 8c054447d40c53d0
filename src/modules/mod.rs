//! Bundled physics module content.
//!
//! Real deployments register their own functors and backend functions;
//! the [`example`] module ships a small but complete suite exercising
//! every declaration feature, and backs the demo scan driver.

pub mod example;
