//! Vigil Simulation Library
//!
//! This crate provides a simulated detection feed for exercising the telemetry
//! core without a live reliability service. It includes:
//!
//! - **SimulatedAgent**: produces detection events for one source with a
//!   configurable flag probability and latency range
//! - **FeedServer**: a local WebSocket endpoint that broadcasts frames to
//!   every connected client
//!
//! # Example
//!
//! ```rust
//! use chrono::Utc;
//! use vigil_sim::{SimulatedAgent, SimulatedAgentConfig};
//!
//! let mut agent = SimulatedAgent::new(SimulatedAgentConfig {
//!     seed: Some(42),
//!     ..SimulatedAgentConfig::named("hr_bot")
//! })
//! .unwrap();
//!
//! let event = agent.next_event(Utc::now());
//! assert_eq!(event.source_id.as_str(), "hr_bot");
//! ```

pub mod agent;
pub mod error;
pub mod server;

pub use agent::{default_fleet, SimulatedAgent, SimulatedAgentConfig};
pub use error::SimError;
pub use server::{FeedServer, FeedServerConfig, HEARTBEAT_FRAME, MALFORMED_FRAME};
