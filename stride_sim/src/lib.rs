//! Stride Deterministic Simulation Harness
//!
//! This crate drives the tracking core through scripted runs where every
//! source of non-determinism is controlled:
//! - **Time**: Virtual clock advanced by the harness, stamped onto every fix
//! - **Motion**: A ground truth runner behind noisy device fixes
//! - **Randomness**: All entropy derived from a single 64-bit seed
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         SimWorld                            │
//! │  ┌──────────────────────────────────────────────────────┐   │
//! │  │ SimContext (Virtual Clock + Seed)                    │   │
//! │  └──────────────────────────────────────────────────────┘   │
//! │                                                             │
//! │  ┌─────────────┐   DeviceFeed   ┌──────────────────┐        │
//! │  │ DeviceTrace │───────────────►│                  │        │
//! │  │ (truth +    │                │ PositionTracker  │        │
//! │  │  noise)     │  sim sink      │                  │        │
//! │  └─────────────┘  ┌────────────►│                  │        │
//! │  ┌─────────────┐  │             └──────────────────┘        │
//! │  │GeoSimulator │──┘                                         │
//! │  └─────────────┘                                            │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use stride_sim::{ScenarioRunner, ScenarioId};
//!
//! let result = ScenarioRunner::new(42).with_duration(300.0).run(ScenarioId::Handover);
//! assert!(result.passed);
//! ```

mod context;
mod error;
mod exporter;
mod runner;
pub mod scenarios;
mod simulator;
mod trace;
mod world;

pub use context::SimContext;
pub use error::{SimError, SimResult};
pub use exporter::SessionExport;
pub use runner::{ScenarioResult, ScenarioRunner};
pub use scenarios::ScenarioId;
pub use simulator::{GeoSimulator, SimulatorConfig};
pub use trace::{DeviceTrace, FixKind, TraceConfig, TraceFix};
pub use world::{SimConfig, SimWorld};
