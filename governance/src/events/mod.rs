//! Governance event delivery
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────────┐
//! │   Governor   │────▶│  Event Bus   │────▶│ Handlers (ordered)│
//! │  (publish)   │     │              │     └──────────────────┘
//! └──────────────┘     └──────┬───────┘
//!                             ▼
//!                      ┌──────────────┐
//!                      │  Subscribers │
//!                      │  (broadcast) │
//!                      └──────────────┘
//! ```

pub mod bus;
pub mod types;

pub use bus::{
    EventBus, EventBusError, EventBusResult, EventFilter, EventHandler, FilteredReceiver,
    PublishReport, SharedEventBus,
};
pub use types::GovernanceEvent;
