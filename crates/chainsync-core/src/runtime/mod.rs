//! Effect executor and DAG wiring.
//!
//! ```text
//! IndexerGraph::start()
//!     └── one control loop per node
//!           inbox ──► reduce ──► effects
//!             ▲                    ├── Update / Invalidate / Tick  (spawned, result → inbox)
//!             │                    ├── SetSafeHeight  (persist, then ParentUpdated → children)
//!             │                    ├── NotifyReady    (ChildReady → parents)
//!             └────────────────────└── ScheduleRetry* (sleep, then Retry* → inbox)
//! ```

mod graph;
mod handle;
mod node;

pub use graph::{IndexerGraph, NodeId};
pub use handle::{GraphHandle, IndexerHandle};
