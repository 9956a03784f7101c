//! Interactive drawing tools for chart annotations.
//!
//! Tools are a closed set ([`ToolKind`]) whose anchor count, restart
//! behavior and geometry live in a static behavior table. The
//! [`DrawingManager`] owns the current mode and every placed annotation;
//! it reads bars for snapping but never mutates them.

pub mod hit;
mod snap;
mod state;
mod types;

pub use snap::{find_snap_point, SnapSettings};
pub use state::{ClickOutcome, DrawContext, DrawingManager, Mode};
pub use types::{Annotation, AnnotationId, BuildError, ChartPoint, Segment, ToolBehavior, ToolKind};
