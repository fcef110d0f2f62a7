//! Path matching (component A) and the route table built on top of it
//! (component B).

pub mod matcher;
pub mod router;

pub use matcher::{CompiledPattern, PatternError, Segment};
pub use router::{Resolution, Resolved, Route, Router, RouterDispatch, RouterError};
