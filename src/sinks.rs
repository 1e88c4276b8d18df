pub mod flat;
pub mod json;

use crate::error::Result;
use crate::metrics::{SystemInfo, SystemSnapshot};

pub use flat::FlatSink;
pub use json::{JsonLinesSink, write_snapshot_file};

/// Destination of the status feed.
///
/// Called from the sampling thread, so implementations must return promptly.
/// Errors are logged by the loop and never stop it.
pub trait Sink {
    /// Identity record, written once before the first snapshot
    fn emit_header(&mut self, info: &SystemInfo) -> Result<()>;

    fn emit(&mut self, snapshot: &SystemSnapshot, first_tick: bool) -> Result<()>;
}

impl<S: Sink + ?Sized> Sink for Box<S> {
    fn emit_header(&mut self, info: &SystemInfo) -> Result<()> {
        (**self).emit_header(info)
    }

    fn emit(&mut self, snapshot: &SystemSnapshot, first_tick: bool) -> Result<()> {
        (**self).emit(snapshot, first_tick)
    }
}
