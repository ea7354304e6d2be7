mod dot;
mod error;
mod lookup;
mod record;
mod resolve;
mod table;

pub use dot::{render_digraph, write_digraph};
pub use error::{Error, LogKind, ParseError, ParseReason, Result};
pub use lookup::{IntervalIndex, OwnerLookup};
pub use record::{decode_allocation, decode_scan, AllocationRecord, GraphEdge, HeapBounds, ScanEntry};
pub use resolve::{Edges, Resolver, ScanGraph};
pub use table::{AllocationTable, LoadStats};

/// What to do with a line that does not decode.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ParseMode {
    /// Abort on the first malformed line.
    #[default]
    Strict,
    /// Log the line and skip it.
    Lenient,
}

impl ParseMode {
    pub(crate) fn reject(self, err: ParseError) -> Result<()> {
        match self {
            ParseMode::Strict => Err(err.into()),
            ParseMode::Lenient => {
                log::warn!("skip {err}");
                Ok(())
            }
        }
    }
}
