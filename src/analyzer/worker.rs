//! The generic diff-worker loop shared by the leak and dependency stages.

use std::sync::Arc;

use crossbeam_channel::{select, Receiver};

use crate::model::Diff;

/// Per-diff analysis logic plugged into [`run_diff_worker`].
pub(crate) trait DiffAnalyzer {
    fn analyze(&mut self, diff: &Arc<Diff>);
}

/// Drain `rx`, handing each diff to `analyzer`, until shutdown or channel
/// close.
pub(crate) fn run_diff_worker<A: DiffAnalyzer>(
    rx: &Receiver<Arc<Diff>>,
    dying: &Receiver<()>,
    mut analyzer: A,
) {
    loop {
        select! {
            recv(dying) -> _ => return,
            recv(rx) -> diff => match diff {
                Ok(diff) => analyzer.analyze(&diff),
                Err(_) => return,
            },
        }
    }
}
