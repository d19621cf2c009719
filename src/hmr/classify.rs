use std::path::PathBuf;
use std::sync::Arc;

use crate::plugin::HmrInstance;

/// Result of offering a batch to the HMR instances.
pub(super) enum Classification {
    /// Instance index → the files it claimed, in instance order.
    Accepted(Vec<(usize, Vec<PathBuf>)>),
    /// The first path nobody accepted.
    Rebuild(PathBuf),
}

/// Offer each path to every instance in order; the first that accepts claims
/// it. Stops at the first unclaimed path.
pub(super) fn classify(paths: Vec<PathBuf>, instances: &[Arc<dyn HmrInstance>]) -> Classification {
    let mut claimed: Vec<Vec<PathBuf>> = vec![Vec::new(); instances.len()];
    for path in paths {
        match instances.iter().position(|i| i.accept(&path)) {
            Some(index) => claimed[index].push(path),
            None => return Classification::Rebuild(path),
        }
    }
    Classification::Accepted(
        claimed
            .into_iter()
            .enumerate()
            .filter(|(_, files)| !files.is_empty())
            .collect(),
    )
}
