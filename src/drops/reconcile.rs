use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use super::model::AudioDrop;

/// How a remote drop is treated when its id already exists locally
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergePolicy {
    /// The remote copy always replaces the local one
    #[default]
    RemoteWins,
    /// The remote copy replaces the local one only if it is not older
    NewestWins,
}

/// Result of reconciling a local and a remote collection
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    /// Deduplicated drops, ascending by `created_at` then `id`
    pub drops: Vec<AudioDrop>,
    /// Whether `drops` differs from the local collection that went in
    pub changed: bool,
}

/// Merge `remote` into `local` keyed by drop id.
///
/// Local drops are inserted first, then remote drops; on an id collision the
/// `policy` decides which copy survives. The merged view is sorted by
/// creation time with the id as tie-breaker, so the output is deterministic
/// for a given input regardless of input order.
pub fn merge_remote_drops(
    local: &[AudioDrop],
    remote: &[AudioDrop],
    policy: MergePolicy,
) -> MergeOutcome {
    let mut by_id: HashMap<Uuid, AudioDrop> = HashMap::with_capacity(local.len() + remote.len());

    for drop in local {
        by_id.insert(drop.id, drop.clone());
    }

    for drop in remote {
        let keep_local = policy == MergePolicy::NewestWins
            && by_id
                .get(&drop.id)
                .is_some_and(|existing| drop.created_at < existing.created_at);

        if !keep_local {
            by_id.insert(drop.id, drop.clone());
        }
    }

    let mut drops: Vec<AudioDrop> = by_id.into_values().collect();
    sort_drops(&mut drops);

    let changed = drops.as_slice() != local;

    MergeOutcome { drops, changed }
}

/// Canonical ordering: ascending `created_at`, ties broken by `id`
pub fn sort_drops(drops: &mut [AudioDrop]) {
    drops.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
}
