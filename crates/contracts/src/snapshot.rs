//! Snapshot - Snapshot Scheduler output
//!
//! Named-value summary of a buffered index range, emitted once per firing.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ChannelId, ContractError, IndexRange};

/// Value of one output channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SnapshotValue {
    Scalar(f64),
    Vector(Vec<f64>),
    /// No samples contributed to this value
    Missing,
}

impl SnapshotValue {
    /// Scalar value, if any
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            Self::Scalar(v) => Some(*v),
            _ => None,
        }
    }
}

/// Output values keyed by output channel, ordered by name
pub type OutputValues = BTreeMap<ChannelId, SnapshotValue>;

/// Statically known output channels of an engine
///
/// Storage plans are checked against this set at configuration time so a
/// misspelled channel fails at startup instead of silently producing empty
/// columns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputChannelSet {
    channels: BTreeSet<ChannelId>,
}

impl OutputChannelSet {
    pub fn new<I, C>(channels: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<ChannelId>,
    {
        Self {
            channels: channels.into_iter().map(Into::into).collect(),
        }
    }

    pub fn contains(&self, channel: &str) -> bool {
        self.channels.contains(channel)
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChannelId> {
        self.channels.iter()
    }

    /// Resolve a requested subset, rejecting unknown names.
    ///
    /// An empty request selects every channel.
    pub fn resolve_subset(&self, requested: &[String]) -> Result<Vec<ChannelId>, ContractError> {
        if requested.is_empty() {
            return Ok(self.channels.iter().cloned().collect());
        }
        requested
            .iter()
            .map(|name| {
                self.channels
                    .get(name.as_str())
                    .cloned()
                    .ok_or_else(|| ContractError::UnknownChannel {
                        channel: name.clone(),
                    })
            })
            .collect()
    }
}

/// Derived snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// Monotonic snapshot counter
    pub snapshot_id: u64,

    /// Sample range this snapshot summarizes
    pub range: IndexRange,

    /// Acquisition timestamp of the newest buffered sample (microseconds)
    pub timestamp_us: i64,

    /// Wall-clock time of the firing
    pub wall_time: DateTime<Utc>,

    /// Output values
    pub values: OutputValues,
}

impl Snapshot {
    /// Copy of this snapshot restricted to `channels`
    pub fn select(&self, channels: &[ChannelId]) -> Snapshot {
        let values = channels
            .iter()
            .filter_map(|ch| self.values.get(ch).map(|v| (ch.clone(), v.clone())))
            .collect();
        Snapshot {
            snapshot_id: self.snapshot_id,
            range: self.range,
            timestamp_us: self.timestamp_us,
            wall_time: self.wall_time,
            values,
        }
    }

    /// Scalar value of one channel
    pub fn scalar(&self, channel: &str) -> Option<f64> {
        self.values.get(channel).and_then(SnapshotValue::as_scalar)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_snapshot() -> Snapshot {
        let mut values = OutputValues::new();
        values.insert("u1_rms".into(), SnapshotValue::Scalar(230.1));
        values.insert("i1_rms".into(), SnapshotValue::Scalar(4.2));
        values.insert("u1_harm".into(), SnapshotValue::Vector(vec![1.0, 0.02]));
        Snapshot {
            snapshot_id: 3,
            range: IndexRange::new(0, 1000),
            timestamp_us: 1_000_000,
            wall_time: Utc::now(),
            values,
        }
    }

    #[test]
    fn test_select_keeps_only_requested() {
        let snapshot = sample_snapshot();
        let picked = snapshot.select(&["u1_rms".into()]);
        assert_eq!(picked.values.len(), 1);
        assert_eq!(picked.scalar("u1_rms"), Some(230.1));
        assert_eq!(picked.range, snapshot.range);
    }

    #[test]
    fn test_resolve_subset_rejects_unknown() {
        let set = OutputChannelSet::new(["u1_rms", "i1_rms"]);
        let err = set.resolve_subset(&["u1_rsm".to_string()]).unwrap_err();
        assert!(matches!(err, ContractError::UnknownChannel { .. }));
    }

    #[test]
    fn test_resolve_empty_subset_selects_all() {
        let set = OutputChannelSet::new(["b", "a"]);
        let all = set.resolve_subset(&[]).unwrap();
        assert_eq!(all, vec![ChannelId::from("a"), ChannelId::from("b")]);
    }

    #[test]
    fn test_value_serializes_untagged() {
        let json = serde_json::to_string(&SnapshotValue::Scalar(1.5)).unwrap();
        assert_eq!(json, "1.5");
        let json = serde_json::to_string(&SnapshotValue::Missing).unwrap();
        assert_eq!(json, "null");
    }
}
