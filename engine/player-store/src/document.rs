//! Player documents and their construction from the pipeline artifacts.

use std::collections::{BTreeMap, HashSet};

use cluster_analytics::ClusterAssignments;
use player_stats::{PlayerRecord, StatsTable};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};

/// One player as stored: keyed by the lowercased username
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerDoc {
    pub id: String,
    pub username: String,
    /// `(rank, level, xp)` per skill, total first; `-1` when unranked
    pub stats: Vec<i64>,
    /// Split name → cluster id
    pub clusterids: BTreeMap<String, u32>,
}

impl PlayerDoc {
    pub fn from_record(record: &PlayerRecord, clusterids: BTreeMap<String, u32>) -> Self {
        Self { id: record.id(), username: record.username.clone(), stats: record.stats.clone(), clusterids }
    }

    /// Back to a stats-table record at leaderboard position `rank`
    pub fn to_record(&self, rank: u64) -> PlayerRecord {
        PlayerRecord::new(self.username.clone(), rank, self.stats.clone())
    }
}

/// Primary key for a username
pub fn doc_id(username: &str) -> String {
    username.to_lowercase()
}

/// One document per stats-table row, in table order. The clusters file must
/// list the same players in the same order, and cover every name in
/// `required_splits`.
pub fn build_documents(
    table: &StatsTable,
    assignments: &ClusterAssignments,
    required_splits: &[String],
) -> Result<Vec<PlayerDoc>> {
    if assignments.len() != table.len() {
        return Err(StoreError::inconsistent(format!(
            "stats table has {} players but the clusters file has {}",
            table.len(),
            assignments.len()
        )));
    }
    if let Some(missing) = required_splits.iter().find(|&s| !assignments.splits.contains(s)) {
        return Err(StoreError::inconsistent(format!("clusters file has no column for split {missing}")));
    }

    let mut seen = HashSet::with_capacity(table.len());
    let mut docs = Vec::with_capacity(table.len());
    for (row, (record, username)) in table.iter().zip(&assignments.usernames).enumerate() {
        if record.username != *username {
            return Err(StoreError::inconsistent(format!(
                "row {}: stats table has {:?}, clusters file has {:?}",
                row + 1,
                record.username,
                username
            )));
        }
        let clusterids = assignments.player_clusters(row).map(|(split, id)| (split.to_string(), id)).collect();
        let doc = PlayerDoc::from_record(record, clusterids);
        if !seen.insert(doc.id.clone()) {
            return Err(StoreError::inconsistent(format!("duplicate player id {:?}", doc.id)));
        }
        docs.push(doc);
    }
    Ok(docs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use player_stats::{MISSING, NUM_STATS};

    fn record(name: &str, rank: u64) -> PlayerRecord {
        let mut stats = vec![MISSING; NUM_STATS];
        stats[0] = rank as i64;
        stats[1] = 2000 - rank as i64;
        stats[2] = 1_000_000;
        PlayerRecord::new(name, rank, stats)
    }

    fn assignments(names: &[&str]) -> ClusterAssignments {
        let mut a = ClusterAssignments::new(names.iter().map(|n| n.to_string()).collect());
        a.push_split("all", &vec![3; names.len()]).unwrap();
        a.push_split("cb", &vec![1; names.len()]).unwrap();
        a
    }

    #[test]
    fn test_documents_follow_table() {
        let table = StatsTable::from_records(vec![record("Lynx Titan", 1), record("Zezima", 2)]);
        let docs = build_documents(&table, &assignments(&["Lynx Titan", "Zezima"]), &["cb".to_string()]).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].id, "lynx titan");
        assert_eq!(docs[1].clusterids, BTreeMap::from([("all".to_string(), 3), ("cb".to_string(), 1)]));
        assert_eq!(docs[1].to_record(2), table.records()[1]);
    }

    #[test]
    fn test_document_json_shape() {
        let doc = PlayerDoc::from_record(&record("Zezima", 2), BTreeMap::from([("all".to_string(), 7)]));
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["id"], "zezima");
        assert_eq!(json["clusterids"]["all"], 7);
        assert_eq!(json["stats"].as_array().unwrap().len(), NUM_STATS);
        assert_eq!(serde_json::from_value::<PlayerDoc>(json).unwrap(), doc);
    }

    #[test]
    fn test_mismatched_inputs_rejected() {
        let table = StatsTable::from_records(vec![record("a", 1), record("b", 2)]);
        assert!(build_documents(&table, &assignments(&["a"]), &[]).is_err());
        assert!(build_documents(&table, &assignments(&["a", "c"]), &[]).is_err());
        assert!(build_documents(&table, &assignments(&["a", "b"]), &["noncb".to_string()]).is_err());

        let dupes = StatsTable::from_records(vec![record("Bob", 1), record("bob", 2)]);
        assert!(build_documents(&dupes, &assignments(&["Bob", "bob"]), &[]).is_err());
    }
}
