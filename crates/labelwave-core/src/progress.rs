//! Resume state: ids that have been fully processed in the current run series.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Checkpointed progress.
///
/// Grows monotonically until the run series completes; ids are only removed
/// by deleting the whole checkpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    pub processed_ids: BTreeSet<i64>,
    #[serde(default, with = "lenient_timestamp")]
    pub last_updated: Option<DateTime<Utc>>,
}

impl Progress {
    pub fn contains(&self, id: i64) -> bool {
        self.processed_ids.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.processed_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processed_ids.is_empty()
    }

    /// Union `ids` into the set and stamp the update time.
    ///
    /// Returns how many ids were new.
    pub fn extend(&mut self, ids: impl IntoIterator<Item = i64>) -> usize {
        let before = self.processed_ids.len();
        self.processed_ids.extend(ids);
        self.last_updated = Some(Utc::now());
        self.processed_ids.len() - before
    }
}

/// `lastUpdated` is an RFC 3339 string; an empty string means "never".
mod lenient_timestamp {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(ts) => serializer.serialize_str(&ts.to_rfc3339()),
            None => serializer.serialize_str(""),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        match raw.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(s) => DateTime::parse_from_rfc3339(s)
                .map(|ts| Some(ts.with_timezone(&Utc)))
                .map_err(serde::de::Error::custom),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extend_is_idempotent_union() {
        let mut p = Progress::default();
        assert_eq!(p.extend([1, 2, 3]), 3);
        assert_eq!(p.extend([2, 3, 4]), 1);
        assert_eq!(p.len(), 4);
        assert!(p.last_updated.is_some());
    }

    #[test]
    fn reads_checkpoint_with_empty_timestamp() {
        let p: Progress =
            serde_json::from_str(r#"{"processedIds": [5, 9, 12], "lastUpdated": ""}"#).unwrap();
        assert!(p.contains(9));
        assert!(p.last_updated.is_none());
    }

    #[test]
    fn json_uses_camel_case_keys() {
        let mut p = Progress::default();
        p.extend([7]);
        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(json["processedIds"], serde_json::json!([7]));
        assert!(json["lastUpdated"].as_str().unwrap().contains('T'));
    }

    #[test]
    fn missing_timestamp_key_is_accepted() {
        let p: Progress = serde_json::from_str(r#"{"processedIds": []}"#).unwrap();
        assert!(p.is_empty());
    }
}
