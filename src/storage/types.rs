use serde::{Deserialize, Serialize};

/// One participant's view of a completed match. The crawler emits ten of
/// these per match; staged files hold one JSON object per line.
///
/// `team_position` is TOP, JUNGLE, MIDDLE, BOTTOM or UTILITY; the upstream
/// occasionally fails to assign a role and sends an empty string. Such
/// records stay in the files but are skipped by aggregation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MatchRecord {
    pub match_id: String,
    pub game_version: String,
    pub game_duration: i32,
    pub game_creation: i64,

    pub puuid: String,
    pub champion_id: i32,
    pub champion_name: String,
    pub team_position: String,
    pub win: bool,

    // Final inventory, 0 = empty slot
    pub item0: i32,
    pub item1: i32,
    pub item2: i32,
    pub item3: i32,
    pub item4: i32,
    pub item5: i32,

    /// Completed-item purchase order for sampled matches only.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub build_order: Vec<i32>,

    /// Fields this version does not model ride along untouched.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl MatchRecord {
    /// The six final-inventory slots in order, empty slots included.
    pub fn final_items(&self) -> [i32; 6] {
        [
            self.item0, self.item1, self.item2, self.item3, self.item4, self.item5,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trips_camel_case_fields() {
        let line = r#"{"matchId":"NA1_100","gameVersion":"14.23.448.1234","puuid":"p-1","championId":103,"championName":"Ahri","teamPosition":"MIDDLE","win":true,"item0":3089,"item1":0,"item2":3157,"item3":0,"item4":0,"item5":0}"#;
        let record: MatchRecord = serde_json::from_str(line).unwrap();

        assert_eq!(record.match_id, "NA1_100");
        assert_eq!(record.champion_id, 103);
        assert_eq!(record.team_position, "MIDDLE");
        assert!(record.win);
        assert_eq!(record.final_items(), [3089, 0, 3157, 0, 0, 0]);

        let out = serde_json::to_string(&record).unwrap();
        assert!(out.contains(r#""matchId":"NA1_100""#));
        assert!(out.contains(r#""championId":103"#));
        // Empty build order stays off the wire
        assert!(!out.contains("buildOrder"));
    }

    #[test]
    fn test_unknown_fields_are_preserved() {
        let line = r#"{"matchId":"NA1_101","gameVersion":"14.23.1","championId":1,"teamPosition":"TOP","win":false,"goldEarned":12345}"#;
        let record: MatchRecord = serde_json::from_str(line).unwrap();

        assert_eq!(record.extra.get("goldEarned").and_then(|v| v.as_i64()), Some(12345));

        let out = serde_json::to_string(&record).unwrap();
        assert!(out.contains(r#""goldEarned":12345"#));
    }

    #[test]
    fn test_sparse_lines_parse_with_defaults() {
        let record: MatchRecord = serde_json::from_str(r#"{"matchId":"NA1_102"}"#).unwrap();
        assert_eq!(record.match_id, "NA1_102");
        assert_eq!(record.champion_id, 0);
        assert!(record.team_position.is_empty());
        assert!(record.build_order.is_empty());
    }
}
