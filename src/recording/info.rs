//! `recording.json` session header

use chrono::Local;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::RECORDING_FORMAT_VERSION;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingInfo {
    pub id: Uuid,
    pub name: String,
    pub version: u32,
    pub machine_name: String,
    pub user_name: String,
    /// ISO-8601 local time with offset
    pub start_time: String,
}

impl RecordingInfo {
    /// Header for a session starting now on this machine
    pub fn new(id: Uuid, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            version: RECORDING_FORMAT_VERSION,
            machine_name: env_or_unknown(&["HOSTNAME", "COMPUTERNAME"]),
            user_name: env_or_unknown(&["USER", "USERNAME"]),
            start_time: Local::now().to_rfc3339(),
        }
    }
}

fn env_or_unknown(keys: &[&str]) -> String {
    keys.iter()
        .find_map(|key| std::env::var(key).ok().filter(|v| !v.is_empty()))
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_info_json_fields() {
        let id = Uuid::new_v4();
        let info = RecordingInfo::new(id, "menu");
        let value = serde_json::to_value(&info).unwrap();

        assert_eq!(value["id"], id.to_string());
        assert_eq!(value["name"], "menu");
        assert_eq!(value["version"], 1);
        assert!(value["machineName"].is_string());
        assert!(value["userName"].is_string());
        assert!(chrono::DateTime::parse_from_rfc3339(value["startTime"].as_str().unwrap()).is_ok());
    }
}
