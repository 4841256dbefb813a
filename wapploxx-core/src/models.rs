//! Typed records decoded from controller responses
//!
//! Field names follow the controller's PascalCase keys on the way in and
//! snake_case on the way out. The controller is loose with types (ids as
//! strings, flags as "ON"/"OFF"), so decoding goes through the lenient helpers
//! in [`de`].

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// ON/OFF state that may also be unknown
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tristate {
    On,
    Off,
    #[default]
    Unknown,
}

impl Tristate {
    pub fn from_wire(s: &str) -> Self {
        match s.trim().to_ascii_uppercase().as_str() {
            "ON" | "ARMED" => Tristate::On,
            "OFF" | "DISARMED" => Tristate::Off,
            _ => Tristate::Unknown,
        }
    }
}

impl<'de> Deserialize<'de> for Tristate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match Value::deserialize(deserializer)? {
            Value::String(s) => Tristate::from_wire(&s),
            Value::Bool(true) => Tristate::On,
            Value::Bool(false) => Tristate::Off,
            _ => Tristate::Unknown,
        })
    }
}

/// One smartlock as listed by the controller. A snapshot: stale after any state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockDescriptor {
    #[serde(rename(deserialize = "ID"), deserialize_with = "de::number")]
    pub id: u32,
    #[serde(rename(deserialize = "Disabled"), default, deserialize_with = "de::flag")]
    pub disabled: bool,
    #[serde(rename(deserialize = "Name"), default, deserialize_with = "de::text")]
    pub name: String,
    #[serde(rename(deserialize = "HwId"), default, deserialize_with = "de::text")]
    pub hardware_id: String,
    #[serde(rename(deserialize = "Cluster"), default, deserialize_with = "de::number")]
    pub cluster: u32,
}

/// A page of a paginated listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    #[serde(rename(deserialize = "List"), default = "Vec::new")]
    pub items: Vec<T>,
    #[serde(rename(deserialize = "Index"), default, deserialize_with = "de::number")]
    pub index: u32,
    /// As reported by the controller, before any client-side filtering
    #[serde(rename(deserialize = "ListCount"), default, deserialize_with = "de::number")]
    pub list_count: u32,
    #[serde(rename(deserialize = "TotalCount"), default, deserialize_with = "de::number")]
    pub total_count: u32,
}

impl<T> Page<T> {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// True when items beyond this page exist
    pub fn has_more(&self) -> bool {
        self.index.saturating_add(self.list_count) < self.total_count
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PanelStatus {
    #[serde(rename(deserialize = "Armed"), default)]
    pub armed: Tristate,
    #[serde(rename(deserialize = "ReadyForSet"), default, deserialize_with = "de::flag")]
    pub ready_for_set: bool,
    #[serde(rename(deserialize = "SetUnset"), default, deserialize_with = "de::flag")]
    pub set_unset: bool,
    #[serde(rename(deserialize = "Alarmed"), default)]
    pub alarmed: Tristate,
    #[serde(rename(deserialize = "ArmInput"), default, deserialize_with = "de::flag")]
    pub arm_input: bool,
    #[serde(rename(deserialize = "AvailableHotkey"), default, deserialize_with = "de::flags")]
    pub available_hotkeys: Vec<bool>,
    #[serde(rename(deserialize = "AvailableLoxx"), default, deserialize_with = "de::numbers")]
    pub available_locks: Vec<u32>,
    #[serde(rename(deserialize = "RemoteAccessTime"), default, deserialize_with = "de::numbers")]
    pub remote_access_times: Vec<u32>,
}

impl PanelStatus {
    /// Remaining remote access seconds for a lock, if the panel reports it
    pub fn remote_access_time(&self, lock_id: u32) -> Option<u32> {
        self.available_locks
            .iter()
            .zip(&self.remote_access_times)
            .find(|(id, _)| **id == lock_id)
            .map(|(_, secs)| *secs)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    #[serde(rename(deserialize = "Date"), default, deserialize_with = "de::text")]
    pub timestamp: String,
    #[serde(rename(deserialize = "Event"), default, deserialize_with = "de::text")]
    pub event_type: String,
    #[serde(rename(deserialize = "Smartloxx"), default, deserialize_with = "de::text")]
    pub lock_ref: String,
    #[serde(rename(deserialize = "User"), default, deserialize_with = "de::text")]
    pub user_ref: String,
    #[serde(rename(deserialize = "Camera"), default, deserialize_with = "de::text")]
    pub camera_ref: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemStatus {
    #[serde(rename(deserialize = "Time"), default, deserialize_with = "de::opt_text")]
    pub time: Option<String>,
    /// Seconds until the controller logs the session out
    #[serde(rename(deserialize = "LogoutTime"), default, deserialize_with = "de::opt_number")]
    pub logout_seconds: Option<u64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// User profile from the user home page
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserInfo {
    #[serde(rename(deserialize = "Username"), default, deserialize_with = "de::opt_text")]
    pub username: Option<String>,
    #[serde(rename(deserialize = "Permission"), default, deserialize_with = "de::opt_text")]
    pub permission: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Lenient decoders for the controller's loosely typed JSON
pub(crate) mod de {
    use std::str::FromStr;

    use serde::de::Error;
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    pub(crate) fn value_as_number<N: FromStr + TryFrom<u64>>(value: &Value) -> Option<N> {
        match value {
            Value::Number(n) => n.as_u64().and_then(|n| N::try_from(n).ok()),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub(crate) fn value_as_flag(value: &Value) -> Option<bool> {
        match value {
            Value::Bool(b) => Some(*b),
            Value::Null => Some(false),
            Value::Number(n) => n.as_u64().map(|n| n != 0),
            Value::String(s) => match s.trim().to_ascii_uppercase().as_str() {
                "ON" | "TRUE" | "YES" | "1" => Some(true),
                "OFF" | "FALSE" | "NO" | "0" | "" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    pub(crate) fn value_as_text(value: &Value) -> Option<String> {
        match value {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    pub fn number<'de, D, N>(deserializer: D) -> Result<N, D::Error>
    where
        D: Deserializer<'de>,
        N: FromStr + TryFrom<u64>,
    {
        let value = Value::deserialize(deserializer)?;
        value_as_number(&value).ok_or_else(|| D::Error::custom(format!("expected a number, got {}", value)))
    }

    pub fn opt_number<'de, D, N>(deserializer: D) -> Result<Option<N>, D::Error>
    where
        D: Deserializer<'de>,
        N: FromStr + TryFrom<u64>,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(value_as_number(&value))
    }

    pub fn numbers<'de, D, N>(deserializer: D) -> Result<Vec<N>, D::Error>
    where
        D: Deserializer<'de>,
        N: FromStr + TryFrom<u64>,
    {
        Vec::<Value>::deserialize(deserializer)?
            .iter()
            .map(|v| value_as_number(v).ok_or_else(|| D::Error::custom(format!("expected a number, got {}", v))))
            .collect()
    }

    pub fn flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        let value = Value::deserialize(deserializer)?;
        value_as_flag(&value).ok_or_else(|| D::Error::custom(format!("expected ON/OFF, got {}", value)))
    }

    pub fn flags<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<bool>, D::Error> {
        Vec::<Value>::deserialize(deserializer)?
            .iter()
            .map(|v| value_as_flag(v).ok_or_else(|| D::Error::custom(format!("expected ON/OFF, got {}", v))))
            .collect()
    }

    pub fn text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
        Ok(value_as_text(&Value::deserialize(deserializer)?).unwrap_or_default())
    }

    pub fn opt_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
        Ok(value_as_text(&Value::deserialize(deserializer)?))
    }
}
