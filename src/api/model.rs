use serde::{Deserialize, Deserializer, Serialize};

/// Field values of a record, keyed by field name.
pub type Record = serde_json::Map<String, serde_json::Value>;

#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct App {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: u64,
    pub name: String,
}

#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct View {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub application_name: Option<String>,
    #[serde(default)]
    pub default: Option<bool>,
}

/// Describes one column of a record set.
#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldMeta {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub can_read: bool,
    #[serde(default)]
    pub can_update: bool,
    #[serde(default)]
    pub can_create: bool,
}

/// A page of records (or users) with the structure of their fields.
#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordSet {
    #[serde(default)]
    pub structure: Vec<FieldMeta>,
    #[serde(default)]
    pub data: Vec<Record>,
    #[serde(default)]
    pub total_count: u64,
}

/// A single record with the structure of its fields.
#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordResponse {
    #[serde(default)]
    pub structure: Vec<FieldMeta>,
    pub data: Record,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paging {
    pub start: u64,
    pub max: u64,
}

impl Default for Paging {
    fn default() -> Self {
        Self { start: 0, max: 50 }
    }
}

#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct UserInfo {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub time_zone: Option<String>,
}

/// New field values for one record in a bulk update.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordUpdate {
    pub id: u64,
    #[serde(flatten)]
    pub data: Record,
}

#[derive(Serialize)]
pub(crate) struct DataEnvelope<T> {
    pub data: Vec<T>,
}

/// The platform sends ids as numbers on some endpoints and as strings on others.
fn deserialize_id<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Number(u64),
        Text(String),
    }

    match RawId::deserialize(deserializer)? {
        RawId::Number(id) => Ok(id),
        RawId::Text(id) => id.parse().map_err(serde::de::Error::custom),
    }
}
