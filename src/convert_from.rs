use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

/// Body of a successful `GET /v1/convert_from` call.
///
/// Quote records stay as raw JSON so the validator can report type problems per record.
#[derive(Debug, Deserialize, Serialize, PartialEq)]
pub struct ConvertFrom {
    pub from: String,
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default)]
    pub timestamp: Option<String>,
    pub to: Vec<Value>,
}
