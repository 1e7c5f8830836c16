use serde::{Deserialize, Serialize};
use siniestro_flow::{MenuEntry, SchemaSource, feedback::RatingReceipt};

#[derive(Debug, Serialize, Deserialize)]
pub struct ValidateRequest {
    #[serde(alias = "national_id")]
    pub dni: String,
    #[serde(alias = "plate")]
    pub patente: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SelectRequest {
    #[serde(alias = "slug")]
    pub tipo: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MenuResponse {
    pub source: SchemaSource,
    pub claim_types: Vec<MenuEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RatingResponse {
    pub message: String,
    pub receipt: RatingReceipt,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct QuoteResponse {
    pub url: String,
}
