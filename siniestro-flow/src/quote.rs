//! Quote request hand-off: the quote form is not stored anywhere, it becomes
//! a prefilled WhatsApp conversation with the brokerage.

use serde::{Deserialize, Serialize};

use crate::error::{FlowError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteRequest {
    #[serde(rename = "marca")]
    pub brand: String,
    #[serde(rename = "modelo")]
    pub model: String,
    #[serde(rename = "anio")]
    pub year: String,
    #[serde(rename = "gnc", default)]
    pub cng: bool,
    #[serde(rename = "telefono")]
    pub phone: String,
}

impl QuoteRequest {
    pub fn message(&self) -> String {
        format!(
            "🚘 *COTIZACIÓN DE SEGURO*\n\n*Vehículo:* {} {} ({})\n*GNC:* {}\n*WhatsApp de contacto:* {}\n\nSolicito cotización, gracias.",
            self.brand.trim(),
            self.model.trim(),
            self.year.trim(),
            if self.cng { "Sí" } else { "No" },
            self.phone.trim()
        )
    }

    /// `https://wa.me/<number>?text=<message>` for the configured number.
    pub fn whatsapp_link(&self, number: &str) -> Result<String> {
        for (name, value) in [
            ("marca", &self.brand),
            ("modelo", &self.model),
            ("anio", &self.year),
            ("telefono", &self.phone),
        ] {
            if value.trim().is_empty() {
                return Err(FlowError::InvalidInput(format!("Falta completar: {name}")));
            }
        }

        Ok(format!(
            "https://wa.me/{}?text={}",
            number,
            urlencoding::encode(&self.message())
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> QuoteRequest {
        QuoteRequest {
            brand: "Fiat".into(),
            model: "Cronos".into(),
            year: "2021".into(),
            cng: true,
            phone: "3415550000".into(),
        }
    }

    #[test]
    fn link_encodes_message() {
        let link = request().whatsapp_link("5493415551234").unwrap();
        assert!(link.starts_with("https://wa.me/5493415551234?text="));
        assert!(link.contains("Fiat%20Cronos%20%282021%29"));
        assert!(link.contains("%0A"));
        assert!(!link.contains(' '));
    }

    #[test]
    fn empty_fields_are_rejected() {
        let err = QuoteRequest {
            phone: " ".into(),
            ..request()
        }
        .whatsapp_link("549")
        .unwrap_err();
        assert_eq!(err.user_message(), "Falta completar: telefono");
    }
}
