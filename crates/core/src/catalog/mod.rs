use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// The listing publishes prices as decimal strings; accept bare numbers too
/// rather than dropping the whole entry on a shape change.
fn de_price<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(raw) => Ok(raw),
        Value::Number(number) => Ok(number.to_string()),
        Value::Null => Ok(String::new()),
        other => Err(serde::de::Error::custom(format!(
            "unexpected price value: {other}"
        ))),
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelPricing {
    #[serde(default, deserialize_with = "de_price")]
    pub prompt: String,
    #[serde(default, deserialize_with = "de_price")]
    pub completion: String,
}

/// One catalog entry as published by the OpenRouter listing API. Immutable
/// once decoded; the whole list is replaced on every refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub context_length: u64,
    #[serde(default)]
    pub pricing: ModelPricing,
    #[serde(default)]
    pub supported_parameters: Vec<String>,
}

fn price_is_zero(raw: &str) -> bool {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return true;
    }
    trimmed.parse::<f64>().map(|value| value == 0.0).unwrap_or(false)
}

impl ModelDescriptor {
    /// Leading segment of the id (`google/gemma-7b-it` -> `google`).
    pub fn provider(&self) -> &str {
        self.id.split('/').next().unwrap_or(self.id.as_str())
    }

    /// Meta-models that fan out to other models; excluded from the free
    /// listing because proxying through them double-routes the request.
    pub fn is_router(&self) -> bool {
        self.id.to_ascii_lowercase().contains("router")
    }

    pub fn is_free(&self) -> bool {
        price_is_zero(&self.pricing.prompt) && price_is_zero(&self.pricing.completion)
    }

    pub fn supports_params(&self, required: &[String]) -> bool {
        required.iter().all(|param| {
            self.supported_parameters
                .iter()
                .any(|supported| supported.eq_ignore_ascii_case(param))
        })
    }
}

/// Decodes the `{"data": [...]}` envelope of the listing API. Entries that do
/// not decode (or carry an empty id) are dropped instead of failing the whole
/// catalog; the upstream list routinely gains fields and odd entries.
pub fn decode_catalog(bytes: &[u8]) -> Result<Vec<ModelDescriptor>, String> {
    let envelope: Value =
        serde_json::from_slice(bytes).map_err(|err| format!("catalog decode failed: {err}"))?;
    let entries = envelope
        .get("data")
        .and_then(Value::as_array)
        .ok_or_else(|| "catalog missing data array".to_string())?;
    let mut models = Vec::with_capacity(entries.len());
    for entry in entries {
        let Ok(model) = serde_json::from_value::<ModelDescriptor>(entry.clone()) else {
            continue;
        };
        if model.id.trim().is_empty() {
            continue;
        }
        models.push(model);
    }
    Ok(models)
}

/// Restricts a decoded catalog to free-tier, non-router models, preserving
/// catalog order.
pub fn free_models(models: Vec<ModelDescriptor>) -> Vec<ModelDescriptor> {
    models
        .into_iter()
        .filter(|model| model.is_free() && !model.is_router())
        .collect()
}
