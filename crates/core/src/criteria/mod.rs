use std::str::FromStr;

use crate::catalog::ModelDescriptor;

/// Caller-supplied narrowing of the free listing. All predicates are ANDed;
/// `limit` truncates after sorting.
#[derive(Debug, Clone, Default)]
pub struct FilterCriteria {
    pub name: Option<String>,
    pub provider: Option<String>,
    pub min_context_length: Option<u64>,
    pub require_params: Vec<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    Name,
    ContextLength,
    Id,
}

impl FromStr for SortField {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "name" => Ok(SortField::Name),
            "context_length" | "context-length" => Ok(SortField::ContextLength),
            "id" => Ok(SortField::Id),
            other => Err(format!("unknown sort field: {other}")),
        }
    }
}

pub fn apply_filters(models: Vec<ModelDescriptor>, criteria: &FilterCriteria) -> Vec<ModelDescriptor> {
    let name_needle = criteria.name.as_deref().map(str::to_ascii_lowercase);
    let provider_needle = criteria.provider.as_deref().map(str::to_ascii_lowercase);
    models
        .into_iter()
        .filter(|model| {
            if let Some(needle) = name_needle.as_deref() {
                if !model.name.to_ascii_lowercase().contains(needle) {
                    return false;
                }
            }
            if let Some(needle) = provider_needle.as_deref() {
                if !model.provider().to_ascii_lowercase().contains(needle) {
                    return false;
                }
            }
            if let Some(min) = criteria.min_context_length {
                if model.context_length < min {
                    return false;
                }
            }
            model.supports_params(&criteria.require_params)
        })
        .collect()
}

/// Stable sort: models comparing equal keep their catalog order (also under
/// `reverse`), so the failover priority between them stays deterministic.
pub fn sort_models(models: &mut [ModelDescriptor], field: SortField, reverse: bool) {
    models.sort_by(|a, b| {
        let ordering = match field {
            SortField::Name => a.name.cmp(&b.name),
            SortField::ContextLength => a.context_length.cmp(&b.context_length),
            SortField::Id => a.id.cmp(&b.id),
        };
        if reverse {
            ordering.reverse()
        } else {
            ordering
        }
    });
}

/// Filter + sort + limit in one pass; the result is a candidate list whose
/// order is the failover priority.
pub fn select_candidates(
    models: Vec<ModelDescriptor>,
    criteria: &FilterCriteria,
    field: SortField,
    reverse: bool,
) -> Vec<ModelDescriptor> {
    let mut selected = apply_filters(models, criteria);
    sort_models(&mut selected, field, reverse);
    if let Some(limit) = criteria.limit {
        selected.truncate(limit);
    }
    selected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ModelPricing;

    fn model(id: &str, name: &str, context_length: u64) -> ModelDescriptor {
        ModelDescriptor {
            id: id.to_string(),
            name: name.to_string(),
            context_length,
            pricing: ModelPricing::default(),
            supported_parameters: vec!["tools".to_string()],
        }
    }

    #[test]
    fn combined_filters_keep_only_matching_models_in_stable_order() {
        let models = vec![
            model("google/gemma-7b-it", "Google: Gemma 7B", 8192),
            model("google/palm-2", "Google: PaLM 2", 4096),
            model("meta-llama/llama-3-70b", "Meta: Llama 3 70B", 8192),
            model("google/gemini-flash", "Google: Gemini Flash", 1_000_000),
        ];
        let criteria = FilterCriteria {
            provider: Some("google".to_string()),
            min_context_length: Some(8000),
            ..FilterCriteria::default()
        };
        let filtered = apply_filters(models, &criteria);
        let ids: Vec<&str> = filtered.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["google/gemma-7b-it", "google/gemini-flash"]);
    }

    #[test]
    fn name_filter_matches_display_name_case_insensitively() {
        let models = vec![
            model("a/one", "Alpha One", 1),
            model("b/two", "beta two", 1),
        ];
        let criteria = FilterCriteria {
            name: Some("ALPHA".to_string()),
            ..FilterCriteria::default()
        };
        let filtered = apply_filters(models, &criteria);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].id, "a/one");
    }

    #[test]
    fn require_params_filters_unsupported_models() {
        let mut with_tools = model("a/one", "one", 1);
        with_tools.supported_parameters = vec!["tools".to_string(), "seed".to_string()];
        let mut without = model("b/two", "two", 1);
        without.supported_parameters = vec!["seed".to_string()];
        let criteria = FilterCriteria {
            require_params: vec!["tools".to_string()],
            ..FilterCriteria::default()
        };
        let filtered = apply_filters(vec![with_tools, without], &criteria);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].id, "a/one");
    }

    #[test]
    fn sort_by_context_length_reversed_puts_largest_first() {
        let mut models = vec![
            model("a/small", "small", 4096),
            model("b/large", "large", 128_000),
            model("c/mid", "mid", 32_768),
        ];
        sort_models(&mut models, SortField::ContextLength, true);
        let ids: Vec<&str> = models.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["b/large", "c/mid", "a/small"]);
    }

    #[test]
    fn select_candidates_applies_limit_after_sorting() {
        let models = vec![
            model("a/small", "small", 4096),
            model("b/large", "large", 128_000),
            model("c/mid", "mid", 32_768),
        ];
        let criteria = FilterCriteria {
            limit: Some(2),
            ..FilterCriteria::default()
        };
        let selected = select_candidates(models, &criteria, SortField::ContextLength, true);
        let ids: Vec<&str> = selected.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["b/large", "c/mid"]);
    }

    #[test]
    fn sort_field_parses_cli_spellings() {
        assert_eq!("name".parse::<SortField>().unwrap(), SortField::Name);
        assert_eq!(
            "context_length".parse::<SortField>().unwrap(),
            SortField::ContextLength
        );
        assert!("speed".parse::<SortField>().is_err());
    }
}
