//! Product rating rules
//!
//! Each product ships a JSON rating document evaluated against a quote's
//! form data. A document has:
//!
//! - `metadata`: product code, name, version and currency
//! - `base_premium` and tax `rates` (percentages)
//! - `required_fields`: form paths that must be present for a binding price
//! - `estimate_fields`: form paths sufficient for an indicative price
//! - `loadings`: percentage adjustments applied when a condition matches
//! - `triggers`: conditions raising Decline/Review/Endorsement/Error triggers
//!
//! # Example
//!
//! ```rust,ignore
//! let mut engine = RatingEngine::new();
//! engine.register_product(product_id, engine.load_rules_from_str(json)?);
//!
//! let result = engine.calculate(product_id, &form_data)?;
//! ```
//!
//! Conditions use a compact syntax: `< 25`, `>= 100000`, `[18..25)`,
//! `true`, `"NSW"`, or `-` to match anything present.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use core_kernel::{Currency, Money, ProductId, Rate};

use crate::calculation::{
    CalculationResult, CalculationState, CalculationTrigger, PriceBreakdown, TriggerType,
};

/// Errors raised while loading or evaluating rating rules
#[derive(Debug, Error)]
pub enum RatingError {
    #[error("Failed to parse rating rules: {0}")]
    ParseError(String),

    #[error("Rating rules file not found: {0}")]
    FileNotFound(String),

    #[error("No rating rules registered for product {0}")]
    UnknownProduct(ProductId),

    #[error("Invalid rule format: {0}")]
    InvalidFormat(String),

    #[error("Evaluation error: {0}")]
    EvaluationError(String),
}

/// Descriptive data about the rated product
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductMetadata {
    pub product_code: String,
    pub product_name: String,
    pub version: String,
    #[serde(default)]
    pub currency: Currency,
}

/// Tax rates expressed as percentages
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaxRates {
    #[serde(default)]
    pub esl_percent: Decimal,
    #[serde(default)]
    pub gst_percent: Decimal,
    #[serde(default)]
    pub stamp_duty_percent: Decimal,
}

/// Percentage adjustment to the base premium
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadingRule {
    pub name: String,
    pub field: String,
    pub condition: String,
    pub percent: Decimal,
}

/// Condition that raises a trigger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerRule {
    pub name: String,
    pub field: String,
    pub condition: String,
    pub trigger_type: TriggerType,
    pub message: String,
}

/// A parsed rating document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductRules {
    pub metadata: ProductMetadata,
    pub base_premium: Decimal,
    #[serde(default)]
    pub rates: TaxRates,
    #[serde(default)]
    pub required_fields: Vec<String>,
    #[serde(default)]
    pub estimate_fields: Vec<String>,
    #[serde(default)]
    pub loadings: Vec<LoadingRule>,
    #[serde(default)]
    pub triggers: Vec<TriggerRule>,
}

impl ProductRules {
    /// Parses and checks a rating document
    ///
    /// # Errors
    ///
    /// Returns `ParseError` for malformed JSON and `InvalidFormat` when a
    /// rule's condition cannot be understood.
    pub fn from_json(document: Value) -> Result<Self, RatingError> {
        let rules: ProductRules =
            serde_json::from_value(document).map_err(|e| RatingError::ParseError(e.to_string()))?;

        if rules.base_premium.is_sign_negative() {
            return Err(RatingError::InvalidFormat("base_premium must not be negative".to_string()));
        }

        let conditions = rules
            .loadings
            .iter()
            .map(|l| (&l.name, &l.condition))
            .chain(rules.triggers.iter().map(|t| (&t.name, &t.condition)));
        for (name, condition) in conditions {
            Condition::parse(condition).ok_or_else(|| {
                RatingError::InvalidFormat(format!("rule '{}' has invalid condition '{}'", name, condition))
            })?;
        }

        Ok(rules)
    }
}

/// Parsed form of a condition string
#[derive(Debug, Clone, PartialEq)]
enum Condition {
    Any,
    Less(f64),
    LessEq(f64),
    Greater(f64),
    GreaterEq(f64),
    Range {
        low: f64,
        high: f64,
        low_inclusive: bool,
        high_inclusive: bool,
    },
    Equals(String),
}

impl Condition {
    fn parse(raw: &str) -> Option<Condition> {
        let raw = raw.trim();
        if raw == "-" {
            return Some(Condition::Any);
        }

        // Two-character operators first so ">=" is not read as ">"
        let comparisons: [(&str, fn(f64) -> Condition); 4] = [
            ("<=", Condition::LessEq),
            (">=", Condition::GreaterEq),
            ("<", Condition::Less),
            (">", Condition::Greater),
        ];
        for (op, build) in comparisons {
            if let Some(rest) = raw.strip_prefix(op) {
                return rest.trim().parse::<f64>().ok().map(build);
            }
        }

        if raw.starts_with('[') || raw.starts_with('(') {
            let low_inclusive = raw.starts_with('[');
            let high_inclusive = raw.ends_with(']');
            let inner = raw.trim_start_matches(['[', '(']).trim_end_matches([')', ']']);
            let (low, high) = inner.split_once("..")?;
            return Some(Condition::Range {
                low: low.trim().parse().ok()?,
                high: high.trim().parse().ok()?,
                low_inclusive,
                high_inclusive,
            });
        }

        Some(Condition::Equals(raw.trim_matches('"').to_string()))
    }

    fn matches(&self, value: &Value) -> bool {
        if value.is_null() {
            return false;
        }
        let number = as_number(value);
        match self {
            Condition::Any => true,
            Condition::Less(t) => number.is_some_and(|n| n < *t),
            Condition::LessEq(t) => number.is_some_and(|n| n <= *t),
            Condition::Greater(t) => number.is_some_and(|n| n > *t),
            Condition::GreaterEq(t) => number.is_some_and(|n| n >= *t),
            Condition::Range {
                low,
                high,
                low_inclusive,
                high_inclusive,
            } => number.is_some_and(|n| {
                let low_ok = if *low_inclusive { n >= *low } else { n > *low };
                let high_ok = if *high_inclusive { n <= *high } else { n < *high };
                low_ok && high_ok
            }),
            Condition::Equals(expected) => match value {
                Value::String(s) => s.eq_ignore_ascii_case(expected),
                Value::Bool(b) => b.to_string() == *expected,
                Value::Number(_) => match (number, expected.parse::<f64>()) {
                    (Some(n), Ok(e)) => (n - e).abs() < 0.0001,
                    _ => false,
                },
                _ => false,
            },
        }
    }
}

/// Numbers may arrive as JSON numbers or as numeric strings from forms
fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Looks up a dot-separated path such as `driver.age`
pub fn field_value<'a>(form_data: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(form_data, |current, part| current.get(part))
        .filter(|v| !v.is_null() && v.as_str() != Some(""))
}

/// Evaluates rating rules against form data
#[derive(Debug, Default)]
pub struct RatingEngine {
    products: HashMap<ProductId, Arc<ProductRules>>,
}

impl RatingEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a rating document from a JSON string
    pub fn load_rules_from_str(&self, json_str: &str) -> Result<ProductRules, RatingError> {
        let document: Value =
            serde_json::from_str(json_str).map_err(|e| RatingError::ParseError(e.to_string()))?;
        ProductRules::from_json(document)
    }

    /// Parses a rating document from a file
    pub fn load_rules_from_file(&self, path: &Path) -> Result<ProductRules, RatingError> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| RatingError::FileNotFound(path.display().to_string()))?;
        self.load_rules_from_str(&content)
    }

    pub fn register_product(&mut self, product_id: ProductId, rules: ProductRules) {
        self.products.insert(product_id, Arc::new(rules));
    }

    pub fn get_product(&self, product_id: ProductId) -> Option<Arc<ProductRules>> {
        self.products.get(&product_id).cloned()
    }

    /// Rates form data for a registered product
    ///
    /// # Errors
    ///
    /// Returns `UnknownProduct` when no rules are registered for the product
    pub fn calculate(&self, product_id: ProductId, form_data: &Value) -> Result<CalculationResult, RatingError> {
        let rules = self
            .get_product(product_id)
            .ok_or(RatingError::UnknownProduct(product_id))?;
        self.evaluate(&rules, form_data)
    }

    /// Rates form data against the given rules
    ///
    /// - Missing required fields give `PremiumEstimate` with an indicative
    ///   price when every estimate field is present, otherwise `Incomplete`.
    /// - With all required fields present the result is `BindingQuote`,
    ///   unless an Error trigger fires, which downgrades it to
    ///   `PremiumComplete`.
    pub fn evaluate(&self, rules: &ProductRules, form_data: &Value) -> Result<CalculationResult, RatingError> {
        let missing: Vec<&str> = rules
            .required_fields
            .iter()
            .filter(|f| field_value(form_data, f).is_none())
            .map(String::as_str)
            .collect();

        let triggers = self.evaluate_triggers(rules, form_data)?;

        let can_estimate = !rules.estimate_fields.is_empty()
            && rules.estimate_fields.iter().all(|f| field_value(form_data, f).is_some());

        let (state, price) = if missing.is_empty() {
            let state = if triggers.iter().any(|t| t.trigger_type == TriggerType::Error) {
                CalculationState::PremiumComplete
            } else {
                CalculationState::BindingQuote
            };
            (state, Some(self.price(rules, form_data)?))
        } else if can_estimate {
            (CalculationState::PremiumEstimate, Some(self.price(rules, form_data)?))
        } else {
            (CalculationState::Incomplete, None)
        };

        debug!(
            product = %rules.metadata.product_code,
            state = %state,
            missing = missing.len(),
            triggers = triggers.len(),
            "Rated form data"
        );

        Ok(CalculationResult::new(state, triggers, price))
    }

    fn evaluate_triggers(
        &self,
        rules: &ProductRules,
        form_data: &Value,
    ) -> Result<Vec<CalculationTrigger>, RatingError> {
        let mut triggers = Vec::new();
        for rule in &rules.triggers {
            if self.rule_matches(&rule.field, &rule.condition, form_data)? {
                triggers.push(CalculationTrigger::new(rule.trigger_type, &rule.name, &rule.message));
            }
        }
        Ok(triggers)
    }

    fn price(&self, rules: &ProductRules, form_data: &Value) -> Result<PriceBreakdown, RatingError> {
        let mut loading_percent = Decimal::ZERO;
        for loading in &rules.loadings {
            if self.rule_matches(&loading.field, &loading.condition, form_data)? {
                loading_percent += loading.percent;
            }
        }

        let factor = Decimal::ONE + Rate::from_percentage(loading_percent).as_decimal();
        if factor.is_sign_negative() {
            return Err(RatingError::EvaluationError(format!(
                "loadings total {}% gives a negative premium",
                loading_percent
            )));
        }

        let base = Money::new(rules.base_premium, rules.metadata.currency).multiply(factor);
        PriceBreakdown::calculate(
            base,
            Rate::from_percentage(rules.rates.esl_percent),
            Rate::from_percentage(rules.rates.gst_percent),
            Rate::from_percentage(rules.rates.stamp_duty_percent),
        )
        .map_err(|e| RatingError::EvaluationError(e.to_string()))
    }

    fn rule_matches(&self, field: &str, condition: &str, form_data: &Value) -> Result<bool, RatingError> {
        let condition = Condition::parse(condition)
            .ok_or_else(|| RatingError::InvalidFormat(format!("invalid condition '{}'", condition)))?;
        Ok(field_value(form_data, field).is_some_and(|v| condition.matches(v)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn sample_rules_json() -> &'static str {
        r#"{
            "metadata": {
                "product_code": "MOTOR",
                "product_name": "Motor Vehicle",
                "version": "1.0.0",
                "currency": "AUD"
            },
            "base_premium": "500",
            "rates": { "esl_percent": "0", "gst_percent": "10", "stamp_duty_percent": "0" },
            "required_fields": ["driver.age", "vehicle.value"],
            "estimate_fields": ["vehicle.value"],
            "loadings": [
                { "name": "Young driver", "field": "driver.age", "condition": "< 25", "percent": "20" }
            ],
            "triggers": [
                {
                    "name": "highValue",
                    "field": "vehicle.value",
                    "condition": ">= 150000",
                    "trigger_type": "Review",
                    "message": "Vehicles over $150,000 need underwriter review"
                },
                {
                    "name": "unlicensed",
                    "field": "driver.licensed",
                    "condition": "false",
                    "trigger_type": "Decline",
                    "message": "Unlicensed drivers cannot be insured"
                }
            ]
        }"#
    }

    fn rules() -> ProductRules {
        RatingEngine::new().load_rules_from_str(sample_rules_json()).unwrap()
    }

    #[test]
    fn test_load_rules() {
        let rules = rules();
        assert_eq!(rules.metadata.product_code, "MOTOR");
        assert_eq!(rules.base_premium, dec!(500));
        assert_eq!(rules.loadings.len(), 1);
    }

    #[test]
    fn test_missing_fields_give_estimate() {
        let result = RatingEngine::new()
            .evaluate(&rules(), &json!({ "vehicle": { "value": 20000 } }))
            .unwrap();
        assert_eq!(result.state, CalculationState::PremiumEstimate);
        assert_eq!(result.total().unwrap().amount(), dec!(550));
    }

    #[test]
    fn test_missing_fields_without_estimate_fields_are_incomplete() {
        let mut rules = rules();
        rules.estimate_fields.clear();
        let result = RatingEngine::new()
            .evaluate(&rules, &json!({ "vehicle": { "value": 20000 } }))
            .unwrap();

        assert_eq!(result.state, CalculationState::Incomplete);
        assert!(result.price.is_none());
        assert!(!result.is_binding());
    }

    #[test]
    fn test_error_trigger_downgrades_to_premium_complete() {
        let json = sample_rules_json().replace("\"trigger_type\": \"Review\"", "\"trigger_type\": \"Error\"");
        let rules = RatingEngine::new().load_rules_from_str(&json).unwrap();
        let form = json!({ "driver": { "age": 40 }, "vehicle": { "value": 200000 } });
        let result = RatingEngine::new().evaluate(&rules, &form).unwrap();

        assert_eq!(result.state, CalculationState::PremiumComplete);
        assert!(result.has_trigger(TriggerType::Error));
        assert!(result.price.is_some());
        assert!(!result.is_binding());
    }

    #[test]
    fn test_estimate_is_not_binding() {
        let result = RatingEngine::new()
            .evaluate(&rules(), &json!({ "vehicle": { "value": 20000 } }))
            .unwrap();
        assert!(!result.is_binding());
    }

    #[test]
    fn test_nothing_entered_is_incomplete() {
        let result = RatingEngine::new().evaluate(&rules(), &json!({})).unwrap();
        assert_eq!(result.state, CalculationState::Incomplete);
        assert!(result.price.is_none());
    }

    #[test]
    fn test_complete_form_is_binding_with_loading() {
        let form = json!({ "driver": { "age": 21 }, "vehicle": { "value": "30000" } });
        let result = RatingEngine::new().evaluate(&rules(), &form).unwrap();

        assert!(result.is_binding());
        let price = result.price.unwrap();
        assert_eq!(price.base_premium.amount(), dec!(600));
        assert_eq!(price.total.amount(), dec!(660));
    }

    #[test]
    fn test_triggers_are_raised() {
        let form = json!({
            "driver": { "age": 40, "licensed": false },
            "vehicle": { "value": 200000 }
        });
        let result = RatingEngine::new().evaluate(&rules(), &form).unwrap();

        assert!(result.has_trigger(TriggerType::Review));
        assert!(result.has_trigger(TriggerType::Decline));
    }

    #[test]
    fn test_invalid_condition_is_rejected_at_load() {
        let json = r#"{
            "metadata": { "product_code": "X", "product_name": "X", "version": "1" },
            "base_premium": "1",
            "loadings": [{ "name": "bad", "field": "a", "condition": ">= lots", "percent": "1" }]
        }"#;
        assert!(matches!(
            RatingEngine::new().load_rules_from_str(json),
            Err(RatingError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_unknown_product() {
        let engine = RatingEngine::new();
        assert!(matches!(
            engine.calculate(ProductId::new(), &json!({})),
            Err(RatingError::UnknownProduct(_))
        ));
    }

    #[test]
    fn test_condition_parsing() {
        assert_eq!(Condition::parse(">= 5"), Some(Condition::GreaterEq(5.0)));
        assert_eq!(Condition::parse("<3"), Some(Condition::Less(3.0)));
        assert!(Condition::parse("[18..25)").unwrap().matches(&json!(18)));
        assert!(!Condition::parse("[18..25)").unwrap().matches(&json!(25)));
        assert!(Condition::parse("[18..25]").unwrap().matches(&json!(25)));
        assert!(Condition::parse("\"nsw\"").unwrap().matches(&json!("NSW")));
    }

    #[test]
    fn test_empty_strings_count_as_missing() {
        assert!(field_value(&json!({ "a": "" }), "a").is_none());
        assert!(field_value(&json!({ "a": { "b": 0 } }), "a.b").is_some());
    }
}
