//! Property-Based Test Generators
//!
//! proptest strategies for quote form data, reference numbers and the
//! workflow enums.

use proptest::prelude::*;
use rust_decimal::Decimal;
use serde_json::{json, Value};

use core_kernel::{Currency, Money};
use domain_quote::{NumberKind, QuoteAction, QuoteState};
use infra_updater::DataSetKind;

pub fn currency_strategy() -> impl Strategy<Value = Currency> {
    prop_oneof![
        Just(Currency::AUD),
        Just(Currency::NZD),
        Just(Currency::USD),
        Just(Currency::GBP),
        Just(Currency::EUR),
        Just(Currency::SGD),
    ]
}

/// Non-negative amounts with cents
pub fn money_strategy() -> impl Strategy<Value = Money> {
    (0i64..100_000_000i64, currency_strategy()).prop_map(|(cents, currency)| Money::new(Decimal::new(cents, 2), currency))
}

pub fn quote_state_strategy() -> impl Strategy<Value = QuoteState> {
    prop_oneof![
        Just(QuoteState::Nascent),
        Just(QuoteState::Incomplete),
        Just(QuoteState::Review),
        Just(QuoteState::Endorsement),
        Just(QuoteState::Approved),
        Just(QuoteState::Declined),
        Just(QuoteState::Complete),
    ]
}

pub fn quote_action_strategy() -> impl Strategy<Value = QuoteAction> {
    prop::sample::select(QuoteAction::ALL.to_vec())
}

pub fn number_kind_strategy() -> impl Strategy<Value = NumberKind> {
    prop_oneof![
        Just(NumberKind::Policy),
        Just(NumberKind::Invoice),
        Just(NumberKind::CreditNote),
    ]
}

pub fn data_set_kind_strategy() -> impl Strategy<Value = DataSetKind> {
    prop_oneof![
        Just(DataSetKind::Gnaf),
        Just(DataSetKind::RedBook),
        Just(DataSetKind::GlassGuide),
    ]
}

/// Pool numbers such as `POL-000123`
pub fn reference_number_strategy() -> impl Strategy<Value = String> {
    ("[A-Z]{2,4}", 0u32..1_000_000u32).prop_map(|(prefix, n)| format!("{}-{:06}", prefix, n))
}

/// Distinct pool numbers
pub fn reference_numbers_strategy(max: usize) -> impl Strategy<Value = Vec<String>> {
    prop::collection::hash_set(reference_number_strategy(), 1..=max).prop_map(|set| set.into_iter().collect())
}

/// Motor form data, sometimes missing fields the rules require
pub fn motor_form_strategy() -> impl Strategy<Value = Value> {
    (
        prop::option::of(17u32..90u32),
        prop::option::of(1_000u64..300_000u64),
        prop::option::of(any::<bool>()),
    )
        .prop_map(|(age, value, licensed)| {
            let mut form = json!({ "driver": {}, "vehicle": {} });
            if let Some(age) = age {
                form["driver"]["age"] = json!(age);
            }
            if let Some(licensed) = licensed {
                form["driver"]["licensed"] = json!(licensed);
            }
            if let Some(value) = value {
                form["vehicle"]["value"] = json!(value);
            }
            form
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn reference_numbers_are_prefixed(number in reference_number_strategy()) {
            let (prefix, digits) = number.split_once('-').unwrap();
            prop_assert!(prefix.chars().all(|c| c.is_ascii_uppercase()));
            prop_assert_eq!(digits.len(), 6);
        }

        #[test]
        fn motor_forms_are_objects(form in motor_form_strategy()) {
            prop_assert!(form.is_object());
            prop_assert!(form["driver"].is_object());
        }

        #[test]
        fn money_is_never_negative(money in money_strategy()) {
            prop_assert!(!money.is_negative());
        }
    }
}
