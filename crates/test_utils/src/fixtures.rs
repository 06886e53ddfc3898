//! Pre-built Test Fixtures
//!
//! Consistent rating rules and form data for quote tests, plus
//! `fake`-generated people and organisations where the values do not matter.

use chrono::{DateTime, TimeZone, Utc};
use fake::faker::company::en::CompanyName;
use fake::faker::internet::en::SafeEmail;
use fake::faker::name::en::Name;
use fake::Fake;
use serde_json::{json, Value};
use uuid::Uuid;

use domain_party::PersonDetails;

/// Motor product: $500 base, 10% GST, 20% loading under 25,
/// referral at $150,000 vehicle value
pub const MOTOR_RULES: &str = r#"{
    "metadata": { "product_code": "MOTOR", "product_name": "Motor", "version": "1", "currency": "AUD" },
    "base_premium": "500",
    "rates": { "gst_percent": "10" },
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
}"#;

pub const TEST_PASSWORD: &str = "correct-horse-42";

/// Form data for [`MOTOR_RULES`]
pub struct FormFixtures;

impl FormFixtures {
    /// Complete, binding, no loading: total $550
    pub fn standard_driver() -> Value {
        Self::motor(40, 30_000)
    }

    /// Complete with the young driver loading: total $660
    pub fn young_driver() -> Value {
        Self::motor(21, 30_000)
    }

    /// Complete but raises the review trigger
    pub fn high_value_vehicle() -> Value {
        Self::motor(40, 200_000)
    }

    /// Raises the decline trigger
    pub fn unlicensed_driver() -> Value {
        json!({ "driver": { "age": 40, "licensed": false }, "vehicle": { "value": 30000 } })
    }

    /// Only the estimate field
    pub fn estimate_only() -> Value {
        json!({ "vehicle": { "value": 30000 } })
    }

    pub fn motor(age: u32, vehicle_value: u64) -> Value {
        json!({ "driver": { "age": age }, "vehicle": { "value": vehicle_value } })
    }
}

/// Fixed instants for date arithmetic
pub struct TemporalFixtures;

impl TemporalFixtures {
    pub fn inception() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 7, 1, 0, 0, 0).unwrap()
    }

    pub fn policy_expiry() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 7, 1, 0, 0, 0).unwrap()
    }

    pub fn mid_term() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
    }
}

/// Random person details with a unique email
pub fn fake_person() -> PersonDetails {
    let name: String = Name().fake();
    let company: String = CompanyName().fake();
    PersonDetails {
        company: Some(company),
        ..PersonDetails::named(name).with_email(unique_email())
    }
}

/// A random organisation name and an alias unique to this call
pub fn fake_organisation() -> (String, String) {
    let name: String = CompanyName().fake();
    let alias = format!("org-{}", &Uuid::new_v4().simple().to_string()[..12]);
    (name, alias)
}

/// A realistic email address that will not collide across tests
pub fn unique_email() -> String {
    let email: String = SafeEmail().fake();
    let (local, domain) = email.split_once('@').unwrap_or(("user", "example.com"));
    format!("{}.{}@{}", local, &Uuid::new_v4().simple().to_string()[..8], domain).to_lowercase()
}
