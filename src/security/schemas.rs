//! Reusable field schemas and the composite payload schemas built from them.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

use crate::security::validation::{ArrayRules, Field, Format, NumberRules, StringRules};

pub(crate) static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("static regex"));

pub(crate) static PHONE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\+?[1-9]\d{1,14}$").expect("static regex"));

static NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\p{L}\s'-]+$").expect("static regex"));

static SKU_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9-]{3,32}$").expect("static regex"));

pub const PASSWORD_MIN_CHARS: usize = 8;
pub const PASSWORD_MAX_CHARS: usize = 128;
pub const EMAIL_MAX_CHARS: usize = 254;
pub const NAME_MAX_CHARS: usize = 100;

const PAYMENT_METHODS: &[&str] = &["cash", "card", "gift_card", "loyalty_points"];
const LINE_ITEM_TYPES: &[&str] = &["service", "product", "gift_card"];
const MAX_MONEY: f64 = 1_000_000.0;

fn has_required_character_classes(s: &str) -> bool {
    s.chars().any(|c| c.is_ascii_uppercase())
        && s.chars().any(|c| c.is_ascii_lowercase())
        && s.chars().any(|c| c.is_ascii_digit())
        && s.chars().any(|c| !c.is_alphanumeric() && !c.is_whitespace())
}

/// 8–128 characters with upper, lower, digit and symbol.
pub fn password() -> Field {
    Field::string(StringRules {
        min_len: Some(PASSWORD_MIN_CHARS),
        max_len: Some(PASSWORD_MAX_CHARS),
        checks: vec![(
            has_required_character_classes,
            "Password must contain an uppercase letter, a lowercase letter, a number and a special character",
        )],
        ..Default::default()
    })
}

/// Trimmed, lowercased, at most 254 characters.
pub fn email() -> Field {
    Field::string(StringRules {
        max_len: Some(EMAIL_MAX_CHARS),
        format: Some(Format::Email),
        trim: true,
        lowercase: true,
        ..Default::default()
    })
}

/// E.164-like: optional `+`, no leading zero, up to 15 digits.
pub fn phone() -> Field {
    Field::string(StringRules {
        format: Some(Format::Phone),
        ..Default::default()
    })
}

/// Letters, spaces, hyphens and apostrophes, 1–100 characters.
pub fn name() -> Field {
    Field::string(StringRules {
        min_len: Some(1),
        max_len: Some(NAME_MAX_CHARS),
        patterns: vec![(
            NAME_RE.clone(),
            "Name can only contain letters, spaces, hyphens and apostrophes",
        )],
        ..Default::default()
    })
}

pub fn id() -> Field {
    Field::string(StringRules {
        format: Some(Format::Uuid),
        ..Default::default()
    })
}

pub fn timestamp() -> Field {
    Field::string(StringRules {
        format: Some(Format::DateTime),
        ..Default::default()
    })
}

pub fn text(min: usize, max: usize) -> Field {
    Field::string(StringRules {
        min_len: Some(min),
        max_len: Some(max),
        ..Default::default()
    })
}

pub fn money() -> Field {
    Field::number(NumberRules {
        min: Some(0.0),
        max: Some(MAX_MONEY),
        ..Default::default()
    })
}

fn passwords_match(input: &Map<String, Value>) -> bool {
    input.get("password") == input.get("confirmPassword")
}

pub fn user_registration() -> Field {
    Field::object(vec![
        ("email", email()),
        ("password", password()),
        ("confirmPassword", text(1, PASSWORD_MAX_CHARS)),
        ("firstName", name()),
        ("lastName", name()),
        ("phone", phone().optional()),
    ])
    .refine("confirmPassword", "Passwords do not match", passwords_match)
}

pub fn login() -> Field {
    Field::object(vec![
        ("email", email()),
        ("password", text(1, PASSWORD_MAX_CHARS)),
    ])
}

pub fn client_creation() -> Field {
    Field::object(vec![
        ("firstName", name()),
        ("lastName", name()),
        ("email", email().optional()),
        ("phone", phone().optional()),
        (
            "dateOfBirth",
            Field::string(StringRules {
                format: Some(Format::Date),
                ..Default::default()
            })
            .optional(),
        ),
        ("locationId", id()),
        ("notes", text(0, 1_000).optional()),
        ("marketingOptIn", Field::boolean().optional()),
    ])
}

pub fn appointment_creation() -> Field {
    Field::object(vec![
        ("clientId", id()),
        ("staffId", id()),
        ("locationId", id()),
        (
            "serviceIds",
            Field::array(
                id(),
                ArrayRules {
                    min_items: Some(1),
                    max_items: Some(10),
                },
            ),
        ),
        ("startTime", timestamp()),
        ("notes", text(0, 500).optional()),
    ])
}

pub fn service_creation() -> Field {
    Field::object(vec![
        ("name", text(1, 100)),
        ("description", text(0, 1_000).optional()),
        ("durationMinutes", Field::integer(Some(5), Some(480))),
        ("price", money()),
        ("category", text(1, 50)),
        ("isActive", Field::boolean().optional()),
    ])
}

pub fn product_creation() -> Field {
    Field::object(vec![
        ("name", text(1, 200)),
        (
            "sku",
            Field::string(StringRules {
                patterns: vec![(
                    SKU_RE.clone(),
                    "SKU must be 3-32 letters, digits or hyphens",
                )],
                ..Default::default()
            }),
        ),
        ("price", money()),
        ("costPrice", money().optional()),
        ("stockQuantity", Field::integer(Some(0), Some(1_000_000))),
        ("reorderLevel", Field::integer(Some(0), None).optional()),
        ("category", text(1, 50).optional()),
    ])
}

pub fn transaction_creation() -> Field {
    let line_item = Field::object(vec![
        ("itemType", Field::one_of(LINE_ITEM_TYPES)),
        ("itemId", id()),
        ("quantity", Field::integer(Some(1), Some(1_000))),
        ("unitPrice", money()),
    ]);

    Field::object(vec![
        ("clientId", id().optional()),
        ("locationId", id()),
        (
            "items",
            Field::array(
                line_item,
                ArrayRules {
                    min_items: Some(1),
                    max_items: Some(100),
                },
            ),
        ),
        ("paymentMethod", Field::one_of(PAYMENT_METHODS)),
        ("discount", money().optional()),
        ("tip", money().optional()),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::validation::validate;
    use serde_json::json;

    #[test]
    fn test_registration_bad_payload_reports_all_fields() {
        let errors = validate(
            &user_registration(),
            json!({
                "email": "BAD",
                "password": "short",
                "confirmPassword": "short2",
                "firstName": "Ana",
                "lastName": "Silva",
            }),
        )
        .unwrap_err();

        assert!(errors.contains(&"email: Invalid email address".to_string()));
        assert!(errors.contains(&"password: String must contain at least 8 character(s)".to_string()));
        assert!(errors.contains(&"confirmPassword: Passwords do not match".to_string()));
    }

    #[test]
    fn test_registration_normalizes_email() {
        let out = validate(
            &user_registration(),
            json!({
                "email": "  Ana.Silva@Salon.TEST ",
                "password": "Str0ng!pass",
                "confirmPassword": "Str0ng!pass",
                "firstName": "Ana",
                "lastName": "O'Neil-Silva",
                "phone": "+351912345678",
            }),
        )
        .unwrap();
        assert_eq!(out["email"], "ana.silva@salon.test");
        assert_eq!(out["lastName"], "O'Neil-Silva");
    }

    #[test]
    fn test_three_independent_violations() {
        let errors = validate(
            &login(),
            json!({"email": "nobody", "password": ""}),
        )
        .unwrap_err();
        assert_eq!(errors.len(), 2);

        let errors = validate(
            &service_creation(),
            json!({
                "name": "Balayage",
                "durationMinutes": 2,
                "price": -5,
                "category": "",
            }),
        )
        .unwrap_err();
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn test_password_rules() {
        let schema = Field::object(vec![("password", password())]);
        assert!(validate(&schema, json!({"password": "Abcdef1!"})).is_ok());
        let errors = validate(&schema, json!({"password": "abcdefgh"})).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("password: Password must contain"));
        let long = format!("Aa1!{}", "x".repeat(PASSWORD_MAX_CHARS));
        assert_eq!(validate(&schema, json!({"password": long})).unwrap_err().len(), 1);
    }

    #[test]
    fn test_name_and_phone() {
        let schema = Field::object(vec![("n", name()), ("p", phone())]);
        assert!(validate(&schema, json!({"n": "José María", "p": "+14155552671"})).is_ok());
        let errors = validate(&schema, json!({"n": "R2-D2", "p": "0123"})).unwrap_err();
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn test_transaction_items() {
        let ok = json!({
            "locationId": "67e55044-10b1-426f-9247-bb680e5fe0c8",
            "items": [{
                "itemType": "service",
                "itemId": "5b9f0b7e-3c1e-4f0a-9d8e-2a7c6b5d4e3f",
                "quantity": 1,
                "unitPrice": 45.0,
            }],
            "paymentMethod": "card",
        });
        assert!(validate(&transaction_creation(), ok).is_ok());

        let bad = json!({
            "locationId": "67e55044-10b1-426f-9247-bb680e5fe0c8",
            "items": [{
                "itemType": "voucher",
                "itemId": "5b9f0b7e-3c1e-4f0a-9d8e-2a7c6b5d4e3f",
                "quantity": 0,
                "unitPrice": 45.0,
            }],
            "paymentMethod": "card",
        });
        let errors = validate(&transaction_creation(), bad).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(errors[0].starts_with("items.0.itemType: Invalid enum value"));
        assert_eq!(errors[1], "items.0.quantity: Number must be greater than or equal to 1");
    }

    #[test]
    fn test_product_and_appointment() {
        let product = json!({
            "name": "Argan Oil",
            "sku": "ARG-100",
            "price": 24.99,
            "stockQuantity": 12,
        });
        assert!(validate(&product_creation(), product).is_ok());

        let appointment = json!({
            "clientId": "67e55044-10b1-426f-9247-bb680e5fe0c8",
            "staffId": "5b9f0b7e-3c1e-4f0a-9d8e-2a7c6b5d4e3f",
            "locationId": "0f8fad5b-d9cb-469f-a165-70867728950e",
            "serviceIds": [],
            "startTime": "2026-11-02T09:00:00+00:00",
        });
        assert_eq!(
            validate(&appointment_creation(), appointment).unwrap_err(),
            vec!["serviceIds: Array must contain at least 1 element(s)"]
        );

        let client = json!({
            "firstName": "Ana",
            "lastName": "Silva",
            "locationId": "0f8fad5b-d9cb-469f-a165-70867728950e",
            "dateOfBirth": "1990-02-30",
        });
        assert_eq!(
            validate(&client_creation(), client).unwrap_err(),
            vec!["dateOfBirth: Invalid date, expected YYYY-MM-DD"]
        );
    }
}
