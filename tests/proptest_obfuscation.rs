use proptest::prelude::*;
use sqlcommand::util::{decode, encode, NULL_MARKER, PREFIX};
use sqlcommand::{CommandFactory, Expectation, ExpectationRegistry, Outcome, Value};
use std::sync::Arc;

proptest! {
    /// Property: decoding an encoding gives back the original text
    #[test]
    fn prop_round_trip(text in ".*") {
        let encoded = encode(Some(&text));
        prop_assert_eq!(decode(Some(&encoded)).unwrap(), Some(text));
    }

    /// Property: encodings are the prefix plus lowercase hex, never the null marker
    #[test]
    fn prop_encoding_shape(text in ".*") {
        let encoded = encode(Some(&text));
        prop_assert!(encoded.starts_with(PREFIX));
        prop_assert_ne!(encoded.as_str(), NULL_MARKER);
        let digits = &encoded[PREFIX.len_utf8()..];
        prop_assert_eq!(digits.len(), text.len() * 2);
        prop_assert!(digits.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    }

    /// Property: text without the prefix never decodes
    #[test]
    fn prop_missing_prefix_rejected(text in "[0-9a-f]{0,40}") {
        let err = decode(Some(&text)).unwrap_err();
        prop_assert_eq!(err.error_code(), "MALFORMED_ENCODED_TEXT");
    }

    /// Property: scripted results come back in insertion order
    #[test]
    fn prop_scripted_results_in_order(values in prop::collection::vec(any::<i64>(), 1..20)) {
        let registry = Arc::new(ExpectationRegistry::new());
        for value in &values {
            registry.push(Expectation::returning(Outcome::Scalar(Value::Integer(*value))));
        }
        let factory = CommandFactory::with_registry(Arc::clone(&registry));
        let mut command = factory.create_command_with_text("SELECT @x");

        let returned: Vec<i64> = (0..values.len())
            .map(|_| command.execute_scalar().unwrap().as_i64().unwrap())
            .collect();
        prop_assert_eq!(returned, values.clone());
        prop_assert_eq!(
            command.execute_scalar().unwrap_err().error_code(),
            "REGISTRY_EXHAUSTED"
        );
    }
}

#[test]
fn test_null_sentinel() {
    assert_eq!(encode(None), NULL_MARKER);
    assert_eq!(decode(Some(NULL_MARKER)).unwrap(), None);
    assert_eq!(decode(None).unwrap_err().error_code(), "NULL_ARGUMENT");
}

#[test]
fn test_empty_and_non_ascii() {
    assert_eq!(encode(Some("")), PREFIX.to_string());
    assert_eq!(decode(Some(&PREFIX.to_string())).unwrap(), Some(String::new()));
    assert_eq!(decode(Some(&encode(Some("héllo ✓")))).unwrap().as_deref(), Some("héllo ✓"));
}
