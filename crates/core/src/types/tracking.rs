//! Provider-issued identifiers.
//!
//! Providers are inconsistent about identifier formatting: the same order id
//! arrives as a number in one response and as a padded string in the next.
//! Every identifier is normalized (trim + stringify) on the way in so lookups
//! compare like with like.

/// Defines a trimmed, non-empty string identifier.
macro_rules! define_key {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug,
            Clone,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            ::serde::Serialize,
            ::serde::Deserialize
        )]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Normalize a raw identifier. Returns `None` for blank input.
            #[must_use]
            pub fn parse(raw: &str) -> Option<Self> {
                let trimmed = raw.trim();
                (!trimmed.is_empty()).then(|| Self(trimmed.to_string()))
            }

            /// Normalize a JSON scalar (string or number).
            #[must_use]
            pub fn from_json(value: &serde_json::Value) -> Option<Self> {
                match value {
                    serde_json::Value::String(s) => Self::parse(s),
                    serde_json::Value::Number(n) => Self::parse(&n.to_string()),
                    _ => None,
                }
            }

            /// The identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_key!(
    /// A provider-issued key used to look an order up independently of its
    /// internal remote id.
    TrackingKey
);

define_key!(
    /// The provider's internal id for an order.
    RemoteOrderId
);

impl TrackingKey {
    /// Whether this key is textually identical to a remote id.
    ///
    /// A tracking key equal to the order's own remote id is a known
    /// corruption pattern left behind by older hand-off code.
    #[must_use]
    pub fn mirrors(&self, remote_id: &RemoteOrderId) -> bool {
        self.0 == remote_id.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_trims() {
        assert_eq!(
            TrackingKey::parse("  RY-1001 ").map(|k| k.as_str().to_string()),
            Some("RY-1001".to_string())
        );
    }

    #[test]
    fn test_parse_rejects_blank() {
        assert_eq!(TrackingKey::parse("   "), None);
        assert_eq!(RemoteOrderId::parse(""), None);
    }

    #[test]
    fn test_from_json_stringifies_numbers() {
        let id = RemoteOrderId::from_json(&serde_json::json!(99812));
        assert_eq!(id, RemoteOrderId::parse("99812"));
        assert_eq!(TrackingKey::from_json(&serde_json::Value::Null), None);
        assert_eq!(TrackingKey::from_json(&serde_json::json!(true)), None);
    }

    #[test]
    fn test_mirrors_remote_id() {
        let key = TrackingKey::parse("5512").expect("key");
        assert!(key.mirrors(&RemoteOrderId::parse(" 5512").expect("id")));
        assert!(!key.mirrors(&RemoteOrderId::parse("5513").expect("id")));
    }
}
