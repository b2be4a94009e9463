// SPDX-License-Identifier: MIT OR Apache-2.0
//! one-microdata
//!
//! The recipe-driven codec between typed objects and their canonical
//! microdata form — the single line of HTML-like markup whose SHA-256 is
//! the object's identity.
//!
//! The encoder and decoder are exact mirrors: `decode(encode(o)) == o`, and
//! re-encoding a decoded string reproduces it byte for byte, so hashes
//! survive a round trip. The decoder is strict: whitespace drift, attribute
//! drift, or rule-order drift all fail.

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Strict microdata → object parsing.
pub mod decode;
/// Object → microdata rendering.
pub mod encode;

pub use decode::from_microdata;
pub use encode::{to_id_microdata, to_microdata};

use one_core::{Hash, Obj};
use one_error::Result;
use one_recipes::RecipeRegistry;

/// The itemtype namespace every stored type lives under.
pub const ITEMTYPE_PREFIX: &str = "//refin.io/";

/// Compute an object's content hash: `SHA-256(microdata(obj))`.
///
/// # Errors
///
/// Any recipe violation the encoder reports.
pub fn content_hash(obj: &Obj, registry: &RecipeRegistry) -> Result<Hash> {
    Ok(Hash::digest(to_microdata(obj, registry)?.as_bytes()))
}

/// Compute an object's ID hash: `SHA-256(id_microdata(obj))`.
///
/// Only the recipe's ID rules participate, and the outer frame carries the
/// `data-id-object` marker, so an ID hash never equals a content hash.
///
/// # Errors
///
/// Any recipe violation the encoder reports, including `O2M-RTYC5` for a
/// type without ID rules.
pub fn id_hash(obj: &Obj, registry: &RecipeRegistry) -> Result<Hash> {
    Ok(Hash::digest(to_id_microdata(obj, registry)?.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use one_core::{RefLink, Value};
    use one_recipes::{Recipe, RecipeRule, RecipeRegistry, ValueType};

    fn registry() -> RecipeRegistry {
        let mut reg = RecipeRegistry::new();
        reg.register(Recipe::new(
            "Email",
            vec![
                RecipeRule::new("messageID", ValueType::string()).id(),
                RecipeRule::new("date", ValueType::Integer).id(),
                RecipeRule::new("subject", ValueType::string()),
            ],
        ))
        .unwrap();
        reg.register(Recipe::new(
            "Keyring",
            vec![
                RecipeRule::new("owner", ValueType::ReferenceToId),
                RecipeRule::new("keys", ValueType::Array(Box::new(ValueType::ReferenceToBlob))),
            ],
        ))
        .unwrap();
        reg
    }

    #[test]
    fn content_and_id_hash_differ() {
        let obj = Obj::new("Email")
            .with("messageID", "m@example")
            .with("date", 1_700_000_000_000i64)
            .with("subject", "Subject line");
        let reg = registry();
        let content = content_hash(&obj, &reg).unwrap();
        let id = id_hash(&obj, &reg).unwrap();
        assert_ne!(content, id);
    }

    #[test]
    fn id_hash_is_digest_of_id_microdata() {
        let obj = Obj::new("Email")
            .with("messageID", "m@example")
            .with("date", 5i64)
            .with("subject", "s");
        let reg = registry();
        let micro = to_id_microdata(&obj, &reg).unwrap();
        assert_eq!(id_hash(&obj, &reg).unwrap(), Hash::digest(micro.as_bytes()));
    }

    #[test]
    fn codec_roundtrip_preserves_hash() {
        let target = Hash::digest(b"blob-bytes");
        let owner = Hash::digest(b"owner-id");
        let obj = Obj::new("Keyring").with("owner", RefLink::id(owner)).with(
            "keys",
            Value::List(vec![Value::Reference(RefLink::blob(target))]),
        );
        let reg = registry();
        let micro = to_microdata(&obj, &reg).unwrap();
        let decoded = from_microdata(&micro, &reg).unwrap();
        assert_eq!(decoded, obj);
        let re = to_microdata(&decoded, &reg).unwrap();
        assert_eq!(Hash::digest(re.as_bytes()), Hash::digest(micro.as_bytes()));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn arbitrary_strings_and_integers_roundtrip(
                message_id in ".{0,64}",
                date in any::<i64>(),
                subject in ".{0,64}",
            ) {
                let reg = registry();
                let obj = Obj::new("Email")
                    .with("messageID", message_id)
                    .with("date", date)
                    .with("subject", subject);
                let micro = to_microdata(&obj, &reg).unwrap();
                let decoded = from_microdata(&micro, &reg).unwrap();
                prop_assert_eq!(decoded, obj);
            }
        }
    }
}
