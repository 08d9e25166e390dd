//! Serde helpers for flexible deserialization of backend payloads.

use std::fmt;

use serde::Deserializer;
use serde::de::{self, SeqAccess, Visitor};

/// Deserialize an effects list from either an array of strings or a single
/// comma-separated string. Older backend firmware sends the latter.
pub(crate) fn effects_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    struct EffectsVisitor;

    impl<'de> Visitor<'de> for EffectsVisitor {
        type Value = Vec<String>;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a list of strings or a comma-separated string")
        }

        fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
        where
            A: SeqAccess<'de>,
        {
            let mut effects = Vec::with_capacity(seq.size_hint().unwrap_or(0));
            while let Some(effect) = seq.next_element::<String>()? {
                effects.push(effect);
            }
            Ok(effects)
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(value
                .split(',')
                .map(str::trim)
                .filter(|effect| !effect.is_empty())
                .map(str::to_owned)
                .collect())
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Vec::new())
        }
    }

    deserializer.deserialize_any(EffectsVisitor)
}
