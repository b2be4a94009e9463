// SPDX-License-Identifier: MIT OR Apache-2.0
//! Strict microdata → object parsing.
//!
//! The decoder accepts exactly the bytes the encoder produces. It is driven
//! by the same recipe the encoder used, so it knows which element to expect
//! next; any deviation — extra whitespace, attribute drift, out-of-order
//! rules, unsorted container children — fails with a parse error.

use crate::ITEMTYPE_PREFIX;
use one_core::{Hash, Obj, RefKind, Value, canonical_number, canonical_string};
use one_error::{ErrorKind, OneError, Result, codes};
use one_recipes::{RecipeRegistry, RecipeRule, ValueType};

/// Parse a canonical microdata line back into an [`Obj`].
///
/// Works for both content and ID microdata; the `data-id-object` marker is
/// consumed and the returned object simply carries the ID projection.
///
/// # Errors
///
/// `M2O-PARSE1` for any deviation from the canonical shape, `M2O-PARSE2`
/// when well-formed content violates the recipe, `OR-UNKN1` for an
/// unregistered type.
pub fn from_microdata(input: &str, registry: &RecipeRegistry) -> Result<Obj> {
    let mut parser = Parser { input, pos: 0 };
    let obj = parser.parse_object(registry)?;
    if parser.pos != parser.input.len() {
        return Err(parser.parse_error("trailing bytes after closing tag"));
    }
    Ok(obj)
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn peek_is(&self, lit: &str) -> bool {
        self.rest().starts_with(lit)
    }

    fn eat(&mut self, lit: &str) -> Result<()> {
        if self.peek_is(lit) {
            self.pos += lit.len();
            Ok(())
        } else {
            Err(self.parse_error(&format!("expected {lit:?}")))
        }
    }

    fn try_eat(&mut self, lit: &str) -> bool {
        if self.peek_is(lit) {
            self.pos += lit.len();
            true
        } else {
            false
        }
    }

    /// Consume up to (not including) the first occurrence of `stop`.
    fn take_until(&mut self, stop: &str) -> Result<&'a str> {
        match self.rest().find(stop) {
            Some(idx) => {
                let taken = &self.rest()[..idx];
                self.pos += idx;
                Ok(taken)
            }
            None => Err(self.parse_error(&format!("missing {stop:?}"))),
        }
    }

    fn parse_error(&self, msg: &str) -> OneError {
        OneError::new(
            ErrorKind::Parse,
            codes::M2O_PARSE1,
            format!("{msg} at byte {}", self.pos),
        )
    }

    fn recipe_error(&self, msg: &str) -> OneError {
        OneError::new(
            ErrorKind::Parse,
            codes::M2O_PARSE2,
            format!("{msg} at byte {}", self.pos),
        )
    }

    fn parse_object(&mut self, registry: &RecipeRegistry) -> Result<Obj> {
        self.eat("<div")?;
        let id_object = self.try_eat(" data-id-object=\"true\"");
        self.eat(" itemscope itemtype=\"")?;
        self.eat(ITEMTYPE_PREFIX)?;
        let type_name = self.take_until("\"")?;
        if type_name.is_empty()
            || !type_name
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'$')
        {
            return Err(self.parse_error("invalid type name"));
        }
        self.eat("\">")?;

        let recipe = registry.get(type_name)?;
        let mut obj = Obj::new(type_name);
        for rule in &recipe.rules {
            let rule = registry.resolve_rule_inheritance(rule)?;
            if id_object && !rule.is_id {
                continue;
            }
            let opening = opening_prefix(&rule);
            if !self.peek_is(&opening) {
                let required = id_object || !rule.optional;
                if required {
                    return Err(
                        self.recipe_error(&format!("missing required itemprop {:?}", rule.item_prop))
                    );
                }
                continue;
            }
            let value = self.parse_rule_value(&rule, registry)?;
            obj.set(rule.item_prop.clone(), value);
        }
        self.eat("</div>")?;
        Ok(obj)
    }

    /// Parse a top-level rule value (element carries `itemprop`).
    fn parse_rule_value(&mut self, rule: &RecipeRule, registry: &RecipeRegistry) -> Result<Value> {
        let prop = &rule.item_prop;
        match &rule.value_type {
            ValueType::String { .. }
            | ValueType::Integer
            | ValueType::Number
            | ValueType::Boolean
            | ValueType::Stringifiable => {
                self.eat(&format!("<span itemprop=\"{prop}\">"))?;
                let text = self.take_until("</span>")?;
                let value = self.scalar_value(text, &rule.value_type, prop)?;
                self.eat("</span>")?;
                Ok(value)
            }
            ValueType::ReferenceToObj
            | ValueType::ReferenceToId
            | ValueType::ReferenceToClob
            | ValueType::ReferenceToBlob => {
                self.eat(&format!("<a itemprop=\"{prop}\" data-type=\""))?;
                self.parse_reference_tail(&rule.value_type, prop)
            }
            ValueType::Array(inner) => {
                self.eat(&format!("<ol itemprop=\"{prop}\">"))?;
                let items = self.parse_list_items(inner, registry, Sorted::No)?;
                self.eat("</ol>")?;
                Ok(Value::List(items))
            }
            ValueType::Bag(inner) => {
                self.eat(&format!("<ul itemprop=\"{prop}\">"))?;
                let items = self.parse_list_items(inner, registry, Sorted::NonDecreasing)?;
                self.eat("</ul>")?;
                Ok(Value::Bag(items))
            }
            ValueType::Set(inner) => {
                self.eat(&format!("<ul itemprop=\"{prop}\">"))?;
                let items = self.parse_list_items(inner, registry, Sorted::StrictlyIncreasing)?;
                self.eat("</ul>")?;
                Ok(Value::Set(items))
            }
            ValueType::Map(key_type, val_type) => {
                self.eat(&format!("<dl itemprop=\"{prop}\">"))?;
                let entries = self.parse_map_entries(key_type, val_type, registry)?;
                self.eat("</dl>")?;
                Ok(Value::Map(entries))
            }
            ValueType::Object(rules) => {
                self.eat(&format!("<div itemprop=\"{prop}\">"))?;
                let fields = self.parse_record_fields(rules, registry)?;
                self.eat("</div>")?;
                Ok(Value::Record(fields))
            }
        }
    }

    /// Parse a nested value (no `itemprop` attributes).
    fn parse_nested_value(
        &mut self,
        value_type: &ValueType,
        registry: &RecipeRegistry,
    ) -> Result<Value> {
        match value_type {
            ValueType::String { .. }
            | ValueType::Integer
            | ValueType::Number
            | ValueType::Boolean
            | ValueType::Stringifiable => {
                let text = self.take_until("<")?;
                self.scalar_value(text, value_type, "")
            }
            ValueType::ReferenceToObj
            | ValueType::ReferenceToId
            | ValueType::ReferenceToClob
            | ValueType::ReferenceToBlob => {
                self.eat("<a data-type=\"")?;
                self.parse_reference_tail(value_type, "")
            }
            ValueType::Array(inner) => {
                self.eat("<ol>")?;
                let items = self.parse_list_items(inner, registry, Sorted::No)?;
                self.eat("</ol>")?;
                Ok(Value::List(items))
            }
            ValueType::Bag(inner) => {
                self.eat("<ul>")?;
                let items = self.parse_list_items(inner, registry, Sorted::NonDecreasing)?;
                self.eat("</ul>")?;
                Ok(Value::Bag(items))
            }
            ValueType::Set(inner) => {
                self.eat("<ul>")?;
                let items = self.parse_list_items(inner, registry, Sorted::StrictlyIncreasing)?;
                self.eat("</ul>")?;
                Ok(Value::Set(items))
            }
            ValueType::Map(key_type, val_type) => {
                self.eat("<dl>")?;
                let entries = self.parse_map_entries(key_type, val_type, registry)?;
                self.eat("</dl>")?;
                Ok(Value::Map(entries))
            }
            ValueType::Object(rules) => {
                self.eat("<div>")?;
                let fields = self.parse_record_fields(rules, registry)?;
                self.eat("</div>")?;
                Ok(Value::Record(fields))
            }
        }
    }

    fn parse_reference_tail(&mut self, value_type: &ValueType, prop: &str) -> Result<Value> {
        let expected = match value_type {
            ValueType::ReferenceToObj => RefKind::Object,
            ValueType::ReferenceToId => RefKind::Id,
            ValueType::ReferenceToClob => RefKind::Clob,
            ValueType::ReferenceToBlob => RefKind::Blob,
            _ => return Err(self.parse_error("not a reference type")),
        };
        let data_type = self.take_until("\"")?;
        let kind = RefKind::from_data_type(data_type)
            .ok_or_else(|| self.parse_error("unknown data-type"))?;
        if kind != expected {
            return Err(self.recipe_error(&format!(
                "reference itemprop {prop:?} has data-type {data_type:?}, expected {:?}",
                expected.data_type()
            )));
        }
        self.eat("\">")?;
        let hash_text = self.take_until("</a>")?;
        if !Hash::is_hash_string(hash_text) {
            return Err(self.parse_error("reference is not a 64-char lowercase hex hash"));
        }
        let hash: Hash = hash_text.parse()?;
        self.eat("</a>")?;
        Ok(Value::Reference(one_core::RefLink { kind, hash }))
    }

    fn parse_list_items(
        &mut self,
        inner: &ValueType,
        registry: &RecipeRegistry,
        sorted: Sorted,
    ) -> Result<Vec<Value>> {
        let mut items = Vec::new();
        let mut chunks: Vec<&'a str> = Vec::new();
        while self.peek_is("<li>") {
            let start = self.pos;
            self.eat("<li>")?;
            items.push(self.parse_nested_value(inner, registry)?);
            self.eat("</li>")?;
            chunks.push(&self.input[start..self.pos]);
        }
        match sorted {
            Sorted::No => {}
            Sorted::NonDecreasing => {
                if chunks.windows(2).any(|w| w[0] > w[1]) {
                    return Err(self.parse_error("bag children are not canonically sorted"));
                }
            }
            Sorted::StrictlyIncreasing => {
                if chunks.windows(2).any(|w| w[0] >= w[1]) {
                    return Err(self.parse_error("set children are not sorted and unique"));
                }
            }
        }
        Ok(items)
    }

    fn parse_map_entries(
        &mut self,
        key_type: &ValueType,
        val_type: &ValueType,
        registry: &RecipeRegistry,
    ) -> Result<Vec<(Value, Value)>> {
        let mut entries = Vec::new();
        let mut prev_key: Option<String> = None;
        while self.peek_is("<dt>") {
            self.eat("<dt>")?;
            let key = self.parse_nested_value(key_type, registry)?;
            self.eat("</dt>")?;
            self.eat("<dd>")?;
            let value = self.parse_nested_value(val_type, registry)?;
            self.eat("</dd>")?;
            let canonical_key = canonical_string(&key)?;
            if prev_key.as_ref().is_some_and(|prev| prev >= &canonical_key) {
                return Err(self.parse_error("map entries are not sorted by key"));
            }
            prev_key = Some(canonical_key);
            entries.push((key, value));
        }
        Ok(entries)
    }

    fn parse_record_fields(
        &mut self,
        rules: &[RecipeRule],
        registry: &RecipeRegistry,
    ) -> Result<Vec<(String, Value)>> {
        let mut fields = Vec::new();
        for rule in rules {
            let rule = registry.resolve_rule_inheritance(rule)?;
            let opening = opening_prefix(&rule);
            if !self.peek_is(&opening) {
                if !rule.optional {
                    return Err(
                        self.recipe_error(&format!("missing required itemprop {:?}", rule.item_prop))
                    );
                }
                continue;
            }
            let value = self.parse_rule_value(&rule, registry)?;
            fields.push((rule.item_prop.clone(), value));
        }
        Ok(fields)
    }

    fn scalar_value(&self, text: &str, value_type: &ValueType, prop: &str) -> Result<Value> {
        match value_type {
            ValueType::String { regexp } => {
                let s = unescape(text).ok_or_else(|| self.parse_error("invalid escape in string"))?;
                if let Some(pattern) = regexp {
                    let re = regex::Regex::new(pattern)
                        .map_err(|_| self.recipe_error("invalid regexp in recipe"))?;
                    if !re.is_match(&s) {
                        return Err(self.recipe_error(&format!(
                            "string for itemprop {prop:?} does not match {pattern:?}"
                        )));
                    }
                }
                Ok(Value::String(s))
            }
            ValueType::Integer => {
                let n: i64 = text
                    .parse()
                    .map_err(|_| self.parse_error("invalid integer"))?;
                if n.to_string() != text {
                    return Err(self.parse_error("integer is not in canonical form"));
                }
                Ok(Value::Integer(n))
            }
            ValueType::Number => {
                let n: f64 = text.parse().map_err(|_| self.parse_error("invalid number"))?;
                let canonical = canonical_number(n)
                    .map_err(|_| self.parse_error("number is not in canonical form"))?;
                if canonical != text {
                    return Err(self.parse_error("number is not in canonical form"));
                }
                Ok(Value::Number(n))
            }
            ValueType::Boolean => match text {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                _ => Err(self.parse_error("invalid boolean")),
            },
            ValueType::Stringifiable => {
                let s = unescape(text).ok_or_else(|| self.parse_error("invalid escape"))?;
                let json: serde_json::Value = serde_json::from_str(&s)
                    .map_err(|_| self.parse_error("stringifiable value is not canonical JSON"))?;
                Ok(json_to_value(json))
            }
            _ => Err(self.parse_error("not a scalar type")),
        }
    }
}

#[derive(Clone, Copy)]
enum Sorted {
    No,
    NonDecreasing,
    StrictlyIncreasing,
}

/// The exact opening bytes a rule's element starts with, used both for
/// optional-rule lookahead and for strict matching.
fn opening_prefix(rule: &RecipeRule) -> String {
    let prop = &rule.item_prop;
    match &rule.value_type {
        ValueType::String { .. }
        | ValueType::Integer
        | ValueType::Number
        | ValueType::Boolean
        | ValueType::Stringifiable => format!("<span itemprop=\"{prop}\">"),
        ValueType::ReferenceToObj
        | ValueType::ReferenceToId
        | ValueType::ReferenceToClob
        | ValueType::ReferenceToBlob => format!("<a itemprop=\"{prop}\" data-type=\""),
        ValueType::Array(_) => format!("<ol itemprop=\"{prop}\">"),
        ValueType::Bag(_) | ValueType::Set(_) => format!("<ul itemprop=\"{prop}\">"),
        ValueType::Map(_, _) => format!("<dl itemprop=\"{prop}\">"),
        ValueType::Object(_) => format!("<div itemprop=\"{prop}\">"),
    }
}

/// Reverse [`super::encode::escape`]. Returns `None` for raw `<`/`>` or an
/// `&` that does not start one of the three entities.
fn unescape(text: &str) -> Option<String> {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(idx) = rest.find(['&', '<', '>']) {
        out.push_str(&rest[..idx]);
        rest = &rest[idx..];
        if let Some(tail) = rest.strip_prefix("&amp;") {
            out.push('&');
            rest = tail;
        } else if let Some(tail) = rest.strip_prefix("&lt;") {
            out.push('<');
            rest = tail;
        } else if let Some(tail) = rest.strip_prefix("&gt;") {
            out.push('>');
            rest = tail;
        } else {
            return None;
        }
    }
    out.push_str(rest);
    Some(out)
}

fn json_to_value(json: serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Integer(i)
            } else {
                Value::Number(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        serde_json::Value::String(s) => Value::String(s),
        serde_json::Value::Array(items) => Value::List(items.into_iter().map(json_to_value).collect()),
        serde_json::Value::Object(map) => Value::Record(
            map.into_iter().map(|(k, v)| (k, json_to_value(v))).collect(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode::{to_id_microdata, to_microdata};
    use one_core::RefLink;
    use one_recipes::Recipe;

    fn registry() -> RecipeRegistry {
        let mut reg = RecipeRegistry::new();
        reg.register(Recipe::new(
            "Email",
            vec![
                RecipeRule::new("messageID", ValueType::string()).id(),
                RecipeRule::new("date", ValueType::Integer).id(),
                RecipeRule::new("subject", ValueType::string()).optional(),
                RecipeRule::new("flags", ValueType::Set(Box::new(ValueType::string()))).optional(),
                RecipeRule::new("attachment", ValueType::ReferenceToBlob).optional(),
                RecipeRule::new(
                    "headers",
                    ValueType::Map(Box::new(ValueType::string()), Box::new(ValueType::string())),
                )
                .optional(),
                RecipeRule::new(
                    "envelope",
                    ValueType::Object(vec![
                        RecipeRule::new("from", ValueType::string()),
                        RecipeRule::new("prio", ValueType::Integer).optional(),
                    ]),
                )
                .optional(),
                RecipeRule::new("meta", ValueType::Stringifiable).optional(),
            ],
        ))
        .unwrap();
        reg
    }

    fn full_email() -> Obj {
        Obj::new("Email")
            .with("messageID", "id-1 <tag> & more")
            .with("date", 1_700_000_000_000i64)
            .with("subject", "Hello")
            .with(
                "flags",
                Value::Set(vec![Value::from("seen"), Value::from("answered")]),
            )
            .with("attachment", RefLink::blob(Hash::digest(b"att")))
            .with(
                "headers",
                Value::Map(vec![
                    (Value::from("x-b"), Value::from("2")),
                    (Value::from("x-a"), Value::from("1")),
                ]),
            )
            .with(
                "envelope",
                Value::Record(vec![
                    ("from".into(), Value::from("a@b")),
                    ("prio".into(), Value::Integer(3)),
                ]),
            )
            .with(
                "meta",
                Value::Record(vec![("depth".into(), Value::Number(1.5))]),
            )
    }

    #[test]
    fn roundtrip_full_object() {
        let reg = registry();
        let obj = full_email();
        let micro = to_microdata(&obj, &reg).unwrap();
        let decoded = from_microdata(&micro, &reg).unwrap();
        // Set/Map values come back in canonical order; compare re-encodings.
        assert_eq!(to_microdata(&decoded, &reg).unwrap(), micro);
        assert_eq!(decoded.type_name(), "Email");
        assert_eq!(decoded.get("subject"), Some(&Value::String("Hello".into())));
        assert_eq!(
            decoded.get("messageID"),
            Some(&Value::String("id-1 <tag> & more".into()))
        );
    }

    #[test]
    fn roundtrip_id_microdata() {
        let reg = registry();
        let obj = full_email();
        let micro = to_id_microdata(&obj, &reg).unwrap();
        let decoded = from_microdata(&micro, &reg).unwrap();
        assert_eq!(decoded.get("messageID"), obj.get("messageID"));
        assert_eq!(decoded.get("date"), obj.get("date"));
        assert!(decoded.get("subject").is_none());
        assert_eq!(to_id_microdata(&decoded, &reg).unwrap(), micro);
    }

    #[test]
    fn rejects_whitespace_drift() {
        let reg = registry();
        let obj = Obj::new("Email").with("messageID", "m").with("date", 1i64);
        let micro = to_microdata(&obj, &reg).unwrap();
        let drifted = micro.replace("<div ", "<div  ");
        assert!(from_microdata(&drifted, &reg).is_err());
    }

    #[test]
    fn rejects_trailing_bytes() {
        let reg = registry();
        let obj = Obj::new("Email").with("messageID", "m").with("date", 1i64);
        let micro = to_microdata(&obj, &reg).unwrap();
        let err = from_microdata(&format!("{micro} "), &reg).unwrap_err();
        assert_eq!(err.code(), "M2O-PARSE1");
    }

    #[test]
    fn rejects_rule_order_drift() {
        let reg = registry();
        // date before messageID is not canonical order.
        let drifted = "<div itemscope itemtype=\"//refin.io/Email\">\
                       <span itemprop=\"date\">1</span>\
                       <span itemprop=\"messageID\">m</span></div>";
        assert!(from_microdata(drifted, &reg).is_err());
    }

    #[test]
    fn rejects_unsorted_set_children() {
        let reg = registry();
        let micro = "<div itemscope itemtype=\"//refin.io/Email\">\
                     <span itemprop=\"messageID\">m</span>\
                     <span itemprop=\"date\">1</span>\
                     <ul itemprop=\"flags\"><li>b</li><li>a</li></ul></div>";
        let err = from_microdata(micro, &reg).unwrap_err();
        assert_eq!(err.code(), "M2O-PARSE1");
    }

    #[test]
    fn rejects_wrong_reference_data_type() {
        let reg = registry();
        let h = Hash::digest(b"x");
        let micro = format!(
            "<div itemscope itemtype=\"//refin.io/Email\">\
             <span itemprop=\"messageID\">m</span>\
             <span itemprop=\"date\">1</span>\
             <a itemprop=\"attachment\" data-type=\"obj\">{h}</a></div>"
        );
        let err = from_microdata(&micro, &reg).unwrap_err();
        assert_eq!(err.code(), "M2O-PARSE2");
    }

    #[test]
    fn rejects_bad_hash_in_reference() {
        let reg = registry();
        let micro = format!(
            "<div itemscope itemtype=\"//refin.io/Email\">\
             <span itemprop=\"messageID\">m</span>\
             <span itemprop=\"date\">1</span>\
             <a itemprop=\"attachment\" data-type=\"blob\">{}</a></div>",
            "Z".repeat(64)
        );
        let err = from_microdata(&micro, &reg).unwrap_err();
        assert_eq!(err.code(), "M2O-PARSE1");
    }

    #[test]
    fn rejects_missing_required_rule() {
        let reg = registry();
        let micro = "<div itemscope itemtype=\"//refin.io/Email\">\
                     <span itemprop=\"messageID\">m</span></div>";
        let err = from_microdata(micro, &reg).unwrap_err();
        assert_eq!(err.code(), "M2O-PARSE2");
    }

    #[test]
    fn rejects_unknown_type() {
        let reg = registry();
        let micro = "<div itemscope itemtype=\"//refin.io/Nope\"></div>";
        let err = from_microdata(micro, &reg).unwrap_err();
        assert_eq!(err.code(), "OR-UNKN1");
    }

    #[test]
    fn rejects_non_canonical_integer() {
        let reg = registry();
        let micro = "<div itemscope itemtype=\"//refin.io/Email\">\
                     <span itemprop=\"messageID\">m</span>\
                     <span itemprop=\"date\">007</span></div>";
        let err = from_microdata(micro, &reg).unwrap_err();
        assert_eq!(err.code(), "M2O-PARSE1");
    }

    #[test]
    fn unescape_rejects_stray_ampersand() {
        assert_eq!(unescape("a&amp;b").as_deref(), Some("a&b"));
        assert!(unescape("a&b").is_none());
        assert!(unescape("a>b").is_none());
    }

    #[test]
    fn stringifiable_decodes_to_json_shape() {
        let reg = registry();
        let obj = Obj::new("Email")
            .with("messageID", "m")
            .with("date", 1i64)
            .with(
                "meta",
                Value::Record(vec![
                    ("b".into(), Value::Integer(2)),
                    ("a".into(), Value::Integer(1)),
                ]),
            );
        let micro = to_microdata(&obj, &reg).unwrap();
        let decoded = from_microdata(&micro, &reg).unwrap();
        // Keys come back sorted; canonical form is unchanged.
        assert_eq!(
            decoded.get("meta"),
            Some(&Value::Record(vec![
                ("a".into(), Value::Integer(1)),
                ("b".into(), Value::Integer(2)),
            ]))
        );
    }
}
