// SPDX-License-Identifier: MIT OR Apache-2.0
//! Object → microdata rendering.
//!
//! Output is a single UTF-8 line. Children follow the recipe's rule order;
//! bags and sets sort their rendered children, maps sort entries by the
//! key's canonical serialization, so the bytes are independent of in-memory
//! insertion order.

use crate::ITEMTYPE_PREFIX;
use one_core::{Hash, Obj, RefKind, Value, canonical_number, canonical_string};
use one_error::{ErrorKind, OneError, Result, codes};
use one_recipes::{RecipeRegistry, RecipeRule, ValueType};
use std::fmt::Write as _;

/// Which frame is being rendered.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Frame {
    /// Full object: every rule participates.
    Content,
    /// ID object: only `is_id` rules; all of them are required.
    Id,
}

/// Render an object's canonical microdata line.
///
/// # Errors
///
/// `O2M-RTYC1` type mismatch, `O2M-RTYC2` missing required value,
/// `O2M-RTYC3` superfluous property, `O2M-RTYC4` bad reference,
/// `OR-UNKN1` unregistered type.
pub fn to_microdata(obj: &Obj, registry: &RecipeRegistry) -> Result<String> {
    encode_object(obj, registry, Frame::Content)
}

/// Render the ID-object microdata line: only `is_id` rules, with the
/// `data-id-object="true"` marker in the outer frame.
///
/// Non-ID properties are silently ignored; missing ID values fail even on
/// otherwise-optional rules.
///
/// # Errors
///
/// `O2M-RTYC5` when the type has no ID rules, otherwise as
/// [`to_microdata`].
pub fn to_id_microdata(obj: &Obj, registry: &RecipeRegistry) -> Result<String> {
    encode_object(obj, registry, Frame::Id)
}

fn encode_object(obj: &Obj, registry: &RecipeRegistry, frame: Frame) -> Result<String> {
    let recipe = registry.get(obj.type_name())?;
    if frame == Frame::Id && !recipe.has_id_rules() {
        return Err(OneError::new(
            ErrorKind::NoIdRules,
            codes::O2M_RTYC5,
            format!("type {:?} has no ID rules", obj.type_name()),
        ));
    }

    let mut out = String::new();
    match frame {
        Frame::Content => {
            write!(
                out,
                "<div itemscope itemtype=\"{ITEMTYPE_PREFIX}{}\">",
                obj.type_name()
            )
            .expect("writing to a String cannot fail");
        }
        Frame::Id => {
            write!(
                out,
                "<div data-id-object=\"true\" itemscope itemtype=\"{ITEMTYPE_PREFIX}{}\">",
                obj.type_name()
            )
            .expect("writing to a String cannot fail");
        }
    }

    if frame == Frame::Content {
        // Any property no rule names is an error; `$type$`/`$versionHash$`
        // are struct fields here and never appear among the props.
        for prop in obj.props().keys() {
            if !recipe.rules.iter().any(|r| &r.item_prop == prop) {
                return Err(OneError::new(
                    ErrorKind::SuperfluousProperty,
                    codes::O2M_RTYC3,
                    format!(
                        "type {:?} has no rule for property {prop:?}",
                        obj.type_name()
                    ),
                ));
            }
        }
    }

    for rule in &recipe.rules {
        let rule = registry.resolve_rule_inheritance(rule)?;
        if frame == Frame::Id && !rule.is_id {
            continue;
        }
        match obj.get(&rule.item_prop) {
            None | Some(Value::Null) => {
                let required = frame == Frame::Id || !rule.optional;
                if required {
                    return Err(OneError::new(
                        ErrorKind::RuleMissingValue,
                        codes::O2M_RTYC2,
                        format!("missing value for itemprop {:?}", rule.item_prop),
                    ));
                }
            }
            Some(value) => {
                encode_value(&mut out, value, &rule.value_type, Some(&rule.item_prop), registry)?;
            }
        }
    }

    out.push_str("</div>");
    Ok(out)
}

/// Render one value. With `item_prop` the element carries the attribute;
/// inside containers (`item_prop == None`) scalars are bare escaped text
/// and elements drop the attribute.
fn encode_value(
    out: &mut String,
    value: &Value,
    value_type: &ValueType,
    item_prop: Option<&str>,
    registry: &RecipeRegistry,
) -> Result<()> {
    match value_type {
        ValueType::String { .. }
        | ValueType::Integer
        | ValueType::Number
        | ValueType::Boolean
        | ValueType::Stringifiable => {
            let text = scalar_text(value, value_type, item_prop)?;
            match item_prop {
                Some(prop) => {
                    write!(out, "<span itemprop=\"{prop}\">{text}</span>")
                        .expect("writing to a String cannot fail");
                }
                None => out.push_str(&text),
            }
        }
        ValueType::ReferenceToObj
        | ValueType::ReferenceToId
        | ValueType::ReferenceToClob
        | ValueType::ReferenceToBlob => {
            let kind = reference_kind(value_type);
            let hash = reference_hash(value, kind, item_prop)?;
            match item_prop {
                Some(prop) => write!(
                    out,
                    "<a itemprop=\"{prop}\" data-type=\"{}\">{hash}</a>",
                    kind.data_type()
                )
                .expect("writing to a String cannot fail"),
                None => write!(out, "<a data-type=\"{}\">{hash}</a>", kind.data_type())
                    .expect("writing to a String cannot fail"),
            }
        }
        ValueType::Array(inner) => {
            let Value::List(items) = value else {
                return Err(type_mismatch("array", value, item_prop));
            };
            open_container(out, "ol", item_prop);
            for item in items {
                out.push_str("<li>");
                encode_value(out, item, inner, None, registry)?;
                out.push_str("</li>");
            }
            out.push_str("</ol>");
        }
        ValueType::Bag(inner) => {
            let Value::Bag(items) = value else {
                return Err(type_mismatch("bag", value, item_prop));
            };
            let children = sorted_children(items, inner, registry)?;
            open_container(out, "ul", item_prop);
            for child in children {
                out.push_str(&child);
            }
            out.push_str("</ul>");
        }
        ValueType::Set(inner) => {
            let Value::Set(items) = value else {
                return Err(type_mismatch("set", value, item_prop));
            };
            let mut children = sorted_children(items, inner, registry)?;
            children.dedup();
            open_container(out, "ul", item_prop);
            for child in children {
                out.push_str(&child);
            }
            out.push_str("</ul>");
        }
        ValueType::Map(key_type, val_type) => {
            let Value::Map(entries) = value else {
                return Err(type_mismatch("map", value, item_prop));
            };
            let mut rendered = Vec::with_capacity(entries.len());
            for (k, v) in entries {
                let sort_key = canonical_string(k)?;
                let mut entry = String::from("<dt>");
                encode_value(&mut entry, k, key_type, None, registry)?;
                entry.push_str("</dt><dd>");
                encode_value(&mut entry, v, val_type, None, registry)?;
                entry.push_str("</dd>");
                rendered.push((sort_key, entry));
            }
            rendered.sort();
            if rendered.windows(2).any(|w| w[0].0 == w[1].0) {
                return Err(OneError::new(
                    ErrorKind::TypeMismatch,
                    codes::O2M_RTYC1,
                    format!("duplicate map key for itemprop {:?}", item_prop.unwrap_or("")),
                ));
            }
            open_container(out, "dl", item_prop);
            for (_, entry) in rendered {
                out.push_str(&entry);
            }
            out.push_str("</dl>");
        }
        ValueType::Object(rules) => {
            let Value::Record(fields) = value else {
                return Err(type_mismatch("object", value, item_prop));
            };
            match item_prop {
                Some(prop) => write!(out, "<div itemprop=\"{prop}\">")
                    .expect("writing to a String cannot fail"),
                None => out.push_str("<div>"),
            }
            encode_record(out, fields, rules, registry)?;
            out.push_str("</div>");
        }
    }
    Ok(())
}

fn encode_record(
    out: &mut String,
    fields: &[(String, Value)],
    rules: &[RecipeRule],
    registry: &RecipeRegistry,
) -> Result<()> {
    for (name, _) in fields {
        if !rules.iter().any(|r| &r.item_prop == name) {
            return Err(OneError::new(
                ErrorKind::SuperfluousProperty,
                codes::O2M_RTYC3,
                format!("nested object has no rule for property {name:?}"),
            ));
        }
    }
    for rule in rules {
        let rule = registry.resolve_rule_inheritance(rule)?;
        let field = fields
            .iter()
            .find(|(name, _)| name == &rule.item_prop)
            .map(|(_, v)| v);
        match field {
            None | Some(Value::Null) => {
                if !rule.optional {
                    return Err(OneError::new(
                        ErrorKind::RuleMissingValue,
                        codes::O2M_RTYC2,
                        format!("missing value for itemprop {:?}", rule.item_prop),
                    ));
                }
            }
            Some(value) => {
                encode_value(out, value, &rule.value_type, Some(&rule.item_prop), registry)?;
            }
        }
    }
    Ok(())
}

fn sorted_children(
    items: &[Value],
    inner: &ValueType,
    registry: &RecipeRegistry,
) -> Result<Vec<String>> {
    let mut children = Vec::with_capacity(items.len());
    for item in items {
        let mut child = String::from("<li>");
        encode_value(&mut child, item, inner, None, registry)?;
        child.push_str("</li>");
        children.push(child);
    }
    children.sort();
    Ok(children)
}

fn open_container(out: &mut String, tag: &str, item_prop: Option<&str>) {
    match item_prop {
        Some(prop) => write!(out, "<{tag} itemprop=\"{prop}\">")
            .expect("writing to a String cannot fail"),
        None => write!(out, "<{tag}>").expect("writing to a String cannot fail"),
    }
}

fn reference_kind(value_type: &ValueType) -> RefKind {
    match value_type {
        ValueType::ReferenceToObj => RefKind::Object,
        ValueType::ReferenceToId => RefKind::Id,
        ValueType::ReferenceToClob => RefKind::Clob,
        ValueType::ReferenceToBlob => RefKind::Blob,
        _ => unreachable!("only called for reference types"),
    }
}

fn reference_hash(value: &Value, expected: RefKind, item_prop: Option<&str>) -> Result<String> {
    match value {
        Value::Reference(link) if link.kind == expected => Ok(link.hash.to_string()),
        Value::Reference(link) => Err(OneError::new(
            ErrorKind::TypeMismatch,
            codes::O2M_RTYC1,
            format!(
                "reference of kind {:?} where {:?} expected for itemprop {:?}",
                link.kind.data_type(),
                expected.data_type(),
                item_prop.unwrap_or("")
            ),
        )),
        Value::String(s) if Hash::is_hash_string(s) => Ok(s.clone()),
        other => Err(OneError::new(
            ErrorKind::BadReference,
            codes::O2M_RTYC4,
            format!(
                "value of type {:?} is not a hash for reference itemprop {:?}",
                other.type_name(),
                item_prop.unwrap_or("")
            ),
        )),
    }
}

fn scalar_text(value: &Value, value_type: &ValueType, item_prop: Option<&str>) -> Result<String> {
    match (value_type, value) {
        (ValueType::String { regexp }, Value::String(s)) => {
            if let Some(pattern) = regexp {
                let re = regex::Regex::new(pattern).map_err(|e| {
                    OneError::new(
                        ErrorKind::TypeMismatch,
                        codes::O2M_RTYC1,
                        format!("invalid regexp in recipe rule {:?}: {e}", item_prop.unwrap_or("")),
                    )
                })?;
                if !re.is_match(s) {
                    return Err(OneError::new(
                        ErrorKind::TypeMismatch,
                        codes::O2M_RTYC1,
                        format!(
                            "string {s:?} does not match {pattern:?} for itemprop {:?}",
                            item_prop.unwrap_or("")
                        ),
                    ));
                }
            }
            Ok(escape(s))
        }
        (ValueType::Integer, Value::Integer(n)) => Ok(n.to_string()),
        (ValueType::Number, Value::Number(n)) => canonical_number(*n),
        (ValueType::Boolean, Value::Bool(b)) => Ok(b.to_string()),
        (ValueType::Stringifiable, v) => Ok(escape(&canonical_string(v)?)),
        (expected, got) => Err(type_mismatch(type_label(expected), got, item_prop)),
    }
}

fn type_label(value_type: &ValueType) -> &'static str {
    match value_type {
        ValueType::String { .. } => "string",
        ValueType::Integer => "integer",
        ValueType::Number => "number",
        ValueType::Boolean => "boolean",
        ValueType::Stringifiable => "stringifiable",
        _ => "value",
    }
}

fn type_mismatch(expected: &str, got: &Value, item_prop: Option<&str>) -> OneError {
    OneError::new(
        ErrorKind::TypeMismatch,
        codes::O2M_RTYC1,
        format!(
            "expected {expected} but got {} for itemprop {:?}",
            got.type_name(),
            item_prop.unwrap_or("")
        ),
    )
}

/// Escape the three characters microdata reserves. Nothing else changes.
pub(crate) fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use one_core::RefLink;
    use one_recipes::Recipe;

    fn registry() -> RecipeRegistry {
        let mut reg = RecipeRegistry::new();
        reg.register(Recipe::new(
            "Person",
            vec![
                RecipeRule::new("email", ValueType::string()).id(),
                RecipeRule::new("name", ValueType::string()).optional(),
            ],
        ))
        .unwrap();
        reg.register(Recipe::new(
            "Instance",
            vec![
                RecipeRule::new("name", ValueType::string()).id(),
                RecipeRule::new("owner", ValueType::ReferenceToObj),
                RecipeRule::new("recipe", ValueType::ReferenceToObj).optional(),
            ],
        ))
        .unwrap();
        reg.register(Recipe::new(
            "Collections",
            vec![
                RecipeRule::new("tags", ValueType::Set(Box::new(ValueType::string()))),
                RecipeRule::new(
                    "scores",
                    ValueType::Map(Box::new(ValueType::string()), Box::new(ValueType::Integer)),
                ),
                RecipeRule::new("all", ValueType::Bag(Box::new(ValueType::Integer))).optional(),
            ],
        ))
        .unwrap();
        reg
    }

    #[test]
    fn frame_shape() {
        let reg = registry();
        let obj = Obj::new("Person").with("email", "a@b");
        let micro = to_microdata(&obj, &reg).unwrap();
        assert_eq!(
            micro,
            "<div itemscope itemtype=\"//refin.io/Person\">\
             <span itemprop=\"email\">a@b</span></div>"
        );
    }

    #[test]
    fn id_frame_carries_marker() {
        let reg = registry();
        let obj = Obj::new("Person").with("email", "a@b").with("name", "N");
        let micro = to_id_microdata(&obj, &reg).unwrap();
        assert!(micro.starts_with("<div data-id-object=\"true\" itemscope"));
        // Non-ID properties are ignored.
        assert!(!micro.contains("name"));
    }

    #[test]
    fn optional_rule_absent_is_skipped() {
        let reg = registry();
        let obj = Obj::new("Person").with("email", "a@b");
        assert!(to_microdata(&obj, &reg).is_ok());
    }

    #[test]
    fn missing_required_value_fails() {
        let reg = registry();
        let obj = Obj::new("Person").with("name", "no email");
        let err = to_microdata(&obj, &reg).unwrap_err();
        assert_eq!(err.code(), "O2M-RTYC2");
    }

    #[test]
    fn superfluous_property_fails() {
        let reg = registry();
        let obj = Obj::new("Person").with("email", "a@b").with("extra", 1i64);
        let err = to_microdata(&obj, &reg).unwrap_err();
        assert_eq!(err.code(), "O2M-RTYC3");
    }

    #[test]
    fn imploded_reference_is_rejected() {
        let reg = registry();
        let obj = Obj::new("Instance").with("name", "X").with(
            "owner",
            Value::Record(vec![("email".into(), Value::from("a@b"))]),
        );
        let err = to_microdata(&obj, &reg).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadReference);
        assert!(err.to_string().contains("O2M-RTYC4"));
        assert!(err.to_string().contains("owner"));
    }

    #[test]
    fn reference_accepts_hash_string() {
        let reg = registry();
        let h = Hash::digest(b"owner").to_string();
        let obj = Obj::new("Instance").with("name", "X").with("owner", h.as_str());
        let micro = to_microdata(&obj, &reg).unwrap();
        assert!(micro.contains(&format!("<a itemprop=\"owner\" data-type=\"obj\">{h}</a>")));
    }

    #[test]
    fn set_children_are_sorted_and_deduped() {
        let reg = registry();
        let obj = Obj::new("Collections")
            .with(
                "tags",
                Value::Set(vec![Value::from("b"), Value::from("a"), Value::from("b")]),
            )
            .with("scores", Value::Map(vec![]));
        let micro = to_microdata(&obj, &reg).unwrap();
        assert!(micro.contains("<ul itemprop=\"tags\"><li>a</li><li>b</li></ul>"));
    }

    #[test]
    fn map_entries_sorted_by_key() {
        let reg = registry();
        let obj = Obj::new("Collections")
            .with("tags", Value::Set(vec![]))
            .with(
                "scores",
                Value::Map(vec![
                    (Value::from("z"), Value::Integer(1)),
                    (Value::from("a"), Value::Integer(2)),
                ]),
            );
        let micro = to_microdata(&obj, &reg).unwrap();
        assert!(micro.contains(
            "<dl itemprop=\"scores\"><dt>a</dt><dd>2</dd><dt>z</dt><dd>1</dd></dl>"
        ));
    }

    #[test]
    fn empty_containers() {
        let reg = registry();
        let obj = Obj::new("Collections")
            .with("tags", Value::Set(vec![]))
            .with("scores", Value::Map(vec![]))
            .with("all", Value::Bag(vec![]));
        let micro = to_microdata(&obj, &reg).unwrap();
        assert!(micro.contains("<ul itemprop=\"tags\"></ul>"));
        assert!(micro.contains("<dl itemprop=\"scores\"></dl>"));
        assert!(micro.contains("<ul itemprop=\"all\"></ul>"));
    }

    #[test]
    fn escaping_covers_exactly_three_characters() {
        assert_eq!(escape("a&b<c>d\"e"), "a&amp;b&lt;c&gt;d\"e");
    }

    #[test]
    fn no_id_rules_fails_id_microdata() {
        let reg = registry();
        let obj = Obj::new("Collections")
            .with("tags", Value::Set(vec![]))
            .with("scores", Value::Map(vec![]));
        let err = to_id_microdata(&obj, &reg).unwrap_err();
        assert_eq!(err.code(), "O2M-RTYC5");
    }
}
