// SPDX-License-Identifier: MIT OR Apache-2.0
//! one-recipes
//!
//! Recipes are the ordered schemas that drive canonical serialization:
//! every object type present in a store has exactly one registered recipe,
//! and the recipe's rule order determines the microdata byte order.
//!
//! The registry is an explicit handle — callers construct one, register
//! recipes before the first store operation, and pass it to the codec and
//! store APIs. There is no process-wide global, so tests get isolation for
//! free by constructing disjoint registries.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use one_error::{ErrorKind, OneError, Result, codes};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// ValueType
// ---------------------------------------------------------------------------

/// The tagged variant describing what a rule's value may be.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ValueType {
    /// UTF-8 string, optionally constrained by a regular expression.
    String {
        /// Pattern the whole value must match, if present.
        #[serde(skip_serializing_if = "Option::is_none")]
        regexp: Option<String>,
    },
    /// Signed 64-bit integer.
    Integer,
    /// Floating-point number.
    Number,
    /// Boolean.
    Boolean,
    /// Any value the canonical stringifier can encode.
    Stringifiable,
    /// Content-hash link to a stored object.
    ReferenceToObj,
    /// ID-hash link to a versioned identity.
    ReferenceToId,
    /// Content-hash link to a CLOB.
    ReferenceToClob,
    /// Content-hash link to a BLOB.
    ReferenceToBlob,
    /// Ordered collection of the inner type.
    Array(Box<ValueType>),
    /// Unordered collection, duplicates allowed.
    Bag(Box<ValueType>),
    /// Unordered collection without duplicates.
    Set(Box<ValueType>),
    /// Key/value entries.
    Map(Box<ValueType>, Box<ValueType>),
    /// Nested record with its own rules (not a separate stored object).
    Object(Vec<RecipeRule>),
}

impl ValueType {
    /// Plain string with no pattern.
    #[must_use]
    pub fn string() -> Self {
        Self::String { regexp: None }
    }

    /// String constrained by `regexp`.
    #[must_use]
    pub fn string_matching(regexp: impl Into<String>) -> Self {
        Self::String {
            regexp: Some(regexp.into()),
        }
    }

    /// Whether this type is one of the four reference kinds.
    #[must_use]
    pub fn is_reference(&self) -> bool {
        matches!(
            self,
            Self::ReferenceToObj | Self::ReferenceToId | Self::ReferenceToClob | Self::ReferenceToBlob
        )
    }
}

// ---------------------------------------------------------------------------
// RecipeRule
// ---------------------------------------------------------------------------

/// One ordered rule of a recipe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeRule {
    /// The property name (and microdata `itemprop`).
    pub item_prop: String,
    /// What the value may be.
    pub value_type: ValueType,
    /// Whether the property may be absent.
    #[serde(default)]
    pub optional: bool,
    /// Whether the property is part of the object's identity.
    ///
    /// ID rules are never inherited.
    #[serde(default)]
    pub is_id: bool,
    /// `"<Type>.<field>[.<field>]…"` path whose value type this rule adopts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inherit_from: Option<String>,
}

impl RecipeRule {
    /// Required, non-ID rule.
    #[must_use]
    pub fn new(item_prop: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            item_prop: item_prop.into(),
            value_type,
            optional: false,
            is_id: false,
            inherit_from: None,
        }
    }

    /// Mark the rule optional.
    #[must_use]
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Mark the rule identifying.
    #[must_use]
    pub fn id(mut self) -> Self {
        self.is_id = true;
        self
    }

    /// Inherit the value type from another recipe's rule.
    #[must_use]
    pub fn inheriting(mut self, path: impl Into<String>) -> Self {
        self.inherit_from = Some(path.into());
        self
    }
}

// ---------------------------------------------------------------------------
// Recipe
// ---------------------------------------------------------------------------

/// Ordered schema for one object type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    /// The type name (`itemtype` tail in microdata).
    pub name: String,
    /// Rules in canonical order.
    pub rules: Vec<RecipeRule>,
}

impl Recipe {
    /// Create a recipe.
    #[must_use]
    pub fn new(name: impl Into<String>, rules: Vec<RecipeRule>) -> Self {
        Self {
            name: name.into(),
            rules,
        }
    }

    /// Whether any rule is identifying.
    #[must_use]
    pub fn has_id_rules(&self) -> bool {
        self.rules.iter().any(|r| r.is_id)
    }

    /// The identifying rules, in canonical order.
    pub fn id_rules(&self) -> impl Iterator<Item = &RecipeRule> {
        self.rules.iter().filter(|r| r.is_id)
    }
}

fn is_valid_type_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'$')
}

// ---------------------------------------------------------------------------
// RecipeRegistry
// ---------------------------------------------------------------------------

/// The `typeName → recipe` map, with inheritance resolution.
#[derive(Debug, Clone, Default)]
pub struct RecipeRegistry {
    recipes: BTreeMap<String, Recipe>,
}

impl RecipeRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a recipe. Registration must complete before the first store
    /// operation; duplicates fail.
    ///
    /// # Errors
    ///
    /// `OR-DUP1` for a duplicate or invalid type name.
    pub fn register(&mut self, recipe: Recipe) -> Result<()> {
        if !is_valid_type_name(&recipe.name) {
            return Err(OneError::new(
                ErrorKind::RecipeViolation,
                codes::OR_DUP1,
                format!("invalid recipe type name {:?}", recipe.name),
            ));
        }
        if self.recipes.contains_key(&recipe.name) {
            return Err(OneError::new(
                ErrorKind::RecipeViolation,
                codes::OR_DUP1,
                format!("recipe already registered for type {:?}", recipe.name),
            ));
        }
        self.recipes.insert(recipe.name.clone(), recipe);
        Ok(())
    }

    /// Look up a recipe.
    ///
    /// # Errors
    ///
    /// `OR-UNKN1` for an unregistered type.
    pub fn get(&self, type_name: &str) -> Result<&Recipe> {
        self.recipes.get(type_name).ok_or_else(|| {
            OneError::new(
                ErrorKind::UnknownType,
                codes::OR_UNKN1,
                format!("no recipe registered for type {type_name:?}"),
            )
        })
    }

    /// Whether a recipe is registered for `type_name`.
    #[must_use]
    pub fn has(&self, type_name: &str) -> bool {
        self.recipes.contains_key(type_name)
    }

    /// All registered recipes in name order.
    pub fn iter(&self) -> impl Iterator<Item = &Recipe> {
        self.recipes.values()
    }

    /// Resolve a rule's `inherit_from` chain and return the rule with its
    /// value type materialized.
    ///
    /// Inheritance is purely structural: the returned rule keeps the
    /// referring rule's `item_prop`, `optional`, and `is_id` flags and only
    /// adopts the target's value type. Chains may span several recipes;
    /// cycles and dangling segments fail.
    ///
    /// # Errors
    ///
    /// `OR-INH1` for an unresolvable or circular chain.
    pub fn resolve_rule_inheritance(&self, rule: &RecipeRule) -> Result<RecipeRule> {
        let Some(path) = &rule.inherit_from else {
            return Ok(rule.clone());
        };
        let mut visited = Vec::new();
        let value_type = self.resolve_path(path, &mut visited)?;
        Ok(RecipeRule {
            item_prop: rule.item_prop.clone(),
            value_type,
            optional: rule.optional,
            is_id: rule.is_id,
            inherit_from: rule.inherit_from.clone(),
        })
    }

    fn resolve_path(&self, path: &str, visited: &mut Vec<String>) -> Result<ValueType> {
        if visited.iter().any(|p| p == path) {
            return Err(OneError::new(
                ErrorKind::RecipeViolation,
                codes::OR_INH1,
                format!("circular rule inheritance through {path:?}"),
            ));
        }
        visited.push(path.to_string());

        let mut segments = path.split('.');
        let type_name = segments.next().unwrap_or("");
        let recipe = self.recipes.get(type_name).ok_or_else(|| {
            OneError::new(
                ErrorKind::RecipeViolation,
                codes::OR_INH1,
                format!("inheritance path {path:?} names unknown type {type_name:?}"),
            )
        })?;

        let mut rules: &[RecipeRule] = &recipe.rules;
        let mut found: Option<&RecipeRule> = None;
        for segment in segments {
            found = rules.iter().find(|r| r.item_prop == segment);
            let Some(rule) = found else {
                return Err(OneError::new(
                    ErrorKind::RecipeViolation,
                    codes::OR_INH1,
                    format!("inheritance path {path:?} has no rule named {segment:?}"),
                ));
            };
            match &rule.value_type {
                ValueType::Object(inner) => rules = inner.as_slice(),
                _ => rules = &[],
            }
        }
        let Some(rule) = found else {
            return Err(OneError::new(
                ErrorKind::RecipeViolation,
                codes::OR_INH1,
                format!("inheritance path {path:?} names no rule"),
            ));
        };

        // The target may itself inherit; follow the chain.
        match &rule.inherit_from {
            Some(next) => self.resolve_path(next, visited),
            None => Ok(rule.value_type.clone()),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
