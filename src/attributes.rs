//! Attribute bundles attached to every type in the graph.
//!
//! Combining is associative, commutative and idempotent, so merges stay
//! order-independent no matter which pass triggers them.

use std::collections::BTreeSet;

/// Cap on distinct string literals tracked per string type. Beyond this the
/// case set degrades to `Unbounded` and enum expansion is off the table.
pub const MAX_STRING_CASES: usize = 64;

/// Evidence about the value space of a string type.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum StringCases {
    /// All observed literals, deduplicated.
    Finite(BTreeSet<String>),
    /// Too many distinct literals, or the source never constrained them.
    Unbounded,
}

impl Default for StringCases {
    fn default() -> Self {
        StringCases::Finite(BTreeSet::new())
    }
}

impl StringCases {
    pub fn union(a: &Self, b: &Self) -> Self {
        match (a, b) {
            (StringCases::Finite(x), StringCases::Finite(y)) => {
                let merged: BTreeSet<String> = x | y;
                if merged.len() > MAX_STRING_CASES {
                    StringCases::Unbounded
                } else {
                    StringCases::Finite(merged)
                }
            }
            _ => StringCases::Unbounded,
        }
    }

    pub fn as_finite(&self) -> Option<&BTreeSet<String>> {
        match self {
            StringCases::Finite(cases) => Some(cases),
            StringCases::Unbounded => None,
        }
    }
}

/// Metadata carried by a type through every rewrite.
///
/// Rewrites merge bundles with [`Attributes::union`]; content only shrinks by
/// explicit policy (garbage collection dropping unreachable types, enum
/// expansion consuming the case evidence).
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Attributes {
    /// Names proposed for this type (schema titles, top-level names).
    pub names: BTreeSet<String>,
    /// Human-readable descriptions from schema input.
    pub descriptions: BTreeSet<String>,
    /// Ordinals of the inputs this type was inferred from.
    pub provenance: BTreeSet<u32>,
    /// String literal evidence, consumed by enum expansion.
    pub string_cases: StringCases,
    /// The case set was written down in a schema rather than observed.
    pub cases_from_schema: bool,
    /// Property names were mandated by a schema; blocks map inference.
    pub schema_fixed: bool,
}

impl Attributes {
    pub fn with_provenance(input: u32) -> Self {
        let mut attrs = Attributes::default();
        attrs.provenance.insert(input);
        attrs
    }

    pub fn with_name(name: &str) -> Self {
        let mut attrs = Attributes::default();
        attrs.names.insert(name.to_string());
        attrs
    }

    pub fn union(a: &Self, b: &Self) -> Self {
        Attributes {
            names: &a.names | &b.names,
            descriptions: &a.descriptions | &b.descriptions,
            provenance: &a.provenance | &b.provenance,
            string_cases: StringCases::union(&a.string_cases, &b.string_cases),
            cases_from_schema: a.cases_from_schema || b.cases_from_schema,
            schema_fixed: a.schema_fixed || b.schema_fixed,
        }
    }

    pub fn merge_from(&mut self, other: &Self) {
        *self = Attributes::union(self, other);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cases(items: &[&str]) -> StringCases {
        StringCases::Finite(items.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn union_is_commutative() {
        let mut a = Attributes::with_name("Left");
        a.string_cases = cases(&["r", "g"]);
        let mut b = Attributes::with_provenance(3);
        b.string_cases = cases(&["g", "b"]);

        let ab = Attributes::union(&a, &b);
        let ba = Attributes::union(&b, &a);
        assert_eq!(ab, ba);
        assert_eq!(ab.string_cases, cases(&["r", "g", "b"]));
    }

    #[test]
    fn union_is_idempotent() {
        let mut a = Attributes::with_name("X");
        a.schema_fixed = true;
        assert_eq!(Attributes::union(&a, &a), a);
    }

    #[test]
    fn unbounded_absorbs() {
        let fin = cases(&["a"]);
        assert_eq!(
            StringCases::union(&fin, &StringCases::Unbounded),
            StringCases::Unbounded
        );
    }

    #[test]
    fn case_cap_degrades_to_unbounded() {
        let many: BTreeSet<String> = (0..=MAX_STRING_CASES).map(|i| format!("v{i}")).collect();
        let merged = StringCases::union(&StringCases::Finite(many), &cases(&[]));
        assert_eq!(merged, StringCases::Unbounded);
    }
}
