//! Naming environment threaded through one compilation.
//!
//! Every introduced graph pattern variable gets a fresh `this0`, `this1`, …
//! name, every non-pattern intermediate a fresh `var0`, `var1`, …, and every
//! registered value a fresh `param0`, `param1`, … slot. Counters are scoped
//! to one compiled statement, so compiling the same tree twice produces
//! byte-identical output.

use std::collections::BTreeMap;

use crate::value::CypherValue;

/// A named pattern variable or intermediate binding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Variable {
    name: String,
}

impl Variable {
    /// The root binder of a top-level operation is literally `this`.
    pub fn this() -> Variable {
        Variable {
            name: "this".to_owned(),
        }
    }

    /// A binding introduced by something other than the environment, such as
    /// a procedure `YIELD` column or a `@cypher` fragment's return column.
    pub(crate) fn named(name: impl Into<String>) -> Variable {
        Variable { name: name.into() }
    }

    /// The rendered variable name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Handle to a parameter slot in the bag.
///
/// Cloning the handle reuses the slot (identity-based deduplication);
/// registering an equal value again allocates a distinct slot. Predictable
/// slot assignment is favored over payload-size minimization.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Param {
    name: String,
}

impl Param {
    /// The parameter name without the leading `$`.
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Accumulating counters plus the parameter bag for one statement.
#[derive(Debug, Default)]
pub struct Environment {
    next_this: usize,
    next_var: usize,
    next_param: usize,
    params: BTreeMap<String, CypherValue>,
}

impl Environment {
    /// Fresh environment with empty counters and bag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a fresh pattern variable (`this0`, `this1`, …).
    pub fn variable(&mut self) -> Variable {
        let name = format!("this{}", self.next_this);
        self.next_this += 1;
        Variable { name }
    }

    /// Allocates a fresh intermediate binding (`var0`, `var1`, …).
    pub fn intermediate(&mut self) -> Variable {
        let name = format!("var{}", self.next_var);
        self.next_var += 1;
        Variable { name }
    }

    /// Registers a value in the bag and returns its slot handle.
    pub fn param(&mut self, value: CypherValue) -> Param {
        let name = format!("param{}", self.next_param);
        self.next_param += 1;
        self.params.insert(name.clone(), value);
        Param { name }
    }

    /// Consumes the environment, yielding the accumulated parameter map.
    pub fn into_params(self) -> BTreeMap<String, CypherValue> {
        self.params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn naming_is_monotonic() {
        let mut env = Environment::new();
        assert_eq!(env.variable().name(), "this0");
        assert_eq!(env.variable().name(), "this1");
        assert_eq!(env.intermediate().name(), "var0");
        assert_eq!(env.param(CypherValue::Int(1)).name(), "param0");
        assert_eq!(env.param(CypherValue::Int(1)).name(), "param1");
    }

    #[test]
    fn cloned_handles_share_a_slot_but_equal_values_do_not() {
        let mut env = Environment::new();
        let first = env.param(CypherValue::String("x".into()));
        let shared = first.clone();
        assert_eq!(first.name(), shared.name());
        let second = env.param(CypherValue::String("x".into()));
        assert_ne!(first.name(), second.name());
        assert_eq!(env.into_params().len(), 2);
    }
}
