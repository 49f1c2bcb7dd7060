//! Lexically scoped symbol table.
//!
//! Each name maps to a stack of bindings; the innermost one is visible.
//! Bindings are pushed on entry to a construct and popped on exit, so a
//! traversal that pushes and pops in matched pairs leaves the scope unchanged.

use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct Scope<T> {
    bindings: HashMap<String, Vec<T>>,
    /// Push order, for [`Scope::unwind_to`].
    order: Vec<String>,
}

/// A position in a [`Scope`]'s push history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopeMark(usize);

impl<T> Default for Scope<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Scope<T> {
    pub fn new() -> Self {
        Self {
            bindings: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Shadow any existing binding of `name` with `value`.
    pub fn push(&mut self, name: impl Into<String>, value: T) {
        let name = name.into();
        self.bindings.entry(name.clone()).or_default().push(value);
        self.order.push(name);
    }

    /// Remove the innermost binding, which must belong to `name`.
    ///
    /// # Panics
    ///
    /// Panics if `name` is not the most recently pushed binding.
    pub fn pop(&mut self, name: &str) -> T {
        match self.order.last() {
            Some(top) if top == name => {}
            Some(top) => panic!("scope pop of `{name}` but innermost binding is `{top}`"),
            None => panic!("scope pop of `{name}` on an empty scope"),
        }
        self.order.pop();
        self.pop_binding(name)
    }

    fn pop_binding(&mut self, name: &str) -> T {
        let stack = self
            .bindings
            .get_mut(name)
            .unwrap_or_else(|| panic!("scope has no binding for `{name}`"));
        let value = stack
            .pop()
            .unwrap_or_else(|| panic!("scope has no binding for `{name}`"));
        if stack.is_empty() {
            self.bindings.remove(name);
        }
        value
    }

    /// The innermost binding of `name`.
    pub fn get(&self, name: &str) -> Option<&T> {
        self.bindings.get(name).and_then(|stack| stack.last())
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut T> {
        self.bindings.get_mut(name).and_then(|stack| stack.last_mut())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    /// Number of live bindings, shadowed ones included.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn mark(&self) -> ScopeMark {
        ScopeMark(self.order.len())
    }

    /// Pop every binding pushed since `mark`, innermost first.
    pub fn unwind_to(&mut self, mark: ScopeMark) -> Vec<(String, T)> {
        let mut popped = Vec::new();
        while self.order.len() > mark.0 {
            let Some(name) = self.order.pop() else { break };
            let value = self.pop_binding(&name);
            popped.push((name, value));
        }
        popped
    }

    /// Run `f` with `name` bound to `value`, then drop the binding.
    pub fn with<R>(&mut self, name: impl Into<String>, value: T, f: impl FnOnce(&mut Self) -> R) -> R {
        let name = name.into();
        self.push(name.clone(), value);
        let result = f(self);
        self.pop(&name);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shadowing() {
        let mut scope = Scope::new();
        scope.push("x", 1);
        scope.push("x", 2);
        assert_eq!(scope.get("x"), Some(&2));
        assert_eq!(scope.pop("x"), 2);
        assert_eq!(scope.get("x"), Some(&1));
        assert_eq!(scope.pop("x"), 1);
        assert!(!scope.contains("x"));
        assert!(scope.is_empty());
    }

    #[test]
    fn test_get_mut_updates_innermost() {
        let mut scope = Scope::new();
        scope.push("peak", 10);
        scope.push("peak", 20);
        *scope.get_mut("peak").unwrap() += 5;
        assert_eq!(scope.pop("peak"), 25);
        assert_eq!(scope.get("peak"), Some(&10));
    }

    #[test]
    #[should_panic(expected = "innermost binding is `y`")]
    fn test_pop_out_of_order_panics() {
        let mut scope = Scope::new();
        scope.push("x", 1);
        scope.push("y", 2);
        scope.pop("x");
    }

    #[test]
    #[should_panic(expected = "empty scope")]
    fn test_pop_missing_panics() {
        let mut scope: Scope<i32> = Scope::new();
        scope.pop("x");
    }

    #[test]
    fn test_unwind_to_mark() {
        let mut scope = Scope::new();
        scope.push("a", 1);
        let mark = scope.mark();
        scope.push("b", 2);
        scope.push("a", 3);
        let popped = scope.unwind_to(mark);
        assert_eq!(popped, vec![("a".to_string(), 3), ("b".to_string(), 2)]);
        assert_eq!(scope.get("a"), Some(&1));
        assert_eq!(scope.len(), 1);
    }

    #[test]
    fn test_with_restores_scope() {
        let mut scope = Scope::new();
        let seen = scope.with("x", 7, |s| s.get("x").copied());
        assert_eq!(seen, Some(7));
        assert!(scope.is_empty());
    }
}
