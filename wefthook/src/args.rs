//! The live view of a method's parameters exposed to hooks.
use weftir::value::Value;

/// An ordered, named, read/write view over the actual parameter values of
/// one logical invocation.
///
/// The view borrows the invocation's argument storage, so a mutation made by
/// an entry hook is what the still-to-run body observes. Exit and exception
/// hooks receive the same view, but by then the body has finished; writing
/// through it has no retroactive effect. A view is never shared across
/// concurrent invocations.
pub struct ArgumentsView<'a> {
    names: &'a [String],
    values: &'a mut [Value],
}

impl<'a> ArgumentsView<'a> {
    /// Build a view over an invocation's argument storage. `names` and
    /// `values` must be parallel; the mismatch is a host bug and panics in
    /// debug builds only.
    pub fn new(names: &'a [String], values: &'a mut [Value]) -> Self {
        debug_assert_eq!(names.len(), values.len());
        ArgumentsView { names, values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn name(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    pub fn get_named(&self, name: &str) -> Option<&Value> {
        self.position(name).and_then(|i| self.values.get(i))
    }

    pub fn set(&mut self, index: usize, value: Value) -> bool {
        match self.values.get_mut(index) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    pub fn set_named(&mut self, name: &str, value: Value) -> bool {
        match self.position(name) {
            Some(index) => self.set(index, value),
            None => false,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.names
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn addressable_by_index_and_name() {
        let names = vec!["a".to_string(), "b".to_string()];
        let mut values = vec![Value::I32(5), Value::I32(3)];
        let mut view = ArgumentsView::new(&names, &mut values);

        assert_eq!(view.get_named("b"), Some(&Value::I32(3)));
        assert!(view.set_named("a", Value::I32(7)));
        assert!(!view.set_named("missing", Value::Unit));
        assert_eq!(view.get(0), Some(&Value::I32(7)));
        assert_eq!(view.len(), 2);
    }
}
