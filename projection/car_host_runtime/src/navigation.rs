use serde_json::Value;

/// One pushed screen and the params it was navigated with.
#[derive(Debug, Clone, PartialEq)]
pub struct StackEntry {
    pub name: String,
    pub params: Value,
}

/// Screens in the order they were pushed; mirrors the host's own stack.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NavigationStack {
    entries: Vec<StackEntry>,
}

impl NavigationStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, params: Value) {
        self.entries.push(StackEntry {
            name: name.into(),
            params,
        });
    }

    /// Removes the top entry unless it is the root. Returns the new top.
    pub fn pop(&mut self) -> Option<&str> {
        if self.entries.len() <= 1 {
            return None;
        }

        self.entries.pop();
        self.top()
    }

    /// Pops down to the root and returns how many entries were removed.
    pub fn pop_to_root(&mut self) -> usize {
        let removed = self.entries.len().saturating_sub(1);
        self.entries.truncate(1);
        removed
    }

    pub fn top(&self) -> Option<&str> {
        self.entries.last().map(|entry| entry.name.as_str())
    }

    pub fn top_entry(&self) -> Option<&StackEntry> {
        self.entries.last()
    }

    pub fn root(&self) -> Option<&str> {
        self.entries.first().map(|entry| entry.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|entry| entry.name.as_str()).collect()
    }

    pub fn entries(&self) -> &[StackEntry] {
        &self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn stack_of(names: &[&str]) -> NavigationStack {
        let mut stack = NavigationStack::new();
        for name in names {
            stack.push(*name, Value::Null);
        }
        stack
    }

    #[test]
    fn push_push_pop_leaves_first_screen() {
        let mut stack = stack_of(&["a", "b"]);

        assert_eq!(stack.pop(), Some("a"));
        assert_eq!(stack.top(), Some("a"));
        assert_eq!(stack.len(), 1);
    }

    #[test]
    fn pop_never_removes_the_root() {
        let mut stack = NavigationStack::new();
        assert_eq!(stack.pop(), None);

        stack.push("root", Value::Null);
        assert_eq!(stack.pop(), None);
        assert_eq!(stack.names(), ["root"]);
    }

    #[test]
    fn pop_to_root_reports_removed_depth() {
        let mut stack = stack_of(&["root", "a", "b", "c"]);

        assert_eq!(stack.pop_to_root(), 3);
        assert_eq!(stack.top(), Some("root"));
        assert_eq!(stack.pop_to_root(), 0);
    }

    #[test]
    fn pop_to_root_on_empty_stack_is_harmless() {
        let mut stack = NavigationStack::new();
        assert_eq!(stack.pop_to_root(), 0);
        assert!(stack.is_empty());
        assert_eq!(stack.root(), None);
    }

    #[test]
    fn each_frame_keeps_its_params() {
        let mut stack = NavigationStack::new();
        stack.push("root", Value::Null);
        stack.push("detail", json!({"placeId": 42}));
        stack.push("map", json!({"zoom": 3}));

        stack.pop();
        let top = stack.top_entry().expect("top");
        assert_eq!(top.name, "detail");
        assert_eq!(top.params, json!({"placeId": 42}));
    }
}
