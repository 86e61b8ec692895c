//! Return-completeness checking for function bodies.
//!
//! The analyser drives a [`ReturnTree`] while it parses: every `if` opens a
//! `then` node (and an `else` node when there is one) below the current
//! node, and every `return` marks the node it appears in. A node is complete
//! when it was marked itself, or when one of its `if`s has a complete `then`
//! *and* a complete `else`. A missing `else` is never complete.
//!
//! Loop bodies and bare blocks open no node of their own, so a `return`
//! inside a `while` completes the enclosing node even though the loop may
//! run zero times:
//!
//! ```text
//! int f(int x) {
//!     while (x) { return 1; }
//! }                          // accepted
//! ```
//!
//! [`ReturnTree::always_returns`] gives the stricter answer (returns inside
//! loops do not count) and is what code generation relies on.

#[derive(Debug, Clone, Default)]
struct Node {
    parent: Option<usize>,
    returns: bool,
    returns_outside_loop: bool,
    /// `(then, else)` node pairs, one per `if` seen at this node
    branches: Vec<(usize, Option<usize>)>,
}

#[derive(Debug, Clone)]
pub struct ReturnTree {
    nodes: Vec<Node>,
    current: usize,
    loop_depth: usize,
}

impl Default for ReturnTree {
    fn default() -> Self {
        Self::new()
    }
}

impl ReturnTree {
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::default()],
            current: 0,
            loop_depth: 0,
        }
    }

    /// Forgets everything; called at the start of each function.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    fn push_node(&mut self) -> usize {
        self.nodes.push(Node {
            parent: Some(self.current),
            ..Node::default()
        });
        self.nodes.len() - 1
    }

    /// Descends into the `then` branch of a new `if`.
    pub fn enter_then(&mut self) {
        let then = self.push_node();
        self.nodes[self.current].branches.push((then, None));
        self.current = then;
    }

    /// Moves from a `then` branch to its sibling `else` branch.
    ///
    /// # Panics
    /// When the current node is not the `then` branch of the latest `if`.
    pub fn move_to_else(&mut self) {
        let then = self.current;
        let parent = self.parent_of(then);
        self.current = parent;
        let otherwise = self.push_node();
        let Some(pair) = self.nodes[parent].branches.last_mut() else {
            panic!("`else` without an `if`");
        };
        assert!(pair.0 == then && pair.1.is_none(), "`else` does not follow its `then`");
        pair.1 = Some(otherwise);
        self.current = otherwise;
    }

    /// Returns to the node the `if` statement appeared in.
    pub fn leave_if(&mut self) {
        self.current = self.parent_of(self.current);
    }

    pub fn enter_loop(&mut self) {
        self.loop_depth += 1;
    }

    pub fn leave_loop(&mut self) {
        self.loop_depth -= 1;
    }

    pub fn mark_return(&mut self) {
        let node = &mut self.nodes[self.current];
        node.returns = true;
        node.returns_outside_loop |= self.loop_depth == 0;
    }

    /// Completeness of the whole function.
    pub fn is_complete(&self) -> bool {
        self.complete(0, false)
    }

    /// Completeness of the branch being parsed, not counting returns that
    /// sit inside loop bodies.
    pub fn always_returns(&self) -> bool {
        self.complete(self.current, true)
    }

    fn parent_of(&self, node: usize) -> usize {
        self.nodes[node]
            .parent
            .unwrap_or_else(|| panic!("the function body has no enclosing `if`"))
    }

    fn complete(&self, index: usize, strict: bool) -> bool {
        let node = &self.nodes[index];
        let marked = if strict {
            node.returns_outside_loop
        } else {
            node.returns
        };
        marked
            || node.branches.iter().any(|&(then, otherwise)| {
                otherwise.is_some_and(|otherwise| {
                    self.complete(then, strict) && self.complete(otherwise, strict)
                })
            })
    }
}

#[cfg(test)]
mod tests {
    use super::ReturnTree;
    use assert2::check;

    #[test]
    fn direct_return_completes() {
        let mut tree = ReturnTree::new();
        check!(!tree.is_complete());
        tree.mark_return();
        check!(tree.is_complete());
    }

    #[test]
    fn if_else_with_both_returns_completes() {
        let mut tree = ReturnTree::new();
        tree.enter_then();
        tree.mark_return();
        check!(tree.always_returns());
        tree.move_to_else();
        check!(!tree.always_returns());
        tree.mark_return();
        tree.leave_if();
        check!(tree.is_complete());
    }

    #[test]
    fn if_without_else_never_completes() {
        let mut tree = ReturnTree::new();
        tree.enter_then();
        tree.mark_return();
        tree.leave_if();
        check!(!tree.is_complete());
    }

    #[test]
    fn sequential_ifs_are_independent() {
        // if (a) return; else {}   if (b) {} else return;
        let mut tree = ReturnTree::new();
        tree.enter_then();
        tree.mark_return();
        tree.move_to_else();
        tree.leave_if();
        tree.enter_then();
        tree.move_to_else();
        tree.mark_return();
        tree.leave_if();
        check!(!tree.is_complete());

        // a third if/else with returns on both sides settles it
        tree.enter_then();
        tree.mark_return();
        tree.move_to_else();
        tree.mark_return();
        tree.leave_if();
        check!(tree.is_complete());
    }

    #[test]
    fn nested_if_in_then_branch() {
        let mut tree = ReturnTree::new();
        tree.enter_then();
        tree.enter_then();
        tree.mark_return();
        tree.move_to_else();
        tree.mark_return();
        tree.leave_if();
        check!(tree.always_returns());
        tree.move_to_else();
        tree.mark_return();
        tree.leave_if();
        check!(tree.is_complete());
    }

    #[test]
    fn return_inside_loop_counts_as_complete() {
        let mut tree = ReturnTree::new();
        tree.enter_loop();
        tree.mark_return();
        tree.leave_loop();
        // known soundness gap: the loop may never run
        check!(tree.is_complete());
        check!(!tree.always_returns());
    }

    #[test]
    fn reset_forgets_the_previous_function() {
        let mut tree = ReturnTree::new();
        tree.mark_return();
        tree.reset();
        check!(!tree.is_complete());
    }
}
