//! Goal forest
//!
//! Builds the parent/child structure over a flat goal list and computes each goal's
//! effective progress: leaves report their own value, parents average their children
//! unless a manual override is set. Parent links come from hand-edited JSON, so the
//! structure may contain dangling references (those goals become roots) and cycles
//! (cut at the point of re-entry).

use std::collections::{HashMap, HashSet};

use crate::models::{clamp_progress, CoreError, GoalNode};

/// Effective progress per goal id, in [0, 100]. Consumers round for display.
pub type ProgressById = HashMap<String, f64>;

/// Read-only view of a goal list as a forest
pub struct GoalForest<'a> {
    goals: &'a [GoalNode],
    by_id: HashMap<&'a str, &'a GoalNode>,
    children: HashMap<&'a str, Vec<&'a GoalNode>>,
    roots: Vec<&'a GoalNode>,
}

impl<'a> GoalForest<'a> {
    /// Builds the forest. Children and roots keep their relative input order.
    pub fn build(goals: &'a [GoalNode]) -> Self {
        let by_id: HashMap<&str, &GoalNode> = goals.iter().map(|g| (g.id.as_str(), g)).collect();

        let mut children: HashMap<&str, Vec<&GoalNode>> = HashMap::new();
        let mut roots = Vec::new();

        for goal in goals {
            match goal.parent_id.as_deref() {
                Some(parent) if by_id.contains_key(parent) => {
                    children.entry(parent).or_default().push(goal);
                }
                _ => roots.push(goal),
            }
        }

        Self {
            goals,
            by_id,
            children,
            roots,
        }
    }

    pub fn goals(&self) -> &'a [GoalNode] {
        self.goals
    }

    pub fn len(&self) -> usize {
        self.goals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.goals.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&'a GoalNode> {
        self.by_id.get(id).copied()
    }

    pub fn roots(&self) -> &[&'a GoalNode] {
        &self.roots
    }

    pub fn children_of(&self, id: &str) -> &[&'a GoalNode] {
        self.children.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every goal below `id`. Terminates on cyclic input; `id` itself is included only
    /// when it sits on a cycle.
    pub fn descendants(&self, id: &str) -> HashSet<&'a str> {
        let mut found = HashSet::new();
        let mut stack: Vec<&str> = vec![id];

        while let Some(current) = stack.pop() {
            for &child in self.children_of(current) {
                if found.insert(child.id.as_str()) {
                    stack.push(child.id.as_str());
                }
            }
        }

        found
    }

    /// Depth-first, pre-order walk from the roots as `(depth, goal)` pairs. Children
    /// follow their parent in input order and each goal appears once. Goals that only sit
    /// on a cycle are unreachable from any root and do not appear.
    pub fn walk(&self) -> Vec<(usize, &'a GoalNode)> {
        let mut order = Vec::with_capacity(self.goals.len());
        let mut seen: HashSet<&str> = HashSet::new();
        let mut stack: Vec<(usize, &'a GoalNode)> =
            self.roots.iter().rev().map(|&root| (0, root)).collect();

        while let Some((depth, goal)) = stack.pop() {
            if !seen.insert(goal.id.as_str()) {
                continue;
            }
            order.push((depth, goal));
            for &child in self.children_of(&goal.id).iter().rev() {
                stack.push((depth + 1, child));
            }
        }

        order
    }
}

/// Outcome of evaluating one goal
struct Step {
    value: f64,
    /// Set when a cycle was cut somewhere below; such values are never memoized
    depends_on_cut: bool,
}

/// A goal whose children are still being averaged
struct Frame<'a> {
    goal: &'a GoalNode,
    next_child: usize,
    sum: f64,
    depends_on_cut: bool,
}

enum Entry<'a> {
    Done(Step),
    Descend(Frame<'a>),
}

fn own_progress(goal: &GoalNode) -> f64 {
    f64::from(clamp_progress(f64::from(goal.progress)))
}

/// First look at a goal: settle it right away, or open a frame to average its children
fn enter<'a>(
    forest: &GoalForest<'a>,
    goal: &'a GoalNode,
    path: &HashSet<&'a str>,
    memo: &mut HashMap<&'a str, f64>,
) -> Entry<'a> {
    let id = goal.id.as_str();
    if let Some(value) = memo.get(id) {
        return Entry::Done(Step {
            value: *value,
            depends_on_cut: false,
        });
    }

    // Re-entering a goal on the current path: cut the cycle at its own progress
    if path.contains(id) {
        return Entry::Done(Step {
            value: own_progress(goal),
            depends_on_cut: true,
        });
    }

    let value = if forest.children_of(id).is_empty() {
        own_progress(goal)
    } else if let Some(progress_override) = goal.progress_override {
        f64::from(clamp_progress(f64::from(progress_override)))
    } else {
        return Entry::Descend(Frame {
            goal,
            next_child: 0,
            sum: 0.0,
            depends_on_cut: false,
        });
    };

    memo.insert(id, value);
    Entry::Done(Step {
        value,
        depends_on_cut: false,
    })
}

/// Computes the effective progress of `root` with an explicit frame stack, so chain
/// depth is bounded by memory rather than the thread stack.
///
/// `path` holds the goals with an open frame, `memo` holds values that are final. A value
/// that depends on a cycle cut is returned but never memoized, so each goal on a cycle
/// is evaluated from its own point of entry.
fn compute<'a>(
    forest: &GoalForest<'a>,
    root: &'a GoalNode,
    memo: &mut HashMap<&'a str, f64>,
) -> f64 {
    let mut path: HashSet<&'a str> = HashSet::new();
    let mut stack: Vec<Frame<'a>> = Vec::new();

    let mut finished: Option<Step> = match enter(forest, root, &path, memo) {
        Entry::Done(step) => return step.value,
        Entry::Descend(frame) => {
            path.insert(root.id.as_str());
            stack.push(frame);
            None
        }
    };

    while let Some(frame) = stack.last_mut() {
        if let Some(step) = finished.take() {
            frame.sum += step.value;
            frame.depends_on_cut |= step.depends_on_cut;
        }

        let children = forest.children_of(&frame.goal.id);
        if frame.next_child < children.len() {
            let child = children[frame.next_child];
            frame.next_child += 1;
            match enter(forest, child, &path, memo) {
                Entry::Done(step) => finished = Some(step),
                Entry::Descend(child_frame) => {
                    path.insert(child.id.as_str());
                    stack.push(child_frame);
                }
            }
            continue;
        }

        let Some(done) = stack.pop() else { break };
        let id = done.goal.id.as_str();
        path.remove(id);

        let value = done.sum / children.len() as f64;
        if !done.depends_on_cut {
            memo.insert(id, value);
        }
        finished = Some(Step {
            value,
            depends_on_cut: done.depends_on_cut,
        });
    }

    finished.map(|step| step.value).unwrap_or_else(|| own_progress(root))
}

/// Effective progress for every goal in the forest
pub fn compute_progress(forest: &GoalForest<'_>) -> ProgressById {
    let mut memo: HashMap<&str, f64> = HashMap::new();
    let mut result = ProgressById::with_capacity(forest.len());

    for goal in forest.goals() {
        let value = compute(forest, goal, &mut memo);
        result.insert(goal.id.clone(), value);
    }

    result
}

/// Convenience wrapper over a plain goal list
pub fn progress_for(goals: &[GoalNode]) -> ProgressById {
    compute_progress(&GoalForest::build(goals))
}

/// Removes `id` and re-attaches its direct children to its parent.
/// Returns `None` when no goal has that id.
pub fn remove_goal(goals: &[GoalNode], id: &str) -> Option<Vec<GoalNode>> {
    let removed = goals.iter().find(|g| g.id == id)?;
    let new_parent = removed.parent_id.clone();

    Some(
        goals
            .iter()
            .filter(|g| g.id != id)
            .map(|g| {
                let mut goal = g.clone();
                if goal.parent_id.as_deref() == Some(id) {
                    goal.parent_id = new_parent.clone();
                }
                goal
            })
            .collect(),
    )
}

/// Replaces the goal with the same id in place, or appends it
pub fn upsert_goal(mut goals: Vec<GoalNode>, goal: GoalNode) -> Vec<GoalNode> {
    match goals.iter_mut().find(|g| g.id == goal.id) {
        Some(existing) => *existing = goal,
        None => goals.push(goal),
    }
    goals
}

/// Checks that placing `id` under `parent_id` keeps `id` out of its own ancestry
pub fn validate_parent(goals: &[GoalNode], id: &str, parent_id: &str) -> Result<(), CoreError> {
    let forest = GoalForest::build(goals);
    if parent_id == id || forest.descendants(id).contains(parent_id) {
        return Err(CoreError::InvalidParent {
            goal: id.to_string(),
            parent: parent_id.to_string(),
        });
    }
    Ok(())
}
