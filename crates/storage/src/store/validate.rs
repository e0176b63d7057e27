#![forbid(unsafe_code)]

//! Dependency graph validation. The graph is recomputed from the edge
//! projection on demand; nothing holds live references between tasks.

use super::{StoreError, TaskStore, ValidateResult};
use rusqlite::{Connection, Transaction, params};
use std::collections::{HashMap, HashSet, VecDeque};

#[derive(Clone, Copy, PartialEq)]
enum Color {
    White,
    Grey,
    Black,
}

impl TaskStore {
    /// Full-graph cycle scan over the dependency edges. A healthy store
    /// always reports zero cycles; anything else means an edge slipped past
    /// the pre-write check and needs manual repair.
    pub fn validate(&self) -> Result<ValidateResult, StoreError> {
        let adjacency = load_adjacency(&self.conn)?;

        let mut color: HashMap<&str, Color> = adjacency
            .keys()
            .map(|id| (id.as_str(), Color::White))
            .collect();
        let mut cycles = Vec::new();
        let mut stack: Vec<&str> = Vec::new();

        let mut roots: Vec<&String> = adjacency.keys().collect();
        roots.sort();
        for root in roots {
            if color.get(root.as_str()) == Some(&Color::White) {
                dfs(root, &adjacency, &mut color, &mut stack, &mut cycles);
            }
        }
        Ok(ValidateResult { cycles })
    }
}

fn dfs<'a>(
    node: &'a str,
    adjacency: &'a HashMap<String, Vec<String>>,
    color: &mut HashMap<&'a str, Color>,
    stack: &mut Vec<&'a str>,
    cycles: &mut Vec<Vec<String>>,
) {
    color.insert(node, Color::Grey);
    stack.push(node);
    if let Some(targets) = adjacency.get(node) {
        for target in targets {
            match color.get(target.as_str()).copied().unwrap_or(Color::Black) {
                Color::White => dfs(target, adjacency, color, stack, cycles),
                Color::Grey => {
                    // Back edge: everything on the stack from target onward
                    // plus the edge back to target is one cycle.
                    if let Some(start) = stack.iter().position(|n| *n == target.as_str()) {
                        let mut cycle: Vec<String> =
                            stack[start..].iter().map(|n| n.to_string()).collect();
                        cycle.push(target.clone());
                        cycles.push(cycle);
                    }
                }
                Color::Black => {}
            }
        }
    }
    stack.pop();
    color.insert(node, Color::Black);
}

/// Would inserting the edge `task_id -> depends_on_id` close a cycle?
/// Returns the cycle path when it would, starting and ending at `task_id`.
pub(crate) fn would_create_cycle_tx(
    tx: &Transaction<'_>,
    task_id: &str,
    depends_on_id: &str,
) -> Result<Option<Vec<String>>, StoreError> {
    if task_id == depends_on_id {
        return Ok(Some(vec![task_id.to_string(), task_id.to_string()]));
    }

    // BFS from the new target: a path back to task_id over existing edges
    // means the new edge closes a loop.
    let mut parent: HashMap<String, String> = HashMap::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut queue: VecDeque<String> = VecDeque::new();
    seen.insert(depends_on_id.to_string());
    queue.push_back(depends_on_id.to_string());

    while let Some(current) = queue.pop_front() {
        if current == task_id {
            let mut path = vec![task_id.to_string()];
            let mut node = task_id.to_string();
            while node != depends_on_id {
                match parent.get(&node) {
                    Some(prev) => {
                        node = prev.clone();
                        path.push(node.clone());
                    }
                    None => break,
                }
            }
            path.push(task_id.to_string());
            path.reverse();
            return Ok(Some(path));
        }
        let mut stmt = tx.prepare(
            "SELECT depends_on_id FROM task_deps WHERE task_id=?1 ORDER BY depends_on_id ASC",
        )?;
        let targets = stmt.query_map(params![current], |row| row.get::<_, String>(0))?;
        for target in targets {
            let target = target?;
            if seen.insert(target.clone()) {
                parent.insert(target.clone(), current.clone());
                queue.push_back(target);
            }
        }
    }
    Ok(None)
}

fn load_adjacency(conn: &Connection) -> Result<HashMap<String, Vec<String>>, StoreError> {
    let mut adjacency: HashMap<String, Vec<String>> = HashMap::new();
    let mut stmt = conn.prepare(
        "SELECT task_id, depends_on_id FROM task_deps ORDER BY task_id ASC, depends_on_id ASC",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;
    for row in rows {
        let (from, to) = row?;
        adjacency.entry(to.clone()).or_default();
        adjacency.entry(from).or_default().push(to);
    }
    Ok(adjacency)
}
