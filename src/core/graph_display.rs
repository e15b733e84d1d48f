// src/core/graph_display.rs

use crate::core::resolver::{ResolvedDep, execution_order};

/// Renders the resolved dependency tree of `root` as ASCII art, followed by
/// the order in which the commands run.
///
/// ```text
/// build
/// ├─ fetch
/// │  └─ clean
/// └─ lint (&)
/// order clean -> fetch -> lint -> build
/// ```
pub fn render_tree(root: &str, deps: &[ResolvedDep]) -> Vec<String> {
    let mut lines = vec![root.to_string()];
    for (i, dep) in deps.iter().enumerate() {
        render_node(dep, "", i + 1 == deps.len(), &mut lines);
    }

    let mut order = execution_order(deps);
    order.push(root.to_string());
    lines.push(format!("order {}", order.join(" -> ")));
    lines
}

/// Recursive function to render a node and its descendants.
fn render_node(dep: &ResolvedDep, prefix: &str, is_last: bool, lines: &mut Vec<String>) {
    let connector = if is_last { "└─" } else { "├─" };

    let mut markers = String::new();
    if dep.background {
        markers.push('&');
    }
    if dep.optional {
        markers.push('?');
    }
    let markers = if markers.is_empty() {
        markers
    } else {
        format!(" ({})", markers)
    };
    let args = if dep.args.is_empty() {
        String::new()
    } else {
        format!("({})", dep.args.join(", "))
    };

    lines.push(format!("{}{} {}{}{}", prefix, connector, dep.name(), args, markers));

    // Prepare the prefix for the children of this node
    let child_prefix = format!("{}{}", prefix, if is_last { "   " } else { "│  " });
    for (i, child) in dep.deps.iter().enumerate() {
        render_node(child, &child_prefix, i + 1 == dep.deps.len(), lines);
    }
}
