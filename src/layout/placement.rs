//! Grid placement of a module's children
//!
//! Columns come straight from the cycle analysis. Rows follow signal flow:
//! `input` and `output` primitives are stacked per column, everything else
//! sits at the rounded mean row of its sources.

use std::collections::{BTreeMap, HashMap, VecDeque};

use super::config::LayoutConfig;
use super::latency;
use super::port_groups::arrange;
use super::types::{ArrangedGroup, ModuleLayout, ModuleSize};
use crate::definition::{INPUT, OUTPUT};
use crate::elaborate::{ConnectionReference, InstanceGraph, InstanceId, Position};
use crate::error::ElabError;

/// Place every child of `module` and compute the module's size
///
/// Positions are written into the graph. Cycles are computed on demand, so
/// a dependency loop surfaces here as `CycleDetected`.
pub fn place_module(
    graph: &mut InstanceGraph,
    module: InstanceId,
    config: &LayoutConfig,
) -> Result<ModuleLayout, ElabError> {
    let children = graph.children(module).to_vec();

    let mut columns = HashMap::with_capacity(children.len());
    for &child in &children {
        columns.insert(child, latency::cycle(graph, child)?);
    }

    let order = dependency_order(graph, module, &children);
    let rows = assign_rows(graph, module, &children, &order, &columns);
    let rows = resolve_overlaps(&children, &columns, &rows);

    let mut max_column = 0;
    let mut max_row = 0;
    let mut placements = Vec::with_capacity(children.len());
    for &child in &children {
        let position = Position::new(columns[&child], rows[&child]);
        max_column = max_column.max(position.x);
        max_row = max_row.max(position.y);
        graph.set_position(child, position);
        placements.push((child, position));
    }

    let size = module_size(graph, module, max_column, config);
    let port_groups = arrange_groups(graph, module, size.height, config);

    tracing::debug!(
        module = %graph.path(module),
        max_column,
        max_row,
        width = size.width,
        height = size.height,
        "module placed"
    );

    Ok(ModuleLayout {
        max_column,
        max_row,
        size,
        port_groups,
        placements,
    })
}

/// Sibling ids feeding `child`, in connection order
fn sibling_sources(graph: &InstanceGraph, module: InstanceId, child: InstanceId) -> Vec<InstanceId> {
    graph
        .get(child)
        .sources()
        .filter_map(|s| s.component_id())
        .filter_map(|id| graph.child(module, id))
        .collect()
}

/// Kahn's algorithm over sibling edges, ties broken by declaration order
fn dependency_order(
    graph: &InstanceGraph,
    module: InstanceId,
    children: &[InstanceId],
) -> Vec<InstanceId> {
    let mut indegree: HashMap<InstanceId, usize> = children.iter().map(|c| (*c, 0)).collect();
    let mut consumers: HashMap<InstanceId, Vec<InstanceId>> = HashMap::new();
    for &child in children {
        for source in sibling_sources(graph, module, child) {
            *indegree.entry(child).or_default() += 1;
            consumers.entry(source).or_default().push(child);
        }
    }

    let declared: HashMap<InstanceId, usize> =
        children.iter().enumerate().map(|(i, c)| (*c, i)).collect();
    let mut ready: VecDeque<InstanceId> = children
        .iter()
        .filter(|c| indegree[*c] == 0)
        .copied()
        .collect();
    let mut order = Vec::with_capacity(children.len());

    while let Some(next) = ready.pop_front() {
        order.push(next);
        let mut unlocked = Vec::new();
        for consumer in consumers.get(&next).into_iter().flatten() {
            if let Some(d) = indegree.get_mut(consumer) {
                *d -= 1;
                if *d == 0 {
                    unlocked.push(*consumer);
                }
            }
        }
        ready.extend(unlocked);
        ready.make_contiguous().sort_by_key(|c| declared[c]);
    }

    // Only reachable with an unchecked cycle; keep every child placed
    if order.len() < children.len() {
        for &child in children {
            if !order.contains(&child) {
                order.push(child);
            }
        }
    }
    order
}

/// Rows before overlap resolution
///
/// `input` and `output` rows are counted per column in declaration order;
/// every other child then takes the mean of its sources in dependency order.
fn assign_rows(
    graph: &InstanceGraph,
    module: InstanceId,
    children: &[InstanceId],
    order: &[InstanceId],
    columns: &HashMap<InstanceId, i64>,
) -> HashMap<InstanceId, i64> {
    let module_inputs = &graph.get(module).inputs;
    let mut input_rows: HashMap<i64, i64> = HashMap::new();
    let mut output_rows: HashMap<i64, i64> = HashMap::new();
    let mut rows: HashMap<InstanceId, i64> = HashMap::with_capacity(children.len());

    for &child in children {
        let column = columns[&child];
        let row = match graph.get(child).type_name.as_str() {
            INPUT => next_row(&mut input_rows, column),
            OUTPUT => next_row(&mut output_rows, column),
            _ => continue,
        };
        rows.insert(child, row);
    }

    for &child in order {
        if rows.contains_key(&child) {
            continue;
        }
        let source_rows: Vec<i64> = graph
            .get(child)
            .sources()
            .filter_map(|source| match source {
                ConnectionReference::ModuleInput { name, .. } => module_inputs
                    .iter()
                    .position(|p| &p.name == name)
                    .map(|i| i as i64 + 1),
                ConnectionReference::ComponentOutput { component_id, .. } => graph
                    .child(module, component_id)
                    .and_then(|s| rows.get(&s).copied()),
            })
            .collect();
        rows.insert(child, mean_row(&source_rows));
    }
    rows
}

fn next_row(counters: &mut HashMap<i64, i64>, column: i64) -> i64 {
    let counter = counters.entry(column).or_insert(0);
    *counter += 1;
    *counter
}

fn mean_row(rows: &[i64]) -> i64 {
    if rows.is_empty() {
        return 1;
    }
    let sum: i64 = rows.iter().sum();
    (sum as f64 / rows.len() as f64).round() as i64
}

/// Within each column, the k-th child (declaration order) sharing a row
/// moves down by k
fn resolve_overlaps(
    children: &[InstanceId],
    columns: &HashMap<InstanceId, i64>,
    rows: &HashMap<InstanceId, i64>,
) -> HashMap<InstanceId, i64> {
    let mut seen: BTreeMap<(i64, i64), i64> = BTreeMap::new();
    let mut resolved = HashMap::with_capacity(children.len());
    for &child in children {
        let row = rows[&child];
        let count = seen.entry((columns[&child], row)).or_insert(0);
        resolved.insert(child, row + *count);
        *count += 1;
    }
    resolved
}

fn module_size(
    graph: &InstanceGraph,
    module: InstanceId,
    max_column: i64,
    config: &LayoutConfig,
) -> ModuleSize {
    let instance = graph.get(module);
    let width = (max_column + 1) as f64 * config.column_spacing;
    let explicit = instance
        .display
        .as_ref()
        .and_then(|d| d.get("height"))
        .and_then(|h| h.as_f64());
    let height = explicit.unwrap_or_else(|| {
        let ports = instance.inputs.len().max(instance.outputs.len()) as f64;
        (ports * config.port_spacing + config.module_padding).max(config.min_module_height)
    });
    ModuleSize { width, height }
}

fn arrange_groups(
    graph: &InstanceGraph,
    module: InstanceId,
    height: f64,
    config: &LayoutConfig,
) -> Vec<ArrangedGroup> {
    let Some(body) = graph.body(module) else {
        return Vec::new();
    };
    body.port_groups
        .iter()
        .map(|group| ArrangedGroup {
            id: group.id.clone(),
            style: group.style,
            direction: group.direction,
            ports: arrange(group.style, &group.ports, config.port_spacing, height),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elaborate::{ComponentInstance, InputConnection, ModuleBody, Port};

    fn primitive(id: &str, type_name: &str, inputs: &[&str]) -> ComponentInstance {
        let mut instance = ComponentInstance::new(id, type_name, true);
        instance.set_primitive_latency(if type_name == INPUT { 0 } else { 1 });
        instance.connections = inputs
            .iter()
            .enumerate()
            .map(|(i, src)| InputConnection {
                port: format!("in{}", i),
                sources: vec![ConnectionReference::parse(src).unwrap()],
            })
            .collect();
        instance
    }

    fn module(inputs: usize) -> InstanceGraph {
        let mut top = ComponentInstance::new("top", "top", false);
        top.inputs = (0..inputs).map(|i| Port::new(format!("i{}", i), 1)).collect();
        InstanceGraph::with_root(top, Some(ModuleBody::default()))
    }

    fn position(graph: &InstanceGraph, id: &str) -> Position {
        graph.get(graph.find(id).unwrap()).position().unwrap()
    }

    #[test]
    fn test_inputs_stack_and_consumer_averages() {
        let mut graph = module(0);
        let root = graph.root();
        graph.attach(root, primitive("x0", "input", &[]), None).unwrap();
        graph.attach(root, primitive("w0", "input", &[]), None).unwrap();
        graph.attach(root, primitive("x1", "input", &[]), None).unwrap();
        graph
            .attach(root, primitive("m", "mul", &["x0.out", "x1.out"]), None)
            .unwrap();

        place_module(&mut graph, root, &LayoutConfig::default()).unwrap();
        assert_eq!(position(&graph, "x0"), Position::new(0, 1));
        assert_eq!(position(&graph, "w0"), Position::new(0, 2));
        assert_eq!(position(&graph, "x1"), Position::new(0, 3));
        assert_eq!(position(&graph, "m"), Position::new(1, 2));
    }

    #[test]
    fn test_shared_row_shifts_down() {
        let mut graph = module(9);
        let root = graph.root();
        for id in ["a", "b", "c"] {
            graph.attach(root, primitive(id, "relu2", &["$.i4"]), None).unwrap();
        }
        place_module(&mut graph, root, &LayoutConfig::default()).unwrap();
        assert_eq!(position(&graph, "a").y, 5);
        assert_eq!(position(&graph, "b").y, 6);
        assert_eq!(position(&graph, "c").y, 7);
    }

    #[test]
    fn test_forward_declared_consumer_uses_source_row() {
        let mut graph = module(3);
        let root = graph.root();
        graph.attach(root, primitive("late", "relu2", &["early.out"]), None).unwrap();
        graph.attach(root, primitive("early", "relu2", &["$.i2"]), None).unwrap();
        place_module(&mut graph, root, &LayoutConfig::default()).unwrap();
        assert_eq!(position(&graph, "early"), Position::new(1, 3));
        assert_eq!(position(&graph, "late"), Position::new(2, 3));
    }

    #[test]
    fn test_sourceless_defaults_to_row_one() {
        let mut graph = module(0);
        let root = graph.root();
        graph.attach(root, primitive("k", "relu2", &[]), None).unwrap();
        place_module(&mut graph, root, &LayoutConfig::default()).unwrap();
        assert_eq!(position(&graph, "k"), Position::new(0, 1));
    }

    #[test]
    fn test_module_size() {
        let mut graph = module(5);
        let root = graph.root();
        graph.attach(root, primitive("r0", "reg", &["$.i0"]), None).unwrap();
        graph.attach(root, primitive("r1", "reg", &["r0.out"]), None).unwrap();
        let config = LayoutConfig::default();
        let layout = place_module(&mut graph, root, &config).unwrap();
        assert_eq!(layout.max_column, 2);
        assert_eq!(layout.size.width, 360.0);
        assert_eq!(layout.size.height, 120.0);
    }

    #[test]
    fn test_explicit_display_height_wins() {
        let mut graph = module(5);
        let root = graph.root();
        graph.get_mut(root).display = Some(serde_json::json!({"height": 42}));
        let layout = place_module(&mut graph, root, &LayoutConfig::default()).unwrap();
        assert_eq!(layout.size.height, 42.0);
        assert_eq!(layout.size.width, 120.0);
    }

    #[test]
    fn test_small_module_gets_min_height() {
        let mut graph = module(1);
        let root = graph.root();
        let layout = place_module(&mut graph, root, &LayoutConfig::default()).unwrap();
        assert_eq!(layout.size.height, 80.0);
    }

    #[test]
    fn test_outputs_stack_in_declaration_order() {
        let mut graph = module(0);
        let root = graph.root();
        graph.attach(root, primitive("a", "input", &[]), None).unwrap();
        graph.attach(root, primitive("y0", "output", &["d.out"]), None).unwrap();
        graph.attach(root, primitive("y1", "output", &["e.out"]), None).unwrap();
        graph.attach(root, primitive("b", "input", &[]), None).unwrap();
        graph.attach(root, primitive("e", "relu2", &["b.out"]), None).unwrap();
        graph.attach(root, primitive("c", "input", &[]), None).unwrap();
        graph.attach(root, primitive("d", "relu2", &["c.out"]), None).unwrap();

        place_module(&mut graph, root, &LayoutConfig::default()).unwrap();
        assert_eq!(position(&graph, "y0"), Position::new(2, 1));
        assert_eq!(position(&graph, "y1"), Position::new(2, 2));
        assert_eq!(position(&graph, "e"), Position::new(1, 2));
        assert_eq!(position(&graph, "d"), Position::new(1, 3));
    }
}
