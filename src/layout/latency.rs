//! Clock-cycle and module latency analysis
//!
//! `cycle(c) = max(cycle(source)) + latency(c)` with `max(∅) = -1`. A module
//! input reference counts as a source at cycle 0. Results are cached on the
//! instances and cleared by structural edits through the graph.

use crate::definition::INPUT;
use crate::elaborate::{ConnectionReference, InstanceGraph, InstanceId};
use crate::error::ElabError;

/// Memoized cycle of one instance
pub fn cycle(graph: &mut InstanceGraph, id: InstanceId) -> Result<i64, ElabError> {
    LatencyAnalyzer::new(graph).cycle(id)
}

/// Memoized latency of a module instance; for a primitive its fixed latency
pub fn module_latency(graph: &mut InstanceGraph, module: InstanceId) -> Result<i64, ElabError> {
    LatencyAnalyzer::new(graph).latency(module)
}

/// Annotate every instance in the graph with its cycle and latency
pub fn analyze(graph: &mut InstanceGraph) -> Result<(), ElabError> {
    let mut analyzer = LatencyAnalyzer::new(graph);
    let mut stack = vec![analyzer.graph.root()];
    while let Some(module) = stack.pop() {
        analyzer.latency(module)?;
        let children = analyzer.graph.children(module).to_vec();
        for child in children {
            analyzer.cycle(child)?;
            if analyzer.graph.body(child).is_some() {
                stack.push(child);
            }
        }
    }
    Ok(())
}

/// Recursive-descent evaluator holding the open call stack for cycle detection
struct LatencyAnalyzer<'g> {
    graph: &'g mut InstanceGraph,
    visiting: Vec<InstanceId>,
}

impl<'g> LatencyAnalyzer<'g> {
    fn new(graph: &'g mut InstanceGraph) -> Self {
        Self {
            graph,
            visiting: Vec::new(),
        }
    }

    fn cycle(&mut self, id: InstanceId) -> Result<i64, ElabError> {
        if let Some(cycle) = self.graph.get(id).cycle() {
            return Ok(cycle);
        }
        if self.graph.get(id).type_name == INPUT {
            self.graph.cache_cycle(id, 0);
            return Ok(0);
        }

        if let Some(start) = self.visiting.iter().position(|v| *v == id) {
            let mut path: Vec<String> = self.visiting[start..]
                .iter()
                .map(|v| self.graph.get(*v).id.clone())
                .collect();
            path.push(self.graph.get(id).id.clone());
            return Err(ElabError::cycle(path));
        }

        self.visiting.push(id);
        let result = self.compute_cycle(id);
        self.visiting.pop();

        let cycle = result?;
        tracing::trace!(instance = %self.graph.path(id), cycle, "cycle computed");
        self.graph.cache_cycle(id, cycle);
        Ok(cycle)
    }

    fn compute_cycle(&mut self, id: InstanceId) -> Result<i64, ElabError> {
        let sources: Vec<ConnectionReference> = self.graph.get(id).sources().cloned().collect();
        let mut latest = -1;
        if let Some(module) = self.graph.parent(id) {
            for source in &sources {
                latest = latest.max(self.source_cycle(module, source)?);
            }
        }
        Ok(latest + self.latency(id)?)
    }

    /// Cycle at which `source` becomes available inside `module`
    fn source_cycle(
        &mut self,
        module: InstanceId,
        source: &ConnectionReference,
    ) -> Result<i64, ElabError> {
        match source {
            ConnectionReference::ModuleInput { .. } => Ok(0),
            ConnectionReference::ComponentOutput { component_id, .. } => {
                let sibling = self.graph.child(module, component_id).ok_or_else(|| {
                    ElabError::invalid_reference(
                        self.graph.path(module),
                        source.to_string(),
                        format!("no component '{}' in this module", component_id),
                    )
                })?;
                self.cycle(sibling)
            }
        }
    }

    fn latency(&mut self, id: InstanceId) -> Result<i64, ElabError> {
        if let Some(latency) = self.graph.get(id).latency() {
            return Ok(latency);
        }
        let Some(body) = self.graph.body(id) else {
            // Primitive latency is set during elaboration
            return Ok(1);
        };
        if body.children.is_empty() || body.output_mappings.is_empty() {
            self.graph.cache_module_latency(id, 1);
            return Ok(1);
        }

        let mappings: Vec<ConnectionReference> =
            body.output_mappings.iter().map(|m| m.source.clone()).collect();
        let mut latency = 0;
        for source in &mappings {
            latency = latency.max(self.source_cycle(id, source)?);
        }

        tracing::debug!(module = %self.graph.path(id), latency, "module latency computed");
        self.graph.cache_module_latency(id, latency);
        Ok(latency)
    }
}
