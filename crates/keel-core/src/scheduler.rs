//! Topological layering of a plan into levels (Kahn's algorithm).
//!
//! Only edges whose source step exists in the plan count towards a step's
//! in-degree; a `needs` id that names no step is dropped. Steps inside a
//! level are listed in plan declaration order but have no ordering
//! constraint among themselves.

use std::collections::HashMap;

use tracing::{debug, warn};

use keel_contracts::{
    ids::StepId,
    plan::{Plan, Step},
};

/// Split `plan` into levels. Level N+1 only contains steps whose in-plan
/// dependencies all sit in levels 0..=N.
///
/// An empty plan yields no levels. Acyclicity is the caller's contract:
/// steps on a cycle never reach in-degree zero and are left out.
pub fn schedule(plan: &Plan) -> Vec<Vec<StepId>> {
    // First declaration of an id wins; later duplicates are dropped.
    let mut position: HashMap<&StepId, usize> = HashMap::with_capacity(plan.len());
    let mut steps: Vec<&Step> = Vec::with_capacity(plan.len());
    for step in &plan.steps {
        if position.contains_key(&step.id) {
            warn!(step_id = %step.id, "duplicate step id in plan; keeping the first");
            continue;
        }
        position.insert(&step.id, steps.len());
        steps.push(step);
    }

    let mut in_degree: HashMap<&StepId, usize> = HashMap::with_capacity(steps.len());
    let mut dependents: HashMap<&StepId, Vec<&StepId>> = HashMap::new();

    for step in steps.iter().copied() {
        let mut degree = 0;
        for need in &step.needs {
            if position.contains_key(need) {
                degree += 1;
                dependents.entry(need).or_default().push(&step.id);
            } else {
                debug!(step_id = %step.id, missing = %need, "ignoring dependency not in plan");
            }
        }
        in_degree.insert(&step.id, degree);
    }

    let mut current: Vec<&StepId> = steps
        .iter()
        .copied()
        .map(|s| &s.id)
        .filter(|id| in_degree.get(id).copied() == Some(0))
        .collect();

    let mut levels = Vec::new();
    let mut scheduled = 0;

    while !current.is_empty() {
        let mut next = Vec::new();
        for id in &current {
            for dependent in dependents.get(id).map(Vec::as_slice).unwrap_or_default() {
                if let Some(degree) = in_degree.get_mut(dependent) {
                    *degree = degree.saturating_sub(1);
                    if *degree == 0 {
                        next.push(*dependent);
                    }
                }
            }
        }
        next.sort_by_key(|id| position[id]);

        scheduled += current.len();
        levels.push(current.into_iter().cloned().collect());
        current = next;
    }

    if scheduled < steps.len() {
        warn!(
            unscheduled = steps.len() - scheduled,
            "plan contains a dependency cycle; cyclic steps were not scheduled"
        );
    }

    levels
}
