//! Mock capabilities and the sample plan used by the demo.
//!
//! The plan compares a repository against its owner's profile:
//!
//! ```text
//!   fetch ──┬── analyze ──┐
//!           └── owner ────┴── summarize
//! ```
//!
//! `analyze` times out on its first call (exercising retry) and `owner`
//! always reports not-found (exercising the `ask_user` degradation).

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};

use serde_json::{json, Value};

use keel_contracts::{
    failure::{ErrorKind, StepFailure},
    ids::StepId,
    plan::{Params, Plan, Step},
};
use keel_core::{traits::Capability, CapabilityRegistry};

fn params(value: Value) -> Params {
    match value {
        Value::Object(map) => map,
        _ => Params::new(),
    }
}

fn fetch_repo(input: &Params, _deps: &BTreeMap<StepId, Params>) -> Result<Params, StepFailure> {
    let repo = input
        .get("repo")
        .and_then(Value::as_str)
        .ok_or_else(|| StepFailure::new(ErrorKind::InvalidInput, "missing 'repo' param"))?;
    Ok(params(json!({
        "repo": repo,
        "stars": 1842,
        "open_issues": 37,
        "language": "Rust",
    })))
}

/// Scores the fetched repository; fails with a timeout the first
/// `fail_first` times it is called.
struct Analyze {
    calls: AtomicU32,
    fail_first: u32,
}

impl Capability for Analyze {
    fn invoke(
        &self,
        _params: &Params,
        deps: &BTreeMap<StepId, Params>,
    ) -> Result<Params, StepFailure> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.fail_first {
            return Err(StepFailure::classified("upstream scorer timed out"));
        }

        let stars = deps
            .get(&StepId::from("fetch"))
            .and_then(|r| r.get("stars"))
            .and_then(Value::as_u64)
            .unwrap_or_default();
        let health = if stars > 1000 { "healthy" } else { "niche" };
        Ok(params(json!({ "health": health, "score": stars / 100 })))
    }
}

fn lookup_owner(input: &Params, _deps: &BTreeMap<StepId, Params>) -> Result<Params, StepFailure> {
    let repo = input.get("repo").and_then(Value::as_str).unwrap_or_default();
    Err(StepFailure::new(
        ErrorKind::NotFound,
        format!("no owner profile matches '{}'", repo),
    ))
}

fn summarize(_input: &Params, deps: &BTreeMap<StepId, Params>) -> Result<Params, StepFailure> {
    let health = deps
        .get(&StepId::from("analyze"))
        .and_then(|r| r.get("health"))
        .and_then(Value::as_str)
        .unwrap_or("unknown");
    let owner_known = deps
        .get(&StepId::from("owner"))
        .is_some_and(|r| !r.contains_key("ask_user"));

    let mut text = format!("The repository looks {}.", health);
    if !owner_known {
        text.push_str(" Which owner did you mean?");
    }
    Ok(params(json!({ "text": text })))
}

/// Registry with every capability the sample plan uses.
pub fn registry() -> CapabilityRegistry {
    CapabilityRegistry::new()
        .with("fetch_repo", fetch_repo)
        .with(
            "analyze",
            Analyze {
                calls: AtomicU32::new(0),
                fail_first: 1,
            },
        )
        .with("lookup_owner", lookup_owner)
        .with("summarize", summarize)
}

/// The four-step comparison plan for `repo`.
pub fn sample_plan(repo: &str) -> Plan {
    Plan::new(vec![
        Step::new("fetch", "fetch_repo").param("repo", json!(repo)),
        Step::new("analyze", "analyze").needs("fetch"),
        Step::new("owner", "lookup_owner").needs("fetch").param("repo", json!(repo)),
        Step::new("summarize", "summarize").needs("analyze").needs("owner"),
    ])
}
