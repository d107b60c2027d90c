//! Steps listing command

use super::registry_helper::build_registry;
use anyhow::Result;
use enrich_core::StepPolicy;

pub fn list_steps() -> Result<()> {
    let registry = build_registry()?;
    let order = registry.resolve_order(None)?;

    println!("Registered steps (dependency order):");
    for name in order {
        let Some(step) = registry.get(&name) else {
            continue;
        };
        let policy = match step.policy() {
            StepPolicy::Required => "required",
            StepPolicy::BestEffort => "best-effort",
        };
        println!("\n{name}");
        println!("  Version: {}", step.version());
        println!("  Schema:  {}", step.schema_id());
        println!("  Policy:  {policy}");
        if step.requires().is_empty() {
            println!("  Requires: (none)");
        } else {
            println!("  Requires: {}", step.requires().join(", "));
        }
        if !step.config_keys().is_empty() {
            println!("  Config keys: {}", step.config_keys().join(", "));
        }
    }
    Ok(())
}
