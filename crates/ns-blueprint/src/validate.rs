//! Structural checks run before any remote call.

use std::collections::{HashMap, HashSet};

use crate::error::BlueprintError;
use crate::model::{Blueprint, FORMAT_VERSION, PageSpec, ParentKind};

/// Reject blueprints whose references cannot be reconciled in dependency order.
pub fn validate(blueprint: &Blueprint) -> Result<(), BlueprintError> {
    if blueprint.format_version != FORMAT_VERSION {
        return Err(BlueprintError::UnsupportedFormatVersion {
            found: blueprint.format_version,
            expected: FORMAT_VERSION,
        });
    }

    let plan = &blueprint.plan;
    let mut seen: HashSet<&str> = HashSet::new();
    let ids = plan
        .roots
        .iter()
        .map(|r| r.synth_id.as_str())
        .chain(plan.databases.iter().map(|d| d.synth_id.as_str()))
        .chain(plan.pages.iter().map(|p| p.synth_id.as_str()))
        .chain(plan.rows.iter().map(|r| r.synth_id.as_str()))
        .chain(plan.comments.iter().map(|c| c.synth_id.as_str()));
    for id in ids {
        if !seen.insert(id) {
            return Err(BlueprintError::DuplicateSynthId(id.to_string()));
        }
    }

    let roots: HashSet<&str> = plan.roots.iter().map(|r| r.synth_id.as_str()).collect();
    let pages: HashMap<&str, &PageSpec> =
        plan.pages.iter().map(|p| (p.synth_id.as_str(), p)).collect();
    let databases: HashSet<&str> = plan.databases.iter().map(|d| d.synth_id.as_str()).collect();

    for db in &plan.databases {
        if db.parent_type == ParentKind::Page && !roots.contains(db.parent_synth_id.as_str()) {
            if pages.contains_key(db.parent_synth_id.as_str()) {
                return Err(BlueprintError::DatabaseParentNotRoot {
                    synth_id: db.synth_id.clone(),
                    parent: db.parent_synth_id.clone(),
                });
            }
            return Err(BlueprintError::UnresolvedParent {
                kind: "database",
                synth_id: db.synth_id.clone(),
                parent: db.parent_synth_id.clone(),
            });
        }
    }

    for page in &plan.pages {
        if page.parent_type == ParentKind::Page
            && !roots.contains(page.parent_synth_id.as_str())
            && !pages.contains_key(page.parent_synth_id.as_str())
        {
            return Err(BlueprintError::UnresolvedParent {
                kind: "page",
                synth_id: page.synth_id.clone(),
                parent: page.parent_synth_id.clone(),
            });
        }
    }
    // Every page chain must terminate at a root; this also rejects cycles.
    pages_in_dependency_order(blueprint)?;

    for row in &plan.rows {
        if !databases.contains(row.database_synth_id.as_str()) {
            return Err(BlueprintError::UnresolvedParent {
                kind: "row",
                synth_id: row.synth_id.clone(),
                parent: row.database_synth_id.clone(),
            });
        }
    }

    for comment in &plan.comments {
        let target = comment.page_synth_id.as_str();
        if !pages.contains_key(target) && !roots.contains(target) {
            return Err(BlueprintError::UnresolvedParent {
                kind: "comment",
                synth_id: comment.synth_id.clone(),
                parent: comment.page_synth_id.clone(),
            });
        }
    }

    let mut events: HashSet<&str> = HashSet::new();
    for event in &blueprint.activity_stream {
        if !events.insert(event.event_id.as_str()) {
            return Err(BlueprintError::DuplicateEventId(event.event_id.clone()));
        }
    }

    Ok(())
}

/// Pages ordered so every page-typed parent precedes its children. Input
/// order is kept among pages of equal depth.
pub fn pages_in_dependency_order(
    blueprint: &Blueprint,
) -> Result<Vec<&PageSpec>, BlueprintError> {
    let plan = &blueprint.plan;
    let pages: HashMap<&str, &PageSpec> =
        plan.pages.iter().map(|p| (p.synth_id.as_str(), p)).collect();

    let mut depths: HashMap<&str, usize> = HashMap::new();
    for page in &plan.pages {
        let mut depth = 0usize;
        let mut cursor = page;
        while cursor.parent_type == ParentKind::Page {
            match pages.get(cursor.parent_synth_id.as_str()) {
                Some(parent) => {
                    depth += 1;
                    if depth > pages.len() {
                        return Err(BlueprintError::ParentCycle(page.synth_id.clone()));
                    }
                    cursor = parent;
                }
                // Parent is a root (or validated elsewhere).
                None => break,
            }
        }
        depths.insert(page.synth_id.as_str(), depth);
    }

    let mut ordered: Vec<&PageSpec> = plan.pages.iter().collect();
    ordered.sort_by_key(|p| depths.get(p.synth_id.as_str()).copied().unwrap_or(0));
    Ok(ordered)
}
