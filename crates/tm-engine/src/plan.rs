//! Execution planning
//!
//! Apply runs schema files, then custom scripts, then seed data, each stage
//! in path order. Stages are barriers: nothing from a later stage starts
//! until the earlier stage has finished. Rollback files never run on apply.

use crate::report::PlannedUnit;
use tm_core::{FileCategory, Manifest, ManifestFile};

const ALL_CATEGORIES: [FileCategory; 4] = [
    FileCategory::Schema,
    FileCategory::Custom,
    FileCategory::Seed,
    FileCategory::Rollback,
];

fn unit(file: &ManifestFile) -> PlannedUnit {
    PlannedUnit {
        path: file.path.clone(),
        category: file.category,
        checksum: file.checksum.clone(),
    }
}

/// Apply stages, one per non-empty category in execution order
pub fn plan_apply(manifest: &Manifest) -> Vec<Vec<PlannedUnit>> {
    let mut ranked: Vec<(u8, FileCategory)> = ALL_CATEGORIES
        .into_iter()
        .filter_map(|c| c.apply_rank().map(|rank| (rank, c)))
        .collect();
    ranked.sort();

    ranked
        .into_iter()
        .map(|(_, category)| manifest.files_in(category).into_iter().map(unit).collect::<Vec<_>>())
        .filter(|stage| !stage.is_empty())
        .collect()
}

/// Rollback stage: every rollback file in reverse path order
///
/// Files are numbered like forward migrations (`rollback/0001_init.sql`,
/// `rollback/0002_users.sql`), so the highest-numbered undo runs first.
/// Returns an empty plan when the artifact ships no rollback files.
pub fn plan_rollback(manifest: &Manifest) -> Vec<Vec<PlannedUnit>> {
    let mut units: Vec<PlannedUnit> = manifest
        .files_in(FileCategory::Rollback)
        .into_iter()
        .map(unit)
        .collect();
    units.reverse();

    if units.is_empty() {
        Vec::new()
    } else {
        vec![units]
    }
}

#[cfg(test)]
#[path = "plan_test.rs"]
mod tests;
