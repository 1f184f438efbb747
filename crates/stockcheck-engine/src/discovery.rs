//! Group discovery: turn the page's raw group snapshots into ordered
//! [`VariantGroup`]s.

use crate::config::DimensionKeywords;
use crate::page::{ensure_current, GroupSnapshot, ListingPage, PageError};
use crate::types::VariantGroup;

/// Discover variant selector groups on the current page, in rendered order.
///
/// Zero groups is a valid result for listings without variants. Positions
/// are renumbered `0..n` after sorting, so gaps or duplicates reported by
/// the page never leak into assignments.
pub async fn discover_groups<P: ListingPage + ?Sized>(
    page: &mut P,
    keywords: &DimensionKeywords,
) -> Result<Vec<VariantGroup>, PageError> {
    let snapshots = page.group_snapshots().await?;
    for snapshot in &snapshots {
        ensure_current(page, &snapshot.handle)?;
    }
    let groups = build_groups(snapshots, keywords);

    tracing::debug!(count = groups.len(), "variant groups discovered");
    for group in &groups {
        tracing::debug!(
            position = group.position,
            label = group.display_label(),
            guess = group.dimension_guess.as_deref().unwrap_or("-"),
            "group"
        );
    }
    Ok(groups)
}

fn build_groups(mut snapshots: Vec<GroupSnapshot>, keywords: &DimensionKeywords) -> Vec<VariantGroup> {
    snapshots.sort_by_key(|s| s.position);
    snapshots
        .into_iter()
        .enumerate()
        .map(|(position, snapshot)| {
            let label = snapshot
                .label
                .map(|l| l.trim().to_string())
                .filter(|l| !l.trim_end_matches(':').trim().is_empty());
            let dimension_guess = label
                .as_deref()
                .and_then(|l| keywords.guess(l))
                .map(str::to_string);
            VariantGroup {
                label,
                dimension_guess,
                position,
                handle: snapshot.handle,
            }
        })
        .collect()
}
