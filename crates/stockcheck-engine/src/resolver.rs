//! Dimension resolution: pair each requested dimension with the on-page
//! group that carries it, then order the pairs by page position.
//!
//! Sellers order their selectors freely (size first on one listing, colour
//! first on the next). Selections must follow the page order because later
//! groups often re-render when an earlier one changes, so assignments are
//! always sorted by group position, never by request order.

use std::collections::HashSet;

use crate::config::DimensionKeywords;
use crate::types::{DimensionAssignment, ResolutionGap, VariantGroup, VariantRequest};

/// Assignments in processing order plus the dimensions left unresolved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    pub assignments: Vec<DimensionAssignment>,
    pub gaps: Vec<ResolutionGap>,
}

/// Resolve the dimensions of `request` against `groups`.
///
/// Pass one: each dimension, in request order, claims the first unclaimed
/// group whose label carries one of its keywords. Pass two (when
/// `positional_fallback` is set): a dimension still unresolved claims the
/// only unclaimed group no known keyword recognizes. Two or more such
/// groups are ambiguous and leave a gap.
pub fn resolve(
    groups: &[VariantGroup],
    request: &VariantRequest,
    keywords: &DimensionKeywords,
    positional_fallback: bool,
) -> Resolution {
    let mut claimed: HashSet<usize> = HashSet::new();
    let mut assignments = Vec::new();
    let mut unresolved = Vec::new();

    for dim in request.dimensions() {
        let hit = groups.iter().find(|g| {
            !claimed.contains(&g.position)
                && g.label
                    .as_deref()
                    .is_some_and(|label| keywords.label_matches(&dim.name, label))
        });
        match hit {
            Some(group) => {
                claimed.insert(group.position);
                assignments.push(DimensionAssignment {
                    position: group.position,
                    dimension: dim.name.clone(),
                    value: dim.value.clone(),
                });
            }
            None => unresolved.push(dim),
        }
    }

    let mut gaps = Vec::new();
    for dim in unresolved {
        let fallback = if positional_fallback {
            sole_unrecognized(groups, &claimed, keywords)
        } else {
            None
        };
        match fallback {
            Some(group) => {
                tracing::debug!(
                    dimension = %dim.name,
                    position = group.position,
                    "dimension resolved by position"
                );
                claimed.insert(group.position);
                assignments.push(DimensionAssignment {
                    position: group.position,
                    dimension: dim.name.clone(),
                    value: dim.value.clone(),
                });
            }
            None => {
                tracing::debug!(dimension = %dim.name, "no group for dimension");
                gaps.push(ResolutionGap {
                    dimension: dim.name.clone(),
                    value: dim.value.clone(),
                });
            }
        }
    }

    assignments.sort_by_key(|a| a.position);
    Resolution { assignments, gaps }
}

fn sole_unrecognized<'g>(
    groups: &'g [VariantGroup],
    claimed: &HashSet<usize>,
    keywords: &DimensionKeywords,
) -> Option<&'g VariantGroup> {
    let mut candidates = groups.iter().filter(|g| {
        !claimed.contains(&g.position)
            && g.label.as_deref().map_or(true, |l| !keywords.recognizes(l))
    });
    let first = candidates.next()?;
    match candidates.next() {
        Some(_) => None,
        None => Some(first),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::{Generation, GroupHandle};

    fn group(label: Option<&str>, position: usize) -> VariantGroup {
        let keywords = DimensionKeywords::default();
        VariantGroup {
            label: label.map(String::from),
            dimension_guess: label.and_then(|l| keywords.guess(l)).map(String::from),
            position,
            handle: GroupHandle {
                generation: Generation(1),
                slot: position,
            },
        }
    }

    fn request(dims: &[(&str, &str)]) -> VariantRequest {
        VariantRequest::new("r", "https://example.com/itm/1", dims.iter().copied()).unwrap()
    }

    fn order(res: &Resolution) -> Vec<&str> {
        res.assignments.iter().map(|a| a.dimension.as_str()).collect()
    }

    #[test]
    fn test_page_order_independent_of_request_order() {
        let size_first = [group(Some("Size:"), 0), group(Some("Colour:"), 1)];
        let colour_first = [group(Some("Colour:"), 0), group(Some("Size:"), 1)];
        let kw = DimensionKeywords::default();

        for req in [
            request(&[("size", "80 x 150 cm"), ("variation", "Grey")]),
            request(&[("variation", "Grey"), ("size", "80 x 150 cm")]),
        ] {
            let res = resolve(&size_first, &req, &kw, true);
            assert_eq!(order(&res), ["size", "variation"]);
            assert!(res.gaps.is_empty());

            let res = resolve(&colour_first, &req, &kw, true);
            assert_eq!(order(&res), ["variation", "size"]);
            assert!(res.gaps.is_empty());
            assert!(res.assignments.windows(2).all(|w| w[0].position < w[1].position));
        }
    }

    #[test]
    fn test_missing_group_is_a_gap() {
        let groups = [group(Some("Size:"), 0)];
        let req = request(&[("size", "S"), ("variation", "Navy")]);
        let res = resolve(&groups, &req, &DimensionKeywords::default(), true);
        assert_eq!(order(&res), ["size"]);
        assert_eq!(
            res.gaps,
            [ResolutionGap {
                dimension: "variation".into(),
                value: "Navy".into()
            }]
        );
    }

    #[test]
    fn test_group_claimed_at_most_once() {
        let groups = [group(Some("Colour / Design"), 0)];
        let req = request(&[("variation", "Grey"), ("colour", "Grey")]);
        let res = resolve(&groups, &req, &DimensionKeywords::default(), false);
        assert_eq!(res.assignments.len(), 1);
        assert_eq!(res.gaps.len(), 1);
    }

    #[test]
    fn test_absent_value_never_assigned() {
        let groups = [group(Some("Size:"), 0), group(Some("Colour:"), 1)];
        let req = request(&[("size", ""), ("variation", "Grey")]);
        let res = resolve(&groups, &req, &DimensionKeywords::default(), true);
        assert_eq!(order(&res), ["variation"]);
        assert!(res.gaps.is_empty());
    }

    #[test]
    fn test_positional_fallback_for_unlabeled_group() {
        let groups = [group(Some("Size:"), 0), group(None, 1)];
        let req = request(&[("variation", "Grey"), ("size", "S")]);
        let kw = DimensionKeywords::default();

        let res = resolve(&groups, &req, &kw, true);
        assert_eq!(order(&res), ["size", "variation"]);
        assert_eq!(res.assignments[1].position, 1);

        let res = resolve(&groups, &req, &kw, false);
        assert_eq!(order(&res), ["size"]);
        assert_eq!(res.gaps[0].dimension, "variation");
    }

    #[test]
    fn test_positional_fallback_refuses_ambiguity() {
        let groups = [group(None, 0), group(Some("Quantity"), 1)];
        let req = request(&[("variation", "Grey")]);
        let res = resolve(&groups, &req, &DimensionKeywords::default(), true);
        assert!(res.assignments.is_empty());
        assert_eq!(res.gaps.len(), 1);
    }

    #[test]
    fn test_fallback_never_takes_a_recognized_group() {
        let groups = [group(Some("Size:"), 0)];
        let req = request(&[("variation", "Grey")]);
        let res = resolve(&groups, &req, &DimensionKeywords::default(), true);
        assert!(res.assignments.is_empty());
    }

    #[test]
    fn test_empty_request_resolves_to_nothing() {
        let groups = [group(Some("Size:"), 0)];
        let req = request(&[]);
        let res = resolve(&groups, &req, &DimensionKeywords::default(), true);
        assert_eq!(res, Resolution::default());
    }
}
