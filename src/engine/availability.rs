use ulid::Ulid;

use crate::model::*;

// ── Availability checks over a vehicle's reservations ───────────

/// First reservation in the active set whose window overlaps `span`, skipping
/// `exclude` (the reservation being edited).
pub fn find_conflict<'a>(
    reservations: &'a [Reservation],
    span: &Span,
    exclude: Option<Ulid>,
) -> Option<&'a Reservation> {
    reservations
        .iter()
        .filter(|r| Some(r.id) != exclude)
        .filter(|r| r.occupies())
        .find(|r| r.span.overlaps(span))
}

pub fn is_free(reservations: &[Reservation], span: &Span, exclude: Option<Ulid>) -> bool {
    find_conflict(reservations, span, exclude).is_none()
}

/// Windows held by active reservations, clipped to `query`, sorted and merged.
pub fn occupied_spans(reservations: &[Reservation], query: &Span) -> Vec<Span> {
    let mut spans: Vec<Span> = reservations
        .iter()
        .filter(|r| r.occupies() && r.span.overlaps(query))
        .map(|r| Span::new(r.span.start.max(query.start), r.span.end.min(query.end)))
        .collect();
    spans.sort_by_key(|s| s.start);
    merge_overlapping(&spans)
}

/// Sub-spans of `query` not held by any active reservation.
pub fn free_windows(reservations: &[Reservation], query: &Span) -> Vec<Span> {
    subtract_intervals(&[*query], &occupied_spans(reservations, query))
}

/// Merge sorted overlapping/adjacent intervals into disjoint intervals.
pub fn merge_overlapping(sorted: &[Span]) -> Vec<Span> {
    let mut merged: Vec<Span> = Vec::new();
    for &span in sorted {
        if let Some(last) = merged.last_mut()
            && span.start <= last.end
        {
            last.end = last.end.max(span.end);
            continue;
        }
        merged.push(span);
    }
    merged
}

/// `base` minus `to_remove`. Both inputs sorted and disjoint.
pub fn subtract_intervals(base: &[Span], to_remove: &[Span]) -> Vec<Span> {
    let mut result = Vec::new();
    let mut ri = 0;

    for &b in base {
        let mut current_start = b.start;
        let current_end = b.end;

        while ri < to_remove.len() && to_remove[ri].end <= current_start {
            ri += 1;
        }

        let mut j = ri;
        while j < to_remove.len() && to_remove[j].start < current_end {
            let r = &to_remove[j];
            if r.start > current_start {
                result.push(Span::new(current_start, r.start));
            }
            current_start = current_start.max(r.end);
            j += 1;
        }

        if current_start < current_end {
            result.push(Span::new(current_start, current_end));
        }
    }

    result
}
