use crate::model::*;

// ── Free/busy over the shared timeline ──────────────────────────

/// Merge spans sorted by start into disjoint spans. Touching spans are joined,
/// so back-to-back slots read as one busy block.
pub fn merge_touching(sorted: &[Span]) -> Vec<Span> {
    let mut merged: Vec<Span> = Vec::with_capacity(sorted.len());
    for &span in sorted {
        match merged.last_mut() {
            Some(last) if span.start <= last.end => last.end = last.end.max(span.end),
            _ => merged.push(span),
        }
    }
    merged
}

/// Parts of `window` not covered by `busy` (sorted, disjoint).
pub fn free_within(window: &Span, busy: &[Span]) -> Vec<Span> {
    let mut free = Vec::new();
    let mut cursor = window.start;
    for b in busy {
        if b.end <= cursor {
            continue;
        }
        if b.start >= window.end {
            break;
        }
        if b.start > cursor {
            free.push(Span::new(cursor, b.start));
        }
        cursor = cursor.max(b.end);
    }
    if cursor < window.end {
        free.push(Span::new(cursor, window.end));
    }
    free
}

/// Clamp each span to `window`, dropping spans that fall outside it.
pub(crate) fn clamp_to(window: &Span, spans: impl Iterator<Item = Span>) -> Vec<Span> {
    spans
        .map(|s| Span::new(s.start.max(window.start), s.end.min(window.end)))
        .filter(Span::is_well_formed)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_joins_touching_and_overlapping() {
        let spans = [
            Span::new(0, 10),
            Span::new(10, 20),
            Span::new(15, 25),
            Span::new(30, 40),
        ];
        assert_eq!(
            merge_touching(&spans),
            vec![Span::new(0, 25), Span::new(30, 40)]
        );
    }

    #[test]
    fn merge_empty() {
        assert!(merge_touching(&[]).is_empty());
    }

    #[test]
    fn free_within_gaps() {
        let window = Span::new(0, 100);
        let busy = [Span::new(10, 20), Span::new(50, 60)];
        assert_eq!(
            free_within(&window, &busy),
            vec![Span::new(0, 10), Span::new(20, 50), Span::new(60, 100)]
        );
    }

    #[test]
    fn free_within_fully_busy() {
        let window = Span::new(10, 20);
        assert!(free_within(&window, &[Span::new(0, 30)]).is_empty());
    }

    #[test]
    fn free_within_nothing_busy() {
        let window = Span::new(10, 20);
        assert_eq!(free_within(&window, &[]), vec![window]);
    }

    #[test]
    fn free_within_busy_outside_window() {
        let window = Span::new(100, 200);
        let busy = [Span::new(0, 50), Span::new(250, 300)];
        assert_eq!(free_within(&window, &busy), vec![window]);
    }

    #[test]
    fn clamp_drops_outside() {
        let window = Span::new(10, 20);
        let spans = vec![Span::new(0, 15), Span::new(18, 30), Span::new(20, 25)];
        assert_eq!(
            clamp_to(&window, spans.into_iter()),
            vec![Span::new(10, 15), Span::new(18, 20)]
        );
    }
}
