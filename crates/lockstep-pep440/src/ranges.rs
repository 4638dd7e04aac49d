use std::cmp::Ordering;
use std::fmt;
use std::ops::Bound;

/// A set of values described as a sorted union of disjoint intervals.
///
/// The representation is canonical: intervals are non-empty, sorted, and separated by a
/// non-empty gap, so two sets are equal exactly when their intervals are.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Ranges<V> {
    segments: Vec<(Bound<V>, Bound<V>)>,
}

impl<V: Ord + Clone> Ranges<V> {
    /// The empty set.
    pub fn empty() -> Self {
        Self {
            segments: Vec::new(),
        }
    }

    /// The set of all values.
    pub fn full() -> Self {
        Self {
            segments: vec![(Bound::Unbounded, Bound::Unbounded)],
        }
    }

    /// `{ v }`
    pub fn singleton(v: V) -> Self {
        Self {
            segments: vec![(Bound::Included(v.clone()), Bound::Included(v))],
        }
    }

    /// `[v, ∞)`
    pub fn higher_than(v: V) -> Self {
        Self {
            segments: vec![(Bound::Included(v), Bound::Unbounded)],
        }
    }

    /// `(v, ∞)`
    pub fn strictly_higher_than(v: V) -> Self {
        Self {
            segments: vec![(Bound::Excluded(v), Bound::Unbounded)],
        }
    }

    /// `(-∞, v]`
    pub fn lower_than(v: V) -> Self {
        Self {
            segments: vec![(Bound::Unbounded, Bound::Included(v))],
        }
    }

    /// `(-∞, v)`
    pub fn strictly_lower_than(v: V) -> Self {
        Self {
            segments: vec![(Bound::Unbounded, Bound::Excluded(v))],
        }
    }

    /// `[low, high)`
    pub fn between(low: V, high: V) -> Self {
        Self::from_bounds(Bound::Included(low), Bound::Excluded(high))
    }

    fn from_bounds(start: Bound<V>, end: Bound<V>) -> Self {
        if is_valid(&start, &end) {
            Self {
                segments: vec![(start, end)],
            }
        } else {
            Self::empty()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn is_full(&self) -> bool {
        matches!(
            self.segments.as_slice(),
            [(Bound::Unbounded, Bound::Unbounded)]
        )
    }

    /// The intervals of the set, in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = (&Bound<V>, &Bound<V>)> {
        self.segments.iter().map(|(start, end)| (start, end))
    }

    /// The lower bound of the lowest interval, if the set is non-empty.
    pub fn lower_bound(&self) -> Option<&Bound<V>> {
        self.segments.first().map(|(start, _)| start)
    }

    pub fn contains(&self, v: &V) -> bool {
        self.segments.iter().any(|(start, end)| {
            let above = match start {
                Bound::Unbounded => true,
                Bound::Included(start) => v >= start,
                Bound::Excluded(start) => v > start,
            };
            let below = match end {
                Bound::Unbounded => true,
                Bound::Included(end) => v <= end,
                Bound::Excluded(end) => v < end,
            };
            above && below
        })
    }

    #[must_use]
    pub fn complement(&self) -> Self {
        let Some((first, _)) = self.segments.first() else {
            return Self::full();
        };

        let mut segments = Vec::with_capacity(self.segments.len() + 1);
        if let Some(end) = flip(first) {
            segments.push((Bound::Unbounded, end));
        }
        for window in self.segments.windows(2) {
            let (_, previous_end) = &window[0];
            let (next_start, _) = &window[1];
            if let (Some(start), Some(end)) = (flip(previous_end), flip(next_start)) {
                segments.push((start, end));
            }
        }
        if let Some((_, last)) = self.segments.last() {
            if let Some(start) = flip(last) {
                segments.push((start, Bound::Unbounded));
            }
        }
        Self { segments }
    }

    #[must_use]
    pub fn intersection(&self, other: &Self) -> Self {
        let mut segments = Vec::new();
        let (mut left, mut right) = (0, 0);

        while let (Some((left_start, left_end)), Some((right_start, right_end))) =
            (self.segments.get(left), other.segments.get(right))
        {
            let start = max_start(left_start, right_start);
            let end = min_end(left_end, right_end);
            if is_valid(start, end) {
                segments.push((start.clone(), end.clone()));
            }
            if cmp_end(left_end, right_end) == Ordering::Less {
                left += 1;
            } else {
                right += 1;
            }
        }

        Self { segments }
    }

    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        self.complement()
            .intersection(&other.complement())
            .complement()
    }

    /// Whether the two sets share no value.
    pub fn is_disjoint(&self, other: &Self) -> bool {
        self.intersection(other).is_empty()
    }

    /// Whether every value of `self` is in `other`.
    pub fn subset_of(&self, other: &Self) -> bool {
        self.intersection(other) == *self
    }
}

/// The bound that starts where `bound` ends, or ends where `bound` starts.
fn flip<V: Clone>(bound: &Bound<V>) -> Option<Bound<V>> {
    match bound {
        Bound::Included(v) => Some(Bound::Excluded(v.clone())),
        Bound::Excluded(v) => Some(Bound::Included(v.clone())),
        Bound::Unbounded => None,
    }
}

/// Order two lower bounds: `Unbounded < Included(v) < Excluded(v)`.
fn cmp_start<V: Ord>(left: &Bound<V>, right: &Bound<V>) -> Ordering {
    match (left, right) {
        (Bound::Unbounded, Bound::Unbounded) => Ordering::Equal,
        (Bound::Unbounded, _) => Ordering::Less,
        (_, Bound::Unbounded) => Ordering::Greater,
        (Bound::Included(left), Bound::Included(right))
        | (Bound::Excluded(left), Bound::Excluded(right)) => left.cmp(right),
        (Bound::Included(left), Bound::Excluded(right)) => {
            left.cmp(right).then(Ordering::Less)
        }
        (Bound::Excluded(left), Bound::Included(right)) => {
            left.cmp(right).then(Ordering::Greater)
        }
    }
}

/// Order two upper bounds: `Excluded(v) < Included(v) < Unbounded`.
fn cmp_end<V: Ord>(left: &Bound<V>, right: &Bound<V>) -> Ordering {
    match (left, right) {
        (Bound::Unbounded, Bound::Unbounded) => Ordering::Equal,
        (Bound::Unbounded, _) => Ordering::Greater,
        (_, Bound::Unbounded) => Ordering::Less,
        (Bound::Included(left), Bound::Included(right))
        | (Bound::Excluded(left), Bound::Excluded(right)) => left.cmp(right),
        (Bound::Included(left), Bound::Excluded(right)) => {
            left.cmp(right).then(Ordering::Greater)
        }
        (Bound::Excluded(left), Bound::Included(right)) => {
            left.cmp(right).then(Ordering::Less)
        }
    }
}

fn max_start<'a, V: Ord>(left: &'a Bound<V>, right: &'a Bound<V>) -> &'a Bound<V> {
    if cmp_start(left, right) == Ordering::Less {
        right
    } else {
        left
    }
}

fn min_end<'a, V: Ord>(left: &'a Bound<V>, right: &'a Bound<V>) -> &'a Bound<V> {
    if cmp_end(left, right) == Ordering::Greater {
        right
    } else {
        left
    }
}

/// Whether the interval `start..end` contains at least one value.
fn is_valid<V: Ord>(start: &Bound<V>, end: &Bound<V>) -> bool {
    match (start, end) {
        (Bound::Unbounded, _) | (_, Bound::Unbounded) => true,
        (Bound::Included(start), Bound::Included(end)) => start <= end,
        (Bound::Included(start) | Bound::Excluded(start), Bound::Excluded(end))
        | (Bound::Excluded(start), Bound::Included(end)) => start < end,
    }
}

impl<V: fmt::Display + Eq> fmt::Display for Ranges<V> {
    /// Render the set in specifier syntax, e.g. `>=3.8, <4 | >=5`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return f.write_str("∅");
        }
        for (index, (start, end)) in self.segments.iter().enumerate() {
            if index > 0 {
                f.write_str(" | ")?;
            }
            match (start, end) {
                (Bound::Unbounded, Bound::Unbounded) => f.write_str("*")?,
                (Bound::Included(start), Bound::Included(end)) if start == end => {
                    write!(f, "=={start}")?;
                }
                (start, end) => {
                    match start {
                        Bound::Included(v) => write!(f, ">={v}")?,
                        Bound::Excluded(v) => write!(f, ">{v}")?,
                        Bound::Unbounded => {}
                    }
                    if !matches!(start, Bound::Unbounded) && !matches!(end, Bound::Unbounded) {
                        f.write_str(", ")?;
                    }
                    match end {
                        Bound::Included(v) => write!(f, "<={v}")?,
                        Bound::Excluded(v) => write!(f, "<{v}")?,
                        Bound::Unbounded => {}
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complement_round_trips() {
        let set = Ranges::between(2, 5).union(&Ranges::higher_than(8));
        assert_eq!(set.complement().complement(), set);
        assert!(set.complement().contains(&5));
        assert!(set.complement().contains(&7));
        assert!(!set.complement().contains(&8));
        assert_eq!(Ranges::<u32>::empty().complement(), Ranges::full());
    }

    #[test]
    fn union_merges_touching_intervals() {
        let merged = Ranges::between(1, 3).union(&Ranges::between(3, 6));
        assert_eq!(merged, Ranges::between(1, 6));
        let gap = Ranges::between(1, 3).union(&Ranges::between(4, 6));
        assert_eq!(gap.iter().count(), 2);
    }

    #[test]
    fn subset_and_disjoint() {
        let wide = Ranges::higher_than(3);
        let narrow = Ranges::between(4, 5);
        assert!(narrow.subset_of(&wide));
        assert!(!wide.subset_of(&narrow));
        assert!(Ranges::strictly_lower_than(3).is_disjoint(&wide));
        assert!(!Ranges::lower_than(3).is_disjoint(&wide));
        assert!(Ranges::<u32>::empty().subset_of(&narrow));
    }

    #[test]
    fn singleton_complement_excludes_only_the_value() {
        let set = Ranges::singleton(4).complement();
        assert!(set.contains(&3));
        assert!(!set.contains(&4));
        assert!(set.contains(&5));
        assert_eq!(set.to_string(), "<4 | >4");
    }
}
