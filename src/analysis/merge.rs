/// Duplicate event merger.
///
/// Sweeps over overlapping windows can record the same episode twice, or
/// record pieces of one episode as separate events. This module collapses
/// overlapping events of the same category into a single event:
///
/// - events are ordered by `date_start`;
/// - an event overlaps the running merge candidate when the candidate is
///   open, or when it starts at or before the candidate's end;
/// - a merged event keeps the earliest start, the highest strength, and
///   the latest end (open if any member is open);
/// - every group of two or more events is replaced by one event with a
///   fresh id.
///
/// Running the merger on its own output changes nothing.

use chrono::{DateTime, Utc};
use log::debug;
use std::collections::HashSet;
use uuid::Uuid;

use crate::model::{City, CityId, EventCategory, ExtremeWeatherEvent, MergeSummary};

// ---------------------------------------------------------------------------
// Scope
// ---------------------------------------------------------------------------

/// Which events a merge pass looks at.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeScope {
    /// Only events whose `date_start` lies within `[start, end]`.
    /// `None` means every event.
    pub window: Option<(DateTime<Utc>, DateTime<Utc>)>,
    /// Categories to process, each independently.
    pub categories: Vec<EventCategory>,
}

impl MergeScope {
    /// Every event of every category.
    pub fn all() -> Self {
        MergeScope {
            window: None,
            categories: EventCategory::ALL.to_vec(),
        }
    }

    /// Events of every category starting within `[start, end]`.
    pub fn between(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        MergeScope {
            window: Some((start, end)),
            ..Self::all()
        }
    }

    /// Events of every category that overlap `[start, end]`, directly or
    /// through a chain of overlapping events.
    ///
    /// The window start is pulled back to the earliest `date_start` of any
    /// such event, so an episode that began before `start` and was
    /// re-detected by a later sweep is merged together with its copy.
    pub fn covering(events: &[ExtremeWeatherEvent], start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        let mut from = start;

        loop {
            let earliest = events
                .iter()
                .filter(|e| e.date_start < from && e.date_start <= end)
                .filter(|e| e.date_end.is_none_or(|date_end| date_end >= from))
                .map(|e| e.date_start)
                .min();

            match earliest {
                Some(earlier) => from = earlier,
                None => break,
            }
        }

        Self::between(from, end)
    }

    /// Restricts the scope to the given categories.
    pub fn only(mut self, categories: &[EventCategory]) -> Self {
        self.categories = EventCategory::ALL
            .into_iter()
            .filter(|c| categories.contains(c))
            .collect();
        self
    }

    pub fn contains(&self, event: &ExtremeWeatherEvent) -> bool {
        match self.window {
            Some((start, end)) => event.date_start >= start && event.date_start <= end,
            None => true,
        }
    }
}

impl Default for MergeScope {
    fn default() -> Self {
        Self::all()
    }
}

// ---------------------------------------------------------------------------
// Planning
// ---------------------------------------------------------------------------

/// Changes a merge pass wants to apply to a city's event list.
#[derive(Debug, Clone, Default)]
pub struct MergePlan {
    pub remove: Vec<Uuid>,
    pub insert: Vec<ExtremeWeatherEvent>,
}

/// Returns true when `next` must be merged into `candidate`.
/// `candidate` must not start after `next`.
pub fn overlaps(candidate: &ExtremeWeatherEvent, next: &ExtremeWeatherEvent) -> bool {
    match candidate.date_end {
        None => true,
        Some(end) => next.date_start <= end,
    }
}

/// Plans the merge of one category's events. All events must share the
/// category; their order does not matter.
pub fn plan_category(mut events: Vec<&ExtremeWeatherEvent>) -> MergePlan {
    let mut plan = MergePlan::default();

    events.sort_by_key(|e| e.date_start);
    let mut remaining = events.into_iter();

    let Some(first) = remaining.next() else {
        return plan;
    };

    let mut candidate = first.clone();
    let mut group = vec![first.id];

    for next in remaining {
        if overlaps(&candidate, next) {
            group.push(next.id);
            candidate.strength = candidate.strength.max(next.strength);
            candidate.date_end = match (candidate.date_end, next.date_end) {
                (Some(a), Some(b)) => Some(a.max(b)),
                _ => None,
            };
        } else {
            flush(&mut plan, candidate, &group);
            candidate = next.clone();
            group = vec![next.id];
        }
    }

    flush(&mut plan, candidate, &group);
    plan
}

fn flush(plan: &mut MergePlan, mut candidate: ExtremeWeatherEvent, group: &[Uuid]) {
    if group.len() < 2 {
        return;
    }

    debug!(
        "city {}: merging {} {} events into one starting {}",
        candidate.city_id,
        group.len(),
        candidate.category,
        candidate.date_start
    );

    plan.remove.extend_from_slice(group);
    candidate.id = Uuid::new_v4();
    plan.insert.push(candidate);
}

// ---------------------------------------------------------------------------
// Applying
// ---------------------------------------------------------------------------

/// Merges the in-scope events of an in-memory city, category by category.
///
/// The caller persists the city once afterwards.
pub fn merge_city(city: &mut City, scope: &MergeScope) -> MergeSummary {
    let mut plan = MergePlan::default();

    for category in EventCategory::ALL {
        if !scope.categories.contains(&category) {
            continue;
        }

        let in_scope: Vec<&ExtremeWeatherEvent> = city
            .events
            .iter()
            .filter(|e| e.category == category && scope.contains(e))
            .collect();

        let category_plan = plan_category(in_scope);
        plan.remove.extend(category_plan.remove);
        plan.insert.extend(category_plan.insert);
    }

    apply(city.id, &mut city.events, plan)
}

fn apply(city_id: CityId, events: &mut Vec<ExtremeWeatherEvent>, plan: MergePlan) -> MergeSummary {
    let doomed: HashSet<Uuid> = plan.remove.iter().copied().collect();
    let before = events.len();

    events.retain(|e| !doomed.contains(&e.id));
    let removed = before - events.len();
    let inserted = plan.insert.len();
    events.extend(plan.insert);

    if removed > 0 {
        debug!("city {}: merge removed {}, inserted {}", city_id, removed, inserted);
    }

    MergeSummary { removed, inserted }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
