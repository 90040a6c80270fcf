//! Time-gap clustering with optional size splitting.

use chrono::{DateTime, Duration, Utc};

use super::{days, hours, minutes, Item};
use crate::history::{Message, Summary};

/// Tiered gap schedule: the allowed gap widens as items get older.
///
/// Each tier is `(age, max_gap)`, ascending by age; an item younger than a
/// tier's age uses that tier's gap, anything older falls to `beyond`.
#[derive(Clone, Debug)]
pub struct GapSchedule {
    tiers: Vec<(Duration, Duration)>,
    beyond: Duration,
}

impl GapSchedule {
    pub fn new(mut tiers: Vec<(Duration, Duration)>, beyond: Duration) -> Self {
        tiers.sort_by_key(|(age, _)| *age);
        Self { tiers, beyond }
    }

    /// The render schedule: 20 m within 2 h, 1 h within a day, 1 d beyond.
    pub fn render_default() -> Self {
        Self::new(
            vec![(hours(2), minutes(20)), (days(1), hours(1))],
            days(1),
        )
    }

    /// The summarize schedule: five tiers from minutes up to a day.
    pub fn summarize_default() -> Self {
        Self::new(
            vec![
                (hours(1), minutes(5)),
                (hours(6), minutes(20)),
                (days(1), hours(1)),
                (days(3), hours(6)),
            ],
            days(1),
        )
    }

    /// The max gap for an item of the given date.
    pub fn max_gap(&self, now: DateTime<Utc>, date: DateTime<Utc>) -> Duration {
        let age = now - date;
        for (tier_age, gap) in &self.tiers {
            if age <= *tier_age {
                return *gap;
            }
        }
        self.beyond
    }
}

/// Tiered size limits, same shape as [`GapSchedule`].
#[derive(Clone, Debug)]
pub struct SizeSchedule {
    tiers: Vec<(Duration, usize)>,
    beyond: usize,
}

impl SizeSchedule {
    pub fn new(mut tiers: Vec<(Duration, usize)>, beyond: usize) -> Self {
        tiers.sort_by_key(|(age, _)| *age);
        Self { tiers, beyond }
    }

    /// The summarize schedule: regions may grow with age, anchored on the
    /// configured size threshold.
    pub fn summarize_default(threshold: usize) -> Self {
        Self::new(
            vec![(days(1), threshold / 2), (days(7), threshold)],
            threshold * 2,
        )
    }

    pub fn limit(&self, now: DateTime<Utc>, date: DateTime<Utc>) -> usize {
        let age = now - date;
        for (tier_age, limit) in &self.tiers {
            if age <= *tier_age {
                return *limit;
            }
        }
        self.beyond
    }
}

/// Clusters chronological items into groups: a new group opens whenever the
/// gap between neighbors exceeds the schedule's allowance at that age.
///
/// With a size schedule, oversized groups are split at their largest
/// internal gap (at least one item on each side); oversized singletons have
/// their text truncated to 1.5x the limit.
pub fn group(
    items: Vec<Item>,
    now: DateTime<Utc>,
    gaps: &GapSchedule,
    sizes: Option<&SizeSchedule>,
) -> Vec<Vec<Item>> {
    if items.is_empty() {
        return Vec::new();
    }

    // Walk newest to oldest so the widening schedule follows the descent.
    let mut groups_rev: Vec<Vec<Item>> = Vec::new();
    let mut current_rev: Vec<Item> = Vec::new();
    for item in items.into_iter().rev() {
        match current_rev.last() {
            None => current_rev.push(item),
            Some(newer) => {
                let max_gap = gaps.max_gap(now, item.upper());
                if newer.lower() - item.upper() > max_gap {
                    groups_rev.push(std::mem::take(&mut current_rev));
                }
                current_rev.push(item);
            }
        }
    }
    groups_rev.push(current_rev);

    let mut groups: Vec<Vec<Item>> = groups_rev
        .into_iter()
        .rev()
        .map(|mut g| {
            g.reverse();
            g
        })
        .collect();

    if let Some(sizes) = sizes {
        groups = groups
            .into_iter()
            .flat_map(|g| split_to_size(g, now, sizes))
            .collect();
    }
    groups
}

fn group_size(items: &[Item]) -> usize {
    items.iter().map(|i| i.size(true)).sum()
}

/// Recursively splits a chronological group until each part fits its limit.
fn split_to_size(items: Vec<Item>, now: DateTime<Utc>, sizes: &SizeSchedule) -> Vec<Vec<Item>> {
    let newest = match items.last() {
        Some(item) => item.upper(),
        None => return Vec::new(),
    };
    let limit = sizes.limit(now, newest);
    if group_size(&items) <= limit {
        return vec![items];
    }
    if items.len() == 1 {
        let mut items = items;
        truncate_item(&mut items[0], limit + limit / 2);
        return vec![items];
    }

    // Split at the largest inter-item time gap, one item minimum per side.
    let mut split_at = 1;
    let mut largest = Duration::zero();
    for index in 1..items.len() {
        let gap = items[index].lower() - items[index - 1].upper();
        if gap >= largest {
            largest = gap;
            split_at = index;
        }
    }
    let mut older = items;
    let newer = older.split_off(split_at);
    let mut out = split_to_size(older, now, sizes);
    out.extend(split_to_size(newer, now, sizes));
    out
}

fn truncate_item(item: &mut Item, max_len: usize) {
    match item {
        Item::Message(message) => {
            let mut content = message.content().to_string();
            if content.len() > max_len {
                content.truncate(max_len);
                message.set_content(content);
            }
        }
        Item::Summary(Summary { text, .. }) => {
            if text.len() > max_len {
                text.truncate(max_len);
            }
        }
    }
}
