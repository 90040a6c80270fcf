//! Budgeted selection of messages and summaries.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use super::Item;
use crate::history::{Message, Summary};

/// Cutoffs and budget for [`assemble`]. Priority of cutoffs, strongest
/// first: `max_date` > `min_message` > `min_date` > `max_message`.
#[derive(Clone, Debug)]
pub struct AssembleOptions {
    /// Which summary to pick at a key holding several (clamped to the list).
    pub summary_rank_threshold: usize,
    /// Count message summaries instead of contents when present.
    pub use_message_summaries: bool,
    /// Character budget.
    pub max_size: usize,
    /// Items kept even against the budget and date floor.
    pub min_message: usize,
    /// Hard cap on item count once the minimum is satisfied.
    pub max_message: Option<usize>,
    /// Items older than this are dropped once the minimum is satisfied.
    pub min_date: Option<DateTime<Utc>>,
    /// Items at or past this instant are always excluded.
    pub max_date: Option<DateTime<Utc>>,
}

impl Default for AssembleOptions {
    fn default() -> Self {
        Self {
            summary_rank_threshold: 0,
            use_message_summaries: true,
            max_size: 4000,
            min_message: 0,
            max_message: None,
            min_date: None,
            max_date: None,
        }
    }
}

/// Selects messages and summaries within the character budget, walking the
/// channel newest to oldest. Returns the selection in chronological order.
///
/// When the budget overflows, assembled items are substituted by summaries
/// covering them (newest first); if no substitution helps, the last added
/// item is dropped and the walk continues.
pub fn assemble(
    messages: &[Message],
    summaries: &BTreeMap<DateTime<Utc>, Vec<Summary>>,
    options: &AssembleOptions,
) -> Vec<Item> {
    // Built newest-first, reversed on return.
    let mut assembled: Vec<Item> = Vec::new();
    let mut total = 0usize;
    // Once a summary is included, messages inside its span are covered.
    let mut covered_after: Option<DateTime<Utc>> = None;

    for message in messages.iter().rev() {
        if options.max_date.is_some_and(|cutoff| message.date() >= cutoff) {
            continue;
        }
        let quota_met = assembled.len() >= options.min_message;
        if options.min_date.is_some_and(|floor| message.date() < floor) && quota_met {
            break;
        }
        if options
            .max_message
            .is_some_and(|cap| assembled.len() >= cap)
            && quota_met
        {
            break;
        }
        if covered_after.is_some_and(|span_start| message.date() >= span_start) {
            continue;
        }

        let item = match summaries.get(&message.date()).filter(|_| quota_met) {
            Some(list) if !list.is_empty() => {
                let rank = options.summary_rank_threshold.min(list.len() - 1);
                let summary = list[rank].clone();
                covered_after = Some(summary.min_date);
                Item::Summary(summary)
            }
            _ => Item::Message(message.clone()),
        };

        total += item.size(options.use_message_summaries);
        assembled.push(item);

        if total > options.max_size {
            if let Some(span_start) = backtrack(&mut assembled, summaries, &mut total, options) {
                covered_after =
                    Some(covered_after.map_or(span_start, |current| current.min(span_start)));
            }
            if total > options.max_size && assembled.len() > options.min_message {
                let dropped = assembled.pop().expect("just pushed");
                total -= dropped.size(options.use_message_summaries);
            }
        }
    }

    assembled.reverse();
    assembled
}

/// Substitutes assembled items by covering summaries until the budget fits
/// or no improving substitution exists.
///
/// For each assembled item (newest first), a summary keyed at the item's
/// upper boundary whose `min_date` is strictly older than the item's lower
/// boundary replaces every assembled item wholly contained in its span.
fn backtrack(
    assembled: &mut Vec<Item>,
    summaries: &BTreeMap<DateTime<Utc>, Vec<Summary>>,
    total: &mut usize,
    options: &AssembleOptions,
) -> Option<DateTime<Utc>> {
    // Each substitution strictly widens a covered span, so the loop is
    // bounded by the number of stored summaries.
    let mut budget = summaries.values().map(Vec::len).sum::<usize>();
    let mut widest: Option<DateTime<Utc>> = None;
    while *total > options.max_size && budget > 0 {
        budget -= 1;
        let Some((summary, position)) = find_substitution(assembled, summaries) else {
            break;
        };
        let span = (summary.min_date, summary.max_date);
        let mut insert_at = position;
        let mut index = 0;
        while index < assembled.len() {
            let item = &assembled[index];
            if item.lower() >= span.0 && item.upper() <= span.1 {
                *total -= item.size(options.use_message_summaries);
                assembled.remove(index);
                // The earliest removed position in a newest-first list is
                // the largest index touched.
                insert_at = index;
            } else {
                index += 1;
            }
        }
        *total += summary.text.len();
        widest = Some(widest.map_or(span.0, |current: DateTime<Utc>| current.min(span.0)));
        assembled.insert(insert_at.min(assembled.len()), Item::Summary(summary));
    }
    widest
}

fn find_substitution(
    assembled: &[Item],
    summaries: &BTreeMap<DateTime<Utc>, Vec<Summary>>,
) -> Option<(Summary, usize)> {
    for (position, item) in assembled.iter().enumerate() {
        if let Some(list) = summaries.get(&item.upper()) {
            if let Some(summary) = list.iter().find(|s| s.min_date < item.lower()) {
                return Some((summary.clone(), position));
            }
        }
    }
    None
}
