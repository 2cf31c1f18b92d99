//! Conversation reconciliation: merge fetched and sent messages into one
//! ordered, de-duplicated display sequence with day boundaries.
//!
//! `merge` is the only producer of the canonical list. Background polls,
//! direct sends, and completed uploads all go through it, so the displayed
//! sequence is always a function of one merge step.

use crate::message::{ConversationItem, Message};
use chrono::FixedOffset;
use std::collections::HashMap;

/// Merge `incoming` messages into the `current` display sequence.
///
/// Markers are stripped and recomputed; messages are de-duplicated by id
/// (an incoming copy replaces an earlier one whole, last write wins), sorted
/// ascending by timestamp (stable for ties), and a `DateMarker` is emitted
/// before the first message of each local calendar day. `tz` is the viewer's
/// local offset used to place day boundaries.
///
/// Pure and idempotent: `merge(x, [])` equals `merge(x, x)` up to dedup.
pub fn merge(
    current: &[ConversationItem],
    incoming: Vec<Message>,
    tz: FixedOffset,
) -> Vec<ConversationItem> {
    let retained = current.iter().filter_map(|item| item.as_message().cloned());

    let mut order: Vec<Message> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for msg in retained.chain(incoming) {
        match index.get(&msg.id) {
            Some(&at) => order[at] = msg,
            None => {
                index.insert(msg.id.clone(), order.len());
                order.push(msg);
            }
        }
    }

    order.sort_by_key(|m| m.timestamp);

    let mut items = Vec::with_capacity(order.len() + 4);
    let mut last_date = None;
    for msg in order {
        let date = msg.timestamp.with_timezone(&tz).date_naive();
        if last_date != Some(date) {
            items.push(ConversationItem::DateMarker(date));
            last_date = Some(date);
        }
        items.push(ConversationItem::Message(msg));
    }
    items
}

/// The viewer's current local offset, for callers that display in local time.
pub fn local_offset() -> FixedOffset {
    *chrono::Local::now().offset()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::SenderRole;
    use chrono::{DateTime, NaiveDate, Utc};

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).expect("utc offset")
    }

    fn msg(id: &str, text: &str, timestamp: &str) -> Message {
        Message {
            id: id.to_string(),
            sender: SenderRole::Client,
            text: text.to_string(),
            timestamp: timestamp.parse::<DateTime<Utc>>().expect("timestamp"),
            attachment: None,
        }
    }

    fn texts(items: &[ConversationItem]) -> Vec<String> {
        items
            .iter()
            .filter_map(|i| i.as_message())
            .map(|m| m.text.clone())
            .collect()
    }

    #[test]
    fn merge_is_idempotent() {
        let batch = vec![
            msg("1", "a", "2024-01-01T10:00:00Z"),
            msg("2", "b", "2024-01-01T11:00:00Z"),
        ];
        let once = merge(&[], batch.clone(), utc());
        let twice = merge(&once, vec![], utc());
        let again = merge(&once, batch, utc());
        assert_eq!(once, twice);
        assert_eq!(once, again);
    }

    #[test]
    fn incoming_copy_wins_on_id_collision() {
        let current = merge(&[], vec![msg("1", "a", "2024-01-01T10:00:00Z")], utc());
        let merged = merge(&current, vec![msg("1", "b", "2024-01-01T10:00:00Z")], utc());
        assert_eq!(texts(&merged), vec!["b"]);
    }

    #[test]
    fn messages_sort_by_timestamp_regardless_of_merge_order() {
        let t1 = msg("1", "first", "2024-01-01T08:00:00Z");
        let t2 = msg("2", "second", "2024-01-01T09:00:00Z");
        let t3 = msg("3", "third", "2024-01-01T10:00:00Z");

        let a = merge(&[], vec![t3.clone(), t1.clone(), t2.clone()], utc());
        let b = merge(&merge(&[], vec![t2], utc()), vec![t1, t3], utc());
        assert_eq!(texts(&a), vec!["first", "second", "third"]);
        assert_eq!(texts(&a), texts(&b));
    }

    #[test]
    fn equal_timestamps_keep_insertion_order() {
        let merged = merge(
            &[],
            vec![
                msg("1", "a", "2024-01-01T10:00:00Z"),
                msg("2", "b", "2024-01-01T10:00:00Z"),
            ],
            utc(),
        );
        assert_eq!(texts(&merged), vec!["a", "b"]);
    }

    #[test]
    fn date_marker_precedes_first_message_of_each_day() {
        let merged = merge(
            &[],
            vec![
                msg("1", "late", "2024-01-01T23:00:00Z"),
                msg("2", "early", "2024-01-02T01:00:00Z"),
            ],
            utc(),
        );
        let jan1 = NaiveDate::from_ymd_opt(2024, 1, 1).expect("date");
        let jan2 = NaiveDate::from_ymd_opt(2024, 1, 2).expect("date");
        assert_eq!(merged.len(), 4);
        assert_eq!(merged[0], ConversationItem::DateMarker(jan1));
        assert_eq!(merged[1].as_message().expect("message").text, "late");
        assert_eq!(merged[2], ConversationItem::DateMarker(jan2));
        assert_eq!(merged[3].as_message().expect("message").text, "early");
    }

    #[test]
    fn markers_follow_viewer_offset_not_utc() {
        // 23:00Z on Jan 1 is already Jan 2 at UTC+2, so both messages share one day.
        let plus_two = FixedOffset::east_opt(2 * 3600).expect("offset");
        let merged = merge(
            &[],
            vec![
                msg("1", "late", "2024-01-01T23:00:00Z"),
                msg("2", "early", "2024-01-02T01:00:00Z"),
            ],
            plus_two,
        );
        let markers: Vec<_> = merged
            .iter()
            .filter(|i| matches!(i, ConversationItem::DateMarker(_)))
            .collect();
        assert_eq!(markers.len(), 1);
    }

    #[test]
    fn markers_are_recomputed_not_accumulated() {
        let first = merge(&[], vec![msg("1", "a", "2024-01-01T10:00:00Z")], utc());
        let second = merge(&first, vec![msg("2", "b", "2024-01-01T11:00:00Z")], utc());
        let markers = second
            .iter()
            .filter(|i| matches!(i, ConversationItem::DateMarker(_)))
            .count();
        assert_eq!(markers, 1);
        assert_eq!(second.len(), 3);
    }
}
