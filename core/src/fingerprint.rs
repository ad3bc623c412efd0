/// Change fingerprint for message sequences
use crate::model::{Message, MessageId};
use chrono::{DateTime, Utc};

/// Cheap summary of a message sequence's tail. Two reads with equal
/// fingerprints are treated as the same data and never produce two commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Fingerprint {
    /// Nothing committed since activation
    #[default]
    Unset,
    Empty { len: usize },
    Tail {
        id: MessageId,
        created_at: DateTime<Utc>,
    },
}

impl Fingerprint {
    pub fn of(messages: &[Message]) -> Self {
        match messages.last() {
            Some(last) => Fingerprint::Tail {
                id: last.id,
                created_at: last.created_at,
            },
            None => Fingerprint::Empty { len: messages.len() },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DeliveryState;
    use chrono::TimeZone;

    fn msg(id: u64, secs: i64, text: &str) -> Message {
        Message {
            id: MessageId::Server(id),
            text: text.to_string(),
            created_at: Utc.timestamp_opt(secs, 0).unwrap(),
            is_mine: false,
            delivery: DeliveryState::Confirmed,
        }
    }

    #[test]
    fn test_same_tail_same_fingerprint() {
        let a = vec![msg(1, 10, "hi"), msg(2, 20, "there")];
        // Body of earlier messages does not matter, only the tail pair
        let b = vec![msg(1, 10, "edited"), msg(2, 20, "there")];
        assert_eq!(Fingerprint::of(&a), Fingerprint::of(&b));
    }

    #[test]
    fn test_tail_change_is_detected() {
        let a = vec![msg(1, 10, "hi")];
        let b = vec![msg(1, 10, "hi"), msg(2, 20, "new")];
        let c = vec![msg(1, 11, "hi")];
        assert_ne!(Fingerprint::of(&a), Fingerprint::of(&b));
        assert_ne!(Fingerprint::of(&a), Fingerprint::of(&c));
    }

    #[test]
    fn test_empty_differs_from_unset() {
        let empty = Fingerprint::of(&[]);
        assert_eq!(empty, Fingerprint::Empty { len: 0 });
        assert_ne!(empty, Fingerprint::Unset);
        assert_eq!(Fingerprint::default(), Fingerprint::Unset);
    }
}
