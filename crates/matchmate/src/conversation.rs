use serde::Serialize;

use crate::models::turn::Turn;

/// The ordered, append-only turn history of one session.
///
/// Only the orchestrator appends; everything else gets read access. Turns are
/// never edited or removed once appended, so the history before any cycle is
/// always a prefix of the history after it.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Conversation {
    turns: Vec<Turn>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub(crate) fn append(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    pub(crate) fn extend<I: IntoIterator<Item = Turn>>(&mut self, turns: I) {
        self.turns.extend(turns);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::role::Role;

    #[test]
    fn test_append_preserves_order() {
        let mut conversation = Conversation::new();
        assert!(conversation.is_empty());

        conversation.append(Turn::user("first"));
        conversation.extend(vec![Turn::assistant("second"), Turn::user("third")]);

        let roles: Vec<Role> = conversation.turns().iter().map(|t| t.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant, Role::User]);
        assert_eq!(conversation.len(), 3);
        assert_eq!(conversation.last().map(|t| t.content.as_str()), Some("third"));
    }
}
