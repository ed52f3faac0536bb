//! Wager tickets and the records they produce when settled.

use chrono::NaiveDate;
use ordinalizer::Ordinal;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumCount, EnumIter, EnumString};

/// Stakes are placed in multiples of 100 yen.
pub const BET_UNIT: u64 = 100;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Ordinal,
    Display,
    EnumCount,
    EnumIter,
    EnumString,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TicketKind {
    Win,
    Place,
    Quinella,
    Wide,
    Exacta,
    Trio,
    Trifecta,
}
impl TicketKind {
    /// Number of horses named on a ticket of this kind.
    pub fn legs(&self) -> usize {
        match self {
            TicketKind::Win | TicketKind::Place => 1,
            TicketKind::Quinella | TicketKind::Wide | TicketKind::Exacta => 2,
            TicketKind::Trio | TicketKind::Trifecta => 3,
        }
    }

    /// Whether the position of each named horse matters.
    pub fn ordered(&self) -> bool {
        matches!(self, TicketKind::Exacta | TicketKind::Trifecta)
    }
}

/// A single wager: one kind, one canonical set or sequence of horse numbers,
/// one stake. The stake is zero until the bankroll sizes the ticket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub kind: TicketKind,
    pub numbers: Vec<usize>,
    pub odds: f64,
    pub amount: u64,
    pub strategy: String,
    pub expected_value: f64,
    pub weight: f64,
    pub estimated_odds: bool,
}
impl Ticket {
    pub fn new(
        kind: TicketKind,
        numbers: Vec<usize>,
        odds: f64,
        strategy: impl Into<String>,
        expected_value: f64,
    ) -> Self {
        Self {
            kind,
            numbers: canonicalise(kind, numbers),
            odds,
            amount: 0,
            strategy: strategy.into(),
            expected_value,
            weight: 1.0,
            estimated_odds: false,
        }
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_estimated_odds(mut self) -> Self {
        self.estimated_odds = true;
        self
    }

    /// Identity for deduplication across strategies.
    pub fn key(&self) -> (TicketKind, Vec<usize>) {
        (self.kind, self.numbers.clone())
    }
}

/// Unordered kinds key on an ascending sort of their numbers; ordered kinds
/// preserve position semantics.
pub fn canonicalise(kind: TicketKind, mut numbers: Vec<usize>) -> Vec<usize> {
    if !kind.ordered() {
        numbers.sort_unstable();
    }
    numbers
}

/// Appended once per placed ticket, in settlement order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BetRecord {
    pub race_id: String,
    pub race_date: NaiveDate,
    pub ticket: Ticket,
    pub hit: bool,
    pub payout: u64,
    pub fund_before: f64,
    pub fund_after: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unordered_kinds_canonicalise_ascending() {
        let ticket = Ticket::new(TicketKind::Quinella, vec![7, 3], 12.5, "test", 0.2);
        assert_eq!(vec![3, 7], ticket.numbers);

        let ticket = Ticket::new(TicketKind::Trio, vec![9, 2, 5], 80.0, "test", 0.05);
        assert_eq!(vec![2, 5, 9], ticket.numbers);
    }

    #[test]
    fn ordered_kinds_preserve_positions() {
        let ticket = Ticket::new(TicketKind::Exacta, vec![7, 3], 25.0, "test", 0.1);
        assert_eq!(vec![7, 3], ticket.numbers);

        let ticket = Ticket::new(TicketKind::Trifecta, vec![9, 2, 5], 310.0, "test", 0.01);
        assert_eq!(vec![9, 2, 5], ticket.numbers);
    }

    #[test]
    fn keys_collide_for_equivalent_combinations() {
        let a = Ticket::new(TicketKind::Wide, vec![4, 8], 3.1, "one", 0.3);
        let b = Ticket::new(TicketKind::Wide, vec![8, 4], 3.1, "two", 0.4);
        assert_eq!(a.key(), b.key());
    }

    #[test]
    fn legs_per_kind() {
        assert_eq!(1, TicketKind::Win.legs());
        assert_eq!(2, TicketKind::Exacta.legs());
        assert_eq!(3, TicketKind::Trifecta.legs());
        assert!(TicketKind::Trifecta.ordered());
        assert!(!TicketKind::Trio.ordered());
    }

    #[test]
    fn kind_names_are_snake_case() {
        assert_eq!("quinella", TicketKind::Quinella.to_string());
        assert_eq!("win", TicketKind::Win.to_string());
    }
}
