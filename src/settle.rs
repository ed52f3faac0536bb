//! Settlement: adjudicating a ticket against a race's realised finishing
//! order.

use crate::data::Race;
use crate::error::BacktestError;
use crate::ticket::{Ticket, TicketKind};

#[derive(Debug, Clone, PartialEq)]
pub struct Settlement {
    pub hit: bool,
    pub payout: u64,
}
impl Settlement {
    fn miss() -> Self {
        Self {
            hit: false,
            payout: 0,
        }
    }

    fn hit(ticket: &Ticket) -> Self {
        Self {
            hit: true,
            payout: (ticket.amount as f64 * ticket.odds).trunc() as u64,
        }
    }
}

/// Evaluates a sized ticket against the race result. Deterministic in the
/// ticket and the realised placings; disqualified runners never occupy a
/// paying position, so any ticket requiring one misses.
pub fn evaluate(ticket: &Ticket, race: &Race) -> Result<Settlement, BacktestError> {
    let frame = race.frame();
    if race.winner().is_none() {
        return Err(BacktestError::ResultUnavailable {
            race_id: race.id(),
        });
    }
    let placed = |position: usize| frame.get(position).map(|horse| horse.number);
    let first = placed(0);
    let second = placed(1);
    let third = placed(2);

    let numbers = &ticket.numbers;
    let hit = match ticket.kind {
        TicketKind::Win => first == Some(numbers[0]),
        TicketKind::Place => frame.iter().any(|horse| horse.number == numbers[0]),
        TicketKind::Quinella => {
            let (Some(first), Some(second)) = (first, second) else {
                return Ok(Settlement::miss());
            };
            let mut top2 = [first, second];
            top2.sort_unstable();
            numbers[..] == top2
        }
        TicketKind::Wide => {
            numbers
                .iter()
                .all(|number| frame.iter().any(|horse| horse.number == *number))
        }
        TicketKind::Exacta => first == Some(numbers[0]) && second == Some(numbers[1]),
        TicketKind::Trio => {
            let (Some(first), Some(second), Some(third)) = (first, second, third) else {
                return Ok(Settlement::miss());
            };
            let mut top3 = [first, second, third];
            top3.sort_unstable();
            numbers[..] == top3
        }
        TicketKind::Trifecta => {
            first == Some(numbers[0]) && second == Some(numbers[1]) && third == Some(numbers[2])
        }
    };

    Ok(if hit {
        Settlement::hit(ticket)
    } else {
        Settlement::miss()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::fixtures::{horse, race};
    use crate::data::{FinishRank, Race, Surface};
    use rustc_hash::FxHashMap;

    fn sized(kind: TicketKind, numbers: Vec<usize>, odds: f64, amount: u64) -> Ticket {
        let mut ticket = Ticket::new(kind, numbers, odds, "test", 0.5);
        ticket.amount = amount;
        ticket
    }

    // fixtures::race() resolves 1st = #1, 2nd = #2, 3rd = #3.

    #[test]
    fn win_hits_only_the_winner() {
        let race = race();
        let settlement = evaluate(&sized(TicketKind::Win, vec![1], 4.0, 1000), &race).unwrap();
        assert_eq!(
            Settlement {
                hit: true,
                payout: 4000
            },
            settlement
        );
        let settlement = evaluate(&sized(TicketKind::Win, vec![2], 4.0, 1000), &race).unwrap();
        assert_eq!(Settlement::miss(), settlement);
    }

    #[test]
    fn place_hits_anywhere_in_the_frame() {
        let race = race();
        for number in [1, 2, 3] {
            let settlement =
                evaluate(&sized(TicketKind::Place, vec![number], 1.8, 500), &race).unwrap();
            assert!(settlement.hit, "horse {number} should place");
            assert_eq!(900, settlement.payout);
        }
        let settlement = evaluate(&sized(TicketKind::Place, vec![4], 1.8, 500), &race).unwrap();
        assert!(!settlement.hit);
    }

    #[test]
    fn quinella_is_unordered_over_the_top_two() {
        let race = race();
        assert!(
            evaluate(&sized(TicketKind::Quinella, vec![2, 1], 6.2, 100), &race)
                .unwrap()
                .hit
        );
        assert!(
            !evaluate(&sized(TicketKind::Quinella, vec![1, 3], 6.2, 100), &race)
                .unwrap()
                .hit
        );
    }

    #[test]
    fn wide_hits_any_pair_inside_the_frame() {
        let race = race();
        for pair in [[1, 2], [1, 3], [2, 3]] {
            assert!(
                evaluate(&sized(TicketKind::Wide, pair.to_vec(), 2.4, 100), &race)
                    .unwrap()
                    .hit
            );
        }
        assert!(
            !evaluate(&sized(TicketKind::Wide, vec![3, 4], 2.4, 100), &race)
                .unwrap()
                .hit
        );
    }

    #[test]
    fn exacta_demands_exact_order() {
        let race = race();
        assert!(
            evaluate(&sized(TicketKind::Exacta, vec![1, 2], 11.0, 100), &race)
                .unwrap()
                .hit
        );
        assert!(
            !evaluate(&sized(TicketKind::Exacta, vec![2, 1], 11.0, 100), &race)
                .unwrap()
                .hit
        );
    }

    #[test]
    fn trio_is_unordered_over_the_top_three() {
        let race = race();
        assert!(
            evaluate(&sized(TicketKind::Trio, vec![3, 1, 2], 30.0, 100), &race)
                .unwrap()
                .hit
        );
        assert!(
            !evaluate(&sized(TicketKind::Trio, vec![1, 2, 4], 30.0, 100), &race)
                .unwrap()
                .hit
        );
    }

    #[test]
    fn trifecta_demands_exact_order() {
        let race = race();
        assert!(
            evaluate(&sized(TicketKind::Trifecta, vec![1, 2, 3], 120.0, 100), &race)
                .unwrap()
                .hit
        );
        assert!(
            !evaluate(&sized(TicketKind::Trifecta, vec![3, 2, 1], 120.0, 100), &race)
                .unwrap()
                .hit
        );
    }

    #[test]
    fn payout_truncates_to_whole_yen() {
        let race = race();
        let settlement = evaluate(&sized(TicketKind::Win, vec![1], 4.35, 900), &race).unwrap();
        // 900 * 4.35 = 3914.9999... or 3915.0 depending on rounding; trunc either way
        assert_eq!((900.0_f64 * 4.35).trunc() as u64, settlement.payout);
    }

    #[test]
    fn missing_result_is_an_error() {
        let unresolved = Race::new(
            "tokyo",
            2025,
            20250601,
            1,
            Surface::Turf,
            1600,
            (1..=6)
                .map(|number| horse(number, 5.0, number as u32, FinishRank::Unknown))
                .collect(),
            FxHashMap::default(),
        )
        .unwrap();
        let result = evaluate(&sized(TicketKind::Win, vec![1], 5.0, 100), &unresolved);
        assert!(matches!(
            result,
            Err(BacktestError::ResultUnavailable { .. })
        ));
    }

    #[test]
    fn disqualified_runner_causes_a_miss() {
        let mut horses: Vec<_> = (1..=8)
            .map(|number| {
                horse(
                    number,
                    5.0,
                    number as u32,
                    FinishRank::Placed(number as u32),
                )
            })
            .collect();
        horses[1].finish = FinishRank::DidNotFinish; // horse 2 scratched
        let race = Race::new(
            "kyoto",
            2024,
            20240211,
            9,
            Surface::Dirt,
            1800,
            horses,
            FxHashMap::default(),
        )
        .unwrap();
        // the frame is now 1, 3
        assert!(
            !evaluate(&sized(TicketKind::Quinella, vec![1, 2], 6.0, 100), &race)
                .unwrap()
                .hit
        );
        assert!(
            evaluate(&sized(TicketKind::Quinella, vec![1, 3], 6.0, 100), &race)
                .unwrap()
                .hit
        );
    }
}
