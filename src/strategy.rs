//! Ticket generation strategies. Each concrete strategy is one variant of a
//! tagged enum, dispatched by match; the factory parses a name + params record
//! into a variant.

use rustc_hash::FxHashMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::comb;
use crate::data::{Horse, Race};
use crate::error::BacktestError;
use crate::ticket::{Ticket, TicketKind};

/// Expected value on an estimated place price is discounted by this factor,
/// disclosing the approximation to the bankroll layer.
const ESTIMATED_PLACE_CONFIDENCE: f64 = 0.8;

const MIN_ESTIMATED_PLACE_ODDS: f64 = 1.1;
const PLACE_ODDS_RATIO: f64 = 0.35;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct OddsWindow {
    pub min_odds: Option<f64>,
    pub max_odds: Option<f64>,
}
impl OddsWindow {
    pub fn admits(&self, odds: f64) -> bool {
        self.min_odds.map_or(true, |min| odds >= min)
            && self.max_odds.map_or(true, |max| odds <= max)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FavoriteWinParams {
    pub top_n: usize,
    #[serde(flatten)]
    pub odds: OddsWindow,
}
impl Default for FavoriteWinParams {
    fn default() -> Self {
        Self {
            top_n: 1,
            odds: OddsWindow::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LongshotParams {
    pub upset_threshold: f64,
    pub max_candidates: usize,
    #[serde(flatten)]
    pub odds: OddsWindow,
}
impl Default for LongshotParams {
    fn default() -> Self {
        Self {
            upset_threshold: 0.1,
            max_candidates: 3,
            odds: OddsWindow::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValueWinParams {
    pub min_expected_value: f64,
    pub max_tickets: usize,
    #[serde(flatten)]
    pub odds: OddsWindow,
}
impl Default for ValueWinParams {
    fn default() -> Self {
        Self {
            min_expected_value: 1.0,
            max_tickets: 3,
            odds: OddsWindow::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FavoritePlaceParams {
    pub top_n: usize,
    pub require_quoted_odds: bool,
    #[serde(flatten)]
    pub odds: OddsWindow,
}
impl Default for FavoritePlaceParams {
    fn default() -> Self {
        Self {
            top_n: 1,
            require_quoted_odds: false,
            odds: OddsWindow::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LongshotPlaceParams {
    pub upset_threshold: f64,
    pub max_candidates: usize,
    pub require_quoted_odds: bool,
    #[serde(flatten)]
    pub odds: OddsWindow,
}
impl Default for LongshotPlaceParams {
    fn default() -> Self {
        Self {
            upset_threshold: 0.1,
            max_candidates: 3,
            require_quoted_odds: false,
            odds: OddsWindow::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct FavoriteComboParams {
    #[serde(flatten)]
    pub odds: OddsWindow,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnchorPartnerParams {
    pub max_counterparts: usize,
    #[serde(flatten)]
    pub odds: OddsWindow,
}
impl Default for AnchorPartnerParams {
    fn default() -> Self {
        Self {
            max_counterparts: 3,
            odds: OddsWindow::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoxParams {
    pub box_size: usize,
    #[serde(flatten)]
    pub odds: OddsWindow,
}
impl Default for BoxParams {
    fn default() -> Self {
        Self {
            box_size: 4,
            odds: OddsWindow::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormationParams {
    pub first_leg: Vec<u32>,
    pub second_leg: Vec<u32>,
    pub third_leg: Vec<u32>,
    #[serde(flatten)]
    pub odds: OddsWindow,
}
impl Default for FormationParams {
    fn default() -> Self {
        Self {
            first_leg: vec![1],
            second_leg: vec![2, 3],
            third_leg: vec![4, 5, 6],
            odds: OddsWindow::default(),
        }
    }
}

/// A sub-strategy and its share of the composite stake.
#[derive(Debug, Clone, PartialEq)]
pub struct Weighted {
    pub strategy: Strategy,
    pub weight: f64,
}

/// Runs several strategies over the same race; weights are normalised to sum
/// to one and ride on the emitted tickets.
#[derive(Debug, Clone, PartialEq)]
pub struct Composite {
    entries: Vec<Weighted>,
}
impl Composite {
    pub fn new(entries: Vec<(Strategy, f64)>) -> Result<Self, anyhow::Error> {
        if entries.is_empty() {
            anyhow::bail!("a composite strategy needs at least one sub-strategy");
        }
        if entries.iter().any(|(_, weight)| *weight <= 0.0) {
            anyhow::bail!("composite weights must be positive");
        }
        let total: f64 = entries.iter().map(|(_, weight)| weight).sum();
        Ok(Self {
            entries: entries
                .into_iter()
                .map(|(strategy, weight)| Weighted {
                    strategy,
                    weight: weight / total,
                })
                .collect(),
        })
    }

    pub fn entries(&self) -> &[Weighted] {
        &self.entries
    }

    fn generate(&self, race: &Race) -> Vec<Ticket> {
        let mut tickets: Vec<Ticket> = vec![];
        let mut indices: FxHashMap<(TicketKind, Vec<usize>), usize> = FxHashMap::default();
        for entry in &self.entries {
            for ticket in entry.strategy.generate_tickets(race) {
                match indices.get(&ticket.key()) {
                    Some(&index) => tickets[index].weight += entry.weight,
                    None => {
                        indices.insert(ticket.key(), tickets.len());
                        tickets.push(ticket.with_weight(entry.weight));
                    }
                }
            }
        }
        tickets
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Strategy {
    FavoriteWin(FavoriteWinParams),
    LongshotWin(LongshotParams),
    ValueWin(ValueWinParams),
    FavoritePlace(FavoritePlaceParams),
    LongshotPlace(LongshotPlaceParams),
    FavoriteQuinella(FavoriteComboParams),
    FavoriteLongshotQuinella(AnchorPartnerParams),
    BoxQuinella(BoxParams),
    FavoriteWide(FavoriteComboParams),
    FavoriteLongshotWide(AnchorPartnerParams),
    BoxWide(BoxParams),
    FavoriteTrio(FavoriteComboParams),
    Favorite2LongshotTrio(AnchorPartnerParams),
    FormationTrio(FormationParams),
    Composite(Composite),
}

/// A strategy as it appears in configuration: a name plus a free-form params
/// record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategySpec {
    pub name: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

impl Strategy {
    pub const KNOWN: [&'static str; 14] = [
        "favorite_win",
        "longshot_win",
        "value_win",
        "favorite_place",
        "longshot_place",
        "favorite_quinella",
        "favorite_longshot_quinella",
        "box_quinella",
        "favorite_wide",
        "favorite_longshot_wide",
        "box_wide",
        "favorite_trio",
        "favorite2_longshot_trio",
        "formation_trio",
    ];

    pub fn from_spec(spec: &StrategySpec) -> Result<Self, BacktestError> {
        match spec.name.as_str() {
            "favorite_win" => Ok(Strategy::FavoriteWin(parse_params(spec)?)),
            "longshot_win" => Ok(Strategy::LongshotWin(parse_params(spec)?)),
            "value_win" => Ok(Strategy::ValueWin(parse_params(spec)?)),
            "favorite_place" => Ok(Strategy::FavoritePlace(parse_params(spec)?)),
            "longshot_place" => Ok(Strategy::LongshotPlace(parse_params(spec)?)),
            "favorite_quinella" => Ok(Strategy::FavoriteQuinella(parse_params(spec)?)),
            "favorite_longshot_quinella" => {
                Ok(Strategy::FavoriteLongshotQuinella(parse_params(spec)?))
            }
            "box_quinella" => Ok(Strategy::BoxQuinella(parse_params(spec)?)),
            "favorite_wide" => Ok(Strategy::FavoriteWide(parse_params(spec)?)),
            "favorite_longshot_wide" => Ok(Strategy::FavoriteLongshotWide(parse_params(spec)?)),
            "box_wide" => Ok(Strategy::BoxWide(parse_params(spec)?)),
            "favorite_trio" => Ok(Strategy::FavoriteTrio(parse_params(spec)?)),
            "favorite2_longshot_trio" => Ok(Strategy::Favorite2LongshotTrio(parse_params(spec)?)),
            "formation_trio" => Ok(Strategy::FormationTrio(parse_params(spec)?)),
            other => Err(BacktestError::StrategyUnknown {
                name: other.to_string(),
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Strategy::FavoriteWin(_) => "favorite_win",
            Strategy::LongshotWin(_) => "longshot_win",
            Strategy::ValueWin(_) => "value_win",
            Strategy::FavoritePlace(_) => "favorite_place",
            Strategy::LongshotPlace(_) => "longshot_place",
            Strategy::FavoriteQuinella(_) => "favorite_quinella",
            Strategy::FavoriteLongshotQuinella(_) => "favorite_longshot_quinella",
            Strategy::BoxQuinella(_) => "box_quinella",
            Strategy::FavoriteWide(_) => "favorite_wide",
            Strategy::FavoriteLongshotWide(_) => "favorite_longshot_wide",
            Strategy::BoxWide(_) => "box_wide",
            Strategy::FavoriteTrio(_) => "favorite_trio",
            Strategy::Favorite2LongshotTrio(_) => "favorite2_longshot_trio",
            Strategy::FormationTrio(_) => "formation_trio",
            Strategy::Composite(_) => "composite",
        }
    }

    /// Maps one race into candidate tickets, in emission order. Stakes are
    /// sized later by the bankroll.
    pub fn generate_tickets(&self, race: &Race) -> Vec<Ticket> {
        match self {
            Strategy::FavoriteWin(params) => favorite_win(race, params),
            Strategy::LongshotWin(params) => longshot_win(race, params),
            Strategy::ValueWin(params) => value_win(race, params),
            Strategy::FavoritePlace(params) => favorite_place(race, params),
            Strategy::LongshotPlace(params) => longshot_place(race, params),
            Strategy::FavoriteQuinella(params) => {
                favorite_combo(race, TicketKind::Quinella, "favorite_quinella", params)
            }
            Strategy::FavoriteLongshotQuinella(params) => favorite_longshot_pair(
                race,
                TicketKind::Quinella,
                "favorite_longshot_quinella",
                params,
            ),
            Strategy::BoxQuinella(params) => {
                box_pairs(race, TicketKind::Quinella, "box_quinella", params)
            }
            Strategy::FavoriteWide(params) => {
                favorite_combo(race, TicketKind::Wide, "favorite_wide", params)
            }
            Strategy::FavoriteLongshotWide(params) => {
                favorite_longshot_pair(race, TicketKind::Wide, "favorite_longshot_wide", params)
            }
            Strategy::BoxWide(params) => box_pairs(race, TicketKind::Wide, "box_wide", params),
            Strategy::FavoriteTrio(params) => {
                favorite_combo(race, TicketKind::Trio, "favorite_trio", params)
            }
            Strategy::Favorite2LongshotTrio(params) => favorite2_longshot_trio(race, params),
            Strategy::FormationTrio(params) => formation_trio(race, params),
            Strategy::Composite(composite) => composite.generate(race),
        }
    }
}

fn parse_params<P: DeserializeOwned + Default>(spec: &StrategySpec) -> Result<P, BacktestError> {
    if spec.params.is_null() {
        return Ok(P::default());
    }
    serde_json::from_value(spec.params.clone()).map_err(|err| BacktestError::StrategyParamInvalid {
        name: spec.name.clone(),
        reason: err.to_string(),
    })
}

fn favorite_win(race: &Race, params: &FavoriteWinParams) -> Vec<Ticket> {
    race.top_predicted(params.top_n)
        .into_iter()
        .filter(|horse| params.odds.admits(horse.odds))
        .map(|horse| {
            Ticket::new(
                TicketKind::Win,
                vec![horse.number],
                horse.odds,
                "favorite_win",
                horse.expected_value(),
            )
        })
        .collect()
}

fn longshot_field<'a>(race: &'a Race, upset_threshold: f64) -> Vec<&'a Horse> {
    let mut longshots: Vec<_> = race
        .horses()
        .iter()
        .filter(|horse| horse.upset_prob >= upset_threshold)
        .collect();
    longshots.sort_by(|a, b| b.upset_prob.total_cmp(&a.upset_prob));
    longshots
}

fn longshot_win(race: &Race, params: &LongshotParams) -> Vec<Ticket> {
    longshot_field(race, params.upset_threshold)
        .into_iter()
        .filter(|horse| params.odds.admits(horse.odds))
        .take(params.max_candidates)
        .map(|horse| {
            Ticket::new(
                TicketKind::Win,
                vec![horse.number],
                horse.odds,
                "longshot_win",
                horse.upset_prob * horse.odds,
            )
        })
        .collect()
}

fn value_win(race: &Race, params: &ValueWinParams) -> Vec<Ticket> {
    let mut valued: Vec<_> = race
        .horses()
        .iter()
        .filter(|horse| horse.expected_value() >= params.min_expected_value)
        .collect();
    valued.sort_by(|a, b| b.expected_value().total_cmp(&a.expected_value()));
    valued
        .into_iter()
        .filter(|horse| params.odds.admits(horse.odds))
        .take(params.max_tickets)
        .map(|horse| {
            Ticket::new(
                TicketKind::Win,
                vec![horse.number],
                horse.odds,
                "value_win",
                horse.expected_value(),
            )
        })
        .collect()
}

/// The quoted place floor when the dataset exposes one; otherwise an
/// estimate derived from the win odds, flagged as such.
fn place_odds(horse: &Horse) -> (f64, bool) {
    match horse.place_odds_min {
        Some(quoted) => (quoted, false),
        None => (
            f64::max(MIN_ESTIMATED_PLACE_ODDS, horse.odds * PLACE_ODDS_RATIO),
            true,
        ),
    }
}

fn place_ticket(
    horse: &Horse,
    strategy: &'static str,
    leg_prob: f64,
    require_quoted: bool,
    window: &OddsWindow,
) -> Option<Ticket> {
    let (odds, estimated) = place_odds(horse);
    if estimated && require_quoted {
        return None;
    }
    if !window.admits(odds) {
        return None;
    }
    let confidence = if estimated {
        ESTIMATED_PLACE_CONFIDENCE
    } else {
        1.0
    };
    let ticket = Ticket::new(
        TicketKind::Place,
        vec![horse.number],
        odds,
        strategy,
        leg_prob * odds * confidence,
    );
    Some(if estimated {
        ticket.with_estimated_odds()
    } else {
        ticket
    })
}

fn favorite_place(race: &Race, params: &FavoritePlaceParams) -> Vec<Ticket> {
    race.top_predicted(params.top_n)
        .into_iter()
        .filter_map(|horse| {
            place_ticket(
                horse,
                "favorite_place",
                horse.predicted_score,
                params.require_quoted_odds,
                &params.odds,
            )
        })
        .collect()
}

fn longshot_place(race: &Race, params: &LongshotPlaceParams) -> Vec<Ticket> {
    longshot_field(race, params.upset_threshold)
        .into_iter()
        .filter_map(|horse| {
            place_ticket(
                horse,
                "longshot_place",
                horse.upset_prob,
                params.require_quoted_odds,
                &params.odds,
            )
        })
        .take(params.max_candidates)
        .collect()
}

fn combo_ticket(
    race: &Race,
    kind: TicketKind,
    strategy: &'static str,
    legs: &[&Horse],
    leg_probs: &[f64],
    window: &OddsWindow,
) -> Option<Ticket> {
    let numbers: Vec<_> = legs.iter().map(|horse| horse.number).collect();
    // no quoted price for the combination, no ticket
    let odds = race.combo_odds(kind, &numbers)?;
    if !window.admits(odds) {
        return None;
    }
    let joint: f64 = leg_probs.iter().product();
    Some(Ticket::new(kind, numbers, odds, strategy, joint * odds))
}

fn favorite_combo(
    race: &Race,
    kind: TicketKind,
    strategy: &'static str,
    params: &FavoriteComboParams,
) -> Vec<Ticket> {
    let legs = race.top_predicted(kind.legs());
    if legs.len() < kind.legs() {
        return vec![];
    }
    let leg_probs: Vec<_> = legs.iter().map(|horse| horse.predicted_score).collect();
    combo_ticket(race, kind, strategy, &legs, &leg_probs, &params.odds)
        .into_iter()
        .collect()
}

fn favorite_longshot_pair(
    race: &Race,
    kind: TicketKind,
    strategy: &'static str,
    params: &AnchorPartnerParams,
) -> Vec<Ticket> {
    let Some(anchor) = race.predicted_at(1) else {
        return vec![];
    };
    race.upset_candidates()
        .into_iter()
        .filter(|partner| partner.number != anchor.number)
        .take(params.max_counterparts)
        .filter_map(|partner| {
            combo_ticket(
                race,
                kind,
                strategy,
                &[anchor, partner],
                &[anchor.predicted_score, partner.upset_prob],
                &params.odds,
            )
        })
        .collect()
}

fn box_pairs(
    race: &Race,
    kind: TicketKind,
    strategy: &'static str,
    params: &BoxParams,
) -> Vec<Ticket> {
    let field = race.top_predicted(params.box_size);
    comb::pairs(&field)
        .into_iter()
        .filter_map(|[first, second]| {
            combo_ticket(
                race,
                kind,
                strategy,
                &[first, second],
                &[first.predicted_score, second.predicted_score],
                &params.odds,
            )
        })
        .collect()
}

fn favorite2_longshot_trio(race: &Race, params: &AnchorPartnerParams) -> Vec<Ticket> {
    let (Some(first), Some(second)) = (race.predicted_at(1), race.predicted_at(2)) else {
        return vec![];
    };
    race.upset_candidates()
        .into_iter()
        .filter(|partner| partner.number != first.number && partner.number != second.number)
        .take(params.max_counterparts)
        .filter_map(|partner| {
            combo_ticket(
                race,
                TicketKind::Trio,
                "favorite2_longshot_trio",
                &[first, second, partner],
                &[
                    first.predicted_score,
                    second.predicted_score,
                    partner.upset_prob,
                ],
                &params.odds,
            )
        })
        .collect()
}

fn formation_trio(race: &Race, params: &FormationParams) -> Vec<Ticket> {
    let leg_horses = |ranks: &[u32]| -> Vec<&Horse> {
        ranks
            .iter()
            .filter_map(|&rank| race.predicted_at(rank))
            .collect()
    };
    let first_leg = leg_horses(&params.first_leg);
    let second_leg = leg_horses(&params.second_leg);
    let third_leg = leg_horses(&params.third_leg);
    if first_leg.is_empty() || second_leg.is_empty() || third_leg.is_empty() {
        return vec![];
    }

    let mut seen: rustc_hash::FxHashSet<Vec<usize>> = rustc_hash::FxHashSet::default();
    let mut tickets = vec![];
    for picks in comb::LegPicks::new([first_leg.len(), second_leg.len(), third_leg.len()]) {
        let legs = [
            first_leg[picks[0]],
            second_leg[picks[1]],
            third_leg[picks[2]],
        ];
        let numbers = vec![legs[0].number, legs[1].number, legs[2].number];
        if numbers[0] == numbers[1] || numbers[0] == numbers[2] || numbers[1] == numbers[2] {
            continue;
        }
        let canonical = crate::ticket::canonicalise(TicketKind::Trio, numbers);
        if !seen.insert(canonical) {
            continue;
        }
        let leg_probs: Vec<_> = legs.iter().map(|horse| horse.predicted_score).collect();
        if let Some(ticket) = combo_ticket(
            race,
            TicketKind::Trio,
            "formation_trio",
            &legs,
            &leg_probs,
            &params.odds,
        ) {
            tickets.push(ticket);
        }
    }
    tickets
}
