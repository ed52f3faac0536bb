//! The race and runner data model.

use anyhow::bail;
use chrono::NaiveDate;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::ticket::TicketKind;

pub const MAX_HORSE_NUMBER: usize = 18;

/// Finishing positions at or beyond this raw value denote a runner that was
/// disqualified or scratched.
pub const DNF_SENTINEL: u32 = 90;

/// Paying positions: 1st through 3rd.
pub const FRAME: usize = 3;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Surface {
    Turf,
    Dirt,
}

/// A runner's realised finishing position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FinishRank {
    #[default]
    Unknown,
    Placed(u32),
    DidNotFinish,
}
impl FinishRank {
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            0 => FinishRank::Unknown,
            raw if raw >= DNF_SENTINEL => FinishRank::DidNotFinish,
            raw => FinishRank::Placed(raw),
        }
    }

    pub fn placing(&self) -> Option<u32> {
        match self {
            FinishRank::Placed(placing) => Some(*placing),
            _ => None,
        }
    }

    pub fn in_frame(&self) -> bool {
        matches!(self, FinishRank::Placed(placing) if *placing <= FRAME as u32)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Horse {
    pub number: usize,
    pub name: String,
    pub odds: f64,
    pub popularity: u32,
    pub finish: FinishRank,
    pub predicted_rank: u32,
    pub predicted_score: f64,
    pub upset_prob: f64,
    pub upset_candidate: bool,
    pub place_odds_min: Option<f64>,
    pub place_odds_max: Option<f64>,
}
impl Horse {
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.number == 0 || self.number > MAX_HORSE_NUMBER {
            bail!(
                "horse number {} outside 1..={MAX_HORSE_NUMBER}",
                self.number
            );
        }
        if !self.odds.is_finite() || self.odds <= 0.0 {
            bail!("win odds must be positive, got {}", self.odds);
        }
        if !(0.0..=1.0).contains(&self.predicted_score) {
            bail!(
                "predicted score must lie in 0..=1, got {}",
                self.predicted_score
            );
        }
        if !(0.0..=1.0).contains(&self.upset_prob) {
            bail!("upset probability must lie in 0..=1, got {}", self.upset_prob);
        }
        for place_odds in [self.place_odds_min, self.place_odds_max].into_iter().flatten() {
            if !place_odds.is_finite() || place_odds <= 0.0 {
                bail!("place odds must be positive, got {place_odds}");
            }
        }
        Ok(())
    }

    pub fn expected_value(&self) -> f64 {
        self.predicted_score * self.odds
    }

    pub fn in_frame(&self) -> bool {
        self.finish.in_frame()
    }
}

pub type ComboKey = (TicketKind, Vec<usize>);

/// One historical race: conditions, the full field ordered by horse number,
/// and whatever per-combination odds the dataset exposed. Frozen once built.
#[derive(Debug, Clone)]
pub struct Race {
    pub track: String,
    pub year: i32,
    /// Meeting day encoded as a `YYYYMMDD` integer.
    pub kaisai_date: u32,
    pub race_number: u32,
    pub surface: Surface,
    pub distance: u32,
    pub confidence: f64,
    pub maiden: bool,
    pub bad_weather: bool,
    horses: Vec<Horse>,
    by_number: FxHashMap<usize, usize>,
    combo_odds: FxHashMap<ComboKey, f64>,
    date: NaiveDate,
}
impl Race {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        track: impl Into<String>,
        year: i32,
        kaisai_date: u32,
        race_number: u32,
        surface: Surface,
        distance: u32,
        mut horses: Vec<Horse>,
        combo_odds: FxHashMap<ComboKey, f64>,
    ) -> Result<Self, anyhow::Error> {
        let date = decode_kaisai_date(kaisai_date)?;
        horses.sort_unstable_by_key(|horse| horse.number);
        let mut by_number = FxHashMap::default();
        for (index, horse) in horses.iter().enumerate() {
            horse.validate()?;
            if by_number.insert(horse.number, index).is_some() {
                bail!("duplicate horse number {}", horse.number);
            }
        }
        Ok(Self {
            track: track.into(),
            year,
            kaisai_date,
            race_number,
            surface,
            distance,
            confidence: 1.0,
            maiden: false,
            bad_weather: false,
            horses,
            by_number,
            combo_odds,
            date,
        })
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_flags(mut self, maiden: bool, bad_weather: bool) -> Self {
        self.maiden = maiden;
        self.bad_weather = bad_weather;
        self
    }

    pub fn id(&self) -> String {
        format!(
            "{}_{}_{}_{}",
            self.track, self.year, self.kaisai_date, self.race_number
        )
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    /// Chronological ordering key.
    pub fn sort_key(&self) -> (i32, u32, u32) {
        (self.year, self.kaisai_date, self.race_number)
    }

    pub fn horses(&self) -> &[Horse] {
        &self.horses
    }

    pub fn horse(&self, number: usize) -> Option<&Horse> {
        self.by_number.get(&number).map(|&index| &self.horses[index])
    }

    /// The `n` most fancied runners by predicted rank, best first.
    pub fn top_predicted(&self, n: usize) -> Vec<&Horse> {
        let mut ranked: Vec<_> = self.horses.iter().collect();
        ranked.sort_by_key(|horse| horse.predicted_rank);
        ranked.truncate(n);
        ranked
    }

    /// The horse the predictor put at the given 1-based rank.
    pub fn predicted_at(&self, rank: u32) -> Option<&Horse> {
        self.horses.iter().find(|horse| horse.predicted_rank == rank)
    }

    /// Flagged upset candidates, most likely first.
    pub fn upset_candidates(&self) -> Vec<&Horse> {
        let mut candidates: Vec<_> = self
            .horses
            .iter()
            .filter(|horse| horse.upset_candidate)
            .collect();
        candidates.sort_by(|a, b| b.upset_prob.total_cmp(&a.upset_prob));
        candidates
    }

    pub fn winner(&self) -> Option<&Horse> {
        self.horses
            .iter()
            .find(|horse| horse.finish.placing() == Some(1))
    }

    /// Runners that finished 1st through 3rd, in finishing order.
    pub fn frame(&self) -> Vec<&Horse> {
        let mut placed: Vec<_> = self
            .horses
            .iter()
            .filter(|horse| horse.in_frame())
            .collect();
        placed.sort_by_key(|horse| horse.finish.placing());
        placed
    }

    /// Looks up a quoted combination price, keyed on canonical numbers.
    pub fn combo_odds(&self, kind: TicketKind, numbers: &[usize]) -> Option<f64> {
        self.combo_odds
            .get(&(kind, crate::ticket::canonicalise(kind, numbers.to_vec())))
            .copied()
    }

    pub fn field_size(&self) -> usize {
        self.horses.len()
    }
}

fn decode_kaisai_date(kaisai_date: u32) -> Result<NaiveDate, anyhow::Error> {
    let year = (kaisai_date / 10_000) as i32;
    let month = kaisai_date / 100 % 100;
    let day = kaisai_date % 100;
    match NaiveDate::from_ymd_opt(year, month, day) {
        Some(date) => Ok(date),
        None => bail!("kaisai date {kaisai_date} does not encode a calendar day"),
    }
}
