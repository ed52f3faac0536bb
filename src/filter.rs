//! Pre-replay race gating. A race is assessed once, before any ticket is
//! generated; the tier multiplier is the only filter output that crosses into
//! stake sizing.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::data::{Race, Surface};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TrackMode {
    Disabled,
    Whitelist,
    Blacklist,
    Tier,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TrackTier {
    Tier1,
    Tier2,
    Tier3,
}
impl TrackTier {
    pub fn multiplier(&self) -> f64 {
        match self {
            TrackTier::Tier1 => 1.0,
            TrackTier::Tier2 => 0.8,
            TrackTier::Tier3 => 0.6,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackRule {
    pub mode: TrackMode,
    pub list: Vec<String>,
    pub tiers: FxHashMap<String, TrackTier>,
}
impl Default for TrackRule {
    fn default() -> Self {
        Self {
            mode: TrackMode::Disabled,
            list: vec![],
            tiers: FxHashMap::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub min_horse_count: usize,
    pub min_confidence: f64,
    pub surface: Option<Surface>,
    pub distance_min: Option<u32>,
    pub distance_max: Option<u32>,
    pub tracks: TrackRule,
    pub skip_maiden: bool,
    pub skip_bad_weather: bool,
    pub skip_no_upset: bool,
}
impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            min_horse_count: 12,
            min_confidence: 0.0,
            surface: None,
            distance_min: None,
            distance_max: None,
            tracks: TrackRule::default(),
            skip_maiden: false,
            skip_bad_weather: false,
            skip_no_upset: false,
        }
    }
}

/// The outcome of assessing one race.
#[derive(Debug, Clone, PartialEq)]
pub enum Gate {
    Accept { tier_multiplier: f64 },
    Reject { reason: String },
}
impl Gate {
    fn reject(reason: impl Into<String>) -> Self {
        Gate::Reject {
            reason: reason.into(),
        }
    }
}

impl FilterConfig {
    pub fn gate(&self, race: &Race) -> Gate {
        if race.field_size() < self.min_horse_count {
            return Gate::reject(format!(
                "field of {} smaller than {}",
                race.field_size(),
                self.min_horse_count
            ));
        }
        if race.confidence < self.min_confidence {
            return Gate::reject(format!(
                "confidence {:.3} below {:.3}",
                race.confidence, self.min_confidence
            ));
        }
        if let Some(surface) = self.surface {
            if race.surface != surface {
                return Gate::reject(format!("surface {} not {surface}", race.surface));
            }
        }
        if let Some(distance_min) = self.distance_min {
            if race.distance < distance_min {
                return Gate::reject(format!("distance {}m under {distance_min}m", race.distance));
            }
        }
        if let Some(distance_max) = self.distance_max {
            if race.distance > distance_max {
                return Gate::reject(format!("distance {}m over {distance_max}m", race.distance));
            }
        }
        let tier_multiplier = match self.tracks.mode {
            TrackMode::Disabled => 1.0,
            TrackMode::Whitelist => {
                if !self.tracks.list.contains(&race.track) {
                    return Gate::reject(format!("track {} not whitelisted", race.track));
                }
                1.0
            }
            TrackMode::Blacklist => {
                if self.tracks.list.contains(&race.track) {
                    return Gate::reject(format!("track {} blacklisted", race.track));
                }
                1.0
            }
            TrackMode::Tier => self
                .tracks
                .tiers
                .get(&race.track)
                .map(TrackTier::multiplier)
                .unwrap_or(1.0),
        };
        if self.skip_maiden && race.maiden {
            return Gate::reject("maiden race");
        }
        if self.skip_bad_weather && race.bad_weather {
            return Gate::reject("bad weather");
        }
        if self.skip_no_upset && race.upset_candidates().is_empty() {
            return Gate::reject("no upset candidate in field");
        }
        Gate::Accept { tier_multiplier }
    }
}
