//! Tab-separated race dataset decoding. One row per (race, horse); invalid
//! rows are logged and dropped, structurally invalid races are dropped whole.

use std::path::Path;
use std::str::FromStr;

use rustc_hash::FxHashMap;
use tracing::warn;

use crate::csv::CsvReader;
use crate::data::{ComboKey, FinishRank, Horse, Race, Surface};
use crate::error::BacktestError;
use crate::ticket::TicketKind;

const REQUIRED_COLUMNS: [&str; 13] = [
    "track",
    "year",
    "kaisai_date",
    "race_number",
    "surface",
    "distance",
    "horse_number",
    "horse_name",
    "win_odds",
    "popularity_rank",
    "actual_finish_rank",
    "predicted_rank",
    "predicted_score",
];

const COMBO_COLUMNS: [(&str, TicketKind); 5] = [
    ("quinella_odds", TicketKind::Quinella),
    ("wide_odds", TicketKind::Wide),
    ("exacta_odds", TicketKind::Exacta),
    ("trio_odds", TicketKind::Trio),
    ("trifecta_odds", TicketKind::Trifecta),
];

/// What the loader saw: row and race tallies plus one line per dropped input.
#[derive(Debug, Default)]
pub struct DatasetReport {
    pub rows_read: usize,
    pub rows_skipped: usize,
    pub races_loaded: usize,
    pub races_skipped: usize,
    pub problems: Vec<String>,
}

struct Header {
    indices: FxHashMap<String, usize>,
}
impl Header {
    fn bind(path: &Path, row: &[String]) -> Result<Self, BacktestError> {
        let indices: FxHashMap<String, usize> = row
            .iter()
            .enumerate()
            .map(|(index, name)| (name.trim().to_string(), index))
            .collect();
        for column in REQUIRED_COLUMNS {
            if !indices.contains_key(column) {
                return Err(BacktestError::DatasetMissingColumn {
                    path: path.to_path_buf(),
                    column: column.to_string(),
                });
            }
        }
        Ok(Self { indices })
    }

    fn required<'a>(&self, row: &'a [String], column: &str) -> Result<&'a str, String> {
        let &index = self.indices.get(column).unwrap();
        row.get(index)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
            .ok_or_else(|| format!("column '{column}' is empty"))
    }

    fn optional<'a>(&self, row: &'a [String], column: &str) -> Option<&'a str> {
        let &index = self.indices.get(column)?;
        row.get(index)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }
}

fn parse<T: FromStr>(value: &str, column: &str) -> Result<T, String> {
    value
        .parse()
        .map_err(|_| format!("column '{column}' has unparseable value '{value}'"))
}

fn parse_flag(value: &str, column: &str) -> Result<bool, String> {
    match value {
        "1" | "true" => Ok(true),
        "0" | "false" => Ok(false),
        other => Err(format!("column '{column}' has unparseable flag '{other}'")),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct RaceKey {
    track: String,
    year: i32,
    kaisai_date: u32,
    race_number: u32,
}

struct RaceRow {
    surface: Surface,
    distance: u32,
    confidence: Option<f64>,
    maiden: bool,
    bad_weather: bool,
    horse: Horse,
    combo_odds: Vec<(ComboKey, f64)>,
}

/// Reads the dataset into validated races, in first-appearance order.
pub fn read_races(path: impl AsRef<Path>) -> Result<(Vec<Race>, DatasetReport), BacktestError> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(BacktestError::DatasetNotFound {
            path: path.to_path_buf(),
        });
    }
    let mut reader = CsvReader::open_with_separator(path, '\t').map_err(|err| {
        BacktestError::DatasetInvalidFormat {
            path: path.to_path_buf(),
            reason: err.to_string(),
        }
    })?;
    let header_row = reader
        .read()
        .ok_or_else(|| BacktestError::DatasetInvalidFormat {
            path: path.to_path_buf(),
            reason: "missing header row".to_string(),
        })?
        .map_err(|err| BacktestError::DatasetInvalidFormat {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })?;
    let header = Header::bind(path, &header_row)?;

    let mut report = DatasetReport::default();
    let mut order: Vec<RaceKey> = vec![];
    let mut grouped: FxHashMap<RaceKey, Vec<RaceRow>> = FxHashMap::default();

    for (offset, row) in reader.enumerate() {
        let row_number = offset + 2;
        let row = row.map_err(|err| BacktestError::DatasetInvalidFormat {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })?;
        report.rows_read += 1;
        match decode_row(&header, &row) {
            Ok((key, race_row)) => {
                grouped
                    .entry(key.clone())
                    .or_insert_with(|| {
                        order.push(key);
                        vec![]
                    })
                    .push(race_row);
            }
            Err(reason) => {
                warn!("dropping {}:{row_number}: {reason}", path.display());
                report.problems.push(format!("row {row_number}: {reason}"));
                report.rows_skipped += 1;
            }
        }
    }

    let mut races = vec![];
    for key in order {
        let rows = grouped.remove(&key).unwrap();
        match assemble_race(&key, rows) {
            Ok(race) => {
                report.races_loaded += 1;
                races.push(race);
            }
            Err(reason) => {
                let race_id = format!(
                    "{}_{}_{}_{}",
                    key.track, key.year, key.kaisai_date, key.race_number
                );
                warn!("dropping race {race_id}: {reason}");
                report.problems.push(format!("race {race_id}: {reason}"));
                report.races_skipped += 1;
            }
        }
    }
    Ok((races, report))
}

fn decode_row(header: &Header, row: &[String]) -> Result<(RaceKey, RaceRow), String> {
    let key = RaceKey {
        track: header.required(row, "track")?.to_string(),
        year: parse(header.required(row, "year")?, "year")?,
        kaisai_date: parse(header.required(row, "kaisai_date")?, "kaisai_date")?,
        race_number: parse(header.required(row, "race_number")?, "race_number")?,
    };

    let surface = match header.required(row, "surface")? {
        "turf" => Surface::Turf,
        "dirt" => Surface::Dirt,
        other => return Err(format!("column 'surface' has unparseable value '{other}'")),
    };
    let horse_number: usize = parse(header.required(row, "horse_number")?, "horse_number")?;
    let horse = Horse {
        number: horse_number,
        name: header.required(row, "horse_name")?.to_string(),
        odds: parse(header.required(row, "win_odds")?, "win_odds")?,
        popularity: parse(header.required(row, "popularity_rank")?, "popularity_rank")?,
        finish: FinishRank::from_raw(parse(
            header.required(row, "actual_finish_rank")?,
            "actual_finish_rank",
        )?),
        predicted_rank: parse(header.required(row, "predicted_rank")?, "predicted_rank")?,
        predicted_score: parse(header.required(row, "predicted_score")?, "predicted_score")?,
        upset_prob: match header.optional(row, "upset_prob") {
            Some(value) => parse(value, "upset_prob")?,
            None => 0.0,
        },
        upset_candidate: match header.optional(row, "is_upset_candidate") {
            Some(value) => parse_flag(value, "is_upset_candidate")?,
            None => false,
        },
        place_odds_min: match header.optional(row, "place_odds_min") {
            Some(value) => Some(parse(value, "place_odds_min")?),
            None => None,
        },
        place_odds_max: match header.optional(row, "place_odds_max") {
            Some(value) => Some(parse(value, "place_odds_max")?),
            None => None,
        },
    };
    horse.validate().map_err(|err| err.to_string())?;

    let mut combo_odds = vec![];
    for (column, kind) in COMBO_COLUMNS {
        if let Some(value) = header.optional(row, column) {
            combo_odds.extend(decode_combo_odds(value, column, kind, horse_number)?);
        }
    }

    Ok((
        key,
        RaceRow {
            surface,
            distance: parse(header.required(row, "distance")?, "distance")?,
            confidence: match header.optional(row, "confidence") {
                Some(value) => Some(parse(value, "confidence")?),
                None => None,
            },
            maiden: match header.optional(row, "is_maiden") {
                Some(value) => parse_flag(value, "is_maiden")?,
                None => false,
            },
            bad_weather: match header.optional(row, "is_bad_weather") {
                Some(value) => parse_flag(value, "is_bad_weather")?,
                None => false,
            },
            horse,
            combo_odds,
        },
    ))
}

/// Combination odds ride on the anchoring horse's row as `partners=odds`
/// items separated by `;`, partner numbers joined with `-`. Ordered kinds
/// keep the anchor in first position.
fn decode_combo_odds(
    value: &str,
    column: &str,
    kind: TicketKind,
    anchor: usize,
) -> Result<Vec<(ComboKey, f64)>, String> {
    let mut decoded = vec![];
    for item in value.split(';').filter(|item| !item.is_empty()) {
        let (partners, odds) = item
            .split_once('=')
            .ok_or_else(|| format!("column '{column}' has unparseable item '{item}'"))?;
        let mut numbers = vec![anchor];
        for partner in partners.split('-') {
            numbers.push(parse(partner, column)?);
        }
        if numbers.len() != kind.legs() {
            return Err(format!(
                "column '{column}' item '{item}' names {} horses for a {}-leg bet",
                numbers.len(),
                kind.legs()
            ));
        }
        let odds: f64 = parse(odds, column)?;
        if odds <= 0.0 {
            return Err(format!("column '{column}' has non-positive odds '{item}'"));
        }
        decoded.push((
            (kind, crate::ticket::canonicalise(kind, numbers)),
            odds,
        ));
    }
    Ok(decoded)
}

fn assemble_race(key: &RaceKey, rows: Vec<RaceRow>) -> Result<Race, String> {
    let first = rows.first().ok_or("no rows")?;
    let surface = first.surface;
    let distance = first.distance;
    let confidence = first.confidence;
    let maiden = first.maiden;
    let bad_weather = first.bad_weather;

    let mut combo_odds: FxHashMap<ComboKey, f64> = FxHashMap::default();
    let mut horses = Vec::with_capacity(rows.len());
    for row in rows {
        combo_odds.extend(row.combo_odds);
        horses.push(row.horse);
    }

    let race = Race::new(
        key.track.clone(),
        key.year,
        key.kaisai_date,
        key.race_number,
        surface,
        distance,
        horses,
        combo_odds,
    )
    .map_err(|err| err.to_string())?
    .with_flags(maiden, bad_weather);
    Ok(match confidence {
        Some(confidence) => race.with_confidence(confidence),
        None => race,
    })
}

#[cfg(test)]
mod tests;
