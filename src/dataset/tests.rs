use super::*;
use crate::data::FinishRank;
use std::fs;
use std::path::PathBuf;

const HEADER: &str = "track\tyear\tkaisai_date\trace_number\tsurface\tdistance\thorse_number\thorse_name\twin_odds\tpopularity_rank\tactual_finish_rank\tpredicted_rank\tpredicted_score";

fn write_dataset(name: &str, lines: &[String]) -> PathBuf {
    let path = std::env::temp_dir().join(format!("furlong-{name}-{}.tsv", std::process::id()));
    fs::write(&path, lines.join("\n")).unwrap();
    path
}

fn row(race_number: u32, horse_number: usize, finish: u32) -> String {
    format!(
        "tokyo\t2024\t20240128\t{race_number}\tturf\t1600\t{horse_number}\thorse-{horse_number}\t{odds}\t{horse_number}\t{finish}\t{horse_number}\t0.1",
        odds = horse_number as f64 + 1.5,
    )
}

#[test]
fn loads_races_grouped_by_identity() {
    let mut lines = vec![HEADER.to_string()];
    for race_number in 1..=2 {
        for horse_number in 1..=12 {
            lines.push(row(race_number, horse_number, horse_number as u32));
        }
    }
    let path = write_dataset("grouped", &lines);
    let (races, report) = read_races(&path).unwrap();
    fs::remove_file(&path).unwrap();

    assert_eq!(2, races.len());
    assert_eq!(24, report.rows_read);
    assert_eq!(0, report.rows_skipped);
    assert_eq!(2, report.races_loaded);
    assert_eq!("tokyo_2024_20240128_1", races[0].id());
    assert_eq!(12, races[0].field_size());
    assert_eq!(Some(1), races[0].winner().map(|horse| horse.number));
}

#[test]
fn optional_columns_decode_when_present() {
    let header = format!(
        "{HEADER}\tupset_prob\tis_upset_candidate\tplace_odds_min\tplace_odds_max\tconfidence\tquinella_odds"
    );
    let mut lines = vec![header];
    lines.push(format!(
        "{}\t0.4\t1\t1.3\t1.9\t0.85\t2=12.5;3=44.0",
        row(1, 1, 1)
    ));
    for horse_number in 2..=12 {
        lines.push(format!("{}\t\t\t\t\t\t", row(1, horse_number, horse_number as u32)));
    }
    let path = write_dataset("optional", &lines);
    let (races, report) = read_races(&path).unwrap();
    fs::remove_file(&path).unwrap();

    assert_eq!(1, races.len());
    assert!(report.problems.is_empty());
    let race = &races[0];
    let horse = race.horse(1).unwrap();
    assert_eq!(0.4, horse.upset_prob);
    assert!(horse.upset_candidate);
    assert_eq!(Some(1.3), horse.place_odds_min);
    assert_eq!(0.85, race.confidence);
    assert_eq!(Some(12.5), race.combo_odds(TicketKind::Quinella, &[1, 2]));
    assert_eq!(Some(44.0), race.combo_odds(TicketKind::Quinella, &[3, 1]));
}

#[test]
fn sentinel_ranks_decode_to_did_not_finish() {
    let mut lines = vec![HEADER.to_string()];
    lines.push(row(1, 1, 99));
    for horse_number in 2..=12 {
        lines.push(row(1, horse_number, horse_number as u32 - 1));
    }
    let path = write_dataset("sentinel", &lines);
    let (races, _) = read_races(&path).unwrap();
    fs::remove_file(&path).unwrap();
    assert_eq!(
        FinishRank::DidNotFinish,
        races[0].horse(1).unwrap().finish
    );
}

#[test]
fn invalid_rows_are_dropped_with_a_reason() {
    let mut lines = vec![HEADER.to_string()];
    for horse_number in 1..=12 {
        lines.push(row(1, horse_number, horse_number as u32));
    }
    // non-numeric odds
    lines[3] = lines[3].replace("4.5", "n/a");
    let path = write_dataset("invalid-row", &lines);
    let (races, report) = read_races(&path).unwrap();
    fs::remove_file(&path).unwrap();

    assert_eq!(1, races.len());
    assert_eq!(11, races[0].field_size());
    assert_eq!(1, report.rows_skipped);
    assert_eq!(1, report.problems.len());
    assert!(report.problems[0].contains("win_odds"));
}

#[test]
fn duplicate_horse_numbers_drop_the_whole_race() {
    let mut lines = vec![HEADER.to_string()];
    for horse_number in 1..=12 {
        lines.push(row(1, horse_number, horse_number as u32));
    }
    lines.push(row(1, 12, 13)); // duplicate horse 12
    for horse_number in 1..=12 {
        lines.push(row(2, horse_number, horse_number as u32));
    }
    let path = write_dataset("duplicate", &lines);
    let (races, report) = read_races(&path).unwrap();
    fs::remove_file(&path).unwrap();

    assert_eq!(1, races.len());
    assert_eq!(2, races[0].race_number);
    assert_eq!(1, report.races_skipped);
    assert!(report.problems[0].contains("duplicate"));
}

#[test]
fn missing_required_column_fails_the_load() {
    let header = HEADER.replace("\tpredicted_score", "");
    let path = write_dataset("missing-column", &[header]);
    let result = read_races(&path);
    fs::remove_file(&path).unwrap();
    assert!(matches!(
        result,
        Err(BacktestError::DatasetMissingColumn { column, .. }) if column == "predicted_score"
    ));
}

#[test]
fn missing_file_is_reported() {
    let result = read_races("no/such/dataset.tsv");
    assert!(matches!(result, Err(BacktestError::DatasetNotFound { .. })));
}

#[test]
fn crlf_line_endings_are_tolerated() {
    let mut lines = vec![HEADER.to_string()];
    for horse_number in 1..=12 {
        lines.push(row(1, horse_number, horse_number as u32));
    }
    let path = std::env::temp_dir().join(format!("furlong-crlf-{}.tsv", std::process::id()));
    fs::write(&path, lines.join("\r\n")).unwrap();
    let (races, report) = read_races(&path).unwrap();
    fs::remove_file(&path).unwrap();
    assert_eq!(1, races.len());
    assert_eq!(0, report.rows_skipped);
}

#[test]
fn combo_odds_reject_malformed_items() {
    let header = format!("{HEADER}\ttrio_odds");
    let mut lines = vec![header];
    lines.push(format!("{}\t2-3=22.5;4=9.0", row(1, 1, 1)));
    for horse_number in 2..=12 {
        lines.push(format!("{}\t", row(1, horse_number, horse_number as u32)));
    }
    let path = write_dataset("bad-combo", &lines);
    let (races, report) = read_races(&path).unwrap();
    fs::remove_file(&path).unwrap();

    // the row anchoring the trio odds is dropped (a 2-horse trio item), the
    // race survives without it
    assert_eq!(1, report.rows_skipped);
    assert_eq!(11, races[0].field_size());
}
