//! Roll-call vote headings and member rosters from parliamentary records.
//!
//! A heading is an anchor line such as "Namentliche Abstimmung", followed
//! within a few lines by the sitting date and then by topic lines that run up
//! to the vote table's header. Rosters list one member per entry as
//! `Surname, Given; occupation Wahlkr. N (constituency) — Party.`.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, info};

use crate::layout::page_lines;
use crate::model::{Fragment, FragmentId, PageText, Row};
use crate::options::EngineConfig;
use crate::similarity::{EditDistance, Similarity, collapse_whitespace, normalize};
use crate::warning::{ReconWarning, WarningCode, emit};

static SITTING_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:in\s+der\s+([\d\w]+)\.\s+Sitzung\s+)?am\s+(\w+)\s+den\s+([\d\w]+)\.\s+(\w+)\s+([\d\w]+)",
    )
    .expect("hardcoded sitting date regex is valid")
});

static ROSTER_ENTRY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^([^\n;\d]+);([^—]+)—([\s\w]+)\.")
        .expect("hardcoded roster entry regex is valid")
});

static OCCUPATION_DISTRICT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(.+)\s+(Wahlkr\.\s+(\d+))(.+)$").expect("hardcoded occupation regex is valid")
});

const MAX_NAME_CHARS: usize = 200;
const MAX_DETAIL_CHARS: usize = 200;
const MAX_PARTY_CHARS: usize = 100;

/// Month names below this similarity are left unresolved.
const MONTH_MATCH: f64 = 0.75;

const MONTHS: [(&str, u32); 15] = [
    ("januar", 1),
    ("jänner", 1),
    ("februar", 2),
    ("feber", 2),
    ("märz", 3),
    ("maerz", 3),
    ("april", 4),
    ("mai", 5),
    ("juni", 6),
    ("juli", 7),
    ("august", 8),
    ("september", 9),
    ("oktober", 10),
    ("november", 11),
    ("dezember", 12),
];

pub const ROSTER_HEADER: [&str; 5] = ["Name", "Occupation", "Wahlkreis", "Constituency", "Party"];

/// The sitting a vote was held in, as printed under its heading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SittingDate {
    pub session: Option<String>,
    pub weekday: String,
    pub day: String,
    pub month: String,
    pub year: String,
    /// Calendar date when day, month and year all resolve.
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RollCallHeading {
    pub source_file: String,
    pub page: u32,
    /// Index of the anchor among the page's text lines.
    pub line: usize,
    pub anchor: String,
    pub sitting: Option<SittingDate>,
    pub topic: String,
}

/// Reads a line like `in der 12. Sitzung am Freitag den 3. März 1950`.
#[must_use]
pub fn parse_sitting_date(line: &str) -> Option<SittingDate> {
    let line = collapse_whitespace(line);
    let captures = SITTING_DATE.captures(&line)?;
    let group = |index: usize| {
        captures
            .get(index)
            .map(|value| value.as_str().to_string())
            .unwrap_or_default()
    };

    let (day, month, year) = (group(3), group(4), group(5));
    let date = match (day.parse::<u32>(), month_number(&month), year.parse::<i32>()) {
        (Ok(d), Some(m), Ok(y)) => NaiveDate::from_ymd_opt(y, m, d),
        _ => None,
    };

    Some(SittingDate {
        session: captures.get(1).map(|value| value.as_str().to_string()),
        weekday: group(2),
        day,
        month,
        year,
        date,
    })
}

fn month_number(name: &str) -> Option<u32> {
    let name = normalize(name);
    if let Some((_, number)) = MONTHS.iter().find(|(month, _)| *month == name) {
        return Some(*number);
    }

    let mut best: Option<(f64, u32)> = None;
    for (month, number) in MONTHS {
        let score = EditDistance.similarity(&name, month);
        if best.is_none_or(|(best_score, _)| score > best_score) {
            best = Some((score, number));
        }
    }
    best.filter(|(score, _)| *score >= MONTH_MATCH)
        .map(|(_, number)| number)
}

fn anchor_score(line: &str, anchor: &str, sim: &dyn Similarity) -> f64 {
    let words = anchor.split_whitespace().count().max(1);
    let lead = line.split_whitespace().take(words).collect::<Vec<_>>().join(" ");
    sim.similarity(anchor, line).max(sim.similarity(anchor, &lead))
}

/// Finds every roll-call heading on `page`.
///
/// Headings without a date nearby, or whose topic never reaches the table
/// header, are still returned and reported as incomplete.
pub fn find_roll_calls(
    page: &PageText,
    source_file: &str,
    config: &EngineConfig,
    sim: &dyn Similarity,
    warnings: &mut Vec<ReconWarning>,
) -> Vec<RollCallHeading> {
    let options = &config.rollcall;
    let lines = page_lines(page, config.region.row_height_tolerance)
        .iter()
        .map(|line| collapse_whitespace(line))
        .collect::<Vec<_>>();

    let incomplete = |message: String, line: usize| {
        ReconWarning::new(WarningCode::RollCallIncomplete, message)
            .with_source_file(source_file)
            .with_page(page.page_id)
            .with_row(line)
    };

    let mut headings = Vec::new();
    let mut index = 0;
    while index < lines.len() {
        let line = &lines[index];
        let is_anchor = options
            .anchors
            .iter()
            .any(|anchor| anchor_score(line, anchor, sim) >= config.thresholds.anchor_match);
        if !is_anchor {
            index += 1;
            continue;
        }

        let search_end = (index + options.check_next).min(lines.len() - 1);
        let dated = (index + 1..=search_end).find_map(|candidate| {
            parse_sitting_date(&lines[candidate]).map(|sitting| (candidate, sitting))
        });
        let date_line = dated.as_ref().map(|(line, _)| *line);

        let mut topic = Vec::new();
        let mut cursor = index + 1;
        let mut ended = false;
        while cursor < lines.len() && cursor <= index + options.max_topic_lines {
            if Some(cursor) == date_line {
                cursor += 1;
                continue;
            }
            if lines[cursor].contains(options.topic_end.as_str()) {
                ended = true;
                break;
            }
            topic.push(lines[cursor].as_str());
            cursor += 1;
        }

        if dated.is_none() {
            emit(
                warnings,
                incomplete(
                    format!("no sitting date within {} lines of '{line}'", options.check_next),
                    index,
                ),
            );
        }
        if !ended {
            emit(
                warnings,
                incomplete(format!("topic under '{line}' never reached the table header"), index),
            );
        } else if topic.is_empty() {
            emit(warnings, incomplete(format!("heading '{line}' has an empty topic"), index));
        }

        headings.push(RollCallHeading {
            source_file: source_file.to_string(),
            page: page.page_id,
            line: index,
            anchor: line.clone(),
            sitting: dated.map(|(_, sitting)| sitting),
            topic: topic.join(" "),
        });
        index = cursor.max(index + 1);
    }

    if !headings.is_empty() {
        info!(
            file = source_file,
            page = page.page_id,
            headings = headings.len(),
            "roll calls found"
        );
    }
    headings
}

/// Turns roster text into a fragment with a [`ROSTER_HEADER`] header row.
///
/// Entries whose name has no comma are not members and are skipped. An
/// entry without the `Wahlkr. N` marker keeps its whole middle part as the
/// occupation.
pub fn parse_member_roster(
    text: &str,
    source_file: &str,
    page: u32,
    warnings: &mut Vec<ReconWarning>,
) -> Fragment {
    let id = FragmentId::from_roster(source_file, page);
    let text = text.replace('\u{ad}', "");
    let mut rows = vec![Row::from_texts(ROSTER_HEADER)];

    for (number, entry) in ROSTER_ENTRY.captures_iter(&text).enumerate() {
        let part = |index: usize| entry.get(index).map_or("", |value| value.as_str());
        let name = collapse_whitespace(part(1));
        let detail = collapse_whitespace(part(2));
        let party = collapse_whitespace(part(3));

        if name.chars().count() > MAX_NAME_CHARS
            || detail.chars().count() > MAX_DETAIL_CHARS
            || party.chars().count() > MAX_PARTY_CHARS
        {
            debug!(file = source_file, page, entry = number + 1, "roster entry too long; skipped");
            continue;
        }
        if !name.contains(',') {
            debug!(
                file = source_file,
                page,
                entry = number + 1,
                name = %name,
                "not a member name; skipped"
            );
            continue;
        }

        let (occupation, district, constituency) = match OCCUPATION_DISTRICT.captures(&detail) {
            Some(split) => (
                split[1].trim().trim_end_matches(',').trim().to_string(),
                split[3].to_string(),
                split[4]
                    .trim()
                    .trim_matches(|c: char| matches!(c, '(' | ')' | ',') || c.is_whitespace())
                    .to_string(),
            ),
            None => {
                emit(
                    warnings,
                    ReconWarning::new(
                        WarningCode::RosterEntryIncomplete,
                        format!("'{detail}' lacks the 'Wahlkr. <number> (<constituency>)' part"),
                    )
                    .with_source_file(source_file)
                    .with_page(page)
                    .with_fragment(&id)
                    .with_row(rows.len()),
                );
                (detail.clone(), String::new(), String::new())
            }
        };

        rows.push(Row::from_texts([name, occupation, district, constituency, party]));
    }

    debug!(file = source_file, page, members = rows.len() - 1, "roster parsed");
    Fragment {
        id,
        source_file: source_file.to_string(),
        page_id: Some(page),
        region_id: None,
        rows,
        excluded_rows: BTreeSet::new(),
    }
}
