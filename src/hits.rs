use serde::Serialize;
use thiserror::Error;

use crate::cli::{HitFormat, SequenceKey};
use crate::model::ParseWarning;

const COMMENT_MARKER: char = '#';

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HitRecord {
    pub query_id: String,
    pub target_id: String,
    pub score: f64,
    pub e_value: f64,
    pub start: Option<u64>,
    pub end: Option<u64>,
    pub line: usize,
}

impl HitRecord {
    pub fn sequence_id(&self, key: SequenceKey) -> &str {
        match key {
            SequenceKey::Target => &self.target_id,
            SequenceKey::Query => &self.query_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("expected at least {expected} fields, found {found}")]
    TooFewFields { expected: usize, found: usize },
    #[error("invalid {column} value `{value}`")]
    InvalidNumber { column: &'static str, value: String },
    #[error("invalid {column} coordinate `{value}`")]
    InvalidCoordinate { column: &'static str, value: String },
}

#[derive(Debug, Clone, Default)]
pub struct ParsedHits {
    pub records: Vec<HitRecord>,
    pub warnings: Vec<ParseWarning>,
    pub comment_lines: usize,
}

impl ParsedHits {
    pub fn data_lines(&self) -> usize {
        self.records.len() + self.warnings.len()
    }
}

struct ColumnLayout {
    min_fields: usize,
    target: usize,
    query: usize,
    e_value: usize,
    score: usize,
    coordinates: Option<(usize, usize)>,
}

impl ColumnLayout {
    fn for_format(format: HitFormat) -> Self {
        match format {
            HitFormat::Tblout => Self {
                min_fields: 18,
                target: 0,
                query: 2,
                e_value: 4,
                score: 5,
                coordinates: None,
            },
            HitFormat::Domtblout => Self {
                min_fields: 22,
                target: 0,
                query: 3,
                e_value: 6,
                score: 7,
                coordinates: Some((17, 18)),
            },
        }
    }
}

pub fn parse_hit_table(text: &str, format: HitFormat) -> ParsedHits {
    let mut parsed = ParsedHits::default();

    for (index, line) in text.lines().enumerate() {
        let line_number = index + 1;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with(COMMENT_MARKER) {
            parsed.comment_lines += 1;
            continue;
        }

        match parse_hit_line(trimmed, line_number, format) {
            Ok(record) => parsed.records.push(record),
            Err(err) => parsed.warnings.push(ParseWarning {
                line: line_number,
                reason: err.to_string(),
            }),
        }
    }

    parsed
}

pub fn parse_hit_line(
    line: &str,
    line_number: usize,
    format: HitFormat,
) -> Result<HitRecord, ParseError> {
    let layout = ColumnLayout::for_format(format);
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < layout.min_fields {
        return Err(ParseError::TooFewFields {
            expected: layout.min_fields,
            found: fields.len(),
        });
    }

    let e_value = parse_e_value(fields[layout.e_value])?;
    let score = parse_score(fields[layout.score])?;
    let target_id = fields[layout.target].to_string();

    let (start, end) = match layout.coordinates {
        Some((from, to)) => (
            Some(parse_coordinate("ali from", fields[from])?),
            Some(parse_coordinate("ali to", fields[to])?),
        ),
        None => match split_coordinate_suffix(&target_id) {
            (_, Some((start, end))) => (Some(start), Some(end)),
            (_, None) => (None, None),
        },
    };

    Ok(HitRecord {
        query_id: fields[layout.query].to_string(),
        target_id,
        score,
        e_value,
        start,
        end,
        line: line_number,
    })
}

pub fn split_coordinate_suffix(identifier: &str) -> (&str, Option<(u64, u64)>) {
    let Some((name, span)) = identifier.rsplit_once('/') else {
        return (identifier, None);
    };
    let Some((start, end)) = span.split_once('-') else {
        return (identifier, None);
    };

    match (start.parse::<u64>(), end.parse::<u64>()) {
        (Ok(start), Ok(end)) if !name.is_empty() => (name, Some((start, end))),
        _ => (identifier, None),
    }
}

pub fn split_uniprot_header(identifier: &str) -> Option<(&str, &str)> {
    let mut parts = identifier.split('|');
    let (Some(database), Some(accession), Some(name)) = (parts.next(), parts.next(), parts.next())
    else {
        return None;
    };

    let well_formed = matches!(database, "sp" | "tr")
        && !accession.is_empty()
        && !name.is_empty()
        && !name.contains(char::is_whitespace);
    well_formed.then_some((accession, name))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceName<'a> {
    pub name: &'a str,
    pub accession: Option<&'a str>,
}

// `sp|P00974|BPT1_BOVIN/36-88`, `BPT1_BOVIN/36-88` and `BPT1_BOVIN` all name BPT1_BOVIN.
pub fn sequence_name(identifier: &str) -> SequenceName<'_> {
    let (bare, _) = split_coordinate_suffix(identifier);
    match split_uniprot_header(bare) {
        Some((accession, name)) => SequenceName {
            name,
            accession: Some(accession),
        },
        None => SequenceName {
            name: bare,
            accession: None,
        },
    }
}

fn parse_e_value(raw: &str) -> Result<f64, ParseError> {
    match raw.parse::<f64>() {
        Ok(value) if !value.is_nan() && value >= 0.0 => Ok(value),
        _ => Err(ParseError::InvalidNumber {
            column: "e-value",
            value: raw.to_string(),
        }),
    }
}

fn parse_score(raw: &str) -> Result<f64, ParseError> {
    match raw.parse::<f64>() {
        Ok(value) if !value.is_nan() => Ok(value),
        _ => Err(ParseError::InvalidNumber {
            column: "score",
            value: raw.to_string(),
        }),
    }
}

fn parse_coordinate(column: &'static str, raw: &str) -> Result<u64, ParseError> {
    raw.parse::<u64>()
        .map_err(|_| ParseError::InvalidCoordinate {
            column,
            value: raw.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    const TBLOUT: &str = "\
#                                                               --- full sequence ---- --- best 1 domain ---- --- domain number estimation ----
# target name        accession  query name           accession    E-value  score  bias   E-value  score  bias   exp reg clu  ov env dom rep inc description of target
#------------------- ---------- -------------------- ---------- --------- ------ ----- --------- ------ -----   --- --- --- --- --- --- --- --- ---------------------
APLP2_HUMAN/309-361  -          kunitz               -            1.2e-25   85.1   0.1   1.3e-25   85.0   0.1   1.0   1   0   0   1   1   1   1 Amyloid-like protein 2
BPT1_BOVIN           -          kunitz               -            3.4e-24   80.2   2.3   4.1e-24   80.0   2.3   1.0   1   0   0   1   1   1   1 -
#
# Program:         hmmsearch
";

    #[test]
    fn parses_tblout_rows_and_skips_comments() {
        let parsed = parse_hit_table(TBLOUT, HitFormat::Tblout);
        assert!(parsed.warnings.is_empty());
        assert_eq!(parsed.records.len(), 2);
        assert_eq!(parsed.comment_lines, 5);

        let first = &parsed.records[0];
        assert_eq!(first.target_id, "APLP2_HUMAN/309-361");
        assert_eq!(first.query_id, "kunitz");
        assert_eq!(first.e_value, 1.2e-25);
        assert_eq!(first.score, 85.1);
        assert_eq!((first.start, first.end), (Some(309), Some(361)));
        assert_eq!(first.line, 4);

        let second = &parsed.records[1];
        assert_eq!(second.target_id, "BPT1_BOVIN");
        assert_eq!((second.start, second.end), (None, None));
    }

    #[test]
    fn parses_domtblout_alignment_coordinates() {
        let text = "\
# target name accession tlen query name accession qlen E-value score bias # of c-Evalue i-Evalue score bias from to from to from to acc description
sp|P00974|BPT1_BOVIN - 100 kunitz - 53 3.4e-24 80.2 2.3 1 1 2.1e-27 4.1e-24 80.0 2.3 1 53 36 88 35 89 0.98 Pancreatic trypsin inhibitor
";
        let parsed = parse_hit_table(text, HitFormat::Domtblout);
        assert!(parsed.warnings.is_empty());
        let record = &parsed.records[0];
        assert_eq!(record.target_id, "sp|P00974|BPT1_BOVIN");
        assert_eq!(record.query_id, "kunitz");
        assert_eq!(record.e_value, 3.4e-24);
        assert_eq!(record.score, 80.2);
        assert_eq!((record.start, record.end), (Some(36), Some(88)));
    }

    #[test]
    fn malformed_rows_become_warnings_without_aborting() {
        let text = "\
# header
A - q - 1e-5 10.0 0 1e-5 10 0 1 1 0 0 1 1 1 1 desc
B - q - notanumber 10.0 0 1e-5 10 0 1 1 0 0 1 1 1 1 desc
C - q - 1e-5

D - q - 1e-3 nan 0 1e-3 5 0 1 1 0 0 1 1 1 1 desc
E - q - 1e-9 40.0 0 1e-9 40 0 1 1 0 0 1 1 1 1 desc
";
        let parsed = parse_hit_table(text, HitFormat::Tblout);
        let ids: Vec<&str> = parsed.records.iter().map(|r| r.target_id.as_str()).collect();
        assert_eq!(ids, vec!["A", "E"]);
        assert_eq!(parsed.warnings.len(), 3);
        assert_eq!(parsed.warnings[0].line, 3);
        assert!(parsed.warnings[0].reason.contains("e-value"));
        assert_eq!(parsed.warnings[1].line, 4);
        assert!(parsed.warnings[1].reason.contains("at least 18 fields"));
        assert_eq!(parsed.warnings[2].line, 6);
        assert!(parsed.warnings[2].reason.contains("score"));
    }

    #[test]
    fn records_plus_warnings_equal_data_lines() {
        let text = "\
# c
X - q - 1e-5 10.0 0 1e-5 10 0 1 1 0 0 1 1 1 1 -
Y - q - 1e-5
Z  -  q  -  2e-4  7.5  0  2e-4  7  0  1  1  0  0  1  1  1  1  -
#
";
        let parsed = parse_hit_table(text, HitFormat::Tblout);
        let non_comment = text
            .lines()
            .filter(|line| !line.trim().is_empty() && !line.trim().starts_with('#'))
            .count();
        assert_eq!(parsed.data_lines(), non_comment);
        assert_eq!(parsed.records.len(), 2);
    }

    #[test]
    fn negative_bit_scores_are_accepted() {
        let line = "W - q - 5.2 -1.3 0 5.2 -1.3 0 1 1 0 0 1 1 1 0 -";
        let record = parse_hit_line(line, 1, HitFormat::Tblout).unwrap();
        assert_eq!(record.score, -1.3);
    }

    #[test]
    fn coordinate_suffix_requires_numeric_span() {
        assert_eq!(
            split_coordinate_suffix("APLP2_HUMAN/309-361"),
            ("APLP2_HUMAN", Some((309, 361)))
        );
        assert_eq!(split_coordinate_suffix("BPT1_BOVIN"), ("BPT1_BOVIN", None));
        assert_eq!(split_coordinate_suffix("odd/name"), ("odd/name", None));
        assert_eq!(split_coordinate_suffix("/1-5"), ("/1-5", None));
    }

    #[test]
    fn uniprot_headers_reduce_to_entry_name_and_accession() {
        assert_eq!(
            split_uniprot_header("sp|P00974|BPT1_BOVIN"),
            Some(("P00974", "BPT1_BOVIN"))
        );
        assert_eq!(
            split_uniprot_header("tr|A0A024R4E5|A0A024R4E5_HUMAN"),
            Some(("A0A024R4E5", "A0A024R4E5_HUMAN"))
        );
        assert_eq!(split_uniprot_header("gi|12345|ref"), None);
        assert_eq!(split_uniprot_header("sp||BPT1_BOVIN"), None);
        assert_eq!(split_uniprot_header("BPT1_BOVIN"), None);

        let expected = SequenceName {
            name: "BPT1_BOVIN",
            accession: Some("P00974"),
        };
        assert_eq!(sequence_name("sp|P00974|BPT1_BOVIN"), expected);
        assert_eq!(sequence_name("sp|P00974|BPT1_BOVIN/36-88"), expected);
        assert_eq!(
            sequence_name("BPT1_BOVIN/36-88"),
            SequenceName {
                name: "BPT1_BOVIN",
                accession: None,
            }
        );
    }

    #[test]
    fn sequence_id_follows_key() {
        let record = parse_hit_line(
            "T1 - Q1 - 1e-5 10.0 0 1e-5 10 0 1 1 0 0 1 1 1 1 -",
            1,
            HitFormat::Tblout,
        )
        .unwrap();
        assert_eq!(record.sequence_id(SequenceKey::Target), "T1");
        assert_eq!(record.sequence_id(SequenceKey::Query), "Q1");
    }
}
