//! Command Argument Parser
//!
//! Parses the trailing arguments of `retrieve`, `list-retrieve` and
//! `list-index` into typed requests.
//!
//! # Supported Syntax
//!
//! ```text
//! N_S_L_C [key=value ...] [start [end]]
//! key=value [key=value ...] [start [end]]
//! ```
//!
//! Keys are any prefix of `network`, `station`, `location`, `channel`.
//! Times are `YYYY-MM-DD[THH:MM[:SS[.ffffff]]][Z]`, always UTC.
//!
//! # Examples
//!
//! ```text
//! IU_ANMO_00_BHZ 2016-01-01 2016-01-02
//! net=IU sta=ANMO 2016-01-01T12:00 2016-01-01T13:00:00.5
//! IU_ANMO__BH? partitions
//! ```

use nom::{
    bytes::complete::take_while,
    character::complete::{alpha1, char},
    combinator::all_consuming,
    sequence::{separated_pair, tuple},
    IResult,
};

use crate::archive::{Interval, StreamPattern, Timestamp};
use crate::config::ConfigError;
use chrono::{NaiveDate, NaiveDateTime, TimeZone, Utc};
use regex::Regex;
use std::sync::OnceLock;

/// Output layout for `list-index`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListFormat {
    /// One line per index entry with its partition and file
    #[default]
    Partitions,
    /// One line per merged coverage interval
    Coverage,
}

impl std::str::FromStr for ListFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "partitions" => Ok(ListFormat::Partitions),
            "coverage" => Ok(ListFormat::Coverage),
            other => Err(ConfigError::InvalidPattern(format!(
                "unknown list format \"{}\"",
                other
            ))),
        }
    }
}

/// Parsed `retrieve` / `list-retrieve` arguments
#[derive(Debug, Clone)]
pub struct RetrieveRequest {
    pub pattern: StreamPattern,
    pub interval: Interval,
}

/// Parsed `list-index` arguments
#[derive(Debug, Clone)]
pub struct ListIndexRequest {
    pub pattern: StreamPattern,
    pub format: ListFormat,
}

/// Parse `<pattern…> <start> <end>`
pub fn parse_retrieve_args(args: &[String]) -> Result<RetrieveRequest, ConfigError> {
    let (pattern, rest) = split_pattern(args)?;

    let [start, end] = rest else {
        return Err(ConfigError::InvalidRange(format!(
            "expected a start and an end time, got {} value(s)",
            rest.len()
        )));
    };

    let start = parse_time(start)?;
    let end = parse_time(end)?;
    let interval = Interval::try_new(start, end).ok_or_else(|| {
        ConfigError::InvalidRange(format!("end \"{}\" is not after start \"{}\"", rest[1], rest[0]))
    })?;

    Ok(RetrieveRequest { pattern, interval })
}

/// Parse `<pattern…> [partitions|coverage]`
pub fn parse_list_index_args(args: &[String]) -> Result<ListIndexRequest, ConfigError> {
    let (pattern, rest) = split_pattern(args)?;

    let format = match rest {
        [] => ListFormat::default(),
        [format] => format.parse()?,
        _ => {
            return Err(ConfigError::InvalidPattern(format!(
                "unexpected arguments: {}",
                rest.join(" ")
            )))
        }
    };

    Ok(ListIndexRequest { pattern, format })
}

/// Parse the leading pattern arguments; returns the pattern and the rest
///
/// No pattern arguments means every stream.
pub fn split_pattern(args: &[String]) -> Result<(StreamPattern, &[String]), ConfigError> {
    let mut fields = ["*".to_string(), "*".to_string(), "*".to_string(), "*".to_string()];
    let mut consumed = 0;

    if let Some(first) = args.first().filter(|a| a.contains('_')) {
        let (_, sncl) = all_consuming(sncl)(first.as_str()).map_err(|_| {
            ConfigError::InvalidPattern(format!(
                "\"{}\" is not of the form NET_STA_LOC_CHA",
                first
            ))
        })?;
        for (field, code) in fields.iter_mut().zip(sncl) {
            *field = code.to_string();
        }
        consumed = 1;
    }

    for arg in &args[consumed..] {
        if !arg.contains('=') {
            break;
        }
        let (_, (name, value)) = all_consuming(filter)(arg.as_str()).map_err(|_| {
            ConfigError::InvalidPattern(format!("\"{}\" is not of the form key=value", arg))
        })?;
        let idx = FIELD_NAMES
            .iter()
            .position(|field| field.starts_with(&name.to_ascii_lowercase()))
            .ok_or_else(|| ConfigError::InvalidPattern(format!("unknown key \"{}\"", name)))?;
        fields[idx] = value.to_string();
        consumed += 1;
    }

    let pattern = StreamPattern::new(&fields[0], &fields[1], &fields[2], &fields[3])?;
    Ok((pattern, &args[consumed..]))
}

const FIELD_NAMES: [&str; 4] = ["network", "station", "location", "channel"];

fn is_code_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '*' | '?' | '-')
}

/// Parse a code (possibly empty)
fn code(input: &str) -> IResult<&str, &str> {
    take_while(is_code_char)(input)
}

/// Parse NET_STA_LOC_CHA
fn sncl(input: &str) -> IResult<&str, [&str; 4]> {
    let (input, (net, _, sta, _, loc, _, cha)) =
        tuple((code, char('_'), code, char('_'), code, char('_'), code))(input)?;
    Ok((input, [net, sta, loc, cha]))
}

/// Parse key=value
fn filter(input: &str) -> IResult<&str, (&str, &str)> {
    separated_pair(alpha1, char('='), code)(input)
}

fn time_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\d{4}-\d{2}-\d{2}(T\d{2}:\d{2}(:\d{2}(\.\d{1,9})?)?)?Z?$")
            .unwrap_or_else(|e| unreachable!("time pattern is valid: {}", e))
    })
}

/// Parse a UTC time into microseconds since the epoch
pub fn parse_time(input: &str) -> Result<Timestamp, ConfigError> {
    let invalid = || ConfigError::InvalidTime(format!("invalid time format \"{}\"", input));

    if !time_regex().is_match(input) {
        return Err(invalid());
    }
    let text = input.strip_suffix('Z').unwrap_or(input);

    let naive = if text.contains('T') {
        ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"]
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
    } else {
        NaiveDate::parse_from_str(text, "%Y-%m-%d")
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0))
    }
    .ok_or_else(invalid)?;

    Ok(Utc.from_utc_datetime(&naive).timestamp_micros())
}
