use base64::Engine;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use std::error::Error;

use crate::cache::SessionCache;
use crate::graph::{render_histogram, GraphOptions};
use crate::pager::{make_page, Pagination, PAGE_SIZE, TABLE_CLASS};
use crate::table::{DataFrame, Value};

lazy_static! {
    static ref HISTOGRAM_REGEX: Regex =
        Regex::new(r"(?i)^(?:plot|show)\s+(?:a\s+)?histogram\s+(?:of\s+|for\s+)?(.+?)$").unwrap();
}

/// Rows shown by `show head` when the dataset fits on one page
pub const HEAD_ROWS: usize = 5;

pub const NO_FILES_MESSAGE: &str =
    "No uploaded data files found (allowed: .csv, .txt, .xls, .xlsx).";
pub const NO_CACHE_MESSAGE: &str =
    "No cached dataset found. Run a data command first (e.g. \"show all data\").";
pub const INVALID_PAGE_MESSAGE: &str = "Invalid page number.";
pub const NO_NUMERIC_MESSAGE: &str = "No numeric columns found in the latest uploaded file.";

/// A chat message recognised as a data command
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    ShowHead,
    ShowShape,
    DescribeData,
    ShowAverage,
    ShowAllData,
    /// `show page N`; `None` when N is not a number
    ShowPage(Option<i64>),
    /// `plot histogram <column>`, keeping the column name as typed
    Histogram(String),
    /// Anything else, handed to the AI fallback
    Unmatched,
}

impl Command {
    /// Match a chat message against the fixed command table
    ///
    /// Matching is done on the trimmed, lower-cased message; histogram
    /// column names are taken from the original text.
    ///
    /// # Examples
    /// ```
    /// use datachat::commands::Command;
    ///
    /// assert_eq!(Command::parse("  Show Head "), Command::ShowHead);
    /// assert_eq!(Command::parse("show page 3"), Command::ShowPage(Some(3)));
    /// assert_eq!(
    ///     Command::parse("plot histogram of Price"),
    ///     Command::Histogram("Price".to_string())
    /// );
    /// assert_eq!(Command::parse("what is the trend?"), Command::Unmatched);
    /// ```
    pub fn parse(message: &str) -> Command {
        let trimmed = message.trim();
        let lower = trimmed.to_lowercase();

        match lower.as_str() {
            "show head" => return Command::ShowHead,
            "show shape" => return Command::ShowShape,
            "describe data" => return Command::DescribeData,
            "show me the average" => return Command::ShowAverage,
            "show all data" => return Command::ShowAllData,
            _ => {}
        }

        if lower.starts_with("show page") {
            let page = lower.split_whitespace().last().and_then(parse_page);
            return Command::ShowPage(page);
        }

        if let Some(caps) = HISTOGRAM_REGEX.captures(trimmed) {
            return Command::Histogram(caps[1].to_string());
        }

        Command::Unmatched
    }
}

/// Page numbers too large for `i64` saturate so they clamp like any other
/// out-of-range page
fn parse_page(token: &str) -> Option<i64> {
    if let Ok(page) = token.parse::<i64>() {
        return Some(page);
    }
    let (negative, digits) = match token.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, token.strip_prefix('+').unwrap_or(token)),
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(if negative { i64::MIN } else { i64::MAX })
}

/// JSON body returned by the chat endpoint
#[derive(Debug, Clone, Default, Serialize)]
pub struct Reply {
    pub response: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub averages: Option<serde_json::Map<String, serde_json::Value>>,

    /// PNG data URL for plot commands
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl Reply {
    pub fn text(message: impl Into<String>) -> Self {
        Reply {
            response: message.into(),
            ..Default::default()
        }
    }

    fn paged(html: String, pagination: Pagination) -> Self {
        Reply {
            response: html,
            pagination: Some(pagination),
            ..Default::default()
        }
    }
}

/// Serve `show page N` from the session cache
pub fn show_page(cache: &SessionCache, sid: &str, page: Option<i64>) -> Reply {
    let Some(page) = page else {
        return Reply::text(INVALID_PAGE_MESSAGE);
    };
    match cache.load(sid) {
        Some(df) => {
            let (html, pagination) = make_page(&df, page, PAGE_SIZE);
            Reply::paged(html, pagination)
        }
        None => Reply::text(NO_CACHE_MESSAGE),
    }
}

/// Run a dataset command against `df`
///
/// `show head` on a dataset larger than one page and `show all data` store
/// the full dataset in the session cache so later `show page N` requests
/// can be served without reloading the file.
///
/// # Errors
/// * Returns an error if a plot cannot be rendered
pub fn run(
    command: &Command,
    df: &DataFrame,
    cache: &SessionCache,
    sid: &str,
) -> Result<Reply, Box<dyn Error>> {
    let reply = match command {
        Command::ShowHead => {
            if df.shape().0 > PAGE_SIZE {
                cache.store(sid, df);
                let (html, pagination) = make_page(df, 1, PAGE_SIZE);
                Reply::paged(html, pagination)
            } else {
                Reply::text(df.head(HEAD_ROWS).to_html(TABLE_CLASS, false))
            }
        }
        Command::ShowShape => Reply::text(shape_table(df).to_html(TABLE_CLASS, false)),
        Command::DescribeData => Reply::text(df.describe().to_html(TABLE_CLASS, true)),
        Command::ShowAverage => average_reply(df),
        Command::ShowAllData => {
            cache.store(sid, df);
            let (html, pagination) = make_page(df, 1, PAGE_SIZE);
            Reply::paged(html, pagination)
        }
        Command::Histogram(column) => histogram_reply(df, column)?,
        Command::ShowPage(page) => show_page(cache, sid, *page),
        Command::Unmatched => return Err("Not a data command".into()),
    };
    Ok(reply)
}

fn shape_table(df: &DataFrame) -> DataFrame {
    let (rows, cols) = df.shape();
    DataFrame::new(
        vec!["rows".to_string(), "columns".to_string()],
        vec![vec![Value::Int(rows as i64), Value::Int(cols as i64)]],
    )
}

/// Means of the numeric columns, as a JSON object keyed by column name
pub fn averages_json(df: &DataFrame) -> serde_json::Map<String, serde_json::Value> {
    df.means()
        .into_iter()
        .map(|(name, mean)| (name, serde_json::json!(mean)))
        .collect()
}

/// One-column `mean` table indexed by numeric column name
///
/// `None` when the dataset has no numeric columns.
pub fn means_table(df: &DataFrame) -> Option<DataFrame> {
    let means = df.means();
    if means.is_empty() {
        return None;
    }

    Some(DataFrame::with_index(
        vec!["mean".to_string()],
        means.iter().map(|(name, _)| name.clone()).collect(),
        means
            .iter()
            .map(|(_, mean)| vec![mean.map(Value::Float).unwrap_or(Value::Null)])
            .collect(),
    ))
}

fn average_reply(df: &DataFrame) -> Reply {
    let Some(table) = means_table(df) else {
        return Reply::text(NO_NUMERIC_MESSAGE);
    };

    Reply {
        response: table.to_html(TABLE_CLASS, true),
        averages: Some(averages_json(df)),
        ..Default::default()
    }
}

fn histogram_reply(df: &DataFrame, column: &str) -> Result<Reply, Box<dyn Error>> {
    let Some(c) = df.find_column(column) else {
        return Ok(Reply::text(format!(
            "Column '{}' not found. Available columns: {}",
            column,
            df.columns().join(", ")
        )));
    };
    let name = &df.columns()[c];
    if !df.column_dtype(c).is_numeric() {
        return Ok(Reply::text(format!(
            "Column '{}' is not numeric and cannot be plotted as a histogram.",
            name
        )));
    }

    let options = GraphOptions {
        title: format!("Histogram of {}", name),
        x_label: name.clone(),
        ..Default::default()
    };
    let png = render_histogram(&df.numeric_values(c), &options)?;
    let data_url = format!(
        "data:image/png;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(png)
    );

    Ok(Reply {
        response: format!(
            "<img class=\"chat-plot\" src=\"{}\" alt=\"Histogram of {}\"/>",
            data_url,
            crate::table::escape_html(name)
        ),
        image: Some(data_url),
        ..Default::default()
    })
}
