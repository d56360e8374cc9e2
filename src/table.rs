use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Markers that are read as missing values when loading a data file
const NA_VALUES: &[&str] = &[
    "", "NA", "N/A", "n/a", "NaN", "nan", "-NaN", "null", "NULL", "None", "#N/A", "<NA>",
];

/// A single cell of a [`DataFrame`]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Missing value
    Null,
    Int(i64),
    Float(f64),
    Text(String),
}

impl Value {
    /// Parse a raw field from a data file
    ///
    /// Missing-value markers become [`Value::Null`], integers and floats are
    /// recognised after trimming, and everything else is kept as text.
    ///
    /// # Examples
    /// ```
    /// use datachat::table::Value;
    ///
    /// assert_eq!(Value::parse("42"), Value::Int(42));
    /// assert_eq!(Value::parse(" 2.5 "), Value::Float(2.5));
    /// assert_eq!(Value::parse("N/A"), Value::Null);
    /// assert_eq!(Value::parse("Oslo"), Value::Text("Oslo".to_string()));
    /// ```
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if NA_VALUES.contains(&raw) || NA_VALUES.contains(&trimmed) {
            return Value::Null;
        }
        if let Ok(i) = trimmed.parse::<i64>() {
            return Value::Int(i);
        }
        if let Ok(f) = trimmed.parse::<f64>() {
            return Value::Float(f);
        }
        Value::Text(raw.to_string())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Numeric view of the value; `None` for nulls, text and NaN
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) if !f.is_nan() => Some(*f),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NaN"),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", format_float(*x)),
            Value::Text(s) => write!(f, "{}", s),
        }
    }
}

/// Inferred type of a column
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DType {
    Int64,
    Float64,
    Object,
}

impl DType {
    pub fn is_numeric(self) -> bool {
        matches!(self, DType::Int64 | DType::Float64)
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DType::Int64 => "int64",
            DType::Float64 => "float64",
            DType::Object => "object",
        };
        write!(f, "{}", name)
    }
}

/// In-memory tabular dataset
///
/// Rows are stored as vectors of [`Value`] with one entry per column. An
/// optional list of index labels is carried for derived tables such as the
/// output of [`DataFrame::describe`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DataFrame {
    columns: Vec<String>,
    index: Option<Vec<String>>,
    rows: Vec<Vec<Value>>,
}

impl DataFrame {
    /// Build a frame from parsed data
    ///
    /// Short rows are padded with nulls and long rows truncated to the
    /// header width. Integer columns that also hold floats or nulls are
    /// promoted to floats so every numeric column has a single type.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        let width = columns.len();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, Value::Null);
                row
            })
            .collect();

        let mut frame = DataFrame {
            columns,
            index: None,
            rows,
        };
        frame.promote_numeric_columns();
        frame
    }

    /// Build a frame with explicit index labels, keeping values as given
    pub fn with_index(columns: Vec<String>, index: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        DataFrame {
            columns,
            index: Some(index),
            rows,
        }
    }

    fn promote_numeric_columns(&mut self) {
        for c in 0..self.columns.len() {
            if self.column_dtype(c) != DType::Float64 {
                continue;
            }
            for row in &mut self.rows {
                if let Value::Int(i) = row[c] {
                    row[c] = Value::Float(i as f64);
                }
            }
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn index(&self) -> Option<&[String]> {
        self.index.as_deref()
    }

    /// `(rows, columns)`
    pub fn shape(&self) -> (usize, usize) {
        (self.rows.len(), self.columns.len())
    }

    pub fn head(&self, n: usize) -> DataFrame {
        self.slice(0, n)
    }

    /// Rows `[start, end)`, clamped to the frame
    pub fn slice(&self, start: usize, end: usize) -> DataFrame {
        let end = end.min(self.rows.len());
        let start = start.min(end);
        DataFrame {
            columns: self.columns.clone(),
            index: self.index.as_ref().map(|labels| labels[start..end].to_vec()),
            rows: self.rows[start..end].to_vec(),
        }
    }

    /// Type of column `c`
    ///
    /// An empty frame reports `object`; an all-null column reports
    /// `float64`.
    pub fn column_dtype(&self, c: usize) -> DType {
        if self.rows.is_empty() {
            return DType::Object;
        }
        let mut widened = false;
        for row in &self.rows {
            match &row[c] {
                Value::Text(_) => return DType::Object,
                Value::Float(_) | Value::Null => widened = true,
                Value::Int(_) => {}
            }
        }
        if widened {
            DType::Float64
        } else {
            DType::Int64
        }
    }

    pub fn dtypes(&self) -> Vec<DType> {
        (0..self.columns.len()).map(|c| self.column_dtype(c)).collect()
    }

    /// Indices of the numeric columns, in column order
    pub fn numeric_columns(&self) -> Vec<usize> {
        (0..self.columns.len())
            .filter(|&c| self.column_dtype(c).is_numeric())
            .collect()
    }

    /// Find a column by name, preferring an exact match over a
    /// case-insensitive one
    pub fn find_column(&self, name: &str) -> Option<usize> {
        let name = name.trim();
        self.columns
            .iter()
            .position(|c| c == name)
            .or_else(|| self.columns.iter().position(|c| c.eq_ignore_ascii_case(name)))
    }

    pub fn non_null_count(&self, c: usize) -> usize {
        self.rows.iter().filter(|row| !row[c].is_null()).count()
    }

    /// Non-null numeric values of column `c`
    pub fn numeric_values(&self, c: usize) -> Vec<f64> {
        self.rows.iter().filter_map(|row| row[c].as_f64()).collect()
    }

    /// Mean of every numeric column
    ///
    /// Non-numeric columns are left out. A numeric column without any
    /// values has no mean.
    pub fn means(&self) -> Vec<(String, Option<f64>)> {
        self.numeric_columns()
            .into_iter()
            .map(|c| (self.columns[c].clone(), mean(&self.numeric_values(c))))
            .collect()
    }

    /// Summary statistics for every column
    ///
    /// Object columns get `count, unique, top, freq`; numeric columns get
    /// `count, mean, std, min, 25%, 50%, 75%, max`. Each block of rows is
    /// only present when at least one column of that kind exists, and cells
    /// that do not apply to a column are NaN.
    pub fn describe(&self) -> DataFrame {
        let dtypes = self.dtypes();
        let has_object = dtypes.iter().any(|d| !d.is_numeric());
        let has_numeric = dtypes.iter().any(|d| d.is_numeric());

        let mut labels = vec!["count"];
        if has_object {
            labels.extend(["unique", "top", "freq"]);
        }
        if has_numeric {
            labels.extend(["mean", "std", "min", "25%", "50%", "75%", "max"]);
        }

        let mut rows = vec![vec![Value::Null; self.columns.len()]; labels.len()];
        for (c, dtype) in dtypes.iter().enumerate() {
            let summary = if dtype.is_numeric() {
                self.numeric_summary(c)
            } else {
                self.object_summary(c)
            };
            for (label, value) in summary {
                if let Some(r) = labels.iter().position(|l| *l == label) {
                    rows[r][c] = value;
                }
            }
        }

        DataFrame::with_index(
            self.columns.clone(),
            labels.into_iter().map(String::from).collect(),
            rows,
        )
    }

    fn numeric_summary(&self, c: usize) -> Vec<(&'static str, Value)> {
        let mut values = self.numeric_values(c);
        values.sort_by(|a, b| a.total_cmp(b));
        let float = |v: Option<f64>| v.map(Value::Float).unwrap_or(Value::Null);

        vec![
            ("count", Value::Float(values.len() as f64)),
            ("mean", float(mean(&values))),
            ("std", float(sample_std(&values))),
            ("min", float(values.first().copied())),
            ("25%", float(quantile(&values, 0.25))),
            ("50%", float(quantile(&values, 0.5))),
            ("75%", float(quantile(&values, 0.75))),
            ("max", float(values.last().copied())),
        ]
    }

    fn object_summary(&self, c: usize) -> Vec<(&'static str, Value)> {
        let mut counts: HashMap<String, usize> = HashMap::new();
        let mut order: Vec<String> = Vec::new();
        for row in &self.rows {
            if row[c].is_null() {
                continue;
            }
            let key = row[c].to_string();
            let n = counts.entry(key.clone()).or_insert(0);
            if *n == 0 {
                order.push(key);
            }
            *n += 1;
        }

        let count: usize = counts.values().sum();
        // First value reaching the highest frequency wins ties
        let mut top: Option<(&String, usize)> = None;
        for key in &order {
            let n = counts[key];
            if top.map_or(true, |(_, best)| n > best) {
                top = Some((key, n));
            }
        }

        vec![
            ("count", Value::Int(count as i64)),
            ("unique", Value::Int(order.len() as i64)),
            (
                "top",
                top.map(|(k, _)| Value::Text(k.clone())).unwrap_or(Value::Null),
            ),
            (
                "freq",
                top.map(|(_, n)| Value::Int(n as i64)).unwrap_or(Value::Null),
            ),
        ]
    }

    /// Render as an HTML table
    ///
    /// # Arguments
    /// * `classes` - Extra CSS classes added after `dataframe`
    /// * `index` - Whether to render the index labels (row numbers when the
    ///   frame has none) as a leading header column
    pub fn to_html(&self, classes: &str, index: bool) -> String {
        let mut html = String::new();
        let class_attr = if classes.is_empty() {
            "dataframe".to_string()
        } else {
            format!("dataframe {}", classes)
        };
        html.push_str(&format!(
            "<table border=\"0\" class=\"{}\">\n",
            escape_html(&class_attr)
        ));

        html.push_str("  <thead>\n    <tr style=\"text-align: right;\">\n");
        if index {
            html.push_str("      <th></th>\n");
        }
        for column in &self.columns {
            html.push_str(&format!("      <th>{}</th>\n", escape_html(column)));
        }
        html.push_str("    </tr>\n  </thead>\n  <tbody>\n");

        for (r, row) in self.rows.iter().enumerate() {
            html.push_str("    <tr>\n");
            if index {
                let label = match &self.index {
                    Some(labels) => labels[r].clone(),
                    None => r.to_string(),
                };
                html.push_str(&format!("      <th>{}</th>\n", escape_html(&label)));
            }
            for value in row {
                html.push_str(&format!(
                    "      <td>{}</td>\n",
                    escape_html(&value.to_string())
                ));
            }
            html.push_str("    </tr>\n");
        }

        html.push_str("  </tbody>\n</table>");
        html
    }

    /// Render as right-aligned plain text, index labels first when present
    pub fn to_text(&self) -> String {
        let mut grid: Vec<Vec<String>> = Vec::with_capacity(self.rows.len() + 1);
        let with_index = self.index.is_some();

        let mut header = Vec::new();
        if with_index {
            header.push(String::new());
        }
        header.extend(self.columns.iter().cloned());
        grid.push(header);

        for (r, row) in self.rows.iter().enumerate() {
            let mut line = Vec::new();
            if let Some(labels) = &self.index {
                line.push(labels[r].clone());
            }
            line.extend(row.iter().map(|v| v.to_string()));
            grid.push(line);
        }

        let width = grid[0].len();
        let widths: Vec<usize> = (0..width)
            .map(|c| grid.iter().map(|line| line[c].chars().count()).max().unwrap_or(0))
            .collect();

        grid.iter()
            .map(|line| {
                line.iter()
                    .zip(&widths)
                    .map(|(cell, w)| format!("{:>width$}", cell, width = *w))
                    .collect::<Vec<_>>()
                    .join("  ")
                    .trim_end()
                    .to_string()
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Format a float the way tables show it: whole numbers keep a trailing
/// `.0`, everything else is rounded to six decimals without trailing zeros
pub fn format_float(f: f64) -> String {
    if f.is_nan() {
        return "NaN".to_string();
    }
    if f.is_infinite() {
        return if f > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    if f.fract() == 0.0 && f.abs() < 1e16 {
        return format!("{:.1}", f);
    }
    let mut s = format!("{:.6}", f);
    while s.ends_with('0') {
        s.pop();
    }
    if s.ends_with('.') {
        s.push('0');
    }
    s
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

fn sample_std(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    Some(var.sqrt())
}

/// Linear-interpolated quantile of already sorted values
fn quantile(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn people() -> DataFrame {
        DataFrame::new(
            vec!["name".into(), "age".into(), "score".into()],
            vec![
                vec![Value::parse("ann"), Value::parse("31"), Value::parse("1.5")],
                vec![Value::parse("bob"), Value::parse("25"), Value::parse("")],
                vec![Value::parse("ann"), Value::parse("40"), Value::parse("3.5")],
                vec![Value::parse("cy"), Value::parse("28"), Value::parse("2")],
            ],
        )
    }

    #[test]
    fn infers_column_types() {
        let df = people();
        assert_eq!(df.dtypes(), vec![DType::Object, DType::Int64, DType::Float64]);
        // 2 was promoted because the column also holds floats and nulls
        assert_eq!(df.rows()[3][2], Value::Float(2.0));
    }

    #[test]
    fn all_null_column_is_numeric() {
        let df = DataFrame::new(
            vec!["empty".into()],
            vec![vec![Value::Null], vec![Value::Null]],
        );
        assert_eq!(df.column_dtype(0), DType::Float64);
        assert_eq!(df.means(), vec![("empty".to_string(), None)]);
    }

    #[test]
    fn means_skip_text_columns() {
        let means = people().means();
        assert_eq!(means.len(), 2);
        assert_eq!(means[0], ("age".to_string(), Some(31.0)));
        assert_eq!(means[1].0, "score");
        let score = means[1].1.unwrap();
        assert!((score - 7.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn describe_mixes_object_and_numeric_blocks() {
        let d = people().describe();
        let labels = d.index().unwrap();
        assert_eq!(
            labels,
            [
                "count", "unique", "top", "freq", "mean", "std", "min", "25%", "50%", "75%",
                "max"
            ]
        );
        // name column
        assert_eq!(d.rows()[0][0], Value::Int(4));
        assert_eq!(d.rows()[1][0], Value::Int(3));
        assert_eq!(d.rows()[2][0], Value::Text("ann".into()));
        assert_eq!(d.rows()[3][0], Value::Int(2));
        assert_eq!(d.rows()[4][0], Value::Null);
        // age column: 25, 28, 31, 40
        assert_eq!(d.rows()[0][1], Value::Float(4.0));
        assert_eq!(d.rows()[1][1], Value::Null);
        assert_eq!(d.rows()[6][1], Value::Float(25.0));
        assert_eq!(d.rows()[7][1], Value::Float(27.25));
        assert_eq!(d.rows()[8][1], Value::Float(29.5));
        assert_eq!(d.rows()[10][1], Value::Float(40.0));
        // score column ignores the missing value
        assert_eq!(d.rows()[0][2], Value::Float(3.0));
    }

    #[test]
    fn describe_numeric_only_has_no_object_rows() {
        let df = DataFrame::new(
            vec!["x".into()],
            vec![vec![Value::Int(1)], vec![Value::Int(3)]],
        );
        let d = df.describe();
        assert_eq!(d.index().unwrap().len(), 8);
        let std = d.rows()[2][0].as_f64().unwrap();
        assert!((std - 2f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn slice_is_clamped() {
        let df = people();
        assert_eq!(df.slice(2, 100).shape(), (2, 3));
        assert_eq!(df.slice(10, 20).shape(), (0, 3));
        assert_eq!(df.head(1).rows()[0][0], Value::Text("ann".into()));
    }

    #[test]
    fn html_escapes_and_renders_index() {
        let df = DataFrame::new(
            vec!["a<b".into()],
            vec![vec![Value::Text("x & y".into())]],
        );
        let html = df.to_html("data-table", true);
        assert!(html.starts_with("<table border=\"0\" class=\"dataframe data-table\">"));
        assert!(html.contains("<th>a&lt;b</th>"));
        assert!(html.contains("<th>0</th>"));
        assert!(html.contains("<td>x &amp; y</td>"));

        let plain = df.to_html("data-table", false);
        assert!(!plain.contains("<th></th>"));
    }

    #[test]
    fn floats_format_like_tables() {
        assert_eq!(format_float(3.0), "3.0");
        assert_eq!(format_float(2.5), "2.5");
        assert_eq!(format_float(1.0 / 3.0), "0.333333");
        assert_eq!(format_float(f64::NAN), "NaN");
    }

    #[test]
    fn find_column_falls_back_to_case_insensitive() {
        let df = people();
        assert_eq!(df.find_column("Age"), Some(1));
        assert_eq!(df.find_column("score"), Some(2));
        assert_eq!(df.find_column("height"), None);
    }

    #[test]
    fn text_rendering_aligns_columns() {
        let df = DataFrame::new(
            vec!["a".into(), "long".into()],
            vec![vec![Value::Int(1), Value::Int(22)]],
        );
        assert_eq!(df.to_text(), "a  long\n1    22");
    }
}
