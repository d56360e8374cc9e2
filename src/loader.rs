use crate::table::{DataFrame, Value};
use calamine::{Data, DataType};
use chrono::NaiveTime;
use std::collections::HashMap;
use std::error::Error;
use std::path::Path;

/// Extensions accepted for uploaded data files
pub const ALLOWED_EXTENSIONS: &[&str] = &["csv", "txt", "xls", "xlsx"];

/// Reduce a client-supplied filename to its final path component
///
/// Both `/` and `\` separators are stripped so a name cannot walk out of the
/// upload directory.
///
/// # Examples
/// ```
/// use datachat::loader::sanitize_filename;
///
/// assert_eq!(sanitize_filename("../../etc/passwd.csv"), "passwd.csv");
/// assert_eq!(sanitize_filename("C:\\data\\sales.xlsx"), "sales.xlsx");
/// ```
pub fn sanitize_filename(name: &str) -> String {
    name.rsplit(['/', '\\']).next().unwrap_or("").trim().to_string()
}

/// Check a filename against [`ALLOWED_EXTENSIONS`], ignoring case
pub fn has_allowed_extension(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ALLOWED_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Load a data file into a [`DataFrame`]
///
/// CSV and TXT files are parsed as comma-separated text with a header row.
/// Excel files use their first worksheet; when the workbook cannot be
/// opened the bytes are tried as CSV instead.
///
/// # Examples
/// ```no_run
/// use datachat::loader::load_dataframe;
///
/// match load_dataframe("uploads/sales.csv") {
///     Ok(df) => println!("Loaded {} rows", df.shape().0),
///     Err(e) => eprintln!("Error loading file: {}", e),
/// }
/// ```
pub fn load_dataframe(filepath: impl AsRef<Path>) -> Result<DataFrame, Box<dyn Error>> {
    let path = filepath.as_ref();
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase());

    match extension.as_deref() {
        Some("csv") | Some("txt") => from_csv(path),
        Some("xlsx") | Some("xls") => match from_excel(path) {
            Ok(df) => Ok(df),
            Err(e) => {
                log::debug!("{} is not a readable workbook ({}), trying CSV", path.display(), e);
                from_csv(path)
            }
        },
        Some(ext) => Err(format!("Unsupported file extension: {}", ext).into()),
        None => Err("File has no extension".into()),
    }
}

/// Load a CSV file, decoding invalid UTF-8 with replacement characters
pub fn from_csv(filepath: impl AsRef<Path>) -> Result<DataFrame, Box<dyn Error>> {
    let raw = std::fs::read(filepath)?;
    let text = match String::from_utf8(raw) {
        Ok(text) => text,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    };
    parse_csv(&text)
}

/// Parse CSV text with a header row into a [`DataFrame`]
///
/// # Errors
/// * The text holds no header row
/// * A data row has more fields than the header
pub fn parse_csv(text: &str) -> Result<DataFrame, Box<dyn Error>> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut records = split_records(text).into_iter();

    let (_, header) = records
        .next()
        .ok_or("No columns to parse from file")?;
    let columns = dedupe_columns(header);
    let width = columns.len();

    let mut rows = Vec::new();
    for (line, fields) in records {
        if fields.len() > width {
            return Err(format!(
                "Error tokenizing data. Expected {} fields in line {}, saw {}",
                width,
                line,
                fields.len()
            )
            .into());
        }
        rows.push(fields.iter().map(|f| Value::parse(f)).collect());
    }

    Ok(DataFrame::new(columns, rows))
}

// Split CSV text into records of fields, tagged with the 1-based line each
// record starts on. Quoted fields may contain commas, newlines and doubled
// quotes. A quote anywhere but the start of a field is a literal character.
// Blank lines are skipped.
fn split_records(text: &str) -> Vec<(usize, Vec<String>)> {
    let mut records = Vec::new();
    let mut fields: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut at_field_start = true;
    let mut line = 1;
    let mut record_line = 1;
    let mut chars = text.chars().peekable();

    let mut finish = |fields: &mut Vec<String>, current: &mut String, start: usize| {
        fields.push(std::mem::take(current));
        let record = std::mem::take(fields);
        if !(record.len() == 1 && record[0].is_empty()) {
            records.push((start, record));
        }
    };

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    current.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            }
            '"' if at_field_start => in_quotes = true,
            ',' if !in_quotes => fields.push(std::mem::take(&mut current)),
            '\r' if !in_quotes && chars.peek() == Some(&'\n') => {}
            '\n' if !in_quotes => {
                finish(&mut fields, &mut current, record_line);
                line += 1;
                record_line = line;
            }
            '\n' => {
                current.push(c);
                line += 1;
            }
            _ => current.push(c),
        }
        at_field_start = !in_quotes && matches!(c, ',' | '\n');
    }

    if !current.is_empty() || !fields.is_empty() {
        finish(&mut fields, &mut current, record_line);
    }

    records
}

// Give empty header names a positional name and suffix repeated names with
// `.1`, `.2`, ...
fn dedupe_columns(header: Vec<String>) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    header
        .into_iter()
        .enumerate()
        .map(|(i, name)| {
            let name = if name.trim().is_empty() {
                format!("Unnamed: {}", i)
            } else {
                name
            };
            let n = seen.entry(name.clone()).or_insert(0);
            let unique = if *n == 0 {
                name.clone()
            } else {
                format!("{}.{}", name, n)
            };
            *n += 1;
            unique
        })
        .collect()
}

/// Load the first worksheet of an Excel workbook
///
/// The first row is used as the header.
pub fn from_excel(filepath: impl AsRef<Path>) -> Result<DataFrame, Box<dyn Error>> {
    use calamine::{open_workbook_auto, Reader};

    let mut workbook = open_workbook_auto(filepath)?;

    let sheet_name = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or("No sheets found in Excel file")?;

    let range = workbook.worksheet_range(&sheet_name)?;
    let mut rows = range.rows();

    let header = rows.next().ok_or("No columns to parse from file")?;
    let columns = dedupe_columns(
        header
            .iter()
            .map(|cell| match cell {
                Data::Empty => String::new(),
                other => other.to_string(),
            })
            .collect(),
    );

    let data = rows
        .map(|row| {
            row.iter()
                .map(excel_value)
                .collect()
        })
        .collect();

    Ok(DataFrame::new(columns, data))
}

// Workbooks store every number as a float; whole ones come back as ints so
// integer columns keep an int64 dtype. Columns mixing in fractional values
// are widened back to float by `DataFrame::new`.
fn excel_value(cell: &Data) -> Value {
    match cell {
        Data::Empty | Data::Error(_) => Value::Null,
        Data::Int(i) => Value::Int(*i),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Value::Int(*f as i64),
        Data::Float(f) => Value::Float(*f),
        Data::String(s) => Value::parse(s),
        Data::Bool(b) => Value::Text(if *b { "True" } else { "False" }.to_string()),
        Data::DateTime(_) => match cell.as_datetime() {
            Some(dt) if dt.time() == NaiveTime::MIN => Value::Text(dt.format("%Y-%m-%d").to_string()),
            Some(dt) => Value::Text(dt.format("%Y-%m-%d %H:%M:%S").to_string()),
            None => Value::Text(cell.to_string()),
        },
        other => Value::Text(other.to_string()),
    }
}
