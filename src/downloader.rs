#![cfg(not(tarpaulin_include))]

use crate::table::{DataFrame, Value};
use std::error::Error;

/// Convert a dataset to CSV text
///
/// The header row holds the column names. Fields containing commas,
/// quotes or line breaks are quoted, with embedded quotes doubled. Missing
/// values are written as empty fields.
///
/// # Examples
/// ```
/// use datachat::downloader::to_csv;
/// use datachat::table::{DataFrame, Value};
///
/// let df = DataFrame::new(
///     vec!["name".into(), "qty".into()],
///     vec![vec![Value::Text("a, b".into()), Value::Int(3)]],
/// );
/// assert_eq!(to_csv(&df), "name,qty\n\"a, b\",3\n");
/// ```
pub fn to_csv(df: &DataFrame) -> String {
    let mut csv_content = String::new();

    push_record(&mut csv_content, df.columns().iter().map(String::as_str));
    for row in df.rows() {
        let fields: Vec<String> = row
            .iter()
            .map(|value| match value {
                Value::Null => String::new(),
                other => other.to_string(),
            })
            .collect();
        push_record(&mut csv_content, fields.iter().map(String::as_str));
    }

    csv_content
}

fn push_record<'a>(out: &mut String, fields: impl Iterator<Item = &'a str>) {
    for (i, field) in fields.enumerate() {
        if i > 0 {
            out.push(',');
        }
        if field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r') {
            out.push('"');
            out.push_str(&field.replace('"', "\"\""));
            out.push('"');
        } else {
            out.push_str(field);
        }
    }
    out.push('\n');
}

/// Convert a dataset to XLSX format
///
/// Writes a single worksheet with the column names in the first row.
/// Numbers are stored as numeric cells, text as strings and missing values
/// are left blank.
///
/// # Returns
/// * `Result<Vec<u8>, Box<dyn Error>>` - XLSX file content as bytes or an error
pub fn to_xlsx(df: &DataFrame) -> Result<Vec<u8>, Box<dyn Error>> {
    use rust_xlsxwriter::Workbook;

    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();

    for (c, column) in df.columns().iter().enumerate() {
        worksheet.write_string(0, c as u16, column)?;
    }

    for (r, row) in df.rows().iter().enumerate() {
        let xlsx_row = (r + 1) as u32;
        for (c, value) in row.iter().enumerate() {
            let xlsx_col = c as u16;
            match value {
                Value::Null => {}
                Value::Int(i) => {
                    worksheet.write_number(xlsx_row, xlsx_col, *i as f64)?;
                }
                Value::Float(f) => {
                    worksheet.write_number(xlsx_row, xlsx_col, *f)?;
                }
                Value::Text(s) => {
                    worksheet.write_string(xlsx_row, xlsx_col, s)?;
                }
            }
        }
    }

    let buffer = workbook.save_to_buffer()?;

    Ok(buffer)
}
