#![cfg(not(tarpaulin_include))]

use datachat::commands::{means_table, Command, HEAD_ROWS, NO_CACHE_MESSAGE, NO_NUMERIC_MESSAGE};
use datachat::graph::histogram_bins;
use datachat::loader::load_dataframe;
use datachat::pager::{page_slice, PAGE_SIZE};
use datachat::table::{format_float, DataFrame};
use env_logger::Env;
use std::env;
use std::io::{self, Write};
use std::time::Instant;

fn print_page(df: &DataFrame, page: i64) {
    let (rows, p) = page_slice(df, page, PAGE_SIZE);
    println!("{}", rows.to_text());
    println!(
        "-- page {} of {} ({} rows) --",
        p.current_page, p.total_pages, p.total_rows
    );
}

/// Text histogram: one bar of `#` per bin, scaled to 40 columns
fn print_histogram(df: &DataFrame, column: &str) -> String {
    let Some(c) = df.find_column(column) else {
        println!("Column '{}' not found. Available columns: {}", column, df.columns().join(", "));
        return String::from("invalid column");
    };
    if !df.column_dtype(c).is_numeric() {
        println!("Column '{}' is not numeric", df.columns()[c]);
        return String::from("invalid column");
    }

    let bins = histogram_bins(&df.numeric_values(c), 10);
    let tallest = bins.iter().map(|b| b.count).max().unwrap_or(0).max(1);
    for bin in &bins {
        let bar = "#".repeat(bin.count * 40 / tallest);
        println!(
            "{:>12} - {:<12} {:>6} {}",
            format_float(bin.lower),
            format_float(bin.upper),
            bin.count,
            bar
        );
    }
    String::from("ok")
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(Env::default().default_filter_or("warn")).init();

    let s = Instant::now(); // Start time for the entire program
    let args: Vec<String> = env::args().collect();

    if args.len() != 2 {
        eprintln!("Usage: {} <data file>", args[0]);
        return Ok(());
    }

    let df = match load_dataframe(&args[1]) {
        Ok(df) => df,
        Err(e) => {
            eprintln!("Error: Failed to read {}: {}", args[1], e);
            return Ok(());
        }
    };
    let (rows, cols) = df.shape();
    println!("Loaded {} ({} rows x {} columns)", args[1], rows, cols);

    // Stands in for the session cache: set by `show all data` and large heads
    let mut paged: Option<&DataFrame> = None;
    let mut start_time = Instant::now(); // Start time for the first command
    let mut status = String::from("ok");

    loop {
        let elapsed_time = start_time.elapsed().as_secs_f64();
        print!("[{:.1}] ({}) > ", elapsed_time, status);
        io::stdout().flush()?;

        let mut line = String::new();
        if io::stdin().read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();

        start_time = Instant::now(); // Reset the start time for the next command

        if line.is_empty() {
            status = String::from("invalid command");
            continue;
        }

        if line == "q" {
            break;
        }

        if line == "help" {
            println!("Commands:");
            println!("  show head: First rows of the dataset");
            println!("  show shape: Row and column counts");
            println!("  describe data: Summary statistics");
            println!("  show me the average: Means of the numeric columns");
            println!("  show all data: First page of the full dataset");
            println!("  show page <n>: Page n of the last paged dataset");
            println!("  plot histogram <column>: Text histogram of a numeric column");
            println!("  q: Quit");
            continue;
        }

        status = match Command::parse(line) {
            Command::ShowHead => {
                if rows > PAGE_SIZE {
                    paged = Some(&df);
                    print_page(&df, 1);
                } else {
                    println!("{}", df.head(HEAD_ROWS).to_text());
                }
                String::from("ok")
            }
            Command::ShowShape => {
                println!("rows: {}, columns: {}", rows, cols);
                String::from("ok")
            }
            Command::DescribeData => {
                println!("{}", df.describe().to_text());
                String::from("ok")
            }
            Command::ShowAverage => match means_table(&df) {
                Some(table) => {
                    println!("{}", table.to_text());
                    String::from("ok")
                }
                None => {
                    println!("{}", NO_NUMERIC_MESSAGE);
                    String::from("no numeric columns")
                }
            },
            Command::ShowAllData => {
                paged = Some(&df);
                print_page(&df, 1);
                String::from("ok")
            }
            Command::ShowPage(Some(page)) => match paged {
                Some(data) => {
                    print_page(data, page);
                    String::from("ok")
                }
                None => {
                    println!("{}", NO_CACHE_MESSAGE);
                    String::from("nothing to page")
                }
            },
            Command::ShowPage(None) => String::from("invalid page"),
            Command::Histogram(column) => print_histogram(&df, &column),
            Command::Unmatched => String::from("invalid command"),
        };
    }

    let e = s.elapsed().as_secs_f64(); // Calculate total elapsed time
    println!("Total elapsed time: {:.1} seconds", e);

    Ok(())
}
