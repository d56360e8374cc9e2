#![cfg(not(tarpaulin_include))]
use plotters::prelude::*;

/// Configuration options for histogram rendering
#[derive(Clone, Debug)]
pub struct GraphOptions {
    /// Title displayed at the top of the graph
    pub title: String,

    /// Label for the X-axis
    pub x_label: String,

    /// Label for the Y-axis
    pub y_label: String,

    /// Width of the graph in pixels
    pub width: u32,

    /// Height of the graph in pixels
    pub height: u32,

    /// Number of equal-width bins
    pub bins: usize,
}

impl Default for GraphOptions {
    fn default() -> Self {
        Self {
            title: "Histogram".to_string(),
            x_label: "Value".to_string(),
            y_label: "Count".to_string(),
            width: 800,
            height: 600,
            bins: 10,
        }
    }
}

/// One histogram bar: `[lower, upper)` and the number of values in it
#[derive(Clone, Debug, PartialEq)]
pub struct Bin {
    pub lower: f64,
    pub upper: f64,
    pub count: usize,
}

/// Split values into equal-width bins
///
/// Bins span `[min, max]` of the finite values; the last bin also includes
/// its upper edge. When every value is the same the range is widened to
/// `[v - 0.5, v + 0.5]`. NaN and infinite values are ignored. An empty input
/// yields no bins.
pub fn histogram_bins(values: &[f64], bins: usize) -> Vec<Bin> {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() || bins == 0 {
        return Vec::new();
    }

    let mut lo = finite.iter().copied().fold(f64::INFINITY, f64::min);
    let mut hi = finite.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if lo == hi {
        lo -= 0.5;
        hi += 0.5;
    }
    let width = (hi - lo) / bins as f64;

    let mut counts = vec![0usize; bins];
    for v in finite {
        let idx = (((v - lo) / width) as usize).min(bins - 1);
        counts[idx] += 1;
    }

    counts
        .into_iter()
        .enumerate()
        .map(|(i, count)| Bin {
            lower: lo + width * i as f64,
            upper: lo + width * (i + 1) as f64,
            count,
        })
        .collect()
}

/// Render a histogram of `values` as PNG bytes
///
/// # Implementation Notes
/// * Draws into a temporary `.png` file and reads it back
/// * The y-axis always starts at zero
/// * When text cannot be drawn (no usable system font) the bars are drawn
///   without caption or axis labels
///
/// # Errors
/// * Returns an error when there are no finite values to plot
pub fn render_histogram(
    values: &[f64],
    options: &GraphOptions,
) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    let bins = histogram_bins(values, options.bins);
    if bins.is_empty() {
        return Err("No numeric values to plot".into());
    }

    let file = tempfile::Builder::new()
        .prefix("histogram")
        .suffix(".png")
        .tempfile()?;

    if let Err(e) = draw_histogram(file.path(), &bins, options, true) {
        log::warn!("Histogram labels could not be drawn, plotting bars only: {}", e);
        draw_histogram(file.path(), &bins, options, false)?;
    }

    let png_data = std::fs::read(file.path())?;
    Ok(png_data)
}

fn draw_histogram(
    path: &std::path::Path,
    bins: &[Bin],
    options: &GraphOptions,
    labelled: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let (first, last) = match (bins.first(), bins.last()) {
        (Some(first), Some(last)) => (first.lower, last.upper),
        _ => return Err("No numeric values to plot".into()),
    };
    let max_count = bins.iter().map(|b| b.count).max().unwrap_or(0).max(1);

    let root = BitMapBackend::new(path, (options.width, options.height)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut builder = ChartBuilder::on(&root);
    builder.margin(10);
    if labelled {
        builder
            .caption(&options.title, ("sans-serif", 30).into_font())
            .x_label_area_size(40)
            .y_label_area_size(50);
    }
    let mut chart = builder.build_cartesian_2d(first..last, 0f64..(max_count as f64 * 1.1))?;

    if labelled {
        chart
            .configure_mesh()
            .x_desc(&options.x_label)
            .y_desc(&options.y_label)
            .draw()?;
    }

    chart.draw_series(bins.iter().map(|bin| {
        Rectangle::new(
            [(bin.lower, 0.0), (bin.upper, bin.count as f64)],
            BLUE.mix(0.6).filled(),
        )
    }))?;

    root.present()?;
    Ok(())
}
