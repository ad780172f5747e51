use crate::market_data::PricePoint;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use chrono::{Duration, NaiveDate};
use image::{ExtendedColorType, ImageEncoder, codecs::png::PngEncoder};
use plotters::prelude::*;
use plotters::series::DashedLineSeries;
use plotters::style::FontStyle;
use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

// 9 x 4 inches at 150 DPI
pub const CHART_DPI: u32 = 150;
pub const CHART_WIDTH: u32 = 9 * CHART_DPI;
pub const CHART_HEIGHT: u32 = 4 * CHART_DPI;

const FONT_FAMILY: &str = "sans-serif";

const FALLBACK_FONT_PATHS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

const BACKGROUND: RGBColor = RGBColor(0x0d, 0x11, 0x17);
const CLOSE_LINE: RGBColor = RGBColor(0x00, 0xbf, 0xff);
const TREND_LINE: RGBColor = RGBColor(0xff, 0xcc, 0x00);
const GRID: RGBColor = RGBColor(0x2f, 0x35, 0x3e);
const TITLE: RGBColor = RGBColor(0x58, 0xa6, 0xff);
const TICK_LABEL: RGBColor = RGBColor(0x9b, 0xa3, 0xb0);
const LEGEND_BACKGROUND: RGBColor = RGBColor(0x16, 0x1b, 0x22);
const LEGEND_TEXT: RGBColor = RGBColor(0xe6, 0xed, 0xf3);

#[derive(Debug, Error)]
pub enum ChartError {
    #[error("chart drawing failed: {0}")]
    Draw(String),
    #[error("PNG encoding failed: {0}")]
    Encode(#[from] image::ImageError),
    #[error("chart render task failed: {0}")]
    Task(String),
    #[error("chart needs at least 2 points, got {0}")]
    NotEnoughPoints(usize),
}

fn draw_err<E: Display>(error: E) -> ChartError {
    ChartError::Draw(error.to_string())
}

#[derive(Debug, Clone, Copy)]
pub struct ChartOptions {
    /// Draw title, tick labels and legend. Requires a registered font.
    pub labels: bool,
}

/// A rendered PNG chart held in memory.
#[derive(Debug, Clone)]
pub struct ChartImage {
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl ChartImage {
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.png)
    }
}

/// Registers the font used for chart text.
///
/// The configured path is tried first, then a few common system locations.
/// Returns false when no font could be loaded; charts are then drawn
/// without text.
pub fn register_chart_font(configured: Option<&Path>) -> bool {
    let candidates = configured
        .map(Path::to_path_buf)
        .into_iter()
        .chain(FALLBACK_FONT_PATHS.iter().map(PathBuf::from));

    if register_first_font(candidates) {
        return true;
    }
    warn!("No usable font found, charts will be rendered without labels");
    false
}

fn register_first_font(candidates: impl IntoIterator<Item = PathBuf>) -> bool {
    for path in candidates {
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "Font not readable");
                continue;
            }
        };
        // Registered fonts live for the rest of the process
        let bytes: &'static [u8] = Box::leak(bytes.into_boxed_slice());
        match plotters::style::register_font(FONT_FAMILY, FontStyle::Normal, bytes) {
            Ok(()) => {
                info!(path = %path.display(), "Registered chart font");
                return true;
            }
            Err(_) => warn!(path = %path.display(), "Invalid font file"),
        }
    }
    false
}

/// Renders closes, trend values and the filled area under the closes.
///
/// `trend` must hold one value per history row. If drawing with labels fails
/// (typically a missing font) the chart is redrawn without text.
pub fn render_price_chart(
    ticker: &str,
    history: &[PricePoint],
    trend: &[f64],
    options: ChartOptions,
) -> Result<ChartImage, ChartError> {
    if history.len() < 2 || trend.len() != history.len() {
        return Err(ChartError::NotEnoughPoints(history.len().min(trend.len())));
    }

    if options.labels {
        match draw_chart(ticker, history, trend, true) {
            Ok(image) => return Ok(image),
            Err(ChartError::Draw(message)) => {
                warn!(%message, "Labelled chart failed, retrying without text");
            }
            Err(e) => return Err(e),
        }
    }
    draw_chart(ticker, history, trend, false)
}

fn draw_chart(
    ticker: &str,
    history: &[PricePoint],
    trend: &[f64],
    labels: bool,
) -> Result<ChartImage, ChartError> {
    let (width, height) = (CHART_WIDTH, CHART_HEIGHT);
    let mut buffer = vec![0u8; (width * height * 3) as usize];

    let closes: Vec<(NaiveDate, f64)> = history.iter().map(|p| (p.date, p.close)).collect();
    let fitted: Vec<(NaiveDate, f64)> = history
        .iter()
        .zip(trend)
        .map(|(p, &value)| (p.date, value))
        .collect();

    let first = history[0].date;
    let last = history[history.len() - 1].date;
    let x_end = if last > first { last } else { first + Duration::days(1) };
    let (y_low, y_high) = value_range(closes.iter().map(|p| p.1).chain(trend.iter().copied()));

    // The drawing area borrows the buffer and is dropped at the end of this
    // block on every path, so the buffer can be encoded afterwards.
    {
        let root = BitMapBackend::with_buffer(&mut buffer, (width, height)).into_drawing_area();
        root.fill(&BACKGROUND).map_err(draw_err)?;

        let mut builder = ChartBuilder::on(&root);
        builder.margin(24);
        if labels {
            builder
                .caption(
                    format!("{} - 5 Year Price Trend", ticker),
                    (FONT_FAMILY, 30).into_font().color(&TITLE),
                )
                .x_label_area_size(44)
                .y_label_area_size(72);
        }
        let mut chart = builder
            .build_cartesian_2d(first..x_end, y_low..y_high)
            .map_err(draw_err)?;

        let date_label = |date: &NaiveDate| date.format("%Y-%m").to_string();
        let price_label = |value: &f64| format!("{:.0}", value);

        {
            let mut mesh = chart.configure_mesh();
            mesh.bold_line_style(GRID.stroke_width(1))
                .light_line_style(GRID.mix(0.25).stroke_width(1))
                .axis_style(GRID.stroke_width(1));
            if labels {
                mesh.x_labels(8)
                    .y_labels(6)
                    .label_style((FONT_FAMILY, 20).into_font().color(&TICK_LABEL))
                    .x_label_formatter(&date_label)
                    .y_label_formatter(&price_label);
            }
            mesh.draw().map_err(draw_err)?;
        }

        chart
            .draw_series(AreaSeries::new(closes.iter().copied(), 0.0, &CLOSE_LINE.mix(0.1)))
            .map_err(draw_err)?;

        chart
            .draw_series(LineSeries::new(closes.iter().copied(), CLOSE_LINE.stroke_width(4)))
            .map_err(draw_err)?
            .label("Close Price")
            .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 24, y)], CLOSE_LINE.stroke_width(4)));

        chart
            .draw_series(DashedLineSeries::new(
                fitted,
                12,
                6,
                TREND_LINE.stroke_width(3),
            ))
            .map_err(draw_err)?
            .label("Trend (LR)")
            .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 24, y)], TREND_LINE.stroke_width(3)));

        if labels {
            chart
                .configure_series_labels()
                .position(SeriesLabelPosition::UpperLeft)
                .background_style(&LEGEND_BACKGROUND)
                .border_style(&GRID)
                .label_font((FONT_FAMILY, 20).into_font().color(&LEGEND_TEXT))
                .draw()
                .map_err(draw_err)?;
        }

        root.present().map_err(draw_err)?;
    }

    let mut png = Vec::new();
    PngEncoder::new(&mut png).write_image(&buffer, width, height, ExtendedColorType::Rgb8)?;
    debug!(bytes = png.len(), labels, "Encoded chart");

    Ok(ChartImage { png, width, height })
}

// Y axis spans zero so the filled area reaches the baseline, with 5% headroom.
fn value_range(values: impl Iterator<Item = f64>) -> (f64, f64) {
    let (low, high) = values
        .filter(|v| v.is_finite())
        .fold((0.0_f64, f64::MIN), |(lo, hi), v| (lo.min(v), hi.max(v)));
    let high = if high > low { high } else { low + 1.0 };
    let pad = (high - low) * 0.05;
    let low = if low < 0.0 { low - pad } else { low };
    (low, high + pad)
}
