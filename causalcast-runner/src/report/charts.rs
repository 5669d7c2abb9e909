//! SVG charts.
//!
//! Every chart is a standalone function writing one file, so a failure in one
//! never prevents the others. Time axes are plotted as day offsets from the
//! first date shown and labelled back as dates.

use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::{Duration, NaiveDate};
use plotters::coord::Shift;
use plotters::prelude::*;

use causalcast_core::causality::{CausalityMatrix, PairOutcome};
use causalcast_core::forecast::Forecast;
use causalcast_core::series::{PriceTable, ReturnSeries};
use causalcast_core::stats::{correlation, mean, std_dev};

const WIDE: (u32, u32) = (1200, 700);
const SQUARE: (u32, u32) = (800, 760);
const FONT: &str = "sans-serif";

const HISTORY_COLOR: RGBColor = RGBColor(60, 60, 60);
const ARIMA_COLOR: RGBColor = RGBColor(31, 119, 180);
const VAR_COLOR: RGBColor = RGBColor(214, 39, 40);
const MISSING_COLOR: RGBColor = RGBColor(210, 210, 210);

fn day_offset(base: NaiveDate, date: NaiveDate) -> f64 {
    (date - base).num_days() as f64
}

fn day_label(base: NaiveDate, x: f64) -> String {
    (base + Duration::days(x.round() as i64))
        .format("%Y-%m-%d")
        .to_string()
}

/// `(min, max)` of finite values, widened by 5% on each side.
fn padded_bounds(values: impl Iterator<Item = f64>) -> Option<(f64, f64)> {
    let (lo, hi) = values
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
    if !lo.is_finite() {
        return None;
    }
    let pad = ((hi - lo) * 0.05).max(hi.abs() * 1e-3).max(1e-9);
    Some((lo - pad, hi + pad))
}

/// Grid dimensions for `n` panels, at most two columns.
fn grid(n: usize) -> (usize, usize) {
    if n <= 1 {
        (1, 1)
    } else {
        (n.div_ceil(2), 2)
    }
}

// ─── 01: normalized prices ──────────────────────────────────────────

/// Every asset rebased to 100 at the first date.
pub fn normalized_prices(table: &PriceTable, path: &Path) -> Result<()> {
    let Some(&base) = table.dates().first() else {
        bail!("price table is empty");
    };
    let series: Vec<(&str, Vec<(f64, f64)>)> = table
        .assets()
        .iter()
        .filter_map(|asset| {
            let col = table.column(asset)?;
            let first = *col.first()?;
            let pts = table
                .dates()
                .iter()
                .zip(col)
                .map(|(d, p)| (day_offset(base, *d), 100.0 * p / first))
                .collect();
            Some((asset.as_str(), pts))
        })
        .collect();
    let (y_lo, y_hi) = padded_bounds(series.iter().flat_map(|(_, s)| s.iter().map(|p| p.1)))
        .context("no finite prices to plot")?;
    let x_hi = day_offset(base, table.last_date().unwrap_or(base)).max(1.0);

    let root = SVGBackend::new(path, WIDE).into_drawing_area();
    root.fill(&WHITE)?;
    let mut chart = ChartBuilder::on(&root)
        .caption("Normalized prices (base = 100)", (FONT, 28))
        .margin(15)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(0f64..x_hi, y_lo..y_hi)?;
    chart
        .configure_mesh()
        .x_labels(8)
        .x_label_formatter(&|x| day_label(base, *x))
        .y_desc("Index")
        .draw()?;

    for (i, (label, pts)) in series.iter().enumerate() {
        let color = Palette99::pick(i).to_rgba();
        chart
            .draw_series(LineSeries::new(pts.iter().copied(), color.stroke_width(2)))?
            .label(*label)
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(2)));
    }
    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperLeft)
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()?;
    root.present()?;
    Ok(())
}

// ─── 02/03: heatmaps ────────────────────────────────────────────────

struct Heatmap<'a> {
    title: &'a str,
    labels: &'a [String],
    x_desc: &'a str,
    y_desc: &'a str,
}

/// Square heatmap; row `i` is drawn top to bottom, column `j` left to right.
fn draw_heatmap(
    path: &Path,
    spec: &Heatmap<'_>,
    cell: impl Fn(usize, usize) -> Option<(RGBColor, String)>,
) -> Result<()> {
    let k = spec.labels.len();
    if k == 0 {
        bail!("no assets to plot");
    }
    let span = -0.5f64..(k as f64 - 0.5);
    let label_at = |v: f64, flip: bool| {
        let r = v.round();
        if (v - r).abs() > 1e-6 || r < 0.0 || r as usize >= k {
            return String::new();
        }
        let idx = if flip { k - 1 - r as usize } else { r as usize };
        spec.labels[idx].clone()
    };

    let root = SVGBackend::new(path, SQUARE).into_drawing_area();
    root.fill(&WHITE)?;
    let mut chart = ChartBuilder::on(&root)
        .caption(spec.title, (FONT, 26))
        .margin(20)
        .x_label_area_size(50)
        .y_label_area_size(90)
        .build_cartesian_2d(span.clone(), span)?;
    chart
        .configure_mesh()
        .disable_x_mesh()
        .disable_y_mesh()
        .x_labels(k)
        .y_labels(k)
        .x_label_formatter(&|v| label_at(*v, false))
        .y_label_formatter(&|v| label_at(*v, true))
        .x_desc(spec.x_desc)
        .y_desc(spec.y_desc)
        .draw()?;

    let cells: Vec<(f64, f64, RGBColor, String)> = (0..k)
        .flat_map(|i| (0..k).map(move |j| (i, j)))
        .map(|(i, j)| {
            let (x, y) = (j as f64, (k - 1 - i) as f64);
            let (fill, text) = cell(i, j).unwrap_or((MISSING_COLOR, String::new()));
            (x, y, fill, text)
        })
        .collect();
    chart.draw_series(cells.iter().map(|(x, y, fill, _)| {
        Rectangle::new([(x - 0.5, y - 0.5), (x + 0.5, y + 0.5)], fill.filled())
    }))?;
    chart.draw_series(cells.iter().filter(|c| !c.3.is_empty()).map(|(x, y, _, text)| {
        Text::new(text.clone(), (x - 0.3, *y + 0.1), (FONT, 16).into_font())
    }))?;
    root.present()?;
    Ok(())
}

/// Linear blend from white to `to` by `t ∈ [0, 1]`.
fn blend(to: RGBColor, t: f64) -> RGBColor {
    let t = t.clamp(0.0, 1.0);
    let mix = |c: u8| (255.0 + (c as f64 - 255.0) * t).round() as u8;
    RGBColor(mix(to.0), mix(to.1), mix(to.2))
}

/// Pearson correlation of log-returns.
pub fn correlation_heatmap(returns: &[ReturnSeries], path: &Path) -> Result<()> {
    let labels: Vec<String> = returns.iter().map(|r| r.asset().to_string()).collect();
    draw_heatmap(
        path,
        &Heatmap {
            title: "Correlation of daily log-returns",
            labels: &labels,
            x_desc: "",
            y_desc: "",
        },
        |i, j| {
            let rho = correlation(returns[i].values(), returns[j].values());
            if !rho.is_finite() {
                return None;
            }
            let fill = if rho >= 0.0 {
                blend(VAR_COLOR, rho)
            } else {
                blend(ARIMA_COLOR, -rho)
            };
            Some((fill, format!("{rho:.2}")))
        },
    )
}

/// Minimum Granger p-value per (cause row, effect column).
pub fn granger_heatmap(matrix: &CausalityMatrix, path: &Path) -> Result<()> {
    let title = format!(
        "Granger causality: min p-value over lags 1..{} (* p < {})",
        matrix.max_lag, matrix.alpha
    );
    draw_heatmap(
        path,
        &Heatmap {
            title: &title,
            labels: &matrix.assets,
            x_desc: "Effect",
            y_desc: "Cause",
        },
        |i, j| {
            if i == j {
                return None;
            }
            let entry = matrix.entry(&matrix.assets[i], &matrix.assets[j])?;
            match &entry.outcome {
                PairOutcome::Tested { min_p_value, .. } => {
                    // Shade by -log10(p), saturating at p = 1e-4
                    let strength = (-min_p_value.max(1e-300).log10() / 4.0).clamp(0.0, 1.0);
                    let star = if *min_p_value < matrix.alpha { "*" } else { "" };
                    Some((blend(VAR_COLOR, strength), format!("{min_p_value:.3}{star}")))
                }
                PairOutcome::Untestable { .. } => Some((MISSING_COLOR, "n/a".to_string())),
            }
        },
    )
}

// ─── 04/05/06: forecasts ────────────────────────────────────────────

/// One forecast drawn in a panel.
pub struct ForecastLayer<'a> {
    pub forecast: &'a Forecast,
    pub color: RGBColor,
    pub label: String,
}

impl<'a> ForecastLayer<'a> {
    pub fn arima(forecast: &'a Forecast) -> Self {
        Self {
            forecast,
            color: ARIMA_COLOR,
            label: forecast.spec.clone(),
        }
    }

    pub fn var(forecast: &'a Forecast) -> Self {
        Self {
            forecast,
            color: VAR_COLOR,
            label: forecast.spec.clone(),
        }
    }
}

/// A price panel: recent history plus any number of forecasts with bands.
pub struct ForecastPanel<'a> {
    pub asset: &'a str,
    pub history: Vec<(NaiveDate, f64)>,
    pub layers: Vec<ForecastLayer<'a>>,
}

/// Last `history_days` observations of `asset`.
pub fn recent_history(table: &PriceTable, asset: &str, history_days: usize) -> Vec<(NaiveDate, f64)> {
    let Some(col) = table.column(asset) else {
        return Vec::new();
    };
    let skip = table.len().saturating_sub(history_days);
    table
        .dates()
        .iter()
        .copied()
        .zip(col.iter().copied())
        .skip(skip)
        .collect()
}

fn draw_panel(area: &DrawingArea<SVGBackend<'_>, Shift>, panel: &ForecastPanel<'_>) -> Result<()> {
    let base = panel
        .history
        .first()
        .map(|(d, _)| *d)
        .or_else(|| panel.layers.first().map(|l| l.forecast.origin))
        .context("panel has neither history nor forecasts")?;
    let last_date = panel
        .layers
        .iter()
        .filter_map(|l| l.forecast.points.last().map(|p| p.date))
        .chain(panel.history.last().map(|(d, _)| *d))
        .max()
        .unwrap_or(base);
    let x_hi = day_offset(base, last_date).max(1.0);
    let values = panel.history.iter().map(|(_, p)| *p).chain(
        panel
            .layers
            .iter()
            .flat_map(|l| l.forecast.points.iter().flat_map(|p| [p.lower, p.upper])),
    );
    let (y_lo, y_hi) = padded_bounds(values).context("no finite values to plot")?;

    let mut chart = ChartBuilder::on(area)
        .caption(panel.asset, (FONT, 22))
        .margin(10)
        .x_label_area_size(35)
        .y_label_area_size(70)
        .build_cartesian_2d(0f64..x_hi, y_lo..y_hi)?;
    chart
        .configure_mesh()
        .x_labels(6)
        .x_label_formatter(&|x| day_label(base, *x))
        .y_label_formatter(&|y| format!("{y:.2}"))
        .draw()?;

    if !panel.history.is_empty() {
        chart
            .draw_series(LineSeries::new(
                panel.history.iter().map(|(d, p)| (day_offset(base, *d), *p)),
                HISTORY_COLOR.stroke_width(2),
            ))?
            .label("history")
            .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], HISTORY_COLOR.stroke_width(2)));
    }

    for layer in &panel.layers {
        let fc = layer.forecast;
        let origin = (day_offset(base, fc.origin), fc.last_price);
        let upper = fc.points.iter().map(|p| (day_offset(base, p.date), p.upper));
        let lower = fc.points.iter().rev().map(|p| (day_offset(base, p.date), p.lower));
        let band: Vec<(f64, f64)> = std::iter::once(origin).chain(upper).chain(lower).collect();
        chart.draw_series(std::iter::once(Polygon::new(band, layer.color.mix(0.18).filled())))?;

        let color = layer.color;
        let label = format!("{} ({:.0}% interval)", layer.label, fc.confidence * 100.0);
        chart
            .draw_series(LineSeries::new(
                std::iter::once(origin)
                    .chain(fc.points.iter().map(|p| (day_offset(base, p.date), p.point))),
                color.stroke_width(2),
            ))?
            .label(label)
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(2)));
    }

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperLeft)
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()?;
    Ok(())
}

/// One panel per entry, laid out on a grid under a common title.
pub fn forecast_chart(title: &str, panels: &[ForecastPanel<'_>], path: &Path) -> Result<()> {
    if panels.is_empty() {
        bail!("no forecasts to plot");
    }
    let (rows, cols) = grid(panels.len());
    let size = (WIDE.0, (WIDE.1 / 2).max(320) * rows as u32 + 60);
    let root = SVGBackend::new(path, size).into_drawing_area();
    root.fill(&WHITE)?;
    let root = root.titled(title, (FONT, 28))?;
    for (area, panel) in root.split_evenly((rows, cols)).iter().zip(panels) {
        draw_panel(area, panel).with_context(|| format!("panel for {}", panel.asset))?;
    }
    root.present()?;
    Ok(())
}

// ─── 07: return distribution ────────────────────────────────────────

const HISTOGRAM_BINS: usize = 50;

/// Histogram of one asset's log-returns with the mean and ±1 standard
/// deviation marked.
pub fn return_distribution(returns: &ReturnSeries, path: &Path) -> Result<()> {
    let values = returns.values();
    if values.len() < 2 {
        bail!("{} has too few returns for a histogram", returns.asset());
    }
    let mu = mean(values);
    let sd = std_dev(values);
    let (lo, hi) = padded_bounds(values.iter().copied()).context("no finite returns")?;
    let width = (hi - lo) / HISTOGRAM_BINS as f64;
    let mut counts = vec![0usize; HISTOGRAM_BINS];
    for v in values.iter().filter(|v| v.is_finite()) {
        let bin = (((v - lo) / width) as usize).min(HISTOGRAM_BINS - 1);
        counts[bin] += 1;
    }
    let y_hi = counts.iter().copied().max().unwrap_or(1) as f64 * 1.1;

    let root = SVGBackend::new(path, WIDE).into_drawing_area();
    root.fill(&WHITE)?;
    let title = format!(
        "{} daily log-returns (n = {}, mean = {mu:.5}, sd = {sd:.5})",
        returns.asset(),
        values.len()
    );
    let mut chart = ChartBuilder::on(&root)
        .caption(title, (FONT, 24))
        .margin(15)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(lo..hi, 0f64..y_hi)?;
    chart
        .configure_mesh()
        .x_labels(10)
        .x_label_formatter(&|x| format!("{x:.3}"))
        .x_desc("Log-return")
        .y_desc("Count")
        .draw()?;

    chart.draw_series(counts.iter().enumerate().map(|(i, c)| {
        let x0 = lo + i as f64 * width;
        Rectangle::new([(x0, 0.0), (x0 + width, *c as f64)], ARIMA_COLOR.mix(0.6).filled())
    }))?;

    let marks = [
        (mu, VAR_COLOR, "mean".to_string()),
        (mu - sd, HISTORY_COLOR, "mean ± 1 sd".to_string()),
        (mu + sd, HISTORY_COLOR, String::new()),
    ];
    for (x, color, label) in marks {
        let series = chart.draw_series(LineSeries::new(
            [(x, 0.0), (x, y_hi)],
            color.stroke_width(2),
        ))?;
        if !label.is_empty() {
            series
                .label(label)
                .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(2)));
        }
    }
    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()?;
    root.present()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn padded_bounds_widen_the_range() {
        let (lo, hi) = padded_bounds([1.0, 3.0, f64::NAN].into_iter()).unwrap();
        assert!(lo < 1.0 && hi > 3.0);
        assert!(padded_bounds(std::iter::empty()).is_none());
        let (lo, hi) = padded_bounds([5.0].into_iter()).unwrap();
        assert!(lo < 5.0 && hi > 5.0);
    }

    #[test]
    fn grid_has_room_for_every_panel() {
        assert_eq!(grid(1), (1, 1));
        assert_eq!(grid(2), (1, 2));
        assert_eq!(grid(5), (3, 2));
    }

    #[test]
    fn blend_endpoints() {
        assert_eq!(blend(VAR_COLOR, 0.0), RGBColor(255, 255, 255));
        assert_eq!(blend(VAR_COLOR, 1.0), VAR_COLOR);
        assert_eq!(blend(VAR_COLOR, 7.0), VAR_COLOR);
    }

    #[test]
    fn day_labels_round_trip() {
        let base = NaiveDate::from_ymd_opt(2024, 2, 27).unwrap();
        let d = NaiveDate::from_ymd_opt(2024, 3, 2).unwrap();
        assert_eq!(day_label(base, day_offset(base, d)), "2024-03-02");
    }
}
