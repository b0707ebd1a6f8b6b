use std::path::Path;

use plotters::prelude::*;

use crate::store::DailyMean;
use crate::types::{MONTH_NAMES, YearMonth};

#[derive(Debug, thiserror::Error)]
pub enum PlotError {
    #[error("No data to plot for {0}")]
    NoData(String),
    #[error("Failed to draw chart: {0}")]
    Drawing(String),
}

fn drawing<E: std::fmt::Display>(error: E) -> PlotError {
    PlotError::Drawing(error.to_string())
}

/// Padded `(low, high)` bounds of the values, so flat series still get an axis.
fn value_range(values: impl Iterator<Item = f64>) -> (f64, f64) {
    let (low, high) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    (low.floor() - 1.0, high.ceil() + 1.0)
}

fn month_label(month: u32) -> String {
    month
        .checked_sub(1)
        .and_then(|i| MONTH_NAMES.get(i as usize))
        .map(|name| name[..3].to_string())
        .unwrap_or_default()
}

/// Writes temperature charts as SVG files.
#[derive(Debug, Clone, Copy)]
pub struct ChartRenderer {
    size: (u32, u32),
}

impl Default for ChartRenderer {
    fn default() -> Self {
        Self { size: (1024, 640) }
    }
}

impl ChartRenderer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            size: (width, height),
        }
    }

    /// Daily mean temperatures across one month.
    pub fn line_plot(
        &self,
        period: YearMonth,
        points: &[DailyMean],
        path: &Path,
    ) -> Result<(), PlotError> {
        let series: Vec<(u32, f64)> = points
            .iter()
            .filter_map(|point| point.day().map(|day| (day, point.mean)))
            .collect();
        if series.is_empty() {
            return Err(PlotError::NoData(period.to_string()));
        }

        let (low, high) = value_range(series.iter().map(|&(_, mean)| mean));

        let root = SVGBackend::new(path, self.size).into_drawing_area();
        root.fill(&WHITE).map_err(drawing)?;

        let mut chart = ChartBuilder::on(&root)
            .caption(
                format!("Daily Average Temperatures for: {}", period),
                ("sans-serif", 24),
            )
            .margin(16)
            .x_label_area_size(40)
            .y_label_area_size(56)
            .build_cartesian_2d(1u32..31u32, low..high)
            .map_err(drawing)?;

        chart
            .configure_mesh()
            .x_desc("Day of Month")
            .y_desc("Average Temperature (Celsius)")
            .draw()
            .map_err(drawing)?;

        chart
            .draw_series(LineSeries::new(series.iter().copied(), &BLUE))
            .map_err(drawing)?;
        chart
            .draw_series(
                series
                    .iter()
                    .map(|&(day, mean)| Circle::new((day, mean), 3, BLUE.filled())),
            )
            .map_err(drawing)?;

        root.present().map_err(drawing)?;
        Ok(())
    }

    /// Distribution of daily means per calendar month over a range of years.
    pub fn box_plot(
        &self,
        start_year: i32,
        end_year: i32,
        buckets: &[Vec<f64>; 12],
        path: &Path,
    ) -> Result<(), PlotError> {
        if buckets.iter().all(Vec::is_empty) {
            return Err(PlotError::NoData(format!("{} to {}", start_year, end_year)));
        }

        let (low, high) = value_range(buckets.iter().flatten().copied());

        let root = SVGBackend::new(path, self.size).into_drawing_area();
        root.fill(&WHITE).map_err(drawing)?;

        let mut chart = ChartBuilder::on(&root)
            .caption(
                format!(
                    "Monthly Temperature Distribution for: {} to {}",
                    start_year, end_year
                ),
                ("sans-serif", 24),
            )
            .margin(16)
            .x_label_area_size(40)
            .y_label_area_size(56)
            .build_cartesian_2d((1u32..12u32).into_segmented(), low as f32..high as f32)
            .map_err(drawing)?;

        chart
            .configure_mesh()
            .x_desc("Month")
            .y_desc("Temperature (Celsius)")
            .x_label_formatter(&|value| match value {
                SegmentValue::CenterOf(month) | SegmentValue::Exact(month) => month_label(*month),
                SegmentValue::Last => String::new(),
            })
            .draw()
            .map_err(drawing)?;

        chart
            .draw_series(
                buckets
                    .iter()
                    .zip(1u32..)
                    .filter(|(values, _)| !values.is_empty())
                    .map(|(values, month)| {
                        let quartiles = Quartiles::new(values.as_slice());
                        Boxplot::new_vertical(SegmentValue::CenterOf(month), &quartiles)
                    }),
            )
            .map_err(drawing)?;

        root.present().map_err(drawing)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn mean(date: &str, mean: f64) -> DailyMean {
        DailyMean {
            date: date.to_string(),
            mean,
        }
    }

    #[test]
    fn test_line_plot_writes_svg() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("daily.svg");
        let points = vec![
            mean("2021-02-01", -6.7),
            mean("2021-02-02", -9.7),
            mean("2021-02-04", -18.7),
        ];

        ChartRenderer::default()
            .line_plot(YearMonth::new(2021, 2).unwrap(), &points, &path)
            .expect("Failed to draw line plot");

        let svg = fs::read_to_string(&path).expect("Failed to read chart");
        assert!(svg.contains("<svg"));
        assert!(svg.contains("Daily Average Temperatures for: February 2021"));
    }

    #[test]
    fn test_box_plot_writes_svg() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("monthly.svg");
        let mut buckets: [Vec<f64>; 12] = Default::default();
        buckets[0] = vec![-20.0, -15.5, -12.0, -18.25];
        buckets[6] = vec![19.0, 22.5, 24.0];

        ChartRenderer::new(800, 600)
            .box_plot(2019, 2020, &buckets, &path)
            .expect("Failed to draw box plot");

        let svg = fs::read_to_string(&path).expect("Failed to read chart");
        assert!(svg.contains("Monthly Temperature Distribution for: 2019 to 2020"));
    }

    #[test]
    fn test_empty_data_is_rejected() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("empty.svg");

        let err = ChartRenderer::default()
            .line_plot(YearMonth::new(2021, 2).unwrap(), &[], &path)
            .unwrap_err();
        assert!(matches!(err, PlotError::NoData(_)));

        let buckets: [Vec<f64>; 12] = Default::default();
        let err = ChartRenderer::default()
            .box_plot(2019, 2020, &buckets, &path)
            .unwrap_err();
        assert!(matches!(err, PlotError::NoData(_)));
        assert!(!path.exists());
    }

    #[test]
    fn test_month_label() {
        assert_eq!(month_label(1), "Jan");
        assert_eq!(month_label(12), "Dec");
        assert_eq!(month_label(0), "");
    }
}
