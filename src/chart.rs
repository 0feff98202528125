/*!
 * Practice escalation chart rendering
 *
 * Draws a practice cross-tab as a horizontal stacked bar chart: one bar per
 * practice, one segment per escalation category, counts centered on the
 * segments. The highest-volume practice is drawn at the top so the chart
 * reads in the same order as the table.
 */

use std::path::{Path, PathBuf};

use log::debug;
use plotters::coord::ranged1d::SegmentValue;
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};

use crate::analytics::CrossTab;
use crate::error::{MedAdhError, Result};

const CHART_WIDTH: u32 = 1400;
const ROW_HEIGHT: u32 = 28;
const MIN_HEIGHT: u32 = 600;

/// Viridis stops, dark to light
const PALETTE: [RGBColor; 5] = [
    RGBColor(68, 1, 84),
    RGBColor(59, 82, 139),
    RGBColor(33, 145, 140),
    RGBColor(94, 201, 98),
    RGBColor(253, 231, 37),
];

/// `<stem>_Practice_Chart.png` next to the workbook
pub fn chart_path(workbook: &Path) -> PathBuf {
    let stem = workbook.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "report".to_string());
    workbook.with_file_name(format!("{}_Practice_Chart.png", stem))
}

/// Spread the palette over `n` categories, keeping both ends
fn category_color(index: usize, n: usize) -> RGBColor {
    if n <= 1 {
        return PALETTE[0];
    }
    let last = PALETTE.len() - 1;
    PALETTE[(index * last / (n - 1)).min(last)]
}

/// Render the practice cross-tab to a PNG at `path`
///
/// The totals row and column are not drawn.
pub fn render_practice_chart(tab: &CrossTab, market: &str, path: &Path) -> Result<()> {
    if tab.is_empty() || tab.categories.is_empty() {
        return Err(MedAdhError::visualization(market, "practice table is empty"));
    }
    draw(tab, market, path).map_err(|e| MedAdhError::visualization(market, e.to_string()))?;
    debug!("Chart for {} written to {}", market, path.display());
    Ok(())
}

fn draw(tab: &CrossTab, market: &str, path: &Path) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let groups = tab.rows.len();
    let height = (groups as u32 * ROW_HEIGHT + 160).max(MIN_HEIGHT);
    let x_max = tab.rows.iter().map(|r| r.total).max().unwrap_or(0).max(1) as f64 * 1.05;

    let root = BitMapBackend::new(path, (CHART_WIDTH, height)).into_drawing_area();
    root.fill(&WHITE)?;

    let label_width = tab.rows.iter()
        .map(|r| r.group.chars().count() as u32)
        .max()
        .unwrap_or(10)
        .clamp(10, 45)
        * 7;

    let mut chart = ChartBuilder::on(&root)
        .caption(format!("{} Escalations by Practice", market), ("sans-serif", 26).into_font())
        .margin(15)
        .x_label_area_size(45)
        .y_label_area_size(label_width + 10)
        .build_cartesian_2d(0f64..x_max, (0..groups as i32).into_segmented())?;

    // segment 0 is the bottom of the chart
    let segment_of = |row: usize| (groups - 1 - row) as i32;
    let label_of = |seg: i32| -> String {
        let row = groups as i32 - 1 - seg;
        if row < 0 {
            return String::new();
        }
        tab.rows.get(row as usize).map(|r| r.group.clone()).unwrap_or_default()
    };

    chart
        .configure_mesh()
        .disable_y_mesh()
        .y_labels(groups)
        .y_label_formatter(&|value| match value {
            SegmentValue::CenterOf(seg) | SegmentValue::Exact(seg) => label_of(*seg),
            SegmentValue::Last => String::new(),
        })
        .x_desc("# of Escalations")
        .label_style(("sans-serif", 13))
        .draw()?;

    let value_style = ("sans-serif", 12)
        .into_font()
        .color(&WHITE)
        .pos(Pos::new(HPos::Center, VPos::Center));

    let mut offsets = vec![0usize; groups];
    for (col, category) in tab.categories.iter().enumerate() {
        let color = category_color(col, tab.categories.len());

        let bars: Vec<Rectangle<(f64, SegmentValue<i32>)>> = tab.rows.iter()
            .enumerate()
            .filter(|(_, row)| row.counts[col] > 0)
            .map(|(i, row)| {
                let seg = segment_of(i);
                let start = offsets[i] as f64;
                let end = (offsets[i] + row.counts[col]) as f64;
                let mut bar = Rectangle::new(
                    [(start, SegmentValue::Exact(seg)), (end, SegmentValue::Exact(seg + 1))],
                    color.filled(),
                );
                bar.set_margin(4, 4, 0, 0);
                bar
            })
            .collect();

        chart
            .draw_series(bars)?
            .label(category.as_str())
            .legend(move |(x, y)| Rectangle::new([(x, y - 6), (x + 14, y + 6)], color.filled()));

        let labels: Vec<_> = tab.rows.iter()
            .enumerate()
            .filter(|(_, row)| row.counts[col] > 0)
            .map(|(i, row)| {
                let center = offsets[i] as f64 + row.counts[col] as f64 / 2.0;
                Text::new(
                    row.counts[col].to_string(),
                    (center, SegmentValue::CenterOf(segment_of(i))),
                    value_style.clone(),
                )
            })
            .collect();
        chart.draw_series(labels)?;

        for (i, row) in tab.rows.iter().enumerate() {
            offsets[i] += row.counts[col];
        }
    }

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::LowerRight)
        .background_style(WHITE.mix(0.85))
        .border_style(BLACK)
        .label_font(("sans-serif", 14))
        .draw()?;

    root.present()?;
    Ok(())
}
