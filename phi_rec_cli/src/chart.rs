use std::ops::Range;
use std::panic;
use std::path::Path;

use anyhow::Result;
use phi_rec::IterationTable;
use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::style::{FontDesc, FontFamily, FontStyle};
use plotters_backend::{
    BackendColor, BackendCoord, BackendStyle, BackendTextStyle, DrawingBackend, DrawingErrorKind,
};
use tracing::warn;

const BAR_HALF_WIDTH: f64 = 0.4;
const LEGEND_ROW_HEIGHT: i32 = 26;
const LEGEND_SWATCH: i32 = 18;
const LEGEND_PAD: i32 = 10;

/// matplotlib's tab10 cycle followed by the light tab20 companions.
const GROUP_COLORS: [RGBColor; 20] = [
    RGBColor(31, 119, 180),
    RGBColor(255, 127, 14),
    RGBColor(44, 160, 44),
    RGBColor(214, 39, 40),
    RGBColor(148, 103, 189),
    RGBColor(140, 86, 75),
    RGBColor(227, 119, 194),
    RGBColor(127, 127, 127),
    RGBColor(188, 189, 34),
    RGBColor(23, 190, 207),
    RGBColor(174, 199, 232),
    RGBColor(255, 187, 120),
    RGBColor(152, 223, 138),
    RGBColor(255, 152, 150),
    RGBColor(197, 176, 213),
    RGBColor(196, 156, 148),
    RGBColor(247, 182, 210),
    RGBColor(199, 199, 199),
    RGBColor(219, 219, 141),
    RGBColor(158, 218, 229),
];

fn group_color(idx: usize) -> RGBColor {
    GROUP_COLORS[idx % GROUP_COLORS.len()]
}

/// Legend columns for a given number of groups.
pub fn legend_columns(group_count: usize) -> usize {
    match group_count {
        0..=9 => 1,
        10..=20 => 2,
        _ => 3,
    }
}

/// One stacked bar segment.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Segment {
    pub iteration: usize,
    pub bottom: f64,
    pub top: f64,
}

/// Cumulative stacking of the table, one layer per group in canonical order.
///
/// The top of the last layer is the NetPhi of each iteration.
pub fn stack_layers(table: &IterationTable) -> Vec<Vec<Segment>> {
    let mut running = vec![0.0; table.len()];
    (0..table.groups().len())
        .map(|group_idx| {
            table
                .rows()
                .iter()
                .zip(running.iter_mut())
                .map(|(row, height)| {
                    let bottom = *height;
                    *height += row.values[group_idx];
                    Segment {
                        iteration: row.iteration,
                        bottom,
                        top: *height,
                    }
                })
                .collect()
        })
        .collect()
}

fn y_range(layers: &[Vec<Segment>]) -> Range<f64> {
    let (lo, hi) = layers
        .iter()
        .flatten()
        .fold((0.0f64, 0.0f64), |(lo, hi), s| {
            (lo.min(s.bottom).min(s.top), hi.max(s.bottom).max(s.top))
        });
    if hi - lo <= f64::EPSILON {
        return lo..lo + 1.0;
    }
    lo..hi + (hi - lo) * 0.05
}

fn format_phi_tick(value: f64) -> String {
    let magnitude = value.abs();
    if value == 0.0 {
        "0".to_string()
    } else if !(1e-2..1e5).contains(&magnitude) {
        format!("{:.1e}", value)
    } else if magnitude >= 100.0 {
        format!("{:.0}", value)
    } else {
        format!("{:.2}", value)
    }
}

/// Render the stacked Phi chart for `case` to a PNG at `path`, replacing any existing file.
pub fn render_phi_chart(
    table: &IterationTable,
    case: &str,
    path: &Path,
    size: (u32, u32),
) -> Result<()> {
    let backend = BitMapBackend::new(path, size);
    let root = FontSafeBackend::new(backend).into_drawing_area();
    draw_phi_chart(root, table, case)
}

fn draw_phi_chart<DB>(
    root: DrawingArea<DB, Shift>,
    table: &IterationTable,
    case: &str,
) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    root.fill(&WHITE)?;

    let layers = stack_layers(table);
    let iterations = table.len();
    let title_font = FontDesc::new(FontFamily::SansSerif, 36.0, FontStyle::Normal);
    let axis_font = FontDesc::new(FontFamily::SansSerif, 18.0, FontStyle::Normal);

    let mut chart = ChartBuilder::on(&root)
        .caption(format!("PEST Case: {}", case), title_font)
        .margin(25)
        .set_label_area_size(LabelAreaPosition::Left, 90)
        .set_label_area_size(LabelAreaPosition::Bottom, 60)
        .build_cartesian_2d(
            (1.0 - BAR_HALF_WIDTH - 0.2)..(iterations as f64 + BAR_HALF_WIDTH + 0.2),
            y_range(&layers),
        )?;

    chart
        .configure_mesh()
        .light_line_style(&TRANSPARENT)
        .bold_line_style(&BLACK.mix(0.08))
        .x_labels(iterations.clamp(2, 25))
        .x_label_formatter(&|v| {
            if (v - v.round()).abs() < 1e-6 && *v >= 1.0 {
                format!("{:.0}", v)
            } else {
                String::new()
            }
        })
        .y_label_formatter(&|v| format_phi_tick(*v))
        .x_desc("Iteration No.")
        .y_desc("PEST Phi (End Value)")
        .axis_desc_style(axis_font.clone())
        .label_style(axis_font.color(&BLACK.mix(0.85)))
        .draw()?;

    for (idx, layer) in layers.iter().enumerate() {
        let fill = group_color(idx).filled();
        chart.draw_series(layer.iter().map(|s| {
            let x = s.iteration as f64;
            Rectangle::new(
                [(x - BAR_HALF_WIDTH, s.bottom), (x + BAR_HALF_WIDTH, s.top)],
                fill,
            )
        }))?;
        chart.draw_series(DashedLineSeries::new(
            layer.iter().map(|s| (s.iteration as f64, s.top)),
            8,
            6,
            ShapeStyle {
                color: BLACK.to_rgba(),
                filled: false,
                stroke_width: 2,
            },
        ))?;
    }

    let plot_pixels = chart.plotting_area().get_pixel_range();
    draw_legend(&root, plot_pixels, table.groups())?;

    root.present()?;
    Ok(())
}

/// Upper-right legend laid out column-major over `legend_columns` columns.
fn draw_legend<DB>(
    root: &DrawingArea<DB, Shift>,
    (plot_x, plot_y): (Range<i32>, Range<i32>),
    groups: &[String],
) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    if groups.is_empty() {
        return Ok(());
    }
    let font = FontDesc::new(FontFamily::SansSerif, 18.0, FontStyle::Normal).color(&BLACK);
    let columns = legend_columns(groups.len());
    let rows = groups.len().div_ceil(columns);

    let mut label_width = 0;
    for group in groups {
        let (w, _) = root.estimate_text_size(group, &font)?;
        label_width = label_width.max(w as i32);
    }
    let column_width = LEGEND_SWATCH + 8 + label_width + LEGEND_PAD;
    let width = columns as i32 * column_width + LEGEND_PAD;
    let height = rows as i32 * LEGEND_ROW_HEIGHT + LEGEND_PAD;
    let left = plot_x.end - LEGEND_PAD - width;
    let top = plot_y.start + LEGEND_PAD;

    root.draw(&Rectangle::new(
        [(left, top), (left + width, top + height)],
        WHITE.mix(0.8).filled(),
    ))?;
    root.draw(&Rectangle::new(
        [(left, top), (left + width, top + height)],
        BLACK.mix(0.3),
    ))?;

    for (idx, group) in groups.iter().enumerate() {
        let x = left + LEGEND_PAD + (idx / rows) as i32 * column_width;
        let y = top + LEGEND_PAD / 2 + (idx % rows) as i32 * LEGEND_ROW_HEIGHT;
        root.draw(&Rectangle::new(
            [(x, y + 3), (x + LEGEND_SWATCH, y + 3 + LEGEND_SWATCH)],
            group_color(idx).filled(),
        ))?;
        root.draw(&Text::new(
            group.as_str(),
            (x + LEGEND_SWATCH + 8, y + 3),
            font.clone(),
        ))?;
    }
    Ok(())
}

/// Backend adapter that keeps rendering when no usable font can be loaded.
///
/// Text measurement falls back to an estimate and text drawing is skipped, so the
/// bars and lines still come out on headless machines.
struct FontSafeBackend<DB> {
    inner: DB,
    warned: bool,
}

impl<DB> FontSafeBackend<DB> {
    fn new(inner: DB) -> Self {
        Self {
            inner,
            warned: false,
        }
    }

    fn note_font_failure(&mut self, reason: &str) {
        if !self.warned {
            warn!("Chart text skipped, font unavailable: {}", reason);
            self.warned = true;
        }
    }
}

fn approximate_text_size(text: &str, size: f64) -> (u32, u32) {
    let chars = text.chars().count() as f64;
    ((chars * size * 0.6).ceil() as u32, size.ceil() as u32)
}

impl<DB: DrawingBackend> DrawingBackend for FontSafeBackend<DB> {
    type ErrorType = DB::ErrorType;

    fn get_size(&self) -> (u32, u32) {
        self.inner.get_size()
    }

    fn ensure_prepared(&mut self) -> Result<(), DrawingErrorKind<Self::ErrorType>> {
        self.inner.ensure_prepared()
    }

    fn present(&mut self) -> Result<(), DrawingErrorKind<Self::ErrorType>> {
        self.inner.present()
    }

    fn draw_pixel(
        &mut self,
        point: BackendCoord,
        color: BackendColor,
    ) -> Result<(), DrawingErrorKind<Self::ErrorType>> {
        self.inner.draw_pixel(point, color)
    }

    fn draw_line<S: BackendStyle>(
        &mut self,
        from: BackendCoord,
        to: BackendCoord,
        style: &S,
    ) -> Result<(), DrawingErrorKind<Self::ErrorType>> {
        self.inner.draw_line(from, to, style)
    }

    fn draw_rect<S: BackendStyle>(
        &mut self,
        upper_left: BackendCoord,
        bottom_right: BackendCoord,
        style: &S,
        fill: bool,
    ) -> Result<(), DrawingErrorKind<Self::ErrorType>> {
        self.inner.draw_rect(upper_left, bottom_right, style, fill)
    }

    fn draw_path<S: BackendStyle, I: IntoIterator<Item = BackendCoord>>(
        &mut self,
        path: I,
        style: &S,
    ) -> Result<(), DrawingErrorKind<Self::ErrorType>> {
        self.inner.draw_path(path, style)
    }

    fn draw_circle<S: BackendStyle>(
        &mut self,
        center: BackendCoord,
        radius: u32,
        style: &S,
        fill: bool,
    ) -> Result<(), DrawingErrorKind<Self::ErrorType>> {
        self.inner.draw_circle(center, radius, style, fill)
    }

    fn fill_polygon<S: BackendStyle, I: IntoIterator<Item = BackendCoord>>(
        &mut self,
        vert: I,
        style: &S,
    ) -> Result<(), DrawingErrorKind<Self::ErrorType>> {
        self.inner.fill_polygon(vert, style)
    }

    fn blit_bitmap(
        &mut self,
        pos: BackendCoord,
        (iw, ih): (u32, u32),
        src: &[u8],
    ) -> Result<(), DrawingErrorKind<Self::ErrorType>> {
        self.inner.blit_bitmap(pos, (iw, ih), src)
    }

    fn draw_text<TStyle: BackendTextStyle>(
        &mut self,
        text: &str,
        style: &TStyle,
        pos: BackendCoord,
    ) -> Result<(), DrawingErrorKind<Self::ErrorType>> {
        let result = panic::catch_unwind(panic::AssertUnwindSafe(|| {
            self.inner.draw_text(text, style, pos)
        }));
        match result {
            Ok(Err(DrawingErrorKind::FontError(err))) => {
                self.note_font_failure(&err.to_string());
                Ok(())
            }
            Ok(other) => other,
            Err(_) => {
                self.note_font_failure("font backend panicked");
                Ok(())
            }
        }
    }

    fn estimate_text_size<TStyle: BackendTextStyle>(
        &self,
        text: &str,
        style: &TStyle,
    ) -> Result<(u32, u32), DrawingErrorKind<Self::ErrorType>> {
        let result = panic::catch_unwind(panic::AssertUnwindSafe(|| {
            self.inner.estimate_text_size(text, style)
        }));
        match result {
            Ok(Ok(size)) => Ok(size),
            _ => Ok(approximate_text_size(text, style.size())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use phi_rec::{reconstruct_report, Params};

    fn table_from(groups: &[&str], blocks: &[&[f64]]) -> IterationTable {
        let mut text = String::new();
        for block in blocks {
            for (group, value) in groups.iter().zip(block.iter()) {
                text.push_str(&format!(
                    "  Contribution to phi from observation group \"{}\" = {}\n",
                    group, value
                ));
            }
        }
        reconstruct_report(&text, &Params::default()).unwrap()
    }

    #[test]
    fn legend_column_steps() {
        assert_eq!(legend_columns(1), 1);
        assert_eq!(legend_columns(5), 1);
        assert_eq!(legend_columns(9), 1);
        assert_eq!(legend_columns(10), 2);
        assert_eq!(legend_columns(20), 2);
        assert_eq!(legend_columns(21), 3);
        assert_eq!(legend_columns(60), 3);
        let steps: Vec<usize> = (0..40).map(legend_columns).collect();
        assert!(steps.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn layers_stack_in_group_order() {
        let table = table_from(
            &["wells", "rivers"],
            &[&[10.0, 5.0], &[3.0, 2.0], &[1.0, 1.0]],
        );
        let layers = stack_layers(&table);
        assert_eq!(layers.len(), 2);
        assert_eq!(
            layers[0],
            vec![
                Segment { iteration: 1, bottom: 0.0, top: 3.0 },
                Segment { iteration: 2, bottom: 0.0, top: 1.0 },
            ]
        );
        assert_eq!(
            layers[1],
            vec![
                Segment { iteration: 1, bottom: 3.0, top: 5.0 },
                Segment { iteration: 2, bottom: 1.0, top: 2.0 },
            ]
        );
        let tops: Vec<f64> = layers[1].iter().map(|s| s.top).collect();
        assert_eq!(tops, table.net_phi_column());
    }

    #[test]
    fn y_range_covers_stack_with_headroom() {
        let table = table_from(&["a", "b"], &[&[1.0, 1.0], &[40.0, 60.0]]);
        let range = y_range(&stack_layers(&table));
        assert_eq!(range.start, 0.0);
        assert!(range.end > 100.0);

        let flat = table_from(&["a"], &[&[0.0], &[0.0]]);
        let range = y_range(&stack_layers(&flat));
        assert_eq!(range, 0.0..1.0);
    }

    #[test]
    fn tick_labels_switch_to_scientific() {
        assert_eq!(format_phi_tick(0.0), "0");
        assert_eq!(format_phi_tick(12.5), "12.50");
        assert_eq!(format_phi_tick(2500.0), "2500");
        assert_eq!(format_phi_tick(250000.0), "2.5e5");
        assert_eq!(format_phi_tick(0.001), "1.0e-3");
    }

    #[test]
    fn renders_into_buffer() {
        let groups: Vec<String> = (0..12).map(|g| format!("grp{g}")).collect();
        let names: Vec<&str> = groups.iter().map(String::as_str).collect();
        let blocks: Vec<Vec<f64>> = (0..5).map(|i| vec![10.0 / (i as f64 + 1.0); 12]).collect();
        let block_refs: Vec<&[f64]> = blocks.iter().map(Vec::as_slice).collect();
        let table = table_from(&names, &block_refs);

        let (w, h) = (640u32, 360u32);
        let mut buffer = vec![0u8; (w * h * 3) as usize];
        {
            let backend = BitMapBackend::with_buffer(&mut buffer, (w, h));
            let root = FontSafeBackend::new(backend).into_drawing_area();
            draw_phi_chart(root, &table, "unit").unwrap();
        }
        let first_bar_color = GROUP_COLORS[0];
        let has_bar_pixel = buffer
            .chunks_exact(3)
            .any(|px| px == [first_bar_color.0, first_bar_color.1, first_bar_color.2]);
        assert!(has_bar_pixel, "expected first group's bar color in the image");
    }

    #[test]
    fn approximate_text_size_scales_with_length() {
        assert_eq!(approximate_text_size("", 18.0), (0, 18));
        let (short, _) = approximate_text_size("ab", 18.0);
        let (long, _) = approximate_text_size("abcd", 18.0);
        assert!(long > short);
    }
}
