//! Chart rendering for a filtered plant history.
//!
//! The chart is drawn with `plotters` into an in-memory RGB buffer and
//! encoded as PNG. The x axis is measured in fractional days from the start
//! of the requested range so month and day ticks can be placed exactly.

use std::io::Cursor;

use anyhow::{anyhow, Result};
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime};
use plotters::prelude::*;
use plotters::series::DashedLineSeries;
use plotters::style::text_anchor::{HPos, Pos, VPos};

use crate::models::{DateRange, FilteredSeries, PlantRecord};

// ---

/// Output size in pixels.
pub const CHART_SIZE: (u32, u32) = (1200, 600);

const Y_AXIS_MAX: f64 = 25.0;
const DAYS_LABEL_Y: f64 = 21.0;
const SECONDS_PER_DAY: f64 = 86_400.0;

const WETNESS_COLOR: RGBColor = RGBColor(31, 119, 180);
const WATERING_COLOR: RGBColor = RGBColor(0, 128, 0);
const LIGHT_GRID_COLOR: RGBColor = RGBColor(235, 235, 235);
const BOLD_GRID_COLOR: RGBColor = RGBColor(190, 190, 190);

/// Render the wetness and watering history of one plant as PNG bytes.
///
/// Empty series are not an error; they produce an empty chart.
pub fn render(
    plant: &PlantRecord,
    filtered: &FilteredSeries,
    range: &DateRange,
) -> Result<Vec<u8>> {
    // ---
    let (x_start, x_end) = x_extent(range);
    let span = x_of(x_start, x_end);
    let (width, height) = CHART_SIZE;

    let months = month_ticks(x_start, x_end);
    let day_xs: Vec<f64> = day_ticks(x_start, x_end)
        .into_iter()
        .map(|d| x_of(x_start, d.and_time(NaiveTime::MIN)))
        .collect();

    let mut pixels = vec![0u8; (width * height * 3) as usize];
    {
        let root = BitMapBackend::with_buffer(&mut pixels, CHART_SIZE).into_drawing_area();
        root.fill(&WHITE)?;

        let title = chart_title(&plant.name, &plant.location);
        let mut chart = ChartBuilder::on(&root)
            .caption(&title, ("sans-serif", 26))
            .margin(20)
            .x_label_area_size(60)
            .y_label_area_size(60)
            .build_cartesian_2d(0f64..span, 0f64..Y_AXIS_MAX)?;

        // Month and day gridlines are drawn below, so the mesh only carries y
        chart
            .configure_mesh()
            .disable_x_mesh()
            .x_label_formatter(&|_| String::new())
            .x_desc("Date")
            .y_desc("Wetness Level (0-20)")
            .y_label_style(("sans-serif", 14))
            .light_line_style(ShapeStyle::from(&LIGHT_GRID_COLOR).stroke_width(1))
            .bold_line_style(ShapeStyle::from(&BOLD_GRID_COLOR).stroke_width(1))
            .draw()?;

        chart.draw_series(day_xs.iter().map(|&x| {
            PathElement::new(
                vec![(x, 0.0), (x, Y_AXIS_MAX)],
                ShapeStyle::from(&LIGHT_GRID_COLOR).stroke_width(1),
            )
        }))?;

        let month_label_style = TextStyle::from(("sans-serif", 14).into_font())
            .pos(Pos::new(HPos::Center, VPos::Top));
        for month in &months {
            let x = x_of(x_start, month.and_time(NaiveTime::MIN));
            chart.draw_series(std::iter::once(PathElement::new(
                vec![(x, 0.0), (x, Y_AXIS_MAX)],
                ShapeStyle::from(&BOLD_GRID_COLOR).stroke_width(1),
            )))?;

            // Labels sit in the x label area, outside the clipped plotting area
            let (px, py) = chart.backend_coord(&(x, 0.0));
            root.draw(&Text::new(
                month_label(*month),
                (px, py + 8),
                month_label_style.clone(),
            ))?;
        }

        let points: Vec<(f64, f64)> = filtered
            .wetness
            .iter()
            .map(|(ts, level)| (x_of(x_start, *ts), *level as f64))
            .collect();

        chart
            .draw_series(LineSeries::new(
                points.iter().copied(),
                WETNESS_COLOR.stroke_width(2),
            ))?
            .label("Wetness Level")
            .legend(|(x, y)| {
                PathElement::new(vec![(x, y), (x + 20, y)], WETNESS_COLOR.stroke_width(2))
            });
        chart.draw_series(
            points
                .iter()
                .map(|&p| Circle::new(p, 4, WETNESS_COLOR.filled())),
        )?;

        let label_style = TextStyle::from(("sans-serif", 14).into_font())
            .pos(Pos::new(HPos::Right, VPos::Bottom));
        let gaps = days_since_previous(&filtered.water_history);

        for (ts, gap) in filtered.water_history.iter().zip(gaps) {
            let x = x_of(x_start, *ts);
            chart.draw_series(DashedLineSeries::new(
                vec![(x, 0.0), (x, Y_AXIS_MAX)],
                6,
                4,
                WATERING_COLOR.stroke_width(1),
            ))?;

            if let Some(days) = gap {
                chart.draw_series(std::iter::once(Text::new(
                    format!("{days} days"),
                    (x, DAYS_LABEL_Y),
                    label_style.clone(),
                )))?;
            }
        }

        chart
            .configure_series_labels()
            .background_style(&WHITE.mix(0.8))
            .border_style(&BLACK)
            .draw()?;

        root.present()?;
    }

    encode_png(pixels, width, height)
}

/// Days elapsed since the previous event, `None` for the first one.
///
/// Only the given events are considered; anything before the first element
/// is unknown to this function.
pub fn days_since_previous(events: &[NaiveDateTime]) -> Vec<Option<i64>> {
    // ---
    let mut gaps = Vec::with_capacity(events.len());
    if let Some(first) = events.first() {
        gaps.push(None);
        let mut previous = *first;
        for ts in &events[1..] {
            gaps.push(Some((*ts - previous).num_seconds().div_euclid(86_400)));
            previous = *ts;
        }
    }
    gaps
}

/// Title with plant name and location in title case.
pub fn chart_title(name: &str, location: &str) -> String {
    format!(
        "Water and Wetness History for {} ({})",
        title_case(name),
        title_case(location)
    )
}

/// Upper-case the first letter of every run of letters, lower-case the rest.
pub fn title_case(input: &str) -> String {
    // ---
    let mut out = String::with_capacity(input.len());
    let mut previous_is_letter = false;

    for c in input.chars() {
        if previous_is_letter {
            out.extend(c.to_lowercase());
        } else {
            out.extend(c.to_uppercase());
        }
        previous_is_letter = c.is_alphabetic();
    }
    out
}

/// First of every month within `[start, end]`.
pub fn month_ticks(start: NaiveDateTime, end: NaiveDateTime) -> Vec<NaiveDate> {
    // ---
    let mut ticks = Vec::new();
    let mut month = NaiveDate::from_ymd_opt(start.year(), start.month(), 1);

    while let Some(first) = month {
        if first.and_time(NaiveTime::MIN) > end {
            break;
        }
        if first.and_time(NaiveTime::MIN) >= start {
            ticks.push(first);
        }
        month = next_month(first);
    }
    ticks
}

/// Every midnight within `[start, end]`.
pub fn day_ticks(start: NaiveDateTime, end: NaiveDateTime) -> Vec<NaiveDate> {
    // ---
    let mut ticks = Vec::new();
    let mut day = Some(start.date());

    while let Some(d) = day {
        if d.and_time(NaiveTime::MIN) > end {
            break;
        }
        if d.and_time(NaiveTime::MIN) >= start {
            ticks.push(d);
        }
        day = d.succ_opt();
    }
    ticks
}

fn next_month(first: NaiveDate) -> Option<NaiveDate> {
    // ---
    if first.month() == 12 {
        NaiveDate::from_ymd_opt(first.year() + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(first.year(), first.month() + 1, 1)
    }
}

/// Plotted x extent: start-date midnight to the midnight after the end date.
/// Inverted ranges still get one day of axis.
fn x_extent(range: &DateRange) -> (NaiveDateTime, NaiveDateTime) {
    // ---
    let start = range.start.and_time(NaiveTime::MIN);
    let end = range
        .end
        .succ_opt()
        .unwrap_or(range.end)
        .and_time(NaiveTime::MIN);

    if end <= start {
        (start, start + Duration::days(1))
    } else {
        (start, end)
    }
}

fn x_of(origin: NaiveDateTime, ts: NaiveDateTime) -> f64 {
    (ts - origin).num_seconds() as f64 / SECONDS_PER_DAY
}

fn month_label(month: NaiveDate) -> String {
    month.format("%b %Y").to_string()
}

fn encode_png(pixels: Vec<u8>, width: u32, height: u32) -> Result<Vec<u8>> {
    // ---
    let image = image::RgbImage::from_raw(width, height, pixels)
        .ok_or_else(|| anyhow!("pixel buffer does not match {}x{}", width, height))?;

    let mut out = Cursor::new(Vec::new());
    image.write_to(&mut out, image::ImageOutputFormat::Png)?;
    Ok(out.into_inner())
}
