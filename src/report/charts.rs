//! SVG chart rendering
//!
//! Charts are assembled as plain SVG strings with no plotting
//! dependency. Builders return the finished document; the reporter
//! decides where it is written.

use crate::algorithm::matching::BalanceReport;
use crate::algorithm::outcome::ArmSummary;

const CHART_WIDTH: f64 = 900.0;
const CHART_HEIGHT: f64 = 480.0;
const MARGIN_TOP: f64 = 56.0;
const MARGIN_BOTTOM: f64 = 48.0;
const MARGIN_RIGHT: f64 = 40.0;

const TREATED_COLOR: &str = "#d9534f";
const CONTROL_COLOR: &str = "#0275d8";
const BEFORE_COLOR: &str = "#7f8c8d";
const THRESHOLD_COLOR: &str = "#f39c12";
const GRID_COLOR: &str = "#dddddd";

/// Horizontal bar chart of per-covariate |SMD| before and after
/// matching, with the advisory threshold drawn as a dashed line.
#[must_use]
pub fn balance_chart(report: &BalanceReport) -> String {
    let metrics = report.sorted_metrics();
    let margin_left = 170.0;
    let bar_height = 12.0;
    let bar_gap = 4.0;
    let group_gap = 14.0;
    let group_height = bar_height * 2.0 + bar_gap + group_gap;
    let height = MARGIN_TOP + group_height * metrics.len() as f64 + MARGIN_BOTTOM;
    let plot_width = CHART_WIDTH - margin_left - MARGIN_RIGHT;

    let max_smd = metrics
        .iter()
        .flat_map(|m| [m.smd_before.abs(), m.smd_after.abs()])
        .fold(report.threshold, f64::max)
        * 1.1;
    let x_of = |v: f64| margin_left + v.abs() / max_smd * plot_width;

    let mut svg = document_open(CHART_WIDTH, height);
    svg.push_str(&title_text(
        "Covariate balance: |SMD| before and after matching",
    ));

    // Legend
    svg.push_str(&format!(
        "<rect x=\"{:.1}\" y=\"14\" width=\"12\" height=\"12\" fill=\"{BEFORE_COLOR}\"/>\
         <text x=\"{:.1}\" y=\"24\" font-family=\"monospace\" font-size=\"11\">before</text>",
        CHART_WIDTH - 220.0,
        CHART_WIDTH - 204.0,
    ));
    svg.push_str(&format!(
        "<rect x=\"{:.1}\" y=\"14\" width=\"12\" height=\"12\" fill=\"{CONTROL_COLOR}\"/>\
         <text x=\"{:.1}\" y=\"24\" font-family=\"monospace\" font-size=\"11\">after</text>",
        CHART_WIDTH - 130.0,
        CHART_WIDTH - 114.0,
    ));

    for (idx, metric) in metrics.iter().enumerate() {
        let y = MARGIN_TOP + group_height * idx as f64;
        svg.push_str(&format!(
            "<text x=\"{:.1}\" y=\"{:.1}\" font-family=\"monospace\" font-size=\"11\" text-anchor=\"end\">{}</text>",
            margin_left - 8.0,
            y + bar_height + 2.0,
            xml_escape(&metric.name)
        ));
        svg.push_str(&format!(
            "<rect x=\"{margin_left:.1}\" y=\"{y:.1}\" width=\"{:.1}\" height=\"{bar_height:.1}\" fill=\"{BEFORE_COLOR}\"/>",
            x_of(metric.smd_before) - margin_left
        ));
        svg.push_str(&format!(
            "<rect x=\"{margin_left:.1}\" y=\"{:.1}\" width=\"{:.1}\" height=\"{bar_height:.1}\" fill=\"{CONTROL_COLOR}\"/>",
            y + bar_height + bar_gap,
            x_of(metric.smd_after) - margin_left
        ));
    }

    // Advisory threshold
    let tx = x_of(report.threshold);
    svg.push_str(&format!(
        "<line x1=\"{tx:.1}\" y1=\"{MARGIN_TOP:.1}\" x2=\"{tx:.1}\" y2=\"{:.1}\" \
         stroke=\"{THRESHOLD_COLOR}\" stroke-dasharray=\"4 4\"/>",
        height - MARGIN_BOTTOM
    ));
    svg.push_str(&format!(
        "<text x=\"{:.1}\" y=\"{:.1}\" font-family=\"monospace\" font-size=\"11\" fill=\"{THRESHOLD_COLOR}\">{:.2}</text>",
        tx + 4.0,
        height - MARGIN_BOTTOM + 14.0,
        report.threshold
    ));

    svg.push_str("</svg>");
    svg
}

/// Side-by-side box plots of one outcome column, one box per arm.
#[must_use]
pub fn box_plot_chart(
    label: &str,
    treated: &ArmSummary,
    control: &ArmSummary,
    treated_label: &str,
    control_label: &str,
) -> String {
    let lo = treated.min.min(control.min);
    let hi = treated.max.max(control.max);
    let (lo, hi) = padded_range(lo, hi);
    let plot_height = CHART_HEIGHT - MARGIN_TOP - MARGIN_BOTTOM;
    let y_of = |v: f64| MARGIN_TOP + (hi - v) / (hi - lo) * plot_height;

    let mut svg = document_open(CHART_WIDTH, CHART_HEIGHT);
    svg.push_str(&title_text(&format!(
        "Distribution of {} (matched arms)",
        xml_escape(label)
    )));
    svg.push_str(&value_axis(lo, hi, &y_of));

    let boxes = [
        (300.0, treated, treated_label, TREATED_COLOR),
        (600.0, control, control_label, CONTROL_COLOR),
    ];
    let half_width = 60.0;
    for (center, summary, arm_label, color) in boxes {
        // Whisker spine and caps
        svg.push_str(&format!(
            "<line x1=\"{center:.1}\" y1=\"{:.1}\" x2=\"{center:.1}\" y2=\"{:.1}\" stroke=\"{color}\"/>",
            y_of(summary.min),
            y_of(summary.max)
        ));
        for value in [summary.min, summary.max] {
            svg.push_str(&format!(
                "<line x1=\"{:.1}\" y1=\"{:.1}\" x2=\"{:.1}\" y2=\"{:.1}\" stroke=\"{color}\"/>",
                center - half_width / 2.0,
                y_of(value),
                center + half_width / 2.0,
                y_of(value)
            ));
        }
        // Interquartile box and median
        svg.push_str(&format!(
            "<rect x=\"{:.1}\" y=\"{:.1}\" width=\"{:.1}\" height=\"{:.1}\" \
             fill=\"{color}\" fill-opacity=\"0.25\" stroke=\"{color}\"/>",
            center - half_width,
            y_of(summary.q3),
            half_width * 2.0,
            (y_of(summary.q1) - y_of(summary.q3)).max(1.0)
        ));
        svg.push_str(&format!(
            "<line x1=\"{:.1}\" y1=\"{:.1}\" x2=\"{:.1}\" y2=\"{:.1}\" stroke=\"{color}\" stroke-width=\"2\"/>",
            center - half_width,
            y_of(summary.median),
            center + half_width,
            y_of(summary.median)
        ));
        svg.push_str(&format!(
            "<text x=\"{center:.1}\" y=\"{:.1}\" font-family=\"monospace\" font-size=\"12\" text-anchor=\"middle\">{} (n={})</text>",
            CHART_HEIGHT - MARGIN_BOTTOM + 20.0,
            xml_escape(arm_label),
            summary.n
        ));
    }

    svg.push_str("</svg>");
    svg
}

/// Line chart of per-period arm means.
#[must_use]
pub fn trend_chart(
    periods: &[String],
    treated_means: &[f64],
    control_means: &[f64],
    treated_label: &str,
    control_label: &str,
) -> String {
    let margin_left = 90.0;
    let plot_width = CHART_WIDTH - margin_left - MARGIN_RIGHT;
    let plot_height = CHART_HEIGHT - MARGIN_TOP - MARGIN_BOTTOM;

    let lo = treated_means
        .iter()
        .chain(control_means)
        .copied()
        .fold(f64::INFINITY, f64::min);
    let hi = treated_means
        .iter()
        .chain(control_means)
        .copied()
        .fold(f64::NEG_INFINITY, f64::max);
    let (lo, hi) = padded_range(lo, hi);
    let y_of = |v: f64| MARGIN_TOP + (hi - v) / (hi - lo) * plot_height;
    let x_of = |idx: usize| {
        if periods.len() < 2 {
            margin_left + plot_width / 2.0
        } else {
            margin_left + idx as f64 / (periods.len() - 1) as f64 * plot_width
        }
    };

    let mut svg = document_open(CHART_WIDTH, CHART_HEIGHT);
    svg.push_str(&title_text("Mean claim per period (matched arms)"));
    svg.push_str(&value_axis(lo, hi, &y_of));

    for (idx, period) in periods.iter().enumerate() {
        svg.push_str(&format!(
            "<text x=\"{:.1}\" y=\"{:.1}\" font-family=\"monospace\" font-size=\"11\" text-anchor=\"middle\">{}</text>",
            x_of(idx),
            CHART_HEIGHT - MARGIN_BOTTOM + 20.0,
            xml_escape(period)
        ));
    }

    let series = [
        (treated_means, treated_label, TREATED_COLOR),
        (control_means, control_label, CONTROL_COLOR),
    ];
    for (means, arm_label, color) in series {
        let points: Vec<String> = means
            .iter()
            .enumerate()
            .map(|(idx, &v)| format!("{:.1},{:.1}", x_of(idx), y_of(v)))
            .collect();
        svg.push_str(&format!(
            "<polyline points=\"{}\" fill=\"none\" stroke=\"{color}\" stroke-width=\"2\"/>",
            points.join(" ")
        ));
        for (idx, &v) in means.iter().enumerate() {
            svg.push_str(&format!(
                "<circle cx=\"{:.1}\" cy=\"{:.1}\" r=\"4\" fill=\"{color}\"/>",
                x_of(idx),
                y_of(v)
            ));
        }
        if let Some(&last) = means.last() {
            svg.push_str(&format!(
                "<text x=\"{:.1}\" y=\"{:.1}\" font-family=\"monospace\" font-size=\"11\" fill=\"{color}\">{}</text>",
                x_of(means.len() - 1) - 40.0,
                y_of(last) - 10.0,
                xml_escape(arm_label)
            ));
        }
    }

    svg.push_str("</svg>");
    svg
}

/// Empirical CDF of one outcome column, one step line per arm.
#[must_use]
pub fn ecdf_chart(
    label: &str,
    treated: &[f64],
    control: &[f64],
    treated_label: &str,
    control_label: &str,
) -> String {
    let margin_left = 90.0;
    let plot_width = CHART_WIDTH - margin_left - MARGIN_RIGHT;
    let plot_height = CHART_HEIGHT - MARGIN_TOP - MARGIN_BOTTOM;

    let lo = treated
        .iter()
        .chain(control)
        .copied()
        .fold(f64::INFINITY, f64::min);
    let hi = treated
        .iter()
        .chain(control)
        .copied()
        .fold(f64::NEG_INFINITY, f64::max);
    let (lo, hi) = padded_range(lo, hi);
    let x_of = |v: f64| margin_left + (v - lo) / (hi - lo) * plot_width;
    let y_of = |fraction: f64| MARGIN_TOP + (1.0 - fraction) * plot_height;

    let mut svg = document_open(CHART_WIDTH, CHART_HEIGHT);
    svg.push_str(&title_text(&format!(
        "ECDF of {} (matched arms)",
        xml_escape(label)
    )));

    // Fraction gridlines
    for step in 0..=4 {
        let fraction = f64::from(step) / 4.0;
        let y = y_of(fraction);
        svg.push_str(&format!(
            "<line x1=\"{margin_left:.1}\" y1=\"{y:.1}\" x2=\"{:.1}\" y2=\"{y:.1}\" stroke=\"{GRID_COLOR}\"/>",
            CHART_WIDTH - MARGIN_RIGHT
        ));
        svg.push_str(&format!(
            "<text x=\"{:.1}\" y=\"{:.1}\" font-family=\"monospace\" font-size=\"11\" text-anchor=\"end\">{fraction:.2}</text>",
            margin_left - 8.0,
            y + 4.0
        ));
    }

    let series = [
        (treated, treated_label, TREATED_COLOR),
        (control, control_label, CONTROL_COLOR),
    ];
    for (values, arm_label, color) in series {
        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);
        let n = sorted.len() as f64;
        let mut points = Vec::with_capacity(sorted.len() * 2);
        for (idx, &v) in sorted.iter().enumerate() {
            points.push(format!("{:.1},{:.1}", x_of(v), y_of(idx as f64 / n)));
            points.push(format!(
                "{:.1},{:.1}",
                x_of(v),
                y_of((idx + 1) as f64 / n)
            ));
        }
        svg.push_str(&format!(
            "<polyline points=\"{}\" fill=\"none\" stroke=\"{color}\" stroke-width=\"2\"/>",
            points.join(" ")
        ));
        if let Some(&last) = sorted.last() {
            svg.push_str(&format!(
                "<text x=\"{:.1}\" y=\"{:.1}\" font-family=\"monospace\" font-size=\"11\" fill=\"{color}\">{}</text>",
                x_of(last) - 60.0,
                MARGIN_TOP + 16.0,
                xml_escape(arm_label)
            ));
        }
    }

    svg.push_str("</svg>");
    svg
}

/// Grouped bar chart of per-period arm means with the net savings
/// annotated above the plot.
#[must_use]
pub fn savings_chart(
    periods: &[String],
    treated_means: &[f64],
    control_means: &[f64],
    treated_label: &str,
    control_label: &str,
    annotation: &str,
) -> String {
    let margin_left = 90.0;
    let plot_width = CHART_WIDTH - margin_left - MARGIN_RIGHT;
    let plot_height = CHART_HEIGHT - MARGIN_TOP - MARGIN_BOTTOM;

    let hi = treated_means
        .iter()
        .chain(control_means)
        .copied()
        .fold(0.0_f64, f64::max)
        * 1.1;
    let hi = if hi <= 0.0 { 1.0 } else { hi };
    let y_of = |v: f64| MARGIN_TOP + (hi - v) / hi * plot_height;

    let mut svg = document_open(CHART_WIDTH, CHART_HEIGHT);
    svg.push_str(&title_text("Per-period arm means"));
    svg.push_str(&format!(
        "<text x=\"{margin_left:.1}\" y=\"44\" font-family=\"monospace\" font-size=\"12\">{}</text>",
        xml_escape(annotation)
    ));
    svg.push_str(&value_axis(0.0, hi, &y_of));

    let group_width = plot_width / periods.len() as f64;
    let bar_width = group_width * 0.3;
    for (idx, period) in periods.iter().enumerate() {
        let group_left = margin_left + group_width * idx as f64;
        let center = group_left + group_width / 2.0;

        let bars = [
            (center - bar_width - 2.0, treated_means[idx], TREATED_COLOR),
            (center + 2.0, control_means[idx], CONTROL_COLOR),
        ];
        for (x, value, color) in bars {
            let top = y_of(value);
            svg.push_str(&format!(
                "<rect x=\"{x:.1}\" y=\"{top:.1}\" width=\"{bar_width:.1}\" height=\"{:.1}\" fill=\"{color}\"/>",
                (CHART_HEIGHT - MARGIN_BOTTOM - top).max(0.0)
            ));
        }
        svg.push_str(&format!(
            "<text x=\"{center:.1}\" y=\"{:.1}\" font-family=\"monospace\" font-size=\"11\" text-anchor=\"middle\">{}</text>",
            CHART_HEIGHT - MARGIN_BOTTOM + 20.0,
            xml_escape(period)
        ));
    }

    // Legend
    svg.push_str(&format!(
        "<rect x=\"{:.1}\" y=\"14\" width=\"12\" height=\"12\" fill=\"{TREATED_COLOR}\"/>\
         <text x=\"{:.1}\" y=\"24\" font-family=\"monospace\" font-size=\"11\">{}</text>",
        CHART_WIDTH - 240.0,
        CHART_WIDTH - 224.0,
        xml_escape(treated_label)
    ));
    svg.push_str(&format!(
        "<rect x=\"{:.1}\" y=\"14\" width=\"12\" height=\"12\" fill=\"{CONTROL_COLOR}\"/>\
         <text x=\"{:.1}\" y=\"24\" font-family=\"monospace\" font-size=\"11\">{}</text>",
        CHART_WIDTH - 130.0,
        CHART_WIDTH - 114.0,
        xml_escape(control_label)
    ));

    svg.push_str("</svg>");
    svg
}

fn document_open(width: f64, height: f64) -> String {
    format!(
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{width:.0}\" height=\"{height:.0}\" \
         viewBox=\"0 0 {width:.0} {height:.0}\">\
         <rect x=\"0\" y=\"0\" width=\"{width:.0}\" height=\"{height:.0}\" fill=\"white\"/>"
    )
}

fn title_text(title: &str) -> String {
    format!("<text x=\"24\" y=\"24\" font-family=\"monospace\" font-size=\"14\">{title}</text>")
}

/// Horizontal gridlines and value labels for a vertical axis.
fn value_axis(lo: f64, hi: f64, y_of: &dyn Fn(f64) -> f64) -> String {
    let mut axis = String::new();
    for step in 0..=4 {
        let value = lo + (hi - lo) * f64::from(step) / 4.0;
        let y = y_of(value);
        axis.push_str(&format!(
            "<line x1=\"90.0\" y1=\"{y:.1}\" x2=\"{:.1}\" y2=\"{y:.1}\" stroke=\"{GRID_COLOR}\"/>",
            CHART_WIDTH - MARGIN_RIGHT
        ));
        axis.push_str(&format!(
            "<text x=\"82.0\" y=\"{:.1}\" font-family=\"monospace\" font-size=\"11\" text-anchor=\"end\">{}</text>",
            y + 4.0,
            format_tick(value)
        ));
    }
    axis
}

fn padded_range(lo: f64, hi: f64) -> (f64, f64) {
    if !lo.is_finite() || !hi.is_finite() {
        return (0.0, 1.0);
    }
    let span = hi - lo;
    if span <= 0.0 {
        (lo - 1.0, hi + 1.0)
    } else {
        (span.mul_add(-0.05, lo), span.mul_add(0.05, hi))
    }
}

fn format_tick(value: f64) -> String {
    if value.abs() >= 1000.0 {
        format!("{value:.0}")
    } else {
        format!("{value:.2}")
    }
}

fn xml_escape(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
