//! Stdout and CSV table rendering
//!
//! Everything here is presentational: functions take the computed
//! results and return strings, so they stay trivially testable.

use crate::algorithm::matching::MatchOutcome;
use crate::algorithm::outcome::OutcomeReport;
use crate::cohort::Cohort;

/// Render the outcome comparison as a fixed-width stdout table.
#[must_use]
pub fn outcome_table(report: &OutcomeReport, treated_label: &str, control_label: &str) -> String {
    let mut output = String::new();

    output.push_str("Outcome Comparison (matched arms)\n");
    output.push_str("=================================\n");
    output.push_str(&format!(
        "Matched pairs: {}    Savings basis: {}\n",
        report.savings.pairs, report.savings.basis
    ));
    output.push_str(&format!(
        "Net savings per member: {:.2}    Total: {:.2}\n",
        report.savings.per_member, report.savings.total
    ));
    output.push('\n');

    output.push_str(&format!(
        "{:<24} {:>6} {:>14} {:>14} {:>14} {:>14} {:>12} {:>8}\n",
        "Outcome",
        "n/arm",
        format!("{treated_label} mean"),
        format!("{treated_label} med"),
        format!("{control_label} mean"),
        format!("{control_label} med"),
        "Diff",
        "SMD"
    ));
    output.push_str(&format!("{}\n", "-".repeat(114)));
    for test in &report.tests {
        output.push_str(&format!(
            "{:<24} {:>6} {:>14.2} {:>14.2} {:>14.2} {:>14.2} {:>12.2} {:>8.4}\n",
            truncate_string(&test.label, 24),
            test.treated.n,
            test.treated.mean,
            test.treated.median,
            test.control.mean,
            test.control.median,
            test.mean_difference,
            test.smd
        ));
    }

    output.push('\n');
    output.push_str("Tests (two-sided)\n");
    output.push_str(&format!(
        "{:<24} {:>10} {:>8} {:>8} {:>10} {:>8}\n",
        "Outcome", "Welch t", "df", "p", "U", "p"
    ));
    output.push_str(&format!("{}\n", "-".repeat(73)));
    for test in &report.tests {
        let (t, df, tp) = test.welch.map_or_else(
            || ("-".to_string(), "-".to_string(), "-".to_string()),
            |w| {
                (
                    format!("{:.3}", w.statistic),
                    format!("{:.1}", w.degrees_of_freedom),
                    format!("{:.4}", w.p_value),
                )
            },
        );
        let (u, up) = test.mann_whitney.map_or_else(
            || ("-".to_string(), "-".to_string()),
            |m| (format!("{:.1}", m.statistic), format!("{:.4}", m.p_value)),
        );
        output.push_str(&format!(
            "{:<24} {:>10} {:>8} {:>8} {:>10} {:>8}\n",
            truncate_string(&test.label, 24),
            t,
            df,
            tp,
            u,
            up
        ));
    }

    output
}

/// Render the outcome comparison as CSV, with the savings summary rows
/// appended after a blank line.
#[must_use]
pub fn outcome_csv(report: &OutcomeReport) -> String {
    let mut output = String::new();
    output.push_str(
        "outcome,n_treated,n_control,treated_mean,treated_std,treated_median,\
         control_mean,control_std,control_median,mean_difference,smd,\
         welch_t,welch_df,welch_p,u_statistic,u_p\n",
    );
    for test in &report.tests {
        let (t, df, tp) = test.welch.map_or_else(
            || (String::new(), String::new(), String::new()),
            |w| {
                (
                    format!("{:.6}", w.statistic),
                    format!("{:.4}", w.degrees_of_freedom),
                    format!("{:.6}", w.p_value),
                )
            },
        );
        let (u, up) = test.mann_whitney.map_or_else(
            || (String::new(), String::new()),
            |m| (format!("{:.1}", m.statistic), format!("{:.6}", m.p_value)),
        );
        output.push_str(&format!(
            "{},{},{},{:.4},{:.4},{:.4},{:.4},{:.4},{:.4},{:.4},{:.6},{t},{df},{tp},{u},{up}\n",
            escape_csv(&test.label),
            test.treated.n,
            test.control.n,
            test.treated.mean,
            test.treated.std_dev,
            test.treated.median,
            test.control.mean,
            test.control.std_dev,
            test.control.median,
            test.mean_difference,
            test.smd
        ));
    }

    output.push('\n');
    output.push_str("metric,value\n");
    output.push_str(&format!("matched_pairs,{}\n", report.savings.pairs));
    output.push_str(&format!(
        "savings_basis,{}\n",
        escape_csv(&report.savings.basis)
    ));
    output.push_str(&format!(
        "savings_per_member,{:.4}\n",
        report.savings.per_member
    ));
    output.push_str(&format!("savings_total,{:.4}\n", report.savings.total));

    output
}

/// Render the top-N claims per period column and arm among the matched
/// members. Returns `None` when no per-period columns exist.
#[must_use]
pub fn top_claims_tables(
    cohort: &Cohort,
    matching: &MatchOutcome,
    top_n: usize,
    treated_label: &str,
    control_label: &str,
) -> Option<String> {
    if cohort.period_outcomes.is_empty() {
        return None;
    }

    let arms = [
        (treated_label, matching.matched_treated()),
        (control_label, matching.matched_control()),
    ];

    let mut output = String::new();
    for (name, values) in &cohort.period_outcomes {
        for (label, rows) in &arms {
            output.push_str(&format!("Top {top_n} claims, {name}, {label} arm\n"));
            output.push_str(&format!(
                "{:<6} {:<20} {:>6} {:>8} {:>10} {:>14}\n",
                "Rank", "Member", "Age", "Gender", "Severity", "Amount"
            ));
            output.push_str(&format!("{}\n", "-".repeat(68)));

            let mut ordered = rows.clone();
            ordered.sort_by(|&a, &b| values[b].total_cmp(&values[a]).then(a.cmp(&b)));
            for (rank, &row) in ordered.iter().take(top_n).enumerate() {
                output.push_str(&format!(
                    "{:<6} {:<20} {:>6.0} {:>8} {:>10.0} {:>14.2}\n",
                    rank + 1,
                    truncate_string(&cohort.member_ids[row], 20),
                    cohort.age[row],
                    cohort.gender_label[row],
                    cohort.severity[row],
                    values[row]
                ));
            }
            output.push('\n');
        }
    }
    Some(output)
}

/// Maximum rows printed in the outlier listing.
const OUTLIER_ROW_CAP: usize = 20;

/// Render unmatched members whose aggregate outcome exceeds the
/// threshold. Returns `None` when no aggregate outcome exists.
#[must_use]
pub fn outlier_table(
    cohort: &Cohort,
    matching: &MatchOutcome,
    threshold: f64,
    treated_label: &str,
    control_label: &str,
) -> Option<String> {
    let (basis, values) = cohort.aggregate_outcome()?;

    let mut rows: Vec<usize> = (0..cohort.len())
        .filter(|&row| !matching.is_matched[row] && values[row] > threshold)
        .collect();
    rows.sort_by(|&a, &b| values[b].total_cmp(&values[a]).then(a.cmp(&b)));

    let mut output = String::new();
    output.push_str(&format!(
        "Unmatched members with {basis} above {threshold:.2}\n"
    ));
    output.push_str(&format!(
        "{:<20} {:<8} {:>6} {:>10} {:>14}\n",
        "Member", "Arm", "Age", "Severity", "Amount"
    ));
    output.push_str(&format!("{}\n", "-".repeat(62)));

    if rows.is_empty() {
        output.push_str("(none)\n");
        return Some(output);
    }

    for &row in rows.iter().take(OUTLIER_ROW_CAP) {
        let arm = if cohort.treated[row] {
            treated_label
        } else {
            control_label
        };
        output.push_str(&format!(
            "{:<20} {:<8} {:>6.0} {:>10.0} {:>14.2}\n",
            truncate_string(&cohort.member_ids[row], 20),
            arm,
            cohort.age[row],
            cohort.severity[row],
            values[row]
        ));
    }
    if rows.len() > OUTLIER_ROW_CAP {
        output.push_str(&format!(
            "... and {} more above the threshold\n",
            rows.len() - OUTLIER_ROW_CAP
        ));
    }
    Some(output)
}

fn truncate_string(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        s.to_string()
    } else {
        format!("{}...", &s[..max_len.saturating_sub(3)])
    }
}

fn escape_csv(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}
