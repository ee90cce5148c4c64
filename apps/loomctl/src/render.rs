use std::fmt::Write as _;

use shared::domain::{LiftPlan, LoomInfo, SHAFT_COUNT};

/// Text grid of a liftplan: one line per row, `#` for a lifted shaft.
/// The executing row is marked with `>`.
pub fn plan_grid(plan: &LiftPlan, highlighted_row: Option<usize>) -> String {
    let mut out = String::from("      ");
    for shaft in 1..=SHAFT_COUNT {
        let _ = write!(out, "{shaft}");
    }
    out.push('\n');
    for (index, row) in plan.rows().iter().enumerate() {
        let marker = if highlighted_row == Some(index) { '>' } else { ' ' };
        let _ = writeln!(out, "{marker}{:>4} {row}", index + 1);
    }
    out
}

pub fn status_line(info: &LoomInfo) -> String {
    let mut out = format!("loom: {}", info.state);
    if let Some(name) = &info.active_liftplan {
        let _ = write!(out, ", liftplan: {}", name.display_name());
        let row = info.index.saturating_add(1);
        match info.liftplan_length {
            Some(len) => {
                let _ = write!(out, ", row {row}/{len}");
            }
            None => {
                let _ = write!(out, ", row {row}");
            }
        }
    }
    out
}
