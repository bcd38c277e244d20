use comfy_table::{Attribute, Cell, CellAlignment, Table, modifiers, presets};

use crate::core::schedule::{Entry, Schedule};

/// Human-readable summary of the optimized schedule.
pub fn build_schedule_table(schedule: &Schedule) -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .apply_modifier(modifiers::UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("Id"),
            Cell::new("Kind"),
            Cell::new("From"),
            Cell::new("To"),
            Cell::new("Detail"),
        ]);
    for entry in schedule.iter() {
        match entry {
            Entry::Constant(action) => {
                table.add_row(vec![
                    Cell::new(&action.id).add_attribute(Attribute::Bold),
                    Cell::new("constant"),
                    Cell::new(action.start.format("%b %d %H:%M")),
                    Cell::new(action.end.format("%b %d %H:%M")),
                    Cell::new(action.consumption).set_alignment(CellAlignment::Right),
                ]);
            }
            Entry::Variable(action) => {
                table.add_row(vec![
                    Cell::new(&action.id).add_attribute(Attribute::Bold),
                    Cell::new("variable"),
                    Cell::new(action.window.start.format("%b %d %H:%M")),
                    Cell::new(action.window.end.format("%b %d %H:%M")),
                    Cell::new(action.total()).set_alignment(CellAlignment::Right),
                ]);
            }
            Entry::Battery(battery) => {
                table.add_row(vec![
                    Cell::new(&battery.id).add_attribute(Attribute::Bold),
                    Cell::new("battery"),
                    Cell::new(""),
                    Cell::new(""),
                    Cell::new(battery.final_level()).set_alignment(CellAlignment::Right),
                ]);
            }
        }
    }
    table
}
