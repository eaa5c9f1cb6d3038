use std::path::Path;

use comfy_table::{Cell, Table};

use crate::adjustments::{AdjustmentStore, SqliteAdjustmentStore};
use crate::error::Result;
use crate::fmt::money;
use crate::models::Person;
use crate::settings::load_settings;

pub fn list(person_id: &str) -> Result<()> {
    let settings = load_settings()?;
    let store = SqliteAdjustmentStore::open(Path::new(&settings.database_path))?;
    let person = Person {
        id: person_id.to_string(),
        ..Person::default()
    };
    let adjustments = store.adjustments_for(&person)?;

    if adjustments.is_empty() {
        println!("No adjustments stored for {person_id}.");
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["Name", "Slug", "Amount"]);
    let mut total = 0.0;
    for adjustment in &adjustments {
        total += adjustment.amount;
        table.add_row(vec![
            Cell::new(&adjustment.display_name),
            Cell::new(&adjustment.slug),
            Cell::new(money(adjustment.amount)),
        ]);
    }
    table.add_row(vec![Cell::new("Total"), Cell::new(""), Cell::new(money(total))]);
    println!("Adjustments for {person_id}\n{table}");
    Ok(())
}
