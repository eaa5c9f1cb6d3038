use std::path::Path;
use std::sync::Mutex;

use rusqlite::Connection;
use tracing::{debug, info, warn};

use crate::db::{get_connection, init_db};
use crate::error::{Result, SyncError};
use crate::models::{Adjustment, Person};

/// Persistence for per-donor side-program credits. The store is the source of
/// truth; the report only proposes updates.
pub trait AdjustmentStore {
    fn adjustments_for(&self, person: &Person) -> Result<Vec<Adjustment>>;

    /// Replace the person's whole adjustment set.
    fn save_adjustments(&self, person: &Person, adjustments: &[Adjustment]) -> Result<()>;
}

pub struct SqliteAdjustmentStore {
    conn: Mutex<Connection>,
}

impl SqliteAdjustmentStore {
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = get_connection(db_path)?;
        init_db(&conn)?;
        Ok(Self::from_connection(conn))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self { conn: Mutex::new(conn) }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| SyncError::Other("adjustment store lock poisoned".to_string()))
    }
}

impl AdjustmentStore for SqliteAdjustmentStore {
    fn adjustments_for(&self, person: &Person) -> Result<Vec<Adjustment>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT display_name, slug, amount FROM donor_adjustments WHERE person_id = ?1 ORDER BY id",
        )?;
        let rows = stmt
            .query_map([&person.id], |row| {
                Ok(Adjustment {
                    display_name: row.get(0)?,
                    slug: row.get(1)?,
                    amount: row.get(2)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn save_adjustments(&self, person: &Person, adjustments: &[Adjustment]) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM donor_adjustments WHERE person_id = ?1", [&person.id])?;
        for adjustment in adjustments {
            tx.execute(
                "INSERT INTO donor_adjustments (person_id, slug, display_name, amount) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![person.id, adjustment.slug, adjustment.display_name, adjustment.amount],
            )?;
        }
        tx.commit()?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum AdjustmentOutcome {
    Unchanged,
    Updated,
    /// Set when a write was due but the run is a dry run.
    WouldUpdate,
    Failed(SyncError),
}

/// Bring the stored adjustments for `person` in line with the report.
///
/// Only the number of adjustments is compared: a report with the same count
/// but different amounts leaves the store untouched.
pub fn reconcile_adjustments(
    store: &dyn AdjustmentStore,
    person: &Person,
    reported: &[Adjustment],
    dry_run: bool,
) -> AdjustmentOutcome {
    let stored = match store.adjustments_for(person) {
        Ok(stored) => stored,
        Err(e) => {
            warn!(person_id = %person.id, error = %e, "could not fetch adjustments, skipping");
            return AdjustmentOutcome::Failed(e);
        }
    };

    if stored.len() == reported.len() {
        if stored.as_slice() != reported {
            debug!(person_id = %person.id, "adjustment values differ but counts match, leaving store as is");
        }
        return AdjustmentOutcome::Unchanged;
    }

    info!(
        person_id = %person.id,
        stored = stored.len(),
        reported = reported.len(),
        "adjustment discrepancy, updating from the report"
    );
    if dry_run {
        return AdjustmentOutcome::WouldUpdate;
    }
    match store.save_adjustments(person, reported) {
        Ok(()) => AdjustmentOutcome::Updated,
        Err(e) => {
            warn!(person_id = %person.id, error = %e, "could not save adjustments");
            AdjustmentOutcome::Failed(e)
        }
    }
}
