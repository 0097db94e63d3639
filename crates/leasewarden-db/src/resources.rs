//! Resource queries: predicate scans, counts and conditional transitions.

use chrono::{DateTime, Utc};
use leasewarden_core::error::{LeaseError, Result};
use leasewarden_core::types::{ManagedResource, ReminderKind, ResourceStatus};
use rusqlite::params_from_iter;
use rusqlite::types::Value;

use crate::{LeaseDb, parse_enum, parse_ts, placeholders, ts};

const RESOURCE_SELECT: &str = "SELECT id, name, owner_id, owner_email, external_id, status, expires_at, created_at FROM resources r";

fn row_to_resource(row: &rusqlite::Row) -> rusqlite::Result<ManagedResource> {
    let status: String = row.get(5)?;
    let expires_at: String = row.get(6)?;
    let created_at: String = row.get(7)?;
    Ok(ManagedResource {
        id: row.get(0)?,
        name: row.get(1)?,
        owner_id: row.get(2)?,
        owner_email: row.get(3)?,
        external_id: row.get(4)?,
        status: parse_enum(&status, 5, ResourceStatus::parse)?,
        expires_at: parse_ts(&expires_at, 6)?,
        created_at: parse_ts(&created_at, 7)?,
    })
}

/// Predicate over resources: one status plus a range on `expires_at`.
///
/// `expires_from` is inclusive. `expires_until` is exclusive unless
/// `until_inclusive` is set.
#[derive(Debug, Clone)]
pub struct ResourceFilter {
    pub status: ResourceStatus,
    pub expires_from: Option<DateTime<Utc>>,
    pub expires_until: DateTime<Utc>,
    pub until_inclusive: bool,
    /// Only resources that have no notification of this kind yet.
    pub missing_reminder: Option<ReminderKind>,
}

impl ResourceFilter {
    /// `status = ? AND expires_at <= cutoff`
    pub fn due(status: ResourceStatus, cutoff: DateTime<Utc>) -> Self {
        Self {
            status,
            expires_from: None,
            expires_until: cutoff,
            until_inclusive: true,
            missing_reminder: None,
        }
    }

    /// `status = ? AND start <= expires_at < end AND no <kind> reminder yet`
    pub fn reminder_window(
        kind: ReminderKind,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Self {
        Self {
            status: kind.resource_status(),
            expires_from: Some(start),
            expires_until: end,
            until_inclusive: false,
            missing_reminder: Some(kind),
        }
    }

    fn where_clause(&self) -> (String, Vec<Value>) {
        let mut sql = String::from(" WHERE r.status = ?");
        let mut args: Vec<Value> = vec![Value::Text(self.status.as_str().into())];
        if let Some(from) = self.expires_from {
            sql.push_str(" AND r.expires_at >= ?");
            args.push(Value::Text(ts(from)));
        }
        sql.push_str(if self.until_inclusive {
            " AND r.expires_at <= ?"
        } else {
            " AND r.expires_at < ?"
        });
        args.push(Value::Text(ts(self.expires_until)));
        if let Some(kind) = self.missing_reminder {
            sql.push_str(
                " AND NOT EXISTS (SELECT 1 FROM notifications n WHERE n.resource_id = r.id AND n.kind = ?)",
            );
            args.push(Value::Text(kind.as_str().into()));
        }
        (sql, args)
    }
}

impl LeaseDb {
    // ── Resources ────────────────────────────────────

    /// Insert a resource (used by provisioning and tests).
    pub fn insert_resource(&self, r: &ManagedResource) -> Result<()> {
        let now = ts(Utc::now());
        self.conn()?
            .execute(
                "INSERT INTO resources (id, name, owner_id, owner_email, external_id, status, expires_at, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                rusqlite::params![
                    r.id,
                    r.name,
                    r.owner_id,
                    r.owner_email,
                    r.external_id,
                    r.status.as_str(),
                    ts(r.expires_at),
                    ts(r.created_at),
                    now,
                ],
            )
            .map_err(|e| LeaseError::Database(format!("Insert resource: {e}")))?;
        Ok(())
    }

    /// Get a resource by ID.
    pub fn get_resource(&self, id: &str) -> Result<Option<ManagedResource>> {
        let conn = self.conn()?;
        match conn.query_row(&format!("{RESOURCE_SELECT} WHERE r.id = ?1"), [id], row_to_resource) {
            Ok(r) => Ok(Some(r)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(LeaseError::Database(format!("Get resource: {e}"))),
        }
    }

    /// Oldest-first page of resources matching `filter`, minus the ids in
    /// `exclude`.
    pub fn fetch_resources(
        &self,
        filter: &ResourceFilter,
        exclude: &[String],
        limit: usize,
    ) -> Result<Vec<ManagedResource>> {
        let (mut clause, mut args) = filter.where_clause();
        if !exclude.is_empty() {
            clause.push_str(&format!(" AND r.id NOT IN ({})", placeholders(exclude.len())));
            args.extend(exclude.iter().map(|id| Value::Text(id.clone())));
        }
        args.push(Value::Integer(limit as i64));
        let sql = format!("{RESOURCE_SELECT}{clause} ORDER BY r.expires_at ASC, r.id ASC LIMIT ?");

        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| LeaseError::Database(format!("Prepare: {e}")))?;
        let rows = stmt
            .query_map(params_from_iter(args), row_to_resource)
            .map_err(|e| LeaseError::Database(format!("Query: {e}")))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| LeaseError::Database(format!("Read resource: {e}")))
    }

    /// Point-in-time count of resources matching `filter`.
    pub fn count_resources(&self, filter: &ResourceFilter) -> Result<u64> {
        let (clause, args) = filter.where_clause();
        let sql = format!("SELECT COUNT(*) FROM resources r{clause}");
        let conn = self.conn()?;
        let count: i64 = conn
            .query_row(&sql, params_from_iter(args), |row| row.get(0))
            .map_err(|e| LeaseError::Database(format!("Count resources: {e}")))?;
        Ok(count as u64)
    }

    /// Compare-and-swap status change. Returns false when the row was not in
    /// `from` any more (another run got there first).
    pub fn transition_status(&self, id: &str, from: ResourceStatus, to: ResourceStatus) -> Result<bool> {
        let changed = self
            .conn()?
            .execute(
                "UPDATE resources SET status = ?1, updated_at = ?2 WHERE id = ?3 AND status = ?4",
                rusqlite::params![to.as_str(), ts(Utc::now()), id, from.as_str()],
            )
            .map_err(|e| LeaseError::Database(format!("Update status: {e}")))?;
        Ok(changed == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn seed(db: &LeaseDb, name: &str, status: ResourceStatus, expires_at: DateTime<Utc>) -> ManagedResource {
        let r = ManagedResource::new(name, "owner-1", "owner@example.com", expires_at)
            .with_external_id(&format!("srv-{name}"))
            .with_status(status);
        db.insert_resource(&r).unwrap();
        r
    }

    #[test]
    fn test_due_filter_orders_by_expiry() {
        let db = LeaseDb::open_in_memory().unwrap();
        let now = Utc::now();
        seed(&db, "late", ResourceStatus::Active, now - Duration::hours(1));
        seed(&db, "early", ResourceStatus::Active, now - Duration::hours(5));
        seed(&db, "future", ResourceStatus::Active, now + Duration::hours(5));
        seed(&db, "gone", ResourceStatus::Expired, now - Duration::hours(9));

        let filter = ResourceFilter::due(ResourceStatus::Active, now);
        let page = db.fetch_resources(&filter, &[], 20).unwrap();
        let names: Vec<_> = page.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["early", "late"]);
        assert_eq!(db.count_resources(&filter).unwrap(), 2);
        assert_eq!(db.fetch_resources(&filter, &[], 1).unwrap().len(), 1);
    }

    #[test]
    fn test_fetch_leaves_out_excluded_ids() {
        let db = LeaseDb::open_in_memory().unwrap();
        let now = Utc::now();
        let a = seed(&db, "a", ResourceStatus::Active, now - Duration::hours(3));
        seed(&db, "b", ResourceStatus::Active, now - Duration::hours(2));
        let c = seed(&db, "c", ResourceStatus::Active, now - Duration::hours(1));

        let filter = ResourceFilter::due(ResourceStatus::Active, now);
        let page = db.fetch_resources(&filter, &[a.id.clone(), c.id.clone()], 20).unwrap();
        let names: Vec<_> = page.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["b"]);
        // The page size is not consumed by excluded rows
        let page = db.fetch_resources(&filter, &[a.id], 1).unwrap();
        assert_eq!(page[0].name, "b");
    }

    #[test]
    fn test_due_cutoff_is_inclusive() {
        let db = LeaseDb::open_in_memory().unwrap();
        let now = Utc::now();
        seed(&db, "exact", ResourceStatus::Active, now);
        let filter = ResourceFilter::due(ResourceStatus::Active, now);
        assert_eq!(db.count_resources(&filter).unwrap(), 1);
    }

    #[test]
    fn test_transition_is_conditional() {
        let db = LeaseDb::open_in_memory().unwrap();
        let r = seed(&db, "a", ResourceStatus::Active, Utc::now());
        assert!(db.transition_status(&r.id, ResourceStatus::Active, ResourceStatus::Expired).unwrap());
        // Second attempt from the stale state does nothing
        assert!(!db.transition_status(&r.id, ResourceStatus::Active, ResourceStatus::Expired).unwrap());
        let loaded = db.get_resource(&r.id).unwrap().unwrap();
        assert_eq!(loaded.status, ResourceStatus::Expired);
        assert_eq!(loaded.external_id.as_deref(), Some("srv-a"));
    }

    #[test]
    fn test_reminder_window_half_open() {
        let db = LeaseDb::open_in_memory().unwrap();
        let now = Utc::now();
        seed(&db, "start", ResourceStatus::Active, now);
        seed(&db, "end", ResourceStatus::Active, now + Duration::days(1));
        let filter = ResourceFilter::reminder_window(ReminderKind::ExpiresIn1Day, now, now + Duration::days(1));
        let page = db.fetch_resources(&filter, &[], 20).unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].name, "start");
    }
}
