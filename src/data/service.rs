//! Service discovery data access object

use super::database::DatabaseError;
use super::models::{OnTransactInfo, ServiceRecord};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};

/// Read access to discovered services, plus the writes used to seed it
#[derive(Clone)]
pub struct ServiceStore {
    conn: Arc<Mutex<Connection>>,
}

impl ServiceStore {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// Look up a service on a device (or meta target).
    ///
    /// With `real_device_id` set, a record bound to a different physical
    /// device is not returned.
    pub fn get_service(
        &self,
        service_name: &str,
        device_id: &str,
        real_device_id: Option<&str>,
    ) -> Result<Option<ServiceRecord>, DatabaseError> {
        let conn = self.conn.lock().map_err(|_| DatabaseError::LockPoisoned)?;
        let record = conn
            .query_row(
                "SELECT s.service_name, s.device_id, s.real_device_id,
                        o.entry_addr, o.bin, o.bbinder_path, o.module
                 FROM services s
                 LEFT JOIN ontransact o
                   ON o.service_name = s.service_name AND o.device_id = s.device_id
                 WHERE s.service_name = ?1 AND s.device_id = ?2
                   AND (?3 IS NULL OR s.real_device_id IS NULL OR s.real_device_id = ?3)",
                params![service_name, device_id, real_device_id],
                Self::row_to_record,
            )
            .optional()?;
        Ok(record)
    }

    /// Insert or refresh a service row
    pub fn upsert_service(
        &self,
        service_name: &str,
        device_id: &str,
        real_device_id: Option<&str>,
    ) -> Result<(), DatabaseError> {
        let conn = self.conn.lock().map_err(|_| DatabaseError::LockPoisoned)?;
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO services (service_name, device_id, real_device_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)
             ON CONFLICT(service_name, device_id)
             DO UPDATE SET real_device_id = excluded.real_device_id, updated_at = excluded.updated_at",
            params![service_name, device_id, real_device_id, now],
        )?;
        Ok(())
    }

    /// Record where onTransact was found. The service row must exist.
    pub fn upsert_on_transact(
        &self,
        service_name: &str,
        device_id: &str,
        info: &OnTransactInfo,
    ) -> Result<(), DatabaseError> {
        let conn = self.conn.lock().map_err(|_| DatabaseError::LockPoisoned)?;
        conn.execute(
            "INSERT INTO ontransact (service_name, device_id, entry_addr, bin, bbinder_path, module, discovered_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(service_name, device_id)
             DO UPDATE SET entry_addr = excluded.entry_addr, bin = excluded.bin,
                           bbinder_path = excluded.bbinder_path, module = excluded.module,
                           discovered_at = excluded.discovered_at",
            params![
                service_name,
                device_id,
                // SQLite integers are signed; the address bits are kept as-is
                info.entry_addr as i64,
                info.bin,
                info.bbinder_path,
                info.module,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<ServiceRecord> {
        let entry_addr: Option<i64> = row.get(3)?;
        let on_transact = match entry_addr {
            Some(addr) => Some(OnTransactInfo {
                entry_addr: addr as u64,
                bin: row.get(4)?,
                bbinder_path: row.get(5)?,
                module: row.get(6)?,
            }),
            None => None,
        };

        Ok(ServiceRecord {
            service_name: row.get(0)?,
            device_id: row.get(1)?,
            real_device_id: row.get(2)?,
            on_transact,
        })
    }
}
