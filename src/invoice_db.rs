use crate::nfse::{InvoiceRecord, TaxStatus};
use rusqlite::types::Type;
use rusqlite::{Connection, Result as SqliteResult, params};
use rust_decimal::Decimal;
use std::path::Path;
use std::str::FromStr;
use time::Date;
use time::macros::format_description;
use tracing::info;

/// Storage seam for normalized invoices. Records are append-only; the only
/// removal is the bulk [`InvoiceRepository::delete_all`].
pub trait InvoiceRepository {
    fn insert(&self, record: &InvoiceRecord) -> SqliteResult<i64>;
    fn query_all(&self) -> SqliteResult<Vec<InvoiceRecord>>;
    /// Inclusive on both ends. `start > end` yields nothing.
    fn query_by_date_range(&self, start: Date, end: Date) -> SqliteResult<Vec<InvoiceRecord>>;
    fn delete_all(&self) -> SqliteResult<usize>;
    fn count(&self) -> SqliteResult<usize>;
}

pub struct InvoiceStore {
    conn: Connection,
}

const SELECT_COLUMNS: &str = "SELECT number, issue_date, service_code, iss_amount, social_contribution_amount, gross_amount, tax_status, source_filename
     FROM invoices";

impl InvoiceStore {
    /// Open (or create) the invoice store with SQLite backend
    pub fn new<P: AsRef<Path>>(db_path: P) -> SqliteResult<Self> {
        let conn = Connection::open(db_path)?;
        Self::init(conn)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> SqliteResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> SqliteResult<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS invoices (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                number TEXT NOT NULL,
                issue_date TEXT NOT NULL,
                service_code TEXT NOT NULL DEFAULT '',
                iss_amount TEXT NOT NULL DEFAULT '0.00',
                social_contribution_amount TEXT NOT NULL DEFAULT '0.00',
                gross_amount TEXT NOT NULL DEFAULT '0.00',
                tax_status TEXT NOT NULL,
                source_filename TEXT NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_invoices_issue_date ON invoices(issue_date)",
            [],
        )?;

        info!("Database initialized successfully");
        Ok(Self { conn })
    }

    /// Map a row with the 8-column projection to `InvoiceRecord`.
    fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<InvoiceRecord> {
        let issue_date: String = row.get(1)?;
        let status: String = row.get(6)?;
        Ok(InvoiceRecord {
            number: row.get(0)?,
            issue_date: Date::parse(&issue_date, format_description!("[year]-[month]-[day]"))
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e)))?,
            service_code: row.get(2)?,
            iss_tax_amount: Self::decimal_column(row, 3)?,
            social_contribution_amount: Self::decimal_column(row, 4)?,
            gross_amount: Self::decimal_column(row, 5)?,
            tax_status: TaxStatus::from_code(&status).ok_or_else(|| {
                rusqlite::Error::FromSqlConversionFailure(
                    6,
                    Type::Text,
                    format!("unknown tax status '{status}'").into(),
                )
            })?,
            source_filename: row.get(7)?,
        })
    }

    fn decimal_column(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Decimal> {
        let raw: String = row.get(idx)?;
        Decimal::from_str(&raw)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    }

    fn iso_date(date: Date) -> String {
        format!(
            "{:04}-{:02}-{:02}",
            date.year(),
            u8::from(date.month()),
            date.day()
        )
    }
}

impl InvoiceRepository for InvoiceStore {
    fn insert(&self, record: &InvoiceRecord) -> SqliteResult<i64> {
        self.conn.execute(
            "INSERT INTO invoices
                (number, issue_date, service_code, iss_amount, social_contribution_amount, gross_amount, tax_status, source_filename)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                record.number,
                Self::iso_date(record.issue_date),
                record.service_code,
                record.iss_tax_amount.to_string(),
                record.social_contribution_amount.to_string(),
                record.gross_amount.to_string(),
                record.tax_status.as_code(),
                record.source_filename,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        info!(invoice_id = id, number = %record.number, filename = %record.source_filename, "Invoice stored");
        Ok(id)
    }

    fn query_all(&self) -> SqliteResult<Vec<InvoiceRecord>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{SELECT_COLUMNS} ORDER BY id"))?;
        let rows = stmt.query_map([], |row| Self::row_to_record(row))?;
        rows.collect()
    }

    fn query_by_date_range(&self, start: Date, end: Date) -> SqliteResult<Vec<InvoiceRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "{SELECT_COLUMNS}
             WHERE issue_date BETWEEN ?1 AND ?2
             ORDER BY id"
        ))?;
        let rows = stmt.query_map(
            params![Self::iso_date(start), Self::iso_date(end)],
            |row| Self::row_to_record(row),
        )?;
        rows.collect()
    }

    fn delete_all(&self) -> SqliteResult<usize> {
        let removed = self.conn.execute("DELETE FROM invoices", [])?;
        info!(removed = removed, "All invoices deleted");
        Ok(removed)
    }

    fn count(&self) -> SqliteResult<usize> {
        self.conn
            .query_row("SELECT COUNT(*) FROM invoices", [], |row| row.get(0))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::money::zero;
    use time::Month;

    pub(crate) fn record(number: &str, y: i32, m: Month, d: u8) -> InvoiceRecord {
        InvoiceRecord {
            number: number.to_string(),
            issue_date: Date::from_calendar_date(y, m, d).unwrap(),
            service_code: "02919".to_string(),
            iss_tax_amount: Decimal::from_str("12.50").unwrap(),
            social_contribution_amount: zero(),
            gross_amount: Decimal::from_str("1250.00").unwrap(),
            tax_status: TaxStatus::TaxedAtPayer,
            source_filename: format!("{number}.xml"),
        }
    }

    #[test]
    fn test_insert_and_query_all() {
        let db = InvoiceStore::open_in_memory().unwrap();
        let a = record("1", 2024, Month::January, 10);
        let b = record("2", 2024, Month::February, 3);
        db.insert(&a).unwrap();
        db.insert(&b).unwrap();

        let all = db.query_all().unwrap();
        assert_eq!(all, vec![a, b]);
        assert_eq!(db.count().unwrap(), 2);
    }

    #[test]
    fn test_amounts_survive_storage_exactly() {
        let db = InvoiceStore::open_in_memory().unwrap();
        let mut r = record("1", 2024, Month::January, 10);
        r.gross_amount = Decimal::from_str("1234567.89").unwrap();
        db.insert(&r).unwrap();
        let back = db.query_all().unwrap().remove(0);
        assert_eq!(back.gross_amount.to_string(), "1234567.89");
        assert_eq!(back.social_contribution_amount.to_string(), "0.00");
    }

    #[test]
    fn test_date_range_is_inclusive() {
        let db = InvoiceStore::open_in_memory().unwrap();
        db.insert(&record("1", 2024, Month::January, 1)).unwrap();
        db.insert(&record("2", 2024, Month::January, 31)).unwrap();
        db.insert(&record("3", 2024, Month::February, 1)).unwrap();
        db.insert(&record("4", 2023, Month::December, 31)).unwrap();

        let start = Date::from_calendar_date(2024, Month::January, 1).unwrap();
        let end = Date::from_calendar_date(2024, Month::January, 31).unwrap();
        let numbers: Vec<String> = db
            .query_by_date_range(start, end)
            .unwrap()
            .into_iter()
            .map(|r| r.number)
            .collect();
        assert_eq!(numbers, vec!["1", "2"]);
    }

    #[test]
    fn test_reversed_range_is_empty() {
        let db = InvoiceStore::open_in_memory().unwrap();
        db.insert(&record("1", 2024, Month::January, 15)).unwrap();
        let start = Date::from_calendar_date(2024, Month::February, 1).unwrap();
        let end = Date::from_calendar_date(2024, Month::January, 1).unwrap();
        assert!(db.query_by_date_range(start, end).unwrap().is_empty());
    }

    #[test]
    fn test_delete_all() {
        let db = InvoiceStore::open_in_memory().unwrap();
        db.insert(&record("1", 2024, Month::January, 15)).unwrap();
        db.insert(&record("2", 2024, Month::January, 16)).unwrap();
        assert_eq!(db.delete_all().unwrap(), 2);
        assert!(db.query_all().unwrap().is_empty());
        let start = Date::from_calendar_date(2000, Month::January, 1).unwrap();
        let end = Date::from_calendar_date(2100, Month::January, 1).unwrap();
        assert!(db.query_by_date_range(start, end).unwrap().is_empty());
    }

    #[test]
    fn test_reopen_keeps_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notas.db");
        {
            let db = InvoiceStore::new(&path).unwrap();
            db.insert(&record("7", 2024, Month::May, 5)).unwrap();
        }
        let db = InvoiceStore::new(&path).unwrap();
        assert_eq!(db.count().unwrap(), 1);
    }
}
