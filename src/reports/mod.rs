// src/reports/mod.rs

mod csv_report;
mod pdf_report;

pub use csv_report::write_csv_file;
pub use pdf_report::write_pdf_file;

use crate::invoice_db::InvoiceRepository;
use crate::money::{CurrencyFormat, zero};
use crate::nfse::InvoiceRecord;
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;
use time::Date;
use time::macros::format_description;
use tracing::warn;

/// Result of a listing request. `warning` is set when the requested range
/// could not be applied and every record was returned instead.
#[derive(Debug)]
pub struct QueryOutcome {
    pub records: Vec<InvoiceRecord>,
    pub warning: Option<String>,
}

fn parse_bound(raw: &str) -> Option<Date> {
    Date::parse(raw.trim(), format_description!("[year]-[month]-[day]")).ok()
}

/// List invoices, filtered to `[start, end]` when both bounds are given.
pub fn query_invoices<R>(
    repo: &R,
    start: Option<&str>,
    end: Option<&str>,
) -> rusqlite::Result<QueryOutcome>
where
    R: InvoiceRepository + ?Sized,
{
    let warning = match (start, end) {
        (None, None) => None,
        (Some(s), Some(e)) => match (parse_bound(s), parse_bound(e)) {
            (Some(start), Some(end)) => {
                return Ok(QueryOutcome {
                    records: repo.query_by_date_range(start, end)?,
                    warning: None,
                });
            }
            _ => Some("Invalid date format. Use YYYY-MM-DD.".to_string()),
        },
        _ => Some("Both start and end dates are required to filter.".to_string()),
    };

    if let Some(ref message) = warning {
        warn!(start = ?start, end = ?end, "{message}");
    }

    Ok(QueryOutcome {
        records: repo.query_all()?,
        warning,
    })
}

/// A column sum left the range `Decimal` can represent.
#[derive(Debug, Error, PartialEq)]
#[error("{0} total is too large to compute")]
pub struct TotalsOverflow(&'static str);

/// Sums shown under a listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Totals {
    pub gross_amount: Decimal,
    pub iss_tax_amount: Decimal,
    pub social_contribution_amount: Decimal,
}

impl Totals {
    pub fn of(records: &[InvoiceRecord]) -> Result<Self, TotalsOverflow> {
        let mut totals = Totals {
            gross_amount: zero(),
            iss_tax_amount: zero(),
            social_contribution_amount: zero(),
        };
        for r in records {
            totals.gross_amount = totals
                .gross_amount
                .checked_add(r.gross_amount)
                .ok_or(TotalsOverflow("gross"))?;
            totals.iss_tax_amount = totals
                .iss_tax_amount
                .checked_add(r.iss_tax_amount)
                .ok_or(TotalsOverflow("ISS"))?;
            totals.social_contribution_amount = totals
                .social_contribution_amount
                .checked_add(r.social_contribution_amount)
                .ok_or(TotalsOverflow("INSS"))?;
        }
        Ok(totals)
    }
}

pub(crate) fn display_date(date: Date) -> String {
    format!(
        "{:02}/{:02}/{:04}",
        date.day(),
        u8::from(date.month()),
        date.year()
    )
}

/// One report line, every field already rendered to text.
pub(crate) struct ReportRow {
    pub date: String,
    pub number: String,
    pub service_code: String,
    pub iss: String,
    pub inss: String,
    pub gross: String,
    pub status: &'static str,
}

impl ReportRow {
    pub fn new(record: &InvoiceRecord, currency: &CurrencyFormat) -> Self {
        Self {
            date: display_date(record.issue_date),
            number: record.number.clone(),
            service_code: record.service_code.clone(),
            iss: currency.format(record.iss_tax_amount),
            inss: currency.format(record.social_contribution_amount),
            gross: currency.format(record.gross_amount),
            status: record.tax_status.label(),
        }
    }
}

/// Plain-text table for the terminal.
pub fn render_table(
    records: &[InvoiceRecord],
    currency: &CurrencyFormat,
) -> Result<String, TotalsOverflow> {
    let mut out = format!(
        "{:<10}  {:<12}  {:<8}  {:>16}  {:>16}  {:>18}  {}\n",
        "Data", "Número", "Código", "ISS", "INSS", "Valor", "Situação"
    );
    for record in records {
        let row = ReportRow::new(record, currency);
        out.push_str(&format!(
            "{:<10}  {:<12}  {:<8}  {:>16}  {:>16}  {:>18}  {}\n",
            row.date, row.number, row.service_code, row.iss, row.inss, row.gross, row.status
        ));
    }

    let totals = Totals::of(records)?;
    out.push_str(&format!(
        "\n{} nota(s)\nTotal das notas: {}\nTotal ISS: {}\nTotal INSS: {}\n",
        records.len(),
        currency.format(totals.gross_amount),
        currency.format(totals.iss_tax_amount),
        currency.format(totals.social_contribution_amount),
    ));
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invoice_db::InvoiceStore;
    use crate::invoice_db::tests::record;
    use std::str::FromStr;
    use time::Month;

    fn seeded() -> InvoiceStore {
        let db = InvoiceStore::open_in_memory().unwrap();
        db.insert(&record("1", 2024, Month::January, 5)).unwrap();
        db.insert(&record("2", 2024, Month::March, 5)).unwrap();
        db.insert(&record("3", 2024, Month::June, 5)).unwrap();
        db
    }

    #[test]
    fn test_range_filter() {
        let db = seeded();
        let out = query_invoices(&db, Some("2024-02-01"), Some("2024-06-05")).unwrap();
        assert!(out.warning.is_none());
        let numbers: Vec<&str> = out.records.iter().map(|r| r.number.as_str()).collect();
        assert_eq!(numbers, vec!["2", "3"]);
    }

    #[test]
    fn test_reversed_range_is_empty_not_error() {
        let db = seeded();
        let out = query_invoices(&db, Some("2024-12-31"), Some("2024-01-01")).unwrap();
        assert!(out.records.is_empty());
        assert!(out.warning.is_none());
    }

    #[test]
    fn test_invalid_range_drops_filter() {
        let db = seeded();
        let out = query_invoices(&db, Some("01/02/2024"), Some("2024-06-05")).unwrap();
        assert_eq!(out.records.len(), 3);
        assert!(out.warning.unwrap().contains("YYYY-MM-DD"));
    }

    #[test]
    fn test_half_range_drops_filter() {
        let db = seeded();
        let out = query_invoices(&db, Some("2024-02-01"), None).unwrap();
        assert_eq!(out.records.len(), 3);
        assert!(out.warning.is_some());
    }

    #[test]
    fn test_no_range() {
        let db = seeded();
        let out = query_invoices(&db, None, None).unwrap();
        assert_eq!(out.records.len(), 3);
        assert!(out.warning.is_none());
    }

    #[test]
    fn test_query_after_clear() {
        let db = seeded();
        db.delete_all().unwrap();
        assert!(query_invoices(&db, None, None).unwrap().records.is_empty());
        assert!(
            query_invoices(&db, Some("2000-01-01"), Some("2100-01-01"))
                .unwrap()
                .records
                .is_empty()
        );
    }

    #[test]
    fn test_totals() {
        let db = seeded();
        let records = db.query_all().unwrap();
        let totals = Totals::of(&records).unwrap();
        assert_eq!(totals.gross_amount, Decimal::from_str("3750.00").unwrap());
        assert_eq!(totals.iss_tax_amount, Decimal::from_str("37.50").unwrap());
        assert_eq!(totals.social_contribution_amount, zero());
        assert_eq!(Totals::of(&[]).unwrap().gross_amount, zero());
    }

    #[test]
    fn test_totals_overflow_is_an_error() {
        let mut big = record("1", 2024, Month::January, 5);
        big.gross_amount = Decimal::MAX;
        let records = vec![big.clone(), big];

        assert_eq!(Totals::of(&records), Err(TotalsOverflow("gross")));
        assert!(render_table(&records, &CurrencyFormat::brl()).is_err());
    }

    #[test]
    fn test_table_contains_totals() {
        let db = seeded();
        let table = render_table(&db.query_all().unwrap(), &CurrencyFormat::brl()).unwrap();
        assert!(table.contains("05/03/2024"));
        assert!(table.contains("Tributada no Tomador"));
        assert!(table.contains("Total das notas: R$ 3.750,00"));
        assert!(table.contains("3 nota(s)"));
    }
}
