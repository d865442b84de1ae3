use super::ReportRow;
use crate::money::CurrencyFormat;
use crate::nfse::InvoiceRecord;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::info;

const HEADERS: [&str; 7] = [
    "Número",
    "Data",
    "Código Serviço",
    "Valor ISS",
    "Valor INSS",
    "Valor da Nota",
    "Situação",
];

/// Semicolon-separated export, UTF-8 with a byte-order mark so spreadsheet
/// tools pick the right encoding.
pub fn write_csv<W: Write>(
    out: W,
    records: &[InvoiceRecord],
    currency: &CurrencyFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut out = out;
    out.write_all("\u{feff}".as_bytes())?;

    let mut writer = csv::WriterBuilder::new().delimiter(b';').from_writer(out);
    writer.write_record(HEADERS)?;
    for record in records {
        let row = ReportRow::new(record, currency);
        writer.write_record([
            row.number.as_str(),
            row.date.as_str(),
            row.service_code.as_str(),
            row.iss.as_str(),
            row.inss.as_str(),
            row.gross.as_str(),
            row.status,
        ])?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_csv_file(
    path: &Path,
    records: &[InvoiceRecord],
    currency: &CurrencyFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let file = BufWriter::new(File::create(path)?);
    write_csv(file, records, currency)?;
    info!(path = %path.display(), rows = records.len(), "CSV report written");
    Ok(())
}
