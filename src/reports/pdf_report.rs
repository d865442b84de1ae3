use super::ReportRow;
use crate::money::CurrencyFormat;
use crate::nfse::InvoiceRecord;
use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, ObjectId, Stream, dictionary};
use std::path::Path;
use tracing::info;

// Layout in millimetres, A4 portrait.
const PAGE_WIDTH: f32 = 210.0;
const PAGE_HEIGHT: f32 = 297.0;
const MARGIN: f32 = 10.0;
const BOTTOM_MARGIN: f32 = 20.0;
const ROW_HEIGHT: f32 = 10.0;
const CELL_PADDING: f32 = 1.0;
const FONT_SIZE: f32 = 10.0;
const LINE_WIDTH: f32 = 0.2;

const PT_PER_MM: f32 = 72.0 / 25.4;

const HEADERS: [&str; 7] = ["Data", "Número", "Código", "ISS", "INSS", "Valor", "Situação"];
const COLUMN_WIDTHS: [f32; 7] = [25.0, 30.0, 25.0, 25.0, 25.0, 30.0, 30.0];

/// Record rows that fit below the header on one page.
pub(crate) fn rows_per_page() -> usize {
    let usable = PAGE_HEIGHT - BOTTOM_MARGIN - MARGIN - ROW_HEIGHT;
    (usable / ROW_HEIGHT).floor() as usize
}

/// Map text onto the WinAnsi single-byte encoding of the standard fonts.
/// Characters outside Latin-1 become `?`.
pub(crate) fn win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
        .collect()
}

fn pt(mm: f32) -> Object {
    (mm * PT_PER_MM).into()
}

/// Bordered cells of one table row with top edge at `top` (mm from page top).
fn push_row(ops: &mut Vec<Operation>, top: f32, cells: [&str; 7]) {
    let mut x = MARGIN;
    let bottom = PAGE_HEIGHT - top - ROW_HEIGHT;
    let baseline = PAGE_HEIGHT - (top + ROW_HEIGHT / 2.0 + 0.3 * FONT_SIZE / PT_PER_MM);

    for (text, width) in cells.iter().zip(COLUMN_WIDTHS) {
        ops.push(Operation::new(
            "re",
            vec![pt(x), pt(bottom), pt(width), pt(ROW_HEIGHT)],
        ));
        ops.push(Operation::new("S", vec![]));

        ops.push(Operation::new("BT", vec![]));
        ops.push(Operation::new("Tf", vec!["F1".into(), FONT_SIZE.into()]));
        ops.push(Operation::new("Td", vec![pt(x + CELL_PADDING), pt(baseline)]));
        ops.push(Operation::new("Tj", vec![Object::string_literal(win_ansi(text))]));
        ops.push(Operation::new("ET", vec![]));

        x += width;
    }
}

fn page_content(rows: &[ReportRow]) -> Content {
    let mut ops = vec![Operation::new("w", vec![pt(LINE_WIDTH)])];
    push_row(&mut ops, MARGIN, HEADERS);

    let mut top = MARGIN + ROW_HEIGHT;
    for row in rows {
        push_row(
            &mut ops,
            top,
            [
                row.date.as_str(),
                row.number.as_str(),
                row.service_code.as_str(),
                row.iss.as_str(),
                row.inss.as_str(),
                row.gross.as_str(),
                row.status,
            ],
        );
        top += ROW_HEIGHT;
    }
    Content { operations: ops }
}

/// Fixed-layout table, one 10 mm row per record, header repeated per page.
pub fn render_pdf(
    records: &[InvoiceRecord],
    currency: &CurrencyFormat,
) -> Result<Vec<u8>, lopdf::Error> {
    let rows: Vec<ReportRow> = records
        .iter()
        .map(|r| ReportRow::new(r, currency))
        .collect();

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => font_id,
        },
    });

    let chunks: Vec<&[ReportRow]> = if rows.is_empty() {
        vec![&rows[..]]
    } else {
        rows.chunks(rows_per_page()).collect()
    };

    let mut kids: Vec<Object> = Vec::with_capacity(chunks.len());
    for chunk in &chunks {
        let content = page_content(chunk);
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));
        let page_id: ObjectId = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let pages = dictionary! {
        "Type" => "Pages",
        "Count" => kids.len() as i64,
        "Kids" => kids,
        "Resources" => resources_id,
        "MediaBox" => vec![0.into(), 0.into(), pt(PAGE_WIDTH), pt(PAGE_HEIGHT)],
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages));

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.compress();

    let mut out = Vec::new();
    doc.save_to(&mut out)?;
    Ok(out)
}

pub fn write_pdf_file(
    path: &Path,
    records: &[InvoiceRecord],
    currency: &CurrencyFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let bytes = render_pdf(records, currency)?;
    std::fs::write(path, &bytes)?;
    info!(path = %path.display(), rows = records.len(), bytes = bytes.len(), "PDF report written");
    Ok(())
}
