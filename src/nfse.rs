// src/nfse.rs

use crate::money::{AmountConvention, zero};
use roxmltree::{Document, Node};
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;
use time::Date;
use time::macros::format_description;
use tracing::{debug, warn};

/// Value substituted for any element the document does not carry.
const MISSING: &str = "0";

const STATUS_CANCELLED: [&str; 2] = ["Cancelada", "Cancelled"];
const WITHHELD_AT_PAYER: &str = "Retida no Tomador";

/// How the invoice is treated for ISS purposes. Derived, never read verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TaxStatus {
    NotTaxed,
    TaxedAtPayer,
    Cancelled,
}

impl TaxStatus {
    /// Stable code used in the database.
    pub fn as_code(self) -> &'static str {
        match self {
            TaxStatus::NotTaxed => "not_taxed",
            TaxStatus::TaxedAtPayer => "taxed_at_payer",
            TaxStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "not_taxed" => Some(TaxStatus::NotTaxed),
            "taxed_at_payer" => Some(TaxStatus::TaxedAtPayer),
            "cancelled" => Some(TaxStatus::Cancelled),
            _ => None,
        }
    }

    /// Label printed in reports.
    pub fn label(self) -> &'static str {
        match self {
            TaxStatus::NotTaxed => "Não Tributada",
            TaxStatus::TaxedAtPayer => "Tributada no Tomador",
            TaxStatus::Cancelled => "Cancelada",
        }
    }
}

/// One normalized service invoice.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvoiceRecord {
    pub number: String,
    pub issue_date: Date,
    pub service_code: String,
    pub iss_tax_amount: Decimal,
    pub social_contribution_amount: Decimal,
    pub gross_amount: Decimal,
    pub tax_status: TaxStatus,
    pub source_filename: String,
}

/// A record plus the non-fatal problems found while building it.
#[derive(Debug)]
pub struct Normalized {
    pub record: InvoiceRecord,
    pub warnings: Vec<String>,
}

#[derive(Debug, Error, PartialEq)]
pub enum NormalizeError {
    #[error("malformed document: {0}")]
    MalformedDocument(String),

    #[error("invalid date format: {0}")]
    InvalidDateFormat(String),
}

/// Accepts `DD/MM/YYYY` first, then `YYYY-MM-DD`. Day and month may be
/// written with one digit.
pub fn parse_issue_date(raw: &str) -> Result<Date, NormalizeError> {
    let trimmed = raw.trim();
    Date::parse(
        trimmed,
        format_description!("[day padding:none]/[month padding:none]/[year]"),
    )
    .or_else(|_| {
        Date::parse(
            trimmed,
            format_description!("[year]-[month padding:none]-[day padding:none]"),
        )
    })
    .map_err(|_| NormalizeError::InvalidDateFormat(raw.to_string()))
}

/// Resolves child paths under the root using the root's namespace.
struct Fields<'a, 'input> {
    root: Node<'a, 'input>,
    namespace: &'a str,
}

impl<'a, 'input> Fields<'a, 'input> {
    fn new(doc: &'a Document<'input>) -> Result<Self, NormalizeError> {
        let root = doc.root_element();
        let namespace = root.tag_name().namespace().ok_or_else(|| {
            NormalizeError::MalformedDocument(format!(
                "root element <{}> has no namespace",
                root.tag_name().name()
            ))
        })?;
        if namespace.is_empty() {
            return Err(NormalizeError::MalformedDocument(
                "root element has an empty namespace".to_string(),
            ));
        }
        Ok(Self { root, namespace })
    }

    /// Text of the element at `path`, `None` when any step is missing.
    fn lookup(&self, path: &[&str]) -> Option<&'a str> {
        let mut node = self.root;
        for name in path {
            node = node.children().find(|child| {
                child.is_element()
                    && child.tag_name().name() == *name
                    && child.tag_name().namespace() == Some(self.namespace)
            })?;
        }
        Some(node.text().unwrap_or(""))
    }

    fn get(&self, path: &[&str]) -> &'a str {
        self.lookup(path).unwrap_or(MISSING)
    }
}

/// Reads one amount, distinguishing an absent element from a garbled one.
fn read_amount(
    fields: &Fields<'_, '_>,
    name: &str,
    convention: AmountConvention,
    warnings: &mut Vec<String>,
) -> Decimal {
    match fields.lookup(&[name]) {
        None => convention.parse(MISSING),
        Some(raw) => convention.try_parse(raw).unwrap_or_else(|e| {
            warn!(field = name, error = %e, "Unparsable amount, using 0.00");
            warnings.push(format!("{name}: {e}, using 0.00"));
            zero()
        }),
    }
}

/// Turn one raw NFS-e XML document into an [`InvoiceRecord`].
pub fn normalize(xml: &[u8], source_filename: &str) -> Result<Normalized, NormalizeError> {
    let text = std::str::from_utf8(xml)
        .map_err(|e| NormalizeError::MalformedDocument(format!("not UTF-8: {e}")))?;
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let doc =
        Document::parse(text).map_err(|e| NormalizeError::MalformedDocument(e.to_string()))?;
    let fields = Fields::new(&doc)?;

    let number = fields.get(&["ChaveNFe", "NumeroNFe"]).to_string();
    let issue_date = parse_issue_date(fields.get(&["ChaveNFe", "DataEmissaoNFe"]))?;
    let service_code = fields.get(&["CodigoServico"]).to_string();
    let status = fields.get(&["StatusNFe"]).trim();
    let taxation = fields.get(&["TributacaoNFe"]).trim();

    let mut warnings = Vec::new();
    let cancelled = STATUS_CANCELLED.contains(&status);

    let (iss_tax_amount, social_contribution_amount, gross_amount) = if cancelled {
        (zero(), zero(), zero())
    } else {
        (
            read_amount(&fields, "ValorISS", AmountConvention::Standard, &mut warnings),
            read_amount(
                &fields,
                "ValorInss",
                AmountConvention::SocialContribution,
                &mut warnings,
            ),
            read_amount(
                &fields,
                "ValorServicos",
                AmountConvention::Standard,
                &mut warnings,
            ),
        )
    };

    let tax_status = if cancelled {
        TaxStatus::Cancelled
    } else if taxation == WITHHELD_AT_PAYER {
        TaxStatus::TaxedAtPayer
    } else {
        TaxStatus::NotTaxed
    };

    debug!(number = %number, status = ?tax_status, "Normalized invoice");

    Ok(Normalized {
        record: InvoiceRecord {
            number,
            issue_date,
            service_code,
            iss_tax_amount,
            social_contribution_amount,
            gross_amount,
            tax_status,
            source_filename: source_filename.to_string(),
        },
        warnings,
    })
}
