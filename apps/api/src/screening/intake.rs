// Upload adapters: CSV exports and resume files become RawRecords.

use thiserror::Error;

use crate::models::record::RawRecord;

pub const RESUME_FIELD: &str = "resume_text";
const DEFAULT_RESUME_ID: &str = "resume";

#[derive(Debug, Error)]
pub enum IntakeError {
    #[error("CSV parse error: {0}")]
    Csv(#[from] csv::Error),

    #[error("CSV has no header row")]
    MissingHeaders,

    #[error("could not extract text from PDF: {0}")]
    Pdf(String),

    #[error("resume is neither a PDF nor UTF-8 text")]
    Encoding,

    #[error("resume contains no text")]
    EmptyResume,
}

/// One record per non-blank row. Headers become field names in column order.
/// An `id` column (any case) supplies the source id; otherwise rows are `row-<n>`.
pub fn records_from_csv(bytes: &[u8]) -> Result<Vec<RawRecord>, IntakeError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(bytes);

    let headers = reader.headers()?.clone();
    if headers.iter().all(|h| h.is_empty()) {
        return Err(IntakeError::MissingHeaders);
    }
    let id_column = headers.iter().position(|h| h.eq_ignore_ascii_case("id"));

    let mut records = Vec::new();
    for (idx, row) in reader.records().enumerate() {
        let row = row?;
        let source_id = id_column
            .and_then(|col| row.get(col))
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("row-{}", idx + 1));

        let fields = headers
            .iter()
            .zip(row.iter())
            .enumerate()
            .filter(|(col, (header, _))| Some(*col) != id_column && !header.is_empty())
            .map(|(_, (header, value))| (header, value));

        let record = RawRecord::new(source_id, fields);
        if record.is_empty() {
            continue;
        }
        records.push(record);
    }
    Ok(records)
}

/// Wraps an uploaded resume as a single-field record.
pub fn record_from_resume(
    file_name: Option<&str>,
    content_type: Option<&str>,
    bytes: &[u8],
) -> Result<RawRecord, IntakeError> {
    let text = if is_pdf(file_name, content_type, bytes) {
        extract_pdf_text(bytes)?
    } else {
        String::from_utf8(bytes.to_vec()).map_err(|_| IntakeError::Encoding)?
    };

    if text.trim().is_empty() {
        return Err(IntakeError::EmptyResume);
    }

    let source_id = file_name
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .unwrap_or(DEFAULT_RESUME_ID);
    Ok(RawRecord::new(source_id, [(RESUME_FIELD, text.trim())]))
}

// pdf-extract panics on some malformed documents instead of returning an error.
fn extract_pdf_text(bytes: &[u8]) -> Result<String, IntakeError> {
    match std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem(bytes)) {
        Ok(Ok(text)) => Ok(text),
        Ok(Err(err)) => Err(IntakeError::Pdf(err.to_string())),
        Err(_) => Err(IntakeError::Pdf("unreadable document".to_string())),
    }
}

fn is_pdf(file_name: Option<&str>, content_type: Option<&str>, bytes: &[u8]) -> bool {
    content_type.is_some_and(|ct| ct.eq_ignore_ascii_case("application/pdf"))
        || file_name.is_some_and(|name| name.to_ascii_lowercase().ends_with(".pdf"))
        || bytes.starts_with(b"%PDF")
}
