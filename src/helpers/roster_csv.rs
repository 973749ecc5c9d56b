//! Roster import and export.
//!
//! Exports are UTF-8 with a byte-order mark so spreadsheet software opens
//! Japanese names correctly. Imports accept the Japanese headers written by
//! the export as well as plain English ones, in any column order.

use csv::StringRecord;
use std::path::Path;
use tracing::{info, warn};

use crate::error::EnvelopeError;
use crate::models::roster::MemberRecord;

pub const CSV_MIME: &str = "text/csv; charset=utf-8";
pub const EXPORT_FILENAME: &str = "member_list.csv";
pub const EXPORT_HEADER: [&str; 3] = ["名前", "月謝", "備考"];

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";
const NAME_HEADERS: [&str; 2] = ["名前", "name"];
const FEE_HEADERS: [&str; 2] = ["月謝", "fee"];
const NOTE_HEADERS: [&str; 2] = ["備考", "note"];

pub fn read_roster_file<P: AsRef<Path>>(path: P) -> Result<Vec<MemberRecord>, EnvelopeError> {
    let path = path.as_ref();
    info!("Reading roster from {}", path.display());
    let data = std::fs::read(path)?;
    import_roster(&data)
}

/// Parses a roster. The whole dataset is rejected on the first bad row.
pub fn import_roster(data: &[u8]) -> Result<Vec<MemberRecord>, EnvelopeError> {
    let data = data.strip_prefix(UTF8_BOM).unwrap_or(data);
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_reader(data);

    let headers = reader.headers()?.clone();
    let name_column = find_column(&headers, &NAME_HEADERS).ok_or_else(|| {
        warn!("Roster CSV has no name column, headers: {:?}", headers);
        EnvelopeError::MissingNameColumn
    })?;
    let fee_column = find_column(&headers, &FEE_HEADERS);
    let note_column = find_column(&headers, &NOTE_HEADERS);

    if fee_column.is_none() {
        info!("Roster CSV has no fee column, the default fee applies to everyone");
    }

    let mut members = Vec::new();
    for (index, result) in reader.records().enumerate() {
        let record = result?;
        let row = index + 1;

        let name = record.get(name_column).unwrap_or("");
        if name.trim().is_empty() {
            return Err(EnvelopeError::BlankName { row });
        }

        let fee = match fee_column.and_then(|column| record.get(column)) {
            Some(value) => parse_fee(value).ok_or_else(|| EnvelopeError::InvalidFee {
                row,
                value: value.to_string(),
            })?,
            None => None,
        };

        let note = note_column
            .and_then(|column| record.get(column))
            .unwrap_or("");

        members.push(MemberRecord {
            name: name.to_string(),
            fee,
            note: note.to_string(),
        });
    }

    info!("Imported {} member(s) from roster CSV", members.len());
    Ok(members)
}

/// Serializes the roster with a fixed `name, fee, note` column order.
pub fn export_roster(members: &[MemberRecord]) -> Result<Vec<u8>, EnvelopeError> {
    let mut buffer = UTF8_BOM.to_vec();
    {
        let mut writer = csv::Writer::from_writer(&mut buffer);
        writer.write_record(EXPORT_HEADER)?;
        for member in members {
            let fee = member.fee.map(|fee| fee.to_string()).unwrap_or_default();
            writer.write_record([member.name.as_str(), fee.as_str(), member.note.as_str()])?;
        }
        writer.flush()?;
    }

    info!(
        "Exported {} member(s), size: {} bytes",
        members.len(),
        buffer.len()
    );
    Ok(buffer)
}

fn find_column(headers: &StringRecord, names: &[&str]) -> Option<usize> {
    headers
        .iter()
        .position(|header| names.iter().any(|name| header.eq_ignore_ascii_case(name)))
}

/// Blank is `Some(None)`, garbage or a non-positive amount is `None`.
fn parse_fee(value: &str) -> Option<Option<u32>> {
    let cleaned: String = value
        .trim()
        .trim_start_matches(['¥', '￥'])
        .chars()
        .filter(|c| *c != ',')
        .collect();

    if cleaned.is_empty() {
        return Some(None);
    }

    let fee = match cleaned.parse::<u32>() {
        Ok(fee) => fee,
        // spreadsheets tend to turn integer columns into "3000.0"
        Err(_) => {
            let float = cleaned.parse::<f64>().ok()?;
            if float.fract() != 0.0 || float < 0.0 || float > f64::from(u32::MAX) {
                return None;
            }
            float as u32
        }
    };

    (fee > 0).then_some(Some(fee))
}
