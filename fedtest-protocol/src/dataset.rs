//! Comma-separated dataset loader.
//!
//! A header row, then one record per sample. Quoted fields follow the usual
//! CSV rules and surrounding whitespace is trimmed. Identifier cells stay
//! strings; feature and label cells must parse as `f64`.

use csv::{ReaderBuilder, StringRecord, Trim};
use fedtest_types::Table;
use std::io::Read;
use std::path::Path;

use crate::contract::{Dataset, DatasetLoader};
use crate::input::CsvDesc;
use crate::ProtocolError;

/// Loader for header-first comma-separated files.
#[derive(Debug, Clone, Copy, Default)]
pub struct CsvLoader;

impl DatasetLoader for CsvLoader {
    fn load(&self, path: &Path, desc: &CsvDesc, max_rows: usize) -> Result<Dataset, ProtocolError> {
        let file = std::fs::File::open(path).map_err(|e| ProtocolError::Dataset {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        parse(file, desc, max_rows).map_err(|reason| ProtocolError::Dataset {
            path: path.to_path_buf(),
            reason,
        })
    }
}

fn parse<R: Read>(source: R, desc: &CsvDesc, max_rows: usize) -> Result<Dataset, String> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(Trim::All)
        .flexible(true)
        .from_reader(source);

    let header: StringRecord = reader.headers().map_err(|e| e.to_string())?.clone();
    if header.is_empty() {
        return Err("missing header row".to_string());
    }

    let position = |name: &str| {
        header
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| format!("no column named {:?}", name))
    };
    let id_idx = position(desc.id_column.as_str())?;
    let label_idx = desc.label_column.as_deref().map(position).transpose()?;

    let feature_names: Vec<String> = match &desc.features {
        Some(names) => names.clone(),
        None => header
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != id_idx && Some(*i) != label_idx)
            .map(|(_, h)| h.to_string())
            .collect(),
    };
    let feature_idx = feature_names
        .iter()
        .map(|name| position(name.as_str()))
        .collect::<Result<Vec<_>, _>>()?;

    let mut ids = Vec::new();
    let mut rows = Vec::new();
    let mut label = label_idx.map(|_| Vec::new());

    for record in reader.records().take(max_rows) {
        let record = record.map_err(|e| e.to_string())?;
        let line_no = record.position().map(|p| p.line()).unwrap_or(0);
        if record.len() != header.len() {
            return Err(format!(
                "line {} has {} fields, header has {}",
                line_no,
                record.len(),
                header.len()
            ));
        }
        let cell = |idx: usize| record.get(idx).unwrap_or_default();
        let number = |idx: usize| {
            cell(idx).parse::<f64>().map_err(|_| {
                format!(
                    "line {}: {:?} in column {} is not a number",
                    line_no,
                    cell(idx),
                    header.get(idx).unwrap_or_default()
                )
            })
        };

        ids.push(cell(id_idx).to_string());
        rows.push(feature_idx.iter().map(|&i| number(i)).collect::<Result<Vec<_>, _>>()?);
        if let (Some(values), Some(idx)) = (label.as_mut(), label_idx) {
            values.push(number(idx)?);
        }
    }

    let features = Table::new(ids, feature_names, rows).map_err(|e| e.to_string())?;
    Ok(Dataset { features, label })
}
