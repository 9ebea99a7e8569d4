//! Ingestion - one-shot CSV loading and label clean-up for the query database
//!
//! Not part of the conversational path. Every CSV file becomes one table whose
//! column types are inferred from the data, and the `nature` codes of
//! `etat_travaux` are then rewritten to readable labels.

use crate::db::DataGateway;
use crate::error::{ChatError, Result};
use regex::Regex;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Table whose `nature` column carries bill-type codes.
pub const NATURE_TABLE: &str = "etat_travaux";

/// Code or CamelCase label -> display label.
pub const NATURE_LABELS: &[(&str, &str)] = &[
    ("PL", "Projet De Loi"),
    ("PPL", "Proposition De Loi"),
    ("PRGD", "Projet De Reglement Grand Ducal"),
    ("PRREG", "Proposition De Revision Reglement CHD"),
    ("PRCONS", "Proposition De Revision Constitution"),
    ("DO", "Debat Orientation"),
    ("RAC", "Rapports Activites"),
    ("CSI", "Comptes Du Service Interieur"),
    ("ProjetDeLoi", "Projet De Loi"),
    ("PropositionDeLoi", "Proposition De Loi"),
    ("ProjetDeReglementGrandDucal", "Projet De Reglement Grand Ducal"),
    ("PropositionDeRevisionReglementCHD", "Proposition De Revision Reglement CHD"),
    ("PropositionDeRevisionConstitution", "Proposition De Revision Constitution"),
    ("DebatOrientation", "Debat Orientation"),
    ("RapportsActivites", "Rapports Activites"),
    ("ComptesDuServiceInterieur", "Comptes Du Service Interieur"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Real,
    Text,
}

impl ColumnType {
    fn sql(self) -> &'static str {
        match self {
            ColumnType::Integer => "INTEGER",
            ColumnType::Real => "REAL",
            ColumnType::Text => "TEXT",
        }
    }

    /// Narrowest type that still holds `field`.
    fn widen(self, field: &str) -> Self {
        match self {
            ColumnType::Integer if field.parse::<i64>().is_ok() => ColumnType::Integer,
            ColumnType::Integer | ColumnType::Real if field.parse::<f64>().is_ok() => ColumnType::Real,
            _ => ColumnType::Text,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedTable {
    pub source: PathBuf,
    pub table: String,
    pub rows: usize,
    pub columns: Vec<(String, ColumnType)>,
}

fn leading_number() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d+-").expect("valid pattern"))
}

fn invalid_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^a-zA-Z0-9_]").expect("valid pattern"))
}

/// `"001-Etat travaux"` -> `"Etat_travaux"`. `None` when nothing usable is left.
pub fn table_name_for(file_stem: &str) -> Option<String> {
    let stripped = leading_number().replace(file_stem, "");
    let cleaned = invalid_chars().replace_all(&stripped, "_").into_owned();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// All `*.csv` files below `dir`, sorted by path.
pub fn find_csv_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        for entry in std::fs::read_dir(&current)? {
            let path = entry?.path();
            if path.is_dir() {
                pending.push(path);
            } else if path
                .extension()
                .map(|ext| ext.eq_ignore_ascii_case("csv"))
                .unwrap_or(false)
            {
                found.push(path);
            }
        }
    }
    found.sort();
    Ok(found)
}

/// Loads one CSV file into `table`, replacing any previous table of that name.
pub fn load_csv_file(conn: &mut Connection, path: &Path, table: &str) -> Result<LoadedTable> {
    let mut reader = csv::ReaderBuilder::new().flexible(false).from_path(path)?;
    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .enumerate()
        .map(|(idx, h)| {
            let h = h.trim();
            if h.is_empty() {
                format!("column{}", idx)
            } else {
                h.to_string()
            }
        })
        .collect();
    if headers.is_empty() {
        return Err(ChatError::InvalidConfig(format!("{} has no header row", path.display())));
    }

    let records = reader.records().collect::<std::result::Result<Vec<_>, _>>()?;

    let mut types = vec![ColumnType::Integer; headers.len()];
    for record in &records {
        for (idx, field) in record.iter().enumerate().take(headers.len()) {
            if !field.is_empty() {
                types[idx] = types[idx].widen(field);
            }
        }
    }
    // Columns with no value at all carry no type evidence.
    for (idx, ty) in types.iter_mut().enumerate() {
        if records.iter().all(|r| r.get(idx).map(str::is_empty).unwrap_or(true)) {
            *ty = ColumnType::Text;
        }
    }

    let column_defs: Vec<String> = headers
        .iter()
        .zip(&types)
        .map(|(name, ty)| format!("{} {}", quote_ident(name), ty.sql()))
        .collect();
    let placeholders = vec!["?"; headers.len()].join(", ");

    let tx = conn.transaction()?;
    tx.execute(&format!("DROP TABLE IF EXISTS {}", quote_ident(table)), [])?;
    tx.execute(
        &format!("CREATE TABLE {} ({})", quote_ident(table), column_defs.join(", ")),
        [],
    )?;
    {
        let mut insert = tx.prepare(&format!(
            "INSERT INTO {} VALUES ({})",
            quote_ident(table),
            placeholders
        ))?;
        for record in &records {
            let values = types.iter().enumerate().map(|(idx, ty)| {
                let field = record.get(idx).unwrap_or_default();
                to_sql_value(field, *ty)
            });
            insert.execute(params_from_iter(values))?;
        }
    }
    tx.commit()?;

    info!(source = %path.display(), table, rows = records.len(), "loaded CSV");
    Ok(LoadedTable {
        source: path.to_path_buf(),
        table: table.to_string(),
        rows: records.len(),
        columns: headers.into_iter().zip(types).collect(),
    })
}

fn to_sql_value(field: &str, ty: ColumnType) -> SqlValue {
    if field.is_empty() {
        return SqlValue::Null;
    }
    match ty {
        ColumnType::Integer => field.parse().map(SqlValue::Integer).unwrap_or(SqlValue::Null),
        ColumnType::Real => field.parse().map(SqlValue::Real).unwrap_or(SqlValue::Null),
        ColumnType::Text => SqlValue::Text(field.to_string()),
    }
}

/// Loads every CSV below `dir` into its own table.
pub fn load_csv_dir(conn: &mut Connection, dir: &Path) -> Result<Vec<LoadedTable>> {
    let files = find_csv_files(dir)?;
    if files.is_empty() {
        warn!(dir = %dir.display(), "no CSV files found");
    }

    let mut loaded = Vec::new();
    for path in files {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let Some(table) = table_name_for(&stem) else {
            warn!(source = %path.display(), "skipping CSV with no usable table name");
            continue;
        };
        loaded.push(load_csv_file(conn, &path, &table)?);
    }
    Ok(loaded)
}

/// Single UPDATE mapping every known `nature` code to its label; other values are kept.
pub fn nature_update_statement(table: &str) -> String {
    let arms: Vec<String> = NATURE_LABELS
        .iter()
        .map(|(from, to)| format!("WHEN {} THEN {}", quote_literal(from), quote_literal(to)))
        .collect();
    format!(
        "UPDATE {} SET nature = CASE nature {} ELSE nature END",
        quote_ident(table),
        arms.join(" ")
    )
}

/// Rewrites `etat_travaux.nature` through [`NATURE_LABELS`]. Returns rows touched.
pub fn normalize_nature_labels(gateway: &dyn DataGateway) -> Result<usize> {
    let affected = gateway.execute(&nature_update_statement(NATURE_TABLE))?;
    info!(table = NATURE_TABLE, rows = affected, "normalized nature labels");
    Ok(affected)
}
