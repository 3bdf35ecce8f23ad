use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

/// An A1-style cell address: base-26 column letters, 1-based row. Stored
/// zero-based internally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellAddress {
    pub col: usize,
    pub row: usize,
}

impl std::str::FromStr for CellAddress {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let token = s.trim().to_ascii_uppercase();
        let split = token
            .find(|c: char| c.is_ascii_digit())
            .ok_or_else(|| anyhow!("cell address has no row digits: {s}"))?;
        let (letters, digits) = token.split_at(split);

        if letters.is_empty() || !letters.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(anyhow!("invalid column letters in cell address: {s}"));
        }
        let mut col: usize = 0;
        for c in letters.chars() {
            col = col * 26 + (c as usize - 'A' as usize + 1);
        }

        let row: usize = digits
            .parse()
            .with_context(|| format!("invalid row in cell address: {s}"))?;
        if row == 0 {
            return Err(anyhow!("cell rows start at 1: {s}"));
        }

        Ok(Self {
            col: col - 1,
            row: row - 1,
        })
    }
}

impl std::fmt::Display for CellAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut col = self.col + 1;
        let mut letters = Vec::new();
        while col > 0 {
            let rem = (col - 1) % 26;
            letters.push((b'A' + rem as u8) as char);
            col = (col - 1) / 26;
        }
        letters.reverse();
        let letters: String = letters.into_iter().collect();
        write!(f, "{}{}", letters, self.row + 1)
    }
}

/// One source-cell → destination-cell copy, carrying the export field name.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldMapping {
    pub field_name: String,
    pub source_cell: String,
    pub destination_cell: String,

    #[serde(rename = "useInT2020", default = "default_true")]
    pub use_in_t2020: bool,
}

fn default_true() -> bool {
    true
}

/// The persisted wizard output: where the sheets live and which cells map
/// where. Wire names are camelCase for compatibility with existing files.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingConfig {
    pub source_file_path: PathBuf,
    pub destination_file_path: PathBuf,
    pub source_sheet: String,
    pub destination_sheet: String,
    pub mappings: Vec<FieldMapping>,
}

impl MappingConfig {
    #[tracing::instrument(skip(path))]
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read mapping config {}", path.display()))?;
        let config: Self = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse mapping config {}", path.display()))?;
        config.validate()?;
        debug!(mappings = config.mappings.len(), "loaded mapping config");
        Ok(config)
    }

    #[tracing::instrument(skip(self, path))]
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        self.validate()?;
        let serialized = serde_json::to_string_pretty(self)?;
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let mut temp = NamedTempFile::new_in(dir)?;
        writeln!(temp, "{serialized}")?;
        temp.flush()?;
        temp.persist(path)
            .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;
        Ok(())
    }

    /// Field names must be unique and non-empty, and every cell address
    /// must parse.
    pub fn validate(&self) -> anyhow::Result<()> {
        let mut seen = HashSet::new();
        for mapping in &self.mappings {
            let name = mapping.field_name.trim();
            if name.is_empty() {
                return Err(anyhow!("mapping with empty field name"));
            }
            if !seen.insert(name.to_string()) {
                return Err(anyhow!("duplicate field name in mapping: {name}"));
            }
            mapping
                .source_cell
                .parse::<CellAddress>()
                .with_context(|| format!("field {name}: bad source cell"))?;
            mapping
                .destination_cell
                .parse::<CellAddress>()
                .with_context(|| format!("field {name}: bad destination cell"))?;
        }
        Ok(())
    }
}

/// A sheet snapshot as a growable grid of strings, read from and written
/// back to CSV.
#[derive(Debug, Clone, Default)]
pub struct Sheet {
    rows: Vec<Vec<String>>,
}

impl Sheet {
    #[tracing::instrument(skip(path))]
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read sheet {}", path.display()))?;
        let rows = raw.lines().map(parse_csv_line).collect();
        Ok(Self { rows })
    }

    /// Missing destination files start as an empty grid.
    pub fn load_or_empty(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            debug!(file = %path.display(), "sheet does not exist yet; starting empty");
            Ok(Self::default())
        }
    }

    #[tracing::instrument(skip(self, path))]
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let mut temp = NamedTempFile::new_in(dir)?;
        for row in &self.rows {
            let line: Vec<String> = row.iter().map(|cell| escape_csv_cell(cell)).collect();
            writeln!(temp, "{}", line.join(","))?;
        }
        temp.flush()?;
        temp.persist(path)
            .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;
        Ok(())
    }

    #[must_use]
    pub fn get(&self, addr: CellAddress) -> Option<&str> {
        self.rows
            .get(addr.row)
            .and_then(|row| row.get(addr.col))
            .map(String::as_str)
    }

    /// Setting beyond the current bounds grows the grid with empty cells.
    pub fn set(&mut self, addr: CellAddress, value: impl Into<String>) {
        if self.rows.len() <= addr.row {
            self.rows.resize_with(addr.row + 1, Vec::new);
        }
        let row = &mut self.rows[addr.row];
        if row.len() <= addr.col {
            row.resize(addr.col + 1, String::new());
        }
        row[addr.col] = value.into();
    }
}

fn parse_csv_line(line: &str) -> Vec<String> {
    let mut cells = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    current.push('"');
                } else {
                    in_quotes = false;
                }
            }
            '"' if current.is_empty() => in_quotes = true,
            ',' if !in_quotes => {
                cells.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }
    cells.push(current);
    cells
}

fn escape_csv_cell(cell: &str) -> String {
    if cell.contains(',') || cell.contains('"') || cell.contains('\n') {
        format!("\"{}\"", cell.replace('"', "\"\""))
    } else {
        cell.to_string()
    }
}

/// Copies every mapped cell from the source sheet into the destination
/// sheet and writes the destination back. Missing source cells copy as
/// empty. Returns the number of cells transferred.
#[tracing::instrument(skip(config))]
pub fn run_transfer(config: &MappingConfig) -> anyhow::Result<usize> {
    let source = Sheet::load(&config.source_file_path)?;
    let mut destination = Sheet::load_or_empty(&config.destination_file_path)?;

    let mut copied = 0;
    for mapping in &config.mappings {
        let from: CellAddress = mapping.source_cell.parse()?;
        let to: CellAddress = mapping.destination_cell.parse()?;

        let value = match source.get(from) {
            Some(value) => value.to_string(),
            None => {
                warn!(
                    field = %mapping.field_name,
                    cell = %mapping.source_cell,
                    sheet = %config.source_sheet,
                    "source cell missing; copying empty value"
                );
                String::new()
            }
        };
        destination.set(to, value);
        copied += 1;
    }

    destination.save(&config.destination_file_path)?;
    info!(
        copied,
        destination = %config.destination_file_path.display(),
        sheet = %config.destination_sheet,
        "transfer complete"
    );
    Ok(copied)
}

/// Ordered (field, value) pairs from the source sheet. With no explicit
/// selection, only mappings flagged for export are included; an explicit
/// selection picks and orders fields itself and may reach any mapping.
#[tracing::instrument(skip(config, selected))]
pub fn extract_fields(
    config: &MappingConfig,
    selected: Option<&[String]>,
) -> anyhow::Result<Vec<(String, String)>> {
    let source = Sheet::load(&config.source_file_path)?;

    let value_of = |mapping: &FieldMapping| -> anyhow::Result<String> {
        let addr: CellAddress = mapping.source_cell.parse()?;
        Ok(source.get(addr).unwrap_or_default().to_string())
    };

    match selected {
        None => config
            .mappings
            .iter()
            .filter(|mapping| mapping.use_in_t2020)
            .map(|mapping| Ok((mapping.field_name.clone(), value_of(mapping)?)))
            .collect(),
        Some(names) => names
            .iter()
            .map(|name| {
                let mapping = config
                    .mappings
                    .iter()
                    .find(|mapping| mapping.field_name == *name)
                    .ok_or_else(|| anyhow!("unknown field: {name}"))?;
                Ok((mapping.field_name.clone(), value_of(mapping)?))
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::{CellAddress, FieldMapping, MappingConfig, Sheet, extract_fields, run_transfer};

    fn addr(s: &str) -> CellAddress {
        s.parse().expect("valid address")
    }

    #[test]
    fn cell_addresses_parse_and_print() {
        assert_eq!(addr("A1"), CellAddress { col: 0, row: 0 });
        assert_eq!(addr("B4"), CellAddress { col: 1, row: 3 });
        assert_eq!(addr("Z10"), CellAddress { col: 25, row: 9 });
        assert_eq!(addr("AA10"), CellAddress { col: 26, row: 9 });
        assert_eq!(addr("b4"), addr("B4"));

        assert_eq!(addr("AA10").to_string(), "AA10");
        assert_eq!(addr("B4").to_string(), "B4");

        assert!("4".parse::<CellAddress>().is_err());
        assert!("B0".parse::<CellAddress>().is_err());
        assert!("B".parse::<CellAddress>().is_err());
        assert!("4B".parse::<CellAddress>().is_err());
    }

    #[test]
    fn sheet_set_grows_the_grid() {
        let mut sheet = Sheet::default();
        assert_eq!(sheet.get(addr("C3")), None);
        sheet.set(addr("C3"), "x");
        assert_eq!(sheet.get(addr("C3")), Some("x"));
        assert_eq!(sheet.get(addr("A1")), Some(""));
        assert_eq!(sheet.get(addr("D3")), None);
    }

    #[test]
    fn csv_quoting_survives_a_roundtrip() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("sheet.csv");

        let mut sheet = Sheet::default();
        sheet.set(addr("A1"), "plain");
        sheet.set(addr("B1"), "with,comma");
        sheet.set(addr("A2"), "say \"hi\"");
        sheet.save(&path).expect("save");

        let loaded = Sheet::load(&path).expect("load");
        assert_eq!(loaded.get(addr("B1")), Some("with,comma"));
        assert_eq!(loaded.get(addr("A2")), Some("say \"hi\""));
    }

    fn sample_config(dir: &std::path::Path) -> MappingConfig {
        MappingConfig {
            source_file_path: dir.join("source.csv"),
            destination_file_path: dir.join("dest.csv"),
            source_sheet: "Input".to_string(),
            destination_sheet: "Layout".to_string(),
            mappings: vec![
                FieldMapping {
                    field_name: "customer".to_string(),
                    source_cell: "A1".to_string(),
                    destination_cell: "B2".to_string(),
                    use_in_t2020: true,
                },
                FieldMapping {
                    field_name: "total".to_string(),
                    source_cell: "B1".to_string(),
                    destination_cell: "C2".to_string(),
                    use_in_t2020: false,
                },
            ],
        }
    }

    #[test]
    fn validation_rejects_duplicates_and_bad_cells() {
        let temp = tempdir().expect("tempdir");
        let mut config = sample_config(temp.path());
        assert!(config.validate().is_ok());

        config.mappings[1].field_name = "customer".to_string();
        assert!(config.validate().is_err());

        config.mappings[1].field_name = "total".to_string();
        config.mappings[1].source_cell = "nope".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn config_roundtrips_with_wire_names() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("dataflow.json");
        let config = sample_config(temp.path());
        config.save(&path).expect("save");

        let raw = fs::read_to_string(&path).expect("read");
        assert!(raw.contains("\"fieldName\""));
        assert!(raw.contains("\"useInT2020\""));
        assert!(raw.contains("\"sourceFilePath\""));

        let loaded = MappingConfig::load(&path).expect("load");
        assert_eq!(loaded.mappings.len(), 2);
        assert!(!loaded.mappings[1].use_in_t2020);
    }

    #[test]
    fn transfer_copies_mapped_cells() {
        let temp = tempdir().expect("tempdir");
        let config = sample_config(temp.path());
        fs::write(&config.source_file_path, "Acme,120.50\n").expect("write source");

        let copied = run_transfer(&config).expect("transfer");
        assert_eq!(copied, 2);

        let dest = Sheet::load(&config.destination_file_path).expect("load dest");
        assert_eq!(dest.get(addr("B2")), Some("Acme"));
        assert_eq!(dest.get(addr("C2")), Some("120.50"));
    }

    #[test]
    fn extract_honors_flags_and_explicit_selection() {
        let temp = tempdir().expect("tempdir");
        let config = sample_config(temp.path());
        fs::write(&config.source_file_path, "Acme,120.50\n").expect("write source");

        // Default selection excludes the flag-off mapping.
        let fields = extract_fields(&config, None).expect("extract");
        assert_eq!(fields, vec![("customer".to_string(), "Acme".to_string())]);

        // An explicit selection reorders and reaches flag-off fields.
        let picked = vec!["total".to_string(), "customer".to_string()];
        let fields = extract_fields(&config, Some(&picked)).expect("extract");
        assert_eq!(fields[0], ("total".to_string(), "120.50".to_string()));

        let unknown = vec!["absent".to_string()];
        assert!(extract_fields(&config, Some(&unknown)).is_err());
    }
}
