use crate::assets::AssetType;
use crate::error::{AssetError, Result};
use crate::ulid::Ulid;
use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Immutable description of one asset
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetMetadata {
    pub id: Ulid,
    pub name: String,
    pub asset_type: AssetType,
    /// Source file, already joined to the asset root
    pub path: PathBuf,
    /// Byte offset of the asset inside `path`
    #[serde(default)]
    pub offset: u32,
}

/// Identity to metadata table, filled once at start-up
#[derive(Debug, Default)]
pub struct MetadataBank {
    entries: AHashMap<Ulid, Arc<AssetMetadata>>,
}

impl MetadataBank {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register metadata. The first entry for an id wins; later ones are
    /// logged and discarded.
    pub fn insert(&mut self, metadata: AssetMetadata) -> bool {
        match self.entries.entry(metadata.id) {
            std::collections::hash_map::Entry::Occupied(_) => {
                tracing::warn!(
                    "ULID {} is present multiple times in the metadata bank. Only the first asset will be registered",
                    metadata.id
                );
                false
            }
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(Arc::new(metadata));
                true
            }
        }
    }

    pub fn get(&self, id: Ulid) -> Option<&Arc<AssetMetadata>> {
        self.entries.get(&id)
    }

    pub fn contains(&self, id: Ulid) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<AssetMetadata>> {
        self.entries.values()
    }
}

/// Populates a [`MetadataBank`] from an asset root
pub trait BankImporter {
    fn import(&self, root: &Path, bank: &mut MetadataBank) -> Result<()>;
}

impl<F> BankImporter for F
where
    F: Fn(&Path, &mut MetadataBank) -> Result<()>,
{
    fn import(&self, root: &Path, bank: &mut MetadataBank) -> Result<()> {
        self(root, bank)
    }
}

/// Reads `metadata.csv` from the asset root.
///
/// Columns are `id,type,name,path[,offset]` after a header line. Rows that
/// fail to parse are logged and skipped.
#[derive(Clone, Debug)]
pub struct CsvBankImporter {
    file_name: String,
}

impl CsvBankImporter {
    pub fn new() -> Self {
        Self::with_file_name("metadata.csv")
    }

    pub fn with_file_name(file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
        }
    }

    /// Parse table contents, returning the number of rows registered
    pub fn parse(&self, root: &Path, contents: &str, bank: &mut MetadataBank) -> usize {
        let mut registered = 0;
        // first line is the header
        for line in contents.split('\n').skip(1) {
            if line.is_empty() || line.starts_with('\r') {
                continue;
            }
            let line = line.strip_suffix('\r').unwrap_or(line);
            match parse_row(line, root) {
                Ok(metadata) => {
                    if bank.insert(metadata) {
                        registered += 1;
                    }
                }
                Err(e) => tracing::error!("{e}"),
            }
        }
        registered
    }
}

impl Default for CsvBankImporter {
    fn default() -> Self {
        Self::new()
    }
}

impl BankImporter for CsvBankImporter {
    fn import(&self, root: &Path, bank: &mut MetadataBank) -> Result<()> {
        let path = root.join(&self.file_name);
        tracing::info!("Loading project assets metadata from {}", root.display());
        let contents = std::fs::read_to_string(&path).map_err(|e| {
            tracing::error!("Failed to load {}: {e}", path.display());
            AssetError::Io(e)
        })?;
        let registered = self.parse(root, &contents, bank);
        tracing::debug!("Registered {registered} assets from {}", path.display());
        Ok(())
    }
}

/// Splits one CSV line into fields, honouring double quotes
struct FieldReader<'a> {
    rest: &'a str,
    line: &'a str,
}

impl<'a> FieldReader<'a> {
    fn new(line: &'a str) -> Self {
        Self { rest: line, line }
    }

    fn next_field(&mut self) -> Result<&'a str> {
        if self.rest.is_empty() {
            return Ok("");
        }
        if let Some(quoted) = self.rest.strip_prefix('"') {
            let Some(end) = quoted.find('"') else {
                return Err(self.malformed());
            };
            let value = &quoted[..end];
            let after = &quoted[end + 1..];
            self.rest = if after.is_empty() {
                after
            } else if let Some(next) = after.strip_prefix(',') {
                next
            } else {
                return Err(self.malformed());
            };
            return Ok(value);
        }
        match self.rest.find(',') {
            Some(end) => {
                let value = &self.rest[..end];
                self.rest = &self.rest[end + 1..];
                Ok(value)
            }
            None => Ok(std::mem::take(&mut self.rest)),
        }
    }

    fn malformed(&mut self) -> AssetError {
        self.rest = "";
        AssetError::MetadataParse(format!("CSV sequence is malformed: {}", self.line))
    }
}

fn required<'a>(value: &'a str, what: &str) -> Result<&'a str> {
    if value.is_empty() {
        Err(AssetError::MetadataParse(format!("missing asset {what}")))
    } else {
        Ok(value)
    }
}

fn parse_row(line: &str, root: &Path) -> Result<AssetMetadata> {
    let mut fields = FieldReader::new(line);

    let value = required(fields.next_field()?, "ULID")?;
    let id = Ulid::from_str_lossy(value);
    if id.is_nil() {
        return Err(AssetError::MetadataParse(format!("invalid ULID {value}")));
    }

    let value = required(fields.next_field()?, "type")?;
    let asset_type = AssetType::from_name(value)
        .ok_or_else(|| AssetError::MetadataParse(format!("invalid type {value}")))?;

    let name = required(fields.next_field()?, "name")?.to_string();
    let path = root.join(required(fields.next_field()?, "path")?);

    let offset = match fields.next_field()? {
        "" => 0,
        value => value
            .trim()
            .parse()
            .map_err(|_| AssetError::MetadataParse(format!("invalid offset {value}")))?,
    };

    Ok(AssetMetadata {
        id,
        name,
        asset_type,
        path,
        offset,
    })
}
