//! Tabular read/write keyed by fully-qualified table name.

use std::{
    fs::{self, File},
    io::{BufReader, BufWriter, Write},
    path::PathBuf,
};

use anyhow::{bail, Context, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;

pub trait TableStore {
    fn read_rows(&self, fqn: &str) -> Result<Vec<Value>>;
    fn table_exists(&self, fqn: &str) -> bool;
    /// Replace the whole table in one step.
    fn replace_rows(&self, fqn: &str, rows: &[Value]) -> Result<()>;
}

/// Read and deserialise every row; extra columns are left to the row type.
pub fn read_table<T, S>(store: &S, fqn: &str) -> Result<Vec<T>>
where
    T: DeserializeOwned,
    S: TableStore + ?Sized,
{
    store
        .read_rows(fqn)?
        .into_iter()
        .enumerate()
        .map(|(i, row)| {
            serde_json::from_value(row)
                .with_context(|| format!("{fqn}: row {i} has the wrong shape"))
        })
        .collect()
}

/// `catalog.schema.table` with any backtick quoting removed.
pub fn normalize_fqn(fqn: &str) -> String {
    fqn.replace('`', "")
}

/// One pretty-printed JSON array per table, named after the normalised FQN.
pub struct JsonDirStore {
    root: PathBuf,
}

impl JsonDirStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).with_context(|| format!("creating {}", root.display()))?;
        Ok(Self { root })
    }

    fn path_for(&self, fqn: &str) -> PathBuf {
        self.root.join(format!("{}.json", normalize_fqn(fqn)))
    }
}

impl TableStore for JsonDirStore {
    fn read_rows(&self, fqn: &str) -> Result<Vec<Value>> {
        let path = self.path_for(fqn);
        if !path.exists() {
            bail!("table {fqn} not found ({})", path.display());
        }
        let file = File::open(&path).with_context(|| format!("reading {}", path.display()))?;
        let data: Value = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("parsing {}", path.display()))?;
        match data {
            Value::Array(rows) => Ok(rows),
            _ => bail!("table file {} is not a JSON array", path.display()),
        }
    }

    fn table_exists(&self, fqn: &str) -> bool {
        self.path_for(fqn).exists()
    }

    fn replace_rows(&self, fqn: &str, rows: &[Value]) -> Result<()> {
        let path = self.path_for(fqn);
        let tmp = path.with_extension("json.tmp");
        {
            let file = File::create(&tmp).with_context(|| format!("creating {}", tmp.display()))?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, rows)
                .with_context(|| format!("writing {}", tmp.display()))?;
            writer.flush()?;
        }
        fs::rename(&tmp, &path).with_context(|| format!("replacing {}", path.display()))
    }
}
