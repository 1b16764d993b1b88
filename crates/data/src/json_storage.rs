use anyhow::{Context, Result};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

pub struct JsonStorage;

impl JsonStorage {
    /// Writes a value as pretty-printed JSON followed by a newline.
    ///
    /// # Errors
    /// Returns error if the file cannot be created or serialization fails
    pub fn write<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
        let file = File::create(path)
            .with_context(|| format!("Failed to create JSON file: {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, value)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }
}
