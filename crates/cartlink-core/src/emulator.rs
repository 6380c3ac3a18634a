use std::collections::BTreeMap;
use std::io;
use std::time::SystemTime;

use thiserror::Error;

/// A ROM image ready to be handed to the emulator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RomImage {
    pub name: String,
    pub data: Vec<u8>,
}

impl RomImage {
    pub fn new(name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    pub size: u64,
    pub mtime: SystemTime,
}

#[derive(Debug, Error)]
pub enum EmulatorError {
    #[error("file not found: {0}")]
    NotFound(String),

    #[error("emulator rejected {name}: {reason}")]
    Rejected { name: String, reason: String },

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Capabilities the cartridge workflow needs from an emulator frontend.
///
/// Paths are relative to the emulator's virtual filesystem root.
pub trait EmulatorCore {
    fn load_rom(&mut self, rom: &RomImage) -> Result<(), EmulatorError>;
    fn load_save(&mut self, data: &[u8], name: &str) -> Result<(), EmulatorError>;
    fn list_files(&self) -> Result<Vec<String>, EmulatorError>;
    fn read_file(&self, path: &str) -> Result<Vec<u8>, EmulatorError>;
    fn write_file(&mut self, path: &str, data: &[u8]) -> Result<(), EmulatorError>;
    fn stat(&self, path: &str) -> Result<FileStat, EmulatorError>;
}

/// In-memory emulator filesystem, useful for headless runs.
#[derive(Debug, Default)]
pub struct MemoryCore {
    files: BTreeMap<String, (Vec<u8>, SystemTime)>,
    pub loaded_rom: Option<String>,
    pub loaded_save: Option<String>,
}

impl MemoryCore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EmulatorCore for MemoryCore {
    fn load_rom(&mut self, rom: &RomImage) -> Result<(), EmulatorError> {
        if rom.data.is_empty() {
            return Err(EmulatorError::Rejected {
                name: rom.name.clone(),
                reason: "empty image".into(),
            });
        }
        self.write_file(&rom.name, &rom.data)?;
        self.loaded_rom = Some(rom.name.clone());
        Ok(())
    }

    fn load_save(&mut self, data: &[u8], name: &str) -> Result<(), EmulatorError> {
        self.write_file(name, data)?;
        self.loaded_save = Some(name.to_string());
        Ok(())
    }

    fn list_files(&self) -> Result<Vec<String>, EmulatorError> {
        Ok(self.files.keys().cloned().collect())
    }

    fn read_file(&self, path: &str) -> Result<Vec<u8>, EmulatorError> {
        self.files
            .get(path)
            .map(|(data, _)| data.clone())
            .ok_or_else(|| EmulatorError::NotFound(path.to_string()))
    }

    fn write_file(&mut self, path: &str, data: &[u8]) -> Result<(), EmulatorError> {
        self.files
            .insert(path.to_string(), (data.to_vec(), SystemTime::now()));
        Ok(())
    }

    fn stat(&self, path: &str) -> Result<FileStat, EmulatorError> {
        self.files
            .get(path)
            .map(|(data, mtime)| FileStat {
                size: data.len() as u64,
                mtime: *mtime,
            })
            .ok_or_else(|| EmulatorError::NotFound(path.to_string()))
    }
}
