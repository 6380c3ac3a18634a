use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use cartlink_core::emulator::{EmulatorCore, EmulatorError, FileStat, RomImage};
use log::{debug, info};

/// ROM library kept in a plain directory.
///
/// "Loading" writes the image to the directory and remembers its name, so the
/// files are ready for whichever emulator is pointed at the directory.
#[derive(Debug)]
pub struct LibraryDir {
    root: PathBuf,
    pub loaded_rom: Option<String>,
    pub loaded_save: Option<String>,
}

impl LibraryDir {
    pub fn open(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            loaded_rom: None,
            loaded_save: None,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_of(&self, name: &str) -> Result<PathBuf, EmulatorError> {
        let plain = !name.is_empty()
            && name != "."
            && name != ".."
            && !name.contains(['/', '\\']);
        if !plain {
            return Err(EmulatorError::Rejected {
                name: name.to_string(),
                reason: "not a plain file name".into(),
            });
        }
        Ok(self.root.join(name))
    }
}

fn not_found(name: &str, e: io::Error) -> EmulatorError {
    if e.kind() == io::ErrorKind::NotFound {
        EmulatorError::NotFound(name.to_string())
    } else {
        e.into()
    }
}

impl EmulatorCore for LibraryDir {
    fn load_rom(&mut self, rom: &RomImage) -> Result<(), EmulatorError> {
        if rom.data.is_empty() {
            return Err(EmulatorError::Rejected {
                name: rom.name.clone(),
                reason: "empty image".into(),
            });
        }
        let path = self.path_of(&rom.name)?;
        if fs::read(&path).ok().as_deref() != Some(rom.data.as_slice()) {
            fs::write(&path, &rom.data)?;
        }
        info!("Library: ROM ready at {}", path.display());
        self.loaded_rom = Some(rom.name.clone());
        Ok(())
    }

    fn load_save(&mut self, data: &[u8], name: &str) -> Result<(), EmulatorError> {
        self.write_file(name, data)?;
        self.loaded_save = Some(name.to_string());
        Ok(())
    }

    fn list_files(&self) -> Result<Vec<String>, EmulatorError> {
        let mut names = Vec::new();
        for dir_entry in fs::read_dir(&self.root)? {
            let dir_entry = dir_entry?;
            if dir_entry.file_type()?.is_file() {
                if let Some(name) = dir_entry.file_name().to_str() {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    fn read_file(&self, path: &str) -> Result<Vec<u8>, EmulatorError> {
        fs::read(self.path_of(path)?).map_err(|e| not_found(path, e))
    }

    fn write_file(&mut self, path: &str, data: &[u8]) -> Result<(), EmulatorError> {
        let full = self.path_of(path)?;
        debug!("Library: writing {} bytes to {}", data.len(), full.display());
        fs::write(full, data)?;
        Ok(())
    }

    fn stat(&self, path: &str) -> Result<FileStat, EmulatorError> {
        let meta = fs::metadata(self.path_of(path)?).map_err(|e| not_found(path, e))?;
        Ok(FileStat {
            size: meta.len(),
            mtime: meta.modified()?,
        })
    }
}
