//! Writing finished frames to disk.
//!
//! Two conventional artifacts per frame: `ble_image.bin` holds the raw
//! pixels and `hex_data.txt` holds the same pixels as comma-joined hex. Each
//! new frame overwrites the previous pair.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::{Error, Result};
use crate::image::CompletedImage;
use crate::utils::parse_hex_csv;

/// File name of the binary artifact.
pub const BIN_FILE_NAME: &str = "ble_image.bin";
/// File name of the hex text artifact.
pub const HEX_FILE_NAME: &str = "hex_data.txt";

/// Writes and reads the export artifacts in one directory.
#[derive(Debug, Clone)]
pub struct ImageExporter {
    dir: PathBuf,
}

impl ImageExporter {
    /// Export into `dir`, creating it if needed on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Target directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the binary artifact.
    pub fn bin_path(&self) -> PathBuf {
        self.dir.join(BIN_FILE_NAME)
    }

    /// Path of the hex text artifact.
    pub fn hex_path(&self) -> PathBuf {
        self.dir.join(HEX_FILE_NAME)
    }

    /// Write both artifacts for `image`.
    pub fn export(&self, image: &CompletedImage) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        fs::write(self.bin_path(), image.as_bytes())?;
        fs::write(self.hex_path(), image.to_hex_csv())?;

        info!(
            "Image saved to {} and {}",
            self.bin_path().display(),
            self.hex_path().display()
        );

        Ok(())
    }

    /// Load pixels from the binary artifact, sized to `expected`.
    pub fn read_bin(&self, expected: usize) -> Result<Vec<u8>> {
        let data = fs::read(self.bin_path())?;
        Ok(fit(data, expected))
    }

    /// Load pixels from the hex artifact, sized to `expected`.
    pub fn read_hex(&self, expected: usize) -> Result<Vec<u8>> {
        let text = fs::read_to_string(self.hex_path())?;
        let data = parse_hex_csv(&text).map_err(|token| Error::InvalidData {
            context: format!("bad hex token {:?} in {}", token, HEX_FILE_NAME),
        })?;
        Ok(fit(data, expected))
    }
}

/// Pad short data with zeros and cut long data, like viewers expect.
fn fit(mut data: Vec<u8>, expected: usize) -> Vec<u8> {
    data.resize(expected, 0);
    data
}
