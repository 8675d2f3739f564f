/// SPIFFS-backed persistent log store.
///
/// The audit log is one append-only file. Each flush opens it, writes the
/// pending lines and closes it again when the sink drops.
use std::ffi::CString;
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Write};

use esp_idf_svc::sys::{esp, esp_vfs_spiffs_conf_t, esp_vfs_spiffs_register};
use presencehound::board;
use presencehound::log_buffer::{LogSink, LogStore, StoreError};

/// Register the SPIFFS partition under [`board::STORAGE_BASE_PATH`].
pub fn mount_spiffs() -> anyhow::Result<()> {
    let base_path = CString::new(board::STORAGE_BASE_PATH)?;
    let conf = esp_vfs_spiffs_conf_t {
        base_path: base_path.as_ptr(),
        partition_label: std::ptr::null(),
        max_files: 4,
        format_if_mount_failed: true,
    };
    // Safety: `conf` and the path it points to outlive the call; the VFS
    // layer copies the base path.
    esp!(unsafe { esp_vfs_spiffs_register(&conf) })?;
    log::info!("SPIFFS mounted at {}", board::STORAGE_BASE_PATH);
    Ok(())
}

pub struct FileLogStore {
    path: &'static str,
}

impl FileLogStore {
    pub fn new(path: &'static str) -> Self {
        Self { path }
    }
}

pub struct FileSink(File);

impl LogSink for FileSink {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), StoreError> {
        self.0.write_all(bytes).map_err(|_| StoreError::Write)?;
        self.0.flush().map_err(|_| StoreError::Write)
    }
}

impl LogStore for FileLogStore {
    type Sink<'a> = FileSink;

    fn open_append(&mut self) -> Result<FileSink, StoreError> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path)
            .map(FileSink)
            .map_err(|e| {
                log::debug!("Cannot open {} for append: {}", self.path, e);
                StoreError::Unavailable
            })
    }

    fn read_to(&mut self, out: &mut String) -> Result<(), StoreError> {
        match File::open(self.path) {
            Ok(mut file) => file
                .read_to_string(out)
                .map(|_| ())
                .map_err(|_| StoreError::Read),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(_) => Err(StoreError::Read),
        }
    }
}
