use crate::error::Error;
use crate::file_proc::hash::HashAlgorithm;
use crate::store::retry::RetryPolicy;
use crate::store::rocks::{DEFAULT_FILES_TABLE, DEFAULT_LOCATIONS_TABLE};
use crate::volume::directory::{DeviceDirectory, MetadataDirectory, StaticDirectory, PROC_MOUNTS};
use config::{Config, Environment, File as ConfigFile};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
pub struct VolumeEntry {
    pub mount_point: String,
    pub volume_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeviceEntry {
    pub device: String,
    pub volume_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Directories to index; overlapping entries are folded.
    pub source_dirs: Vec<String>,
    pub hash_algorithm: String,
    /// Worker threads; 0 means one per CPU.
    pub concurrency: usize,
    pub catalog_path: String,
    pub files_table: String,
    pub locations_table: String,
    pub instance_id: String,
    /// Static mount point -> volume table, used when `devices` is empty.
    pub volumes: Vec<VolumeEntry>,
    /// device -> volume attachments, joined with `mounts_file`.
    pub devices: Vec<DeviceEntry>,
    pub mounts_file: String,
    pub retry: RetryPolicy,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            source_dirs: vec!["/var/www/html/".to_string()],
            hash_algorithm: HashAlgorithm::default().name().to_string(),
            concurrency: 0,
            catalog_path: "hashfs.db".to_string(),
            files_table: DEFAULT_FILES_TABLE.to_string(),
            locations_table: DEFAULT_LOCATIONS_TABLE.to_string(),
            instance_id: "i-debughost01".to_string(),
            volumes: vec![
                VolumeEntry {
                    mount_point: "/home".to_string(),
                    volume_id: "vol-home123".to_string(),
                },
                VolumeEntry {
                    mount_point: "/".to_string(),
                    volume_id: "vol-root123".to_string(),
                },
            ],
            devices: Vec::new(),
            mounts_file: PROC_MOUNTS.to_string(),
            retry: RetryPolicy::default(),
        }
    }
}

impl AppConfig {
    pub fn algorithm(&self) -> Result<HashAlgorithm, Error> {
        self.hash_algorithm.parse()
    }

    pub fn worker_count(&self) -> usize {
        if self.concurrency > 0 {
            self.concurrency
        } else {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        }
    }

    /// Source of host identity and volume attachments for this host.
    pub fn metadata_directory(&self) -> Box<dyn MetadataDirectory> {
        if self.devices.is_empty() {
            Box::new(StaticDirectory::new(
                self.instance_id.clone(),
                self.volumes
                    .iter()
                    .map(|v| (PathBuf::from(&v.mount_point), v.volume_id.clone()))
                    .collect(),
            ))
        } else {
            Box::new(
                DeviceDirectory::new(
                    self.instance_id.clone(),
                    self.devices
                        .iter()
                        .map(|d| (d.device.clone(), d.volume_id.clone()))
                        .collect(),
                )
                .with_mounts_file(&self.mounts_file),
            )
        }
    }
}

/// Values given on the command line; they win over files and environment.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub source_dirs: Vec<String>,
    pub hash_algorithm: Option<String>,
    pub catalog_path: Option<String>,
    pub concurrency: Option<usize>,
}

/// Layered load: defaults, `Config.toml` (or `config_file`), `HASHFS_*`
/// environment variables, then command line overrides. The hash algorithm is
/// validated here so a bad value stops the run before any file is read.
pub fn load_configuration(
    config_file: Option<&Path>,
    overrides: &Overrides,
) -> Result<AppConfig, Error> {
    let file_source = match config_file {
        Some(path) => ConfigFile::from(path).required(true),
        None => ConfigFile::with_name("Config").required(false),
    };

    let mut builder = Config::builder().add_source(file_source).add_source(
        Environment::with_prefix("HASHFS")
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("source_dirs")
            .try_parsing(true),
    );

    if !overrides.source_dirs.is_empty() {
        builder = builder.set_override("source_dirs", overrides.source_dirs.clone())?;
    }
    builder = builder
        .set_override_option("hash_algorithm", overrides.hash_algorithm.clone())?
        .set_override_option("catalog_path", overrides.catalog_path.clone())?
        .set_override_option("concurrency", overrides.concurrency.map(|n| n as i64))?;

    let config = builder.build()?.try_deserialize::<AppConfig>()?;
    config.algorithm()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults_follow_debug_host() {
        let config = AppConfig::default();
        assert_eq!(config.algorithm().unwrap(), HashAlgorithm::Sha256);
        assert_eq!(config.source_dirs, vec!["/var/www/html/"]);
        assert_eq!(config.files_table, "HashFS-Files");
        let mounts = config.metadata_directory().volume_mounts().unwrap();
        assert_eq!(mounts.get(Path::new("/home")).map(String::as_str), Some("vol-home123"));
    }

    #[test]
    fn test_load_from_file_with_overrides() {
        let file = write_config(
            r#"
source_dirs = ["/srv/www", "/srv/www/cache"]
hash_algorithm = "md5"
concurrency = 3
instance_id = "i-0123"

[[volumes]]
mount_point = "/srv"
volume_id = "vol-srv"

[retry]
max_attempts = 7
"#,
        );
        let overrides = Overrides {
            hash_algorithm: Some("sha512".into()),
            ..Default::default()
        };
        let config = load_configuration(Some(file.path()), &overrides).unwrap();
        assert_eq!(config.source_dirs, vec!["/srv/www", "/srv/www/cache"]);
        assert_eq!(config.algorithm().unwrap(), HashAlgorithm::Sha512);
        assert_eq!(config.worker_count(), 3);
        assert_eq!(config.instance_id, "i-0123");
        assert_eq!(config.volumes.len(), 1);
        assert_eq!(config.retry.max_attempts, 7);
        assert_eq!(config.retry.base_delay_ms, RetryPolicy::default().base_delay_ms);
    }

    #[test]
    fn test_unknown_algorithm_fails_fast() {
        let file = write_config("hash_algorithm = \"crc32\"\n");
        let err = load_configuration(Some(file.path()), &Overrides::default()).unwrap_err();
        assert!(matches!(err, Error::UnknownAlgorithm(_)));
    }
}
