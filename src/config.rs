use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub global: Global,
    #[serde(default)]
    pub paths: Paths,
    #[serde(default)]
    pub roster: Roster,
    #[serde(default)]
    pub raster: Raster,
    #[serde(default)]
    pub output: Output,
    #[serde(default)]
    pub logging: Logging,
    #[serde(default)]
    pub debug: Debug,
    #[serde(default)]
    pub security: Security,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config: {}", path.display()))?;
        let cfg: Config = toml::from_str(&raw).with_context(|| "parsing TOML")?;
        Ok(cfg)
    }

    /// A stable, normalization-friendly string for hashing.
    pub fn normalized_for_hash(&self) -> String {
        toml::to_string(self).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Global {
    pub resume: bool,
    pub print_summary: bool,
    pub show_progress: bool,
}
impl Default for Global {
    fn default() -> Self {
        Self {
            resume: false,
            print_summary: true,
            show_progress: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paths {
    pub out_dir: String,
    pub mappings_file: String,
}
impl Default for Paths {
    fn default() -> Self {
        Self {
            out_dir: "output".into(),
            mappings_file: "field_mappings.json".into(),
        }
    }
}

/// Names of the roster columns that drive output placement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Roster {
    /// Groups outputs into one folder per person.
    pub person_column: String,
    /// Names the output file of each row.
    pub document_column: String,
    pub delimiter: char,
}
impl Default for Roster {
    fn default() -> Self {
        Self {
            person_column: "Candidate_Name".into(),
            document_column: "CS_Name".into(),
            delimiter: ',',
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Raster {
    pub pdftoppm_exe: String,
    /// 0 disables the timeout.
    pub timeout_seconds: u64,
    pub jpeg_quality: u8,
}
impl Default for Raster {
    fn default() -> Self {
        Self {
            pdftoppm_exe: "pdftoppm".into(),
            timeout_seconds: 120,
            jpeg_quality: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Output {
    pub write_report_json: bool,
    pub report_filename: String,
    pub write_index_json: bool,
}
impl Default for Output {
    fn default() -> Self {
        Self {
            write_report_json: true,
            report_filename: "report.json".into(),
            write_index_json: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Logging {
    pub level: String,
    pub json: bool,
    pub write_to_file: bool,
    pub file_path: String,
}
impl Default for Logging {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
            write_to_file: true,
            file_path: "".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Debug {
    pub keep_rasterizer_stderr: bool,
    pub dump_effective_config: bool,
}
impl Default for Debug {
    fn default() -> Self {
        Self {
            keep_rasterizer_stderr: true,
            dump_effective_config: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Security {
    pub reject_url_inputs: bool,
}
impl Default for Security {
    fn default() -> Self {
        Self {
            reject_url_inputs: true,
        }
    }
}
