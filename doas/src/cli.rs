//!
//! Command-line overrides (spec §6 "CLI surface (minimal core)"), parsed with
//! `clap` derive the same way `nexrad-inspector`'s `main.rs` does. Argument parsing
//! itself is an "external collaborator" per spec.md §1, but the override-merge
//! behaviour it feeds (S6) is in scope, so every value here is `Option` and only
//! present fields are applied over the processing-XML configuration.
//!

use clap::Parser;

/// Options recognised by the command-line processor; any value present here
/// overrides the corresponding processing-XML value (spec §6).
#[derive(Parser, Debug, Default)]
#[command(name = "doas", about = "NOVAC scanning-DOAS post-processing driver")]
pub struct Cli {
    /// Path to the Setup configuration XML.
    #[arg(long = "SetupFile")]
    pub setup_file: Option<String>,

    /// Path to the Evaluation configuration XML.
    #[arg(long = "EvaluationFile")]
    pub evaluation_file: Option<String>,

    /// Path to the Processing configuration XML.
    #[arg(long = "ProcessingFile")]
    pub processing_file: Option<String>,

    #[arg(long = "FromDate")]
    pub from_date: Option<String>,

    #[arg(long = "ToDate")]
    pub to_date: Option<String>,

    /// Volcano name, simplified name, or Smithsonian number.
    #[arg(long = "Volcano")]
    pub volcano: Option<String>,

    #[arg(long = "Workdir")]
    pub workdir: Option<String>,

    #[arg(long = "outputdirectory")]
    pub output_directory: Option<String>,

    #[arg(long = "tempdirectory")]
    pub temp_directory: Option<String>,

    #[arg(long = "WindFieldFile")]
    pub wind_field_file: Option<String>,

    #[arg(long = "MaxThreadNum")]
    pub max_thread_num: Option<usize>,

    #[arg(long = "IncludeSubDirs_Local")]
    pub include_sub_dirs_local: Option<bool>,

    #[arg(long = "IncludeSubDirs_FTP")]
    pub include_sub_dirs_ftp: Option<bool>,

    #[arg(long = "FTPDirectory")]
    pub ftp_directory: Option<String>,

    #[arg(long = "FTPUsername")]
    pub ftp_username: Option<String>,

    #[arg(long = "FTPPassword")]
    pub ftp_password: Option<String>,

    #[arg(long = "UploadResults")]
    pub upload_results: Option<bool>,

    /// Processing mode, as the integer code used by the processing XML.
    #[arg(long = "mode")]
    pub mode: Option<u8>,

    #[arg(long = "molecule")]
    pub molecule: Option<String>,
}
