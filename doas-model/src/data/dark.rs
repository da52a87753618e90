//!
//! Dark/offset correction policy (spec §3 "Dark settings", §4.4).
//!

/// How the dark spectrum to subtract from a measurement should be obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DarkSpecOption {
    MeasuredInScan,
    ModelIfMissing,
    ModelAlways,
    UserSupplied,
}

/// How the offset or dark-current component of a modelled dark should be obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ComponentOption {
    MeasuredInScan,
    UserSupplied,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DarkSettings {
    pub dark_spec_option: DarkSpecOption,
    pub dark_current_option: ComponentOption,
    pub offset_option: ComponentOption,
    pub user_dark_path: Option<String>,
    pub user_offset_path: Option<String>,
    pub user_dark_current_path: Option<String>,
}

impl DarkSettings {
    pub fn measured_in_scan() -> Self {
        Self {
            dark_spec_option: DarkSpecOption::MeasuredInScan,
            dark_current_option: ComponentOption::MeasuredInScan,
            offset_option: ComponentOption::MeasuredInScan,
            user_dark_path: None,
            user_offset_path: None,
            user_dark_current_path: None,
        }
    }
}
