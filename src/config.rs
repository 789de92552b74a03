use std::{
    env,
    fs,
    path::{
        Path,
        PathBuf,
    },
    time::Duration,
};
use serde::Deserialize;
use log::debug;

use crate::error::ConfigurationError;

pub const DEADLINE_PATH_VAR: &str = "DEADLINE_PATH";
pub const SETTINGS_VAR: &str = "SHOTFARM_SETTINGS";

// site wide settings, every key is optional
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    // root of the per-user scratch area, defaults to ~/.shotfarm/temp
    pub temp_base: Option<PathBuf>,

    pub farm: FarmSettings,

    pub transcode: TranscodeSettings,

    pub publish: PublishSettings,

    pub review: ReviewSiteSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FarmSettings {
    // executable name inside the scheduler install dir, sans extension
    pub command_name: String,

    // unbounded when absent
    pub dispatch_timeout_secs: Option<u64>,

    // pools a submission may target; empty means anything goes
    pub pools: Vec<String>,
}

impl Default for FarmSettings {
    fn default() -> Self {
        FarmSettings {
            command_name: String::from("deadlinecommand"),
            dispatch_timeout_secs: None,
            pools: Vec::new(),
        }
    }
}

impl FarmSettings {
    pub fn dispatch_timeout(&self) -> Option<Duration> {
        self.dispatch_timeout_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TranscodeSettings {
    // a site provided convert script; the bundled one is used otherwise
    pub script_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PublishSettings {
    // interpreter version the farm's Python plugin should use
    pub python_version: String,
}

impl Default for PublishSettings {
    fn default() -> Self {
        PublishSettings {
            python_version: String::from("3.7"),
        }
    }
}

// connection details for the review-tracking site, handed to the farm
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ReviewSiteSettings {
    pub site_url: String,

    pub script_name: String,

    // falls back to SHOTGRID_API_KEY on the farm worker
    pub api_key: Option<String>,

    pub http_proxy: Option<String>,
}

impl Settings {
    pub fn load(path: &Path) -> Result<Settings, ConfigurationError> {
        let raw = fs::read_to_string(path)
            .map_err(|source| ConfigurationError::Read {
                kind: "settings",
                path: path.to_path_buf(),
                source,
            })?;
        toml::from_str(&raw)
            .map_err(|source| ConfigurationError::Parse {
                kind: "settings",
                path: path.to_path_buf(),
                source,
            })
    }

    // explicit path, then $SHOTFARM_SETTINGS, then ~/.shotfarm/settings.toml
    // if it exists, then built-in defaults
    pub fn discover(
        explicit: Option<&Path>,
        environment: &Environment,
    ) -> Result<Settings, ConfigurationError> {
        if let Some(path) = explicit.or(environment.settings_file.as_deref()) {
            return Settings::load(path);
        }
        if let Some(home_dir) = home::home_dir() {
            let path = home_dir.join(".shotfarm").join("settings.toml");
            if path.is_file() {
                return Settings::load(&path);
            }
        }
        debug!("No settings file found, using defaults.");
        Ok(Settings::default())
    }

    pub fn temp_base(&self) -> Result<PathBuf, ConfigurationError> {
        if let Some(base) = &self.temp_base {
            return Ok(base.clone());
        }
        let home_dir = home::home_dir()
            .ok_or(ConfigurationError::NoHomeDir)?;
        Ok(home_dir.join(".shotfarm").join("temp"))
    }
}

// the handful of environment variables we care about, read once
#[derive(Debug, Clone, Default)]
pub struct Environment {
    pub deadline_path: Option<PathBuf>,

    pub user: Option<String>,

    pub app_version: Option<String>,

    pub settings_file: Option<PathBuf>,
}

impl Environment {
    pub fn capture() -> Environment {
        Environment {
            deadline_path: non_empty_var(DEADLINE_PATH_VAR).map(PathBuf::from),
            user: non_empty_var("USERNAME").or_else(|| non_empty_var("USER")),
            app_version: non_empty_var("MAYA_VERSION"),
            settings_file: non_empty_var(SETTINGS_VAR).map(PathBuf::from),
        }
    }

    // <base>/<user>/maya_<version>
    pub fn temp_root(
        &self,
        settings: &Settings,
        fallback_version: &str,
    ) -> Result<PathBuf, ConfigurationError> {
        let user = self.user.as_deref().unwrap_or("unknown");
        let version = self.app_version.as_deref().unwrap_or(fallback_version);
        Ok(settings
            .temp_base()?
            .join(user)
            .join(format!("maya_{version}")))
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .filter(|v| false == v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_defaults_apply_to_missing_keys() {
        let settings: Settings = toml::from_str(
            r#"
            [farm]
            pools = ["anim", "lighting"]
            "#,
        )
        .unwrap();
        assert_eq!(settings.farm.command_name, "deadlinecommand");
        assert_eq!(settings.farm.pools, vec!["anim", "lighting"]);
        assert!(settings.farm.dispatch_timeout().is_none());
        assert_eq!(settings.publish.python_version, "3.7");
        assert!(settings.transcode.script_file.is_none());
    }

    #[test]
    fn settings_read_every_section() {
        let settings: Settings = toml::from_str(
            r#"
            temp_base = "/studio/temp"

            [farm]
            command_name = "dlcmd"
            dispatch_timeout_secs = 30

            [transcode]
            script_file = "/studio/scripts/convert.py"

            [publish]
            python_version = "3.10"

            [review]
            site_url = "https://example.shotgrid.autodesk.com"
            script_name = "farm"
            http_proxy = "proxy:3128"
            "#,
        )
        .unwrap();
        assert_eq!(settings.temp_base().unwrap(), PathBuf::from("/studio/temp"));
        assert_eq!(settings.farm.command_name, "dlcmd");
        assert_eq!(settings.farm.dispatch_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(settings.publish.python_version, "3.10");
        assert_eq!(settings.review.script_name, "farm");
        assert_eq!(settings.review.http_proxy.as_deref(), Some("proxy:3128"));
        assert!(settings.review.api_key.is_none());
    }

    #[test]
    fn temp_root_is_namespaced_by_user_and_version() {
        let settings = Settings {
            temp_base: Some(PathBuf::from("/studio/temp")),
            ..Default::default()
        };
        let environment = Environment {
            user: Some("jdoe".into()),
            app_version: Some("2022".into()),
            ..Default::default()
        };
        assert_eq!(
            environment.temp_root(&settings, "2020").unwrap(),
            PathBuf::from("/studio/temp/jdoe/maya_2022")
        );
    }

    #[test]
    fn temp_root_falls_back_to_job_version() {
        let settings = Settings {
            temp_base: Some(PathBuf::from("/tmp/base")),
            ..Default::default()
        };
        let environment = Environment::default();
        assert_eq!(
            environment.temp_root(&settings, "2020").unwrap(),
            PathBuf::from("/tmp/base/unknown/maya_2020")
        );
    }

    #[test]
    fn unreadable_settings_file_is_a_configuration_error() {
        let err = Settings::load(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, ConfigurationError::Read { kind: "settings", .. }));
    }
}
