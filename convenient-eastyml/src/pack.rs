//! `pack` section: extra artifacts copied into the release next to the
//! fixed firmware output sets

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Prefix in an artifact path that stands for the application image
/// directory of a (possibly sysbuild) build
pub const APP_DIR_PLACEHOLDER: &str = "$APP_DIR/";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct PackSpec {
    /// Artifacts released for every subject, relative to the build directory
    #[serde(default)]
    pub artifacts: Vec<String>,
    #[serde(default)]
    pub build_configurations: Vec<BuildConfiguration>,
    /// Project files released once, independent of any build
    #[serde(default)]
    pub extra: Vec<String>,
}

/// Per-subject override of the common artifact list
///
/// `name` is either a subject name or `<subject>.<build-type>`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct BuildConfiguration {
    pub name: String,
    /// Added to the common artifacts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifacts: Option<Vec<String>>,
    /// Replaces the common artifacts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overwrite_artifacts: Option<Vec<String>>,
}

impl PackSpec {
    /// Effective artifact list for a subject and its build-type
    ///
    /// The most specific build configuration wins: `<subject>.<build-type>`,
    /// then `<subject>`, then the common list.
    pub fn artifacts_for(&self, subject: &str, build_type: Option<&str>) -> Vec<String> {
        let qualified = build_type.map(|bt| format!("{}.{}", subject, bt));
        let config = qualified
            .as_deref()
            .and_then(|name| self.configuration(name))
            .or_else(|| self.configuration(subject));

        match config {
            Some(BuildConfiguration {
                overwrite_artifacts: Some(list),
                ..
            }) => list.clone(),
            Some(BuildConfiguration {
                artifacts: Some(list),
                ..
            }) => self.artifacts.iter().chain(list).cloned().collect(),
            _ => self.artifacts.clone(),
        }
    }

    fn configuration(&self, name: &str) -> Option<&BuildConfiguration> {
        self.build_configurations.iter().find(|bc| bc.name == name)
    }

    /// Returns the offending key path and a message on failure
    pub(crate) fn validate(&self) -> Result<(), (String, String)> {
        if let Some(dup) = duplicate(&self.artifacts) {
            return Err(("pack.artifacts".into(), format!("`{}` is listed more than once", dup)));
        }

        let mut names = HashSet::new();
        for (i, bc) in self.build_configurations.iter().enumerate() {
            let key = format!("pack.build_configurations[{}]", i);
            if !names.insert(bc.name.as_str()) {
                return Err((
                    format!("{}.name", key),
                    format!("duplicated build configuration `{}`", bc.name),
                ));
            }

            match (&bc.artifacts, &bc.overwrite_artifacts) {
                (Some(_), Some(_)) => {
                    return Err((
                        key,
                        "artifacts and overwrite_artifacts are mutually exclusive".into(),
                    ));
                }
                (None, None) => {
                    return Err((key, "one of artifacts or overwrite_artifacts is required".into()));
                }
                (Some(list), None) => {
                    let combined: Vec<String> = self.artifacts.iter().chain(list).cloned().collect();
                    if let Some(dup) = duplicate(&combined) {
                        return Err((
                            format!("{}.artifacts", key),
                            format!("`{}` is already packed", dup),
                        ));
                    }
                }
                (None, Some(list)) => {
                    if let Some(dup) = duplicate(list) {
                        return Err((
                            format!("{}.overwrite_artifacts", key),
                            format!("`{}` is listed more than once", dup),
                        ));
                    }
                }
            }
        }
        Ok(())
    }
}

fn duplicate(items: &[String]) -> Option<&str> {
    let mut seen = HashSet::new();
    items
        .iter()
        .map(String::as_str)
        .find(|item| !seen.insert(*item))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pack() -> PackSpec {
        serde_yaml::from_str(
            r#"
artifacts:
  - $APP_DIR/zephyr/zephyr.hex
  - dfu_application.zip
build_configurations:
  - name: app
    overwrite_artifacts:
      - merged.hex
  - name: app.rtt
    artifacts:
      - rtt.log
  - name: other
    artifacts:
      - other.bin
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_artifacts_for_falls_back_to_common() {
        let pack = pack();
        assert_eq!(
            pack.artifacts_for("unlisted", None),
            vec!["$APP_DIR/zephyr/zephyr.hex", "dfu_application.zip"]
        );
    }

    #[test]
    fn test_overwrite_and_extend() {
        let pack = pack();
        assert_eq!(pack.artifacts_for("app", Some("debug")), vec!["merged.hex"]);
        assert_eq!(pack.artifacts_for("other", None).last().unwrap(), "other.bin");
        assert_eq!(pack.artifacts_for("other", None).len(), 3);
    }

    #[test]
    fn test_build_type_specific_configuration_wins() {
        let pack = pack();
        let artifacts = pack.artifacts_for("app", Some("rtt"));
        assert_eq!(artifacts.len(), 3);
        assert_eq!(artifacts[2], "rtt.log");
    }

    #[test]
    fn test_validate_rejects_both_lists() {
        let mut pack = pack();
        pack.build_configurations[0].artifacts = Some(vec!["x".into()]);
        let (key, _) = pack.validate().unwrap_err();
        assert_eq!(key, "pack.build_configurations[0]");
    }

    #[test]
    fn test_validate_rejects_missing_lists() {
        let mut pack = pack();
        pack.build_configurations[0].overwrite_artifacts = None;
        assert!(pack.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_artifact_already_common() {
        let mut pack = pack();
        pack.build_configurations[2].artifacts = Some(vec!["dfu_application.zip".into()]);
        let (key, _) = pack.validate().unwrap_err();
        assert_eq!(key, "pack.build_configurations[2].artifacts");
    }

    #[test]
    fn test_validate_accepts_well_formed_pack() {
        assert!(pack().validate().is_ok());
    }
}
