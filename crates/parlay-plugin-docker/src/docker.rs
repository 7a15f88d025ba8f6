//! `docker/image` and `docker/tag` actions

use async_trait::async_trait;
use parlay_core::{Action, UPLOAD};
use parlay_plugins::{ActionPlugin, PluginError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

pub const IMAGE: &str = "docker/image";
pub const TAG: &str = "docker/tag";

const INFO: &str = "This plugin is used to manage docker automation";

/// Directory on both ends that image archives pass through
const STAGING_DIR: &str = "/tmp";

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct Image {
    /// Images saved on the orchestration host and shipped to the target
    #[serde(rename = "imageName", skip_serializing_if = "Vec::is_empty")]
    names: Vec<String>,
    /// Image archives already on the orchestration host
    #[serde(rename = "imageFile", skip_serializing_if = "Vec::is_empty")]
    files: Vec<String>,
    #[serde(rename = "localSudo")]
    local_sudo: bool,
    #[serde(rename = "remoteSudo")]
    remote_sudo: bool,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct Tag {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    source_names: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    target_names: Vec<String>,
    /// Replace the tag of each source
    #[serde(rename = "imageTag", skip_serializing_if = "String::is_empty")]
    target_tag: String,
    /// Replace the repository of each source
    #[serde(rename = "imageRepo", skip_serializing_if = "String::is_empty")]
    target_repo: String,
}

fn sudo(enabled: bool) -> String {
    if enabled {
        "root".to_string()
    } else {
        String::new()
    }
}

fn sanitize(value: &str) -> String {
    value.replace(['/', ':'], "_")
}

fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

impl Image {
    fn actions(&self, host: &str) -> Vec<Action> {
        let mut actions = Vec::new();

        // Each host saves and moves its own archive
        for name in &self.names {
            let archive = format!("{}/{}-{}.tar", STAGING_DIR, sanitize(name), sanitize(host));
            let mut save = Action::command(
                format!("Save image {}", name),
                format!("docker save {} -o {}", name, archive),
            );
            save.command_local = true;
            save.command_sudo = sudo(self.local_sudo);
            actions.push(save);
            actions.extend(self.ship(host, &archive, &archive, true));
        }

        for file in &self.files {
            let remote = format!("{}/{}", STAGING_DIR, file_name(file));
            actions.extend(self.ship(host, file, &remote, false));
        }
        actions
    }

    /// Upload `local` to `remote`, load it, and clean up the remote copy
    fn ship(&self, host: &str, local: &str, remote: &str, move_local: bool) -> Vec<Action> {
        let upload = Action {
            name: format!("Upload {} to {}", file_name(local), host),
            action_type: UPLOAD.to_string(),
            source: local.to_string(),
            destination: remote.to_string(),
            file_move: move_local,
            ..Default::default()
        };

        let mut load = Action::command(
            format!("Load {}", file_name(remote)),
            format!("docker load -i {}", remote),
        );
        load.command_sudo = sudo(self.remote_sudo);

        let mut cleanup = Action::command(
            format!("Remove {}", remote),
            format!("rm -f {}", remote),
        );
        cleanup.ignore_failure = true;

        vec![upload, load, cleanup]
    }
}

impl Tag {
    fn target_for(&self, index: usize, source: &str) -> Result<String> {
        if let Some(target) = self.target_names.get(index) {
            return Ok(target.clone());
        }
        if self.target_tag.is_empty() && self.target_repo.is_empty() {
            return Err(PluginError::Plugin(format!(
                "No target name for [{}] and neither imageTag nor imageRepo is set",
                source
            )));
        }

        let (repo, image) = match source.rsplit_once('/') {
            Some((repo, image)) => (Some(repo), image),
            None => (None, source),
        };
        let (image, tag) = match image.split_once(':') {
            Some((image, tag)) => (image, Some(tag)),
            None => (image, None),
        };

        let repo = if self.target_repo.is_empty() {
            repo
        } else {
            Some(self.target_repo.as_str())
        };
        let tag = if self.target_tag.is_empty() {
            tag
        } else {
            Some(self.target_tag.as_str())
        };

        let mut target = match repo {
            Some(repo) => format!("{}/{}", repo, image),
            None => image.to_string(),
        };
        if let Some(tag) = tag {
            target.push(':');
            target.push_str(tag);
        }
        Ok(target)
    }

    fn actions(&self) -> Result<Vec<Action>> {
        if self.source_names.is_empty() {
            return Err(PluginError::Plugin("sourceNames is empty".to_string()));
        }
        self.source_names
            .iter()
            .enumerate()
            .map(|(i, source)| {
                let target = self.target_for(i, source)?;
                Ok(Action::command(
                    format!("Tag {} as {}", source, target),
                    format!("docker tag {} {}", source, target),
                ))
            })
            .collect()
    }
}

fn payload<T: serde::de::DeserializeOwned>(raw: &Value) -> Result<T> {
    if raw.is_null() {
        return Err(PluginError::Plugin("no plugin payload supplied".to_string()));
    }
    Ok(serde_json::from_value(raw.clone())?)
}

#[derive(Debug, Default)]
pub struct DockerPlugin;

#[async_trait]
impl ActionPlugin for DockerPlugin {
    fn source(&self) -> &str {
        "docker"
    }

    async fn action_list(&self) -> Result<Vec<String>> {
        Ok(vec![IMAGE.to_string(), TAG.to_string()])
    }

    async fn action_details(&self) -> Result<Vec<String>> {
        Ok(vec![
            "This action automates the management of docker images".to_string(),
            "This action manages the tagging of docker images".to_string(),
        ])
    }

    async fn plugin_info(&self) -> Result<String> {
        Ok(INFO.to_string())
    }

    async fn usage(&self, action: &str) -> Result<Value> {
        let example = match action {
            IMAGE => serde_json::to_value(Image {
                names: vec!["gcr.io/my_image:latest".into()],
                files: vec!["./my_other_image.tar.gz".into()],
                ..Default::default()
            })?,
            TAG => serde_json::to_value(Tag {
                source_names: vec!["gcr.io/my_image:latest".into()],
                target_names: vec!["internal_repo/my_image:1.0".into()],
                ..Default::default()
            })?,
            other => {
                return Err(PluginError::Plugin(format!(
                    "Action [{}] could not be found",
                    other
                )))
            }
        };
        Ok(example)
    }

    async fn exec(&self, action: &str, host: &str, raw: &Value) -> Result<Vec<Action>> {
        debug!(action, host, "Generating docker actions");
        match action {
            IMAGE => {
                let image: Image = payload(raw)?;
                if image.names.is_empty() && image.files.is_empty() {
                    return Err(PluginError::Plugin(
                        "Neither imageName nor imageFile is set".to_string(),
                    ));
                }
                Ok(image.actions(host))
            }
            TAG => payload::<Tag>(raw)?.actions(),
            other => Err(PluginError::NoHandler(other.to_string())),
        }
    }
}
