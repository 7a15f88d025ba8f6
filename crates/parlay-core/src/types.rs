//! TreasureMap document model
//!
//! Documents are decoded flat: every field is optional and unknown fields are
//! ignored so newer documents keep loading. [`Action::kind`] then projects the
//! flat record onto the closed [`ActionKind`] variant that the engine dispatches on.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::error::{ActionError, Error, Result};

/// Action type identifiers handled without a plugin
pub const COMMAND: &str = "command";
pub const PACKAGE: &str = "pkg";
pub const UPLOAD: &str = "upload";
pub const DOWNLOAD: &str = "download";
pub const KEY: &str = "key";

/// TreasureMap - X marks the spot
///
/// Root automation document: an ordered list of deployments.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreasureMap {
    pub deployments: Vec<Deployment>,
}

impl TreasureMap {
    /// Parse a document as YAML, falling back to JSON.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        match serde_yaml::from_slice::<TreasureMap>(bytes) {
            Ok(map) => Ok(map),
            Err(yaml_err) => serde_json::from_slice::<TreasureMap>(bytes).map_err(|json_err| {
                Error::parse(format!("yaml: {}; json: {}", yaml_err, json_err))
            }),
        }
    }

    /// Read and parse a document from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = std::fs::read(path.as_ref())?;
        Self::from_slice(&bytes)
    }

    /// Find a deployment by name
    pub fn deployment(&self, name: &str) -> Option<&Deployment> {
        self.deployments.iter().find(|d| d.name == name)
    }
}

/// A named set of hosts and the actions applied to each of them
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Deployment {
    pub name: String,
    pub hosts: Vec<String>,
    pub parallel: bool,
    pub parallel_sessions: i64,
    pub actions: Vec<Action>,
}

impl Deployment {
    /// Number of hosts that may be mid-execution at the same time.
    pub fn worker_count(&self) -> usize {
        if !self.parallel || self.parallel_sessions <= 0 {
            1
        } else {
            self.parallel_sessions as usize
        }
    }
}

/// One declarative unit of work
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Action {
    pub name: String,
    #[serde(rename = "type")]
    pub action_type: String,
    /// Seconds, 0 disables the bound
    pub timeout: u64,
    #[serde(alias = "ignoreFail", skip_serializing_if = "is_false")]
    pub ignore_failure: bool,

    // File based operations
    #[serde(skip_serializing_if = "String::is_empty")]
    pub source: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub destination: String,
    #[serde(skip_serializing_if = "is_false")]
    pub file_move: bool,

    // Package manager operations
    #[serde(skip_serializing_if = "String::is_empty")]
    pub package_manager: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub package_operation: String,
    #[serde(
        deserialize_with = "string_or_list",
        skip_serializing_if = "String::is_empty"
    )]
    pub packages: String,

    // Command operations
    #[serde(skip_serializing_if = "String::is_empty")]
    pub command: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub commands: Vec<String>,
    #[serde(skip_serializing_if = "is_false")]
    pub command_local: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub command_save_file: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub command_save_as_key: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub command_sudo: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub command_pipe_file: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub command_pipe_cmd: String,

    // Key operations
    #[serde(skip_serializing_if = "String::is_empty")]
    pub key_file: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub key_name: String,

    /// Opaque payload for plugin-served action types
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plugin: Option<Value>,
}

impl Action {
    /// Shorthand for a single remote command
    pub fn command(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            action_type: COMMAND.to_string(),
            command: command.into(),
            ..Default::default()
        }
    }

    /// Human label used for log entries, falls back to the action type
    pub fn label(&self) -> &str {
        if self.name.is_empty() {
            &self.action_type
        } else {
            &self.name
        }
    }

    /// Project this record onto its active variant.
    pub fn kind(&self) -> std::result::Result<ActionKind<'_>, ActionError> {
        match self.action_type.as_str() {
            "" => Err(ActionError::EmptyType),
            COMMAND => self.command_spec().map(ActionKind::Command),
            PACKAGE => Ok(ActionKind::Package(PackageSpec {
                manager: self.package_manager.parse()?,
                operation: self.package_operation.parse()?,
                packages: non_empty(&self.packages).ok_or(ActionError::MissingPackages)?,
                sudo: non_empty(&self.command_sudo),
            })),
            UPLOAD => self.transfer(UPLOAD).map(ActionKind::Upload),
            DOWNLOAD => self.transfer(DOWNLOAD).map(ActionKind::Download),
            KEY => Ok(ActionKind::Key(KeySpec {
                name: non_empty(&self.key_name).ok_or(ActionError::MissingKeyName)?,
                file: non_empty(&self.key_file),
                sudo: non_empty(&self.command_sudo),
            })),
            other => Ok(ActionKind::Plugin {
                action_type: other,
                payload: self.plugin.as_ref(),
            }),
        }
    }

    fn command_spec(&self) -> std::result::Result<CommandSpec<'_>, ActionError> {
        // The inline command wins over the list when both are present
        let commands: Vec<&str> = if !self.command.is_empty() {
            vec![self.command.as_str()]
        } else {
            self.commands
                .iter()
                .map(String::as_str)
                .filter(|c| !c.is_empty())
                .collect()
        };
        if commands.is_empty() {
            return Err(ActionError::MissingCommand);
        }

        let stdin = match (non_empty(&self.command_pipe_cmd), non_empty(&self.command_pipe_file)) {
            (Some(cmd), _) => Some(StdinSource::LocalCommand(cmd)),
            (None, Some(file)) => Some(StdinSource::File(file)),
            (None, None) => None,
        };

        Ok(CommandSpec {
            commands,
            sudo: non_empty(&self.command_sudo),
            local: self.command_local,
            save_file: non_empty(&self.command_save_file),
            save_key: non_empty(&self.command_save_as_key),
            stdin,
        })
    }

    fn transfer(&self, kind: &'static str) -> std::result::Result<TransferSpec<'_>, ActionError> {
        match (non_empty(&self.source), non_empty(&self.destination)) {
            (Some(source), Some(destination)) => Ok(TransferSpec {
                source,
                destination,
                file_move: self.file_move,
            }),
            _ => Err(ActionError::MissingTransferPath(kind)),
        }
    }
}

/// Closed set of action shapes, with plugin types as the open fall-through
#[derive(Debug, Clone, PartialEq)]
pub enum ActionKind<'a> {
    Command(CommandSpec<'a>),
    Package(PackageSpec<'a>),
    Upload(TransferSpec<'a>),
    Download(TransferSpec<'a>),
    Key(KeySpec<'a>),
    Plugin {
        action_type: &'a str,
        payload: Option<&'a Value>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommandSpec<'a> {
    /// Commands run in order; a single entry for inline commands
    pub commands: Vec<&'a str>,
    pub sudo: Option<&'a str>,
    pub local: bool,
    pub save_file: Option<&'a str>,
    pub save_key: Option<&'a str>,
    pub stdin: Option<StdinSource<'a>>,
}

/// Where a command's stdin comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StdinSource<'a> {
    /// Output of a command run on the orchestration host
    LocalCommand(&'a str),
    /// Contents of a local file
    File(&'a str),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PackageSpec<'a> {
    pub manager: PackageManager,
    pub operation: PackageOperation,
    pub packages: &'a str,
    pub sudo: Option<&'a str>,
}

impl PackageSpec<'_> {
    /// Render the package manager invocation for this operation
    pub fn to_command(&self) -> String {
        let tool = match self.manager {
            PackageManager::Apt => "DEBIAN_FRONTEND=noninteractive apt-get",
            PackageManager::Yum => "yum",
            PackageManager::Dnf => "dnf",
        };
        let verb = match (self.manager, self.operation) {
            (_, PackageOperation::Install) => "install",
            (_, PackageOperation::Remove) => "remove",
            (PackageManager::Apt, PackageOperation::Update) => "upgrade",
            (_, PackageOperation::Update) => "update",
        };
        format!("{} {} -y {}", tool, verb, self.packages)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransferSpec<'a> {
    pub source: &'a str,
    pub destination: &'a str,
    pub file_move: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct KeySpec<'a> {
    pub name: &'a str,
    pub file: Option<&'a str>,
    pub sudo: Option<&'a str>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageManager {
    Apt,
    Yum,
    Dnf,
}

impl FromStr for PackageManager {
    type Err = ActionError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "apt" => Ok(PackageManager::Apt),
            "yum" => Ok(PackageManager::Yum),
            "dnf" => Ok(PackageManager::Dnf),
            other => Err(ActionError::UnknownPackageManager(other.to_string())),
        }
    }
}

impl fmt::Display for PackageManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PackageManager::Apt => write!(f, "apt"),
            PackageManager::Yum => write!(f, "yum"),
            PackageManager::Dnf => write!(f, "dnf"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageOperation {
    Install,
    Remove,
    Update,
}

impl FromStr for PackageOperation {
    type Err = ActionError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "install" => Ok(PackageOperation::Install),
            "remove" => Ok(PackageOperation::Remove),
            "update" => Ok(PackageOperation::Update),
            other => Err(ActionError::UnknownPackageOperation(other.to_string())),
        }
    }
}

fn non_empty(s: &str) -> Option<&str> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// `packages` may be written as a space separated string or as a list
fn string_or_list<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Packages {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Option::<Packages>::deserialize(deserializer)? {
        Some(Packages::One(s)) => s,
        Some(Packages::Many(list)) => list.join(" "),
        None => String::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_yaml_document() {
        let doc = r#"
deployments:
  - name: Install MySQL
    hosts: ["10.0.0.1", "10.0.0.2"]
    parallel: true
    parallelSessions: 2
    actions:
      - name: uptime
        type: command
        command: uptime
        commandSaveAsKey: up
        ignoreFail: true
"#;
        let map = TreasureMap::from_slice(doc.as_bytes()).unwrap();
        let deployment = map.deployment("Install MySQL").unwrap();
        assert_eq!(deployment.hosts.len(), 2);
        assert_eq!(deployment.worker_count(), 2);
        let action = &deployment.actions[0];
        assert!(action.ignore_failure);
        assert_eq!(action.command_save_as_key, "up");
    }

    #[test]
    fn test_parse_json_document_with_unknown_fields() {
        let doc = json!({
            "deployments": [{
                "name": "d",
                "hosts": ["h1"],
                "futureField": {"nested": true},
                "actions": [{"name": "x", "type": "docker/image", "somethingNew": 1,
                             "plugin": {"imageName": ["a"]}}]
            }]
        });
        let map = TreasureMap::from_slice(doc.to_string().as_bytes()).unwrap();
        let action = &map.deployments[0].actions[0];
        assert_eq!(
            action.kind().unwrap(),
            ActionKind::Plugin {
                action_type: "docker/image",
                payload: Some(&json!({"imageName": ["a"]})),
            }
        );
    }

    #[test]
    fn test_parse_garbage_fails() {
        let err = TreasureMap::from_slice(b"deployments: [").unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
    }

    #[test]
    fn test_worker_count() {
        let mut d = Deployment {
            parallel: false,
            parallel_sessions: 8,
            ..Default::default()
        };
        assert_eq!(d.worker_count(), 1);
        d.parallel = true;
        assert_eq!(d.worker_count(), 8);
        d.parallel_sessions = 0;
        assert_eq!(d.worker_count(), 1);
        d.parallel_sessions = -3;
        assert_eq!(d.worker_count(), 1);
    }

    #[test]
    fn test_command_precedence() {
        let action = Action {
            action_type: COMMAND.into(),
            command: "hostname".into(),
            commands: vec!["ls".into(), "pwd".into()],
            command_pipe_file: "/tmp/in".into(),
            command_pipe_cmd: "cat /etc/hosts".into(),
            ..Default::default()
        };
        match action.kind().unwrap() {
            ActionKind::Command(spec) => {
                assert_eq!(spec.commands, vec!["hostname"]);
                assert_eq!(spec.stdin, Some(StdinSource::LocalCommand("cat /etc/hosts")));
            }
            other => panic!("unexpected kind {:?}", other),
        }
    }

    #[test]
    fn test_package_command_rendering() {
        let action = Action {
            action_type: PACKAGE.into(),
            package_manager: "apt".into(),
            package_operation: "install".into(),
            packages: "mysql-server nginx".into(),
            ..Default::default()
        };
        let ActionKind::Package(spec) = action.kind().unwrap() else {
            panic!("expected package kind");
        };
        assert_eq!(
            spec.to_command(),
            "DEBIAN_FRONTEND=noninteractive apt-get install -y mysql-server nginx"
        );
    }

    #[test]
    fn test_packages_accepts_list() {
        let action: Action = serde_json::from_value(json!({
            "type": "pkg",
            "packageManager": "yum",
            "packageOperation": "remove",
            "packages": ["httpd", "php"]
        }))
        .unwrap();
        assert_eq!(action.packages, "httpd php");
    }

    #[test]
    fn test_serialization_omits_unset_fields() {
        let action = Action::command("greet", "echo hi");
        let value = serde_json::to_value(&action).unwrap();
        assert_eq!(
            value,
            json!({"name": "greet", "type": "command", "timeout": 0, "command": "echo hi"})
        );
    }
}
