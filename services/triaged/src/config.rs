//! Config-file loading: TOML on disk, `${VAR}` environment expansion, `~`
//! tilde resolution for the store path. Kept out of `triage-core` — the
//! core only ever sees the already-resolved [`triage_protocol::RepoOverride`]
//! table this module produces.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use triage_protocol::RepoOverride;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("no repos configured")]
    NoRepos,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default = "default_store_path")]
    store_path: String,
    #[serde(default)]
    github_token: String,
    #[serde(default)]
    embedding_api_base: String,
    #[serde(default)]
    embedding_api_key: String,
    #[serde(default)]
    embedding_model: Option<String>,
    #[serde(default)]
    completion_api_base: String,
    #[serde(default)]
    completion_api_key: String,
    #[serde(default)]
    completion_model: Option<String>,
    #[serde(default)]
    slack_webhook_url: String,
    #[serde(default)]
    discord_webhook_url: String,
    #[serde(default = "default_similarity_threshold")]
    similarity_threshold: f32,
    #[serde(default = "default_max_duplicates")]
    max_duplicates: usize,
    #[serde(default = "default_embed_max_chars")]
    embed_max_chars: usize,
    #[serde(default = "default_request_timeout_secs")]
    request_timeout_secs: u64,
    #[serde(default = "default_poll_interval_secs")]
    poll_interval_secs: u64,
    #[serde(default)]
    repos: Vec<RawRepoConfig>,
}

fn default_store_path() -> String {
    "~/.triage/triage.db".to_owned()
}
fn default_similarity_threshold() -> f32 {
    0.85
}
fn default_max_duplicates() -> usize {
    3
}
fn default_embed_max_chars() -> usize {
    8_000
}
fn default_request_timeout_secs() -> u64 {
    30
}
fn default_poll_interval_secs() -> u64 {
    300
}

#[derive(Debug, Deserialize)]
struct RawRepoConfig {
    owner: String,
    name: String,
    #[serde(default)]
    custom_prompt: String,
    #[serde(default)]
    similarity_threshold: f32,
    #[serde(default)]
    labels: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct RepoConfig {
    pub owner: String,
    pub name: String,
}

impl RepoConfig {
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub store_path: PathBuf,
    pub github_token: String,
    pub embedding_api_base: String,
    pub embedding_api_key: String,
    pub embedding_model: Option<String>,
    pub completion_api_base: String,
    pub completion_api_key: String,
    pub completion_model: Option<String>,
    pub slack_webhook_url: String,
    pub discord_webhook_url: String,
    pub similarity_threshold: f32,
    pub max_duplicates: usize,
    pub embed_max_chars: usize,
    pub request_timeout_secs: u64,
    pub poll_interval_secs: u64,
    pub repos: Vec<RepoConfig>,
    /// Per-repo overrides (custom prompt / threshold / label set), keyed by
    /// `"owner/name"`, as the core's `Pipeline` expects them.
    pub overrides: HashMap<String, RepoOverride>,
    /// The global label set: the union of every repo's labels that did not
    /// set its own — used as the classifier's default when a repo carries
    /// no per-repo label set.
    pub default_labels: std::collections::BTreeMap<String, String>,
}

/// Loads and resolves a config file: reads the file, expands `${VAR}`
/// references against the process environment, parses TOML, resolves `~`
/// in `store_path`, and reshapes the repo list into the override table the
/// core consumes.
pub fn load(path: &Path) -> Result<Config, ConfigError> {
    let raw_text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_owned(),
        source,
    })?;
    let expanded = expand_env_vars(&raw_text);
    let raw: RawConfig = toml::from_str(&expanded).map_err(|source| ConfigError::Toml {
        path: path.to_owned(),
        source,
    })?;

    if raw.repos.is_empty() {
        return Err(ConfigError::NoRepos);
    }

    let mut overrides = HashMap::new();
    let mut default_labels = std::collections::BTreeMap::new();
    let mut repos = Vec::new();
    for repo in &raw.repos {
        let full_name = format!("{}/{}", repo.owner, repo.name);
        if repo.labels.is_empty() {
            // Contributes to the shared default set used by repos with no
            // label set of their own.
        } else {
            for (k, v) in &repo.labels {
                default_labels.entry(k.clone()).or_insert_with(|| v.clone());
            }
        }
        overrides.insert(
            full_name,
            RepoOverride {
                custom_prompt: repo.custom_prompt.clone(),
                similarity_threshold: repo.similarity_threshold,
                labels: repo.labels.clone(),
            },
        );
        repos.push(RepoConfig {
            owner: repo.owner.clone(),
            name: repo.name.clone(),
        });
    }

    Ok(Config {
        store_path: expand_tilde(&raw.store_path),
        github_token: raw.github_token,
        embedding_api_base: raw.embedding_api_base,
        embedding_api_key: raw.embedding_api_key,
        embedding_model: raw.embedding_model,
        completion_api_base: raw.completion_api_base,
        completion_api_key: raw.completion_api_key,
        completion_model: raw.completion_model,
        slack_webhook_url: raw.slack_webhook_url,
        discord_webhook_url: raw.discord_webhook_url,
        similarity_threshold: raw.similarity_threshold,
        max_duplicates: raw.max_duplicates,
        embed_max_chars: raw.embed_max_chars,
        request_timeout_secs: raw.request_timeout_secs,
        poll_interval_secs: raw.poll_interval_secs,
        repos,
        overrides,
        default_labels,
    })
}

/// Replaces every `${NAME}` with the environment variable's value, or the
/// empty string if unset. Intentionally minimal — no `$NAME` (no braces),
/// no default-value syntax; config files in this codebase always use the
/// braced form.
fn expand_env_vars(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        rest = &rest[start + 2..];
        match rest.find('}') {
            Some(end) => {
                let var = &rest[..end];
                if let Ok(value) = std::env::var(var) {
                    out.push_str(&value);
                }
                rest = &rest[end + 1..];
            }
            None => {
                out.push_str("${");
                break;
            }
        }
    }
    out.push_str(rest);
    out
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return Path::new(&home).join(rest);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_env_vars_substitutes_braced_references() {
        std::env::set_var("TRIAGE_TEST_TOKEN", "secret123");
        let out = expand_env_vars("token = \"${TRIAGE_TEST_TOKEN}\"");
        assert_eq!(out, "token = \"secret123\"");
        std::env::remove_var("TRIAGE_TEST_TOKEN");
    }

    #[test]
    fn expand_env_vars_leaves_unset_vars_empty() {
        std::env::remove_var("TRIAGE_TEST_UNSET_VAR");
        let out = expand_env_vars("x = \"${TRIAGE_TEST_UNSET_VAR}\"");
        assert_eq!(out, "x = \"\"");
    }

    #[test]
    fn expand_tilde_resolves_leading_home_reference() {
        std::env::set_var("HOME", "/home/tester");
        let resolved = expand_tilde("~/.triage/triage.db");
        assert_eq!(resolved, PathBuf::from("/home/tester/.triage/triage.db"));
    }

    #[test]
    fn load_rejects_a_config_with_no_repos() {
        let dir = std::env::temp_dir().join(format!("triage-cfg-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("empty.toml");
        std::fs::write(&path, "store_path = \"./db.sqlite\"\n").unwrap();
        let err = load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::NoRepos));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn load_builds_overrides_keyed_by_full_name() {
        let dir = std::env::temp_dir().join(format!("triage-cfg-test2-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("triage.toml");
        std::fs::write(
            &path,
            r#"
store_path = "./db.sqlite"

[[repos]]
owner = "acme"
name = "widgets"
similarity_threshold = 0.5
custom_prompt = "focus on crashes"

[repos.labels]
bug = "broken"
"#,
        )
        .unwrap();
        let config = load(&path).unwrap();
        assert_eq!(config.repos.len(), 1);
        let over = config.overrides.get("acme/widgets").unwrap();
        assert_eq!(over.similarity_threshold, 0.5);
        assert_eq!(over.custom_prompt, "focus on crashes");
        assert_eq!(over.labels.get("bug"), Some(&"broken".to_owned()));
        std::fs::remove_dir_all(&dir).ok();
    }
}
