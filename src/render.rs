//! Manifest templating.
//!
//! Templates use the `{{ .Field }}` placeholder syntax. Anything else inside
//! `{{ }}` is rejected rather than copied through to the cluster.

use anyhow::{Context, Result, bail};
use regex::Regex;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use thiserror::Error;
use walkdir::WalkDir;

use crate::config::DeployParams;

static ACTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{(.*?)\}\}").expect("valid action regex"));

static FIELD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*\.([A-Za-z_][A-Za-z0-9_]*)\s*$").expect("valid field regex"));

/// Database manifests, skipped unless the database tier is deployed
static DATABASE_MANIFEST: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^postgres-.*\.yaml$").expect("valid manifest regex"));

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("{file}: unknown template field '.{field}'")]
    UnknownField { file: String, field: String },

    #[error("{file}: unsupported template action '{action}'")]
    UnsupportedAction { file: String, action: String },

    #[error("{file}: unclosed template action")]
    Unclosed { file: String },

    #[error("manifest '{0}' was not rendered; is it missing from the source directory?")]
    NotRendered(String),
}

/// Substitute every `{{ .Field }}` in `content`.
pub fn render_template(
    file: &str,
    content: &str,
    params: &DeployParams,
) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(content.len());
    let mut last = 0;

    for caps in ACTION.captures_iter(content) {
        let whole = caps.get(0).expect("match has group 0");
        let action = &caps[1];

        let field = FIELD
            .captures(action)
            .map(|c| c[1].to_string())
            .ok_or_else(|| TemplateError::UnsupportedAction {
                file: file.to_string(),
                action: action.trim().to_string(),
            })?;
        let value = params
            .field(&field)
            .ok_or_else(|| TemplateError::UnknownField {
                file: file.to_string(),
                field,
            })?;

        out.push_str(&content[last..whole.start()]);
        out.push_str(&value);
        last = whole.end();
    }
    out.push_str(&content[last..]);

    if ACTION.replace_all(content, "").contains("{{") {
        return Err(TemplateError::Unclosed {
            file: file.to_string(),
        });
    }

    Ok(out)
}

/// Where to read templates from and write manifests to.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub source_dir: PathBuf,
    pub gen_dir: PathBuf,
    /// Render `postgres-*.yaml` templates too
    pub include_database: bool,
}

/// Rendered manifests, keyed by file name.
#[derive(Debug, Clone, Default)]
pub struct Rendered {
    files: BTreeMap<String, PathBuf>,
}

impl Rendered {
    /// Generated paths, in file name order.
    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.files.values().map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Map template file names to their generated paths, keeping order.
    pub fn resolve(&self, names: &[String]) -> Result<Vec<PathBuf>, TemplateError> {
        names
            .iter()
            .map(|name| {
                self.files
                    .get(name)
                    .cloned()
                    .ok_or_else(|| TemplateError::NotRendered(name.clone()))
            })
            .collect()
    }
}

/// Render every `*.yaml` template in the source dir into a fresh gen dir.
pub fn render_all(params: &DeployParams, opts: &RenderOptions) -> Result<Rendered> {
    prepare_gen_dir(&opts.source_dir, &opts.gen_dir)?;

    let mut rendered = Rendered::default();

    for entry in WalkDir::new(&opts.source_dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.with_context(|| {
            format!("Could not list templates in {}", opts.source_dir.display())
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str() else {
            continue;
        };
        if entry.path().extension().is_none_or(|ext| ext != "yaml") {
            continue;
        }
        if !opts.include_database && DATABASE_MANIFEST.is_match(name) {
            log::debug!("skipping {name}: database tier not deployed");
            continue;
        }

        let content = fs::read_to_string(entry.path())
            .with_context(|| format!("Could not read {}", entry.path().display()))?;
        let output = render_template(name, &content, params)?;

        let target = opts.gen_dir.join(name);
        fs::write(&target, output)
            .with_context(|| format!("Could not write {}", target.display()))?;
        log::debug!("rendered {} -> {}", entry.path().display(), target.display());

        rendered.files.insert(name.to_string(), target);
    }

    if rendered.is_empty() {
        bail!("No *.yaml templates found in {}", opts.source_dir.display());
    }

    Ok(rendered)
}

/// Remove and recreate the gen dir, refusing to wipe the templates themselves.
fn prepare_gen_dir(source_dir: &Path, gen_dir: &Path) -> Result<()> {
    if let (Ok(source), Ok(target)) = (source_dir.canonicalize(), gen_dir.canonicalize()) {
        if source.starts_with(&target) {
            bail!(
                "Refusing to clear {}: it contains the template directory",
                gen_dir.display()
            );
        }
    }

    if gen_dir.exists() {
        fs::remove_dir_all(gen_dir)
            .with_context(|| format!("Could not remove {}", gen_dir.display()))?;
    }
    create_private_dir(gen_dir)
}

#[cfg(unix)]
fn create_private_dir(path: &Path) -> Result<()> {
    use std::os::unix::fs::DirBuilderExt;

    fs::DirBuilder::new()
        .recursive(true)
        .mode(0o700)
        .create(path)
        .with_context(|| format!("Could not create {}", path.display()))
}

#[cfg(not(unix))]
fn create_private_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).with_context(|| format!("Could not create {}", path.display()))
}

// ============================================================================
// Tests
// ============================================================================
